//! `shecc`: compile one C source file to a static ELF executable
//! (spec.md §6).

use clap::Parser;
use shecc_driver::cli::{normalize_plus_m, Cli};
use shecc_driver::pipeline;

fn main() {
    env_logger::init();

    let args = normalize_plus_m(std::env::args());
    let cli = Cli::parse_from(args);

    if let Err(err) = pipeline::run(&cli) {
        eprintln!("shecc: error: {err:#}");
        std::process::exit(1);
    }
}
