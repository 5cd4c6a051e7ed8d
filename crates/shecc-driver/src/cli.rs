//! Command-line surface (spec.md §6: `compile [-o <out>] [+m] [--dump-ir]
//! [--no-libc] [--custom] <input.c>`), via `clap`'s derive API the same way
//! `wasmtime-cli`'s flags are built.

use clap::Parser;
use std::path::PathBuf;

/// A self-hosting, educational C compiler targeting bare-metal ARMv7-A and
/// RV32I, emitting a static ELF executable.
#[derive(Parser, Debug)]
#[command(name = "shecc", version, about)]
pub struct Cli {
    /// C source file to compile.
    pub input: PathBuf,

    /// Write the executable to this path instead of `a.out`.
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Target instruction set (`arm32` or `riscv32`).
    #[arg(long = "target", default_value = "riscv32")]
    pub target: String,

    /// Emit hardware multiply/divide instructions instead of calling the
    /// bundled software helpers (spec.md's `+m`, normalized to this flag by
    /// [`normalize_plus_m`] before `clap` ever sees argv).
    #[arg(long = "hardware-mul-div")]
    pub hardware_mul_div: bool,

    /// Print first- and second-phase IR to stdout before codegen.
    #[arg(long = "dump-ir")]
    pub dump_ir: bool,

    /// Skip bundling the freestanding libc.
    #[arg(long = "no-libc")]
    pub no_libc: bool,

    /// Additional directories searched for angle-bracket `#include`s, in
    /// order (spec.md's `--custom`).
    #[arg(long = "custom", value_name = "DIR")]
    pub custom_include_dirs: Vec<PathBuf>,
}

/// Rewrite spec.md's bare `+m` token into `--hardware-mul-div` before
/// handing argv to `clap`: a leading `+` isn't a `clap` long- or
/// short-option prefix, so the original spelling has to be normalized
/// ahead of parsing rather than declared as an alias.
pub fn normalize_plus_m(args: impl Iterator<Item = String>) -> Vec<String> {
    args.map(|a| if a == "+m" { "--hardware-mul-div".to_string() } else { a })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plus_m_normalizes_to_the_long_flag() {
        let argv = normalize_plus_m(
            ["shecc", "+m", "a.c"].iter().map(|s| s.to_string()),
        );
        let cli = Cli::parse_from(argv);
        assert!(cli.hardware_mul_div);
    }
}
