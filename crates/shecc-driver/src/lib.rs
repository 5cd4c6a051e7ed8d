//! Driver library: argument parsing plus the compile-and-link pipeline,
//! factored out of `main.rs` so integration tests can invoke it directly
//! without spawning a subprocess (the same split
//! `wasmtime-cli`'s `src/lib.rs`/`src/bin/wasmtime.rs` use).

#![deny(missing_docs)]

pub mod cli;
pub mod pipeline;
mod startup;

pub use crate::cli::Cli;
