//! Front end of the shecc-rs compiler: lexer, preprocessor, and the
//! recursive-descent parser that builds `shecc-codegen` IR directly (no
//! separate AST — mirrors spec.md §4.3's "parser emits first-phase IR
//! as it goes", the same single-pass shape
//! `cranelift_frontend::FunctionBuilder` gives other language front ends,
//! minus the on-the-fly SSA construction: this compiler's SSA pass runs
//! later, over already-complete IR, so the builder here stays a plain
//! imperative IR emitter).

#![deny(missing_docs)]

pub mod diagnostic;

pub mod builder;
pub mod lexer;
pub mod module;
pub mod parser;
pub mod preprocess;
pub mod token;

pub use crate::diagnostic::{DiagResult, Diagnostic};
pub use crate::module::Module;
pub use crate::parser::Parser;
