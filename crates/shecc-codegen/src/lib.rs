//! Core of the shecc-rs compiler: three-address IR, SSA construction and
//! optimization, liveness analysis, linear-scan register allocation,
//! peephole rewriting, CFG flattening, and per-target code generation.
//!
//! This crate deliberately knows nothing about C syntax. It is handed a
//! [`ir::Function`] (built by `shecc-frontend`'s parser) together with the
//! [`flowgraph::ControlFlowGraph`] the parser derived while emitting it, and
//! turns that into target machine bytes through [`Context::compile`].

#![deny(missing_docs)]

pub mod binemit;
pub mod context;
pub mod cursor;
pub mod dominator_tree;
pub mod flatten;
pub mod flowgraph;
pub mod ir;
pub mod isa;
pub mod peephole;
pub mod regalloc;
pub mod result;
pub mod settings;
pub mod source_loc;
pub mod ssa;
pub mod verifier;
pub mod write;

pub use crate::context::Context;
pub use crate::result::{CodegenError, CodegenResult};
pub use crate::source_loc::SourceLoc;

pub use shecc_entity as entity;
