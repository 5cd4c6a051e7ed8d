//! Error type shared by every pass in this crate.

use crate::source_loc::SourceLoc;
use failure_derive::Fail;

/// A single error produced by the codegen pipeline, always anchored at a
/// [`SourceLoc`] per spec.md §7 ("every error carries a source location...
/// and is emitted once").
#[derive(Debug, Fail)]
pub enum CodegenError {
    /// A branch or jump target is out of the architecture's PC-relative
    /// reach (±16MiB on ARMv7 B/BL, ±1MiB on RV32I JAL/BEQ).
    #[fail(display = "{}: branch target out of range ({} bytes)", loc, distance)]
    BranchOutOfRange {
        /// Location of the offending branch/jump instruction.
        loc: SourceLoc,
        /// Distance between the instruction and its target, in bytes.
        distance: i64,
    },
    /// An opcode has no encoding on the selected target.
    #[fail(display = "{}: opcode `{:?}` unsupported on this target", loc, opcode)]
    UnsupportedOpcode {
        /// Location of the offending instruction.
        loc: SourceLoc,
        /// The opcode in question.
        opcode: crate::ir::Opcode,
    },
    /// A compiler-internal invariant was violated; this is always a bug in
    /// the compiler, never a user-facing diagnosis, and is surfaced
    /// distinctly so it gets filed rather than explained away (spec.md §7).
    #[fail(display = "internal compiler error: {}", message)]
    Internal {
        /// Description of the violated invariant.
        message: String,
    },
    /// Verifier found the IR, liveness, or register assignment inconsistent
    /// with one of the invariants in spec.md §3.
    #[fail(display = "verifier: {}", message)]
    Verifier {
        /// Description of the failed check.
        message: String,
    },
}

impl CodegenError {
    /// Build an `Internal` error from a `format!`-style message.
    pub fn internal(message: impl Into<String>) -> Self {
        CodegenError::Internal {
            message: message.into(),
        }
    }
}

/// Result type returned by every codegen pass.
pub type CodegenResult<T> = Result<T, CodegenError>;
