//! Diagnostics for the lexer, preprocessor, and parser.
//!
//! Modeled directly on `cranelift_reader::error`'s `Location`/`ParseError`/
//! `err!` pattern: no dependency, a location plus a message, rendered once by
//! the driver. `shecc-codegen::CodegenError` plays the equivalent role one
//! stage later (spec.md §7: "every error carries a source location ... and
//! is emitted once").

use shecc_codegen::SourceLoc;
use std::fmt;

/// A single diagnostic raised while lexing, preprocessing, or parsing one
/// translation unit.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Where the problem was found.
    pub loc: SourceLoc,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.loc, self.message)
    }
}

impl std::error::Error for Diagnostic {}

/// Result of a lex/preprocess/parse operation.
pub type DiagResult<T> = Result<T, Diagnostic>;

/// Build an `Err(Diagnostic)` at `$loc` from a `format!`-style message,
/// mirroring `cranelift_reader`'s `err!` macro.
#[macro_export]
macro_rules! err {
    ( $loc:expr, $msg:expr ) => {
        Err($crate::diagnostic::Diagnostic {
            loc: $loc.clone(),
            message: $msg.to_string(),
        })
    };

    ( $loc:expr, $fmt:expr, $( $arg:expr ),+ ) => {
        Err($crate::diagnostic::Diagnostic {
            loc: $loc.clone(),
            message: format!( $fmt, $( $arg ),+ ),
        })
    };
}
