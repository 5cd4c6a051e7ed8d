//! Source locations attached to every token, IR instruction, and diagnostic.

use std::fmt;
use std::rc::Rc;

/// A byte offset/length/line/column quintuple, plus the file it came from.
///
/// This is the Rust-idiomatic reshaping of spec.md §3's "quintuple of byte
/// offset, length, line, column, filename pointer": the filename is an
/// `Rc<str>` shared by every token lexed from the same file (interned once
/// in the lexer's file table) rather than a raw pointer into arena storage.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct SourceLoc {
    /// Owning file name, as given on the command line or in an `#include`.
    pub file: Rc<str>,
    /// Byte offset of the first character.
    pub offset: u32,
    /// Length in bytes.
    pub len: u32,
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub col: u32,
}

impl SourceLoc {
    /// Build a new source location.
    pub fn new(file: Rc<str>, offset: u32, len: u32, line: u32, col: u32) -> Self {
        Self {
            file,
            offset,
            len,
            line,
            col,
        }
    }

    /// A placeholder location for compiler-synthesized entities (the
    /// implicit global initializer, `__syscall`) that don't correspond to
    /// any position in user source.
    pub fn synthetic() -> Self {
        Self {
            file: Rc::from("<builtin>"),
            offset: 0,
            len: 0,
            line: 0,
            col: 0,
        }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

impl fmt::Debug for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        (self as &dyn fmt::Display).fmt(f)
    }
}
