//! Error type for this crate, matching `shecc-codegen::CodegenError`'s shape
//! (spec.md §7: "every error carries ... and is emitted once") so
//! `shecc-driver` can fold both into one diagnostic path.

use failure_derive::Fail;

/// Something the object writer can't represent.
#[derive(Debug, Fail)]
pub enum ElfError {
    /// A section or segment grew past what a 32-bit file offset/address can
    /// hold — effectively unreachable for an educational compiler's output,
    /// but checked rather than silently wrapping.
    #[fail(display = "`{}` section overflows a 32-bit ELF32 file ({} bytes)", section, size)]
    SectionTooLarge {
        /// Name of the offending section.
        section: String,
        /// Its size in bytes.
        size: u64,
    },
    /// A symbol name is longer than fits the string table scheme, or
    /// contains an embedded NUL, which would corrupt `.strtab`.
    #[fail(display = "invalid symbol name `{}`", name)]
    InvalidSymbolName {
        /// The offending name.
        name: String,
    },
}

/// Result type returned by this crate's fallible operations.
pub type ElfResult<T> = Result<T, ElfError>;
