//! Minimal ELF32 executable writer (spec.md §1: "deliberately out of scope
//! ... the ELF object writer \[is\] a sequential byte-builder producing a
//! minimal static executable header plus `.text`, `.data`, `.rodata`,
//! `.symtab`, `.strtab`, `.shstrtab` sections").
//!
//! `shecc-driver` is the only caller: it runs `shecc-codegen::binemit`
//! across every function, interns `shecc_frontend::Module::rodata` and
//! lowers `Module::globals` into `.data`/`.bss`, then hands the finished
//! bytes and a symbol table to [`writer::Object`]. This crate knows nothing
//! about C, IR, or code generation — only about the ELF32 container format.

#![deny(missing_docs)]

pub mod error;
pub mod layout;
pub mod symbol;
pub mod types;
pub mod writer;

pub use crate::error::{ElfError, ElfResult};
pub use crate::layout::Layout;
pub use crate::symbol::{Symbol, SymbolKind};
pub use crate::writer::Object;
