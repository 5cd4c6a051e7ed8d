//! ELF32 on-disk structure layouts and the subset of standard constants
//! this writer needs (spec.md §6: "ELF header, program headers ... section
//! headers ... entry point at `_start`").
//!
//! Field names and constant values match the ELF specification (and the
//! conventional `Elf32_*`/`SHT_*`/`PT_*` naming every ELF-reading crate
//! uses), kept deliberately narrow: only what a minimal static executable
//! needs, not a general-purpose parser's full constant set.

/// `e_ident[EI_MAG0..EI_MAG3]`: `\x7fELF`.
pub const ELFMAG: [u8; 4] = [0x7f, b'E', b'L', b'F'];
/// `e_ident[EI_CLASS]`: 32-bit objects.
pub const ELFCLASS32: u8 = 1;
/// `e_ident[EI_DATA]`: little-endian.
pub const ELFDATA2LSB: u8 = 1;
/// `e_ident[EI_VERSION]` / `e_version`: the only ELF version that exists.
pub const EV_CURRENT: u8 = 1;
/// `e_ident[EI_OSABI]`: System V ABI (no OS-specific extensions used).
pub const ELFOSABI_NONE: u8 = 0;

/// `e_type`: executable file.
pub const ET_EXEC: u16 = 2;
/// `e_machine`: ARM.
pub const EM_ARM: u16 = 40;
/// `e_machine`: RISC-V.
pub const EM_RISCV: u16 = 243;

/// `p_type`: loadable segment.
pub const PT_LOAD: u32 = 1;
/// `p_flags`: executable.
pub const PF_X: u32 = 1;
/// `p_flags`: writable.
pub const PF_W: u32 = 2;
/// `p_flags`: readable.
pub const PF_R: u32 = 4;

/// `sh_type`: program-defined contents (code, initialized data).
pub const SHT_PROGBITS: u32 = 1;
/// `sh_type`: symbol table.
pub const SHT_SYMTAB: u32 = 2;
/// `sh_type`: string table.
pub const SHT_STRTAB: u32 = 3;
/// `sh_type`: occupies no file space (`.bss`).
pub const SHT_NOBITS: u32 = 8;

/// `sh_flags`: section is writable at run time.
pub const SHF_WRITE: u32 = 0x1;
/// `sh_flags`: section occupies memory during execution.
pub const SHF_ALLOC: u32 = 0x2;
/// `sh_flags`: section contains executable instructions.
pub const SHF_EXECINSTR: u32 = 0x4;

/// `st_info`: local binding, mirrors the ELF32 `ELF32_ST_INFO` macro with
/// `STT_NOTYPE`/`STT_FUNC`/`STT_OBJECT` folded in by the caller.
pub const STB_LOCAL: u8 = 0;
/// `st_info` binding: visible to the whole link (every symbol this writer
/// emits — spec.md's "symbols list global variables and all user and libc
/// functions" implies link-wide visibility, not per-translation-unit
/// locals, since there is exactly one translation unit per output).
pub const STB_GLOBAL: u8 = 1;

/// `st_info` type: data object.
pub const STT_OBJECT: u8 = 1;
/// `st_info` type: function.
pub const STT_FUNC: u8 = 2;

/// Pack an ELF32 symbol's binding and type into one `st_info` byte.
pub const fn st_info(binding: u8, sym_type: u8) -> u8 {
    (binding << 4) | (sym_type & 0xf)
}

/// Size in bytes of an `Elf32_Ehdr` on disk.
pub const EHDR_SIZE: u16 = 52;
/// Size in bytes of one `Elf32_Phdr` on disk.
pub const PHDR_SIZE: u16 = 32;
/// Size in bytes of one `Elf32_Shdr` on disk.
pub const SHDR_SIZE: u16 = 40;
/// Size in bytes of one `Elf32_Sym` on disk.
pub const SYM_SIZE: u32 = 16;

/// Byte alignment the two loadable segments are placed on (one page, on
/// every target this writer supports).
pub const PAGE_ALIGN: u32 = 0x1000;
/// Section header indices this writer always uses, in the fixed order
/// [`crate::writer::Object::write`] emits them — exposed so callers can
/// build [`crate::symbol::Symbol`]'s `shndx` without guessing the layout.
/// (Named `SECTION_*` rather than `SHN_*` to avoid colliding with the ELF
/// spec's own reserved `SHN_UNDEF`/`SHN_ABS`-style special indices.)
pub const SECTION_TEXT: u16 = 1;
/// `.rodata`'s section index.
pub const SECTION_RODATA: u16 = 2;
/// `.data`'s section index.
pub const SECTION_DATA: u16 = 3;
/// `.bss`'s section index.
pub const SECTION_BSS: u16 = 4;
/// `.symtab`'s section index.
pub const SECTION_SYMTAB: u16 = 5;
/// `.strtab`'s section index.
pub const SECTION_STRTAB: u16 = 6;
/// `.shstrtab`'s section index.
pub const SECTION_SHSTRTAB: u16 = 7;

/// Virtual address the text segment loads at. Chosen well above NULL so a
/// null-pointer dereference in a compiled program reliably segfaults rather
/// than reading valid memory, matching the conventional `0x10000`
/// load address most freestanding ARM/RISC-V toolchains default to.
pub const LOAD_BASE: u32 = 0x10000;
