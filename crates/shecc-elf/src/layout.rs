//! Virtual memory layout of the two loadable segments spec.md §6 describes:
//! "one loadable segment for text+rodata, one for data+bss".
//!
//! Every instruction this compiler emits is a fixed 1 or 2 words
//! (`binemit.rs`'s doc comment), so `.text`'s size is known from opcode
//! counts alone before any address exists. That lets `shecc-driver` compute
//! the whole program's layout in one pass, hand every function and global
//! its final address, *then* run `binemit::emit_function` — rather than the
//! iterative fixed-point relaxation a variable-width ISA would need.

use crate::types::{EHDR_SIZE, LOAD_BASE, PAGE_ALIGN, PHDR_SIZE};

fn align_up(value: u32, align: u32) -> u32 {
    (value + align - 1) & !(align - 1)
}

/// The base address of every section in the final executable, derived
/// purely from section sizes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    /// File offset (and, since segment 1 loads 1:1, virtual address minus
    /// [`LOAD_BASE`]) the headers occupy before `.text` begins.
    pub header_size: u32,
    /// `.text`'s load address.
    pub text_addr: u32,
    /// `.rodata`'s load address, immediately following `.text`.
    pub rodata_addr: u32,
    /// `.data`'s load address, on a fresh page after the first segment so
    /// the loader can map the first segment read+execute and the second
    /// read+write without either granting the other permission.
    pub data_addr: u32,
    /// `.bss`'s load address, immediately following `.data` (same segment,
    /// zero-fill only, occupies no file space).
    pub bss_addr: u32,
    /// Total size of the first (text+rodata) loadable segment, headers
    /// included.
    pub segment1_size: u32,
    /// Total size of the second (data+bss) loadable segment *as mapped in
    /// memory* (`.bss` included); the file only carries `data_size` bytes
    /// of it.
    pub segment2_mem_size: u32,
}

impl Layout {
    /// Two `Elf32_Phdr`s: one for text+rodata, one for data+bss (spec.md
    /// §6's "program headers (one loadable segment for text+rodata, one for
    /// data+bss)").
    const PHDR_COUNT: u32 = 2;

    /// Compute every section's address from its size alone.
    pub fn compute(text_size: u32, rodata_size: u32, data_size: u32, bss_size: u32) -> Layout {
        let header_size = EHDR_SIZE as u32 + Self::PHDR_COUNT * PHDR_SIZE as u32;
        let text_addr = LOAD_BASE + header_size;
        let rodata_addr = text_addr + text_size;
        let segment1_size = header_size + text_size + rodata_size;

        let data_addr = align_up(LOAD_BASE + segment1_size, PAGE_ALIGN);
        let bss_addr = data_addr + data_size;
        let segment2_mem_size = data_size + bss_size;

        Layout {
            header_size,
            text_addr,
            rodata_addr,
            data_addr,
            bss_addr,
            segment1_size,
            segment2_mem_size,
        }
    }

    /// The file offset `.data`/`.bss` load at, mirroring `data_addr` but
    /// relative to the start of the file rather than `LOAD_BASE` (ELF
    /// requires `p_offset % p_align == p_vaddr % p_align` for `PT_LOAD`
    /// segments sharing a page boundary; since this writer never moves the
    /// virtual base, file offset and virtual address are identical here).
    pub fn data_file_offset(&self) -> u32 {
        self.data_addr - LOAD_BASE
    }

    /// Entry point: `_start`'s address, always the very first byte of
    /// `.text`.
    pub fn entry_addr(&self) -> u32 {
        self.text_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_and_rodata_share_the_first_segment() {
        let l = Layout::compute(64, 16, 0, 0);
        assert_eq!(l.text_addr, LOAD_BASE + l.header_size);
        assert_eq!(l.rodata_addr, l.text_addr + 64);
        assert_eq!(l.segment1_size, l.header_size + 64 + 16);
    }

    #[test]
    fn data_segment_starts_on_a_fresh_page() {
        let l = Layout::compute(64, 16, 8, 4);
        assert_eq!(l.data_addr % PAGE_ALIGN, 0);
        assert!(l.data_addr >= LOAD_BASE + l.segment1_size);
        assert_eq!(l.bss_addr, l.data_addr + 8);
        assert_eq!(l.segment2_mem_size, 12);
    }

    #[test]
    fn entry_is_the_first_text_byte() {
        let l = Layout::compute(100, 0, 0, 0);
        assert_eq!(l.entry_addr(), l.text_addr);
    }
}
