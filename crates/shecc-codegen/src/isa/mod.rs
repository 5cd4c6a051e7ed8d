//! Target dispatch: everything the allocator and code generator need to
//! know about one of the two supported targets (spec.md §4.5/§4.6: "Two
//! target files describe the register sets ... the argument registers, and
//! the calling convention").
//!
//! Plays the role of `cranelift_codegen::isa::TargetIsa`, cut down to the
//! two fixed-width RISC targets this compiler emits: no encoding tables,
//! legalization, or multiple competing encodings per opcode, since every
//! ARMv7-A and RV32I instruction this compiler emits is exactly 4 bytes.

pub mod arm32;
pub mod call_conv;
pub mod registers;
pub mod riscv;

pub use call_conv::CallConv;
pub use registers::{RegInfo, RegUnit};

use crate::ir::{Function, Inst, Opcode};
use crate::result::CodegenResult;
use smallvec::SmallVec;

/// The machine words one IR instruction encodes to. Almost always one word;
/// `Opcode::Branch` encodes to two (a zero-test followed by a conditional
/// jump), since neither target has a single-instruction "compare register
/// to zero and branch" in their 32-bit encodings (ARM's Thumb `CBZ`/`CBNZ`
/// don't exist in the ARM encoding this compiler emits).
pub type EncodedInst = SmallVec<[u32; 2]>;

/// The two targets spec.md §1 names.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Isa {
    /// ARMv7-A, 32-bit ARM (not Thumb) encoding.
    Arm32,
    /// RV32I, the RISC-V 32-bit base integer ISA.
    Riscv32,
}

impl Isa {
    /// Look up a target by its `--target` command-line spelling.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "arm32" | "armv7a" | "arm" => Some(Isa::Arm32),
            "riscv32" | "rv32" | "rv32i" => Some(Isa::Riscv32),
            _ => None,
        }
    }

    /// Build the `TargetIsa` implementation for this target.
    pub fn isa(self) -> Box<dyn TargetIsa> {
        match self {
            Isa::Arm32 => Box::new(arm32::Arm32Isa),
            Isa::Riscv32 => Box::new(riscv::Riscv32Isa),
        }
    }
}

/// Every fact the allocator, peephole pass, and binary emitter need from a
/// target, behind one object-safe trait so `Context::compile` doesn't
/// monomorphize over the target (mirrors `cranelift_codegen::isa::TargetIsa`
/// being used as `&dyn TargetIsa` throughout that crate's `Context::compile`).
pub trait TargetIsa {
    /// Which target this is.
    fn isa(&self) -> Isa;

    /// The register file the allocator draws from.
    fn registers(&self) -> &'static RegInfo;

    /// The calling convention used for every call in a program compiled for
    /// this target (spec.md has exactly one ABI per target, unlike
    /// `cranelift-codegen`'s pluggable `CallConv` enum).
    fn call_conv(&self) -> &'static CallConv;

    /// Two registers reserved out of [`Self::registers`] purely for
    /// `crate::regalloc::spill_legalize`'s reload-before/spill-after
    /// sequences: one role for each of an instruction's two source operands
    /// (reused for its destination, which is always written after both
    /// sources have been consumed).
    fn scratch_regs(&self) -> [RegUnit; 2];

    /// Maximum signed byte displacement a direct, unconditional
    /// call/jump-class branch can reach (spec.md §4.6: "±16 MiB on ARMv7
    /// B/BL; ±1 MiB on RV32I JAL").
    fn jump_range(&self) -> i64;

    /// Maximum signed byte displacement a conditional branch can reach
    /// (spec.md §4.6: "±1 MiB on RV32I ... BEQ"; ARMv7-A's conditional `B`
    /// shares `B`'s unconditional range since this compiler never emits the
    /// Thumb-only short conditional encoding).
    fn branch_range(&self) -> i64;

    /// Number of 32-bit words `opcode` encodes to, needed by `binemit` to
    /// precompute block offsets before any encoding has actually run.
    fn encoded_len(&self, opcode: Opcode) -> u32 {
        match opcode {
            Opcode::Branch => 2,
            _ => 1,
        }
    }

    /// Encode one instruction to its machine words (see [`EncodedInst`]).
    ///
    /// `func` provides the instruction's operands' assigned registers
    /// (`VarData::location`, filled in by `crate::regalloc` before this is
    /// ever called) and `pc`/`resolve` give the byte offset this
    /// instruction and its branch/jump/call target (if any) land at; both
    /// are needed to compute PC-relative displacements.
    fn encode(
        &self,
        func: &Function,
        inst: Inst,
        pc: u32,
        resolve: &dyn Fn(&str) -> Option<u32>,
    ) -> CodegenResult<EncodedInst>;

    /// Does this target need the software multiply/divide helper routines
    /// (the `-m` flag, spec.md §4.6)? ARMv7-A always has hardware `mul`/
    /// `sdiv`/`udiv` from the architecture profile this compiler targets;
    /// RV32I without the `M` extension does not.
    fn needs_soft_mul_div(&self, hardware_mul_div: bool) -> bool {
        !hardware_mul_div
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_str_round_trips() {
        assert_eq!(Isa::from_str("arm32"), Some(Isa::Arm32));
        assert_eq!(Isa::from_str("rv32i"), Some(Isa::Riscv32));
        assert_eq!(Isa::from_str("mips"), None);
    }
}
