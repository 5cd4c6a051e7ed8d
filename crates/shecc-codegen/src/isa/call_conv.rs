//! Calling convention: argument/return register assignment and the
//! caller-/callee-saved partition the allocator needs (spec.md §4.5).

use crate::isa::registers::RegUnit;

/// A target's calling convention: which registers carry arguments and the
/// return value, and which side of a call is responsible for preserving
/// which registers.
pub struct CallConv {
    /// Registers carrying the first N integer/pointer arguments, in order.
    pub arg_regs: &'static [RegUnit],
    /// Register carrying (or receiving) the integer return value.
    pub return_reg: RegUnit,
    /// Registers a callee must restore before returning if it clobbers them.
    pub callee_saved: &'static [RegUnit],
    /// Registers a caller must assume are clobbered by any `call`/`indirect`
    /// and so must spill around them if live across the call (spec.md
    /// §4.5: "Caller-saved registers are spilled around `call` and
    /// `indirect`").
    pub caller_saved: &'static [RegUnit],
    /// Registers carrying the syscall number and up to six syscall
    /// arguments, in order, for inline `__syscall` expansion (spec.md
    /// §4.6).
    pub syscall_regs: &'static [RegUnit],
}

impl CallConv {
    /// Is `unit` clobbered by an ordinary `call`/`indirect`?
    pub fn is_caller_saved(&self, unit: RegUnit) -> bool {
        self.caller_saved.contains(&unit)
    }

    /// Does `unit` need prologue/epilogue preservation if the function
    /// writes to it?
    pub fn is_callee_saved(&self, unit: RegUnit) -> bool {
        self.callee_saved.contains(&unit)
    }

    /// The register carrying argument number `index` (0-based), if the ABI
    /// passes it in a register rather than on the stack.
    pub fn arg_reg(&self, index: usize) -> Option<RegUnit> {
        self.arg_regs.get(index).copied()
    }
}

/// AAPCS: `r0`-`r3` argument/scratch, `r0` return, `r4`-`r6`/`r8`-`r11`
/// callee-saved, `r0`-`r3`/`r12`/`lr` caller-saved. The syscall convention
/// matches the Linux EABI: `r7` carries the syscall number, `r0`-`r5` the
/// arguments.
pub const ARM32_AAPCS: CallConv = CallConv {
    arg_regs: &[0, 1, 2, 3],
    return_reg: 0,
    callee_saved: &[4, 5, 6, 8, 9, 10, 11],
    caller_saved: &[0, 1, 2, 3, 12, 14],
    syscall_regs: &[7, 0, 1, 2, 3, 4, 5],
};

/// RV32I's standard integer calling convention: `a0`-`a7` (`x10`-`x17`)
/// arguments, `a0` return, `s0`-`s11` (`x8`-`x9`, `x18`-`x27`) callee-saved,
/// `t0`-`t6`/`a0`-`a7`/`ra` caller-saved. Linux RISC-V syscalls pass the
/// syscall number in `a7` and up to six arguments in `a0`-`a5`.
pub const RV32_STANDARD: CallConv = CallConv {
    arg_regs: &[10, 11, 12, 13, 14, 15, 16, 17],
    return_reg: 10,
    callee_saved: &[9, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27],
    caller_saved: &[1, 5, 6, 7, 10, 11, 12, 13, 14, 15, 16, 17, 28, 29, 30, 31],
    syscall_regs: &[17, 10, 11, 12, 13, 14, 15],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arm32_first_arg_is_r0() {
        assert_eq!(ARM32_AAPCS.arg_reg(0), Some(0));
        assert!(ARM32_AAPCS.is_callee_saved(4));
        assert!(ARM32_AAPCS.is_caller_saved(0));
    }

    #[test]
    fn rv32_first_arg_is_a0() {
        assert_eq!(RV32_STANDARD.arg_reg(0), Some(10));
        assert!(RV32_STANDARD.is_callee_saved(9));
        assert!(RV32_STANDARD.is_caller_saved(10));
    }
}
