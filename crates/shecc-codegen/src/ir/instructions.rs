//! The opcode set and per-instruction data (`insn_t` in spec.md §3).

use crate::ir::entities::{Block, Var};
use std::fmt;

/// Every opcode the IR can express, matching spec.md §3's opcode
/// enumeration exhaustively. `Phi` only appears between SSA construction and
/// the point CSSA-style out-of-SSA lowering removes it again during
/// register allocation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Negate,
    // Bitwise
    BitAnd,
    BitOr,
    BitXor,
    BitNot,
    Lshift,
    /// Right shift. `signed` on the instruction's result type selects
    /// arithmetic vs. logical shift; see SPEC_FULL.md's REDESIGN FLAGS
    /// (this is implemented faithfully, not downgraded to logical-only).
    Rshift,
    // Comparison
    Eq,
    Neq,
    Lt,
    Leq,
    Gt,
    Geq,
    // Logical
    LogAnd,
    LogOr,
    LogNot,
    // Memory
    Read,
    Write,
    AddressOf,
    LoadConstant,
    LoadDataAddress,
    Assign,
    /// Reserve a stack slot (`allocat` in spec.md §3) for a local array or
    /// a spill.
    Allocat,
    /// Reload a spilled operand from its frame slot into a dedicated
    /// scratch register. Never produced by the frontend; inserted by
    /// `crate::regalloc::spill_legalize` after `linear_scan` has decided
    /// which variables didn't fit in a register.
    StackLoad,
    /// Write a dedicated scratch register back to a spilled destination's
    /// frame slot. See [`Opcode::StackLoad`].
    StackStore,
    // Control
    Branch,
    Jump,
    Return,
    Label,
    // Calls
    Push,
    Call,
    Indirect,
    FuncRet,
    // Block boundaries
    BlockStart,
    BlockEnd,
    // SSA-only sentinel
    Phi,
}

impl Opcode {
    /// Does this opcode end a basic block (spec.md §3: branch/jump/return)?
    pub fn is_terminator(self) -> bool {
        matches!(self, Opcode::Branch | Opcode::Jump | Opcode::Return)
    }

    /// Is this opcode a call that clobbers caller-saved registers (spec.md
    /// §4.5's "caller-saved registers are spilled around `call` and
    /// `indirect`")?
    pub fn is_call(self) -> bool {
        matches!(self, Opcode::Call | Opcode::Indirect)
    }

    /// Does this opcode have an observable side effect that must not be
    /// eliminated or reordered across (spec.md §4.4/§4.6)?
    pub fn has_side_effects(self) -> bool {
        matches!(
            self,
            Opcode::Write
                | Opcode::Call
                | Opcode::Indirect
                | Opcode::Return
                | Opcode::Push
                | Opcode::FuncRet
                | Opcode::StackStore
        )
    }

    /// Is this a pure, foldable arithmetic/bitwise/comparison op?
    pub fn is_pure_arith(self) -> bool {
        matches!(
            self,
            Opcode::Add
                | Opcode::Sub
                | Opcode::Mul
                | Opcode::Div
                | Opcode::Mod
                | Opcode::Negate
                | Opcode::BitAnd
                | Opcode::BitOr
                | Opcode::BitXor
                | Opcode::BitNot
                | Opcode::Lshift
                | Opcode::Rshift
                | Opcode::Eq
                | Opcode::Neq
                | Opcode::Lt
                | Opcode::Leq
                | Opcode::Gt
                | Opcode::Geq
        )
    }

    /// Is this opcode commutative (relevant to peephole immediate folding)?
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            Opcode::Add | Opcode::Mul | Opcode::BitAnd | Opcode::BitOr | Opcode::BitXor | Opcode::Eq | Opcode::Neq
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The operands and size/payload fields of one instruction. Three operand
/// slots cover every opcode in spec.md §3's "up to three operands"
/// contract; opcodes that need fewer leave the rest `None`.
#[derive(Clone, Debug)]
pub struct InstructionData {
    pub opcode: Opcode,
    pub dst: Option<Var>,
    pub src0: Option<Var>,
    pub src1: Option<Var>,
    /// Byte size for `read`/`write` (1, 4, or pointer size); remaining-arg
    /// count for `push`; otherwise unused (`0`).
    pub size: u32,
    /// Callee name for direct `call`; label for `branch`/`jump`/`label`.
    pub label: Option<String>,
    /// `branch`'s `then`/`else` successors; `jump`'s single target.
    pub then_block: Option<Block>,
    pub else_block: Option<Block>,
    /// Constant payload for `load_constant`.
    pub imm: i64,
}

impl InstructionData {
    /// Build a bare instruction with no operands set, to be filled in by the
    /// caller (mirrors the incremental construction style of
    /// `cranelift_frontend::FuncInstBuilder`).
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            dst: None,
            src0: None,
            src1: None,
            size: 0,
            label: None,
            then_block: None,
            else_block: None,
            imm: 0,
        }
    }

    /// Every `Var` this instruction reads (not counting `dst`).
    pub fn uses(&self) -> impl Iterator<Item = Var> + '_ {
        self.src0.into_iter().chain(self.src1)
    }
}
