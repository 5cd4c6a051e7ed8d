//! Opaque entity references used inside a [`crate::ir::Function`].
//!
//! Mirrors `cranelift-codegen::ir::entities`: every reference is a thin
//! `Copy` wrapper around a `u32` index into a table owned by the enclosing
//! `Function`, never a pointer. See spec.md §9's note on cyclic pointer
//! graphs being modeled as arena-owned records identified by typed indices.

use shecc_entity::entity_impl;
use std::fmt;

/// A reference to a variable (`var_t` in spec.md §3): a local, a parameter,
/// or a global. Pre- and post-SSA-renaming variables share this same type;
/// a renamed variable's `base` field (see [`crate::ir::VarData`]) points back
/// at the pre-SSA root.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(u32);
entity_impl!(Var, "v");

/// A reference to an instruction (`insn_t` in spec.md §3).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inst(u32);
entity_impl!(Inst, "i");

/// A reference to a basic block (`basic_block_t` in spec.md §3).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// A reference to a named type (`TYPES` table in spec.md §3).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ty(u32);
entity_impl!(Ty, "ty");

/// A reference to a function (`func_t` in spec.md §3, `FUNCS` table).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Func(u32);
entity_impl!(Func, "fn");

/// Any of the entities above, used for diagnostics that can be anchored at
/// more than one kind of entity.
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum AnyEntity {
    /// The whole function.
    Function,
    /// A variable.
    Var(Var),
    /// An instruction.
    Inst(Inst),
    /// A basic block.
    Block(Block),
}

impl fmt::Display for AnyEntity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            AnyEntity::Function => write!(f, "function"),
            AnyEntity::Var(v) => v.fmt(f),
            AnyEntity::Inst(i) => i.fmt(f),
            AnyEntity::Block(b) => b.fmt(f),
        }
    }
}
