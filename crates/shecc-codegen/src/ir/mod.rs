//! Three-address intermediate representation.

pub mod entities;
pub mod function;
pub mod instructions;
pub mod types;

pub use entities::{AnyEntity, Block, Func, Inst, Ty, Var};
pub use function::{BlockData, EdgeKind, FuncData, Function, Location, VarData};
pub use instructions::{InstructionData, Opcode};
pub use types::{BaseKind, Field, TypeData, WORD_SIZE};
