//! A cursor for appending instructions to a function, modeled on
//! `cranelift_codegen::cursor::FuncCursor`.

use crate::ir::{Block, Function, Inst, InstructionData};

/// Tracks a current position (a block) inside a `Function` and provides
/// append-only insertion. `shecc-frontend`'s parser builds on top of this
/// the way `cranelift_frontend::FunctionBuilder` builds on `FuncCursor`.
pub struct FuncCursor<'f> {
    pub func: &'f mut Function,
    block: Option<Block>,
}

impl<'f> FuncCursor<'f> {
    /// Create a cursor over `func` with no current block.
    pub fn new(func: &'f mut Function) -> Self {
        Self { func, block: None }
    }

    /// Move the cursor to `block`; subsequent `append` calls insert there.
    pub fn goto(&mut self, block: Block) -> &mut Self {
        self.block = Some(block);
        self
    }

    /// The block the cursor currently points at, if any.
    pub fn current_block(&self) -> Option<Block> {
        self.block
    }

    /// Append an instruction to the current block.
    ///
    /// # Panics
    /// Panics if the cursor has no current block, or if the current block
    /// has already been terminated (mirrors the `FunctionBuilder` debug
    /// assertions cited in SPEC_FULL.md §4.3: inserting after a terminator
    /// is a builder misuse, not a recoverable error).
    pub fn append(&mut self, data: InstructionData) -> Inst {
        let block = self.block.expect("FuncCursor has no current block");
        if let Some(&last) = self.func.blocks[block].insts.last() {
            debug_assert!(
                !self.func.is_terminator(last),
                "cannot append after a block terminator"
            );
        }
        self.func.push_inst(block, data)
    }
}
