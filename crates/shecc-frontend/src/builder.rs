//! IR-emitting builder for the parser.
//!
//! Modeled on `cranelift_frontend::FunctionBuilder`/`FunctionBuilderContext`:
//! a thin wrapper around `&mut ir::Function` that tracks the current
//! insertion block and wires up `Then`/`Else`/`Next` successor edges
//! automatically whenever a branch or jump is emitted, the same contract
//! `FuncInstBuilder::build` gives Cranelift's own front ends. Unlike
//! `cranelift_frontend`, there is no embedded SSA builder here — the parser
//! emits plain imperative IR (each local variable is one `Var`, reassigned
//! in place by `Assign`), and `shecc_codegen::ssa::construct` turns that
//! into SSA form as a later, separate pass over the finished function.

use shecc_codegen::ir::{Block, EdgeKind, Function, Inst, InstructionData, Opcode, Var, VarData};
use std::collections::HashMap;

/// Scratch state reusable across many `FunctionBuilder`s, so the parser
/// doesn't reallocate a scope stack for every function it compiles.
#[derive(Default)]
pub struct FunctionBuilderContext {
    scopes: Vec<HashMap<String, Var>>,
    temp_counter: u32,
}

impl FunctionBuilderContext {
    /// A fresh, empty context.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Builds one function's IR, one block at a time.
pub struct FunctionBuilder<'f> {
    /// The function under construction.
    pub func: &'f mut Function,
    ctx: &'f mut FunctionBuilderContext,
    pos: Option<Block>,
}

impl<'f> FunctionBuilder<'f> {
    /// Start building into `func`, reusing `ctx`'s scratch state.
    ///
    /// `ctx`'s scope stack and temporary counter are reset first so state
    /// from a previously built function never leaks into this one.
    pub fn new(func: &'f mut Function, ctx: &'f mut FunctionBuilderContext) -> Self {
        ctx.scopes.clear();
        ctx.scopes.push(HashMap::new());
        ctx.temp_counter = 0;
        Self { func, ctx, pos: None }
    }

    // --- blocks ---

    /// Allocate a new, empty block. Does not switch the insertion point.
    pub fn create_block(&mut self) -> Block {
        self.func.make_block()
    }

    /// Direct further instruction emission into `block`.
    pub fn switch_to_block(&mut self, block: Block) {
        self.pos = Some(block);
    }

    /// The block currently being appended to.
    pub fn current_block(&self) -> Block {
        self.pos.expect("switch_to_block must be called before emitting instructions")
    }

    /// Mark `block` as having all its predecessors wired up. Unused by the
    /// (whole-function, not incremental) SSA pass today, but kept for
    /// parity with the builder shape this is modeled on.
    pub fn seal_block(&mut self, block: Block) {
        self.func.blocks[block].sealed = true;
    }

    // --- lexical scoping ---

    /// Enter a nested lexical scope (a `{ ... }` block in the source).
    pub fn push_scope(&mut self) {
        self.ctx.scopes.push(HashMap::new());
    }

    /// Leave the innermost lexical scope, dropping its local bindings.
    pub fn pop_scope(&mut self) {
        self.ctx.scopes.pop();
        debug_assert!(!self.ctx.scopes.is_empty(), "popped the function's outermost scope");
    }

    /// Declare `name` as a new local in the innermost scope, shadowing any
    /// outer binding of the same name.
    pub fn declare_var(&mut self, name: &str, type_name: &str) -> Var {
        let v = self.func.make_var(VarData::new(name, type_name));
        self.ctx
            .scopes
            .last_mut()
            .expect("at least one scope is always active")
            .insert(name.to_string(), v);
        v
    }

    /// Resolve an identifier to the variable it currently refers to,
    /// searching from the innermost scope outward.
    pub fn resolve_var(&self, name: &str) -> Option<Var> {
        self.ctx
            .scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .copied()
    }

    /// A fresh compiler-generated temporary (an intermediate expression
    /// result with no source-level name).
    pub fn declare_temp(&mut self, type_name: &str) -> Var {
        self.ctx.temp_counter += 1;
        let name = format!("%t{}", self.ctx.temp_counter);
        self.func.make_var(VarData::new(name, type_name))
    }

    // --- successor wiring ---

    fn connect(&mut self, from: Block, to: Block, kind: EdgeKind) {
        match kind {
            EdgeKind::Next => self.func.blocks[from].next = Some(to),
            EdgeKind::Then => self.func.blocks[from].then_block = Some(to),
            EdgeKind::Else => self.func.blocks[from].else_block = Some(to),
        }
        self.func.blocks[to].preds.push((from, kind));
    }

    fn emit(&mut self, data: InstructionData) -> Inst {
        let block = self.current_block();
        self.func.push_inst(block, data)
    }

    // --- instruction emission ---

    /// `dst = <imm>`.
    pub fn load_constant(&mut self, type_name: &str, imm: i64) -> Var {
        let dst = self.declare_temp(type_name);
        let mut data = InstructionData::new(Opcode::LoadConstant);
        data.dst = Some(dst);
        data.imm = imm;
        self.emit(data);
        dst
    }

    /// `dst = &<label>` — the address of a `.rodata`/`.data` symbol (a
    /// string literal or a global), as opposed to [`FunctionBuilder::unary`]
    /// with `Opcode::AddressOf`, which takes the address of a stack-resident
    /// local.
    pub fn load_data_address(&mut self, type_name: &str, label: &str) -> Var {
        let dst = self.declare_temp(type_name);
        let mut data = InstructionData::new(Opcode::LoadDataAddress);
        data.dst = Some(dst);
        data.label = Some(label.to_string());
        self.emit(data);
        dst
    }

    /// `dst = lhs <op> rhs`.
    pub fn binary(&mut self, op: Opcode, type_name: &str, lhs: Var, rhs: Var) -> Var {
        let dst = self.declare_temp(type_name);
        let mut data = InstructionData::new(op);
        data.dst = Some(dst);
        data.src0 = Some(lhs);
        data.src1 = Some(rhs);
        self.emit(data);
        dst
    }

    /// `dst = <op> src` (negate, bitwise/logical not, address-of).
    pub fn unary(&mut self, op: Opcode, type_name: &str, src: Var) -> Var {
        let dst = self.declare_temp(type_name);
        let mut data = InstructionData::new(op);
        data.dst = Some(dst);
        data.src0 = Some(src);
        self.emit(data);
        dst
    }

    /// `dst = src`.
    pub fn assign(&mut self, dst: Var, src: Var) -> Inst {
        let mut data = InstructionData::new(Opcode::Assign);
        data.dst = Some(dst);
        data.src0 = Some(src);
        self.emit(data)
    }

    /// `dst = *addr` (load of `size` bytes through `addr`).
    pub fn read(&mut self, type_name: &str, addr: Var, size: u32) -> Var {
        let dst = self.declare_temp(type_name);
        let mut data = InstructionData::new(Opcode::Read);
        data.dst = Some(dst);
        data.src0 = Some(addr);
        data.size = size;
        self.emit(data);
        dst
    }

    /// `*addr = value` (store of `size` bytes).
    pub fn write(&mut self, addr: Var, value: Var, size: u32) -> Inst {
        let mut data = InstructionData::new(Opcode::Write);
        data.src0 = Some(addr);
        data.src1 = Some(value);
        data.size = size;
        self.emit(data)
    }

    /// Reserve a local stack slot of `size` bytes (a local array, or a
    /// register-allocator spill slot).
    pub fn allocat(&mut self, type_name: &str, size: u32) -> Var {
        let dst = self.declare_temp(type_name);
        self.allocat_named(dst, size);
        dst
    }

    /// Like [`Self::allocat`], but reserve the slot for an already-declared
    /// variable (a named local array, as opposed to a compiler-introduced
    /// temporary) instead of minting a fresh one.
    pub fn allocat_named(&mut self, dst: Var, size: u32) {
        let mut data = InstructionData::new(Opcode::Allocat);
        data.dst = Some(dst);
        data.size = size;
        self.emit(data);
    }

    /// Push one outgoing call argument; `remaining` is the number of
    /// arguments left to push after this one, stashed in `size` so the
    /// allocator knows how much further to extend `var`'s liveness.
    pub fn push_arg(&mut self, var: Var, remaining: u32) -> Inst {
        let mut data = InstructionData::new(Opcode::Push);
        data.src0 = Some(var);
        data.size = remaining;
        self.emit(data)
    }

    /// A direct call to `callee`.
    pub fn call(&mut self, callee: &str) -> Inst {
        let mut data = InstructionData::new(Opcode::Call);
        data.label = Some(callee.to_string());
        self.emit(data)
    }

    /// An indirect call through a function-pointer variable.
    pub fn call_indirect(&mut self, func_ptr: Var) -> Inst {
        let mut data = InstructionData::new(Opcode::Indirect);
        data.src0 = Some(func_ptr);
        self.emit(data)
    }

    /// Capture the return value of the call instruction just emitted.
    pub fn func_ret(&mut self, type_name: &str) -> Var {
        let dst = self.declare_temp(type_name);
        let mut data = InstructionData::new(Opcode::FuncRet);
        data.dst = Some(dst);
        self.emit(data);
        dst
    }

    /// Unconditional jump (or fall-through) from the current block to
    /// `target`, wiring the `Next` successor edge.
    pub fn jump(&mut self, target: Block) -> Inst {
        let from = self.current_block();
        self.connect(from, target, EdgeKind::Next);
        let mut data = InstructionData::new(Opcode::Jump);
        data.then_block = Some(target);
        self.emit(data)
    }

    /// Record straight-line fall-through into `target` with no explicit
    /// jump instruction (the block simply ends and execution continues).
    pub fn fallthrough(&mut self, target: Block) {
        let from = self.current_block();
        self.connect(from, target, EdgeKind::Next);
    }

    /// Conditional branch: `then_blk` if `cond` is non-zero, `else_blk`
    /// otherwise. Wires both successor edges.
    pub fn branch(&mut self, cond: Var, then_blk: Block, else_blk: Block) -> Inst {
        let from = self.current_block();
        self.connect(from, then_blk, EdgeKind::Then);
        self.connect(from, else_blk, EdgeKind::Else);
        let mut data = InstructionData::new(Opcode::Branch);
        data.src0 = Some(cond);
        data.then_block = Some(then_blk);
        data.else_block = Some(else_blk);
        self.emit(data)
    }

    /// Return, optionally with a value.
    pub fn return_(&mut self, value: Option<Var>) -> Inst {
        let mut data = InstructionData::new(Opcode::Return);
        data.src0 = value;
        self.emit(data)
    }

    /// A bare label marker (function entry point naming).
    pub fn label(&mut self, name: &str) -> Inst {
        let mut data = InstructionData::new(Opcode::Label);
        data.label = Some(name.to_string());
        self.emit(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shecc_codegen::ir::Function;

    #[test]
    fn emits_a_constant_return() {
        let mut func = Function::new("f");
        let mut ctx = FunctionBuilderContext::new();
        let entry;
        {
            let mut b = FunctionBuilder::new(&mut func, &mut ctx);
            entry = b.create_block();
            b.switch_to_block(entry);
            let c = b.load_constant("int", 42);
            b.return_(Some(c));
        }
        func.entry = Some(entry);
        func.exit = Some(entry);

        assert_eq!(func.blocks[entry].insts.len(), 2);
        assert!(func.is_terminator(*func.blocks[entry].insts.last().unwrap()));
    }

    #[test]
    fn branch_wires_both_successor_edges() {
        let mut func = Function::new("f");
        let mut ctx = FunctionBuilderContext::new();
        let mut b = FunctionBuilder::new(&mut func, &mut ctx);
        let entry = b.create_block();
        let then_blk = b.create_block();
        let else_blk = b.create_block();
        b.switch_to_block(entry);
        let cond = b.load_constant("int", 1);
        b.branch(cond, then_blk, else_blk);

        assert_eq!(func.blocks[entry].then_block, Some(then_blk));
        assert_eq!(func.blocks[entry].else_block, Some(else_blk));
        assert_eq!(func.blocks[then_blk].preds, vec![(entry, EdgeKind::Then)]);
        assert_eq!(func.blocks[else_blk].preds, vec![(entry, EdgeKind::Else)]);
    }

    #[test]
    fn nested_scopes_shadow_and_unwind() {
        let mut func = Function::new("f");
        let mut ctx = FunctionBuilderContext::new();
        let mut b = FunctionBuilder::new(&mut func, &mut ctx);
        let outer = b.declare_var("x", "int");
        b.push_scope();
        let inner = b.declare_var("x", "int");
        assert_eq!(b.resolve_var("x"), Some(inner));
        b.pop_scope();
        assert_eq!(b.resolve_var("x"), Some(outer));
    }
}
