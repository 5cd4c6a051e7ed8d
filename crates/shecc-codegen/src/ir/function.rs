//! `Function`: the per-function IR container.
//!
//! Plays the role of `cranelift_codegen::ir::Function` (which bundles a
//! `DataFlowGraph` and a `Layout`): one struct owns every `VarData`,
//! `InstructionData` and `BlockData` for a single function, and all other
//! entities (`Var`, `Inst`, `Block`) are indices into it. Nothing here is
//! ever individually freed; the whole `Function` is dropped at the end of
//! compiling its owner.

use crate::ir::entities::{Block, Func, Inst, Var};
use crate::ir::instructions::{InstructionData, Opcode};
use crate::source_loc::SourceLoc;
use shecc_entity::{PackedOption, PrimaryMap, SecondaryMap};
use std::collections::HashMap;

/// One of the three successor-edge kinds spec.md §3 defines on a basic
/// block: unconditional fall-through, or the two sides of a conditional
/// branch.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EdgeKind {
    Next,
    Then,
    Else,
}

/// Per-variable data (`var_t` in spec.md §3).
#[derive(Clone, Debug)]
pub struct VarData {
    pub name: String,
    pub type_name: String,
    pub ptr_depth: u32,
    pub array_size: Option<u32>,
    /// Offset relative to the stack frame (locals) or struct (members).
    pub offset: i32,
    pub is_global: bool,
    /// Holds a function pointer value rather than a plain scalar.
    pub is_func: bool,
    /// Liveness-extension markers for the allocator (spec.md §3/§4.4): a
    /// value materializing a logical `&&`/`||` result or a ternary result
    /// must not be eliminated even with no apparent further use, since it
    /// feeds a diagnostic/merge point.
    pub is_logical_ret: bool,
    pub is_ternary_ret: bool,

    // --- SSA fields, populated by `crate::ssa` ---
    /// Subscript assigned during renaming (`0` before SSA construction).
    pub subscript: u32,
    /// The pre-SSA variable this one was renamed from. `None` for the
    /// pre-SSA root itself.
    pub base: PackedOption<Var>,

    // --- liveness fields, populated by `crate::regalloc::liveness` ---
    pub live_start: u32,
    pub live_end: u32,

    // --- allocation result, populated by `crate::regalloc` ---
    pub location: Location,
}

/// Where a variable ended up after register allocation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Location {
    Unassigned,
    Reg(crate::isa::RegUnit),
    /// Byte offset of a spill slot within the function's frame.
    Stack(i32),
}

impl VarData {
    /// A fresh local/parameter/global variable, not yet SSA-renamed or
    /// allocated.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            ptr_depth: 0,
            array_size: None,
            offset: 0,
            is_global: false,
            is_func: false,
            is_logical_ret: false,
            is_ternary_ret: false,
            subscript: 0,
            base: PackedOption::default(),
            live_start: 0,
            live_end: 0,
            location: Location::Unassigned,
        }
    }

    /// The pre-SSA root of this variable (itself, if it has none).
    pub fn root(&self, self_ref: Var) -> Var {
        self.base.expand().unwrap_or(self_ref)
    }
}

/// Per-block data (`basic_block_t` in spec.md §3, minus the dominator/
/// liveness-summary fields, which live in `crate::dominator_tree` and
/// `crate::regalloc::liveness` as `SecondaryMap<Block, _>`s the same way
/// `cranelift_codegen::dominator_tree::DominatorTree` keeps dominator info
/// out of `Ebb` itself).
#[derive(Clone, Debug, Default)]
pub struct BlockData {
    pub label: String,
    /// Instructions in program order. A `Vec` replaces spec.md §3's
    /// intrusive doubly-linked list: peephole deletion becomes `Vec::remove`
    /// rather than unlinking a node, with identical observable behavior.
    pub insts: Vec<Inst>,
    pub next: Option<Block>,
    pub then_block: Option<Block>,
    pub else_block: Option<Block>,
    /// Predecessors, each tagged with the edge kind that leads in.
    pub preds: Vec<(Block, EdgeKind)>,
    pub sealed: bool,
}

impl BlockData {
    /// Remove `inst` from this block's instruction list without freeing it
    /// (spec.md §3's "peephole deletion ... unlinks instructions ... without
    /// freeing them" — `InstructionData` stays live in the function's
    /// `insts` arena, simply unreferenced by any block).
    pub fn remove_inst(&mut self, inst: Inst) {
        self.insts.retain(|&i| i != inst);
    }
}

/// A single function's IR: its variables, instructions, and blocks.
pub struct Function {
    pub name: String,
    pub vars: PrimaryMap<Var, VarData>,
    pub insts: PrimaryMap<Inst, InstructionData>,
    pub blocks: PrimaryMap<Block, BlockData>,
    pub srclocs: SecondaryMap<Inst, SourceLoc>,
    pub entry: Option<Block>,
    pub exit: Option<Block>,
    pub params: Vec<Var>,
    pub is_variadic: bool,
    /// Compiler-synthesized functions (the implicit global initializer,
    /// `__syscall`) skip ordinary user-level verification.
    pub is_builtin: bool,
    /// Bytes reserved for this function's stack frame, rounded up to 8-byte
    /// alignment once register allocation finishes (spec.md §4.5).
    pub frame_size: u32,
    /// Fast name → `Var` lookup within this function's locals, mirroring
    /// the bounded locals table of spec.md §3's `block_t`.
    name_index: HashMap<String, Var>,
}

impl Function {
    /// An empty function ready to be filled in by the parser/IR builder.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vars: PrimaryMap::new(),
            insts: PrimaryMap::new(),
            blocks: PrimaryMap::new(),
            srclocs: SecondaryMap::new(),
            entry: None,
            exit: None,
            params: Vec::new(),
            is_variadic: false,
            is_builtin: false,
            frame_size: 0,
            name_index: HashMap::new(),
        }
    }

    /// Allocate a new block with an auto-generated label (`L<n>`).
    pub fn make_block(&mut self) -> Block {
        let n = self.blocks.len();
        self.blocks.push(BlockData {
            label: format!("L{}", n),
            ..BlockData::default()
        })
    }

    /// Declare a new variable, registering it in the name table used for
    /// plain-identifier lookup during parsing. Shadowing an existing name in
    /// the same function replaces the lookup entry, matching spec.md §9's
    /// open question that some shadowing patterns the C standard forbids
    /// are still observed rather than rejected.
    pub fn make_var(&mut self, data: VarData) -> Var {
        let name = data.name.clone();
        let v = self.vars.push(data);
        self.name_index.insert(name, v);
        v
    }

    /// Look up a variable by its surface-syntax name.
    pub fn lookup_var(&self, name: &str) -> Option<Var> {
        self.name_index.get(name).copied()
    }

    /// Append `data` to `block`'s instruction list, returning its `Inst`.
    pub fn push_inst(&mut self, block: Block, data: InstructionData) -> Inst {
        let inst = self.insts.push(data);
        self.blocks[block].insts.push(inst);
        inst
    }

    /// Total number of blocks currently allocated.
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Iterate blocks in their allocation order (not necessarily a valid
    /// linearization — see `crate::flatten` for that).
    pub fn block_keys(&self) -> shecc_entity::Keys<Block> {
        self.blocks.keys()
    }

    /// Does `inst` terminate its block?
    pub fn is_terminator(&self, inst: Inst) -> bool {
        self.insts[inst].opcode.is_terminator()
    }
}

/// A function's declaration-level metadata, keyed in the module's `FUNCS`
/// table (spec.md §3).
pub struct FuncData {
    pub name: String,
    pub return_type: String,
    pub param_types: Vec<String>,
    pub is_variadic: bool,
    pub is_builtin: bool,
    pub func_ref: Func,
}
