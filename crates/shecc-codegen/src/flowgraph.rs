//! The control-flow graph: predecessor/successor edges between basic
//! blocks, tagged `Next`/`Then`/`Else` per spec.md §3.
//!
//! The parser records each block's successors directly on `BlockData` as it
//! builds them (mirroring `cranelift_frontend`'s automatic successor wiring
//! in `FuncInstBuilder::build`). `ControlFlowGraph::compute` derives the
//! *predecessor* lists from those successor edges, the same direction
//! `cranelift_codegen::flowgraph::ControlFlowGraph` computes in: successors
//! are authoritative, predecessors are derived.

use crate::ir::{Block, EdgeKind, Function};
use shecc_entity::SecondaryMap;

/// Derived predecessor/successor view over a `Function`'s blocks.
#[derive(Default)]
pub struct ControlFlowGraph {
    preds: SecondaryMap<Block, Vec<(Block, EdgeKind)>>,
    succs: SecondaryMap<Block, Vec<(Block, EdgeKind)>>,
    valid: bool,
}

impl ControlFlowGraph {
    /// An empty, invalid CFG.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the CFG of `func` from its blocks' successor edges.
    pub fn compute(&mut self, func: &Function) {
        self.preds.clear();
        self.succs.clear();
        for block in func.block_keys() {
            let data = &func.blocks[block];
            let mut succs = Vec::new();
            if let Some(next) = data.next {
                succs.push((next, EdgeKind::Next));
            }
            if let Some(then_b) = data.then_block {
                succs.push((then_b, EdgeKind::Then));
            }
            if let Some(else_b) = data.else_block {
                succs.push((else_b, EdgeKind::Else));
            }
            for &(succ, kind) in &succs {
                self.preds[succ].push((block, kind));
            }
            self.succs[block] = succs;
        }
        self.valid = true;
    }

    /// Build a CFG for `func` in one call.
    pub fn with_function(func: &Function) -> Self {
        let mut cfg = Self::new();
        cfg.compute(func);
        cfg
    }

    /// Is `compute` up to date (has been called since the last `compute`)?
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Predecessors of `block`.
    pub fn preds(&self, block: Block) -> &[(Block, EdgeKind)] {
        self.preds.get(block)
    }

    /// Successors of `block`.
    pub fn succs(&self, block: Block) -> &[(Block, EdgeKind)] {
        self.succs.get(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Function;

    #[test]
    fn diamond() {
        let mut f = Function::new("t");
        let entry = f.make_block();
        let then_b = f.make_block();
        let else_b = f.make_block();
        let merge = f.make_block();
        f.blocks[entry].then_block = Some(then_b);
        f.blocks[entry].else_block = Some(else_b);
        f.blocks[then_b].next = Some(merge);
        f.blocks[else_b].next = Some(merge);

        let cfg = ControlFlowGraph::with_function(&f);
        assert_eq!(cfg.succs(entry).len(), 2);
        assert_eq!(cfg.preds(merge).len(), 2);
        assert_eq!(cfg.preds(entry).len(), 0);
    }
}
