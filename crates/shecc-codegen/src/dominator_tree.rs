//! Dominator tree and dominance frontiers (spec.md §4.4 steps 1–2).
//!
//! Computed with the standard Cooper/Harvey/Kennedy iterative data-flow
//! algorithm over reverse post-order, the same approach
//! `cranelift-codegen`'s `dominator_tree` module implements (referenced from
//! `regalloc/context.rs`'s `use crate::dominator_tree::DominatorTree`, though
//! the module itself fell outside the retrieved example set).

use crate::flowgraph::ControlFlowGraph;
use crate::ir::{Block, Function};
use shecc_entity::SecondaryMap;
use std::collections::HashMap;

/// Dominator tree plus dominance frontiers for one function.
#[derive(Default)]
pub struct DominatorTree {
    idom: SecondaryMap<Block, Option<Block>>,
    frontier: SecondaryMap<Block, Vec<Block>>,
    rpo: Vec<Block>,
    valid: bool,
}

fn reverse_postorder(entry: Block, cfg: &ControlFlowGraph) -> Vec<Block> {
    let mut order = Vec::new();
    let mut visited = std::collections::HashSet::new();
    let mut stack = vec![(entry, 0usize)];
    visited.insert(entry);
    // Iterative post-order DFS, then reverse.
    let mut post = Vec::new();
    while let Some(&mut (block, ref mut i)) = stack.last_mut() {
        let succs = cfg.succs(block);
        if *i < succs.len() {
            let (succ, _) = succs[*i];
            *i += 1;
            if visited.insert(succ) {
                stack.push((succ, 0));
            }
        } else {
            post.push(block);
            stack.pop();
        }
    }
    post.reverse();
    order.extend(post);
    order
}

impl DominatorTree {
    /// An empty, invalid dominator tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Is this up to date for the function/CFG it was last computed from?
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Compute dominators and dominance frontiers for `func`, given its CFG.
    pub fn compute(&mut self, func: &Function, cfg: &ControlFlowGraph) {
        self.idom.clear();
        self.frontier.clear();
        self.valid = false;

        let entry = match func.entry {
            Some(e) => e,
            None => return,
        };

        let rpo = reverse_postorder(entry, cfg);
        let rpo_index: HashMap<Block, usize> =
            rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect();

        self.idom[entry] = Some(entry);

        let mut changed = true;
        while changed {
            changed = false;
            for &block in rpo.iter().skip(1) {
                let mut new_idom: Option<Block> = None;
                for &(pred, _) in cfg.preds(block) {
                    if self.idom[pred].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(cur) => intersect(cur, pred, &self.idom, &rpo_index),
                    });
                }
                if self.idom[block] != new_idom {
                    self.idom[block] = new_idom;
                    changed = true;
                }
            }
        }
        // Entry dominates itself and nothing dominates it further.
        self.idom[entry] = None;

        // Dominance frontiers: for each block with >=2 predecessors, walk
        // each predecessor up to (but not including) the block's idom,
        // adding the block to every frontier along the way.
        for &block in &rpo {
            let preds = cfg.preds(block);
            if preds.len() < 2 {
                continue;
            }
            let idom_block = self.idom[block];
            for &(pred, _) in preds {
                let mut runner = pred;
                while Some(runner) != idom_block {
                    if !self.frontier[runner].contains(&block) {
                        self.frontier[runner].push(block);
                    }
                    match self.idom[runner] {
                        Some(next) => runner = next,
                        None => break,
                    }
                }
            }
        }

        self.rpo = rpo;
        self.valid = true;
    }

    /// The immediate dominator of `block`, or `None` for the entry block.
    pub fn idom(&self, block: Block) -> Option<Block> {
        self.idom.get(block)
    }

    /// Does `a` dominate `b`?
    pub fn dominates(&self, a: Block, b: Block) -> bool {
        if a == b {
            return true;
        }
        let mut cur = b;
        while let Some(next) = self.idom.get(cur) {
            if next == a {
                return true;
            }
            cur = next;
        }
        false
    }

    /// Dominance frontier of `block`.
    pub fn frontier(&self, block: Block) -> &[Block] {
        self.frontier.get(block)
    }

    /// Blocks in reverse post-order, the linearization spec.md §4.5 uses for
    /// liveness interval ordering.
    pub fn reverse_postorder(&self) -> &[Block] {
        &self.rpo
    }
}

fn intersect(
    mut a: Block,
    mut b: Block,
    idom: &SecondaryMap<Block, Option<Block>>,
    rpo_index: &HashMap<Block, usize>,
) -> Block {
    while a != b {
        while rpo_index[&a] > rpo_index[&b] {
            a = idom[a].expect("walked off the dominator tree");
        }
        while rpo_index[&b] > rpo_index[&a] {
            b = idom[b].expect("walked off the dominator tree");
        }
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Function;

    #[test]
    fn diamond_dominators() {
        let mut f = Function::new("t");
        let entry = f.make_block();
        let then_b = f.make_block();
        let else_b = f.make_block();
        let merge = f.make_block();
        f.entry = Some(entry);
        f.blocks[entry].then_block = Some(then_b);
        f.blocks[entry].else_block = Some(else_b);
        f.blocks[then_b].next = Some(merge);
        f.blocks[else_b].next = Some(merge);

        let cfg = ControlFlowGraph::with_function(&f);
        let mut domtree = DominatorTree::new();
        domtree.compute(&f, &cfg);

        assert_eq!(domtree.idom(then_b), Some(entry));
        assert_eq!(domtree.idom(else_b), Some(entry));
        assert_eq!(domtree.idom(merge), Some(entry));
        assert!(domtree.dominates(entry, merge));
        assert!(!domtree.dominates(then_b, merge));
        assert_eq!(domtree.frontier(then_b), &[merge]);
        assert_eq!(domtree.frontier(else_b), &[merge]);
    }
}
