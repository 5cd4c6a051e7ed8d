//! CFG flattening: pick the linear block order `binemit` emits in
//! (spec.md §4.6: "topological emission order").
//!
//! A reverse post-order walk of the CFG is used, the same linearization
//! `crate::dominator_tree` computes for its own dataflow iteration. RPO has
//! the property this pass needs without any extra heuristic: every forward
//! edge goes from an earlier block to a later one, so a loop's back edge
//! (body's last block jumping up to the header) is the only backward jump
//! in the whole function, letting the loop body itself fall straight
//! through rather than needing an explicit jump at every iteration.

use crate::flowgraph::ControlFlowGraph;
use crate::ir::{Block, Function};
use std::collections::HashSet;

/// Compute the block emission order for `func`.
pub fn linearize(func: &Function, cfg: &ControlFlowGraph) -> Vec<Block> {
    let entry = match func.entry {
        Some(e) => e,
        None => return Vec::new(),
    };

    let mut visited = HashSet::new();
    let mut post = Vec::new();
    let mut stack = vec![(entry, 0usize)];
    visited.insert(entry);

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

    // Any block unreachable from entry (spec.md §3 invariant 1 says these
    // are either reachable or explicitly pruned; pruned ones simply never
    // appear here) is dropped rather than emitted dead.
    post
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Function;

    #[test]
    fn loop_back_edge_is_the_only_backward_jump() {
        let mut f = Function::new("t");
        let entry = f.make_block();
        let header = f.make_block();
        let body = f.make_block();
        let exit = f.make_block();
        f.entry = Some(entry);
        f.blocks[entry].next = Some(header);
        f.blocks[header].then_block = Some(body);
        f.blocks[header].else_block = Some(exit);
        f.blocks[body].next = Some(header); // back edge

        let cfg = ControlFlowGraph::with_function(&f);
        let order = linearize(&f, &cfg);
        let pos = |b: crate::ir::Block| order.iter().position(|&x| x == b).unwrap();

        assert!(pos(entry) < pos(header));
        assert!(pos(header) < pos(body));
        // The back edge body -> header is the sole place a successor
        // appears earlier than its predecessor in the order.
        assert!(pos(body) > pos(header));
    }
}
