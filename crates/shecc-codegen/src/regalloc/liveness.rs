//! Liveness analysis (spec.md §4.5): per-block `use`/`def` sets, iterated
//! to a `live_in`/`live_out` fixed point, then collapsed to one
//! `[live_start, live_end]` instruction-index interval per variable.
//!
//! Grounded on `cranelift_codegen::regalloc::liveness`'s role in that
//! crate's allocator (computing live ranges ahead of `regalloc::coloring`),
//! though that module's own source fell outside the retrieved pack; the
//! dataflow equations here are the standard ones spec.md §4.5 states
//! directly: `live_in = use ∪ (live_out \ def)`, `live_out = ⋃
//! live_in(successors)`.

use crate::flatten;
use crate::flowgraph::ControlFlowGraph;
use crate::ir::{Block, Function, Opcode, Var};
use std::collections::{HashMap, HashSet};

/// Per-block use/def sets and the fixed-point live-in/live-out result.
pub struct Liveness {
    live_in: HashMap<Block, HashSet<Var>>,
    live_out: HashMap<Block, HashSet<Var>>,
}

impl Liveness {
    /// Variables live at the start of `block` (empty for a block this
    /// function never recorded, e.g. one unreachable from entry).
    pub fn live_in(&self, block: Block) -> HashSet<Var> {
        self.live_in.get(&block).cloned().unwrap_or_default()
    }

    /// Variables live at the end of `block`.
    pub fn live_out(&self, block: Block) -> HashSet<Var> {
        self.live_out.get(&block).cloned().unwrap_or_default()
    }
}

fn block_use_def(func: &Function, block: Block) -> (HashSet<Var>, HashSet<Var>) {
    let mut use_set = HashSet::new();
    let mut def_set = HashSet::new();
    for &inst in &func.blocks[block].insts {
        let data = &func.insts[inst];
        for used in data.uses() {
            if !def_set.contains(&used) {
                use_set.insert(used);
            }
        }
        if let Some(dst) = data.dst {
            def_set.insert(dst);
        }
    }
    (use_set, def_set)
}

/// Run the fixed-point liveness dataflow over `func`.
pub fn analyze(func: &Function, cfg: &ControlFlowGraph) -> Liveness {
    let blocks: Vec<Block> = func.block_keys().collect();
    let mut use_of = HashMap::new();
    let mut def_of = HashMap::new();
    for &b in &blocks {
        let (u, d) = block_use_def(func, b);
        use_of.insert(b, u);
        def_of.insert(b, d);
    }

    let mut live_in: HashMap<Block, HashSet<Var>> = blocks.iter().map(|&b| (b, HashSet::new())).collect();
    let mut live_out: HashMap<Block, HashSet<Var>> = blocks.iter().map(|&b| (b, HashSet::new())).collect();

    // Parameters are live-in at entry (spec.md §4.5).
    if let Some(entry) = func.entry {
        live_in.entry(entry).or_default().extend(func.params.iter().copied());
    }

    let mut changed = true;
    while changed {
        changed = false;
        for &b in blocks.iter().rev() {
            let mut out = HashSet::new();
            for &(succ, _) in cfg.succs(b) {
                out.extend(live_in[&succ].iter().copied());
            }
            if out != live_out[&b] {
                live_out.insert(b, out.clone());
                changed = true;
            }

            let mut new_in = use_of[&b].clone();
            for v in &out {
                if !def_of[&b].contains(v) {
                    new_in.insert(*v);
                }
            }
            if new_in != live_in[&b] {
                live_in.insert(b, new_in);
                changed = true;
            }
        }
    }

    Liveness { live_in, live_out }
}

/// Collapse per-block liveness into one `[start, end]` instruction-index
/// interval per variable, writing the result into `VarData::live_start`/
/// `live_end`. Instructions are numbered by their position in
/// `crate::flatten::linearize`'s order, spec.md §4.5's "single
/// linearization (reverse post-order over the CFG)".
///
/// `push`'s source operand has its live range extended by the number of
/// remaining arguments (spec.md §4.5: "`push` instructions extend the
/// source operand's liveness by the number of remaining arguments").
pub fn assign_intervals(func: &mut Function, cfg: &ControlFlowGraph, liveness: &Liveness) {
    let order = flatten::linearize(func, cfg);
    let mut index_of = HashMap::new();
    let mut idx = 0u32;
    for &block in &order {
        for &inst in &func.blocks[block].insts {
            index_of.insert(inst, idx);
            idx += 1;
        }
    }
    let last_index = idx.saturating_sub(1);

    let mut bounds: HashMap<Var, (u32, u32)> = HashMap::new();
    let mut touch = |bounds: &mut HashMap<Var, (u32, u32)>, v: Var, at: u32| {
        let entry = bounds.entry(v).or_insert((at, at));
        entry.0 = entry.0.min(at);
        entry.1 = entry.1.max(at);
    };

    for &block in &order {
        for v in liveness.live_in(block) {
            if let Some(&first) = func.blocks[block].insts.first() {
                touch(&mut bounds, v, index_of[&first]);
            }
        }
        for v in liveness.live_out(block) {
            if let Some(&last) = func.blocks[block].insts.last() {
                touch(&mut bounds, v, index_of[&last]);
            }
        }
        let mut pending_push_extension: Vec<(Var, u32)> = Vec::new();
        for &inst in &func.blocks[block].insts {
            let at = index_of[&inst];
            let data = &func.insts[inst];
            if let Some(dst) = data.dst {
                touch(&mut bounds, dst, at);
            }
            for used in data.uses() {
                touch(&mut bounds, used, at);
            }
            if data.opcode == Opcode::Push {
                if let Some(src) = data.src0 {
                    pending_push_extension.push((src, data.size));
                }
            }
        }
        for (v, remaining_args) in pending_push_extension {
            let extended = bounds
                .get(&v)
                .map(|&(_, end)| end + remaining_args)
                .unwrap_or(last_index)
                .min(last_index);
            touch(&mut bounds, v, extended);
        }
    }

    for (v, (start, end)) in bounds {
        func.vars[v].live_start = start;
        func.vars[v].live_end = end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{InstructionData, VarData};

    #[test]
    fn value_defined_and_used_across_a_branch_stays_live() {
        let mut f = Function::new("t");
        let entry = f.make_block();
        let then_b = f.make_block();
        let merge = f.make_block();
        f.entry = Some(entry);
        f.blocks[entry].then_block = Some(then_b);
        f.blocks[entry].else_block = Some(merge);
        f.blocks[then_b].next = Some(merge);

        let x = f.make_var(VarData::new("x", "int"));
        let mut def = InstructionData::new(Opcode::LoadConstant);
        def.dst = Some(x);
        def.imm = 1;
        f.push_inst(entry, def);

        let y = f.make_var(VarData::new("y", "int"));
        let mut use_inst = InstructionData::new(Opcode::Assign);
        use_inst.dst = Some(y);
        use_inst.src0 = Some(x);
        f.push_inst(merge, use_inst);

        let cfg = ControlFlowGraph::with_function(&f);
        let liveness = analyze(&f, &cfg);
        assert!(liveness.live_out(entry).contains(&x));
        assert!(liveness.live_in(merge).contains(&x));
    }
}
