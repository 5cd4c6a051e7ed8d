//! IR consistency checker (spec.md §3's invariants, §8's "a malformed IR is
//! a compiler bug, not a diagnosable user error").
//!
//! Grounded on `cranelift_codegen::verifier`'s role in
//! `Context::compile`: run between passes, gated by
//! [`crate::settings::Flags::enable_verifier`], and report every violation
//! found rather than stopping at the first one, so a single bad pass run
//! doesn't need three round trips to fully diagnose.

use crate::flowgraph::ControlFlowGraph;
use crate::ir::{Function, Location, Opcode};
use crate::result::CodegenError;
use shecc_entity::EntityRef;

/// One broken invariant, with enough detail to point a compiler developer
/// at the offending block/instruction.
#[derive(Debug, Clone)]
pub struct VerifierError {
    /// Human-readable description of the violated invariant.
    pub message: String,
}

impl std::fmt::Display for VerifierError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Check every invariant spec.md §3 places on a function's IR. Returns every
/// violation found, empty if `func` is well-formed.
pub fn verify_function(func: &Function, cfg: &ControlFlowGraph) -> Vec<VerifierError> {
    let mut errors = Vec::new();

    verify_terminators(func, &mut errors);
    verify_operand_liveness(func, &mut errors);
    verify_cfg_symmetry(func, cfg, &mut errors);
    verify_entry_reachability(func, cfg, &mut errors);

    errors
}

/// Convenience wrapper for callers (`crate::context::Context::compile`) that
/// want the first violation as a `CodegenError` rather than the full list.
pub fn verify_function_result(
    func: &Function,
    cfg: &ControlFlowGraph,
) -> Result<(), CodegenError> {
    let errors = verify_function(func, cfg);
    match errors.into_iter().next() {
        Some(e) => Err(CodegenError::Verifier { message: e.message }),
        None => Ok(()),
    }
}

/// Every block must end in exactly one terminator, and it must be the last
/// instruction in the block (spec.md §3 invariant: "a basic block's last
/// instruction is always branch, jump, or return").
fn verify_terminators(func: &Function, errors: &mut Vec<VerifierError>) {
    for block in func.block_keys() {
        let insts = &func.blocks[block].insts;
        if insts.is_empty() {
            errors.push(VerifierError {
                message: format!("block {} has no instructions", func.blocks[block].label),
            });
            continue;
        }
        for (i, &inst) in insts.iter().enumerate() {
            let is_terminator = func.insts[inst].opcode.is_terminator();
            let is_last = i == insts.len() - 1;
            if is_terminator && !is_last {
                errors.push(VerifierError {
                    message: format!(
                        "block {} has a terminator before its last instruction",
                        func.blocks[block].label
                    ),
                });
            }
        }
        let last = *insts.last().unwrap();
        if !func.insts[last].opcode.is_terminator() && !func.is_builtin {
            errors.push(VerifierError {
                message: format!(
                    "block {} does not end in a terminator",
                    func.blocks[block].label
                ),
            });
        }
    }
}

/// Every operand an instruction reads or writes must reference a `Var`
/// actually allocated in this function (no stray indices from a cloned or
/// partially-rebuilt `Function`).
fn verify_operand_liveness(func: &Function, errors: &mut Vec<VerifierError>) {
    let num_vars = func.vars.len();
    for block in func.block_keys() {
        for &inst in &func.blocks[block].insts {
            let data = &func.insts[inst];
            let mut check = |v: crate::ir::Var, role: &str| {
                if v.index() >= num_vars {
                    errors.push(VerifierError {
                        message: format!(
                            "instruction in block {} references out-of-range {} operand",
                            func.blocks[block].label, role
                        ),
                    });
                }
            };
            if let Some(dst) = data.dst {
                check(dst, "dst");
            }
            for used in data.uses() {
                check(used, "src");
            }
        }
    }
}

/// After register allocation every non-global variable must have a
/// concrete `Location` — `Unassigned` surviving past `crate::regalloc`
/// means a variable the allocator never saw (spec.md §4.5's "every
/// variable live anywhere in the function is assigned exactly one
/// location").
pub fn verify_allocation(func: &Function) -> Vec<VerifierError> {
    let mut errors = Vec::new();
    for v in func.vars.keys() {
        let data = &func.vars[v];
        if data.is_global {
            continue;
        }
        if data.location == Location::Unassigned && data.live_start != data.live_end {
            errors.push(VerifierError {
                message: format!("{} left unassigned after register allocation", v),
            });
        }
    }
    errors
}

/// Every successor edge this function's blocks record must have a matching
/// predecessor edge in `cfg` of the same kind (spec.md §3: "predecessors are
/// derived, but must always agree with the successors they were derived
/// from").
fn verify_cfg_symmetry(func: &Function, cfg: &ControlFlowGraph, errors: &mut Vec<VerifierError>) {
    for block in func.block_keys() {
        for &(succ, kind) in cfg.succs(block) {
            let back_edge_present = cfg.preds(succ).iter().any(|&(p, k)| p == block && k == kind);
            if !back_edge_present {
                errors.push(VerifierError {
                    message: format!(
                        "block {} -> {} successor edge has no matching predecessor edge",
                        func.blocks[block].label, func.blocks[succ].label
                    ),
                });
            }
        }
    }
}

/// Every block must be reachable from the entry block. An unreachable block
/// left in `func.blocks` (rather than pruned) would silently vanish from
/// `crate::flatten::linearize`'s emission order, so catching it here is
/// cheaper than debugging a missing label later in `crate::binemit`.
fn verify_entry_reachability(func: &Function, cfg: &ControlFlowGraph, errors: &mut Vec<VerifierError>) {
    let entry = match func.entry {
        Some(e) => e,
        None => {
            errors.push(VerifierError {
                message: "function has no entry block".to_string(),
            });
            return;
        }
    };

    let mut visited = std::collections::HashSet::new();
    let mut stack = vec![entry];
    visited.insert(entry);
    while let Some(block) = stack.pop() {
        for &(succ, _) in cfg.succs(block) {
            if visited.insert(succ) {
                stack.push(succ);
            }
        }
    }

    for block in func.block_keys() {
        if !visited.contains(&block) {
            errors.push(VerifierError {
                message: format!(
                    "block {} is unreachable from entry",
                    func.blocks[block].label
                ),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{InstructionData, VarData};

    #[test]
    fn block_without_terminator_is_rejected() {
        let mut f = Function::new("t");
        let entry = f.make_block();
        f.entry = Some(entry);
        let a = f.make_var(VarData::new("a", "int"));
        let mut d = InstructionData::new(Opcode::LoadConstant);
        d.dst = Some(a);
        f.push_inst(entry, d);

        let cfg = ControlFlowGraph::with_function(&f);
        let errors = verify_function(&f, &cfg);
        assert!(errors.iter().any(|e| e.message.contains("terminator")));
    }

    #[test]
    fn well_formed_function_has_no_errors() {
        let mut f = Function::new("t");
        let entry = f.make_block();
        f.entry = Some(entry);
        let mut ret = InstructionData::new(Opcode::Return);
        ret.src0 = None;
        f.push_inst(entry, ret);

        let cfg = ControlFlowGraph::with_function(&f);
        let errors = verify_function(&f, &cfg);
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn unreachable_block_is_flagged() {
        let mut f = Function::new("t");
        let entry = f.make_block();
        let orphan = f.make_block();
        f.entry = Some(entry);
        f.push_inst(entry, InstructionData::new(Opcode::Return));
        f.push_inst(orphan, InstructionData::new(Opcode::Return));

        let cfg = ControlFlowGraph::with_function(&f);
        let errors = verify_function(&f, &cfg);
        assert!(errors.iter().any(|e| e.message.contains("unreachable")));
    }
}
