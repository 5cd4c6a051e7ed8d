//! Per-block local peephole rewrites, run once register allocation has
//! fixed every operand's location (spec.md §4.6).
//!
//! Deletion unlinks an instruction from its block's `Vec<Inst>` without
//! freeing the underlying `InstructionData` (spec.md §3's lifecycle note
//! (iii)), mirrored by [`crate::ir::BlockData::remove_inst`].

use crate::ir::{Function, Location, Opcode};

/// Run every peephole rule to a fixed point over `func`.
pub fn run(func: &mut Function) {
    loop {
        let mut changed = false;
        changed |= remove_redundant_self_moves(func);
        changed |= remove_dead_assigns_into_same_register(func);
        if !changed {
            break;
        }
    }
}

/// `assign rd, rd` (both operands allocated to the same physical register,
/// typically left over after coalescing) is a no-op.
fn remove_redundant_self_moves(func: &mut Function) -> bool {
    let mut changed = false;
    for block in func.block_keys() {
        let insts = func.blocks[block].insts.clone();
        let mut to_remove = Vec::new();
        for inst in insts {
            let data = &func.insts[inst];
            if data.opcode != Opcode::Assign {
                continue;
            }
            let (dst, src) = match (data.dst, data.src0) {
                (Some(dst), Some(src)) => (dst, src),
                _ => continue,
            };
            let same_register = matches!(
                (func.vars[dst].location, func.vars[src].location),
                (Location::Reg(a), Location::Reg(b)) if a == b
            );
            if same_register {
                to_remove.push(inst);
            }
        }
        if !to_remove.is_empty() {
            changed = true;
            for inst in to_remove {
                func.blocks[block].remove_inst(inst);
            }
        }
    }
    changed
}

/// An `assign` whose destination is immediately overwritten by the next
/// instruction in the same block, with no use in between, is dead.
fn remove_dead_assigns_into_same_register(func: &mut Function) -> bool {
    let mut changed = false;
    for block in func.block_keys() {
        let insts = func.blocks[block].insts.clone();
        let mut to_remove = Vec::new();
        for window in insts.windows(2) {
            let (first, second) = (window[0], window[1]);
            let fd = &func.insts[first];
            if fd.opcode != Opcode::Assign {
                continue;
            }
            let dst = match fd.dst {
                Some(dst) => dst,
                None => continue,
            };
            let sd = &func.insts[second];
            if sd.dst == Some(dst) && !sd.uses().any(|v| v == dst) {
                to_remove.push(first);
            }
        }
        if !to_remove.is_empty() {
            changed = true;
            for inst in to_remove {
                func.blocks[block].remove_inst(inst);
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{InstructionData, Var, VarData};

    #[test]
    fn self_move_is_removed() {
        let mut f = Function::new("t");
        let block = f.make_block();
        let a = f.make_var(VarData::new("a", "int"));
        f.vars[a].location = Location::Reg(3);

        let mut d = InstructionData::new(Opcode::Assign);
        d.dst = Some(a);
        d.src0 = Some(a);
        f.push_inst(block, d);

        run(&mut f);
        assert!(f.blocks[block].insts.is_empty());
    }

    #[test]
    fn dead_assign_before_overwrite_is_removed() {
        let mut f = Function::new("t");
        let block = f.make_block();
        let a: Var = f.make_var(VarData::new("a", "int"));

        let mut d1 = InstructionData::new(Opcode::Assign);
        d1.dst = Some(a);
        let i1 = f.push_inst(block, d1);

        let mut d2 = InstructionData::new(Opcode::LoadConstant);
        d2.dst = Some(a);
        d2.imm = 5;
        f.push_inst(block, d2);

        run(&mut f);
        assert!(!f.blocks[block].insts.contains(&i1));
    }
}
