//! Spill-reload legalization: the pass that makes `crate::isa`'s `reg_of`
//! helpers total functions again after `linear_scan` has possibly put some
//! variable on the stack instead of in a register.
//!
//! Every ISA backend's `encode()` resolves an operand to a physical
//! register by reading `VarData::location` and expecting `Location::Reg`;
//! none of them know how to address a frame slot directly for an ordinary
//! arithmetic/memory/branch operand (only `Opcode::AddressOf`/`Allocat` do,
//! and only because computing a frame address *is* their job). Rather than
//! teach every opcode's encoding its own reload path, this pass runs once,
//! after register allocation has finished and before `crate::peephole`, and
//! rewrites any instruction that still reads or writes a spilled operand:
//! a `StackLoad` is inserted before the instruction for each spilled
//! source, a `StackStore` after it for a spilled destination, each routed
//! through one of `TargetIsa::scratch_regs`'s two dedicated registers. The
//! instruction itself is left with its `src0`/`src1`/`dst` fields pointing
//! at the fresh scratch variable instead of the original one, so every
//! existing `encode()` arm keeps working unmodified.
//!
//! `Opcode::AddressOf`'s operand is exempt: `linear_scan::reserve_frame_slots`
//! pins it to a stack slot on purpose (it never held a register to begin
//! with), and `encode()` reads that slot's offset directly rather than
//! through `reg_of` — legalizing it here would turn "compute this
//! variable's address" into "reload this variable's value".

use crate::ir::{Function, InstructionData, Location, Opcode, Var, VarData};
use crate::isa::{RegUnit, TargetIsa};

/// Rewrite every spilled register operand in `func` into an explicit
/// reload/spill sequence through `isa`'s scratch registers.
pub fn run(func: &mut Function, isa: &dyn TargetIsa) {
    let [scratch0, scratch1] = isa.scratch_regs();
    for block in func.block_keys() {
        let insts = func.blocks[block].insts.clone();
        let mut rewritten = Vec::with_capacity(insts.len());
        for inst in insts {
            let data = func.insts[inst].clone();
            if data.opcode == Opcode::AddressOf {
                rewritten.push(inst);
                continue;
            }

            let mut new_data = data.clone();
            let mut preamble = Vec::new();
            let mut epilogue = Vec::new();

            if let Some(src0) = data.src0 {
                if let Location::Stack(offset) = func.vars[src0].location {
                    let scratch = make_scratch(func, scratch0);
                    preamble.push(stack_load(func, scratch, offset));
                    new_data.src0 = Some(scratch);
                }
            }
            if let Some(src1) = data.src1 {
                if let Location::Stack(offset) = func.vars[src1].location {
                    let scratch = make_scratch(func, scratch1);
                    preamble.push(stack_load(func, scratch, offset));
                    new_data.src1 = Some(scratch);
                }
            }
            if let Some(dst) = data.dst {
                if let Location::Stack(offset) = func.vars[dst].location {
                    let scratch = make_scratch(func, scratch0);
                    new_data.dst = Some(scratch);
                    epilogue.push(stack_store(func, scratch, offset));
                }
            }

            if preamble.is_empty() && epilogue.is_empty() {
                rewritten.push(inst);
                continue;
            }

            func.insts[inst] = new_data;
            rewritten.extend(preamble);
            rewritten.push(inst);
            rewritten.extend(epilogue);
        }
        func.blocks[block].insts = rewritten;
    }
}

/// A fresh variable pinned directly to `reg`, bypassing `linear_scan`
/// entirely — its only use is living through the one instruction a
/// reload/spill sequence was inserted around.
fn make_scratch(func: &mut Function, reg: RegUnit) -> Var {
    let mut data = VarData::new("%scratch", "int");
    data.location = Location::Reg(reg);
    func.vars.push(data)
}

fn stack_load(func: &mut Function, dst: Var, offset: i32) -> crate::ir::Inst {
    let mut d = InstructionData::new(Opcode::StackLoad);
    d.dst = Some(dst);
    d.imm = offset as i64;
    func.insts.push(d)
}

fn stack_store(func: &mut Function, src: Var, offset: i32) -> crate::ir::Inst {
    let mut d = InstructionData::new(Opcode::StackStore);
    d.src0 = Some(src);
    d.imm = offset as i64;
    func.insts.push(d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::VarData;
    use crate::isa::arm32::Arm32Isa;

    #[test]
    fn spilled_source_gets_a_reload_before_the_instruction() {
        let mut f = Function::new("t");
        let block = f.make_block();
        f.entry = Some(block);
        let a = f.make_var(VarData::new("a", "int"));
        let b = f.make_var(VarData::new("b", "int"));
        let c = f.make_var(VarData::new("c", "int"));
        f.vars[a].location = Location::Stack(12);
        f.vars[b].location = Location::Reg(0);
        f.vars[c].location = Location::Reg(1);

        let mut d = InstructionData::new(Opcode::Add);
        d.dst = Some(c);
        d.src0 = Some(a);
        d.src1 = Some(b);
        let inst = f.push_inst(block, d);

        let isa = Arm32Isa;
        run(&mut f, &isa);

        let insts = &f.blocks[block].insts;
        assert_eq!(insts.len(), 2);
        assert_eq!(f.insts[insts[0]].opcode, Opcode::StackLoad);
        assert_eq!(f.insts[insts[0]].imm, 12);
        assert_eq!(f.insts[insts[1]].opcode, Opcode::Add);
        // The rewritten Add no longer reads `a` directly; it reads the
        // reload's destination instead.
        assert_eq!(f.insts[insts[1]].src0, Some(f.insts[insts[0]].dst.unwrap()));
        assert_eq!(inst, insts[1]);
    }

    #[test]
    fn spilled_destination_gets_a_spill_after_the_instruction() {
        let mut f = Function::new("t");
        let block = f.make_block();
        f.entry = Some(block);
        let a = f.make_var(VarData::new("a", "int"));
        let b = f.make_var(VarData::new("b", "int"));
        let c = f.make_var(VarData::new("c", "int"));
        f.vars[a].location = Location::Reg(0);
        f.vars[b].location = Location::Reg(1);
        f.vars[c].location = Location::Stack(8);

        let mut d = InstructionData::new(Opcode::Add);
        d.dst = Some(c);
        d.src0 = Some(a);
        d.src1 = Some(b);
        f.push_inst(block, d);

        let isa = Arm32Isa;
        run(&mut f, &isa);

        let insts = &f.blocks[block].insts;
        assert_eq!(insts.len(), 2);
        assert_eq!(f.insts[insts[0]].opcode, Opcode::Add);
        assert_eq!(f.insts[insts[1]].opcode, Opcode::StackStore);
        assert_eq!(f.insts[insts[1]].imm, 8);
        assert_eq!(f.insts[insts[1]].src0, f.insts[insts[0]].dst);
    }

    #[test]
    fn address_of_operand_is_left_untouched() {
        let mut f = Function::new("t");
        let block = f.make_block();
        f.entry = Some(block);
        let arr = f.make_var(VarData::new("arr", "int"));
        f.vars[arr].location = Location::Stack(4);
        let p = f.make_var(VarData::new("p", "int"));
        f.vars[p].location = Location::Reg(0);

        let mut d = InstructionData::new(Opcode::AddressOf);
        d.dst = Some(p);
        d.src0 = Some(arr);
        f.push_inst(block, d);

        let isa = Arm32Isa;
        run(&mut f, &isa);

        assert_eq!(f.blocks[block].insts.len(), 1);
    }

    #[test]
    fn both_sources_spilled_use_distinct_scratch_registers() {
        let mut f = Function::new("t");
        let block = f.make_block();
        f.entry = Some(block);
        let a = f.make_var(VarData::new("a", "int"));
        let b = f.make_var(VarData::new("b", "int"));
        let c = f.make_var(VarData::new("c", "int"));
        f.vars[a].location = Location::Stack(0);
        f.vars[b].location = Location::Stack(4);
        f.vars[c].location = Location::Reg(0);

        let mut d = InstructionData::new(Opcode::Add);
        d.dst = Some(c);
        d.src0 = Some(a);
        d.src1 = Some(b);
        f.push_inst(block, d);

        let isa = Arm32Isa;
        run(&mut f, &isa);

        let insts = &f.blocks[block].insts;
        assert_eq!(insts.len(), 3);
        let [scratch0, scratch1] = isa.scratch_regs();
        let reload0_dst = f.insts[insts[0]].dst.unwrap();
        let reload1_dst = f.insts[insts[1]].dst.unwrap();
        assert_eq!(f.vars[reload0_dst].location, Location::Reg(scratch0));
        assert_eq!(f.vars[reload1_dst].location, Location::Reg(scratch1));
    }
}
