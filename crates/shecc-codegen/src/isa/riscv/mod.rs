//! RV32I encoding.

use crate::ir::{Function, Inst, Location, Opcode};
use crate::isa::registers::{RegUnit, RV32_GPR};
use crate::isa::{CallConv, EncodedInst, Isa, RegInfo, TargetIsa};
use crate::result::{CodegenError, CodegenResult};
use smallvec::smallvec;

const STANDARD: CallConv = crate::isa::call_conv::RV32_STANDARD;

/// `x8` (`s0`), reserved out of the allocatable set (see
/// `crate::isa::registers::RV32_GPR`), holds the frame base every
/// `Location::Stack` offset is relative to.
const FP: u32 = 8;

/// The RV32I target.
pub struct Riscv32Isa;

fn reg_of(func: &Function, var: Option<crate::ir::Var>) -> CodegenResult<RegUnit> {
    let var = var.ok_or_else(|| CodegenError::internal("missing operand"))?;
    match func.vars[var].location {
        crate::ir::Location::Reg(r) => Ok(r),
        _ => Err(CodegenError::internal(format!(
            "{} has no register assigned at emission time",
            func.vars[var].name
        ))),
    }
}

fn r_type(funct7: u32, rs2: u32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
    (funct7 << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
}

fn i_type(imm12: u32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
    ((imm12 & 0xfff) << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
}

fn s_type(imm12: u32, rs2: u32, rs1: u32, funct3: u32, opcode: u32) -> u32 {
    let imm = imm12 & 0xfff;
    let hi = (imm >> 5) & 0x7f;
    let lo = imm & 0x1f;
    (hi << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (lo << 7) | opcode
}

fn u_type(imm20: u32, rd: u32, opcode: u32) -> u32 {
    (imm20 << 12) | (rd << 7) | opcode
}

/// `li rd, imm32` — RV32I's standard two-instruction constant-load
/// expansion (no single instruction carries a full 32-bit immediate):
/// `lui` with the immediate rounded up so the following `addi`'s 12-bit
/// signed displacement can correct it back down.
fn li(rd: u32, imm32: i32) -> [u32; 2] {
    let hi = ((imm32 as i64).wrapping_add(0x800)) >> 12;
    let lo = imm32.wrapping_sub((hi as i32) << 12);
    [
        u_type(hi as u32 & 0xf_ffff, rd, 0b0110111), // lui rd, hi
        i_type(lo as u32, rd, 0b000, rd, 0b0010011),  // addi rd, rd, lo
    ]
}

fn jal(rd: u32, pc: u32, target: u32, range: i64) -> CodegenResult<u32> {
    let rel = target as i64 - pc as i64;
    if rel % 2 != 0 || !(-range..range).contains(&rel) {
        return Err(CodegenError::BranchOutOfRange {
            loc: crate::source_loc::SourceLoc::synthetic(),
            distance: rel,
        });
    }
    let imm = rel as i32 as u32;
    let imm20 = (imm >> 20) & 0x1;
    let imm10_1 = (imm >> 1) & 0x3ff;
    let imm11 = (imm >> 11) & 0x1;
    let imm19_12 = (imm >> 12) & 0xff;
    let encoded = (imm20 << 31) | (imm19_12 << 12) | (imm11 << 20) | (imm10_1 << 21);
    Ok(encoded | (rd << 7) | 0b1101111)
}

fn beq_bne(taken_when_ne: bool, rs1: u32, rs2: u32, pc: u32, target: u32, range: i64) -> CodegenResult<u32> {
    let rel = target as i64 - pc as i64;
    if rel % 2 != 0 || !(-range..range).contains(&rel) {
        return Err(CodegenError::BranchOutOfRange {
            loc: crate::source_loc::SourceLoc::synthetic(),
            distance: rel,
        });
    }
    let imm = rel as i32 as u32;
    let imm12 = (imm >> 12) & 0x1;
    let imm10_5 = (imm >> 5) & 0x3f;
    let imm4_1 = (imm >> 1) & 0xf;
    let imm11 = (imm >> 11) & 0x1;
    let funct3 = if taken_when_ne { 0b001 } else { 0b000 };
    let encoded = (imm12 << 31) | (imm10_5 << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12)
        | (imm4_1 << 8)
        | (imm11 << 7);
    Ok(encoded | 0b1100011)
}

impl TargetIsa for Riscv32Isa {
    fn isa(&self) -> Isa {
        Isa::Riscv32
    }

    fn registers(&self) -> &'static RegInfo {
        &RV32_GPR
    }

    fn call_conv(&self) -> &'static CallConv {
        &STANDARD
    }

    fn scratch_regs(&self) -> [RegUnit; 2] {
        [5, 6] // t0, t1
    }

    fn jump_range(&self) -> i64 {
        1024 * 1024
    }

    fn branch_range(&self) -> i64 {
        1024 * 1024
    }

    fn encoded_len(&self, opcode: Opcode) -> u32 {
        match opcode {
            Opcode::Branch => 2,
            Opcode::LoadConstant | Opcode::LoadDataAddress => 2,
            Opcode::AddressOf | Opcode::Allocat => 3,
            Opcode::StackLoad | Opcode::StackStore => 4,
            _ => 1,
        }
    }

    fn encode(
        &self,
        func: &Function,
        inst: Inst,
        pc: u32,
        resolve: &dyn Fn(&str) -> Option<u32>,
    ) -> CodegenResult<EncodedInst> {
        let data = &func.insts[inst];
        let loc = func.srclocs[inst].clone();
        match data.opcode {
            Opcode::Add | Opcode::Sub | Opcode::BitAnd | Opcode::BitOr | Opcode::BitXor
            | Opcode::Mul => {
                let rd = reg_of(func, data.dst)? as u32;
                let rs1 = reg_of(func, data.src0)? as u32;
                let rs2 = reg_of(func, data.src1)? as u32;
                let (funct7, funct3) = match data.opcode {
                    Opcode::Add => (0b0000000, 0b000),
                    Opcode::Sub => (0b0100000, 0b000),
                    Opcode::BitAnd => (0b0000000, 0b111),
                    Opcode::BitOr => (0b0000000, 0b110),
                    Opcode::BitXor => (0b0000000, 0b100),
                    Opcode::Mul => (0b0000001, 0b000), // RV32M; legalized to a
                    // libcall by `crate::context` when `-m` requests
                    // software multiply.
                    _ => unreachable!(),
                };
                Ok(smallvec![r_type(funct7, rs2, rs1, funct3, rd, 0b0110011)])
            }
            Opcode::Assign => {
                let rd = reg_of(func, data.dst)? as u32;
                let rs1 = reg_of(func, data.src0)? as u32;
                Ok(smallvec![i_type(0, rs1, 0b000, rd, 0b0010011)]) // addi rd, rs1, 0
            }
            Opcode::LoadConstant => {
                let rd = reg_of(func, data.dst)? as u32;
                let [w0, w1] = li(rd, data.imm as i32);
                Ok(smallvec![w0, w1])
            }
            Opcode::LoadDataAddress => {
                let rd = reg_of(func, data.dst)? as u32;
                let label = data.label.as_deref().ok_or_else(|| {
                    CodegenError::internal("load_data_address with no label")
                })?;
                let addr = resolve(label).ok_or_else(|| {
                    CodegenError::internal(format!("unresolved data symbol `{}`", label))
                })?;
                let [w0, w1] = li(rd, addr as i32);
                Ok(smallvec![w0, w1])
            }
            Opcode::AddressOf => {
                // `crate::regalloc::linear_scan` forces any variable that's
                // ever the operand of `AddressOf` onto a fixed,
                // never-reassigned `Location::Stack` slot, so this is
                // always `rd = fp + offset`, never a register move.
                let rd = reg_of(func, data.dst)? as u32;
                let offset = match func.vars[data.src0.ok_or_else(|| {
                    CodegenError::internal("address_of with no operand")
                })?]
                .location
                {
                    Location::Stack(off) => off,
                    _ => {
                        return Err(CodegenError::internal(
                            "address_of operand was not pinned to a stack slot by regalloc",
                        ))
                    }
                };
                let [lui_w, addi_w] = li(rd, offset);
                let add_w = r_type(0, FP, rd, 0b000, rd, 0b0110011); // add rd, rd, fp
                Ok(smallvec![lui_w, addi_w, add_w])
            }
            Opcode::Allocat => {
                // `crate::regalloc::linear_scan` reserves the buffer's
                // frame bytes up front and stashes the resolved offset in
                // `imm`; `dst` is an ordinary register-resident value (the
                // array's own decayed address), computed here exactly like
                // `AddressOf`.
                let rd = reg_of(func, data.dst)? as u32;
                let [lui_w, addi_w] = li(rd, data.imm as i32);
                let add_w = r_type(0, FP, rd, 0b000, rd, 0b0110011); // add rd, rd, fp
                Ok(smallvec![lui_w, addi_w, add_w])
            }
            Opcode::StackLoad => {
                // `li` + `add` compute the address straight into the
                // destination, then the load overwrites it — mirrors
                // `Opcode::Allocat`/`Opcode::AddressOf` above.
                let rd = reg_of(func, data.dst)? as u32;
                let [lui_w, addi_w] = li(rd, data.imm as i32);
                let add_w = r_type(0, FP, rd, 0b000, rd, 0b0110011); // add rd, rd, fp
                let load_w = i_type(0, rd, 0b010, rd, 0b0000011); // lw rd, 0(rd)
                Ok(smallvec![lui_w, addi_w, add_w, load_w])
            }
            Opcode::StackStore => {
                // `src0` holds the value, in one of the two scratch
                // registers; the address is computed into whichever
                // scratch register that isn't, so it doesn't clobber the
                // value it's about to write.
                let rs = reg_of(func, data.src0)? as u32;
                let [scratch0, scratch1] = self.scratch_regs();
                let addr_reg = if rs == scratch0 as u32 { scratch1 } else { scratch0 } as u32;
                let [lui_w, addi_w] = li(addr_reg, data.imm as i32);
                let add_w = r_type(0, FP, addr_reg, 0b000, addr_reg, 0b0110011); // add addr, addr, fp
                let store_w = s_type(0, rs, addr_reg, 0b010, 0b0100011); // sw rs, 0(addr)
                Ok(smallvec![lui_w, addi_w, add_w, store_w])
            }
            Opcode::Read => {
                let rd = reg_of(func, data.dst)? as u32;
                let rs1 = reg_of(func, data.src0)? as u32;
                let funct3 = if data.size == 1 { 0b100 } else { 0b010 }; // lbu / lw
                Ok(smallvec![i_type(0, rs1, funct3, rd, 0b0000011)])
            }
            Opcode::Write => {
                let rs1 = reg_of(func, data.src0)? as u32;
                let rs2 = reg_of(func, data.src1)? as u32;
                let funct3 = if data.size == 1 { 0b000 } else { 0b010 }; // sb / sw
                Ok(smallvec![s_type(0, rs2, rs1, funct3, 0b0100011)])
            }
            Opcode::Jump => {
                let label = data.label.as_deref().ok_or_else(|| {
                    CodegenError::internal("jump with no target label")
                })?;
                let target = resolve(label).ok_or_else(|| {
                    CodegenError::internal(format!("unresolved label `{}`", label))
                })?;
                Ok(smallvec![jal(0, pc, target, self.jump_range())?])
            }
            Opcode::Branch => {
                let cond_reg = reg_of(func, data.src0)? as u32;
                let then_label = data.label.as_deref().ok_or_else(|| {
                    CodegenError::internal("branch with no `then` label")
                })?;
                let target = resolve(then_label).ok_or_else(|| {
                    CodegenError::internal(format!("unresolved label `{}`", then_label))
                })?;
                let bne = beq_bne(true, cond_reg, 0, pc, target, self.branch_range())?;
                // A `nop` placeholder occupies the second word; the CFG
                // flattener places the `else` branch as the fall-through
                // block, matching spec.md §4.6's "falls through unless a
                // `break` is present" shape for the common case.
                let nop = i_type(0, 0, 0b000, 0, 0b0010011);
                Ok(smallvec![bne, nop])
            }
            Opcode::Call => {
                let label = data.label.as_deref().ok_or_else(|| {
                    CodegenError::internal("call with no callee label")
                })?;
                // spec.md §4.7: `__syscall` is a built-in, not a real callee —
                // it expands inline to the trap instruction itself rather
                // than a `jal` to a resolved symbol (there is nothing to
                // resolve; the kernel is the "callee").
                if label == "__syscall" {
                    return Ok(smallvec![0x0000_0073]); // ecall
                }
                let target = resolve(label).ok_or_else(|| {
                    CodegenError::internal(format!("unresolved callee `{}`", label))
                })?;
                Ok(smallvec![jal(1, pc, target, self.jump_range())?]) // jal ra, target
            }
            Opcode::Indirect => {
                let rs1 = reg_of(func, data.src0)? as u32;
                Ok(smallvec![i_type(0, rs1, 0b000, 1, 0b1100111)]) // jalr ra, rs1, 0
            }
            Opcode::Return | Opcode::FuncRet => {
                Ok(smallvec![i_type(0, 1, 0b000, 0, 0b1100111)]) // jalr x0, ra, 0
            }
            Opcode::Label | Opcode::BlockStart | Opcode::BlockEnd | Opcode::Push => {
                Ok(smallvec![i_type(0, 0, 0b000, 0, 0b0010011)]) // nop
            }
            other => Err(CodegenError::UnsupportedOpcode { loc, opcode: other }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{InstructionData, Location, Var, VarData};

    fn reg_var(func: &mut Function, name: &str, r: RegUnit) -> Var {
        let v = func.make_var(VarData::new(name, "int"));
        func.vars[v].location = Location::Reg(r);
        v
    }

    #[test]
    fn add_is_r_type_with_opcode_0110011() {
        let mut f = Function::new("t");
        let block = f.make_block();
        let a = reg_var(&mut f, "a", 10);
        let b = reg_var(&mut f, "b", 11);
        let c = reg_var(&mut f, "c", 12);

        let mut d = InstructionData::new(Opcode::Add);
        d.dst = Some(c);
        d.src0 = Some(a);
        d.src1 = Some(b);
        let inst = f.push_inst(block, d);

        let isa = Riscv32Isa;
        let words = isa.encode(&f, inst, 0, &|_| None).unwrap();
        assert_eq!(words.len(), 1);
        assert_eq!(words[0] & 0x7f, 0b0110011);
    }

    #[test]
    fn load_constant_expands_to_lui_addi() {
        let mut f = Function::new("t");
        let block = f.make_block();
        let a = reg_var(&mut f, "a", 10);
        let mut d = InstructionData::new(Opcode::LoadConstant);
        d.dst = Some(a);
        d.imm = 100_000;
        let inst = f.push_inst(block, d);

        let isa = Riscv32Isa;
        let words = isa.encode(&f, inst, 0, &|_| None).unwrap();
        assert_eq!(words.len(), 2);
        assert_eq!(words[0] & 0x7f, 0b0110111);
        assert_eq!(words[1] & 0x7f, 0b0010011);
        assert_eq!(isa.encoded_len(Opcode::LoadConstant), 2);
    }

    #[test]
    fn address_of_computes_a_frame_relative_address() {
        let mut f = Function::new("t");
        let block = f.make_block();
        let arr = f.make_var(VarData::new("arr", "int"));
        f.vars[arr].location = Location::Stack(24);
        let p = reg_var(&mut f, "p", 10);

        let mut d = InstructionData::new(Opcode::AddressOf);
        d.dst = Some(p);
        d.src0 = Some(arr);
        let inst = f.push_inst(block, d);

        let isa = Riscv32Isa;
        let words = isa.encode(&f, inst, 0, &|_| None).unwrap();
        assert_eq!(words.len(), 3);
    }

    #[test]
    fn allocat_computes_its_own_decayed_address() {
        let mut f = Function::new("t");
        let block = f.make_block();
        let arr = reg_var(&mut f, "arr", 10);

        let mut d = InstructionData::new(Opcode::Allocat);
        d.dst = Some(arr);
        d.imm = 24; // resolved by `regalloc::linear_scan::reserve_frame_slots`
        let inst = f.push_inst(block, d);

        let isa = Riscv32Isa;
        let words = isa.encode(&f, inst, 0, &|_| None).unwrap();
        assert_eq!(words.len(), 3);
        assert_eq!(isa.encoded_len(Opcode::Allocat), 3);
    }

    #[test]
    fn stack_load_reloads_through_its_own_destination_register() {
        let mut f = Function::new("t");
        let block = f.make_block();
        let v = reg_var(&mut f, "v", 5); // t0

        let mut d = InstructionData::new(Opcode::StackLoad);
        d.dst = Some(v);
        d.imm = 24;
        let inst = f.push_inst(block, d);

        let isa = Riscv32Isa;
        let words = isa.encode(&f, inst, 0, &|_| None).unwrap();
        assert_eq!(words.len(), 4);
        assert_eq!(isa.encoded_len(Opcode::StackLoad), 4);
        assert_eq!(words[3] & 0x7f, 0b0000011); // final word is a load
    }

    #[test]
    fn stack_store_addresses_through_the_other_scratch_register() {
        let mut f = Function::new("t");
        let block = f.make_block();
        let v = reg_var(&mut f, "v", 5); // t0, scratch0

        let mut d = InstructionData::new(Opcode::StackStore);
        d.src0 = Some(v);
        d.imm = 24;
        let inst = f.push_inst(block, d);

        let isa = Riscv32Isa;
        let words = isa.encode(&f, inst, 0, &|_| None).unwrap();
        assert_eq!(words.len(), 4);
        let store_word = words[3];
        assert_eq!(store_word & 0x7f, 0b0100011); // store opcode
        assert_eq!((store_word >> 15) & 0x1f, 6); // base is t1, not t0
        assert_eq!((store_word >> 20) & 0x1f, 5); // value register is t0
    }

    #[test]
    fn syscall_expands_to_ecall_instead_of_a_jal() {
        let mut f = Function::new("t");
        let block = f.make_block();
        let mut d = InstructionData::new(Opcode::Call);
        d.label = Some("__syscall".into());
        let inst = f.push_inst(block, d);

        let isa = Riscv32Isa;
        let words = isa.encode(&f, inst, 0, &|_| None).unwrap();
        assert_eq!(words.len(), 1);
        assert_eq!(words[0], 0x0000_0073);
    }
}
