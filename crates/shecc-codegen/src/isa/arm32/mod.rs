//! ARMv7-A (32-bit ARM, not Thumb) encoding.

use crate::ir::{Function, Inst, Location, Opcode};
use crate::isa::registers::{RegUnit, ARM32_GPR};
use crate::isa::{CallConv, EncodedInst, Isa, RegInfo, TargetIsa};
use crate::result::{CodegenError, CodegenResult};
use smallvec::smallvec;

/// `r7`, reserved out of the allocatable set (see
/// `crate::isa::registers::ARM32_GPR`), holds the frame base every
/// `Location::Stack` offset is relative to.
const FP: u32 = 7;

const AAPCS: CallConv = crate::isa::call_conv::ARM32_AAPCS;

/// Condition code `1110` (AL, always) — this compiler never emits a
/// predicated instruction other than the synthesized `Bcc` half of
/// `Opcode::Branch`.
const COND_AL: u32 = 0b1110;
const COND_NE: u32 = 0b0001;

/// The ARMv7-A target.
pub struct Arm32Isa;

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

fn data_processing(cond: u32, opcode4: u32, s: u32, rn: u32, rd: u32, rm: u32) -> u32 {
    (cond << 28) | (0b00 << 26) | (opcode4 << 21) | (s << 20) | (rn << 16) | (rd << 12) | rm
}

fn mul(cond: u32, rd: u32, rm: u32, rs: u32) -> u32 {
    (cond << 28) | (0b1001 << 4) | (rs << 8) | (rm) | (rd << 16)
}

fn ldr_str(cond: u32, load: bool, rn: u32, rd: u32, imm12: u32, up: bool) -> u32 {
    (cond << 28)
        | (0b01 << 26)
        | (1 << 24) // pre-indexed
        | ((up as u32) << 23)
        | ((load as u32) << 20)
        | (rn << 16)
        | (rd << 12)
        | (imm12 & 0xfff)
}

/// `movw`/`movt rd, #imm16` — the only way to get an arbitrary 32-bit
/// constant into a register in two fixed-width ARM words (A8.8.102/.106);
/// used for both `load_constant` and `load_data_address`; since neither
/// is an 8-bit-rotated "modified immediate" in general, a single `mov`
/// isn't enough.
fn movw_movt(cond: u32, rd: u32, imm32: u32) -> [u32; 2] {
    let movw = |half: u32| (cond << 28) | (0b0011_0000 << 20) | ((half >> 12) << 16) | (rd << 12) | (half & 0xfff);
    let movt = |half: u32| (cond << 28) | (0b0011_0100 << 20) | ((half >> 12) << 16) | (rd << 12) | (half & 0xfff);
    [movw(imm32 & 0xffff), movt(imm32 >> 16)]
}

/// `rd = rn + #imm32` for an arbitrary 32-bit `imm32`, via a scratch
/// `movw`/`movt` load into `rd` followed by a register-register add; used
/// to materialize a frame-relative address, since `imm32` (a stack offset)
/// is rarely an ARM "modified immediate" (an 8-bit value rotated by an
/// even count) and isn't worth special-casing when it is.
fn add_imm32(cond: u32, rd: u32, rn: u32, imm32: u32) -> [u32; 3] {
    let [movw, movt] = movw_movt(cond, rd, imm32);
    [movw, movt, data_processing(cond, 0b0100, 0, rn, rd, rd)]
}

fn branch(cond: u32, link: bool, pc: u32, target: u32) -> CodegenResult<u32> {
    let rel = target as i64 - (pc as i64 + 8);
    if rel % 4 != 0 || !(-(1 << 25)..(1 << 25)).contains(&rel) {
        return Err(CodegenError::BranchOutOfRange {
            loc: crate::source_loc::SourceLoc::synthetic(),
            distance: rel,
        });
    }
    let imm24 = ((rel / 4) as i32) as u32 & 0x00ff_ffff;
    Ok((cond << 28) | (0b101 << 25) | ((link as u32) << 24) | imm24)
}

impl TargetIsa for Arm32Isa {
    fn isa(&self) -> Isa {
        Isa::Arm32
    }

    fn registers(&self) -> &'static RegInfo {
        &ARM32_GPR
    }

    fn call_conv(&self) -> &'static CallConv {
        &AAPCS
    }

    fn scratch_regs(&self) -> [RegUnit; 2] {
        [11, 12]
    }

    fn jump_range(&self) -> i64 {
        16 * 1024 * 1024
    }

    fn branch_range(&self) -> i64 {
        16 * 1024 * 1024
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
            Opcode::Add | Opcode::Sub | Opcode::BitAnd | Opcode::BitOr | Opcode::BitXor => {
                let rd = reg_of(func, data.dst)? as u32;
                let rn = reg_of(func, data.src0)? as u32;
                let rm = reg_of(func, data.src1)? as u32;
                let opc = match data.opcode {
                    Opcode::Add => 0b0100,
                    Opcode::Sub => 0b0010,
                    Opcode::BitAnd => 0b0000,
                    Opcode::BitOr => 0b1100,
                    Opcode::BitXor => 0b0001,
                    _ => unreachable!(),
                };
                Ok(smallvec![data_processing(COND_AL, opc, 0, rn, rd, rm)])
            }
            Opcode::Assign => {
                let rd = reg_of(func, data.dst)? as u32;
                let rm = reg_of(func, data.src0)? as u32;
                Ok(smallvec![data_processing(COND_AL, 0b1101, 0, 0, rd, rm)])
            }
            Opcode::Mul => {
                let rd = reg_of(func, data.dst)? as u32;
                let rm = reg_of(func, data.src0)? as u32;
                let rs = reg_of(func, data.src1)? as u32;
                Ok(smallvec![mul(COND_AL, rd, rm, rs)])
            }
            Opcode::LoadConstant => {
                let rd = reg_of(func, data.dst)? as u32;
                let [w0, w1] = movw_movt(COND_AL, rd, data.imm as i32 as u32);
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
                let [w0, w1] = movw_movt(COND_AL, rd, addr);
                Ok(smallvec![w0, w1])
            }
            Opcode::AddressOf => {
                // `crate::regalloc::linear_scan` forces any variable that's
                // ever the operand of `AddressOf` onto a fixed,
                // never-reassigned `Location::Stack` slot (a purely
                // register-resident value has no address to take), so this
                // is always a frame-relative address computation, never a
                // register-to-register move.
                let rd = reg_of(func, data.dst)? as u32;
                let offset = match func.vars[data.src0.ok_or_else(|| {
                    CodegenError::internal("address_of with no operand")
                })?]
                .location
                {
                    Location::Stack(off) => off as u32,
                    _ => {
                        return Err(CodegenError::internal(
                            "address_of operand was not pinned to a stack slot by regalloc",
                        ))
                    }
                };
                let [w0, w1, w2] = add_imm32(COND_AL, rd, FP, offset);
                Ok(smallvec![w0, w1, w2])
            }
            Opcode::Allocat => {
                // `crate::regalloc::linear_scan` reserves the buffer's
                // frame bytes up front and stashes the resolved offset in
                // `imm`; `dst` is an ordinary register-resident value (the
                // array's own decayed address), computed here exactly like
                // `AddressOf`.
                let rd = reg_of(func, data.dst)? as u32;
                let [w0, w1, w2] = add_imm32(COND_AL, rd, FP, data.imm as u32);
                Ok(smallvec![w0, w1, w2])
            }
            Opcode::StackLoad => {
                // The address is computed straight into the destination
                // register and then immediately overwritten by the load,
                // same as `Opcode::Allocat`/`Opcode::AddressOf` above —
                // no second register is needed to hold it.
                let rd = reg_of(func, data.dst)? as u32;
                let [w0, w1, w2] = add_imm32(COND_AL, rd, FP, data.imm as u32);
                Ok(smallvec![w0, w1, w2, ldr_str(COND_AL, true, rd, rd, 0, true)])
            }
            Opcode::StackStore => {
                // `src0` holds the value to spill, in one of the two
                // scratch registers; the address is computed into whichever
                // scratch register that isn't, so the store doesn't clobber
                // the value it's about to write.
                let rs = reg_of(func, data.src0)? as u32;
                let [scratch0, scratch1] = self.scratch_regs();
                let addr_reg = if rs == scratch0 as u32 { scratch1 } else { scratch0 } as u32;
                let [w0, w1, w2] = add_imm32(COND_AL, addr_reg, FP, data.imm as u32);
                Ok(smallvec![w0, w1, w2, ldr_str(COND_AL, false, addr_reg, rs, 0, true)])
            }
            Opcode::Read | Opcode::Write => {
                let is_load = data.opcode == Opcode::Read;
                let rd = reg_of(func, data.dst.or(data.src1))? as u32;
                let rn = reg_of(func, data.src0)? as u32;
                Ok(smallvec![ldr_str(COND_AL, is_load, rn, rd, 0, true)])
            }
            Opcode::Jump => {
                let label = data.label.as_deref().ok_or_else(|| {
                    CodegenError::internal("jump with no target label")
                })?;
                let target = resolve(label).ok_or_else(|| {
                    CodegenError::internal(format!("unresolved label `{}`", label))
                })?;
                Ok(smallvec![branch(COND_AL, false, pc, target)?])
            }
            Opcode::Branch => {
                let cond_reg = reg_of(func, data.src0)? as u32;
                let then_label = data.label.as_deref().ok_or_else(|| {
                    CodegenError::internal("branch with no `then` label")
                })?;
                let target = resolve(then_label).ok_or_else(|| {
                    CodegenError::internal(format!("unresolved label `{}`", then_label))
                })?;
                let cmp = data_processing(COND_AL, 0b1010, 1, cond_reg, 0, 0);
                let bcc = branch(COND_NE, false, pc + 4, target)?;
                Ok(smallvec![cmp, bcc])
            }
            Opcode::Call => {
                let label = data.label.as_deref().ok_or_else(|| {
                    CodegenError::internal("call with no callee label")
                })?;
                // spec.md §4.7: `__syscall` is a built-in, not a real callee —
                // it expands inline to the trap instruction itself rather
                // than a `bl` to a resolved symbol.
                if label == "__syscall" {
                    return Ok(smallvec![(COND_AL << 28) | 0x0f00_0000]); // svc 0
                }
                let target = resolve(label).ok_or_else(|| {
                    CodegenError::internal(format!("unresolved callee `{}`", label))
                })?;
                Ok(smallvec![branch(COND_AL, true, pc, target)?])
            }
            Opcode::Indirect => {
                let rm = reg_of(func, data.src0)? as u32;
                Ok(smallvec![(COND_AL << 28) | 0x012f_ff30 | rm])
            }
            Opcode::Return | Opcode::FuncRet => {
                // `bx lr`
                Ok(smallvec![(COND_AL << 28) | 0x012f_ff1e])
            }
            Opcode::Label | Opcode::BlockStart | Opcode::BlockEnd | Opcode::Push => {
                Ok(smallvec![(COND_AL << 28) | 0x0320_f000]) // NOP (MOV r0, r0 on AL... encoded as MOV pc-safe NOP form)
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
    fn add_encodes_as_data_processing() {
        let mut f = Function::new("t");
        let block = f.make_block();
        f.entry = Some(block);
        let a = reg_var(&mut f, "a", 0);
        let b = reg_var(&mut f, "b", 1);
        let c = reg_var(&mut f, "c", 2);

        let mut d = InstructionData::new(Opcode::Add);
        d.dst = Some(c);
        d.src0 = Some(a);
        d.src1 = Some(b);
        let inst = f.push_inst(block, d);

        let isa = Arm32Isa;
        let words = isa.encode(&f, inst, 0, &|_| None).unwrap();
        assert_eq!(words.len(), 1);
        assert_eq!(words[0] >> 28, COND_AL);
        assert_eq!((words[0] >> 21) & 0xf, 0b0100);
    }

    #[test]
    fn jump_out_of_range_is_rejected() {
        let mut f = Function::new("t");
        let block = f.make_block();
        let mut d = InstructionData::new(Opcode::Jump);
        d.label = Some("far".into());
        let inst = f.push_inst(block, d);

        let isa = Arm32Isa;
        let err = isa
            .encode(&f, inst, 0, &|_| Some(64 * 1024 * 1024))
            .unwrap_err();
        matches!(err, CodegenError::BranchOutOfRange { .. });
    }

    #[test]
    fn address_of_computes_a_frame_relative_address() {
        let mut f = Function::new("t");
        let block = f.make_block();
        f.entry = Some(block);
        let arr = f.make_var(VarData::new("arr", "int"));
        f.vars[arr].location = Location::Stack(16);
        let p = reg_var(&mut f, "p", 0);

        let mut d = InstructionData::new(Opcode::AddressOf);
        d.dst = Some(p);
        d.src0 = Some(arr);
        let inst = f.push_inst(block, d);

        let isa = Arm32Isa;
        let words = isa.encode(&f, inst, 0, &|_| None).unwrap();
        assert_eq!(words.len(), 3);
        assert_eq!(isa.encoded_len(Opcode::AddressOf), 3);
    }

    #[test]
    fn allocat_computes_its_own_decayed_address() {
        let mut f = Function::new("t");
        let block = f.make_block();
        f.entry = Some(block);
        let arr = reg_var(&mut f, "arr", 0);

        let mut d = InstructionData::new(Opcode::Allocat);
        d.dst = Some(arr);
        d.imm = 16; // resolved by `regalloc::linear_scan::reserve_frame_slots`
        let inst = f.push_inst(block, d);

        let isa = Arm32Isa;
        let words = isa.encode(&f, inst, 0, &|_| None).unwrap();
        assert_eq!(words.len(), 3);
        assert_eq!(isa.encoded_len(Opcode::Allocat), 3);
    }

    #[test]
    fn stack_load_reloads_through_its_own_destination_register() {
        let mut f = Function::new("t");
        let block = f.make_block();
        f.entry = Some(block);
        let v = reg_var(&mut f, "v", 11);

        let mut d = InstructionData::new(Opcode::StackLoad);
        d.dst = Some(v);
        d.imm = 20;
        let inst = f.push_inst(block, d);

        let isa = Arm32Isa;
        let words = isa.encode(&f, inst, 0, &|_| None).unwrap();
        assert_eq!(words.len(), 4);
        assert_eq!(isa.encoded_len(Opcode::StackLoad), 4);
    }

    #[test]
    fn stack_store_addresses_through_the_other_scratch_register() {
        let mut f = Function::new("t");
        let block = f.make_block();
        f.entry = Some(block);
        let v = reg_var(&mut f, "v", 11); // scratch0

        let mut d = InstructionData::new(Opcode::StackStore);
        d.src0 = Some(v);
        d.imm = 20;
        let inst = f.push_inst(block, d);

        let isa = Arm32Isa;
        let words = isa.encode(&f, inst, 0, &|_| None).unwrap();
        assert_eq!(words.len(), 4);
        // The final `str` must not use r11 (the value register) as its
        // base, or it would compute the address into the register it's
        // about to store.
        let str_word = words[3];
        assert_eq!((str_word >> 16) & 0xf, 12);
        assert_eq!((str_word >> 12) & 0xf, 11);
    }

    #[test]
    fn syscall_expands_to_svc_instead_of_a_branch() {
        let mut f = Function::new("t");
        let block = f.make_block();
        let mut d = InstructionData::new(Opcode::Call);
        d.label = Some("__syscall".into());
        let inst = f.push_inst(block, d);

        let isa = Arm32Isa;
        // no `resolve` entry for "__syscall" at all: if this fell through to
        // the ordinary callee-resolution path it would error out.
        let words = isa.encode(&f, inst, 0, &|_| None).unwrap();
        assert_eq!(words.len(), 1);
        assert_eq!(words[0], (COND_AL << 28) | 0x0f00_0000);
    }
}
