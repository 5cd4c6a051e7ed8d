//! Textual IR dump, enabled by `--dump-ir` (spec.md §6). Grounded on
//! `cranelift_codegen::write`'s `write_function`: a flat, greppable listing
//! rather than a structured tree, one line per instruction.

use crate::ir::{Function, Opcode, Var};
use std::fmt::{self, Write as _};

/// Render `func` as text, one block per paragraph, one instruction per line.
pub fn write_function(func: &Function) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "function {}() {{", func.name);
    for block in func.block_keys() {
        let data = &func.blocks[block];
        let _ = write!(s, "{}:", data.label);
        if !data.preds.is_empty() {
            let preds: Vec<String> = data.preds.iter().map(|(p, k)| format!("{}({:?})", func.blocks[*p].label, k)).collect();
            let _ = write!(s, "  ; preds: {}", preds.join(", "));
        }
        let _ = writeln!(s);
        for &inst in &data.insts {
            let _ = writeln!(s, "    {}", write_inst(func, inst));
        }
    }
    let _ = writeln!(s, "}}");
    s
}

fn write_var(v: Var) -> String {
    format!("{}", v)
}

/// Render one instruction as text (`dst = opcode src0, src1` for value ops,
/// bare `opcode label` for control-flow ops).
pub fn write_inst(func: &Function, inst: crate::ir::Inst) -> String {
    let data = &func.insts[inst];
    let mut out = String::new();
    if let Some(dst) = data.dst {
        let _ = write!(out, "{} = ", write_var(dst));
    }
    let _ = write!(out, "{}", data.opcode);
    match data.opcode {
        Opcode::LoadConstant | Opcode::StackLoad | Opcode::StackStore => {
            let _ = write!(out, " {}", data.imm);
            let operands: Vec<String> = data.uses().map(write_var).collect();
            if !operands.is_empty() {
                let _ = write!(out, ", {}", operands.join(", "));
            }
        }
        Opcode::Call => {
            let _ = write!(out, " {}", data.label.as_deref().unwrap_or("?"));
        }
        Opcode::Jump | Opcode::Label => {
            let _ = write!(out, " {}", data.label.as_deref().unwrap_or("?"));
        }
        Opcode::Branch => {
            if let (Some(then_b), Some(else_b)) = (data.then_block, data.else_block) {
                let _ = write!(
                    out,
                    " {}, then {}, else {}",
                    data.src0.map(write_var).unwrap_or_default(),
                    func.blocks[then_b].label,
                    func.blocks[else_b].label
                );
            }
        }
        _ => {
            let operands: Vec<String> = data.uses().map(write_var).collect();
            if !operands.is_empty() {
                let _ = write!(out, " {}", operands.join(", "));
            }
        }
    }
    out
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", write_function(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{InstructionData, VarData};

    #[test]
    fn dumps_a_load_constant_and_return() {
        let mut f = Function::new("main");
        let entry = f.make_block();
        f.entry = Some(entry);
        let a = f.make_var(VarData::new("a", "int"));
        let mut load = InstructionData::new(Opcode::LoadConstant);
        load.dst = Some(a);
        load.imm = 42;
        f.push_inst(entry, load);
        f.push_inst(entry, InstructionData::new(Opcode::Return));

        let text = write_function(&f);
        assert!(text.contains("function main()"));
        assert!(text.contains("= LoadConstant 42"));
        assert!(text.contains("Return"));
    }
}
