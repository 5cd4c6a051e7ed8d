//! Hand-built IR for the one function no C source provides: `_start`
//! (spec.md §6: "entry point at `_start` which calls `main` and invokes
//! `exit` via `__syscall`").
//!
//! There's no surface syntax for this — it's assembled directly out of
//! `shecc_codegen::ir`, the same raw-instruction style
//! `shecc_codegen::context`'s own tests build functions with, rather than
//! routed through `shecc_frontend::builder::FunctionBuilder` (which exists
//! to translate C statements, not to synthesize three instructions).

use shecc_codegen::ir::{Function, InstructionData, Opcode, VarData};

/// Build `_start`'s body: call `__global_init`, call `main`, pass its
/// return value on to `exit`. `exit` (part of the bundled libc) is the one
/// that actually traps via `__syscall`; `_start` only has to chain the
/// three calls in order.
pub fn build_start() -> Function {
    let mut f = Function::new("_start");
    f.is_builtin = true;
    let entry = f.make_block();
    f.entry = Some(entry);
    f.exit = Some(entry);

    f.push_inst(entry, call_no_args("__global_init", None));

    let ret = f.make_var(VarData::new("__start_ret", "int"));
    f.push_inst(entry, call_no_args("main", Some(ret)));

    let mut push = InstructionData::new(Opcode::Push);
    push.src0 = Some(ret);
    push.size = 0; // last (only) argument
    f.push_inst(entry, push);

    f.push_inst(entry, call_no_args("exit", None));

    // `exit` never returns, but every block this compiler emits still
    // needs a terminator for `flatten`/`binemit` to linearize past.
    f.push_inst(entry, InstructionData::new(Opcode::Return));

    f
}

fn call_no_args(callee: &str, dst: Option<shecc_codegen::ir::Var>) -> InstructionData {
    let mut call = InstructionData::new(Opcode::Call);
    call.label = Some(callee.to_string());
    call.dst = dst;
    call
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_calls_global_init_main_and_exit_in_order() {
        let f = build_start();
        let entry = f.entry.unwrap();
        let labels: Vec<&str> = f.blocks[entry]
            .insts
            .iter()
            .filter_map(|&inst| f.insts[inst].label.as_deref())
            .collect();
        assert_eq!(labels, ["__global_init", "main", "exit"]);
    }

    #[test]
    fn start_ends_with_a_terminator() {
        let f = build_start();
        let entry = f.entry.unwrap();
        let last = *f.blocks[entry].insts.last().unwrap();
        assert!(f.insts[last].opcode.is_terminator());
    }
}
