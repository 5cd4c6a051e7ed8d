//! `Context`: the single entry point that drives one function through every
//! pass in this crate, modeled on
//! `cranelift_codegen::Context`/`cranelift_codegen::regalloc::context::
//! Context::run`'s "one struct owns the per-compilation scratch state and
//! runs the passes in a fixed order" shape.

use crate::binemit::{self, EmittedFunction};
use crate::dominator_tree::DominatorTree;
use crate::flowgraph::ControlFlowGraph;
use crate::ir::{Function, InstructionData, Opcode};
use crate::isa::TargetIsa;
use crate::regalloc;
use crate::result::CodegenResult;
use crate::settings::Flags;
use crate::ssa;
use crate::verifier;
use std::collections::HashMap;

/// Scratch state reused across the passes that compile one [`Function`].
///
/// A fresh `Context` is cheap (every field starts empty); callers compiling
/// many functions in one `shecc` invocation build one per function rather
/// than trying to reuse it across functions, since `cfg`/`domtree` are only
/// valid for the `Function` they were last computed from.
pub struct Context {
    /// Control-flow graph of the function currently being compiled.
    pub cfg: ControlFlowGraph,
    /// Dominator tree of the function currently being compiled.
    pub domtree: DominatorTree,
}

impl Context {
    /// A fresh, empty context.
    pub fn new() -> Self {
        Self {
            cfg: ControlFlowGraph::new(),
            domtree: DominatorTree::new(),
        }
    }

    /// Run every pass over `func` up to, but not including, machine-code
    /// emission: legalize, build the CFG and dominator tree, construct and
    /// optimize SSA, verify, allocate registers, verify again, peephole.
    ///
    /// Split out from [`Context::compile`] because `shecc-driver` needs
    /// every function's final size (`crate::binemit::measure_function`,
    /// only meaningful once this has run) before any function can be
    /// assigned a `.text` address, and addresses are in turn needed to
    /// build the `external_symbols` table [`Context::compile`] requires —
    /// so sizing has to happen as its own pass across the whole program
    /// before any one function is emitted.
    pub fn prepare(&mut self, func: &mut Function, isa: &dyn TargetIsa, flags: &Flags) -> CodegenResult<()> {
        log::debug!("compiling `{}` for {:?}", func.name, isa.isa());

        legalize(func, isa, flags);

        self.cfg.compute(func);
        self.domtree.compute(func, &self.cfg);

        ssa::construct(func, &self.cfg, &self.domtree);
        ssa::optimize(func);

        if flags.dump_ir {
            println!("; first phase (post-SSA) IR for `{}`", func.name);
            println!("{}", crate::write::write_function(func));
        }

        if flags.enable_verifier {
            verifier::verify_function_result(func, &self.cfg)?;
        }

        // SSA construction can add blocks' worth of φs but never changes
        // control flow, so the CFG computed above is still valid; recompute
        // anyway since `ssa::optimize`'s branch simplification (when wired
        // up) can drop edges.
        self.cfg.compute(func);

        regalloc::allocate(func, &self.cfg, isa);

        if flags.enable_verifier {
            if let Some(e) = verifier::verify_allocation(func).into_iter().next() {
                return Err(crate::result::CodegenError::Verifier { message: e.message });
            }
        }

        crate::peephole::run(func);

        if flags.dump_ir {
            println!("; second phase (post-allocation) IR for `{}`", func.name);
            println!("{}", crate::write::write_function(func));
        }

        Ok(())
    }

    /// Run every pass over `func` in order and emit its machine code.
    ///
    /// `base_offset` is `func`'s final byte address within `.text`; the
    /// caller (`shecc-driver`, wiring `shecc-elf`) assigns these up front
    /// across the whole program, since every instruction this compiler
    /// emits is a fixed 1 or 2 words and the total layout is therefore
    /// known before any function is actually encoded (see
    /// `shecc-elf::layout`).
    ///
    /// Returns the emitted machine code; `func` itself is left mutated in
    /// place (SSA-renamed, register-allocated, peepholed) for callers that
    /// also want to `--dump-ir` the final form.
    pub fn compile(
        &mut self,
        func: &mut Function,
        isa: &dyn TargetIsa,
        flags: &Flags,
        base_offset: u32,
        external_symbols: &HashMap<String, u32>,
    ) -> CodegenResult<EmittedFunction> {
        self.prepare(func, isa, flags)?;
        let out = binemit::emit_function(func, isa, base_offset, external_symbols)?;
        log::trace!("`{}` emitted {} bytes", func.name, out.size);
        Ok(out)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Target-dependent opcode substitutions that must happen before any other
/// pass sees the function (spec.md §4.7's `-m`/`+m` switch): when `isa`
/// needs software multiply/divide help and `flags.hardware_mul_div` wasn't
/// requested, every `Mul`/`Div`/`Mod` becomes a `Call` to the bundled
/// soft-helper routine instead. This mirrors
/// `cranelift_codegen::legalizer`'s role of rewriting opcodes the target
/// can't encode directly into ones it can, run once up front rather than
/// interleaved with other passes.
fn legalize(func: &mut Function, isa: &dyn TargetIsa, flags: &Flags) {
    if !isa.needs_soft_mul_div(flags.hardware_mul_div) {
        return;
    }
    for block in func.block_keys() {
        let insts = func.blocks[block].insts.clone();
        for inst in insts {
            let data = func.insts[inst].clone();
            let helper = match data.opcode {
                Opcode::Mul => "__mul_si3",
                Opcode::Div => "__div_si3",
                Opcode::Mod => "__mod_si3",
                _ => continue,
            };
            let mut call = InstructionData::new(Opcode::Call);
            call.dst = data.dst;
            call.src0 = data.src0;
            call.src1 = data.src1;
            call.label = Some(helper.to_string());
            func.insts[inst] = call;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{InstructionData, VarData};
    use crate::isa::riscv::Riscv32Isa;

    #[test]
    fn legalize_rewrites_mul_to_a_helper_call_when_soft_mul_div_is_needed() {
        let mut f = Function::new("t");
        let entry = f.make_block();
        f.entry = Some(entry);
        let a = f.make_var(VarData::new("a", "int"));
        let b = f.make_var(VarData::new("b", "int"));
        let c = f.make_var(VarData::new("c", "int"));
        let mut mul = InstructionData::new(Opcode::Mul);
        mul.dst = Some(c);
        mul.src0 = Some(a);
        mul.src1 = Some(b);
        let inst = f.push_inst(entry, mul);
        f.push_inst(entry, InstructionData::new(Opcode::Return));

        let isa = Riscv32Isa;
        let flags = Flags::new(false, false);
        legalize(&mut f, &isa, &flags);

        assert_eq!(f.insts[inst].opcode, Opcode::Call);
        assert_eq!(f.insts[inst].label.as_deref(), Some("__mul_si3"));
    }

    #[test]
    fn compile_produces_machine_code_for_a_trivial_function() {
        let mut f = Function::new("t");
        let entry = f.make_block();
        f.entry = Some(entry);
        let a = f.make_var(VarData::new("a", "int"));
        let mut load = InstructionData::new(Opcode::LoadConstant);
        load.dst = Some(a);
        load.imm = 5;
        f.push_inst(entry, load);
        f.push_inst(entry, InstructionData::new(Opcode::Return));

        let isa = Riscv32Isa;
        let flags = Flags::default();
        let mut ctx = Context::new();
        let out = ctx
            .compile(&mut f, &isa, &flags, 0, &HashMap::new())
            .expect("compiles");
        assert!(out.size > 0);
    }
}
