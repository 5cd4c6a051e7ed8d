//! Register allocation entry point (spec.md §4.5): liveness, then
//! linear-scan, run in that order, mirroring how
//! `cranelift_codegen::regalloc::context::Context::run` sequences its own
//! liveness pass ahead of the allocator proper.

pub mod linear_scan;
pub mod liveness;
pub mod register_set;
pub mod spill_legalize;

pub use liveness::Liveness;
pub use register_set::RegisterSet;

use crate::flowgraph::ControlFlowGraph;
use crate::ir::Function;
use crate::isa::TargetIsa;

/// Assign every non-global variable in `func` a physical register or stack
/// slot, compute the function's frame size, and legalize any spilled
/// operand an ISA backend can't address directly. `func` must already be in
/// SSA form or out of it consistently with how `cfg` was built; this pass
/// doesn't care which, it only reads `ControlFlowGraph` edges and
/// `InstructionData::{dst, uses}`.
pub fn allocate(func: &mut Function, cfg: &ControlFlowGraph, isa: &dyn TargetIsa) {
    let liveness = liveness::analyze(func, cfg);
    liveness::assign_intervals(func, cfg, &liveness);
    linear_scan::allocate(func, isa);
    spill_legalize::run(func, isa);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{InstructionData, Location, Opcode, VarData};
    use crate::isa::arm32::Arm32Isa;

    #[test]
    fn allocate_assigns_a_register_to_a_simple_value() {
        let mut f = Function::new("t");
        let entry = f.make_block();
        f.entry = Some(entry);

        let a = f.make_var(VarData::new("a", "int"));
        let mut d = InstructionData::new(Opcode::LoadConstant);
        d.dst = Some(a);
        d.imm = 1;
        f.push_inst(entry, d);

        let cfg = ControlFlowGraph::with_function(&f);
        let isa = Arm32Isa;
        allocate(&mut f, &cfg, &isa);

        assert!(matches!(f.vars[a].location, Location::Reg(_)));
    }
}
