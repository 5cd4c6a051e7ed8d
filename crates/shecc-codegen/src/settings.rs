//! Compilation-wide flags, threaded explicitly through `Context::compile`
//! instead of read from global statics (see spec.md §9's design note on
//! threading global state through a compiler context).

/// Flags controlling a single compilation.
#[derive(Clone, Debug)]
pub struct Flags {
    /// Emit hardware multiply/divide instructions instead of calling the
    /// soft-mul/div helpers bundled in the runtime. Corresponds to the `+m`
    /// CLI flag in spec.md §6.
    pub hardware_mul_div: bool,
    /// Run the IR/liveness/CSSA verifier between passes. Expensive; on by
    /// default in debug builds the same way cranelift's `enable_verifier`
    /// flag defaults on for development builds.
    pub enable_verifier: bool,
    /// Print first- and second-phase IR to stdout before codegen
    /// (`--dump-ir`).
    pub dump_ir: bool,
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            hardware_mul_div: false,
            enable_verifier: cfg!(debug_assertions),
            dump_ir: false,
        }
    }
}

impl Flags {
    /// Build flags from the driver's parsed CLI options.
    pub fn new(hardware_mul_div: bool, dump_ir: bool) -> Self {
        Self {
            hardware_mul_div,
            dump_ir,
            ..Default::default()
        }
    }
}
