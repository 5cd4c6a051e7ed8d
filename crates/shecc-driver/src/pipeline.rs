//! End-to-end orchestration: parse a C source file into one `Module`,
//! compile every declared function, lay out a whole program, and write a
//! static ELF executable.
//!
//! The address-assignment problem this solves is the same one
//! `cranelift_codegen::binemit`'s own doc comments describe for variable-
//! width ISAs, simplified by this compiler's fixed-width encoding
//! (`shecc_codegen::binemit`'s module doc): every function's final size is
//! known before any instruction is actually encoded, so one sizing pass
//! across the whole program (not an iterative relaxation) is enough to
//! hand every function, string literal, and global its final address
//! before a single byte of machine code is produced.

use crate::cli::Cli;
use crate::startup;
use anyhow::{anyhow, bail, Context as _};
use shecc_codegen::binemit;
use shecc_codegen::context::Context;
use shecc_codegen::ir::{Func, FuncData};
use shecc_codegen::isa::Isa;
use shecc_codegen::settings::Flags;
use shecc_elf::{Layout, Object, Symbol};
use shecc_frontend::lexer::Lexer;
use shecc_frontend::module::Module;
use shecc_frontend::parser::Parser;
use shecc_frontend::preprocess::Preprocessor;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const LIBC_SOURCE: &str = include_str!("../../../libc/libc.c");

/// Run the whole pipeline for `cli`, writing the finished executable to its
/// requested (or default `a.out`) output path.
pub fn run(cli: &Cli) -> anyhow::Result<()> {
    let isa_kind = Isa::from_str(&cli.target)
        .ok_or_else(|| anyhow!("unknown --target `{}` (expected arm32 or riscv32)", cli.target))?;
    let isa = isa_kind.isa();
    let flags = Flags::new(cli.hardware_mul_div, cli.dump_ir);

    let user_source = fs::read_to_string(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;

    let mut module = Module::new();
    let mut pp = Preprocessor::new(cli.custom_include_dirs.clone());
    match isa_kind {
        Isa::Arm32 => pp.define_int("__ARM__", 1),
        Isa::Riscv32 => pp.define_int("__RISCV__", 1),
    }

    let mut tokens = Vec::new();
    if !cli.no_libc {
        let libc_tokens = Lexer::new("<libc>", LIBC_SOURCE)
            .lex()
            .map_err(|d| anyhow!("{}", d))?;
        let mut libc_tokens = pp
            .process("<libc>".into(), libc_tokens, &mut module)
            .map_err(|d| anyhow!("{}", d))?;
        libc_tokens.pop(); // drop its trailing `Eof`; the user stream supplies the real one
        tokens.extend(libc_tokens);
    }

    let file_name: std::rc::Rc<str> = cli.input.to_string_lossy().into_owned().into();
    let user_tokens = Lexer::new(file_name.clone(), &user_source)
        .lex()
        .map_err(|d| anyhow!("{}", d))?;
    let user_tokens = pp
        .process(file_name, user_tokens, &mut module)
        .map_err(|d| anyhow!("{}", d))?;
    tokens.extend(user_tokens);

    Parser::new(tokens, &mut module)
        .parse_translation_unit()
        .map_err(|d| anyhow!("{}", d))?;

    let start = module.declare_func(FuncData {
        name: "_start".to_string(),
        return_type: "void".to_string(),
        param_types: Vec::new(),
        is_variadic: false,
        is_builtin: true,
        func_ref: Func::new(0),
    });
    module.bodies.insert(start, startup::build_start());

    // `_start` must be emitted first (`shecc_elf::layout::Layout::entry_addr`
    // is always `.text`'s first byte); every other declared function
    // follows in declaration order. Forward declarations with no body
    // (`__syscall`) are skipped — there's nothing to compile.
    let order: Vec<Func> = std::iter::once(start)
        .chain(module.funcs.keys().filter(|&f| f != start))
        .filter(|&f| module.bodies.get(&f).and_then(|b| b.entry).is_some())
        .collect();

    // Pass 1: legalize/SSA/regalloc/peephole every function and measure its
    // final size, without emitting any bytes (no address exists yet).
    let mut sizes = HashMap::new();
    for &func in &order {
        let name = module.funcs[func].name.clone();
        let body = module
            .bodies
            .get_mut(&func)
            .ok_or_else(|| anyhow!("`{name}` has no body"))?;
        let mut ctx = Context::new();
        ctx.prepare(body, isa.as_ref(), &flags)
            .map_err(|e| anyhow!("compiling `{name}`: {e}"))?;
        sizes.insert(func, binemit::measure_function(body, isa.as_ref()));
    }

    let text_size: u32 = order.iter().map(|f| sizes[f]).sum();
    let rodata_size: u32 = module.rodata.iter().map(|(_, bytes)| bytes.len() as u32).sum();
    let bss_size: u32 = module.globals.values().map(|g| g.size).sum();
    let layout = Layout::compute(text_size, rodata_size, 0, bss_size);

    let mut external_symbols: HashMap<String, u32> = HashMap::new();
    let mut func_offsets: HashMap<Func, u32> = HashMap::new();
    let mut offset = layout.text_addr;
    for &func in &order {
        let name = module.funcs[func].name.clone();
        func_offsets.insert(func, offset);
        external_symbols.insert(name, offset);
        offset += sizes[&func];
    }

    let mut rodata_bytes = Vec::new();
    let mut offset = layout.rodata_addr;
    for (label, bytes) in &module.rodata {
        external_symbols.insert(label.clone(), offset);
        offset += bytes.len() as u32;
        rodata_bytes.extend_from_slice(bytes);
    }

    let mut global_addrs: HashMap<String, u32> = HashMap::new();
    let mut offset = layout.bss_addr;
    let mut globals: Vec<_> = module.globals.values().collect();
    globals.sort_by(|a, b| a.name.cmp(&b.name));
    for global in &globals {
        external_symbols.insert(global.name.clone(), offset);
        global_addrs.insert(global.name.clone(), offset);
        offset += global.size;
    }

    // Pass 2: emit every function's machine code at its now-final address.
    let mut text = Vec::with_capacity(text_size as usize);
    let mut symbols = Vec::new();
    for &func in &order {
        let name = module.funcs[func].name.clone();
        let body = module.bodies.get(&func).expect("body present from pass 1");
        let base = func_offsets[&func];
        let out = binemit::emit_function(body, isa.as_ref(), base, &external_symbols)
            .map_err(|e| anyhow!("emitting `{name}`: {e}"))?;
        text.extend_from_slice(&out.code);
        symbols.push(Symbol::function(name, base, out.size, 1));
    }
    if text.len() as u32 != text_size {
        bail!("text section size mismatch: measured {text_size}, emitted {}", text.len());
    }

    for global in &globals {
        symbols.push(Symbol::object(global.name.clone(), global_addrs[&global.name], global.size, 4));
    }

    let mut object = Object::new(isa_kind, text, rodata_bytes, Vec::new(), bss_size, layout);
    for sym in symbols {
        object.add_symbol(sym);
    }
    let bytes = object.write().map_err(|e| anyhow!("{e}"))?;

    let output = cli.output.clone().unwrap_or_else(|| Path::new("a.out").to_path_buf());
    fs::write(&output, &bytes).with_context(|| format!("writing {}", output.display()))?;
    make_executable(&output)?;

    log::info!("wrote {} ({} bytes)", output.display(), bytes.len());
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}
