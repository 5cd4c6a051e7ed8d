//! `Module`: the global tables a translation unit builds up while parsing
//! (spec.md §3's "Globals" plus the `TYPES`/`FUNCS` declaration tables).
//!
//! Write-mostly during parsing, read-only afterwards — the frontend is
//! handed a `&mut Module`, every later codegen pass only a `&Module` or a
//! `&mut ir::Function` for one function at a time (SPEC_FULL.md §3).

use crate::token::Token;
use shecc_codegen::ir::{Func, FuncData, Function, Ty, TypeData};
use shecc_entity::{EntityRef, PrimaryMap};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::rc::Rc;

/// Name of the compiler-synthesized function that holds global variable
/// initializers (spec.md §3: "constant-folds ... before emitting a
/// `load_constant` + `assign` pair into the implicit global function's
/// entry block").
pub const GLOBAL_INIT_FUNC: &str = "__global_init";

/// A declared global variable: a named `.data`/`.bss` slot every function
/// addresses by label (via `load_data_address`) rather than by a shared
/// `Var` index, since `Var`s are scoped to one `ir::Function`'s arena.
#[derive(Clone, Debug)]
pub struct GlobalVar {
    pub name: String,
    pub type_name: String,
    pub ptr_depth: u32,
    pub array_size: Option<u32>,
    pub size: u32,
}

/// The declaration tables and per-file caches built up across one
/// compilation: types, functions, enum/macro constants, and the
/// `#include`/token caches that make repeated inclusion of one file cheap.
pub struct Module {
    /// Named types (`void`, `char`, `int`, struct/union/typedef tags),
    /// keyed by their declared function bodies.
    pub types_table: PrimaryMap<Ty, TypeData>,
    type_index: HashMap<String, Ty>,

    /// Declared functions, including `GLOBAL_INIT_FUNC` and libc builtins.
    pub funcs: PrimaryMap<Func, FuncData>,
    func_index: HashMap<String, Func>,

    /// Each declared function's compiled-so-far IR, keyed the same as
    /// `funcs`. Kept separate from `FuncData` so codegen passes can borrow
    /// one `Function` mutably while `funcs`/`type_index` stay read-only.
    pub bodies: HashMap<Func, Function>,

    /// Enum members and numeric object-like macros that fold to a plain
    /// integer constant.
    pub constants: HashMap<String, i64>,
    /// `#define NAME OTHER_NAME`-style aliases that resolve to another
    /// already-known constant rather than introducing a new value.
    pub aliases: HashMap<String, i64>,

    /// Files already entered via `#include`, for `#pragma once` /
    /// double-inclusion-guard short-circuiting.
    pragma_once_files: HashSet<PathBuf>,
    /// Per-file lexed token cache (spec.md §4.2's include cache contract):
    /// a second `#include` of the same path is a cache hit, not a re-lex.
    token_cache: HashMap<PathBuf, Rc<Vec<Token>>>,

    /// String literal bytes bound for `.rodata`, labeled in declaration
    /// order (`__str0`, `__str1`, ...), read by `shecc-elf` when it lays
    /// out the data segment.
    pub rodata: Vec<(String, Vec<u8>)>,

    /// Declared global variables, keyed by name.
    pub globals: HashMap<String, GlobalVar>,

    global_init: Func,
}

impl Module {
    /// A fresh module with its implicit global-initializer function
    /// already declared.
    pub fn new() -> Self {
        let mut funcs = PrimaryMap::new();
        let mut func_index = HashMap::new();
        let mut bodies = HashMap::new();

        let global_init = funcs.push(FuncData {
            name: GLOBAL_INIT_FUNC.to_string(),
            return_type: "void".to_string(),
            param_types: Vec::new(),
            is_variadic: false,
            is_builtin: true,
            func_ref: Func::new(0),
        });
        funcs[global_init].func_ref = global_init;
        func_index.insert(GLOBAL_INIT_FUNC.to_string(), global_init);
        let mut body = Function::new(GLOBAL_INIT_FUNC);
        body.is_builtin = true;
        let entry = body.make_block();
        body.entry = Some(entry);
        body.exit = Some(entry);
        bodies.insert(global_init, body);

        Self {
            types_table: PrimaryMap::new(),
            type_index: HashMap::new(),
            funcs,
            func_index,
            bodies,
            constants: HashMap::new(),
            aliases: HashMap::new(),
            pragma_once_files: HashSet::new(),
            token_cache: HashMap::new(),
            rodata: Vec::new(),
            globals: HashMap::new(),
            global_init,
        }
    }

    /// Declare a global variable, returning `false` if `name` was already
    /// declared (the caller treats this as a redefinition error).
    pub fn declare_global(&mut self, global: GlobalVar) -> bool {
        if self.globals.contains_key(&global.name) {
            return false;
        }
        self.globals.insert(global.name.clone(), global);
        true
    }

    /// Look up a declared global variable by name.
    pub fn lookup_global(&self, name: &str) -> Option<&GlobalVar> {
        self.globals.get(name)
    }

    /// Intern a string literal's bytes into `.rodata`, returning the label
    /// `load_data_address` should reference for it. Identical byte strings
    /// are not deduplicated — matching the original compiler's one-literal-
    /// one-slot behavior, which keeps `__LINE__`/`__FILE__` expansions and
    /// otherwise-identical literals independently addressable.
    pub fn intern_string(&mut self, bytes: Vec<u8>) -> String {
        let label = format!("__str{}", self.rodata.len());
        self.rodata.push((label.clone(), bytes));
        label
    }

    /// The implicit function that holds every global variable's
    /// initializer.
    pub fn global_init_func(&self) -> Func {
        self.global_init
    }

    /// Register a named type, replacing an existing incomplete forward
    /// declaration with the same name if one is pending.
    pub fn declare_type(&mut self, data: TypeData) -> Ty {
        let name = data.name.clone();
        if let Some(&existing) = self.type_index.get(&name) {
            if self.types_table[existing].incomplete {
                self.types_table[existing] = data;
                return existing;
            }
        }
        let ty = self.types_table.push(data);
        self.type_index.insert(name, ty);
        ty
    }

    /// Look up a named type.
    pub fn lookup_type(&self, name: &str) -> Option<Ty> {
        self.type_index.get(name).copied()
    }

    /// Declare a function, returning its `Func` reference and an empty
    /// `Function` body ready to be filled in by the builder.
    pub fn declare_func(&mut self, data: FuncData) -> Func {
        let name = data.name.clone();
        let func = self.funcs.push(data);
        self.funcs[func].func_ref = func;
        self.func_index.insert(name.clone(), func);
        self.bodies.insert(func, Function::new(name));
        func
    }

    /// Look up a declared function by name.
    pub fn lookup_func(&self, name: &str) -> Option<Func> {
        self.func_index.get(name).copied()
    }

    /// Has `path` already been entered via `#include` under a
    /// `#pragma once` (or an equivalent include guard) — the preprocessor
    /// uses this to turn a repeat inclusion into a no-op.
    pub fn mark_pragma_once(&mut self, path: PathBuf) -> bool {
        !self.pragma_once_files.insert(path)
    }

    /// Cached tokens for `path`, if this file has already been lexed once
    /// this compilation.
    pub fn cached_tokens(&self, path: &std::path::Path) -> Option<Rc<Vec<Token>>> {
        self.token_cache.get(path).cloned()
    }

    /// Record the lexed token stream for `path` so a later `#include` of
    /// the same file is a cache hit.
    pub fn cache_tokens(&mut self, path: PathBuf, tokens: Rc<Vec<Token>>) {
        self.token_cache.insert(path, tokens);
    }

    /// Has `path` already hit a `#pragma once` line? A read-only check, for
    /// deciding whether a fresh `#include` of this path should be skipped
    /// entirely, as opposed to [`Module::mark_pragma_once`] which also
    /// records a fresh sighting.
    pub fn is_pragma_once(&self, path: &std::path::Path) -> bool {
        self.pragma_once_files.contains(path)
    }
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shecc_codegen::ir::BaseKind;

    #[test]
    fn new_module_has_a_global_init_function() {
        let m = Module::new();
        let f = m.lookup_func(GLOBAL_INIT_FUNC).unwrap();
        assert_eq!(f, m.global_init_func());
        assert!(m.bodies.contains_key(&f));
    }

    #[test]
    fn declaring_a_type_twice_completes_a_forward_declaration() {
        let mut m = Module::new();
        let fwd = m.declare_type(TypeData::incomplete_tag("list", BaseKind::Struct));
        assert!(m.types_table[fwd].incomplete);

        let complete = m.declare_type(TypeData::scalar("list", BaseKind::Struct, 8));
        assert_eq!(fwd, complete);
        assert!(!m.types_table[fwd].incomplete);
    }

    #[test]
    fn pragma_once_reports_the_second_inclusion() {
        let mut m = Module::new();
        let path = PathBuf::from("a.h");
        assert!(!m.mark_pragma_once(path.clone()));
        assert!(m.mark_pragma_once(path));
    }

    #[test]
    fn token_cache_round_trips() {
        let mut m = Module::new();
        let path = PathBuf::from("a.h");
        assert!(m.cached_tokens(&path).is_none());
        m.cache_tokens(path.clone(), Rc::new(Vec::new()));
        assert!(m.cached_tokens(&path).is_some());
    }
}
