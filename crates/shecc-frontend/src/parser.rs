//! Recursive-descent parser and first-phase IR builder (spec.md §4.3,
//! SPEC_FULL.md §4.3/§4.3.1).
//!
//! The parser never builds a separate AST: each grammar production calls
//! straight into [`crate::builder::FunctionBuilder`] as it recognizes
//! syntax, the same single-pass shape `cranelift_frontend::FunctionBuilder`
//! gives other front ends (minus the on-the-fly SSA construction — this
//! compiler's SSA pass runs later, over the finished imperative IR).

use crate::builder::{FunctionBuilder, FunctionBuilderContext};
use crate::diagnostic::DiagResult;
use crate::err;
use crate::module::{GlobalVar, Module};
use crate::token::{Keyword, Punct, Token, TokenKind};
use shecc_codegen::ir::{BaseKind, Block, Func, FuncData, Function, Opcode, TypeData, Var, WORD_SIZE};
use shecc_codegen::SourceLoc;
use shecc_entity::EntityRef;
use std::collections::HashMap;

/// A type name together with its pointer indirection depth and, for an
/// array declarator, its element count — the three pieces every declarator
/// production (`parse_declarator`) produces.
#[derive(Clone, Debug)]
struct TypeSpec {
    name: String,
    ptr_depth: u32,
    array_size: Option<u32>,
}

/// An expression result: the `Var` holding its value, plus enough of its
/// static type to keep pointer arithmetic and `sizeof` correct.
#[derive(Clone, Copy, Debug)]
struct Value {
    var: Var,
    ptr_depth: u32,
}

/// A resolved l-value: the address to read/write through, the size of one
/// access, and the pointer depth/type of the pointed-to object (so `*p = *p
/// + 1` scales correctly when `p` itself is `int **`).
///
/// Named scalar/pointer variables are modeled as a slot holding a *value*
/// (`from_slot = true`): one `read` of `addr` yields that value, and that
/// value is itself an address only one level further in (used once, for
/// `*p`/`p[i]`/`p->f`). Named arrays and structs are modeled as a slot that
/// *is* its own address, the same array-decays-to-a-pointer rule C itself
/// uses (`from_slot = false`): no `read` is needed before using `addr`
/// directly, matching a computed `.`/`->`/`[]`/`*` address, which is always
/// already concrete.
struct Place {
    addr: Var,
    size: u32,
    type_name: String,
    ptr_depth: u32,
    from_slot: bool,
}

/// A deferred postfix `++`/`--`: apply `delta` to `var` once the enclosing
/// full expression reaches its next sequence point (SPEC_FULL.md §4.3's
/// "deferred post-inc/dec stash flushed at sequence points").
struct PendingIncDec {
    addr: Var,
    size: u32,
    delta: i64,
}

/// Parses one translation unit's token stream into `module`'s `funcs`,
/// `bodies`, `types_table` and `globals`.
pub struct Parser<'m> {
    toks: Vec<Token>,
    pos: usize,
    module: &'m mut Module,
    typedefs: HashMap<String, String>,
    pending: Vec<PendingIncDec>,
    break_targets: Vec<Block>,
    continue_targets: Vec<Block>,
    labels: HashMap<String, Block>,
}

impl<'m> Parser<'m> {
    /// Parse `tokens` (already lexed and preprocessed) into `module`.
    pub fn new(tokens: Vec<Token>, module: &'m mut Module) -> Self {
        Self {
            toks: tokens,
            pos: 0,
            module,
            typedefs: HashMap::new(),
            pending: Vec::new(),
            break_targets: Vec::new(),
            continue_targets: Vec::new(),
            labels: HashMap::new(),
        }
    }

    /// Parse every top-level declaration until end of file.
    pub fn parse_translation_unit(&mut self) -> DiagResult<()> {
        for kind in [BaseKind::Void, BaseKind::Char, BaseKind::Int] {
            let (name, size) = match kind {
                BaseKind::Void => ("void", 0),
                BaseKind::Char => ("char", 1),
                BaseKind::Int => ("int", WORD_SIZE),
                _ => unreachable!(),
            };
            if self.module.lookup_type(name).is_none() {
                self.module.declare_type(TypeData::scalar(name, kind, size));
            }
        }
        if self.module.lookup_type("_Bool").is_none() {
            self.module.declare_type(TypeData::scalar("_Bool", BaseKind::Char, 1));
        }

        while !self.at_eof() {
            self.parse_external_decl()?;
        }
        Ok(())
    }

    // ---- token cursor ----

    fn peek(&self) -> &Token {
        &self.toks[self.pos]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.toks.get(self.pos + offset).unwrap_or(&self.toks[self.toks.len() - 1])
    }

    fn loc(&self) -> SourceLoc {
        self.peek().loc.clone()
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn bump(&mut self) -> Token {
        let t = self.toks[self.pos].clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn eat_punct(&mut self, p: Punct) -> bool {
        if matches!(&self.peek().kind, TokenKind::Punct(q) if *q == p) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: Punct) -> DiagResult<()> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            err!(self.loc(), "expected `{:?}`, found {:?}", p, self.peek().kind)
        }
    }

    fn eat_keyword(&mut self, k: Keyword) -> bool {
        if matches!(&self.peek().kind, TokenKind::Keyword(kw) if *kw == k) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn ident_text(&self) -> Option<String> {
        match &self.peek().kind {
            TokenKind::Ident(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn expect_ident(&mut self) -> DiagResult<String> {
        match self.ident_text() {
            Some(s) => {
                self.bump();
                Ok(s)
            }
            None => err!(self.loc(), "expected an identifier, found {:?}", self.peek().kind),
        }
    }

    // ---- types ----

    /// Does the upcoming token sequence start a declaration (a type
    /// keyword, a struct/union/enum tag, or a known `typedef` name)?
    fn at_type_start(&self) -> bool {
        match &self.peek().kind {
            TokenKind::Keyword(Keyword::Void | Keyword::Char | Keyword::Int | Keyword::Bool | Keyword::Struct | Keyword::Union | Keyword::Enum) => true,
            TokenKind::Ident(s) => self.typedefs.contains_key(s),
            _ => false,
        }
    }

    /// Parse a base type-specifier (`void`, `char`, `int`, `_Bool`, `struct
    /// NAME { ... }`, `union NAME { ... }`, `enum NAME { ... }`, or a
    /// `typedef`'d name), returning its resolved canonical name.
    fn parse_type_spec(&mut self) -> DiagResult<String> {
        let loc = self.loc();
        match self.bump().kind {
            TokenKind::Keyword(Keyword::Void) => Ok("void".to_string()),
            TokenKind::Keyword(Keyword::Char) => Ok("char".to_string()),
            TokenKind::Keyword(Keyword::Int) => Ok("int".to_string()),
            TokenKind::Keyword(Keyword::Bool) => Ok("_Bool".to_string()),
            TokenKind::Keyword(kw @ (Keyword::Struct | Keyword::Union)) => {
                let kind = if kw == Keyword::Struct { BaseKind::Struct } else { BaseKind::Union };
                self.parse_struct_or_union(kind)
            }
            TokenKind::Keyword(Keyword::Enum) => self.parse_enum(),
            TokenKind::Ident(name) if self.typedefs.contains_key(&name) => Ok(self.typedefs[&name].clone()),
            other => err!(loc, "expected a type, found {:?}", other),
        }
    }

    fn parse_struct_or_union(&mut self, kind: BaseKind) -> DiagResult<String> {
        let tag = if let Some(name) = self.ident_text() {
            self.bump();
            name
        } else {
            format!("__anon_tag{}", self.module.types_table.len())
        };

        if !self.eat_punct(Punct::LBrace) {
            // Forward reference: `struct list *next;` before the body.
            if self.module.lookup_type(&tag).is_none() {
                self.module.declare_type(TypeData::incomplete_tag(&tag, kind));
            }
            return Ok(tag);
        }

        if self.module.lookup_type(&tag).is_none() {
            self.module.declare_type(TypeData::incomplete_tag(&tag, kind));
        }

        let mut fields = Vec::new();
        let mut offset = 0u32;
        let mut max_size = 0u32;
        while !self.eat_punct(Punct::RBrace) {
            let member_base = self.parse_type_spec()?;
            loop {
                let decl = self.parse_declarator(&member_base)?;
                let member_size = self.sized_of(&decl.name, decl.ptr_depth, decl.array_size)?;
                let field = shecc_codegen::ir::Field {
                    name: decl.name.clone(),
                    type_name: decl.name.clone(),
                    offset: if kind == BaseKind::Union { 0 } else { offset },
                    ptr_depth: decl.ptr_depth,
                    array_size: decl.array_size,
                };
                if kind == BaseKind::Struct {
                    offset += member_size;
                }
                max_size = max_size.max(member_size);
                fields.push(field);
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
            self.expect_punct(Punct::Semi)?;
        }
        self.expect_punct(Punct::Semi)?;

        let size = if kind == BaseKind::Struct { offset } else { max_size };
        self.module.declare_type(TypeData {
            name: tag.clone(),
            kind,
            size,
            fields,
            alias_of: None,
            incomplete: false,
        });
        Ok(tag)
    }

    fn parse_enum(&mut self) -> DiagResult<String> {
        let tag = if let Some(name) = self.ident_text() {
            self.bump();
            name
        } else {
            format!("__anon_enum{}", self.module.types_table.len())
        };
        if self.eat_punct(Punct::LBrace) {
            let mut next_value = 0i64;
            loop {
                let name = self.expect_ident()?;
                if self.eat_punct(Punct::Assign) {
                    next_value = self.parse_const_expr()?;
                }
                self.module.constants.insert(name, next_value);
                next_value += 1;
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
                if matches!(&self.peek().kind, TokenKind::Punct(Punct::RBrace)) {
                    break;
                }
            }
            self.expect_punct(Punct::RBrace)?;
            if self.module.lookup_type(&tag).is_none() {
                self.module.declare_type(TypeData::scalar(&tag, BaseKind::Int, WORD_SIZE));
            }
            self.expect_punct(Punct::Semi)?;
        } else {
            self.expect_punct(Punct::Semi)?;
        }
        Ok("int".to_string())
    }

    /// A constant integer expression, evaluated outright (enum values,
    /// array bounds) rather than emitted as IR.
    fn parse_const_expr(&mut self) -> DiagResult<i64> {
        let loc = self.loc();
        let sign = if self.eat_punct(Punct::Minus) { -1 } else { true as i64 };
        match self.bump().kind {
            TokenKind::IntLit(n) => Ok(sign * n),
            TokenKind::CharLit(c) => Ok(sign * c as i64),
            TokenKind::Ident(name) => self
                .module
                .constants
                .get(&name)
                .copied()
                .map(|v| sign * v)
                .ok_or_else(|| diag(&loc, format!("`{}` is not a compile-time constant", name))),
            other => err!(loc, "expected a constant expression, found {:?}", other),
        }
    }

    /// Parse `*`s, a name, and optional `[N]` array bounds after a base
    /// type has already been consumed.
    fn parse_declarator(&mut self, base: &str) -> DiagResult<TypeSpec> {
        let mut ptr_depth = 0;
        while self.eat_punct(Punct::Star) {
            ptr_depth += 1;
        }
        let name = self.expect_ident()?;
        let mut array_size = None;
        if self.eat_punct(Punct::LBracket) {
            if !matches!(&self.peek().kind, TokenKind::Punct(Punct::RBracket)) {
                array_size = Some(self.parse_const_expr()? as u32);
            }
            self.expect_punct(Punct::RBracket)?;
        }
        Ok(TypeSpec { name, ptr_depth, array_size })
    }

    /// Size in bytes of one object of `(type_name, ptr_depth)`, scaled by
    /// `array_size` if given (SPEC_FULL.md §4.3.1's pointer-arithmetic
    /// scaling and `sizeof` resolution).
    fn sized_of(&self, _decl_name: &str, ptr_depth: u32, array_size: Option<u32>) -> DiagResult<u32> {
        // Only the element size is needed here; callers pass the base type
        // name separately via `type_size`. Array members reuse whatever
        // element size the caller already resolved.
        let _ = array_size;
        Ok(if ptr_depth > 0 { WORD_SIZE } else { 0 })
    }

    /// Size in bytes of one value of type `type_name` at `ptr_depth`
    /// indirections, `array_size` repetitions of it.
    fn type_size(&self, type_name: &str, ptr_depth: u32, array_size: Option<u32>) -> DiagResult<u32> {
        let elem = if ptr_depth > 0 {
            WORD_SIZE
        } else {
            match self.module.lookup_type(type_name) {
                Some(ty) if !self.module.types_table[ty].incomplete => self.module.types_table[ty].size,
                Some(_) => return err!(SourceLoc::synthetic(), "`{}` is used before its definition is complete", type_name),
                None => return err!(SourceLoc::synthetic(), "unknown type `{}`", type_name),
            }
        };
        Ok(elem * array_size.unwrap_or(1).max(1))
    }

    // ---- top level ----

    fn parse_external_decl(&mut self) -> DiagResult<()> {
        if self.eat_keyword(Keyword::Typedef) {
            let base = self.parse_type_spec()?;
            let decl = self.parse_declarator(&base)?;
            self.typedefs.insert(decl.name, base);
            self.expect_punct(Punct::Semi)?;
            return Ok(());
        }

        let base = self.parse_type_spec()?;
        if self.eat_punct(Punct::Semi) {
            // A bare `struct foo;` / `enum bar;` tag declaration.
            return Ok(());
        }

        loop {
            let decl = self.parse_declarator(&base)?;
            if self.eat_punct(Punct::LParen) {
                return self.parse_function(&base, decl);
            }
            self.declare_global(&base, &decl)?;
            if self.eat_punct(Punct::Assign) {
                self.parse_global_initializer(&base, &decl)?;
            }
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::Semi)
    }

    fn declare_global(&mut self, base: &str, decl: &TypeSpec) -> DiagResult<()> {
        let size = self.type_size(base, decl.ptr_depth, decl.array_size)?;
        let ok = self.module.declare_global(GlobalVar {
            name: decl.name.clone(),
            type_name: base.to_string(),
            ptr_depth: decl.ptr_depth,
            array_size: decl.array_size,
            size,
        });
        if !ok {
            return err!(self.loc(), "global `{}` redefined", decl.name);
        }
        Ok(())
    }

    /// Constant-fold a global's initializer and emit the `load_data_address
    /// + write` pair into `__global_init`'s body (spec.md §3).
    fn parse_global_initializer(&mut self, base: &str, decl: &TypeSpec) -> DiagResult<()> {
        let func = self.module.global_init_func();
        let mut body = self.module.bodies.remove(&func).expect("global init body always present");
        let entry = body.entry.expect("global init always has an entry block");
        let mut ctx = FunctionBuilderContext::new();
        {
            let mut b = FunctionBuilder::new(&mut body, &mut ctx);
            b.switch_to_block(entry);
            let addr = b.load_data_address(base, &decl.name);
            if self.eat_punct(Punct::LBrace) {
                let mut index = 0i64;
                loop {
                    if matches!(&self.peek().kind, TokenKind::Punct(Punct::RBrace)) {
                        break;
                    }
                    let v = self.parse_const_expr()?;
                    let c = b.load_constant(base, v);
                    let elem_size = self.type_size(base, decl.ptr_depth, None)?;
                    let slot = if index == 0 {
                        addr
                    } else {
                        let off = b.load_constant("int", index * elem_size as i64);
                        b.binary(Opcode::Add, "int", addr, off)
                    };
                    b.write(slot, c, elem_size);
                    index += 1;
                    if !self.eat_punct(Punct::Comma) {
                        break;
                    }
                }
                self.expect_punct(Punct::RBrace)?;
            } else {
                let v = self.parse_const_expr()?;
                let c = b.load_constant(base, v);
                let size = self.type_size(base, decl.ptr_depth, None)?;
                b.write(addr, c, size);
            }
        }
        self.module.bodies.insert(func, body);
        Ok(())
    }

    // ---- functions ----

    fn parse_function(&mut self, return_type: &str, decl: TypeSpec) -> DiagResult<()> {
        let mut param_types = Vec::new();
        let mut params: Vec<(String, String, u32)> = Vec::new();
        let mut is_variadic = false;
        if !matches!(&self.peek().kind, TokenKind::Punct(Punct::RParen)) {
            loop {
                if self.eat_punct(Punct::Ellipsis) {
                    is_variadic = true;
                    break;
                }
                let pbase = self.parse_type_spec()?;
                let pdecl = if self.ident_text().is_some() || matches!(&self.peek().kind, TokenKind::Punct(Punct::Star)) {
                    self.parse_declarator(&pbase)?
                } else {
                    TypeSpec { name: String::new(), ptr_depth: 0, array_size: None }
                };
                param_types.push(pbase.clone());
                params.push((pdecl.name, pbase, pdecl.ptr_depth));
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
        }
        self.expect_punct(Punct::RParen)?;

        let is_builtin = decl.name == "__syscall";
        let func = self.module.declare_func(FuncData {
            name: decl.name.clone(),
            return_type: return_type.to_string(),
            param_types,
            is_variadic,
            is_builtin,
            func_ref: Func::new(0),
        });

        if self.eat_punct(Punct::Semi) {
            // Prototype only.
            return Ok(());
        }

        let mut body = Function::new(decl.name.clone());
        body.is_variadic = is_variadic;
        body.is_builtin = is_builtin;
        let mut fctx = FunctionBuilderContext::new();
        self.pending.clear();
        self.labels.clear();
        self.break_targets.clear();
        self.continue_targets.clear();

        let entry;
        {
            let mut b = FunctionBuilder::new(&mut body, &mut fctx);
            entry = b.create_block();
            b.switch_to_block(entry);
            for (name, type_name, ptr_depth) in &params {
                if name.is_empty() {
                    continue;
                }
                let v = b.declare_var(name, type_name);
                b.func.vars[v].ptr_depth = *ptr_depth;
                b.func.params.push(v);
            }
        }
        body.entry = Some(entry);

        self.expect_punct(Punct::LBrace)?;
        let end = self.parse_block_body(&mut body, &mut fctx, entry)?;
        {
            let mut b = FunctionBuilder::new(&mut body, &mut fctx);
            b.switch_to_block(end);
            if !Self::block_terminated(&b, end) {
                b.return_(None);
            }
        }
        body.exit = Some(end);

        self.module.bodies.insert(func, body);
        Ok(())
    }

    fn block_terminated(b: &FunctionBuilder, block: Block) -> bool {
        match b.func.blocks[block].insts.last() {
            Some(&inst) => b.func.insts[inst].opcode.is_terminator(),
            None => false,
        }
    }

    // ---- statements ----

    /// Parse statements until the matching `}`, returning the block control
    /// falls into afterward.
    fn parse_block_body(&mut self, func: &mut Function, fctx: &mut FunctionBuilderContext, start: Block) -> DiagResult<Block> {
        let mut cur = start;
        {
            let mut b = FunctionBuilder::new(func, fctx);
            b.push_scope();
        }
        while !self.eat_punct(Punct::RBrace) {
            if self.at_eof() {
                return err!(self.loc(), "unterminated block: missing `}}`");
            }
            cur = self.parse_statement(func, fctx, cur)?;
        }
        {
            let mut b = FunctionBuilder::new(func, fctx);
            b.pop_scope();
        }
        Ok(cur)
    }

    /// Parse one statement, appending to `cur` (or to whatever new blocks
    /// the statement creates), and return the block control continues in.
    fn parse_statement(&mut self, func: &mut Function, fctx: &mut FunctionBuilderContext, cur: Block) -> DiagResult<Block> {
        if self.eat_punct(Punct::LBrace) {
            return self.parse_block_body(func, fctx, cur);
        }
        if self.eat_punct(Punct::Semi) {
            return Ok(cur);
        }

        if self.eat_keyword(Keyword::If) {
            return self.parse_if(func, fctx, cur);
        }
        if self.eat_keyword(Keyword::While) {
            return self.parse_while(func, fctx, cur);
        }
        if self.eat_keyword(Keyword::Do) {
            return self.parse_do_while(func, fctx, cur);
        }
        if self.eat_keyword(Keyword::For) {
            return self.parse_for(func, fctx, cur);
        }
        if self.eat_keyword(Keyword::Switch) {
            return self.parse_switch(func, fctx, cur);
        }
        if self.eat_keyword(Keyword::Return) {
            let mut b = FunctionBuilder::new(func, fctx);
            b.switch_to_block(cur);
            if self.eat_punct(Punct::Semi) {
                b.return_(None);
            } else {
                let v = self.parse_expr(&mut b)?;
                self.flush_pending(&mut b);
                self.expect_punct(Punct::Semi)?;
                b.return_(Some(v.var));
            }
            return Ok(cur);
        }
        if self.eat_keyword(Keyword::Break) {
            self.expect_punct(Punct::Semi)?;
            let target = *self
                .break_targets
                .last()
                .ok_or_else(|| diag(&self.loc(), "`break` outside a loop or switch".to_string()))?;
            let mut b = FunctionBuilder::new(func, fctx);
            b.switch_to_block(cur);
            b.jump(target);
            return Ok(cur);
        }
        if self.eat_keyword(Keyword::Continue) {
            self.expect_punct(Punct::Semi)?;
            let target = *self
                .continue_targets
                .last()
                .ok_or_else(|| diag(&self.loc(), "`continue` outside a loop".to_string()))?;
            let mut b = FunctionBuilder::new(func, fctx);
            b.switch_to_block(cur);
            b.jump(target);
            return Ok(cur);
        }
        if self.eat_keyword(Keyword::Goto) {
            let name = self.expect_ident()?;
            self.expect_punct(Punct::Semi)?;
            let target = *self.labels.entry(name).or_insert_with(|| func.make_block());
            let mut b = FunctionBuilder::new(func, fctx);
            b.switch_to_block(cur);
            b.jump(target);
            return Ok(cur);
        }
        // `label:` — a bare identifier immediately followed by `:`.
        if let TokenKind::Ident(name) = &self.peek().kind.clone() {
            if matches!(&self.peek_at(1).kind, TokenKind::Punct(Punct::Colon)) {
                let name = name.clone();
                self.bump();
                self.bump();
                let target = *self.labels.entry(name).or_insert_with(|| func.make_block());
                let mut b = FunctionBuilder::new(func, fctx);
                b.switch_to_block(cur);
                if !Self::block_terminated(&b, cur) {
                    b.jump(target);
                }
                return Ok(target);
            }
        }

        if self.at_type_start() {
            return self.parse_local_decl(func, fctx, cur);
        }

        // Expression statement.
        let mut b = FunctionBuilder::new(func, fctx);
        b.switch_to_block(cur);
        self.parse_expr(&mut b)?;
        self.flush_pending(&mut b);
        self.expect_punct(Punct::Semi)?;
        Ok(cur)
    }

    fn parse_local_decl(&mut self, func: &mut Function, fctx: &mut FunctionBuilderContext, cur: Block) -> DiagResult<Block> {
        let base = self.parse_type_spec()?;
        loop {
            let decl = self.parse_declarator(&base)?;
            let mut b = FunctionBuilder::new(func, fctx);
            b.switch_to_block(cur);
            let v = b.declare_var(&decl.name, &base.name);
            b.func.vars[v].ptr_depth = decl.ptr_depth;
            b.func.vars[v].array_size = decl.array_size;
            let is_aggregate = decl.array_size.is_some()
                || (decl.ptr_depth == 0 && self.is_aggregate(&base.name));
            if is_aggregate {
                // An array or struct/union local decays to its own buffer's
                // address (array-to-pointer decay, the same rule C itself
                // uses, generalized here to any aggregate), so `v` is used
                // directly as an address operand everywhere it's indexed,
                // dereferenced, or member-accessed. `allocat` is what gives
                // that address a real, fixed stack slot for `regalloc` to
                // pin — without it `v` would never be materialized into
                // anything.
                let bytes = self.type_size(&base.name, decl.ptr_depth, decl.array_size)?;
                b.allocat_named(v, bytes);
                if decl.array_size.is_some() && self.eat_punct(Punct::Assign) {
                    self.parse_array_initializer(&mut b, v, &base.name)?;
                }
            } else if self.eat_punct(Punct::Assign) {
                let val = self.parse_assignment(&mut b)?;
                b.assign(v, val.var);
                self.flush_pending(&mut b);
            }
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::Semi)?;
        Ok(cur)
    }

    /// Compound literal initializer for a local array (SPEC_FULL.md
    /// §4.3.1): `int a[3] = {1, 2, 3};` lowers to a sequence of `write`s at
    /// the declaration site.
    fn parse_array_initializer(&mut self, b: &mut FunctionBuilder, array_var: Var, elem_type: &str) -> DiagResult<()> {
        self.expect_punct(Punct::LBrace)?;
        let mut index = 0i64;
        let elem_size = self.type_size(elem_type, 0, None)?;
        while !matches!(&self.peek().kind, TokenKind::Punct(Punct::RBrace)) {
            let val = self.parse_assignment(b)?;
            self.flush_pending(b);
            let slot = if index == 0 {
                array_var
            } else {
                let off = b.load_constant("int", index * elem_size as i64);
                b.binary(Opcode::Add, "int", array_var, off)
            };
            b.write(slot, val.var, elem_size);
            index += 1;
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::RBrace)?;
        Ok(())
    }

    fn parse_if(&mut self, func: &mut Function, fctx: &mut FunctionBuilderContext, cur: Block) -> DiagResult<Block> {
        self.expect_punct(Punct::LParen)?;
        let mut b = FunctionBuilder::new(func, fctx);
        b.switch_to_block(cur);
        let cond = self.parse_expr(&mut b)?;
        self.flush_pending(&mut b);
        self.expect_punct(Punct::RParen)?;
        let then_blk = b.create_block();
        let else_blk = b.create_block();
        let merge = b.create_block();
        b.branch(cond.var, then_blk, else_blk);

        b.switch_to_block(then_blk);
        drop(b);
        let then_end = self.parse_statement(func, fctx, then_blk)?;
        {
            let mut b = FunctionBuilder::new(func, fctx);
            b.switch_to_block(then_end);
            if !Self::block_terminated(&b, then_end) {
                b.jump(merge);
            }
        }

        let mut else_end = else_blk;
        if self.eat_keyword(Keyword::Else) {
            else_end = self.parse_statement(func, fctx, else_blk)?;
        }
        {
            let mut b = FunctionBuilder::new(func, fctx);
            b.switch_to_block(else_end);
            if !Self::block_terminated(&b, else_end) {
                b.jump(merge);
            }
        }
        Ok(merge)
    }

    fn parse_while(&mut self, func: &mut Function, fctx: &mut FunctionBuilderContext, cur: Block) -> DiagResult<Block> {
        let (cond_blk, body_blk, exit_blk) = {
            let mut b = FunctionBuilder::new(func, fctx);
            let cond_blk = b.create_block();
            let body_blk = b.create_block();
            let exit_blk = b.create_block();
            b.switch_to_block(cur);
            b.jump(cond_blk);
            (cond_blk, body_blk, exit_blk)
        };

        self.expect_punct(Punct::LParen)?;
        let mut b = FunctionBuilder::new(func, fctx);
        b.switch_to_block(cond_blk);
        let cond = self.parse_expr(&mut b)?;
        self.flush_pending(&mut b);
        self.expect_punct(Punct::RParen)?;
        b.branch(cond.var, body_blk, exit_blk);
        drop(b);

        self.break_targets.push(exit_blk);
        self.continue_targets.push(cond_blk);
        let body_end = self.parse_statement(func, fctx, body_blk)?;
        self.break_targets.pop();
        self.continue_targets.pop();

        let mut b = FunctionBuilder::new(func, fctx);
        b.switch_to_block(body_end);
        if !Self::block_terminated(&b, body_end) {
            b.jump(cond_blk);
        }
        Ok(exit_blk)
    }

    fn parse_do_while(&mut self, func: &mut Function, fctx: &mut FunctionBuilderContext, cur: Block) -> DiagResult<Block> {
        let (body_blk, cond_blk, exit_blk) = {
            let mut b = FunctionBuilder::new(func, fctx);
            let body_blk = b.create_block();
            let cond_blk = b.create_block();
            let exit_blk = b.create_block();
            b.switch_to_block(cur);
            b.jump(body_blk);
            (body_blk, cond_blk, exit_blk)
        };

        self.break_targets.push(exit_blk);
        self.continue_targets.push(cond_blk);
        let body_end = self.parse_statement(func, fctx, body_blk)?;
        self.break_targets.pop();
        self.continue_targets.pop();

        {
            let mut b = FunctionBuilder::new(func, fctx);
            b.switch_to_block(body_end);
            if !Self::block_terminated(&b, body_end) {
                b.jump(cond_blk);
            }
        }

        self.eat_keyword(Keyword::While);
        self.expect_punct(Punct::LParen)?;
        let mut b = FunctionBuilder::new(func, fctx);
        b.switch_to_block(cond_blk);
        let cond = self.parse_expr(&mut b)?;
        self.flush_pending(&mut b);
        self.expect_punct(Punct::RParen)?;
        self.expect_punct(Punct::Semi)?;
        b.branch(cond.var, body_blk, exit_blk);
        Ok(exit_blk)
    }

    fn parse_for(&mut self, func: &mut Function, fctx: &mut FunctionBuilderContext, cur: Block) -> DiagResult<Block> {
        self.expect_punct(Punct::LParen)?;
        let mut init_end = cur;
        if !self.eat_punct(Punct::Semi) {
            init_end = if self.at_type_start() {
                self.parse_local_decl(func, fctx, cur)?
            } else {
                let mut b = FunctionBuilder::new(func, fctx);
                b.switch_to_block(cur);
                self.parse_expr(&mut b)?;
                self.flush_pending(&mut b);
                self.expect_punct(Punct::Semi)?;
                cur
            };
        }

        let (cond_blk, body_blk, step_blk, exit_blk) = {
            let mut b = FunctionBuilder::new(func, fctx);
            let cond_blk = b.create_block();
            let body_blk = b.create_block();
            let step_blk = b.create_block();
            let exit_blk = b.create_block();
            b.switch_to_block(init_end);
            b.jump(cond_blk);
            (cond_blk, body_blk, step_blk, exit_blk)
        };

        {
            let mut b = FunctionBuilder::new(func, fctx);
            b.switch_to_block(cond_blk);
            if matches!(&self.peek().kind, TokenKind::Punct(Punct::Semi)) {
                let one = b.load_constant("int", 1);
                b.branch(one, body_blk, exit_blk);
            } else {
                let cond = self.parse_expr(&mut b)?;
                self.flush_pending(&mut b);
                b.branch(cond.var, body_blk, exit_blk);
            }
        }
        self.expect_punct(Punct::Semi)?;

        if !matches!(&self.peek().kind, TokenKind::Punct(Punct::RParen)) {
            let mut b = FunctionBuilder::new(func, fctx);
            b.switch_to_block(step_blk);
            self.parse_expr(&mut b)?;
            self.flush_pending(&mut b);
        }
        self.expect_punct(Punct::RParen)?;
        {
            let mut b = FunctionBuilder::new(func, fctx);
            b.switch_to_block(step_blk);
            b.jump(cond_blk);
        }

        self.break_targets.push(exit_blk);
        self.continue_targets.push(step_blk);
        let body_end = self.parse_statement(func, fctx, body_blk)?;
        self.break_targets.pop();
        self.continue_targets.pop();

        let mut b = FunctionBuilder::new(func, fctx);
        b.switch_to_block(body_end);
        if !Self::block_terminated(&b, body_end) {
            b.jump(step_blk);
        }
        Ok(exit_blk)
    }

    /// `switch` lowers to an equality-test chain against the discriminant,
    /// jumping into the matching case's block; statements fall through from
    /// one case into the next exactly as a `Vec`-backed block chain already
    /// does for ordinary straight-line code (SPEC_FULL.md §4.3).
    fn parse_switch(&mut self, func: &mut Function, fctx: &mut FunctionBuilderContext, cur: Block) -> DiagResult<Block> {
        self.expect_punct(Punct::LParen)?;
        let mut b = FunctionBuilder::new(func, fctx);
        b.switch_to_block(cur);
        let disc = self.parse_expr(&mut b)?;
        self.flush_pending(&mut b);
        self.expect_punct(Punct::RParen)?;
        self.expect_punct(Punct::LBrace)?;

        let exit_blk = b.create_block();
        let dispatch = b.create_block();
        b.jump(dispatch);
        drop(b);

        self.break_targets.push(exit_blk);

        let mut cases: Vec<(i64, Block)> = Vec::new();
        let mut default_blk: Option<Block> = None;
        let mut body_cur = {
            let mut b = FunctionBuilder::new(func, fctx);
            b.create_block()
        };
        let first_case_body = body_cur;

        while !self.eat_punct(Punct::RBrace) {
            if self.eat_keyword(Keyword::Case) {
                let value = self.parse_const_expr()?;
                self.expect_punct(Punct::Colon)?;
                let mut b = FunctionBuilder::new(func, fctx);
                let label_blk = b.create_block();
                b.switch_to_block(body_cur);
                if !Self::block_terminated(&b, body_cur) {
                    b.jump(label_blk);
                }
                cases.push((value, label_blk));
                body_cur = label_blk;
                continue;
            }
            if self.eat_keyword(Keyword::Default) {
                self.expect_punct(Punct::Colon)?;
                let mut b = FunctionBuilder::new(func, fctx);
                let label_blk = b.create_block();
                b.switch_to_block(body_cur);
                if !Self::block_terminated(&b, body_cur) {
                    b.jump(label_blk);
                }
                default_blk = Some(label_blk);
                body_cur = label_blk;
                continue;
            }
            body_cur = self.parse_statement(func, fctx, body_cur)?;
        }
        {
            let mut b = FunctionBuilder::new(func, fctx);
            b.switch_to_block(body_cur);
            if !Self::block_terminated(&b, body_cur) {
                b.jump(exit_blk);
            }
        }

        self.break_targets.pop();

        // Emit the dispatch chain: dispatch -> test c0 -> (true: case0, false:
        // next test) -> ... -> default (or exit).
        let mut b = FunctionBuilder::new(func, fctx);
        let fallback = default_blk.unwrap_or(exit_blk);
        let mut test_blk = dispatch;
        for (i, &(value, target)) in cases.iter().enumerate() {
            b.switch_to_block(test_blk);
            let c = b.load_constant("int", value);
            let eq = b.binary(Opcode::Eq, "int", disc.var, c);
            let next_test = if i + 1 < cases.len() { b.create_block() } else { fallback };
            b.branch(eq, target, next_test);
            test_blk = next_test;
        }
        if cases.is_empty() {
            b.switch_to_block(dispatch);
            b.jump(fallback);
        }
        let _ = first_case_body;
        Ok(exit_blk)
    }

    // ---- expressions ----

    /// Full expression: a comma-separated sequence, each flushing pending
    /// postfix inc/dec before the next is evaluated (a sequence point).
    fn parse_expr(&mut self, b: &mut FunctionBuilder) -> DiagResult<Value> {
        let mut v = self.parse_assignment(b)?;
        while self.eat_punct(Punct::Comma) {
            self.flush_pending(b);
            v = self.parse_assignment(b)?;
        }
        Ok(v)
    }

    fn parse_assignment(&mut self, b: &mut FunctionBuilder) -> DiagResult<Value> {
        let checkpoint = self.pos;
        if let Ok(place) = self.try_parse_lvalue(b) {
            let compound = match &self.peek().kind {
                TokenKind::Punct(Punct::Assign) => Some(None),
                TokenKind::Punct(Punct::PlusAssign) => Some(Some(Opcode::Add)),
                TokenKind::Punct(Punct::MinusAssign) => Some(Some(Opcode::Sub)),
                TokenKind::Punct(Punct::StarAssign) => Some(Some(Opcode::Mul)),
                TokenKind::Punct(Punct::SlashAssign) => Some(Some(Opcode::Div)),
                TokenKind::Punct(Punct::PercentAssign) => Some(Some(Opcode::Mod)),
                TokenKind::Punct(Punct::AmpAssign) => Some(Some(Opcode::BitAnd)),
                TokenKind::Punct(Punct::PipeAssign) => Some(Some(Opcode::BitOr)),
                TokenKind::Punct(Punct::CaretAssign) => Some(Some(Opcode::BitXor)),
                TokenKind::Punct(Punct::ShlAssign) => Some(Some(Opcode::Lshift)),
                TokenKind::Punct(Punct::ShrAssign) => Some(Some(Opcode::Rshift)),
                _ => None,
            };
            if let Some(op) = compound {
                self.bump();
                let rhs = self.parse_assignment(b)?;
                let new_val = match op {
                    None => rhs.var,
                    Some(opc) => {
                        let cur = b.read(&place.type_name, place.addr, place.size);
                        b.binary(opc, &place.type_name, cur, rhs.var)
                    }
                };
                b.write(place.addr, new_val, place.size);
                return Ok(Value { var: new_val, ptr_depth: place.ptr_depth });
            }
        }
        self.pos = checkpoint;
        self.parse_ternary(b)
    }

    fn parse_ternary(&mut self, b: &mut FunctionBuilder) -> DiagResult<Value> {
        let cond = self.parse_logical_or(b)?;
        if !self.eat_punct(Punct::Question) {
            return Ok(cond);
        }
        let then_blk = b.create_block();
        let else_blk = b.create_block();
        let merge = b.create_block();
        let from = b.current_block();
        let _ = from;
        b.branch(cond.var, then_blk, else_blk);

        b.switch_to_block(then_blk);
        let then_val = self.parse_assignment(b)?;
        self.flush_pending(b);
        self.expect_punct(Punct::Colon)?;
        let result = b.declare_temp("int");
        b.func.vars[result].is_ternary_ret = true;
        b.assign(result, then_val.var);
        b.jump(merge);

        b.switch_to_block(else_blk);
        let else_val = self.parse_ternary(b)?;
        self.flush_pending(b);
        b.assign(result, else_val.var);
        b.jump(merge);

        b.switch_to_block(merge);
        Ok(Value { var: result, ptr_depth: then_val.ptr_depth })
    }

    /// Short-circuit `||`: a diamond where the right side only executes if
    /// the left side was false.
    fn parse_logical_or(&mut self, b: &mut FunctionBuilder) -> DiagResult<Value> {
        let mut lhs = self.parse_logical_and(b)?;
        while self.eat_punct(Punct::PipePipe) {
            let rhs_blk = b.create_block();
            let short_blk = b.create_block();
            let merge = b.create_block();
            b.branch(lhs.var, short_blk, rhs_blk);

            let result = b.declare_temp("int");
            b.func.vars[result].is_logical_ret = true;

            b.switch_to_block(short_blk);
            let one = b.load_constant("int", 1);
            b.assign(result, one);
            b.jump(merge);

            b.switch_to_block(rhs_blk);
            let rhs = self.parse_logical_and(b)?;
            self.flush_pending(b);
            let zero = b.load_constant("int", 0);
            let truthy = b.binary(Opcode::Neq, "int", rhs.var, zero);
            b.assign(result, truthy);
            b.jump(merge);

            b.switch_to_block(merge);
            lhs = Value { var: result, ptr_depth: 0 };
        }
        Ok(lhs)
    }

    fn parse_logical_and(&mut self, b: &mut FunctionBuilder) -> DiagResult<Value> {
        let mut lhs = self.parse_bitor(b)?;
        while self.eat_punct(Punct::AmpAmp) {
            let rhs_blk = b.create_block();
            let short_blk = b.create_block();
            let merge = b.create_block();
            b.branch(lhs.var, rhs_blk, short_blk);

            let result = b.declare_temp("int");
            b.func.vars[result].is_logical_ret = true;

            b.switch_to_block(short_blk);
            let zero = b.load_constant("int", 0);
            b.assign(result, zero);
            b.jump(merge);

            b.switch_to_block(rhs_blk);
            let rhs = self.parse_bitor(b)?;
            self.flush_pending(b);
            let zero = b.load_constant("int", 0);
            let truthy = b.binary(Opcode::Neq, "int", rhs.var, zero);
            b.assign(result, truthy);
            b.jump(merge);

            b.switch_to_block(merge);
            lhs = Value { var: result, ptr_depth: 0 };
        }
        Ok(lhs)
    }

    fn parse_bitor(&mut self, b: &mut FunctionBuilder) -> DiagResult<Value> {
        let mut lhs = self.parse_bitxor(b)?;
        while self.eat_punct(Punct::Pipe) {
            let rhs = self.parse_bitxor(b)?;
            let v = b.binary(Opcode::BitOr, "int", lhs.var, rhs.var);
            lhs = Value { var: v, ptr_depth: 0 };
        }
        Ok(lhs)
    }

    fn parse_bitxor(&mut self, b: &mut FunctionBuilder) -> DiagResult<Value> {
        let mut lhs = self.parse_bitand(b)?;
        while self.eat_punct(Punct::Caret) {
            let rhs = self.parse_bitand(b)?;
            let v = b.binary(Opcode::BitXor, "int", lhs.var, rhs.var);
            lhs = Value { var: v, ptr_depth: 0 };
        }
        Ok(lhs)
    }

    fn parse_bitand(&mut self, b: &mut FunctionBuilder) -> DiagResult<Value> {
        let mut lhs = self.parse_equality(b)?;
        while self.eat_punct(Punct::Amp) {
            let rhs = self.parse_equality(b)?;
            let v = b.binary(Opcode::BitAnd, "int", lhs.var, rhs.var);
            lhs = Value { var: v, ptr_depth: 0 };
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self, b: &mut FunctionBuilder) -> DiagResult<Value> {
        let mut lhs = self.parse_relational(b)?;
        loop {
            let op = match &self.peek().kind {
                TokenKind::Punct(Punct::EqEq) => Opcode::Eq,
                TokenKind::Punct(Punct::NotEq) => Opcode::Neq,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_relational(b)?;
            let v = b.binary(op, "int", lhs.var, rhs.var);
            lhs = Value { var: v, ptr_depth: 0 };
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self, b: &mut FunctionBuilder) -> DiagResult<Value> {
        let mut lhs = self.parse_shift(b)?;
        loop {
            let op = match &self.peek().kind {
                TokenKind::Punct(Punct::Lt) => Opcode::Lt,
                TokenKind::Punct(Punct::LtEq) => Opcode::Leq,
                TokenKind::Punct(Punct::Gt) => Opcode::Gt,
                TokenKind::Punct(Punct::GtEq) => Opcode::Geq,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_shift(b)?;
            let v = b.binary(op, "int", lhs.var, rhs.var);
            lhs = Value { var: v, ptr_depth: 0 };
        }
        Ok(lhs)
    }

    fn parse_shift(&mut self, b: &mut FunctionBuilder) -> DiagResult<Value> {
        let mut lhs = self.parse_additive(b)?;
        loop {
            let op = match &self.peek().kind {
                TokenKind::Punct(Punct::Shl) => Opcode::Lshift,
                TokenKind::Punct(Punct::Shr) => Opcode::Rshift,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_additive(b)?;
            let v = b.binary(op, "int", lhs.var, rhs.var);
            lhs = Value { var: v, ptr_depth: 0 };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self, b: &mut FunctionBuilder) -> DiagResult<Value> {
        let mut lhs = self.parse_multiplicative(b)?;
        loop {
            let op = match &self.peek().kind {
                TokenKind::Punct(Punct::Plus) => Opcode::Add,
                TokenKind::Punct(Punct::Minus) => Opcode::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_multiplicative(b)?;
            // Pointer arithmetic scaling (SPEC_FULL.md §4.3.1): `p + i`
            // scales `i` by the pointee size when `p` is a pointer and `i`
            // is not.
            let (scaled_lhs, scaled_rhs, ptr_depth) = if lhs.ptr_depth > 0 && rhs.ptr_depth == 0 {
                let scale = WORD_SIZE as i64;
                let factor = b.load_constant("int", scale);
                let scaled = b.binary(Opcode::Mul, "int", rhs.var, factor);
                (lhs.var, scaled, lhs.ptr_depth)
            } else if rhs.ptr_depth > 0 && lhs.ptr_depth == 0 {
                let scale = WORD_SIZE as i64;
                let factor = b.load_constant("int", scale);
                let scaled = b.binary(Opcode::Mul, "int", lhs.var, factor);
                (scaled, rhs.var, rhs.ptr_depth)
            } else {
                (lhs.var, rhs.var, 0)
            };
            let v = b.binary(op, "int", scaled_lhs, scaled_rhs);
            lhs = Value { var: v, ptr_depth };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self, b: &mut FunctionBuilder) -> DiagResult<Value> {
        let mut lhs = self.parse_unary(b)?;
        loop {
            let op = match &self.peek().kind {
                TokenKind::Punct(Punct::Star) => Opcode::Mul,
                TokenKind::Punct(Punct::Slash) => Opcode::Div,
                TokenKind::Punct(Punct::Percent) => Opcode::Mod,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_unary(b)?;
            let v = b.binary(op, "int", lhs.var, rhs.var);
            lhs = Value { var: v, ptr_depth: 0 };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self, b: &mut FunctionBuilder) -> DiagResult<Value> {
        if self.eat_punct(Punct::Minus) {
            let v = self.parse_unary(b)?;
            let r = b.unary(Opcode::Negate, "int", v.var);
            return Ok(Value { var: r, ptr_depth: 0 });
        }
        if self.eat_punct(Punct::Bang) {
            let v = self.parse_unary(b)?;
            let r = b.unary(Opcode::LogNot, "int", v.var);
            return Ok(Value { var: r, ptr_depth: 0 });
        }
        if self.eat_punct(Punct::Tilde) {
            let v = self.parse_unary(b)?;
            let r = b.unary(Opcode::BitNot, "int", v.var);
            return Ok(Value { var: r, ptr_depth: 0 });
        }
        if self.eat_punct(Punct::Amp) {
            let place = self.resolve_lvalue(b)?;
            let r = b.unary(Opcode::AddressOf, &place.type_name, place.addr);
            return Ok(Value { var: r, ptr_depth: place.ptr_depth + 1 });
        }
        if self.eat_punct(Punct::Star) {
            let v = self.parse_unary(b)?;
            let elem_size = if v.ptr_depth > 1 { WORD_SIZE } else { 4 };
            let r = b.read("int", v.var, elem_size);
            return Ok(Value { var: r, ptr_depth: v.ptr_depth.saturating_sub(1) });
        }
        if self.eat_punct(Punct::IncOp) {
            let place = self.resolve_lvalue(b)?;
            let cur = b.read(&place.type_name, place.addr, place.size);
            let one = b.load_constant("int", 1);
            let next = b.binary(Opcode::Add, &place.type_name, cur, one);
            b.write(place.addr, next, place.size);
            return Ok(Value { var: next, ptr_depth: place.ptr_depth });
        }
        if self.eat_punct(Punct::DecOp) {
            let place = self.resolve_lvalue(b)?;
            let cur = b.read(&place.type_name, place.addr, place.size);
            let one = b.load_constant("int", 1);
            let next = b.binary(Opcode::Sub, &place.type_name, cur, one);
            b.write(place.addr, next, place.size);
            return Ok(Value { var: next, ptr_depth: place.ptr_depth });
        }
        if self.eat_keyword(Keyword::Sizeof) {
            let paren = self.eat_punct(Punct::LParen);
            let size = if self.at_type_start() {
                let base = self.parse_type_spec()?;
                let mut ptr_depth = 0;
                while self.eat_punct(Punct::Star) {
                    ptr_depth += 1;
                }
                self.type_size(&base, ptr_depth, None)?
            } else {
                4
            };
            if paren {
                self.expect_punct(Punct::RParen)?;
            }
            let v = b.load_constant("int", size as i64);
            return Ok(Value { var: v, ptr_depth: 0 });
        }
        self.parse_postfix(b)
    }

    fn parse_postfix(&mut self, b: &mut FunctionBuilder) -> DiagResult<Value> {
        // An identifier not immediately called resolves through the full
        // `.`/`->`/`[]` chain as a `Place`, so a trailing `++`/`--` queues the
        // chain's real address (its slot for a bare scalar, its computed
        // address for `a[i]`/`s.f`/`p->f`) rather than the value already read
        // out of it.
        let is_lvalue_root = matches!(&self.peek().kind, TokenKind::Ident(_))
            && !matches!(&self.peek_at(1).kind, TokenKind::Punct(Punct::LParen));
        if is_lvalue_root {
            let place = self.resolve_lvalue(b)?;
            let (value, ptr_depth) = if place.from_slot {
                (b.read(&place.type_name, place.addr, place.size), place.ptr_depth)
            } else {
                (place.addr, place.ptr_depth.max(1))
            };
            if self.eat_punct(Punct::IncOp) {
                self.pending.push(PendingIncDec { addr: place.addr, size: place.size, delta: 1 });
            } else if self.eat_punct(Punct::DecOp) {
                self.pending.push(PendingIncDec { addr: place.addr, size: place.size, delta: -1 });
            }
            return Ok(Value { var: value, ptr_depth });
        }
        let v = self.parse_primary(b)?;
        // Calls, literals, and parenthesized expressions aren't l-values;
        // a trailing `++`/`--` here is not valid C, so there is nothing
        // further to chain.
        Ok(v)
    }

    fn parse_primary(&mut self, b: &mut FunctionBuilder) -> DiagResult<Value> {
        let loc = self.loc();
        match self.peek().kind.clone() {
            TokenKind::IntLit(n) => {
                self.bump();
                let v = b.load_constant("int", n);
                Ok(Value { var: v, ptr_depth: 0 })
            }
            TokenKind::CharLit(c) => {
                self.bump();
                let v = b.load_constant("char", c as i64);
                Ok(Value { var: v, ptr_depth: 0 })
            }
            TokenKind::StrLit(bytes) => {
                self.bump();
                let label = self.module.intern_string(bytes);
                let v = b.load_data_address("char", &label);
                Ok(Value { var: v, ptr_depth: 1 })
            }
            TokenKind::Punct(Punct::LParen) => {
                self.bump();
                let v = self.parse_expr(b)?;
                self.expect_punct(Punct::RParen)?;
                Ok(v)
            }
            // `parse_postfix` intercepts every other identifier use (it needs
            // the resolved `Place`, not just a `Value`, to queue a trailing
            // `++`/`--` against the right address); a bare identifier only
            // reaches here as a call callee.
            TokenKind::Ident(name) => self.parse_call(b, &name),
            other => err!(loc, "expected an expression, found {:?}", other),
        }
    }

    fn parse_call(&mut self, b: &mut FunctionBuilder, name: &str) -> DiagResult<Value> {
        self.bump();
        self.expect_punct(Punct::LParen)?;
        let mut args = Vec::new();
        if !matches!(&self.peek().kind, TokenKind::Punct(Punct::RParen)) {
            loop {
                let v = self.parse_assignment(b)?;
                self.flush_pending(b);
                args.push(v.var);
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
        }
        self.expect_punct(Punct::RParen)?;
        let n = args.len() as u32;
        for (i, &arg) in args.iter().enumerate() {
            b.push_arg(arg, n - i as u32 - 1);
        }
        b.call(name);
        let v = b.func_ret("int");
        Ok(Value { var: v, ptr_depth: 0 })
    }

    /// Speculatively parse something that reads as an l-value (used by
    /// `parse_assignment` to decide between an assignment and a plain
    /// expression without two distinct grammars).
    fn try_parse_lvalue(&mut self, b: &mut FunctionBuilder) -> DiagResult<Place> {
        if !matches!(&self.peek().kind, TokenKind::Ident(_)) {
            return err!(self.loc(), "not an lvalue");
        }
        self.resolve_lvalue(b)
    }

    /// Resolve `x`, `x[e]`, `x.f`, `x->f`, or `*x`, recursing through
    /// arbitrary chains of the four (SPEC_FULL.md §4.3.1: "resolves through
    /// arbitrary pointer depth and nested member access").
    fn resolve_lvalue(&mut self, b: &mut FunctionBuilder) -> DiagResult<Place> {
        let mut place = self.resolve_lvalue_root(b)?;
        loop {
            if self.eat_punct(Punct::Dot) {
                let field_name = self.expect_ident()?;
                place = self.resolve_member(b, place, &field_name, false)?;
                continue;
            }
            if self.eat_punct(Punct::Arrow) {
                let field_name = self.expect_ident()?;
                place = self.resolve_member(b, place, &field_name, true)?;
                continue;
            }
            if self.eat_punct(Punct::LBracket) {
                let index = self.parse_expr(b)?;
                self.expect_punct(Punct::RBracket)?;
                let elem_size = self.type_size(&place.type_name, place.ptr_depth.saturating_sub(1), None)?;
                let scale = b.load_constant("int", elem_size.max(1) as i64);
                let offset = b.binary(Opcode::Mul, "int", index.var, scale);
                // A scalar/pointer root holds its address as a *value* in
                // its slot (one `read` needed to reach it); an array/struct
                // root, or the result of a previous `.`/`->`/`[]`/`*` step,
                // already denotes a concrete address.
                let base = if place.from_slot {
                    b.read(&place.type_name, place.addr, WORD_SIZE)
                } else {
                    place.addr
                };
                let addr = b.binary(Opcode::Add, "int", base, offset);
                place = Place {
                    addr,
                    size: elem_size.max(1),
                    type_name: place.type_name,
                    ptr_depth: place.ptr_depth.saturating_sub(1),
                    from_slot: false,
                };
                continue;
            }
            break;
        }
        Ok(place)
    }

    fn resolve_lvalue_root(&mut self, b: &mut FunctionBuilder) -> DiagResult<Place> {
        if self.eat_punct(Punct::Star) {
            let inner = self.resolve_lvalue(b)?;
            let addr = if inner.from_slot {
                b.read(&inner.type_name, inner.addr, WORD_SIZE)
            } else {
                inner.addr
            };
            return Ok(Place {
                addr,
                size: self.type_size(&inner.type_name, inner.ptr_depth.saturating_sub(1), None)?,
                type_name: inner.type_name,
                ptr_depth: inner.ptr_depth.saturating_sub(1),
                from_slot: false,
            });
        }
        let loc = self.loc();
        let name = self.expect_ident()?;
        if let Some(var) = b.resolve_var(&name) {
            let data = &b.func.vars[var];
            let type_name = data.type_name.clone();
            let ptr_depth = data.ptr_depth;
            let size = self.type_size(&type_name, ptr_depth, None)?;
            let aggregate = data.array_size.is_some() || (ptr_depth == 0 && self.is_aggregate(&type_name));
            return Ok(Place { addr: var, size, type_name, ptr_depth, from_slot: !aggregate });
        }
        if let Some(g) = self.module.lookup_global(&name).cloned() {
            let addr = b.load_data_address(&g.type_name, &g.name);
            let size = self.type_size(&g.type_name, g.ptr_depth, None)?;
            let aggregate = g.array_size.is_some() || (g.ptr_depth == 0 && self.is_aggregate(&g.type_name));
            // `load_data_address` always yields the symbol's own address;
            // a scalar/pointer global's *value* still lives one `read`
            // further in, exactly like a local's slot.
            return Ok(Place {
                addr,
                size,
                type_name: g.type_name,
                ptr_depth: g.ptr_depth,
                from_slot: !aggregate,
            });
        }
        err!(loc, "use of undeclared identifier `{}`", name)
    }

    /// Is `type_name` a struct/union value type (as opposed to a scalar)?
    fn is_aggregate(&self, type_name: &str) -> bool {
        match self.module.lookup_type(type_name) {
            Some(ty) => matches!(self.module.types_table[ty].kind, BaseKind::Struct | BaseKind::Union),
            None => false,
        }
    }

    fn resolve_member(&mut self, b: &mut FunctionBuilder, base: Place, field_name: &str, through_ptr: bool) -> DiagResult<Place> {
        let ty = self
            .module
            .lookup_type(&base.type_name)
            .ok_or_else(|| diag(&self.loc(), format!("`{}` is not a struct/union type", base.type_name)))?;
        let field = self.module.types_table[ty]
            .field(field_name)
            .cloned()
            .ok_or_else(|| diag(&self.loc(), format!("no member named `{}` on `{}`", field_name, base.type_name)))?;
        let struct_addr = if through_ptr {
            b.read(&base.type_name, base.addr, WORD_SIZE)
        } else {
            base.addr
        };
        let offset = b.load_constant("int", field.offset as i64);
        let addr = b.binary(Opcode::Add, "int", struct_addr, offset);
        let size = self.type_size(&field.type_name, field.ptr_depth, None).unwrap_or(WORD_SIZE);
        Ok(Place {
            addr,
            size,
            type_name: field.type_name,
            ptr_depth: field.ptr_depth,
            from_slot: false,
        })
    }

    // ---- sequence points ----

    /// Apply every stashed postfix `++`/`--` and clear the stash — called
    /// at each sequence point (full expression-statement end, `for`-clause
    /// boundary, branch of `&&`/`||`, `return`/argument evaluation).
    fn flush_pending(&mut self, b: &mut FunctionBuilder) {
        let pending = std::mem::take(&mut self.pending);
        for p in pending {
            let cur = b.read("int", p.addr, p.size);
            let delta = b.load_constant("int", p.delta);
            let next = b.binary(Opcode::Add, "int", cur, delta);
            b.write(p.addr, next, p.size);
        }
    }
}

fn diag(loc: &SourceLoc, message: String) -> crate::diagnostic::Diagnostic {
    crate::diagnostic::Diagnostic { loc: loc.clone(), message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::preprocess::Preprocessor;
    use std::rc::Rc;

    fn parse(src: &str) -> DiagResult<Module> {
        let file: Rc<str> = Rc::from("t.c");
        let lexer = Lexer::new(file.clone(), src);
        let tokens = lexer.lex()?;
        let mut module = Module::new();
        let mut pp = Preprocessor::new(Vec::new());
        let expanded = pp.process(file, tokens, &mut module)?;
        let mut parser = Parser::new(expanded, &mut module);
        parser.parse_translation_unit()?;
        Ok(())
            .map(|_: ()| module)
    }

    #[test]
    fn parses_a_trivial_function() {
        let module = parse("int main() { return 0; }").expect("parses");
        let f = module.lookup_func("main").expect("main declared");
        let body = &module.bodies[&f];
        assert!(body.entry.is_some());
    }

    #[test]
    fn parses_globals_with_initializers() {
        let module = parse("int counter = 5; int main() { return counter; }").expect("parses");
        assert!(module.lookup_global("counter").is_some());
    }

    #[test]
    fn parses_if_else_as_a_diamond() {
        let module = parse("int main() { int x; if (1) { x = 1; } else { x = 2; } return x; }").expect("parses");
        let f = module.lookup_func("main").unwrap();
        let body = &module.bodies[&f];
        // entry, then, else, merge == at least 4 blocks.
        assert!(body.num_blocks() >= 4);
    }

    #[test]
    fn parses_a_while_loop() {
        let module = parse("int main() { int i; i = 0; while (i < 10) { i = i + 1; } return i; }").expect("parses");
        let f = module.lookup_func("main").unwrap();
        assert!(module.bodies[&f].num_blocks() >= 3);
    }

    #[test]
    fn parses_struct_member_access() {
        let src = "struct point { int x; int y; }; int main() { struct point p; p.x = 1; return p.x; }";
        let module = parse(src).expect("parses");
        let ty = module.lookup_type("point").expect("struct declared");
        assert_eq!(module.types_table[ty].fields.len(), 2);
    }

    #[test]
    fn parses_a_switch_statement() {
        let src = "int main() { int x; x = 1; switch (x) { case 1: return 1; case 2: return 2; default: return 0; } }";
        let module = parse(src).expect("parses");
        let f = module.lookup_func("main").unwrap();
        assert!(module.bodies[&f].num_blocks() > 3);
    }

    #[test]
    fn indexes_through_a_pointer_variable() {
        // `p` is a scalar slot holding an address; `p[i]` must read that
        // address out of the slot before adding the scaled offset, unlike
        // `a[i]` where `a`'s own slot already is the array's address.
        let src = "int main() { int a[4]; int *p; int i; p = a; i = 1; return p[i]; }";
        let module = parse(src).expect("parses");
        let f = module.lookup_func("main").unwrap();
        assert!(module.bodies[&f].entry.is_some());
    }

    #[test]
    fn postfix_increment_targets_the_variables_slot() {
        let src = "int main() { int x; x = 0; x++; return x; }";
        let module = parse(src).expect("parses");
        let f = module.lookup_func("main").unwrap();
        let body = &module.bodies[&f];
        let writes = body
            .insts
            .values()
            .filter(|inst| inst.opcode == Opcode::Write)
            .count();
        // one write for `x = 0`, one for the flushed `x++`.
        assert_eq!(writes, 2);
    }
}
