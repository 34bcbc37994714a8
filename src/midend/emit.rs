//! AST to IR emission. The walk keeps a [`CodeContext`] holding the
//! module under construction, the current function and block, the symbol
//! and string tables, and the SSA builder. Scalar reads and writes go
//! through the SSA builder; arrays stay memory-backed behind one alloca
//! each, front-loaded into the entry block.

#[cfg(test)]
mod tests;

use std::io;

use tracing::debug;

use crate::frontend::ast::{
    ArraySub, CompoundStmt, Decl, Expr, ExprKind, Function as AstFunction, MathOp, Program, Stmt,
};
use crate::frontend::ast::CmpOp;
use crate::frontend::parser::Parser;
use crate::frontend::symtab::{IdentId, ScopeId, StringTable, SymbolTable};
use crate::frontend::types::Type;
use crate::midend::ir::{
    verify, BlockId, Function, IrType, Module, Opcode, Predicate, ValueId,
};
use crate::midend::opt::{register_opt_passes, PassManager};
use crate::midend::ssa::SsaBuilder;

/// Everything the emission walk needs in one place.
pub struct CodeContext {
    pub module: Module,
    pub syms: SymbolTable,
    pub strings: StringTable,
    pub ssa: SsaBuilder,
    /// The function currently being emitted; pushed into the module when
    /// its body is done.
    func: Option<Function>,
    /// Current insertion block.
    pub block: BlockId,
    /// Interned i32 zero of the current function.
    pub zero: ValueId,
    need_printf: bool,
}

impl CodeContext {
    fn func(&mut self) -> &mut Function {
        self.func.as_mut().expect("emission outside a function")
    }

    fn ir_type(&self, type_: Type, count: Option<usize>, as_ptr: bool) -> IrType {
        match type_ {
            Type::Void => IrType::Void,
            Type::Int => IrType::I32,
            Type::Char => IrType::I8,
            Type::IntArray => {
                if as_ptr {
                    IrType::ptr_to(IrType::I32)
                } else {
                    IrType::array_of(IrType::I32, count.unwrap_or(0))
                }
            }
            Type::CharArray => {
                if as_ptr {
                    IrType::ptr_to(IrType::I8)
                } else {
                    IrType::array_of(IrType::I8, count.unwrap_or(0))
                }
            }
            Type::Function => IrType::Void,
        }
    }

    /// IR type of an identifier, arrays decayed to element pointers.
    fn ident_ty(&self, ident: IdentId) -> IrType {
        let entry = self.syms.ident(ident);
        self.ir_type(entry.type_(), entry.array_count(), true)
    }

    /// All scalar reads go through the SSA builder.
    fn read_ident(&mut self, ident: IdentId) -> ValueId {
        let ty = self.ident_ty(ident);
        let block = self.block;
        let func = self.func.as_mut().expect("emission outside a function");
        self.ssa.read_variable(func, ident, &ty, block)
    }

    /// All scalar writes go through the SSA builder.
    fn write_ident(&mut self, ident: IdentId, value: ValueId) {
        let block = self.block;
        self.ssa.write_variable(ident, block, value);
    }

    fn block_terminated(&mut self) -> bool {
        let block = self.block;
        self.func().terminator(block).is_some()
    }

    /// Branches to `dest` unless the current block already ended (an arm
    /// that returned does not get a trailing branch).
    fn ensure_br(&mut self, dest: BlockId) {
        let block = self.block;
        if self.func().terminator(block).is_none() {
            self.func().build_br(block, dest);
        }
    }
}

/// Drives emission and owns the result. Mirrors the front end's contract:
/// construct from a successfully parsed program, then optionally optimize
/// and write out.
pub struct Emitter {
    ctx: CodeContext,
}

impl Emitter {
    /// Consumes a valid parse. Panics if the parser recorded errors; the
    /// driver must check `is_valid` first.
    pub fn from_parser(parser: Parser) -> Emitter {
        assert!(
            parser.is_valid(),
            "IR emission requires an error-free parse"
        );
        let (root, syms, strings, need_printf) = parser.into_parts();
        Emitter::new(
            root.expect("valid parse always has a root"),
            syms,
            strings,
            need_printf,
        )
    }

    pub fn new(
        program: Program,
        syms: SymbolTable,
        strings: StringTable,
        need_printf: bool,
    ) -> Emitter {
        let mut ctx = CodeContext {
            module: Module::new("main"),
            syms,
            strings,
            ssa: SsaBuilder::new(),
            func: None,
            block: BlockId(0),
            zero: ValueId(0),
            need_printf,
        };
        emit_program(&mut ctx, &program);
        Emitter { ctx }
    }

    /// Runs the registered optimization pipeline over the module.
    pub fn optimize(&mut self) {
        let mut pm = PassManager::new();
        register_opt_passes(&mut pm);
        let changed = pm.run(&mut self.ctx.module);
        debug!(changed, "optimization pipeline finished");
    }

    pub fn module(&self) -> &Module {
        &self.ctx.module
    }

    pub fn into_module(self) -> Module {
        self.ctx.module
    }

    pub fn print(&self, out: &mut dyn io::Write) -> io::Result<()> {
        write!(out, "{}", self.ctx.module)
    }

    /// Writes the serialized module to `out`.
    pub fn write_bitcode(&self, out: &mut dyn io::Write) -> io::Result<()> {
        let json = self
            .ctx
            .module
            .to_json()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        out.write_all(json.as_bytes())
    }

    /// True when the emitted module passes the IR verifier.
    pub fn verify(&self) -> bool {
        verify::verify_module(&self.ctx.module).is_empty()
    }
}

fn emit_program(ctx: &mut CodeContext, program: &Program) {
    // Materialize the string table as private globals.
    let entries: Vec<_> = ctx.strings.iter().map(|(id, s)| (id, s.text().to_string())).collect();
    for (id, text) in entries {
        let name = ctx.module.add_string_global(&text);
        ctx.strings.set_global(id, name);
    }

    // Declare printf when any call site was seen.
    if ctx.need_printf {
        ctx.module.declare_extern(
            "printf",
            IrType::I32,
            vec![IrType::ptr_to(IrType::I8)],
            true,
        );
    }

    for func in &program.funcs {
        emit_function(ctx, func);
    }
}

fn emit_function(ctx: &mut CodeContext, ast_func: &AstFunction) {
    let name = ctx.syms.ident(ast_func.ident).name().to_string();
    debug!(func = %name, "emitting function");

    let ret_ty = ctx.ir_type(ast_func.return_type, None, true);
    let args: Vec<(String, IrType)> = ast_func
        .args
        .iter()
        .map(|arg| {
            let ident = ctx.syms.ident(arg.ident);
            (ident.name().to_string(), ctx.ident_ty(arg.ident))
        })
        .collect();

    let mut func = Function::new(&name, ret_ty, &args);

    // Fresh function, fresh SSA state.
    ctx.ssa.reset();

    let entry = func.create_block("entry");
    // The entry block can never gain predecessors, so it is born sealed.
    ctx.ssa.add_block(&mut func, entry, true);
    ctx.block = entry;
    ctx.zero = func.const_int(IrType::I32, 0);

    // Bind incoming argument values. For array parameters the argument
    // itself is the base pointer; nothing is allocated.
    let arg_values: Vec<ValueId> = func.args().to_vec();
    ctx.func = Some(func);
    for (arg, value) in ast_func.args.iter().zip(arg_values) {
        ctx.write_ident(arg.ident, value);
    }

    // Front-load every local array alloca into the entry block.
    emit_scope_allocas(ctx, ast_func.scope);

    emit_compound(ctx, &ast_func.body);

    // Unreachable tails (e.g. a join block after both arms returned)
    // still need a terminator.
    if !ctx.block_terminated() {
        let block = ctx.block;
        let ret_ty = ctx.func().ret_ty.clone();
        if ret_ty == IrType::Void {
            ctx.func().build_ret_void(block);
        } else {
            let undef = ctx.func().undef(ret_ty);
            ctx.func().build_ret(block, undef);
        }
    }

    let func = ctx.func.take().expect("function under construction");
    ctx.module.funcs.push(func);
}

/// Allocates stack storage for every sized array declared anywhere in
/// the function's scope tree, and records the decayed base pointer as
/// the identifier's current value.
fn emit_scope_allocas(ctx: &mut CodeContext, scope: ScopeId) {
    let idents: Vec<IdentId> = ctx.syms.scope_idents(scope).to_vec();
    for ident in idents {
        let entry = ctx.syms.ident(ident);
        let (is_array, count, type_) = (entry.is_array(), entry.array_count(), entry.type_());
        // Parameter arrays (no recorded count) are not allocated.
        let count = match (is_array, count) {
            (true, Some(count)) => count,
            _ => continue,
        };

        let alloc_ty = ctx.ir_type(type_, Some(count), false);
        let elem_ptr = ctx.ident_ty(ident);
        let block = ctx.block;
        let zero = ctx.zero;
        let func = ctx.func();
        let alloca = func.build_alloca(block, alloc_ty);
        let base = func.build_gep(block, alloca, &[zero, zero], elem_ptr);
        ctx.write_ident(ident, base);
    }

    let children: Vec<ScopeId> = ctx.syms.scope_children(scope).to_vec();
    for child in children {
        emit_scope_allocas(ctx, child);
    }
}

fn emit_compound(ctx: &mut CodeContext, compound: &CompoundStmt) {
    for decl in &compound.decls {
        emit_decl(ctx, decl);
    }
    for stmt in &compound.stmts {
        // Statements after a terminator are unreachable; emit them into a
        // detached block the dead-block pass can discard.
        if ctx.block_terminated() {
            let dead = ctx.func().create_block("dead");
            let func = ctx.func.as_mut().expect("emission inside a function");
            ctx.ssa.add_block(func, dead, true);
            ctx.block = dead;
        }
        emit_stmt(ctx, stmt);
    }
}

fn emit_decl(ctx: &mut CodeContext, decl: &Decl) {
    let init = match &decl.init {
        Some(init) => init,
        None => return,
    };
    let value = emit_expr(ctx, init);

    let value_ty = ctx.func().value(value).ty().clone();
    if value_ty.is_ptr() {
        // String initializer: copy the bytes into the array storage.
        let base = ctx.read_ident(decl.ident);
        let count = ctx
            .syms
            .ident(decl.ident)
            .array_count()
            .unwrap_or(0);
        let block = ctx.block;
        let zero = ctx.zero;
        let func = ctx.func();
        let src = func.build_gep(block, value, &[zero, zero], IrType::ptr_to(IrType::I8));
        func.build_memcpy(block, base, src, count, 1);
    } else {
        ctx.write_ident(decl.ident, value);
    }
}

fn emit_stmt(ctx: &mut CodeContext, stmt: &Stmt) {
    match stmt {
        Stmt::Compound(compound) => emit_compound(ctx, compound),
        Stmt::Assign { ident, expr } => {
            let value = emit_expr(ctx, expr);
            ctx.write_ident(*ident, value);
        }
        Stmt::AssignArray { array, expr } => {
            let value = emit_expr(ctx, expr);
            let addr = emit_array_sub(ctx, array);
            let block = ctx.block;
            ctx.func().build_store(block, value, addr);
        }
        Stmt::If {
            cond,
            then_stmt,
            else_stmt,
        } => emit_if(ctx, cond, then_stmt, else_stmt.as_deref()),
        Stmt::While { cond, body } => emit_while(ctx, cond, body),
        Stmt::Return(expr) => {
            let block = ctx.block;
            match expr {
                Some(expr) => {
                    let value = emit_expr(ctx, expr);
                    let block = ctx.block;
                    ctx.func().build_ret(block, value);
                }
                None => {
                    ctx.func().build_ret_void(block);
                }
            }
        }
        Stmt::Expr(expr) => {
            emit_expr(ctx, expr);
        }
        Stmt::Null => {}
    }
}

fn emit_if(ctx: &mut CodeContext, cond: &Expr, then_stmt: &Stmt, else_stmt: Option<&Stmt>) {
    let (then_block, else_block, end_block) = {
        let func = ctx.func.as_mut().expect("emission inside a function");
        let then_block = func.create_block("if.then");
        ctx.ssa.add_block(func, then_block, false);
        let else_block = else_stmt.map(|_| {
            let b = func.create_block("if.else");
            ctx.ssa.add_block(func, b, false);
            b
        });
        let end_block = func.create_block("if.end");
        ctx.ssa.add_block(func, end_block, false);
        (then_block, else_block, end_block)
    };

    // Compare the condition against zero in the current block and branch.
    let cond_val = emit_expr(ctx, cond);
    let block = ctx.block;
    let zero = ctx.zero;
    {
        let func = ctx.func.as_mut().expect("emission inside a function");
        let to_bool = func.build_icmp(block, Predicate::Ne, cond_val, zero);
        let false_dest = else_block.unwrap_or(end_block);
        func.build_cond_br(block, to_bool, then_block, false_dest);
        ctx.ssa.seal_block(func, then_block);
        if let Some(else_block) = else_block {
            ctx.ssa.seal_block(func, else_block);
        }
    }

    ctx.block = then_block;
    emit_stmt(ctx, then_stmt);
    ctx.ensure_br(end_block);

    if let (Some(else_block), Some(else_stmt)) = (else_block, else_stmt) {
        ctx.block = else_block;
        emit_stmt(ctx, else_stmt);
        ctx.ensure_br(end_block);
    }

    // Both arms are linked (or proved unreachable); the join is complete.
    let func = ctx.func.as_mut().expect("emission inside a function");
    ctx.ssa.seal_block(func, end_block);
    ctx.block = end_block;
}

fn emit_while(ctx: &mut CodeContext, cond: &Expr, body: &Stmt) {
    let (cond_block, body_block, end_block) = {
        let func = ctx.func.as_mut().expect("emission inside a function");
        let cond_block = func.create_block("while.cond");
        ctx.ssa.add_block(func, cond_block, false);
        let body_block = func.create_block("while.body");
        ctx.ssa.add_block(func, body_block, false);
        let end_block = func.create_block("while.end");
        ctx.ssa.add_block(func, end_block, false);
        (cond_block, body_block, end_block)
    };

    // Fall into the condition check.
    let block = ctx.block;
    ctx.func().build_br(block, cond_block);

    ctx.block = cond_block;
    let cond_val = emit_expr(ctx, cond);
    let block = ctx.block;
    let zero = ctx.zero;
    {
        let func = ctx.func.as_mut().expect("emission inside a function");
        let to_bool = func.build_icmp(block, Predicate::Ne, cond_val, zero);
        func.build_cond_br(block, to_bool, body_block, end_block);
        // body and end have their full predecessor sets now.
        ctx.ssa.seal_block(func, body_block);
        ctx.ssa.seal_block(func, end_block);
    }

    ctx.block = body_block;
    emit_stmt(ctx, body);
    ctx.ensure_br(cond_block);

    // The back edge exists; only now is the condition block complete.
    let func = ctx.func.as_mut().expect("emission inside a function");
    ctx.ssa.seal_block(func, cond_block);
    ctx.block = end_block;
}

/// Short-circuit logical operators. Both operands are reduced to i1 in
/// their own blocks; the join block selects between the short-circuit
/// constant and the right-hand side with a phi, zero-extended to i32.
fn emit_logical(ctx: &mut CodeContext, is_and: bool, lhs: &Expr, rhs: &Expr) -> ValueId {
    let (rhs_block, end_block) = {
        let func = ctx.func.as_mut().expect("emission inside a function");
        let rhs_block = func.create_block(if is_and { "and.rhs" } else { "lor.rhs" });
        ctx.ssa.add_block(func, rhs_block, false);
        let end_block = func.create_block(if is_and { "and.end" } else { "lor.end" });
        ctx.ssa.add_block(func, end_block, false);
        (rhs_block, end_block)
    };

    let lhs_val = emit_expr(ctx, lhs);
    let lhs_block = ctx.block;
    let zero = ctx.zero;
    {
        let func = ctx.func.as_mut().expect("emission inside a function");
        let lhs_bool = func.build_icmp(lhs_block, Predicate::Ne, lhs_val, zero);
        if is_and {
            // false skips the right-hand side entirely
            func.build_cond_br(lhs_block, lhs_bool, rhs_block, end_block);
        } else {
            func.build_cond_br(lhs_block, lhs_bool, end_block, rhs_block);
        }
        ctx.ssa.seal_block(func, rhs_block);
    }

    ctx.block = rhs_block;
    let rhs_val = emit_expr(ctx, rhs);
    let rhs_end = ctx.block;
    let rhs_bool = {
        let func = ctx.func.as_mut().expect("emission inside a function");
        let rhs_bool = func.build_icmp(rhs_end, Predicate::Ne, rhs_val, zero);
        func.build_br(rhs_end, end_block);
        ctx.ssa.seal_block(func, end_block);
        rhs_bool
    };

    ctx.block = end_block;
    let func = ctx.func.as_mut().expect("emission inside a function");
    // Coming from the left block the value is known: false for &&, true
    // for ||.
    let short_circuit = func.const_int(IrType::I1, if is_and { 0 } else { 1 });
    let phi = func.create_phi(end_block, IrType::I1);
    func.phi_add_incoming(phi, short_circuit, lhs_block);
    func.phi_add_incoming(phi, rhs_bool, rhs_end);
    func.build_cast(end_block, Opcode::Zext, phi, IrType::I32)
}

/// Address of `ident[index]` via the array's saved base pointer.
fn emit_array_sub(ctx: &mut CodeContext, array: &ArraySub) -> ValueId {
    let index = emit_expr(ctx, &array.index);
    let base = ctx.read_ident(array.ident);
    let block = ctx.block;
    let func = ctx.func.as_mut().expect("emission inside a function");
    let elem_ptr = func.value(base).ty().clone();
    func.build_gep(block, base, &[index], elem_ptr)
}

fn emit_expr(ctx: &mut CodeContext, expr: &Expr) -> ValueId {
    match &expr.kind {
        ExprKind::Bad => {
            // Only constructed on error paths, and errors suppress
            // emission, so this is never reached from the driver.
            ctx.func().undef(IrType::I32)
        }
        ExprKind::LogicalAnd(lhs, rhs) => emit_logical(ctx, true, lhs, rhs),
        ExprKind::LogicalOr(lhs, rhs) => emit_logical(ctx, false, lhs, rhs),
        ExprKind::BinaryCmp(op, lhs, rhs) => {
            let lhs = emit_expr(ctx, lhs);
            let rhs = emit_expr(ctx, rhs);
            let pred = match op {
                CmpOp::LessThan => Predicate::Slt,
                CmpOp::GreaterThan => Predicate::Sgt,
                CmpOp::NotEqual => Predicate::Ne,
                CmpOp::EqualTo => Predicate::Eq,
            };
            let block = ctx.block;
            let func = ctx.func.as_mut().expect("emission inside a function");
            let cmp = func.build_icmp(block, pred, lhs, rhs);
            func.build_cast(block, Opcode::Zext, cmp, IrType::I32)
        }
        ExprKind::BinaryMath(op, lhs, rhs) => {
            let lhs = emit_expr(ctx, lhs);
            let rhs = emit_expr(ctx, rhs);
            let opcode = match op {
                MathOp::Add => Opcode::Add,
                MathOp::Sub => Opcode::Sub,
                MathOp::Mul => Opcode::Mul,
                MathOp::Div => Opcode::SDiv,
                MathOp::Mod => Opcode::SRem,
            };
            let block = ctx.block;
            ctx.func().build_binary(block, opcode, lhs, rhs)
        }
        ExprKind::Not(inner) => {
            let value = emit_expr(ctx, inner);
            let block = ctx.block;
            let func = ctx.func.as_mut().expect("emission inside a function");
            let value_ty = func.value(value).ty().clone();
            let zero = if value_ty == IrType::I32 {
                ctx.zero
            } else {
                func.const_int(value_ty, 0)
            };
            let cmp = func.build_icmp(block, Predicate::Eq, value, zero);
            func.build_cast(block, Opcode::Zext, cmp, IrType::I32)
        }
        ExprKind::Constant(value) => {
            let ty = if expr.type_ == Type::Char {
                IrType::I8
            } else {
                IrType::I32
            };
            ctx.func().const_int(ty, *value as i64)
        }
        ExprKind::Str(id) => {
            let entry = ctx.strings.get(*id);
            let name = entry
                .global()
                .expect("string globals are emitted first")
                .to_string();
            let len = entry.text().len() + 1;
            let ty = IrType::ptr_to(IrType::array_of(IrType::I8, len));
            ctx.func().global_ref(&name, ty)
        }
        ExprKind::Ident(ident) => ctx.read_ident(*ident),
        ExprKind::ArrayElem(array) => {
            let addr = emit_array_sub(ctx, array);
            let block = ctx.block;
            // Arrays live in memory, so elements are loaded.
            ctx.func().build_load(block, addr)
        }
        ExprKind::FuncCall { ident, args } => emit_call(ctx, *ident, args, expr.type_),
        ExprKind::Inc(ident) => emit_inc_dec(ctx, *ident, Opcode::Add),
        ExprKind::Dec(ident) => emit_inc_dec(ctx, *ident, Opcode::Sub),
        ExprKind::AddrOfArray(array) => emit_array_sub(ctx, array),
        ExprKind::ToInt(inner) => {
            let value = emit_expr(ctx, inner);
            let block = ctx.block;
            ctx.func()
                .build_cast(block, Opcode::Sext, value, IrType::I32)
        }
        ExprKind::ToChar(inner) => {
            let value = emit_expr(ctx, inner);
            let block = ctx.block;
            ctx.func()
                .build_cast(block, Opcode::Trunc, value, IrType::I8)
        }
    }
}

fn emit_inc_dec(ctx: &mut CodeContext, ident: IdentId, opcode: Opcode) -> ValueId {
    let current = ctx.read_ident(ident);
    let ty = ctx.ident_ty(ident);
    let block = ctx.block;
    let one = ctx.func().const_int(ty, 1);
    let next = ctx.func().build_binary(block, opcode, current, one);
    ctx.write_ident(ident, next);
    ctx.read_ident(ident)
}

fn emit_call(ctx: &mut CodeContext, ident: IdentId, args: &[Expr], ret: Type) -> ValueId {
    let callee = ctx.syms.ident(ident).name().to_string();
    let mut arg_values = Vec::new();

    for arg in args {
        let mut value = emit_expr(ctx, arg);
        let block = ctx.block;
        let zero = ctx.zero;
        let func = ctx.func.as_mut().expect("emission inside a function");
        let ty = func.value(value).ty().clone();
        let already_gep = matches!(
            func.inst(value),
            Some(inst) if inst.op == Opcode::GetElementPtr
        );
        if !already_gep && ty.is_ptr() {
            let pointee = ty.pointee().cloned().expect("pointer has pointee");
            if let Some(elem) = pointee.elem() {
                // Pointer to a whole array decays to its first element.
                let elem_ptr = IrType::ptr_to(elem.clone());
                value = func.build_gep(block, value, &[zero, zero], elem_ptr);
            } else {
                value = func.build_gep(block, value, &[zero], ty.clone());
            }
        }
        arg_values.push(value);
    }

    let ret_ty = ctx.ir_type(ret, None, true);
    let block = ctx.block;
    ctx.func().build_call(block, &callee, arg_values, ret_ty)
}
