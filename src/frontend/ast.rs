use std::fmt::Write;

use super::symtab::{IdentId, ScopeId, StrId, StringTable, SymbolTable};
use super::types::Type;

/// Comparison operators carried by [`ExprKind::BinaryCmp`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    EqualTo,
    NotEqual,
    LessThan,
    GreaterThan,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::EqualTo => "==",
            CmpOp::NotEqual => "!=",
            CmpOp::LessThan => "<",
            CmpOp::GreaterThan => ">",
        }
    }
}

/// Arithmetic operators carried by [`ExprKind::BinaryMath`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MathOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl MathOp {
    pub fn symbol(self) -> &'static str {
        match self {
            MathOp::Add => "+",
            MathOp::Sub => "-",
            MathOp::Mul => "*",
            MathOp::Div => "/",
            MathOp::Mod => "%",
        }
    }
}

/// Root of a parsed translation unit.
#[derive(Debug)]
pub struct Program {
    pub funcs: Vec<Function>,
}

#[derive(Debug)]
pub struct Function {
    pub ident: IdentId,
    pub return_type: Type,
    /// The scope opened for the function's arguments and body; emission
    /// walks it to front-load array allocas.
    pub scope: ScopeId,
    pub args: Vec<ArgDecl>,
    pub body: CompoundStmt,
}

#[derive(Debug)]
pub struct ArgDecl {
    pub ident: IdentId,
}

#[derive(Debug)]
pub struct Decl {
    pub ident: IdentId,
    pub init: Option<Expr>,
}

#[derive(Debug)]
pub struct CompoundStmt {
    pub decls: Vec<Decl>,
    pub stmts: Vec<Stmt>,
}

#[derive(Debug)]
pub enum Stmt {
    Compound(CompoundStmt),
    Assign { ident: IdentId, expr: Expr },
    AssignArray { array: ArraySub, expr: Expr },
    If { cond: Expr, then_stmt: Box<Stmt>, else_stmt: Option<Box<Stmt>> },
    While { cond: Expr, body: Box<Stmt> },
    Return(Option<Expr>),
    Expr(Expr),
    Null,
}

/// `ident [ index ]` helper shared by element reads, element stores, and
/// address-of expressions.
#[derive(Debug)]
pub struct ArraySub {
    pub ident: IdentId,
    pub index: Box<Expr>,
}

/// Every expression carries its resolved type; the parser fills it in at
/// construction (leaves) or when both operands are known (binary ops).
#[derive(Debug)]
pub struct Expr {
    pub type_: Type,
    pub kind: ExprKind,
}

#[derive(Debug)]
pub enum ExprKind {
    /// Placeholder produced when a parenthesized subexpression fails, so
    /// enclosing operators still see an operand.
    Bad,
    LogicalAnd(Box<Expr>, Box<Expr>),
    LogicalOr(Box<Expr>, Box<Expr>),
    BinaryCmp(CmpOp, Box<Expr>, Box<Expr>),
    BinaryMath(MathOp, Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Constant(i32),
    Str(StrId),
    Ident(IdentId),
    ArrayElem(ArraySub),
    FuncCall { ident: IdentId, args: Vec<Expr> },
    Inc(IdentId),
    Dec(IdentId),
    AddrOfArray(ArraySub),
    /// Implicit char-to-int widening inserted on reads.
    ToInt(Box<Expr>),
    /// Implicit int-to-char narrowing inserted at assignment and return
    /// boundaries.
    ToChar(Box<Expr>),
}

impl Expr {
    pub fn new(type_: Type, kind: ExprKind) -> Self {
        Expr { type_, kind }
    }

    pub fn bad() -> Self {
        Expr::new(Type::Void, ExprKind::Bad)
    }

    /// Constants always start life as ints; assignment boundaries may
    /// retag them to char.
    pub fn constant(value: i32) -> Self {
        Expr::new(Type::Int, ExprKind::Constant(value))
    }

    pub fn to_int(expr: Expr) -> Self {
        Expr::new(Type::Int, ExprKind::ToInt(Box::new(expr)))
    }

    pub fn to_char(expr: Expr) -> Self {
        Expr::new(Type::Char, ExprKind::ToChar(Box::new(expr)))
    }
}

/// Renders the AST either as an indented tree dump (`-emit-ast`) or back
/// to USC source. Identifier and string names live in the parser's
/// tables, so the printer borrows both.
pub struct AstPrinter<'a> {
    syms: &'a SymbolTable,
    strings: &'a StringTable,
}

impl<'a> AstPrinter<'a> {
    pub fn new(syms: &'a SymbolTable, strings: &'a StringTable) -> Self {
        AstPrinter { syms, strings }
    }

    fn name(&self, id: IdentId) -> &str {
        self.syms.ident(id).name()
    }

    // ---- tree dump ----

    pub fn dump(&self, program: &Program) -> String {
        let mut out = String::new();
        out.push_str("Program:\n");
        for func in &program.funcs {
            self.dump_function(&mut out, func, 1);
        }
        out
    }

    fn indent(out: &mut String, depth: usize) {
        for _ in 0..depth {
            out.push_str("---");
        }
    }

    fn dump_function(&self, out: &mut String, func: &Function, depth: usize) {
        Self::indent(out, depth);
        let _ = writeln!(
            out,
            "Function: {} {}",
            func.return_type.text(),
            self.name(func.ident)
        );
        for arg in &func.args {
            Self::indent(out, depth + 1);
            let ident = self.syms.ident(arg.ident);
            let _ = writeln!(out, "ArgDecl: {} {}", ident.type_().text(), ident.name());
        }
        self.dump_compound(out, &func.body, depth + 1);
    }

    fn dump_decl(&self, out: &mut String, decl: &Decl, depth: usize) {
        Self::indent(out, depth);
        let ident = self.syms.ident(decl.ident);
        let count = ident.array_count().unwrap_or(0);
        match ident.type_() {
            Type::IntArray => {
                let _ = writeln!(out, "Decl: int[{}] {}", count, ident.name());
            }
            Type::CharArray => {
                let _ = writeln!(out, "Decl: char[{}] {}", count, ident.name());
            }
            other => {
                let _ = writeln!(out, "Decl: {} {}", other.text(), ident.name());
            }
        }
        if let Some(init) = &decl.init {
            self.dump_expr(out, init, depth + 1);
        }
    }

    fn dump_compound(&self, out: &mut String, compound: &CompoundStmt, depth: usize) {
        Self::indent(out, depth);
        out.push_str("CompoundStmt:\n");
        for decl in &compound.decls {
            self.dump_decl(out, decl, depth + 1);
        }
        for stmt in &compound.stmts {
            self.dump_stmt(out, stmt, depth + 1);
        }
    }

    fn dump_stmt(&self, out: &mut String, stmt: &Stmt, depth: usize) {
        match stmt {
            Stmt::Compound(compound) => self.dump_compound(out, compound, depth),
            Stmt::Assign { ident, expr } => {
                Self::indent(out, depth);
                let _ = writeln!(out, "AssignStmt: {}", self.name(*ident));
                self.dump_expr(out, expr, depth + 1);
            }
            Stmt::AssignArray { array, expr } => {
                Self::indent(out, depth);
                out.push_str("AssignArrayStmt:\n");
                self.dump_array_sub(out, array, depth + 1);
                self.dump_expr(out, expr, depth + 1);
            }
            Stmt::If {
                cond,
                then_stmt,
                else_stmt,
            } => {
                Self::indent(out, depth);
                out.push_str("IfStmt: \n");
                self.dump_expr(out, cond, depth + 1);
                self.dump_stmt(out, then_stmt, depth + 1);
                if let Some(else_stmt) = else_stmt {
                    self.dump_stmt(out, else_stmt, depth + 1);
                }
            }
            Stmt::While { cond, body } => {
                Self::indent(out, depth);
                out.push_str("WhileStmt\n");
                self.dump_expr(out, cond, depth + 1);
                self.dump_stmt(out, body, depth + 1);
            }
            Stmt::Return(None) => {
                Self::indent(out, depth);
                out.push_str("ReturnStmt: (empty)\n");
            }
            Stmt::Return(Some(expr)) => {
                Self::indent(out, depth);
                out.push_str("ReturnStmt:\n");
                self.dump_expr(out, expr, depth + 1);
            }
            Stmt::Expr(expr) => {
                Self::indent(out, depth);
                out.push_str("ExprStmt\n");
                self.dump_expr(out, expr, depth + 1);
            }
            Stmt::Null => {
                Self::indent(out, depth);
                out.push_str("NullStmt\n");
            }
        }
    }

    fn dump_array_sub(&self, out: &mut String, array: &ArraySub, depth: usize) {
        Self::indent(out, depth);
        let _ = writeln!(out, "ArraySub: {}", self.name(array.ident));
        self.dump_expr(out, &array.index, depth + 1);
    }

    fn dump_expr(&self, out: &mut String, expr: &Expr, depth: usize) {
        match &expr.kind {
            ExprKind::Bad => {
                Self::indent(out, depth);
                out.push_str("BadExpr:\n");
            }
            ExprKind::LogicalAnd(lhs, rhs) => {
                Self::indent(out, depth);
                out.push_str("LogicalAnd: \n");
                self.dump_expr(out, lhs, depth + 1);
                self.dump_expr(out, rhs, depth + 1);
            }
            ExprKind::LogicalOr(lhs, rhs) => {
                Self::indent(out, depth);
                out.push_str("LogicalOr: \n");
                self.dump_expr(out, lhs, depth + 1);
                self.dump_expr(out, rhs, depth + 1);
            }
            ExprKind::BinaryCmp(op, lhs, rhs) => {
                Self::indent(out, depth);
                let _ = writeln!(out, "BinaryCmp {}:", op.symbol());
                self.dump_expr(out, lhs, depth + 1);
                self.dump_expr(out, rhs, depth + 1);
            }
            ExprKind::BinaryMath(op, lhs, rhs) => {
                Self::indent(out, depth);
                let _ = writeln!(out, "BinaryMath {}:", op.symbol());
                self.dump_expr(out, lhs, depth + 1);
                self.dump_expr(out, rhs, depth + 1);
            }
            ExprKind::Not(inner) => {
                Self::indent(out, depth);
                out.push_str("NotExpr:\n");
                self.dump_expr(out, inner, depth + 1);
            }
            ExprKind::Constant(value) => {
                Self::indent(out, depth);
                let _ = writeln!(out, "ConstantExpr: {}", value);
            }
            ExprKind::Str(id) => {
                Self::indent(out, depth);
                let _ = writeln!(out, "StringExpr: {}", self.strings.get(*id).text());
            }
            ExprKind::Ident(id) => {
                Self::indent(out, depth);
                let _ = writeln!(out, "IdentExpr: {}", self.name(*id));
            }
            ExprKind::ArrayElem(array) => {
                Self::indent(out, depth);
                out.push_str("ArrayExpr: \n");
                self.dump_array_sub(out, array, depth + 1);
            }
            ExprKind::FuncCall { ident, args } => {
                Self::indent(out, depth);
                let _ = writeln!(out, "FuncExpr: {}", self.name(*ident));
                for arg in args {
                    self.dump_expr(out, arg, depth + 1);
                }
            }
            ExprKind::Inc(id) => {
                Self::indent(out, depth);
                let _ = writeln!(out, "IncExpr: {}", self.name(*id));
            }
            ExprKind::Dec(id) => {
                Self::indent(out, depth);
                let _ = writeln!(out, "DecExpr: {}", self.name(*id));
            }
            ExprKind::AddrOfArray(array) => {
                Self::indent(out, depth);
                out.push_str("AddrOfArray:\n");
                self.dump_array_sub(out, array, depth + 1);
            }
            ExprKind::ToInt(inner) => {
                Self::indent(out, depth);
                out.push_str("ToIntExpr: \n");
                self.dump_expr(out, inner, depth + 1);
            }
            ExprKind::ToChar(inner) => {
                Self::indent(out, depth);
                out.push_str("ToCharExpr: \n");
                self.dump_expr(out, inner, depth + 1);
            }
        }
    }

    // ---- source form ----
    //
    // Regenerates compilable USC. Implicit conversion nodes print their
    // child, so parsing the output reinserts them at the same places and
    // yields a structurally equal tree.

    pub fn source_program(&self, program: &Program) -> String {
        let mut out = String::new();
        for func in &program.funcs {
            self.write_function(&mut out, func);
            out.push('\n');
        }
        out
    }

    fn write_function(&self, out: &mut String, func: &Function) {
        let _ = write!(
            out,
            "{} {}(",
            func.return_type.text(),
            self.name(func.ident)
        );
        for (i, arg) in func.args.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let ident = self.syms.ident(arg.ident);
            match ident.type_() {
                Type::IntArray => {
                    let _ = write!(out, "int {}[]", ident.name());
                }
                Type::CharArray => {
                    let _ = write!(out, "char {}[]", ident.name());
                }
                other => {
                    let _ = write!(out, "{} {}", other.text(), ident.name());
                }
            }
        }
        out.push_str(") ");
        self.write_compound(out, &func.body);
    }

    fn write_compound(&self, out: &mut String, compound: &CompoundStmt) {
        out.push_str("{\n");
        for decl in &compound.decls {
            self.write_decl(out, decl);
        }
        for stmt in &compound.stmts {
            self.write_stmt(out, stmt);
        }
        out.push_str("}\n");
    }

    fn write_decl(&self, out: &mut String, decl: &Decl) {
        let ident = self.syms.ident(decl.ident);
        match ident.type_() {
            Type::IntArray => {
                let _ = write!(
                    out,
                    "int {}[{}]",
                    ident.name(),
                    ident.array_count().unwrap_or(0)
                );
            }
            Type::CharArray => {
                let _ = write!(
                    out,
                    "char {}[{}]",
                    ident.name(),
                    ident.array_count().unwrap_or(0)
                );
            }
            other => {
                let _ = write!(out, "{} {}", other.text(), ident.name());
            }
        }
        if let Some(init) = &decl.init {
            out.push_str(" = ");
            self.write_expr(out, init);
        }
        out.push_str(";\n");
    }

    fn write_stmt(&self, out: &mut String, stmt: &Stmt) {
        match stmt {
            Stmt::Compound(compound) => self.write_compound(out, compound),
            Stmt::Assign { ident, expr } => {
                let _ = write!(out, "{} = ", self.name(*ident));
                self.write_expr(out, expr);
                out.push_str(";\n");
            }
            Stmt::AssignArray { array, expr } => {
                let _ = write!(out, "{}[", self.name(array.ident));
                self.write_expr(out, &array.index);
                out.push_str("] = ");
                self.write_expr(out, expr);
                out.push_str(";\n");
            }
            Stmt::If {
                cond,
                then_stmt,
                else_stmt,
            } => {
                out.push_str("if (");
                self.write_expr(out, cond);
                out.push_str(") ");
                self.write_stmt(out, then_stmt);
                if let Some(else_stmt) = else_stmt {
                    out.push_str("else ");
                    self.write_stmt(out, else_stmt);
                }
            }
            Stmt::While { cond, body } => {
                out.push_str("while (");
                self.write_expr(out, cond);
                out.push_str(") ");
                self.write_stmt(out, body);
            }
            Stmt::Return(None) => out.push_str("return;\n"),
            Stmt::Return(Some(expr)) => {
                out.push_str("return ");
                self.write_expr(out, expr);
                out.push_str(";\n");
            }
            Stmt::Expr(expr) => {
                self.write_expr(out, expr);
                out.push_str(";\n");
            }
            Stmt::Null => out.push_str(";\n"),
        }
    }

    pub fn source_expr(&self, expr: &Expr) -> String {
        let mut out = String::new();
        self.write_expr(&mut out, expr);
        out
    }

    fn write_expr(&self, out: &mut String, expr: &Expr) {
        match &expr.kind {
            ExprKind::Bad => out.push_str("<bad>"),
            ExprKind::LogicalAnd(lhs, rhs) => {
                out.push('(');
                self.write_expr(out, lhs);
                out.push_str(" && ");
                self.write_expr(out, rhs);
                out.push(')');
            }
            ExprKind::LogicalOr(lhs, rhs) => {
                out.push('(');
                self.write_expr(out, lhs);
                out.push_str(" || ");
                self.write_expr(out, rhs);
                out.push(')');
            }
            ExprKind::BinaryCmp(op, lhs, rhs) => {
                out.push('(');
                self.write_expr(out, lhs);
                let _ = write!(out, " {} ", op.symbol());
                self.write_expr(out, rhs);
                out.push(')');
            }
            ExprKind::BinaryMath(op, lhs, rhs) => {
                out.push('(');
                self.write_expr(out, lhs);
                let _ = write!(out, " {} ", op.symbol());
                self.write_expr(out, rhs);
                out.push(')');
            }
            ExprKind::Not(inner) => {
                out.push('!');
                self.write_expr(out, inner);
            }
            ExprKind::Constant(value) => {
                let _ = write!(out, "{}", value);
            }
            ExprKind::Str(id) => {
                out.push('"');
                for c in self.strings.get(*id).text().chars() {
                    match c {
                        '\n' => out.push_str("\\n"),
                        '\t' => out.push_str("\\t"),
                        c => out.push(c),
                    }
                }
                out.push('"');
            }
            ExprKind::Ident(id) => out.push_str(self.name(*id)),
            ExprKind::ArrayElem(array) => {
                let _ = write!(out, "{}[", self.name(array.ident));
                self.write_expr(out, &array.index);
                out.push(']');
            }
            ExprKind::FuncCall { ident, args } => {
                let _ = write!(out, "{}(", self.name(*ident));
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_expr(out, arg);
                }
                out.push(')');
            }
            ExprKind::Inc(id) => {
                let _ = write!(out, "++{}", self.name(*id));
            }
            ExprKind::Dec(id) => {
                let _ = write!(out, "--{}", self.name(*id));
            }
            ExprKind::AddrOfArray(array) => {
                let _ = write!(out, "&{}[", self.name(array.ident));
                self.write_expr(out, &array.index);
                out.push(']');
            }
            // Implicit conversions do not appear in source.
            ExprKind::ToInt(inner) | ExprKind::ToChar(inner) => self.write_expr(out, inner),
        }
    }
}
