pub mod errors;
mod expr;
mod stmt;
#[cfg(test)]
mod tests;

use std::io;

use tracing::debug;

use self::errors::{Error, ParseExcept, ParseResult};
use super::ast::{ArgDecl, Expr, ExprKind, Function, Program};
use super::lexer::Lexer;
use super::symtab::{FuncSig, IdentId, StringTable, SymbolTable, DUMMY_FUNCTION, DUMMY_VARIABLE};
use super::token::{Token, TokenKind};
use super::types::Type;

/// Recursive-descent parser for USC. Construction runs the whole parse;
/// afterwards the parser exposes the best-effort AST, the symbol and
/// string tables, and any recorded errors. Semantic errors accumulate
/// and never abort the parse; syntactic errors unwind to the nearest
/// statement or declaration boundary and resume from a synchronizing
/// token. An unexpected end of file is fatal.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    file_name: String,
    source: &'a str,
    current: Token,

    root: Option<Program>,
    symbols: SymbolTable,
    strings: StringTable,
    errors: Vec<Error>,

    /// One-slot lookahead buffers that resolve the AssignStmt/ExprStmt
    /// ambiguity: when an identifier (or subscript) turns out not to start
    /// an assignment it is parked here for the factor parser to pick up.
    unused_ident: Option<IdentId>,
    unused_array: Option<super::ast::ArraySub>,

    /// Return type of the function currently being parsed.
    curr_return_type: Type,

    /// Set when a call to printf is seen, so emission declares it.
    need_printf: bool,
}

impl<'a> Parser<'a> {
    /// Parses `source` in full. `file_name` is only used in diagnostics.
    pub fn new(file_name: &str, source: &'a str) -> Self {
        let mut lexer = Lexer::new(source);
        let first = lexer.next_token();
        let mut parser = Parser {
            lexer,
            file_name: file_name.to_string(),
            source,
            current: first,
            root: None,
            symbols: SymbolTable::new(),
            strings: StringTable::new(),
            errors: Vec::new(),
            unused_ident: None,
            unused_array: None,
            curr_return_type: Type::Void,
            need_printf: false,
        };

        // The first token may already be unrecognized.
        if parser.current.kind == TokenKind::Unknown {
            let text = parser.current.text().to_string();
            parser.report_error_msg(&format!("Invalid symbol: {}", text));
            let _ = parser.consume_token_impl(false);
        }

        match parser.parse_program() {
            Ok(program) => parser.root = Some(program),
            Err(except) => parser.report_error(&except),
        }
        debug!(
            errors = parser.errors.len(),
            need_printf = parser.need_printf,
            "parse finished"
        );
        parser
    }

    /// Builds a parser without running the parse, so individual grammar
    /// rules can be driven directly.
    #[cfg(test)]
    pub(crate) fn new_for_tests(source: &'a str) -> Self {
        let mut lexer = Lexer::new(source);
        let first = lexer.next_token();
        Parser {
            lexer,
            file_name: "test.usc".to_string(),
            source,
            current: first,
            root: None,
            symbols: SymbolTable::new(),
            strings: StringTable::new(),
            errors: Vec::new(),
            unused_ident: None,
            unused_array: None,
            curr_return_type: Type::Void,
            need_printf: false,
        }
    }

    /// True when no errors were recorded.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn num_errors(&self) -> usize {
        self.errors.len()
    }

    pub fn need_printf(&self) -> bool {
        self.need_printf
    }

    pub fn root(&self) -> Option<&Program> {
        self.root.as_ref()
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    /// Releases the parse results to the emitter.
    pub fn into_parts(self) -> (Option<Program>, SymbolTable, StringTable, bool) {
        (self.root, self.symbols, self.strings, self.need_printf)
    }

    /// Writes every recorded error in source order:
    /// `file:line:col: error: msg`, the offending line, and a caret line
    /// that preserves tabs so the caret stays aligned.
    pub fn write_errors(&self, out: &mut dyn io::Write) -> io::Result<()> {
        let lines: Vec<&str> = self.source.lines().collect();
        for error in &self.errors {
            writeln!(
                out,
                "{}:{}:{}: error: {}",
                self.file_name, error.loc.line, error.loc.col, error.msg
            )?;
            let line = lines
                .get(error.loc.line.saturating_sub(1) as usize)
                .copied()
                .unwrap_or("");
            writeln!(out, "{}", line)?;
            let mut caret = String::new();
            for c in line.chars().take(error.loc.col.saturating_sub(1) as usize) {
                caret.push(if c == '\t' { '\t' } else { ' ' });
            }
            caret.push('^');
            writeln!(out, "{}", caret)?;
        }
        Ok(())
    }

    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    // ---- token helpers ----

    pub(super) fn peek(&self) -> TokenKind {
        self.current.kind
    }

    pub(super) fn token_text(&self) -> &str {
        self.current.text()
    }

    fn current_loc(&self) -> super::sourceloc::SourceLoc {
        self.current.loc
    }

    /// Consumes the current token. When the next token is unrecognized
    /// this raises [`ParseExcept::UnknownToken`] unless we are inside
    /// error recovery, in which case the symbol is reported and skipped.
    fn consume_token_impl(&mut self, unknown_is_except: bool) -> ParseResult<()> {
        loop {
            let token = self.lexer.next_token();
            if token.kind == TokenKind::Unknown {
                if unknown_is_except {
                    let text = token.text().to_string();
                    self.current = token;
                    return Err(ParseExcept::UnknownToken(text));
                }
                let msg = format!("Invalid symbol: {}", token.text());
                self.errors.push(Error::new(msg, token.loc));
                continue;
            }
            self.current = token;
            return Ok(());
        }
    }

    pub(super) fn consume_token(&mut self) -> ParseResult<()> {
        self.consume_token_impl(true)
    }

    /// If the current token matches, consume it and return true.
    pub(super) fn peek_and_consume(&mut self, desired: TokenKind) -> ParseResult<bool> {
        if self.current.kind == desired {
            self.consume_token()?;
            return Ok(true);
        }
        Ok(false)
    }

    pub(super) fn peek_is_one_of(&self, list: &[TokenKind]) -> bool {
        list.contains(&self.current.kind)
    }

    /// Requires the current token to match; consumes it or raises a
    /// mismatch. Only for terminals with a fixed spelling.
    pub(super) fn match_token(&mut self, desired: TokenKind) -> ParseResult<()> {
        if !self.peek_and_consume(desired)? {
            return Err(ParseExcept::mismatch(desired, &self.current));
        }
        Ok(())
    }

    /// Skips tokens until one of `list` or end of file is current.
    pub(super) fn consume_until(&mut self, list: &[TokenKind]) {
        while self.current.kind != TokenKind::EndOfFile && !list.contains(&self.current.kind) {
            // Unknown symbols are reported and skipped during recovery.
            let _ = self.consume_token_impl(false);
        }
    }

    // ---- diagnostics ----

    pub(super) fn report_error(&mut self, except: &ParseExcept) {
        self.errors
            .push(Error::new(except.to_string(), self.current_loc()));
    }

    pub(super) fn report_error_msg(&mut self, msg: &str) {
        self.errors
            .push(Error::new(msg.to_string(), self.current_loc()));
    }

    pub(super) fn report_semant_error(&mut self, msg: String) {
        self.errors.push(Error::new(msg, self.current_loc()));
    }

    pub(super) fn report_semant_error_at(
        &mut self,
        msg: String,
        loc: super::sourceloc::SourceLoc,
    ) {
        self.errors.push(Error::new(msg, loc));
    }

    /// Looks up a variable, reporting an error and substituting the
    /// recovery dummy when it is undeclared.
    pub(super) fn get_variable(&mut self, name: &str) -> IdentId {
        match self.symbols.get_identifier(name) {
            Some(id) => id,
            None => {
                self.report_semant_error(format!("Use of undeclared identifier '{}'", name));
                self.symbols
                    .get_identifier(DUMMY_VARIABLE)
                    .expect("dummy variable always exists")
            }
        }
    }

    // ---- implicit conversions ----

    /// Widens a char-typed read to int. Constants are simply retagged;
    /// identifier, array element, increment, and decrement reads are
    /// wrapped in a conversion node. Everything already int-shaped (or an
    /// array) passes through.
    pub(super) fn char_to_int(&self, expr: Expr) -> Expr {
        match expr.type_ {
            Type::Int | Type::CharArray | Type::IntArray => expr,
            _ => match expr.kind {
                ExprKind::Constant(_) => Expr::new(Type::Int, expr.kind),
                ExprKind::Ident(_)
                | ExprKind::ArrayElem(_)
                | ExprKind::Inc(_)
                | ExprKind::Dec(_) => Expr::to_int(expr),
                _ => expr,
            },
        }
    }

    /// Narrows an int expression to char at an assignment or return
    /// boundary. Constants are retagged rather than converted; a widening
    /// wrapper is simply peeled off.
    pub(super) fn int_to_char(&self, expr: Expr) -> Expr {
        if expr.type_ == Type::Char {
            return expr;
        }
        match expr.kind {
            ExprKind::Constant(_) => Expr::new(Type::Char, expr.kind),
            ExprKind::ToInt(child) => *child,
            _ => Expr::to_char(expr),
        }
    }

    // ---- top-level grammar ----

    fn parse_program(&mut self) -> ParseResult<Program> {
        let mut program = Program { funcs: Vec::new() };

        while let Some(func) = self.parse_function()? {
            program.funcs.push(func);
        }

        if self.peek() != TokenKind::EndOfFile {
            self.report_error_msg("Expected end of file");
        }

        Ok(program)
    }

    fn parse_function(&mut self) -> ParseResult<Option<Function>> {
        if !self.peek_is_one_of(&[TokenKind::KeyVoid, TokenKind::KeyInt, TokenKind::KeyChar]) {
            return Ok(None);
        }

        let ret_type = match self.peek() {
            TokenKind::KeyChar => Type::Char,
            TokenKind::KeyInt => Type::Int,
            _ => Type::Void,
        };
        self.curr_return_type = ret_type;
        self.consume_token()?;

        // Returning an array is not expressible; give a useful message.
        if self.peek_and_consume(TokenKind::LBracket)? {
            self.report_semant_error("USC does not allow return of array types".to_string());
            self.consume_until(&[TokenKind::RBracket]);
            if self.peek() == TokenKind::EndOfFile {
                return Err(ParseExcept::Eof);
            }
            self.match_token(TokenKind::RBracket)?;
        }

        let ident;
        if self.peek() != TokenKind::Identifier {
            let msg = format!("Function name {} is invalid", self.token_text());
            self.report_error_msg(&msg);
            // Use the recovery dummy so the parse continues.
            ident = self
                .symbols
                .get_identifier(DUMMY_FUNCTION)
                .expect("dummy function always exists");
            self.consume_until(&[TokenKind::LParen]);
            if self.peek() == TokenKind::EndOfFile {
                return Err(ParseExcept::Eof);
            }
        } else {
            if self.symbols.is_declared_in_scope(self.token_text()) {
                let msg = format!(
                    "Invalid redeclaration of function '{}'",
                    self.token_text()
                );
                self.report_semant_error(msg);
                ident = self
                    .symbols
                    .get_identifier(DUMMY_FUNCTION)
                    .expect("dummy function always exists");
            } else {
                let name = self.token_text().to_string();
                ident = self.symbols.create_identifier(&name);
                self.symbols.ident_mut(ident).set_type(Type::Function);

                if name == "main" && ret_type != Type::Int {
                    self.report_semant_error("Function 'main' must return an int".to_string());
                }
            }
            self.consume_token()?;
        }

        // Arguments share the function body's scope.
        let scope = self.symbols.enter_scope();
        let mut func = Function {
            ident,
            return_type: ret_type,
            scope,
            args: Vec::new(),
            body: super::ast::CompoundStmt {
                decls: Vec::new(),
                stmts: Vec::new(),
            },
        };

        // Install a provisional signature so recursive calls in the body
        // resolve; completed once the argument list is known.
        if !self.symbols.ident(ident).is_dummy() {
            self.symbols.ident_mut(ident).set_signature(FuncSig {
                ret: ret_type,
                args: Vec::new(),
            });
        }

        let parse_result = self.parse_function_rest(&mut func);
        // Leave the scope before propagating any fatal error.
        self.symbols.exit_scope();
        parse_result?;

        Ok(Some(func))
    }

    fn parse_function_rest(&mut self, func: &mut Function) -> ParseResult<()> {
        if self.peek_and_consume(TokenKind::LParen)? {
            if let Err(except) = self.parse_arg_list(func) {
                if matches!(except, ParseExcept::Eof) {
                    return Err(except);
                }
                self.report_error(&except);
                self.consume_until(&[TokenKind::RParen]);
                if self.peek() == TokenKind::EndOfFile {
                    return Err(ParseExcept::Eof);
                }
            }

            self.match_token(TokenKind::RParen)?;
            let ident = self.symbols.ident(func.ident);
            if ident.name() == "main" && !func.args.is_empty() {
                self.report_semant_error("Function 'main' cannot take any arguments".to_string());
            }
        } else {
            let msg = format!(
                "Missing argument declaration for function {}",
                self.symbols.ident(func.ident).name()
            );
            self.report_error_msg(&msg);
            self.consume_until(&[TokenKind::LBrace]);
            if self.peek() == TokenKind::EndOfFile {
                return Err(ParseExcept::Eof);
            }
        }

        // The argument list is final; record the signature call sites use.
        if !self.symbols.ident(func.ident).is_dummy() {
            let arg_types: Vec<Type> = func
                .args
                .iter()
                .map(|arg| self.symbols.ident(arg.ident).type_())
                .collect();
            self.symbols.ident_mut(func.ident).set_signature(FuncSig {
                ret: func.return_type,
                args: arg_types,
            });
        }

        let body = match self.parse_compound_stmt(true) {
            Ok(body) => body,
            Err(except) => {
                if matches!(except, ParseExcept::Eof) {
                    return Err(except);
                }
                self.report_error(&except);
                self.consume_until(&[TokenKind::RBrace]);
                if self.peek() == TokenKind::EndOfFile {
                    return Err(ParseExcept::Eof);
                }
                self.consume_token()?;
                None
            }
        };

        match body {
            Some(body) => {
                func.body = body;
                Ok(())
            }
            None => Err(ParseExcept::msg("Function implementation missing")),
        }
    }

    fn parse_arg_list(&mut self, func: &mut Function) -> ParseResult<()> {
        if let Some(arg) = self.parse_arg_decl()? {
            func.args.push(arg);
            while self.peek_and_consume(TokenKind::Comma)? {
                match self.parse_arg_decl()? {
                    Some(arg) => func.args.push(arg),
                    None => {
                        return Err(ParseExcept::msg(
                            "Additional function argument must follow a comma.",
                        ))
                    }
                }
            }
        }
        Ok(())
    }

    fn parse_arg_decl(&mut self) -> ParseResult<Option<ArgDecl>> {
        if !self.peek_is_one_of(&[TokenKind::KeyInt, TokenKind::KeyChar]) {
            return Ok(None);
        }

        let mut var_type = match self.peek() {
            TokenKind::KeyInt => Type::Int,
            _ => Type::Char,
        };
        self.consume_token()?;

        if self.peek() != TokenKind::Identifier {
            return Err(ParseExcept::msg("Unnamed function parameters are not allowed"));
        }

        let ident;
        if self.symbols.is_declared_in_scope(self.token_text()) {
            let msg = format!(
                "Invalid redeclaration of argument '{}'",
                self.token_text()
            );
            self.report_semant_error(msg);
            ident = self
                .symbols
                .get_identifier(DUMMY_VARIABLE)
                .expect("dummy variable always exists");
        } else {
            let name = self.token_text().to_string();
            ident = self.symbols.create_identifier(&name);
        }

        self.consume_token()?;

        if self.peek_and_consume(TokenKind::LBracket)? {
            self.match_token(TokenKind::RBracket)?;
            var_type = match var_type {
                Type::Int => Type::IntArray,
                _ => Type::CharArray,
            };
        }

        if !self.symbols.ident(ident).is_dummy() {
            self.symbols.ident_mut(ident).set_type(var_type);
        }

        Ok(Some(ArgDecl { ident }))
    }
}
