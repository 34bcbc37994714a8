//! Declaration and statement grammar rules.

use super::errors::{ParseExcept, ParseResult};
use super::Parser;
use crate::frontend::ast::{ArraySub, CompoundStmt, Decl, Expr, ExprKind, Stmt};
use crate::frontend::symtab::DUMMY_VARIABLE;
use crate::frontend::token::TokenKind;
use crate::frontend::types::Type;

impl<'a> Parser<'a> {
    pub(super) fn parse_decl(&mut self) -> ParseResult<Option<Decl>> {
        // A decl MUST start with int or char.
        if !self.peek_is_one_of(&[TokenKind::KeyInt, TokenKind::KeyChar]) {
            return Ok(None);
        }

        let mut decl_type = if self.peek() == TokenKind::KeyInt {
            Type::Int
        } else {
            Type::Char
        };
        self.consume_token()?;

        // Until the identifier parses cleanly, recovery uses the dummy.
        let mut ident = self
            .symbols
            .get_identifier(DUMMY_VARIABLE)
            .expect("dummy variable always exists");

        let result: ParseResult<Decl> = (|| {
            if self.peek() != TokenKind::Identifier {
                return Err(ParseExcept::msg("Type must be followed by identifier"));
            }
            if self.symbols.is_declared_in_scope(self.token_text()) {
                let msg = format!(
                    "Invalid redeclaration of identifier '{}'",
                    self.token_text()
                );
                self.report_semant_error(msg);
            }
            let name = self.token_text().to_string();
            ident = self.symbols.create_identifier(&name);
            self.consume_token()?;

            if self.peek_and_consume(TokenKind::LBracket)? {
                let const_expr = self.parse_constant_factor()?;
                if decl_type == Type::Int {
                    decl_type = Type::IntArray;
                    // Int arrays must have a constant size; USC has no
                    // initializer lists.
                    if const_expr.is_none() {
                        self.report_semant_error(
                            "Int arrays must have a defined constant size".to_string(),
                        );
                    }
                } else {
                    decl_type = Type::CharArray;
                }

                match const_expr {
                    Some(expr) => {
                        let count = match expr.kind {
                            ExprKind::Constant(value) => value,
                            _ => 0,
                        };
                        if count <= 0 || count > 65536 {
                            self.report_semant_error(
                                "Arrays must have a min of 1 and a max of 65536 elements"
                                    .to_string(),
                            );
                        }
                        self.symbols
                            .ident_mut(ident)
                            .set_array_count(count.max(0) as usize);
                    }
                    None => {
                        // Char arrays may get their size from the
                        // initializer below.
                        self.symbols.ident_mut(ident).set_array_count(0);
                    }
                }

                self.match_token(TokenKind::RBracket)?;
            }

            self.symbols.ident_mut(ident).set_type(decl_type);

            let mut assign_expr = None;
            if self.peek_and_consume(TokenKind::Assign)? {
                if decl_type == Type::IntArray {
                    self.report_semant_error(
                        "USC does not allow assignment of int array declarations".to_string(),
                    );
                }

                let expr = match self.parse_expr()? {
                    Some(expr) => expr,
                    None => {
                        return Err(ParseExcept::msg(
                            "Invalid expression after = in declaration",
                        ))
                    }
                };

                let ident_type = self.symbols.ident(ident).type_();
                let expr = match (ident_type, expr.type_) {
                    (Type::Int, Type::Char)
                    | (Type::Int, Type::Int)
                    | (Type::Char, Type::Char)
                    | (Type::CharArray, Type::CharArray) => expr,
                    (Type::Char, Type::Int) | (Type::Char, Type::Void) => self.int_to_char(expr),
                    (to, from) => {
                        let msg = format!(
                            "Cannot assign an expression of type {} to {}",
                            from.text(),
                            to.text()
                        );
                        self.report_semant_error(msg);
                        expr
                    }
                };

                // A char array initialized from a string either takes its
                // size from the string or must be big enough for it.
                if ident_type == Type::CharArray {
                    if let ExprKind::Str(str_id) = &expr.kind {
                        let needed = self.strings.get(*str_id).text().len() + 1;
                        match self.symbols.ident(ident).array_count() {
                            Some(0) => self.symbols.ident_mut(ident).set_array_count(needed),
                            Some(count) if count < needed => {
                                self.report_semant_error(
                                    "Declared array cannot fit string".to_string(),
                                );
                            }
                            _ => {}
                        }
                    }
                }

                assign_expr = Some(expr);
            } else if self.symbols.ident(ident).type_() == Type::CharArray
                && self.symbols.ident(ident).array_count() == Some(0)
            {
                self.report_semant_error(
                    "char array must have declared size if there's no assignment".to_string(),
                );
            }

            self.match_token(TokenKind::SemiColon)?;

            Ok(Decl {
                ident,
                init: assign_expr,
            })
        })();

        match result {
            Ok(decl) => Ok(Some(decl)),
            Err(except) => {
                if matches!(except, ParseExcept::Eof) {
                    return Err(except);
                }
                self.report_error(&except);
                self.consume_until(&[TokenKind::SemiColon]);
                if self.peek() == TokenKind::EndOfFile {
                    return Err(ParseExcept::Eof);
                }
                self.consume_token()?;
                // Keep a decl with the recovery identifier so the parse
                // can continue with the next one.
                Ok(Some(Decl { ident, init: None }))
            }
        }
    }

    pub(super) fn parse_stmt(&mut self) -> ParseResult<Option<Stmt>> {
        let result = self.parse_stmt_inner();
        match result {
            Ok(stmt) => Ok(stmt),
            Err(except) => {
                if matches!(except, ParseExcept::Eof) {
                    return Err(except);
                }
                self.report_error(&except);
                self.consume_until(&[TokenKind::SemiColon]);
                if self.peek() == TokenKind::EndOfFile {
                    return Err(ParseExcept::Eof);
                }
                self.consume_token()?;
                Ok(Some(Stmt::Null))
            }
        }
    }

    fn parse_stmt_inner(&mut self) -> ParseResult<Option<Stmt>> {
        // NOTE: AssignStmt HAS to come before ExprStmt: both begin with an
        // identifier, and the assignment parser parks the identifier in
        // the unused slot when it declines.
        if let Some(stmt) = self.parse_compound_stmt(false)?.map(Stmt::Compound) {
            return Ok(Some(stmt));
        }
        if let Some(stmt) = self.parse_assign_stmt()? {
            return Ok(Some(stmt));
        }
        if let Some(stmt) = self.parse_return_stmt()? {
            return Ok(Some(stmt));
        }
        if let Some(stmt) = self.parse_while_stmt()? {
            return Ok(Some(stmt));
        }
        if let Some(stmt) = self.parse_expr_stmt()? {
            return Ok(Some(stmt));
        }
        if let Some(stmt) = self.parse_if_stmt()? {
            return Ok(Some(stmt));
        }
        if let Some(stmt) = self.parse_null_stmt()? {
            return Ok(Some(stmt));
        }

        if self.peek_is_one_of(&[TokenKind::KeyInt, TokenKind::KeyChar]) {
            return Err(ParseExcept::msg(
                "Declarations are only allowed at the beginning of a scope block",
            ));
        }

        Ok(None)
    }

    /// When the compound statement is a function body the scope change
    /// happened at a higher level (arguments live in it), so it must not
    /// happen here.
    pub(super) fn parse_compound_stmt(
        &mut self,
        is_func_body: bool,
    ) -> ParseResult<Option<CompoundStmt>> {
        if self.peek() != TokenKind::LBrace {
            return Ok(None);
        }
        self.consume_token()?;
        if !is_func_body {
            self.symbols.enter_scope();
        }

        let result: ParseResult<CompoundStmt> = (|| {
            let mut compound = CompoundStmt {
                decls: Vec::new(),
                stmts: Vec::new(),
            };

            while let Some(decl) = self.parse_decl()? {
                compound.decls.push(decl);
            }

            let mut return_exists = false;
            while let Some(stmt) = self.parse_stmt()? {
                if matches!(stmt, Stmt::Return(_)) {
                    return_exists = true;
                }
                compound.stmts.push(stmt);
            }

            if is_func_body && !return_exists {
                if self.curr_return_type != Type::Void {
                    self.report_semant_error(
                        "USC requires non-void functions to end with a return".to_string(),
                    );
                } else {
                    // Void functions get a synthetic return.
                    compound.stmts.push(Stmt::Return(None));
                }
            }

            self.match_token(TokenKind::RBrace)?;
            Ok(compound)
        })();

        if !is_func_body {
            self.symbols.exit_scope();
        }
        result.map(Some)
    }

    pub(super) fn parse_assign_stmt(&mut self) -> ParseResult<Option<Stmt>> {
        if self.peek() != TokenKind::Identifier {
            return Ok(None);
        }

        let name = self.token_text().to_string();
        let ident = self.get_variable(&name);
        self.consume_token()?;

        let mut array_sub = None;
        if self.peek_and_consume(TokenKind::LBracket)? {
            let index = (|| -> ParseResult<Expr> {
                match self.parse_expr()? {
                    Some(expr) => Ok(expr),
                    None => Err(ParseExcept::msg("Valid expression required inside [ ].")),
                }
            })();
            match index {
                Ok(index) => {
                    array_sub = Some(ArraySub {
                        ident,
                        index: Box::new(index),
                    });
                }
                Err(except) => {
                    if matches!(except, ParseExcept::Eof) {
                        return Err(except);
                    }
                    self.report_error(&except);
                    self.consume_until(&[TokenKind::RBracket]);
                    if self.peek() == TokenKind::EndOfFile {
                        return Err(ParseExcept::Eof);
                    }
                }
            }
            self.match_token(TokenKind::RBracket)?;
        }

        // An identifier (or subscript) is only an assignment if `=` comes
        // next; otherwise it was the start of an expression statement and
        // gets parked for the factor parser.
        let assign_loc = self.current.loc;
        if self.peek_and_consume(TokenKind::Assign)? {
            let expr = match self.parse_expr()? {
                Some(expr) => expr,
                None => return Err(ParseExcept::msg("= must be followed by an expression")),
            };

            let stmt = if let Some(array) = array_sub {
                let sub_type = if self.symbols.ident(array.ident).type_() == Type::IntArray {
                    Type::Int
                } else {
                    Type::Char
                };
                let expr = if sub_type != expr.type_ {
                    if sub_type == Type::Char && expr.type_ == Type::Int {
                        self.int_to_char(expr)
                    } else {
                        let msg = format!(
                            "Cannot assign an expression of type {} to {}",
                            expr.type_.text(),
                            sub_type.text()
                        );
                        self.report_semant_error_at(msg, assign_loc);
                        expr
                    }
                } else {
                    expr
                };
                Stmt::AssignArray { array, expr }
            } else {
                let ident_type = self.symbols.ident(ident).type_();
                let expr = match (ident_type, expr.type_) {
                    (Type::Int, Type::Char)
                    | (Type::Int, Type::Int)
                    | (Type::Int, Type::Void)
                    | (Type::Char, Type::Void)
                    | (Type::Char, Type::Char) => expr,
                    (Type::Char, Type::Int) => self.int_to_char(expr),
                    (Type::CharArray, Type::CharArray) => {
                        self.report_semant_error_at(
                            "Reassignment of arrays is not allowed".to_string(),
                            assign_loc,
                        );
                        expr
                    }
                    (to, from) => {
                        let msg = format!(
                            "Cannot assign an expression of type {} to {}",
                            from.text(),
                            to.text()
                        );
                        self.report_semant_error_at(msg, assign_loc);
                        expr
                    }
                };
                Stmt::Assign { ident, expr }
            };

            self.match_token(TokenKind::SemiColon)?;
            Ok(Some(stmt))
        } else {
            if let Some(array) = array_sub {
                self.unused_array = Some(array);
            } else {
                self.unused_ident = Some(ident);
            }
            Ok(None)
        }
    }

    pub(super) fn parse_if_stmt(&mut self) -> ParseResult<Option<Stmt>> {
        if !self.peek_is_one_of(&[TokenKind::KeyIf, TokenKind::KeyElse]) {
            return Ok(None);
        }
        self.consume_token()?;

        if self.peek() == TokenKind::SemiColon {
            return Err(ParseExcept::msg("Expected: ( but saw: ;"));
        }

        let cond = match self.parse_expr() {
            Ok(Some(expr)) => expr,
            Ok(None) => {
                self.report_error_msg("Invalid condition for if statement");
                let _ = self.consume_token_impl(false);
                Expr::bad()
            }
            Err(_) => {
                self.report_error_msg("Invalid condition for if statement");
                let _ = self.consume_token_impl(false);
                Expr::bad()
            }
        };

        let then_stmt = self.parse_stmt()?.unwrap_or(Stmt::Null);

        let else_stmt = if self.peek() == TokenKind::KeyElse {
            self.consume_token()?;
            self.parse_stmt()?.map(Box::new)
        } else {
            None
        };

        Ok(Some(Stmt::If {
            cond,
            then_stmt: Box::new(then_stmt),
            else_stmt,
        }))
    }

    pub(super) fn parse_while_stmt(&mut self) -> ParseResult<Option<Stmt>> {
        if self.peek() != TokenKind::KeyWhile {
            return Ok(None);
        }
        self.consume_token()?;

        let cond = match self.parse_expr() {
            Ok(Some(expr)) => expr,
            Ok(None) => Expr::bad(),
            Err(_) => {
                self.report_error_msg("Invalid condition for while statement");
                let _ = self.consume_token_impl(false);
                Expr::bad()
            }
        };

        let body = self.parse_stmt()?.unwrap_or(Stmt::Null);

        Ok(Some(Stmt::While {
            cond,
            body: Box::new(body),
        }))
    }

    pub(super) fn parse_return_stmt(&mut self) -> ParseResult<Option<Stmt>> {
        if self.peek() != TokenKind::KeyReturn {
            return Ok(None);
        }
        let return_loc = self.current.loc;
        self.consume_token()?;

        if self.peek() == TokenKind::SemiColon {
            if self.curr_return_type != Type::Void {
                self.report_semant_error("Invalid empty return in non-void function".to_string());
                return Ok(None);
            }
            self.consume_token()?;
            return Ok(Some(Stmt::Return(None)));
        }

        let expr = self.parse_expr()?.unwrap_or_else(Expr::bad);

        let expr = match (self.curr_return_type, expr.type_) {
            (Type::Char, Type::Int) => self.int_to_char(expr),
            (Type::Int, Type::Int) => expr,
            (ret, _) => {
                let msg = format!("Expected type {} in return statement", ret.text());
                self.report_semant_error_at(msg, return_loc);
                expr
            }
        };

        if self.peek() == TokenKind::SemiColon {
            self.consume_token()?;
        }

        if self.curr_return_type != Type::Void {
            Ok(Some(Stmt::Return(Some(expr))))
        } else {
            // The statement is dropped in a void function; the synthetic
            // trailing return covers control flow.
            Ok(None)
        }
    }

    pub(super) fn parse_expr_stmt(&mut self) -> ParseResult<Option<Stmt>> {
        match self.parse_expr()? {
            Some(expr) => {
                // The trailing semicolon is consumed without being
                // checked; recovery paths may therefore eat one extra
                // token here.
                self.consume_token()?;
                Ok(Some(Stmt::Expr(expr)))
            }
            None => Ok(None),
        }
    }

    pub(super) fn parse_null_stmt(&mut self) -> ParseResult<Option<Stmt>> {
        if self.peek() != TokenKind::SemiColon {
            return Ok(None);
        }
        self.consume_token()?;
        Ok(Some(Stmt::Null))
    }
}
