//! Expression grammar rules. Binary levels follow the grammar's "prime"
//! shape: each level parses its operand and a prime helper folds any
//! trailing operators at the same level.

use super::errors::{ParseExcept, ParseResult};
use super::Parser;
use crate::frontend::ast::{ArraySub, CmpOp, Expr, ExprKind, MathOp};
use crate::frontend::symtab::{IdentId, DUMMY_VARIABLE};
use crate::frontend::token::TokenKind;
use crate::frontend::types::Type;

const REL_OPS: [TokenKind; 4] = [
    TokenKind::LessThan,
    TokenKind::GreaterThan,
    TokenKind::NotEqual,
    TokenKind::EqualTo,
];

impl<'a> Parser<'a> {
    /// Reports the operand-type error shared by every binary level.
    fn check_binary_operands(&mut self, lhs: &Expr, rhs: &Expr) {
        if lhs.type_ != Type::Int || rhs.type_ != Type::Int {
            let msg = format!(
                "Cannot perform op between type {} and {}",
                lhs.type_.text(),
                rhs.type_.text()
            );
            self.report_semant_error(msg);
        }
    }

    pub(super) fn parse_expr(&mut self) -> ParseResult<Option<Expr>> {
        let and_term = match self.parse_and_term()? {
            Some(expr) => expr,
            None => return Ok(None),
        };

        if self.peek() == TokenKind::Or {
            return self.parse_expr_prime(and_term).map(Some);
        }
        Ok(Some(and_term))
    }

    fn parse_expr_prime(&mut self, lhs: Expr) -> ParseResult<Expr> {
        let mut lhs = lhs;
        while self.peek() == TokenKind::Or {
            self.consume_token()?;
            let rhs = match self.parse_and_term()? {
                Some(expr) => expr,
                None => return Err(ParseExcept::OperandMissing(TokenKind::Or)),
            };
            self.check_binary_operands(&lhs, &rhs);
            lhs = Expr::new(
                Type::Int,
                ExprKind::LogicalOr(Box::new(lhs), Box::new(rhs)),
            );
        }
        Ok(lhs)
    }

    fn parse_and_term(&mut self) -> ParseResult<Option<Expr>> {
        let rel = match self.parse_rel_expr()? {
            Some(expr) => expr,
            None => return Ok(None),
        };

        if self.peek() == TokenKind::And {
            return self.parse_and_term_prime(rel).map(Some);
        }
        Ok(Some(rel))
    }

    fn parse_and_term_prime(&mut self, lhs: Expr) -> ParseResult<Expr> {
        self.consume_token()?;
        // The right operand swallows any further `&&`s, so chains nest to
        // the right.
        let rhs = match self.parse_and_term()? {
            Some(expr) => expr,
            None => return Err(ParseExcept::OperandMissing(TokenKind::And)),
        };
        self.check_binary_operands(&lhs, &rhs);
        Ok(Expr::new(
            Type::Int,
            ExprKind::LogicalAnd(Box::new(lhs), Box::new(rhs)),
        ))
    }

    fn parse_rel_expr(&mut self) -> ParseResult<Option<Expr>> {
        let num = match self.parse_num_expr()? {
            Some(expr) => expr,
            None => return Ok(None),
        };

        if self.peek_is_one_of(&REL_OPS) {
            return self.parse_rel_expr_prime(num).map(Some);
        }
        Ok(Some(num))
    }

    fn parse_rel_expr_prime(&mut self, lhs: Expr) -> ParseResult<Expr> {
        let mut lhs = lhs;
        while self.peek_is_one_of(&REL_OPS) {
            let op = match self.peek() {
                TokenKind::LessThan => CmpOp::LessThan,
                TokenKind::GreaterThan => CmpOp::GreaterThan,
                TokenKind::NotEqual => CmpOp::NotEqual,
                _ => CmpOp::EqualTo,
            };
            let op_token = self.peek();
            self.consume_token()?;
            let rhs = match self.parse_num_expr()? {
                Some(expr) => expr,
                None => return Err(ParseExcept::OperandMissing(op_token)),
            };
            self.check_binary_operands(&lhs, &rhs);
            lhs = Expr::new(
                Type::Int,
                ExprKind::BinaryCmp(op, Box::new(lhs), Box::new(rhs)),
            );
        }
        Ok(lhs)
    }

    fn parse_num_expr(&mut self) -> ParseResult<Option<Expr>> {
        let mut lhs = match self.parse_term()? {
            Some(expr) => expr,
            None => return Ok(None),
        };

        while self.peek_is_one_of(&[TokenKind::Plus, TokenKind::Minus]) {
            let op = if self.peek() == TokenKind::Plus {
                MathOp::Add
            } else {
                MathOp::Sub
            };
            let op_token = self.peek();
            self.consume_token()?;
            let rhs = match self.parse_term()? {
                Some(expr) => expr,
                None => return Err(ParseExcept::OperandMissing(op_token)),
            };
            self.check_binary_operands(&lhs, &rhs);
            lhs = Expr::new(
                Type::Int,
                ExprKind::BinaryMath(op, Box::new(lhs), Box::new(rhs)),
            );
        }
        Ok(Some(lhs))
    }

    fn parse_term(&mut self) -> ParseResult<Option<Expr>> {
        let mut lhs = match self.parse_value()? {
            Some(expr) => expr,
            None => return Ok(None),
        };

        while self.peek_is_one_of(&[TokenKind::Mult, TokenKind::Div, TokenKind::Mod]) {
            let op = match self.peek() {
                TokenKind::Mult => MathOp::Mul,
                TokenKind::Div => MathOp::Div,
                _ => MathOp::Mod,
            };
            let op_token = self.peek();
            self.consume_token()?;
            let rhs = match self.parse_value()? {
                Some(expr) => expr,
                None => return Err(ParseExcept::OperandMissing(op_token)),
            };
            self.check_binary_operands(&lhs, &rhs);
            lhs = Expr::new(
                Type::Int,
                ExprKind::BinaryMath(op, Box::new(lhs), Box::new(rhs)),
            );
        }
        Ok(Some(lhs))
    }

    fn parse_value(&mut self) -> ParseResult<Option<Expr>> {
        if self.peek_and_consume(TokenKind::Not)? {
            let factor = match self.parse_factor()? {
                Some(expr) => expr,
                None => return Err(ParseExcept::msg("! must be followed by an expression.")),
            };
            // The logical not keeps its operand's type.
            let type_ = factor.type_;
            return Ok(Some(Expr::new(type_, ExprKind::Not(Box::new(factor)))));
        }
        self.parse_factor()
    }

    fn parse_factor(&mut self) -> ParseResult<Option<Expr>> {
        // Identifier factors come FIRST so any parked unused
        // identifier/array from the assignment parser is consumed before
        // other rules run.
        if let Some(expr) = self.parse_ident_factor()? {
            return Ok(Some(expr));
        }
        if let Some(expr) = self.parse_constant_factor()? {
            return Ok(Some(expr));
        }
        if let Some(expr) = self.parse_string_factor()? {
            return Ok(Some(expr));
        }
        if let Some(expr) = self.parse_paren_factor()? {
            return Ok(Some(expr));
        }
        if let Some(expr) = self.parse_inc_factor()? {
            return Ok(Some(expr));
        }
        if let Some(expr) = self.parse_dec_factor()? {
            return Ok(Some(expr));
        }
        if let Some(expr) = self.parse_addr_of_array_factor()? {
            return Ok(Some(expr));
        }
        Ok(None)
    }

    fn parse_paren_factor(&mut self) -> ParseResult<Option<Expr>> {
        if self.peek() != TokenKind::LParen {
            return Ok(None);
        }
        self.consume_token()?;

        let expr = match self.parse_expr()? {
            Some(expr) => expr,
            None => {
                return Err(ParseExcept::msg(
                    "Not a valid expression inside parenthesis",
                ))
            }
        };

        // The closing token is consumed without being checked.
        self.consume_token()?;
        Ok(Some(expr))
    }

    pub(super) fn parse_constant_factor(&mut self) -> ParseResult<Option<Expr>> {
        if self.peek() != TokenKind::Constant {
            return Ok(None);
        }

        let text = self.token_text();
        let value = if let Some(inner) = text.strip_prefix('\'') {
            match inner.trim_end_matches('\'') {
                "\\t" => '\t' as i32,
                "\\n" => '\n' as i32,
                other => other.chars().next().unwrap_or('\0') as i32,
            }
        } else {
            match text.parse::<i32>() {
                Ok(value) => value,
                Err(_) => {
                    return Err(ParseExcept::msg(format!("Invalid constant: {}", text)));
                }
            }
        };

        self.consume_token()?;
        // Constants are always evaluated as 32-bit ints; an assignment
        // boundary may retag them to char later.
        Ok(Some(Expr::constant(value)))
    }

    fn parse_string_factor(&mut self) -> ParseResult<Option<Expr>> {
        if self.peek() != TokenKind::StringLit {
            return Ok(None);
        }

        let raw = self.token_text();
        let inner = &raw[1..raw.len() - 1];
        // \n and \t are the only recognized escapes.
        let text = inner.replace("\\n", "\n").replace("\\t", "\t");
        let str_id = self.strings.get_string(&text);

        self.consume_token()?;
        Ok(Some(Expr::new(Type::CharArray, ExprKind::Str(str_id))))
    }

    fn parse_ident_factor(&mut self) -> ParseResult<Option<Expr>> {
        if self.peek() != TokenKind::Identifier
            && self.unused_ident.is_none()
            && self.unused_array.is_none()
        {
            return Ok(None);
        }

        let ret;
        if let Some(array) = self.unused_array.take() {
            // The assignment parser already built this subscript and
            // decided it didn't want it.
            let elem = self.array_elem_type(&array);
            ret = Expr::new(elem, ExprKind::ArrayElem(array));
        } else {
            let ident = match self.unused_ident.take() {
                // A parked identifier means we are already one token past
                // it.
                Some(ident) => ident,
                None => {
                    let name = self.token_text().to_string();
                    let ident = self.get_variable(&name);
                    self.consume_token()?;
                    ident
                }
            };

            if self.peek() == TokenKind::LBracket {
                ret = self.parse_array_suffix(ident)?;
            } else if self.peek() == TokenKind::LParen {
                ret = self.parse_call_suffix(ident)?;
            } else {
                let type_ = self.symbols.ident(ident).type_();
                ret = Expr::new(type_, ExprKind::Ident(ident));
            }
        }

        Ok(Some(self.char_to_int(ret)))
    }

    fn array_elem_type(&self, array: &ArraySub) -> Type {
        if self.symbols.ident(array.ident).type_() == Type::IntArray {
            Type::Int
        } else {
            Type::Char
        }
    }

    fn dummy_ident_expr(&mut self) -> Expr {
        let dummy = self
            .symbols
            .get_identifier(DUMMY_VARIABLE)
            .expect("dummy variable always exists");
        Expr::new(self.symbols.ident(dummy).type_(), ExprKind::Ident(dummy))
    }

    fn parse_array_suffix(&mut self, ident: IdentId) -> ParseResult<Expr> {
        let ident_entry = self.symbols.ident(ident);
        if !ident_entry.is_array() && !ident_entry.is_dummy() {
            let msg = format!("'{}' is not an array", ident_entry.name());
            self.report_semant_error(msg);
            self.consume_until(&[TokenKind::RBracket]);
            if self.peek() == TokenKind::EndOfFile {
                return Err(ParseExcept::Eof);
            }
            self.match_token(TokenKind::RBracket)?;
            return Ok(self.dummy_ident_expr());
        }

        self.consume_token()?;
        let index = (|| -> ParseResult<Expr> {
            match self.parse_expr()? {
                Some(expr) => Ok(expr),
                None => Err(ParseExcept::msg("Valid expression required inside [ ].")),
            }
        })();

        let ret = match index {
            Ok(index) => {
                let array = ArraySub {
                    ident,
                    index: Box::new(index),
                };
                let elem = self.array_elem_type(&array);
                Expr::new(elem, ExprKind::ArrayElem(array))
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
                Expr::bad()
            }
        };

        self.match_token(TokenKind::RBracket)?;
        Ok(ret)
    }

    fn parse_call_suffix(&mut self, ident: IdentId) -> ParseResult<Expr> {
        let ident_entry = self.symbols.ident(ident);
        if !ident_entry.is_function() && !ident_entry.is_dummy() {
            let msg = format!("'{}' is not a function", ident_entry.name());
            self.report_semant_error(msg);
            self.consume_until(&[TokenKind::RParen]);
            if self.peek() == TokenKind::EndOfFile {
                return Err(ParseExcept::Eof);
            }
            self.match_token(TokenKind::RParen)?;
            return Ok(self.dummy_ident_expr());
        }

        self.consume_token()?;
        let is_dummy = self.symbols.ident(ident).is_dummy();
        let is_printf = self.symbols.ident(ident).name() == "printf";
        let mut args = Vec::new();

        let arg_result: ParseResult<()> = (|| {
            let mut curr_arg = 1usize;
            let mut arg = self.parse_expr()?;
            while let Some(mut value) = arg.take() {
                if !is_dummy {
                    if is_printf {
                        // printf has no parsed declaration; only its first
                        // argument is checked.
                        self.need_printf = true;
                        if curr_arg == 1 && value.type_ != Type::CharArray {
                            self.report_semant_error(
                                "The first parameter to printf must be a char[]".to_string(),
                            );
                        }
                    } else if let Some(sig) = self.symbols.ident(ident).signature().cloned() {
                        if curr_arg > sig.args.len() {
                            let msg = format!(
                                "Function {} takes only {} arguments",
                                self.symbols.ident(ident).name(),
                                sig.args.len()
                            );
                            self.report_semant_error(msg);
                        } else if !sig.check_arg_type(curr_arg, value.type_) {
                            let expected = sig.arg_type(curr_arg);
                            if value.type_ == Type::Int && expected == Type::Char {
                                value = self.int_to_char(value);
                            } else if value.type_ == Type::Char && expected == Type::Int {
                                value = self.char_to_int(value);
                            } else {
                                let msg = format!(
                                    "Expected expression of type {}",
                                    expected.text()
                                );
                                self.report_semant_error(msg);
                            }
                        }
                    }
                }

                args.push(value);
                curr_arg += 1;

                if self.peek_and_consume(TokenKind::Comma)? {
                    arg = self.parse_expr()?;
                    if arg.is_none() {
                        return Err(ParseExcept::msg(
                            "Comma must be followed by expression in function call",
                        ));
                    }
                } else {
                    break;
                }
            }
            Ok(())
        })();

        if let Err(except) = arg_result {
            if matches!(except, ParseExcept::Eof) {
                return Err(except);
            }
            self.report_error(&except);
            self.consume_until(&[TokenKind::RParen]);
            if self.peek() == TokenKind::EndOfFile {
                return Err(ParseExcept::Eof);
            }
        }

        if !is_dummy {
            if is_printf {
                if args.is_empty() {
                    self.report_semant_error(
                        "printf requires a minimum of one argument".to_string(),
                    );
                }
            } else if let Some(sig) = self.symbols.ident(ident).signature().cloned() {
                if args.len() < sig.args.len() {
                    let msg = format!(
                        "Function {} requires {} arguments",
                        self.symbols.ident(ident).name(),
                        sig.args.len()
                    );
                    self.report_semant_error(msg);
                }
            }
        }

        self.match_token(TokenKind::RParen)?;

        let ret_type = self
            .symbols
            .ident(ident)
            .signature()
            .map(|sig| sig.ret)
            .unwrap_or(Type::Void);
        Ok(Expr::new(ret_type, ExprKind::FuncCall { ident, args }))
    }

    fn parse_inc_factor(&mut self) -> ParseResult<Option<Expr>> {
        if self.peek() != TokenKind::Inc {
            return Ok(None);
        }
        self.consume_token()?;
        let name = self.token_text().to_string();
        let ident = self.get_variable(&name);
        let type_ = self.symbols.ident(ident).type_();
        self.consume_token()?;
        Ok(Some(
            self.char_to_int(Expr::new(type_, ExprKind::Inc(ident))),
        ))
    }

    fn parse_dec_factor(&mut self) -> ParseResult<Option<Expr>> {
        if self.peek() != TokenKind::Dec {
            return Ok(None);
        }
        self.consume_token()?;
        let name = self.token_text().to_string();
        let ident = self.get_variable(&name);
        let type_ = self.symbols.ident(ident).type_();
        self.consume_token()?;
        Ok(Some(
            self.char_to_int(Expr::new(type_, ExprKind::Dec(ident))),
        ))
    }

    fn parse_addr_of_array_factor(&mut self) -> ParseResult<Option<Expr>> {
        if self.peek() != TokenKind::Addr {
            return Ok(None);
        }
        self.consume_token()?;

        let name = self.token_text().to_string();
        let ident = self.get_variable(&name);
        if self.peek() == TokenKind::SemiColon {
            return Err(ParseExcept::msg("& must be followed by an identifier."));
        }
        self.consume_token()?;

        if self.peek() != TokenKind::LBracket {
            return Err(ParseExcept::msg("Missing required subscript expression."));
        }
        self.consume_token()?;

        // Only a constant subscript is accepted here.
        let index = match self.parse_constant_factor()? {
            Some(expr) => expr,
            None => return Err(ParseExcept::msg("Missing required subscript expression.")),
        };

        // The closing bracket is consumed without being checked.
        self.consume_token()?;

        let array = ArraySub {
            ident,
            index: Box::new(index),
        };
        let type_ = self.symbols.ident(array.ident).type_();
        Ok(Some(Expr::new(type_, ExprKind::AddrOfArray(array))))
    }
}
