use std::str::Chars;

use super::sourceloc::SourceLoc;
use super::token::{Token, TokenKind};

/// Hand-rolled scanner over the source text. One character of lookahead;
/// whitespace and `//` comments are skipped here so the parser only ever
/// sees meaningful tokens. Unrecognized characters come back as
/// `TokenKind::Unknown` and the parser decides whether that is fatal.
pub struct Lexer<'a> {
    input: Chars<'a>,
    current_char: Option<char>,
    cur_line: u32,
    cur_col: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut created = Lexer {
            input: source.chars(),
            current_char: None,
            cur_line: 1,
            cur_col: 0,
        };
        created.advance_char();
        created.cur_col = 1;
        created
    }

    fn peek_char(&self) -> Option<char> {
        self.current_char
    }

    fn advance_char(&mut self) {
        if let Some(consumed) = self.current_char {
            if consumed == '\n' {
                self.cur_line += 1;
                self.cur_col = 1;
            } else {
                self.cur_col += 1;
            }
        }
        self.current_char = self.input.next();
    }

    fn current_loc(&self) -> SourceLoc {
        SourceLoc::new(self.cur_line, self.cur_col)
    }

    fn match_next_char_for_token_or(
        &mut self,
        expected: char,
        kind_true: TokenKind,
        kind_false: TokenKind,
    ) -> TokenKind {
        match self.peek_char() {
            Some(c) if c == expected => {
                self.advance_char();
                kind_true
            }
            _ => kind_false,
        }
    }

    fn match_kw_or_ident(&mut self, loc: SourceLoc) -> Token {
        let mut identifier = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_ascii_alphanumeric() || c == '_' {
                identifier.push(c);
                self.advance_char();
            } else {
                break;
            }
        }
        let kind = match identifier.as_str() {
            "void" => TokenKind::KeyVoid,
            "int" => TokenKind::KeyInt,
            "char" => TokenKind::KeyChar,
            "if" => TokenKind::KeyIf,
            "else" => TokenKind::KeyElse,
            "while" => TokenKind::KeyWhile,
            "return" => TokenKind::KeyReturn,
            _ => return Token::with_text(TokenKind::Identifier, identifier, loc),
        };
        Token::new(kind, loc)
    }

    fn match_constant(&mut self, loc: SourceLoc) -> Token {
        let mut text = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance_char();
            } else {
                break;
            }
        }
        Token::with_text(TokenKind::Constant, text, loc)
    }

    // Character constants keep their quotes and escapes verbatim; the
    // constant AST node evaluates them.
    fn match_char_constant(&mut self, loc: SourceLoc) -> Token {
        let mut text = String::from('\'');
        self.advance_char();
        if self.peek_char() == Some('\\') {
            text.push('\\');
            self.advance_char();
        }
        match self.peek_char() {
            Some(c) if c != '\'' && c != '\n' => {
                text.push(c);
                self.advance_char();
            }
            _ => return Token::with_text(TokenKind::Unknown, text, loc),
        }
        if self.peek_char() != Some('\'') {
            return Token::with_text(TokenKind::Unknown, text, loc);
        }
        text.push('\'');
        self.advance_char();
        Token::with_text(TokenKind::Constant, text, loc)
    }

    fn match_string(&mut self, loc: SourceLoc) -> Token {
        let mut text = String::from('"');
        self.advance_char();
        loop {
            match self.peek_char() {
                Some('"') => {
                    text.push('"');
                    self.advance_char();
                    return Token::with_text(TokenKind::StringLit, text, loc);
                }
                Some('\n') | None => {
                    return Token::with_text(TokenKind::Unknown, text, loc);
                }
                Some(c) => {
                    text.push(c);
                    self.advance_char();
                }
            }
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while matches!(self.peek_char(), Some(c) if c.is_whitespace()) {
                self.advance_char();
            }
            // line comment
            if self.peek_char() == Some('/') {
                let mut lookahead = self.input.clone();
                if lookahead.next() == Some('/') {
                    while matches!(self.peek_char(), Some(c) if c != '\n') {
                        self.advance_char();
                    }
                    continue;
                }
            }
            break;
        }
    }

    /// Scan the next token.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();

        let loc = self.current_loc();
        let c = match self.peek_char() {
            Some(c) => c,
            None => return Token::new(TokenKind::EndOfFile, loc),
        };

        let kind = match c {
            '{' => {
                self.advance_char();
                TokenKind::LBrace
            }
            '}' => {
                self.advance_char();
                TokenKind::RBrace
            }
            '(' => {
                self.advance_char();
                TokenKind::LParen
            }
            ')' => {
                self.advance_char();
                TokenKind::RParen
            }
            '[' => {
                self.advance_char();
                TokenKind::LBracket
            }
            ']' => {
                self.advance_char();
                TokenKind::RBracket
            }
            ';' => {
                self.advance_char();
                TokenKind::SemiColon
            }
            ',' => {
                self.advance_char();
                TokenKind::Comma
            }
            '=' => {
                self.advance_char();
                self.match_next_char_for_token_or('=', TokenKind::EqualTo, TokenKind::Assign)
            }
            '!' => {
                self.advance_char();
                self.match_next_char_for_token_or('=', TokenKind::NotEqual, TokenKind::Not)
            }
            '<' => {
                self.advance_char();
                TokenKind::LessThan
            }
            '>' => {
                self.advance_char();
                TokenKind::GreaterThan
            }
            '+' => {
                self.advance_char();
                self.match_next_char_for_token_or('+', TokenKind::Inc, TokenKind::Plus)
            }
            '-' => {
                self.advance_char();
                self.match_next_char_for_token_or('-', TokenKind::Dec, TokenKind::Minus)
            }
            '*' => {
                self.advance_char();
                TokenKind::Mult
            }
            '/' => {
                self.advance_char();
                TokenKind::Div
            }
            '%' => {
                self.advance_char();
                TokenKind::Mod
            }
            '|' => {
                self.advance_char();
                self.match_next_char_for_token_or('|', TokenKind::Or, TokenKind::Unknown)
            }
            '&' => {
                self.advance_char();
                self.match_next_char_for_token_or('&', TokenKind::And, TokenKind::Addr)
            }
            '\'' => return self.match_char_constant(loc),
            '"' => return self.match_string(loc),
            '0'..='9' => return self.match_constant(loc),
            c if c.is_ascii_alphabetic() || c == '_' => return self.match_kw_or_ident(loc),
            other => {
                self.advance_char();
                return Token::with_text(TokenKind::Unknown, other.to_string(), loc);
            }
        };

        if kind == TokenKind::Unknown {
            return Token::with_text(TokenKind::Unknown, c.to_string(), loc);
        }
        Token::new(kind, loc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(input: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(input);
        let mut kinds = Vec::new();
        loop {
            let token = lexer.next_token();
            let done = token.kind == TokenKind::EndOfFile;
            kinds.push(token.kind);
            if done {
                break;
            }
        }
        kinds
    }

    fn assert_single_tokenization(input: &str, expected: TokenKind) {
        assert_eq!(lex_all(input), vec![expected, TokenKind::EndOfFile]);
    }

    #[test]
    fn tokenize_punctuation() {
        assert_single_tokenization("{", TokenKind::LBrace);
        assert_single_tokenization("}", TokenKind::RBrace);
        assert_single_tokenization(";", TokenKind::SemiColon);
        assert_single_tokenization("[", TokenKind::LBracket);
    }

    #[test]
    fn tokenize_operators() {
        assert_single_tokenization("=", TokenKind::Assign);
        assert_single_tokenization("==", TokenKind::EqualTo);
        assert_single_tokenization("!", TokenKind::Not);
        assert_single_tokenization("!=", TokenKind::NotEqual);
        assert_single_tokenization("++", TokenKind::Inc);
        assert_single_tokenization("--", TokenKind::Dec);
        assert_single_tokenization("&&", TokenKind::And);
        assert_single_tokenization("&", TokenKind::Addr);
        assert_single_tokenization("||", TokenKind::Or);
    }

    #[test]
    fn tokenize_keywords_and_identifiers() {
        assert_single_tokenization("while", TokenKind::KeyWhile);
        assert_single_tokenization("return", TokenKind::KeyReturn);
        let mut lexer = Lexer::new("whilst");
        let token = lexer.next_token();
        assert_eq!(token.kind, TokenKind::Identifier);
        assert_eq!(token.text(), "whilst");
    }

    #[test]
    fn tokenize_constants() {
        let mut lexer = Lexer::new("42 'a' '\\n'");
        let token = lexer.next_token();
        assert_eq!(token.kind, TokenKind::Constant);
        assert_eq!(token.text(), "42");
        let token = lexer.next_token();
        assert_eq!(token.kind, TokenKind::Constant);
        assert_eq!(token.text(), "'a'");
        let token = lexer.next_token();
        assert_eq!(token.kind, TokenKind::Constant);
        assert_eq!(token.text(), "'\\n'");
    }

    #[test]
    fn tokenize_string() {
        let mut lexer = Lexer::new("\"hi there\\n\"");
        let token = lexer.next_token();
        assert_eq!(token.kind, TokenKind::StringLit);
        assert_eq!(token.text(), "\"hi there\\n\"");
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            lex_all("a // trailing comment\nb"),
            vec![
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::EndOfFile
            ]
        );
    }

    #[test]
    fn unknown_symbol() {
        let mut lexer = Lexer::new("#");
        let token = lexer.next_token();
        assert_eq!(token.kind, TokenKind::Unknown);
        assert_eq!(token.text(), "#");
    }

    #[test]
    fn locations_track_lines_and_columns() {
        let mut lexer = Lexer::new("a\n  b");
        assert_eq!(lexer.next_token().loc, SourceLoc::new(1, 1));
        assert_eq!(lexer.next_token().loc, SourceLoc::new(2, 3));
    }
}
