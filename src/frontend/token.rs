use std::fmt::Display;

use serde::Serialize;

use super::sourceloc::SourceLoc;

/// Every token kind the scanner can produce. Kinds with a fixed spelling
/// report it through [`TokenKind::spelling`]; the rest carry their text in
/// the surrounding [`Token`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TokenKind {
    KeyVoid,
    KeyInt,
    KeyChar,
    KeyIf,
    KeyElse,
    KeyWhile,
    KeyReturn,
    Identifier,
    Constant,
    StringLit,
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    SemiColon,
    Comma,
    Assign,
    Or,
    And,
    EqualTo,
    NotEqual,
    LessThan,
    GreaterThan,
    Plus,
    Minus,
    Mult,
    Div,
    Mod,
    Not,
    Inc,
    Dec,
    Addr,
    Unknown,
    EndOfFile,
}

impl TokenKind {
    /// The literal spelling for kinds that always scan from the same text.
    pub fn spelling(self) -> Option<&'static str> {
        match self {
            TokenKind::KeyVoid => Some("void"),
            TokenKind::KeyInt => Some("int"),
            TokenKind::KeyChar => Some("char"),
            TokenKind::KeyIf => Some("if"),
            TokenKind::KeyElse => Some("else"),
            TokenKind::KeyWhile => Some("while"),
            TokenKind::KeyReturn => Some("return"),
            TokenKind::LBrace => Some("{"),
            TokenKind::RBrace => Some("}"),
            TokenKind::LParen => Some("("),
            TokenKind::RParen => Some(")"),
            TokenKind::LBracket => Some("["),
            TokenKind::RBracket => Some("]"),
            TokenKind::SemiColon => Some(";"),
            TokenKind::Comma => Some(","),
            TokenKind::Assign => Some("="),
            TokenKind::Or => Some("||"),
            TokenKind::And => Some("&&"),
            TokenKind::EqualTo => Some("=="),
            TokenKind::NotEqual => Some("!="),
            TokenKind::LessThan => Some("<"),
            TokenKind::GreaterThan => Some(">"),
            TokenKind::Plus => Some("+"),
            TokenKind::Minus => Some("-"),
            TokenKind::Mult => Some("*"),
            TokenKind::Div => Some("/"),
            TokenKind::Mod => Some("%"),
            TokenKind::Not => Some("!"),
            TokenKind::Inc => Some("++"),
            TokenKind::Dec => Some("--"),
            TokenKind::Addr => Some("&"),
            TokenKind::Identifier
            | TokenKind::Constant
            | TokenKind::StringLit
            | TokenKind::Unknown
            | TokenKind::EndOfFile => None,
        }
    }

    /// Column width of the token, when it is fixed.
    pub fn fixed_len(self) -> Option<usize> {
        self.spelling().map(str::len)
    }

    /// Human-readable name used by diagnostics. Fixed-spelling kinds print
    /// their spelling so mismatch messages read like `Expected: ;`.
    pub fn name(self) -> &'static str {
        match self.spelling() {
            Some(text) => text,
            None => match self {
                TokenKind::Identifier => "identifier",
                TokenKind::Constant => "constant",
                TokenKind::StringLit => "string",
                TokenKind::Unknown => "unknown",
                TokenKind::EndOfFile => "end of file",
                _ => unreachable!(),
            },
        }
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A scanned token: the kind, the exact lexeme when the kind has no fixed
/// spelling, and where it starts in the source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub loc: SourceLoc,
}

impl Token {
    pub fn new(kind: TokenKind, loc: SourceLoc) -> Self {
        Token {
            kind,
            text: String::new(),
            loc,
        }
    }

    pub fn with_text(kind: TokenKind, text: String, loc: SourceLoc) -> Self {
        Token { kind, text, loc }
    }

    /// The token's text: the fixed spelling if it has one, the scanned
    /// lexeme otherwise.
    pub fn text(&self) -> &str {
        match self.kind.spelling() {
            Some(text) => text,
            None => &self.text,
        }
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_kinds_know_their_width() {
        assert_eq!(TokenKind::And.fixed_len(), Some(2));
        assert_eq!(TokenKind::KeyReturn.fixed_len(), Some(6));
        assert_eq!(TokenKind::Identifier.fixed_len(), None);
    }

    #[test]
    fn diagnostic_names() {
        assert_eq!(TokenKind::SemiColon.name(), ";");
        assert_eq!(TokenKind::Identifier.name(), "identifier");
        assert_eq!(TokenKind::EndOfFile.name(), "end of file");
    }
}
