use thiserror::Error;

use crate::frontend::sourceloc::SourceLoc;
use crate::frontend::token::{Token, TokenKind};

/// Syntactic failures that unwind to the nearest recovery point
/// (statement or declaration boundary). Semantic errors never take this
/// path; they accumulate on the parser as [`Error`] records.
#[derive(Debug, Error)]
pub enum ParseExcept {
    #[error("{0}")]
    Msg(String),
    #[error("Unexpected end of file")]
    Eof,
    #[error("Invalid symbol: {0}")]
    UnknownToken(String),
    #[error("Expected: {expected} but saw: {actual}")]
    TokenMismatch { expected: TokenKind, actual: String },
    #[error("Binary operation {0} requires two operands.")]
    OperandMissing(TokenKind),
}

impl ParseExcept {
    pub fn msg(text: impl Into<String>) -> Self {
        ParseExcept::Msg(text.into())
    }

    pub fn mismatch(expected: TokenKind, actual: &Token) -> Self {
        ParseExcept::TokenMismatch {
            expected,
            actual: actual.text().to_string(),
        }
    }
}

pub type ParseResult<T> = Result<T, ParseExcept>;

/// One recorded diagnostic, displayed later against the source line.
#[derive(Debug)]
pub struct Error {
    pub msg: String,
    pub loc: SourceLoc,
}

impl Error {
    pub fn new(msg: String, loc: SourceLoc) -> Self {
        Error { msg, loc }
    }
}
