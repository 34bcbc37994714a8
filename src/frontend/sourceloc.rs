use std::fmt::Display;

use serde::Serialize;

/// A line/column position in the file being compiled. The parser owns the
/// file name; locations stay small so every token can carry one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SourceLoc {
    pub line: u32,
    pub col: u32,
}

impl SourceLoc {
    pub fn new(line: u32, col: u32) -> Self {
        SourceLoc { line, col }
    }
}

impl Display for SourceLoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}
