use std::fmt::Display;

use serde::Serialize;

/// The semantic types USC knows about. Arrays are value types with an
/// element count tracked on the declaring identifier; `Function` marks a
/// symbol whose address is a function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Type {
    Void,
    Int,
    Char,
    IntArray,
    CharArray,
    Function,
}

impl Type {
    pub fn text(self) -> &'static str {
        match self {
            Type::Void => "void",
            Type::Int => "int",
            Type::Char => "char",
            Type::IntArray => "int[]",
            Type::CharArray => "char[]",
            Type::Function => "function",
        }
    }

    pub fn is_array(self) -> bool {
        matches!(self, Type::IntArray | Type::CharArray)
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text())
    }
}
