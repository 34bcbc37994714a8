use std::fmt::Display;

use serde::Serialize;

/// The IR's type language: the three integer widths USC needs, void for
/// instructions without a result, pointers, and fixed-size arrays for
/// stack-allocated storage.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum IrType {
    Void,
    I1,
    I8,
    I32,
    Ptr(Box<IrType>),
    Array(Box<IrType>, usize),
}

impl IrType {
    pub fn ptr_to(pointee: IrType) -> IrType {
        IrType::Ptr(Box::new(pointee))
    }

    pub fn array_of(elem: IrType, count: usize) -> IrType {
        IrType::Array(Box::new(elem), count)
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, IrType::Ptr(_))
    }

    /// The pointed-to type, for pointers.
    pub fn pointee(&self) -> Option<&IrType> {
        match self {
            IrType::Ptr(pointee) => Some(pointee),
            _ => None,
        }
    }

    /// The element type, for arrays.
    pub fn elem(&self) -> Option<&IrType> {
        match self {
            IrType::Array(elem, _) => Some(elem),
            _ => None,
        }
    }

    /// Bit width for integer types.
    pub fn bits(&self) -> Option<u32> {
        match self {
            IrType::I1 => Some(1),
            IrType::I8 => Some(8),
            IrType::I32 => Some(32),
            _ => None,
        }
    }
}

impl Display for IrType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::I1 => write!(f, "i1"),
            IrType::I8 => write!(f, "i8"),
            IrType::I32 => write!(f, "i32"),
            IrType::Ptr(pointee) => write!(f, "{}*", pointee),
            IrType::Array(elem, count) => write!(f, "[{} x {}]", count, elem),
        }
    }
}
