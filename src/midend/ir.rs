pub mod dominators;
pub mod function;
pub mod loops;
pub mod module;
pub mod printer;
#[cfg(test)]
mod tests;
pub mod types;
pub mod value;
pub mod verify;

pub use dominators::DomTree;
pub use function::{Block, Function};
pub use loops::{Loop, LoopInfo};
pub use module::{ExternFn, GlobalVar, Module};
pub use types::IrType;
pub use value::{BlockId, Inst, Opcode, Predicate, ValueId, ValueKind};
