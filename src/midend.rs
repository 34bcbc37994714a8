pub mod emit;
pub mod ir;
pub mod opt;
pub mod ssa;
