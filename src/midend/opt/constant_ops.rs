//! Constant propagation: binary integer ops and integer comparisons
//! whose operands are both constants are replaced by their computed
//! result and erased. Casts of constants fold too, so a folded compare
//! propagates through its zext into the branch condition within one run.

use super::FunctionPass;
use crate::midend::ir::{Function, IrType, Opcode, Predicate, ValueId};

pub struct ConstantOps;

impl FunctionPass for ConstantOps {
    fn name(&self) -> &'static str {
        "constant-ops"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        let mut remove_list: Vec<ValueId> = Vec::new();

        for block in func.blocks().to_vec() {
            for inst_id in func.block(block).insts.clone() {
                let inst = match func.inst(inst_id) {
                    Some(inst) => inst,
                    None => continue,
                };

                match inst.op.clone() {
                    op @ (Opcode::Add | Opcode::Sub | Opcode::Mul) => {
                        let lhs = func.value(inst.operands[0]).const_int();
                        let rhs = func.value(inst.operands[1]).const_int();
                        let ty = inst.ty.clone();
                        if let (Some(lhs), Some(rhs)) = (lhs, rhs) {
                            let result = fold_binary(&op, &ty, lhs, rhs);
                            let constant = func.const_int(ty, result);
                            func.replace_all_uses(inst_id, constant);
                            remove_list.push(inst_id);
                        }
                    }
                    Opcode::ICmp(pred) => {
                        // Comparisons fold only at the full 32-bit width.
                        let lhs_val = func.value(inst.operands[0]);
                        let rhs_val = func.value(inst.operands[1]);
                        if *lhs_val.ty() != IrType::I32 || *rhs_val.ty() != IrType::I32 {
                            continue;
                        }
                        if let (Some(lhs), Some(rhs)) = (lhs_val.const_int(), rhs_val.const_int())
                        {
                            let result = match pred {
                                Predicate::Eq => lhs == rhs,
                                Predicate::Ne => lhs != rhs,
                                Predicate::Sgt => lhs > rhs,
                                Predicate::Slt => lhs < rhs,
                            };
                            let constant = func.const_int(IrType::I1, result as i64);
                            func.replace_all_uses(inst_id, constant);
                            remove_list.push(inst_id);
                        }
                    }
                    op @ (Opcode::Zext | Opcode::Sext | Opcode::Trunc) => {
                        let operand = func.value(inst.operands[0]);
                        let from = operand.ty().clone();
                        let to = inst.ty.clone();
                        if let Some(value) = operand.const_int() {
                            let result = fold_cast(&op, &from, &to, value);
                            let constant = func.const_int(to, result);
                            func.replace_all_uses(inst_id, constant);
                            remove_list.push(inst_id);
                        }
                    }
                    _ => {}
                }
            }
        }

        let changed = !remove_list.is_empty();
        for inst_id in remove_list {
            func.erase_inst(inst_id);
        }
        changed
    }
}

fn fold_cast(op: &Opcode, from: &IrType, to: &IrType, value: i64) -> i64 {
    match op {
        Opcode::Zext => match from {
            IrType::I1 => value & 1,
            IrType::I8 => value & 0xff,
            _ => value,
        },
        Opcode::Sext => match from {
            IrType::I1 => -(value & 1),
            IrType::I8 => value as i8 as i64,
            _ => value,
        },
        _ => match to {
            IrType::I8 => value as i8 as i64,
            IrType::I1 => value & 1,
            _ => value as i32 as i64,
        },
    }
}

/// Wrapping arithmetic at the operand width.
fn fold_binary(op: &Opcode, ty: &IrType, lhs: i64, rhs: i64) -> i64 {
    match ty {
        IrType::I8 => {
            let (a, b) = (lhs as i8, rhs as i8);
            let r = match op {
                Opcode::Add => a.wrapping_add(b),
                Opcode::Sub => a.wrapping_sub(b),
                _ => a.wrapping_mul(b),
            };
            r as i64
        }
        _ => {
            let (a, b) = (lhs as i32, rhs as i32);
            let r = match op {
                Opcode::Add => a.wrapping_add(b),
                Opcode::Sub => a.wrapping_sub(b),
                _ => a.wrapping_mul(b),
            };
            r as i64
        }
    }
}
