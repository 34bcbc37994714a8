//! Constant branch folding: conditional branches on a constant i1 become
//! unconditional branches, and the untaken successor loses the edge (its
//! phis are repaired).

use super::FunctionPass;
use crate::midend::ir::{Function, Opcode, ValueId};

pub struct ConstantBranch;

impl FunctionPass for ConstantBranch {
    fn name(&self) -> &'static str {
        "constant-branch"
    }

    fn depends_on(&self) -> &'static [&'static str] {
        // Only meaningful once constants have been propagated into
        // branch conditions.
        &["constant-ops"]
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        let mut fold_list: Vec<ValueId> = Vec::new();

        for block in func.blocks().to_vec() {
            for inst_id in func.block(block).insts.clone() {
                if let Some(inst) = func.inst(inst_id) {
                    if let Opcode::CondBr { .. } = inst.op {
                        if func.value(inst.operands[0]).const_int().is_some() {
                            fold_list.push(inst_id);
                        }
                    }
                }
            }
        }

        let changed = !fold_list.is_empty();
        for inst_id in fold_list {
            let inst = func.inst(inst_id).expect("branch still exists");
            let block = inst.block;
            let (true_dest, false_dest) = match inst.op {
                Opcode::CondBr {
                    true_dest,
                    false_dest,
                } => (true_dest, false_dest),
                _ => continue,
            };
            let condition = func
                .value(inst.operands[0])
                .const_int()
                .expect("condition is constant");

            let (taken, not_taken) = if condition != 0 {
                (true_dest, false_dest)
            } else {
                (false_dest, true_dest)
            };

            func.erase_inst(inst_id);
            func.remove_predecessor(not_taken, block);
            func.build_br(block, taken);
        }
        changed
    }
}
