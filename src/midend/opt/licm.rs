//! Loop-invariant code motion. Walks the dominator subtree of the loop
//! header in pre-order; instructions that belong directly to the loop,
//! have loop-invariant operands, are safe to execute speculatively, and
//! fall in the hoistable opcode classes move in front of the preheader's
//! terminator.

use tracing::trace;

use super::LoopPass;
use crate::midend::ir::{BlockId, DomTree, Function, Loop, LoopInfo, Opcode, ValueId, ValueKind};

pub struct Licm;

impl LoopPass for Licm {
    fn name(&self) -> &'static str {
        "licm"
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &["dead-blocks"]
    }

    fn run_on_loop(
        &mut self,
        func: &mut Function,
        loop_id: usize,
        loop_info: &LoopInfo,
        dom: &DomTree,
    ) -> bool {
        let current = &loop_info.loops()[loop_id];
        let preheader = match current.preheader {
            Some(preheader) => preheader,
            // No safe landing spot for hoisted code.
            None => return false,
        };

        let mut changed = false;
        hoist_pre_order(
            func,
            dom,
            loop_info,
            loop_id,
            current,
            preheader,
            current.header,
            &mut changed,
        );
        changed
    }
}

#[allow(clippy::too_many_arguments)]
fn hoist_pre_order(
    func: &mut Function,
    dom: &DomTree,
    loop_info: &LoopInfo,
    loop_id: usize,
    current: &Loop,
    preheader: BlockId,
    block: BlockId,
    changed: &mut bool,
) {
    // Only blocks directly in this loop; blocks of nested loops are
    // handled when the inner loop is visited.
    if loop_info.innermost(block) == Some(loop_id) {
        for inst_id in func.block(block).insts.clone() {
            if !func.inst_attached(inst_id) {
                continue;
            }
            if is_safe_to_hoist(func, current, inst_id) {
                trace!(?inst_id, "hoisting loop-invariant instruction");
                func.move_before_terminator(inst_id, preheader);
                *changed = true;
            }
        }
    }

    for &child in dom.children(block) {
        hoist_pre_order(func, dom, loop_info, loop_id, current, preheader, child, changed);
    }
}

fn is_safe_to_hoist(func: &Function, current: &Loop, inst_id: ValueId) -> bool {
    has_loop_invariant_operands(func, current, inst_id)
        && is_safe_to_speculate(func, inst_id)
        && is_hoistable_class(func, inst_id)
}

/// Every operand is defined outside the loop (constants, arguments, and
/// globals count as outside).
fn has_loop_invariant_operands(func: &Function, current: &Loop, inst_id: ValueId) -> bool {
    let inst = match func.inst(inst_id) {
        Some(inst) => inst,
        None => return false,
    };
    inst.operands.iter().all(|&op| match func.value(op) {
        ValueKind::Inst(op_inst) => !current.contains(op_inst.block),
        _ => true,
    })
}

/// No side effects, no memory dependence, and cannot trap. Division and
/// remainder may trap on zero; loads depend on stores staying put.
fn is_safe_to_speculate(func: &Function, inst_id: ValueId) -> bool {
    match func.inst(inst_id).map(|inst| &inst.op) {
        Some(
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::ICmp(_)
            | Opcode::Zext
            | Opcode::Sext
            | Opcode::Trunc
            | Opcode::Select
            | Opcode::GetElementPtr,
        ) => true,
        _ => false,
    }
}

/// Binary ops, casts, selects, GEPs, and comparisons are the classes the
/// pass will move.
fn is_hoistable_class(func: &Function, inst_id: ValueId) -> bool {
    match func.inst(inst_id).map(|inst| &inst.op) {
        Some(op) => {
            op.is_binary()
                || op.is_cast()
                || matches!(
                    *op,
                    Opcode::Select | Opcode::GetElementPtr | Opcode::ICmp(_)
                )
        }
        None => false,
    }
}
