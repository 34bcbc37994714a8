//! Structural and SSA well-formedness checks, used by tests and the
//! driver after emission.

use std::collections::{HashMap, HashSet};

use super::dominators::DomTree;
use super::function::Function;
use super::module::Module;
use super::value::{BlockId, Opcode, ValueId, ValueKind};

/// Verifies every function in the module; returns the list of findings
/// (empty means the module is well-formed).
pub fn verify_module(module: &Module) -> Vec<String> {
    let mut findings = Vec::new();
    for func in &module.funcs {
        for finding in verify_function(func) {
            findings.push(format!("{}: {}", func.name, finding));
        }
    }
    findings
}

pub fn verify_function(func: &Function) -> Vec<String> {
    let mut findings = Vec::new();

    // Every block ends in exactly one terminator, at the end.
    for &block in func.blocks() {
        let insts = &func.block(block).insts;
        match insts.last() {
            None => findings.push(format!("block {} is empty", func.block(block).name)),
            Some(&last) => {
                if !matches!(func.inst(last), Some(inst) if inst.op.is_terminator()) {
                    findings.push(format!(
                        "block {} does not end in a terminator",
                        func.block(block).name
                    ));
                }
            }
        }
        for &id in insts.iter().rev().skip(1) {
            if matches!(func.inst(id), Some(inst) if inst.op.is_terminator()) {
                findings.push(format!(
                    "terminator in the middle of block {}",
                    func.block(block).name
                ));
            }
        }
    }

    // Predecessor lists agree with the terminators.
    let mut derived_preds: HashMap<BlockId, HashSet<BlockId>> = HashMap::new();
    for &block in func.blocks() {
        for succ in func.successors(block) {
            derived_preds.entry(succ).or_default().insert(block);
        }
    }
    for &block in func.blocks() {
        let recorded: HashSet<BlockId> = func.block(block).preds.iter().copied().collect();
        let derived = derived_preds.remove(&block).unwrap_or_default();
        if recorded != derived {
            findings.push(format!(
                "predecessor list of {} does not match the CFG",
                func.block(block).name
            ));
        }
    }

    // Phi incoming blocks must exactly cover the predecessors.
    for &block in func.blocks() {
        let preds: HashSet<BlockId> = func.block(block).preds.iter().copied().collect();
        for &id in &func.block(block).insts {
            let inst = match func.inst(id) {
                Some(inst) => inst,
                None => continue,
            };
            if inst.op != Opcode::Phi {
                continue;
            }
            let incoming: HashSet<BlockId> = inst.incoming.iter().copied().collect();
            if incoming != preds {
                findings.push(format!(
                    "phi in {} does not cover its predecessors",
                    func.block(block).name
                ));
            }
        }
    }

    findings.extend(verify_dominance(func));
    findings
}

/// The SSA dominance property: every use of an instruction result is
/// dominated by its definition. For phi uses the definition must
/// dominate the terminator of the matching incoming block.
fn verify_dominance(func: &Function) -> Vec<String> {
    let mut findings = Vec::new();
    let dom = DomTree::compute(func);

    // Position of each attached instruction inside its block.
    let mut position: HashMap<ValueId, (BlockId, usize)> = HashMap::new();
    for &block in func.blocks() {
        for (index, &id) in func.block(block).insts.iter().enumerate() {
            position.insert(id, (block, index));
        }
    }

    let dominates_use =
        |def: ValueId, use_block: BlockId, use_index: usize| -> bool {
            let (def_block, def_index) = match position.get(&def) {
                Some(&pos) => pos,
                // Detached definition: a dangling use.
                None => return false,
            };
            if def_block == use_block {
                return def_index < use_index;
            }
            dom.dominates(def_block, use_block)
        };

    for &block in func.blocks() {
        if !dom.is_reachable(block) {
            continue;
        }
        for (index, &id) in func.block(block).insts.iter().enumerate() {
            let inst = match func.inst(id) {
                Some(inst) => inst,
                None => continue,
            };
            for (op_index, &operand) in inst.operands.iter().enumerate() {
                if !matches!(func.value(operand), ValueKind::Inst(_)) {
                    continue;
                }
                let ok = if inst.op == Opcode::Phi {
                    let pred = inst.incoming[op_index];
                    let pred_len = func.block(pred).insts.len();
                    operand == id || dominates_use(operand, pred, pred_len)
                } else {
                    dominates_use(operand, block, index)
                };
                if !ok {
                    findings.push(format!(
                        "use in {} is not dominated by its definition",
                        func.block(block).name
                    ));
                }
            }
        }
    }

    findings
}
