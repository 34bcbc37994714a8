//! Dead block removal: depth-first search from the entry block; any
//! block never visited is unreachable and gets erased after its
//! successors' phis are repaired.

use std::collections::HashSet;

use super::FunctionPass;
use crate::midend::ir::{BlockId, Function};

pub struct DeadBlocks;

impl FunctionPass for DeadBlocks {
    fn name(&self) -> &'static str {
        "dead-blocks"
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &["constant-branch"]
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        let mut visited: HashSet<BlockId> = HashSet::new();
        let mut stack = vec![func.entry()];
        while let Some(block) = stack.pop() {
            if visited.insert(block) {
                stack.extend(func.successors(block));
            }
        }

        let unvisited: Vec<BlockId> = func
            .blocks()
            .iter()
            .copied()
            .filter(|block| !visited.contains(block))
            .collect();

        let changed = !unvisited.is_empty();
        for block in &unvisited {
            for succ in func.successors(*block) {
                func.remove_predecessor(succ, *block);
            }
            func.erase_block(*block);
        }
        changed
    }
}
