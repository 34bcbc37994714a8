//! Natural-loop detection. A back edge is an edge whose target dominates
//! its source; the loop body is everything that reaches the back edge
//! without passing through the header.

use std::collections::HashSet;

use super::dominators::DomTree;
use super::function::Function;
use super::value::BlockId;

pub struct Loop {
    pub header: BlockId,
    pub blocks: HashSet<BlockId>,
    /// The unique out-of-loop predecessor that falls through to the
    /// header, when there is one. Hoisting targets this block.
    pub preheader: Option<BlockId>,
}

impl Loop {
    pub fn contains(&self, block: BlockId) -> bool {
        self.blocks.contains(&block)
    }
}

pub struct LoopInfo {
    loops: Vec<Loop>,
}

impl LoopInfo {
    pub fn find(func: &Function, dom: &DomTree) -> LoopInfo {
        let mut loops: Vec<Loop> = Vec::new();

        for &block in func.blocks() {
            if !dom.is_reachable(block) {
                continue;
            }
            for succ in func.successors(block) {
                if dom.is_reachable(succ) && dom.dominates(succ, block) {
                    // block -> succ is a back edge; succ is a header.
                    let body = natural_loop(func, succ, block);
                    match loops.iter_mut().find(|l| l.header == succ) {
                        Some(existing) => existing.blocks.extend(body),
                        None => loops.push(Loop {
                            header: succ,
                            blocks: body,
                            preheader: None,
                        }),
                    }
                }
            }
        }

        for l in &mut loops {
            l.preheader = find_preheader(func, l);
        }

        // Innermost first: a nested loop has fewer blocks than the loop
        // containing it.
        loops.sort_by_key(|l| l.blocks.len());

        LoopInfo { loops }
    }

    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    /// Index of the innermost loop containing `block`. Loops are sorted
    /// smallest-first, so the first hit is innermost.
    pub fn innermost(&self, block: BlockId) -> Option<usize> {
        self.loops.iter().position(|l| l.contains(block))
    }
}

fn natural_loop(func: &Function, header: BlockId, latch: BlockId) -> HashSet<BlockId> {
    let mut body = HashSet::new();
    body.insert(header);
    let mut work = vec![latch];
    while let Some(block) = work.pop() {
        if body.insert(block) {
            for &pred in &func.block(block).preds {
                work.push(pred);
            }
        }
    }
    body
}

fn find_preheader(func: &Function, l: &Loop) -> Option<BlockId> {
    let outside: Vec<BlockId> = func
        .block(l.header)
        .preds
        .iter()
        .copied()
        .filter(|pred| !l.contains(*pred))
        .collect();
    match outside.as_slice() {
        // The candidate must branch only to the header.
        [only] if func.successors(*only) == vec![l.header] => Some(*only),
        _ => None,
    }
}
