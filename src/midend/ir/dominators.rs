//! Dominator-tree construction: the iterative algorithm of Cooper,
//! Harvey, and Kennedy over a reverse-postorder numbering.

use std::collections::HashMap;

use super::function::Function;
use super::value::BlockId;

pub struct DomTree {
    /// Immediate dominator per reachable block; the entry maps to itself.
    idom: HashMap<BlockId, BlockId>,
    children: HashMap<BlockId, Vec<BlockId>>,
}

impl DomTree {
    pub fn compute(func: &Function) -> DomTree {
        let entry = func.entry();
        let rpo = reverse_postorder(func, entry);
        let rpo_index: HashMap<BlockId, usize> =
            rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect();

        let mut idom: HashMap<BlockId, BlockId> = HashMap::new();
        idom.insert(entry, entry);

        let mut changed = true;
        while changed {
            changed = false;
            for &block in rpo.iter().skip(1) {
                let mut new_idom: Option<BlockId> = None;
                for &pred in &func.block(block).preds {
                    if !idom.contains_key(&pred) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => intersect(&idom, &rpo_index, pred, current),
                    });
                }
                if let Some(new_idom) = new_idom {
                    if idom.get(&block) != Some(&new_idom) {
                        idom.insert(block, new_idom);
                        changed = true;
                    }
                }
            }
        }

        let mut children: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        for (&block, &dom) in &idom {
            if block != dom {
                children.entry(dom).or_default().push(block);
            }
        }
        // Deterministic traversal order.
        for list in children.values_mut() {
            list.sort();
        }

        DomTree { idom, children }
    }

    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        let dom = *self.idom.get(&block)?;
        (dom != block).then_some(dom)
    }

    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.idom.contains_key(&block)
    }

    pub fn children(&self, block: BlockId) -> &[BlockId] {
        self.children.get(&block).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True when `a` dominates `b` (reflexively).
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            match self.idom(current) {
                Some(dom) => current = dom,
                None => return false,
            }
        }
    }
}

fn reverse_postorder(func: &Function, entry: BlockId) -> Vec<BlockId> {
    let mut visited = std::collections::HashSet::new();
    let mut postorder = Vec::new();
    // Iterative DFS keeping each frame's successor cursor.
    let mut stack: Vec<(BlockId, Vec<BlockId>, usize)> = Vec::new();
    visited.insert(entry);
    stack.push((entry, func.successors(entry), 0));

    loop {
        let step = match stack.last_mut() {
            None => break,
            Some((block, succs, cursor)) => {
                if *cursor < succs.len() {
                    let next = succs[*cursor];
                    *cursor += 1;
                    Some(next)
                } else {
                    postorder.push(*block);
                    None
                }
            }
        };
        match step {
            Some(next) => {
                if visited.insert(next) {
                    let succs = func.successors(next);
                    stack.push((next, succs, 0));
                }
            }
            None => {
                stack.pop();
            }
        }
    }

    postorder.reverse();
    postorder
}

fn intersect(
    idom: &HashMap<BlockId, BlockId>,
    rpo_index: &HashMap<BlockId, usize>,
    a: BlockId,
    b: BlockId,
) -> BlockId {
    let mut finger_a = a;
    let mut finger_b = b;
    while finger_a != finger_b {
        while rpo_index[&finger_a] > rpo_index[&finger_b] {
            finger_a = idom[&finger_a];
        }
        while rpo_index[&finger_b] > rpo_index[&finger_a] {
            finger_b = idom[&finger_b];
        }
    }
    finger_a
}
