//! On-the-fly SSA construction after Braun et al., "Simple and Efficient
//! Construction of Static Single Assignment Form". Scalar variables never
//! touch memory: reads and writes go through a per-(block, variable)
//! definition map, and loads from predecessors become phi nodes created
//! lazily. Blocks whose predecessor set is still growing stay "unsealed";
//! reads in them produce placeholder phis whose operands are filled in
//! exactly once when the block is sealed.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::trace;

use crate::frontend::symtab::IdentId;
use crate::midend::ir::{BlockId, Function, IrType, Opcode, ValueId};

#[derive(Default)]
pub struct SsaBuilder {
    /// current definition of each variable per block
    var_defs: HashMap<BlockId, HashMap<IdentId, ValueId>>,
    /// placeholder phis per unsealed block, ordered for determinism
    incomplete_phis: HashMap<BlockId, BTreeMap<IdentId, ValueId>>,
    sealed_blocks: HashSet<BlockId>,
}

impl SsaBuilder {
    pub fn new() -> Self {
        SsaBuilder::default()
    }

    /// Called at each function boundary to clear all state.
    pub fn reset(&mut self) {
        self.var_defs.clear();
        self.incomplete_phis.clear();
        self.sealed_blocks.clear();
    }

    /// Registers a new block, optionally sealing it immediately (the
    /// entry block can never gain predecessors).
    pub fn add_block(&mut self, func: &mut Function, block: BlockId, is_sealed: bool) {
        self.var_defs.entry(block).or_default();
        self.incomplete_phis.entry(block).or_default();
        if is_sealed {
            self.seal_block(func, block);
        }
    }

    /// Declares that `block` will gain no further predecessors and
    /// completes any placeholder phis created by reads inside it.
    pub fn seal_block(&mut self, func: &mut Function, block: BlockId) {
        let pending: Vec<(IdentId, ValueId)> = self
            .incomplete_phis
            .get_mut(&block)
            .map(|phis| phis.iter().map(|(&var, &phi)| (var, phi)).collect())
            .unwrap_or_default();

        for (var, phi) in pending {
            let ty = func.inst(phi).expect("incomplete phi exists").ty.clone();
            self.add_phi_operands(func, var, &ty, phi);
        }
        if let Some(phis) = self.incomplete_phis.get_mut(&block) {
            phis.clear();
        }
        self.sealed_blocks.insert(block);
    }

    /// Records `value` as the current definition of `var` in `block`.
    pub fn write_variable(&mut self, var: IdentId, block: BlockId, value: ValueId) {
        self.var_defs.entry(block).or_default().insert(var, value);
    }

    /// Reads the current value of `var` in `block`, searching predecessor
    /// blocks (and materializing phis) as needed.
    pub fn read_variable(
        &mut self,
        func: &mut Function,
        var: IdentId,
        ty: &IrType,
        block: BlockId,
    ) -> ValueId {
        if let Some(value) = self.var_defs.get(&block).and_then(|defs| defs.get(&var)) {
            return *value;
        }
        self.read_variable_recursive(func, var, ty, block)
    }

    fn read_variable_recursive(
        &mut self,
        func: &mut Function,
        var: IdentId,
        ty: &IrType,
        block: BlockId,
    ) -> ValueId {
        if !self.sealed_blocks.contains(&block) {
            // Incomplete CFG: leave a placeholder phi to be filled in
            // when the block is sealed.
            trace!(?block, "placeholder phi in unsealed block");
            let phi = func.create_phi(block, ty.clone());
            self.incomplete_phis.entry(block).or_default().insert(var, phi);
            self.write_variable(var, block, phi);
            return phi;
        }

        if func.block(block).preds.len() == 1 {
            // Single predecessor, no phi needed.
            let pred = func.block(block).preds[0];
            let value = self.read_variable(func, var, ty, pred);
            self.write_variable(var, block, value);
            return value;
        }

        // Write the phi first to break cycles through back edges.
        let phi = func.create_phi(block, ty.clone());
        self.write_variable(var, block, phi);
        let value = self.add_phi_operands(func, var, ty, phi);
        self.write_variable(var, block, value);
        value
    }

    /// Fills in one operand per predecessor of the phi's block, then
    /// tries to fold the phi away.
    fn add_phi_operands(
        &mut self,
        func: &mut Function,
        var: IdentId,
        ty: &IrType,
        phi: ValueId,
    ) -> ValueId {
        let block = func.inst(phi).expect("phi exists").block;
        let preds = func.block(block).preds.clone();
        for pred in preds {
            let value = self.read_variable(func, var, ty, pred);
            func.phi_add_incoming(phi, value, pred);
        }
        self.try_remove_trivial_phi(func, phi)
    }

    /// A phi is trivial if its operands, ignoring self-references, all
    /// reduce to one value (or to none, for unreachable paths). Trivial
    /// phis are replaced by that value everywhere, and every phi that
    /// used the removed one is re-examined once, since it may have become
    /// trivial in turn.
    pub(crate) fn try_remove_trivial_phi(&mut self, func: &mut Function, phi: ValueId) -> ValueId {
        let inst = func.inst(phi).expect("phi exists");
        debug_assert_eq!(inst.op, Opcode::Phi);

        let mut same: Option<ValueId> = None;
        for &op in &inst.operands {
            if Some(op) == same || op == phi {
                continue;
            }
            if same.is_some() {
                // Merges at least two distinct values: not trivial.
                return phi;
            }
            same = Some(op);
        }

        let same = match same {
            Some(value) => value,
            // No operands besides itself: unreachable or start block.
            None => {
                let ty = inst.ty.clone();
                func.undef(ty)
            }
        };

        // Capture the phi users before rewriting so each former user is
        // re-processed at most once.
        let users = func.phi_users(phi);

        func.replace_all_uses(phi, same);
        for defs in self.var_defs.values_mut() {
            for value in defs.values_mut() {
                if *value == phi {
                    *value = same;
                }
            }
        }
        func.erase_inst(phi);

        for user in users {
            if func.inst_attached(user) {
                self.try_remove_trivial_phi(func, user);
            }
        }

        same
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::symtab::SymbolTable;

    fn test_var() -> IdentId {
        let mut syms = SymbolTable::new();
        syms.create_identifier("x")
    }

    /// entry -> {left, right} -> join
    fn diamond() -> (Function, BlockId, BlockId, BlockId, BlockId, ValueId) {
        let mut func = Function::new("f", IrType::I32, &[]);
        let entry = func.create_block("entry");
        let left = func.create_block("left");
        let right = func.create_block("right");
        let join = func.create_block("join");
        let cond = func.const_int(IrType::I1, 1);
        func.build_cond_br(entry, cond, left, right);
        func.build_br(left, join);
        func.build_br(right, join);
        (func, entry, left, right, join, cond)
    }

    #[test]
    fn write_then_read_in_same_block() {
        let mut func = Function::new("f", IrType::I32, &[]);
        let entry = func.create_block("entry");
        let mut ssa = SsaBuilder::new();
        ssa.add_block(&mut func, entry, true);

        let var = test_var();
        let value = func.const_int(IrType::I32, 7);
        ssa.write_variable(var, entry, value);
        assert_eq!(ssa.read_variable(&mut func, var, &IrType::I32, entry), value);
    }

    #[test]
    fn single_predecessor_chain_needs_no_phi() {
        let mut func = Function::new("f", IrType::I32, &[]);
        let entry = func.create_block("entry");
        let next = func.create_block("next");
        let mut ssa = SsaBuilder::new();
        ssa.add_block(&mut func, entry, true);
        ssa.add_block(&mut func, next, false);
        let var = test_var();
        let value = func.const_int(IrType::I32, 3);
        ssa.write_variable(var, entry, value);
        func.build_br(entry, next);
        ssa.seal_block(&mut func, next);

        // Reads through the chain see the definition without a phi, and
        // agree with the value in the defining block.
        assert_eq!(ssa.read_variable(&mut func, var, &IrType::I32, next), value);
        assert_eq!(
            ssa.read_variable(&mut func, var, &IrType::I32, entry),
            value
        );
        assert!(func.block(next).insts.iter().all(|&id| {
            func.inst(id).map(|inst| inst.op != Opcode::Phi).unwrap_or(true)
        }));
    }

    #[test]
    fn distinct_definitions_merge_in_a_phi() {
        let (mut func, entry, left, right, join, _) = diamond();
        let mut ssa = SsaBuilder::new();
        for block in [entry, left, right] {
            ssa.add_block(&mut func, block, true);
        }
        ssa.add_block(&mut func, join, false);

        let var = test_var();
        let one = func.const_int(IrType::I32, 1);
        let two = func.const_int(IrType::I32, 2);
        ssa.write_variable(var, left, one);
        ssa.write_variable(var, right, two);
        ssa.seal_block(&mut func, join);

        let merged = ssa.read_variable(&mut func, var, &IrType::I32, join);
        let inst = func.inst(merged).expect("merge produced a phi");
        assert_eq!(inst.op, Opcode::Phi);
        assert_eq!(inst.operands.len(), 2);
    }

    #[test]
    fn same_definition_on_both_paths_folds_the_phi() {
        let (mut func, entry, left, right, join, _) = diamond();
        let mut ssa = SsaBuilder::new();
        for block in [entry, left, right] {
            ssa.add_block(&mut func, block, true);
        }
        ssa.add_block(&mut func, join, false);

        let var = test_var();
        let value = func.const_int(IrType::I32, 9);
        ssa.write_variable(var, entry, value);
        ssa.seal_block(&mut func, join);

        assert_eq!(ssa.read_variable(&mut func, var, &IrType::I32, join), value);
        assert!(func.block(join).insts.is_empty());
    }

    #[test]
    fn unsealed_read_leaves_a_placeholder_phi() {
        let mut func = Function::new("f", IrType::I32, &[]);
        let entry = func.create_block("entry");
        let open = func.create_block("open");
        let mut ssa = SsaBuilder::new();
        ssa.add_block(&mut func, entry, true);
        ssa.add_block(&mut func, open, false);

        let var = test_var();
        let value = func.const_int(IrType::I32, 5);
        ssa.write_variable(var, entry, value);

        let placeholder = ssa.read_variable(&mut func, var, &IrType::I32, open);
        assert_eq!(
            func.inst(placeholder).expect("placeholder phi").op,
            Opcode::Phi
        );

        // Linking the single predecessor and sealing folds it away.
        func.build_br(entry, open);
        ssa.seal_block(&mut func, open);
        assert_eq!(ssa.read_variable(&mut func, var, &IrType::I32, open), value);
        assert!(!func.inst_attached(placeholder));
    }

    #[test]
    fn try_remove_trivial_phi_is_idempotent_on_nontrivial_phis() {
        let (mut func, entry, left, right, join, _) = diamond();
        let mut ssa = SsaBuilder::new();
        for block in [entry, left, right] {
            ssa.add_block(&mut func, block, true);
        }
        ssa.add_block(&mut func, join, false);

        let var = test_var();
        let one = func.const_int(IrType::I32, 1);
        let two = func.const_int(IrType::I32, 2);
        ssa.write_variable(var, left, one);
        ssa.write_variable(var, right, two);
        ssa.seal_block(&mut func, join);
        let phi = ssa.read_variable(&mut func, var, &IrType::I32, join);

        let first = ssa.try_remove_trivial_phi(&mut func, phi);
        let second = ssa.try_remove_trivial_phi(&mut func, phi);
        assert_eq!(first, phi);
        assert_eq!(second, first);
        assert!(func.inst_attached(phi));
    }
}
