use std::collections::HashMap;

use serde::Serialize;

use super::types::IrType;
use super::value::{BlockId, Inst, Opcode, Predicate, ValueId, ValueKind};

/// A basic block: an ordered instruction list plus the predecessor edges
/// the branch builders maintain. Phi nodes always sit at the front.
#[derive(Clone, Debug, Serialize)]
pub struct Block {
    pub name: String,
    pub insts: Vec<ValueId>,
    pub preds: Vec<BlockId>,
}

/// A function definition. Values and blocks are arena-owned; handles stay
/// stable while instructions move between blocks or are detached.
/// "Erased" instructions simply leave their block's list; the arena keeps
/// the tombstone.
#[derive(Debug, Serialize)]
pub struct Function {
    pub name: String,
    pub ret_ty: IrType,
    args: Vec<ValueId>,
    values: Vec<ValueKind>,
    blocks: Vec<Block>,
    /// Live blocks in layout order; the entry block is first.
    block_order: Vec<BlockId>,
    #[serde(skip)]
    const_cache: HashMap<(IrType, i64), ValueId>,
    #[serde(skip)]
    global_cache: HashMap<String, ValueId>,
}

impl Function {
    pub fn new(name: &str, ret_ty: IrType, args: &[(String, IrType)]) -> Self {
        let mut func = Function {
            name: name.to_string(),
            ret_ty,
            args: Vec::new(),
            values: Vec::new(),
            blocks: Vec::new(),
            block_order: Vec::new(),
            const_cache: HashMap::new(),
            global_cache: HashMap::new(),
        };
        for (index, (arg_name, ty)) in args.iter().enumerate() {
            let id = func.push_value(ValueKind::Argument {
                index,
                ty: ty.clone(),
                name: arg_name.clone(),
            });
            func.args.push(id);
        }
        func
    }

    fn push_value(&mut self, kind: ValueKind) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(kind);
        id
    }

    // ---- accessors ----

    pub fn value(&self, id: ValueId) -> &ValueKind {
        &self.values[id.0 as usize]
    }

    pub fn inst(&self, id: ValueId) -> Option<&Inst> {
        match self.value(id) {
            ValueKind::Inst(inst) => Some(inst),
            _ => None,
        }
    }

    fn inst_mut(&mut self, id: ValueId) -> Option<&mut Inst> {
        match &mut self.values[id.0 as usize] {
            ValueKind::Inst(inst) => Some(inst),
            _ => None,
        }
    }

    pub fn args(&self) -> &[ValueId] {
        &self.args
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.0 as usize]
    }

    /// Live blocks in layout order.
    pub fn blocks(&self) -> &[BlockId] {
        &self.block_order
    }

    pub fn entry(&self) -> BlockId {
        self.block_order[0]
    }

    /// True while the instruction is attached to a block.
    pub fn inst_attached(&self, id: ValueId) -> bool {
        match self.inst(id) {
            Some(inst) => self.blocks[inst.block.0 as usize].insts.contains(&id),
            None => false,
        }
    }

    pub fn terminator(&self, block: BlockId) -> Option<ValueId> {
        let last = *self.block(block).insts.last()?;
        let inst = self.inst(last)?;
        inst.op.is_terminator().then_some(last)
    }

    /// Successor blocks named by the terminator, if any.
    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        match self.terminator(block).and_then(|t| self.inst(t)) {
            Some(inst) => match &inst.op {
                Opcode::Br { dest } => vec![*dest],
                Opcode::CondBr {
                    true_dest,
                    false_dest,
                } => vec![*true_dest, *false_dest],
                _ => Vec::new(),
            },
            None => Vec::new(),
        }
    }

    // ---- creation ----

    /// Creates a block, uniquifying the name against existing blocks.
    pub fn create_block(&mut self, name: &str) -> BlockId {
        let mut unique = name.to_string();
        let mut n = 0;
        while self.blocks.iter().any(|b| b.name == unique) {
            n += 1;
            unique = format!("{}{}", name, n);
        }
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block {
            name: unique,
            insts: Vec::new(),
            preds: Vec::new(),
        });
        self.block_order.push(id);
        id
    }

    /// Interned integer constant of the given type.
    pub fn const_int(&mut self, ty: IrType, value: i64) -> ValueId {
        if let Some(existing) = self.const_cache.get(&(ty.clone(), value)) {
            return *existing;
        }
        let id = self.push_value(ValueKind::ConstInt {
            ty: ty.clone(),
            value,
        });
        self.const_cache.insert((ty, value), id);
        id
    }

    pub fn undef(&mut self, ty: IrType) -> ValueId {
        self.push_value(ValueKind::Undef { ty })
    }

    /// Interned reference to a module-level global (a string constant or
    /// a function address used as a value).
    pub fn global_ref(&mut self, name: &str, ty: IrType) -> ValueId {
        if let Some(existing) = self.global_cache.get(name) {
            return *existing;
        }
        let id = self.push_value(ValueKind::Global {
            name: name.to_string(),
            ty,
        });
        self.global_cache.insert(name.to_string(), id);
        id
    }

    // ---- instruction builders ----

    fn append_inst(
        &mut self,
        block: BlockId,
        op: Opcode,
        ty: IrType,
        operands: Vec<ValueId>,
    ) -> ValueId {
        let id = self.push_value(ValueKind::Inst(Inst {
            op,
            ty,
            operands,
            block,
            incoming: Vec::new(),
        }));
        self.block_mut(block).insts.push(id);
        id
    }

    pub fn build_binary(
        &mut self,
        block: BlockId,
        op: Opcode,
        lhs: ValueId,
        rhs: ValueId,
    ) -> ValueId {
        debug_assert!(op.is_binary());
        let ty = self.value(lhs).ty().clone();
        self.append_inst(block, op, ty, vec![lhs, rhs])
    }

    pub fn build_icmp(
        &mut self,
        block: BlockId,
        pred: Predicate,
        lhs: ValueId,
        rhs: ValueId,
    ) -> ValueId {
        self.append_inst(block, Opcode::ICmp(pred), IrType::I1, vec![lhs, rhs])
    }

    pub fn build_cast(&mut self, block: BlockId, op: Opcode, value: ValueId, to: IrType) -> ValueId {
        debug_assert!(op.is_cast());
        self.append_inst(block, op, to, vec![value])
    }

    pub fn build_select(
        &mut self,
        block: BlockId,
        cond: ValueId,
        if_true: ValueId,
        if_false: ValueId,
    ) -> ValueId {
        let ty = self.value(if_true).ty().clone();
        self.append_inst(block, Opcode::Select, ty, vec![cond, if_true, if_false])
    }

    /// `result_ty` is the pointer type of the addressed element.
    pub fn build_gep(
        &mut self,
        block: BlockId,
        base: ValueId,
        indices: &[ValueId],
        result_ty: IrType,
    ) -> ValueId {
        let mut operands = vec![base];
        operands.extend_from_slice(indices);
        self.append_inst(block, Opcode::GetElementPtr, result_ty, operands)
    }

    pub fn build_alloca(&mut self, block: BlockId, allocated: IrType) -> ValueId {
        let ty = IrType::ptr_to(allocated);
        self.append_inst(block, Opcode::Alloca, ty, Vec::new())
    }

    pub fn build_load(&mut self, block: BlockId, addr: ValueId) -> ValueId {
        let ty = self
            .value(addr)
            .ty()
            .pointee()
            .cloned()
            .unwrap_or(IrType::I32);
        self.append_inst(block, Opcode::Load, ty, vec![addr])
    }

    pub fn build_store(&mut self, block: BlockId, value: ValueId, addr: ValueId) -> ValueId {
        self.append_inst(block, Opcode::Store, IrType::Void, vec![value, addr])
    }

    pub fn build_call(
        &mut self,
        block: BlockId,
        callee: &str,
        args: Vec<ValueId>,
        ret_ty: IrType,
    ) -> ValueId {
        self.append_inst(
            block,
            Opcode::Call {
                callee: callee.to_string(),
            },
            ret_ty,
            args,
        )
    }

    pub fn build_memcpy(
        &mut self,
        block: BlockId,
        dest: ValueId,
        src: ValueId,
        len: usize,
        align: usize,
    ) -> ValueId {
        self.append_inst(
            block,
            Opcode::MemCpy { len, align },
            IrType::Void,
            vec![dest, src],
        )
    }

    /// Unconditional branch; records the CFG edge.
    pub fn build_br(&mut self, block: BlockId, dest: BlockId) -> ValueId {
        self.add_pred(dest, block);
        self.append_inst(block, Opcode::Br { dest }, IrType::Void, Vec::new())
    }

    /// Conditional branch; records both CFG edges.
    pub fn build_cond_br(
        &mut self,
        block: BlockId,
        cond: ValueId,
        true_dest: BlockId,
        false_dest: BlockId,
    ) -> ValueId {
        self.add_pred(true_dest, block);
        self.add_pred(false_dest, block);
        self.append_inst(
            block,
            Opcode::CondBr {
                true_dest,
                false_dest,
            },
            IrType::Void,
            vec![cond],
        )
    }

    pub fn build_ret(&mut self, block: BlockId, value: ValueId) -> ValueId {
        self.append_inst(block, Opcode::Ret, IrType::Void, vec![value])
    }

    pub fn build_ret_void(&mut self, block: BlockId) -> ValueId {
        self.append_inst(block, Opcode::RetVoid, IrType::Void, Vec::new())
    }

    /// Creates an empty phi at the top of `block`.
    pub fn create_phi(&mut self, block: BlockId, ty: IrType) -> ValueId {
        let id = self.push_value(ValueKind::Inst(Inst {
            op: Opcode::Phi,
            ty,
            operands: Vec::new(),
            block,
            incoming: Vec::new(),
        }));
        self.block_mut(block).insts.insert(0, id);
        id
    }

    pub fn phi_add_incoming(&mut self, phi: ValueId, value: ValueId, pred: BlockId) {
        let inst = self.inst_mut(phi).expect("phi_add_incoming on non-inst");
        debug_assert_eq!(inst.op, Opcode::Phi);
        inst.operands.push(value);
        inst.incoming.push(pred);
    }

    fn add_pred(&mut self, block: BlockId, pred: BlockId) {
        let preds = &mut self.block_mut(block).preds;
        if !preds.contains(&pred) {
            preds.push(pred);
        }
    }

    // ---- mutation ----

    /// Rewrites every operand equal to `old` across the function.
    pub fn replace_all_uses(&mut self, old: ValueId, new: ValueId) {
        for value in &mut self.values {
            if let ValueKind::Inst(inst) = value {
                for operand in &mut inst.operands {
                    if *operand == old {
                        *operand = new;
                    }
                }
            }
        }
    }

    /// Phi instructions (other than `phi` itself) that currently use
    /// `phi` as an operand.
    pub fn phi_users(&self, phi: ValueId) -> Vec<ValueId> {
        let mut users = Vec::new();
        for &block in &self.block_order {
            for &id in &self.block(block).insts {
                if id == phi {
                    continue;
                }
                if let Some(inst) = self.inst(id) {
                    if inst.op == Opcode::Phi && inst.operands.contains(&phi) {
                        users.push(id);
                    }
                }
            }
        }
        users
    }

    /// Detaches the instruction from its block. The arena entry remains
    /// as a tombstone; handles to it must no longer be used as operands.
    pub fn erase_inst(&mut self, id: ValueId) {
        if let Some(inst) = self.inst(id) {
            let block = inst.block;
            self.block_mut(block).insts.retain(|i| *i != id);
        }
    }

    /// Moves the instruction in front of `dest`'s terminator.
    pub fn move_before_terminator(&mut self, id: ValueId, dest: BlockId) {
        self.erase_inst(id);
        if let Some(inst) = self.inst_mut(id) {
            inst.block = dest;
        }
        let block = self.block_mut(dest);
        let at = block.insts.len().saturating_sub(1);
        block.insts.insert(at, id);
    }

    /// Drops the CFG edge `pred -> block` and repairs the block's phis:
    /// the incoming entry for `pred` is removed, and a phi reduced to a
    /// single incoming value is replaced by that value and erased.
    pub fn remove_predecessor(&mut self, block: BlockId, pred: BlockId) {
        self.block_mut(block).preds.retain(|p| *p != pred);

        let phis: Vec<ValueId> = self
            .block(block)
            .insts
            .iter()
            .copied()
            .filter(|id| matches!(self.inst(*id), Some(inst) if inst.op == Opcode::Phi))
            .collect();

        for phi in phis {
            let inst = self.inst_mut(phi).expect("phi disappeared");
            if let Some(pos) = inst.incoming.iter().position(|b| *b == pred) {
                inst.operands.remove(pos);
                inst.incoming.remove(pos);
            }
            let inst = self.inst(phi).expect("phi disappeared");
            if inst.operands.len() == 1 {
                let only = inst.operands[0];
                self.replace_all_uses(phi, only);
                self.erase_inst(phi);
            }
        }
    }

    /// Removes an unreachable block: detaches its instructions and drops
    /// it from the layout. Callers are responsible for fixing successor
    /// phis first via [`Function::remove_predecessor`].
    pub fn erase_block(&mut self, block: BlockId) {
        self.block_mut(block).insts.clear();
        self.block_order.retain(|b| *b != block);
    }
}
