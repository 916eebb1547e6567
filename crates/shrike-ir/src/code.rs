//! Method IR: value and instruction arenas, aliasing queries, and a
//! block-structured builder.
//!
//! Values and instructions are arena-indexed so lattice values elsewhere can
//! hold plain ids without borrowing the IR. The aliasing queries implement
//! the `Assume`/`CheckCast` aliased-value relation the analyses reason
//! through: both instruction kinds define a value that is just another name
//! for their operand.

use crate::cfg::{BasicBlock, BlockId, Cfg};
use crate::instruction::{InstrId, InstrKind, Instruction, MonitorKind, ValueId};
use crate::method::MethodDef;
use crate::refs::{FieldRef, MethodRef, TypeRef};
use smallvec::SmallVec;
use std::collections::HashSet;
use thiserror::Error;

/// Per-value metadata.
#[derive(Debug, Clone)]
pub struct ValueInfo {
    pub ty: TypeRef,
    /// Set when the value is defined by an `Argument` instruction.
    pub argument_index: Option<usize>,
    pub defining_instruction: Option<InstrId>,
    pub users: Vec<InstrId>,
    pub has_phi_users: bool,
    /// True for the receiver argument of an instance method.
    pub is_this: bool,
}

/// The IR of one method, ready for analysis.
#[derive(Debug)]
pub struct IrCode {
    method: MethodDef,
    instructions: Vec<Instruction>,
    values: Vec<ValueInfo>,
    cfg: Cfg,
}

impl IrCode {
    pub fn method(&self) -> &MethodDef {
        &self.method
    }

    pub fn cfg(&self) -> &Cfg {
        &self.cfg
    }

    pub fn instruction(&self, id: InstrId) -> &Instruction {
        &self.instructions[id.0 as usize]
    }

    pub fn value(&self, id: ValueId) -> &ValueInfo {
        &self.values[id.0 as usize]
    }

    pub fn is_argument(&self, id: ValueId) -> bool {
        self.value(id).argument_index.is_some()
    }

    /// The last `Argument` instruction, if the method takes any arguments.
    /// Argument instructions form the prefix of the entry block.
    pub fn last_argument(&self) -> Option<InstrId> {
        self.cfg
            .block(self.cfg.entry())
            .instructions
            .iter()
            .copied()
            .take_while(|&id| self.instruction(id).is_argument())
            .last()
    }

    /// Follow the `Assume`/`CheckCast` alias chain to the underlying value.
    pub fn aliased_root(&self, id: ValueId) -> ValueId {
        let mut current = id;
        loop {
            let Some(def) = self.value(current).defining_instruction else {
                return current;
            };
            match &self.instruction(def).kind {
                InstrKind::Assume { value } => current = *value,
                InstrKind::CheckCast { object, .. } => current = *object,
                _ => return current,
            }
        }
    }

    /// All instructions using `id` directly or through a chain of
    /// `Assume`/`CheckCast` aliases.
    pub fn aliased_users(&self, id: ValueId) -> HashSet<InstrId> {
        let mut users = HashSet::new();
        let mut pending = vec![id];
        let mut seen = HashSet::new();
        while let Some(value) = pending.pop() {
            if !seen.insert(value) {
                continue;
            }
            for &user in &self.value(value).users {
                users.insert(user);
                let instruction = self.instruction(user);
                if matches!(
                    instruction.kind,
                    InstrKind::Assume { .. } | InstrKind::CheckCast { .. }
                ) {
                    if let Some(alias) = instruction.out {
                        pending.push(alias);
                    }
                }
            }
        }
        users
    }
}

#[derive(Debug, Error)]
pub enum IrBuildError {
    #[error("block {0:?} has neither a terminator nor successors")]
    UnterminatedBlock(BlockId),
    #[error("argument instructions must precede all other instructions in the entry block")]
    MisplacedArgument,
}

/// Block-structured builder producing [`IrCode`].
///
/// Use-lists are maintained automatically; phi users are recorded with
/// [`IrBuilder::mark_phi_user`] since this IR keeps phis implicit.
#[derive(Debug)]
pub struct IrBuilder {
    method: MethodDef,
    instructions: Vec<Instruction>,
    values: Vec<ValueInfo>,
    blocks: Vec<BasicBlock>,
    current: BlockId,
    next_argument_index: usize,
    seen_non_argument: bool,
    error: Option<IrBuildError>,
}

impl IrBuilder {
    pub fn new(method: MethodDef) -> Self {
        IrBuilder {
            method,
            instructions: Vec::new(),
            values: Vec::new(),
            blocks: vec![BasicBlock::default()],
            current: BlockId::ENTRY,
            next_argument_index: 0,
            seen_non_argument: false,
            error: None,
        }
    }

    /// Append an argument instruction for the next parameter index.
    pub fn argument(&mut self, ty: TypeRef) -> ValueId {
        if self.seen_non_argument || self.current != BlockId::ENTRY {
            self.error.get_or_insert(IrBuildError::MisplacedArgument);
        }
        let index = self.next_argument_index;
        self.next_argument_index += 1;
        let is_this = index == 0 && !self.method.is_static();
        let out = self.new_value(ty, Some(index), is_this);
        self.push(InstrKind::Argument { index }, Some(out));
        out
    }

    pub fn assume(&mut self, value: ValueId) -> ValueId {
        let ty = self.values[value.0 as usize].ty.clone();
        let out = self.new_value(ty, None, false);
        self.push(InstrKind::Assume { value }, Some(out));
        out
    }

    pub fn check_cast(&mut self, object: ValueId, target: TypeRef) -> ValueId {
        let out = self.new_value(target.clone(), None, false);
        self.push(InstrKind::CheckCast { object, target }, Some(out));
        out
    }

    /// Zero/null test terminating the current block.
    pub fn if_zero(&mut self, lhs: ValueId, then_block: BlockId, else_block: BlockId) {
        self.push(InstrKind::If { lhs, rhs: None }, None);
        self.blocks[self.current.0 as usize].successors = vec![then_block, else_block];
    }

    /// Two-operand comparison terminating the current block.
    pub fn if_cmp(
        &mut self,
        lhs: ValueId,
        rhs: ValueId,
        then_block: BlockId,
        else_block: BlockId,
    ) {
        self.push(InstrKind::If { lhs, rhs: Some(rhs) }, None);
        self.blocks[self.current.0 as usize].successors = vec![then_block, else_block];
    }

    pub fn instance_get(&mut self, object: ValueId, field: FieldRef) -> ValueId {
        let out = self.new_value(field.ty.clone(), None, false);
        self.push(InstrKind::InstanceGet { object, field }, Some(out));
        out
    }

    pub fn instance_put(&mut self, object: ValueId, value: ValueId, field: FieldRef) {
        self.push(
            InstrKind::InstancePut {
                object,
                value,
                field,
            },
            None,
        );
    }

    pub fn invoke_direct(&mut self, method: MethodRef, arguments: Vec<ValueId>) -> Option<ValueId> {
        self.invoke(method, arguments, |method, arguments| {
            InstrKind::InvokeDirect { method, arguments }
        })
    }

    pub fn invoke_interface(
        &mut self,
        method: MethodRef,
        arguments: Vec<ValueId>,
    ) -> Option<ValueId> {
        self.invoke(method, arguments, |method, arguments| {
            InstrKind::InvokeInterface { method, arguments }
        })
    }

    pub fn invoke_static(&mut self, method: MethodRef, arguments: Vec<ValueId>) -> Option<ValueId> {
        self.invoke(method, arguments, |method, arguments| {
            InstrKind::InvokeStatic { method, arguments }
        })
    }

    pub fn invoke_virtual(
        &mut self,
        method: MethodRef,
        arguments: Vec<ValueId>,
    ) -> Option<ValueId> {
        self.invoke(method, arguments, |method, arguments| {
            InstrKind::InvokeVirtual { method, arguments }
        })
    }

    fn invoke(
        &mut self,
        method: MethodRef,
        arguments: Vec<ValueId>,
        make: impl FnOnce(MethodRef, SmallVec<[ValueId; 4]>) -> InstrKind,
    ) -> Option<ValueId> {
        let out = if method.returns_void() {
            None
        } else {
            Some(self.new_value(method.return_type(), None, false))
        };
        self.push(make(method, arguments.into()), out);
        out
    }

    pub fn monitor_enter(&mut self, object: ValueId) {
        self.push(
            InstrKind::Monitor {
                object,
                kind: MonitorKind::Enter,
            },
            None,
        );
    }

    pub fn monitor_exit(&mut self, object: ValueId) {
        self.push(
            InstrKind::Monitor {
                object,
                kind: MonitorKind::Exit,
            },
            None,
        );
    }

    /// Return, terminating the current block.
    pub fn ret(&mut self, value: Option<ValueId>) {
        self.push(InstrKind::Return { value }, None);
    }

    /// An instruction the analyses have no dedicated rule for.
    pub fn other(&mut self, operands: Vec<ValueId>, out_ty: Option<TypeRef>) -> Option<ValueId> {
        let out = out_ty.map(|ty| self.new_value(ty, None, false));
        self.push(
            InstrKind::Other {
                operands: operands.into(),
            },
            out,
        );
        out
    }

    /// A fresh value from an opaque defining instruction (constants and the
    /// like in tests).
    pub fn synthetic_value(&mut self, ty: TypeRef) -> ValueId {
        self.other(Vec::new(), Some(ty)).unwrap()
    }

    /// Create a new, empty block without switching to it.
    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::default());
        id
    }

    /// Continue appending instructions into `block`.
    pub fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    /// Fall through from the current block to `target`.
    pub fn goto(&mut self, target: BlockId) {
        self.blocks[self.current.0 as usize].successors.push(target);
    }

    /// Record an exceptional edge (current block throws into `handler`).
    pub fn exceptional_edge(&mut self, handler: BlockId) {
        self.blocks[self.current.0 as usize]
            .exceptional_successors
            .push(handler);
    }

    /// Mark a value as flowing into a phi, which makes it ineligible for
    /// the analyses that require a single alias chain.
    pub fn mark_phi_user(&mut self, value: ValueId) {
        self.values[value.0 as usize].has_phi_users = true;
    }

    pub fn build(mut self) -> Result<IrCode, IrBuildError> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        for (index, block) in self.blocks.iter().enumerate() {
            if block.is_terminal() && !self.ends_in_terminator(block) {
                return Err(IrBuildError::UnterminatedBlock(BlockId(index as u32)));
            }
        }
        self.link_predecessors();
        Ok(IrCode {
            method: self.method,
            instructions: self.instructions,
            values: self.values,
            cfg: Cfg::new(self.blocks),
        })
    }

    fn ends_in_terminator(&self, block: &BasicBlock) -> bool {
        block.instructions.last().is_some_and(|&id| {
            matches!(
                self.instructions[id.0 as usize].kind,
                // An `Other` tail is allowed to model a throw.
                InstrKind::Return { .. } | InstrKind::Other { .. }
            )
        })
    }

    fn link_predecessors(&mut self) {
        for id in 0..self.blocks.len() {
            let from = BlockId(id as u32);
            let (successors, exceptional) = {
                let block = &self.blocks[id];
                (
                    block.successors.clone(),
                    block.exceptional_successors.clone(),
                )
            };
            for succ in successors {
                self.blocks[succ.0 as usize].predecessors.push(from);
            }
            for succ in exceptional {
                self.blocks[succ.0 as usize]
                    .exceptional_predecessors
                    .push(from);
            }
        }
    }

    fn new_value(&mut self, ty: TypeRef, argument_index: Option<usize>, is_this: bool) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ValueInfo {
            ty,
            argument_index,
            defining_instruction: None,
            users: Vec::new(),
            has_phi_users: false,
            is_this,
        });
        id
    }

    fn push(&mut self, kind: InstrKind, out: Option<ValueId>) -> InstrId {
        if !matches!(kind, InstrKind::Argument { .. }) {
            self.seen_non_argument = true;
        }
        let id = InstrId(self.instructions.len() as u32);
        let instruction = Instruction { id, kind, out };
        for operand in instruction.in_values() {
            self.values[operand.0 as usize].users.push(id);
        }
        if let Some(out) = out {
            self.values[out.0 as usize].defining_instruction = Some(id);
        }
        self.instructions.push(instruction);
        self.blocks[self.current.0 as usize].instructions.push(id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_method() -> MethodDef {
        MethodDef::new(
            MethodRef::new(TypeRef::new("Lfoo/A;"), "f", "(Lfoo/B;)V"),
            true,
        )
    }

    #[test]
    fn test_alias_chain_resolution() {
        let mut b = IrBuilder::new(test_method());
        let p = b.argument(TypeRef::new("Lfoo/B;"));
        let assumed = b.assume(p);
        let cast = b.check_cast(assumed, TypeRef::new("Lfoo/C;"));
        b.ret(None);
        let code = b.build().unwrap();

        assert_eq!(code.aliased_root(cast), p);
        assert_eq!(code.aliased_root(assumed), p);
        assert_eq!(code.aliased_root(p), p);
    }

    #[test]
    fn test_aliased_users_cross_alias_boundary() {
        let mut b = IrBuilder::new(test_method());
        let p = b.argument(TypeRef::new("Lfoo/B;"));
        let assumed = b.assume(p);
        let field = FieldRef::new(TypeRef::new("Lfoo/B;"), "f", TypeRef::new("I"));
        b.instance_get(assumed, field);
        b.ret(None);
        let code = b.build().unwrap();

        // Users of p include the assume and, through the alias, the read.
        let users = code.aliased_users(p);
        assert_eq!(users.len(), 2);
    }

    #[test]
    fn test_last_argument() {
        let mut b = IrBuilder::new(MethodDef::new(
            MethodRef::new(TypeRef::new("Lfoo/A;"), "f", "(Lfoo/B;I)V"),
            true,
        ));
        b.argument(TypeRef::new("Lfoo/B;"));
        let q = b.argument(TypeRef::new("I"));
        b.ret(None);
        let code = b.build().unwrap();

        let last = code.last_argument().unwrap();
        assert_eq!(code.instruction(last).out, Some(q));
    }

    #[test]
    fn test_unterminated_block_rejected() {
        let mut b = IrBuilder::new(test_method());
        b.argument(TypeRef::new("Lfoo/B;"));
        // No return, no successors.
        assert!(matches!(
            b.build(),
            Err(IrBuildError::UnterminatedBlock(_))
        ));
    }

    #[test]
    fn test_misplaced_argument_rejected() {
        let mut b = IrBuilder::new(test_method());
        b.synthetic_value(TypeRef::new("I"));
        b.argument(TypeRef::new("Lfoo/B;"));
        b.ret(None);
        assert!(matches!(b.build(), Err(IrBuildError::MisplacedArgument)));
    }

    #[test]
    fn test_predecessor_linking() {
        let mut b = IrBuilder::new(test_method());
        let p = b.argument(TypeRef::new("Lfoo/B;"));
        let then_block = b.new_block();
        let else_block = b.new_block();
        b.if_zero(p, then_block, else_block);
        b.switch_to(then_block);
        b.ret(None);
        b.switch_to(else_block);
        b.ret(None);
        let code = b.build().unwrap();

        assert_eq!(
            code.cfg().block(then_block).predecessors,
            vec![BlockId::ENTRY]
        );
        assert_eq!(
            code.cfg().block(else_block).predecessors,
            vec![BlockId::ENTRY]
        );
    }
}
