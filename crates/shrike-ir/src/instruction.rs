//! Register-based IR instructions.
//!
//! The instruction set is the subset the optimizer's intraprocedural analyses
//! dispatch on, plus an opaque [`InstrKind::Other`] for everything else.
//! Instructions reference values by [`ValueId`]; the arenas live in
//! [`crate::code::IrCode`].

use crate::refs::{FieldRef, MethodRef, TypeRef};
use smallvec::{smallvec, SmallVec};

/// Index of a value in a method's value arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

/// Index of an instruction in a method's instruction arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorKind {
    Enter,
    Exit,
}

/// The operation an instruction performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstrKind {
    /// Materializes the parameter with the given index. Argument
    /// instructions form the prefix of the entry block.
    Argument { index: usize },
    /// Aliases its operand under an assumption (non-null, dynamic type).
    Assume { value: ValueId },
    /// Checked cast; aliases the operand on success.
    CheckCast { object: ValueId, target: TypeRef },
    /// Conditional branch. `rhs` of `None` is a zero/null test.
    If { lhs: ValueId, rhs: Option<ValueId> },
    /// Instance field read.
    InstanceGet { object: ValueId, field: FieldRef },
    /// Instance field write.
    InstancePut {
        object: ValueId,
        value: ValueId,
        field: FieldRef,
    },
    /// `invokespecial`: constructors, private and super calls. The receiver
    /// is the first argument.
    InvokeDirect {
        method: MethodRef,
        arguments: SmallVec<[ValueId; 4]>,
    },
    InvokeInterface {
        method: MethodRef,
        arguments: SmallVec<[ValueId; 4]>,
    },
    InvokeStatic {
        method: MethodRef,
        arguments: SmallVec<[ValueId; 4]>,
    },
    InvokeVirtual {
        method: MethodRef,
        arguments: SmallVec<[ValueId; 4]>,
    },
    Monitor { object: ValueId, kind: MonitorKind },
    Return { value: Option<ValueId> },
    /// Any instruction the analyses have no dedicated rule for.
    Other { operands: SmallVec<[ValueId; 2]> },
}

/// One IR instruction: its operation and its defined value, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub id: InstrId,
    pub kind: InstrKind,
    pub out: Option<ValueId>,
}

impl Instruction {
    pub fn is_argument(&self) -> bool {
        matches!(self.kind, InstrKind::Argument { .. })
    }

    pub fn argument_index(&self) -> Option<usize> {
        match self.kind {
            InstrKind::Argument { index } => Some(index),
            _ => None,
        }
    }

    /// All value operands, in order.
    pub fn in_values(&self) -> SmallVec<[ValueId; 4]> {
        match &self.kind {
            InstrKind::Argument { .. } => smallvec![],
            InstrKind::Assume { value } => smallvec![*value],
            InstrKind::CheckCast { object, .. } => smallvec![*object],
            InstrKind::If { lhs, rhs } => {
                let mut ins = smallvec![*lhs];
                if let Some(rhs) = rhs {
                    ins.push(*rhs);
                }
                ins
            }
            InstrKind::InstanceGet { object, .. } => smallvec![*object],
            InstrKind::InstancePut { object, value, .. } => smallvec![*object, *value],
            InstrKind::InvokeDirect { arguments, .. }
            | InstrKind::InvokeInterface { arguments, .. }
            | InstrKind::InvokeStatic { arguments, .. }
            | InstrKind::InvokeVirtual { arguments, .. } => arguments.clone(),
            InstrKind::Monitor { object, .. } => smallvec![*object],
            InstrKind::Return { value } => value.iter().copied().collect(),
            InstrKind::Other { operands } => operands.iter().copied().collect(),
        }
    }

    /// The invoked method of any invoke instruction.
    pub fn invoked_method(&self) -> Option<&MethodRef> {
        match &self.kind {
            InstrKind::InvokeDirect { method, .. }
            | InstrKind::InvokeInterface { method, .. }
            | InstrKind::InvokeStatic { method, .. }
            | InstrKind::InvokeVirtual { method, .. } => Some(method),
            _ => None,
        }
    }

    /// The receiver of an instance invoke (first argument).
    pub fn receiver(&self) -> Option<ValueId> {
        match &self.kind {
            InstrKind::InvokeDirect { arguments, .. }
            | InstrKind::InvokeInterface { arguments, .. }
            | InstrKind::InvokeVirtual { arguments, .. } => arguments.first().copied(),
            _ => None,
        }
    }

    /// Arguments of an instance invoke excluding the receiver.
    pub fn non_receiver_arguments(&self) -> &[ValueId] {
        match &self.kind {
            InstrKind::InvokeDirect { arguments, .. }
            | InstrKind::InvokeInterface { arguments, .. }
            | InstrKind::InvokeVirtual { arguments, .. } => &arguments[1..],
            InstrKind::InvokeStatic { arguments, .. } => arguments,
            _ => &[],
        }
    }

    /// True for `invokespecial <init>` on some receiver.
    pub fn is_constructor_invoke(&self) -> bool {
        match &self.kind {
            InstrKind::InvokeDirect { method, .. } => method.is_instance_initializer(),
            _ => false,
        }
    }

    /// True when this instruction ends a basic block.
    pub fn is_block_terminator(&self) -> bool {
        matches!(
            self.kind,
            InstrKind::If { .. } | InstrKind::Return { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_values_ordering() {
        let put = Instruction {
            id: InstrId(0),
            kind: InstrKind::InstancePut {
                object: ValueId(3),
                value: ValueId(7),
                field: FieldRef::new(TypeRef::new("Lfoo/A;"), "f", TypeRef::new("I")),
            },
            out: None,
        };
        assert_eq!(put.in_values().as_slice(), &[ValueId(3), ValueId(7)]);
    }

    #[test]
    fn test_receiver_split() {
        let invoke = Instruction {
            id: InstrId(0),
            kind: InstrKind::InvokeVirtual {
                method: MethodRef::new(TypeRef::new("Lfoo/A;"), "f", "(I)V"),
                arguments: smallvec![ValueId(0), ValueId(1)],
            },
            out: None,
        };
        assert_eq!(invoke.receiver(), Some(ValueId(0)));
        assert_eq!(invoke.non_receiver_arguments(), &[ValueId(1)]);
    }

    #[test]
    fn test_static_invoke_has_no_receiver() {
        let invoke = Instruction {
            id: InstrId(0),
            kind: InstrKind::InvokeStatic {
                method: MethodRef::new(TypeRef::new("Lfoo/A;"), "f", "(II)V"),
                arguments: smallvec![ValueId(0), ValueId(1)],
            },
            out: None,
        };
        assert_eq!(invoke.receiver(), None);
        assert_eq!(invoke.non_receiver_arguments().len(), 2);
    }
}
