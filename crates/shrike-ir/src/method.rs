//! Method descriptors.

use crate::refs::MethodRef;

/// A method being compiled: its reference plus the flags the analyses
/// dispatch on.
#[derive(Debug, Clone)]
pub struct MethodDef {
    reference: MethodRef,
    is_static: bool,
}

impl MethodDef {
    pub fn new(reference: MethodRef, is_static: bool) -> Self {
        MethodDef {
            reference,
            is_static,
        }
    }

    pub fn reference(&self) -> &MethodRef {
        &self.reference
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn is_instance_initializer(&self) -> bool {
        !self.is_static && self.reference.is_instance_initializer()
    }

    pub fn is_class_initializer(&self) -> bool {
        self.is_static && self.reference.is_class_initializer()
    }

    /// Number of IR arguments, receiver included for instance methods.
    pub fn argument_count(&self) -> usize {
        self.reference.parameter_count() + usize::from(!self.is_static)
    }
}
