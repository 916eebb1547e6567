//! Class hierarchy and resolution oracle.
//!
//! [`AppView`] answers the resolution queries the analyses depend on:
//! definition lookup, unique field resolution, unique method resolution, and
//! the per-constructor escape summary used when reasoning about forwarding
//! constructor calls.

use crate::refs::{FieldRef, MethodRef, TypeRef};
use std::collections::{HashMap, HashSet};

/// Which part of the compilation unit a class belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    /// A class being compiled; its layout is under our control.
    Program,
    /// A classpath class: visible, but not rewritable.
    Classpath,
    /// A library (platform) class.
    Library,
}

/// A class definition as seen by the optimizer.
#[derive(Debug, Clone)]
pub struct ClassDef {
    pub ty: TypeRef,
    pub kind: ClassKind,
    pub super_type: Option<TypeRef>,
    pub is_interface: bool,
}

impl ClassDef {
    pub fn new(ty: TypeRef, kind: ClassKind, super_type: Option<TypeRef>) -> Self {
        ClassDef {
            ty,
            kind,
            super_type,
            is_interface: false,
        }
    }

    pub fn interface(ty: TypeRef, kind: ClassKind) -> Self {
        ClassDef {
            ty,
            kind,
            super_type: Some(TypeRef::object()),
            is_interface: true,
        }
    }

    pub fn is_program_class(&self) -> bool {
        self.kind == ClassKind::Program
    }
}

/// Summary of an instance initializer, computed when the constructor itself
/// was analyzed. Conservative defaults apply to constructors without a
/// summary.
#[derive(Debug, Clone, Copy)]
pub struct InstanceInitializerInfo {
    pub receiver_may_escape_outside_constructor_chain: bool,
}

impl Default for InstanceInitializerInfo {
    fn default() -> Self {
        // Unknown constructors must be assumed to leak the receiver.
        InstanceInitializerInfo {
            receiver_may_escape_outside_constructor_chain: true,
        }
    }
}

impl InstanceInitializerInfo {
    pub fn non_escaping() -> Self {
        InstanceInitializerInfo {
            receiver_may_escape_outside_constructor_chain: false,
        }
    }
}

/// The result of a unique method resolution.
#[derive(Debug, Clone)]
pub struct ResolvedMethod {
    pub reference: MethodRef,
    pub initializer_info: InstanceInitializerInfo,
}

/// Read-only view of the classes, fields and methods visible to the
/// compilation, with resolution queries.
///
/// Only uniquely-resolvable members are registered; a failed lookup models
/// the "no single resolution" case that forces analyses to give up on the
/// involved value.
#[derive(Debug)]
pub struct AppView {
    classes: HashMap<TypeRef, ClassDef>,
    fields: HashSet<FieldRef>,
    methods: HashMap<MethodRef, ResolvedMethod>,
    require_non_null: MethodRef,
}

impl AppView {
    pub fn new() -> Self {
        AppView {
            classes: HashMap::new(),
            fields: HashSet::new(),
            methods: HashMap::new(),
            require_non_null: MethodRef::require_non_null(),
        }
    }

    pub fn add_class(&mut self, class: ClassDef) -> &mut Self {
        self.classes.insert(class.ty.clone(), class);
        self
    }

    /// Register a field with a unique resolution.
    pub fn add_field(&mut self, field: FieldRef) -> &mut Self {
        self.fields.insert(field);
        self
    }

    /// Register a method with a unique resolution.
    pub fn add_method(&mut self, method: MethodRef) -> &mut Self {
        let info = InstanceInitializerInfo::default();
        self.methods.insert(
            method.clone(),
            ResolvedMethod {
                reference: method,
                initializer_info: info,
            },
        );
        self
    }

    /// Register a method with an explicit initializer summary.
    pub fn add_method_with_initializer_info(
        &mut self,
        method: MethodRef,
        info: InstanceInitializerInfo,
    ) -> &mut Self {
        self.methods.insert(
            method.clone(),
            ResolvedMethod {
                reference: method,
                initializer_info: info,
            },
        );
        self
    }

    pub fn definition_for(&self, ty: &TypeRef) -> Option<&ClassDef> {
        self.classes.get(ty)
    }

    /// Resolve a field reference to its unique definition, if any.
    pub fn resolve_field(&self, field: &FieldRef) -> Option<&FieldRef> {
        self.fields.get(field)
    }

    /// Resolve a method reference to its unique definition, if any.
    pub fn resolve_method(&self, method: &MethodRef) -> Option<&ResolvedMethod> {
        self.methods.get(method)
    }

    /// True when `method` resolves to `Objects.requireNonNull`.
    pub fn resolves_to_require_non_null(&self, method: &MethodRef) -> bool {
        self.resolve_method(method)
            .is_some_and(|resolved| resolved.reference == self.require_non_null)
    }
}

impl Default for AppView {
    fn default() -> Self {
        Self::new()
    }
}
