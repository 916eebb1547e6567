//! Descriptor-based references to types, fields and methods.
//!
//! References are immutable, hashable and cheap to clone. They use JVM-style
//! descriptors (`Lfoo/Bar;`, `I`, `[I`) so they can be persisted in
//! optimization info independently of any in-memory IR.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A type reference identified by its descriptor string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeRef(String);

impl TypeRef {
    pub fn new(descriptor: impl Into<String>) -> Self {
        TypeRef(descriptor.into())
    }

    /// The `java.lang.Object` type.
    pub fn object() -> Self {
        TypeRef("Ljava/lang/Object;".to_string())
    }

    pub fn descriptor(&self) -> &str {
        &self.0
    }

    /// Class types have an `L<binary-name>;` descriptor.
    pub fn is_class_type(&self) -> bool {
        self.0.starts_with('L')
    }

    pub fn is_array_type(&self) -> bool {
        self.0.starts_with('[')
    }

    pub fn is_primitive(&self) -> bool {
        !self.is_class_type() && !self.is_array_type()
    }

    pub fn is_object(&self) -> bool {
        self.0 == "Ljava/lang/Object;"
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A field reference: holder type, field name, field type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldRef {
    pub holder: TypeRef,
    pub name: String,
    pub ty: TypeRef,
}

impl FieldRef {
    pub fn new(holder: TypeRef, name: impl Into<String>, ty: TypeRef) -> Self {
        FieldRef {
            holder,
            name: name.into(),
            ty,
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}:{}", self.holder, self.name, self.ty)
    }
}

/// A method reference: holder type, method name, proto descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodRef {
    pub holder: TypeRef,
    pub name: String,
    /// Proto descriptor, e.g. `(ILjava/lang/String;)V`.
    pub proto: String,
}

impl MethodRef {
    pub fn new(holder: TypeRef, name: impl Into<String>, proto: impl Into<String>) -> Self {
        MethodRef {
            holder,
            name: name.into(),
            proto: proto.into(),
        }
    }

    /// The `java.util.Objects#requireNonNull(Object)` reference, which the
    /// analysis treats as a transparent null check.
    pub fn require_non_null() -> Self {
        MethodRef::new(
            TypeRef::new("Ljava/util/Objects;"),
            "requireNonNull",
            "(Ljava/lang/Object;)Ljava/lang/Object;",
        )
    }

    pub fn is_instance_initializer(&self) -> bool {
        self.name == "<init>"
    }

    pub fn is_class_initializer(&self) -> bool {
        self.name == "<clinit>"
    }

    /// Number of declared parameters (receiver excluded), parsed from the
    /// proto descriptor.
    pub fn parameter_count(&self) -> usize {
        let params = self
            .proto
            .strip_prefix('(')
            .and_then(|rest| rest.split(')').next())
            .unwrap_or("");
        let mut count = 0;
        let mut chars = params.chars();
        while let Some(c) = chars.next() {
            match c {
                '[' => continue,
                'L' => {
                    for c in chars.by_ref() {
                        if c == ';' {
                            break;
                        }
                    }
                    count += 1;
                }
                _ => count += 1,
            }
        }
        count
    }

    /// Return type descriptor from the proto.
    pub fn return_type(&self) -> TypeRef {
        let ret = self.proto.split(')').nth(1).unwrap_or("V");
        TypeRef::new(ret)
    }

    pub fn returns_void(&self) -> bool {
        self.return_type().descriptor() == "V"
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}{}", self.holder, self.name, self.proto)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_classification() {
        assert!(TypeRef::new("Lfoo/Bar;").is_class_type());
        assert!(TypeRef::new("[I").is_array_type());
        assert!(TypeRef::new("I").is_primitive());
        assert!(TypeRef::object().is_object());
        assert!(!TypeRef::new("[Lfoo/Bar;").is_class_type());
    }

    #[test]
    fn test_parameter_count_parsing() {
        let m = MethodRef::new(TypeRef::new("Lfoo/Bar;"), "f", "(ILjava/lang/String;[JD)V");
        assert_eq!(m.parameter_count(), 4);
        assert!(m.returns_void());

        let nullary = MethodRef::new(TypeRef::new("Lfoo/Bar;"), "g", "()I");
        assert_eq!(nullary.parameter_count(), 0);
        assert_eq!(nullary.return_type(), TypeRef::new("I"));
    }

    #[test]
    fn test_references_round_trip_serde() {
        let field = FieldRef::new(TypeRef::new("Lfoo/Bar;"), "f", TypeRef::new("I"));
        let json = serde_json::to_string(&field).unwrap();
        assert_eq!(serde_json::from_str::<FieldRef>(&json).unwrap(), field);

        let method = MethodRef::new(TypeRef::new("Lfoo/Bar;"), "g", "(I)V");
        let json = serde_json::to_string(&method).unwrap();
        assert_eq!(serde_json::from_str::<MethodRef>(&json).unwrap(), method);
    }

    #[test]
    fn test_initializer_names() {
        let init = MethodRef::new(TypeRef::new("Lfoo/Bar;"), "<init>", "()V");
        assert!(init.is_instance_initializer());
        assert!(!init.is_class_initializer());

        let clinit = MethodRef::new(TypeRef::new("Lfoo/Bar;"), "<clinit>", "()V");
        assert!(clinit.is_class_initializer());
    }
}
