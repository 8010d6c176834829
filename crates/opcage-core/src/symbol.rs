//! Fully qualified symbol references.
//!
//! Every external reference in a program image is a fully resolved name;
//! there is no ambient resolution step anywhere in the sandbox.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of a member reference, carried in denials for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    Method,
    Field,
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberKind::Method => f.write_str("method"),
            MemberKind::Field => f.write_str("field"),
        }
    }
}

/// Reference to a type by namespace and local name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeRef {
    pub namespace: String,
    pub name: String,
}

impl TypeRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Built-in integer type of the guest language. Policies whitelist the
    /// `lang` namespace like any other; default-deny has no primitive
    /// carve-out.
    pub fn int() -> Self {
        Self::new("lang", "int")
    }

    /// Built-in void type, used as the return type of value-less methods.
    pub fn void() -> Self {
        Self::new("lang", "void")
    }

    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// Reference to a method on an external type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodRef {
    pub declaring: TypeRef,
    pub name: String,
    /// Number of arguments popped at the call site.
    pub params: u16,
    pub returns: TypeRef,
}

impl MethodRef {
    pub fn new(declaring: TypeRef, name: impl Into<String>, params: u16, returns: TypeRef) -> Self {
        Self {
            declaring,
            name: name.into(),
            params,
            returns,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}::{}", self.declaring.full_name(), self.name)
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// Reference to a field on an external type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRef {
    pub declaring: TypeRef,
    pub name: String,
    pub field_type: TypeRef,
}

impl FieldRef {
    pub fn new(declaring: TypeRef, name: impl Into<String>, field_type: TypeRef) -> Self {
        Self {
            declaring,
            name: name.into(),
            field_type,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}::{}", self.declaring.full_name(), self.name)
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}
