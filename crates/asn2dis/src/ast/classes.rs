//! Information object class nodes
//!
//! Models the parameterized object-class system: a CLASS declares typed
//! field specs, an object supplies settings for them. Open types in
//! ordinary components reference class type fields.

use super::types::Type;
use super::values::Value;
use crate::common::Span;

/// An information object class assignment
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectClass {
    pub name: Option<String>,
    pub fields: Vec<FieldSpec>,
    /// WITH SYNTAX literal words, kept verbatim for diagnostics
    pub syntax: Vec<String>,
    pub span: Span,
}

impl ObjectClass {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self {
            name: None,
            fields,
            syntax: Vec::new(),
            span: Span::default(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name() == name)
    }
}

/// One field spec of an object class
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSpec {
    /// `&TypeField` — an open type slot
    Type { name: String, optional: bool },
    /// `&valueField FixedType [UNIQUE]`
    FixedTypeValue {
        name: String,
        ty: Type,
        unique: bool,
        optional: bool,
    },
    /// `&objectField CLASS-NAME`
    Object {
        name: String,
        class: String,
        optional: bool,
    },
}

impl FieldSpec {
    pub fn name(&self) -> &str {
        match self {
            FieldSpec::Type { name, .. }
            | FieldSpec::FixedTypeValue { name, .. }
            | FieldSpec::Object { name, .. } => name,
        }
    }

    pub fn is_optional(&self) -> bool {
        match self {
            FieldSpec::Type { optional, .. }
            | FieldSpec::FixedTypeValue { optional, .. }
            | FieldSpec::Object { optional, .. } => *optional,
        }
    }
}

/// An object assignment: settings for each field of its class
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub class: String,
    pub fields: Vec<(String, ObjectFieldSetting)>,
    pub span: Span,
}

impl Object {
    pub fn new(class: impl Into<String>, fields: Vec<(String, ObjectFieldSetting)>) -> Self {
        Self {
            class: class.into(),
            fields,
            span: Span::default(),
        }
    }

    pub fn setting(&self, field: &str) -> Option<&ObjectFieldSetting> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, s)| s)
    }
}

/// Setting supplied by an object for one class field
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectFieldSetting {
    Type(Type),
    Value(Value),
}
