//! AST node model for the specification language
//!
//! A parsed specification is a list of [`Module`]s, each holding ordered
//! [`Assignment`]s of types, values, object classes, and objects. Modules
//! are created once by the frontend (or directly by tests) and are
//! immutable afterward; the registration engine never mutates them.
//!
//! The per-node concerns the rest of the compiler needs — tag resolution,
//! canonical naming of anonymous types, constraint bound extraction — are
//! exhaustive match functions in [`tags`], [`naming`], and
//! [`constraints`], not methods dispatched per node.

mod classes;
mod constraints;
mod naming;
mod tags;
mod types;
mod values;

pub use classes::{FieldSpec, Object, ObjectClass, ObjectFieldSetting};
pub use constraints::{size_bounds, value_bounds, Bound, Bounds, Constraint};
pub use naming::{
    element_type_name, member_type_name, range_suffix, sanitize, size_suffix, untagged_type_name,
};
pub use tags::{
    resolve_tag, universal_tag, Tag, TagClass, TagMode, TagOutcome, TypeLookup, DUMMY_IMPORT_TAG,
};
pub use types::{CharStringKind, Component, ComponentList, Member, NamedNumber, Type, TypeKind};
pub use values::{oid_to_string, OidComponent, Value};

use crate::common::Span;

/// Module-level tagging default from the DEFINITIONS header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagDefault {
    #[default]
    Explicit,
    Implicit,
    Automatic,
}

/// Symbols imported from one other module
#[derive(Debug, Clone)]
pub struct SymbolsFrom {
    pub module: String,
    pub symbols: Vec<String>,
    pub span: Span,
}

/// Export clause of a module
#[derive(Debug, Clone, Default)]
pub enum Exports {
    /// No EXPORTS clause, or `EXPORTS ALL`
    #[default]
    All,
    Symbols(Vec<String>),
}

impl Exports {
    pub fn contains(&self, name: &str) -> bool {
        match self {
            Exports::All => true,
            Exports::Symbols(list) => list.iter().any(|s| s == name),
        }
    }
}

/// One specification module: name, tagging default, target protocol,
/// ordered assignments, imports, exports
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub tag_default: TagDefault,
    /// Target protocol abbreviation; filled from directives or the
    /// driver when the module itself does not determine one
    pub proto: Option<String>,
    pub assignments: Vec<Assignment>,
    pub imports: Vec<SymbolsFrom>,
    pub exports: Exports,
    pub span: Span,
}

impl Module {
    pub fn new(name: impl Into<String>, tag_default: TagDefault) -> Self {
        Self {
            name: name.into(),
            tag_default,
            proto: None,
            assignments: Vec::new(),
            imports: Vec::new(),
            exports: Exports::All,
            span: Span::default(),
        }
    }
}

/// One declared name bound to a type, value, class, or object
#[derive(Debug, Clone)]
pub struct Assignment {
    pub name: String,
    pub kind: AssignmentKind,
    pub span: Span,
}

impl Assignment {
    pub fn new(name: impl Into<String>, kind: AssignmentKind, span: Span) -> Self {
        Self {
            name: name.into(),
            kind,
            span,
        }
    }
}

#[derive(Debug, Clone)]
pub enum AssignmentKind {
    Type(Type),
    Value { ty: Type, value: Value },
    ObjectClass(ObjectClass),
    Object(Object),
}
