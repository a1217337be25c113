//! Compiled type and field records
//!
//! One [`TypeRecord`] exists per emitted type: every distinct (referenced
//! type, structural modifier) pair maps to exactly one record, and every
//! source path collapsed into it is kept as a back-reference. One
//! [`FieldRecord`] exists per distinct (underlying compiled type,
//! attribute-override) pair at any usage site. Records are created during
//! registration, mutated only by adding references and flags, and frozen
//! before code generation.

use crate::ast::{Bound, Bounds, Component, Tag, TagMode, Type, TypeKind};
use crate::directive::FlagOpt;
use string_interner::DefaultSymbol;

pub type RecordId = usize;

/// One compiled type
#[derive(Debug, Clone)]
pub struct TypeRecord {
    pub id: RecordId,
    /// Canonical generated identifier, unique across the run
    pub ident: DefaultSymbol,
    /// Protocol abbreviation of the registering module
    pub proto: String,
    /// Normalized structural form: child types replaced by references to
    /// their own records
    pub ty: Type,
    /// Every source path collapsed into this record; `refs[0]` is the
    /// first original declaration path
    pub refs: Vec<String>,
    /// Source names of records this one references
    pub deps: Vec<String>,
    /// Whether dissection opens a collapsible subtree (ett entry)
    pub need_tree: bool,
    /// Resolved outermost tag; `None` means runtime determination
    pub ber_tag: Option<Tag>,
    pub exported: Option<FlagOpt>,
    pub no_emit: Option<FlagOpt>,
    pub user_defined: bool,
    /// Emit named values as numeric defines
    pub enum_values: bool,
    /// Structural identity; two records may never share an identifier
    /// unless their fingerprints match
    pub fingerprint: String,
}

impl TypeRecord {
    /// Append a back-reference; re-registration of a known path is a no-op
    pub fn add_ref(&mut self, path: &str) {
        if !self.refs.iter().any(|r| r == path) {
            self.refs.push(path.to_string());
        }
    }

    pub fn suppresses_type(&self) -> bool {
        self.no_emit.is_some_and(|f| f.types)
    }

    pub fn suppresses_values(&self) -> bool {
        self.no_emit.is_some_and(|f| f.values)
    }
}

/// Display attributes of one field (hf entry)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAttrs {
    pub name: String,
    pub abbrev: String,
    pub ftype: String,
    pub display: String,
    pub strings: Option<String>,
    pub bitmask: String,
}

impl FieldAttrs {
    /// Stable text form used in dedup keys
    pub fn canonical(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.name,
            self.abbrev,
            self.ftype,
            self.display,
            self.strings.as_deref().unwrap_or("-"),
            self.bitmask
        )
    }
}

/// One compiled field
#[derive(Debug, Clone)]
pub struct FieldRecord {
    pub id: usize,
    /// Generated hf identifier
    pub ident: DefaultSymbol,
    /// Protocol abbreviation of the registering module
    pub proto: String,
    /// Identifier of the underlying compiled type
    pub type_name: String,
    pub attrs: FieldAttrs,
    pub refs: Vec<String>,
}

impl FieldRecord {
    pub fn add_ref(&mut self, path: &str) {
        if !self.refs.iter().any(|r| r == path) {
            self.refs.push(path.to_string());
        }
    }
}

/// Stable structural identity of a type, ignoring spans and source
/// positions. Two types with equal fingerprints may share one record.
pub fn fingerprint(ty: &Type) -> String {
    let mut out = String::new();
    render(ty, &mut out);
    out
}

fn render(ty: &Type, out: &mut String) {
    for tag in &ty.tags {
        render_tag(tag, out);
    }
    match &ty.kind {
        TypeKind::Boolean => out.push_str("BOOLEAN"),
        TypeKind::Integer { named } => {
            out.push_str("INTEGER");
            render_named(named.iter().map(|n| (n.name.as_str(), n.value)), out);
        }
        TypeKind::Enumerated { items, extensible } => {
            out.push_str("ENUMERATED");
            if *extensible {
                out.push('+');
            }
            render_named(items.iter().map(|n| (n.name.as_str(), n.value)), out);
        }
        TypeKind::Real => out.push_str("REAL"),
        TypeKind::BitString { named } => {
            out.push_str("BITSTRING");
            render_named(named.iter().map(|n| (n.name.as_str(), n.value)), out);
        }
        TypeKind::OctetString => out.push_str("OCTETSTRING"),
        TypeKind::Null => out.push_str("NULL"),
        TypeKind::Sequence(list) => render_list("SEQ", list.components.iter(), out),
        TypeKind::Set(list) => render_list("SET", list.components.iter(), out),
        TypeKind::Choice(list) => render_list("CHOICE", list.components.iter(), out),
        TypeKind::SequenceOf(inner) => {
            out.push_str("SEQOF<");
            render(inner, out);
            out.push('>');
        }
        TypeKind::SetOf(inner) => {
            out.push_str("SETOF<");
            render(inner, out);
            out.push('>');
        }
        TypeKind::TypeRef { module, name } => {
            out.push_str("REF:");
            if let Some(m) = module {
                out.push_str(m);
                out.push('.');
            }
            out.push_str(name);
        }
        TypeKind::Tagged { tag, inner } => {
            render_tag(tag, out);
            render(inner, out);
        }
        TypeKind::Selection { field, inner } => {
            out.push_str("SEL:");
            out.push_str(field);
            out.push('<');
            render(inner, out);
            out.push('>');
        }
        TypeKind::CharacterString(kind) => out.push_str(kind.keyword()),
        TypeKind::ObjectIdentifier => out.push_str("OID"),
        TypeKind::RelativeOid => out.push_str("RELOID"),
        TypeKind::OpenType => out.push_str("OPEN"),
        TypeKind::EmbeddedPdv => out.push_str("PDV"),
        TypeKind::External => out.push_str("EXTERNAL"),
        TypeKind::InstanceOf { class } => {
            out.push_str("INSTANCEOF:");
            out.push_str(class);
        }
        TypeKind::Any => out.push_str("ANY"),
    }
    render_bounds(ty, out);
}

fn render_tag(tag: &Tag, out: &mut String) {
    let class = match tag.class {
        crate::ast::TagClass::Universal => 'U',
        crate::ast::TagClass::Application => 'A',
        crate::ast::TagClass::Context => 'C',
        crate::ast::TagClass::Private => 'P',
    };
    let mode = if tag.mode == TagMode::Explicit { 'e' } else { 'i' };
    out.push('[');
    out.push(class);
    out.push_str(&tag.number.to_string());
    out.push(mode);
    out.push(']');
}

fn render_named<'a>(named: impl Iterator<Item = (&'a str, Option<i64>)>, out: &mut String) {
    out.push('{');
    for (name, value) in named {
        out.push_str(name);
        if let Some(v) = value {
            out.push('=');
            out.push_str(&v.to_string());
        }
        out.push(',');
    }
    out.push('}');
}

fn render_list<'a>(
    label: &str,
    components: impl Iterator<Item = &'a Component>,
    out: &mut String,
) {
    out.push_str(label);
    out.push('{');
    for component in components {
        match component {
            Component::Member(m) => {
                out.push_str(&m.name);
                if m.optional {
                    out.push('?');
                }
                out.push(':');
                render(&m.ty, out);
            }
            Component::ComponentsOf(t) => {
                out.push_str("COF:");
                render(t, out);
            }
            Component::ExtensionMarker => out.push_str("..."),
        }
        out.push(',');
    }
    out.push('}');
}

fn render_bounds(ty: &Type, out: &mut String) {
    let size = crate::ast::size_bounds(ty.constraint.as_ref());
    let value = crate::ast::value_bounds(ty.constraint.as_ref());
    if !size.is_open() {
        out.push_str("(sz");
        render_bound_pair(&size, out);
        out.push(')');
    }
    if !value.is_open() {
        out.push_str("(v");
        render_bound_pair(&value, out);
        out.push(')');
    }
}

fn render_bound_pair(bounds: &Bounds, out: &mut String) {
    let part = |b: Bound| match b {
        Bound::Open => "x".to_string(),
        Bound::Fixed(n) => n.to_string(),
    };
    out.push_str(&part(bounds.lo));
    out.push_str("..");
    out.push_str(&part(bounds.hi));
    if bounds.extensible {
        out.push('+');
    }
}
