//! Tag resolution
//!
//! A type's outermost tag is its own explicit tag when it carries one,
//! otherwise the tag of the wrapped or referenced type. A CHOICE with no
//! tag of its own has no determinable tag until runtime. A reference to a
//! type that was never registered resolves to the placeholder tag so the
//! caller can keep compiling in degraded mode.

use super::types::{Type, TypeKind};

/// Tag class of the self-describing encoding rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClass {
    Universal,
    Application,
    Context,
    Private,
}

impl TagClass {
    /// Class constant name used in generated field tables
    pub fn label(self) -> &'static str {
        match self {
            TagClass::Universal => "BER_CLASS_UNI",
            TagClass::Application => "BER_CLASS_APP",
            TagClass::Context => "BER_CLASS_CON",
            TagClass::Private => "BER_CLASS_PRI",
        }
    }
}

/// Per-tag explicit/implicit mode after applying the module default
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagMode {
    Explicit,
    Implicit,
}

/// One tag: class, number, and resolved mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub class: TagClass,
    pub number: i64,
    pub mode: TagMode,
}

impl Tag {
    pub fn new(class: TagClass, number: i64, mode: TagMode) -> Self {
        Self {
            class,
            number,
            mode,
        }
    }

    pub fn context(number: i64, mode: TagMode) -> Self {
        Self::new(TagClass::Context, number, mode)
    }

    fn universal(number: i64) -> Self {
        Self::new(TagClass::Universal, number, TagMode::Implicit)
    }
}

/// Tag substituted for references to unregistered imported types
pub const DUMMY_IMPORT_TAG: Tag = Tag {
    class: TagClass::Context,
    number: 0,
    mode: TagMode::Implicit,
};

/// Resolver-side symbol lookup used while walking references
pub trait TypeLookup {
    fn lookup_type(&self, module: Option<&str>, name: &str) -> Option<&Type>;
}

/// Outcome of resolving a type's outermost tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagOutcome {
    Known(Tag),
    /// CHOICE or open type without an own tag: decided at runtime
    Indeterminate,
    /// Unregistered reference: placeholder substituted, caller raises a
    /// diagnostic
    Placeholder(Tag),
}

/// Universal tag number of a kind, if the kind has one
pub fn universal_tag(kind: &TypeKind) -> Option<i64> {
    use super::types::CharStringKind::*;
    let number = match kind {
        TypeKind::Boolean => 1,
        TypeKind::Integer { .. } => 2,
        TypeKind::BitString { .. } => 3,
        TypeKind::OctetString => 4,
        TypeKind::Null => 5,
        TypeKind::ObjectIdentifier => 6,
        TypeKind::External | TypeKind::InstanceOf { .. } => 8,
        TypeKind::Real => 9,
        TypeKind::Enumerated { .. } => 10,
        TypeKind::EmbeddedPdv => 11,
        TypeKind::RelativeOid => 13,
        TypeKind::Sequence(_) | TypeKind::SequenceOf(_) => 16,
        TypeKind::Set(_) | TypeKind::SetOf(_) => 17,
        TypeKind::CharacterString(kind) => match kind {
            Utf8 => 12,
            Numeric => 18,
            Printable => 19,
            Teletex => 20,
            Videotex => 21,
            Ia5 => 22,
            Graphic => 25,
            Visible => 26,
            General => 27,
            Universal => 28,
            Bmp => 30,
        },
        TypeKind::Choice(_)
        | TypeKind::TypeRef { .. }
        | TypeKind::Tagged { .. }
        | TypeKind::Selection { .. }
        | TypeKind::OpenType
        | TypeKind::Any => return None,
    };
    Some(number)
}

/// Resolve the outermost tag of a type
pub fn resolve_tag(ty: &Type, env: &dyn TypeLookup) -> TagOutcome {
    resolve_tag_depth(ty, env, 0)
}

// Reference chains are finite in well-formed input; the depth guard keeps
// a reference cycle from hanging resolution.
const MAX_REF_DEPTH: usize = 64;

fn resolve_tag_depth(ty: &Type, env: &dyn TypeLookup, depth: usize) -> TagOutcome {
    if depth > MAX_REF_DEPTH {
        return TagOutcome::Indeterminate;
    }

    if let Some(tag) = ty.tags.first() {
        return TagOutcome::Known(*tag);
    }

    match &ty.kind {
        TypeKind::Tagged { tag, .. } => TagOutcome::Known(*tag),

        TypeKind::TypeRef { module, name } => match env.lookup_type(module.as_deref(), name) {
            Some(target) => resolve_tag_depth(target, env, depth + 1),
            None => TagOutcome::Placeholder(DUMMY_IMPORT_TAG),
        },

        TypeKind::Selection { field, inner } => resolve_selection(field, inner, env, depth),

        TypeKind::Choice(_) | TypeKind::OpenType | TypeKind::Any => TagOutcome::Indeterminate,

        kind => match universal_tag(kind) {
            Some(number) => TagOutcome::Known(Tag::universal(number)),
            None => TagOutcome::Indeterminate,
        },
    }
}

/// A selection type takes the tag of the selected CHOICE arm
fn resolve_selection(
    field: &str,
    inner: &Type,
    env: &dyn TypeLookup,
    depth: usize,
) -> TagOutcome {
    let target = match &inner.kind {
        TypeKind::TypeRef { module, name } => match env.lookup_type(module.as_deref(), name) {
            Some(t) => t,
            None => return TagOutcome::Placeholder(DUMMY_IMPORT_TAG),
        },
        _ => inner,
    };

    if let TypeKind::Choice(list) = &target.kind {
        if let Some(member) = list.members().find(|m| m.name == field) {
            return resolve_tag_depth(&member.ty, env, depth + 1);
        }
    }
    TagOutcome::Indeterminate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::{Component, ComponentList, Member};
    use std::collections::HashMap;

    struct Env(HashMap<String, Type>);

    impl TypeLookup for Env {
        fn lookup_type(&self, _module: Option<&str>, name: &str) -> Option<&Type> {
            self.0.get(name)
        }
    }

    fn empty_env() -> Env {
        Env(HashMap::new())
    }

    #[test]
    fn test_explicit_tag_wins() {
        let ty = Type::new(TypeKind::OctetString)
            .with_tag(Tag::new(TagClass::Application, 5, TagMode::Explicit));
        let out = resolve_tag(&ty, &empty_env());
        assert_eq!(
            out,
            TagOutcome::Known(Tag::new(TagClass::Application, 5, TagMode::Explicit))
        );
    }

    #[test]
    fn test_universal_tag_for_builtin() {
        let ty = Type::new(TypeKind::Integer { named: vec![] });
        match resolve_tag(&ty, &empty_env()) {
            TagOutcome::Known(tag) => {
                assert_eq!(tag.class, TagClass::Universal);
                assert_eq!(tag.number, 2);
            }
            other => panic!("expected known tag, got {:?}", other),
        }
    }

    #[test]
    fn test_untagged_choice_is_indeterminate() {
        let choice = Type::new(TypeKind::Choice(ComponentList::new(vec![
            Component::Member(Member::new("a", Type::new(TypeKind::Boolean))),
        ])));
        assert_eq!(resolve_tag(&choice, &empty_env()), TagOutcome::Indeterminate);
    }

    #[test]
    fn test_reference_delegates_to_target() {
        let mut defs = HashMap::new();
        defs.insert(
            "Inner".to_string(),
            Type::new(TypeKind::Boolean).with_tag(Tag::context(3, TagMode::Implicit)),
        );
        let ty = Type::reference("Inner");
        assert_eq!(
            resolve_tag(&ty, &Env(defs)),
            TagOutcome::Known(Tag::context(3, TagMode::Implicit))
        );
    }

    #[test]
    fn test_unregistered_reference_gets_placeholder() {
        let ty = Type::reference("NotThere");
        assert_eq!(
            resolve_tag(&ty, &empty_env()),
            TagOutcome::Placeholder(DUMMY_IMPORT_TAG)
        );
    }

    #[test]
    fn test_selection_takes_arm_tag() {
        let mut defs = HashMap::new();
        defs.insert(
            "Pick".to_string(),
            Type::new(TypeKind::Choice(ComponentList::new(vec![
                Component::Member(Member::new(
                    "left",
                    Type::new(TypeKind::Null).with_tag(Tag::context(0, TagMode::Implicit)),
                )),
                Component::Member(Member::new(
                    "right",
                    Type::new(TypeKind::Boolean).with_tag(Tag::context(1, TagMode::Implicit)),
                )),
            ]))),
        );
        let ty = Type::new(TypeKind::Selection {
            field: "right".to_string(),
            inner: Box::new(Type::reference("Pick")),
        });
        assert_eq!(
            resolve_tag(&ty, &Env(defs)),
            TagOutcome::Known(Tag::context(1, TagMode::Implicit))
        );
    }
}
