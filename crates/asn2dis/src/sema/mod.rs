//! Semantic registration engine
//!
//! Consumes ordered modules plus the directive tables and produces the
//! finalized compilation context the backend reads. Registration walks
//! assignments in declaration order, strips explicit tags into wrapper
//! records, applies automatic tagging, expands COMPONENTS OF (with one
//! deferred retry for forward references), and binds every type usage to
//! a deduplicated compiled record. `finalize` resolves imports and tags,
//! orders the record graph, and freezes the context.
//!
//! The context is an explicitly constructed, explicitly passed value;
//! independent invocations never share state.

pub mod depgraph;
mod records;

pub use depgraph::Resolution;
pub use records::{fingerprint, FieldAttrs, FieldRecord, RecordId, TypeRecord};

use crate::ast::{
    element_type_name, member_type_name, range_suffix, resolve_tag, sanitize, size_bounds,
    size_suffix, untagged_type_name, value_bounds, Component, ComponentList, Exports, Member,
    Module, NamedNumber, Object, ObjectClass, Tag, TagDefault, TagMode, TagOutcome, Type,
    TypeKind, TypeLookup, Value,
};
use crate::common::{CompileError, CompileResult, Diagnostics};
use crate::directive::DirectiveSet;
use std::collections::{BTreeSet, HashMap, HashSet};
use string_interner::backend::StringBackend;
use string_interner::{DefaultSymbol, StringInterner};

/// One registered module
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub name: String,
    pub proto: String,
    pub tag_default: TagDefault,
    pub imports: Vec<String>,
    pub export_list: Vec<String>,
}

/// Registration scope carried while walking one module
#[derive(Debug, Clone)]
struct RegEnv {
    module_idx: usize,
    proto: String,
    tag_default: TagDefault,
}

/// A COMPONENTS OF pseudo-member awaiting its forward-referenced target
#[derive(Debug, Clone)]
struct PendingExpansion {
    record: RecordId,
    path: String,
    module_idx: usize,
}

/// One value assignment kept for the numeric-define fragment
#[derive(Debug, Clone)]
pub struct ValueDef {
    pub name: String,
    pub value: Value,
    pub proto: String,
}

/// The compilation context: symbol tables, compiled records, emission
/// order, and collected diagnostics
pub struct Context {
    interner: StringInterner<StringBackend>,
    pub types: Vec<TypeRecord>,
    pub fields: Vec<FieldRecord>,
    pub modules: Vec<ModuleInfo>,
    /// Ordered value assignments for the numeric-define fragment
    pub value_defs: Vec<ValueDef>,
    pub object_defs: Vec<(String, Object)>,
    pub diags: Diagnostics,
    /// Record ids in dependency order; valid after `finalize`
    pub emission: Vec<RecordId>,
    pub cycles: Vec<Vec<RecordId>>,
    /// Records requiring a forward declaration
    pub forward_decls: BTreeSet<RecordId>,
    /// Records pulled into emission by the export closure
    pub required_by_export: BTreeSet<RecordId>,

    by_ident: HashMap<String, RecordId>,
    name_to_record: HashMap<String, RecordId>,
    field_keys: HashMap<String, usize>,
    field_idents: HashMap<String, usize>,
    type_defs: HashMap<String, Type>,
    class_defs: HashMap<String, ObjectClass>,
    import_origin: HashMap<String, String>,
    assignment_names: HashSet<String>,
    pending: Vec<PendingExpansion>,
    missing_reported: HashSet<String>,
    frozen: bool,
    default_proto: Option<String>,
}

impl Context {
    pub fn new() -> Self {
        Self::with_default_proto(None)
    }

    /// `default_proto` overrides the derived per-module protocol
    /// abbreviation when no directive mapping exists
    pub fn with_default_proto(default_proto: Option<String>) -> Self {
        Self {
            default_proto,
            interner: StringInterner::new(),
            types: Vec::new(),
            fields: Vec::new(),
            modules: Vec::new(),
            value_defs: Vec::new(),
            object_defs: Vec::new(),
            diags: Diagnostics::new(),
            emission: Vec::new(),
            cycles: Vec::new(),
            forward_decls: BTreeSet::new(),
            required_by_export: BTreeSet::new(),
            by_ident: HashMap::new(),
            name_to_record: HashMap::new(),
            field_keys: HashMap::new(),
            field_idents: HashMap::new(),
            type_defs: HashMap::new(),
            class_defs: HashMap::new(),
            import_origin: HashMap::new(),
            assignment_names: HashSet::new(),
            pending: Vec::new(),
            missing_reported: HashSet::new(),
            frozen: false,
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn ident_str(&self, sym: DefaultSymbol) -> &str {
        self.interner.resolve(sym).expect("interned symbol")
    }

    pub fn record(&self, id: RecordId) -> &TypeRecord {
        &self.types[id]
    }

    pub fn record_by_name(&self, name: &str) -> Option<&TypeRecord> {
        self.name_to_record.get(name).map(|&id| &self.types[id])
    }

    pub fn record_id_by_name(&self, name: &str) -> Option<RecordId> {
        self.name_to_record.get(name).copied()
    }

    pub fn object_class(&self, name: &str) -> Option<&ObjectClass> {
        self.class_defs.get(name)
    }

    /// Field record registered at `path`, if any
    pub fn field_by_path(&self, path: &str) -> Option<&FieldRecord> {
        self.fields
            .iter()
            .find(|f| f.refs.iter().any(|r| r == path))
    }

    /// Records module→protocol mapping, enqueues import edges, and walks
    /// the module's assignments in declaration order
    pub fn register_module(
        &mut self,
        module: &Module,
        directives: &mut DirectiveSet,
    ) -> CompileResult<()> {
        if self.frozen {
            return Err(CompileError::semantic(
                "context is frozen",
                module.name.clone(),
            ));
        }

        let proto = directives
            .modules
            .use_item(&module.name)
            .and_then(|m| m.proto.clone())
            .or_else(|| module.proto.clone())
            .or_else(|| self.default_proto.clone())
            .unwrap_or_else(|| sanitize(&module.name).to_lowercase());

        let export_list = match &module.exports {
            Exports::Symbols(list) => list.clone(),
            Exports::All => Vec::new(),
        };

        let module_idx = self.modules.len();
        self.modules.push(ModuleInfo {
            name: module.name.clone(),
            proto: proto.clone(),
            tag_default: module.tag_default,
            imports: module.imports.iter().map(|i| i.module.clone()).collect(),
            export_list,
        });

        for import in &module.imports {
            for symbol in &import.symbols {
                self.import_origin
                    .insert(symbol.clone(), import.module.clone());
            }
        }

        let env = RegEnv {
            module_idx,
            proto,
            tag_default: module.tag_default,
        };

        for assignment in &module.assignments {
            if !self.assignment_names.insert(assignment.name.clone()) {
                return Err(CompileError::semantic(
                    format!("duplicate assignment name '{}'", assignment.name),
                    format!("{}/{}", module.name, assignment.name),
                ));
            }
            let path = format!("{}/{}", module.name, assignment.name);
            match &assignment.kind {
                crate::ast::AssignmentKind::Type(ty) => {
                    self.type_defs.insert(assignment.name.clone(), ty.clone());
                    self.register_type(&path, ty, &assignment.name, &env, directives);
                }
                crate::ast::AssignmentKind::Value { value, .. } => {
                    self.value_defs.push(ValueDef {
                        name: assignment.name.clone(),
                        value: value.clone(),
                        proto: env.proto.clone(),
                    });
                }
                crate::ast::AssignmentKind::ObjectClass(class) => {
                    self.class_defs.insert(assignment.name.clone(), class.clone());
                }
                crate::ast::AssignmentKind::Object(object) => {
                    self.object_defs
                        .push((assignment.name.clone(), object.clone()));
                }
            }
        }
        Ok(())
    }

    /// Register one type usage, returning the canonical identifier of the
    /// record it bound to. Idempotent: a repeated (path, type) pair only
    /// appends a back-reference.
    fn register_type(
        &mut self,
        path: &str,
        ty: &Type,
        name: &str,
        env: &RegEnv,
        directives: &mut DirectiveSet,
    ) -> String {
        let renamed = match directives.type_renames.use_item(name) {
            Some(r) => r.new_name.clone(),
            None => sanitize(name),
        };

        // One wrapper record per explicit tag level, each registered
        // separately; implicit tag levels stay on the record itself
        if let Some(first) = ty.tags.first() {
            if first.mode == TagMode::Explicit {
                let tag = *first;
                let mut rest = ty.clone();
                rest.tags.remove(0);
                rest.name = None;
                let inner_name = untagged_type_name(&renamed);
                let inner_ident =
                    self.register_type(&format!("{}/_untag", path), &rest, &inner_name, env, directives);
                let wrapper = Type {
                    name: Some(renamed.clone()),
                    tags: Vec::new(),
                    constraint: None,
                    kind: TypeKind::Tagged {
                        tag,
                        inner: Box::new(Type::reference(&inner_ident)),
                    },
                    span: ty.span,
                };
                return self.bind_record(
                    name,
                    &renamed,
                    wrapper,
                    path,
                    vec![inner_ident],
                    false,
                    env,
                    directives,
                );
            }
        }

        let mut deps = Vec::new();
        let mut has_pending = false;
        let normalized_kind = match &ty.kind {
            TypeKind::Sequence(list) => {
                let expanded =
                    self.normalize_components(path, list, env, directives, &mut deps, &mut has_pending);
                TypeKind::Sequence(expanded)
            }
            TypeKind::Set(list) => {
                let expanded =
                    self.normalize_components(path, list, env, directives, &mut deps, &mut has_pending);
                TypeKind::Set(expanded)
            }
            TypeKind::Choice(list) => {
                let expanded =
                    self.normalize_components(path, list, env, directives, &mut deps, &mut has_pending);
                TypeKind::Choice(expanded)
            }
            TypeKind::SequenceOf(element) => {
                let (normalized, dep) =
                    self.register_element(path, &renamed, element, env, directives);
                deps.extend(dep);
                TypeKind::SequenceOf(Box::new(normalized))
            }
            TypeKind::SetOf(element) => {
                let (normalized, dep) =
                    self.register_element(path, &renamed, element, env, directives);
                deps.extend(dep);
                TypeKind::SetOf(Box::new(normalized))
            }
            TypeKind::Enumerated { items, extensible } => TypeKind::Enumerated {
                items: number_enum_items(items),
                extensible: *extensible,
            },
            TypeKind::TypeRef { module, name: target } => {
                deps.push(target.clone());
                TypeKind::TypeRef {
                    module: module.clone(),
                    name: target.clone(),
                }
            }
            TypeKind::Selection { field, inner } => {
                if let TypeKind::TypeRef { name: target, .. } = &inner.kind {
                    deps.push(target.clone());
                }
                TypeKind::Selection {
                    field: field.clone(),
                    inner: inner.clone(),
                }
            }
            other => other.clone(),
        };

        let need_tree = ty.is_constructed()
            || matches!(&ty.kind, TypeKind::BitString { named } if !named.is_empty());

        let normalized = Type {
            name: Some(renamed.clone()),
            tags: ty.tags.clone(),
            constraint: ty.constraint.clone(),
            kind: normalized_kind,
            span: ty.span,
        };

        let ident = self.bind_record(name, &renamed, normalized, path, deps, need_tree, env, directives);
        if has_pending {
            let record = self.by_ident[&ident];
            self.pending.push(PendingExpansion {
                record,
                path: path.to_string(),
                module_idx: env.module_idx,
            });
        }
        ident
    }

    /// Normalize a component list: automatic tagging, COMPONENTS OF
    /// expansion, child type and field registration
    #[allow(clippy::too_many_arguments)]
    fn normalize_components(
        &mut self,
        path: &str,
        list: &ComponentList,
        env: &RegEnv,
        directives: &mut DirectiveSet,
        deps: &mut Vec<String>,
        has_pending: &mut bool,
    ) -> ComponentList {
        let members: Vec<&Member> = list.members().collect();
        let any_tagged = members.iter().any(|m| !m.ty.tags.is_empty());
        let all_tagged = members.iter().all(|m| !m.ty.tags.is_empty());
        let automatic = env.tag_default == TagDefault::Automatic;

        if automatic && any_tagged && !all_tagged {
            self.diags.hygiene(
                "automatic tagging conflicts with an explicitly tagged sibling; keeping explicit tags",
                path.to_string(),
            );
        }
        let apply_auto = automatic && !any_tagged;

        let mut out = Vec::new();
        let mut position: i64 = 0;
        let mut in_extension = false;

        for component in &list.components {
            match component {
                Component::ExtensionMarker => {
                    in_extension = true;
                    out.push(Component::ExtensionMarker);
                }
                Component::ComponentsOf(target_ty) => {
                    let target_name = match &target_ty.kind {
                        TypeKind::TypeRef { name, .. } => Some(name.clone()),
                        _ => None,
                    };
                    let resolved = target_name
                        .as_ref()
                        .and_then(|n| self.type_defs.get(n).cloned());
                    match resolved {
                        Some(resolved_ty) => {
                            let spliced = self.splice_components_of(
                                path,
                                &resolved_ty,
                                env,
                                directives,
                                deps,
                                &mut position,
                                in_extension,
                            );
                            out.extend(spliced);
                        }
                        None => {
                            // Forward reference: retried once at finalize
                            *has_pending = true;
                            out.push(Component::ComponentsOf(target_ty.clone()));
                        }
                    }
                }
                Component::Member(member) => {
                    let mut member = member.clone();
                    member.extension = member.extension || in_extension;
                    if apply_auto {
                        member.ty.tags = vec![Tag::context(position, TagMode::Implicit)];
                    }
                    let normalized = self.register_member(path, &member, env, directives, deps);
                    out.push(Component::Member(normalized));
                    position += 1;
                }
            }
        }
        ComponentList::new(out)
    }

    /// Replace a COMPONENTS OF pseudo-member with the referenced type's
    /// members, registering each as if declared in place
    #[allow(clippy::too_many_arguments)]
    fn splice_components_of(
        &mut self,
        path: &str,
        target: &Type,
        env: &RegEnv,
        directives: &mut DirectiveSet,
        deps: &mut Vec<String>,
        position: &mut i64,
        in_extension: bool,
    ) -> Vec<Component> {
        let list = match &target.kind {
            TypeKind::Sequence(list) | TypeKind::Set(list) => list.clone(),
            _ => {
                self.diags.degraded(
                    "COMPONENTS OF target is not a SEQUENCE or SET",
                    path.to_string(),
                );
                return Vec::new();
            }
        };

        let mut out = Vec::new();
        for component in &list.components {
            if let Component::Member(member) = component {
                let mut member = member.clone();
                member.extension = member.extension || in_extension;
                let normalized = self.register_member(path, &member, env, directives, deps);
                out.push(Component::Member(normalized));
                *position += 1;
            }
        }
        out
    }

    /// Register the type of one member and produce its normalized form: a
    /// reference to the child record with the member's tags kept in place
    fn register_member(
        &mut self,
        parent_path: &str,
        member: &Member,
        env: &RegEnv,
        directives: &mut DirectiveSet,
        deps: &mut Vec<String>,
    ) -> Member {
        let path = format!("{}/{}", parent_path, member.name);
        let ty = &member.ty;

        let (normalized_ty, child_name) = if let TypeKind::TypeRef { name: target, .. } = &ty.kind {
            deps.push(target.clone());
            (ty.clone(), target.clone())
        } else if ty.tags.iter().any(|t| t.mode == TagMode::Explicit) {
            // Explicit tag chain becomes its own wrapper record
            let child = self.register_type(&path, ty, &member_type_name(&member.name), env, directives);
            deps.push(child.clone());
            (Type::reference(&child), child)
        } else {
            let mut bare = ty.clone();
            bare.tags.clear();
            bare.name = None;
            let child_name = canonical_child_name(&bare, &member.name);
            let child = self.register_type(&path, &bare, &child_name, env, directives);
            deps.push(child.clone());
            let normalized = Type {
                name: None,
                tags: ty.tags.clone(),
                constraint: None,
                kind: TypeKind::TypeRef {
                    module: None,
                    name: child.clone(),
                },
                span: ty.span,
            };
            (normalized, child)
        };

        self.register_field(&path, member, ty, &child_name, env, directives);

        Member {
            name: member.name.clone(),
            ty: normalized_ty,
            optional: member.optional,
            default: member.default.clone(),
            extension: member.extension,
            span: member.span,
        }
    }

    /// Register the element type of a SEQUENCE OF / SET OF, plus the
    /// field record its per-item display needs
    fn register_element(
        &mut self,
        path: &str,
        parent: &str,
        element: &Type,
        env: &RegEnv,
        directives: &mut DirectiveSet,
    ) -> (Type, Option<String>) {
        let element_path = format!("{}/_item", path);
        let item_member = Member::new(format!("{}_item", parent), element.clone());

        if let TypeKind::TypeRef { name: target, .. } = &element.kind {
            self.register_field(&element_path, &item_member, element, target, env, directives);
            return (element.clone(), Some(target.clone()));
        }

        let mut bare = element.clone();
        bare.name = None;
        let child_name = match structural_name(&bare) {
            Some(name) => name,
            None => element_type_name(parent),
        };
        let child = self.register_type(&element_path, &bare, &child_name, env, directives);
        self.register_field(&element_path, &item_member, element, &child, env, directives);
        let normalized = Type {
            name: None,
            tags: Vec::new(),
            constraint: None,
            kind: TypeKind::TypeRef {
                module: None,
                name: child.clone(),
            },
            span: element.span,
        };
        (normalized, Some(child))
    }

    /// Create or reuse the field record (hf entry) for one member usage
    fn register_field(
        &mut self,
        path: &str,
        member: &Member,
        ty: &Type,
        child_name: &str,
        env: &RegEnv,
        directives: &mut DirectiveSet,
    ) {
        let renamed = match directives.field_renames.use_item(&member.name) {
            Some(r) => r.new_name.clone(),
            None => sanitize(&member.name),
        };

        let mut attrs = default_field_attrs(&member.name, &renamed, ty, child_name, &env.proto);
        if let Some(over) = directives.field_attrs.use_item(&member.name) {
            let over = over.clone();
            apply_attr_overrides(&mut attrs, &over);
        }

        let key = format!("{}|{}", child_name, attrs.canonical());
        if let Some(&idx) = self.field_keys.get(&key) {
            self.fields[idx].add_ref(path);
            return;
        }

        let mut ident = format!("hf_{}_{}", env.proto, renamed);
        let mut suffix = 0;
        while self.field_idents.contains_key(&ident) {
            suffix += 1;
            if suffix == 1 {
                self.diags.hygiene(
                    format!("duplicate field identifier '{}'; appending suffix", ident),
                    path.to_string(),
                );
            }
            ident = format!("hf_{}_{}_{:02}", env.proto, renamed, suffix);
        }

        let id = self.fields.len();
        let sym = self.interner.get_or_intern(&ident);
        self.fields.push(FieldRecord {
            id,
            ident: sym,
            proto: env.proto.clone(),
            type_name: child_name.to_string(),
            attrs,
            refs: vec![path.to_string()],
        });
        self.field_keys.insert(key, id);
        self.field_idents.insert(ident, id);
    }

    /// Dedup binding: one record per (referenced type, structural
    /// modifier); structurally distinct types never share an identifier
    #[allow(clippy::too_many_arguments)]
    fn bind_record(
        &mut self,
        source_name: &str,
        desired: &str,
        ty: Type,
        path: &str,
        deps: Vec<String>,
        need_tree: bool,
        env: &RegEnv,
        directives: &mut DirectiveSet,
    ) -> String {
        let fp = fingerprint(&ty);
        let mut ident = desired.to_string();
        let mut suffix = 0;
        loop {
            match self.by_ident.get(&ident) {
                Some(&id) if self.types[id].fingerprint == fp => {
                    self.types[id].add_ref(path);
                    for dep in deps {
                        if !self.types[id].deps.contains(&dep) {
                            self.types[id].deps.push(dep);
                        }
                    }
                    self.name_to_record
                        .entry(source_name.to_string())
                        .or_insert(id);
                    return ident;
                }
                Some(_) => {
                    suffix += 1;
                    if suffix == 1 {
                        self.diags.hygiene(
                            format!(
                                "duplicate generated name '{}'; appending numeric suffix",
                                ident
                            ),
                            path.to_string(),
                        );
                    }
                    ident = format!("{}_{:02}", desired, suffix);
                }
                None => break,
            }
        }

        let exported = directives.exports.use_item(source_name).copied();
        let no_emit = directives.no_emit.use_item(source_name).copied();
        let user_defined = directives.user_defined.use_item(source_name).is_some();
        let enum_values = exported.is_some_and(|f| f.enums);

        let id = self.types.len();
        let sym = self.interner.get_or_intern(&ident);
        self.types.push(TypeRecord {
            id,
            ident: sym,
            proto: env.proto.clone(),
            ty,
            refs: vec![path.to_string()],
            deps,
            need_tree,
            ber_tag: None,
            exported,
            no_emit,
            user_defined,
            enum_values,
            fingerprint: fp,
        });
        self.by_ident.insert(ident.clone(), id);
        self.name_to_record.insert(ident.clone(), id);
        self.name_to_record
            .entry(source_name.to_string())
            .or_insert(id);
        ident
    }

    /// Retry pending expansions, resolve tags and imports, order the
    /// record graph, compute the export closure, and freeze the context
    pub fn finalize(&mut self, directives: &mut DirectiveSet) {
        self.retry_pending(directives);
        self.apply_module_exports();
        self.resolve_record_tags();
        self.check_unresolved();
        self.resolve_dependencies();
        self.collect_export_closure();
        self.frozen = true;
    }

    /// One deferred retry for COMPONENTS OF forward references
    fn retry_pending(&mut self, directives: &mut DirectiveSet) {
        let pending = std::mem::take(&mut self.pending);
        for item in pending {
            let env = {
                let info = &self.modules[item.module_idx];
                RegEnv {
                    module_idx: item.module_idx,
                    proto: info.proto.clone(),
                    tag_default: info.tag_default,
                }
            };

            let list = match &self.types[item.record].ty.kind {
                TypeKind::Sequence(list) | TypeKind::Set(list) | TypeKind::Choice(list) => {
                    list.clone()
                }
                _ => continue,
            };

            let mut deps = Vec::new();
            let mut out = Vec::new();
            let mut position: i64 = 0;
            let mut in_extension = false;
            for component in &list.components {
                match component {
                    Component::ExtensionMarker => {
                        in_extension = true;
                        out.push(Component::ExtensionMarker);
                    }
                    Component::ComponentsOf(target_ty) => {
                        let target_name = match &target_ty.kind {
                            TypeKind::TypeRef { name, .. } => name.clone(),
                            _ => String::new(),
                        };
                        match self.type_defs.get(&target_name).cloned() {
                            Some(resolved) => {
                                let spliced = self.splice_components_of(
                                    &item.path,
                                    &resolved,
                                    &env,
                                    directives,
                                    &mut deps,
                                    &mut position,
                                    in_extension,
                                );
                                out.extend(spliced);
                            }
                            None => {
                                self.diags.degraded(
                                    format!(
                                        "COMPONENTS OF target '{}' was never registered",
                                        target_name
                                    ),
                                    item.path.clone(),
                                );
                            }
                        }
                    }
                    Component::Member(m) => {
                        out.push(Component::Member(m.clone()));
                        position += 1;
                    }
                }
            }

            let record = &mut self.types[item.record];
            let list = ComponentList::new(out);
            record.ty.kind = match &record.ty.kind {
                TypeKind::Sequence(_) => TypeKind::Sequence(list),
                TypeKind::Set(_) => TypeKind::Set(list),
                TypeKind::Choice(_) => TypeKind::Choice(list),
                other => other.clone(),
            };
            record.fingerprint = fingerprint(&record.ty);
            for dep in deps {
                if !record.deps.contains(&dep) {
                    record.deps.push(dep);
                }
            }
        }
    }

    /// Mark records named by an explicit module EXPORTS list
    fn apply_module_exports(&mut self) {
        let mut exported_ids = Vec::new();
        for info in &self.modules {
            for name in &info.export_list {
                if let Some(&id) = self.name_to_record.get(name) {
                    exported_ids.push(id);
                }
            }
        }
        for id in exported_ids {
            if self.types[id].exported.is_none() {
                self.types[id].exported = Some(crate::directive::FlagOpt::default());
            }
        }
    }

    /// Resolve the BER tag metadata of every record; placeholder tags for
    /// unregistered imports degrade with a diagnostic
    fn resolve_record_tags(&mut self) {
        let mut resolved = Vec::with_capacity(self.types.len());
        for record in &self.types {
            let outcome = resolve_tag(&record.ty, self);
            resolved.push((record.refs[0].clone(), outcome));
        }
        for (record, (origin, outcome)) in self.types.iter_mut().zip(resolved) {
            record.ber_tag = match outcome {
                TagOutcome::Known(tag) => Some(tag),
                TagOutcome::Indeterminate => None,
                TagOutcome::Placeholder(tag) => {
                    self.diags.degraded(
                        "missing tag for imported type; substituting placeholder",
                        origin,
                    );
                    Some(tag)
                }
            };
        }
    }

    /// Diagnose references that never resolved to a record. Imports from
    /// unregistered modules become dummy imports; compilation continues.
    fn check_unresolved(&mut self) {
        let mut messages = Vec::new();
        for record in &self.types {
            for dep in &record.deps {
                if self.name_to_record.contains_key(dep) || self.missing_reported.contains(dep) {
                    continue;
                }
                let message = match self.import_origin.get(dep) {
                    Some(module) => format!(
                        "unresolved import '{}' from module '{}'; substituting dummy import",
                        dep, module
                    ),
                    None => format!("reference to unregistered type '{}'", dep),
                };
                messages.push((message, record.refs[0].clone(), dep.clone()));
            }
        }
        for (message, origin, dep) in messages {
            if self.missing_reported.insert(dep) {
                self.diags.degraded(message, origin);
            }
        }
    }

    /// Order the record graph; unresolved names count as always satisfied
    fn resolve_dependencies(&mut self) {
        let count = self.types.len();
        let dep_ids: Vec<Vec<usize>> = self
            .types
            .iter()
            .map(|record| {
                record
                    .deps
                    .iter()
                    .map(|name| self.name_to_record.get(name).copied().unwrap_or(usize::MAX))
                    .collect()
            })
            .collect();
        let resolution = depgraph::resolve(count, |n| dep_ids[n].clone());
        self.forward_decls = resolution.cycle_members();
        self.emission = resolution.order;
        self.cycles = resolution.cycles;
    }

    /// An exported symbol pulls its full dependency closure into the
    /// emission set, even if otherwise unused
    fn collect_export_closure(&mut self) {
        let mut work: Vec<RecordId> = self
            .types
            .iter()
            .filter(|r| r.exported.is_some())
            .map(|r| r.id)
            .collect();
        let mut closure = BTreeSet::new();
        while let Some(id) = work.pop() {
            if !closure.insert(id) {
                continue;
            }
            let deps: Vec<RecordId> = self.types[id]
                .deps
                .iter()
                .filter_map(|name| self.name_to_record.get(name).copied())
                .collect();
            work.extend(deps);
        }

        let mut conflicted = Vec::new();
        for &id in &closure {
            let record = &self.types[id];
            if record.exported.is_none() && record.suppresses_type() {
                conflicted.push(record.refs[0].clone());
            }
        }
        for origin in conflicted {
            self.diags.hygiene(
                "NO_EMIT type is required by an exported symbol; emitting anyway",
                origin,
            );
        }
        self.required_by_export = closure;
    }

    /// Order whole modules by inter-module import, for diagnostics
    pub fn module_order(&self) -> Resolution {
        let index: HashMap<&str, usize> = self
            .modules
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.as_str(), i))
            .collect();
        let dep_ids: Vec<Vec<usize>> = self
            .modules
            .iter()
            .map(|m| {
                m.imports
                    .iter()
                    .map(|name| index.get(name.as_str()).copied().unwrap_or(usize::MAX))
                    .collect()
            })
            .collect();
        depgraph::resolve(self.modules.len(), |n| dep_ids[n].clone())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeLookup for Context {
    fn lookup_type(&self, _module: Option<&str>, name: &str) -> Option<&Type> {
        self.type_defs
            .get(name)
            .or_else(|| self.by_ident.get(name).map(|&id| &self.types[id].ty))
    }
}

/// Canonical name for an anonymous child type: shared structural name for
/// unadorned primitives, context-derived name otherwise
fn canonical_child_name(bare: &Type, member_name: &str) -> String {
    match structural_name(bare) {
        Some(name) => name,
        None => member_type_name(member_name),
    }
}

/// Structural record name shared by every usage site of the same
/// (base type, bounds) pair, e.g. `INTEGER_0_255`, `OCTET_STRING_SIZE_4`
fn structural_name(ty: &Type) -> Option<String> {
    let base = match &ty.kind {
        TypeKind::Boolean => "BOOLEAN",
        TypeKind::Integer { named } if named.is_empty() => "INTEGER",
        TypeKind::BitString { named } if named.is_empty() => "BIT_STRING",
        TypeKind::OctetString => "OCTET_STRING",
        TypeKind::Null => "NULL",
        TypeKind::Real => "REAL",
        TypeKind::ObjectIdentifier => "OBJECT_IDENTIFIER",
        TypeKind::RelativeOid => "RELATIVE_OID",
        TypeKind::CharacterString(kind) => kind.keyword(),
        TypeKind::External => "EXTERNAL",
        TypeKind::EmbeddedPdv => "EMBEDDED_PDV",
        TypeKind::Any | TypeKind::OpenType => "ANY",
        _ => return None,
    };
    let size = size_bounds(ty.constraint.as_ref());
    let value = value_bounds(ty.constraint.as_ref());
    Some(format!(
        "{}{}{}",
        base,
        size_suffix(&size),
        range_suffix(&value)
    ))
}

/// Assign declaration-order numbers to unnumbered enumeration items,
/// skipping explicitly used values
fn number_enum_items(items: &[NamedNumber]) -> Vec<NamedNumber> {
    let used: HashSet<i64> = items.iter().filter_map(|i| i.value).collect();
    let mut next: i64 = 0;
    items
        .iter()
        .map(|item| {
            let value = match item.value {
                Some(v) => v,
                None => {
                    while used.contains(&next) {
                        next += 1;
                    }
                    let v = next;
                    next += 1;
                    v
                }
            };
            NamedNumber {
                name: item.name.clone(),
                value: Some(value),
                span: item.span,
            }
        })
        .collect()
}

/// Default display attributes per member kind; directive overrides apply
/// on top
fn default_field_attrs(
    original: &str,
    renamed: &str,
    ty: &Type,
    child_name: &str,
    proto: &str,
) -> FieldAttrs {
    let (ftype, display, strings) = match &ty.kind {
        TypeKind::Boolean => ("FT_BOOLEAN", "BASE_NONE", None),
        TypeKind::Integer { named } if named.is_empty() => ("FT_INT32", "BASE_DEC", None),
        TypeKind::Integer { .. } => (
            "FT_INT32",
            "BASE_DEC",
            Some(format!("VALS({}_vals)", child_name)),
        ),
        TypeKind::Enumerated { .. } => (
            "FT_UINT32",
            "BASE_DEC",
            Some(format!("VALS({}_vals)", child_name)),
        ),
        TypeKind::Real => ("FT_DOUBLE", "BASE_NONE", None),
        TypeKind::BitString { .. } | TypeKind::OctetString => ("FT_BYTES", "BASE_NONE", None),
        TypeKind::Null => ("FT_NONE", "BASE_NONE", None),
        TypeKind::CharacterString(_) => ("FT_STRING", "BASE_NONE", None),
        TypeKind::ObjectIdentifier => ("FT_OID", "BASE_NONE", None),
        TypeKind::RelativeOid => ("FT_REL_OID", "BASE_NONE", None),
        _ => ("FT_NONE", "BASE_NONE", None),
    };
    FieldAttrs {
        name: original.to_string(),
        abbrev: format!("{}.{}", proto, renamed),
        ftype: ftype.to_string(),
        display: display.to_string(),
        strings,
        bitmask: "0".to_string(),
    }
}

fn apply_attr_overrides(attrs: &mut FieldAttrs, over: &crate::directive::AttrOpt) {
    if let Some(v) = &over.ftype {
        attrs.ftype = v.clone();
    }
    if let Some(v) = &over.display {
        attrs.display = v.clone();
    }
    if let Some(v) = &over.strings {
        attrs.strings = Some(v.clone());
    }
    if let Some(v) = &over.bitmask {
        attrs.bitmask = v.clone();
    }
    if let Some(v) = &over.name {
        attrs.name = v.clone();
    }
    if let Some(v) = &over.abbrev {
        attrs.abbrev = v.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Assignment, AssignmentKind, SymbolsFrom, TagClass};
    use crate::common::Span;

    fn assign_type(name: &str, ty: Type) -> Assignment {
        Assignment::new(name, AssignmentKind::Type(ty), Span::default())
    }

    fn member(name: &str, ty: Type) -> Component {
        Component::Member(Member::new(name, ty))
    }

    fn seq(components: Vec<Component>) -> Type {
        Type::new(TypeKind::Sequence(ComponentList::new(components)))
    }

    fn integer() -> Type {
        Type::new(TypeKind::Integer { named: vec![] })
    }

    fn compile(modules: Vec<Module>) -> (Context, DirectiveSet) {
        compile_with(modules, DirectiveSet::new())
    }

    fn compile_with(modules: Vec<Module>, mut directives: DirectiveSet) -> (Context, DirectiveSet) {
        let mut ctx = Context::new();
        for module in &modules {
            ctx.register_module(module, &mut directives).expect("register");
        }
        ctx.finalize(&mut directives);
        (ctx, directives)
    }

    fn emission_index(ctx: &Context, name: &str) -> usize {
        let id = ctx.record_id_by_name(name).expect("record");
        ctx.emission.iter().position(|&r| r == id).expect("emitted")
    }

    #[test]
    fn test_nested_sequence_emits_dependency_first() {
        let mut module = Module::new("Test-Module", TagDefault::Explicit);
        module.assignments.push(assign_type(
            "A",
            seq(vec![member("b", Type::reference("B"))]),
        ));
        module.assignments.push(assign_type(
            "B",
            seq(vec![member("x", integer())]),
        ));
        let (ctx, _) = compile(vec![module]);
        assert!(emission_index(&ctx, "B") < emission_index(&ctx, "A"));
        assert!(ctx.cycles.is_empty());
    }

    #[test]
    fn test_mutual_optional_members_form_one_cycle() {
        let mut module = Module::new("Test-Module", TagDefault::Explicit);
        module.assignments.push(assign_type(
            "A",
            seq(vec![Component::Member(
                Member::new("b", Type::reference("B")).optional(),
            )]),
        ));
        module.assignments.push(assign_type(
            "B",
            seq(vec![Component::Member(
                Member::new("a", Type::reference("A")).optional(),
            )]),
        ));
        let (ctx, _) = compile(vec![module]);
        assert_eq!(ctx.cycles.len(), 1);
        let a = ctx.record_id_by_name("A").unwrap();
        let b = ctx.record_id_by_name("B").unwrap();
        assert!(ctx.forward_decls.contains(&a));
        assert!(ctx.forward_decls.contains(&b));
        assert!(ctx.emission.contains(&a) && ctx.emission.contains(&b));
    }

    #[test]
    fn test_enumerated_numbers_follow_declaration_order() {
        let mut module = Module::new("Test-Module", TagDefault::Explicit);
        module.assignments.push(assign_type(
            "Color",
            Type::new(TypeKind::Enumerated {
                items: vec![
                    NamedNumber::new("red", None),
                    NamedNumber::new("green", None),
                    NamedNumber::new("blue", None),
                ],
                extensible: false,
            }),
        ));
        let (ctx, _) = compile(vec![module]);
        let record = ctx.record_by_name("Color").unwrap();
        match &record.ty.kind {
            TypeKind::Enumerated { items, .. } => {
                let values: Vec<_> = items.iter().map(|i| i.value).collect();
                assert_eq!(values, vec![Some(0), Some(1), Some(2)]);
            }
            other => panic!("expected enumerated, got {:?}", other),
        }
    }

    #[test]
    fn test_rename_collision_gets_numeric_suffix() {
        let mut directives = DirectiveSet::new();
        let mut diags = Diagnostics::new();
        crate::directive::DirectiveParser::new(&mut directives, &mut diags)
            .parse_source("#.TYPE_RENAME\nT_foo Foo2\n", "t.cnf", None)
            .expect("directives");

        let mut module = Module::new("Test-Module", TagDefault::Explicit);
        module.assignments.push(assign_type(
            "Foo2",
            seq(vec![member("y", integer())]),
        ));
        module.assignments.push(assign_type(
            "Bar",
            seq(vec![member(
                "foo",
                seq(vec![member("z", Type::new(TypeKind::Boolean))]),
            )]),
        ));
        let (ctx, _) = compile_with(vec![module], directives);

        let renamed = ctx.record_by_name("T_foo").expect("anonymous record");
        assert_eq!(ctx.ident_str(renamed.ident), "Foo2_01");
        assert!(ctx
            .diags
            .iter()
            .any(|d| d.message.contains("duplicate generated name 'Foo2'")));
    }

    #[test]
    fn test_structural_dedup_shares_one_record() {
        let bounded = || {
            integer().with_constraint(crate::ast::Constraint::ValueRange {
                lo: Some(Value::Integer(0)),
                hi: Some(Value::Integer(255)),
                extensible: false,
            })
        };
        let mut module = Module::new("Test-Module", TagDefault::Explicit);
        module.assignments.push(assign_type(
            "A",
            seq(vec![member("x", bounded()), member("y", bounded())]),
        ));
        let (ctx, _) = compile(vec![module]);
        let record = ctx.record_by_name("INTEGER_0_255").expect("shared record");
        assert_eq!(record.refs.len(), 2);
        assert!(record.refs[0].ends_with("/x"));
        assert!(record.refs[1].ends_with("/y"));
    }

    #[test]
    fn test_duplicate_assignment_is_fatal() {
        let mut module = Module::new("Test-Module", TagDefault::Explicit);
        module.assignments.push(assign_type("A", integer()));
        module.assignments.push(assign_type("A", Type::new(TypeKind::Boolean)));
        let mut ctx = Context::new();
        let mut directives = DirectiveSet::new();
        let result = ctx.register_module(&module, &mut directives);
        assert!(matches!(result, Err(CompileError::Semantic { .. })));
    }

    #[test]
    fn test_unresolved_import_degrades_with_dummy() {
        let mut module = Module::new("Test-Module", TagDefault::Explicit);
        module.imports.push(SymbolsFrom {
            module: "Other-Module".to_string(),
            symbols: vec!["X".to_string()],
            span: Span::default(),
        });
        module.assignments.push(assign_type(
            "A",
            seq(vec![member("x", Type::reference("X"))]),
        ));
        let (ctx, _) = compile(vec![module]);
        assert!(ctx
            .diags
            .iter()
            .any(|d| d.message.contains("unresolved import 'X'")));
        let a = ctx.record_id_by_name("A").unwrap();
        assert!(ctx.emission.contains(&a));
    }

    #[test]
    fn test_automatic_tagging_assigns_positional_tags() {
        let mut module = Module::new("Test-Module", TagDefault::Automatic);
        module.assignments.push(assign_type(
            "A",
            seq(vec![
                member("a", Type::new(TypeKind::Boolean)),
                member("b", integer()),
            ]),
        ));
        let (ctx, _) = compile(vec![module]);
        let record = ctx.record_by_name("A").unwrap();
        if let TypeKind::Sequence(list) = &record.ty.kind {
            let tags: Vec<_> = list.members().map(|m| m.ty.tags.clone()).collect();
            assert_eq!(tags[0], vec![Tag::context(0, TagMode::Implicit)]);
            assert_eq!(tags[1], vec![Tag::context(1, TagMode::Implicit)]);
        } else {
            panic!("expected sequence");
        }
    }

    #[test]
    fn test_automatic_tagging_mix_is_diagnosed() {
        let mut module = Module::new("Test-Module", TagDefault::Automatic);
        module.assignments.push(assign_type(
            "A",
            seq(vec![
                member("a", Type::new(TypeKind::Boolean)),
                member(
                    "b",
                    integer().with_tag(Tag::new(TagClass::Context, 5, TagMode::Implicit)),
                ),
            ]),
        ));
        let (ctx, _) = compile(vec![module]);
        assert!(ctx
            .diags
            .iter()
            .any(|d| d.message.contains("automatic tagging conflicts")));
        let record = ctx.record_by_name("A").unwrap();
        if let TypeKind::Sequence(list) = &record.ty.kind {
            // explicit tags kept, no positional assignment
            let first = list.members().next().unwrap();
            assert!(first.ty.tags.is_empty());
        }
    }

    #[test]
    fn test_components_of_forward_reference_expands() {
        let mut module = Module::new("Test-Module", TagDefault::Explicit);
        module.assignments.push(assign_type(
            "A",
            Type::new(TypeKind::Sequence(ComponentList::new(vec![
                Component::ComponentsOf(Type::reference("B")),
                member("z", Type::new(TypeKind::Boolean)),
            ]))),
        ));
        module.assignments.push(assign_type(
            "B",
            seq(vec![member("x", Type::new(TypeKind::Boolean)), member("y", integer())]),
        ));
        let (ctx, _) = compile(vec![module]);
        let record = ctx.record_by_name("A").unwrap();
        if let TypeKind::Sequence(list) = &record.ty.kind {
            let names: Vec<_> = list.members().map(|m| m.name.clone()).collect();
            assert_eq!(names, vec!["x", "y", "z"]);
        } else {
            panic!("expected sequence");
        }
    }

    #[test]
    fn test_components_of_replay_appends_back_reference_only() {
        // B's members register once for B and once spliced into A; the
        // shared structural record must not be duplicated
        let mut module = Module::new("Test-Module", TagDefault::Explicit);
        module.assignments.push(assign_type(
            "B",
            seq(vec![member("x", integer())]),
        ));
        module.assignments.push(assign_type(
            "A",
            Type::new(TypeKind::Sequence(ComponentList::new(vec![
                Component::ComponentsOf(Type::reference("B")),
            ]))),
        ));
        let (ctx, _) = compile(vec![module]);
        let record = ctx.record_by_name("INTEGER").expect("shared record");
        assert_eq!(
            record.refs,
            vec!["Test-Module/B/x".to_string(), "Test-Module/A/x".to_string()]
        );
        assert_eq!(
            ctx.types
                .iter()
                .filter(|r| ctx.ident_str(r.ident).starts_with("INTEGER"))
                .count(),
            1
        );
    }

    #[test]
    fn test_explicit_tag_strips_into_wrapper_record() {
        let mut module = Module::new("Test-Module", TagDefault::Explicit);
        module.assignments.push(assign_type(
            "T",
            integer().with_tag(Tag::new(TagClass::Application, 5, TagMode::Explicit)),
        ));
        let (ctx, _) = compile(vec![module]);
        let wrapper = ctx.record_by_name("T").unwrap();
        assert!(matches!(wrapper.ty.kind, TypeKind::Tagged { .. }));
        assert!(wrapper.deps.contains(&"T_U".to_string()));
        let inner = ctx.record_by_name("T_U").expect("untagged record");
        assert!(matches!(inner.ty.kind, TypeKind::Integer { .. }));
        assert!(emission_index(&ctx, "T_U") < emission_index(&ctx, "T"));
    }

    #[test]
    fn test_export_closure_pulls_dependencies() {
        let mut directives = DirectiveSet::new();
        let mut diags = Diagnostics::new();
        crate::directive::DirectiveParser::new(&mut directives, &mut diags)
            .parse_source("#.EXPORTS\nA\n", "t.cnf", None)
            .expect("directives");

        let mut module = Module::new("Test-Module", TagDefault::Explicit);
        module.assignments.push(assign_type(
            "A",
            seq(vec![member("b", Type::reference("B"))]),
        ));
        module.assignments.push(assign_type(
            "B",
            seq(vec![member("x", integer())]),
        ));
        let (ctx, _) = compile_with(vec![module], directives);
        let a = ctx.record_id_by_name("A").unwrap();
        let b = ctx.record_id_by_name("B").unwrap();
        assert!(ctx.required_by_export.contains(&a));
        assert!(ctx.required_by_export.contains(&b));
    }

    #[test]
    fn test_module_order_follows_imports() {
        let mut first = Module::new("M1", TagDefault::Explicit);
        first.imports.push(SymbolsFrom {
            module: "M2".to_string(),
            symbols: vec!["X".to_string()],
            span: Span::default(),
        });
        first.assignments.push(assign_type("A", integer()));
        let mut second = Module::new("M2", TagDefault::Explicit);
        second.assignments.push(assign_type("X", integer()));
        let (ctx, _) = compile(vec![first, second]);
        let order = ctx.module_order();
        assert_eq!(order.order, vec![1, 0]);
    }

    #[test]
    fn test_frozen_context_rejects_registration() {
        let (mut ctx, mut directives) = compile(vec![Module::new("M", TagDefault::Explicit)]);
        let module = Module::new("Late", TagDefault::Explicit);
        assert!(ctx.register_module(&module, &mut directives).is_err());
    }
}
