//! Code generation backend
//!
//! Walks the frozen compilation context in emission order and produces,
//! per compiled type, a child-field metadata table and a dissection
//! function body, separately per encoding rule. Default bodies come from
//! per-variant templates; a directive override always takes precedence
//! and is substituted with validated named-parameter interpolation
//! against the same parameter set the default would use.

mod ber;
mod params;
mod per;

pub use params::{interpolate, BodyParam, ParamError, ParamMap};

use crate::ast::{
    resolve_tag, sanitize, size_bounds, value_bounds, Bound, Member, NamedNumber, TagMode,
    TagOutcome, Type, TypeKind, Value,
};
use crate::common::Diagnostics;
use crate::directive::{DirectiveSet, RegisterOpt};
use crate::output::{FragmentKind, FragmentSet};
use crate::sema::{Context, TypeRecord};

/// The two supported binary encoding rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodingRule {
    /// Self-describing tag-length-value
    #[default]
    Ber,
    /// Densely packed, position-dependent
    Per,
}

impl EncodingRule {
    pub fn name(self) -> &'static str {
        match self {
            EncodingRule::Ber => "ber",
            EncodingRule::Per => "per",
        }
    }

    fn enc_constant(self) -> &'static str {
        match self {
            EncodingRule::Ber => "ASN1_ENC_BER",
            EncodingRule::Per => "ASN1_ENC_PER",
        }
    }

    fn unknown_fn(self) -> &'static str {
        match self {
            EncodingRule::Ber => "dissect_unknown_ber",
            EncodingRule::Per => "dissect_per_open_type",
        }
    }
}

/// Generate every fragment for one encoding rule. The context is frozen;
/// only the directive used-flags and the diagnostics sink are written.
pub fn generate(
    ctx: &Context,
    directives: &mut DirectiveSet,
    rule: EncodingRule,
    diags: &mut Diagnostics,
) -> FragmentSet {
    let mut generator = Generator {
        ctx,
        directives,
        rule,
        diags,
        frags: FragmentSet::new(),
    };
    generator.run();
    generator.frags
}

/// Which verbatim-override table to consult
#[derive(Clone, Copy)]
enum BodyTable {
    Hdr,
    Body,
    Ftr,
}

struct Generator<'a> {
    ctx: &'a Context,
    directives: &'a mut DirectiveSet,
    rule: EncodingRule,
    diags: &'a mut Diagnostics,
    frags: FragmentSet,
}

impl Generator<'_> {
    fn run(&mut self) {
        self.emit_fields();
        self.emit_forward_decls();
        for &id in &self.ctx.emission {
            self.emit_record(self.ctx.record(id));
        }
        self.emit_value_defs();
        self.emit_pdus();
    }

    // =====================================================================
    // Fields (hf fragments)
    // =====================================================================

    fn emit_fields(&mut self) {
        for field in &self.ctx.fields {
            let ident = self.ctx.ident_str(field.ident);
            self.frags.append(
                &field.proto,
                FragmentKind::Hf,
                &format!("static int {} = -1;\n", ident),
            );
            let strings = field
                .attrs
                .strings
                .clone()
                .unwrap_or_else(|| "NULL".to_string());
            self.frags.append(
                &field.proto,
                FragmentKind::HfArr,
                &format!(
                    "  {{ &{}, {{ \"{}\", \"{}\", {}, {}, {}, {}, NULL, HFILL }}}},\n",
                    ident,
                    field.attrs.name,
                    field.attrs.abbrev,
                    field.attrs.ftype,
                    field.attrs.display,
                    strings,
                    field.attrs.bitmask
                ),
            );
        }
    }

    // =====================================================================
    // Dissection functions (fn fragment)
    // =====================================================================

    /// Cycle members need a prototype ahead of every body; user-defined
    /// types are declared extern and never emitted
    fn emit_forward_decls(&mut self) {
        for &id in &self.ctx.emission {
            let record = self.ctx.record(id);
            let fn_name = self.fn_name(record);
            if record.user_defined {
                let proto_line = match self.rule {
                    EncodingRule::Ber => ber::prototype(&fn_name, true),
                    EncodingRule::Per => per::prototype(&fn_name, true),
                };
                self.frags.append(
                    &record.proto,
                    FragmentKind::Fn,
                    &format!("extern {}\n", proto_line),
                );
            } else if self.ctx.forward_decls.contains(&id) && self.emits_function(record) {
                let exported = record.exported.is_some_and(|f| f.types);
                let proto_line = match self.rule {
                    EncodingRule::Ber => ber::prototype(&fn_name, exported),
                    EncodingRule::Per => per::prototype(&fn_name, exported),
                };
                self.frags
                    .append(&record.proto, FragmentKind::Fn, &format!("{}\n", proto_line));
            }
        }
    }

    fn emits_function(&self, record: &TypeRecord) -> bool {
        if record.user_defined {
            return false;
        }
        if record.suppresses_type() {
            return self.ctx.required_by_export.contains(&record.id);
        }
        true
    }

    fn emit_record(&mut self, record: &TypeRecord) {
        if self.has_vals(record) && !record.suppresses_values() {
            self.emit_vals_table(record);
            if record.enum_values {
                self.emit_enum_defines(record);
            }
        }
        if !self.emits_function(record) {
            self.emit_exports(record);
            return;
        }
        if record.need_tree {
            let ett = format!("ett_{}_{}", record.proto, self.ident(record));
            self.frags.append(
                &record.proto,
                FragmentKind::Ett,
                &format!("static int {} = -1;\n", ett),
            );
            self.frags.append(
                &record.proto,
                FragmentKind::EttArr,
                &format!("    &{},\n", ett),
            );
        }
        if let Some(table) = self.child_table(record) {
            self.frags.append(&record.proto, FragmentKind::Fn, &table);
        }
        self.emit_function(record);
        self.emit_exports(record);
    }

    fn ident(&self, record: &TypeRecord) -> &str {
        self.ctx.ident_str(record.ident)
    }

    fn fn_name(&self, record: &TypeRecord) -> String {
        format!("dissect_{}_{}", record.proto, self.ident(record))
    }

    /// Dissection function reference for a child type by source name
    fn fn_ref(&self, name: &str) -> String {
        match self.ctx.record_by_name(name) {
            Some(record) => self.fn_name(record),
            None => self.rule.unknown_fn().to_string(),
        }
    }

    fn emit_function(&mut self, record: &TypeRecord) {
        let fn_name = self.fn_name(record);
        let exported = record.exported.is_some_and(|f| f.types);
        let params = self.build_params(record, &fn_name);

        let body = match self.override_text(BodyTable::Body, record) {
            Some(text) => self.substitute(&text, &params, record),
            None => {
                let template = match self.rule {
                    EncodingRule::Ber => ber::body_template(record),
                    EncodingRule::Per => per::body_template(record),
                };
                self.substitute(&template, &params, record)
            }
        };
        let hdr = self
            .override_text(BodyTable::Hdr, record)
            .map(|t| self.substitute(&t, &params, record));
        let ftr = self
            .override_text(BodyTable::Ftr, record)
            .map(|t| self.substitute(&t, &params, record));

        let signature = match self.rule {
            EncodingRule::Ber => ber::signature(&fn_name, exported),
            EncodingRule::Per => per::signature(&fn_name, exported),
        };

        let mut out = String::new();
        out.push_str(&signature);
        out.push_str(" {\n");
        if let Some(hdr) = hdr {
            out.push_str(&indent(&hdr));
        }
        out.push_str(&indent(&body));
        if let Some(ftr) = ftr {
            out.push_str(&indent(&ftr));
        }
        out.push_str("  return offset;\n}\n\n");
        self.frags.append(&record.proto, FragmentKind::Fn, &out);
    }

    fn substitute(&mut self, template: &str, params: &ParamMap, record: &TypeRecord) -> String {
        let (text, errors) = interpolate(template, params);
        let ident = self.ident(record).to_string();
        for error in errors {
            self.diags.hygiene(
                format!("body override for '{}': {}", ident, error),
                record.refs[0].clone(),
            );
        }
        text
    }

    /// A type-level override wins when present; otherwise the override
    /// registered against the first original declaration path applies
    fn override_text(&mut self, which: BodyTable, record: &TypeRecord) -> Option<String> {
        let ident = self.ctx.ident_str(record.ident).to_string();
        let first_ref = record.refs[0].clone();
        let table = match which {
            BodyTable::Hdr => &mut self.directives.fn_hdrs,
            BodyTable::Body => &mut self.directives.fn_bodies,
            BodyTable::Ftr => &mut self.directives.fn_ftrs,
        };
        if table.check_item(&ident) {
            return table.use_item(&ident).map(|b| b.text.clone());
        }
        if table.check_item(&first_ref) {
            return table.use_item(&first_ref).map(|b| b.text.clone());
        }
        None
    }

    fn build_params(&self, record: &TypeRecord, fn_name: &str) -> ParamMap {
        let mut map = ParamMap::new();
        map.set(BodyParam::Tvb, "tvb")
            .set(BodyParam::Offset, "offset")
            .set(BodyParam::Actx, "actx")
            .set(BodyParam::Tree, "tree")
            .set(BodyParam::HfIndex, "hf_index")
            .set(BodyParam::TypeName, self.ident(record))
            .set(BodyParam::FnName, fn_name)
            .set(BodyParam::Proto, record.proto.clone());
        if self.rule == EncodingRule::Ber {
            map.set(BodyParam::ImplicitTag, "implicit_tag");
        }
        let ett = if record.need_tree {
            format!("ett_{}_{}", record.proto, self.ident(record))
        } else {
            "-1".to_string()
        };
        map.set(BodyParam::EttIndex, ett);

        let tag = match &record.ty.kind {
            TypeKind::Tagged { tag, .. } => Some(*tag),
            _ => record.ber_tag,
        };
        if let Some(tag) = tag {
            map.set(BodyParam::TagClass, tag.class.label())
                .set(BodyParam::TagNumber, tag.number.to_string());
        }

        let bounds = match &record.ty.kind {
            TypeKind::Integer { .. } | TypeKind::Enumerated { .. } => {
                value_bounds(record.ty.constraint.as_ref())
            }
            _ => size_bounds(record.ty.constraint.as_ref()),
        };
        map.set(BodyParam::MinVal, bound_value(bounds.lo))
            .set(BodyParam::MaxVal, bound_value(bounds.hi))
            .set(BodyParam::Ext, if bounds.extensible { "true" } else { "false" });

        if let Some(inner) = inner_ref(&record.ty) {
            map.set(BodyParam::InnerFn, self.fn_ref(&inner));
        }
        map
    }

    // =====================================================================
    // Child-field metadata tables
    // =====================================================================

    fn child_table(&self, record: &TypeRecord) -> Option<String> {
        let ident = self.ident(record).to_string();
        match &record.ty.kind {
            TypeKind::Sequence(list) => {
                Some(self.member_table(record, &ident, "_sequence", list.members()))
            }
            TypeKind::Set(list) => Some(self.member_table(record, &ident, "_set", list.members())),
            TypeKind::Choice(list) => Some(self.choice_table(record, &ident, list.members())),
            TypeKind::SequenceOf(element) => {
                Some(self.element_table(record, &ident, "_sequence_of", element))
            }
            TypeKind::SetOf(element) => Some(self.element_table(record, &ident, "_set_of", element)),
            _ => None,
        }
    }

    fn member_table<'m>(
        &self,
        record: &TypeRecord,
        ident: &str,
        suffix: &str,
        members: impl Iterator<Item = &'m Member>,
    ) -> String {
        let mut out = String::new();
        match self.rule {
            EncodingRule::Ber => {
                out.push_str(&format!(
                    "static const ber_sequence_t {}{}[] = {{\n",
                    ident, suffix
                ));
                for member in members {
                    out.push_str(&self.ber_row(record, member));
                }
                out.push_str("  { NULL, 0, 0, 0, NULL }\n};\n\n");
            }
            EncodingRule::Per => {
                out.push_str(&format!(
                    "static const per_sequence_t {}{}[] = {{\n",
                    ident, suffix
                ));
                for member in members {
                    out.push_str(&self.per_row(record, member, None));
                }
                out.push_str("  { NULL, 0, 0, NULL }\n};\n\n");
            }
        }
        out
    }

    fn choice_table<'m>(
        &self,
        record: &TypeRecord,
        ident: &str,
        members: impl Iterator<Item = &'m Member>,
    ) -> String {
        let mut out = String::new();
        match self.rule {
            EncodingRule::Ber => {
                out.push_str(&format!(
                    "static const ber_choice_t {}_choice[] = {{\n",
                    ident
                ));
                for (index, member) in members.enumerate() {
                    let (class, number, flags) = self.ber_member_tag(member);
                    out.push_str(&format!(
                        "  {{ {:3}, &{}, {}, {}, {}, {} }},\n",
                        index,
                        self.member_hf_name(record, member),
                        class,
                        number,
                        flags,
                        self.member_fn(member)
                    ));
                }
                out.push_str("  { 0, NULL, 0, 0, 0, NULL }\n};\n\n");
            }
            EncodingRule::Per => {
                out.push_str(&format!(
                    "static const per_choice_t {}_choice[] = {{\n",
                    ident
                ));
                for (index, member) in members.enumerate() {
                    out.push_str(&self.per_row(record, member, Some(index)));
                }
                out.push_str("  { 0, NULL, 0, NULL }\n};\n\n");
            }
        }
        out
    }

    fn element_table(
        &self,
        record: &TypeRecord,
        ident: &str,
        suffix: &str,
        element: &Type,
    ) -> String {
        let item_path = format!("{}/_item", record.refs[0]);
        let hf = self
            .ctx
            .field_by_path(&item_path)
            .map(|f| format!("&{}", self.ctx.ident_str(f.ident)))
            .unwrap_or_else(|| "NULL".to_string());
        let fn_ref = match &element.kind {
            TypeKind::TypeRef { name, .. } => self.fn_ref(name),
            _ => self.rule.unknown_fn().to_string(),
        };
        match self.rule {
            EncodingRule::Ber => {
                let (class, number, flags) = self.ber_type_tag(element);
                format!(
                    "static const ber_sequence_t {}{}[1] = {{\n  {{ {}, {}, {}, {}, {} }},\n}};\n\n",
                    ident, suffix, hf, class, number, flags, fn_ref
                )
            }
            EncodingRule::Per => format!(
                "static const per_sequence_t {}{}[1] = {{\n  {{ {}, ASN1_EXTENSION_ROOT, ASN1_NOT_OPTIONAL, {} }},\n}};\n\n",
                ident, suffix, hf, fn_ref
            ),
        }
    }

    fn ber_row(&self, record: &TypeRecord, member: &Member) -> String {
        let (class, number, mut flags) = self.ber_member_tag(member);
        if member.optional || member.default.is_some() {
            flags = join_flags(&flags, "BER_FLAGS_OPTIONAL");
        }
        format!(
            "  {{ {}, {}, {}, {}, {} }},\n",
            self.member_hf(record, member),
            class,
            number,
            flags,
            self.member_fn(member)
        )
    }

    fn per_row(&self, record: &TypeRecord, member: &Member, index: Option<usize>) -> String {
        let ext = if member.extension {
            "ASN1_NOT_EXTENSION_ROOT"
        } else {
            "ASN1_EXTENSION_ROOT"
        };
        match index {
            Some(index) => format!(
                "  {{ {:3}, &{}, {}, {} }},\n",
                index,
                self.member_hf_name(record, member),
                ext,
                self.member_fn(member)
            ),
            None => {
                let optional = if member.optional || member.default.is_some() {
                    "ASN1_OPTIONAL"
                } else {
                    "ASN1_NOT_OPTIONAL"
                };
                format!(
                    "  {{ &{}, {}, {}, {} }},\n",
                    self.member_hf_name(record, member),
                    ext,
                    optional,
                    self.member_fn(member)
                )
            }
        }
    }

    fn member_hf(&self, record: &TypeRecord, member: &Member) -> String {
        format!("&{}", self.member_hf_name(record, member))
    }

    fn member_hf_name(&self, record: &TypeRecord, member: &Member) -> String {
        let path = format!("{}/{}", record.refs[0], member.name);
        match self.ctx.field_by_path(&path) {
            Some(field) => self.ctx.ident_str(field.ident).to_string(),
            None => "hf_index".to_string(),
        }
    }

    fn member_fn(&self, member: &Member) -> String {
        match &member.ty.kind {
            TypeKind::TypeRef { name, .. } => self.fn_ref(name),
            _ => self.rule.unknown_fn().to_string(),
        }
    }

    /// (class, number, flags) of a member's outermost tag for the
    /// tag-length-value field table
    fn ber_member_tag(&self, member: &Member) -> (String, String, String) {
        self.ber_type_tag(&member.ty)
    }

    fn ber_type_tag(&self, ty: &Type) -> (String, String, String) {
        if let Some(tag) = ty.tags.first() {
            let flags = if tag.mode == TagMode::Implicit {
                "BER_FLAGS_IMPLTAG"
            } else {
                "0"
            };
            return (
                tag.class.label().to_string(),
                tag.number.to_string(),
                flags.to_string(),
            );
        }
        match resolve_tag(ty, self.ctx) {
            TagOutcome::Known(tag) => (
                tag.class.label().to_string(),
                tag.number.to_string(),
                "BER_FLAGS_NOOWNTAG".to_string(),
            ),
            TagOutcome::Indeterminate => (
                "BER_CLASS_ANY".to_string(),
                "-1".to_string(),
                "BER_FLAGS_NOOWNTAG".to_string(),
            ),
            TagOutcome::Placeholder(tag) => (
                tag.class.label().to_string(),
                tag.number.to_string(),
                "BER_FLAGS_IMPLTAG".to_string(),
            ),
        }
    }

    // =====================================================================
    // Value tables and defines
    // =====================================================================

    fn has_vals(&self, record: &TypeRecord) -> bool {
        self.named_values(record).is_some_and(|v| !v.is_empty())
    }

    fn named_values<'r>(&self, record: &'r TypeRecord) -> Option<&'r [NamedNumber]> {
        match &record.ty.kind {
            TypeKind::Integer { named } => Some(named),
            TypeKind::Enumerated { items, .. } => Some(items),
            _ => None,
        }
    }

    fn emit_vals_table(&mut self, record: &TypeRecord) {
        let Some(values) = self.named_values(record) else {
            return;
        };
        let exported = record.exported.is_some_and(|f| f.values);
        let linkage = if exported { "const" } else { "static const" };
        let mut out = format!(
            "{} value_string {}_vals[] = {{\n",
            linkage,
            self.ident(record)
        );
        for item in values {
            out.push_str(&format!(
                "  {{ {:3}, \"{}\" }},\n",
                item.value.unwrap_or(0),
                item.name
            ));
        }
        out.push_str("  { 0, NULL }\n};\n\n");
        self.frags.append(&record.proto, FragmentKind::Fn, &out);
    }

    fn emit_enum_defines(&mut self, record: &TypeRecord) {
        let Some(values) = self.named_values(record) else {
            return;
        };
        let ident = self.ident(record).to_string();
        let mut out = String::new();
        for item in values {
            out.push_str(&format!(
                "#define {}_{} {}\n",
                ident,
                sanitize(&item.name),
                item.value.unwrap_or(0)
            ));
        }
        self.frags.append(&record.proto, FragmentKind::Val, &out);
    }

    fn emit_value_defs(&mut self) {
        for def in &self.ctx.value_defs {
            let line = match &def.value {
                Value::Integer(n) => Some(format!("#define {} {}\n", sanitize(&def.name), n)),
                Value::ObjectIdentifier(components) => Some(format!(
                    "#define {} \"{}\"\n",
                    sanitize(&def.name),
                    crate::ast::oid_to_string(components)
                )),
                _ => None,
            };
            if let Some(line) = line {
                self.frags.append(&def.proto, FragmentKind::Val, &line);
            }
        }
    }

    // =====================================================================
    // Exported declarations
    // =====================================================================

    fn emit_exports(&mut self, record: &TypeRecord) {
        let Some(flags) = record.exported else {
            return;
        };
        let fn_name = self.fn_name(record);
        let mut out = String::new();
        if flags.types && self.emits_function(record) {
            let proto_line = match self.rule {
                EncodingRule::Ber => ber::prototype(&fn_name, true),
                EncodingRule::Per => per::prototype(&fn_name, true),
            };
            out.push_str(&proto_line);
            out.push('\n');
        }
        if flags.values && self.has_vals(record) {
            out.push_str(&format!(
                "extern const value_string {}_vals[];\n",
                self.ident(record)
            ));
        }
        if !out.is_empty() {
            self.frags.append(&record.proto, FragmentKind::Exp, &out);
        }
    }

    // =====================================================================
    // PDU wrappers and registration glue
    // =====================================================================

    fn emit_pdus(&mut self) {
        let pdu_names: Vec<String> = self.directives.pdus.iter().map(|(k, _)| k.clone()).collect();
        let mut wrapped: Vec<String> = Vec::new();
        for name in pdu_names {
            let register = self
                .directives
                .pdus
                .use_item(&name)
                .and_then(|p| p.register.clone());
            self.emit_pdu(&name, register.as_ref(), &mut wrapped);
        }

        let reg_names: Vec<String> = self
            .directives
            .registrations
            .iter()
            .map(|(k, _)| k.clone())
            .collect();
        for name in reg_names {
            let register = self.directives.registrations.use_item(&name).cloned();
            if let Some(register) = register {
                self.emit_pdu(&name, Some(&register), &mut wrapped);
            }
        }
    }

    fn emit_pdu(&mut self, name: &str, register: Option<&RegisterOpt>, wrapped: &mut Vec<String>) {
        let Some(record) = self.ctx.record_by_name(name) else {
            self.diags
                .degraded(format!("PDU type '{}' was never registered", name), name);
            return;
        };
        let record = record.clone();
        let pdu_fn = format!("dissect_{}_PDU", sanitize(name));

        if !wrapped.contains(&pdu_fn) {
            wrapped.push(pdu_fn.clone());
            let call = match self.rule {
                EncodingRule::Ber => format!(
                    "{}(false, tvb, offset, &asn1_ctx, tree, -1)",
                    self.fn_name(&record)
                ),
                EncodingRule::Per => format!(
                    "{}(tvb, offset, &asn1_ctx, tree, -1)",
                    self.fn_name(&record)
                ),
            };
            let wrapper = format!(
                "static int\n{}(tvbuff_t *tvb, packet_info *pinfo, proto_tree *tree, void *data _U_) {{\n  int offset = 0;\n  asn1_ctx_t asn1_ctx;\n  asn1_ctx_init(&asn1_ctx, {}, true, pinfo);\n  offset = {};\n  return offset;\n}}\n\n",
                pdu_fn,
                self.rule.enc_constant(),
                call
            );
            self.frags.append(&record.proto, FragmentKind::Fn, &wrapper);
        }

        let Some(register) = register else {
            return;
        };
        let glue = match register {
            RegisterOpt::DissectorTable { table, key } => {
                let add = if key.chars().all(|c| c.is_ascii_digit()) {
                    format!(
                        "  dissector_add_uint(\"{}\", {}, create_dissector_handle({}, proto_{}));\n",
                        table, key, pdu_fn, record.proto
                    )
                } else {
                    format!(
                        "  dissector_add_string(\"{}\", \"{}\", create_dissector_handle({}, proto_{}));\n",
                        table, key, pdu_fn, record.proto
                    )
                };
                add
            }
            RegisterOpt::Oid { oid } => format!(
                "  register_{}_oid_dissector(\"{}\", {}, proto_{}, \"{}\");\n",
                self.rule.name(),
                oid,
                pdu_fn,
                record.proto,
                name
            ),
        };
        self.frags.append(&record.proto, FragmentKind::Table, &glue);
    }
}

/// Bound rendered for generated code; open ends use the unbounded
/// sentinel meaning "read a length determinant from the stream"
fn bound_value(bound: Bound) -> String {
    match bound {
        Bound::Open => "NO_BOUND".to_string(),
        Bound::Fixed(n) => n.to_string(),
    }
}

fn join_flags(base: &str, extra: &str) -> String {
    if base == "0" {
        extra.to_string()
    } else {
        format!("{}|{}", base, extra)
    }
}

/// Source name of the type a record delegates its body to, if any
fn inner_ref(ty: &Type) -> Option<String> {
    match &ty.kind {
        TypeKind::TypeRef { name, .. } => Some(name.clone()),
        TypeKind::Tagged { inner, .. } | TypeKind::Selection { inner, .. } => {
            match &inner.kind {
                TypeKind::TypeRef { name, .. } => Some(name.clone()),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Two-space indent for every non-empty line of a body
fn indent(text: &str) -> String {
    let mut out = String::new();
    for line in text.lines() {
        if line.is_empty() {
            out.push('\n');
        } else {
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{
        Assignment, AssignmentKind, Component, ComponentList, Constraint, Member, Module,
        NamedNumber, TagDefault, Type, TypeKind,
    };
    use crate::common::Span;
    use crate::directive::DirectiveParser;
    use pretty_assertions::assert_eq;

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

    fn build(module: Module, cnf: &str) -> (Context, DirectiveSet) {
        let mut directives = DirectiveSet::new();
        let mut diags = Diagnostics::new();
        if !cnf.is_empty() {
            DirectiveParser::new(&mut directives, &mut diags)
                .parse_source(cnf, "test.cnf", None)
                .expect("directives");
        }
        let mut ctx = Context::new();
        ctx.register_module(&module, &mut directives).expect("register");
        ctx.finalize(&mut directives);
        (ctx, directives)
    }

    fn generate_text(
        ctx: &Context,
        directives: &mut DirectiveSet,
        rule: EncodingRule,
        kind: FragmentKind,
        proto: &str,
    ) -> String {
        let mut diags = Diagnostics::new();
        let frags = generate(ctx, directives, rule, &mut diags);
        frags.get(proto, kind).unwrap_or("").to_string()
    }

    fn simple_module() -> Module {
        let mut module = Module::new("Test", TagDefault::Explicit);
        module.assignments.push(assign_type(
            "Message",
            seq(vec![
                member("id", integer()),
                Component::Member(Member::new("flag", Type::new(TypeKind::Boolean)).optional()),
            ]),
        ));
        module
    }

    #[test]
    fn test_ber_sequence_emits_table_and_body() {
        let (ctx, mut directives) = build(simple_module(), "");
        let text = generate_text(&ctx, &mut directives, EncodingRule::Ber, FragmentKind::Fn, "test");
        assert!(text.contains("static const ber_sequence_t Message_sequence[] = {"));
        assert!(text.contains("dissect_ber_sequence(implicit_tag, actx, tree, tvb, offset, Message_sequence, hf_index, ett_test_Message);"));
        assert!(text.contains("BER_FLAGS_OPTIONAL"));
    }

    #[test]
    fn test_hf_fragments_cover_fields() {
        let (ctx, mut directives) = build(simple_module(), "");
        let hf = generate_text(&ctx, &mut directives, EncodingRule::Ber, FragmentKind::Hf, "test");
        assert!(hf.contains("static int hf_test_id = -1;"));
        assert!(hf.contains("static int hf_test_flag = -1;"));
        let arr =
            generate_text(&ctx, &mut directives, EncodingRule::Ber, FragmentKind::HfArr, "test");
        assert!(arr.contains("\"test.id\""));
        assert!(arr.contains("FT_BOOLEAN"));
    }

    #[test]
    fn test_per_constrained_integer_uses_bounds() {
        let mut module = Module::new("Test", TagDefault::Explicit);
        module.assignments.push(assign_type(
            "Message",
            seq(vec![member(
                "id",
                integer().with_constraint(Constraint::ValueRange {
                    lo: Some(Value::Integer(0)),
                    hi: Some(Value::Integer(255)),
                    extensible: false,
                }),
            )]),
        ));
        let (ctx, mut directives) = build(module, "");
        let text = generate_text(&ctx, &mut directives, EncodingRule::Per, FragmentKind::Fn, "test");
        assert!(text.contains("dissect_per_constrained_integer(tvb, offset, actx, tree, hf_index, 0, 255, NULL, false);"));
    }

    #[test]
    fn test_unbounded_octet_string_uses_sentinel() {
        let mut module = Module::new("Test", TagDefault::Explicit);
        module.assignments.push(assign_type(
            "Blob",
            Type::new(TypeKind::OctetString),
        ));
        let (ctx, mut directives) = build(module, "");
        let text = generate_text(&ctx, &mut directives, EncodingRule::Per, FragmentKind::Fn, "test");
        assert!(text.contains("NO_BOUND, NO_BOUND"));
    }

    #[test]
    fn test_untagged_choice_member_defers_to_runtime() {
        let mut module = Module::new("Test", TagDefault::Explicit);
        module.assignments.push(assign_type(
            "Wrapper",
            seq(vec![member(
                "pick",
                Type::new(TypeKind::Choice(ComponentList::new(vec![
                    member("a", integer()),
                    member("b", Type::new(TypeKind::Boolean)),
                ]))),
            )]),
        ));
        let (ctx, mut directives) = build(module, "");
        let text = generate_text(&ctx, &mut directives, EncodingRule::Ber, FragmentKind::Fn, "test");
        // the member entry cannot name a tag; runtime inspection decides
        assert!(text.contains("BER_CLASS_ANY, -1"));
        assert!(text.contains("dissect_ber_choice(actx"));
    }

    #[test]
    fn test_body_override_substitutes_params() {
        let cnf = "#.FN_BODY Message\noffset = custom(%(TVB), %(OFFSET), %(HF_INDEX));\n#.END\n";
        let (ctx, mut directives) = build(simple_module(), cnf);
        let text = generate_text(&ctx, &mut directives, EncodingRule::Ber, FragmentKind::Fn, "test");
        assert!(text.contains("offset = custom(tvb, offset, hf_index);"));
        assert!(!text.contains("dissect_ber_sequence(implicit_tag, actx, tree, tvb, offset, Message_sequence"));
    }

    #[test]
    fn test_body_override_unknown_param_diagnosed() {
        let cnf = "#.FN_BODY Message\nx = %(NOT_A_PARAM);\n#.END\n";
        let (ctx, mut directives) = build(simple_module(), cnf);
        let mut diags = Diagnostics::new();
        let frags = generate(&ctx, &mut directives, EncodingRule::Ber, &mut diags);
        let text = frags.get("test", FragmentKind::Fn).unwrap();
        assert!(text.contains("x = %(NOT_A_PARAM);"));
        assert!(diags.iter().any(|d| d.message.contains("unknown parameter")));
    }

    #[test]
    fn test_type_level_override_beats_first_path() {
        let cnf = concat!(
            "#.FN_BODY Message\n",
            "offset = type_level();\n",
            "#.FN_BODY Test/Message\n",
            "offset = path_level();\n",
            "#.END\n"
        );
        let (ctx, mut directives) = build(simple_module(), cnf);
        let text = generate_text(&ctx, &mut directives, EncodingRule::Ber, FragmentKind::Fn, "test");
        assert!(text.contains("type_level()"));
        assert!(!text.contains("path_level()"));
    }

    #[test]
    fn test_first_path_override_is_fallback() {
        let cnf = "#.FN_BODY Test/Message\noffset = path_level();\n#.END\n";
        let (ctx, mut directives) = build(simple_module(), cnf);
        let text = generate_text(&ctx, &mut directives, EncodingRule::Ber, FragmentKind::Fn, "test");
        assert!(text.contains("path_level()"));
    }

    #[test]
    fn test_enumerated_value_table_in_declaration_order() {
        let mut module = Module::new("Test", TagDefault::Explicit);
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
        let (ctx, mut directives) = build(module, "");
        let text = generate_text(&ctx, &mut directives, EncodingRule::Ber, FragmentKind::Fn, "test");
        let expected = "static const value_string Color_vals[] = {\n  {   0, \"red\" },\n  {   1, \"green\" },\n  {   2, \"blue\" },\n  { 0, NULL }\n};\n\n";
        assert!(text.contains(expected));
    }

    #[test]
    fn test_forward_decls_precede_cycle_bodies() {
        let mut module = Module::new("Test", TagDefault::Explicit);
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
        let (ctx, mut directives) = build(module, "");
        let text = generate_text(&ctx, &mut directives, EncodingRule::Ber, FragmentKind::Fn, "test");
        let proto_a = text.find("static int dissect_test_A(bool implicit_tag").unwrap();
        let body_a = text.find("static int\ndissect_test_A(").unwrap();
        assert!(proto_a < body_a);
    }

    #[test]
    fn test_no_emit_type_skipped() {
        let cnf = "#.NO_EMIT ONLY_TYPES\nMessage\n";
        let (ctx, mut directives) = build(simple_module(), cnf);
        let text = generate_text(&ctx, &mut directives, EncodingRule::Ber, FragmentKind::Fn, "test");
        assert!(!text.contains("static int\ndissect_test_Message("));
    }

    #[test]
    fn test_user_defined_gets_extern_prototype() {
        let cnf = "#.USER_DEFINED\nMessage\n";
        let (ctx, mut directives) = build(simple_module(), cnf);
        let text = generate_text(&ctx, &mut directives, EncodingRule::Ber, FragmentKind::Fn, "test");
        assert!(text.contains("extern int dissect_test_Message("));
        assert!(!text.contains("static int\ndissect_test_Message("));
    }

    #[test]
    fn test_pdu_registration_glue() {
        let cnf = "#.PDU\nMessage TABLE = app.port KEY = 397\n";
        let (ctx, mut directives) = build(simple_module(), cnf);
        let mut diags = Diagnostics::new();
        let frags = generate(&ctx, &mut directives, EncodingRule::Ber, &mut diags);
        let fn_text = frags.get("test", FragmentKind::Fn).unwrap();
        assert!(fn_text.contains("dissect_Message_PDU(tvbuff_t *tvb"));
        let table = frags.get("test", FragmentKind::Table).unwrap();
        assert_eq!(
            table,
            "  dissector_add_uint(\"app.port\", 397, create_dissector_handle(dissect_Message_PDU, proto_test));\n"
        );
    }

    #[test]
    fn test_oid_registration_glue() {
        let cnf = "#.REGISTER\nMessage OID = 2.5.4.3\n";
        let (ctx, mut directives) = build(simple_module(), cnf);
        let mut diags = Diagnostics::new();
        let frags = generate(&ctx, &mut directives, EncodingRule::Ber, &mut diags);
        let table = frags.get("test", FragmentKind::Table).unwrap();
        assert!(table.contains(
            "register_ber_oid_dissector(\"2.5.4.3\", dissect_Message_PDU, proto_test, \"Message\");"
        ));
    }

    #[test]
    fn test_exports_fragment() {
        let cnf = "#.EXPORTS\nMessage\n";
        let (ctx, mut directives) = build(simple_module(), cnf);
        let text = generate_text(&ctx, &mut directives, EncodingRule::Ber, FragmentKind::Exp, "test");
        assert!(text.contains("int dissect_test_Message("));
        assert!(!text.contains("static"));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let (ctx, mut directives) = build(simple_module(), "");
        let mut diags = Diagnostics::new();
        let first = generate(&ctx, &mut directives, EncodingRule::Ber, &mut diags);
        let second = generate(&ctx, &mut directives, EncodingRule::Ber, &mut diags);
        for kind in FragmentKind::ALL {
            assert_eq!(first.get("test", kind), second.get("test", kind));
        }
    }

    #[test]
    fn test_ett_fragments_for_structured_types() {
        let (ctx, mut directives) = build(simple_module(), "");
        let ett = generate_text(&ctx, &mut directives, EncodingRule::Ber, FragmentKind::Ett, "test");
        assert!(ett.contains("static int ett_test_Message = -1;"));
        let arr =
            generate_text(&ctx, &mut directives, EncodingRule::Ber, FragmentKind::EttArr, "test");
        assert!(arr.contains("    &ett_test_Message,"));
    }
}
