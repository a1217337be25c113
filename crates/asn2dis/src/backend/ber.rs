//! Default function bodies for the self-describing tag-length-value rule
//!
//! One template per AST variant, parameterized over the shared body
//! parameter set. Runtime primitives follow the host engine's `ber`
//! dissection API.

use crate::ast::TypeKind;
use crate::sema::TypeRecord;

/// Default body template for one record under the BER-style rule
pub(super) fn body_template(record: &TypeRecord) -> String {
    match &record.ty.kind {
        TypeKind::Boolean => {
            "offset = dissect_ber_boolean(%(IMPLICIT_TAG), %(ACTX), %(TREE), %(TVB), %(OFFSET), %(HF_INDEX), NULL);".to_string()
        }
        TypeKind::Integer { .. } | TypeKind::Enumerated { .. } => {
            "offset = dissect_ber_integer(%(IMPLICIT_TAG), %(ACTX), %(TREE), %(TVB), %(OFFSET), %(HF_INDEX), NULL);".to_string()
        }
        TypeKind::Real => {
            "offset = dissect_ber_real(%(IMPLICIT_TAG), %(ACTX), %(TREE), %(TVB), %(OFFSET), %(HF_INDEX), NULL);".to_string()
        }
        TypeKind::BitString { .. } => {
            "offset = dissect_ber_bitstring(%(IMPLICIT_TAG), %(ACTX), %(TREE), %(TVB), %(OFFSET), NULL, 0, %(HF_INDEX), %(ETT_INDEX), NULL);".to_string()
        }
        TypeKind::OctetString => {
            "offset = dissect_ber_octet_string(%(IMPLICIT_TAG), %(ACTX), %(TREE), %(TVB), %(OFFSET), %(HF_INDEX), NULL);".to_string()
        }
        TypeKind::Null => {
            "offset = dissect_ber_null(%(IMPLICIT_TAG), %(ACTX), %(TREE), %(TVB), %(OFFSET), %(HF_INDEX));".to_string()
        }
        TypeKind::ObjectIdentifier => {
            "offset = dissect_ber_object_identifier(%(IMPLICIT_TAG), %(ACTX), %(TREE), %(TVB), %(OFFSET), %(HF_INDEX), NULL);".to_string()
        }
        TypeKind::RelativeOid => {
            "offset = dissect_ber_relative_oid(%(IMPLICIT_TAG), %(ACTX), %(TREE), %(TVB), %(OFFSET), %(HF_INDEX), NULL);".to_string()
        }
        TypeKind::CharacterString(kind) => format!(
            "offset = dissect_ber_restricted_string(%(IMPLICIT_TAG), BER_UNI_TAG_{}, %(ACTX), %(TREE), %(TVB), %(OFFSET), %(HF_INDEX), NULL);",
            kind.keyword()
        ),
        TypeKind::Sequence(_) => {
            "offset = dissect_ber_sequence(%(IMPLICIT_TAG), %(ACTX), %(TREE), %(TVB), %(OFFSET), %(TYPE_NAME)_sequence, %(HF_INDEX), %(ETT_INDEX));".to_string()
        }
        TypeKind::Set(_) => {
            "offset = dissect_ber_set(%(IMPLICIT_TAG), %(ACTX), %(TREE), %(TVB), %(OFFSET), %(TYPE_NAME)_set, %(HF_INDEX), %(ETT_INDEX));".to_string()
        }
        TypeKind::SequenceOf(_) => {
            "offset = dissect_ber_sequence_of(%(IMPLICIT_TAG), %(ACTX), %(TREE), %(TVB), %(OFFSET), %(TYPE_NAME)_sequence_of, %(HF_INDEX), %(ETT_INDEX));".to_string()
        }
        TypeKind::SetOf(_) => {
            "offset = dissect_ber_set_of(%(IMPLICIT_TAG), %(ACTX), %(TREE), %(TVB), %(OFFSET), %(TYPE_NAME)_set_of, %(HF_INDEX), %(ETT_INDEX));".to_string()
        }
        // The choice helper inspects the outer tag at runtime; a CHOICE
        // with no tag of its own cannot decide earlier
        TypeKind::Choice(_) => {
            "offset = dissect_ber_choice(%(ACTX), %(TREE), %(TVB), %(OFFSET), %(TYPE_NAME)_choice, %(HF_INDEX), %(ETT_INDEX), NULL);".to_string()
        }
        // Wrapper records exist only for explicit tag levels, so the
        // inner type always carries its own tag
        TypeKind::Tagged { .. } => {
            "offset = dissect_ber_tagged_type(%(IMPLICIT_TAG), %(ACTX), %(TREE), %(TVB), %(OFFSET), %(HF_INDEX), %(TAG_CLASS), %(TAG_NUMBER), false, %(INNER_FN));".to_string()
        }
        TypeKind::TypeRef { .. } | TypeKind::Selection { .. } => {
            "offset = %(INNER_FN)(%(IMPLICIT_TAG), %(TVB), %(OFFSET), %(ACTX), %(TREE), %(HF_INDEX));".to_string()
        }
        TypeKind::OpenType | TypeKind::Any => {
            "offset = dissect_unknown_ber(%(ACTX)->pinfo, %(TVB), %(OFFSET), %(TREE));".to_string()
        }
        TypeKind::External | TypeKind::InstanceOf { .. } => {
            "offset = dissect_ber_external_type(%(IMPLICIT_TAG), %(TREE), %(TVB), %(OFFSET), %(ACTX), %(HF_INDEX), NULL);".to_string()
        }
        TypeKind::EmbeddedPdv => {
            "offset = dissect_ber_EmbeddedPDV_Type(%(IMPLICIT_TAG), %(TREE), %(TVB), %(OFFSET), %(ACTX), %(HF_INDEX), NULL);".to_string()
        }
    }
}

/// Function signature under the BER-style rule
pub(super) fn signature(fn_name: &str, exported: bool) -> String {
    let linkage = if exported { "" } else { "static " };
    format!(
        "{}int\n{}(bool implicit_tag, tvbuff_t *tvb, int offset, asn1_ctx_t *actx, proto_tree *tree, int hf_index)",
        linkage, fn_name
    )
}

/// Prototype line matching [`signature`]
pub(super) fn prototype(fn_name: &str, exported: bool) -> String {
    let linkage = if exported { "" } else { "static " };
    format!(
        "{}int {}(bool implicit_tag, tvbuff_t *tvb, int offset, asn1_ctx_t *actx, proto_tree *tree, int hf_index);",
        linkage, fn_name
    )
}
