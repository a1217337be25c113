//! Default function bodies for the packed position-dependent rule
//!
//! One template per AST variant. Statically unbounded constraints pass
//! the `NO_BOUND` sentinel, telling the runtime primitive to read a
//! length determinant from the stream instead.

use crate::ast::{size_bounds, Bound, TypeKind};
use crate::sema::TypeRecord;

/// Default body template for one record under the PER-style rule
pub(super) fn body_template(record: &TypeRecord) -> String {
    match &record.ty.kind {
        TypeKind::Boolean => {
            "offset = dissect_per_boolean(%(TVB), %(OFFSET), %(ACTX), %(TREE), %(HF_INDEX), NULL);".to_string()
        }
        TypeKind::Integer { .. } => {
            let bounds = crate::ast::value_bounds(record.ty.constraint.as_ref());
            if bounds.lo == Bound::Open && bounds.hi == Bound::Open {
                "offset = dissect_per_integer(%(TVB), %(OFFSET), %(ACTX), %(TREE), %(HF_INDEX), NULL);".to_string()
            } else {
                "offset = dissect_per_constrained_integer(%(TVB), %(OFFSET), %(ACTX), %(TREE), %(HF_INDEX), %(MIN_VAL), %(MAX_VAL), NULL, %(EXT));".to_string()
            }
        }
        TypeKind::Enumerated { items, .. } => format!(
            "offset = dissect_per_enumerated(%(TVB), %(OFFSET), %(ACTX), %(TREE), %(HF_INDEX), {}, NULL, %(EXT), 0, NULL);",
            items.len()
        ),
        TypeKind::Real => {
            "offset = dissect_per_real(%(TVB), %(OFFSET), %(ACTX), %(TREE), %(HF_INDEX), NULL);".to_string()
        }
        TypeKind::BitString { .. } => {
            "offset = dissect_per_bit_string(%(TVB), %(OFFSET), %(ACTX), %(TREE), %(HF_INDEX), %(MIN_VAL), %(MAX_VAL), %(EXT), NULL, 0, NULL, NULL);".to_string()
        }
        TypeKind::OctetString => {
            "offset = dissect_per_octet_string(%(TVB), %(OFFSET), %(ACTX), %(TREE), %(HF_INDEX), %(MIN_VAL), %(MAX_VAL), %(EXT), NULL);".to_string()
        }
        TypeKind::Null => {
            "offset = dissect_per_null(%(TVB), %(OFFSET), %(ACTX), %(TREE), %(HF_INDEX), NULL);".to_string()
        }
        TypeKind::ObjectIdentifier => {
            "offset = dissect_per_object_identifier(%(TVB), %(OFFSET), %(ACTX), %(TREE), %(HF_INDEX), NULL);".to_string()
        }
        TypeKind::RelativeOid => {
            "offset = dissect_per_relative_oid(%(TVB), %(OFFSET), %(ACTX), %(TREE), %(HF_INDEX), NULL);".to_string()
        }
        TypeKind::CharacterString(kind) => format!(
            "offset = dissect_per_{}(%(TVB), %(OFFSET), %(ACTX), %(TREE), %(HF_INDEX), %(MIN_VAL), %(MAX_VAL), %(EXT));",
            kind.keyword()
        ),
        TypeKind::Sequence(_) => {
            "offset = dissect_per_sequence(%(TVB), %(OFFSET), %(ACTX), %(TREE), %(HF_INDEX), %(ETT_INDEX), %(TYPE_NAME)_sequence);".to_string()
        }
        TypeKind::Set(_) => {
            "offset = dissect_per_sequence(%(TVB), %(OFFSET), %(ACTX), %(TREE), %(HF_INDEX), %(ETT_INDEX), %(TYPE_NAME)_set);".to_string()
        }
        TypeKind::SequenceOf(_) | TypeKind::SetOf(_) => {
            let table = if matches!(record.ty.kind, TypeKind::SequenceOf(_)) {
                "%(TYPE_NAME)_sequence_of"
            } else {
                "%(TYPE_NAME)_set_of"
            };
            let bounds = size_bounds(record.ty.constraint.as_ref());
            if bounds.lo == Bound::Open && bounds.hi == Bound::Open {
                format!(
                    "offset = dissect_per_sequence_of(%(TVB), %(OFFSET), %(ACTX), %(TREE), %(HF_INDEX), %(ETT_INDEX), {});",
                    table
                )
            } else {
                format!(
                    "offset = dissect_per_constrained_sequence_of(%(TVB), %(OFFSET), %(ACTX), %(TREE), %(HF_INDEX), %(ETT_INDEX), {}, %(MIN_VAL), %(MAX_VAL), %(EXT));",
                    table
                )
            }
        }
        TypeKind::Choice(_) => {
            "offset = dissect_per_choice(%(TVB), %(OFFSET), %(ACTX), %(TREE), %(HF_INDEX), %(ETT_INDEX), %(TYPE_NAME)_choice, NULL);".to_string()
        }
        // Tags are invisible to the packed rule; delegate to the inner type
        TypeKind::Tagged { .. } | TypeKind::TypeRef { .. } | TypeKind::Selection { .. } => {
            "offset = %(INNER_FN)(%(TVB), %(OFFSET), %(ACTX), %(TREE), %(HF_INDEX));".to_string()
        }
        TypeKind::OpenType | TypeKind::Any => {
            "offset = dissect_per_open_type(%(TVB), %(OFFSET), %(ACTX), %(TREE), %(HF_INDEX), NULL);".to_string()
        }
        TypeKind::External | TypeKind::InstanceOf { .. } | TypeKind::EmbeddedPdv => {
            "offset = dissect_per_external_type(%(TVB), %(OFFSET), %(ACTX), %(TREE), %(HF_INDEX), NULL);".to_string()
        }
    }
}

/// Function signature under the PER-style rule
pub(super) fn signature(fn_name: &str, exported: bool) -> String {
    let linkage = if exported { "" } else { "static " };
    format!(
        "{}int\n{}(tvbuff_t *tvb, int offset, asn1_ctx_t *actx, proto_tree *tree, int hf_index)",
        linkage, fn_name
    )
}

/// Prototype line matching [`signature`]
pub(super) fn prototype(fn_name: &str, exported: bool) -> String {
    let linkage = if exported { "" } else { "static " };
    format!(
        "{}int {}(tvbuff_t *tvb, int offset, asn1_ctx_t *actx, proto_tree *tree, int hf_index);",
        linkage, fn_name
    )
}
