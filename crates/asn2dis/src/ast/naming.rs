//! Canonical naming of anonymous types
//!
//! Anonymous inline types get a deterministic name derived from context:
//! the member role for inline component types, the parent name for list
//! element types, the base name for a stripped tag level, and a bounds
//! suffix distinguishing constrained renditions of one base type. Global
//! uniqueness is NOT enforced here; the registration engine appends a
//! numeric suffix on collision.

use super::constraints::{Bound, Bounds};

/// Name for the anonymous type of a component member: `T_<member>`
pub fn member_type_name(member: &str) -> String {
    format!("T_{}", sanitize(member))
}

/// Name for the anonymous element type of a SEQUENCE OF / SET OF:
/// `<parent>_item`
pub fn element_type_name(parent: &str) -> String {
    format!("{}_item", parent)
}

/// Name for the inner type exposed by stripping one explicit tag level:
/// `<base>_U`
pub fn untagged_type_name(base: &str) -> String {
    format!("{}_U", base)
}

/// Suffix for a size-constrained rendition of a base type, empty for
/// open bounds: `_SIZE_4`, `_SIZE_1_8`
pub fn size_suffix(bounds: &Bounds) -> String {
    match (bounds.lo, bounds.hi) {
        (Bound::Open, Bound::Open) => String::new(),
        (Bound::Fixed(a), Bound::Fixed(b)) if a == b => format!("_SIZE_{}", bound_text(a)),
        (lo, hi) => format!("_SIZE_{}_{}", bound_part(lo), bound_part(hi)),
    }
}

/// Suffix for a value-range-constrained rendition: `_0_255`, `_M5_5`
pub fn range_suffix(bounds: &Bounds) -> String {
    match (bounds.lo, bounds.hi) {
        (Bound::Open, Bound::Open) => String::new(),
        (lo, hi) => format!("_{}_{}", bound_part(lo), bound_part(hi)),
    }
}

fn bound_part(bound: Bound) -> String {
    match bound {
        Bound::Open => "x".to_string(),
        Bound::Fixed(n) => bound_text(n),
    }
}

fn bound_text(n: i64) -> String {
    if n < 0 {
        format!("M{}", -n)
    } else {
        n.to_string()
    }
}

/// Identifiers in the notation allow hyphens; generated identifiers do not
pub fn sanitize(name: &str) -> String {
    name.replace('-', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_role_name() {
        assert_eq!(member_type_name("call-id"), "T_call_id");
    }

    #[test]
    fn test_element_name() {
        assert_eq!(element_type_name("CallList"), "CallList_item");
    }

    #[test]
    fn test_untagged_name() {
        assert_eq!(untagged_type_name("Payload"), "Payload_U");
    }

    #[test]
    fn test_size_suffix() {
        assert_eq!(size_suffix(&Bounds::OPEN), "");
        assert_eq!(size_suffix(&Bounds::fixed(4, 4)), "_SIZE_4");
        assert_eq!(size_suffix(&Bounds::fixed(1, 8)), "_SIZE_1_8");
        let half = Bounds {
            lo: Bound::Fixed(4),
            hi: Bound::Open,
            extensible: false,
        };
        assert_eq!(size_suffix(&half), "_SIZE_4_x");
    }

    #[test]
    fn test_range_suffix() {
        assert_eq!(range_suffix(&Bounds::OPEN), "");
        assert_eq!(range_suffix(&Bounds::fixed(0, 255)), "_0_255");
        assert_eq!(range_suffix(&Bounds::fixed(-5, 5)), "_M5_5");
    }
}
