//! Constraint nodes and bound extraction
//!
//! Bound extraction flattens a (possibly nested) constraint tree into a
//! single [`Bounds`] value:
//!
//! - Intersection: max of minimums, min of maximums, extensible only if
//!   both sides are
//! - Union: min of minimums, max of maximums, extensible if either side is
//! - Unconstrained: open sentinel bounds on both ends
//!
//! Intersecting anything with an open bound is a no-op on that end.

use super::types::Type;
use super::values::Value;

/// Closed set of constraint variants
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    SingleValue(Value),
    ValueRange {
        lo: Option<Value>,
        hi: Option<Value>,
        extensible: bool,
    },
    Size(Box<Constraint>),
    PermittedAlphabet(Box<Constraint>),
    Contents(Box<Type>),
    Intersection(Vec<Constraint>),
    Union(Vec<Constraint>),
}

impl Constraint {
    /// `SIZE(n..m)` shorthand used heavily in tests
    pub fn size_range(lo: i64, hi: i64) -> Self {
        Constraint::Size(Box::new(Constraint::ValueRange {
            lo: Some(Value::Integer(lo)),
            hi: Some(Value::Integer(hi)),
            extensible: false,
        }))
    }
}

/// One end of a bounds pair; `Open` is the unconstrained sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Open,
    Fixed(i64),
}

impl Bound {
    pub fn value(self) -> Option<i64> {
        match self {
            Bound::Open => None,
            Bound::Fixed(n) => Some(n),
        }
    }

    fn max_lo(self, other: Bound) -> Bound {
        match (self, other) {
            (Bound::Open, b) | (b, Bound::Open) => b,
            (Bound::Fixed(a), Bound::Fixed(b)) => Bound::Fixed(a.max(b)),
        }
    }

    fn min_hi(self, other: Bound) -> Bound {
        match (self, other) {
            (Bound::Open, b) | (b, Bound::Open) => b,
            (Bound::Fixed(a), Bound::Fixed(b)) => Bound::Fixed(a.min(b)),
        }
    }

    fn min_lo(self, other: Bound) -> Bound {
        match (self, other) {
            (Bound::Open, _) | (_, Bound::Open) => Bound::Open,
            (Bound::Fixed(a), Bound::Fixed(b)) => Bound::Fixed(a.min(b)),
        }
    }

    fn max_hi(self, other: Bound) -> Bound {
        match (self, other) {
            (Bound::Open, _) | (_, Bound::Open) => Bound::Open,
            (Bound::Fixed(a), Bound::Fixed(b)) => Bound::Fixed(a.max(b)),
        }
    }
}

/// Extracted lower/upper bounds plus extensibility
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub lo: Bound,
    pub hi: Bound,
    pub extensible: bool,
}

impl Bounds {
    pub const OPEN: Bounds = Bounds {
        lo: Bound::Open,
        hi: Bound::Open,
        extensible: false,
    };

    pub fn fixed(lo: i64, hi: i64) -> Self {
        Self {
            lo: Bound::Fixed(lo),
            hi: Bound::Fixed(hi),
            extensible: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.lo == Bound::Open && self.hi == Bound::Open
    }

    pub fn intersect(self, other: Bounds) -> Bounds {
        Bounds {
            lo: self.lo.max_lo(other.lo),
            hi: self.hi.min_hi(other.hi),
            extensible: self.extensible && other.extensible,
        }
    }

    pub fn union_with(self, other: Bounds) -> Bounds {
        Bounds {
            lo: self.lo.min_lo(other.lo),
            hi: self.hi.max_hi(other.hi),
            extensible: self.extensible || other.extensible,
        }
    }
}

/// Extract size bounds from a constraint tree. Non-size atoms contribute
/// open bounds, so intersecting past them is a no-op.
pub fn size_bounds(constraint: Option<&Constraint>) -> Bounds {
    match constraint {
        None => Bounds::OPEN,
        Some(c) => size_bounds_of(c),
    }
}

fn size_bounds_of(constraint: &Constraint) -> Bounds {
    match constraint {
        Constraint::Size(inner) => range_bounds(inner),
        Constraint::Intersection(parts) => intersect_all(parts.iter().map(size_bounds_of)),
        Constraint::Union(parts) => parts
            .iter()
            .map(size_bounds_of)
            .reduce(Bounds::union_with)
            .unwrap_or(Bounds::OPEN),
        _ => Bounds::OPEN,
    }
}

/// Intersect a sequence of bounds, skipping the fully-open neutral ones so
/// that unconstrained atoms are a no-op (including for extensibility).
fn intersect_all(parts: impl Iterator<Item = Bounds>) -> Bounds {
    parts
        .filter(|b| *b != Bounds::OPEN)
        .reduce(Bounds::intersect)
        .unwrap_or(Bounds::OPEN)
}

/// Extract value-range bounds from a constraint tree (INTEGER and
/// ENUMERATED constraints).
pub fn value_bounds(constraint: Option<&Constraint>) -> Bounds {
    match constraint {
        None => Bounds::OPEN,
        Some(c) => range_bounds(c),
    }
}

fn range_bounds(constraint: &Constraint) -> Bounds {
    match constraint {
        Constraint::SingleValue(v) => match v.as_integer() {
            Some(n) => Bounds::fixed(n, n),
            None => Bounds::OPEN,
        },
        Constraint::ValueRange { lo, hi, extensible } => Bounds {
            lo: int_bound(lo.as_ref()),
            hi: int_bound(hi.as_ref()),
            extensible: *extensible,
        },
        Constraint::Intersection(parts) => intersect_all(parts.iter().map(range_bounds)),
        Constraint::Union(parts) => parts
            .iter()
            .map(range_bounds)
            .reduce(Bounds::union_with)
            .unwrap_or(Bounds::OPEN),
        _ => Bounds::OPEN,
    }
}

fn int_bound(value: Option<&Value>) -> Bound {
    match value.and_then(Value::as_integer) {
        Some(n) => Bound::Fixed(n),
        None => Bound::Open,
    }
}
