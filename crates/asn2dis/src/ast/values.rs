//! Value nodes

/// A value of the specification language
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Real(f64),
    /// Quoted character string literal
    String(String),
    /// Raw text of a binary (`'1010'B`) or hex (`'DEAD'H`) string
    BitHexString(String),
    /// Reference to a value assigned elsewhere
    ValueRef(String),
    ObjectIdentifier(Vec<OidComponent>),
    Choice { arm: String, value: Box<Value> },
    Null,
}

impl Value {
    /// Integer payload if this value is (or trivially names) one
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

/// One arc of an object identifier value: `iso`, `3`, or `identified(4)`
#[derive(Debug, Clone, PartialEq)]
pub struct OidComponent {
    pub name: Option<String>,
    pub number: Option<u64>,
}

impl OidComponent {
    pub fn number(number: u64) -> Self {
        Self {
            name: None,
            number: Some(number),
        }
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            number: None,
        }
    }

    pub fn named_number(name: impl Into<String>, number: u64) -> Self {
        Self {
            name: Some(name.into()),
            number: Some(number),
        }
    }
}

/// Render an OID value in dotted-decimal form where the arcs are numeric,
/// keeping symbolic arcs by name. Used for registration-by-OID glue.
pub fn oid_to_string(components: &[OidComponent]) -> String {
    let mut parts = Vec::with_capacity(components.len());
    for c in components {
        match (c.number, &c.name) {
            (Some(n), _) => parts.push(n.to_string()),
            (None, Some(name)) => parts.push(name.clone()),
            (None, None) => parts.push("?".to_string()),
        }
    }
    parts.join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oid_to_string() {
        let oid = vec![
            OidComponent::name("iso"),
            OidComponent::named_number("member-body", 2),
            OidComponent::number(840),
        ];
        assert_eq!(oid_to_string(&oid), "iso.2.840");
    }
}
