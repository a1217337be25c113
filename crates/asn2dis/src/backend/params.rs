//! Override-body parameters
//!
//! Custom function bodies from directive files interpolate `%(NAME)`
//! holes against the same closed parameter set the default bodies use.
//! The map is typed: an unknown or unavailable name is a substitution
//! error, not silent text pass-through.

use std::collections::BTreeMap;
use std::fmt;

/// Closed set of interpolation parameter names
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BodyParam {
    Tvb,
    Offset,
    Actx,
    Tree,
    HfIndex,
    EttIndex,
    ImplicitTag,
    TypeName,
    FnName,
    Proto,
    TagClass,
    TagNumber,
    MinVal,
    MaxVal,
    Ext,
    InnerFn,
}

impl BodyParam {
    pub const ALL: [BodyParam; 16] = [
        BodyParam::Tvb,
        BodyParam::Offset,
        BodyParam::Actx,
        BodyParam::Tree,
        BodyParam::HfIndex,
        BodyParam::EttIndex,
        BodyParam::ImplicitTag,
        BodyParam::TypeName,
        BodyParam::FnName,
        BodyParam::Proto,
        BodyParam::TagClass,
        BodyParam::TagNumber,
        BodyParam::MinVal,
        BodyParam::MaxVal,
        BodyParam::Ext,
        BodyParam::InnerFn,
    ];

    pub fn key(self) -> &'static str {
        match self {
            BodyParam::Tvb => "TVB",
            BodyParam::Offset => "OFFSET",
            BodyParam::Actx => "ACTX",
            BodyParam::Tree => "TREE",
            BodyParam::HfIndex => "HF_INDEX",
            BodyParam::EttIndex => "ETT_INDEX",
            BodyParam::ImplicitTag => "IMPLICIT_TAG",
            BodyParam::TypeName => "TYPE_NAME",
            BodyParam::FnName => "FN_NAME",
            BodyParam::Proto => "PROTO",
            BodyParam::TagClass => "TAG_CLASS",
            BodyParam::TagNumber => "TAG_NUMBER",
            BodyParam::MinVal => "MIN_VAL",
            BodyParam::MaxVal => "MAX_VAL",
            BodyParam::Ext => "EXT",
            BodyParam::InnerFn => "INNER_FN",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.key() == key)
    }
}

impl fmt::Display for BodyParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Typed parameter values for one function body
#[derive(Debug, Clone, Default)]
pub struct ParamMap {
    values: BTreeMap<BodyParam, String>,
}

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, param: BodyParam, value: impl Into<String>) -> &mut Self {
        self.values.insert(param, value.into());
        self
    }

    pub fn get(&self, param: BodyParam) -> Option<&str> {
        self.values.get(&param).map(String::as_str)
    }
}

/// A substitution failure, reported with the offending name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamError {
    Unknown(String),
    Unavailable(BodyParam),
}

impl fmt::Display for ParamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamError::Unknown(name) => write!(f, "unknown parameter '{}'", name),
            ParamError::Unavailable(p) => write!(f, "parameter '{}' not available here", p.key()),
        }
    }
}

/// Substitute every `%(NAME)` hole in `template`. Returns the first
/// failure alongside the partially substituted text so callers can keep
/// the user's text while reporting the error.
pub fn interpolate(template: &str, params: &ParamMap) -> (String, Vec<ParamError>) {
    let mut out = String::with_capacity(template.len());
    let mut errors = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("%(") {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 2..];
        match tail.find(')') {
            Some(end) => {
                let name = &tail[..end];
                match BodyParam::from_key(name) {
                    Some(param) => match params.get(param) {
                        Some(value) => out.push_str(value),
                        None => {
                            errors.push(ParamError::Unavailable(param));
                            out.push_str(&rest[start..start + 2 + end + 1]);
                        }
                    },
                    None => {
                        errors.push(ParamError::Unknown(name.to_string()));
                        out.push_str(&rest[start..start + 2 + end + 1]);
                    }
                }
                rest = &tail[end + 1..];
            }
            None => {
                // Unterminated hole: keep verbatim
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    (out, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ParamMap {
        let mut map = ParamMap::new();
        map.set(BodyParam::Tvb, "tvb")
            .set(BodyParam::Offset, "offset")
            .set(BodyParam::HfIndex, "hf_index");
        map
    }

    #[test]
    fn test_substitutes_known_params() {
        let (text, errors) =
            interpolate("offset = f(%(TVB), %(OFFSET), %(HF_INDEX));", &params());
        assert!(errors.is_empty());
        assert_eq!(text, "offset = f(tvb, offset, hf_index);");
    }

    #[test]
    fn test_unknown_param_is_error_and_kept() {
        let (text, errors) = interpolate("x = %(BOGUS);", &params());
        assert_eq!(errors, vec![ParamError::Unknown("BOGUS".to_string())]);
        assert_eq!(text, "x = %(BOGUS);");
    }

    #[test]
    fn test_unavailable_param_is_error_and_kept() {
        let (text, errors) = interpolate("x = %(MIN_VAL);", &params());
        assert_eq!(errors, vec![ParamError::Unavailable(BodyParam::MinVal)]);
        assert_eq!(text, "x = %(MIN_VAL);");
    }

    #[test]
    fn test_unterminated_hole_kept_verbatim() {
        let (text, errors) = interpolate("x = %(TVB", &params());
        assert!(errors.is_empty());
        assert_eq!(text, "x = %(TVB");
    }

    #[test]
    fn test_key_round_trip() {
        for param in BodyParam::ALL {
            assert_eq!(BodyParam::from_key(param.key()), Some(param));
        }
        assert_eq!(BodyParam::from_key("NOPE"), None);
    }
}
