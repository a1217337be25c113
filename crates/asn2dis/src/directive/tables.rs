//! Typed directive tables
//!
//! Each table kind has its own value type wrapped in a shared entry
//! carrying provenance and a used flag. `use_item` marks an entry used
//! and falls back to the table default; `check_item` probes without
//! marking. Entries still unused at end of run are stale configuration
//! and get reported as hygiene warnings.

use crate::common::Diagnostics;
use std::collections::BTreeMap;
use std::fmt;

/// Source position of a directive entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub file: String,
    pub line: usize,
}

impl Provenance {
    pub fn new(file: impl Into<String>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// One keyed entry with provenance and a used flag
#[derive(Debug, Clone)]
pub struct Entry<T> {
    pub value: T,
    pub provenance: Provenance,
    pub used: bool,
}

/// A keyed directive table of one value kind
#[derive(Debug, Clone)]
pub struct Table<T> {
    name: &'static str,
    entries: BTreeMap<String, Entry<T>>,
    default: Option<T>,
}

impl<T> Table<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: BTreeMap::new(),
            default: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Insert an entry; returns the provenance of a replaced entry so the
    /// caller can report the override
    pub fn insert(&mut self, key: impl Into<String>, value: T, provenance: Provenance) -> Option<Provenance> {
        self.entries
            .insert(
                key.into(),
                Entry {
                    value,
                    provenance,
                    used: false,
                },
            )
            .map(|old| old.provenance)
    }

    pub fn set_default(&mut self, value: T) {
        self.default = Some(value);
    }

    /// Return the override for `key` (or the table default) and mark the
    /// entry used
    pub fn use_item(&mut self, key: &str) -> Option<&T> {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.used = true;
                Some(&entry.value)
            }
            None => self.default.as_ref(),
        }
    }

    /// Probe for an entry without marking it used
    pub fn check_item(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.entries.get(key).map(|e| &e.value)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deterministic iteration in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Entry<T>)> {
        self.entries.iter()
    }

    fn report_unused(&self, diags: &mut Diagnostics) {
        for (key, entry) in &self.entries {
            if !entry.used {
                diags.hygiene(
                    format!("unused {} entry '{}'", self.name, key),
                    entry.provenance.to_string(),
                );
            }
        }
    }
}

/// `#.MODULE`: module name → protocol abbreviation
#[derive(Debug, Clone)]
pub struct ModuleOpt {
    /// `None` when the entry used `-`, keeping the derived default
    pub proto: Option<String>,
}

/// `#.PDU`: a top-level type registered as an analysis entry point
#[derive(Debug, Clone, Default)]
pub struct PduOpt {
    pub register: Option<RegisterOpt>,
}

/// `#.REGISTER`: dissector-table registration target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOpt {
    DissectorTable { table: String, key: String },
    Oid { oid: String },
}

/// Sub-flags of `#.EXPORTS` / `#.NO_EMIT` / `#.USER_DEFINED`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagOpt {
    pub types: bool,
    pub values: bool,
    pub enums: bool,
}

impl Default for FlagOpt {
    fn default() -> Self {
        Self {
            types: true,
            values: true,
            enums: false,
        }
    }
}

impl FlagOpt {
    /// Apply a marker-line sub-flag word; false when unrecognized
    pub fn apply(&mut self, word: &str) -> bool {
        match word {
            "ONLY_TYPES" => {
                self.values = false;
                true
            }
            "ONLY_VALS" => {
                self.types = false;
                true
            }
            "WITH_ENUM" => {
                self.enums = true;
                true
            }
            _ => false,
        }
    }
}

/// `#.TYPE_RENAME` / `#.FIELD_RENAME`
#[derive(Debug, Clone)]
pub struct RenameOpt {
    pub new_name: String,
}

/// `#.TYPE_ATTR` / `#.FIELD_ATTR`: display-attribute overrides
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttrOpt {
    pub ftype: Option<String>,
    pub display: Option<String>,
    pub strings: Option<String>,
    pub bitmask: Option<String>,
    pub name: Option<String>,
    pub abbrev: Option<String>,
}

impl AttrOpt {
    /// Set one `KEY = value` pair; false for an unknown key. An empty
    /// value (`-` in the file) clears the attribute back to its default.
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        let slot = match key {
            "TYPE" => &mut self.ftype,
            "DISPLAY" => &mut self.display,
            "STRINGS" => &mut self.strings,
            "BITMASK" => &mut self.bitmask,
            "NAME" => &mut self.name,
            "ABBREV" => &mut self.abbrev,
            _ => return false,
        };
        *slot = if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        };
        true
    }
}

/// `#.FN_HDR` / `#.FN_BODY` / `#.FN_FTR`: verbatim override text
#[derive(Debug, Clone)]
pub struct BodyOpt {
    pub text: String,
}

/// The full set of override tables read by registration and generation
#[derive(Debug)]
pub struct DirectiveSet {
    pub modules: Table<ModuleOpt>,
    pub pdus: Table<PduOpt>,
    pub registrations: Table<RegisterOpt>,
    pub exports: Table<FlagOpt>,
    pub no_emit: Table<FlagOpt>,
    pub user_defined: Table<FlagOpt>,
    pub type_renames: Table<RenameOpt>,
    pub field_renames: Table<RenameOpt>,
    pub type_attrs: Table<AttrOpt>,
    pub field_attrs: Table<AttrOpt>,
    pub fn_hdrs: Table<BodyOpt>,
    pub fn_bodies: Table<BodyOpt>,
    pub fn_ftrs: Table<BodyOpt>,
}

impl DirectiveSet {
    pub fn new() -> Self {
        Self {
            modules: Table::new("MODULE"),
            pdus: Table::new("PDU"),
            registrations: Table::new("REGISTER"),
            exports: Table::new("EXPORTS"),
            no_emit: Table::new("NO_EMIT"),
            user_defined: Table::new("USER_DEFINED"),
            type_renames: Table::new("TYPE_RENAME"),
            field_renames: Table::new("FIELD_RENAME"),
            type_attrs: Table::new("TYPE_ATTR"),
            field_attrs: Table::new("FIELD_ATTR"),
            fn_hdrs: Table::new("FN_HDR"),
            fn_bodies: Table::new("FN_BODY"),
            fn_ftrs: Table::new("FN_FTR"),
        }
    }

    /// Report every entry never consumed by a full run
    pub fn report_unused(&self, diags: &mut Diagnostics) {
        self.modules.report_unused(diags);
        self.pdus.report_unused(diags);
        self.registrations.report_unused(diags);
        self.exports.report_unused(diags);
        self.no_emit.report_unused(diags);
        self.user_defined.report_unused(diags);
        self.type_renames.report_unused(diags);
        self.field_renames.report_unused(diags);
        self.type_attrs.report_unused(diags);
        self.field_attrs.report_unused(diags);
        self.fn_hdrs.report_unused(diags);
        self.fn_bodies.report_unused(diags);
        self.fn_ftrs.report_unused(diags);
    }
}

impl Default for DirectiveSet {
    fn default() -> Self {
        Self::new()
    }
}
