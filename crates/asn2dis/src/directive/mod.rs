//! Directive file processor
//!
//! Parses the line-oriented customization format into the typed override
//! tables of [`tables`]. A `#.MARKER` line switches the active table
//! context; ordinary lines are parsed per the active context's arity.
//! `-` means "no value", a trailing `#` comment is stripped, and free-text
//! tails are scanned incrementally into named `KEY = value` pairs.
//! `#.INCLUDE` fails hard when the file is missing, `#.IMPORT` skips
//! softly. Verbatim `#.FN_*` text runs until the next marker.

mod tables;

pub use tables::{
    AttrOpt, BodyOpt, DirectiveSet, Entry, FlagOpt, ModuleOpt, PduOpt, Provenance, RegisterOpt,
    RenameOpt, Table,
};

use crate::common::{CompileError, CompileResult, Diagnostics};
use std::fs;
use std::path::{Path, PathBuf};

/// Which verbatim-text table a `#.FN_*` marker feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Hdr,
    Body,
    Ftr,
}

/// Active table context between markers
#[derive(Debug)]
enum ParseContext {
    None,
    Module,
    Pdu,
    Register,
    Exports(FlagOpt),
    NoEmit(FlagOpt),
    UserDefined(FlagOpt),
    TypeRename,
    FieldRename,
    TypeAttr,
    FieldAttr,
    Body {
        kind: BodyKind,
        key: String,
        provenance: Provenance,
        lines: Vec<String>,
    },
}

/// Streaming parser feeding a [`DirectiveSet`]
pub struct DirectiveParser<'d> {
    set: &'d mut DirectiveSet,
    diags: &'d mut Diagnostics,
}

impl<'d> DirectiveParser<'d> {
    pub fn new(set: &'d mut DirectiveSet, diags: &'d mut Diagnostics) -> Self {
        Self { set, diags }
    }

    /// Load one directive file; `required` selects hard failure versus
    /// soft skip when the file cannot be read
    pub fn load_file(&mut self, path: &Path, required: bool) -> CompileResult<()> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if required => {
                return Err(CompileError::directive(
                    format!("cannot read directive file: {}", err),
                    path.display().to_string(),
                    0,
                ));
            }
            Err(_) => {
                self.diags.degraded(
                    "skipped missing import file",
                    path.display().to_string(),
                );
                return Ok(());
            }
        };
        self.parse_source(&text, &path.display().to_string(), path.parent())
    }

    /// Parse directive text. `base_dir` resolves nested includes.
    pub fn parse_source(
        &mut self,
        text: &str,
        file: &str,
        base_dir: Option<&Path>,
    ) -> CompileResult<()> {
        let mut context = ParseContext::None;

        for (idx, raw_line) in text.lines().enumerate() {
            let lineno = idx + 1;
            let line = raw_line.trim_end_matches('\r');

            if line.trim_start().starts_with("#.") {
                self.flush_body(&mut context);
                let stop = self.parse_marker(line.trim(), file, lineno, base_dir, &mut context)?;
                if stop {
                    break;
                }
                continue;
            }

            if let ParseContext::Body { lines, .. } = &mut context {
                // Verbatim override text: no comment stripping
                lines.push(line.to_string());
                continue;
            }

            let content = line.split('#').next().unwrap_or("").trim();
            if content.is_empty() {
                continue;
            }
            self.parse_entry(content, file, lineno, &context)?;
        }

        self.flush_body(&mut context);
        Ok(())
    }

    /// Handle one `#.MARKER [args]` line; true means stop reading the file
    fn parse_marker(
        &mut self,
        line: &str,
        file: &str,
        lineno: usize,
        base_dir: Option<&Path>,
        context: &mut ParseContext,
    ) -> CompileResult<bool> {
        let rest = &line[2..];
        let mut words = rest.split_whitespace();
        let marker = words.next().unwrap_or("");
        let args: Vec<&str> = words.collect();

        *context = match marker {
            "MODULE" => ParseContext::Module,
            "PDU" | "PDU_REGISTER" => ParseContext::Pdu,
            "REGISTER" => ParseContext::Register,
            "EXPORTS" => ParseContext::Exports(self.parse_flags(&args, file, lineno)?),
            "NO_EMIT" => ParseContext::NoEmit(self.parse_flags(&args, file, lineno)?),
            "USER_DEFINED" => ParseContext::UserDefined(self.parse_flags(&args, file, lineno)?),
            "TYPE_RENAME" => ParseContext::TypeRename,
            "FIELD_RENAME" => ParseContext::FieldRename,
            "TYPE_ATTR" => ParseContext::TypeAttr,
            "FIELD_ATTR" => ParseContext::FieldAttr,
            "FN_HDR" | "FN_BODY" | "FN_FTR" => {
                let key = args.first().ok_or_else(|| {
                    CompileError::directive(
                        format!("#.{} requires a type name", marker),
                        file,
                        lineno,
                    )
                })?;
                let kind = match marker {
                    "FN_HDR" => BodyKind::Hdr,
                    "FN_BODY" => BodyKind::Body,
                    _ => BodyKind::Ftr,
                };
                ParseContext::Body {
                    kind,
                    key: (*key).to_string(),
                    provenance: Provenance::new(file, lineno),
                    lines: Vec::new(),
                }
            }
            "INCLUDE" | "IMPORT" => {
                let arg = args.first().ok_or_else(|| {
                    CompileError::directive(
                        format!("#.{} requires a file path", marker),
                        file,
                        lineno,
                    )
                })?;
                let path = match base_dir {
                    Some(dir) => dir.join(arg),
                    None => PathBuf::from(arg),
                };
                self.load_file(&path, marker == "INCLUDE")?;
                ParseContext::None
            }
            "END" => ParseContext::None,
            "END_OF_CNF" => return Ok(true),
            other => {
                return Err(CompileError::directive(
                    format!("unknown directive marker '#.{}'", other),
                    file,
                    lineno,
                ));
            }
        };
        Ok(false)
    }

    fn parse_flags(&mut self, args: &[&str], file: &str, lineno: usize) -> CompileResult<FlagOpt> {
        let mut flags = FlagOpt::default();
        for word in args {
            if !flags.apply(word) {
                return Err(CompileError::directive(
                    format!("unknown sub-flag '{}'", word),
                    file,
                    lineno,
                ));
            }
        }
        Ok(flags)
    }

    /// Parse one ordinary line against the active context
    fn parse_entry(
        &mut self,
        content: &str,
        file: &str,
        lineno: usize,
        context: &ParseContext,
    ) -> CompileResult<()> {
        let prov = Provenance::new(file, lineno);
        let tokens: Vec<&str> = content.split_whitespace().collect();

        match context {
            ParseContext::None => Err(CompileError::directive(
                "entry line outside any table context",
                file,
                lineno,
            )),

            ParseContext::Module => {
                if tokens.len() != 2 {
                    return Err(CompileError::directive(
                        "#.MODULE entries take exactly two fields: module proto",
                        file,
                        lineno,
                    ));
                }
                let proto = no_value(tokens[1]).map(str::to_string);
                let replaced = self.set.modules.insert(tokens[0], ModuleOpt { proto }, prov);
                self.note_replaced("MODULE", tokens[0], replaced, file, lineno);
                Ok(())
            }

            ParseContext::Pdu => {
                let name = tokens[0];
                let pairs = scan_pairs(&tokens[1..])
                    .map_err(|msg| CompileError::directive(msg, file, lineno))?;
                let register = build_register(&pairs, false)
                    .map_err(|msg| CompileError::directive(msg, file, lineno))?;
                let replaced = self.set.pdus.insert(name, PduOpt { register }, prov);
                self.note_replaced("PDU", name, replaced, file, lineno);
                Ok(())
            }

            ParseContext::Register => {
                let name = tokens[0];
                let pairs = scan_pairs(&tokens[1..])
                    .map_err(|msg| CompileError::directive(msg, file, lineno))?;
                let register = build_register(&pairs, true)
                    .map_err(|msg| CompileError::directive(msg, file, lineno))?;
                let register = register.expect("required registration");
                let replaced = self.set.registrations.insert(name, register, prov);
                self.note_replaced("REGISTER", name, replaced, file, lineno);
                Ok(())
            }

            ParseContext::Exports(flags) => {
                for symbol in &tokens {
                    let replaced = self.set.exports.insert(*symbol, *flags, prov.clone());
                    self.note_replaced("EXPORTS", symbol, replaced, file, lineno);
                }
                Ok(())
            }

            ParseContext::NoEmit(flags) => {
                for symbol in &tokens {
                    let replaced = self.set.no_emit.insert(*symbol, *flags, prov.clone());
                    self.note_replaced("NO_EMIT", symbol, replaced, file, lineno);
                }
                Ok(())
            }

            ParseContext::UserDefined(flags) => {
                for symbol in &tokens {
                    let replaced = self.set.user_defined.insert(*symbol, *flags, prov.clone());
                    self.note_replaced("USER_DEFINED", symbol, replaced, file, lineno);
                }
                Ok(())
            }

            ParseContext::TypeRename | ParseContext::FieldRename => {
                if tokens.len() != 2 || no_value(tokens[1]).is_none() {
                    return Err(CompileError::directive(
                        "rename entries take exactly two fields: old new",
                        file,
                        lineno,
                    ));
                }
                let rename = RenameOpt {
                    new_name: tokens[1].to_string(),
                };
                let (table, label) = match context {
                    ParseContext::TypeRename => (&mut self.set.type_renames, "TYPE_RENAME"),
                    _ => (&mut self.set.field_renames, "FIELD_RENAME"),
                };
                let replaced = table.insert(tokens[0], rename, prov);
                self.note_replaced(label, tokens[0], replaced, file, lineno);
                Ok(())
            }

            ParseContext::TypeAttr | ParseContext::FieldAttr => {
                let key = tokens[0];
                let pairs = scan_pairs(&tokens[1..])
                    .map_err(|msg| CompileError::directive(msg, file, lineno))?;
                let mut attrs = AttrOpt::default();
                for (k, v) in &pairs {
                    if !attrs.set(k, v) {
                        return Err(CompileError::directive(
                            format!("unknown attribute key '{}'", k),
                            file,
                            lineno,
                        ));
                    }
                }
                let (table, label) = match context {
                    ParseContext::TypeAttr => (&mut self.set.type_attrs, "TYPE_ATTR"),
                    _ => (&mut self.set.field_attrs, "FIELD_ATTR"),
                };
                let replaced = table.insert(key, attrs, prov);
                self.note_replaced(label, key, replaced, file, lineno);
                Ok(())
            }

            ParseContext::Body { .. } => unreachable!("body lines handled before entry parsing"),
        }
    }

    /// Store accumulated verbatim text when leaving a `#.FN_*` context
    fn flush_body(&mut self, context: &mut ParseContext) {
        if let ParseContext::Body {
            kind,
            key,
            provenance,
            lines,
        } = std::mem::replace(context, ParseContext::None)
        {
            let text = lines.join("\n");
            let table = match kind {
                BodyKind::Hdr => &mut self.set.fn_hdrs,
                BodyKind::Body => &mut self.set.fn_bodies,
                BodyKind::Ftr => &mut self.set.fn_ftrs,
            };
            let file = provenance.file.clone();
            let line = provenance.line;
            let replaced = table.insert(&key, BodyOpt { text }, provenance);
            if let Some(old) = replaced {
                self.diags.hygiene(
                    format!("FN override for '{}' replaces entry from {}", key, old),
                    format!("{}:{}", file, line),
                );
            }
        }
    }

    fn note_replaced(
        &mut self,
        table: &str,
        key: &str,
        replaced: Option<Provenance>,
        file: &str,
        lineno: usize,
    ) {
        if let Some(old) = replaced {
            self.diags.hygiene(
                format!("{} entry '{}' replaces earlier entry from {}", table, key, old),
                format!("{}:{}", file, lineno),
            );
        }
    }
}

/// `-` is the "no value" placeholder
fn no_value(token: &str) -> Option<&str> {
    if token == "-" { None } else { Some(token) }
}

/// Scan a free-text tail into `KEY = value` pairs. A value runs until the
/// next token followed by `=`; a lone `-` value becomes the empty string.
fn scan_pairs(tokens: &[&str]) -> Result<Vec<(String, String)>, String> {
    let mut pairs = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let key = tokens[i];
        if i + 1 >= tokens.len() || tokens[i + 1] != "=" {
            return Err(format!("expected '=' after '{}'", key));
        }
        i += 2;
        let mut parts = Vec::new();
        while i < tokens.len() && !(i + 1 < tokens.len() && tokens[i + 1] == "=") {
            parts.push(tokens[i]);
            i += 1;
        }
        let value = parts.join(" ");
        let value = if value == "-" { String::new() } else { value };
        pairs.push((key.to_string(), value));
    }
    Ok(pairs)
}

/// Assemble a registration from scanned pairs. `required` distinguishes
/// `#.REGISTER` (must name a target) from `#.PDU` (target optional).
fn build_register(
    pairs: &[(String, String)],
    required: bool,
) -> Result<Option<RegisterOpt>, String> {
    let mut table = None;
    let mut key = None;
    let mut oid = None;
    for (k, v) in pairs {
        match k.as_str() {
            "TABLE" => table = Some(v.clone()),
            "KEY" => key = Some(v.clone()),
            "OID" => oid = Some(v.clone()),
            other => return Err(format!("unknown registration key '{}'", other)),
        }
    }
    match (oid, table, key) {
        (Some(oid), None, None) => Ok(Some(RegisterOpt::Oid { oid })),
        (None, Some(table), Some(key)) => Ok(Some(RegisterOpt::DissectorTable { table, key })),
        (None, None, None) if !required => Ok(None),
        (None, None, None) => Err("registration requires OID or TABLE and KEY".to_string()),
        _ => Err("registration takes either OID or both TABLE and KEY".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> (DirectiveSet, Diagnostics) {
        let mut set = DirectiveSet::new();
        let mut diags = Diagnostics::new();
        DirectiveParser::new(&mut set, &mut diags)
            .parse_source(text, "test.cnf", None)
            .expect("parse");
        (set, diags)
    }

    #[test]
    fn test_module_table() {
        let (set, _) = parse("#.MODULE\nMy-Module myproto  # maps the module\nOther -\n");
        assert_eq!(
            set.modules.get("My-Module").and_then(|m| m.proto.as_deref()),
            Some("myproto")
        );
        assert!(set.modules.get("Other").unwrap().proto.is_none());
    }

    #[test]
    fn test_context_switch_and_renames() {
        let text = "#.TYPE_RENAME\nT_foo Foo2\n#.FIELD_RENAME\ncall-id callId\n";
        let (set, _) = parse(text);
        assert_eq!(set.type_renames.get("T_foo").unwrap().new_name, "Foo2");
        assert_eq!(set.field_renames.get("call-id").unwrap().new_name, "callId");
    }

    #[test]
    fn test_pdu_and_register() {
        let text = "#.PDU\nMessage\n#.REGISTER\nMessage TABLE = app.port KEY = 397\nAttr OID = 2.5.4.3\n";
        let (set, _) = parse(text);
        assert!(set.pdus.get("Message").unwrap().register.is_none());
        assert_eq!(
            set.registrations.get("Message"),
            Some(&RegisterOpt::DissectorTable {
                table: "app.port".into(),
                key: "397".into()
            })
        );
        assert_eq!(
            set.registrations.get("Attr"),
            Some(&RegisterOpt::Oid {
                oid: "2.5.4.3".into()
            })
        );
    }

    #[test]
    fn test_export_flags() {
        let text = "#.EXPORTS ONLY_VALS\nColors\n#.NO_EMIT ONLY_TYPES\nHidden\n";
        let (set, _) = parse(text);
        let flags = set.exports.get("Colors").unwrap();
        assert!(!flags.types);
        assert!(flags.values);
        let flags = set.no_emit.get("Hidden").unwrap();
        assert!(flags.types);
        assert!(!flags.values);
    }

    #[test]
    fn test_attr_pairs_with_no_value() {
        let text = "#.FIELD_ATTR\nseq-no TYPE = FT_UINT32 DISPLAY = BASE_HEX STRINGS = -\n";
        let (set, _) = parse(text);
        let attrs = set.field_attrs.get("seq-no").unwrap();
        assert_eq!(attrs.ftype.as_deref(), Some("FT_UINT32"));
        assert_eq!(attrs.display.as_deref(), Some("BASE_HEX"));
        assert!(attrs.strings.is_none());
    }

    #[test]
    fn test_fn_body_verbatim_until_marker() {
        let text = "#.FN_BODY Message\n  offset = custom_dissect(%(TVB), %(OFFSET));\n  # not a comment here\n#.END\n";
        let (set, _) = parse(text);
        let body = set.fn_bodies.get("Message").unwrap();
        assert!(body.text.contains("custom_dissect(%(TVB), %(OFFSET))"));
        assert!(body.text.contains("# not a comment here"));
    }

    #[test]
    fn test_unused_reporting() {
        let (mut set, _) = parse("#.TYPE_RENAME\nA B\nC D\n");
        set.type_renames.use_item("A");
        let mut diags = Diagnostics::new();
        set.report_unused(&mut diags);
        let messages: Vec<_> = diags.iter().map(|d| d.message.clone()).collect();
        assert_eq!(messages, vec!["unused TYPE_RENAME entry 'C'".to_string()]);
    }

    #[test]
    fn test_entry_outside_context_is_fatal() {
        let mut set = DirectiveSet::new();
        let mut diags = Diagnostics::new();
        let result = DirectiveParser::new(&mut set, &mut diags).parse_source(
            "stray line\n",
            "t.cnf",
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_marker_is_fatal() {
        let mut set = DirectiveSet::new();
        let mut diags = Diagnostics::new();
        let result = DirectiveParser::new(&mut set, &mut diags).parse_source(
            "#.NOT_A_MARKER\n",
            "t.cnf",
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_entry_reports_hygiene() {
        let (_, diags) = parse("#.TYPE_RENAME\nA B\nA C\n");
        assert_eq!(diags.len(), 1);
        assert!(diags.iter().next().unwrap().message.contains("replaces earlier entry"));
    }

    #[test]
    fn test_end_of_cnf_stops() {
        let (set, _) = parse("#.TYPE_RENAME\nA B\n#.END_OF_CNF\n#.BOGUS would error\n");
        assert!(set.type_renames.check_item("A"));
    }

    #[test]
    fn test_scan_pairs_values_span_tokens() {
        let tokens = vec!["NAME", "=", "Call", "Id", "TYPE", "=", "FT_STRING"];
        let pairs = scan_pairs(&tokens).unwrap();
        assert_eq!(pairs[0], ("NAME".to_string(), "Call Id".to_string()));
        assert_eq!(pairs[1], ("TYPE".to_string(), "FT_STRING".to_string()));
    }
}
