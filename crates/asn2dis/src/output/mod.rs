//! Output manager
//!
//! Routes generated fragments to per-protocol files distinguished by
//! fragment kind, or flattens everything into one file in single-output
//! mode. Every written file opens with a provenance header naming the
//! generator and the invocation; single-file mode replaces per-file
//! headers with one header plus per-fragment banners, inlining what the
//! multi-file layout reaches through `#include`.

use crate::common::CompileResult;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Kind of a generated fragment; variant order is the flatten order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FragmentKind {
    /// Field declarations
    Hf,
    /// Field-array initializer entries
    HfArr,
    /// Subtree-id declarations
    Ett,
    /// Subtree-id array entries
    EttArr,
    /// Per-type dissection functions
    Fn,
    /// Exported declarations
    Exp,
    /// Numeric value defines
    Val,
    /// Dissector-table registration glue
    Table,
}

impl FragmentKind {
    pub const ALL: [FragmentKind; 8] = [
        FragmentKind::Hf,
        FragmentKind::HfArr,
        FragmentKind::Ett,
        FragmentKind::EttArr,
        FragmentKind::Fn,
        FragmentKind::Exp,
        FragmentKind::Val,
        FragmentKind::Table,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            FragmentKind::Hf => "-hf.c",
            FragmentKind::HfArr => "-hfarr.c",
            FragmentKind::Ett => "-ett.c",
            FragmentKind::EttArr => "-ettarr.c",
            FragmentKind::Fn => "-fn.c",
            FragmentKind::Exp => "-exp.h",
            FragmentKind::Val => "-val.h",
            FragmentKind::Table => "-table.c",
        }
    }

    pub fn banner(self) -> &'static str {
        match self {
            FragmentKind::Hf => "Field declarations",
            FragmentKind::HfArr => "Field array entries",
            FragmentKind::Ett => "Subtree declarations",
            FragmentKind::EttArr => "Subtree array entries",
            FragmentKind::Fn => "Dissection functions",
            FragmentKind::Exp => "Exported declarations",
            FragmentKind::Val => "Value defines",
            FragmentKind::Table => "Registration",
        }
    }
}

/// Generated text grouped by (protocol, fragment kind)
#[derive(Debug, Default)]
pub struct FragmentSet {
    fragments: BTreeMap<(String, FragmentKind), String>,
}

impl FragmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, proto: &str, kind: FragmentKind, text: &str) {
        self.fragments
            .entry((proto.to_string(), kind))
            .or_default()
            .push_str(text);
    }

    pub fn get(&self, proto: &str, kind: FragmentKind) -> Option<&str> {
        self.fragments
            .get(&(proto.to_string(), kind))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Protocols present, in deterministic order
    pub fn protos(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for (proto, _) in self.fragments.keys() {
            if out.last() != Some(&proto.as_str()) {
                out.push(proto);
            }
        }
        out
    }
}

/// Writes fragment files under an output directory
pub struct OutputManager {
    out_dir: PathBuf,
    single_file: Option<String>,
    invocation: String,
}

impl OutputManager {
    pub fn new(out_dir: impl Into<PathBuf>, single_file: Option<String>, invocation: impl Into<String>) -> Self {
        Self {
            out_dir: out_dir.into(),
            single_file,
            invocation: invocation.into(),
        }
    }

    fn provenance_header(&self) -> String {
        format!(
            "/* Do not modify this file. Changes will be overwritten. */\n\
             /* Generated automatically by asn2dis. */\n\
             /* {} */\n\n",
            self.invocation
        )
    }

    /// Lay out the files to write without touching the filesystem
    pub fn render(&self, fragments: &FragmentSet) -> Vec<(PathBuf, String)> {
        match &self.single_file {
            Some(name) => self.render_single(fragments, name),
            None => self.render_split(fragments),
        }
    }

    fn render_split(&self, fragments: &FragmentSet) -> Vec<(PathBuf, String)> {
        let mut files = Vec::new();
        for proto in fragments.protos() {
            let mut includes = Vec::new();
            for kind in FragmentKind::ALL {
                if let Some(text) = fragments.get(proto, kind) {
                    let filename = format!("packet-{}{}", proto, kind.suffix());
                    let mut content = self.provenance_header();
                    content.push_str(text);
                    files.push((self.out_dir.join(&filename), content));
                    includes.push(filename);
                }
            }
            // Skeleton that stitches the fragments together
            let mut stub = self.provenance_header();
            for include in &includes {
                stub.push_str(&format!("#include \"{}\"\n", include));
            }
            files.push((self.out_dir.join(format!("packet-{}.c", proto)), stub));
        }
        files
    }

    fn render_single(&self, fragments: &FragmentSet, name: &str) -> Vec<(PathBuf, String)> {
        let mut content = self.provenance_header();
        for proto in fragments.protos() {
            for kind in FragmentKind::ALL {
                if let Some(text) = fragments.get(proto, kind) {
                    content.push_str(&format!("/* --- {}: {} --- */\n", proto, kind.banner()));
                    content.push_str(text);
                    content.push('\n');
                }
            }
        }
        vec![(self.out_dir.join(name), content)]
    }

    /// Persist every rendered file, returning the written paths
    pub fn write(&self, fragments: &FragmentSet) -> CompileResult<Vec<PathBuf>> {
        let mut written = Vec::new();
        for (path, content) in self.render(fragments) {
            if let Some(parent) = path.parent() {
                if parent != Path::new("") {
                    fs::create_dir_all(parent)?;
                }
            }
            fs::write(&path, content)?;
            written.push(path);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FragmentSet {
        let mut frags = FragmentSet::new();
        frags.append("p1", FragmentKind::Fn, "static int dissect_p1_A(...);\n");
        frags.append("p1", FragmentKind::Hf, "static int hf_p1_a = -1;\n");
        frags.append("p2", FragmentKind::Val, "#define V 1\n");
        frags
    }

    #[test]
    fn test_split_routes_by_kind_and_proto() {
        let manager = OutputManager::new("out", None, "asn2dis t.asn");
        let files = manager.render(&sample());
        let names: Vec<String> = files
            .iter()
            .map(|(p, _)| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(names.contains(&"packet-p1-hf.c".to_string()));
        assert!(names.contains(&"packet-p1-fn.c".to_string()));
        assert!(names.contains(&"packet-p2-val.h".to_string()));
        assert!(names.contains(&"packet-p1.c".to_string()));
    }

    #[test]
    fn test_provenance_header_present() {
        let manager = OutputManager::new("out", None, "asn2dis --rule ber t.asn");
        let files = manager.render(&sample());
        for (_, content) in &files {
            assert!(content.starts_with("/* Do not modify this file."));
            assert!(content.contains("asn2dis --rule ber t.asn"));
        }
    }

    #[test]
    fn test_stub_includes_fragments_in_kind_order() {
        let manager = OutputManager::new("out", None, "asn2dis");
        let files = manager.render(&sample());
        let stub = &files
            .iter()
            .find(|(p, _)| p.ends_with("packet-p1.c"))
            .unwrap()
            .1;
        let hf = stub.find("packet-p1-hf.c").unwrap();
        let body = stub.find("packet-p1-fn.c").unwrap();
        assert!(hf < body);
    }

    #[test]
    fn test_single_file_flattens_with_banners() {
        let manager = OutputManager::new("out", Some("all.c".to_string()), "asn2dis -s all.c");
        let files = manager.render(&sample());
        assert_eq!(files.len(), 1);
        let content = &files[0].1;
        // one header, fragments inlined in kind order with banners
        assert_eq!(content.matches("Do not modify this file").count(), 1);
        let hf = content.find("p1: Field declarations").unwrap();
        let body = content.find("p1: Dissection functions").unwrap();
        let val = content.find("p2: Value defines").unwrap();
        assert!(hf < body && body < val);
    }
}
