//! Compilation driver and pipeline orchestration
//!
//! One sequential pass per invocation: parse every source module, load
//! directive files, register, resolve, generate for the selected encoding
//! rule, and write fragments. Fatal errors unwind immediately; degraded
//! and hygiene diagnostics are batch-reported at the end of the run.

use crate::backend::{self, EncodingRule};
use crate::common::{CompileResult, DiagnosticReporter, Diagnostics};
use crate::directive::{DirectiveParser, DirectiveSet};
use crate::frontend;
use crate::output::OutputManager;
use crate::sema::Context;
use std::path::PathBuf;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub rule: EncodingRule,
    pub output_dir: PathBuf,
    pub single_file: Option<String>,
    /// Protocol abbreviation when neither a directive mapping nor the
    /// module determines one
    pub default_proto: Option<String>,
    /// Invocation string recorded in provenance headers
    pub invocation: String,
    pub verbose: bool,
    pub dump_ast: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rule: EncodingRule::Ber,
            output_dir: PathBuf::from("."),
            single_file: None,
            default_proto: None,
            invocation: "asn2dis".to_string(),
            verbose: false,
            dump_ast: false,
        }
    }
}

/// Result of one compilation run
#[derive(Debug)]
pub struct RunSummary {
    pub written: Vec<PathBuf>,
    pub diagnostics: usize,
}

/// Compilation pipeline coordinating all phases
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Compile `sources` (filename, text) with directive files from disk
    /// and write the generated fragments
    pub fn run(
        &self,
        sources: &[(String, String)],
        conformance: &[PathBuf],
    ) -> CompileResult<RunSummary> {
        let mut diags = Diagnostics::new();
        let mut directives = DirectiveSet::new();
        {
            let mut parser = DirectiveParser::new(&mut directives, &mut diags);
            for path in conformance {
                parser.load_file(path, true)?;
            }
        }

        let frags = self.compile(sources, &mut directives, &mut diags)?;
        let written = self.manager().write(&frags)?;

        directives.report_unused(&mut diags);
        let count = diags.len();
        diags.report();

        if self.config.verbose {
            eprintln!("wrote {} files, {} diagnostics", written.len(), count);
        }
        Ok(RunSummary {
            written,
            diagnostics: count,
        })
    }

    /// Full pipeline up to rendered (path, content) pairs; no filesystem
    /// writes. Directive text may be supplied inline.
    pub fn compile_to_files(
        &self,
        sources: &[(String, String)],
        directive_sources: &[(String, String)],
    ) -> CompileResult<(Vec<(PathBuf, String)>, Diagnostics)> {
        let mut diags = Diagnostics::new();
        let mut directives = DirectiveSet::new();
        {
            let mut parser = DirectiveParser::new(&mut directives, &mut diags);
            for (name, text) in directive_sources {
                parser.parse_source(text, name, None)?;
            }
        }
        let frags = self.compile(sources, &mut directives, &mut diags)?;
        directives.report_unused(&mut diags);
        Ok((self.manager().render(&frags), diags))
    }

    fn manager(&self) -> OutputManager {
        OutputManager::new(
            self.config.output_dir.clone(),
            self.config.single_file.clone(),
            self.config.invocation.clone(),
        )
    }

    /// Parse, register, resolve, and generate fragments
    fn compile(
        &self,
        sources: &[(String, String)],
        directives: &mut DirectiveSet,
        diags: &mut Diagnostics,
    ) -> CompileResult<crate::output::FragmentSet> {
        let mut reporter = DiagnosticReporter::new();
        let mut modules = Vec::new();
        for (filename, text) in sources {
            let file_id = reporter.add_file(filename.clone(), text.clone());
            let module = match frontend::parse_module(text) {
                Ok(module) => module,
                Err(error) => {
                    reporter.report_error(file_id, &error);
                    return Err(error);
                }
            };
            if self.config.dump_ast {
                eprintln!("=== AST: {} ===", module.name);
                eprintln!("{:#?}", module);
            }
            modules.push(module);
        }

        let mut ctx = Context::with_default_proto(self.config.default_proto.clone());
        for module in &modules {
            ctx.register_module(module, directives)?;
        }
        ctx.finalize(directives);

        let module_order = ctx.module_order();
        for cycle in &module_order.cycles {
            let names: Vec<&str> = cycle.iter().map(|&i| ctx.modules[i].name.as_str()).collect();
            diags.hygiene(
                format!("module import cycle: {}", names.join(" -> ")),
                "imports".to_string(),
            );
        }
        if self.config.verbose {
            let names: Vec<&str> = module_order
                .order
                .iter()
                .map(|&i| ctx.modules[i].name.as_str())
                .collect();
            eprintln!("module order: {}", names.join(", "));
        }

        diags.absorb(&mut ctx.diags);
        Ok(backend::generate(&ctx, directives, self.config.rule, diags))
    }
}
