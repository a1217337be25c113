//! asn2dis - specification compiler generating packet dissectors
//!
//! Usage: asn2dis [OPTIONS] <input>...

use asn_compiler::{EncodingRule, Pipeline, PipelineConfig};
use clap::{Parser as ClapParser, ValueEnum};
use std::fs;
use std::path::PathBuf;
use std::process;

/// Encoding rule backend
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Default)]
enum Rule {
    /// Self-describing tag-length-value
    #[default]
    Ber,
    /// Densely packed, position-dependent
    Per,
}

#[derive(ClapParser, Debug)]
#[command(name = "asn2dis")]
#[command(version = "0.1.0")]
#[command(about = "Specification compiler generating packet dissectors", long_about = None)]
struct Args {
    /// Input specification files (one module each)
    #[arg(required = true)]
    input: Vec<PathBuf>,

    /// Directive (conformance) files
    #[arg(short = 'C', long = "conformance")]
    conformance: Vec<PathBuf>,

    /// Encoding rule backend
    #[arg(short, long, value_enum, default_value = "ber")]
    rule: Rule,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Merge all fragments into one output file
    #[arg(short = 's', long)]
    single_file: Option<String>,

    /// Default protocol abbreviation
    #[arg(short, long)]
    proto: Option<String>,

    /// Dump parsed modules (for debugging)
    #[arg(long)]
    dump_ast: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let mut sources = Vec::new();
    for path in &args.input {
        let text = fs::read_to_string(path)?;
        sources.push((path.display().to_string(), text));
    }

    let invocation = std::env::args().collect::<Vec<_>>().join(" ");
    let config = PipelineConfig {
        rule: match args.rule {
            Rule::Ber => EncodingRule::Ber,
            Rule::Per => EncodingRule::Per,
        },
        output_dir: args.output.clone(),
        single_file: args.single_file.clone(),
        default_proto: args.proto.clone(),
        invocation,
        verbose: args.verbose,
        dump_ast: args.dump_ast,
    };

    let pipeline = Pipeline::new(config);
    let summary = pipeline.run(&sources, &args.conformance)?;

    if args.verbose {
        for path in &summary.written {
            eprintln!("wrote {}", path.display());
        }
    }
    Ok(())
}
