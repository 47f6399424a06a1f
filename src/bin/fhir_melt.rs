//! fhir-melt: Melt FHIR Parameters NDJSON into relational tables
//!
//! Usage:
//!   # Write pipe-delimited tables with headers into ./output_tables
//!   fhir-melt measure_report.ndjson
//!
//!   # Headerless output plus field maps and both schema files
//!   fhir-melt --no-header --sql-schema --access-schema data.ndjson -o ./tables
//!
//!   # Join every coding of a concept instead of taking the first
//!   fhir-melt --codings join data.ndjson
//!
//!   # Keep resources without a dedicated table as flattened <type>.csv files
//!   fhir-melt --flatten-unknown data.ndjson

// Use MiMalloc allocator for better performance (recommended by simd-json)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use fhir_melt::melt::{CodingPolicy, MeltConfig, OutputConfig};
use fhir_melt::RunSummary;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fhir-melt", version)]
#[command(about = "Melt FHIR Parameters NDJSON into pipe-delimited relational tables", long_about = None)]
struct Args {
    /// NDJSON file with one Parameters resource per line
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Directory the tables are written to
    #[arg(long, short = 'o', default_value = "output_tables")]
    output_dir: PathBuf,

    /// Omit the header row; field maps are written instead
    #[arg(long)]
    no_header: bool,

    /// Field delimiter (a single ASCII character)
    #[arg(long, default_value = "|")]
    delimiter: char,

    /// Write schema.sql with generic CREATE TABLE statements
    #[arg(long)]
    sql_schema: bool,

    /// Write ms_access_schema.sql for Microsoft Access
    #[arg(long)]
    access_schema: bool,

    /// Write field_maps/<table>_fields.txt even when headers are on
    #[arg(long)]
    field_maps: bool,

    /// Also write files for tables without rows
    #[arg(long)]
    write_empty: bool,

    /// How concepts with several codings are reduced to one value
    #[arg(long, value_enum, default_value_t = Codings::First)]
    codings: Codings,

    /// Flatten resources of unsupported types into <type>.csv tables
    #[arg(long)]
    flatten_unknown: bool,

    /// More logging (-v debug, -vv trace); RUST_LOG overrides
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Codings {
    /// First coding only
    First,
    /// Every coding, comma-joined
    Join,
}

impl From<Codings> for CodingPolicy {
    fn from(codings: Codings) -> Self {
        match codings {
            Codings::First => CodingPolicy::First,
            Codings::Join => CodingPolicy::JoinAll,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if !args.delimiter.is_ascii() || args.delimiter == '"' || args.delimiter == '\n' {
        bail!(
            "invalid delimiter {:?}: must be an ASCII character other than a quote or newline",
            args.delimiter
        );
    }

    let melt_config = MeltConfig {
        coding_policy: args.codings.into(),
        flatten_unknown: args.flatten_unknown,
    };
    let output_config = OutputConfig {
        header: !args.no_header,
        delimiter: args.delimiter as u8,
        field_maps: args.field_maps,
        sql_schema: args.sql_schema,
        access_schema: args.access_schema,
        write_empty: args.write_empty,
    };

    let summary = fhir_melt::melt_file(&args.input, &args.output_dir, &melt_config, &output_config)
        .with_context(|| format!("failed to melt {}", args.input.display()))?;

    print_summary(&summary, &args, &output_config);
    Ok(())
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default = match verbose {
        0 => "fhir_melt=info",
        1 => "fhir_melt=debug",
        _ => "fhir_melt=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn print_summary(summary: &RunSummary, args: &Args, output: &OutputConfig) {
    let report = &summary.report;

    println!("Melted {} documents from {} lines", report.documents, report.lines_read);
    for (table, rows) in &summary.counts {
        if *rows > 0 {
            println!("  {:<26} {:>8}", table.name(), rows);
        }
    }

    if !report.skipped_lines.is_empty() {
        let lines: Vec<String> = report.skipped_lines.iter().map(|l| l.to_string()).collect();
        println!("Skipped {} malformed lines: {}", lines.len(), lines.join(", "));
    }
    if report.skipped_documents > 0 {
        println!("Skipped {} documents that are not Parameters", report.skipped_documents);
    }
    if report.flattened_resources > 0 {
        println!(
            "Flattened {} embedded resources of unsupported types",
            report.flattened_resources
        );
    } else if report.unrecognized_resources > 0 {
        println!(
            "Ignored {} embedded resources of unsupported types",
            report.unrecognized_resources
        );
    }

    let tables = summary.files.iter().filter(|f| f.is_table()).count();
    println!("Wrote {} tables to {}", tables, args.output_dir.display());
    if !output.header {
        println!(
            "Files have no header row; column positions are listed in {}",
            args.output_dir.join("field_maps").display()
        );
    }
}
