//! # fhir-melt - FHIR Parameters to relational tables
//!
//! Reads newline-delimited FHIR `Parameters` documents (as produced by
//! quality-measure evaluations) and melts the resources they embed into a
//! fixed set of pipe-delimited tables joined by foreign keys.
//!
//! ## Modules
//!
//! - **reader**: lazy NDJSON reading with per-line error recovery
//! - **melt**: table plans, resource extractors and the CSV sink
//! - **schema**: SQL DDL and field maps describing the tables
//!
//! ## Quick Start
//!
//! ```rust
//! use fhir_melt::melt::{MeltConfig, TableKind};
//! use std::io::Cursor;
//!
//! # fn main() -> fhir_melt::Result<()> {
//! let input = r#"{"resourceType":"Parameters","id":"doc-1","parameter":[
//!     {"name":"Patient","resource":{"resourceType":"Patient","id":"p1","gender":"female"}}
//! ]}"#
//! .replace('\n', "");
//!
//! let outcome = fhir_melt::melt_ndjson(Cursor::new(input), MeltConfig::default())?;
//! let patients = outcome.tables.rows(TableKind::Patients);
//! assert_eq!(patients[0].text("gender"), "female");
//! # Ok(())
//! # }
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

pub mod error;
pub mod melt;
pub mod reader;
pub mod schema;

pub use error::{Error, Result};
pub use melt::{
    FhirMelter, MeltConfig, MeltOutcome, MeltReport, OutputConfig, TableKind, TableSet,
    TableWriter, WrittenFile,
};
pub use reader::{Document, NdjsonReader, Parameter};

/// Melt an NDJSON stream into tables held in memory
///
/// Malformed lines are skipped and listed in the report; any other error
/// stops the run.
pub fn melt_ndjson<R: BufRead>(reader: R, config: MeltConfig) -> Result<MeltOutcome> {
    let mut melter = FhirMelter::new(config);
    let mut documents = NdjsonReader::new(reader);

    for document in documents.by_ref() {
        match document {
            Ok(document) => melter.melt(document),
            Err(err) if err.is_recoverable() => melter.skip_line(&err),
            Err(err) => return Err(err),
        }
    }

    let mut outcome = melter.finish();
    outcome.report.lines_read = documents.lines_read();
    Ok(outcome)
}

/// Result of a complete file-to-directory run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub report: MeltReport,

    /// Row count per table, in plan order, empty tables included
    pub counts: Vec<(TableKind, usize)>,

    pub files: Vec<WrittenFile>,
}

/// Melt the NDJSON file at `input` and write the tables into `output_dir`
pub fn melt_file(
    input: &Path,
    output_dir: &Path,
    melt_config: &MeltConfig,
    output_config: &OutputConfig,
) -> Result<RunSummary> {
    let file = File::open(input).map_err(|source| Error::Input {
        path: input.to_path_buf(),
        source,
    })?;
    info!(input = %input.display(), "melting");

    let outcome = melt_ndjson(BufReader::new(file), melt_config.clone())?;
    debug!(report = ?outcome.report, "melt finished");

    let counts = outcome.tables.counts();
    for (table, rows) in &counts {
        info!(table = table.name(), rows, "extracted");
    }

    let files = TableWriter::new(output_config.clone()).write_all(&outcome.tables, output_dir)?;

    Ok(RunSummary {
        report: outcome.report,
        counts,
        files,
    })
}
