use crate::error::Error;
use crate::melt::classify::{classify, Disposition, ResourceKind, ScalarValue};
use crate::melt::ids::IdAllocator;
use crate::melt::path;
use crate::melt::plan::TableKind;
use crate::melt::resources::{extractor, Emitter};
use crate::melt::types::{MeltConfig, Row, TableSet};
use crate::reader::Document;
use std::collections::HashSet;
use tracing::{debug, warn};

/// What happened during a melting run, apart from the rows themselves
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeltReport {
    /// Lines consumed from the input, blank lines included
    pub lines_read: usize,

    /// `Parameters` documents melted
    pub documents: usize,

    /// Line numbers skipped because they were not well-formed
    pub skipped_lines: Vec<usize>,

    /// Documents that were valid JSON but not `Parameters`
    pub skipped_documents: usize,

    /// Embedded resources of a type nothing extracts
    pub unrecognized_resources: usize,

    /// Unrecognized resources written to a flattened table
    pub flattened_resources: usize,

    /// Resources already extracted earlier in the run
    pub duplicate_resources: usize,
}

/// Tables plus the report of one run
#[derive(Debug, Clone)]
pub struct MeltOutcome {
    pub tables: TableSet,
    pub report: MeltReport,
}

/// Melts `Parameters` documents into relational tables
///
/// The melter owns every table and the surrogate id counters for one run;
/// documents are fed in order with [`FhirMelter::melt`] and the tables are
/// taken out with [`FhirMelter::finish`].
pub struct FhirMelter {
    config: MeltConfig,
    tables: TableSet,
    ids: IdAllocator,
    seen_resources: HashSet<(ResourceKind, String)>,
    seen_flattened: HashSet<(String, String)>,
    seen_documents: HashSet<String>,
    report: MeltReport,
}

impl FhirMelter {
    pub fn new(config: MeltConfig) -> Self {
        FhirMelter {
            config,
            tables: TableSet::new(),
            ids: IdAllocator::new(),
            seen_resources: HashSet::new(),
            seen_flattened: HashSet::new(),
            seen_documents: HashSet::new(),
            report: MeltReport::default(),
        }
    }

    /// Melt one document into the run's tables
    pub fn melt(&mut self, document: Document) {
        if !document.is_parameters() {
            warn!(
                line = document.line,
                resource_type = %document.resource_type,
                "skipping document that is not a Parameters resource"
            );
            self.report.skipped_documents += 1;
            return;
        }
        self.report.documents += 1;

        if self.seen_documents.insert(document.id.clone()) {
            self.tables.push(
                Row::new(TableKind::Parameters)
                    .with("id", document.id.as_str())
                    .with("resource_type", document.resource_type.as_str()),
            );
        }

        let mut out = Emitter::new(
            &mut self.tables,
            &mut self.ids,
            self.config.coding_policy,
            &document.id,
        );

        for param in &document.parameters {
            match classify(param) {
                Disposition::Resource { kind, resource } => {
                    let id = path::text(resource, "/id");
                    if !id.is_empty() && !self.seen_resources.insert((kind, id.clone())) {
                        debug!(
                            line = document.line,
                            resource_type = kind.resource_type(),
                            id = %id,
                            "resource already melted; skipping repeat"
                        );
                        self.report.duplicate_resources += 1;
                        continue;
                    }
                    extractor(kind)(resource, &mut out);
                }
                Disposition::Unrecognized {
                    resource_type,
                    resource,
                } => {
                    debug!(
                        line = document.line,
                        parameter = %param.name,
                        resource_type,
                        "no extractor for embedded resource"
                    );
                    self.report.unrecognized_resources += 1;

                    if !self.config.flatten_unknown || resource_type.is_empty() {
                        continue;
                    }
                    let id = path::text(resource, "/id");
                    if !id.is_empty()
                        && !self.seen_flattened.insert((resource_type.to_string(), id))
                    {
                        self.report.duplicate_resources += 1;
                        continue;
                    }
                    out.flatten(resource_type, resource);
                    self.report.flattened_resources += 1;
                }
                Disposition::Scalar(scalar) => {
                    if document.id.is_empty() {
                        warn!(
                            line = document.line,
                            parameter = %param.name,
                            "document has no id; parameter value dropped"
                        );
                        continue;
                    }
                    let ScalarValue { kind, value } = scalar.unwrap_or_default();
                    let (_, row) = out.child(TableKind::ParameterValues);
                    let row = row
                        .with("parameters_id", out.parameters_id())
                        .with("name", param.name.as_str())
                        .with("value_type", kind)
                        .with("value", value);
                    out.emit(row);
                }
            }
        }
    }

    /// Record a line the reader could not parse
    pub fn skip_line(&mut self, err: &Error) {
        if let Error::Parse { line, message } = err {
            warn!(line, %message, "skipping malformed line");
            self.report.skipped_lines.push(*line);
        }
    }

    pub fn tables(&self) -> &TableSet {
        &self.tables
    }

    pub fn report(&self) -> &MeltReport {
        &self.report
    }

    pub fn finish(self) -> MeltOutcome {
        MeltOutcome {
            tables: self.tables,
            report: self.report,
        }
    }
}
