//! FHIR melting - flatten `Parameters` documents into relational tables
//!
//! Every output table has a static [`TablePlan`] naming its columns, its key
//! and its foreign keys. Embedded resources are classified into a
//! [`ResourceKind`] and handed to that kind's extractor, which emits rows
//! through an [`Emitter`]. Child rows get surrogate ids from an
//! [`IdAllocator`] owned by the run.

pub mod classify;
pub mod extractor;
pub mod flatten;
pub mod ids;
pub mod path;
pub mod plan;
pub mod resources;
pub mod types;
pub mod writer;

pub use classify::{classify, Disposition, ResourceKind, ScalarValue};
pub use extractor::{FhirMelter, MeltOutcome, MeltReport};
pub use flatten::{FlatTable, FlatTables};
pub use ids::IdAllocator;
pub use plan::{ForeignKey, KeyKind, TableKind, TablePlan, Target};
pub use resources::{Coding, Emitter};
pub use types::{CodingPolicy, MeltConfig, OutputConfig, Row, Table, TableSet};
pub use writer::{FileKind, TableWriter, WrittenFile};
