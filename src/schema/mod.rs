//! Companion files describing the melted tables
//!
//! Everything here is derived from the static table plans, so the output is
//! identical for every run apart from the generation timestamp.

pub mod ddl;
pub mod field_map;

pub use ddl::Dialect;
