//! Generic flattening for resources without a dedicated extractor
//!
//! Each resource becomes one row of a table named after its lowercased
//! `resourceType`. Nested objects contribute dotted column names and arrays
//! contribute `[i]` indexes, so `code.coding[0].system` is one column. The
//! column set grows as new paths are seen.

use crate::melt::plan::TableKind;
use crate::melt::types::cell_text;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// Suffix for flattened tables whose name would shadow a fixed table
const SHADOW_SUFFIX: &str = "_resources";

/// A dynamically shaped table of flattened resources
#[derive(Debug, Clone)]
pub struct FlatTable {
    name: String,
    resource_type: String,
    columns: Vec<String>,
    known: HashSet<String>,
    rows: Vec<Map<String, Value>>,
}

impl FlatTable {
    fn new(resource_type: &str) -> Self {
        let mut name = resource_type.to_lowercase();
        if TableKind::from_name(&name).is_some() {
            name.push_str(SHADOW_SUFFIX);
        }

        let mut table = FlatTable {
            name,
            resource_type: resource_type.to_string(),
            columns: Vec::new(),
            known: HashSet::new(),
            rows: Vec::new(),
        };
        table.add_column("parameters_id");
        table
    }

    fn add_column(&mut self, column: &str) {
        if self.known.insert(column.to_string()) {
            self.columns.push(column.to_string());
        }
    }

    fn push(&mut self, parameters_id: &str, resource: &Value) {
        let mut row = Map::new();
        row.insert("parameters_id".to_string(), Value::from(parameters_id));
        flatten_into(resource, "", &mut row);

        for column in row.keys() {
            self.add_column(column);
        }
        self.rows.push(row);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Columns in first-seen order, `parameters_id` first
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row values in column order; columns a row never had are `""`
    pub fn records(&self) -> impl Iterator<Item = Vec<String>> + '_ {
        self.rows.iter().map(move |row| {
            self.columns
                .iter()
                .map(|c| row.get(c).map(cell_text).unwrap_or_default())
                .collect()
        })
    }
}

/// Every flattened table of a run, in first-seen order
#[derive(Debug, Clone, Default)]
pub struct FlatTables {
    tables: Vec<FlatTable>,
    by_type: HashMap<String, usize>,
}

impl FlatTables {
    pub fn push(&mut self, resource_type: &str, parameters_id: &str, resource: &Value) {
        let idx = match self.by_type.get(resource_type) {
            Some(idx) => *idx,
            None => {
                self.tables.push(FlatTable::new(resource_type));
                self.by_type.insert(resource_type.to_string(), self.tables.len() - 1);
                self.tables.len() - 1
            }
        };
        self.tables[idx].push(parameters_id, resource);
    }

    pub fn get(&self, resource_type: &str) -> Option<&FlatTable> {
        self.by_type.get(resource_type).map(|idx| &self.tables[*idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlatTable> {
        self.tables.iter()
    }

    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(FlatTable::len).sum()
    }
}

fn flatten_into(value: &Value, prefix: &str, out: &mut Map<String, Value>) {
    match value {
        Value::Object(obj) => {
            for (key, child) in obj {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_into(child, &path, out);
            }
        }
        Value::Array(arr) => {
            for (i, child) in arr.iter().enumerate() {
                flatten_into(child, &format!("{}[{}]", prefix, i), out);
            }
        }
        scalar => {
            out.insert(prefix.to_string(), scalar.clone());
        }
    }
}
