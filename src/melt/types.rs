use crate::melt::flatten::FlatTables;
use crate::melt::plan::{TableKind, TablePlan};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One row of an output table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// The table this row belongs to
    pub table: TableKind,

    /// Column values; columns never set are written as empty strings
    pub data: Map<String, Value>,
}

impl Row {
    pub fn new(table: TableKind) -> Self {
        Row {
            table,
            data: Map::new(),
        }
    }

    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        debug_assert!(
            self.table.columns().contains(&column),
            "{} has no column {}",
            self.table,
            column
        );
        self.data.insert(column.to_string(), value.into());
    }

    /// A column rendered as CSV text
    pub fn text(&self, column: &str) -> String {
        self.data.get(column).map(cell_text).unwrap_or_default()
    }

    /// Values in the table's column order
    pub fn values(&self) -> Vec<String> {
        self.table.columns().iter().map(|c| self.text(c)).collect()
    }
}

/// Render a cell value as text
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// A named, ordered list of rows sharing one plan
#[derive(Debug, Clone)]
pub struct Table {
    pub kind: TableKind,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(kind: TableKind) -> Self {
        Table {
            kind,
            rows: Vec::new(),
        }
    }

    pub fn plan(&self) -> &'static TablePlan {
        self.kind.plan()
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Every output table of a run: the fixed tables in plan order, then any
/// flattened tables
#[derive(Debug, Clone)]
pub struct TableSet {
    tables: Vec<Table>,
    flattened: FlatTables,
}

impl Default for TableSet {
    fn default() -> Self {
        TableSet {
            tables: TableKind::ALL.iter().map(|k| Table::new(*k)).collect(),
            flattened: FlatTables::default(),
        }
    }
}

impl TableSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: Row) {
        self.tables[row.table as usize].rows.push(row);
    }

    pub fn table(&self, kind: TableKind) -> &Table {
        &self.tables[kind as usize]
    }

    pub fn rows(&self, kind: TableKind) -> &[Row] {
        &self.table(kind).rows
    }

    pub fn iter(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }

    /// Row count per table, in plan order
    pub fn counts(&self) -> Vec<(TableKind, usize)> {
        self.tables.iter().map(|t| (t.kind, t.len())).collect()
    }

    pub fn flattened(&self) -> &FlatTables {
        &self.flattened
    }

    pub fn flattened_mut(&mut self) -> &mut FlatTables {
        &mut self.flattened
    }

    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(Table::len).sum::<usize>() + self.flattened.total_rows()
    }
}

/// How a codeable concept with several codings is reduced to one value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CodingPolicy {
    /// Take the first `coding` entry and ignore the rest
    #[default]
    First,
    /// Join every entry's code (and system) with `", "`
    JoinAll,
}

/// Configuration for the melting pass
#[derive(Debug, Clone, Default)]
pub struct MeltConfig {
    pub coding_policy: CodingPolicy,

    /// Flatten resources of types without an extractor into their own tables
    pub flatten_unknown: bool,
}

/// Configuration for writing tables and their companion files
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Write a header row naming the columns
    pub header: bool,

    /// Field delimiter
    pub delimiter: u8,

    /// Write `field_maps/<table>_fields.txt`; always done without a header
    pub field_maps: bool,

    /// Write `schema.sql`
    pub sql_schema: bool,

    /// Write `ms_access_schema.sql`
    pub access_schema: bool,

    /// Write files for tables that received no rows
    pub write_empty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            header: true,
            delimiter: b'|',
            field_maps: false,
            sql_schema: false,
            access_schema: false,
            write_empty: false,
        }
    }
}

impl OutputConfig {
    pub fn wants_field_maps(&self) -> bool {
        self.field_maps || !self.header
    }
}
