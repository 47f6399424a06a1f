//! `CREATE TABLE` text for the melted tables
//!
//! Two dialects are supported: a generic SQL flavour with foreign-key hints
//! in comments, and Microsoft Access, which has its own type names, no line
//! comments, and needs reserved words wrapped in brackets.

use crate::melt::plan::{KeyKind, TablePlan, Target};
use once_cell::sync::Lazy;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Generic,
    Access,
}

impl Dialect {
    /// File name the schema is written to
    pub fn file_name(self) -> &'static str {
        match self {
            Dialect::Generic => "schema.sql",
            Dialect::Access => "ms_access_schema.sql",
        }
    }
}

// Access SQL reserved words that can collide with our column names
static ACCESS_RESERVED: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "add", "all", "alter", "and", "any", "as", "asc", "between", "by", "column", "counter",
        "create", "currency", "date", "delete", "desc", "distinct", "drop", "from", "group", "in",
        "index", "insert", "into", "is", "key", "level", "like", "memo", "name", "not", "null",
        "number", "on", "or", "order", "password", "percent", "position", "select", "set",
        "system", "table", "text", "time", "top", "type", "union", "update", "use", "user",
        "value", "values", "where",
    ]
    .into_iter()
    .collect()
});

// Free-text columns that can outgrow TEXT(255)
const ACCESS_MEMO_COLUMNS: &[&str] = &["line", "value"];

/// Render `CREATE TABLE` statements for `plans` in the given dialect
pub fn render<'p>(
    dialect: Dialect,
    plans: impl IntoIterator<Item = &'p TablePlan>,
    generated_on: &str,
) -> String {
    let mut out = match dialect {
        Dialect::Generic => format!(
            "-- FHIR to relational database schema\n-- Generated on {}\n\n",
            generated_on
        ),
        Dialect::Access => format!(
            "/* FHIR to relational database schema for Microsoft Access\n   Generated on {} */\n\n",
            generated_on
        ),
    };

    for plan in plans {
        out.push_str(&create_table(dialect, plan));
        out.push('\n');
    }

    out
}

fn create_table(dialect: Dialect, plan: &TablePlan) -> String {
    let last = plan.columns.len().saturating_sub(1);
    let mut sql = format!("CREATE TABLE {} (\n", quote_ident(dialect, plan.name));

    for (idx, column) in plan.columns.iter().enumerate() {
        let separator = if idx == last { "" } else { "," };
        let hint = match dialect {
            Dialect::Generic => fk_hint(plan, column),
            Dialect::Access => String::new(),
        };
        sql.push_str(&format!(
            "    {} {}{}{}\n",
            quote_ident(dialect, column),
            column_type(dialect, plan, column),
            separator,
            hint
        ));
    }

    sql.push_str(");\n");
    sql
}

fn column_type(dialect: Dialect, plan: &TablePlan, column: &str) -> &'static str {
    if column == "id" {
        return match (dialect, plan.key) {
            (Dialect::Generic, KeyKind::Surrogate) => "INTEGER PRIMARY KEY",
            (Dialect::Generic, KeyKind::Resource) => "TEXT PRIMARY KEY",
            (Dialect::Access, KeyKind::Surrogate) => "COUNTER PRIMARY KEY",
            (Dialect::Access, KeyKind::Resource) => "TEXT(64) PRIMARY KEY",
        };
    }

    if let Some(fk) = plan.foreign_key(column) {
        let surrogate = matches!(fk.target, Target::Table(t) if t.plan().key == KeyKind::Surrogate);
        return match (dialect, surrogate) {
            (Dialect::Generic, true) => "INTEGER",
            (Dialect::Generic, false) => "TEXT",
            (Dialect::Access, true) => "LONG",
            (Dialect::Access, false) => "TEXT(64)",
        };
    }

    match dialect {
        Dialect::Generic => "TEXT",
        Dialect::Access if ACCESS_MEMO_COLUMNS.contains(&column) => "MEMO",
        Dialect::Access => "TEXT(255)",
    }
}

fn fk_hint(plan: &TablePlan, column: &str) -> String {
    match plan.foreign_key(column).map(|fk| fk.target) {
        Some(Target::Table(table)) => format!(" -- references {}(id)", table.name()),
        Some(Target::Resource(resource_type)) => {
            format!(" -- references {} resource id", resource_type)
        }
        None => String::new(),
    }
}

fn quote_ident(dialect: Dialect, ident: &str) -> String {
    match dialect {
        Dialect::Access if ACCESS_RESERVED.contains(ident.to_ascii_lowercase().as_str()) => {
            format!("[{}]", ident)
        }
        _ => ident.to_string(),
    }
}
