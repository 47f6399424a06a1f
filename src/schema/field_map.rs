//! Position-to-column listings for headerless output

const RULE: &str = "---------------------------";

/// `<table>_fields.txt`
pub fn file_name(table: &str) -> String {
    format!("{}_fields.txt", table)
}

/// List the table's columns with their 1-based positions
pub fn render<S: AsRef<str>>(table: &str, columns: &[S]) -> String {
    let mut out = format!(
        "Field map for table: {}\n{}\nPosition | Field Name\n{}\n",
        table, RULE, RULE
    );
    for (idx, column) in columns.iter().enumerate() {
        out.push_str(&format!("{:>8} | {}\n", idx + 1, column.as_ref()));
    }
    out
}
