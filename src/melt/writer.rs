use crate::error::{Error, Result};
use crate::melt::flatten::FlatTable;
use crate::melt::plan::TableKind;
use crate::melt::types::{OutputConfig, Table, TableSet};
use crate::schema::{ddl, field_map, Dialect};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What a [`WrittenFile`] holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileKind {
    Table(TableKind),
    /// A flattened table, by name
    Flattened(String),
    FieldMap,
    Schema(Dialect),
}

/// A file produced by [`TableWriter::write_all`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub kind: FileKind,
    pub rows: usize,
}

impl WrittenFile {
    /// Whether the file holds table rows rather than a description of them
    pub fn is_table(&self) -> bool {
        matches!(self.kind, FileKind::Table(_) | FileKind::Flattened(_))
    }
}

/// Writes melted tables as delimited text, one file per table
pub struct TableWriter {
    config: OutputConfig,
}

impl TableWriter {
    pub fn new(config: OutputConfig) -> Self {
        TableWriter { config }
    }

    /// Write one table's rows (and optional header) to `out`
    pub fn write_table<W: Write>(&self, table: &Table, out: W) -> Result<()> {
        self.write_records(table.plan().columns, table.rows.iter().map(|r| r.values()), out)
    }

    /// Write a flattened table; cells for columns a row lacks are empty
    pub fn write_flat_table<W: Write>(&self, table: &FlatTable, out: W) -> Result<()> {
        self.write_records(table.columns(), table.records(), out)
    }

    fn write_records<W, H, R>(&self, header: &[H], records: R, out: W) -> Result<()>
    where
        W: Write,
        H: AsRef<str>,
        R: Iterator<Item = Vec<String>>,
    {
        let mut csv = WriterBuilder::new()
            .delimiter(self.config.delimiter)
            .quote_style(QuoteStyle::Always)
            .double_quote(true)
            .terminator(Terminator::Any(b'\n'))
            .has_headers(false)
            .from_writer(out);

        if self.config.header {
            csv.write_record(header.iter().map(|h| h.as_ref()))?;
        }
        for record in records {
            csv.write_record(&record)?;
        }

        csv.flush()?;
        Ok(())
    }

    /// Write every table plus the requested companion files into `dir`
    pub fn write_all(&self, tables: &TableSet, dir: &Path) -> Result<Vec<WrittenFile>> {
        create_dir(dir)?;

        let mut written = Vec::new();
        let mut field_maps: Vec<(String, Vec<String>)> = Vec::new();

        for table in tables.iter() {
            if table.is_empty() && !self.config.write_empty {
                debug!(table = table.name(), "no rows; not writing");
                continue;
            }

            let path = dir.join(format!("{}.csv", table.name().to_lowercase()));
            self.write_table(table, BufWriter::new(File::create(&path)?))?;

            info!(table = table.name(), rows = table.len(), path = %path.display(), "wrote table");
            field_maps.push((table.name().to_string(), owned_columns(table.plan().columns)));
            written.push(WrittenFile {
                path,
                kind: FileKind::Table(table.kind),
                rows: table.len(),
            });
        }

        for table in tables.flattened().iter() {
            let path = dir.join(format!("{}.csv", table.name()));
            self.write_flat_table(table, BufWriter::new(File::create(&path)?))?;

            info!(
                resource_type = table.resource_type(),
                rows = table.len(),
                path = %path.display(),
                "wrote flattened table"
            );
            field_maps.push((table.name().to_string(), table.columns().to_vec()));
            written.push(WrittenFile {
                path,
                kind: FileKind::Flattened(table.name().to_string()),
                rows: table.len(),
            });
        }

        if self.config.wants_field_maps() {
            written.extend(write_field_maps(&dir.join("field_maps"), &field_maps)?);
        }

        let generated_on = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let dialects = [
            (self.config.sql_schema, Dialect::Generic),
            (self.config.access_schema, Dialect::Access),
        ];
        for (_, dialect) in dialects.into_iter().filter(|(wanted, _)| *wanted) {
            let path = dir.join(dialect.file_name());
            let plans = TableKind::ALL.iter().map(|k| k.plan());
            fs::write(&path, ddl::render(dialect, plans, &generated_on))?;

            info!(path = %path.display(), "wrote schema");
            written.push(WrittenFile {
                path,
                kind: FileKind::Schema(dialect),
                rows: 0,
            });
        }

        Ok(written)
    }
}

fn owned_columns(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

fn write_field_maps(dir: &Path, tables: &[(String, Vec<String>)]) -> Result<Vec<WrittenFile>> {
    create_dir(dir)?;

    let mut written = Vec::with_capacity(tables.len());
    for (name, columns) in tables {
        let path = dir.join(field_map::file_name(name));
        fs::write(&path, field_map::render(name, columns))?;
        debug!(table = %name, path = %path.display(), "wrote field map");
        written.push(WrittenFile {
            path,
            kind: FileKind::FieldMap,
            rows: 0,
        });
    }

    info!(count = written.len(), dir = %dir.display(), "wrote field maps");
    Ok(written)
}

fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|source| Error::OutputDir {
        path: dir.to_path_buf(),
        source,
    })
}
