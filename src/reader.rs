//! NDJSON reader for FHIR `Parameters` documents
//!
//! Lines are parsed with simd-json first; when that fails the line is parsed
//! again with serde_json, which gives the better diagnostic. A malformed line
//! is reported as a recoverable [`Error::Parse`] and reading continues with
//! the next line.

use crate::error::{Error, Result};
use crate::melt::path;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::io::BufRead;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// One entry of `Parameters.parameter`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Parameter {
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: String,

    /// The embedded resource, if this parameter carries one
    #[serde(default)]
    pub resource: Option<Value>,

    /// All remaining keys in document order (`valueBoolean`, `valueCode`, ...)
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// One parsed NDJSON line
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Document {
    /// 1-based line number in the input
    #[serde(skip)]
    pub line: usize,

    #[serde(default, deserialize_with = "lenient_text")]
    pub id: String,

    #[serde(rename = "resourceType", default, deserialize_with = "lenient_text")]
    pub resource_type: String,

    #[serde(rename = "parameter", default, deserialize_with = "lenient_parameters")]
    pub parameters: Vec<Parameter>,
}

/// Scalars as text; `null`, objects and arrays become `""`
fn lenient_text<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<String, D::Error> {
    Value::deserialize(deserializer).map(|value| path::scalar_text(&value))
}

/// A `null` list or `null` entries are treated as absent
fn lenient_parameters<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<Parameter>, D::Error> {
    let parameters = Option::<Vec<Option<Parameter>>>::deserialize(deserializer)?;
    Ok(parameters.unwrap_or_default().into_iter().flatten().collect())
}

impl Document {
    pub fn is_parameters(&self) -> bool {
        self.resource_type.is_empty() || self.resource_type == "Parameters"
    }
}

/// Lazily reads [`Document`]s from a buffered reader, one per non-blank line
pub struct NdjsonReader<R> {
    reader: R,
    line: usize,
    buf: Vec<u8>,
    done: bool,
}

impl<R: BufRead> NdjsonReader<R> {
    pub fn new(reader: R) -> Self {
        NdjsonReader {
            reader,
            line: 0,
            buf: Vec::new(),
            done: false,
        }
    }

    /// Number of lines consumed so far, blank lines included
    pub fn lines_read(&self) -> usize {
        self.line
    }
}

impl<R: BufRead> Iterator for NdjsonReader<R> {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    // An unreadable stream is fatal; stop after reporting it.
                    self.done = true;
                    return Some(Err(Error::Io(e)));
                }
            }
            self.line += 1;

            let mut bytes = self.buf.as_slice();
            if self.line == 1 {
                bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
            }
            let bytes = bytes.trim_ascii();
            if bytes.is_empty() {
                continue;
            }

            return Some(parse_document(bytes, self.line));
        }
    }
}

/// Parse a single line into a [`Document`]
pub fn parse_document(bytes: &[u8], line: usize) -> Result<Document> {
    if bytes.trim_ascii_start().first() != Some(&b'{') {
        return Err(Error::Parse {
            line,
            message: "expected a JSON object".to_string(),
        });
    }

    // simd-json parses in place, so it needs its own copy
    let mut scratch = bytes.to_vec();
    let mut document = simd_json::serde::from_slice::<Document>(&mut scratch)
        .or_else(|_| serde_json::from_slice::<Document>(bytes))
        .map_err(|e| Error::Parse {
            line,
            message: e.to_string(),
        })?;
    document.line = line;
    Ok(document)
}
