//! Delimited text (CSV, TSV).
//!
//! The header is the sorted key set of the first record written. Every later
//! row follows that column order: missing fields are left empty and keys that
//! were not in the first record are dropped.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{ExportError, FormatWriter};
use crate::record::{Record, Value};

const BUFFER_SIZE: usize = 64 * 1024;

pub struct DelimitedWriter {
    delimiter: char,
    path: Option<PathBuf>,
    out: Option<BufWriter<File>>,
    header: Option<Vec<String>>,
    dropped: BTreeSet<String>,
}

impl DelimitedWriter {
    pub fn new(delimiter: char) -> Self {
        Self {
            delimiter,
            path: None,
            out: None,
            header: None,
            dropped: BTreeSet::new(),
        }
    }

    pub fn csv() -> Self {
        Self::new(',')
    }

    pub fn tsv() -> Self {
        Self::new('\t')
    }

    /// Column order, once the first record has been written.
    pub fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    /// Keys seen after the header was fixed and therefore not written.
    pub fn dropped_keys(&self) -> impl Iterator<Item = &str> {
        self.dropped.iter().map(String::as_str)
    }

    fn write_line<'a>(
        out: &mut BufWriter<File>,
        delimiter: char,
        fields: impl Iterator<Item = &'a str>,
    ) -> Result<(), ExportError> {
        let mut line = String::new();
        for (i, field) in fields.enumerate() {
            if i > 0 {
                line.push(delimiter);
            }
            push_escaped(&mut line, field, delimiter);
        }
        line.push('\n');
        out.write_all(line.as_bytes())?;
        Ok(())
    }
}

impl FormatWriter for DelimitedWriter {
    fn init(&mut self, path: &Path) -> Result<(), ExportError> {
        let file = File::create(path)?;
        self.out = Some(BufWriter::with_capacity(BUFFER_SIZE, file));
        self.path = Some(path.to_path_buf());
        self.header = None;
        self.dropped.clear();
        Ok(())
    }

    fn write(&mut self, record: &Record) -> Result<(), ExportError> {
        let out = self.out.as_mut().ok_or(ExportError::NotInitialized)?;

        if self.header.is_none() {
            let h: Vec<String> = record.keys().map(str::to_string).collect();
            Self::write_line(out, self.delimiter, h.iter().map(String::as_str))?;
            debug!(columns = h.len(), "delimited header fixed");
            self.header = Some(h);
        }
        let header = self.header.as_deref().unwrap_or_default();

        for key in record.keys() {
            if header.binary_search_by(|h| h.as_str().cmp(key)).is_err()
                && self.dropped.insert(key.to_string())
            {
                warn!(key, "dropping column not present in header");
            }
        }

        let cells: Vec<String> = header
            .iter()
            .map(|col| record.get(col).map(Value::to_string).unwrap_or_default())
            .collect();
        Self::write_line(out, self.delimiter, cells.iter().map(String::as_str))
    }

    fn flush(&mut self) -> Result<(), ExportError> {
        let out = self.out.as_mut().ok_or(ExportError::NotInitialized)?;
        out.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), ExportError> {
        if let Some(mut out) = self.out.take() {
            out.flush()?;
            out.get_ref().sync_all()?;
        }
        Ok(())
    }

    fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn push_escaped(line: &mut String, field: &str, delimiter: char) {
    let needs_quotes = field.contains(delimiter)
        || field.contains('"')
        || field.contains('\n')
        || field.contains('\r');
    if !needs_quotes {
        line.push_str(field);
        return;
    }
    line.push('"');
    for c in field.chars() {
        if c == '"' {
            line.push('"');
        }
        line.push(c);
    }
    line.push('"');
}

/// Splits delimited text into rows of fields. Quoted fields may contain the
/// delimiter, doubled quotes and line breaks.
fn parse_rows(content: &str, delimiter: char) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            c if c == delimiter => row.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}

/// Reads a delimited file back into records using its header row. Cells are
/// typed as int, float, bool or string in that order; empty cells are absent.
pub fn read_records(path: &Path, delimiter: char) -> Result<Vec<Record>, ExportError> {
    let content = fs::read_to_string(path)?;
    let mut rows = parse_rows(&content, delimiter).into_iter();

    let Some(header) = rows.next() else {
        return Ok(Vec::new());
    };

    let mut records = Vec::new();
    for (idx, row) in rows.enumerate() {
        if row.len() > header.len() {
            return Err(ExportError::Corrupt(format!(
                "row {} has {} fields, header has {}",
                idx + 2,
                row.len(),
                header.len()
            )));
        }
        let record: Record = header
            .iter()
            .zip(row.iter())
            .filter_map(|(k, cell)| Value::parse_cell(cell).map(|v| (k.as_str(), v)))
            .collect();
        records.push(record);
    }
    Ok(records)
}
