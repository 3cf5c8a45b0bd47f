//! Columnar binary format with an embedded, inferred schema.
//!
//! The first record written fixes the schema: one nullable column per key,
//! typed from that record's values. Rows are buffered and written in row
//! groups, each stored column by column as a zstd frame.
//!
//! File layout:
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ HEADER (16 bytes)                            │
//! │   magic: [u8; 4]        = b"IPC1"            │
//! │   version: u16          = 1                  │
//! │   column_count: u16                          │
//! │   schema_len: u32                            │
//! │   schema_crc: u32                            │
//! ├──────────────────────────────────────────────┤
//! │ SCHEMA                                       │
//! │   postcard(Vec<Column>)                      │
//! ├──────────────────────────────────────────────┤
//! │ ROW GROUP (repeated)                         │
//! │   row_count: u32                             │
//! │   payload_len: u32                           │
//! │   raw_len: u32                               │
//! │   crc: u32              (crc32 of payload)   │
//! │   payload: zstd(postcard(Vec<ColumnData>))   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! After the schema is fixed, keys that are not part of it are dropped (with
//! one warning per key) and missing keys are stored as null. A value whose
//! kind cannot be stored in its column is rejected with
//! [`ExportError::SchemaMismatch`]. Ints widen into float columns; a float
//! goes into an int column only when it is integral and in `i64` range, so
//! no fraction is ever dropped.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ExportError, FormatWriter};
use crate::record::{Record, Value, ValueKind};

const MAGIC: [u8; 4] = *b"IPC1";
const VERSION: u16 = 1;
const HEADER_SIZE: usize = 16;
const GROUP_HEADER_SIZE: usize = 16;
const ZSTD_LEVEL: i32 = 3;

/// Rows buffered before a row group is written.
pub const ROW_GROUP_SIZE: usize = 1000;

/// One schema entry. Every column is nullable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ValueKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum ColumnData {
    Int(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Bool(Vec<Option<bool>>),
    Str(Vec<Option<String>>),
}

impl ColumnData {
    fn from_cells<'a>(kind: ValueKind, cells: impl Iterator<Item = &'a Cell>) -> Self {
        match kind {
            ValueKind::Int => ColumnData::Int(
                cells
                    .map(|c| match c {
                        Cell::Int(v) => Some(*v),
                        _ => None,
                    })
                    .collect(),
            ),
            ValueKind::Float => ColumnData::Float(
                cells
                    .map(|c| match c {
                        Cell::Float(v) => Some(*v),
                        _ => None,
                    })
                    .collect(),
            ),
            ValueKind::Bool => ColumnData::Bool(
                cells
                    .map(|c| match c {
                        Cell::Bool(v) => Some(*v),
                        _ => None,
                    })
                    .collect(),
            ),
            ValueKind::Str => ColumnData::Str(
                cells
                    .map(|c| match c {
                        Cell::Str(v) => Some(v.clone()),
                        _ => None,
                    })
                    .collect(),
            ),
        }
    }

    fn kind(&self) -> ValueKind {
        match self {
            ColumnData::Int(_) => ValueKind::Int,
            ColumnData::Float(_) => ValueKind::Float,
            ColumnData::Bool(_) => ValueKind::Bool,
            ColumnData::Str(_) => ValueKind::Str,
        }
    }

    fn len(&self) -> usize {
        match self {
            ColumnData::Int(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
            ColumnData::Str(v) => v.len(),
        }
    }

    fn value(&self, row: usize) -> Option<Value> {
        match self {
            ColumnData::Int(v) => v.get(row).copied().flatten().map(Value::Int),
            ColumnData::Float(v) => v.get(row).copied().flatten().map(Value::Float),
            ColumnData::Bool(v) => v.get(row).copied().flatten().map(Value::Bool),
            ColumnData::Str(v) => v.get(row).cloned().flatten().map(Value::Str),
        }
    }
}

/// A value already converted to its column's type.
#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

fn to_cell(column: &Column, value: Option<&Value>) -> Result<Cell, ExportError> {
    let Some(value) = value else {
        return Ok(Cell::Null);
    };
    let cell = match (column.kind, value) {
        (ValueKind::Int, Value::Int(v)) => Cell::Int(*v),
        (ValueKind::Int, Value::Float(v)) if is_exact_int(*v) => Cell::Int(*v as i64),
        (ValueKind::Float, Value::Float(v)) => Cell::Float(*v),
        (ValueKind::Float, Value::Int(v)) => Cell::Float(*v as f64),
        (ValueKind::Bool, Value::Bool(v)) => Cell::Bool(*v),
        (ValueKind::Str, Value::Str(v)) => Cell::Str(v.clone()),
        (ValueKind::Str, other) => Cell::Str(other.to_string()),
        (expected, other) => {
            return Err(ExportError::SchemaMismatch {
                column: column.name.clone(),
                expected,
                found: other.kind(),
            });
        }
    };
    Ok(cell)
}

/// True when `v` converts to `i64` without losing anything.
fn is_exact_int(v: f64) -> bool {
    v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64
}

/// Where the writer is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaState {
    /// No record seen yet; the next write defines the schema.
    Uninitialized,
    /// Schema written to the file; every later record is reconciled against it.
    SchemaFixed,
}

enum State {
    Uninitialized,
    SchemaFixed {
        columns: Vec<Column>,
        pending: Vec<Vec<Cell>>,
    },
}

pub struct ColumnarWriter {
    path: Option<PathBuf>,
    out: Option<BufWriter<File>>,
    state: State,
    group_size: usize,
    dropped: BTreeSet<String>,
    rows_written: u64,
}

impl Default for ColumnarWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnarWriter {
    pub fn new() -> Self {
        Self::with_group_size(ROW_GROUP_SIZE)
    }

    /// Writer that emits a row group every `group_size` rows.
    pub fn with_group_size(group_size: usize) -> Self {
        Self {
            path: None,
            out: None,
            state: State::Uninitialized,
            group_size: group_size.max(1),
            dropped: BTreeSet::new(),
            rows_written: 0,
        }
    }

    pub fn state(&self) -> SchemaState {
        match self.state {
            State::Uninitialized => SchemaState::Uninitialized,
            State::SchemaFixed { .. } => SchemaState::SchemaFixed,
        }
    }

    pub fn schema(&self) -> Option<&[Column]> {
        match &self.state {
            State::Uninitialized => None,
            State::SchemaFixed { columns, .. } => Some(columns),
        }
    }

    /// Keys ignored because they appeared after the schema was fixed.
    pub fn dropped_keys(&self) -> impl Iterator<Item = &str> {
        self.dropped.iter().map(String::as_str)
    }

    /// Rows buffered but not yet written as a row group.
    pub fn pending_rows(&self) -> usize {
        match &self.state {
            State::Uninitialized => 0,
            State::SchemaFixed { pending, .. } => pending.len(),
        }
    }

    /// Rows already written to the file.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    fn fix_schema(out: &mut BufWriter<File>, record: &Record) -> Result<Vec<Column>, ExportError> {
        let columns: Vec<Column> = record
            .iter()
            .map(|(name, value)| Column {
                name: name.to_string(),
                kind: value.kind(),
            })
            .collect();

        let column_count = u16::try_from(columns.len()).map_err(|_| {
            ExportError::Corrupt(format!("too many columns: {}", columns.len()))
        })?;
        let schema = postcard::to_allocvec(&columns)?;

        let mut header = [0u8; HEADER_SIZE];
        header[0..4].copy_from_slice(&MAGIC);
        header[4..6].copy_from_slice(&VERSION.to_le_bytes());
        header[6..8].copy_from_slice(&column_count.to_le_bytes());
        header[8..12].copy_from_slice(&(schema.len() as u32).to_le_bytes());
        header[12..16].copy_from_slice(&crc32fast::hash(&schema).to_le_bytes());

        out.write_all(&header)?;
        out.write_all(&schema)?;
        debug!(columns = columns.len(), "columnar schema fixed");
        Ok(columns)
    }

    fn write_group(
        out: &mut BufWriter<File>,
        columns: &[Column],
        rows: &[Vec<Cell>],
    ) -> Result<(), ExportError> {
        let data: Vec<ColumnData> = columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                ColumnData::from_cells(column.kind, rows.iter().map(|r| r.get(i).unwrap_or(&Cell::Null)))
            })
            .collect();

        let raw = postcard::to_allocvec(&data)?;
        let payload = zstd::encode_all(&raw[..], ZSTD_LEVEL)?;

        let mut header = [0u8; GROUP_HEADER_SIZE];
        header[0..4].copy_from_slice(&(rows.len() as u32).to_le_bytes());
        header[4..8].copy_from_slice(&(payload.len() as u32).to_le_bytes());
        header[8..12].copy_from_slice(&(raw.len() as u32).to_le_bytes());
        header[12..16].copy_from_slice(&crc32fast::hash(&payload).to_le_bytes());

        out.write_all(&header)?;
        out.write_all(&payload)?;
        Ok(())
    }

    /// Writes buffered rows as one row group.
    fn flush_pending(&mut self) -> Result<(), ExportError> {
        let State::SchemaFixed { columns, pending } = &mut self.state else {
            return Ok(());
        };
        if pending.is_empty() {
            return Ok(());
        }
        let out = self.out.as_mut().ok_or(ExportError::NotInitialized)?;
        Self::write_group(out, columns, pending)?;
        self.rows_written += pending.len() as u64;
        debug!(rows = pending.len(), "columnar row group written");
        pending.clear();
        Ok(())
    }
}

impl FormatWriter for ColumnarWriter {
    fn init(&mut self, path: &Path) -> Result<(), ExportError> {
        let file = File::create(path)?;
        self.out = Some(BufWriter::new(file));
        self.path = Some(path.to_path_buf());
        self.state = State::Uninitialized;
        self.dropped.clear();
        self.rows_written = 0;
        Ok(())
    }

    fn write(&mut self, record: &Record) -> Result<(), ExportError> {
        let out = self.out.as_mut().ok_or(ExportError::NotInitialized)?;

        if let State::Uninitialized = self.state {
            let columns = Self::fix_schema(out, record)?;
            self.state = State::SchemaFixed {
                columns,
                pending: Vec::with_capacity(self.group_size),
            };
        }

        let State::SchemaFixed { columns, pending } = &mut self.state else {
            return Err(ExportError::NotInitialized);
        };

        for key in record.keys() {
            if columns.binary_search_by(|c| c.name.as_str().cmp(key)).is_err()
                && self.dropped.insert(key.to_string())
            {
                warn!(key, "dropping column not present in schema");
            }
        }

        let row = columns
            .iter()
            .map(|column| to_cell(column, record.get(&column.name)))
            .collect::<Result<Vec<Cell>, ExportError>>()?;
        pending.push(row);

        if pending.len() >= self.group_size {
            self.flush_pending()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ExportError> {
        if self.out.is_none() {
            return Err(ExportError::NotInitialized);
        }
        self.flush_pending()?;
        if let Some(out) = self.out.as_mut() {
            out.flush()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), ExportError> {
        if self.out.is_none() {
            return Ok(());
        }
        self.flush_pending()?;
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

impl Drop for ColumnarWriter {
    fn drop(&mut self) {
        if self.out.is_some()
            && let Err(e) = self.close()
        {
            warn!(error = %e, "failed to close columnar writer");
        }
    }
}

fn read_u16(buf: &[u8], at: usize) -> u16 {
    let mut b = [0u8; 2];
    b.copy_from_slice(&buf[at..at + 2]);
    u16::from_le_bytes(b)
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(b)
}

/// One decoded row group. `rows` comes from the group header so that a
/// schema without columns still yields its rows.
struct RowGroup {
    rows: usize,
    columns: Vec<ColumnData>,
}

/// Decoded columnar file held in memory.
pub struct ColumnarReader {
    columns: Vec<Column>,
    groups: Vec<RowGroup>,
}

impl ColumnarReader {
    /// Reads and validates a whole file. A truncated trailing row group is
    /// ignored with a warning; a checksum mismatch is an error.
    pub fn open(path: &Path) -> Result<Self, ExportError> {
        let data = fs::read(path)?;
        if data.is_empty() {
            return Ok(Self {
                columns: Vec::new(),
                groups: Vec::new(),
            });
        }
        if data.len() < HEADER_SIZE {
            return Err(ExportError::Corrupt("file too small for header".into()));
        }
        if data[0..4] != MAGIC {
            return Err(ExportError::Corrupt(format!(
                "invalid magic: expected IPC1, got {:?}",
                &data[0..4]
            )));
        }
        let version = read_u16(&data, 4);
        if version != VERSION {
            return Err(ExportError::Corrupt(format!("unsupported version: {}", version)));
        }

        let column_count = read_u16(&data, 6) as usize;
        let schema_len = read_u32(&data, 8) as usize;
        let schema_crc = read_u32(&data, 12);

        let schema_end = HEADER_SIZE + schema_len;
        if schema_end > data.len() {
            return Err(ExportError::Corrupt("schema extends past end of file".into()));
        }
        let schema = &data[HEADER_SIZE..schema_end];
        if crc32fast::hash(schema) != schema_crc {
            return Err(ExportError::Corrupt("schema checksum mismatch".into()));
        }
        let columns: Vec<Column> = postcard::from_bytes(schema)?;
        if columns.len() != column_count {
            return Err(ExportError::Corrupt(format!(
                "header lists {} columns, schema has {}",
                column_count,
                columns.len()
            )));
        }

        let mut groups = Vec::new();
        let mut pos = schema_end;
        while pos + GROUP_HEADER_SIZE <= data.len() {
            let row_count = read_u32(&data, pos) as usize;
            let payload_len = read_u32(&data, pos + 4) as usize;
            let raw_len = read_u32(&data, pos + 8) as usize;
            let crc = read_u32(&data, pos + 12);

            let start = pos + GROUP_HEADER_SIZE;
            if start + payload_len > data.len() {
                break;
            }
            let payload = &data[start..start + payload_len];
            if crc32fast::hash(payload) != crc {
                return Err(ExportError::Corrupt(format!(
                    "row group at offset {} failed checksum",
                    pos
                )));
            }

            let raw = zstd::decode_all(payload)?;
            if raw.len() != raw_len {
                return Err(ExportError::Corrupt(format!(
                    "row group at offset {}: expected {} raw bytes, got {}",
                    pos,
                    raw_len,
                    raw.len()
                )));
            }
            let group: Vec<ColumnData> = postcard::from_bytes(&raw)?;
            validate_group(&columns, &group, row_count, pos)?;
            groups.push(RowGroup {
                rows: row_count,
                columns: group,
            });
            pos = start + payload_len;
        }

        if pos < data.len() {
            warn!(
                path = %path.display(),
                trailing_bytes = data.len() - pos,
                "ignoring truncated row group"
            );
        }

        Ok(Self { columns, groups })
    }

    pub fn schema(&self) -> &[Column] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.groups.iter().map(|g| g.rows).sum()
    }

    /// All values of one column in row order; `None` entries are nulls.
    pub fn column_values(&self, name: &str) -> Option<Vec<Option<Value>>> {
        let idx = self.columns.iter().position(|c| c.name == name)?;
        let mut out = Vec::new();
        for group in &self.groups {
            let column = group.columns.get(idx)?;
            out.extend((0..column.len()).map(|row| column.value(row)));
        }
        Some(out)
    }

    /// Rebuilds every row as a record. Null cells are left out.
    pub fn records(&self) -> Vec<Record> {
        let mut records = Vec::with_capacity(self.row_count());
        for group in &self.groups {
            for row in 0..group.rows {
                let record: Record = self
                    .columns
                    .iter()
                    .zip(group.columns.iter())
                    .filter_map(|(c, data)| data.value(row).map(|v| (c.name.as_str(), v)))
                    .collect();
                records.push(record);
            }
        }
        records
    }
}

fn validate_group(
    columns: &[Column],
    group: &[ColumnData],
    row_count: usize,
    offset: usize,
) -> Result<(), ExportError> {
    if group.len() != columns.len() {
        return Err(ExportError::Corrupt(format!(
            "row group at offset {} has {} columns, schema has {}",
            offset,
            group.len(),
            columns.len()
        )));
    }
    for (column, data) in columns.iter().zip(group) {
        if data.kind() != column.kind || data.len() != row_count {
            return Err(ExportError::Corrupt(format!(
                "row group at offset {}: column '{}' does not match schema",
                offset, column.name
            )));
        }
    }
    Ok(())
}

/// Reads every record from a columnar file.
pub fn read_records(path: &Path) -> Result<Vec<Record>, ExportError> {
    Ok(ColumnarReader::open(path)?.records())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn rec(pairs: &[(&str, Value)]) -> Record {
        pairs.iter().map(|(k, v)| (*k, v.clone())).collect()
    }

    #[test]
    fn test_state_transition_on_first_write() {
        let dir = tempdir().unwrap();
        let mut w = ColumnarWriter::new();
        w.init(&dir.path().join("s.ipcol")).unwrap();
        assert_eq!(w.state(), SchemaState::Uninitialized);
        assert!(w.schema().is_none());

        w.write(&rec(&[("b", Value::Float(1.0)), ("a", Value::Int(1))]))
            .unwrap();
        assert_eq!(w.state(), SchemaState::SchemaFixed);
        let schema = w.schema().unwrap();
        assert_eq!(schema.len(), 2);
        assert_eq!(schema[0].name, "a");
        assert_eq!(schema[0].kind, ValueKind::Int);
        assert_eq!(schema[1].kind, ValueKind::Float);
        w.close().unwrap();
    }

    #[test]
    fn test_absent_key_decodes_as_null() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nulls.ipcol");

        let mut w = ColumnarWriter::new();
        w.init(&path).unwrap();
        w.write(&rec(&[("x", Value::Int(5)), ("y", Value::Str("a".into()))]))
            .unwrap();
        w.write(&rec(&[("y", Value::Str("b".into()))])).unwrap();
        w.close().unwrap();

        let reader = ColumnarReader::open(&path).unwrap();
        assert_eq!(reader.row_count(), 2);
        assert_eq!(
            reader.column_values("x").unwrap(),
            vec![Some(Value::Int(5)), None]
        );
        let records = reader.records();
        assert!(!records[1].contains_key("x"));
        assert_eq!(records[1].get_str("y"), Some("b"));
    }

    #[test]
    fn test_unknown_key_after_schema_is_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("drop.ipcol");

        let mut w = ColumnarWriter::new();
        w.init(&path).unwrap();
        w.write(&rec(&[("a", Value::Int(1))])).unwrap();
        w.write(&rec(&[("a", Value::Int(2)), ("late", Value::Bool(true))]))
            .unwrap();
        assert_eq!(w.dropped_keys().collect::<Vec<_>>(), vec!["late"]);
        w.close().unwrap();

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert!(!records[1].contains_key("late"));
    }

    #[test]
    fn test_fractional_float_rejected_by_int_column() {
        let dir = tempdir().unwrap();
        let mut w = ColumnarWriter::new();
        w.init(&dir.path().join("frac.ipcol")).unwrap();
        w.write(&rec(&[("n", Value::Int(1))])).unwrap();

        let err = w.write(&rec(&[("n", Value::Float(2.7))])).unwrap_err();
        match err {
            ExportError::SchemaMismatch {
                column,
                expected,
                found,
            } => {
                assert_eq!(column, "n");
                assert_eq!(expected, ValueKind::Int);
                assert_eq!(found, ValueKind::Float);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(w.write(&rec(&[("n", Value::Float(f64::NAN))])).is_err());
        assert!(w.write(&rec(&[("n", Value::Float(1e300))])).is_err());
        w.write(&rec(&[("n", Value::Float(-3.0))])).unwrap();
        w.close().unwrap();

        let records = read_records(w.path().unwrap()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("n"), Some(&Value::Int(-3)));
    }

    #[test]
    fn test_empty_schema_keeps_row_count() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty-schema.ipcol");

        let mut w = ColumnarWriter::new();
        w.init(&path).unwrap();
        w.write(&Record::new()).unwrap();
        w.write(&rec(&[("a", Value::Int(1))])).unwrap();
        w.write(&rec(&[("b", Value::Float(0.5))])).unwrap();
        w.close().unwrap();

        let reader = ColumnarReader::open(&path).unwrap();
        assert!(reader.schema().is_empty());
        assert_eq!(reader.row_count(), 3);

        let records = reader.records();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.is_empty()));
    }

    #[test]
    fn test_numeric_widening_and_mismatch() {
        let dir = tempdir().unwrap();
        let mut w = ColumnarWriter::new();
        w.init(&dir.path().join("w.ipcol")).unwrap();
        w.write(&rec(&[
            ("f", Value::Float(0.5)),
            ("i", Value::Int(3)),
            ("s", Value::Str("x".into())),
        ]))
        .unwrap();

        w.write(&rec(&[
            ("f", Value::Int(2)),
            ("i", Value::Float(4.0)),
            ("s", Value::Int(9)),
        ]))
        .unwrap();

        let err = w
            .write(&rec(&[("i", Value::Str("oops".into()))]))
            .unwrap_err();
        match err {
            ExportError::SchemaMismatch {
                column,
                expected,
                found,
            } => {
                assert_eq!(column, "i");
                assert_eq!(expected, ValueKind::Int);
                assert_eq!(found, ValueKind::Str);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(w.pending_rows(), 2);
        w.close().unwrap();

        let records = read_records(w.path().unwrap()).unwrap();
        assert_eq!(records[1].get("f"), Some(&Value::Float(2.0)));
        assert_eq!(records[1].get("i"), Some(&Value::Int(4)));
        assert_eq!(records[1].get_str("s"), Some("9"));
    }

    #[test]
    fn test_row_groups_split_at_group_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("groups.ipcol");

        let mut w = ColumnarWriter::with_group_size(10);
        w.init(&path).unwrap();
        for i in 0..25 {
            w.write(&rec(&[("n", Value::Int(i))])).unwrap();
        }
        assert_eq!(w.rows_written(), 20);
        assert_eq!(w.pending_rows(), 5);
        w.close().unwrap();
        assert_eq!(w.rows_written(), 25);

        let records = read_records(&path).unwrap();
        let ns: Vec<i64> = records.iter().filter_map(|r| r.get_i64("n")).collect();
        assert_eq!(ns, (0..25).collect::<Vec<_>>());
    }

    #[test]
    fn test_truncated_tail_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("torn.ipcol");

        let mut w = ColumnarWriter::with_group_size(2);
        w.init(&path).unwrap();
        for i in 0..4 {
            w.write(&rec(&[("n", Value::Int(i))])).unwrap();
        }
        w.close().unwrap();

        let data = fs::read(&path).unwrap();
        fs::write(&path, &data[..data.len() - 3]).unwrap();

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_corrupt_payload_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.ipcol");

        let mut w = ColumnarWriter::new();
        w.init(&path).unwrap();
        w.write(&rec(&[("n", Value::Int(1))])).unwrap();
        w.close().unwrap();

        let mut data = fs::read(&path).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        fs::write(&path, &data).unwrap();

        assert!(matches!(
            ColumnarReader::open(&path),
            Err(ExportError::Corrupt(_))
        ));
    }

    #[test]
    fn test_bad_magic_and_empty_file() {
        let dir = tempdir().unwrap();
        let bad = dir.path().join("bad_magic.ipcol");
        fs::write(&bad, [0u8; 32]).unwrap();
        assert!(matches!(
            ColumnarReader::open(&bad),
            Err(ExportError::Corrupt(_))
        ));

        let empty = dir.path().join("empty.ipcol");
        let mut w = ColumnarWriter::new();
        w.init(&empty).unwrap();
        w.close().unwrap();
        assert!(read_records(&empty).unwrap().is_empty());
    }

    #[test]
    fn test_drop_flushes_pending_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dropped.ipcol");
        {
            let mut w = ColumnarWriter::new();
            w.init(&path).unwrap();
            w.write(&rec(&[("n", Value::Int(1))])).unwrap();
        }
        assert_eq!(read_records(&path).unwrap().len(), 1);
    }
}
