//! Persisting record streams.
//!
//! Every format implements [`FormatWriter`]. The [`Exporter`] picks a writer
//! from a [`FormatRegistry`], flattens deferred data and hands the writer
//! scalar-only records.

mod columnar;
mod delimited;
mod error;
mod format;
mod jsonl;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::record::{FlattenMode, Record};

pub use columnar::{Column, ColumnarReader, ColumnarWriter, ROW_GROUP_SIZE, SchemaState};
pub use delimited::DelimitedWriter;
pub use error::ExportError;
pub use format::{Format, FormatEntry, FormatRegistry, WriterFactory};
pub use jsonl::JsonlWriter;

/// Format-specific sink. Records given to a writer are already flattened.
pub trait FormatWriter: Send {
    /// Creates (or truncates) the output file.
    fn init(&mut self, path: &Path) -> Result<(), ExportError>;

    fn write(&mut self, record: &Record) -> Result<(), ExportError>;

    fn write_batch(&mut self, records: &[Record]) -> Result<(), ExportError> {
        for record in records {
            self.write(record)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ExportError>;

    /// Flushes and releases the file. Calling it twice is harmless.
    fn close(&mut self) -> Result<(), ExportError>;

    fn path(&self) -> Option<&Path>;
}

/// Writes records to one file in one format.
pub struct Exporter {
    writer: Box<dyn FormatWriter>,
    format: Format,
    flatten: FlattenMode,
    rows: u64,
}

impl Exporter {
    /// Opens `path` with the writer registered under `format_name`.
    pub fn new(registry: &FormatRegistry, format_name: &str, path: &Path) -> Result<Self, ExportError> {
        let entry = registry
            .by_name(format_name)
            .ok_or_else(|| ExportError::UnsupportedFormat(format_name.to_string()))?;
        Self::open(entry, path)
    }

    /// Opens `path` with the format its extension names, JSONL when the
    /// extension is missing or unknown.
    pub fn for_path(registry: &FormatRegistry, path: &Path) -> Result<Self, ExportError> {
        match registry.for_path(path) {
            Some(entry) => Self::open(entry, path),
            None => Self::new(registry, Format::Jsonl.name(), path),
        }
    }

    fn open(entry: &FormatEntry, path: &Path) -> Result<Self, ExportError> {
        let mut writer = entry.new_writer();
        writer.init(path)?;
        debug!(format = entry.name(), path = %path.display(), "exporter opened");
        Ok(Self {
            writer,
            format: entry.format,
            flatten: FlattenMode::default(),
            rows: 0,
        })
    }

    pub fn with_flatten_mode(mut self, mode: FlattenMode) -> Self {
        self.flatten = mode;
        self
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn write(&mut self, record: &Record) -> Result<(), ExportError> {
        let flat = record.flatten_with(self.flatten);
        self.writer.write(&flat)?;
        self.rows += 1;
        Ok(())
    }

    pub fn write_batch(&mut self, records: &[Record]) -> Result<(), ExportError> {
        let flat: Vec<Record> = records
            .iter()
            .map(|r| r.flatten_with(self.flatten).into_owned())
            .collect();
        self.writer.write_batch(&flat)?;
        self.rows += flat.len() as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), ExportError> {
        self.writer.flush()?;
        debug!(rows = self.rows, "exporter flushed");
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), ExportError> {
        self.writer.close()
    }

    pub fn path(&self) -> Option<&Path> {
        self.writer.path()
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }
}

/// Reads a file written in `format` back into records.
pub fn read_records(format: Format, path: &Path) -> Result<Vec<Record>, ExportError> {
    match format {
        Format::Jsonl => jsonl::read_records(path),
        Format::Csv => delimited::read_records(path, ','),
        Format::Tsv => delimited::read_records(path, '\t'),
        Format::Columnar => columnar::read_records(path),
    }
}

/// Path of the static companion file: `<stem>_static.json` beside `output`.
pub fn static_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    output.with_file_name(format!("{}_static.json", stem))
}

/// Writes the static record as pretty-printed JSON next to `output`.
pub fn write_static(record: &Record, output: &Path) -> Result<PathBuf, ExportError> {
    let path = static_path(output);
    let json = serde_json::to_string_pretty(&*record.flatten())?;
    fs::write(&path, json)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ProcessSample, Value};
    use tempfile::tempdir;

    fn sample_record(ts: i64) -> Record {
        let mut r = Record::new();
        r.insert("timestamp", ts);
        r.insert("vCpuTime", 100 + ts);
        r.set_processes(vec![ProcessSample {
            pid: 42,
            name: "python".into(),
            ..Default::default()
        }]);
        r
    }

    #[test]
    fn test_unknown_format_name() {
        let dir = tempdir().unwrap();
        let reg = FormatRegistry::builtin();
        let err = Exporter::new(&reg, "parquet2", &dir.path().join("x")).err();
        assert!(matches!(err, Some(ExportError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_for_path_defaults_to_jsonl() {
        let dir = tempdir().unwrap();
        let reg = FormatRegistry::builtin();
        let exp = Exporter::for_path(&reg, &dir.path().join("out.bin")).unwrap();
        assert_eq!(exp.format(), Format::Jsonl);
    }

    #[test]
    fn test_same_stream_in_every_format() {
        let dir = tempdir().unwrap();
        let reg = FormatRegistry::builtin();
        let records = vec![sample_record(1), sample_record(2)];

        for name in reg.names() {
            let entry = reg.by_name(name).unwrap();
            let path = dir.path().join(format!("run{}", entry.extension()));
            let mut exp = Exporter::new(&reg, name, &path).unwrap();
            exp.write(&records[0]).unwrap();
            exp.write_batch(&records[1..]).unwrap();
            exp.close().unwrap();
            assert_eq!(exp.rows_written(), 2);

            let back = read_records(entry.format, &path).unwrap();
            assert_eq!(back.len(), 2, "format {}", name);
            assert_eq!(back[1].get_i64("vCpuTime"), Some(102), "format {}", name);
            let procs = back[0].get_str("processes").unwrap();
            assert!(procs.contains("\"pid\":42"), "format {}", name);
        }
    }

    #[test]
    fn test_expand_mode_writes_prefixed_keys() {
        let dir = tempdir().unwrap();
        let reg = FormatRegistry::builtin();
        let path = dir.path().join("expanded.csv");

        let mut exp = Exporter::for_path(&reg, &path)
            .unwrap()
            .with_flatten_mode(FlattenMode::Expand);
        exp.write(&sample_record(1)).unwrap();
        exp.close().unwrap();

        let back = read_records(Format::Csv, &path).unwrap();
        assert_eq!(back[0].get_i64("proc0Pid"), Some(42));
        assert!(!back[0].contains_key("processes"));
    }

    #[test]
    fn test_static_companion_file() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("metrics.csv");
        assert_eq!(static_path(&output), dir.path().join("metrics_static.json"));

        let mut r = Record::new();
        r.insert("vHostname", "node-1");
        r.insert("vNumProcessors", 8);
        let path = write_static(&r, &output).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains('\n'));
        let back: Record = serde_json::from_str(&text).unwrap();
        assert_eq!(back.get("vNumProcessors"), Some(&Value::Int(8)));
    }
}
