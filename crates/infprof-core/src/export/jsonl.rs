//! Line-delimited JSON: one object per line, no shared schema.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::warn;

use super::{ExportError, FormatWriter};
use crate::record::Record;

const BUFFER_SIZE: usize = 64 * 1024;

/// JSONL writer. The buffer sits behind a mutex, so a shared reference may be
/// written from several threads through [`JsonlWriter::append`].
#[derive(Default)]
pub struct JsonlWriter {
    path: Option<PathBuf>,
    out: Mutex<Option<BufWriter<File>>>,
}

impl JsonlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<BufWriter<File>>> {
        self.out.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends one record as a single line.
    pub fn append(&self, record: &Record) -> Result<(), ExportError> {
        let mut guard = self.lock();
        let out = guard.as_mut().ok_or(ExportError::NotInitialized)?;
        serde_json::to_writer(&mut *out, record)?;
        out.write_all(b"\n")?;
        Ok(())
    }

    pub fn append_batch(&self, records: &[Record]) -> Result<(), ExportError> {
        let mut guard = self.lock();
        let out = guard.as_mut().ok_or(ExportError::NotInitialized)?;
        for record in records {
            serde_json::to_writer(&mut *out, record)?;
            out.write_all(b"\n")?;
        }
        Ok(())
    }
}

impl FormatWriter for JsonlWriter {
    fn init(&mut self, path: &Path) -> Result<(), ExportError> {
        let file = File::create(path)?;
        *self.lock() = Some(BufWriter::with_capacity(BUFFER_SIZE, file));
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    fn write(&mut self, record: &Record) -> Result<(), ExportError> {
        self.append(record)
    }

    fn write_batch(&mut self, records: &[Record]) -> Result<(), ExportError> {
        self.append_batch(records)
    }

    fn flush(&mut self) -> Result<(), ExportError> {
        match self.lock().as_mut() {
            Some(out) => Ok(out.flush()?),
            None => Err(ExportError::NotInitialized),
        }
    }

    fn close(&mut self) -> Result<(), ExportError> {
        if let Some(mut out) = self.lock().take() {
            out.flush()?;
            out.get_ref().sync_all()?;
        }
        Ok(())
    }

    fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Reads every record from a JSONL file. Blank lines are ignored; lines that
/// fail to decode (for example a torn final line) are skipped with a warning.
pub fn read_records(path: &Path) -> Result<Vec<Record>, ExportError> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Record>(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(
                path = %path.display(),
                line = idx + 1,
                error = %e,
                "skipping malformed JSONL line"
            ),
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn irregular_records() -> Vec<Record> {
        let mut a = Record::new();
        a.insert("timestamp", 1_700_000_000_000_000_000i64);
        a.insert("vCpuTime", 1234);
        a.insert("vLoadAvg", 0.75);
        a.insert("vllmAvailable", false);

        let mut b = Record::new();
        b.insert("vHostname", "node-1");
        b.insert("ratio", 2.0);
        b.insert("nested", vec![Record::from_iter([("k", Value::Int(1))])]);

        vec![a, b, Record::new()]
    }

    #[test]
    fn test_roundtrip_preserves_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.jsonl");

        let records = irregular_records();
        let mut writer = JsonlWriter::new();
        writer.init(&path).unwrap();
        writer.write_batch(&records).unwrap();
        writer.close().unwrap();

        let back = read_records(&path).unwrap();
        assert_eq!(back, records);
    }

    #[test]
    fn test_write_before_init_fails() {
        let mut writer = JsonlWriter::new();
        let err = writer.write(&Record::new()).unwrap_err();
        assert!(matches!(err, ExportError::NotInitialized));
        assert!(writer.path().is_none());
    }

    #[test]
    fn test_concurrent_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shared.jsonl");

        let mut writer = JsonlWriter::new();
        writer.init(&path).unwrap();
        let writer = Arc::new(writer);

        std::thread::scope(|s| {
            for t in 0..4 {
                let w = Arc::clone(&writer);
                s.spawn(move || {
                    for i in 0..50 {
                        let mut r = Record::new();
                        r.insert("thread", t);
                        r.insert("i", i);
                        w.append(&r).unwrap();
                    }
                });
            }
        });

        let mut writer = Arc::into_inner(writer).unwrap();
        writer.close().unwrap();
        assert_eq!(read_records(&path).unwrap().len(), 200);
    }

    #[test]
    fn test_reader_skips_torn_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("torn.jsonl");
        std::fs::write(&path, "{\"a\":1}\n\n{\"a\":2}\n{\"a\":").unwrap();
        let back = read_records(&path).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[1].get_i64("a"), Some(2));
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut writer = JsonlWriter::new();
        writer.init(&dir.path().join("x.jsonl")).unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
    }
}
