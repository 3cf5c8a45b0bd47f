use std::borrow::Cow;

use serde::Serialize;
use tracing::warn;

use super::{GPUS_KEY, PROCESSES_KEY, Record, Value};

/// How deferred collections are resolved at export time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlattenMode {
    /// Each collection becomes one JSON string under its reserved key.
    #[default]
    Json,
    /// Every sample field becomes its own top-level key
    /// (`proc0Pid`, `nvidia1UtilizationGpu`, ...).
    Expand,
}

impl Record {
    /// Resolves deferred collections to JSON text.
    ///
    /// Records without deferred data are borrowed as is, so flattening an
    /// already flat record costs two field checks.
    pub fn flatten(&self) -> Cow<'_, Record> {
        self.flatten_with(FlattenMode::Json)
    }

    pub fn flatten_with(&self, mode: FlattenMode) -> Cow<'_, Record> {
        if !self.has_deferred() {
            return Cow::Borrowed(self);
        }
        Cow::Owned(self.clone().into_flat(mode))
    }

    /// Owned variant of [`Record::flatten_with`].
    pub fn into_flat(mut self, mode: FlattenMode) -> Record {
        if let Some(processes) = self.processes.take() {
            match mode {
                FlattenMode::Json => {
                    self.insert(PROCESSES_KEY, to_json_text(PROCESSES_KEY, &processes));
                }
                FlattenMode::Expand => {
                    for (i, p) in processes.iter().enumerate() {
                        expand_into(&mut self, &format!("proc{i}"), p, None);
                    }
                }
            }
        }

        if let Some(gpus) = self.gpus.take() {
            match mode {
                FlattenMode::Json => {
                    self.insert(GPUS_KEY, to_json_text(GPUS_KEY, &gpus));
                }
                FlattenMode::Expand => {
                    for g in &gpus {
                        expand_into(&mut self, &format!("nvidia{}", g.index), g, Some("index"));
                    }
                }
            }
        }

        self
    }
}

fn to_json_text<T: Serialize>(key: &str, value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(s) => s,
        Err(e) => {
            warn!(key, error = %e, "failed to encode deferred collection");
            "[]".to_string()
        }
    }
}

fn expand_into<T: Serialize>(record: &mut Record, prefix: &str, sample: &T, skip: Option<&str>) {
    let Ok(serde_json::Value::Object(fields)) = serde_json::to_value(sample) else {
        return;
    };
    for (field, value) in fields {
        if skip == Some(field.as_str()) {
            continue;
        }
        if let Some(v) = Value::from_json(value) {
            record.insert(format!("{prefix}{}", capitalize(&field)), v);
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{GpuSample, ProcessSample};

    fn with_deferred() -> Record {
        let mut r = Record::new();
        r.insert("timestamp", 10);
        r.set_processes(vec![ProcessSample {
            pid: 42,
            name: "python".into(),
            ..Default::default()
        }]);
        r.set_gpus(vec![GpuSample {
            index: 1,
            utilization_gpu: 80,
            ..Default::default()
        }]);
        r
    }

    #[test]
    fn test_flatten_without_deferred_borrows() {
        let mut r = Record::new();
        r.insert("a", 1);
        assert!(matches!(r.flatten(), Cow::Borrowed(_)));
    }

    #[test]
    fn test_flatten_json_mode() {
        let flat = with_deferred().flatten().into_owned();
        assert!(!flat.has_deferred());
        let procs = flat.get_str(PROCESSES_KEY).unwrap();
        assert!(procs.starts_with('['));
        assert!(procs.contains("\"pid\":42"));
        assert!(flat.get_str(GPUS_KEY).unwrap().contains("\"utilizationGpu\":80"));
    }

    #[test]
    fn test_flatten_idempotent() {
        let once = with_deferred().flatten().into_owned();
        let twice = once.flatten().into_owned();
        assert_eq!(once, twice);

        let mut plain = Record::new();
        plain.insert("x", 1.5);
        assert_eq!(plain.flatten().into_owned(), plain);
    }

    #[test]
    fn test_flatten_expand_mode() {
        let flat = with_deferred().flatten_with(FlattenMode::Expand).into_owned();
        assert_eq!(flat.get_i64("proc0Pid"), Some(42));
        assert_eq!(flat.get_str("proc0Name"), Some("python"));
        assert_eq!(flat.get_i64("nvidia1UtilizationGpu"), Some(80));
        assert!(!flat.contains_key("nvidia1Index"));
        assert!(!flat.contains_key(PROCESSES_KEY));
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("pid"), "Pid");
        assert_eq!(capitalize(""), "");
    }
}
