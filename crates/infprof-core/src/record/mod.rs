//! Schema-free sample records.
//!
//! A [`Record`] maps string keys to a closed set of [`Value`] kinds. Process
//! tables and per-GPU samples ride along in typed deferred fields and are only
//! encoded into text by [`Record::flatten`], right before a record leaves the
//! pipeline.

mod flatten;
mod sample;
mod value;

pub use flatten::FlattenMode;
pub use sample::{GpuProcessSample, GpuSample, ProcessSample};
pub use value::{Value, ValueKind};

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Key the deferred process table is written under.
pub const PROCESSES_KEY: &str = "processes";
/// Key the deferred per-GPU samples are written under.
pub const GPUS_KEY: &str = "gpus";
/// Pipeline-wide sample timestamp (Unix nanoseconds).
pub const TIMESTAMP_KEY: &str = "timestamp";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: BTreeMap<String, Value>,
    processes: Option<Vec<ProcessSample>>,
    gpus: Option<Vec<GpuSample>>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a field, replacing any previous value under the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Inserts a field together with its `<key>T` sample timestamp.
    pub fn insert_sampled(&mut self, key: &str, value: impl Into<Value>, sampled_at: i64) {
        self.values.insert(format!("{key}T"), Value::Int(sampled_at));
        self.values.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(Value::as_f64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of scalar fields. Deferred collections are not counted.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && !self.has_deferred()
    }

    /// Keys in lexicographic order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Merges `other` into `self`; on duplicate keys `other` wins.
    pub fn merge(&mut self, other: Record) {
        self.values.extend(other.values);
        if other.processes.is_some() {
            self.processes = other.processes;
        }
        if other.gpus.is_some() {
            self.gpus = other.gpus;
        }
    }

    /// Same as [`Record::merge`] but leaves `other` untouched.
    pub fn overlay(&mut self, other: &Record) {
        for (k, v) in &other.values {
            self.values.insert(k.clone(), v.clone());
        }
        if let Some(p) = &other.processes {
            self.processes = Some(p.clone());
        }
        if let Some(g) = &other.gpus {
            self.gpus = Some(g.clone());
        }
    }

    pub fn set_processes(&mut self, processes: Vec<ProcessSample>) {
        self.processes = Some(processes);
    }

    pub fn set_gpus(&mut self, gpus: Vec<GpuSample>) {
        self.gpus = Some(gpus);
    }

    pub fn processes(&self) -> Option<&[ProcessSample]> {
        self.processes.as_deref()
    }

    pub fn gpus(&self) -> Option<&[GpuSample]> {
        self.gpus.as_deref()
    }

    /// True while either deferred collection still holds typed samples.
    pub fn has_deferred(&self) -> bool {
        self.processes.is_some() || self.gpus.is_some()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

/// Serialized as one flat JSON object. Deferred collections that were never
/// flattened are emitted as nested arrays under their reserved keys.
impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut extra = 0;
        if self.processes.is_some() && !self.values.contains_key(PROCESSES_KEY) {
            extra += 1;
        }
        if self.gpus.is_some() && !self.values.contains_key(GPUS_KEY) {
            extra += 1;
        }

        let mut map = serializer.serialize_map(Some(self.values.len() + extra))?;
        for (k, v) in &self.values {
            map.serialize_entry(k, v)?;
        }
        if let Some(p) = &self.processes
            && !self.values.contains_key(PROCESSES_KEY)
        {
            map.serialize_entry(PROCESSES_KEY, p)?;
        }
        if let Some(g) = &self.gpus
            && !self.values.contains_key(GPUS_KEY)
        {
            map.serialize_entry(GPUS_KEY, g)?;
        }
        map.end()
    }
}

/// `null` fields are treated as absent.
impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, Option<Value>>::deserialize(deserializer)?;
        Ok(raw
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect())
    }
}
