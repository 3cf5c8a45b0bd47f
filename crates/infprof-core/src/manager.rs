//! Collector orchestration.
//!
//! The [`Manager`] owns the enabled collectors, fans each tick out to them
//! (one after another or on scoped threads), merges their records and
//! overlays the cached static record.

use std::path::Path;
use std::sync::RwLock;
use std::thread;
use std::time::Instant;

use tracing::{debug, info, warn};
use uuid::Uuid;

#[cfg(feature = "nvidia")]
use crate::collector::NvidiaCollector;
use crate::collector::procfs::parser::parse_global_stat;
use crate::collector::procfs::probe_file;
use crate::collector::vm::{CpuCollector, DiskCollector, MemoryCollector, NetworkCollector};
use crate::collector::{
    CollectError, Collector, ContainerCollector, FileSystem, ProcessCollector, RealFs,
    VllmCollector,
};
use crate::config::CollectorConfig;
use crate::record::{Record, TIMESTAMP_KEY};
use crate::util::now_nanos;

const MACHINE_ID_PATH: &str = "/etc/machine-id";
const UNAVAILABLE: &str = "unavailable";

pub struct Manager {
    collectors: Vec<Box<dyn Collector>>,
    identity: Record,
    static_record: RwLock<Option<Record>>,
    concurrent: bool,
}

impl Manager {
    /// Builds the collector set for the live host.
    pub fn new(config: &CollectorConfig) -> Self {
        Self::with_fs(config, RealFs::new())
    }

    /// Builds the collector set reading procfs and cgroupfs through `fs`.
    pub fn with_fs<F>(config: &CollectorConfig, fs: F) -> Self
    where
        F: FileSystem + Clone + 'static,
    {
        let mut collectors: Vec<Box<dyn Collector>> = Vec::new();
        let proc_path = config.proc_path.as_path();

        if config.enable_vm {
            collectors.push(Box::new(CpuCollector::new(fs.clone(), proc_path)));
            collectors.push(Box::new(MemoryCollector::new(fs.clone(), proc_path)));
            collectors.push(Box::new(DiskCollector::new(fs.clone(), proc_path)));
            collectors.push(Box::new(NetworkCollector::new(fs.clone(), proc_path)));
        }

        if config.enable_container {
            match ContainerCollector::new(fs.clone(), &config.cgroup_path, proc_path) {
                Ok(c) => collectors.push(Box::new(c)),
                Err(e) => info!(error = %e, "container collector disabled"),
            }
        }

        if config.enable_process {
            collectors.push(Box::new(ProcessCollector::new(fs.clone(), proc_path)));
        }

        if config.enable_nvidia {
            push_nvidia(&mut collectors, config);
        }

        if config.enable_vllm {
            match VllmCollector::new(config.vllm_url.as_str()) {
                Ok(c) => collectors.push(Box::new(c)),
                Err(e) => info!(error = %e, "vllm collector disabled"),
            }
        }

        let identity = host_identity(&fs, proc_path);
        let mut manager = Self::from_collectors(collectors, config.concurrent);
        manager.identity.merge(identity);
        manager
    }

    /// Wraps an explicit collector list. The identity record holds only the
    /// session UUID.
    pub fn from_collectors(collectors: Vec<Box<dyn Collector>>, concurrent: bool) -> Self {
        let mut identity = Record::new();
        identity.insert("uuid", Uuid::new_v4().to_string());
        info!(
            collectors = collectors.len(),
            concurrent, "collector manager ready"
        );
        Self {
            collectors,
            identity,
            static_record: RwLock::new(None),
            concurrent,
        }
    }

    pub fn collector_names(&self) -> Vec<&str> {
        self.collectors.iter().map(|c| c.name()).collect()
    }

    pub fn is_concurrent(&self) -> bool {
        self.concurrent
    }

    /// Static record, collected on first use and cached afterwards.
    pub fn collect_static(&self) -> Record {
        if let Some(cached) = self.static_record() {
            return cached;
        }
        self.refresh_static()
    }

    /// Re-reads every collector's static fields and replaces the cache.
    pub fn refresh_static(&self) -> Record {
        let mut record = self.identity.clone();
        for collector in &self.collectors {
            record.merge(collector.collect_static());
        }
        let mut guard = match self.static_record.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(record.clone());
        debug!(fields = record.len(), "static record collected");
        record
    }

    /// Cached static record, `None` before the first collection.
    pub fn static_record(&self) -> Option<Record> {
        let guard = match self.static_record.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.clone()
    }

    /// One tick: every collector's dynamic record merged, then the static
    /// record laid over it.
    pub fn collect_dynamic(&self) -> Record {
        let mut record = Record::new();
        record.insert(TIMESTAMP_KEY, now_nanos());

        let started = Instant::now();
        let parts: Vec<Record> = if self.concurrent && self.collectors.len() > 1 {
            thread::scope(|s| {
                let handles: Vec<_> = self
                    .collectors
                    .iter()
                    .map(|c| s.spawn(move || run_timed(c.as_ref())))
                    .collect();
                handles
                    .into_iter()
                    .zip(&self.collectors)
                    .map(|(h, c)| {
                        h.join().unwrap_or_else(|_| {
                            warn!(collector = c.name(), "collector panicked");
                            Record::new()
                        })
                    })
                    .collect()
            })
        } else {
            self.collectors
                .iter()
                .map(|c| run_timed(c.as_ref()))
                .collect()
        };

        for part in parts {
            record.merge(part);
        }
        record.overlay(&self.collect_static());
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            fields = record.len(),
            "tick collected"
        );
        record
    }

    /// Closes every collector, returning the first error.
    pub fn close(&self) -> Result<(), CollectError> {
        let mut first_err = None;
        for collector in &self.collectors {
            if let Err(e) = collector.close() {
                warn!(collector = collector.name(), error = %e, "close failed");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(feature = "nvidia")]
fn push_nvidia(collectors: &mut Vec<Box<dyn Collector>>, config: &CollectorConfig) {
    match NvidiaCollector::new(config.collect_gpu_processes, config.concurrent) {
        Ok(c) => collectors.push(Box::new(c)),
        Err(e) => info!(error = %e, "nvidia collector disabled"),
    }
}

#[cfg(not(feature = "nvidia"))]
fn push_nvidia(_collectors: &mut Vec<Box<dyn Collector>>, _config: &CollectorConfig) {
    info!("nvidia collector disabled: built without the nvidia feature");
}

fn run_timed(collector: &dyn Collector) -> Record {
    let started = Instant::now();
    let record = collector.collect_dynamic();
    debug!(
        collector = collector.name(),
        elapsed_us = started.elapsed().as_micros() as u64,
        fields = record.len(),
        "collector done"
    );
    record
}

/// `vId`, `vHostname` and `vBootTime` of the host.
fn host_identity<F: FileSystem>(fs: &F, proc_path: &Path) -> Record {
    let mut record = Record::new();

    let (machine_id, _) = probe_file(fs, Path::new(MACHINE_ID_PATH));
    record.insert("vId", non_empty_or_unavailable(&machine_id));

    let (hostname, _) = probe_file(fs, &proc_path.join("sys/kernel/hostname"));
    record.insert("vHostname", non_empty_or_unavailable(&hostname));

    let (stat, _) = probe_file(fs, &proc_path.join("stat"));
    record.insert("vBootTime", parse_global_stat(&stat).btime as i64);

    record
}

fn non_empty_or_unavailable(s: &str) -> String {
    match s.trim() {
        "" => UNAVAILABLE.to_string(),
        v => v.to_string(),
    }
}
