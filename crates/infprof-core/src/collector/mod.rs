//! Metric collectors.
//!
//! Every subsystem is one [`Collector`]. The [`Manager`](crate::manager::Manager)
//! owns the active set and merges their records on each tick.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Manager                             │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌────────┐ ┌─────────┐  │
//! │  │ vm::*   │ │container│ │ process │ │ nvidia │ │  vllm   │  │
//! │  │ /proc/* │ │ cgroup2 │ │ /proc/N │ │  NVML  │ │ /metrics│  │
//! │  └────┬────┘ └────┬────┘ └────┬────┘ └────────┘ └─────────┘  │
//! │       └───────────┼───────────┘                              │
//! │            ┌──────▼──────┐                                   │
//! │            │  FileSystem │ (trait)                           │
//! │            └──────┬──────┘                                   │
//! └───────────────────┼──────────────────────────────────────────┘
//!              ┌──────┴──────┐
//!       ┌──────▼──────┐ ┌────▼────────┐
//!       │   RealFs    │ │   MockFs    │
//!       │  (Linux)    │ │  (Testing)  │
//!       └─────────────┘ └─────────────┘
//! ```
//!
//! Probe failures never abort a pass: a field that cannot be read is
//! reported as zero (or empty), and its `<key>T` timestamp still records
//! when the attempt was made.
//!
//! ```
//! use infprof_core::collector::{Collector, MockFs, vm::MemoryCollector};
//!
//! let collector = MemoryCollector::new(MockFs::typical_system(), "/proc");
//! let record = collector.collect_dynamic();
//! assert!(record.get_i64("vMemoryTotal").unwrap() > 0);
//! ```

pub mod container;
pub mod mock;
#[cfg(feature = "nvidia")]
pub mod nvidia;
pub mod process;
pub mod procfs;
pub mod traits;
pub mod vllm;
pub mod vm;

use std::fmt;
use std::io;

use crate::record::Record;

pub use container::ContainerCollector;
pub use mock::MockFs;
#[cfg(feature = "nvidia")]
pub use nvidia::NvidiaCollector;
pub use process::ProcessCollector;
pub use traits::{FileSystem, RealFs};
pub use vllm::VllmCollector;

/// One subsystem's source of metrics.
///
/// Collectors never fail a collection pass. Missing data degrades to zero
/// values or an `...Available = false` flag.
pub trait Collector: Send + Sync {
    /// Short stable name used in logs.
    fn name(&self) -> &str;

    /// Identity and capability fields. Collected once and cached.
    fn collect_static(&self) -> Record;

    /// Per-tick fields.
    fn collect_dynamic(&self) -> Record;

    /// Releases held resources. Safe to call more than once.
    fn close(&self) -> Result<(), CollectError> {
        Ok(())
    }
}

/// Errors raised when building or releasing a collector.
#[derive(Debug)]
pub enum CollectError {
    Io(io::Error),
    /// The subsystem is not present on this host.
    Unavailable(String),
    /// The GPU management library reported an error.
    Gpu(String),
}

impl fmt::Display for CollectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectError::Io(e) => write!(f, "I/O error: {}", e),
            CollectError::Unavailable(what) => write!(f, "{} is not available", what),
            CollectError::Gpu(msg) => write!(f, "GPU error: {}", msg),
        }
    }
}

impl std::error::Error for CollectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CollectError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CollectError {
    fn from(e: io::Error) -> Self {
        CollectError::Io(e)
    }
}
