//! infprof-core: shared library for the infprof sampler.
//!
//! Provides:
//! - `collector`: host, container, process, GPU and vLLM metric collectors
//! - `manager`: collector orchestration and static/dynamic record merging
//! - `record`: schema-free sample records with deferred collections
//! - `export`: JSONL, CSV/TSV and columnar writers and readers
//! - `delta`: difference between two snapshots
//! - `exposition`: Prometheus text format parser
//! - `config`: collector and sampler settings
//! - `util`: helper utilities
//!
//! With `nvidia` feature:
//! - `collector::nvidia`: NVML-backed GPU collector

pub mod collector;
pub mod config;
pub mod delta;
pub mod export;
pub mod exposition;
pub mod manager;
pub mod record;
pub mod util;
