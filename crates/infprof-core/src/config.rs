//! Collector and sampler configuration.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::collector::vllm;
use crate::delta::DeltaMode;
use crate::record::FlattenMode;

/// Which subsystems the [`Manager`](crate::manager::Manager) samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    pub enable_vm: bool,
    pub enable_container: bool,
    pub enable_process: bool,
    pub enable_nvidia: bool,
    pub enable_vllm: bool,
    /// Attach running compute processes to each GPU sample.
    pub collect_gpu_processes: bool,
    /// Run collectors (and per-GPU query groups) on scoped threads.
    pub concurrent: bool,
    pub vllm_url: String,
    pub proc_path: PathBuf,
    pub cgroup_path: PathBuf,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            enable_vm: true,
            enable_container: true,
            enable_process: true,
            enable_nvidia: true,
            enable_vllm: true,
            collect_gpu_processes: false,
            concurrent: false,
            vllm_url: vllm::DEFAULT_URL.to_string(),
            proc_path: PathBuf::from("/proc"),
            cgroup_path: PathBuf::from("/sys/fs/cgroup"),
        }
    }
}

impl CollectorConfig {
    /// Defaults with `VLLM_METRICS_URL` applied when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = env::var(vllm::URL_ENV)
            && !url.trim().is_empty()
        {
            config.vllm_url = url.trim().to_string();
        }
        config
    }

    /// Everything off; enable subsystems one by one with the `with_*` methods.
    pub fn none() -> Self {
        Self {
            enable_vm: false,
            enable_container: false,
            enable_process: false,
            enable_nvidia: false,
            enable_vllm: false,
            ..Self::default()
        }
    }

    pub fn with_vm(mut self, on: bool) -> Self {
        self.enable_vm = on;
        self
    }

    pub fn with_container(mut self, on: bool) -> Self {
        self.enable_container = on;
        self
    }

    pub fn with_process(mut self, on: bool) -> Self {
        self.enable_process = on;
        self
    }

    pub fn with_nvidia(mut self, on: bool) -> Self {
        self.enable_nvidia = on;
        self
    }

    pub fn with_vllm(mut self, on: bool) -> Self {
        self.enable_vllm = on;
        self
    }

    pub fn with_gpu_processes(mut self, on: bool) -> Self {
        self.collect_gpu_processes = on;
        self
    }

    pub fn with_concurrent(mut self, on: bool) -> Self {
        self.concurrent = on;
        self
    }

    pub fn with_vllm_url(mut self, url: impl Into<String>) -> Self {
        self.vllm_url = url.into();
        self
    }

    pub fn with_proc_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.proc_path = path.into();
        self
    }

    pub fn with_cgroup_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cgroup_path = path.into();
        self
    }
}

/// Daemon sampling loop settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    pub interval: Duration,
    pub output: PathBuf,
    /// Format name; inferred from the output extension when `None`.
    pub format: Option<String>,
    /// Stop after this long. Runs until interrupted when `None`.
    pub duration: Option<Duration>,
    /// Write one delta row between the first and last snapshot instead of
    /// a row per tick.
    pub delta: bool,
    pub delta_mode: DeltaMode,
    /// Write the static record to `<stem>_static.json`.
    pub static_file: bool,
    pub flatten: FlattenMode,
    /// Hold every record in memory and write them in one batch when sampling
    /// ends.
    pub batch: bool,
    /// Program and arguments to run; sampling stops when it exits.
    pub command: Vec<String>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            output: PathBuf::from("metrics.jsonl"),
            format: None,
            duration: None,
            delta: false,
            delta_mode: DeltaMode::All,
            static_file: false,
            flatten: FlattenMode::Json,
            batch: false,
            command: Vec::new(),
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if self.output.as_os_str().is_empty() {
            return Err(ConfigError::EmptyOutput);
        }
        if let Some(d) = self.duration
            && d.is_zero()
        {
            return Err(ConfigError::ZeroDuration);
        }
        if self.delta && self.duration.is_none() {
            return Err(ConfigError::DeltaWithoutDuration);
        }
        if self.delta && !self.command.is_empty() {
            return Err(ConfigError::DeltaWithCommand);
        }
        Ok(())
    }
}

/// Rejected [`SamplerConfig`] settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    ZeroInterval,
    EmptyOutput,
    ZeroDuration,
    DeltaWithoutDuration,
    DeltaWithCommand,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroInterval => write!(f, "interval must be greater than zero"),
            ConfigError::EmptyOutput => write!(f, "output path must not be empty"),
            ConfigError::ZeroDuration => write!(f, "duration must be greater than zero"),
            ConfigError::DeltaWithoutDuration => write!(f, "delta mode requires a duration"),
            ConfigError::DeltaWithCommand => write!(f, "delta mode cannot profile a command"),
        }
    }
}

impl std::error::Error for ConfigError {}
