//! infprofd - host, GPU and inference server sampler.
//!
//! Samples every enabled collector on a fixed interval and writes one record
//! per tick, or a single delta record between two snapshots, to a JSONL,
//! CSV, TSV or columnar file. Given a command after `--`, it runs the command
//! and samples until it exits.

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::io;
use std::path::{Path, PathBuf};
use std::process::{self, Child, Command, ExitStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};
use clap::Parser;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use infprof_core::config::{CollectorConfig, SamplerConfig};
use infprof_core::delta::{DeltaMode, compute_delta_with};
use infprof_core::export::{self, ExportError, Exporter, FormatRegistry};
use infprof_core::manager::Manager;
use infprof_core::record::{FlattenMode, Record};

/// Flush the exporter every this many ticks.
const FLUSH_EVERY: u64 = 10;

/// Host, GPU and inference server metrics sampler.
#[derive(Parser, Debug)]
#[command(name = "infprofd", about = "Host, GPU and inference server sampler", version)]
struct Args {
    /// Sampling interval in milliseconds.
    #[arg(short, long, default_value = "1000")]
    interval: u64,

    /// Output file. The format follows the extension unless --format is given.
    /// Defaults to metrics.<ext>, or profile_<command>_<time>.<ext> when
    /// profiling a command.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format: jsonl, csv, tsv or columnar.
    #[arg(short, long)]
    format: Option<String>,

    /// Stop after this many seconds. Runs until Ctrl-C when omitted.
    #[arg(short, long)]
    duration: Option<u64>,

    /// Disable CPU, memory, disk and network collection.
    #[arg(long)]
    no_vm: bool,

    /// Disable cgroup v2 container collection.
    #[arg(long)]
    no_container: bool,

    /// Disable the process table.
    #[arg(long)]
    no_procs: bool,

    /// Disable NVIDIA GPU collection.
    #[arg(long)]
    no_gpu: bool,

    /// Disable vLLM metrics scraping.
    #[arg(long)]
    no_vllm: bool,

    /// Attach running compute processes to each GPU sample.
    #[arg(long)]
    gpu_procs: bool,

    /// Run collectors concurrently within a tick.
    #[arg(long)]
    concurrent: bool,

    /// vLLM metrics endpoint. Defaults to $VLLM_METRICS_URL or
    /// http://localhost:8000/metrics.
    #[arg(long)]
    vllm_url: Option<String>,

    /// Path to /proc filesystem.
    #[arg(long, default_value = "/proc")]
    proc_path: PathBuf,

    /// Path to the cgroup v2 mount.
    #[arg(long, default_value = "/sys/fs/cgroup")]
    cgroup_path: PathBuf,

    /// Also write the static record to <stem>_static.json.
    #[arg(long)]
    static_file: bool,

    /// Expand process and GPU samples into top-level columns instead of JSON text.
    #[arg(long)]
    expand: bool,

    /// Write one delta row between the first and last snapshot (needs --duration).
    #[arg(long)]
    delta: bool,

    /// In delta mode, subtract only counter fields.
    #[arg(long, requires = "delta")]
    counters_only: bool,

    /// Keep samples in memory and write them all when sampling ends.
    #[arg(long, conflicts_with = "delta")]
    batch: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,

    /// Command to run and profile. Sampling stops when it exits.
    #[arg(last = true, value_name = "COMMAND")]
    command: Vec<String>,
}

impl Args {
    fn collector_config(&self) -> CollectorConfig {
        let mut config = CollectorConfig::from_env()
            .with_vm(!self.no_vm)
            .with_container(!self.no_container)
            .with_process(!self.no_procs)
            .with_nvidia(!self.no_gpu)
            .with_vllm(!self.no_vllm)
            .with_gpu_processes(self.gpu_procs)
            .with_concurrent(self.concurrent)
            .with_proc_path(&self.proc_path)
            .with_cgroup_path(&self.cgroup_path);
        if let Some(url) = &self.vllm_url {
            config = config.with_vllm_url(url.as_str());
        }
        config
    }

    fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig {
            interval: Duration::from_millis(self.interval),
            output: self.output_path(),
            format: self.format.clone(),
            duration: self.duration.map(Duration::from_secs),
            delta: self.delta,
            delta_mode: if self.counters_only {
                DeltaMode::CountersOnly
            } else {
                DeltaMode::All
            },
            static_file: self.static_file,
            flatten: if self.expand {
                FlattenMode::Expand
            } else {
                FlattenMode::Json
            },
            batch: self.batch,
            command: self.command.clone(),
        }
    }

    fn output_path(&self) -> PathBuf {
        if let Some(path) = &self.output {
            return path.clone();
        }
        let registry = FormatRegistry::builtin();
        let ext = registry.extension_or_default(self.format.as_deref().unwrap_or("jsonl"));
        match self.command.first() {
            Some(program) => {
                let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
                profile_output_name(program, &stamp, ext)
            }
            None => PathBuf::from(format!("metrics{}", ext)),
        }
    }
}

/// `profile_<program>_<stamp><ext>`, named after the program's file name.
fn profile_output_name(program: &str, stamp: &str, ext: &str) -> PathBuf {
    let name = Path::new(program)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "command".to_string());
    PathBuf::from(format!("profile_{}_{}{}", name, stamp, ext))
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["infprofd", "infprof_core"] {
        match format!("{}={}", target, level).parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("invalid log directive for {}: {}", target, e),
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Sleeps up to `total`, waking every 100ms to check the shutdown flag.
/// Returns false when interrupted.
fn sleep_while_running(total: Duration, running: &AtomicBool) -> bool {
    sleep_while(total, || running.load(Ordering::SeqCst))
}

/// Sleeps up to `total` in 100ms slices while `keep_going` holds.
fn sleep_while(total: Duration, mut keep_going: impl FnMut() -> bool) -> bool {
    let slice = Duration::from_millis(100);
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if !keep_going() {
            return false;
        }
        let step = remaining.min(slice);
        std::thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
    keep_going()
}

/// A profiled command.
struct Target {
    child: Child,
    status: Option<ExitStatus>,
    gone: bool,
}

impl Target {
    fn spawn(command: &[String]) -> io::Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;
        let child = Command::new(program).args(args).spawn()?;
        info!("Profiling command {:?} (pid {})", command, child.id());
        Ok(Self {
            child,
            status: None,
            gone: false,
        })
    }

    /// Polls the child without blocking. True once it has exited.
    fn exited(&mut self) -> bool {
        if self.gone {
            return true;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.status = Some(status);
                self.gone = true;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Lost track of profiled command: {}", e);
                self.gone = true;
            }
        }
        self.gone
    }

    /// Blocks until the child exits and returns its status.
    fn wait(&mut self) -> Option<ExitStatus> {
        if !self.gone {
            info!("Waiting for profiled command to exit");
            match self.child.wait() {
                Ok(status) => self.status = Some(status),
                Err(e) => warn!("Failed to wait for profiled command: {}", e),
            }
            self.gone = true;
        }
        self.status
    }
}

/// Destination of sampled records: written as they come, or held until
/// [`Sink::finish`] in batch mode.
struct Sink<'a> {
    exporter: &'a mut Exporter,
    held: Option<Vec<Record>>,
}

impl<'a> Sink<'a> {
    fn new(exporter: &'a mut Exporter, batch: bool) -> Self {
        Self {
            exporter,
            held: batch.then(Vec::new),
        }
    }

    fn push(&mut self, record: Record) -> Result<(), ExportError> {
        match &mut self.held {
            Some(held) => {
                held.push(record);
                Ok(())
            }
            None => self.exporter.write(&record),
        }
    }

    fn flush(&mut self) -> Result<(), ExportError> {
        match self.held {
            Some(_) => Ok(()),
            None => self.exporter.flush(),
        }
    }

    /// Writes any held records.
    fn finish(&mut self) -> Result<(), ExportError> {
        if let Some(held) = self.held.take()
            && !held.is_empty()
        {
            info!("Writing {} buffered samples", held.len());
            self.exporter.write_batch(&held)?;
        }
        Ok(())
    }
}

fn open_exporter(config: &SamplerConfig) -> Result<Exporter, ExportError> {
    let registry = FormatRegistry::builtin();
    let exporter = match &config.format {
        Some(name) => Exporter::new(&registry, name, &config.output)?,
        None => Exporter::for_path(&registry, &config.output)?,
    };
    Ok(exporter.with_flatten_mode(config.flatten))
}

fn format_ts(nanos: i64) -> String {
    DateTime::<Utc>::from_timestamp_nanos(nanos)
        .format("%Y-%m-%d %H:%M:%S%.3f")
        .to_string()
}

/// Samples until interrupted, until `config.duration` elapses or until
/// `target` exits. A final sample is taken after the target exits.
fn run_continuous(
    manager: &Manager,
    exporter: &mut Exporter,
    config: &SamplerConfig,
    running: &AtomicBool,
    mut target: Option<&mut Target>,
) -> Result<u64, ExportError> {
    let mut sink = Sink::new(exporter, config.batch);
    let result = sample_loop(manager, &mut sink, config, running, &mut target);
    // Held samples are written even when the loop stopped on an error.
    let finished = sink.finish();
    let ticks = result?;
    finished?;
    Ok(ticks)
}

fn sample_loop(
    manager: &Manager,
    sink: &mut Sink<'_>,
    config: &SamplerConfig,
    running: &AtomicBool,
    target: &mut Option<&mut Target>,
) -> Result<u64, ExportError> {
    let started = Instant::now();
    let mut ticks: u64 = 0;

    while running.load(Ordering::SeqCst) {
        let tick_start = Instant::now();
        let target_done = target.as_deref_mut().is_some_and(Target::exited);

        let record = manager.collect_dynamic();
        let fields = record.len();
        sink.push(record)?;
        ticks += 1;
        debug!(tick = ticks, fields, "sample taken");

        if ticks.is_multiple_of(FLUSH_EVERY) {
            sink.flush()?;
        }
        if ticks.is_multiple_of(60) {
            info!("{} samples taken", ticks);
        }

        if target_done {
            info!("Profiled command exited after {} samples", ticks);
            break;
        }
        if let Some(limit) = config.duration
            && started.elapsed() >= limit
        {
            info!("Duration reached after {} samples", ticks);
            break;
        }

        let wait = config.interval.saturating_sub(tick_start.elapsed());
        let woke_early = !sleep_while(wait, || {
            running.load(Ordering::SeqCst) && !target.as_deref_mut().is_some_and(Target::exited)
        });
        if woke_early && !running.load(Ordering::SeqCst) {
            break;
        }
    }
    Ok(ticks)
}

fn run_delta(
    manager: &Manager,
    exporter: &mut Exporter,
    config: &SamplerConfig,
    running: &AtomicBool,
) -> Result<(), ExportError> {
    let window = config.duration.unwrap_or(config.interval);
    let initial = manager.collect_dynamic();
    let started = Instant::now();
    info!("Initial snapshot taken, waiting {:?}", window);

    if !sleep_while_running(window, running) {
        warn!("Interrupted, computing delta over the elapsed window");
    }

    let final_ = manager.collect_dynamic();
    let duration_ms = started.elapsed().as_millis() as i64;
    let delta = compute_delta_with(
        Some(&initial),
        Some(&final_),
        duration_ms,
        config.delta_mode,
        config.flatten,
    );
    exporter.write(&delta)?;
    info!("Delta over {} ms written ({} fields)", duration_ms, delta.len());
    Ok(())
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let collector_config = args.collector_config();
    let config = args.sampler_config();
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        process::exit(2);
    }

    info!("infprofd {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: interval={:?}, output={}, delta={}, batch={}",
        config.interval,
        config.output.display(),
        config.delta,
        config.batch
    );

    let manager = Manager::new(&collector_config);
    info!("Collectors: {}", manager.collector_names().join(", "));

    let static_record = manager.collect_static();
    if config.static_file {
        match export::write_static(&static_record, &config.output) {
            Ok(path) => info!("Static record written to {}", path.display()),
            Err(e) => error!("Failed to write static record: {}", e),
        }
    }

    let mut exporter = match open_exporter(&config) {
        Ok(e) => e,
        Err(e) => {
            error!("Failed to open {}: {}", config.output.display(), e);
            process::exit(1);
        }
    };
    info!("Writing {} to {}", exporter.format().name(), config.output.display());

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let mut target = if config.command.is_empty() {
        None
    } else {
        match Target::spawn(&config.command) {
            Ok(t) => Some(t),
            Err(e) => {
                error!("Failed to start {:?}: {}", config.command, e);
                let _ = exporter.close();
                process::exit(1);
            }
        }
    };

    let started_at = infprof_core::util::now_nanos();
    let result = if config.delta {
        run_delta(&manager, &mut exporter, &config, &running)
    } else {
        run_continuous(&manager, &mut exporter, &config, &running, target.as_mut()).map(|ticks| {
            info!("{} samples since {}", ticks, format_ts(started_at));
        })
    };
    let target_status = target.as_mut().and_then(Target::wait);

    info!("Shutting down...");
    let mut failed = false;
    if let Err(e) = result {
        error!("Sampling stopped: {}", e);
        failed = true;
    }
    if let Err(e) = exporter.close() {
        error!("Failed to close exporter: {}", e);
        failed = true;
    }
    if let Err(e) = manager.close() {
        warn!("Failed to close collectors: {}", e);
    }
    info!("Shutdown complete");

    if failed {
        process::exit(1);
    }
    if let Some(status) = target_status
        && !status.success()
    {
        warn!("Profiled command exited with {}", status);
        process::exit(status.code().unwrap_or(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_map_to_collector_config() {
        let args = Args::try_parse_from([
            "infprofd",
            "--no-gpu",
            "--no-vllm",
            "--concurrent",
            "--vllm-url",
            "http://10.1.2.3:8000/metrics",
        ])
        .unwrap();
        let c = args.collector_config();
        assert!(c.enable_vm);
        assert!(!c.enable_nvidia);
        assert!(!c.enable_vllm);
        assert!(c.concurrent);
        assert_eq!(c.vllm_url, "http://10.1.2.3:8000/metrics");
    }

    #[test]
    fn args_map_to_sampler_config() {
        let args = Args::try_parse_from([
            "infprofd",
            "-i",
            "250",
            "-o",
            "run.csv",
            "--duration",
            "30",
            "--delta",
            "--counters-only",
            "--expand",
        ])
        .unwrap();
        let s = args.sampler_config();
        assert_eq!(s.interval, Duration::from_millis(250));
        assert_eq!(s.output, PathBuf::from("run.csv"));
        assert_eq!(s.duration, Some(Duration::from_secs(30)));
        assert!(s.delta);
        assert_eq!(s.delta_mode, DeltaMode::CountersOnly);
        assert_eq!(s.flatten, FlattenMode::Expand);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn counters_only_requires_delta() {
        assert!(Args::try_parse_from(["infprofd", "--counters-only"]).is_err());
    }

    #[test]
    fn profile_output_named_after_program() {
        assert_eq!(
            profile_output_name("/usr/bin/python3", "20261019_120000", ".csv"),
            PathBuf::from("profile_python3_20261019_120000.csv")
        );
        assert_eq!(
            profile_output_name("vllm", "20261019_120000", ".jsonl"),
            PathBuf::from("profile_vllm_20261019_120000.jsonl")
        );
    }

    #[test]
    fn trailing_command_and_batch() {
        let args = Args::try_parse_from([
            "infprofd", "--batch", "-f", "tsv", "--", "sleep", "1",
        ])
        .unwrap();
        let s = args.sampler_config();
        assert!(s.batch);
        assert_eq!(s.command, vec!["sleep".to_string(), "1".to_string()]);
        let name = s.output.to_string_lossy().into_owned();
        assert!(name.starts_with("profile_sleep_"), "{name}");
        assert!(name.ends_with(".tsv"), "{name}");

        let plain = Args::try_parse_from(["infprofd"]).unwrap().sampler_config();
        assert_eq!(plain.output, PathBuf::from("metrics.jsonl"));
        assert!(plain.command.is_empty());

        assert!(Args::try_parse_from(["infprofd", "--batch", "--delta", "-d", "5"]).is_err());
    }

    #[test]
    fn batch_sink_writes_on_finish() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.jsonl");
        let registry = FormatRegistry::builtin();
        let mut exporter = Exporter::for_path(&registry, &path).unwrap();

        let mut sink = Sink::new(&mut exporter, true);
        for i in 0..3i64 {
            let mut r = Record::new();
            r.insert("n", i);
            sink.push(r).unwrap();
        }
        sink.flush().unwrap();
        assert_eq!(sink.exporter.rows_written(), 0);
        sink.finish().unwrap();
        assert_eq!(sink.exporter.rows_written(), 3);
        exporter.close().unwrap();

        let records = export::read_records(export::Format::Jsonl, &path).unwrap();
        let values: Vec<i64> = records.iter().filter_map(|r| r.get_i64("n")).collect();
        assert_eq!(values, vec![0, 1, 2]);
    }

    #[cfg(unix)]
    #[test]
    fn sampling_stops_when_command_exits() {
        let dir = tempfile::tempdir().unwrap();
        let config = SamplerConfig {
            interval: Duration::from_millis(50),
            output: dir.path().join("cmd.jsonl"),
            batch: true,
            command: vec!["sleep".into(), "0.3".into()],
            ..Default::default()
        };
        let manager = Manager::from_collectors(Vec::new(), false);
        let mut exporter = open_exporter(&config).unwrap();
        let mut target = Target::spawn(&config.command).unwrap();
        let running = AtomicBool::new(true);

        let started = Instant::now();
        let ticks = run_continuous(&manager, &mut exporter, &config, &running, Some(&mut target))
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(ticks >= 2, "ticks = {ticks}");
        assert!(target.wait().unwrap().success());

        exporter.close().unwrap();
        let records = export::read_records(export::Format::Jsonl, &config.output).unwrap();
        assert_eq!(records.len() as u64, ticks);
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(Target::spawn(&[]).is_err());
    }

    #[test]
    fn sleep_stops_when_flag_cleared() {
        let running = AtomicBool::new(false);
        let start = Instant::now();
        assert!(!sleep_while_running(Duration::from_secs(5), &running));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
