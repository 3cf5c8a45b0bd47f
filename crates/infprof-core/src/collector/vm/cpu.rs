use std::path::PathBuf;

use crate::collector::procfs::parser::{parse_cpuinfo, parse_global_stat, parse_loadavg};
use crate::collector::procfs::probe_file;
use crate::collector::{Collector, FileSystem};
use crate::record::Record;

/// CPU time, context switches, load and frequency from `/proc/stat`,
/// `/proc/loadavg` and `/proc/cpuinfo`. Times are in clock ticks.
pub struct CpuCollector<F: FileSystem> {
    fs: F,
    proc_path: PathBuf,
}

impl<F: FileSystem> CpuCollector<F> {
    pub fn new(fs: F, proc_path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
        }
    }
}

impl<F: FileSystem> Collector for CpuCollector<F> {
    fn name(&self) -> &str {
        "cpu"
    }

    fn collect_static(&self) -> Record {
        let (cpuinfo, _) = probe_file(&self.fs, &self.proc_path.join("cpuinfo"));
        let info = parse_cpuinfo(&cpuinfo);
        let processors = if info.processors > 0 {
            info.processors
        } else {
            let (stat, _) = probe_file(&self.fs, &self.proc_path.join("stat"));
            parse_global_stat(&stat).cpu_count
        };
        let (version, _) = probe_file(&self.fs, &self.proc_path.join("version"));

        let mut r = Record::new();
        r.insert("vNumProcessors", processors);
        r.insert(
            "vCpuType",
            if info.model_name.is_empty() {
                "unknown".to_string()
            } else {
                info.model_name
            },
        );
        r.insert("vKernelInfo", version.trim());
        r
    }

    fn collect_dynamic(&self) -> Record {
        let (stat, t_stat) = probe_file(&self.fs, &self.proc_path.join("stat"));
        let (loadavg, t_load) = probe_file(&self.fs, &self.proc_path.join("loadavg"));
        let (cpuinfo, t_freq) = probe_file(&self.fs, &self.proc_path.join("cpuinfo"));

        let stat = parse_global_stat(&stat);
        let cpu = &stat.cpu;

        let mut r = Record::new();
        r.insert_sampled("vCpuTime", cpu.user + cpu.system, t_stat);
        r.insert_sampled("vCpuTimeUserMode", cpu.user, t_stat);
        r.insert_sampled("vCpuTimeKernelMode", cpu.system, t_stat);
        r.insert_sampled("vCpuIdleTime", cpu.idle, t_stat);
        r.insert_sampled("vCpuTimeIOWait", cpu.iowait, t_stat);
        r.insert_sampled("vCpuTimeIntSrvc", cpu.irq, t_stat);
        r.insert_sampled("vCpuTimeSoftIntSrvc", cpu.softirq, t_stat);
        r.insert_sampled("vCpuNice", cpu.nice, t_stat);
        r.insert_sampled("vCpuSteal", cpu.steal, t_stat);
        r.insert_sampled("vCpuContextSwitches", stat.ctxt, t_stat);
        r.insert_sampled("vLoadAvg", parse_loadavg(&loadavg).unwrap_or(0.0), t_load);
        r.insert_sampled("vCpuMhz", parse_cpuinfo(&cpuinfo).mhz, t_freq);
        r
    }
}
