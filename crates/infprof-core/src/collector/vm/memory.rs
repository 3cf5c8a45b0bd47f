use std::path::PathBuf;

use crate::collector::procfs::parser::{parse_meminfo, parse_vmstat};
use crate::collector::procfs::probe_file;
use crate::collector::{Collector, FileSystem};
use crate::record::Record;

/// RAM, swap and page faults from `/proc/meminfo` and `/proc/vmstat`.
/// Sizes are reported in bytes.
pub struct MemoryCollector<F: FileSystem> {
    fs: F,
    proc_path: PathBuf,
}

impl<F: FileSystem> MemoryCollector<F> {
    pub fn new(fs: F, proc_path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
        }
    }
}

impl<F: FileSystem> Collector for MemoryCollector<F> {
    fn name(&self) -> &str {
        "memory"
    }

    fn collect_static(&self) -> Record {
        let (meminfo, _) = probe_file(&self.fs, &self.proc_path.join("meminfo"));
        let info = parse_meminfo(&meminfo);

        let mut r = Record::new();
        r.insert("vMemoryTotalBytes", info.mem_total * 1024);
        r.insert("vSwapTotalBytes", info.swap_total * 1024);
        r
    }

    fn collect_dynamic(&self) -> Record {
        let (meminfo, t_mem) = probe_file(&self.fs, &self.proc_path.join("meminfo"));
        let (vmstat, t_vm) = probe_file(&self.fs, &self.proc_path.join("vmstat"));
        let info = parse_meminfo(&meminfo);
        let faults = parse_vmstat(&vmstat);

        let total = info.mem_total * 1024;
        let free = info.mem_free * 1024;
        let buffers = info.buffers * 1024;
        let cached = (info.cached + info.s_reclaimable) * 1024;
        let available = info
            .mem_available
            .map(|kb| kb * 1024)
            .unwrap_or(free + buffers + cached);
        let used = total.saturating_sub(free + buffers + cached);
        let percent = if total > 0 {
            total.saturating_sub(available) as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        let swap_total = info.swap_total * 1024;
        let swap_free = info.swap_free * 1024;

        let mut r = Record::new();
        r.insert_sampled("vMemoryTotal", total, t_mem);
        r.insert_sampled("vMemoryFree", available, t_mem);
        r.insert_sampled("vMemoryUsed", used, t_mem);
        r.insert_sampled("vMemoryBuffers", buffers, t_mem);
        r.insert_sampled("vMemoryCached", cached, t_mem);
        r.insert_sampled("vMemoryPercent", percent, t_mem);
        r.insert_sampled("vMemorySwapTotal", swap_total, t_mem);
        r.insert_sampled("vMemorySwapFree", swap_free, t_mem);
        r.insert_sampled("vMemorySwapUsed", swap_total.saturating_sub(swap_free), t_mem);
        r.insert_sampled("vMemoryPgFault", faults.pgfault, t_vm);
        r.insert_sampled("vMemoryMajorPageFault", faults.pgmajfault, t_vm);
        r
    }
}
