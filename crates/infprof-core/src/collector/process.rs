//! Process table from `/proc/[pid]/`.

use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::collector::procfs::parser::{parse_cmdline, parse_proc_stat, parse_proc_status};
use crate::collector::{Collector, FileSystem};
use crate::record::{ProcessSample, Record};
use crate::util::now_nanos;

/// Snapshot of every process, stored as a deferred collection on the
/// record and serialized only at export.
pub struct ProcessCollector<F: FileSystem> {
    fs: F,
    proc_path: PathBuf,
}

impl<F: FileSystem> ProcessCollector<F> {
    pub fn new(fs: F, proc_path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
        }
    }

    /// Lists PIDs by scanning numeric entries of the proc directory.
    fn pids(&self) -> Vec<u32> {
        let entries = match self.fs.read_dir(&self.proc_path) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(path = %self.proc_path.display(), error = %e, "cannot list processes");
                return Vec::new();
            }
        };
        let mut pids: Vec<u32> = entries
            .iter()
            .filter_map(|p| p.file_name()?.to_str()?.parse().ok())
            .collect();
        pids.sort_unstable();
        pids
    }

    /// Reads one process. `None` when it exited mid-scan or its stat is
    /// unreadable.
    fn sample(&self, pid: u32) -> Option<ProcessSample> {
        let base = self.proc_path.join(pid.to_string());
        let stat = match self.fs.read_to_string(&base.join("stat")) {
            Ok(content) => parse_proc_stat(&content).ok()?,
            Err(e) => {
                trace!(pid, error = %e, "process gone");
                return None;
            }
        };
        let status = read_or_empty(&self.fs, &base.join("status"));
        let status = parse_proc_status(&status);
        let cmdline = parse_cmdline(&read_or_empty(&self.fs, &base.join("cmdline")));

        let name = if status.name.is_empty() {
            stat.comm
        } else {
            status.name
        };

        Some(ProcessSample {
            pid: pid as i64,
            name,
            cmdline,
            state: stat.state.to_string(),
            num_threads: stat.num_threads,
            cpu_time_user_mode: stat.utime as i64,
            cpu_time_kernel_mode: stat.stime as i64,
            children_user_mode: stat.cutime,
            children_kernel_mode: stat.cstime,
            voluntary_context_switches: status.voluntary_ctxt_switches as i64,
            nonvoluntary_context_switches: status.nonvoluntary_ctxt_switches as i64,
            block_io_delays: stat.delayacct_blkio_ticks as i64,
            virtual_memory_bytes: i64::try_from(stat.vsize).unwrap_or(i64::MAX),
            resident_set_size: i64::try_from(status.vm_rss.saturating_mul(1024)).unwrap_or(i64::MAX),
        })
    }

    /// Samples every process currently visible.
    pub fn collect_processes(&self) -> Vec<ProcessSample> {
        self.pids()
            .into_iter()
            .filter_map(|pid| self.sample(pid))
            .collect()
    }
}

fn read_or_empty<F: FileSystem + ?Sized>(fs: &F, path: &Path) -> String {
    fs.read_to_string(path).unwrap_or_default()
}

impl<F: FileSystem> Collector for ProcessCollector<F> {
    fn name(&self) -> &str {
        "process"
    }

    fn collect_static(&self) -> Record {
        Record::new()
    }

    fn collect_dynamic(&self) -> Record {
        let processes = self.collect_processes();
        let ts = now_nanos();

        let mut r = Record::new();
        r.insert_sampled("processCount", processes.len(), ts);
        r.set_processes(processes);
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MockFs;

    #[test]
    fn test_process_table_is_deferred() {
        let c = ProcessCollector::new(MockFs::typical_system(), "/proc");
        let r = c.collect_dynamic();

        assert_eq!(r.get_i64("processCount"), Some(3));
        assert!(!r.contains_key("processes"));
        let procs = r.processes().unwrap();
        assert_eq!(procs.iter().map(|p| p.pid).collect::<Vec<_>>(), vec![1, 1234, 4242]);

        let vllm = &procs[2];
        assert_eq!(vllm.name, "python3");
        assert_eq!(vllm.cmdline, "python3 -m vllm.entrypoints.openai.api_server");
        assert_eq!(vllm.state, "R");
        assert_eq!(vllm.num_threads, 64);
        assert_eq!(vllm.cpu_time_user_mode, 90000);
        assert_eq!(vllm.resident_set_size, 8_388_608 * 1024);
        assert_eq!(vllm.voluntary_context_switches, 5000);
    }

    #[test]
    fn test_exited_process_is_skipped() {
        let mut fs = MockFs::typical_system();
        fs.remove_file("/proc/1234/stat");
        let c = ProcessCollector::new(fs, "/proc");
        let procs = c.collect_processes();
        assert_eq!(procs.len(), 2);
        assert!(procs.iter().all(|p| p.pid != 1234));
    }

    #[test]
    fn test_name_falls_back_to_comm() {
        let mut fs = MockFs::new();
        fs.add_process(
            9,
            "9 (kworker/0:1) I 2 0 0 0 -1 69238880 0 0 0 0 0 5 0 0 20 0 1 0 100 0 0 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0",
            "",
            "",
        );
        let procs = ProcessCollector::new(fs, "/proc").collect_processes();
        assert_eq!(procs[0].name, "kworker/0:1");
        assert_eq!(procs[0].cmdline, "");
    }
}
