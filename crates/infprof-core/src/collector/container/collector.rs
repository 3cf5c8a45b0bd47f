//! Cgroup v2 metrics collector.

use std::path::PathBuf;

use crate::collector::procfs::parser::{parse_global_stat, parse_net_dev};
use crate::collector::procfs::probe_file;
use crate::collector::{CollectError, Collector, FileSystem};
use crate::record::Record;

use super::parser;

/// Container CPU, memory, I/O and process counters from the cgroup the
/// collector runs in.
///
/// Only cgroup v2 is supported: construction fails when
/// `cgroup.controllers` is missing.
pub struct ContainerCollector<F: FileSystem> {
    fs: F,
    cgroup_path: PathBuf,
    proc_path: PathBuf,
}

impl<F: FileSystem> ContainerCollector<F> {
    /// # Arguments
    /// * `fs` - Filesystem implementation
    /// * `cgroup_path` - Path to cgroup directory (e.g., "/sys/fs/cgroup")
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    pub fn new(
        fs: F,
        cgroup_path: impl Into<PathBuf>,
        proc_path: impl Into<PathBuf>,
    ) -> Result<Self, CollectError> {
        let cgroup_path = cgroup_path.into();
        if !fs.exists(&cgroup_path.join("cgroup.controllers")) {
            return Err(CollectError::Unavailable(format!(
                "cgroup v2 at {}",
                cgroup_path.display()
            )));
        }
        Ok(Self {
            fs,
            cgroup_path,
            proc_path: proc_path.into(),
        })
    }

    fn container_id(&self) -> String {
        let (cgroup, _) = probe_file(&self.fs, &self.proc_path.join("self/cgroup"));
        if let Some(id) = parser::parse_container_id(&cgroup) {
            return id;
        }
        let (hostname, _) = probe_file(&self.fs, &self.proc_path.join("sys/kernel/hostname"));
        match hostname.trim() {
            "" => "unavailable".to_string(),
            name => name.to_string(),
        }
    }

    /// CPUs granted by `cpu.max`, or every host CPU when unlimited.
    fn num_processors(&self) -> i64 {
        let (cpu_max, _) = probe_file(&self.fs, &self.cgroup_path.join("cpu.max"));
        let (quota, period) = parser::parse_cpu_max(&cpu_max);
        if quota > 0 && period > 0 {
            return (quota as u64).div_ceil(period) as i64;
        }
        let (stat, _) = probe_file(&self.fs, &self.proc_path.join("stat"));
        parse_global_stat(&stat).cpu_count as i64
    }
}

impl<F: FileSystem> Collector for ContainerCollector<F> {
    fn name(&self) -> &str {
        "container"
    }

    fn collect_static(&self) -> Record {
        let mut r = Record::new();
        r.insert("cId", self.container_id());
        r.insert("cNumProcessors", self.num_processors());
        r.insert("cCgroupVersion", 2);
        r
    }

    fn collect_dynamic(&self) -> Record {
        let cg = |name: &str| probe_file(&self.fs, &self.cgroup_path.join(name));

        let (cpu_stat, t_cpu) = cg("cpu.stat");
        let (mem_current, t_mem) = cg("memory.current");
        let (mem_peak, t_peak) = cg("memory.peak");
        let (mem_stat, t_mem_stat) = cg("memory.stat");
        let (io_stat, t_io) = cg("io.stat");
        let (pids, t_pids) = cg("pids.current");
        let (net_dev, t_net) = probe_file(&self.fs, &self.proc_path.join("net/dev"));

        let cpu = parser::parse_cpu_stat(&cpu_stat);
        let faults = parser::parse_memory_stat(&mem_stat);
        let (read_bytes, write_bytes) = parser::parse_io_stat(&io_stat);
        let (recvd, sent) = parse_net_dev(&net_dev)
            .iter()
            .filter(|d| d.interface != "lo")
            .fold((0u64, 0u64), |(r, s), d| (r + d.rx_bytes, s + d.tx_bytes));

        let mut r = Record::new();
        // usage in ns, user/system in centiseconds like /proc/stat ticks
        r.insert_sampled("cCpuTime", cpu.usage_usec.saturating_mul(1000), t_cpu);
        r.insert_sampled("cCpuTimeUserMode", cpu.user_usec / 10_000, t_cpu);
        r.insert_sampled("cCpuTimeKernelMode", cpu.system_usec / 10_000, t_cpu);
        r.insert_sampled("cMemoryUsed", parser::parse_counter(&mem_current), t_mem);
        r.insert_sampled("cMemoryMaxUsed", parser::parse_counter(&mem_peak), t_peak);
        r.insert_sampled("cPgFault", faults.pgfault, t_mem_stat);
        r.insert_sampled("cMajorPgFault", faults.pgmajfault, t_mem_stat);
        r.insert_sampled("cDiskReadBytes", read_bytes, t_io);
        r.insert_sampled("cDiskWriteBytes", write_bytes, t_io);
        r.insert_sampled("cNetworkBytesRecvd", recvd, t_net);
        r.insert_sampled("cNetworkBytesSent", sent, t_net);
        r.insert_sampled("cNumProcesses", parser::parse_counter(&pids), t_pids);
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MockFs;

    fn collector() -> ContainerCollector<MockFs> {
        ContainerCollector::new(MockFs::typical_system(), "/sys/fs/cgroup", "/proc").unwrap()
    }

    #[test]
    fn test_unavailable_without_cgroup_v2() {
        let err = ContainerCollector::new(MockFs::new(), "/sys/fs/cgroup", "/proc").err();
        assert!(matches!(err, Some(CollectError::Unavailable(_))));
    }

    #[test]
    fn test_container_static() {
        let r = collector().collect_static();
        assert_eq!(r.get_str("cId"), Some("3f4e5d6c7b8a"));
        assert_eq!(r.get_i64("cNumProcessors"), Some(2));
        assert_eq!(r.get_i64("cCgroupVersion"), Some(2));
    }

    #[test]
    fn test_container_id_falls_back_to_hostname() {
        let mut fs = MockFs::typical_system();
        fs.add_file("/proc/self/cgroup", "0::/\n");
        let c = ContainerCollector::new(fs, "/sys/fs/cgroup", "/proc").unwrap();
        assert_eq!(c.collect_static().get_str("cId"), Some("gpu-node-01"));
    }

    #[test]
    fn test_container_dynamic() {
        let r = collector().collect_dynamic();
        assert_eq!(r.get_i64("cCpuTime"), Some(5_000_000 * 1000));
        assert_eq!(r.get_i64("cCpuTimeUserMode"), Some(400));
        assert_eq!(r.get_i64("cCpuTimeKernelMode"), Some(100));
        assert_eq!(r.get_i64("cMemoryUsed"), Some(536_870_912));
        assert_eq!(r.get_i64("cMemoryMaxUsed"), Some(805_306_368));
        assert_eq!(r.get_i64("cPgFault"), Some(4500));
        assert_eq!(r.get_i64("cMajorPgFault"), Some(12));
        assert_eq!(r.get_i64("cDiskReadBytes"), Some(4096 + 1024));
        assert_eq!(r.get_i64("cDiskWriteBytes"), Some(8192));
        assert_eq!(r.get_i64("cNumProcesses"), Some(3));
        assert_eq!(r.get_i64("cNetworkBytesRecvd"), Some(1_020_000));
    }
}
