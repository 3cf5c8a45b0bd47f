use std::path::PathBuf;

use crate::collector::procfs::parser::{DiskStats, is_physical_disk, parse_diskstats};
use crate::collector::procfs::probe_file;
use crate::collector::{Collector, FileSystem};
use crate::record::Record;

const SECTOR_SIZE: u64 = 512;

/// Block I/O counters from `/proc/diskstats`, summed over whole physical
/// disks.
pub struct DiskCollector<F: FileSystem> {
    fs: F,
    proc_path: PathBuf,
}

impl<F: FileSystem> DiskCollector<F> {
    pub fn new(fs: F, proc_path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
        }
    }
}

impl<F: FileSystem> Collector for DiskCollector<F> {
    fn name(&self) -> &str {
        "disk"
    }

    fn collect_static(&self) -> Record {
        Record::new()
    }

    fn collect_dynamic(&self) -> Record {
        let (content, ts) = probe_file(&self.fs, &self.proc_path.join("diskstats"));

        let total = parse_diskstats(&content)
            .into_iter()
            .filter(|d| is_physical_disk(&d.device))
            .fold(DiskStats::default(), |mut acc, d| {
                acc.reads += d.reads;
                acc.r_merged += d.r_merged;
                acc.read_sectors += d.read_sectors;
                acc.read_time += d.read_time;
                acc.writes += d.writes;
                acc.w_merged += d.w_merged;
                acc.write_sectors += d.write_sectors;
                acc.write_time += d.write_time;
                acc.io_in_progress += d.io_in_progress;
                acc.io_time += d.io_time;
                acc.io_weighted_time += d.io_weighted_time;
                acc
            });

        let mut r = Record::new();
        r.insert_sampled("vDiskSectorReads", total.read_sectors, ts);
        r.insert_sampled("vDiskSectorWrites", total.write_sectors, ts);
        r.insert_sampled("vDiskReadBytes", total.read_sectors * SECTOR_SIZE, ts);
        r.insert_sampled("vDiskWriteBytes", total.write_sectors * SECTOR_SIZE, ts);
        r.insert_sampled("vDiskSuccessfulReads", total.reads, ts);
        r.insert_sampled("vDiskSuccessfulWrites", total.writes, ts);
        r.insert_sampled("vDiskMergedReads", total.r_merged, ts);
        r.insert_sampled("vDiskMergedWrites", total.w_merged, ts);
        r.insert_sampled("vDiskReadTime", total.read_time, ts);
        r.insert_sampled("vDiskWriteTime", total.write_time, ts);
        r.insert_sampled("vDiskIOInProgress", total.io_in_progress, ts);
        r.insert_sampled("vDiskIOTime", total.io_time, ts);
        r.insert_sampled("vDiskWeightedIOTime", total.io_weighted_time, ts);
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MockFs;

    #[test]
    fn test_disk_sums_physical_devices_only() {
        let r = DiskCollector::new(MockFs::typical_system(), "/proc").collect_dynamic();
        // sda + nvme0n1; sda1 and loop0 excluded
        assert_eq!(r.get_i64("vDiskSuccessfulReads"), Some(12345 + 50000));
        assert_eq!(r.get_i64("vDiskSectorReads"), Some(987654 + 2000000));
        assert_eq!(r.get_i64("vDiskReadBytes"), Some((987654 + 2000000) * 512));
        assert_eq!(r.get_i64("vDiskIOInProgress"), Some(5));
        assert!(r.get_i64("vDiskReadBytesT").is_some());
    }
}
