//! Parsers for `/proc` filesystem files.
//!
//! Pure functions over file content, so every collector can be tested with
//! string inputs. Unparsable numbers become zero.

use std::collections::HashMap;

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Aggregate CPU line from `/proc/stat`, in clock ticks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuStat {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

/// Global stats from `/proc/stat`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalStat {
    pub cpu: CpuStat,
    /// Number of `cpuN` lines.
    pub cpu_count: u32,
    pub ctxt: u64,
    pub btime: u64,
}

/// Parses `/proc/stat` content.
pub fn parse_global_stat(content: &str) -> GlobalStat {
    let mut stat = GlobalStat::default();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(&key) = parts.first() else {
            continue;
        };
        let get_val = |idx: usize| -> u64 { parts.get(idx).and_then(|s| s.parse().ok()).unwrap_or(0) };

        if key == "cpu" {
            stat.cpu = CpuStat {
                user: get_val(1),
                nice: get_val(2),
                system: get_val(3),
                idle: get_val(4),
                iowait: get_val(5),
                irq: get_val(6),
                softirq: get_val(7),
                steal: get_val(8),
            };
        } else if key.starts_with("cpu") {
            stat.cpu_count += 1;
        } else if key == "ctxt" {
            stat.ctxt = get_val(1);
        } else if key == "btime" {
            stat.btime = get_val(1);
        }
    }

    stat
}

/// Parsed `/proc/meminfo`, values in kB.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemInfo {
    pub mem_total: u64,
    pub mem_free: u64,
    /// Absent on kernels older than 3.14.
    pub mem_available: Option<u64>,
    pub buffers: u64,
    pub cached: u64,
    pub s_reclaimable: u64,
    pub swap_total: u64,
    pub swap_free: u64,
}

/// Parses `/proc/meminfo` content.
pub fn parse_meminfo(content: &str) -> MemInfo {
    let mut info = MemInfo::default();

    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let value: u64 = rest
            .split_whitespace()
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        match key.trim() {
            "MemTotal" => info.mem_total = value,
            "MemFree" => info.mem_free = value,
            "MemAvailable" => info.mem_available = Some(value),
            "Buffers" => info.buffers = value,
            "Cached" => info.cached = value,
            "SReclaimable" => info.s_reclaimable = value,
            "SwapTotal" => info.swap_total = value,
            "SwapFree" => info.swap_free = value,
            _ => {}
        }
    }

    info
}

/// Page fault counters from `/proc/vmstat`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VmstatInfo {
    pub pgfault: u64,
    pub pgmajfault: u64,
}

/// Parses `/proc/vmstat` content.
///
/// Format: key value (one per line)
pub fn parse_vmstat(content: &str) -> VmstatInfo {
    let mut info = VmstatInfo::default();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            continue;
        }
        let value: u64 = parts[1].parse().unwrap_or(0);
        match parts[0] {
            "pgfault" => info.pgfault = value,
            "pgmajfault" => info.pgmajfault = value,
            _ => {}
        }
    }

    info
}

/// Parses the 1-minute load average from `/proc/loadavg`.
pub fn parse_loadavg(content: &str) -> Result<f64, ParseError> {
    content
        .split_whitespace()
        .next()
        .ok_or_else(|| ParseError::new("empty loadavg"))?
        .parse()
        .map_err(|_| ParseError::new("invalid load1"))
}

/// Static processor facts from `/proc/cpuinfo`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuInfo {
    pub model_name: String,
    pub processors: u32,
    /// Mean of the per-core `cpu MHz` lines, zero when absent.
    pub mhz: f64,
}

/// Parses `/proc/cpuinfo` content.
pub fn parse_cpuinfo(content: &str) -> CpuInfo {
    let mut info = CpuInfo::default();
    let mut mhz_sum = 0.0;
    let mut mhz_count = 0u32;

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "processor" => info.processors += 1,
            "model name" if info.model_name.is_empty() => info.model_name = value.to_string(),
            "cpu MHz" => {
                if let Ok(mhz) = value.parse::<f64>() {
                    mhz_sum += mhz;
                    mhz_count += 1;
                }
            }
            _ => {}
        }
    }

    if mhz_count > 0 {
        info.mhz = mhz_sum / mhz_count as f64;
    }
    info
}

/// Parsed data from `/proc/diskstats`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiskStats {
    pub major: u32,
    pub minor: u32,
    /// Device name (sda, nvme0n1, etc.)
    pub device: String,
    pub reads: u64,
    pub r_merged: u64,
    pub read_sectors: u64,
    /// Time spent reading (ms)
    pub read_time: u64,
    pub writes: u64,
    pub w_merged: u64,
    pub write_sectors: u64,
    /// Time spent writing (ms)
    pub write_time: u64,
    pub io_in_progress: u64,
    /// Time spent doing I/Os (ms)
    pub io_time: u64,
    pub io_weighted_time: u64,
}

/// Parses `/proc/diskstats` content.
///
/// Format: major minor name reads r_merged r_sectors r_time writes w_merged w_sectors w_time io_pending io_time w_io_time [discards ...]
pub fn parse_diskstats(content: &str) -> Vec<DiskStats> {
    let mut disks = Vec::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 14 {
            continue;
        }

        let get_val = |idx: usize| -> u64 { parts.get(idx).and_then(|s| s.parse().ok()).unwrap_or(0) };

        disks.push(DiskStats {
            major: parts[0].parse().unwrap_or(0),
            minor: parts[1].parse().unwrap_or(0),
            device: parts[2].to_string(),
            reads: get_val(3),
            r_merged: get_val(4),
            read_sectors: get_val(5),
            read_time: get_val(6),
            writes: get_val(7),
            w_merged: get_val(8),
            write_sectors: get_val(9),
            write_time: get_val(10),
            io_in_progress: get_val(11),
            io_time: get_val(12),
            io_weighted_time: get_val(13),
        });
    }

    disks
}

/// Whole physical disks: `sdX`, `hdX`, `vdX`, `xvdX`, `nvmeNnM`, `mmcblkN`.
///
/// Partitions, loop, RAM and device-mapper entries are excluded so that
/// summed counters do not count the same I/O twice.
pub fn is_physical_disk(name: &str) -> bool {
    let letters = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_lowercase());
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

    if let Some(rest) = name.strip_prefix("xvd") {
        return letters(rest);
    }
    for prefix in ["sd", "hd", "vd"] {
        if let Some(rest) = name.strip_prefix(prefix) {
            return letters(rest);
        }
    }
    if let Some(rest) = name.strip_prefix("nvme") {
        return rest
            .split_once('n')
            .is_some_and(|(ctrl, ns)| digits(ctrl) && digits(ns));
    }
    if let Some(rest) = name.strip_prefix("mmcblk") {
        return digits(rest);
    }
    false
}

/// Parsed data from `/proc/net/dev`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetDevStats {
    pub interface: String,
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_errs: u64,
    pub rx_drop: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errs: u64,
    pub tx_drop: u64,
}

/// Parses `/proc/net/dev` content.
///
/// Format:
/// Inter-|   Receive                                                |  Transmit
///  face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
///    lo: 1234567     1234    0    0    0     0          0         0  1234567     1234    0    0    0     0       0          0
pub fn parse_net_dev(content: &str) -> Vec<NetDevStats> {
    let mut devices = Vec::new();

    for line in content.lines() {
        if line.contains('|') || line.trim().is_empty() {
            continue;
        }
        let Some((name, rest)) = line.split_once(':') else {
            continue;
        };
        let values: Vec<&str> = rest.split_whitespace().collect();
        if values.len() < 16 {
            continue;
        }

        let get_val = |idx: usize| -> u64 { values.get(idx).and_then(|s| s.parse().ok()).unwrap_or(0) };

        devices.push(NetDevStats {
            interface: name.trim().to_string(),
            rx_bytes: get_val(0),
            rx_packets: get_val(1),
            rx_errs: get_val(2),
            rx_drop: get_val(3),
            tx_bytes: get_val(8),
            tx_packets: get_val(9),
            tx_errs: get_val(10),
            tx_drop: get_val(11),
        });
    }

    devices
}

/// Fields of `/proc/[pid]/stat` the process table reports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcStat {
    pub pid: u32,
    pub comm: String,
    pub state: char,
    pub utime: u64,
    pub stime: u64,
    pub cutime: i64,
    pub cstime: i64,
    pub num_threads: i64,
    pub vsize: u64,
    pub delayacct_blkio_ticks: u64,
}

/// Parses `/proc/[pid]/stat` content.
///
/// The comm field can contain spaces and parentheses, so fields are counted
/// from the last `)`.
pub fn parse_proc_stat(content: &str) -> Result<ProcStat, ParseError> {
    let content = content.trim();

    let open_paren = content
        .find('(')
        .ok_or_else(|| ParseError::new("missing '(' in stat"))?;
    let close_paren = content
        .rfind(')')
        .ok_or_else(|| ParseError::new("missing ')' in stat"))?;
    if close_paren <= open_paren {
        return Err(ParseError::new("invalid parentheses in stat"));
    }

    let pid: u32 = content[..open_paren]
        .trim()
        .parse()
        .map_err(|_| ParseError::new("invalid pid"))?;
    let comm = content[open_paren + 1..close_paren].to_string();

    let fields: Vec<&str> = content[close_paren + 1..].split_whitespace().collect();
    if fields.len() < 21 {
        return Err(ParseError::new(format!(
            "not enough fields in stat: expected 21+, got {}",
            fields.len()
        )));
    }

    let get_u64 = |idx: usize| -> u64 { fields.get(idx).and_then(|s| s.parse().ok()).unwrap_or(0) };
    let get_i64 = |idx: usize| -> i64 { fields.get(idx).and_then(|s| s.parse().ok()).unwrap_or(0) };

    Ok(ProcStat {
        pid,
        comm,
        state: fields[0].chars().next().unwrap_or('?'),
        utime: get_u64(11),
        stime: get_u64(12),
        cutime: get_i64(13),
        cstime: get_i64(14),
        num_threads: get_i64(17),
        vsize: get_u64(20),
        delayacct_blkio_ticks: get_u64(39),
    })
}

/// Fields of `/proc/[pid]/status` the process table reports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcStatus {
    pub name: String,
    /// Resident set size in kB.
    pub vm_rss: u64,
    pub voluntary_ctxt_switches: u64,
    pub nonvoluntary_ctxt_switches: u64,
}

/// Parses `/proc/[pid]/status` content.
///
/// Format is key:\tvalue pairs, one per line.
pub fn parse_proc_status(content: &str) -> ProcStatus {
    let fields: HashMap<&str, &str> = content
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim(), v.trim()))
        .collect();

    let number = |key: &str| -> u64 {
        fields
            .get(key)
            .and_then(|s| s.split_whitespace().next())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    };

    ProcStatus {
        name: fields.get("Name").unwrap_or(&"").to_string(),
        vm_rss: number("VmRSS"),
        voluntary_ctxt_switches: number("voluntary_ctxt_switches"),
        nonvoluntary_ctxt_switches: number("nonvoluntary_ctxt_switches"),
    }
}

/// Turns NUL-separated `/proc/[pid]/cmdline` into a space-separated string.
pub fn parse_cmdline(content: &str) -> String {
    content
        .split('\0')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
