//! Parsers for cgroup v2 files.

/// Parses cpu.max file.
/// Format: "quota period" or "max period"
/// Example: "100000 100000" or "max 100000"
pub fn parse_cpu_max(content: &str) -> (i64, u64) {
    let parts: Vec<&str> = content.split_whitespace().collect();
    if parts.len() < 2 {
        return (-1, 100_000);
    }

    let quota = if parts[0] == "max" {
        -1
    } else {
        parts[0].parse().unwrap_or(-1)
    };
    let period = parts[1].parse().unwrap_or(100_000);

    (quota, period)
}

/// CPU usage counters from cpu.stat, in microseconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuUsage {
    pub usage_usec: u64,
    pub user_usec: u64,
    pub system_usec: u64,
}

/// Parses cpu.stat file.
/// Format: key value pairs, one per line
pub fn parse_cpu_stat(content: &str) -> CpuUsage {
    let mut info = CpuUsage::default();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            continue;
        }
        let value: u64 = parts[1].parse().unwrap_or(0);
        match parts[0] {
            "usage_usec" => info.usage_usec = value,
            "user_usec" => info.user_usec = value,
            "system_usec" => info.system_usec = value,
            _ => {}
        }
    }

    info
}

/// Parses single-number files such as memory.current, memory.peak and
/// pids.current.
pub fn parse_counter(content: &str) -> u64 {
    content.trim().parse().unwrap_or(0)
}

/// Page fault counters from memory.stat.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryFaults {
    pub pgfault: u64,
    pub pgmajfault: u64,
}

/// Parses memory.stat file (fault counters only).
pub fn parse_memory_stat(content: &str) -> MemoryFaults {
    let mut faults = MemoryFaults::default();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            continue;
        }
        let value: u64 = parts[1].parse().unwrap_or(0);
        match parts[0] {
            "pgfault" => faults.pgfault = value,
            "pgmajfault" => faults.pgmajfault = value,
            _ => {}
        }
    }

    faults
}

/// Parses io.stat and sums bytes over every device.
///
/// Format: one device per line:
/// `MAJOR:MINOR rbytes=.. wbytes=.. rios=.. wios=.. [other fields...]`
pub fn parse_io_stat(content: &str) -> (u64, u64) {
    let mut read = 0u64;
    let mut written = 0u64;

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let Some(dev) = parts.next() else {
            continue;
        };
        if !dev.contains(':') {
            continue;
        }
        for kv in parts {
            let Some((k, v)) = kv.split_once('=') else {
                continue;
            };
            let value: u64 = v.parse().unwrap_or(0);
            match k {
                "rbytes" => read += value,
                "wbytes" => written += value,
                _ => {}
            }
        }
    }

    (read, written)
}

/// Extracts a container ID from `/proc/self/cgroup`.
///
/// Recognises Docker (`/docker/<id>`), containerd/CRI (`cri-containerd-<id>.scope`)
/// and Podman (`libpod-<id>.scope`) paths.
pub fn parse_container_id(content: &str) -> Option<String> {
    for line in content.lines() {
        let Some(path) = line.splitn(3, ':').nth(2) else {
            continue;
        };
        if let Some((_, id)) = path.rsplit_once("/docker/")
            && !id.is_empty()
        {
            return Some(id.to_string());
        }
        let last = path.rsplit('/').next().unwrap_or_default();
        let scoped = last.strip_suffix(".scope").unwrap_or(last);
        for prefix in ["cri-containerd-", "docker-", "libpod-", "crio-"] {
            if let Some(id) = scoped.strip_prefix(prefix) {
                return Some(id.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_max() {
        assert_eq!(parse_cpu_max("200000 100000\n"), (200_000, 100_000));
        assert_eq!(parse_cpu_max("max 100000\n"), (-1, 100_000));
        assert_eq!(parse_cpu_max(""), (-1, 100_000));
    }

    #[test]
    fn test_parse_cpu_stat() {
        let info = parse_cpu_stat("usage_usec 123456\nuser_usec 100000\nsystem_usec 23456\nnr_periods 0\n");
        assert_eq!(info.usage_usec, 123456);
        assert_eq!(info.user_usec, 100000);
        assert_eq!(info.system_usec, 23456);
    }

    #[test]
    fn test_parse_memory_stat_and_counter() {
        let faults = parse_memory_stat("anon 100\nfile 200\npgfault 4500\npgmajfault 12\n");
        assert_eq!(faults.pgfault, 4500);
        assert_eq!(faults.pgmajfault, 12);
        assert_eq!(parse_counter("536870912\n"), 536870912);
        assert_eq!(parse_counter("garbage"), 0);
    }

    #[test]
    fn test_parse_io_stat_sums_devices() {
        let content = "8:0 rbytes=123 wbytes=456 rios=7 wios=8 dbytes=0 dios=0\n8:16 rbytes=7 wbytes=4 rios=0 wios=2\n";
        assert_eq!(parse_io_stat(content), (130, 460));
    }

    #[test]
    fn test_parse_container_id() {
        assert_eq!(
            parse_container_id("0::/docker/abc123def\n").as_deref(),
            Some("abc123def")
        );
        assert_eq!(
            parse_container_id("0::/system.slice/cri-containerd-f00d.scope\n").as_deref(),
            Some("f00d")
        );
        assert_eq!(parse_container_id("0::/\n"), None);
    }
}
