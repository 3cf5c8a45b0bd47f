//! Pre-built mock filesystem scenarios for testing.

use super::filesystem::MockFs;

impl MockFs {
    /// A 4-CPU GPU node running inside a Docker container, with three
    /// processes: init, a shell and a vLLM server.
    pub fn typical_system() -> Self {
        let mut fs = Self::new();

        fs.add_file("/etc/machine-id", "0123456789abcdef0123456789abcdef\n");
        fs.add_file("/proc/sys/kernel/hostname", "gpu-node-01\n");
        fs.add_file(
            "/proc/version",
            "Linux version 6.8.0-45-generic (buildd@lcy02-amd64-075) (gcc 13.2.0) #45-Ubuntu SMP\n",
        );
        fs.add_file("/proc/loadavg", "0.15 0.10 0.05 1/150 4242\n");
        fs.add_file(
            "/proc/meminfo",
            "\
MemTotal:       16384000 kB
MemFree:         8192000 kB
MemAvailable:   12000000 kB
Buffers:          512000 kB
Cached:          2048000 kB
SwapCached:            0 kB
SwapTotal:       4096000 kB
SwapFree:        4096000 kB
Slab:             512000 kB
SReclaimable:     256000 kB
",
        );
        fs.add_file(
            "/proc/vmstat",
            "\
nr_free_pages 2048000
pgpgin 123456
pgpgout 654321
pgfault 987654
pgmajfault 321
",
        );
        fs.add_file(
            "/proc/stat",
            "\
cpu  10000 500 3000 80000 1000 200 100 0 0 0
cpu0 2500 125 750 20000 250 50 25 0 0 0
cpu1 2500 125 750 20000 250 50 25 0 0 0
cpu2 2500 125 750 20000 250 50 25 0 0 0
cpu3 2500 125 750 20000 250 50 25 0 0 0
intr 1000000 50 0 0 0 0 0 0 0 1 0 0 0 100 0 0 1000
ctxt 500000
btime 1700000000
processes 10000
procs_running 2
procs_blocked 0
",
        );

        let mut cpuinfo = String::new();
        for i in 0..4 {
            cpuinfo.push_str(&format!(
                "processor\t: {i}\nvendor_id\t: GenuineIntel\nmodel name\t: Intel(R) Xeon(R) CPU @ 2.20GHz\ncpu MHz\t\t: 2200.000\n\n"
            ));
        }
        fs.add_file("/proc/cpuinfo", cpuinfo);

        fs.add_file(
            "/proc/diskstats",
            "\
   7       0 loop0 100 0 200 10 0 0 0 0 0 10 10 0 0 0 0
   8       0 sda 12345 100 987654 5000 6789 50 456789 3000 0 4000 8000 0 0 0 0
   8       1 sda1 10000 80 800000 4000 5000 40 400000 2500 0 3500 6500 0 0 0 0
 259       0 nvme0n1 50000 200 2000000 10000 30000 150 1500000 8000 5 15000 18000 0 0 0 0
",
        );
        fs.add_file(
            "/proc/net/dev",
            "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:  123456     1234    0    0    0     0          0         0   123456     1234    0    0    0     0       0          0
  eth0: 1000000     1000    1    0    0     0          0         0   500000      800    0    0    0     0       0          0
  eth1:   20000      200    0    0    0     0          0         0    10000      100    0    2    0     0       0          0
",
        );

        // cgroup v2 of the container
        fs.add_file("/proc/self/cgroup", "0::/docker/3f4e5d6c7b8a\n");
        fs.add_file("/sys/fs/cgroup/cgroup.controllers", "cpuset cpu io memory pids\n");
        fs.add_file("/sys/fs/cgroup/cpu.max", "200000 100000\n");
        fs.add_file(
            "/sys/fs/cgroup/cpu.stat",
            "usage_usec 5000000\nuser_usec 4000000\nsystem_usec 1000000\nnr_periods 10\n",
        );
        fs.add_file("/sys/fs/cgroup/memory.current", "536870912\n");
        fs.add_file("/sys/fs/cgroup/memory.peak", "805306368\n");
        fs.add_file(
            "/sys/fs/cgroup/memory.stat",
            "anon 400000000\nfile 100000000\npgfault 4500\npgmajfault 12\n",
        );
        fs.add_file(
            "/sys/fs/cgroup/io.stat",
            "8:0 rbytes=4096 wbytes=8192 rios=1 wios=2 dbytes=0 dios=0\n259:0 rbytes=1024 wbytes=0 rios=1 wios=0\n",
        );
        fs.add_file("/sys/fs/cgroup/pids.current", "3\n");

        fs.add_process(
            1,
            "1 (init) S 0 1 1 0 -1 4194560 1000 0 0 0 100 50 0 0 20 0 1 0 1 12345678 500 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0",
            "Name:\tinit\nState:\tS (sleeping)\nVmRSS:\t    2000 kB\nvoluntary_ctxt_switches:\t100\nnonvoluntary_ctxt_switches:\t10\n",
            "/sbin/init\0",
        );
        fs.add_process(
            1234,
            "1234 (bash) S 1 1234 1234 34816 1234 4194304 500 0 0 0 20 10 0 0 20 0 1 0 5000 23456789 1500 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 1 0 0 0 0 0",
            "Name:\tbash\nState:\tS (sleeping)\nVmRSS:\t    6000 kB\nvoluntary_ctxt_switches:\t50\nnonvoluntary_ctxt_switches:\t5\n",
            "/bin/bash\0--login\0",
        );
        fs.add_process(
            4242,
            "4242 (python3) R 1 4242 4242 0 -1 4194304 200000 0 10 0 90000 12000 0 0 20 0 64 0 9000 34359738368 2097152 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 2 0 0 42 0 0",
            "Name:\tpython3\nState:\tR (running)\nVmRSS:\t 8388608 kB\nvoluntary_ctxt_switches:\t5000\nnonvoluntary_ctxt_switches:\t700\n",
            "python3\0-m\0vllm.entrypoints.openai.api_server\0",
        );

        fs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::traits::FileSystem;
    use std::path::Path;

    #[test]
    fn test_typical_system_has_core_files() {
        let fs = MockFs::typical_system();
        for path in [
            "/proc/stat",
            "/proc/meminfo",
            "/proc/4242/cmdline",
            "/sys/fs/cgroup/cgroup.controllers",
            "/etc/machine-id",
        ] {
            assert!(fs.exists(Path::new(path)), "{path}");
        }
    }
}
