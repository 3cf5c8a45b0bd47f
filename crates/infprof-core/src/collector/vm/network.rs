use std::path::PathBuf;

use crate::collector::procfs::parser::parse_net_dev;
use crate::collector::procfs::probe_file;
use crate::collector::{Collector, FileSystem};
use crate::record::Record;

/// Interface counters from `/proc/net/dev`, summed over every interface
/// except loopback.
pub struct NetworkCollector<F: FileSystem> {
    fs: F,
    proc_path: PathBuf,
}

impl<F: FileSystem> NetworkCollector<F> {
    pub fn new(fs: F, proc_path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
        }
    }
}

impl<F: FileSystem> Collector for NetworkCollector<F> {
    fn name(&self) -> &str {
        "network"
    }

    fn collect_static(&self) -> Record {
        Record::new()
    }

    fn collect_dynamic(&self) -> Record {
        let (content, ts) = probe_file(&self.fs, &self.proc_path.join("net/dev"));

        let (mut rx_bytes, mut tx_bytes, mut rx_packets, mut tx_packets) = (0u64, 0u64, 0u64, 0u64);
        let (mut rx_errs, mut tx_errs, mut rx_drop, mut tx_drop) = (0u64, 0u64, 0u64, 0u64);
        for dev in parse_net_dev(&content) {
            if dev.interface == "lo" {
                continue;
            }
            rx_bytes += dev.rx_bytes;
            tx_bytes += dev.tx_bytes;
            rx_packets += dev.rx_packets;
            tx_packets += dev.tx_packets;
            rx_errs += dev.rx_errs;
            tx_errs += dev.tx_errs;
            rx_drop += dev.rx_drop;
            tx_drop += dev.tx_drop;
        }

        let mut r = Record::new();
        r.insert_sampled("vNetworkBytesRecvd", rx_bytes, ts);
        r.insert_sampled("vNetworkBytesSent", tx_bytes, ts);
        r.insert_sampled("vNetworkPacketsRecvd", rx_packets, ts);
        r.insert_sampled("vNetworkPacketsSent", tx_packets, ts);
        r.insert_sampled("vNetworkErrorsRecvd", rx_errs, ts);
        r.insert_sampled("vNetworkErrorsSent", tx_errs, ts);
        r.insert_sampled("vNetworkDropsRecvd", rx_drop, ts);
        r.insert_sampled("vNetworkDropsSent", tx_drop, ts);
        r
    }
}
