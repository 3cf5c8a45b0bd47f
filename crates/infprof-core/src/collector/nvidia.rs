//! NVIDIA GPU collector backed by NVML.
//!
//! Static data is driver and CUDA version plus per-device identity. Each tick
//! produces one [`GpuSample`] per device, kept in the record's deferred GPU
//! collection until the record is flattened.
//!
//! Per device, independent query groups can run on scoped threads and are
//! joined before the sample is assembled. A query that fails leaves its
//! fields at zero.

use std::sync::RwLock;
use std::thread;

use nvml_wrapper::Device;
use nvml_wrapper::Nvml;
use nvml_wrapper::enum_wrappers::device::{
    Clock, EccCounter, MemoryError, PerformanceState, TemperatureSensor,
};
use nvml_wrapper::enums::device::UsedGpuMemory;
use tracing::{debug, warn};

use super::{CollectError, Collector};
use crate::record::{GpuProcessSample, GpuSample, Record};
use crate::util::now_nanos;

pub struct NvidiaCollector {
    nvml: RwLock<Option<Nvml>>,
    collect_processes: bool,
    concurrent: bool,
}

impl NvidiaCollector {
    /// Initialises NVML. Fails when the driver library is absent.
    pub fn new(collect_processes: bool, concurrent: bool) -> Result<Self, CollectError> {
        let nvml = Nvml::init().map_err(|e| CollectError::Gpu(e.to_string()))?;
        let count = nvml.device_count().unwrap_or(0);
        debug!(devices = count, "NVML initialised");
        Ok(Self {
            nvml: RwLock::new(Some(nvml)),
            collect_processes,
            concurrent,
        })
    }

    fn sample_device(&self, device: &Device<'_>, index: u32) -> GpuSample {
        let timestamp = now_nanos();
        let (util, mem, power, clocks, link) = if self.concurrent {
            thread::scope(|s| {
                let util = s.spawn(|| query_utilization(device));
                let mem = s.spawn(|| query_memory(device));
                let power = s.spawn(|| query_power(device));
                let clocks = s.spawn(|| query_clocks(device));
                let link = s.spawn(|| query_link(device));
                (
                    util.join().unwrap_or_default(),
                    mem.join().unwrap_or_default(),
                    power.join().unwrap_or_default(),
                    clocks.join().unwrap_or_default(),
                    link.join().unwrap_or_default(),
                )
            })
        } else {
            (
                query_utilization(device),
                query_memory(device),
                query_power(device),
                query_clocks(device),
                query_link(device),
            )
        };

        let processes = if self.collect_processes {
            query_processes(device)
        } else {
            Vec::new()
        };

        GpuSample {
            index,
            timestamp,
            utilization_gpu: util.gpu,
            utilization_memory: util.memory,
            utilization_encoder: util.encoder,
            utilization_decoder: util.decoder,
            memory_used_bytes: mem.used,
            memory_free_bytes: mem.free,
            memory_total_bytes: mem.total,
            bar1_used_bytes: mem.bar1_used,
            bar1_free_bytes: mem.bar1_free,
            temperature_gpu_c: power.temperature,
            fan_speed_percent: power.fan_speed,
            clock_graphics_mhz: clocks.graphics,
            clock_sm_mhz: clocks.sm,
            clock_memory_mhz: clocks.memory,
            clock_video_mhz: clocks.video,
            power_usage_mw: power.usage_mw,
            power_limit_mw: power.limit_mw,
            energy_consumption_mj: power.energy_mj,
            performance_state: power.pstate,
            pcie_link_gen: link.pcie_gen,
            pcie_link_width: link.pcie_width,
            ecc_errors_corrected: link.ecc_corrected,
            ecc_errors_uncorrected: link.ecc_uncorrected,
            processes,
        }
    }
}

impl Collector for NvidiaCollector {
    fn name(&self) -> &str {
        "nvidia"
    }

    fn collect_static(&self) -> Record {
        let mut record = Record::new();
        let guard = match self.nvml.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(nvml) = guard.as_ref() else {
            return record;
        };

        record.insert(
            "nvidiaDriverVersion",
            nvml.sys_driver_version().unwrap_or_default(),
        );
        record.insert(
            "nvidiaCudaVersion",
            nvml.sys_cuda_driver_version()
                .map(format_cuda_version)
                .unwrap_or_default(),
        );
        let count = nvml.device_count().unwrap_or(0);
        record.insert("nvidiaGpuCount", i64::from(count));

        for index in 0..count {
            let Ok(device) = nvml.device_by_index(index) else {
                continue;
            };
            record.insert(format!("nvidia{index}Name"), device.name().unwrap_or_default());
            record.insert(format!("nvidia{index}Uuid"), device.uuid().unwrap_or_default());
        }
        record
    }

    fn collect_dynamic(&self) -> Record {
        let mut record = Record::new();
        let guard = match self.nvml.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(nvml) = guard.as_ref() else {
            return record;
        };

        let count = nvml.device_count().unwrap_or(0);
        let mut samples = Vec::with_capacity(count as usize);
        for index in 0..count {
            match nvml.device_by_index(index) {
                Ok(device) => samples.push(self.sample_device(&device, index)),
                Err(e) => debug!(index, error = %e, "GPU device lookup failed"),
            }
        }
        record.set_gpus(samples);
        record
    }

    fn close(&self) -> Result<(), CollectError> {
        let mut guard = match self.nvml.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(nvml) = guard.take() {
            nvml.shutdown().map_err(|e| {
                warn!(error = %e, "NVML shutdown failed");
                CollectError::Gpu(e.to_string())
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct UtilizationQuery {
    gpu: i64,
    memory: i64,
    encoder: i64,
    decoder: i64,
}

#[derive(Debug, Default)]
struct MemoryQuery {
    used: i64,
    free: i64,
    total: i64,
    bar1_used: i64,
    bar1_free: i64,
}

#[derive(Debug, Default)]
struct PowerQuery {
    temperature: i64,
    fan_speed: i64,
    usage_mw: i64,
    limit_mw: i64,
    energy_mj: i64,
    pstate: i64,
}

#[derive(Debug, Default)]
struct ClockQuery {
    graphics: i64,
    sm: i64,
    memory: i64,
    video: i64,
}

#[derive(Debug, Default)]
struct LinkQuery {
    pcie_gen: i64,
    pcie_width: i64,
    ecc_corrected: i64,
    ecc_uncorrected: i64,
}

fn query_utilization(device: &Device<'_>) -> UtilizationQuery {
    let rates = device.utilization_rates().ok();
    UtilizationQuery {
        gpu: rates.as_ref().map(|u| i64::from(u.gpu)).unwrap_or(0),
        memory: rates.as_ref().map(|u| i64::from(u.memory)).unwrap_or(0),
        encoder: device
            .encoder_utilization()
            .map(|u| i64::from(u.utilization))
            .unwrap_or(0),
        decoder: device
            .decoder_utilization()
            .map(|u| i64::from(u.utilization))
            .unwrap_or(0),
    }
}

fn query_memory(device: &Device<'_>) -> MemoryQuery {
    let mut q = MemoryQuery::default();
    if let Ok(info) = device.memory_info() {
        q.used = saturate(info.used);
        q.free = saturate(info.free);
        q.total = saturate(info.total);
    }
    if let Ok(bar1) = device.bar1_memory_info() {
        q.bar1_used = saturate(bar1.used);
        q.bar1_free = saturate(bar1.free);
    }
    q
}

fn query_power(device: &Device<'_>) -> PowerQuery {
    PowerQuery {
        temperature: device
            .temperature(TemperatureSensor::Gpu)
            .map(i64::from)
            .unwrap_or(0),
        fan_speed: device.fan_speed(0).map(i64::from).unwrap_or(0),
        usage_mw: device.power_usage().map(i64::from).unwrap_or(0),
        limit_mw: device.enforced_power_limit().map(i64::from).unwrap_or(0),
        energy_mj: device.total_energy_consumption().map(saturate).unwrap_or(0),
        pstate: device.performance_state().map(pstate_index).unwrap_or(-1),
    }
}

fn query_clocks(device: &Device<'_>) -> ClockQuery {
    let clock = |c: Clock| device.clock_info(c).map(i64::from).unwrap_or(0);
    ClockQuery {
        graphics: clock(Clock::Graphics),
        sm: clock(Clock::SM),
        memory: clock(Clock::Memory),
        video: clock(Clock::Video),
    }
}

fn query_link(device: &Device<'_>) -> LinkQuery {
    let ecc = |kind: MemoryError| {
        device
            .total_ecc_errors(kind, EccCounter::Volatile)
            .map(saturate)
            .unwrap_or(0)
    };
    LinkQuery {
        pcie_gen: device.current_pcie_link_gen().map(i64::from).unwrap_or(0),
        pcie_width: device.current_pcie_link_width().map(i64::from).unwrap_or(0),
        ecc_corrected: ecc(MemoryError::Corrected),
        ecc_uncorrected: ecc(MemoryError::Uncorrected),
    }
}

fn query_processes(device: &Device<'_>) -> Vec<GpuProcessSample> {
    device
        .running_compute_processes()
        .map(|procs| {
            procs
                .into_iter()
                .map(|p| GpuProcessSample {
                    pid: i64::from(p.pid),
                    used_memory_bytes: used_memory_bytes(&p.used_gpu_memory),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn saturate(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

/// NVML encodes the CUDA driver version as `major * 1000 + minor * 10`.
fn format_cuda_version(v: i32) -> String {
    format!("{}.{}", v / 1000, (v % 1000) / 10)
}

fn used_memory_bytes(used: &UsedGpuMemory) -> i64 {
    match used {
        UsedGpuMemory::Used(bytes) => saturate(*bytes),
        UsedGpuMemory::Unavailable => 0,
    }
}

/// P-state as its number: P0 is maximum performance, -1 unknown.
fn pstate_index(state: PerformanceState) -> i64 {
    match state {
        PerformanceState::Zero => 0,
        PerformanceState::One => 1,
        PerformanceState::Two => 2,
        PerformanceState::Three => 3,
        PerformanceState::Four => 4,
        PerformanceState::Five => 5,
        PerformanceState::Six => 6,
        PerformanceState::Seven => 7,
        PerformanceState::Eight => 8,
        PerformanceState::Nine => 9,
        PerformanceState::Ten => 10,
        PerformanceState::Eleven => 11,
        PerformanceState::Twelve => 12,
        PerformanceState::Thirteen => 13,
        PerformanceState::Fourteen => 14,
        PerformanceState::Fifteen => 15,
        PerformanceState::Unknown => -1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_cuda_version() {
        assert_eq!(format_cuda_version(12040), "12.4");
        assert_eq!(format_cuda_version(11080), "11.8");
        assert_eq!(format_cuda_version(0), "0.0");
    }

    #[test]
    fn test_pstate_index() {
        assert_eq!(pstate_index(PerformanceState::Zero), 0);
        assert_eq!(pstate_index(PerformanceState::Eight), 8);
        assert_eq!(pstate_index(PerformanceState::Unknown), -1);
    }

    #[test]
    fn test_used_memory_bytes() {
        assert_eq!(used_memory_bytes(&UsedGpuMemory::Used(1 << 30)), 1 << 30);
        assert_eq!(used_memory_bytes(&UsedGpuMemory::Unavailable), 0);
    }

    #[test]
    fn test_saturate() {
        assert_eq!(saturate(42), 42);
        assert_eq!(saturate(u64::MAX), i64::MAX);
    }
}
