//! Typed samples carried in a record's deferred collections.

use serde::{Deserialize, Serialize};

/// One row of the process table.
///
/// CPU times are in clock ticks as reported by `/proc/[pid]/stat`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSample {
    pub pid: i64,
    pub name: String,
    pub cmdline: String,
    pub state: String,
    pub num_threads: i64,
    pub cpu_time_user_mode: i64,
    pub cpu_time_kernel_mode: i64,
    pub children_user_mode: i64,
    pub children_kernel_mode: i64,
    pub voluntary_context_switches: i64,
    pub nonvoluntary_context_switches: i64,
    pub block_io_delays: i64,
    pub virtual_memory_bytes: i64,
    pub resident_set_size: i64,
}

/// A compute process running on a GPU.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuProcessSample {
    pub pid: i64,
    pub used_memory_bytes: i64,
}

/// Dynamic metrics for one GPU at one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuSample {
    pub index: u32,
    pub timestamp: i64,
    pub utilization_gpu: i64,
    pub utilization_memory: i64,
    pub utilization_encoder: i64,
    pub utilization_decoder: i64,
    pub memory_used_bytes: i64,
    pub memory_free_bytes: i64,
    pub memory_total_bytes: i64,
    pub bar1_used_bytes: i64,
    pub bar1_free_bytes: i64,
    pub temperature_gpu_c: i64,
    pub fan_speed_percent: i64,
    pub clock_graphics_mhz: i64,
    pub clock_sm_mhz: i64,
    pub clock_memory_mhz: i64,
    pub clock_video_mhz: i64,
    pub power_usage_mw: i64,
    pub power_limit_mw: i64,
    pub energy_consumption_mj: i64,
    pub performance_state: i64,
    pub pcie_link_gen: i64,
    pub pcie_link_width: i64,
    pub ecc_errors_corrected: i64,
    pub ecc_errors_uncorrected: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processes: Vec<GpuProcessSample>,
}
