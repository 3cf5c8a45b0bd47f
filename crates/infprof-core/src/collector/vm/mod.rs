//! Host-level collectors reading the global `/proc` files.

mod cpu;
mod disk;
mod memory;
mod network;

pub use cpu::CpuCollector;
pub use disk::DiskCollector;
pub use memory::MemoryCollector;
pub use network::NetworkCollector;
