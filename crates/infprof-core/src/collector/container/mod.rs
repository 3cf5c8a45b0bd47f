//! Container metrics from the cgroup v2 unified hierarchy.

mod collector;
mod parser;

pub use collector::ContainerCollector;
