//! Mock filesystem and canned system scenarios for collector tests.

mod filesystem;
mod scenarios;

pub use filesystem::MockFs;
