//! CLI command implementations.

pub mod common;
pub mod gate_counts;
pub mod generate;
pub mod sweep;
pub mod version;
