//! Profiler library for edge plugin executions
//!
//! This crate provides the core functionality for:
//! - Parsing relative and absolute time expressions
//! - Correlating scheduler lifecycle events into execution records
//! - Reconstructing CPU utilization from cumulative counters
//! - Aligning CPU, memory and power streams per execution
//! - Querying, caching and bulk-downloading fleet telemetry
//! - Exporting datasets and reporting batch progress

pub mod events;
pub mod export;
pub mod models;
pub mod observability;
pub mod profile;
pub mod signal;
pub mod tabular;
pub mod telemetry;
pub mod timeparse;

pub use models::*;
pub use observability::{BatchLogger, BatchMetrics};
pub use timeparse::{parse_time, parse_time_at, TimeParseError};
