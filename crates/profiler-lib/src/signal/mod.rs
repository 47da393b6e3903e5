//! Signal reconstruction
//!
//! Rate conversion of cumulative counters and as-of alignment of
//! independently sampled streams.

mod align;
mod rate;

pub use align::{align, asof_join, AlignError, AlignedProfile, PowerStreams, Series};
pub use rate::cpu_utilization;
