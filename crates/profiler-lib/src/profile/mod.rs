//! Per-execution resource profiles

mod builder;
mod device;

pub use builder::{
    BatchReport, ExecutionOutcome, ProfileBuilder, ProfileConfig, ProfileError,
    CPU_GPU_POWER_SENSOR, DEFAULT_WINDOW_PADDING_SECS, SENSOR_META, SYSTEM_POWER_SENSOR,
};
pub use device::{device_class, gpu_requested, GPU_SELECTOR_KEY};
