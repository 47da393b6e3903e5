//! Execution metadata derived from node names and plugin selectors

use crate::models::DeviceClass;
use serde_json::Value;

/// Selector key a plugin sets to request a GPU node
pub const GPU_SELECTOR_KEY: &str = "resource.gpu";

/// Hardware family from a Kubernetes node name
///
/// Jetson Xavier NX nodes carry `nx` in their name, Raspberry Pi nodes `rpi`.
pub fn device_class(node_name: &str) -> Option<DeviceClass> {
    if node_name.contains("nx") {
        Some(DeviceClass::Jetson)
    } else if node_name.contains("rpi") {
        Some(DeviceClass::RaspberryPi)
    } else {
        None
    }
}

/// Whether a plugin selector requests a GPU (`"resource.gpu": "true"`)
///
/// A missing or undecodable selector counts as no request.
pub fn gpu_requested(selector: Option<&str>) -> bool {
    let Some(selector) = selector else {
        return false;
    };

    match serde_json::from_str::<Value>(selector) {
        Ok(value) => value.get(GPU_SELECTOR_KEY).and_then(Value::as_str) == Some("true"),
        Err(_) => false,
    }
}
