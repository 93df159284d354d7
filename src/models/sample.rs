// One observation of host (and accelerator) utilization

use serde::{Deserialize, Serialize};

/// Per-device reading inside a [`Sample`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub index: i32,
    pub mem_used: i64,
    pub gpu_util: i32,
}

/// One sample: timestamp (epoch seconds), CPU percent, memory used and per-device readings.
/// `devices` is empty when no accelerator is present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: i64,
    pub cpu_util: i32,
    pub mem_used: i64,
    #[serde(rename = "GPU", default)]
    pub devices: Vec<DeviceRecord>,
}

impl Sample {
    pub fn new(timestamp: i64, cpu_util: i32, mem_used: i64, devices: Vec<DeviceRecord>) -> Self {
        Self {
            timestamp,
            cpu_util,
            mem_used,
            devices,
        }
    }
}
