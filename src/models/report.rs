// Persisted report: static capacity spec + one chronological dataset per resolution

use serde::{Deserialize, Serialize};

use super::Sample;

/// Static capacity of one accelerator device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub index: i32,
    pub mem_total: i64,
}

/// Static capacity, computed once at startup and embedded in every report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spec {
    pub mem_total: i64,
    #[serde(rename = "GPU", default)]
    pub devices: Vec<DeviceSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datasets {
    #[serde(rename = "15m")]
    pub fifteen_minutes: Vec<Sample>,
    #[serde(rename = "1h")]
    pub one_hour: Vec<Sample>,
    #[serde(rename = "3h")]
    pub three_hours: Vec<Sample>,
    pub lifetime: Vec<Sample>,
}

/// The serialization unit handed to storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub spec: Spec,
    pub datasets: Datasets,
}
