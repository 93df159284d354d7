// NVIDIA accelerators via `nvidia-smi --query-gpu`. Memory values are MiB as reported by the tool.

use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::{Capacity, Collector, CollectorError, Reading, ReadingCache, RefreshTask};
use crate::models::{DeviceRecord, DeviceSpec};

pub const DEFAULT_NVIDIA_SMI: &str = "nvidia-smi";

const QUERY_ARGS: [&str; 2] = [
    "--query-gpu=index,utilization.gpu,memory.used,memory.total",
    "--format=csv,noheader,nounits",
];

/// One device line of the query output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuRow {
    pub index: i32,
    pub gpu_util: i32,
    pub mem_used: i64,
    pub mem_total: i64,
}

/// Fields the driver cannot report (`[N/A]`, `[Not Supported]`) read as 0.
fn parse_field<T>(field: &str, line: &str) -> Result<T, CollectorError>
where
    T: std::str::FromStr + Default,
{
    let field = field.trim();
    if field.starts_with('[') {
        return Ok(T::default());
    }
    field.parse::<T>().map_err(|_| CollectorError::Parse {
        path: DEFAULT_NVIDIA_SMI.into(),
        reason: format!("bad field {field:?} in line {line:?}"),
    })
}

/// Parses `index, utilization.gpu, memory.used, memory.total` CSV lines.
pub fn parse_query_output(output: &str) -> Result<Vec<GpuRow>, CollectorError> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let fields: Vec<&str> = line.split(',').collect();
            let [index, util, used, total] = fields.as_slice() else {
                return Err(CollectorError::Parse {
                    path: DEFAULT_NVIDIA_SMI.into(),
                    reason: format!("expected 4 fields in line {line:?}"),
                });
            };
            Ok(GpuRow {
                index: parse_field(index, line)?,
                gpu_util: parse_field(util, line)?,
                mem_used: parse_field(used, line)?,
                mem_total: parse_field(total, line)?,
            })
        })
        .collect()
}

fn query(command: &str) -> Result<Vec<GpuRow>, CollectorError> {
    let output = Command::new(command)
        .args(QUERY_ARGS)
        .output()
        .map_err(|e| CollectorError::Command {
            command: command.into(),
            reason: e.to_string(),
        })?;
    if !output.status.success() {
        return Err(CollectorError::Command {
            command: command.into(),
            reason: format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    parse_query_output(&String::from_utf8_lossy(&output.stdout))
}

/// Lays rows out in the device order fixed at start. A device missing from `rows` keeps a
/// zeroed slot so the record shape never changes between samples.
pub(crate) fn device_records(devices: &[DeviceSpec], rows: &[GpuRow]) -> Vec<DeviceRecord> {
    devices
        .iter()
        .map(|spec| match rows.iter().find(|r| r.index == spec.index) {
            Some(row) => DeviceRecord {
                index: spec.index,
                mem_used: row.mem_used,
                gpu_util: row.gpu_util,
            },
            None => DeviceRecord {
                index: spec.index,
                ..DeviceRecord::default()
            },
        })
        .collect()
}

pub struct GpuCollector {
    command: String,
    refresh_interval: Duration,
    devices: Arc<Vec<DeviceSpec>>,
    cache: ReadingCache,
    task: Option<RefreshTask>,
}

impl GpuCollector {
    pub fn new(refresh_interval: Duration) -> Self {
        Self::with_command(DEFAULT_NVIDIA_SMI, refresh_interval)
    }

    pub fn with_command(command: impl Into<String>, refresh_interval: Duration) -> Self {
        Self {
            command: command.into(),
            refresh_interval,
            devices: Arc::new(Vec::new()),
            cache: ReadingCache::new("gpu"),
            task: None,
        }
    }

    pub fn devices(&self) -> &[DeviceSpec] {
        &self.devices
    }
}

impl Collector for GpuCollector {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn start(&mut self) -> Result<(), CollectorError> {
        let rows = query(&self.command).map_err(|e| CollectorError::Unavailable {
            collector: "gpu",
            reason: e.to_string(),
        })?;
        if rows.is_empty() {
            return Err(CollectorError::Unavailable {
                collector: "gpu",
                reason: "no devices".into(),
            });
        }
        info!(devices = rows.len(), "gpu devices found");
        let devices: Vec<DeviceSpec> = rows
            .iter()
            .map(|r| {
                info!(index = r.index, mem_total_mib = r.mem_total, "gpu device");
                DeviceSpec {
                    index: r.index,
                    mem_total: r.mem_total,
                }
            })
            .collect();
        self.cache
            .update(|reading| reading.devices = device_records(&devices, &rows));
        self.devices = Arc::new(devices);

        let command = self.command.clone();
        let devices = self.devices.clone();
        let cache = self.cache.clone();
        self.task = Some(RefreshTask::spawn("gpu", self.refresh_interval, move || {
            match query(&command) {
                Ok(rows) => {
                    let records = device_records(&devices, &rows);
                    cache.update(|reading| reading.devices = records);
                }
                Err(e) => debug!(error = %e, operation = "query_gpu", "gpu query failed"),
            }
        }));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut task) = self.task.take() {
            task.stop();
        }
    }

    fn fetch(&self) -> Result<Reading, CollectorError> {
        self.cache.load()
    }

    fn capacity(&self) -> Capacity {
        Capacity {
            mem_total: None,
            devices: self.devices.to_vec(),
        }
    }
}
