//! Container CPU and memory from cgroup accounting files.
//!
//! # File formats
//!
//! - v1 `cpuacct.usage`: cumulative CPU time in nanoseconds
//! - v1 `memory.usage_in_bytes`, `memory.limit_in_bytes`: `<bytes>\n`
//! - v1 `memory.stat`: `key value\n` pairs including `total_inactive_file`
//! - v2 `cpu.stat`: `usage_usec <value>\nuser_usec <value>\n...`
//! - v2 `memory.current`: `<bytes>\n`, `memory.max`: `<bytes>\n` or `max\n`
//! - v2 `memory.stat`: `key value\n` pairs including `inactive_file`
//!
//! CPU utilization is `Δusage_ns * 100 / Δwall_ns` between two refreshes; memory used is
//! `usage - inactive_file`. Memory values are reported in MiB.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::{
    Capacity, Collector, CollectorError, Reading, ReadingCache, RefreshTask, bytes_to_mib,
};

/// Default cgroup mount point.
pub const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Development override for the CPU usage counter, checked before the real hierarchy.
pub const DEV_CPUACCT_USAGE: &str = "/tmp/dev-cpuacct.usage";

/// cgroup v1 `memory.limit_in_bytes` value meaning "no limit".
pub const UNLIMITED_MEMORY: i64 = 9_223_372_036_854_771_712;

const V1_CPUACCT_USAGE: [&str; 3] = [
    "cpuacct/cpuacct.usage",
    "cpu,cpuacct/cpuacct.usage",
    "CPU/cpuacct.usage",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CpuSource {
    /// v1 `cpuacct.usage`, nanoseconds.
    UsageNanos(PathBuf),
    /// v2 `cpu.stat` `usage_usec`, microseconds.
    StatMicros(PathBuf),
}

impl CpuSource {
    fn read_nanos(&self) -> Result<i64, CollectorError> {
        match self {
            CpuSource::UsageNanos(path) => read_number(path),
            CpuSource::StatMicros(path) => {
                Ok(read_stat_value(path, "usage_usec")?.saturating_mul(1000))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySource {
    pub usage: PathBuf,
    pub stat: PathBuf,
    pub limit: PathBuf,
    pub inactive_key: &'static str,
}

impl MemorySource {
    fn read_used_bytes(&self) -> Result<i64, CollectorError> {
        let usage = read_number(&self.usage)?;
        let inactive = read_stat_value(&self.stat, self.inactive_key)?;
        Ok(usage.saturating_sub(inactive).max(0))
    }
}

/// Accounting files found under a cgroup root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CgroupLayout {
    pub cpu: Option<CpuSource>,
    pub memory: Option<MemorySource>,
}

impl CgroupLayout {
    /// CPU: `dev_override`, then v1 `cpuacct.usage` locations, then v2 `cpu.stat`.
    /// Memory: v1 `memory/` controller, then v2 `memory.current`.
    pub fn probe(root: &Path, dev_override: Option<&Path>) -> Self {
        let cpu = dev_override
            .filter(|p| p.exists())
            .map(|p| CpuSource::UsageNanos(p.to_path_buf()))
            .or_else(|| {
                V1_CPUACCT_USAGE
                    .iter()
                    .map(|rel| root.join(rel))
                    .find(|p| p.exists())
                    .map(CpuSource::UsageNanos)
            })
            .or_else(|| {
                let stat = root.join("cpu.stat");
                stat.exists().then_some(CpuSource::StatMicros(stat))
            });

        let v1 = root.join("memory");
        let memory = if v1.join("memory.usage_in_bytes").exists() {
            Some(MemorySource {
                usage: v1.join("memory.usage_in_bytes"),
                stat: v1.join("memory.stat"),
                limit: v1.join("memory.limit_in_bytes"),
                inactive_key: "total_inactive_file",
            })
        } else if root.join("memory.current").exists() {
            Some(MemorySource {
                usage: root.join("memory.current"),
                stat: root.join("memory.stat"),
                limit: root.join("memory.max"),
                inactive_key: "inactive_file",
            })
        } else {
            None
        };

        Self { cpu, memory }
    }

    pub fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.memory.is_none()
    }
}

fn read_to_string(path: &Path) -> Result<String, CollectorError> {
    std::fs::read_to_string(path).map_err(|source| CollectorError::Read {
        path: path.display().to_string(),
        source,
    })
}

fn parse_error(path: &Path, reason: impl Into<String>) -> CollectorError {
    CollectorError::Parse {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

/// Reads a file holding a single integer.
pub(crate) fn read_number(path: &Path) -> Result<i64, CollectorError> {
    let content = read_to_string(path)?;
    content
        .trim()
        .parse::<i64>()
        .map_err(|e| parse_error(path, e.to_string()))
}

/// Reads a memory limit; `None` for `max` (v2) or the v1 unlimited sentinel.
pub(crate) fn read_limit(path: &Path) -> Result<Option<i64>, CollectorError> {
    let content = read_to_string(path)?;
    let value = content.trim();
    if value == "max" {
        return Ok(None);
    }
    let limit = value
        .parse::<i64>()
        .map_err(|e| parse_error(path, e.to_string()))?;
    Ok((limit != UNLIMITED_MEMORY).then_some(limit))
}

/// Reads `key value` pairs and returns the value for `key`.
pub(crate) fn read_stat_value(path: &Path, key: &str) -> Result<i64, CollectorError> {
    let content = read_to_string(path)?;
    for line in content.lines() {
        let mut parts = line.split_whitespace();
        if parts.next() == Some(key) {
            let value = parts
                .next()
                .ok_or_else(|| parse_error(path, format!("missing value for {key}")))?;
            return value
                .parse::<i64>()
                .map_err(|e| parse_error(path, e.to_string()));
        }
    }
    Err(parse_error(path, format!("key {key} not found")))
}

#[derive(Debug)]
struct Inner {
    layout: CgroupLayout,
    baseline: Mutex<Option<(Instant, i64)>>,
    cache: ReadingCache,
}

impl Inner {
    fn refresh_at(&self, now: Instant) {
        if let Some(cpu) = &self.layout.cpu {
            match cpu.read_nanos() {
                Ok(usage_ns) => {
                    if let Some(util) = self.update_baseline(now, usage_ns) {
                        self.cache.update(|r| r.cpu_util = Some(util));
                    }
                }
                Err(e) => debug!(
                    error = %e,
                    operation = "read_cpu_usage",
                    "cgroup CPU read failed"
                ),
            }
        }
        if let Some(memory) = &self.layout.memory {
            match memory.read_used_bytes() {
                Ok(bytes) => self.cache.update(|r| r.mem_used = Some(bytes_to_mib(bytes))),
                Err(e) => debug!(
                    error = %e,
                    operation = "read_memory_usage",
                    "cgroup memory read failed"
                ),
            }
        }
    }

    /// Records the new counter value; returns utilization when a previous value exists.
    fn update_baseline(&self, now: Instant, usage_ns: i64) -> Option<i32> {
        let Ok(mut baseline) = self.baseline.lock() else {
            warn!("cgroup CPU baseline lock poisoned");
            return None;
        };
        let previous = *baseline;
        let util = previous.and_then(|(at, prev_ns)| {
            let elapsed_ns = now.saturating_duration_since(at).as_nanos();
            let delta_ns = usage_ns.saturating_sub(prev_ns).max(0) as u128;
            (elapsed_ns > 0).then(|| (delta_ns * 100 / elapsed_ns) as i32)
        });
        *baseline = Some((now, usage_ns));
        util
    }
}

/// CPU and memory of the enclosing container, from cgroup v1 or v2 accounting.
pub struct CgroupCollector {
    inner: Arc<Inner>,
    refresh_interval: Duration,
    mem_total: i64,
    task: Option<RefreshTask>,
}

impl CgroupCollector {
    pub fn new(layout: CgroupLayout, refresh_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                layout,
                baseline: Mutex::new(None),
                cache: ReadingCache::new("cgroup"),
            }),
            refresh_interval,
            mem_total: 0,
            task: None,
        }
    }

    /// Probes `root` (plus the development override) and returns a collector when any
    /// accounting file is present.
    pub fn detect(root: &Path, refresh_interval: Duration) -> Option<Self> {
        let layout = CgroupLayout::probe(root, Some(Path::new(DEV_CPUACCT_USAGE)));
        if layout.is_empty() {
            debug!(root = %root.display(), "no cgroup accounting found");
            return None;
        }
        Some(Self::new(layout, refresh_interval))
    }

    pub fn layout(&self) -> &CgroupLayout {
        &self.inner.layout
    }

    /// Refreshes the cached reading as of `now`. The background task calls this every
    /// refresh interval.
    pub fn refresh_at(&self, now: Instant) {
        self.inner.refresh_at(now);
    }

    fn read_mem_total(&self) -> i64 {
        let Some(memory) = &self.inner.layout.memory else {
            return 0;
        };
        match read_limit(&memory.limit) {
            Ok(Some(bytes)) => {
                let total = bytes_to_mib(bytes);
                info!(mem_total_mib = total, "memory total set");
                total
            }
            Ok(None) => {
                warn!(
                    path = %memory.limit.display(),
                    "unlimited memory setting, keeping memory total at 0"
                );
                0
            }
            Err(e) => {
                error!(error = %e, "cannot get memory total");
                0
            }
        }
    }
}

impl Collector for CgroupCollector {
    fn name(&self) -> &'static str {
        "cgroup"
    }

    fn start(&mut self) -> Result<(), CollectorError> {
        if self.inner.layout.is_empty() {
            return Err(CollectorError::Unavailable {
                collector: "cgroup",
                reason: "no accounting files".into(),
            });
        }
        self.mem_total = self.read_mem_total();
        let inner = self.inner.clone();
        self.task = Some(RefreshTask::spawn(
            "cgroup",
            self.refresh_interval,
            move || inner.refresh_at(Instant::now()),
        ));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut task) = self.task.take() {
            task.stop();
        }
    }

    fn fetch(&self) -> Result<Reading, CollectorError> {
        self.inner.cache.load()
    }

    fn capacity(&self) -> Capacity {
        Capacity {
            mem_total: Some(self.mem_total),
            devices: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_limit_maps_unlimited_values_to_none() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("limit");
        std::fs::write(&path, "max\n").unwrap();
        assert_eq!(read_limit(&path).unwrap(), None);
        std::fs::write(&path, format!("{UNLIMITED_MEMORY}\n")).unwrap();
        assert_eq!(read_limit(&path).unwrap(), None);
        std::fs::write(&path, "2147483648\n").unwrap();
        assert_eq!(read_limit(&path).unwrap(), Some(2_147_483_648));
    }

    #[test]
    fn read_stat_value_reports_missing_key() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("memory.stat");
        std::fs::write(&path, "cache 10\ntotal_inactive_file 4096\n").unwrap();
        assert_eq!(read_stat_value(&path, "total_inactive_file").unwrap(), 4096);
        let err = read_stat_value(&path, "inactive_file").unwrap_err();
        assert!(err.to_string().contains("inactive_file"));
    }
}
