// Resource collectors. Each collector refreshes its own cached reading on a background task;
// the scheduler only ever reads the cache, so a fetch never blocks the sampling loop.

mod cgroup;
mod gpu;
mod host;

pub use cgroup::{
    CgroupCollector, CgroupLayout, CpuSource, DEFAULT_CGROUP_ROOT, DEV_CPUACCT_USAGE, MemorySource,
    UNLIMITED_MEMORY,
};
pub use gpu::{GpuCollector, GpuRow, parse_query_output};
pub use host::HostCollector;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::models::{DeviceRecord, DeviceSpec, Sample, Spec};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

const BYTES_PER_MIB: i64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("{collector} unavailable: {reason}")]
    Unavailable {
        collector: &'static str,
        reason: String,
    },

    #[error("failed to read '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse '{path}': {reason}")]
    Parse { path: String, reason: String },

    #[error("command '{command}' failed: {reason}")]
    Command { command: String, reason: String },

    #[error("{collector} cache lock poisoned")]
    Poisoned { collector: &'static str },
}

/// Latest values from one collector. `None` means this collector does not provide the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reading {
    pub cpu_util: Option<i32>,
    pub mem_used: Option<i64>,
    pub devices: Vec<DeviceRecord>,
}

/// Static capacity a collector contributes to the report's [`Spec`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capacity {
    pub mem_total: Option<i64>,
    pub devices: Vec<DeviceSpec>,
}

pub trait Collector: Send {
    /// Short name used in logs (e.g. `"cgroup"`, `"gpu"`).
    fn name(&self) -> &'static str;

    /// Probes the resource and starts the background refresh.
    ///
    /// # Errors
    ///
    /// Returns an error when the resource is not available on this host; the collector is
    /// then treated as unavailable for the lifetime of the process.
    fn start(&mut self) -> Result<(), CollectorError>;

    fn stop(&mut self);

    /// Latest cached reading. Never blocks on the underlying resource.
    fn fetch(&self) -> Result<Reading, CollectorError>;

    fn capacity(&self) -> Capacity;
}

/// Stand-in for an absent resource: contributes an empty reading and no capacity.
#[derive(Debug, Default)]
pub struct NullCollector;

impl Collector for NullCollector {
    fn name(&self) -> &'static str {
        "none"
    }

    fn start(&mut self) -> Result<(), CollectorError> {
        Ok(())
    }

    fn stop(&mut self) {}

    fn fetch(&self) -> Result<Reading, CollectorError> {
        Ok(Reading::default())
    }

    fn capacity(&self) -> Capacity {
        Capacity::default()
    }
}

/// Reading shared between a refresh task and the scheduler.
#[derive(Debug, Clone)]
pub(crate) struct ReadingCache {
    collector: &'static str,
    latest: Arc<Mutex<Reading>>,
}

impl ReadingCache {
    pub(crate) fn new(collector: &'static str) -> Self {
        Self {
            collector,
            latest: Arc::new(Mutex::new(Reading::default())),
        }
    }

    pub(crate) fn load(&self) -> Result<Reading, CollectorError> {
        self.latest
            .lock()
            .map(|r| r.clone())
            .map_err(|_| CollectorError::Poisoned {
                collector: self.collector,
            })
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut Reading)) {
        match self.latest.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(_) => warn!(collector = self.collector, "reading cache lock poisoned"),
        }
    }
}

/// Background task calling a blocking refresh function every `every`, until stopped.
pub(crate) struct RefreshTask {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl RefreshTask {
    pub(crate) fn spawn<F>(collector: &'static str, every: Duration, refresh: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let refresh = Arc::new(refresh);
        let handle = tokio::spawn(async move {
            let mut tick = interval(every);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let refresh = refresh.clone();
                        if let Err(e) = tokio::task::spawn_blocking(move || (*refresh)()).await {
                            warn!(collector, error = %e, "refresh task join failed");
                        }
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
            debug!(collector, "refresh task stopped");
        });
        Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub(crate) fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.take();
    }
}

impl Drop for RefreshTask {
    fn drop(&mut self) {
        self.stop();
    }
}

pub(crate) fn bytes_to_mib(bytes: i64) -> i64 {
    bytes / BYTES_PER_MIB
}

struct Slot {
    collector: Box<dyn Collector>,
    available: bool,
}

/// The collectors feeding one agent, merged into one [`Spec`] and one sample per tick.
pub struct CollectorSet {
    slots: Vec<Slot>,
}

impl CollectorSet {
    pub fn new(collectors: Vec<Box<dyn Collector>>) -> Self {
        Self {
            slots: collectors
                .into_iter()
                .map(|collector| Slot {
                    collector,
                    available: false,
                })
                .collect(),
        }
    }

    /// Starts every collector; one that fails to start is logged and left unavailable.
    pub fn start_all(&mut self) {
        for slot in &mut self.slots {
            match slot.collector.start() {
                Ok(()) => {
                    slot.available = true;
                    info!(collector = slot.collector.name(), "collector started");
                }
                Err(e) => {
                    slot.available = false;
                    warn!(
                        collector = slot.collector.name(),
                        error = %e,
                        "collector unavailable"
                    );
                }
            }
        }
    }

    pub fn stop_all(&mut self) {
        for slot in &mut self.slots {
            if slot.available {
                slot.collector.stop();
                slot.available = false;
                debug!(collector = slot.collector.name(), "collector stopped");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn available(&self) -> usize {
        self.slots.iter().filter(|s| s.available).count()
    }

    /// First reported memory total wins; device specs are concatenated in collector order.
    pub fn spec(&self) -> Spec {
        let mut spec = Spec::default();
        let mut mem_total = None;
        for slot in self.slots.iter().filter(|s| s.available) {
            let capacity = slot.collector.capacity();
            if mem_total.is_none() {
                mem_total = capacity.mem_total;
            }
            spec.devices.extend(capacity.devices);
        }
        spec.mem_total = mem_total.unwrap_or(0);
        spec
    }

    /// Builds one sample from every collector's cached reading. A failing or unavailable
    /// collector contributes an empty reading.
    pub fn sample(&self, timestamp: i64) -> Sample {
        let mut cpu_util = None;
        let mut mem_used = None;
        let mut devices = Vec::new();
        for slot in self.slots.iter().filter(|s| s.available) {
            let reading = match slot.collector.fetch() {
                Ok(r) => r,
                Err(e) => {
                    warn!(
                        collector = slot.collector.name(),
                        error = %e,
                        operation = "fetch",
                        "collector fetch failed; using empty reading"
                    );
                    Reading::default()
                }
            };
            cpu_util = cpu_util.or(reading.cpu_util);
            mem_used = mem_used.or(reading.mem_used);
            devices.extend(reading.devices);
        }
        let sample = Sample::new(
            timestamp,
            cpu_util.unwrap_or(0),
            mem_used.unwrap_or(0),
            devices,
        );
        debug!(
            cpu_util = sample.cpu_util,
            mem_used = sample.mem_used,
            devices = sample.devices.len(),
            "sample built"
        );
        sample
    }
}
