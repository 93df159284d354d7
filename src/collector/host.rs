// Whole-host CPU and memory via sysinfo, used when no cgroup accounting is available.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sysinfo::System;
use tracing::{info, warn};

use super::{
    Capacity, Collector, CollectorError, Reading, ReadingCache, RefreshTask, bytes_to_mib,
};

pub struct HostCollector {
    sys: Arc<Mutex<System>>,
    cache: ReadingCache,
    refresh_interval: Duration,
    mem_total: i64,
    task: Option<RefreshTask>,
}

impl HostCollector {
    pub fn new(refresh_interval: Duration) -> Self {
        Self {
            sys: Arc::new(Mutex::new(System::new())),
            cache: ReadingCache::new("host"),
            refresh_interval,
            mem_total: 0,
            task: None,
        }
    }
}

/// Refreshes CPU and memory and stores them in the cache. The first CPU refresh only
/// establishes the sysinfo baseline, so its usage reads as 0.
fn refresh(sys: &Mutex<System>, cache: &ReadingCache) {
    let Ok(mut sys) = sys.lock() else {
        warn!("sysinfo lock poisoned");
        return;
    };
    sys.refresh_cpu_all();
    sys.refresh_memory();
    let usage = sys.global_cpu_usage().clamp(0.0, 100.0).round() as i32;
    let used = sys.total_memory().saturating_sub(sys.available_memory());
    let used_mib = bytes_to_mib(i64::try_from(used).unwrap_or(i64::MAX));
    cache.update(|r| {
        r.cpu_util = Some(usage);
        r.mem_used = Some(used_mib);
    });
}

impl Collector for HostCollector {
    fn name(&self) -> &'static str {
        "host"
    }

    fn start(&mut self) -> Result<(), CollectorError> {
        {
            let mut sys = self.sys.lock().map_err(|_| CollectorError::Poisoned {
                collector: "host",
            })?;
            sys.refresh_memory();
            let total = i64::try_from(sys.total_memory()).unwrap_or(i64::MAX);
            self.mem_total = bytes_to_mib(total);
        }
        info!(mem_total_mib = self.mem_total, "host memory total set");

        let sys = self.sys.clone();
        let cache = self.cache.clone();
        self.task = Some(RefreshTask::spawn("host", self.refresh_interval, move || {
            refresh(&sys, &cache)
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
            mem_total: Some(self.mem_total),
            devices: Vec::new(),
        }
    }
}
