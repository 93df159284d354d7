// Shared test helpers

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use monitoring_agent::collector::{Capacity, Collector, CollectorError, Reading};
use monitoring_agent::models::*;

pub fn sample(timestamp: i64, cpu_util: i32, mem_used: i64) -> Sample {
    Sample::new(timestamp, cpu_util, mem_used, vec![])
}

pub fn device(index: i32, mem_used: i64, gpu_util: i32) -> DeviceRecord {
    DeviceRecord {
        index,
        mem_used,
        gpu_util,
    }
}

/// Observable side of a [`FakeCollector`] after it was boxed into a set.
#[derive(Debug, Clone, Default)]
pub struct FakeProbe {
    pub started: Arc<AtomicBool>,
    pub stopped: Arc<AtomicBool>,
    pub fetches: Arc<AtomicUsize>,
}

impl FakeProbe {
    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

/// Collector returning a fixed reading and capacity.
pub struct FakeCollector {
    pub name: &'static str,
    pub reading: Reading,
    pub capacity: Capacity,
    pub fail_start: bool,
    pub fail_fetch: bool,
    pub probe: FakeProbe,
}

impl FakeCollector {
    pub fn new(name: &'static str, reading: Reading, capacity: Capacity) -> Self {
        Self {
            name,
            reading,
            capacity,
            fail_start: false,
            fail_fetch: false,
            probe: FakeProbe::default(),
        }
    }

    /// CPU/memory collector: `cpu_util` percent, `mem_used` of `mem_total` MiB.
    pub fn host(cpu_util: i32, mem_used: i64, mem_total: i64) -> Self {
        Self::new(
            "fake-host",
            Reading {
                cpu_util: Some(cpu_util),
                mem_used: Some(mem_used),
                devices: vec![],
            },
            Capacity {
                mem_total: Some(mem_total),
                devices: vec![],
            },
        )
    }

    pub fn probe(&self) -> FakeProbe {
        self.probe.clone()
    }
}

impl Collector for FakeCollector {
    fn name(&self) -> &'static str {
        self.name
    }

    fn start(&mut self) -> Result<(), CollectorError> {
        if self.fail_start {
            return Err(CollectorError::Unavailable {
                collector: self.name,
                reason: "configured to fail".to_string(),
            });
        }
        self.probe.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        self.probe.stopped.store(true, Ordering::SeqCst);
    }

    fn fetch(&self) -> Result<Reading, CollectorError> {
        self.probe.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch {
            return Err(CollectorError::Command {
                command: self.name.to_string(),
                reason: "configured to fail".to_string(),
            });
        }
        Ok(self.reading.clone())
    }

    fn capacity(&self) -> Capacity {
        self.capacity.clone()
    }
}
