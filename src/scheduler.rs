// Sampling/flush scheduler: one task multiplexes the sample timer with flush and stop
// requests and handles them strictly one at a time. The cascade and collectors are owned
// by that task; other tasks reach it only through a SchedulerHandle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, instrument, warn};

use crate::cascade::Cascade;
use crate::collector::CollectorSet;
use crate::report_writer::ReportWriter;

pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_FLUSH_PERIOD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub sample_interval: Duration,
    /// Write the report every this many sample ticks.
    pub flush_period: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            flush_period: DEFAULT_FLUSH_PERIOD,
        }
    }
}

/// Counters readable from any thread while the scheduler runs.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    pub samples_total: AtomicU64,
    pub reports_written_total: AtomicU64,
    pub report_failures_total: AtomicU64,
    pub flush_requests_total: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    Stopped,
}

#[derive(Debug)]
enum Request {
    Flush,
    Stop(oneshot::Sender<()>),
}

/// Request side of a running scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Request>,
}

impl SchedulerHandle {
    /// Asks for an immediate write without waiting for it. Returns false when the scheduler
    /// has already stopped.
    pub fn flush(&self) -> bool {
        self.tx.send(Request::Flush).is_ok()
    }

    /// Asks for the final write and collector shutdown and waits until both are done.
    /// Returns immediately when the scheduler has already stopped.
    pub async fn stop(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Request::Stop(ack_tx)).is_err() {
            debug!("stop requested after scheduler stopped");
            return;
        }
        if ack_rx.await.is_err() {
            debug!("scheduler stopped before acknowledging");
        }
    }
}

pub struct Scheduler {
    cascade: Cascade,
    collectors: CollectorSet,
    writer: ReportWriter,
    config: SchedulerConfig,
    stats: Arc<SchedulerStats>,
    state: SchedulerState,
    ticks: u32,
}

impl Scheduler {
    pub fn new(
        cascade: Cascade,
        collectors: CollectorSet,
        writer: ReportWriter,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            cascade,
            collectors,
            writer,
            config,
            stats: Arc::new(SchedulerStats::default()),
            state: SchedulerState::Running,
            ticks: 0,
        }
    }

    pub fn stats(&self) -> Arc<SchedulerStats> {
        self.stats.clone()
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn cascade(&self) -> &Cascade {
        &self.cascade
    }

    /// Sample-timer event: sample every collector into the cascade; every `flush_period`
    /// ticks also write the report and reset the counter.
    pub fn on_tick(&mut self) {
        let timestamp = chrono::Utc::now().timestamp();
        let sample = self.collectors.sample(timestamp);
        self.cascade.add(sample);
        self.stats.samples_total.fetch_add(1, Ordering::Relaxed);

        self.ticks += 1;
        if self.ticks >= self.config.flush_period {
            self.write();
            self.ticks = 0;
        }
    }

    /// Flush-request event: write now; the tick counter is left alone.
    pub fn on_flush(&mut self) {
        self.stats.flush_requests_total.fetch_add(1, Ordering::Relaxed);
        info!("manual flush");
        self.write();
    }

    /// Stop-request event: final write, enter Stopped, stop every collector.
    pub fn on_stop(&mut self) {
        if self.state == SchedulerState::Stopped {
            return;
        }
        self.write();
        self.state = SchedulerState::Stopped;
        self.collectors.stop_all();
        info!(
            samples_total = self.stats.samples_total.load(Ordering::Relaxed),
            reports_written_total = self.stats.reports_written_total.load(Ordering::Relaxed),
            "scheduler stopped"
        );
    }

    fn write(&mut self) {
        let report = self.cascade.snapshot();
        match self.writer.write(&report) {
            Ok(_) => {
                self.stats
                    .reports_written_total
                    .fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats
                    .report_failures_total
                    .fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, operation = "write_report", "report write failed");
            }
        }
        debug!(
            samples_total = self.stats.samples_total.load(Ordering::Relaxed),
            reports_written_total = self.stats.reports_written_total.load(Ordering::Relaxed),
            report_failures_total = self.stats.report_failures_total.load(Ordering::Relaxed),
            "scheduler stats"
        );
    }

    /// Runs the scheduler on its own task. The first sample is taken one interval after spawn.
    pub fn spawn(self) -> (SchedulerHandle, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(self.run(rx));
        (SchedulerHandle { tx }, handle)
    }

    #[instrument(
        skip_all,
        fields(
            sample_interval_secs = self.config.sample_interval.as_secs_f64(),
            flush_period = self.config.flush_period
        )
    )]
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Request>) {
        let period = self.config.sample_interval;
        let mut tick = interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!("scheduler started");

        loop {
            tokio::select! {
                _ = tick.tick() => self.on_tick(),
                request = rx.recv() => match request {
                    Some(Request::Flush) => self.on_flush(),
                    Some(Request::Stop(ack)) => {
                        self.on_stop();
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        debug!("all scheduler handles dropped");
                        self.on_stop();
                        break;
                    }
                },
            }
        }
    }
}
