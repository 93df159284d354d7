use anyhow::Result;
use clap::Parser;
use monitoring_agent::cascade::Cascade;
use monitoring_agent::cli::Cli;
use monitoring_agent::collector::{
    CgroupCollector, Collector, CollectorSet, GpuCollector, HostCollector, NullCollector,
};
use monitoring_agent::config::AppConfig;
use monitoring_agent::report_writer::{ReportWriter, resolve_output_path};
use monitoring_agent::scheduler::{Scheduler, SchedulerHandle};
use monitoring_agent::version;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();
    tracing::info!("{}", version::banner());

    let mut app_config = match &cli.config {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    app_config.apply_cli(&cli)?;

    let cascade_config = app_config.cascade_config();
    cascade_config.validate()?;

    let cwd = std::env::current_dir()?;
    let output_path = resolve_output_path(&app_config.output_path(&cli.job_name), &cwd);
    tracing::info!(path = %output_path.display(), "report destination");

    let mut collectors = build_collectors(&app_config);
    collectors.start_all();
    if collectors.available() == 0 {
        tracing::warn!("no collector available; samples will be all zero");
    }
    let spec = collectors.spec();
    tracing::info!(
        mem_total = spec.mem_total,
        devices = spec.devices.len(),
        "resource spec"
    );

    let cascade = Cascade::new(&cascade_config, spec)?;
    let scheduler = Scheduler::new(
        cascade,
        collectors,
        ReportWriter::new(output_path),
        app_config.scheduler_config(),
    );
    let (handle, worker_handle) = scheduler.spawn();

    wait_for_shutdown(&handle).await;
    tracing::info!("Received shutdown signal");
    handle.stop().await;
    if let Err(e) = worker_handle.await {
        tracing::warn!(error = %e, "scheduler task join failed");
    }
    Ok(())
}

/// cgroup accounting when the process runs in one, host-wide figures otherwise.
fn build_collectors(app_config: &AppConfig) -> CollectorSet {
    let refresh = app_config.refresh_interval();
    let mut collectors: Vec<Box<dyn Collector>> = Vec::new();

    match CgroupCollector::detect(&app_config.collectors.cgroup_root, refresh) {
        Some(cgroup) => collectors.push(Box::new(cgroup)),
        None => {
            tracing::info!(
                root = %app_config.collectors.cgroup_root.display(),
                "no cgroup accounting found, using host-wide CPU and memory"
            );
            collectors.push(Box::new(HostCollector::new(refresh)));
        }
    }

    if app_config.collectors.gpu {
        collectors.push(Box::new(GpuCollector::new(refresh)));
    } else {
        collectors.push(Box::new(NullCollector));
    }

    CollectorSet::new(collectors)
}

/// Serves SIGHUP as a flush request and returns on the first terminating signal.
async fn wait_for_shutdown(handle: &SchedulerHandle) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let signals = (|| {
            Ok::<_, std::io::Error>((
                signal(SignalKind::hangup())?,
                signal(SignalKind::terminate())?,
                signal(SignalKind::interrupt())?,
                signal(SignalKind::quit())?,
            ))
        })();
        let (mut hangup, mut terminate, mut interrupt, mut quit) = match signals {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "signal handlers unavailable, waiting for ctrl-c");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        loop {
            tokio::select! {
                _ = hangup.recv() => {
                    tracing::info!("SIGHUP: flushing report");
                    if !handle.flush() {
                        return;
                    }
                }
                _ = terminate.recv() => return,
                _ = interrupt.recv() => return,
                _ = quit.recv() => return,
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = handle;
        let _ = tokio::signal::ctrl_c().await;
    }
}
