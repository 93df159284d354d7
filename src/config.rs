use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cascade::{CascadeConfig, DEFAULT_LIFETIME_CAPACITY};
use crate::cli::Cli;
use crate::collector::DEFAULT_CGROUP_ROOT;
use crate::report_writer::default_output_path;
use crate::scheduler::{DEFAULT_FLUSH_PERIOD, SchedulerConfig};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub collectors: CollectorsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_sample_interval_secs")]
    pub sample_interval_secs: u64,
    /// Write the report every this many samples.
    #[serde(default = "default_flush_period")]
    pub flush_period: u32,
    /// Slots in the long-horizon (5 min) level.
    #[serde(default = "default_lifetime_capacity")]
    pub lifetime_capacity: usize,
}

fn default_sample_interval_secs() -> u64 {
    10
}

fn default_flush_period() -> u32 {
    DEFAULT_FLUSH_PERIOD
}

fn default_lifetime_capacity() -> usize {
    DEFAULT_LIFETIME_CAPACITY
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: default_sample_interval_secs(),
            flush_period: default_flush_period(),
            lifetime_capacity: default_lifetime_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Explicit report path; when unset the path is derived from the job name.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_artifacts_root")]
    pub artifacts_root: PathBuf,
}

fn default_artifacts_root() -> PathBuf {
    PathBuf::from("/phfs/jobArtifacts")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: None,
            artifacts_root: default_artifacts_root(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorsConfig {
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_gpu")]
    pub gpu: bool,
    #[serde(default = "default_cgroup_root")]
    pub cgroup_root: PathBuf,
}

fn default_refresh_interval_secs() -> u64 {
    5
}

fn default_gpu() -> bool {
    true
}

fn default_cgroup_root() -> PathBuf {
    PathBuf::from(DEFAULT_CGROUP_ROOT)
}

impl Default for CollectorsConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
            gpu: default_gpu(),
            cgroup_root: default_cgroup_root(),
        }
    }
}

impl AppConfig {
    /// Loads from `CONFIG_FILE` when set, otherwise returns the defaults.
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var("CONFIG_FILE") {
            Ok(path) => Self::load_from_path(Path::new(&path)),
            Err(_) => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("config {}: {}", path.display(), e))?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Command-line flags take precedence over file values.
    pub fn apply_cli(&mut self, cli: &Cli) -> anyhow::Result<()> {
        if let Some(secs) = cli.update_interval {
            self.monitoring.sample_interval_secs = secs;
        }
        if let Some(period) = cli.flush_period {
            self.monitoring.flush_period = period;
        }
        if let Some(capacity) = cli.lifetime_max {
            self.monitoring.lifetime_capacity = capacity;
        }
        if let Some(path) = &cli.path {
            self.output.path = Some(path.clone());
        }
        if cli.no_gpu {
            self.collectors.gpu = false;
        }
        self.validate()
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.monitoring.sample_interval_secs > 0,
            "monitoring.sample_interval_secs must be > 0, got {}",
            self.monitoring.sample_interval_secs
        );
        anyhow::ensure!(
            self.monitoring.flush_period > 0,
            "monitoring.flush_period must be > 0, got {}",
            self.monitoring.flush_period
        );
        anyhow::ensure!(
            self.monitoring.lifetime_capacity > 0,
            "monitoring.lifetime_capacity must be > 0, got {}",
            self.monitoring.lifetime_capacity
        );
        anyhow::ensure!(
            self.collectors.refresh_interval_secs > 0,
            "collectors.refresh_interval_secs must be > 0, got {}",
            self.collectors.refresh_interval_secs
        );
        anyhow::ensure!(
            !self.collectors.cgroup_root.as_os_str().is_empty(),
            "collectors.cgroup_root must be non-empty"
        );
        if let Some(path) = &self.output.path {
            anyhow::ensure!(
                !path.as_os_str().is_empty(),
                "output.path must be non-empty when set"
            );
        }
        Ok(())
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.monitoring.sample_interval_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.collectors.refresh_interval_secs)
    }

    pub fn cascade_config(&self) -> CascadeConfig {
        CascadeConfig::with_lifetime_capacity(self.monitoring.lifetime_capacity)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            sample_interval: self.sample_interval(),
            flush_period: self.monitoring.flush_period,
        }
    }

    /// Explicit `output.path`, or the job's default location under `output.artifacts_root`.
    pub fn output_path(&self, job_name: &str) -> PathBuf {
        self.output
            .path
            .clone()
            .unwrap_or_else(|| default_output_path(&self.output.artifacts_root, job_name))
    }
}
