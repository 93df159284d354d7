// Command-line surface. Flags left unset fall back to the config file, then to defaults.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone, Default, Parser)]
#[command(
    version,
    about = "Samples CPU, memory and GPU usage into a multi-resolution JSON report"
)]
pub struct Cli {
    /// Enable debug logging (RUST_LOG still takes precedence)
    #[arg(long)]
    pub debug: bool,

    /// TOML config file (defaults to $CONFIG_FILE, then built-in defaults)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Path of the flushed report
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Seconds between samples
    #[arg(long = "update-interval")]
    pub update_interval: Option<u64>,

    /// Number of samples between report flushes
    #[arg(long = "flush-period")]
    pub flush_period: Option<u32>,

    /// Max data points in the lifetime (5 min) dataset
    #[arg(long = "lifetime-max")]
    pub lifetime_max: Option<usize>,

    /// Skip accelerator detection
    #[arg(long = "no-gpu")]
    pub no_gpu: bool,

    /// Job identifier used to derive the default report path
    #[arg(long = "job-name", env = "PHJOB_NAME", default_value = "job-test")]
    pub job_name: String,
}
