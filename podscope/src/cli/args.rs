//! CLI argument definitions

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::analysis::Format;
use crate::session::Mode;

#[derive(Parser, Debug)]
#[command(
    name = "podscope",
    version,
    about = "Kernel-level latency and error diagnostics for a single container",
    after_help = "\
EXAMPLES:
    sudo podscope containerd://3f4e5d6c7b8a                Live report every 5s
    sudo podscope -n prod 3f4e5d6c7b8a --diagnose 30s      One report after 30s
    sudo podscope --cgroup /kubepods.slice/pod1 anything   Explicit cgroup scope"
)]
pub struct Args {
    /// Workload to trace (container ID, optionally `<runtime>://<id>`)
    #[arg(value_name = "TARGET")]
    pub target: String,

    /// Namespace of the workload
    #[arg(short, long, default_value = "default")]
    pub namespace: String,

    /// Collect for this long, print one report and exit (e.g. 10s, 5m)
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub diagnose: Option<Duration>,

    /// Live report refresh period
    #[arg(long, value_name = "DURATION", default_value = "5s", value_parser = parse_interval)]
    pub interval: Duration,

    /// Trace this cgroup instead of resolving TARGET
    #[arg(long, value_name = "PATH")]
    pub cgroup: Option<PathBuf>,

    /// Kernel program object to load (searched before the default locations)
    #[arg(long, value_name = "PATH")]
    pub object: Option<PathBuf>,

    /// Report rendering
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl From<OutputFormat> for Format {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Text => Format::Text,
            OutputFormat::Json => Format::Json,
        }
    }
}

/// A refresh period must be positive
fn parse_interval(value: &str) -> Result<Duration, String> {
    let interval = humantime::parse_duration(value).map_err(|e| e.to_string())?;
    if interval.is_zero() {
        return Err("interval must be greater than zero".to_string());
    }
    Ok(interval)
}

impl Args {
    #[must_use]
    pub fn mode(&self) -> Mode {
        match self.diagnose {
            Some(duration) => Mode::Batch { duration },
            None => Mode::Live { interval: self.interval },
        }
    }
}
