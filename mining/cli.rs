use crate::config::BackendKind;
use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "miner")]
#[command(about = "Double-buffered getwork miner", long_about = None)]
pub struct Args {
    /// Print the number of detected devices and exit with it as status
    #[arg(short = 'n', long)]
    pub ndevs: bool,

    /// Enable debug output
    #[arg(short = 'D', long)]
    pub debug: bool,

    /// Log every JSON request and response
    #[arg(short = 'P', long)]
    pub protocol_dump: bool,

    /// Consecutive getwork failures before a device gives up (-1 = unlimited)
    #[arg(short = 'r', long, allow_negative_numbers = true)]
    pub retries: Option<i32>,

    /// Work source URL
    #[arg(long)]
    pub url: Option<String>,

    /// Work source credentials, USERNAME:PASSWORD
    #[arg(long)]
    pub userpass: Option<String>,

    /// Path to configuration file (optional, uses defaults if not provided)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Accelerator backend
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Number of CPU accelerator devices
    #[arg(long)]
    pub devices: Option<usize>,

    /// Host threads per CPU accelerator device
    #[arg(long)]
    pub lanes: Option<usize>,

    /// Result slots per batch (global work size)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Work-group size
    #[arg(long)]
    pub local_size: Option<usize>,

    /// OpenCL search kernel source
    #[arg(long)]
    pub kernel: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides --debug
    #[arg(short, long)]
    pub log_level: Option<LevelFilter>,
}

impl Args {
    /// Effective log filter
    pub fn log_filter(&self, debug: bool) -> LevelFilter {
        self.log_level.unwrap_or(if debug { LevelFilter::Debug } else { LevelFilter::Info })
    }
}

pub fn parse_args() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_flags() {
        let args = Args::parse_from(["miner", "-n", "-D", "-P", "-r", "3"]);
        assert!(args.ndevs && args.debug && args.protocol_dump);
        assert_eq!(args.retries, Some(3));
    }

    #[test]
    fn test_log_filter_precedence() {
        let args = Args::parse_from(["miner"]);
        assert_eq!(args.log_filter(false), LevelFilter::Info);
        assert_eq!(args.log_filter(true), LevelFilter::Debug);

        let args = Args::parse_from(["miner", "--log-level", "warn"]);
        assert_eq!(args.log_filter(true), LevelFilter::Warn);
    }

    #[test]
    fn test_backend_value() {
        let args = Args::parse_from(["miner", "--backend", "opencl", "--local-size", "256"]);
        assert_eq!(args.backend, Some(BackendKind::Opencl));
        assert_eq!(args.local_size, Some(256));
        assert!(Args::try_parse_from(["miner", "--backend", "fpga"]).is_err());
    }
}
