//! Miner configuration
//!
//! Defaults, an optional TOML file, then command-line overrides, in that
//! order. [`MinerConfig::validate`] runs once before any device is opened.

use crate::cli::Args;
use crate::error::ConfigError;
use crate::job::{ITERATIONS_PER_SLOT, SLOTS_PER_WORK};
use crate::worker::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Which accelerator implementation backs the device sessions
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Host threads running the coarse filter
    #[default]
    Cpu,
    /// GPUs through OpenCL (requires the `opencl` feature)
    Opencl,
}

/// Threads per dispatched batch and their sub-group size
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchShape {
    /// Result slots per batch
    pub global: usize,
    /// Work-group size on the device
    pub local: usize,
}

impl BatchShape {
    pub const OPENCL_DEFAULT: BatchShape = BatchShape {
        global: 409_600,
        local: 128,
    };

    pub const CPU_DEFAULT: BatchShape = BatchShape { global: 256, local: 64 };

    /// Default shape for a backend
    pub fn for_backend(backend: BackendKind) -> Self {
        match backend {
            BackendKind::Cpu => Self::CPU_DEFAULT,
            BackendKind::Opencl => Self::OPENCL_DEFAULT,
        }
    }

    /// Slots advanced per batch
    pub fn slots(&self) -> u32 {
        self.global as u32
    }

    /// Nonces tried per batch
    pub fn hashes(&self) -> u64 {
        self.global as u64 * ITERATIONS_PER_SLOT as u64
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.global == 0 || self.local == 0 {
            return Err(ConfigError::Batch("sizes must be non-zero".to_string()));
        }
        if self.global % self.local != 0 {
            return Err(ConfigError::Batch(format!(
                "global size {} is not a multiple of local size {}",
                self.global, self.local
            )));
        }
        if self.global > SLOTS_PER_WORK as usize {
            return Err(ConfigError::Batch(format!(
                "global size {} exceeds the {} slots of a work unit",
                self.global, SLOTS_PER_WORK
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    /// Work source endpoint
    pub url: String,
    /// `user:password` for basic auth
    pub userpass: String,
    /// Consecutive fetch failures tolerated; negative means unlimited
    pub retries: i32,
    pub retry_cooldown_secs: u64,
    pub protocol_dump: bool,
    pub debug: bool,
    pub backend: BackendKind,
    /// Number of CPU accelerator devices
    pub cpu_devices: usize,
    /// Host threads per CPU accelerator device
    pub cpu_lanes: usize,
    /// OpenCL search kernel source. None ships with the miner; see
    /// `device::opencl` for the entry point it must provide.
    pub kernel_path: PathBuf,
    pub start_stagger_ms: u64,
    pub hashmeter_interval_secs: u64,
    /// Overrides the backend's default batch shape
    pub batch: Option<BatchShape>,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8332/".to_string(),
            userpass: "rpcuser:rpcpass".to_string(),
            retries: 10,
            retry_cooldown_secs: 30,
            protocol_dump: false,
            debug: false,
            backend: BackendKind::Cpu,
            cpu_devices: 1,
            cpu_lanes: num_cpus::get(),
            kernel_path: PathBuf::from("kernels/search.cl"),
            start_stagger_ms: 1000,
            hashmeter_interval_secs: 1,
            batch: None,
        }
    }
}

impl MinerConfig {
    /// Load configuration from file if it exists, otherwise use defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(MinerConfig::default())
        }
    }

    /// Override config with CLI arguments
    pub fn apply_cli_overrides(&mut self, args: &Args) {
        if args.debug {
            self.debug = true;
        }

        if args.protocol_dump {
            self.protocol_dump = true;
        }

        if let Some(retries) = args.retries {
            self.retries = retries;
        }

        if let Some(url) = &args.url {
            self.url = url.clone();
        }

        if let Some(userpass) = &args.userpass {
            self.userpass = userpass.clone();
        }

        if let Some(backend) = args.backend {
            self.backend = backend;
        }

        if let Some(devices) = args.devices {
            self.cpu_devices = devices;
        }

        if let Some(lanes) = args.lanes {
            self.cpu_lanes = lanes;
        }

        if let Some(kernel) = &args.kernel {
            self.kernel_path = kernel.clone();
        }

        if args.threads.is_some() || args.local_size.is_some() {
            let mut shape = self.batch_shape();
            shape.global = args.threads.unwrap_or(shape.global);
            shape.local = args.local_size.unwrap_or(shape.local);
            self.batch = Some(shape);
        }
    }

    /// Checks every setting a device thread relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(-1..=9999).contains(&self.retries) {
            return Err(ConfigError::Retries(self.retries));
        }

        let url = Url::parse(&self.url).map_err(|e| ConfigError::Url {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Url {
                url: self.url.clone(),
                reason: "must start with http:// or https://".to_string(),
            });
        }

        if !self.userpass.contains(':') {
            return Err(ConfigError::UserPass);
        }

        self.batch_shape().validate()
    }

    /// Checks that the OpenCL backend has a kernel to build
    pub fn validate_kernel(&self) -> Result<(), ConfigError> {
        if self.backend == BackendKind::Opencl && !self.kernel_path.is_file() {
            return Err(ConfigError::Kernel(self.kernel_path.clone()));
        }
        Ok(())
    }

    /// Batch shape in effect for the configured backend
    pub fn batch_shape(&self) -> BatchShape {
        self.batch.unwrap_or_else(|| BatchShape::for_backend(self.backend))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_bound(self.retries, Duration::from_secs(self.retry_cooldown_secs))
    }

    pub fn start_stagger(&self) -> Duration {
        Duration::from_millis(self.start_stagger_ms)
    }

    pub fn hashmeter_interval(&self) -> Duration {
        Duration::from_secs(self.hashmeter_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = MinerConfig::default();
        assert_eq!(config.url, "http://127.0.0.1:8332/");
        assert_eq!(config.retries, 10);
        assert_eq!(config.retry_cooldown_secs, 30);
        assert_eq!(config.batch_shape(), BatchShape::CPU_DEFAULT);
        assert!(config.cpu_lanes > 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backend_default_shapes() {
        let config = MinerConfig {
            backend: BackendKind::Opencl,
            ..MinerConfig::default()
        };
        assert_eq!(config.batch_shape(), BatchShape { global: 409_600, local: 128 });
        assert_eq!(config.batch_shape().hashes(), 409_600 * 1024);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = MinerConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.userpass, "rpcuser:rpcpass");
    }

    #[test]
    fn test_load_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "url = \"https://pool.example:8332/\"\nretries = -1\nbackend = \"opencl\"\n\n[batch]\nglobal = 1024\nlocal = 256"
        )
        .unwrap();

        let config = MinerConfig::load(file.path()).unwrap();
        assert_eq!(config.url, "https://pool.example:8332/");
        assert_eq!(config.retries, -1);
        assert_eq!(config.backend, BackendKind::Opencl);
        assert_eq!(config.batch_shape(), BatchShape { global: 1024, local: 256 });
        assert_eq!(config.retry_cooldown_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "retries = \"many\"").unwrap();
        assert!(matches!(MinerConfig::load(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let bad_retries = MinerConfig {
            retries: 10_000,
            ..MinerConfig::default()
        };
        assert!(matches!(bad_retries.validate(), Err(ConfigError::Retries(10_000))));

        let bad_scheme = MinerConfig {
            url: "ftp://127.0.0.1/".to_string(),
            ..MinerConfig::default()
        };
        assert!(matches!(bad_scheme.validate(), Err(ConfigError::Url { .. })));

        let bad_userpass = MinerConfig {
            userpass: "nocolon".to_string(),
            ..MinerConfig::default()
        };
        assert!(matches!(bad_userpass.validate(), Err(ConfigError::UserPass)));
    }

    #[test]
    fn test_opencl_requires_kernel_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MinerConfig {
            backend: BackendKind::Opencl,
            kernel_path: dir.path().join("search.cl"),
            ..MinerConfig::default()
        };
        assert!(matches!(config.validate_kernel(), Err(ConfigError::Kernel(_))));

        std::fs::write(&config.kernel_path, "__kernel void search() {}").unwrap();
        assert!(config.validate_kernel().is_ok());

        config.backend = BackendKind::Cpu;
        config.kernel_path = dir.path().join("absent.cl");
        assert!(config.validate_kernel().is_ok());
    }

    #[test]
    fn test_batch_shape_validation() {
        assert!(BatchShape { global: 0, local: 64 }.validate().is_err());
        assert!(BatchShape { global: 100, local: 64 }.validate().is_err());
        assert!(BatchShape { global: SLOTS_PER_WORK as usize * 2, local: 64 }.validate().is_err());
        assert!(BatchShape::OPENCL_DEFAULT.validate().is_ok());
    }

    #[test]
    fn test_cli_overrides() {
        let args = Args::parse_from([
            "miner", "-D", "-P", "-r", "-1", "--url", "http://10.0.0.2:8332/", "--threads", "512",
        ]);
        let mut config = MinerConfig::default();
        config.apply_cli_overrides(&args);

        assert!(config.debug);
        assert!(config.protocol_dump);
        assert_eq!(config.retries, -1);
        assert_eq!(config.url, "http://10.0.0.2:8332/");
        assert_eq!(config.batch_shape(), BatchShape { global: 512, local: 64 });
        assert_eq!(config.retry_policy().limit, None);
    }
}
