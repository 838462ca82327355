//! Error types for the mining crate

use thiserror::Error;

/// Failure reported by a device session. Always fatal for the owning
/// dispatch loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("device initialisation failed: {0}")]
    Init(String),

    #[error("writing search context failed: {0}")]
    Write(String),

    #[error("enqueueing search failed: {0}")]
    Enqueue(String),

    #[error("reading results failed: {0}")]
    Read(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Why a dispatch loop stopped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("getwork failed {attempts} times in a row")]
    RetriesExhausted { attempts: u32 },
}

/// Invalid miner configuration, reported at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("retries must be between -1 and 9999, got {0}")]
    Retries(i32),

    #[error("invalid work source URL '{url}': {reason}")]
    Url { url: String, reason: String },

    #[error("userpass must have the form USERNAME:PASSWORD")]
    UserPass,

    #[error("invalid batch shape: {0}")]
    Batch(String),

    #[error("OpenCL kernel source not found at {0}")]
    Kernel(std::path::PathBuf),
}
