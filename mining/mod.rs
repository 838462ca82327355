//! Mining module for getwork proof-of-work search
//!
//! This module implements a double-buffered miner: one dispatch loop per
//! compute device fetches work from a getwork service, keeps one batch in
//! flight on the device while inspecting the previous one on the host, and
//! submits any nonce whose digest meets the work's target.
//!
//! ## Module Organization
//!
//! - [`job`]: Work units and nonce-space geometry
//! - [`pow`]: Target comparison and best-of-batch selection
//! - [`frame`]: The dispatch/harvest frame pair
//! - [`epoch`]: Process-wide solution epoch
//! - [`device`]: Device sessions and backends (CPU, OpenCL)
//! - [`worker`]: The per-device dispatch loop
//! - [`telemetry`]: Hash rate gauges and the hash meter line
//! - [`manager`]: Starts device threads and supervises them
//! - [`config`] / [`cli`]: Configuration file and command line

pub mod cli;
pub mod config;
pub mod device;
pub mod epoch;
pub mod error;
pub mod frame;
pub mod job;
pub mod manager;
pub mod pow;
pub mod telemetry;
pub mod worker;


// Re-export main types for easier access
pub use config::{BackendKind, BatchShape, MinerConfig};
pub use device::{backend_for, Backend, DeviceSession};
pub use epoch::Epoch;
pub use error::{ConfigError, DeviceError, DispatchError};
pub use frame::{Frame, FramePair};
pub use job::{WorkUnit, ITERATIONS_PER_SLOT, NONCE_OFFSET, SLOTS_PER_WORK};
pub use manager::MiningManager;
pub use pow::{ExactScanner, NonceScanner, ProofOfWork, Target};
pub use telemetry::{HashMeter, RateTable};
pub use worker::{DeviceWorker, RetryPolicy, Step};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{BackendKind, BatchShape, MinerConfig};
    pub use crate::device::{backend_for, Backend, DeviceSession};
    pub use crate::epoch::Epoch;
    pub use crate::job::WorkUnit;
    pub use crate::manager::MiningManager;
    pub use crate::pow::{ProofOfWork, Target};
    pub use crate::telemetry::{HashMeter, RateTable};
    pub use crate::worker::{DeviceWorker, RetryPolicy};
}
