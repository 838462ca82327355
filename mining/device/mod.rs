//! Compute device sessions
//!
//! A [`DeviceSession`] is the only way the dispatch loop talks to hardware:
//! write the search context, start a batch, read its flags back. Every
//! failure it reports is fatal for the owning loop.

pub mod cpu;
#[cfg(feature = "opencl")]
pub mod opencl;

pub use cpu::{CpuAccelerator, CpuBackend};
#[cfg(feature = "opencl")]
pub use opencl::{OpenClAccelerator, OpenClBackend};

use crate::config::{BackendKind, BatchShape, MinerConfig};
use crate::error::DeviceError;
use crypto_hashes::BlockContext;

/// One bound compute device
pub trait DeviceSession: Send {
    /// Human readable device name
    fn name(&self) -> &str;

    /// Copies the search context to the device, blocking until done.
    fn write_context(&mut self, context: &BlockContext) -> Result<(), DeviceError>;

    /// Starts a batch of `batch.global` slots from the written context and
    /// returns without waiting for it.
    fn enqueue_search(&mut self, batch: &BatchShape) -> Result<(), DeviceError>;

    /// Blocks until the last enqueued batch completes and copies its flags
    /// into `output`, one per slot.
    fn read_results(&mut self, output: &mut [u32]) -> Result<(), DeviceError>;
}

impl<D: DeviceSession + ?Sized> DeviceSession for Box<D> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn write_context(&mut self, context: &BlockContext) -> Result<(), DeviceError> {
        (**self).write_context(context)
    }

    fn enqueue_search(&mut self, batch: &BatchShape) -> Result<(), DeviceError> {
        (**self).enqueue_search(batch)
    }

    fn read_results(&mut self, output: &mut [u32]) -> Result<(), DeviceError> {
        (**self).read_results(output)
    }
}

/// Enumerates devices of one kind and binds sessions to them
pub trait Backend {
    fn kind(&self) -> BackendKind;

    /// Number of devices available
    fn device_count(&self) -> usize;

    /// Binds device `index`, compiling whatever the device needs
    fn open(&self, index: usize) -> Result<Box<dyn DeviceSession>, DeviceError>;
}

/// Creates the backend selected by the configuration
pub fn backend_for(config: &MinerConfig) -> Result<Box<dyn Backend>, DeviceError> {
    match config.backend {
        BackendKind::Cpu => Ok(Box::new(CpuBackend::new(config.cpu_devices, config.cpu_lanes))),
        #[cfg(feature = "opencl")]
        BackendKind::Opencl => Ok(Box::new(OpenClBackend::new(config.kernel_path.clone()))),
        #[cfg(not(feature = "opencl"))]
        BackendKind::Opencl => Err(DeviceError::Unavailable(
            "built without the `opencl` feature".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_backend_from_config() {
        let config = MinerConfig {
            cpu_devices: 3,
            ..MinerConfig::default()
        };
        let backend = backend_for(&config).unwrap();
        assert_eq!(backend.kind(), BackendKind::Cpu);
        assert_eq!(backend.device_count(), 3);
    }

    #[cfg(not(feature = "opencl"))]
    #[test]
    fn test_opencl_unavailable_without_feature() {
        let config = MinerConfig {
            backend: BackendKind::Opencl,
            ..MinerConfig::default()
        };
        assert!(matches!(backend_for(&config), Err(DeviceError::Unavailable(_))));
    }
}
