//! Host-thread accelerator
//!
//! Each device is a background thread fed through a channel. A batch is
//! split across `lanes` scoped threads, every slot running the coarse
//! zero-top-word filter over its 1024 nonces.

use super::{Backend, DeviceSession};
use crate::config::{BackendKind, BatchShape};
use crate::error::DeviceError;
use crate::job::slot_nonces;
use crypto_hashes::{has_zero_top_word, BlockContext};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

/// Hands out [`CpuAccelerator`] sessions
#[derive(Clone, Debug)]
pub struct CpuBackend {
    devices: usize,
    lanes: usize,
}

impl CpuBackend {
    pub fn new(devices: usize, lanes: usize) -> Self {
        Self {
            devices,
            lanes: lanes.max(1),
        }
    }
}

impl Backend for CpuBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cpu
    }

    fn device_count(&self) -> usize {
        self.devices
    }

    fn open(&self, index: usize) -> Result<Box<dyn DeviceSession>, DeviceError> {
        if index >= self.devices {
            return Err(DeviceError::Init(format!(
                "no CPU device {} ({} configured)",
                index, self.devices
            )));
        }
        Ok(Box::new(CpuAccelerator::spawn(index, self.lanes)?))
    }
}

struct SearchJob {
    context: BlockContext,
    global: usize,
}

/// A CPU device session backed by its own search thread
pub struct CpuAccelerator {
    name: String,
    context: Option<BlockContext>,
    job_tx: Option<Sender<SearchJob>>,
    result_rx: Receiver<Vec<u32>>,
    /// Batches enqueued but not yet read back
    pending: usize,
    handle: Option<JoinHandle<()>>,
}

impl CpuAccelerator {
    /// Starts the search thread for device `index`
    pub fn spawn(index: usize, lanes: usize) -> Result<Self, DeviceError> {
        let (job_tx, job_rx) = mpsc::channel::<SearchJob>();
        let (result_tx, result_rx) = mpsc::channel();
        let lanes = lanes.max(1);

        let handle = thread::Builder::new()
            .name(format!("cpu-accel-{}", index))
            .spawn(move || {
                for job in job_rx {
                    let flags = search_batch(&job.context, job.global, lanes);
                    if result_tx.send(flags).is_err() {
                        break;
                    }
                }
            })
            .map_err(|e| DeviceError::Init(format!("failed to spawn search thread: {}", e)))?;

        Ok(Self {
            name: format!("CPU accelerator {} ({} lanes)", index, lanes),
            context: None,
            job_tx: Some(job_tx),
            result_rx,
            pending: 0,
            handle: Some(handle),
        })
    }
}

impl DeviceSession for CpuAccelerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_context(&mut self, context: &BlockContext) -> Result<(), DeviceError> {
        self.context = Some(*context);
        Ok(())
    }

    fn enqueue_search(&mut self, batch: &BatchShape) -> Result<(), DeviceError> {
        let context = self
            .context
            .ok_or_else(|| DeviceError::Enqueue("no context written".to_string()))?;
        let job_tx = self
            .job_tx
            .as_ref()
            .ok_or_else(|| DeviceError::Enqueue("search thread stopped".to_string()))?;

        job_tx
            .send(SearchJob {
                context,
                global: batch.global,
            })
            .map_err(|_| DeviceError::Enqueue("search thread stopped".to_string()))?;
        self.pending += 1;
        Ok(())
    }

    fn read_results(&mut self, output: &mut [u32]) -> Result<(), DeviceError> {
        if self.pending == 0 {
            return Err(DeviceError::Read("no batch enqueued".to_string()));
        }
        let flags = self
            .result_rx
            .recv()
            .map_err(|_| DeviceError::Read("search thread stopped".to_string()))?;
        self.pending -= 1;

        if flags.len() != output.len() {
            return Err(DeviceError::Read(format!(
                "batch produced {} slots, buffer holds {}",
                flags.len(),
                output.len()
            )));
        }
        output.copy_from_slice(&flags);
        Ok(())
    }
}

impl Drop for CpuAccelerator {
    fn drop(&mut self) {
        // closing the channel ends the search thread
        self.job_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("{} search thread panicked", self.name);
            }
        }
    }
}

/// Flags every slot of a batch whose nonce range yields a zero top word.
/// Slot `j` covers absolute slot `context.nonce + j`.
pub fn search_batch(context: &BlockContext, global: usize, lanes: usize) -> Vec<u32> {
    let mut flags = vec![0u32; global];
    if global == 0 {
        return flags;
    }
    let chunk = global.div_ceil(lanes.max(1));

    thread::scope(|scope| {
        for (lane, out) in flags.chunks_mut(chunk).enumerate() {
            scope.spawn(move || {
                let first = context.nonce + (lane * chunk) as u32;
                for (offset, flag) in out.iter_mut().enumerate() {
                    let nonces = slot_nonces(first + offset as u32);
                    *flag = u32::from(has_zero_top_word(context, nonces));
                }
            });
        }
    });

    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::SLOT_SHIFT;
    use crate::tests::fixtures::{genesis_context, GENESIS_NONCE};

    #[test]
    fn test_search_batch_flags_genesis_slot() {
        let mut context = genesis_context();
        context.nonce = (GENESIS_NONCE >> SLOT_SHIFT) - 2;

        let flags = search_batch(&context, 4, 3);
        assert_eq!(flags, vec![0, 0, 1, 0]);
    }

    #[test]
    fn test_accelerator_round_trip() {
        let mut context = genesis_context();
        context.nonce = (GENESIS_NONCE >> SLOT_SHIFT) - 1;
        let batch = BatchShape { global: 2, local: 1 };

        let mut device = CpuAccelerator::spawn(0, 2).unwrap();
        assert!(device.name().contains("CPU accelerator 0"));
        device.write_context(&context).unwrap();
        device.enqueue_search(&batch).unwrap();

        let mut output = [7u32; 2];
        device.read_results(&mut output).unwrap();
        assert_eq!(output, [0, 1]);
    }

    #[test]
    fn test_enqueue_without_context_fails() {
        let mut device = CpuAccelerator::spawn(0, 1).unwrap();
        let batch = BatchShape { global: 1, local: 1 };
        assert!(matches!(device.enqueue_search(&batch), Err(DeviceError::Enqueue(_))));
        assert!(matches!(device.read_results(&mut [0]), Err(DeviceError::Read(_))));
    }

    #[test]
    fn test_mismatched_buffer_is_read_error() {
        let mut device = CpuAccelerator::spawn(0, 1).unwrap();
        device.write_context(&BlockContext::default()).unwrap();
        device.enqueue_search(&BatchShape { global: 2, local: 1 }).unwrap();
        assert!(matches!(device.read_results(&mut [0; 3]), Err(DeviceError::Read(_))));
    }

    #[test]
    fn test_backend_bounds() {
        let backend = CpuBackend::new(2, 0);
        assert_eq!(backend.device_count(), 2);
        assert!(backend.open(1).is_ok());
        assert!(matches!(backend.open(2), Err(DeviceError::Init(_))));
    }
}
