//! OpenCL accelerator
//!
//! Binds one GPU, builds the search kernel from source at runtime and keeps
//! two buffers: the context input and the per-slot flag output.
//!
//! No kernel is bundled. The source at `kernel_path` must define
//!
//! ```text
//! __kernel void search(__global const uint *context, __global uint *output)
//! ```
//!
//! where `context` holds the 28 words of [`BlockContext::to_words`]:
//! midstate (0..8), state after three rounds of the second chunk (8..16),
//! merkle tail, time, bits, nonce base, W16, W17, the partial W18, W19, W31
//! and W32, the partial T1 and T2 of round 3 (16..28). Work item `gid`
//! covers slot `context[19] + gid`, i.e. the 1024 nonces starting at
//! `(context[19] + gid) << 10`, and writes `output[gid] = 1` when any of
//! them yields a double SHA-256 digest whose last word is zero, else 0.

use super::{Backend, DeviceSession};
use crate::config::{BackendKind, BatchShape};
use crate::error::DeviceError;
use crypto_hashes::BlockContext;
use log::{debug, error, info};
use opencl3::{
    command_queue::CommandQueue,
    context::Context,
    device::{get_all_devices, Device, CL_DEVICE_TYPE_GPU},
    kernel::{ExecuteKernel, Kernel},
    memory::{Buffer, CL_MEM_READ_ONLY, CL_MEM_WRITE_ONLY},
    program::Program,
    types::{cl_uint, CL_TRUE},
};
use std::fs;
use std::path::PathBuf;
use std::ptr;

const KERNEL_NAME: &str = "search";

/// Enumerates GPUs and builds sessions from a kernel source file
#[derive(Clone, Debug)]
pub struct OpenClBackend {
    kernel_path: PathBuf,
}

impl OpenClBackend {
    pub fn new(kernel_path: PathBuf) -> Self {
        Self { kernel_path }
    }
}

impl Backend for OpenClBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Opencl
    }

    fn device_count(&self) -> usize {
        get_all_devices(CL_DEVICE_TYPE_GPU).map_or(0, |ids| ids.len())
    }

    fn open(&self, index: usize) -> Result<Box<dyn DeviceSession>, DeviceError> {
        let source = fs::read_to_string(&self.kernel_path).map_err(|e| {
            DeviceError::Init(format!("cannot read kernel {}: {}", self.kernel_path.display(), e))
        })?;
        Ok(Box::new(OpenClAccelerator::bind(index, &source)?))
    }
}

/// A GPU device session
pub struct OpenClAccelerator {
    name: String,
    context: Context,
    queue: CommandQueue,
    kernel: Kernel,
    input: Buffer<cl_uint>,
    output: Option<Buffer<cl_uint>>,
    output_len: usize,
}

impl OpenClAccelerator {
    /// Binds GPU `index` and builds `source` for it
    pub fn bind(index: usize, source: &str) -> Result<Self, DeviceError> {
        let init = |what: &str, e: String| DeviceError::Init(format!("{}: {}", what, e));

        let ids = get_all_devices(CL_DEVICE_TYPE_GPU).map_err(|e| init("enumerating GPUs", e.to_string()))?;
        let id = *ids
            .get(index)
            .ok_or_else(|| DeviceError::Init(format!("no GPU {} ({} found)", index, ids.len())))?;
        let device = Device::new(id);
        let name = device.name().map_err(|e| init("reading device name", e.to_string()))?;
        debug!("Creating OpenCL session for device {}: {}", index, name);

        let context = Context::from_device(&device).map_err(|e| init("creating context", e.to_string()))?;

        let mut program =
            Program::create_from_source(&context, source).map_err(|e| init("creating program", e.to_string()))?;
        if let Err(e) = program.build(context.devices(), "") {
            for device_id in context.devices() {
                if let Ok(log) = program.get_build_log(*device_id) {
                    error!("Build log for {}: {}", name, log);
                }
            }
            return Err(init("building program", e.to_string()));
        }

        let kernel = Kernel::create(&program, KERNEL_NAME).map_err(|e| init("creating kernel", e.to_string()))?;
        let queue =
            CommandQueue::create_default(&context, 0).map_err(|e| init("creating command queue", e.to_string()))?;

        let input = unsafe {
            Buffer::<cl_uint>::create(&context, CL_MEM_READ_ONLY, BlockContext::WORDS, ptr::null_mut())
                .map_err(|e| init("creating context buffer", e.to_string()))?
        };

        info!("OpenCL kernel built for {}", name);

        Ok(Self {
            name,
            context,
            queue,
            kernel,
            input,
            output: None,
            output_len: 0,
        })
    }

    fn output_buffer(&mut self, len: usize) -> Result<&Buffer<cl_uint>, DeviceError> {
        if self.output.is_none() || self.output_len != len {
            let buffer = unsafe {
                Buffer::<cl_uint>::create(&self.context, CL_MEM_WRITE_ONLY, len, ptr::null_mut())
                    .map_err(|e| DeviceError::Enqueue(format!("creating result buffer: {}", e)))?
            };
            self.output = Some(buffer);
            self.output_len = len;
        }
        self.output
            .as_ref()
            .ok_or_else(|| DeviceError::Enqueue("result buffer missing".to_string()))
    }
}

impl DeviceSession for OpenClAccelerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_context(&mut self, context: &BlockContext) -> Result<(), DeviceError> {
        let words = context.to_words();
        unsafe {
            self.queue
                .enqueue_write_buffer(&mut self.input, CL_TRUE, 0, &words, &[])
                .map_err(|e| DeviceError::Write(e.to_string()))?;
        }
        Ok(())
    }

    fn enqueue_search(&mut self, batch: &BatchShape) -> Result<(), DeviceError> {
        self.output_buffer(batch.global)?;
        let output = self
            .output
            .as_ref()
            .ok_or_else(|| DeviceError::Enqueue("result buffer missing".to_string()))?;

        unsafe {
            ExecuteKernel::new(&self.kernel)
                .set_arg(&self.input)
                .set_arg(output)
                .set_global_work_size(batch.global)
                .set_local_work_size(batch.local)
                .enqueue_nd_range(&self.queue)
                .map_err(|e| DeviceError::Enqueue(e.to_string()))?;
        }
        self.queue.flush().map_err(|e| DeviceError::Enqueue(e.to_string()))?;
        Ok(())
    }

    fn read_results(&mut self, output: &mut [u32]) -> Result<(), DeviceError> {
        let buffer = self
            .output
            .as_ref()
            .ok_or_else(|| DeviceError::Read("no batch enqueued".to_string()))?;
        if output.len() != self.output_len {
            return Err(DeviceError::Read(format!(
                "device holds {} slots, buffer holds {}",
                self.output_len,
                output.len()
            )));
        }
        unsafe {
            self.queue
                .enqueue_read_buffer(buffer, CL_TRUE, 0, output, &[])
                .map_err(|e| DeviceError::Read(e.to_string()))?;
        }
        Ok(())
    }
}
