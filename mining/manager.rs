//! Mining manager that starts device threads and renders the hash meter
//!
//! This module binds every device of a backend, starts one dispatch loop
//! thread per device with a stagger between them, and periodically logs
//! the aggregate hash rate until every device thread has stopped.

use crate::config::MinerConfig;
use crate::device::Backend;
use crate::epoch::Epoch;
use crate::error::{DeviceError, DispatchError};
use crate::telemetry::{HashMeter, RateTable};
use crate::worker::DeviceWorker;
use log::{error, info};
use rpc_core::WorkApi;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Manages the device threads of one miner process
pub struct MiningManager {
    config: MinerConfig,
    /// Solution epoch shared by all device threads
    epoch: Arc<Epoch>,
    /// Per-device hash rates
    rates: Arc<RateTable>,
    /// Device thread handles
    device_threads: Vec<JoinHandle<Result<(), DispatchError>>>,
    /// Start time of mining session
    session_start: Instant,
}

impl MiningManager {
    /// Creates a new mining manager
    pub fn new(config: MinerConfig) -> Self {
        Self {
            config,
            epoch: Arc::new(Epoch::new()),
            rates: Arc::new(RateTable::new(0)),
            device_threads: Vec::new(),
            session_start: Instant::now(),
        }
    }

    /// Binds every device of `backend` and starts its dispatch loop
    ///
    /// A device that fails to bind is logged and skipped; its rate slot
    /// stays at zero. Startup only fails when no device could be started.
    ///
    /// # Returns
    /// The number of device threads started
    pub fn start<W>(&mut self, backend: &dyn Backend, source: W) -> Result<usize, DeviceError>
    where
        W: WorkApi + Clone + 'static,
    {
        let count = backend.device_count();
        if count == 0 {
            return Err(DeviceError::Unavailable(format!("no {:?} devices found", backend.kind())));
        }

        self.rates = Arc::new(RateTable::new(count));
        let batch = self.config.batch_shape();
        let retry = self.config.retry_policy();
        let mut last_error = None;

        for id in 0..count {
            info!("Init device {}", id);
            let session = match backend.open(id) {
                Ok(session) => session,
                Err(e) => {
                    error!("Device {} init failed, skipping: {}", id, e);
                    last_error = Some(e);
                    continue;
                }
            };
            info!("found {}", session.name());

            let mut worker = DeviceWorker::new(
                id,
                source.clone(),
                session,
                Arc::clone(&self.epoch),
                Arc::clone(&self.rates),
                batch,
                retry,
            );
            let spawned = thread::Builder::new()
                .name(format!("device-{}", id))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => self.device_threads.push(handle),
                Err(e) => {
                    let e = DeviceError::Init(format!("failed to spawn device thread: {}", e));
                    error!("Device {} not started: {}", id, e);
                    last_error = Some(e);
                    continue;
                }
            }

            if id + 1 < count {
                thread::sleep(self.config.start_stagger());
            }
        }

        let started = self.device_threads.len();
        if started == 0 {
            return Err(last_error
                .unwrap_or_else(|| DeviceError::Unavailable("no device could be started".to_string())));
        }

        self.session_start = Instant::now();
        info!("{} miner threads started", started);
        Ok(started)
    }

    /// Current hash meter snapshot
    pub fn hash_meter(&self) -> HashMeter {
        HashMeter::from_table(&self.rates)
    }

    /// Number of device threads still running
    pub fn active_devices(&self) -> usize {
        self.device_threads.iter().filter(|handle| !handle.is_finished()).count()
    }

    /// Logs the hash meter every interval until all device threads stop,
    /// then reaps them
    pub fn supervise(&mut self) {
        let interval = self.config.hashmeter_interval();
        while self.active_devices() > 0 {
            thread::sleep(interval);
            info!("{}", self.hash_meter().format_line());
        }
        self.join_all();
        info!(
            "All device threads stopped after {}s",
            self.session_start.elapsed().as_secs()
        );
    }

    fn join_all(&mut self) {
        for (id, handle) in self.device_threads.drain(..).enumerate() {
            match handle.join() {
                Ok(Ok(())) => info!("Device {} stopped", id),
                Ok(Err(e)) => error!("Device {} failed: {}", id, e),
                Err(e) => error!("Device {} thread panicked: {:?}", id, e),
            }
        }
    }

    pub fn epoch(&self) -> Arc<Epoch> {
        Arc::clone(&self.epoch)
    }

    pub fn rates(&self) -> Arc<RateTable> {
        Arc::clone(&self.rates)
    }

    /// Returns the number of started device threads
    pub fn device_count(&self) -> usize {
        self.device_threads.len()
    }
}
