//! Per-device dispatch loop
//!
//! A [`DeviceWorker`] owns one device session and two work unit frames.
//! Each iteration dispatches a batch from the dispatch frame and, while the
//! device computes, inspects the previous batch of the harvest frame. The
//! loop only stops on a device failure or when fetching work keeps failing.

use crate::config::BatchShape;
use crate::device::DeviceSession;
use crate::epoch::Epoch;
use crate::error::DispatchError;
use crate::frame::{Frame, FramePair};
use crate::job::WorkUnit;
use crate::pow::{ExactScanner, NonceScanner, ProofOfWork};
use crate::telemetry::RateTable;
use crypto_hashes::{Candidate, Hash};
use log::{debug, error, info, warn};
use rpc_core::WorkApi;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// How fetch failures are tolerated
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failures tolerated before giving up; `None` retries forever
    pub limit: Option<u32>,
    /// Pause between attempts
    pub cooldown: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

    /// Builds a policy from a signed bound where negative means unlimited
    pub fn from_bound(retries: i32, cooldown: Duration) -> Self {
        Self {
            limit: u32::try_from(retries).ok(),
            cooldown,
        }
    }

    /// Returns whether `failures` consecutive failures end the loop
    pub fn is_exhausted(&self, failures: u32) -> bool {
        self.limit.map_or(false, |limit| failures > limit)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_bound(10, Self::DEFAULT_COOLDOWN)
    }
}

/// What one call to [`DeviceWorker::step`] did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// A batch based at `base` was dispatched and read back
    Dispatched {
        base: u32,
        /// A candidate from the previous batch met its target
        submitted: bool,
    },
    /// Fetching work failed and the loop slept before retrying
    Retrying { failures: u32 },
}

/// Dispatch loop state for a single device
pub struct DeviceWorker<W, D, S = ExactScanner> {
    /// Index of the device, also its rate table slot
    pub id: usize,
    source: W,
    device: D,
    scanner: S,
    epoch: Arc<Epoch>,
    rates: Arc<RateTable>,
    batch: BatchShape,
    retry: RetryPolicy,
    frames: FramePair<Option<WorkUnit>>,
    /// Set after a submission or exhaustion to force a fetch
    need_work: bool,
    failures: u32,
    last_dispatch: Option<Instant>,
    hashes_done: u64,
}

impl<W: WorkApi, D: DeviceSession> DeviceWorker<W, D, ExactScanner> {
    /// Creates a worker verifying candidates with SHA-256d
    pub fn new(
        id: usize,
        source: W,
        device: D,
        epoch: Arc<Epoch>,
        rates: Arc<RateTable>,
        batch: BatchShape,
        retry: RetryPolicy,
    ) -> Self {
        Self::with_scanner(id, source, device, ExactScanner, epoch, rates, batch, retry)
    }
}

impl<W: WorkApi, D: DeviceSession, S: NonceScanner> DeviceWorker<W, D, S> {
    /// Creates a worker with a custom post-processing scanner
    #[allow(clippy::too_many_arguments)]
    pub fn with_scanner(
        id: usize,
        source: W,
        device: D,
        scanner: S,
        epoch: Arc<Epoch>,
        rates: Arc<RateTable>,
        batch: BatchShape,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            id,
            source,
            device,
            scanner,
            epoch,
            rates,
            batch,
            retry,
            frames: FramePair::default(),
            need_work: true,
            failures: 0,
            last_dispatch: None,
            hashes_done: 0,
        }
    }

    /// Runs the loop until it fails (blocking, should be run in a thread)
    pub fn run(&mut self) -> Result<(), DispatchError> {
        info!("Device {} dispatch loop started", self.id);
        loop {
            if let Err(err) = self.step() {
                self.rates.set(self.id, 0.0);
                error!("Device {} stopped: {}", self.id, err);
                return Err(err);
            }
        }
    }

    /// Returns whether the dispatch frame needs a fresh unit
    pub fn needs_work(&self) -> bool {
        self.need_work
            || match &self.frames[self.frames.dispatch()] {
                Some(unit) => unit.is_stale(self.epoch.current()),
                None => true,
            }
    }

    /// Consecutive fetch failures so far
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// The unit in a frame, if loaded
    pub fn unit(&self, frame: Frame) -> Option<&WorkUnit> {
        self.frames[frame].as_ref()
    }

    pub fn frames(&self) -> (Frame, Frame) {
        (self.frames.dispatch(), self.frames.harvest())
    }

    /// Runs one iteration of the loop
    pub fn step(&mut self) -> Result<Step, DispatchError> {
        if self.needs_work() {
            if let Some(failures) = self.fetch()? {
                return Ok(Step::Retrying { failures });
            }
        }

        self.publish_rate();

        let dispatch = self.frames.dispatch();
        let Some(unit) = self.frames[dispatch].as_mut() else {
            self.need_work = true;
            return Ok(Step::Retrying { failures: self.failures });
        };
        let base = unit.nonce_cursor;
        self.device.write_context(unit.prepare_dispatch())?;
        self.device.enqueue_search(&self.batch)?;
        self.hashes_done = self.batch.hashes();

        // the device is busy with the new batch; inspect the previous one
        let submitted = self.harvest();

        let Some(unit) = self.frames[dispatch].as_mut() else {
            self.need_work = true;
            return Ok(Step::Retrying { failures: self.failures });
        };
        self.device.read_results(unit.result_buffer(self.batch.global))?;
        unit.complete_batch(self.batch.global);
        if unit.is_exhausted(self.batch.slots()) {
            debug!(
                "Device {} exhausted work {} after {} ms ({} slots left)",
                self.id,
                unit.work_id,
                unit.age_ms(),
                unit.remaining_slots()
            );
            self.need_work = true;
        }
        self.frames.promote();

        self.failures = 0;
        Ok(Step::Dispatched { base, submitted })
    }

    /// Fetches a unit into the other frame. Returns the failure count when
    /// the fetch failed and the loop should retry.
    fn fetch(&mut self) -> Result<Option<u32>, DispatchError> {
        debug!("Device {} getwork", self.id);
        let observed = self.epoch.current();

        match self.source.get_work() {
            Ok(template) => {
                let frame = self.frames.rotate();
                let unit = WorkUnit::new(template, observed);
                debug!("Device {} loaded work {} into {:?}", self.id, unit.work_id, frame);
                self.frames[frame] = Some(unit);
                self.need_work = false;
                self.failures = 0;
                Ok(None)
            }
            Err(err) => {
                self.failures += 1;
                warn!("Device {} getwork failed: {}", self.id, err);
                if self.retry.is_exhausted(self.failures) {
                    error!(
                        "Device {} terminating thread after {} failed getwork attempts",
                        self.id, self.failures
                    );
                    return Err(DispatchError::RetriesExhausted {
                        attempts: self.failures,
                    });
                }
                warn!("Device {} retry after {} seconds", self.id, self.retry.cooldown.as_secs());
                thread::sleep(self.retry.cooldown);
                Ok(Some(self.failures))
            }
        }
    }

    /// Publishes the rate of the previous iteration
    fn publish_rate(&mut self) {
        let now = Instant::now();
        if let Some(started) = self.last_dispatch {
            if self.hashes_done > 0 {
                self.rates.record(self.id, self.hashes_done, now - started);
            }
        }
        self.last_dispatch = Some(now);
    }

    /// Inspects the harvest frame's ready batch and submits its best
    /// candidate when it meets the target. Returns whether it submitted.
    fn harvest(&mut self) -> bool {
        let frame = self.frames.harvest();
        let Some(ready) = self.frames[frame].as_mut().and_then(|unit| unit.take_ready()) else {
            return false;
        };
        let Some(unit) = self.frames[frame].as_ref() else {
            return false;
        };

        let flags = &unit.results[..ready.count];
        let Some(best) = ProofOfWork::best_of_batch(&unit.context, flags, ready.base, &self.scanner) else {
            return false;
        };
        if !unit.target.is_met_by(best.value) {
            return false;
        }

        info!(
            "Found solution for {:08x}: {:08x} {:08x}",
            unit.target.comparison_word(),
            best.value,
            best.nonce
        );
        self.audit(unit, best);
        self.submit(unit, best.nonce);

        let epoch = self.epoch.advance();
        debug!("Device {} advanced epoch to {}", self.id, epoch);
        self.need_work = true;
        true
    }

    /// Cross-checks the narrowed comparison against the full 256-bit target
    fn audit(&self, unit: &WorkUnit, best: Candidate) {
        let digest = unit.context.digest(best.nonce);
        debug!("Device {} block hash {}", self.id, Hash::from(digest));
        if !unit.target.is_met_by_digest(&digest) {
            warn!(
                "Device {} nonce {:08x} passes the 32-bit check but not the full target: {}",
                self.id,
                best.nonce,
                Hash::from(digest)
            );
        }
    }

    fn submit(&self, unit: &WorkUnit, nonce: u32) {
        info!("PROOF OF WORK FOUND?  submitting...");
        match self.source.submit_work(&unit.solved_header(nonce)) {
            Ok(accepted) => info!(
                "PROOF OF WORK RESULT: {}",
                if accepted { "true (yay!!!)" } else { "false (booooo)" }
            ),
            Err(err) => warn!("Device {} submit failed: {}", self.id, err),
        }
    }
}
