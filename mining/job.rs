//! Work unit definitions and nonce-space bookkeeping
//!
//! A [`WorkUnit`] is one fetched getwork template together with the device
//! context derived from it and the per-frame search state the dispatch loop
//! mutates while the unit stays live.

use crate::pow::Target;
use crypto_hashes::{le_words, BlockContext};
use rpc_core::model::{WorkTemplate, DATA_LEN, HASH1_LEN, MIDSTATE_LEN};
use std::ops::RangeInclusive;
use std::time::Instant;

/// log2 of [`ITERATIONS_PER_SLOT`].
pub const SLOT_SHIFT: u32 = 10;

/// Consecutive nonces covered by one result slot.
pub const ITERATIONS_PER_SLOT: u32 = 1 << SLOT_SHIFT;

/// Result slots needed to cover the whole 32-bit nonce space.
pub const SLOTS_PER_WORK: u32 = ((u32::MAX as u64 + 1) >> SLOT_SHIFT) as u32;

/// Byte offset of the nonce within the header data.
pub const NONCE_OFFSET: usize = 76;

/// Nonces covered by absolute slot `slot`.
pub fn slot_nonces(slot: u32) -> RangeInclusive<u32> {
    let start = slot << SLOT_SHIFT;
    start..=start + (ITERATIONS_PER_SLOT - 1)
}

/// A batch whose flags are waiting for host inspection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadyBatch {
    /// Absolute slot of result index 0.
    pub base: u32,
    /// Number of valid result slots.
    pub count: usize,
}

/// One getwork template being searched on a single device
#[derive(Clone, Debug)]
pub struct WorkUnit {
    /// Header template, padding included
    pub data: [u8; DATA_LEN],
    /// Second-pass padding buffer, carried but unused by the search
    pub hash1: [u8; HASH1_LEN],
    /// Midstate bytes as delivered
    pub midstate: [u8; MIDSTATE_LEN],
    /// Threshold a digest must meet
    pub target: Target,
    /// Device context; only `context.nonce` changes after creation
    pub context: BlockContext,
    /// Next slot to dispatch
    pub nonce_cursor: u32,
    /// Coarse match flags of the last read-back batch
    pub results: Vec<u32>,
    /// Valid result slots pending inspection, 0 when none
    pub ready: usize,
    /// Slot base of the ready batch
    pub result_base: u32,
    /// Epoch observed before this unit was fetched
    pub epoch: u64,
    /// Identifier for log correlation
    pub work_id: u64,
    fetched_at: Instant,
}

impl WorkUnit {
    /// Builds a unit from a decoded template and derives its device context.
    ///
    /// # Arguments
    /// * `template` - The decoded getwork response
    /// * `epoch` - Epoch value read before the fetch was issued
    pub fn new(template: WorkTemplate, epoch: u64) -> Self {
        let context = BlockContext::precalc(
            &le_words::<8>(&template.midstate),
            &le_words::<3>(&template.data[64..NONCE_OFFSET]),
        );

        Self {
            data: template.data,
            hash1: template.hash1,
            midstate: template.midstate,
            target: Target::from_bytes(template.target),
            context,
            nonce_cursor: 0,
            results: Vec::new(),
            ready: 0,
            result_base: 0,
            epoch,
            work_id: generate_work_id(),
            fetched_at: Instant::now(),
        }
    }

    /// Returns whether the epoch moved on since this unit was fetched
    pub fn is_stale(&self, epoch: u64) -> bool {
        self.epoch != epoch
    }

    /// Returns whether another batch of `batch_slots` would run past the
    /// end of the nonce space
    pub fn is_exhausted(&self, batch_slots: u32) -> bool {
        self.nonce_cursor as u64 + batch_slots as u64 > SLOTS_PER_WORK as u64
    }

    /// Slots not yet dispatched
    pub fn remaining_slots(&self) -> u32 {
        SLOTS_PER_WORK.saturating_sub(self.nonce_cursor)
    }

    /// Points the device context at the current cursor and returns it
    pub fn prepare_dispatch(&mut self) -> &BlockContext {
        self.context.nonce = self.nonce_cursor;
        &self.context
    }

    /// Result buffer sized for a batch of `len` slots
    pub fn result_buffer(&mut self, len: usize) -> &mut [u32] {
        self.results.resize(len, 0);
        &mut self.results
    }

    /// Records that `count` result slots based at the cursor were read back,
    /// then advances the cursor past them.
    pub fn complete_batch(&mut self, count: usize) {
        self.ready = count;
        self.result_base = self.nonce_cursor;
        self.nonce_cursor += count as u32;
    }

    /// Takes the ready batch, if any, clearing the ready flag
    pub fn take_ready(&mut self) -> Option<ReadyBatch> {
        if self.ready == 0 {
            return None;
        }
        let batch = ReadyBatch {
            base: self.result_base,
            count: self.ready.min(self.results.len()),
        };
        self.ready = 0;
        Some(batch)
    }

    /// Header with `nonce` written at [`NONCE_OFFSET`], lowest byte first
    pub fn solved_header(&self, nonce: u32) -> [u8; DATA_LEN] {
        let mut header = self.data;
        header[NONCE_OFFSET..NONCE_OFFSET + 4].copy_from_slice(&nonce.to_le_bytes());
        header
    }

    /// Gets the age of the unit in milliseconds
    pub fn age_ms(&self) -> u64 {
        self.fetched_at.elapsed().as_millis() as u64
    }
}

/// Generates a unique work ID
fn generate_work_id() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_template() -> WorkTemplate {
        WorkTemplate {
            data: std::array::from_fn(|i| i as u8),
            hash1: [0x11; HASH1_LEN],
            midstate: [0x22; MIDSTATE_LEN],
            target: [0xff; 32],
        }
    }

    #[test]
    fn test_slot_geometry() {
        assert_eq!(ITERATIONS_PER_SLOT, 1024);
        assert_eq!(SLOTS_PER_WORK, 4_194_304);
        assert_eq!(slot_nonces(0), 0..=1023);
        assert_eq!(slot_nonces(3), 3072..=4095);
        assert_eq!(slot_nonces(SLOTS_PER_WORK - 1), 0xffff_fc00..=u32::MAX);
    }

    #[test]
    fn test_work_unit_creation() {
        let unit = WorkUnit::new(create_test_template(), 7);

        assert_eq!(unit.nonce_cursor, 0);
        assert_eq!(unit.ready, 0);
        assert_eq!(unit.epoch, 7);
        assert_eq!(unit.hash1, [0x11; HASH1_LEN]);
        assert_eq!(unit.context.state, [0x2222_2222; 8]);
        assert_eq!(unit.context.merkle, u32::from_le_bytes([64, 65, 66, 67]));
        assert_eq!(unit.context.nbits, u32::from_le_bytes([72, 73, 74, 75]));
        assert!(unit.age_ms() < 1000);
    }

    #[test]
    fn test_work_ids_are_unique() {
        let a = WorkUnit::new(create_test_template(), 0);
        let b = WorkUnit::new(create_test_template(), 0);
        assert_ne!(a.work_id, b.work_id);
    }

    #[test]
    fn test_staleness_follows_epoch() {
        let unit = WorkUnit::new(create_test_template(), 3);
        assert!(!unit.is_stale(3));
        assert!(unit.is_stale(4));
    }

    #[test]
    fn test_solved_header_patches_nonce_only() {
        let unit = WorkUnit::new(create_test_template(), 0);
        let header = unit.solved_header(0x1dac2b7c);

        assert_eq!(header[76..80], [0x7c, 0x2b, 0xac, 0x1d]);
        assert_eq!(header[..76], unit.data[..76]);
        assert_eq!(header[80..], unit.data[80..]);
    }

    #[test]
    fn test_batch_bookkeeping() {
        let mut unit = WorkUnit::new(create_test_template(), 0);
        assert_eq!(unit.take_ready(), None);

        assert_eq!(unit.prepare_dispatch().nonce, 0);
        unit.result_buffer(16).fill(0);
        unit.complete_batch(16);
        assert_eq!(unit.nonce_cursor, 16);
        assert_eq!(unit.prepare_dispatch().nonce, 16);

        assert_eq!(unit.take_ready(), Some(ReadyBatch { base: 0, count: 16 }));
        assert_eq!(unit.take_ready(), None);
    }

    #[test]
    fn test_exhaustion_boundary() {
        let mut unit = WorkUnit::new(create_test_template(), 0);
        unit.nonce_cursor = SLOTS_PER_WORK - 256;
        assert!(!unit.is_exhausted(256));
        assert!(unit.is_exhausted(257));
        assert_eq!(unit.remaining_slots(), 256);

        unit.nonce_cursor = SLOTS_PER_WORK;
        assert!(unit.is_exhausted(1));
        assert_eq!(unit.remaining_slots(), 0);
    }
}
