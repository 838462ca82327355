//! Proof-of-Work verification on the host side
//!
//! Devices only flag result slots that may contain a solution. This module
//! recovers the exact best candidate from the flagged slots of a batch and
//! decides whether it meets the work unit's target.

use crate::job::slot_nonces;
use crypto_hashes::{scan_range, BlockContext, Candidate};
use primitive_types::U256;
use std::fmt;
use std::ops::RangeInclusive;

/// Target threshold as delivered by the work source (little-endian, 32 bytes)
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct Target([u8; 32]);

impl Target {
    /// Byte offset of the 32-bit comparison word.
    pub const COMPARISON_OFFSET: usize = 24;

    /// Creates a Target from its wire bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Target(bytes)
    }

    /// Creates a Target whose only non-zero bytes form `word`
    pub fn from_comparison_word(word: u32) -> Self {
        let mut bytes = [0u8; 32];
        bytes[Self::COMPARISON_OFFSET..Self::COMPARISON_OFFSET + 4].copy_from_slice(&word.to_le_bytes());
        Target(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The 32-bit quantity candidates are compared against
    pub fn comparison_word(&self) -> u32 {
        let at = Self::COMPARISON_OFFSET;
        u32::from_le_bytes([self.0[at], self.0[at + 1], self.0[at + 2], self.0[at + 3]])
    }

    /// Returns whether a candidate value meets the target
    pub fn is_met_by(&self, value: u32) -> bool {
        value <= self.comparison_word()
    }

    /// Returns the full 256-bit threshold
    pub fn as_u256(&self) -> U256 {
        U256::from_little_endian(&self.0)
    }

    /// Full-width comparison of a digest against the whole target
    pub fn is_met_by_digest(&self, digest: &[u8; 32]) -> bool {
        U256::from_little_endian(digest) <= self.as_u256()
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Target({:08x})", self.comparison_word())
    }
}

/// Exact re-verification of one nonce range
pub trait NonceScanner {
    /// Returns the best candidate among `nonces`, if any passes the filter
    fn scan(&self, context: &BlockContext, nonces: RangeInclusive<u32>) -> Option<Candidate>;
}

/// Recomputes every digest in the range with SHA-256d
#[derive(Clone, Copy, Debug, Default)]
pub struct ExactScanner;

impl NonceScanner for ExactScanner {
    fn scan(&self, context: &BlockContext, nonces: RangeInclusive<u32>) -> Option<Candidate> {
        scan_range(context, nonces)
    }
}

/// Proof-of-Work handler
pub struct ProofOfWork;

impl ProofOfWork {
    /// Finds the best candidate of a read-back batch
    ///
    /// # Arguments
    /// * `context` - Device context of the batch's work unit
    /// * `flags` - Coarse match flags, one per result slot
    /// * `base` - Absolute slot of `flags[0]`
    /// * `scanner` - Exact post-processing of a flagged slot
    ///
    /// # Returns
    /// The numerically lowest candidate across all flagged slots
    pub fn best_of_batch<S: NonceScanner + ?Sized>(
        context: &BlockContext,
        flags: &[u32],
        base: u32,
        scanner: &S,
    ) -> Option<Candidate> {
        let mut best: Option<Candidate> = None;

        for (offset, _) in flags.iter().enumerate().filter(|(_, flag)| **flag != 0) {
            let nonces = slot_nonces(base + offset as u32);
            let Some(found) = scanner.scan(context, nonces.clone()) else {
                continue;
            };

            log::debug!(
                "H0 within {:08x} .. {:08x}, best G = {:08x}, nonce = {:08x}",
                nonces.start(),
                nonces.end(),
                found.value,
                found.nonce
            );

            if best.map_or(true, |current| found.value < current.value) {
                log::debug!("new best");
                best = Some(found);
            }
        }

        best
    }

    /// Calculates the hash rate (hashes per second)
    ///
    /// # Arguments
    /// * `hashes` - Number of hashes performed
    /// * `seconds` - Time taken in seconds
    ///
    /// # Returns
    /// Hash rate in hashes per second
    pub fn calculate_hash_rate(hashes: u64, seconds: f64) -> f64 {
        if seconds <= 0.0 {
            return 0.0;
        }
        hashes as f64 / seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Returns a fixed candidate for selected slot ranges.
    struct ScriptedScanner(HashMap<u32, Candidate>);

    impl NonceScanner for ScriptedScanner {
        fn scan(&self, _: &BlockContext, nonces: RangeInclusive<u32>) -> Option<Candidate> {
            self.0.get(nonces.start()).copied()
        }
    }

    fn candidate(value: u32, nonce: u32) -> Candidate {
        Candidate { value, nonce }
    }

    #[test]
    fn test_comparison_word_reads_bytes_24_to_28() {
        let mut bytes = [0xffu8; 32];
        bytes[24..28].copy_from_slice(&[0xff, 0xff, 0x00, 0x00]);
        let target = Target::from_bytes(bytes);
        assert_eq!(target.comparison_word(), 0x0000_ffff);
        assert_eq!(Target::from_comparison_word(0x1234_5678).comparison_word(), 0x1234_5678);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let target = Target::from_comparison_word(0x0000_ffff);
        assert!(target.is_met_by(0x0000_ff10));
        assert!(target.is_met_by(0x0000_ffff));
        assert!(!target.is_met_by(0x0001_0000));
    }

    #[test]
    fn test_full_width_comparison() {
        let target = Target::from_comparison_word(0x0000_ffff);
        let mut digest = [0u8; 32];
        digest[24..28].copy_from_slice(&0x0000_ff10u32.to_le_bytes());
        assert!(target.is_met_by_digest(&digest));

        digest[31] = 1;
        assert!(!target.is_met_by_digest(&digest));
        assert_eq!(target.as_u256(), U256::from(0xffffu64) << 192);
    }

    #[test]
    fn test_best_of_batch_picks_lowest() {
        let base = 100;
        let scanner = ScriptedScanner(HashMap::from([
            (slot_nonces(base + 1).into_inner().0, candidate(0x300, 11)),
            (slot_nonces(base + 4).into_inner().0, candidate(0x100, 44)),
            (slot_nonces(base + 6).into_inner().0, candidate(0x200, 66)),
        ]));
        let mut flags = vec![0u32; 8];
        for slot in [1, 4, 6] {
            flags[slot] = 1;
        }

        let best = ProofOfWork::best_of_batch(&BlockContext::default(), &flags, base, &scanner);
        assert_eq!(best, Some(candidate(0x100, 44)));
    }

    #[test]
    fn test_best_of_batch_ignores_unflagged_and_empty_slots() {
        let scanner = ScriptedScanner(HashMap::from([
            (slot_nonces(0).into_inner().0, candidate(0x1, 1)),
            (slot_nonces(2).into_inner().0, candidate(0x9, 2)),
        ]));
        // slot 0 would be better but is not flagged; slot 1 is flagged but
        // yields nothing
        let flags = [0, 1, 1, 0];

        let best = ProofOfWork::best_of_batch(&BlockContext::default(), &flags, 0, &scanner);
        assert_eq!(best, Some(candidate(0x9, 2)));
        assert_eq!(
            ProofOfWork::best_of_batch(&BlockContext::default(), &[0, 0], 0, &scanner),
            None
        );
    }

    #[test]
    fn test_hash_rate_calculation() {
        let rate = ProofOfWork::calculate_hash_rate(1_000_000, 1.0);
        assert!(rate > 900_000.0 && rate < 1_100_000.0);
        assert_eq!(ProofOfWork::calculate_hash_rate(1_000_000, 0.0), 0.0);
    }
}
