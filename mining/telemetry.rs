//! Per-device hash rate gauges
//!
//! Each dispatch loop owns one slot of the [`RateTable`] and is its only
//! writer. The supervisor reads every slot periodically to render the
//! hash meter line; reads may see a value one interval old.

use crate::pow::ProofOfWork;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Hash rates in hashes per second, stored as `f64` bits
#[derive(Debug)]
pub struct RateTable {
    slots: Vec<AtomicU64>,
}

impl RateTable {
    /// Creates a table with one zeroed slot per device
    pub fn new(devices: usize) -> Self {
        Self {
            slots: (0..devices).map(|_| AtomicU64::new(0f64.to_bits())).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Publishes the rate of `hashes` computed over `elapsed` for a device
    pub fn record(&self, device: usize, hashes: u64, elapsed: Duration) {
        self.set(device, ProofOfWork::calculate_hash_rate(hashes, elapsed.as_secs_f64()));
    }

    /// Overwrites a device's rate. Out-of-range devices are ignored.
    pub fn set(&self, device: usize, rate: f64) {
        if let Some(slot) = self.slots.get(device) {
            slot.store(rate.to_bits(), Ordering::Relaxed);
        }
    }

    pub fn get(&self, device: usize) -> f64 {
        self.slots
            .get(device)
            .map_or(0.0, |slot| f64::from_bits(slot.load(Ordering::Relaxed)))
    }

    /// Reads every slot
    pub fn snapshot(&self) -> Vec<f64> {
        (0..self.slots.len()).map(|device| self.get(device)).collect()
    }
}

/// A snapshot of all device rates ready for display
#[derive(Clone, Debug, Default)]
pub struct HashMeter {
    /// Per-device rates in hashes per second
    pub rates: Vec<f64>,
}

impl HashMeter {
    pub fn from_table(table: &RateTable) -> Self {
        Self {
            rates: table.snapshot(),
        }
    }

    /// Aggregate rate in hashes per second
    pub fn total(&self) -> f64 {
        // an empty f64 sum is -0.0
        self.rates.iter().fold(0.0, |acc, rate| acc + rate)
    }

    /// Formats the meter as a single console line
    pub fn format_line(&self) -> String {
        let per_device: Vec<String> = self
            .rates
            .iter()
            .map(|rate| format!("{:.2}", rate / 1_000_000.0))
            .collect();
        format!(
            "HashMeter: {:.2} Mhash/sec ({})",
            self.total() / 1_000_000.0,
            per_device.join(" ")
        )
    }
}
