//! Flush policy of the sample queue.
//!
//! While a measurement is running, saved samples wait in the queue until the
//! [`FlushPolicy`] fires. A flush moves the queued records into data blocks
//! on disk, so long MDF 4 recordings keep a bounded amount of memory. MDF 3
//! has a single data section per data group and keeps its records until
//! finalize.
//!
//! ```
//! use mdf_engine::writer::{FlushPolicy, WriterConfig};
//!
//! let config = WriterConfig {
//!     flush_policy: FlushPolicy::EveryNRecords(1000),
//!     ..Default::default()
//! };
//! assert!(config.flush_policy.is_auto());
//! ```

/// Queued bytes that trigger a flush by default, one data block of 4 MiB.
pub const DEFAULT_FLUSH_BYTES: u64 = 4 * 1024 * 1024;

/// When queued samples are written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FlushPolicy {
    /// Only on an explicit `flush()` and at finalize.
    Manual,
    /// After N saved samples across all channel groups.
    EveryNRecords(u64),
    /// After N bytes of queued record data.
    EveryNBytes(u64),
}

impl Default for FlushPolicy {
    fn default() -> Self {
        FlushPolicy::EveryNBytes(DEFAULT_FLUSH_BYTES)
    }
}

impl FlushPolicy {
    pub fn is_auto(&self) -> bool {
        *self != FlushPolicy::Manual
    }
}

/// Samples and bytes queued since the last flush.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FlushCounter {
    pub samples: u64,
    pub bytes: u64,
    /// Flushes since the measurement started.
    pub flushes: u64,
}

impl FlushCounter {
    pub fn add(&mut self, bytes: u64) {
        self.samples += 1;
        self.bytes += bytes;
    }

    pub fn is_due(&self, policy: &FlushPolicy) -> bool {
        match *policy {
            FlushPolicy::Manual => false,
            FlushPolicy::EveryNRecords(limit) => self.samples >= limit,
            FlushPolicy::EveryNBytes(limit) => self.bytes >= limit,
        }
    }

    pub fn reset(&mut self) {
        *self = Self {
            flushes: self.flushes + 1,
            ..Self::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policies() {
        let mut counter = FlushCounter::default();
        for _ in 0..10 {
            counter.add(16);
        }
        assert!(!counter.is_due(&FlushPolicy::Manual));
        assert!(counter.is_due(&FlushPolicy::EveryNRecords(10)));
        assert!(!counter.is_due(&FlushPolicy::EveryNRecords(11)));
        assert!(counter.is_due(&FlushPolicy::EveryNBytes(160)));
        assert!(!counter.is_due(&FlushPolicy::EveryNBytes(161)));
    }

    #[test]
    fn default_flushes_per_data_block() {
        let policy = FlushPolicy::default();
        assert!(policy.is_auto());
        let mut counter = FlushCounter::default();
        counter.add(DEFAULT_FLUSH_BYTES - 1);
        assert!(!counter.is_due(&policy));
        counter.add(1);
        assert!(counter.is_due(&policy));
    }

    #[test]
    fn reset_counts_flushes() {
        let mut counter = FlushCounter::default();
        counter.add(8);
        counter.reset();
        counter.reset();
        assert_eq!(
            counter,
            FlushCounter {
                samples: 0,
                bytes: 0,
                flushes: 2
            }
        );
    }
}
