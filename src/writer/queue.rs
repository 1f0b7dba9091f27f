//! Sample queue between `save_sample` and the data blocks.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::model::ChannelGroupId;

/// Snapshot of one channel group record taken by `save_sample`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QueuedSample {
    /// Absolute time in ns since the epoch.
    pub time_ns: u64,
    pub group: ChannelGroupId,
    /// Data and invalidation bytes; master time and signal offsets are
    /// filled in when the sample is written.
    pub record: Vec<u8>,
    /// Values of variable-length channels by channel position.
    pub variable: Vec<(usize, Vec<u8>)>,
}

impl QueuedSample {
    pub fn size(&self) -> u64 {
        (self.record.len() + self.variable.iter().map(|(_, v)| v.len() + 4).sum::<usize>()) as u64
    }
}

/// FIFO of saved samples. Records leave the queue in the order they were
/// saved.
#[derive(Debug, Default)]
pub(crate) struct SampleQueue {
    samples: Mutex<VecDeque<QueuedSample>>,
}

impl SampleQueue {
    pub fn push(&self, sample: QueuedSample) {
        self.samples.lock().push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    /// Drops samples older than `oldest_ns`.
    pub fn trim_before(&self, oldest_ns: u64) -> usize {
        let mut samples = self.samples.lock();
        let before = samples.len();
        samples.retain(|s| s.time_ns >= oldest_ns);
        before - samples.len()
    }

    /// Drops samples newer than `latest_ns`.
    pub fn trim_after(&self, latest_ns: u64) -> usize {
        let mut samples = self.samples.lock();
        let before = samples.len();
        samples.retain(|s| s.time_ns <= latest_ns);
        before - samples.len()
    }

    pub fn drain(&self) -> Vec<QueuedSample> {
        self.samples.lock().drain(..).collect()
    }

    pub fn clear(&self) {
        self.samples.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(time_ns: u64) -> QueuedSample {
        QueuedSample {
            time_ns,
            group: ChannelGroupId { dg: 0, cg: 0 },
            record: vec![0; 4],
            variable: vec![(1, vec![1, 2])],
        }
    }

    #[test]
    fn trims_keep_order() {
        let queue = SampleQueue::default();
        for t in [10, 20, 30, 40] {
            queue.push(sample(t));
        }
        assert_eq!(queue.trim_before(20), 1);
        assert_eq!(queue.trim_after(30), 1);
        let left: Vec<u64> = queue.drain().iter().map(|s| s.time_ns).collect();
        assert_eq!(left, vec![20, 30]);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn size_counts_signal_prefixes() {
        assert_eq!(sample(0).size(), 4 + 2 + 4);
    }
}
