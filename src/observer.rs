//! Read-side view of a single channel.

use crate::{
    Error, Result,
    model::{Channel, ChannelGroup},
    types::Value,
};

/// Borrowed projection of one channel of a loaded channel group.
///
/// Sample access fails with [`Error::NotRead`] until the owning data group's
/// samples are loaded and with [`Error::OutOfRange`] past the last sample.
#[derive(Debug, Clone, Copy)]
pub struct ChannelObserver<'a> {
    group: &'a ChannelGroup,
    channel: usize,
}

impl<'a> ChannelObserver<'a> {
    pub fn new(group: &'a ChannelGroup, channel: usize) -> Result<Self> {
        if channel >= group.channels.len() {
            return Err(Error::OutOfRange {
                index: channel as u64,
                count: group.channels.len() as u64,
            });
        }
        Ok(Self { group, channel })
    }

    pub fn channel(&self) -> &'a Channel {
        &self.group.channels[self.channel]
    }

    pub fn channel_group(&self) -> &'a ChannelGroup {
        self.group
    }

    pub fn name(&self) -> String {
        self.group.full_name(self.channel)
    }

    pub fn unit(&self) -> &'a str {
        self.channel().unit()
    }

    /// Number of loaded samples, 0 before the data is read.
    pub fn nof_samples(&self) -> u64 {
        self.group.samples.as_ref().map_or(0, |s| s.count)
    }

    pub fn is_read(&self) -> bool {
        self.group.is_read()
    }

    /// Raw value; `None` for an invalid sample.
    pub fn channel_value(&self, sample: u64) -> Result<Option<Value>> {
        self.group.channel_value(self.channel, sample)
    }

    /// Converted value; `None` for an invalid sample.
    pub fn engineering_value(&self, sample: u64) -> Result<Option<Value>> {
        self.group.engineering_value(self.channel, sample)
    }

    pub fn is_valid(&self, sample: u64) -> Result<bool> {
        Ok(self.channel_value(sample)?.is_some())
    }

    /// Every engineering value in sample order.
    pub fn values(&self) -> Result<Vec<Option<Value>>> {
        (0..self.nof_samples())
            .map(|sample| self.engineering_value(sample))
            .collect()
    }
}
