use std::collections::HashMap;

use crate::{
    Error, Result,
    blocks::{
        ArrayStorage, BusType, SourceType,
        channel_group_block::{CG_FLAG_BUS_EVENT, CG_FLAG_PLAIN_BUS_EVENT, CG_FLAG_VLSD},
    },
    layout::{self, Field, RecordLayout},
    metadata::MetaData,
    model::Channel,
    types::Value,
};

/// Acquisition source of a channel group or channel.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInformation {
    pub index: u64,
    pub name: String,
    pub path: String,
    pub description: String,
    pub source_type: SourceType,
    pub bus_type: BusType,
    pub simulated: bool,
    pub metadata: Option<MetaData>,
}

impl SourceInformation {
    pub fn new(name: &str, source_type: SourceType, bus_type: BusType) -> Self {
        Self {
            index: 0,
            name: name.to_string(),
            path: String::new(),
            description: String::new(),
            source_type,
            bus_type,
            simulated: false,
            metadata: None,
        }
    }
}

/// Decoded samples of one channel group.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct SampleBuffer {
    /// Data and invalidation bytes of every record.
    pub records: Vec<u8>,
    pub record_len: usize,
    pub count: u64,
    /// Per channel position: the `u32 length + bytes` stream that the
    /// channel's record offsets point into.
    pub signal: HashMap<usize, Vec<u8>>,
}

impl SampleBuffer {
    pub fn record(&self, sample: u64) -> Option<&[u8]> {
        let start = usize::try_from(sample).ok()?.checked_mul(self.record_len)?;
        self.records.get(start..start + self.record_len)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelGroup {
    pub index: u64,
    /// Position of the owning data group.
    pub data_group: usize,
    pub name: String,
    pub description: String,
    pub record_id: u64,
    pub nof_samples: u64,
    pub flags: u16,
    pub path_separator: Option<char>,
    pub data_bytes: u32,
    pub inval_bytes: u32,
    pub source: Option<SourceInformation>,
    pub metadata: Option<MetaData>,
    pub channels: Vec<Channel>,
    pub(crate) samples: Option<SampleBuffer>,
}

impl Default for ChannelGroup {
    fn default() -> Self {
        Self {
            index: 0,
            data_group: 0,
            name: String::new(),
            description: String::new(),
            record_id: 0,
            nof_samples: 0,
            flags: 0,
            path_separator: Some('.'),
            data_bytes: 0,
            inval_bytes: 0,
            source: None,
            metadata: None,
            channels: Vec::new(),
            samples: None,
        }
    }
}

impl ChannelGroup {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn is_vlsd(&self) -> bool {
        self.flags & CG_FLAG_VLSD != 0
    }

    pub fn is_bus_event(&self) -> bool {
        self.flags & CG_FLAG_BUS_EVENT != 0
    }

    pub fn is_plain_bus_event(&self) -> bool {
        self.flags & CG_FLAG_PLAIN_BUS_EVENT != 0
    }

    pub fn is_read(&self) -> bool {
        self.samples.is_some()
    }

    pub fn layout(&self, record_id_size: u8) -> RecordLayout {
        RecordLayout {
            record_id_size,
            trailing_record_id: false,
            data_bytes: self.data_bytes,
            inval_bytes: self.inval_bytes,
        }
    }

    pub fn channel(&self, name: &str) -> Option<usize> {
        self.channels
            .iter()
            .position(|c| c.name == name)
            .or_else(|| (0..self.channels.len()).find(|&i| self.full_name(i) == name))
    }

    pub fn master(&self) -> Option<usize> {
        self.channels.iter().position(Channel::is_master)
    }

    /// Name including composite parents, e.g. `CAN_DataFrame.ID`.
    pub fn full_name(&self, channel: usize) -> String {
        let Some(ch) = self.channels.get(channel) else {
            return String::new();
        };
        match ch.parent {
            Some(parent) if parent != channel && parent < self.channels.len() => {
                let sep = self.path_separator.unwrap_or('.');
                format!("{}{sep}{}", self.full_name(parent), ch.name)
            }
            _ => ch.name.clone(),
        }
    }

    /// Raw value of `channel` at `sample`. `None` when the sample is marked
    /// invalid.
    pub fn channel_value(&self, channel: usize, sample: u64) -> Result<Option<Value>> {
        self.value_at(channel, sample, true)
    }

    /// Reads one field. The length from a size channel is applied only at
    /// the first level, the size channel itself is read as stored.
    fn value_at(&self, channel: usize, sample: u64, apply_size: bool) -> Result<Option<Value>> {
        let samples = self.samples.as_ref().ok_or(Error::NotRead(self.data_group))?;
        if sample >= samples.count {
            return Err(Error::OutOfRange {
                index: sample,
                count: samples.count,
            });
        }
        let ch = self.channels.get(channel).ok_or(Error::OutOfRange {
            index: channel as u64,
            count: self.channels.len() as u64,
        })?;
        if ch.all_invalid() {
            return Ok(None);
        }
        if ch.is_virtual() {
            return Ok(Some(Value::UnsignedInteger(sample)));
        }
        let record = samples.record(sample).ok_or(Error::OutOfRange {
            index: sample,
            count: samples.count,
        })?;
        if ch.has_invalidation_bit()
            && layout::invalidation_bit(record, self.data_bytes, ch.invalidation_bit)
        {
            return Ok(None);
        }

        if ch.is_variable_length() {
            let offset = layout::read_bits(
                record,
                ch.byte_offset as usize,
                0,
                ch.bit_count.clamp(8, 64),
                false,
            )
            .ok_or_else(|| short_record(ch))?;
            let bytes = samples
                .signal
                .get(&channel)
                .and_then(|stream| layout::signal_entry(stream, offset))
                .unwrap_or(&[]);
            return Ok(Some(layout::decode_bytes(ch.data_type, bytes)));
        }

        let mut value = layout::decode_value(record, &ch.field()).ok_or_else(|| short_record(ch))?;
        if let Some(size_channel) = ch.size_channel.filter(|_| apply_size) {
            let size_conversion = self
                .channels
                .get(size_channel)
                .and_then(|c| c.conversion.as_ref());
            let len = self
                .value_at(size_channel, sample, false)?
                .map(|raw| match size_conversion {
                    Some(conversion) => conversion.apply(&raw),
                    None => raw,
                })
                .and_then(|v| v.as_u64())
                .and_then(|v| usize::try_from(v).ok());
            if let Some(len) = len {
                value = truncate(value, len);
            }
        }
        Ok(Some(value))
    }

    /// Engineering value: the channel conversion applied to the raw value.
    pub fn engineering_value(&self, channel: usize, sample: u64) -> Result<Option<Value>> {
        let raw = self.channel_value(channel, sample)?;
        let conversion = self.channels.get(channel).and_then(|c| c.conversion.as_ref());
        Ok(match (raw, conversion) {
            (Some(raw), Some(conversion)) => Some(conversion.apply(&raw)),
            (raw, _) => raw,
        })
    }

    /// Raw values of every element of an array channel at `sample`, in
    /// row-major order. Invalid elements are `None`. A channel without array
    /// dimensions yields its single value.
    pub fn array_values(&self, channel: usize, sample: u64) -> Result<Vec<Option<Value>>> {
        let ch = self.channels.get(channel).ok_or(Error::OutOfRange {
            index: channel as u64,
            count: self.channels.len() as u64,
        })?;
        let Some(array) = ch.array.as_ref() else {
            return Ok(vec![self.channel_value(channel, sample)?]);
        };
        if array.storage != ArrayStorage::CnTemplate {
            return Err(Error::invalid_state(format!(
                "channel {:?}: {:?} arrays are not decoded",
                ch.name, array.storage
            )));
        }
        let samples = self.samples.as_ref().ok_or(Error::NotRead(self.data_group))?;
        let record = samples.record(sample).ok_or(Error::OutOfRange {
            index: sample,
            count: samples.count,
        })?;
        let count = array.element_count();
        if count > record.len().max(1) * 8 {
            return Err(short_record(ch));
        }

        let mut values = Vec::with_capacity(count);
        for element in 0..count {
            if ch.all_invalid() {
                values.push(None);
                continue;
            }
            if ch.has_invalidation_bit() {
                let bit = u64::from(array.invalidation_bit_base) * element as u64
                    + u64::from(ch.invalidation_bit);
                let bit = u32::try_from(bit).map_err(|_| short_record(ch))?;
                if layout::invalidation_bit(record, self.data_bytes, bit) {
                    values.push(None);
                    continue;
                }
            }
            let byte_offset = i64::from(array.byte_offset_base) * element as i64
                + i64::from(ch.byte_offset);
            let byte_offset = u32::try_from(byte_offset).map_err(|_| short_record(ch))?;
            let field = Field::new(byte_offset, ch.bit_offset, ch.bit_count, ch.data_type);
            let value = layout::decode_value(record, &field).ok_or_else(|| short_record(ch))?;
            values.push(Some(value));
        }
        Ok(values)
    }

    /// [`array_values`](Self::array_values) with the channel conversion
    /// applied to each element.
    pub fn array_engineering_values(
        &self,
        channel: usize,
        sample: u64,
    ) -> Result<Vec<Option<Value>>> {
        let values = self.array_values(channel, sample)?;
        let Some(conversion) = self.channels.get(channel).and_then(|c| c.conversion.as_ref()) else {
            return Ok(values);
        };
        Ok(values
            .into_iter()
            .map(|value| value.map(|raw| conversion.apply(&raw)))
            .collect())
    }

    pub fn reset_samples(&mut self) {
        self.samples = None;
    }

    /// Fails when a size channel link is dangling or the links form a loop.
    pub(crate) fn check_size_links(&self) -> Result<()> {
        for (start, ch) in self.channels.iter().enumerate() {
            let mut current = ch.size_channel;
            let mut steps = 0;
            while let Some(next) = current {
                let target = self.channels.get(next).ok_or_else(|| {
                    Error::BlockLinkError(format!(
                        "channel {:?}: size channel {next} does not exist",
                        ch.name
                    ))
                })?;
                steps += 1;
                if next == start || steps > self.channels.len() {
                    return Err(Error::BlockLinkError(format!(
                        "channel {:?}: size channel links form a loop",
                        ch.name
                    )));
                }
                current = target.size_channel;
            }
        }
        Ok(())
    }
}

fn short_record(ch: &Channel) -> Error {
    Error::BlockSerializationError(format!(
        "record too short for channel {:?} at byte {}",
        ch.name, ch.byte_offset
    ))
}

fn truncate(value: Value, len: usize) -> Value {
    match value {
        Value::ByteArray(mut bytes) => {
            bytes.truncate(len);
            Value::ByteArray(bytes)
        }
        Value::String(text) => Value::String(text.chars().take(len).collect()),
        other => other,
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataGroup {
    pub index: u64,
    pub description: String,
    pub metadata: Option<MetaData>,
    /// Record id width in bytes: 0, 1, 2, 4 or 8.
    pub record_id_size: u8,
    pub channel_groups: Vec<ChannelGroup>,
    /// MDF3 records repeat their record id after the data.
    pub(crate) trailing_record_id: bool,
    pub(crate) data_link: u64,
}

impl DataGroup {
    pub fn new(description: &str) -> Self {
        Self {
            description: description.to_string(),
            ..Default::default()
        }
    }

    /// True once the samples of every channel group are loaded.
    pub fn is_read(&self) -> bool {
        !self.channel_groups.is_empty() && self.channel_groups.iter().all(ChannelGroup::is_read)
    }

    pub fn channel_group(&self, name: &str) -> Option<usize> {
        self.channel_groups.iter().position(|cg| cg.name == name)
    }

    pub fn channel_group_by_record_id(&self, record_id: u64) -> Option<usize> {
        self.channel_groups
            .iter()
            .position(|cg| cg.record_id == record_id)
    }

    /// Drops loaded samples so memory is released; `read_data` loads them
    /// again.
    pub fn reset_samples(&mut self) {
        for cg in &mut self.channel_groups {
            cg.reset_samples();
        }
    }
}
