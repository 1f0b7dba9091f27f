//! Event Block (##EV) - timestamped markers and triggers.

use crate::{
    Result,
    blocks::common::{
        BlockParse, RawBlock, encode_v4, read_f64, read_i64, read_u8, read_u16, read_u32,
        validate_buffer_size,
    },
};

/// `ev_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventType {
    Recording,
    RecordingInterrupt,
    AcquisitionInterrupt,
    StartRecordingTrigger,
    StopRecordingTrigger,
    Trigger,
    #[default]
    Marker,
}

impl EventType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Recording,
            1 => Self::RecordingInterrupt,
            2 => Self::AcquisitionInterrupt,
            3 => Self::StartRecordingTrigger,
            4 => Self::StopRecordingTrigger,
            5 => Self::Trigger,
            _ => Self::Marker,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::Recording => 0,
            Self::RecordingInterrupt => 1,
            Self::AcquisitionInterrupt => 2,
            Self::StartRecordingTrigger => 3,
            Self::StopRecordingTrigger => 4,
            Self::Trigger => 5,
            Self::Marker => 6,
        }
    }
}

/// `ev_sync_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventSyncType {
    #[default]
    Time,
    Angle,
    Distance,
    Index,
}

impl EventSyncType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            2 => Self::Angle,
            3 => Self::Distance,
            4 => Self::Index,
            _ => Self::Time,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::Time => 1,
            Self::Angle => 2,
            Self::Distance => 3,
            Self::Index => 4,
        }
    }
}

/// `ev_range_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventRangeType {
    #[default]
    Point,
    RangeBegin,
    RangeEnd,
}

impl EventRangeType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::RangeBegin,
            2 => Self::RangeEnd,
            _ => Self::Point,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::Point => 0,
            Self::RangeBegin => 1,
            Self::RangeEnd => 2,
        }
    }
}

/// `ev_cause`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventCause {
    #[default]
    Other,
    Error,
    Tool,
    Script,
    User,
}

impl EventCause {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Error,
            2 => Self::Tool,
            3 => Self::Script,
            4 => Self::User,
            _ => Self::Other,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::Other => 0,
            Self::Error => 1,
            Self::Tool => 2,
            Self::Script => 3,
            Self::User => 4,
        }
    }
}

/// Event Block (##EV).
///
/// Five fixed links (next, parent, range, name, comment) followed by
/// `scope_count` scope links and `attachment_count` attachment links.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventBlock {
    pub next_ev_addr: u64,
    pub parent_ev_addr: u64,
    pub range_ev_addr: u64,
    pub name_addr: u64,
    pub comment_addr: u64,
    pub scope_addrs: Vec<u64>,
    pub attachment_addrs: Vec<u64>,
    pub event_type: EventType,
    pub sync_type: EventSyncType,
    pub range_type: EventRangeType,
    pub cause: EventCause,
    pub flags: u8,
    pub creator_index: u16,
    pub sync_base_value: i64,
    pub sync_factor: f64,
}

impl BlockParse for EventBlock {
    const ID: &'static str = "##EV";

    fn from_raw(block: &RawBlock) -> Result<Self> {
        let d = &block.data;
        validate_buffer_size(d, 32)?;
        let scope_count = read_u32(d, 8) as usize;
        let attachment_count = read_u16(d, 12) as usize;
        let scope_addrs = (0..scope_count).map(|i| block.link(5 + i)).collect();
        let attachment_addrs = (0..attachment_count)
            .map(|i| block.link(5 + scope_count + i))
            .collect();
        Ok(Self {
            next_ev_addr: block.link(0),
            parent_ev_addr: block.link(1),
            range_ev_addr: block.link(2),
            name_addr: block.link(3),
            comment_addr: block.link(4),
            scope_addrs,
            attachment_addrs,
            event_type: EventType::from_u8(read_u8(d, 0)),
            sync_type: EventSyncType::from_u8(read_u8(d, 1)),
            range_type: EventRangeType::from_u8(read_u8(d, 2)),
            cause: EventCause::from_u8(read_u8(d, 3)),
            flags: read_u8(d, 4),
            creator_index: read_u16(d, 14),
            sync_base_value: read_i64(d, 16),
            sync_factor: read_f64(d, 24),
        })
    }
}

impl EventBlock {
    /// Physical synchronization value, `sync_base_value * sync_factor`.
    pub fn sync_value(&self) -> f64 {
        self.sync_base_value as f64 * self.sync_factor
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut links = vec![
            self.next_ev_addr,
            self.parent_ev_addr,
            self.range_ev_addr,
            self.name_addr,
            self.comment_addr,
        ];
        links.extend_from_slice(&self.scope_addrs);
        links.extend_from_slice(&self.attachment_addrs);

        let mut data = Vec::with_capacity(32);
        data.push(self.event_type.to_u8());
        data.push(self.sync_type.to_u8());
        data.push(self.range_type.to_u8());
        data.push(self.cause.to_u8());
        data.push(self.flags);
        data.extend_from_slice(&[0u8; 3]);
        data.extend_from_slice(&(self.scope_addrs.len() as u32).to_le_bytes());
        data.extend_from_slice(&(self.attachment_addrs.len() as u16).to_le_bytes());
        data.extend_from_slice(&self.creator_index.to_le_bytes());
        data.extend_from_slice(&self.sync_base_value.to_le_bytes());
        data.extend_from_slice(&self.sync_factor.to_le_bytes());
        encode_v4(Self::ID, &links, &data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::common::{BlockCodec, Generation};
    use std::io::Cursor;

    #[test]
    fn round_trip_with_scopes() {
        let ev = EventBlock {
            name_addr: 0x300,
            scope_addrs: vec![0x100, 0x180],
            attachment_addrs: vec![0x400],
            event_type: EventType::Trigger,
            cause: EventCause::User,
            sync_base_value: 1500,
            sync_factor: 0.001,
            ..Default::default()
        };
        let bytes = ev.to_bytes().unwrap();
        assert_eq!(bytes.len(), 24 + 8 * 8 + 32);
        let mut file = vec![0u8; 8];
        file.extend(bytes);
        let codec = BlockCodec::new(Generation::Mdf4, file.len() as u64);
        let parsed = EventBlock::read_at(&codec, &mut Cursor::new(file), 8).unwrap();
        assert_eq!(parsed, ev);
        assert!((parsed.sync_value() - 1.5).abs() < 1e-12);
    }
}
