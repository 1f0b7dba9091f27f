use super::CN_BLOCK_SIZE;
use crate::{
    Result,
    blocks::common::{
        BlockParse, DataType, RawBlock, encode_v4, read_f64, read_u8, read_u16, read_u32,
        validate_buffer_size,
    },
};

/// `cn_flags` bits.
pub mod cn_flags {
    pub const ALL_INVALID: u32 = 0x0001;
    pub const INVAL_BIT_VALID: u32 = 0x0002;
    pub const PRECISION_VALID: u32 = 0x0004;
    pub const RANGE_VALID: u32 = 0x0008;
    pub const LIMIT_VALID: u32 = 0x0010;
    pub const EXT_LIMIT_VALID: u32 = 0x0020;
    pub const DISCRETE: u32 = 0x0040;
    pub const CALIBRATION: u32 = 0x0080;
    pub const CALCULATED: u32 = 0x0100;
    pub const VIRTUAL: u32 = 0x0200;
    pub const BUS_EVENT: u32 = 0x0400;
    pub const MONOTONOUS: u32 = 0x0800;
    pub const DEFAULT_X: u32 = 0x1000;
}

/// `cn_type`: how the channel's value is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChannelType {
    #[default]
    FixedLength,
    VariableLength,
    Master,
    VirtualMaster,
    Sync,
    MaxLength,
    VirtualData,
}

impl ChannelType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::VariableLength,
            2 => Self::Master,
            3 => Self::VirtualMaster,
            4 => Self::Sync,
            5 => Self::MaxLength,
            6 => Self::VirtualData,
            _ => Self::FixedLength,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::FixedLength => 0,
            Self::VariableLength => 1,
            Self::Master => 2,
            Self::VirtualMaster => 3,
            Self::Sync => 4,
            Self::MaxLength => 5,
            Self::VirtualData => 6,
        }
    }

    pub fn is_master(self) -> bool {
        matches!(self, Self::Master | Self::VirtualMaster)
    }

    pub fn is_virtual(self) -> bool {
        matches!(self, Self::VirtualMaster | Self::VirtualData)
    }
}

/// `cn_sync_type`: the domain a master channel measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SyncType {
    #[default]
    None,
    Time,
    Angle,
    Distance,
    Index,
}

impl SyncType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Time,
            2 => Self::Angle,
            3 => Self::Distance,
            4 => Self::Index,
            _ => Self::None,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Time => 1,
            Self::Angle => 2,
            Self::Distance => 3,
            Self::Index => 4,
        }
    }
}

/// Channel Block (##CN).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelBlock {
    pub next_ch_addr: u64,
    /// First component channel (composition) or CA block.
    pub component_addr: u64,
    pub name_addr: u64,
    pub source_addr: u64,
    pub conversion_addr: u64,
    /// SD/DL/DZ signal data, or the VLSD channel group.
    pub data_addr: u64,
    pub unit_addr: u64,
    pub comment_addr: u64,
    pub channel_type: ChannelType,
    pub sync_type: SyncType,
    pub data_type: DataType,
    pub bit_offset: u8,
    pub byte_offset: u32,
    pub bit_count: u32,
    pub flags: u32,
    pub pos_invalidation_bit: u32,
    pub precision: u8,
    pub attachment_count: u16,
    pub min_raw_value: f64,
    pub max_raw_value: f64,
    pub lower_limit: f64,
    pub upper_limit: f64,
    pub lower_ext_limit: f64,
    pub upper_ext_limit: f64,
}

pub const CN_LINK_DATA: u64 = 64;

impl BlockParse for ChannelBlock {
    const ID: &'static str = "##CN";

    fn from_raw(block: &RawBlock) -> Result<Self> {
        let d = &block.data;
        validate_buffer_size(d, 72)?;
        Ok(Self {
            next_ch_addr: block.link(0),
            component_addr: block.link(1),
            name_addr: block.link(2),
            source_addr: block.link(3),
            conversion_addr: block.link(4),
            data_addr: block.link(5),
            unit_addr: block.link(6),
            comment_addr: block.link(7),
            channel_type: ChannelType::from_u8(read_u8(d, 0)),
            sync_type: SyncType::from_u8(read_u8(d, 1)),
            data_type: DataType::from_u8(read_u8(d, 2))?,
            bit_offset: read_u8(d, 3),
            byte_offset: read_u32(d, 4),
            bit_count: read_u32(d, 8),
            flags: read_u32(d, 12),
            pos_invalidation_bit: read_u32(d, 16),
            precision: read_u8(d, 20),
            attachment_count: read_u16(d, 22),
            min_raw_value: read_f64(d, 24),
            max_raw_value: read_f64(d, 32),
            lower_limit: read_f64(d, 40),
            upper_limit: read_f64(d, 48),
            lower_ext_limit: read_f64(d, 56),
            upper_ext_limit: read_f64(d, 64),
        })
    }
}

impl ChannelBlock {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(72);
        data.push(self.channel_type.to_u8());
        data.push(self.sync_type.to_u8());
        data.push(self.data_type.to_u8());
        data.push(self.bit_offset);
        data.extend_from_slice(&self.byte_offset.to_le_bytes());
        data.extend_from_slice(&self.bit_count.to_le_bytes());
        data.extend_from_slice(&self.flags.to_le_bytes());
        data.extend_from_slice(&self.pos_invalidation_bit.to_le_bytes());
        data.push(self.precision);
        data.push(0);
        data.extend_from_slice(&self.attachment_count.to_le_bytes());
        for v in [
            self.min_raw_value,
            self.max_raw_value,
            self.lower_limit,
            self.upper_limit,
            self.lower_ext_limit,
            self.upper_ext_limit,
        ] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        let bytes = encode_v4(
            Self::ID,
            &[
                self.next_ch_addr,
                self.component_addr,
                self.name_addr,
                self.source_addr,
                self.conversion_addr,
                self.data_addr,
                self.unit_addr,
                self.comment_addr,
            ],
            &data,
        )?;
        debug_assert_eq!(bytes.len(), CN_BLOCK_SIZE);
        Ok(bytes)
    }
}
