use super::SI_BLOCK_SIZE;
use crate::{
    Result,
    blocks::common::{BlockParse, RawBlock, encode_v4, read_u8, validate_buffer_size},
};

/// Source Information Block (##SI) - describes the source of acquired data.
///
/// A source block identifies where data comes from (ECU, bus, I/O device, etc.)
/// and is typically linked from channel groups or channels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceBlock {
    /// Link to text block containing the source name.
    pub name_addr: u64,
    /// Link to text block containing a tool-specific path.
    pub path_addr: u64,
    /// Link to text/metadata block with extended comment.
    pub comment_addr: u64,
    pub source_type: SourceType,
    pub bus_type: BusType,
    /// Flags (bit 0 = simulated source).
    pub flags: u8,
}

pub const SI_FLAG_SIMULATED: u8 = 0x01;

impl BlockParse for SourceBlock {
    const ID: &'static str = "##SI";

    fn from_raw(block: &RawBlock) -> Result<Self> {
        let d = &block.data;
        validate_buffer_size(d, 3)?;
        Ok(Self {
            name_addr: block.link(0),
            path_addr: block.link(1),
            comment_addr: block.link(2),
            source_type: SourceType::from_u8(read_u8(d, 0)),
            bus_type: BusType::from_u8(read_u8(d, 1)),
            flags: read_u8(d, 2),
        })
    }
}

/// Kind of device or tool that produced the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum SourceType {
    #[default]
    Other = 0,
    /// Electronic Control Unit
    Ecu = 1,
    /// Bus (CAN, LIN, etc.)
    Bus = 2,
    /// I/O device
    Io = 3,
    Tool = 4,
    User = 5,
}

impl SourceType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Ecu,
            2 => Self::Bus,
            3 => Self::Io,
            4 => Self::Tool,
            5 => Self::User,
            _ => Self::Other,
        }
    }
}

/// Bus the source is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum BusType {
    #[default]
    None = 0,
    Other = 1,
    Can = 2,
    Lin = 3,
    Most = 4,
    FlexRay = 5,
    KLine = 6,
    Ethernet = 7,
    Usb = 8,
}

impl BusType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Other,
            2 => Self::Can,
            3 => Self::Lin,
            4 => Self::Most,
            5 => Self::FlexRay,
            6 => Self::KLine,
            7 => Self::Ethernet,
            8 => Self::Usb,
            _ => Self::None,
        }
    }
}

impl SourceBlock {
    pub fn new(source_type: SourceType, bus_type: BusType) -> Self {
        Self {
            source_type,
            bus_type,
            ..Default::default()
        }
    }

    pub fn is_simulated(&self) -> bool {
        self.flags & SI_FLAG_SIMULATED != 0
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut data = [0u8; 8];
        data[0] = self.source_type as u8;
        data[1] = self.bus_type as u8;
        data[2] = self.flags;
        let bytes = encode_v4(
            Self::ID,
            &[self.name_addr, self.path_addr, self.comment_addr],
            &data,
        )?;
        debug_assert_eq!(bytes.len(), SI_BLOCK_SIZE);
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::common::{BlockCodec, Generation};
    use std::io::Cursor;

    #[test]
    fn can_bus_source_round_trip() {
        let si = SourceBlock {
            name_addr: 0x100,
            flags: SI_FLAG_SIMULATED,
            ..SourceBlock::new(SourceType::Bus, BusType::Can)
        };
        let mut file = vec![0u8; 8];
        file.extend(si.to_bytes().unwrap());
        let codec = BlockCodec::new(Generation::Mdf4, file.len() as u64);
        let parsed = SourceBlock::read_at(&codec, &mut Cursor::new(file), 8).unwrap();
        assert_eq!(parsed, si);
        assert!(parsed.is_simulated());
    }
}
