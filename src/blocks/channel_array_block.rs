use crate::{
    Error, Result,
    blocks::common::{
        BlockParse, RawBlock, encode_v4, read_f64, read_u8, read_u16, read_u32, read_u64,
        validate_buffer_size,
    },
};

/// Flags of a channel array block.
pub mod ca_flags {
    pub const DYNAMIC_SIZE: u32 = 0x0001;
    pub const INPUT_QUANTITY: u32 = 0x0002;
    pub const OUTPUT_QUANTITY: u32 = 0x0004;
    pub const COMPARISON_QUANTITY: u32 = 0x0008;
    pub const AXIS: u32 = 0x0010;
    /// Axis values are stored in the block itself.
    pub const FIXED_AXIS: u32 = 0x0020;
    /// Elements are stored column by column.
    pub const INVERSE_LAYOUT: u32 = 0x0040;
    pub const LEFT_OPEN_INTERVAL: u32 = 0x0080;
    pub const STANDARD_AXIS: u32 = 0x0100;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ArrayType {
    #[default]
    Array = 0,
    ScalingAxis = 1,
    LookUp = 2,
    IntervalAxis = 3,
    ClassificationResult = 4,
}

impl ArrayType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::ScalingAxis,
            2 => Self::LookUp,
            3 => Self::IntervalAxis,
            4 => Self::ClassificationResult,
            _ => Self::Array,
        }
    }
}

/// Where the array elements live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ArrayStorage {
    /// All elements in the record of the parent channel.
    #[default]
    CnTemplate = 0,
    /// One channel group record per element.
    CgTemplate = 1,
    /// One data group per element.
    DgTemplate = 2,
}

impl ArrayStorage {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::CgTemplate,
            2 => Self::DgTemplate,
            _ => Self::CnTemplate,
        }
    }
}

/// Channel Array Block (##CA) - turns a channel into an N-dimensional array.
///
/// Only the first link (composition) is interpreted; the remaining links
/// (data blocks, dynamic sizes, quantities, axes) are kept as read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelArrayBlock {
    pub links: Vec<u64>,
    pub array_type: ArrayType,
    pub storage: ArrayStorage,
    pub flags: u32,
    /// Byte distance between two consecutive elements.
    pub byte_offset_base: i32,
    /// Bit distance between the invalidation bits of two elements.
    pub invalidation_bit_base: u32,
    pub dim_sizes: Vec<u64>,
    /// One value per element of every dimension, when `FIXED_AXIS` is set.
    pub axis_values: Vec<f64>,
    /// Cycle counts of CG and DG templates.
    pub cycle_counts: Vec<u64>,
}

impl BlockParse for ChannelArrayBlock {
    const ID: &'static str = "##CA";

    fn from_raw(block: &RawBlock) -> Result<Self> {
        let d = &block.data;
        validate_buffer_size(d, 16)?;
        let ndim = usize::from(read_u16(d, 2));
        let flags = read_u32(d, 4);
        let mut ca = Self {
            links: block.links.clone(),
            array_type: ArrayType::from_u8(read_u8(d, 0)),
            storage: ArrayStorage::from_u8(read_u8(d, 1)),
            flags,
            byte_offset_base: read_u32(d, 8) as i32,
            invalidation_bit_base: read_u32(d, 12),
            ..Default::default()
        };

        let mut pos = 16;
        validate_buffer_size(d, pos + ndim * 8)?;
        ca.dim_sizes = (0..ndim).map(|i| read_u64(d, pos + i * 8)).collect();
        pos += ndim * 8;

        if flags & ca_flags::FIXED_AXIS != 0 {
            let count = ca.sum_of_dims()?;
            validate_buffer_size(d, pos + count * 8)?;
            ca.axis_values = (0..count).map(|i| read_f64(d, pos + i * 8)).collect();
            pos += count * 8;
        }
        if ca.storage != ArrayStorage::CnTemplate {
            // Writers may leave the cycle counts out.
            let count = ca.element_count()?.min(d.len().saturating_sub(pos) / 8);
            ca.cycle_counts = (0..count).map(|i| read_u64(d, pos + i * 8)).collect();
        }
        Ok(ca)
    }
}

impl ChannelArrayBlock {
    pub fn new(dim_sizes: Vec<u64>, byte_offset_base: i32) -> Self {
        Self {
            links: vec![0],
            dim_sizes,
            byte_offset_base,
            ..Default::default()
        }
    }

    pub fn composition_addr(&self) -> u64 {
        self.links.first().copied().unwrap_or(0)
    }

    /// Product of the dimension sizes.
    pub fn element_count(&self) -> Result<usize> {
        self.dim_sizes.iter().try_fold(1usize, |acc, &size| {
            usize::try_from(size)
                .ok()
                .and_then(|size| acc.checked_mul(size))
                .ok_or_else(|| self.overflow())
        })
    }

    fn sum_of_dims(&self) -> Result<usize> {
        self.dim_sizes.iter().try_fold(0usize, |acc, &size| {
            usize::try_from(size)
                .ok()
                .and_then(|size| acc.checked_add(size))
                .ok_or_else(|| self.overflow())
        })
    }

    fn overflow(&self) -> Error {
        Error::BlockSerializationError(format!("array size overflow: {:?}", self.dim_sizes))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut data =
            Vec::with_capacity(16 + 8 * (self.dim_sizes.len() + self.axis_values.len()));
        data.push(self.array_type as u8);
        data.push(self.storage as u8);
        let ndim = u16::try_from(self.dim_sizes.len())
            .map_err(|_| Error::BlockSerializationError("too many array dimensions".into()))?;
        data.extend_from_slice(&ndim.to_le_bytes());
        data.extend_from_slice(&self.flags.to_le_bytes());
        data.extend_from_slice(&self.byte_offset_base.to_le_bytes());
        data.extend_from_slice(&self.invalidation_bit_base.to_le_bytes());
        for size in &self.dim_sizes {
            data.extend_from_slice(&size.to_le_bytes());
        }
        for value in &self.axis_values {
            data.extend_from_slice(&value.to_le_bytes());
        }
        for cycles in &self.cycle_counts {
            data.extend_from_slice(&cycles.to_le_bytes());
        }
        encode_v4(Self::ID, &self.links, &data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::common::{BlockCodec, Generation};
    use std::io::Cursor;

    fn parse(ca: &ChannelArrayBlock) -> ChannelArrayBlock {
        let mut file = vec![0u8; 8];
        file.extend(ca.to_bytes().unwrap());
        let codec = BlockCodec::new(Generation::Mdf4, file.len() as u64);
        ChannelArrayBlock::read_at(&codec, &mut Cursor::new(file), 8).unwrap()
    }

    #[test]
    fn two_dimensional_array() {
        let ca = ChannelArrayBlock::new(vec![2, 3], 4);
        let parsed = parse(&ca);
        assert_eq!(parsed, ca);
        assert_eq!(parsed.element_count().unwrap(), 6);
        assert_eq!(parsed.composition_addr(), 0);
    }

    #[test]
    fn fixed_axis_values() {
        let ca = ChannelArrayBlock {
            array_type: ArrayType::LookUp,
            flags: ca_flags::AXIS | ca_flags::FIXED_AXIS,
            axis_values: vec![0.5, 1.5, 10.0, 20.0, 30.0],
            ..ChannelArrayBlock::new(vec![2, 3], 8)
        };
        let parsed = parse(&ca);
        assert_eq!(parsed.array_type, ArrayType::LookUp);
        assert_eq!(parsed.axis_values, vec![0.5, 1.5, 10.0, 20.0, 30.0]);
    }

    #[test]
    fn missing_axis_values_are_an_error() {
        let mut bytes = vec![0u8; 8];
        let ca = ChannelArrayBlock {
            flags: ca_flags::FIXED_AXIS,
            ..ChannelArrayBlock::new(vec![4], 8)
        };
        bytes.extend(ca.to_bytes().unwrap());
        let codec = BlockCodec::new(Generation::Mdf4, bytes.len() as u64);
        assert!(ChannelArrayBlock::read_at(&codec, &mut Cursor::new(bytes), 8).is_err());
    }
}
