use super::CG_BLOCK_SIZE;
use crate::{
    Result,
    blocks::common::{BlockParse, RawBlock, encode_v4, read_u16, read_u32, read_u64, validate_buffer_size},
};

/// Channel group flag: the group stores variable length signal data (VLSD).
pub const CG_FLAG_VLSD: u16 = 0x0001;
/// Channel group flag: bus event group.
pub const CG_FLAG_BUS_EVENT: u16 = 0x0002;
/// Channel group flag: plain bus event group.
pub const CG_FLAG_PLAIN_BUS_EVENT: u16 = 0x0004;

/// Channel Group Block (##CG).
///
/// Links: next CG, first CN, acquisition name TX, acquisition source SI,
/// first sample reduction, comment. The data section holds the record id,
/// the cycle count and the record layout sizes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelGroupBlock {
    pub next_cg_addr: u64,
    pub first_ch_addr: u64,
    pub acq_name_addr: u64,
    pub acq_source_addr: u64,
    pub first_sample_reduction_addr: u64,
    pub comment_addr: u64,
    pub record_id: u64,
    pub cycles_nr: u64,
    pub flags: u16,
    pub path_separator: u16,
    /// Bytes of data per record; for VLSD groups the low half of the total
    /// VLSD byte count.
    pub samples_byte_nr: u32,
    /// Bytes of invalidation bits per record; for VLSD groups the high half.
    pub invalidation_bytes_nr: u32,
}

pub const CG_LINK_NEXT: u64 = 24;
/// Position of `cycles_nr` relative to the block start.
pub const CG_CYCLES: u64 = 80;
pub const CG_DATA_BYTES: u64 = 96;
pub const CG_INVAL_BYTES: u64 = 100;

impl BlockParse for ChannelGroupBlock {
    const ID: &'static str = "##CG";

    fn from_raw(block: &RawBlock) -> Result<Self> {
        let d = &block.data;
        validate_buffer_size(d, 32)?;
        Ok(Self {
            next_cg_addr: block.link(0),
            first_ch_addr: block.link(1),
            acq_name_addr: block.link(2),
            acq_source_addr: block.link(3),
            first_sample_reduction_addr: block.link(4),
            comment_addr: block.link(5),
            record_id: read_u64(d, 0),
            cycles_nr: read_u64(d, 8),
            flags: read_u16(d, 16),
            path_separator: read_u16(d, 18),
            samples_byte_nr: read_u32(d, 24),
            invalidation_bytes_nr: read_u32(d, 28),
        })
    }
}

impl ChannelGroupBlock {
    pub fn is_vlsd(&self) -> bool {
        self.flags & CG_FLAG_VLSD != 0
    }

    /// Total VLSD payload bytes of a VLSD group.
    pub fn vlsd_size(&self) -> u64 {
        (u64::from(self.invalidation_bytes_nr) << 32) | u64::from(self.samples_byte_nr)
    }

    /// Path separator as a character, if one is set.
    pub fn separator(&self) -> Option<char> {
        match self.path_separator {
            0 => None,
            c => char::from_u32(u32::from(c)),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(32);
        data.extend_from_slice(&self.record_id.to_le_bytes());
        data.extend_from_slice(&self.cycles_nr.to_le_bytes());
        data.extend_from_slice(&self.flags.to_le_bytes());
        data.extend_from_slice(&self.path_separator.to_le_bytes());
        data.extend_from_slice(&[0u8; 4]);
        data.extend_from_slice(&self.samples_byte_nr.to_le_bytes());
        data.extend_from_slice(&self.invalidation_bytes_nr.to_le_bytes());
        let bytes = encode_v4(
            Self::ID,
            &[
                self.next_cg_addr,
                self.first_ch_addr,
                self.acq_name_addr,
                self.acq_source_addr,
                self.first_sample_reduction_addr,
                self.comment_addr,
            ],
            &data,
        )?;
        debug_assert_eq!(bytes.len(), CG_BLOCK_SIZE);
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::common::{BlockCodec, Generation};
    use std::io::Cursor;

    #[test]
    fn round_trip_and_vlsd_size() {
        let cg = ChannelGroupBlock {
            record_id: 3,
            cycles_nr: 100,
            flags: CG_FLAG_VLSD,
            path_separator: u16::from(b'.'),
            samples_byte_nr: 0x10,
            invalidation_bytes_nr: 1,
            ..Default::default()
        };
        let bytes = cg.to_bytes().unwrap();
        assert_eq!(bytes.len(), CG_BLOCK_SIZE);
        assert_eq!(&bytes[CG_CYCLES as usize..CG_CYCLES as usize + 8], &100u64.to_le_bytes());

        let mut file = vec![0u8; 8];
        file.extend(bytes);
        let codec = BlockCodec::new(Generation::Mdf4, file.len() as u64);
        let parsed = ChannelGroupBlock::read_at(&codec, &mut Cursor::new(file), 8).unwrap();
        assert_eq!(parsed, cg);
        assert!(parsed.is_vlsd());
        assert_eq!(parsed.vlsd_size(), 0x1_0000_0010);
        assert_eq!(parsed.separator(), Some('.'));
    }
}
