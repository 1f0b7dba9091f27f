// src/blocks/header_block.rs
use super::HD_BLOCK_SIZE;
use crate::{
    Result,
    blocks::common::{
        BlockParse, RawBlock, encode_v4, read_f64, read_i16, read_u8, read_u64,
        validate_buffer_size,
    },
};

/// `hd_time_flags` bit 0: local time (no offsets stored).
pub const HD_TIME_FLAG_LOCAL: u8 = 0x01;
/// `hd_time_flags` bit 1: time zone and DST offsets are valid.
pub const HD_TIME_FLAG_OFFSETS_VALID: u8 = 0x02;
/// `hd_flags` bit 0: start angle valid.
pub const HD_FLAG_ANGLE_VALID: u8 = 0x01;
/// `hd_flags` bit 1: start distance valid.
pub const HD_FLAG_DISTANCE_VALID: u8 = 0x02;

/// MDF4 header block (##HD), 104 bytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderBlock {
    pub first_dg_addr: u64,
    pub file_history_addr: u64,
    pub channel_tree_addr: u64,
    pub first_attachment_addr: u64,
    pub first_event_addr: u64,
    pub comment_addr: u64,
    /// Start time, ns since 1970-01-01 UTC.
    pub abs_time: u64,
    /// Time zone offset in minutes.
    pub tz_offset: i16,
    /// Daylight saving offset in minutes.
    pub dst_offset: i16,
    pub time_flags: u8,
    pub time_quality: u8,
    pub flags: u8,
    pub start_angle: f64,
    pub start_distance: f64,
}

/// Link offsets inside the block, used to patch links after writing.
pub const HD_LINK_DG: u64 = 24;
pub const HD_LINK_FH: u64 = 32;
pub const HD_LINK_AT: u64 = 48;
pub const HD_LINK_EV: u64 = 56;
pub const HD_LINK_MD: u64 = 64;
pub const HD_ABS_TIME: u64 = 72;

impl BlockParse for HeaderBlock {
    const ID: &'static str = "##HD";

    fn from_raw(block: &RawBlock) -> Result<Self> {
        let d = &block.data;
        validate_buffer_size(d, 32)?;
        Ok(Self {
            first_dg_addr: block.link(0),
            file_history_addr: block.link(1),
            channel_tree_addr: block.link(2),
            first_attachment_addr: block.link(3),
            first_event_addr: block.link(4),
            comment_addr: block.link(5),
            abs_time: read_u64(d, 0),
            tz_offset: read_i16(d, 8),
            dst_offset: read_i16(d, 10),
            time_flags: read_u8(d, 12),
            time_quality: read_u8(d, 13),
            flags: read_u8(d, 14),
            start_angle: read_f64(d, 16),
            start_distance: read_f64(d, 24),
        })
    }
}

impl HeaderBlock {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(32);
        data.extend_from_slice(&self.abs_time.to_le_bytes());
        data.extend_from_slice(&self.tz_offset.to_le_bytes());
        data.extend_from_slice(&self.dst_offset.to_le_bytes());
        data.push(self.time_flags);
        data.push(self.time_quality);
        data.push(self.flags);
        data.push(0);
        data.extend_from_slice(&self.start_angle.to_le_bytes());
        data.extend_from_slice(&self.start_distance.to_le_bytes());
        let bytes = encode_v4(
            Self::ID,
            &[
                self.first_dg_addr,
                self.file_history_addr,
                self.channel_tree_addr,
                self.first_attachment_addr,
                self.first_event_addr,
                self.comment_addr,
            ],
            &data,
        )?;
        debug_assert_eq!(bytes.len(), HD_BLOCK_SIZE);
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::common::{BlockCodec, Generation};
    use std::io::Cursor;

    #[test]
    fn header_round_trip() {
        let hd = HeaderBlock {
            first_dg_addr: 0x200,
            abs_time: 1_700_000_000_000_000_000,
            tz_offset: 60,
            time_flags: HD_TIME_FLAG_OFFSETS_VALID,
            flags: HD_FLAG_ANGLE_VALID,
            start_angle: 1.5,
            ..Default::default()
        };
        let mut file = vec![0u8; 64];
        file.extend(hd.to_bytes().unwrap());
        assert_eq!(file.len(), 64 + HD_BLOCK_SIZE);
        let codec = BlockCodec::new(Generation::Mdf4, file.len() as u64);
        let parsed = HeaderBlock::read_at(&codec, &mut Cursor::new(file), 64).unwrap();
        assert_eq!(parsed, hd);
    }
}
