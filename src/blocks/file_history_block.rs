//! File History Block (##FH) - tracks file modification history.
//!
//! Each FH block records when and by what tool the file was created or
//! modified. The tool details live in the `FHcomment` XML of the linked MD
//! block.

use super::FH_BLOCK_SIZE;
use crate::{
    Result,
    blocks::common::{BlockParse, RawBlock, encode_v4, read_i16, read_u8, read_u64, validate_buffer_size},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileHistoryBlock {
    /// Link to next file history block (0 = end of list).
    pub next_fh_addr: u64,
    /// Link to the MD block with the `FHcomment` XML.
    pub comment_addr: u64,
    /// Absolute time of modification in nanoseconds since Jan 1, 1970 (UTC).
    pub time_ns: u64,
    pub tz_offset_min: i16,
    pub dst_offset_min: i16,
    pub time_flags: u8,
}

pub const FH_LINK_NEXT: u64 = 24;

impl BlockParse for FileHistoryBlock {
    const ID: &'static str = "##FH";

    fn from_raw(block: &RawBlock) -> Result<Self> {
        let d = &block.data;
        validate_buffer_size(d, 13)?;
        Ok(Self {
            next_fh_addr: block.link(0),
            comment_addr: block.link(1),
            time_ns: read_u64(d, 0),
            tz_offset_min: read_i16(d, 8),
            dst_offset_min: read_i16(d, 10),
            time_flags: read_u8(d, 12),
        })
    }
}

impl FileHistoryBlock {
    pub fn new(time_ns: u64) -> Self {
        Self {
            time_ns,
            ..Default::default()
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(16);
        data.extend_from_slice(&self.time_ns.to_le_bytes());
        data.extend_from_slice(&self.tz_offset_min.to_le_bytes());
        data.extend_from_slice(&self.dst_offset_min.to_le_bytes());
        data.push(self.time_flags);
        data.extend_from_slice(&[0u8; 3]);
        let bytes = encode_v4(Self::ID, &[self.next_fh_addr, self.comment_addr], &data)?;
        debug_assert_eq!(bytes.len(), FH_BLOCK_SIZE);
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::common::{BlockCodec, Generation};
    use std::io::Cursor;

    #[test]
    fn round_trip() {
        let fh = FileHistoryBlock {
            comment_addr: 0x1000,
            tz_offset_min: -300,
            time_flags: 2,
            ..FileHistoryBlock::new(1_700_000_000_000_000_000)
        };
        let mut file = vec![0u8; 8];
        file.extend(fh.to_bytes().unwrap());
        let codec = BlockCodec::new(Generation::Mdf4, file.len() as u64);
        let parsed = FileHistoryBlock::read_at(&codec, &mut Cursor::new(file), 8).unwrap();
        assert_eq!(parsed, fh);
    }
}
