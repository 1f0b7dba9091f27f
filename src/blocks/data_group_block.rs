use super::DG_BLOCK_SIZE;
use crate::{
    Result,
    blocks::common::{BlockParse, RawBlock, encode_v4, read_u8, validate_buffer_size},
};

/// Data Group Block (##DG) - groups channel groups that share a data block.
///
/// A data group typically corresponds to one acquisition device. It contains
/// links to channel groups and the actual measurement data block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataGroupBlock {
    /// Link to next data group block (0 if last).
    pub next_dg_addr: u64,
    /// Link to first channel group block.
    pub first_cg_addr: u64,
    /// Link to data block (DT, DZ, DL, HL).
    pub data_block_addr: u64,
    /// Link to comment text/metadata block.
    pub comment_addr: u64,
    /// Size of record ID in bytes (0, 1, 2, 4, or 8).
    pub record_id_size: u8,
}

pub const DG_LINK_NEXT: u64 = 24;
pub const DG_LINK_CG: u64 = 32;
pub const DG_LINK_DATA: u64 = 40;

impl BlockParse for DataGroupBlock {
    const ID: &'static str = "##DG";

    fn from_raw(block: &RawBlock) -> Result<Self> {
        validate_buffer_size(&block.data, 1)?;
        Ok(Self {
            next_dg_addr: block.link(0),
            first_cg_addr: block.link(1),
            data_block_addr: block.link(2),
            comment_addr: block.link(3),
            record_id_size: read_u8(&block.data, 0),
        })
    }
}

impl DataGroupBlock {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut data = [0u8; 8];
        data[0] = self.record_id_size;
        let bytes = encode_v4(
            Self::ID,
            &[
                self.next_dg_addr,
                self.first_cg_addr,
                self.data_block_addr,
                self.comment_addr,
            ],
            &data,
        )?;
        debug_assert_eq!(bytes.len(), DG_BLOCK_SIZE);
        Ok(bytes)
    }
}
