//! Data carrying blocks (##DT, ##SD) and assembly of fragmented payloads.
//!
//! A data link of a DG or CN may point at a single DT/SD block, a DZ block
//! holding one compressed, or a DL/HL list of fragments. [`read_payload`]
//! hides these variants and returns the concatenated bytes.

use std::collections::HashSet;
use std::io::{Read, Seek, SeekFrom};

use crate::{
    Error, Result,
    blocks::{
        common::{BlockCodec, BlockParse, RawBlock, encode_v4, u64_to_usize},
        data_list_block::{DataListBlock, HeaderListBlock},
        dz_block::DzBlock,
    },
};

/// DTBLOCK: fixed-size records of a data group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataBlock {
    pub data: Vec<u8>,
}

/// SDBLOCK: variable-length values, each `[u32 length][bytes]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalDataBlock {
    pub data: Vec<u8>,
}

impl BlockParse for DataBlock {
    const ID: &'static str = "##DT";

    fn from_raw(block: &RawBlock) -> Result<Self> {
        Ok(Self {
            data: block.data.clone(),
        })
    }
}

impl BlockParse for SignalDataBlock {
    const ID: &'static str = "##SD";

    fn from_raw(block: &RawBlock) -> Result<Self> {
        Ok(Self {
            data: block.data.clone(),
        })
    }
}

impl DataBlock {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Iterate over raw records of fixed size. Trailing bytes that do not
    /// fill a record are skipped.
    pub fn records(&self, record_size: usize) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(record_size.max(1))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode_v4(Self::ID, &[], &self.data)
    }
}

impl SignalDataBlock {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode_v4(Self::ID, &[], &self.data)
    }
}

/// Reads the complete payload behind `address`, following DZ, DL and HL
/// indirections. Returns an empty payload for a zero link.
pub fn read_payload<R: Read + Seek>(
    codec: &BlockCodec,
    stream: &mut R,
    address: u64,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut visited = HashSet::new();
    append_payload(codec, stream, address, &mut out, &mut visited)?;
    Ok(out)
}

/// Like [`read_payload`] for a file that was never finalized: a DT block at
/// `address` may still carry its placeholder length, so its data runs to the
/// end of the file.
pub fn read_payload_unfinalized<R: Read + Seek>(
    codec: &BlockCodec,
    stream: &mut R,
    address: u64,
) -> Result<Vec<u8>> {
    if address == 0 {
        return Ok(Vec::new());
    }
    if codec.peek_id(stream, address)? != DataBlock::ID {
        return read_payload(codec, stream, address);
    }
    let start = address + 24;
    let len = u64_to_usize(codec.file_size().saturating_sub(start), "unfinalized DT length")?;
    stream.seek(SeekFrom::Start(start))?;
    let mut data = vec![0u8; len];
    stream.read_exact(&mut data)?;
    Ok(data)
}

fn append_payload<R: Read + Seek>(
    codec: &BlockCodec,
    stream: &mut R,
    address: u64,
    out: &mut Vec<u8>,
    visited: &mut HashSet<u64>,
) -> Result<()> {
    if address == 0 {
        return Ok(());
    }
    if !visited.insert(address) {
        return Err(Error::BlockLinkError(format!(
            "data block chain revisits block at {address:#x}"
        )));
    }
    let raw = codec.decode_block(stream, address)?;
    match raw.id() {
        "##DT" | "##SD" | "##RD" => out.extend_from_slice(&raw.data),
        "##DZ" => out.extend(DzBlock::from_raw(&raw)?.decompress()?),
        "##DL" => {
            let mut dl = DataListBlock::from_raw(&raw)?;
            loop {
                for link in &dl.data_links {
                    append_payload(codec, stream, *link, out, visited)?;
                }
                if dl.next == 0 {
                    break;
                }
                if !visited.insert(dl.next) {
                    return Err(Error::BlockLinkError(format!(
                        "data list chain revisits block at {:#x}",
                        dl.next
                    )));
                }
                dl = DataListBlock::read_at(codec, stream, dl.next)?;
            }
        }
        "##HL" => {
            let hl = HeaderListBlock::from_raw(&raw)?;
            append_payload(codec, stream, hl.first_dl_addr, out, visited)?;
        }
        other => {
            return Err(Error::BlockIDError {
                actual: other.to_string(),
                expected: "##DT, ##SD, ##DZ, ##DL or ##HL".into(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::common::Generation;
    use std::io::Cursor;

    /// Lays out blocks one after another starting at offset 64.
    fn layout(blocks: Vec<Vec<u8>>) -> (Vec<u8>, Vec<u64>) {
        let mut file = vec![0u8; 64];
        let mut positions = Vec::new();
        for block in blocks {
            positions.push(file.len() as u64);
            file.extend(block);
        }
        (file, positions)
    }

    #[test]
    fn single_dt() {
        let (file, pos) = layout(vec![DataBlock::new(vec![1, 2, 3, 4]).to_bytes().unwrap()]);
        let codec = BlockCodec::new(Generation::Mdf4, file.len() as u64);
        let data = read_payload(&codec, &mut Cursor::new(file), pos[0]).unwrap();
        assert_eq!(data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn list_of_fragments_concatenates_in_order() {
        let a = DataBlock::new(vec![1, 2, 3, 4, 5, 6, 7, 8]).to_bytes().unwrap();
        let b = DataBlock::new(vec![9, 10, 11, 12, 13, 14, 15, 16]).to_bytes().unwrap();
        let a_len = a.len() as u64;
        let dl = DataListBlock::new(vec![64, 64 + a_len], &[8, 8]).to_bytes().unwrap();
        let (file, pos) = layout(vec![a, b, dl]);
        let codec = BlockCodec::new(Generation::Mdf4, file.len() as u64);
        let data = read_payload(&codec, &mut Cursor::new(file), pos[2]).unwrap();
        assert_eq!(data, (1..=16).collect::<Vec<u8>>());
    }

    #[test]
    fn zero_link_is_empty() {
        let codec = BlockCodec::new(Generation::Mdf4, 64);
        let data = read_payload(&codec, &mut Cursor::new(vec![0u8; 64]), 0).unwrap();
        assert!(data.is_empty());
    }

    #[test]
    fn unfinalized_dt_runs_to_end_of_file() {
        let mut dt = DataBlock::new(Vec::new()).to_bytes().unwrap();
        dt.extend_from_slice(&[7, 7, 7]);
        let (file, pos) = layout(vec![dt]);
        let codec = BlockCodec::new(Generation::Mdf4, file.len() as u64);
        let data = read_payload_unfinalized(&codec, &mut Cursor::new(file), pos[0]).unwrap();
        assert_eq!(data, vec![7, 7, 7]);
    }
}
