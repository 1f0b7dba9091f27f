use crate::{
    Error, Result,
    blocks::common::{BlockParse, RawBlock, encode_v4, read_u8, read_u32, read_u64, validate_buffer_size},
};

const DL_FLAG_EQUAL_LENGTH: u8 = 0x01;

/// DLBLOCK: ordered list of data fragments (DT, DZ, SD).
///
/// Either every fragment has the same length (`equal_length`) or each one
/// carries its offset into the concatenated payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataListBlock {
    pub next: u64,
    pub data_links: Vec<u64>,
    pub flags: u8,
    pub equal_length: Option<u64>,
    pub offsets: Vec<u64>,
}

impl BlockParse for DataListBlock {
    const ID: &'static str = "##DL";

    fn from_raw(block: &RawBlock) -> Result<Self> {
        let d = &block.data;
        validate_buffer_size(d, 8)?;
        let flags = read_u8(d, 0);
        let count = read_u32(d, 4) as usize;
        let data_links: Vec<u64> = block.links.iter().skip(1).copied().collect();
        if data_links.len() < count {
            return Err(Error::BlockLinkError(format!(
                "DL block declares {count} fragments but carries {} links",
                data_links.len()
            )));
        }

        let (equal_length, offsets) = if flags & DL_FLAG_EQUAL_LENGTH != 0 {
            validate_buffer_size(d, 16)?;
            (Some(read_u64(d, 8)), Vec::new())
        } else {
            validate_buffer_size(d, 8 + count * 8)?;
            (None, (0..count).map(|i| read_u64(d, 8 + i * 8)).collect())
        };

        Ok(Self {
            next: block.link(0),
            data_links: data_links[..count].to_vec(),
            flags,
            equal_length,
            offsets,
        })
    }
}

impl DataListBlock {
    /// List of fragments whose payload lengths are given in `lengths`.
    pub fn new(data_links: Vec<u64>, lengths: &[u64]) -> Self {
        let mut offsets = Vec::with_capacity(lengths.len());
        let mut running = 0u64;
        for len in lengths {
            offsets.push(running);
            running += len;
        }
        Self {
            next: 0,
            data_links,
            flags: 0,
            equal_length: None,
            offsets,
        }
    }

    pub fn new_equal(data_links: Vec<u64>, fragment_len: u64) -> Self {
        Self {
            next: 0,
            data_links,
            flags: DL_FLAG_EQUAL_LENGTH,
            equal_length: Some(fragment_len),
            offsets: Vec::new(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut links = Vec::with_capacity(self.data_links.len() + 1);
        links.push(self.next);
        links.extend_from_slice(&self.data_links);

        let mut data = Vec::with_capacity(16 + self.offsets.len() * 8);
        data.push(self.flags);
        data.extend_from_slice(&[0u8; 3]);
        data.extend_from_slice(&(self.data_links.len() as u32).to_le_bytes());
        match self.equal_length {
            Some(len) if self.flags & DL_FLAG_EQUAL_LENGTH != 0 => {
                data.extend_from_slice(&len.to_le_bytes());
            }
            _ => {
                if self.offsets.len() != self.data_links.len() {
                    return Err(Error::BlockSerializationError(format!(
                        "DL block has {} links but {} offsets",
                        self.data_links.len(),
                        self.offsets.len()
                    )));
                }
                for offset in &self.offsets {
                    data.extend_from_slice(&offset.to_le_bytes());
                }
            }
        }
        encode_v4(Self::ID, &links, &data)
    }
}

/// HLBLOCK: header list in front of a DL chain of compressed fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderListBlock {
    pub first_dl_addr: u64,
    pub flags: u16,
    pub zip_type: u8,
}

impl BlockParse for HeaderListBlock {
    const ID: &'static str = "##HL";

    fn from_raw(block: &RawBlock) -> Result<Self> {
        let d = &block.data;
        validate_buffer_size(d, 3)?;
        Ok(Self {
            first_dl_addr: block.link(0),
            flags: u16::from_le_bytes([d[0], d[1]]),
            zip_type: d[2],
        })
    }
}

impl HeaderListBlock {
    pub fn new(first_dl_addr: u64, zip_type: u8) -> Self {
        Self {
            first_dl_addr,
            flags: 0,
            zip_type,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(8);
        data.extend_from_slice(&self.flags.to_le_bytes());
        data.push(self.zip_type);
        data.extend_from_slice(&[0u8; 5]);
        encode_v4(Self::ID, &[self.first_dl_addr], &data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::common::{BlockCodec, Generation};
    use std::io::Cursor;

    fn reparse<T: BlockParse>(bytes: Vec<u8>) -> T {
        let mut file = vec![0u8; 8];
        file.extend(bytes);
        let codec = BlockCodec::new(Generation::Mdf4, file.len() as u64);
        T::read_at(&codec, &mut Cursor::new(file), 8).unwrap()
    }

    #[test]
    fn offsets_are_cumulative() {
        let dl = DataListBlock::new(vec![0x100, 0x200, 0x300], &[10, 20, 5]);
        assert_eq!(dl.offsets, vec![0, 10, 30]);
        let parsed: DataListBlock = reparse(dl.to_bytes().unwrap());
        assert_eq!(parsed, dl);
    }

    #[test]
    fn equal_length_list() {
        let dl = DataListBlock::new_equal(vec![0x100, 0x200], 4096);
        let parsed: DataListBlock = reparse(dl.to_bytes().unwrap());
        assert_eq!(parsed.equal_length, Some(4096));
        assert_eq!(parsed.data_links, vec![0x100, 0x200]);
    }

    #[test]
    fn header_list_round_trip() {
        let hl = HeaderListBlock::new(0x800, 1);
        let parsed: HeaderListBlock = reparse(hl.to_bytes().unwrap());
        assert_eq!(parsed, hl);
    }
}
