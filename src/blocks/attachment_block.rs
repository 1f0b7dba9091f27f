//! Attachment Block (##AT) - embedded or referenced files.

use crate::{
    Result,
    blocks::{
        common::{BlockParse, RawBlock, encode_v4, read_u16, read_u64, u64_to_usize, validate_buffer_size},
        dz_block::{deflate, inflate},
    },
};

/// Attachment flags (`at_flags`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttachmentFlags(u16);

impl AttachmentFlags {
    pub const EMBEDDED: u16 = 0x0001;
    pub const COMPRESSED: u16 = 0x0002;
    pub const MD5_VALID: u16 = 0x0004;

    pub fn from_u16(value: u16) -> Self {
        Self(value)
    }

    pub fn as_u16(self) -> u16 {
        self.0
    }

    pub fn is_embedded(self) -> bool {
        self.0 & Self::EMBEDDED != 0
    }

    pub fn is_compressed(self) -> bool {
        self.0 & Self::COMPRESSED != 0
    }
}

/// Attachment Block (##AT).
///
/// Links: next AT, file name TX, MIME type TX, comment MD. The fixed data
/// section is followed by `embedded_size` bytes of (possibly zlib
/// compressed) payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentBlock {
    pub next_at_addr: u64,
    pub filename_addr: u64,
    pub mimetype_addr: u64,
    pub comment_addr: u64,
    pub flags: AttachmentFlags,
    pub creator_index: u16,
    pub md5_checksum: [u8; 16],
    pub original_size: u64,
    pub embedded_data: Vec<u8>,
}

pub const AT_LINK_NEXT: u64 = 24;

impl BlockParse for AttachmentBlock {
    const ID: &'static str = "##AT";

    fn from_raw(block: &RawBlock) -> Result<Self> {
        let d = &block.data;
        validate_buffer_size(d, 40)?;
        let mut md5_checksum = [0u8; 16];
        md5_checksum.copy_from_slice(&d[8..24]);
        let flags = AttachmentFlags::from_u16(read_u16(d, 0));
        let embedded_size = u64_to_usize(read_u64(d, 32), "attachment size")?;
        let embedded_data = if flags.is_embedded() {
            validate_buffer_size(d, 40 + embedded_size)?;
            d[40..40 + embedded_size].to_vec()
        } else {
            Vec::new()
        };
        Ok(Self {
            next_at_addr: block.link(0),
            filename_addr: block.link(1),
            mimetype_addr: block.link(2),
            comment_addr: block.link(3),
            flags,
            creator_index: read_u16(d, 2),
            md5_checksum,
            original_size: read_u64(d, 24),
            embedded_data,
        })
    }
}

impl AttachmentBlock {
    /// Reference to an external file.
    pub fn external(original_size: u64) -> Self {
        Self {
            original_size,
            ..Default::default()
        }
    }

    /// Embeds `data`, deflating it when `compress` is set.
    pub fn embedded(data: &[u8], compress: bool) -> Result<Self> {
        let (embedded_data, flags) = if compress {
            (
                deflate(data)?,
                AttachmentFlags::EMBEDDED | AttachmentFlags::COMPRESSED,
            )
        } else {
            (data.to_vec(), AttachmentFlags::EMBEDDED)
        };
        Ok(Self {
            flags: AttachmentFlags::from_u16(flags),
            original_size: data.len() as u64,
            embedded_data,
            ..Default::default()
        })
    }

    /// Original bytes of an embedded attachment, `None` for external ones.
    pub fn payload(&self) -> Result<Option<Vec<u8>>> {
        if !self.flags.is_embedded() {
            return Ok(None);
        }
        if self.flags.is_compressed() {
            let size = u64_to_usize(self.original_size, "attachment size")?;
            Ok(Some(inflate(&self.embedded_data, size)?))
        } else {
            Ok(Some(self.embedded_data.clone()))
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(40 + self.embedded_data.len() + 7);
        data.extend_from_slice(&self.flags.as_u16().to_le_bytes());
        data.extend_from_slice(&self.creator_index.to_le_bytes());
        data.extend_from_slice(&[0u8; 4]);
        data.extend_from_slice(&self.md5_checksum);
        data.extend_from_slice(&self.original_size.to_le_bytes());
        data.extend_from_slice(&(self.embedded_data.len() as u64).to_le_bytes());
        data.extend_from_slice(&self.embedded_data);
        encode_v4(
            Self::ID,
            &[
                self.next_at_addr,
                self.filename_addr,
                self.mimetype_addr,
                self.comment_addr,
            ],
            &data,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::common::{BlockCodec, Generation};
    use std::io::Cursor;

    fn reparse(block: &AttachmentBlock) -> AttachmentBlock {
        let mut file = vec![0u8; 8];
        file.extend(block.to_bytes().unwrap());
        let codec = BlockCodec::new(Generation::Mdf4, file.len() as u64);
        AttachmentBlock::read_at(&codec, &mut Cursor::new(file), 8).unwrap()
    }

    #[test]
    fn external_reference_has_no_payload() {
        let at = reparse(&AttachmentBlock::external(1234));
        assert_eq!(at.original_size, 1234);
        assert_eq!(at.payload().unwrap(), None);
    }

    #[test]
    fn embedded_round_trip() {
        let at = reparse(&AttachmentBlock::embedded(b"VERSION \"\"", false).unwrap());
        assert_eq!(at.payload().unwrap().as_deref(), Some(&b"VERSION \"\""[..]));
    }

    #[cfg(feature = "compression")]
    #[test]
    fn compressed_round_trip() {
        let text = "BO_ 12 Engine: 8 ECU\n".repeat(40);
        let block = AttachmentBlock::embedded(text.as_bytes(), true).unwrap();
        assert!(block.embedded_data.len() < text.len());
        let at = reparse(&block);
        assert!(at.flags.is_compressed());
        assert_eq!(at.payload().unwrap().unwrap(), text.as_bytes());
    }
}
