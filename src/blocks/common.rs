// blocks/common.rs
//! Common types, traits, and helper functions for MDF block coding.
//!
//! This module provides:
//! - [`BlockHeader`]: the header present in all MDF blocks of both generations
//! - [`RawBlock`]: a decoded but untyped block (header, links, payload)
//! - [`BlockCodec`]: generation aware `decode_block` / `encode_block`
//! - [`BlockParse`]: trait for typed blocks built from a [`RawBlock`]
//! - [`DataType`]: raw sample data types
//! - Byte parsing helpers

use std::io::{Read, Seek, SeekFrom};

use crate::{Error, Result};

// ============================================================================
// Byte Parsing Helpers
// ============================================================================
// Callers validate the slice length first with `validate_buffer_size`.

#[inline]
pub fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(b)
}

#[inline]
pub fn read_i64(bytes: &[u8], offset: usize) -> i64 {
    read_u64(bytes, offset) as i64
}

#[inline]
pub fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(b)
}

#[inline]
pub fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

#[inline]
pub fn read_i16(bytes: &[u8], offset: usize) -> i16 {
    read_u16(bytes, offset) as i16
}

#[inline]
pub fn read_f64(bytes: &[u8], offset: usize) -> f64 {
    f64::from_bits(read_u64(bytes, offset))
}

#[inline]
pub fn read_u8(bytes: &[u8], offset: usize) -> u8 {
    bytes[offset]
}

/// Reads a fixed-size, NUL padded Latin-1 field.
pub fn read_fixed_str(bytes: &[u8], offset: usize, len: usize) -> String {
    let field = &bytes[offset..offset + len];
    let end = field.iter().position(|&b| b == 0).unwrap_or(len);
    field[..end]
        .iter()
        .map(|&b| b as char)
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// Writes `text` into a fixed-size, NUL padded field, truncating if needed.
pub fn push_fixed_str(buffer: &mut Vec<u8>, text: &str, len: usize) {
    let mut field = vec![0u8; len];
    for (slot, ch) in field.iter_mut().zip(text.chars()) {
        *slot = if (ch as u32) < 256 { ch as u8 } else { b'?' };
    }
    buffer.extend_from_slice(&field);
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a buffer has at least `expected` bytes.
#[inline]
pub fn validate_buffer_size(bytes: &[u8], expected: usize) -> Result<()> {
    if bytes.len() < expected {
        return Err(Error::TooShortBuffer {
            actual: bytes.len(),
            expected,
            file: file!(),
            line: line!(),
        });
    }
    Ok(())
}

/// Validate that a block header has the expected ID.
#[inline]
pub fn validate_block_id(header: &BlockHeader, expected_id: &str) -> Result<()> {
    if header.id != expected_id {
        return Err(Error::BlockIDError {
            actual: header.id.clone(),
            expected: expected_id.to_string(),
        });
    }
    Ok(())
}

/// Calculate padding needed to reach 8-byte alignment.
#[inline]
pub const fn padding_to_align_8(size: usize) -> usize {
    (8 - (size % 8)) % 8
}

/// Safely convert a u64 offset/address to usize for indexing.
#[inline]
pub fn u64_to_usize(value: u64, context: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| {
        Error::BlockSerializationError(format!(
            "{context} value {value} exceeds maximum addressable size on this platform"
        ))
    })
}

// ============================================================================
// Block header and raw blocks
// ============================================================================

/// On-disk format generation, fixed once the identification block is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Generation {
    /// MDF 3.x: 2-character ids, u16 block size, u32 links.
    Mdf3,
    /// MDF 4.x: `##XX` ids, u64 length and links, 8-byte alignment.
    Mdf4,
}

impl Generation {
    pub fn header_size(self) -> usize {
        match self {
            Generation::Mdf3 => 4,
            Generation::Mdf4 => 24,
        }
    }

    pub fn link_size(self) -> usize {
        match self {
            Generation::Mdf3 => 4,
            Generation::Mdf4 => 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockHeader {
    /// Block type identifier ("##HD" in MDF4, "HD" in MDF3).
    pub id: String,
    /// Reserved field, always 0 (MDF4 only).
    pub reserved: u32,
    /// Total length of the block in bytes, including this header.
    pub length: u64,
    /// Number of link fields (MDF4 only; MDF3 blocks imply it from their type).
    pub link_count: u64,
}

impl BlockHeader {
    pub fn new(id: &str, length: u64, link_count: u64) -> Self {
        Self {
            id: id.to_string(),
            reserved: 0,
            length,
            link_count,
        }
    }

    /// Serializes the 24-byte MDF4 header.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let id = self.id.as_bytes();
        if id.len() != 4 {
            return Err(Error::BlockSerializationError(format!(
                "MDF4 block id must be 4 bytes, got {:?}",
                self.id
            )));
        }
        let mut buffer = Vec::with_capacity(24);
        buffer.extend_from_slice(id);
        buffer.extend_from_slice(&self.reserved.to_le_bytes());
        buffer.extend_from_slice(&self.length.to_le_bytes());
        buffer.extend_from_slice(&self.link_count.to_le_bytes());
        Ok(buffer)
    }

    /// Parses the 24-byte MDF4 header.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        validate_buffer_size(bytes, 24)?;
        Ok(Self {
            id: String::from_utf8_lossy(&bytes[0..4]).into_owned(),
            reserved: read_u32(bytes, 4),
            length: read_u64(bytes, 8),
            link_count: read_u64(bytes, 16),
        })
    }

    /// Serializes the 4-byte MDF3 header.
    pub fn to_bytes_v3(&self) -> Result<Vec<u8>> {
        let id = self.id.as_bytes();
        if id.len() != 2 {
            return Err(Error::BlockSerializationError(format!(
                "MDF3 block id must be 2 bytes, got {:?}",
                self.id
            )));
        }
        let size = u16::try_from(self.length).map_err(|_| {
            Error::BlockSerializationError(format!(
                "{} block of {} bytes exceeds the MDF3 size limit",
                self.id, self.length
            ))
        })?;
        let mut buffer = Vec::with_capacity(4);
        buffer.extend_from_slice(id);
        buffer.extend_from_slice(&size.to_le_bytes());
        Ok(buffer)
    }

    /// Parses the 4-byte MDF3 header.
    pub fn from_bytes_v3(bytes: &[u8]) -> Result<Self> {
        validate_buffer_size(bytes, 4)?;
        Ok(Self {
            id: String::from_utf8_lossy(&bytes[0..2]).into_owned(),
            reserved: 0,
            length: u64::from(read_u16(bytes, 2)),
            link_count: 0,
        })
    }
}

/// A block read from disk, not yet interpreted.
#[derive(Debug, Clone)]
pub struct RawBlock {
    /// File position of the block header.
    pub position: u64,
    pub header: BlockHeader,
    /// Link section (MDF4 only; MDF3 links live at the start of `data`).
    pub links: Vec<u64>,
    /// Everything after the header and link section.
    pub data: Vec<u8>,
}

impl RawBlock {
    /// Link `index`, or 0 ("absent") when the block has fewer links.
    pub fn link(&self, index: usize) -> u64 {
        self.links.get(index).copied().unwrap_or(0)
    }

    /// MDF3 link `index`, read from the start of the payload.
    pub fn link_v3(&self, index: usize) -> u64 {
        let offset = index * 4;
        if offset + 4 <= self.data.len() {
            u64::from(read_u32(&self.data, offset))
        } else {
            0
        }
    }

    pub fn id(&self) -> &str {
        &self.header.id
    }
}

/// Generation aware block encoder/decoder.
#[derive(Debug, Clone, Copy)]
pub struct BlockCodec {
    generation: Generation,
    file_size: u64,
}

impl BlockCodec {
    pub fn new(generation: Generation, file_size: u64) -> Self {
        Self {
            generation,
            file_size,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Reads and splits the block at `offset`.
    pub fn decode_block<R: Read + Seek>(&self, stream: &mut R, offset: u64) -> Result<RawBlock> {
        if offset == 0 {
            return Err(Error::BlockLinkError(
                "attempted to follow an absent (zero) link".into(),
            ));
        }
        let header_size = self.generation.header_size() as u64;
        if offset.saturating_add(header_size) > self.file_size {
            return Err(Error::BlockLinkError(format!(
                "block at {offset:#x} starts beyond the end of the file ({} bytes)",
                self.file_size
            )));
        }
        stream.seek(SeekFrom::Start(offset))?;
        let mut head = vec![0u8; header_size as usize];
        read_exact_or_short(stream, &mut head)?;

        let header = match self.generation {
            Generation::Mdf4 => BlockHeader::from_bytes(&head)?,
            Generation::Mdf3 => BlockHeader::from_bytes_v3(&head)?,
        };
        if !header.id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'#') {
            return Err(Error::BlockIDError {
                actual: header.id.clone(),
                expected: "a block id".into(),
            });
        }
        if header.length < header_size || offset.saturating_add(header.length) > self.file_size {
            return Err(Error::BlockSerializationError(format!(
                "{} block at {offset:#x} declares invalid length {}",
                header.id, header.length
            )));
        }
        let body_len = u64_to_usize(header.length - header_size, "block length")?;
        let mut body = vec![0u8; body_len];
        read_exact_or_short(stream, &mut body)?;

        let (links, data) = match self.generation {
            Generation::Mdf4 => {
                let link_bytes = header
                    .link_count
                    .checked_mul(8)
                    .and_then(|n| usize::try_from(n).ok())
                    .filter(|&n| n <= body.len())
                    .ok_or_else(|| {
                        Error::BlockSerializationError(format!(
                            "{} block at {offset:#x} declares {} links in {} bytes",
                            header.id, header.link_count, header.length
                        ))
                    })?;
                let links = body[..link_bytes]
                    .chunks_exact(8)
                    .map(|c| read_u64(c, 0))
                    .collect();
                (links, body[link_bytes..].to_vec())
            }
            Generation::Mdf3 => (Vec::new(), body),
        };

        Ok(RawBlock {
            position: offset,
            header,
            links,
            data,
        })
    }

    /// Reads only the block id at `offset`.
    pub fn peek_id<R: Read + Seek>(&self, stream: &mut R, offset: u64) -> Result<String> {
        let len = match self.generation {
            Generation::Mdf4 => 4,
            Generation::Mdf3 => 2,
        };
        stream.seek(SeekFrom::Start(offset))?;
        let mut id = vec![0u8; len];
        read_exact_or_short(stream, &mut id)?;
        Ok(String::from_utf8_lossy(&id).into_owned())
    }

    /// Serializes a block. The output is deterministic for identical input;
    /// alignment padding between blocks is the caller's concern.
    pub fn encode_block(&self, id: &str, links: &[u64], data: &[u8]) -> Result<Vec<u8>> {
        match self.generation {
            Generation::Mdf4 => {
                let length = 24 + links.len() * 8 + data.len();
                let header = BlockHeader::new(id, length as u64, links.len() as u64);
                let mut out = header.to_bytes()?;
                out.reserve(length - 24);
                for link in links {
                    out.extend_from_slice(&link.to_le_bytes());
                }
                out.extend_from_slice(data);
                Ok(out)
            }
            Generation::Mdf3 => {
                let length = 4 + links.len() * 4 + data.len();
                let header = BlockHeader::new(id, length as u64, 0);
                let mut out = header.to_bytes_v3()?;
                for link in links {
                    let link = u32::try_from(*link).map_err(|_| {
                        Error::BlockLinkError(format!(
                            "link {link:#x} does not fit the 32-bit MDF3 address space"
                        ))
                    })?;
                    out.extend_from_slice(&link.to_le_bytes());
                }
                out.extend_from_slice(data);
                Ok(out)
            }
        }
    }
}

/// Encodes an MDF4 block.
pub fn encode_v4(id: &str, links: &[u64], data: &[u8]) -> Result<Vec<u8>> {
    BlockCodec::new(Generation::Mdf4, u64::MAX).encode_block(id, links, data)
}

/// Encodes an MDF3 block.
pub fn encode_v3(id: &str, links: &[u64], data: &[u8]) -> Result<Vec<u8>> {
    BlockCodec::new(Generation::Mdf3, u64::MAX).encode_block(id, links, data)
}

fn read_exact_or_short<R: Read>(stream: &mut R, buf: &mut [u8]) -> Result<()> {
    stream.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::TooShortBuffer {
                actual: 0,
                expected: buf.len(),
                file: file!(),
                line: line!(),
            }
        } else {
            Error::IOError(e)
        }
    })
}

/// Typed view of a [`RawBlock`].
pub trait BlockParse: Sized {
    const ID: &'static str;

    fn from_raw(block: &RawBlock) -> Result<Self>;

    /// Decodes the block at `offset` and checks its id.
    fn read_at<R: Read + Seek>(codec: &BlockCodec, stream: &mut R, offset: u64) -> Result<Self> {
        let raw = codec.decode_block(stream, offset)?;
        validate_block_id(&raw.header, Self::ID)?;
        Self::from_raw(&raw)
    }
}

// ============================================================================
// Data types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataType {
    #[default]
    UnsignedIntegerLE,
    UnsignedIntegerBE,
    SignedIntegerLE,
    SignedIntegerBE,
    FloatLE,
    FloatBE,
    StringLatin1,
    StringUtf8,
    StringUtf16LE,
    StringUtf16BE,
    ByteArray,
    MimeSample,
    MimeStream,
    CanOpenDate,
    CanOpenTime,
    ComplexLE,
    ComplexBE,
}

impl DataType {
    /// MDF4 `cn_data_type` code.
    pub fn to_u8(&self) -> u8 {
        match self {
            DataType::UnsignedIntegerLE => 0,
            DataType::UnsignedIntegerBE => 1,
            DataType::SignedIntegerLE => 2,
            DataType::SignedIntegerBE => 3,
            DataType::FloatLE => 4,
            DataType::FloatBE => 5,
            DataType::StringLatin1 => 6,
            DataType::StringUtf8 => 7,
            DataType::StringUtf16LE => 8,
            DataType::StringUtf16BE => 9,
            DataType::ByteArray => 10,
            DataType::MimeSample => 11,
            DataType::MimeStream => 12,
            DataType::CanOpenDate => 13,
            DataType::CanOpenTime => 14,
            DataType::ComplexLE => 15,
            DataType::ComplexBE => 16,
        }
    }

    /// Parses an MDF4 `cn_data_type` code.
    pub fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            0 => DataType::UnsignedIntegerLE,
            1 => DataType::UnsignedIntegerBE,
            2 => DataType::SignedIntegerLE,
            3 => DataType::SignedIntegerBE,
            4 => DataType::FloatLE,
            5 => DataType::FloatBE,
            6 => DataType::StringLatin1,
            7 => DataType::StringUtf8,
            8 => DataType::StringUtf16LE,
            9 => DataType::StringUtf16BE,
            10 => DataType::ByteArray,
            11 => DataType::MimeSample,
            12 => DataType::MimeStream,
            13 => DataType::CanOpenDate,
            14 => DataType::CanOpenTime,
            15 => DataType::ComplexLE,
            16 => DataType::ComplexBE,
            other => {
                return Err(Error::BlockSerializationError(format!(
                    "unknown channel data type {other}"
                )));
            }
        })
    }

    /// MDF3 `signal data type` code, with explicit byte order for integers
    /// and floats.
    pub fn to_v3(&self, bit_count: u32) -> u16 {
        match self {
            DataType::UnsignedIntegerLE => 0,
            DataType::SignedIntegerLE => 1,
            DataType::FloatLE if bit_count == 32 => 2,
            DataType::FloatLE => 3,
            DataType::StringLatin1 | DataType::StringUtf8 => 7,
            DataType::UnsignedIntegerBE => 9,
            DataType::SignedIntegerBE => 10,
            DataType::FloatBE if bit_count == 32 => 11,
            DataType::FloatBE => 12,
            _ => 8,
        }
    }

    /// Parses an MDF3 `signal data type`. Codes 0-3 use the file byte order,
    /// which is always little endian for files this crate accepts.
    pub fn from_v3(code: u16) -> Result<Self> {
        Ok(match code {
            0 | 13 => DataType::UnsignedIntegerLE,
            1 | 14 => DataType::SignedIntegerLE,
            2 | 3 | 15 | 16 => DataType::FloatLE,
            7 => DataType::StringLatin1,
            8 => DataType::ByteArray,
            9 => DataType::UnsignedIntegerBE,
            10 => DataType::SignedIntegerBE,
            11 | 12 => DataType::FloatBE,
            other => {
                return Err(Error::BlockSerializationError(format!(
                    "unknown MDF3 signal data type {other}"
                )));
            }
        })
    }

    /// Typical bit width used when a channel is created without one.
    pub fn default_bits(&self) -> u32 {
        match self {
            DataType::UnsignedIntegerLE
            | DataType::UnsignedIntegerBE
            | DataType::SignedIntegerLE
            | DataType::SignedIntegerBE => 32,
            DataType::FloatLE | DataType::FloatBE => 64,
            DataType::StringLatin1
            | DataType::StringUtf8
            | DataType::StringUtf16LE
            | DataType::StringUtf16BE
            | DataType::ByteArray
            | DataType::MimeSample
            | DataType::MimeStream => 8,
            DataType::CanOpenDate => 56,
            DataType::CanOpenTime => 48,
            DataType::ComplexLE | DataType::ComplexBE => 128,
        }
    }

    pub fn is_big_endian(&self) -> bool {
        matches!(
            self,
            DataType::UnsignedIntegerBE
                | DataType::SignedIntegerBE
                | DataType::FloatBE
                | DataType::StringUtf16BE
                | DataType::ComplexBE
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DataType::FloatLE | DataType::FloatBE)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DataType::UnsignedIntegerLE
                | DataType::UnsignedIntegerBE
                | DataType::SignedIntegerLE
                | DataType::SignedIntegerBE
        )
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, DataType::SignedIntegerLE | DataType::SignedIntegerBE)
    }

    pub fn is_string(&self) -> bool {
        matches!(
            self,
            DataType::StringLatin1
                | DataType::StringUtf8
                | DataType::StringUtf16LE
                | DataType::StringUtf16BE
        )
    }

    /// Strings, byte arrays and MIME data, stored as whole bytes.
    pub fn is_byte_sequence(&self) -> bool {
        self.is_string()
            || matches!(
                self,
                DataType::ByteArray | DataType::MimeSample | DataType::MimeStream
            )
    }
}

impl core::fmt::Display for DataType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DataType::UnsignedIntegerLE => write!(f, "uint (LE)"),
            DataType::UnsignedIntegerBE => write!(f, "uint (BE)"),
            DataType::SignedIntegerLE => write!(f, "int (LE)"),
            DataType::SignedIntegerBE => write!(f, "int (BE)"),
            DataType::FloatLE => write!(f, "float (LE)"),
            DataType::FloatBE => write!(f, "float (BE)"),
            DataType::StringLatin1 => write!(f, "string (Latin-1)"),
            DataType::StringUtf8 => write!(f, "string (UTF-8)"),
            DataType::StringUtf16LE => write!(f, "string (UTF-16 LE)"),
            DataType::StringUtf16BE => write!(f, "string (UTF-16 BE)"),
            DataType::ByteArray => write!(f, "byte array"),
            DataType::MimeSample => write!(f, "MIME sample"),
            DataType::MimeStream => write!(f, "MIME stream"),
            DataType::CanOpenDate => write!(f, "CANopen date"),
            DataType::CanOpenTime => write!(f, "CANopen time"),
            DataType::ComplexLE => write!(f, "complex (LE)"),
            DataType::ComplexBE => write!(f, "complex (BE)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn encode_is_deterministic_and_decodes_back() {
        let codec = BlockCodec::new(Generation::Mdf4, u64::MAX);
        let a = codec.encode_block("##DG", &[0, 0x40, 0, 0], &[1, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        let b = codec.encode_block("##DG", &[0, 0x40, 0, 0], &[1, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let mut file = vec![0u8; 8];
        file.extend_from_slice(&a);
        let codec = BlockCodec::new(Generation::Mdf4, file.len() as u64);
        let raw = codec.decode_block(&mut Cursor::new(file), 8).unwrap();
        assert_eq!(raw.id(), "##DG");
        assert_eq!(raw.links, vec![0, 0x40, 0, 0]);
        assert_eq!(raw.link(7), 0);
        assert_eq!(raw.data[0], 1);
    }

    #[test]
    fn truncated_block_is_rejected() {
        let codec = BlockCodec::new(Generation::Mdf4, u64::MAX);
        let mut bytes = codec.encode_block("##TX", &[], b"hello\0\0\0").unwrap();
        bytes.truncate(28);
        let mut file = vec![0u8; 8];
        file.extend_from_slice(&bytes);
        let codec = BlockCodec::new(Generation::Mdf4, file.len() as u64);
        assert!(codec.decode_block(&mut Cursor::new(file), 8).is_err());
    }

    #[test]
    fn zero_link_is_never_followed() {
        let codec = BlockCodec::new(Generation::Mdf4, 100);
        let err = codec.decode_block(&mut Cursor::new(vec![0u8; 100]), 0).unwrap_err();
        assert!(matches!(err, Error::BlockLinkError(_)));
    }

    #[test]
    fn mdf3_header_round_trip() {
        let codec = BlockCodec::new(Generation::Mdf3, u64::MAX);
        let bytes = codec.encode_block("TX", &[], b"abc\0").unwrap();
        assert_eq!(&bytes[..4], &[b'T', b'X', 8, 0]);
        let header = BlockHeader::from_bytes_v3(&bytes).unwrap();
        assert_eq!(header.id, "TX");
        assert_eq!(header.length, 8);
    }

    #[test]
    fn mdf3_links_must_fit_u32() {
        let codec = BlockCodec::new(Generation::Mdf3, u64::MAX);
        assert!(codec.encode_block("DG", &[1 << 40], &[]).is_err());
    }

    #[test]
    fn data_type_codes() {
        for code in 0..=16u8 {
            assert_eq!(DataType::from_u8(code).unwrap().to_u8(), code);
        }
        assert!(DataType::from_u8(42).is_err());
        assert_eq!(DataType::from_v3(3).unwrap(), DataType::FloatLE);
        assert_eq!(DataType::FloatLE.to_v3(32), 2);
        assert_eq!(DataType::SignedIntegerBE.to_v3(16), 10);
    }

    #[test]
    fn fixed_strings() {
        let mut buf = Vec::new();
        push_fixed_str(&mut buf, "engine", 8);
        assert_eq!(buf.len(), 8);
        assert_eq!(read_fixed_str(&buf, 0, 8), "engine");
    }
}
