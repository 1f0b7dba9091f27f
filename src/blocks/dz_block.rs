//! DZ Block - Compressed Data Block
//!
//! The DZ block contains zlib-compressed data that represents another block type
//! (typically DT or SD). Compression and decompression require the
//! `compression` feature.

use crate::{
    Error, Result,
    blocks::common::{BlockParse, RawBlock, encode_v4, read_u8, read_u32, read_u64, u64_to_usize, validate_buffer_size},
};

/// Compression algorithm used in DZ block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DzCompressionType {
    /// Deflate only (zlib).
    Deflate = 0,
    /// Transposition followed by deflate.
    TranspositionDeflate = 1,
}

impl DzCompressionType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Deflate),
            1 => Some(Self::TranspositionDeflate),
            _ => None,
        }
    }
}

/// DZ Block - Zlib compressed data block.
///
/// Data section after the block header:
/// - original block type (2 bytes, e.g. "DT")
/// - compression type (1 byte), reserved (1 byte)
/// - zip parameter (4 bytes, column count for transposition)
/// - original data length (8 bytes), compressed data length (8 bytes)
/// - compressed data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DzBlock {
    pub original_block_type: [u8; 2],
    pub zip_type: DzCompressionType,
    pub zip_parameter: u32,
    pub original_data_length: u64,
    pub data: Vec<u8>,
}

/// DZ block header size (standard 24 + DZ-specific 24 = 48 bytes).
pub const DZ_HEADER_SIZE: usize = 48;

impl BlockParse for DzBlock {
    const ID: &'static str = "##DZ";

    fn from_raw(block: &RawBlock) -> Result<Self> {
        let d = &block.data;
        validate_buffer_size(d, DZ_HEADER_SIZE - 24)?;
        let zip_type_raw = read_u8(d, 2);
        let zip_type = DzCompressionType::from_u8(zip_type_raw).ok_or_else(|| {
            Error::BlockSerializationError(format!("unknown DZ compression type: {zip_type_raw}"))
        })?;
        let compressed_len = u64_to_usize(read_u64(d, 16), "DZ compressed length")?;
        validate_buffer_size(d, 24 + compressed_len)?;
        Ok(Self {
            original_block_type: [d[0], d[1]],
            zip_type,
            zip_parameter: read_u32(d, 4),
            original_data_length: read_u64(d, 8),
            data: d[24..24 + compressed_len].to_vec(),
        })
    }
}

impl DzBlock {
    /// Compresses the payload of a `block_type` ("DT", "SD") block. A nonzero
    /// `record_size` selects transposition so equal bytes of consecutive
    /// records end up next to each other.
    pub fn compress(block_type: &str, payload: &[u8], record_size: usize) -> Result<Self> {
        let mut original_block_type = [0u8; 2];
        for (slot, b) in original_block_type.iter_mut().zip(block_type.bytes()) {
            *slot = b;
        }
        let transpose = record_size > 1 && payload.len() >= record_size * 2;
        let (zip_type, zip_parameter, data) = if transpose {
            (
                DzCompressionType::TranspositionDeflate,
                record_size as u32,
                deflate(&transpose_bytes(payload, record_size))?,
            )
        } else {
            (DzCompressionType::Deflate, 0, deflate(payload)?)
        };
        Ok(Self {
            original_block_type,
            zip_type,
            zip_parameter,
            original_data_length: payload.len() as u64,
            data,
        })
    }

    /// Original block type as text.
    pub fn original_type(&self) -> String {
        String::from_utf8_lossy(&self.original_block_type).into_owned()
    }

    /// Decompress the block data, undoing transposition if used.
    pub fn decompress(&self) -> Result<Vec<u8>> {
        let len = u64_to_usize(self.original_data_length, "DZ original length")?;
        let decompressed = inflate(&self.data, len)?;
        match self.zip_type {
            DzCompressionType::Deflate => Ok(decompressed),
            DzCompressionType::TranspositionDeflate => {
                let columns = self.zip_parameter as usize;
                if columns == 0 {
                    return Err(Error::BlockSerializationError(
                        "DZ transposition with zero columns".into(),
                    ));
                }
                Ok(untranspose_bytes(&decompressed, columns))
            }
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(24 + self.data.len());
        data.extend_from_slice(&self.original_block_type);
        data.push(self.zip_type as u8);
        data.push(0);
        data.extend_from_slice(&self.zip_parameter.to_le_bytes());
        data.extend_from_slice(&self.original_data_length.to_le_bytes());
        data.extend_from_slice(&(self.data.len() as u64).to_le_bytes());
        data.extend_from_slice(&self.data);
        encode_v4(Self::ID, &[], &data)
    }
}

/// Transposes whole records into column-major order; the tail that does not
/// fill a record stays as is.
fn transpose_bytes(data: &[u8], columns: usize) -> Vec<u8> {
    let rows = data.len() / columns;
    let body = rows * columns;
    let mut out = Vec::with_capacity(data.len());
    for col in 0..columns {
        for row in 0..rows {
            out.push(data[row * columns + col]);
        }
    }
    out.extend_from_slice(&data[body..]);
    out
}

fn untranspose_bytes(data: &[u8], columns: usize) -> Vec<u8> {
    let rows = data.len() / columns;
    let body = rows * columns;
    let mut out = vec![0u8; data.len()];
    for col in 0..columns {
        for row in 0..rows {
            out[row * columns + col] = data[col * rows + row];
        }
    }
    out[body..].copy_from_slice(&data[body..]);
    out
}

/// zlib-compresses `data`.
#[cfg(feature = "compression")]
pub fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    Ok(miniz_oxide::deflate::compress_to_vec_zlib(data, 6))
}

#[cfg(not(feature = "compression"))]
pub fn deflate(_data: &[u8]) -> Result<Vec<u8>> {
    Err(Error::BlockSerializationError(
        "compression requires the `compression` feature".into(),
    ))
}

/// Inflates zlib `data`, checking the result against `expected_len`.
#[cfg(feature = "compression")]
pub fn inflate(data: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let out = miniz_oxide::inflate::decompress_to_vec_zlib(data)
        .map_err(|e| Error::BlockSerializationError(format!("decompression failed: {e:?}")))?;
    if out.len() != expected_len {
        return Err(Error::BlockSerializationError(format!(
            "decompressed size mismatch: expected {expected_len}, got {}",
            out.len()
        )));
    }
    Ok(out)
}

#[cfg(not(feature = "compression"))]
pub fn inflate(_data: &[u8], _expected_len: usize) -> Result<Vec<u8>> {
    Err(Error::BlockSerializationError(
        "decompression requires the `compression` feature".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transposition_is_reversible_with_tail() {
        let data: Vec<u8> = (0..23).collect();
        let t = transpose_bytes(&data, 4);
        assert_eq!(&t[..5], &[0, 4, 8, 12, 16]);
        assert_eq!(untranspose_bytes(&t, 4), data);
    }

    #[cfg(feature = "compression")]
    #[test]
    fn compress_round_trip_through_block_bytes() {
        use crate::blocks::common::{BlockCodec, Generation};
        use std::io::Cursor;

        let records: Vec<u8> = (0..400u32).flat_map(|i| (i as u16).to_le_bytes()).collect();
        let dz = DzBlock::compress("DT", &records, 2).unwrap();
        assert_eq!(dz.zip_type, DzCompressionType::TranspositionDeflate);

        let mut file = vec![0u8; 8];
        file.extend(dz.to_bytes().unwrap());
        let codec = BlockCodec::new(Generation::Mdf4, file.len() as u64);
        let parsed = DzBlock::read_at(&codec, &mut Cursor::new(file), 8).unwrap();
        assert_eq!(parsed.original_type(), "DT");
        assert_eq!(parsed.decompress().unwrap(), records);
    }

    #[cfg(feature = "compression")]
    #[test]
    fn size_mismatch_is_an_error() {
        let compressed = deflate(b"test").unwrap();
        assert!(inflate(&compressed, 100).is_err());
    }
}
