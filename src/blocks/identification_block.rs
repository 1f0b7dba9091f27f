// identification_block.rs
use super::ID_BLOCK_SIZE;
use crate::{
    Error, Result,
    blocks::common::{Generation, push_fixed_str, read_fixed_str, read_u16, validate_buffer_size},
};

/// File identifier of a finalized file.
pub const FINALIZED_ID: &str = "MDF     ";
/// File identifier of a file that was not finalized (MDF 3.30 and later).
pub const UNFINALIZED_ID: &str = "UnFinMF ";

/// Unfinalized flag: cycle counters in CG blocks are not up to date.
pub const UNFIN_CG_COUNTERS: u16 = 0x0001;
/// Unfinalized flag: the last DT block length is not up to date.
pub const UNFIN_DT_LENGTH: u16 = 0x0004;

/// Identification Block - file format identifier at the start of every MDF file.
///
/// The block has no block header and is always 64 bytes at offset 0. The
/// byte order, float format and code page fields only exist in MDF 3; MDF 4
/// keeps them reserved.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentificationBlock {
    /// "MDF     " or "UnFinMF ".
    pub file_id: String,
    /// Format version string (e.g., "4.10" or "3.30").
    pub format_version: String,
    /// Program identifier (tool that created the file), at most 8 characters.
    pub program_id: String,
    /// MDF3 byte order, 0 = little endian.
    pub byte_order: u16,
    /// MDF3 float format, 0 = IEEE 754.
    pub float_format: u16,
    /// Numeric version (e.g., 410 for version 4.10).
    pub version_number: u16,
    /// MDF3 code page.
    pub code_page: u16,
    /// Standard unfinalized flags (MDF4).
    pub unfinalized_flags: u16,
    /// Custom unfinalized flags (MDF4).
    pub custom_flags: u16,
}

impl Default for IdentificationBlock {
    fn default() -> Self {
        Self::new(Generation::Mdf4, "mdfeng")
    }
}

impl IdentificationBlock {
    pub fn new(generation: Generation, program_id: &str) -> Self {
        let (format_version, version_number) = match generation {
            Generation::Mdf3 => ("3.30", 330),
            Generation::Mdf4 => ("4.10", 410),
        };
        Self {
            file_id: FINALIZED_ID.to_string(),
            format_version: format_version.to_string(),
            program_id: program_id.to_string(),
            byte_order: 0,
            float_format: 0,
            version_number,
            code_page: 0,
            unfinalized_flags: 0,
            custom_flags: 0,
        }
    }

    /// Serializes the identification block (64 bytes).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(ID_BLOCK_SIZE);
        push_fixed_str(&mut buffer, &format!("{:<8}", self.file_id), 8);
        push_fixed_str(&mut buffer, &format!("{:<8}", self.format_version), 8);
        push_fixed_str(&mut buffer, &format!("{:<8}", self.program_id), 8);
        buffer.extend_from_slice(&self.byte_order.to_le_bytes());
        buffer.extend_from_slice(&self.float_format.to_le_bytes());
        buffer.extend_from_slice(&self.version_number.to_le_bytes());
        buffer.extend_from_slice(&self.code_page.to_le_bytes());
        buffer.extend_from_slice(&[0u8; 28]);
        buffer.extend_from_slice(&self.unfinalized_flags.to_le_bytes());
        buffer.extend_from_slice(&self.custom_flags.to_le_bytes());
        debug_assert_eq!(buffer.len(), ID_BLOCK_SIZE);
        Ok(buffer)
    }

    /// Parses the identification block, rejecting foreign files.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        validate_buffer_size(bytes, ID_BLOCK_SIZE)?;
        let file_id = String::from_utf8_lossy(&bytes[0..8]).into_owned();
        if file_id != FINALIZED_ID && file_id != UNFINALIZED_ID {
            return Err(Error::FileIdentifierError(file_id));
        }
        let block = Self {
            file_id,
            format_version: read_fixed_str(bytes, 8, 8),
            program_id: read_fixed_str(bytes, 16, 8),
            byte_order: read_u16(bytes, 24),
            float_format: read_u16(bytes, 26),
            version_number: read_u16(bytes, 28),
            code_page: read_u16(bytes, 30),
            unfinalized_flags: read_u16(bytes, 60),
            custom_flags: read_u16(bytes, 62),
        };
        block.generation()?;
        Ok(block)
    }

    /// Format generation from the version string, falling back to the
    /// numeric version.
    pub fn generation(&self) -> Result<Generation> {
        let (major, _) = parse_block_version(&self.format_version)
            .or_else(|_| Ok::<_, Error>((self.version_number / 100, self.version_number % 100)))?;
        match major {
            3 => Ok(Generation::Mdf3),
            4 => Ok(Generation::Mdf4),
            _ => Err(Error::FileVersioningError(self.format_version.clone())),
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.file_id == FINALIZED_ID && self.unfinalized_flags == 0
    }
}

/// Splits "4.10" into `(4, 10)`.
pub fn parse_block_version(version: &str) -> Result<(u16, u16)> {
    let trimmed = version.trim();
    let (major, minor) = trimmed
        .split_once('.')
        .ok_or_else(|| Error::InvalidVersionString(version.to_string()))?;
    let major = major
        .parse()
        .map_err(|_| Error::InvalidVersionString(version.to_string()))?;
    let minor = minor
        .parse()
        .map_err(|_| Error::InvalidVersionString(version.to_string()))?;
    Ok((major, minor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_mdf3_and_mdf4() {
        for generation in [Generation::Mdf3, Generation::Mdf4] {
            let block = IdentificationBlock::new(generation, "tester");
            let bytes = block.to_bytes().unwrap();
            assert_eq!(&bytes[0..8], b"MDF     ");
            let parsed = IdentificationBlock::from_bytes(&bytes).unwrap();
            assert_eq!(parsed, block);
            assert_eq!(parsed.generation().unwrap(), generation);
        }
    }

    #[test]
    fn foreign_magic_is_rejected() {
        let mut bytes = vec![b' '; 64];
        bytes[..8].copy_from_slice(b"VERSION ");
        assert!(matches!(
            IdentificationBlock::from_bytes(&bytes),
            Err(Error::FileIdentifierError(_))
        ));
    }

    #[test]
    fn unfinalized_marker() {
        let mut block = IdentificationBlock::default();
        block.file_id = UNFINALIZED_ID.into();
        block.unfinalized_flags = UNFIN_CG_COUNTERS | UNFIN_DT_LENGTH;
        let parsed = IdentificationBlock::from_bytes(&block.to_bytes().unwrap()).unwrap();
        assert!(!parsed.is_finalized());
    }

    #[test]
    fn version_parsing() {
        assert_eq!(parse_block_version("4.11    ").unwrap(), (4, 11));
        assert!(parse_block_version("four").is_err());
    }
}
