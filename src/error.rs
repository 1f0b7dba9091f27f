//! Error types for MDF operations.
//!
//! This module defines the [`Error`] enum which represents all possible failures
//! that can occur when reading, writing, or converting MDF data. Every variant
//! maps onto one [`ErrorKind`], which is what callers usually branch on.
//!
//! # Example
//!
//! ```no_run
//! use mdf_engine::{ErrorKind, MdfReader, Result};
//!
//! fn structure(path: &str) -> Result<usize> {
//!     let mut reader = MdfReader::new(path)?;
//!     match reader.try_read_everything_but_data() {
//!         Ok(()) => Ok(reader.header().map_or(0, |h| h.data_groups.len())),
//!         Err(e) if e.kind() == ErrorKind::Format => {
//!             eprintln!("not an MDF file: {e}");
//!             Ok(0)
//!         }
//!         Err(e) => Err(e),
//!     }
//! }
//! ```

use thiserror::Error;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or unsupported block content.
    Format,
    /// Stream read/write/seek failure.
    Io,
    /// API called out of the required stage order.
    InvalidState,
    /// Sample index beyond the recorded count.
    OutOfRange,
    /// Value requested before the owning data group was loaded.
    NotRead,
    /// Conversion cannot be inverted.
    NotInvertible,
    /// The file handle was closed.
    Closed,
}

/// Step of `finalize_measurement` that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeStage {
    FlushSamples,
    WriteDataBlocks,
    WriteSignalData,
    WriteHistory,
    UpdateCounters,
    WriteIdentification,
}

impl core::fmt::Display for FinalizeStage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            FinalizeStage::FlushSamples => "flush samples",
            FinalizeStage::WriteDataBlocks => "write data blocks",
            FinalizeStage::WriteSignalData => "write signal data",
            FinalizeStage::WriteHistory => "write file history",
            FinalizeStage::UpdateCounters => "update counters",
            FinalizeStage::WriteIdentification => "write identification",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during MDF file operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Buffer provided for parsing was too small.
    ///
    /// This typically indicates file corruption or an incomplete read.
    #[error("buffer too small at {file}:{line}: need at least {expected} bytes, got {actual}")]
    TooShortBuffer {
        actual: usize,
        expected: usize,
        file: &'static str,
        line: u32,
    },

    /// The file identifier is neither "MDF     " nor "UnFinMF ".
    #[error("invalid file identifier: expected \"MDF     \", found {0:?}")]
    FileIdentifierError(String),

    /// The major version is neither 3 nor 4.
    #[error("unsupported MDF version {0}")]
    FileVersioningError(String),

    /// The version string in the identification block could not be parsed.
    #[error("invalid version string: {0}")]
    InvalidVersionString(String),

    /// A block identifier did not match the expected value.
    #[error("invalid block identifier: expected {expected:?}, got {actual:?}")]
    BlockIDError { actual: String, expected: String },

    /// A link points outside the file or to an unexpected block.
    #[error("block linking error: {0}")]
    BlockLinkError(String),

    /// Failed to serialize or deserialize a block.
    #[error("block serialization error: {0}")]
    BlockSerializationError(String),

    /// A conversion chain exceeded the maximum allowed depth.
    #[error("conversion chain too deep: maximum depth of {max_depth} exceeded")]
    ConversionChainTooDeep { max_depth: usize },

    /// Comment XML could not be parsed or written.
    #[error("metadata error: {0}")]
    Metadata(String),

    /// An algebraic conversion formula could not be parsed.
    #[error("invalid formula {formula:?}: {reason}")]
    Formula { formula: String, reason: String },

    /// An I/O error occurred while reading or writing the file.
    #[error("I/O error: {0}")]
    IOError(#[from] std::io::Error),

    /// Operation called in the wrong lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Sample index outside the recorded range.
    #[error("sample {index} out of range, channel has {count} samples")]
    OutOfRange { index: u64, count: u64 },

    /// Sample data for the data group has not been read.
    #[error("sample data not read for data group {0}")]
    NotRead(usize),

    /// The conversion has no inverse.
    #[error("conversion is not invertible: {0}")]
    NotInvertible(String),

    /// The reader or writer was closed.
    #[error("file handle is closed")]
    Closed,

    /// A step of `finalize_measurement` failed and the file is not finalized.
    #[error("finalize failed during {stage}: {source}")]
    Finalize {
        stage: FinalizeStage,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TooShortBuffer { .. }
            | Error::FileIdentifierError(_)
            | Error::FileVersioningError(_)
            | Error::InvalidVersionString(_)
            | Error::BlockIDError { .. }
            | Error::BlockLinkError(_)
            | Error::BlockSerializationError(_)
            | Error::ConversionChainTooDeep { .. }
            | Error::Metadata(_)
            | Error::Formula { .. } => ErrorKind::Format,
            Error::IOError(_) => ErrorKind::Io,
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::OutOfRange { .. } => ErrorKind::OutOfRange,
            Error::NotRead(_) => ErrorKind::NotRead,
            Error::NotInvertible(_) => ErrorKind::NotInvertible,
            Error::Closed => ErrorKind::Closed,
            Error::Finalize { source, .. } => source.kind(),
        }
    }

    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        Error::InvalidState(message.into())
    }
}

/// A specialized Result type for MDF operations.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_error_keeps_inner_kind() {
        let inner = Error::IOError(std::io::Error::other("disk full"));
        let err = Error::Finalize {
            stage: FinalizeStage::WriteDataBlocks,
            source: Box::new(inner),
        };
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("write data blocks"));
    }

    #[test]
    fn block_errors_are_format_errors() {
        let err = Error::BlockIDError {
            actual: "##XX".into(),
            expected: "##HD".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Format);
        assert_eq!(Error::Closed.kind(), ErrorKind::Closed);
    }
}
