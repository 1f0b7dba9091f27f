// src/blocks/mod.rs

// ============================================================================
// Block Size Constants
// ============================================================================
// Fixed sizes of MDF 4.x block structures. Variable-length blocks (TX, MD, DT,
// SD, DL, DZ, CC, EV, AT) are sized by their header length.

/// Identification block size (64 bytes) - file format identifier at offset 0.
pub(crate) const ID_BLOCK_SIZE: usize = 64;

/// Header block size (104 bytes) - file-level metadata after identification.
pub(crate) const HD_BLOCK_SIZE: usize = 104;

/// File history block size (56 bytes).
pub(crate) const FH_BLOCK_SIZE: usize = 56;

/// Data group block size (64 bytes) - groups channel groups sharing data.
pub(crate) const DG_BLOCK_SIZE: usize = 64;

/// Channel group block size (104 bytes) - groups channels with common time base.
pub(crate) const CG_BLOCK_SIZE: usize = 104;

/// Channel block size (160 bytes) - defines a single measurement channel.
pub(crate) const CN_BLOCK_SIZE: usize = 160;

/// Source block size (56 bytes) - describes data acquisition source.
pub(crate) const SI_BLOCK_SIZE: usize = 56;

// ============================================================================
// Submodules
// ============================================================================

pub mod attachment_block;
pub mod channel_array_block;
pub mod channel_block;
pub mod channel_group_block;
pub mod common;
pub mod conversion_block;
pub mod data_block;
pub mod data_group_block;
pub mod data_list_block;
pub mod dz_block;
pub mod event_block;
pub mod file_history_block;
pub mod header_block;
pub mod identification_block;
pub mod source_block;
pub mod text_block;
pub mod v3;

// Re-export common types
pub use common::{BlockCodec, BlockHeader, BlockParse, DataType, Generation, RawBlock};

// Re-export block types
pub use attachment_block::{AttachmentBlock, AttachmentFlags};
pub use channel_array_block::{ArrayStorage, ArrayType, ChannelArrayBlock};
pub use channel_block::{ChannelBlock, ChannelType, SyncType};
pub use channel_group_block::ChannelGroupBlock;
pub use conversion_block::ConversionBlock;
pub use data_block::{DataBlock, SignalDataBlock, read_payload};
pub use data_group_block::DataGroupBlock;
pub use data_list_block::{DataListBlock, HeaderListBlock};
pub use dz_block::{DzBlock, DzCompressionType};
pub use event_block::{EventBlock, EventCause, EventRangeType, EventSyncType, EventType};
pub use file_history_block::FileHistoryBlock;
pub use header_block::HeaderBlock;
pub use identification_block::IdentificationBlock;
pub use source_block::{BusType, SourceBlock, SourceType};
pub use text_block::{MetadataBlock, TextBlock};
