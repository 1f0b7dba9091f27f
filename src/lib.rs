#![forbid(unsafe_code)]

//! # mdf-engine
//!
//! Reads and writes ASAM MDF (Measurement Data Format) files, versions 3.x
//! and 4.x.
//!
//! MDF is a binary, block-structured container for time-series measurement
//! data: sensor signals, CAN bus traffic and other instrumentation output,
//! commonly recorded on automotive test benches and in vehicles.
//!
//! ## Features
//!
//! - **Reading**: staged reads (header, measurement info, configuration,
//!   data), raw and engineering values through channel observers, array
//!   channels
//! - **Writing**: measurement lifecycle with pre-trigger buffering, batched
//!   flushing and DZ compression
//! - **Conversions**: every MDF 4 conversion type, including formulas and
//!   table lookups, with inverses for writing engineering values
//! - **Bus logging**: CAN, CAN FD, Ethernet and LIN frames in the standard
//!   frame groups
//! - **Metadata**: XML comments, file history, events and attachments
//!
//! ## Reading an MDF file
//!
//! ```no_run
//! use mdf_engine::{DataGroupId, MdfReader};
//!
//! let mut reader = MdfReader::new("recording.mf4")?;
//! reader.try_read_everything_but_data()?;
//! reader.try_read_data(DataGroupId(0))?;
//!
//! if let Some(id) = reader.find_channel("Speed") {
//!     let speed = reader.create_channel_observer(id)?;
//!     for sample in 0..speed.nof_samples() {
//!         println!("{:?} {}", speed.engineering_value(sample)?, speed.unit());
//!     }
//! }
//! # Ok::<(), mdf_engine::Error>(())
//! ```
//!
//! ## Logging CAN frames
//!
//! ```no_run
//! use mdf_engine::{CanMessage, MdfWriter, WriterConfig};
//!
//! let mut writer = MdfWriter::init("can.mf4", WriterConfig::default())?;
//! let groups = writer.create_bus_log_configuration()?;
//! writer.init_measurement()?;
//!
//! let start = 1_700_000_000_000_000_000;
//! writer.start_measurement(start)?;
//! writer.save_can_message(groups.data_frame, start, &CanMessage::new(0x123, &[1, 2, 3]))?;
//! writer.stop_measurement(start + 1_000_000)?;
//! writer.finalize_measurement()?;
//! # Ok::<(), mdf_engine::Error>(())
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`blocks`] | Block encoding and decoding for both generations |
//! | [`model`] | In-memory file tree: header, data groups, channels |
//! | [`layout`] | Record layout and bit-level value access |
//! | [`conversion`] | Raw to engineering value conversions |
//! | [`metadata`] | XML comment blocks |
//! | [`reader`] | Staged reading with [`MdfReader`] |
//! | [`writer`] | Measurement writing with [`MdfWriter`] |
//! | [`bus`] | CAN, Ethernet and LIN bus logging |
//! | [`log`] | Diagnostic sinks |
//! | [`error`] | Error types and [`Result`] alias |
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`]. The reader additionally has
//! `bool` returning stage methods that keep the error in
//! [`MdfReader::last_error`].

pub mod blocks;
pub mod bus;
pub mod conversion;
pub mod error;
pub mod layout;
pub mod log;
pub mod metadata;
pub mod model;
pub mod observer;
pub mod reader;
pub mod types;
pub mod writer;

pub use blocks::{BusType, ChannelType, DataType, Generation, SourceType, SyncType};
pub use bus::{
    BusLogConfig, CanBusGroups, CanDirection, CanMessage, EthBusGroups, EthMessage, LinBusGroups,
    LinChecksumModel, LinMessage, StorageMode,
};
pub use conversion::{Conversion, ConversionKind};
pub use error::{Error, ErrorKind, FinalizeStage, Result};
pub use log::{LogSink, Severity};
pub use metadata::MetaData;
pub use model::{
    Attachment, Channel, ChannelArray, ChannelGroup, ChannelGroupId, ChannelId, DataGroup,
    DataGroupId, Event, FileHistory, Header, MdfFile, SourceInformation,
};
pub use observer::ChannelObserver;
pub use reader::{MdfReader, ReadState, ReaderOptions, is_mdf_file};
pub use types::Value;
pub use writer::{FlushPolicy, MdfWriter, WriteState, WriterConfig};
