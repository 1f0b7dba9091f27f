//! LIN bus logging.
//!
//! [`MdfWriter::create_lin_log_configuration`] creates one group per LIN
//! event type. Frames keep `DataBytes` inline as an 8 byte max-length
//! channel sized by `DataLength`; unused bytes are written as `0xFF`.

use super::{DIR_TEXT, FrameField, padded};
use crate::{
    Result,
    blocks::{BusType, ChannelType},
    model::{Channel, ChannelGroupId, DataGroupId},
    types::Value,
    writer::MdfWriter,
};

/// Maximum LIN frame data size.
pub const MAX_LIN_DATA_LEN: usize = 8;

/// Largest LIN frame identifier (6 bits).
pub const MAX_LIN_ID: u8 = 0x3F;

static CHECKSUM_TEXT: [(f64, &str); 3] = [(-1.0, "Unknown"), (0.0, "Classic"), (1.0, "Enhanced")];
static LONG_DOM_TEXT: [(f64, &str); 3] = [
    (0.0, "First Detection"),
    (1.0, "Cyclic Report"),
    (2.0, "End of Detection"),
];

/// Checksum of a LIN frame, stored as a 2 bit signed `ChecksumModel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i8)]
pub enum LinChecksumModel {
    #[default]
    Unknown = -1,
    /// LIN 1.x, data bytes only.
    Classic = 0,
    /// LIN 2.x, identifier and data bytes.
    Enhanced = 1,
}

impl LinChecksumModel {
    pub fn from_i8(value: i8) -> Self {
        match value {
            0 => Self::Classic,
            1 => Self::Enhanced,
            _ => Self::Unknown,
        }
    }
}

/// Groups created by [`MdfWriter::create_lin_log_configuration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinBusGroups {
    pub data_group: DataGroupId,
    pub frame: ChannelGroupId,
    pub checksum_error: ChannelGroupId,
    pub receive_error: ChannelGroupId,
    pub sync_error: ChannelGroupId,
    pub transmission_error: ChannelGroupId,
    pub wake_up: ChannelGroupId,
    pub spike: ChannelGroupId,
    pub long_dom: ChannelGroupId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinFrameKind {
    Frame,
    ChecksumError,
    ReceiveError,
    SyncError,
    TransmissionError,
    WakeUp,
    Spike,
    LongDom,
}

impl LinFrameKind {
    pub fn group_name(self) -> &'static str {
        match self {
            Self::Frame => "LIN_Frame",
            Self::ChecksumError => "LIN_ChecksumError",
            Self::ReceiveError => "LIN_ReceiveError",
            Self::SyncError => "LIN_SyncError",
            Self::TransmissionError => "LIN_TransmissionError",
            Self::WakeUp => "LIN_WakeUp",
            Self::Spike => "LIN_Spike",
            Self::LongDom => "LIN_LongDom",
        }
    }

    fn composite_bytes(self) -> u32 {
        match self {
            Self::Frame | Self::ChecksumError => 36,
            Self::ReceiveError => 37,
            Self::SyncError => 21,
            Self::TransmissionError => 23,
            Self::WakeUp | Self::Spike => 13,
            Self::LongDom => 18,
        }
    }

    /// Byte of the inline `DataBytes`, for groups that carry a payload.
    fn payload_offset(self) -> Option<u32> {
        match self {
            Self::Frame | Self::ChecksumError => Some(3),
            Self::ReceiveError => Some(5),
            _ => None,
        }
    }

    /// Fixed fields, `DataBytes` excluded. The first entry named
    /// `DataLength` sizes the payload.
    fn fields(self) -> Vec<FrameField> {
        let bus_channel = FrameField::unsigned("BusChannel", 0, 0, 6);
        let checksum_model = FrameField::signed("ChecksumModel", 0, 6, 2).text(&CHECKSUM_TEXT);
        let id = FrameField::unsigned("ID", 1, 0, 6);
        let dir = FrameField::unsigned("Dir", 1, 7, 1).text(&DIR_TEXT);
        let received = FrameField::unsigned("ReceivedDataByteCount", 2, 0, 4);
        let data_length = FrameField::unsigned("DataLength", 2, 4, 4);
        let ns = |name, byte, bits| FrameField::unsigned(name, byte, 0, bits).unit("ns");
        let baud = |name, byte| FrameField::float(name, byte).unit("bits/s");

        match self {
            Self::Frame | Self::ChecksumError => vec![
                bus_channel,
                checksum_model,
                id,
                dir,
                received,
                data_length,
                FrameField::unsigned("Checksum", 11, 0, 8),
                ns("SOF", 12, 64),
                baud("Baudrate", 20),
                baud("ResponseBaudrate", 24),
                ns("BreakLength", 28, 32),
                ns("BreakDelimiterLength", 32, 32),
            ],
            Self::ReceiveError => vec![
                bus_channel,
                checksum_model,
                id,
                received,
                data_length,
                FrameField::unsigned("Checksum", 3, 0, 8),
                FrameField::unsigned("SpecifiedDataByteCount", 4, 0, 4),
                ns("SOF", 13, 64),
                baud("Baudrate", 21),
                baud("ResponseBaudrate", 25),
                ns("BreakLength", 29, 32),
                ns("BreakDelimiterLength", 33, 32),
            ],
            Self::SyncError => vec![
                bus_channel,
                baud("Baudrate", 1),
                ns("SOF", 5, 64),
                ns("BreakLength", 13, 32),
                ns("BreakDelimiterLength", 17, 32),
            ],
            Self::TransmissionError => vec![
                bus_channel,
                checksum_model,
                id,
                FrameField::unsigned("SpecifiedDataByteCount", 2, 0, 4),
                baud("Baudrate", 3),
                ns("SOF", 7, 64),
                ns("BreakLength", 15, 32),
                ns("BreakDelimiterLength", 19, 32),
            ],
            Self::WakeUp | Self::Spike => {
                vec![bus_channel, baud("Baudrate", 1), ns("SOF", 5, 64)]
            }
            Self::LongDom => vec![
                bus_channel,
                FrameField::unsigned("Type", 1, 4, 2).text(&LONG_DOM_TEXT),
                baud("Baudrate", 2),
                ns("SOF", 6, 64),
                ns("Length", 14, 32),
            ],
        }
    }
}

/// One LIN event as written by [`MdfWriter::save_lin_message`]. Fields the
/// target group has no channel for are ignored.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinMessage {
    /// Bus channel number, 0..=63.
    pub bus_channel: u8,
    /// Frame identifier, 0..=63.
    pub id: u8,
    pub tx: bool,
    pub checksum_model: LinChecksumModel,
    pub received_data_byte_count: u8,
    pub specified_data_byte_count: u8,
    /// Up to 8 payload bytes.
    pub data: Vec<u8>,
    pub checksum: u8,
    /// Start of frame in nanoseconds.
    pub sof_ns: u64,
    pub baudrate: f32,
    pub response_baudrate: f32,
    pub break_length_ns: u32,
    pub break_delimiter_length_ns: u32,
    /// Long dominant phase: 0 first detection, 1 cyclic report, 2 end.
    pub long_dom_type: u8,
    pub long_dom_length_ns: u32,
}

impl LinMessage {
    pub fn new(id: u8, data: &[u8]) -> Self {
        let data = &data[..data.len().min(MAX_LIN_DATA_LEN)];
        Self {
            id: id & MAX_LIN_ID,
            received_data_byte_count: data.len() as u8,
            specified_data_byte_count: data.len() as u8,
            data: data.to_vec(),
            ..Default::default()
        }
    }

    pub fn with_checksum(mut self, model: LinChecksumModel, checksum: u8) -> Self {
        self.checksum_model = model;
        self.checksum = checksum;
        self
    }

    pub fn with_bus_channel(mut self, bus_channel: u8) -> Self {
        self.bus_channel = bus_channel & 0x3F;
        self
    }

    pub fn data_length(&self) -> u8 {
        self.data.len().min(MAX_LIN_DATA_LEN) as u8
    }
}

impl MdfWriter {
    /// Creates the LIN bus logging data group. Only valid before
    /// [`init_measurement`](Self::init_measurement) and only for MDF 4.
    pub fn create_lin_log_configuration(&mut self) -> Result<LinBusGroups> {
        self.check_bus_setup("LIN")?;
        let dg = self.create_data_group("LIN bus logging")?;
        let groups = LinBusGroups {
            data_group: dg,
            frame: self.create_lin_group(dg, LinFrameKind::Frame)?,
            checksum_error: self.create_lin_group(dg, LinFrameKind::ChecksumError)?,
            receive_error: self.create_lin_group(dg, LinFrameKind::ReceiveError)?,
            sync_error: self.create_lin_group(dg, LinFrameKind::SyncError)?,
            transmission_error: self.create_lin_group(dg, LinFrameKind::TransmissionError)?,
            wake_up: self.create_lin_group(dg, LinFrameKind::WakeUp)?,
            spike: self.create_lin_group(dg, LinFrameKind::Spike)?,
            long_dom: self.create_lin_group(dg, LinFrameKind::LongDom)?,
        };
        tracing::debug!("created LIN bus logging groups");
        Ok(groups)
    }

    fn create_lin_group(&mut self, dg: DataGroupId, kind: LinFrameKind) -> Result<ChannelGroupId> {
        let (cg, parent) = self.create_bus_group(
            dg,
            kind.group_name(),
            BusType::Lin,
            "LIN",
            kind.composite_bytes(),
        )?;
        let fields = kind.fields();
        self.create_fields(cg, parent, &fields)?;
        if let Some(offset) = kind.payload_offset() {
            let data_length = self
                .file()
                .channel_group(cg)
                .and_then(|group| group.channel("DataLength"));
            let field = FrameField::bytes("DataBytes", offset, MAX_LIN_DATA_LEN as u32);
            let bytes = Channel {
                channel_type: ChannelType::MaxLength,
                size_channel: data_length,
                ..field.channel(parent)
            };
            self.create_channel(cg, bytes)?;
        }
        Ok(cg)
    }

    /// Maps `message` onto the channels of `group` and saves one sample.
    pub fn save_lin_message(
        &mut self,
        group: ChannelGroupId,
        time_ns: u64,
        message: &LinMessage,
    ) -> Result<()> {
        if message.data.len() > MAX_LIN_DATA_LEN {
            tracing::warn!(
                id = message.id,
                len = message.data.len(),
                "LIN payload truncated"
            );
        }
        self.save_bus_sample(group, time_ns, |ch| {
            let value = match ch.name.as_str() {
                "BusChannel" => Value::from(message.bus_channel & 0x3F),
                "ChecksumModel" => Value::from(message.checksum_model as i8),
                "ID" => Value::from(message.id & MAX_LIN_ID),
                "Dir" => Value::from(message.tx),
                "ReceivedDataByteCount" => Value::from(message.received_data_byte_count & 0x0F),
                "SpecifiedDataByteCount" => Value::from(message.specified_data_byte_count & 0x0F),
                "DataLength" => Value::from(message.data_length()),
                "DataBytes" => Value::from(padded(&message.data, MAX_LIN_DATA_LEN, 0xFF)),
                "Checksum" => Value::from(message.checksum),
                "SOF" => Value::from(message.sof_ns),
                "Baudrate" => Value::from(message.baudrate),
                "ResponseBaudrate" => Value::from(message.response_baudrate),
                "BreakLength" => Value::from(message.break_length_ns),
                "BreakDelimiterLength" => Value::from(message.break_delimiter_length_ns),
                "Type" => Value::from(message.long_dom_type & 0x03),
                "Length" => Value::from(message.long_dom_length_ns),
                _ => return None,
            };
            Some(value)
        })
    }
}
