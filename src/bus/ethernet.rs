//! Ethernet bus logging.
//!
//! [`MdfWriter::create_eth_log_configuration`] creates the `ETH_Frame`,
//! `ETH_ChecksumError`, `ETH_LengthError` and `ETH_ReceiveError` groups.
//! `DataBytes` is always variable length, stored in signal data blocks or,
//! with [`StorageMode::Vlsd`](super::StorageMode::Vlsd), in a VLSD group.
//!
//! | byte | bits | component |
//! |------|------|-----------|
//! | 0 | 0..4 | `BusChannel` |
//! | 0 | 4..7 | `ErrorType` (receive errors) |
//! | 0 | 7 | `Dir` |
//! | 1..7 | | `Source` |
//! | 7..13 | | `Destination` |
//! | 13..15 | | `EthType` |
//!
//! The remaining fields depend on the group, see [`EthFrameKind`].

use super::{DIR_TEXT, FrameField};
use crate::{
    Result,
    blocks::BusType,
    model::{ChannelGroupId, DataGroupId},
    types::Value,
    writer::MdfWriter,
};

/// Length of a MAC address.
pub const MAC_ADDR_SIZE: usize = 6;

/// EtherType of IPv4, the default of a new message.
pub const ETHERTYPE_IPV4: u16 = 0x0800;

static ERROR_TYPE_TEXT: [(f64, &str); 2] = [(0.0, "Unknown"), (1.0, "Collision Error")];

/// Groups created by [`MdfWriter::create_eth_log_configuration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthBusGroups {
    pub data_group: DataGroupId,
    pub frame: ChannelGroupId,
    pub checksum_error: ChannelGroupId,
    pub length_error: ChannelGroupId,
    pub receive_error: ChannelGroupId,
}

/// Ethernet frame groups and their layout after `EthType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EthFrameKind {
    /// `ReceivedDataByteCount`, `DataLength`, `DataBytes`, `CRC`,
    /// `PadByteCount`.
    Frame,
    /// `DataLength`, `CRC`, `ExpectedCRC`, `DataBytes`,
    /// `ReceivedDataByteCount`, `PadByteCount`.
    ChecksumError,
    /// Same layout as [`Frame`](Self::Frame).
    LengthError,
    /// [`Frame`](Self::Frame) plus `ErrorType`.
    ReceiveError,
}

impl EthFrameKind {
    pub fn group_name(self) -> &'static str {
        match self {
            Self::Frame => "ETH_Frame",
            Self::ChecksumError => "ETH_ChecksumError",
            Self::LengthError => "ETH_LengthError",
            Self::ReceiveError => "ETH_ReceiveError",
        }
    }

    fn composite_bytes(self) -> u32 {
        match self {
            Self::ChecksumError => 37,
            _ => 33,
        }
    }

    fn payload_offset(self) -> u32 {
        match self {
            Self::ChecksumError => 25,
            _ => 19,
        }
    }

    fn fields(self) -> Vec<FrameField> {
        let mut fields = vec![
            FrameField::unsigned("BusChannel", 0, 0, 4),
            FrameField::unsigned("Dir", 0, 7, 1).text(&DIR_TEXT),
            FrameField::bytes("Source", 1, MAC_ADDR_SIZE as u32),
            FrameField::bytes("Destination", 7, MAC_ADDR_SIZE as u32),
            FrameField::unsigned("EthType", 13, 0, 16),
        ];
        match self {
            Self::ChecksumError => fields.extend([
                FrameField::unsigned("DataLength", 15, 0, 16),
                FrameField::unsigned("CRC", 17, 0, 32),
                FrameField::unsigned("ExpectedCRC", 21, 0, 32),
                FrameField::unsigned("ReceivedDataByteCount", 33, 0, 16),
                FrameField::unsigned("PadByteCount", 35, 0, 16),
            ]),
            Self::Frame | Self::LengthError | Self::ReceiveError => fields.extend([
                FrameField::unsigned("ReceivedDataByteCount", 15, 0, 16),
                FrameField::unsigned("DataLength", 17, 0, 16),
                FrameField::unsigned("CRC", 27, 0, 32),
                FrameField::unsigned("PadByteCount", 31, 0, 16),
            ]),
        }
        if self == Self::ReceiveError {
            fields.push(FrameField::unsigned("ErrorType", 0, 4, 3).text(&ERROR_TYPE_TEXT));
        }
        fields
    }
}

/// One Ethernet frame as written by [`MdfWriter::save_eth_message`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EthMessage {
    /// Bus channel number, 0..=15.
    pub bus_channel: u8,
    pub tx: bool,
    pub source: [u8; MAC_ADDR_SIZE],
    pub destination: [u8; MAC_ADDR_SIZE],
    pub eth_type: u16,
    /// Payload bytes seen on the wire, which may differ from `data` in
    /// length errors.
    pub received_data_byte_count: u16,
    pub data: Vec<u8>,
    pub crc: u32,
    pub expected_crc: u32,
    pub padding_byte_count: u16,
    /// 0 unknown, 1 collision.
    pub error_type: u8,
}

impl EthMessage {
    pub fn new(source: [u8; 6], destination: [u8; 6], data: &[u8]) -> Self {
        Self {
            source,
            destination,
            eth_type: ETHERTYPE_IPV4,
            received_data_byte_count: u16::try_from(data.len()).unwrap_or(u16::MAX),
            data: data.to_vec(),
            ..Default::default()
        }
    }

    pub fn with_eth_type(mut self, eth_type: u16) -> Self {
        self.eth_type = eth_type;
        self
    }

    pub fn with_bus_channel(mut self, bus_channel: u8) -> Self {
        self.bus_channel = bus_channel & 0x0F;
        self
    }

    pub fn data_length(&self) -> u16 {
        u16::try_from(self.data.len()).unwrap_or(u16::MAX)
    }
}

impl MdfWriter {
    /// Creates the Ethernet bus logging data group. Only valid before
    /// [`init_measurement`](Self::init_measurement) and only for MDF 4.
    pub fn create_eth_log_configuration(&mut self) -> Result<EthBusGroups> {
        self.check_bus_setup("Ethernet")?;
        let data_group = self.create_data_group("ETH bus logging")?;
        let groups = EthBusGroups {
            data_group,
            frame: self.create_eth_group(data_group, EthFrameKind::Frame)?,
            checksum_error: self.create_eth_group(data_group, EthFrameKind::ChecksumError)?,
            length_error: self.create_eth_group(data_group, EthFrameKind::LengthError)?,
            receive_error: self.create_eth_group(data_group, EthFrameKind::ReceiveError)?,
        };
        tracing::debug!(
            storage = ?self.config().bus.storage,
            "created Ethernet bus logging groups"
        );
        Ok(groups)
    }

    fn create_eth_group(&mut self, dg: DataGroupId, kind: EthFrameKind) -> Result<ChannelGroupId> {
        let (cg, parent) = self.create_bus_group(
            dg,
            kind.group_name(),
            BusType::Ethernet,
            "ETH",
            kind.composite_bytes(),
        )?;
        self.create_fields(cg, parent, &kind.fields())?;
        self.create_variable_payload(cg, parent, kind.payload_offset())?;
        Ok(cg)
    }

    /// Maps `message` onto the frame channels of `group` and saves one
    /// sample.
    pub fn save_eth_message(
        &mut self,
        group: ChannelGroupId,
        time_ns: u64,
        message: &EthMessage,
    ) -> Result<()> {
        self.save_bus_sample(group, time_ns, |ch| {
            let value = match ch.name.as_str() {
                "BusChannel" => Value::from(message.bus_channel & 0x0F),
                "Dir" => Value::from(message.tx),
                "Source" => Value::from(&message.source[..]),
                "Destination" => Value::from(&message.destination[..]),
                "EthType" => Value::from(message.eth_type),
                "ReceivedDataByteCount" => Value::from(message.received_data_byte_count),
                "DataLength" => Value::from(message.data_length()),
                "DataBytes" => Value::from(message.data.clone()),
                "CRC" => Value::from(message.crc),
                "ExpectedCRC" => Value::from(message.expected_crc),
                "PadByteCount" => Value::from(message.padding_byte_count),
                "ErrorType" => Value::from(message.error_type & 0x07),
                _ => return None,
            };
            Some(value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        blocks::ChannelType,
        bus::{BusLogConfig, StorageMode},
        writer::WriterConfig,
    };
    use tempfile::tempdir;

    fn writer(storage: StorageMode) -> (tempfile::TempDir, MdfWriter) {
        let dir = tempdir().unwrap();
        let config = WriterConfig {
            bus: BusLogConfig {
                storage,
                ..Default::default()
            },
            ..Default::default()
        };
        let writer = MdfWriter::init(dir.path().join("eth.mf4"), config).unwrap();
        (dir, writer)
    }

    #[test]
    fn groups_share_the_address_header() {
        let (_dir, mut writer) = writer(StorageMode::FixedLength);
        let groups = writer.create_eth_log_configuration().unwrap();
        let file = writer.file();
        let frame = file.channel_group(groups.frame).unwrap();
        assert_eq!(frame.name, "ETH_Frame");
        assert!(frame.is_bus_event());
        assert_eq!(frame.source.as_ref().map(|s| s.bus_type), Some(BusType::Ethernet));
        let source = &frame.channels[frame.channel("ETH_Frame.Source").unwrap()];
        assert_eq!((source.byte_offset, source.bit_count), (1, 48));
        let bytes = &frame.channels[frame.channel("DataBytes").unwrap()];
        assert_eq!(bytes.channel_type, ChannelType::VariableLength);
        assert_eq!(bytes.byte_offset, 19);

        let checksum = file.channel_group(groups.checksum_error).unwrap();
        let expected = &checksum.channels[checksum.channel("ExpectedCRC").unwrap()];
        assert_eq!(expected.byte_offset, 21);
        let receive = file.channel_group(groups.receive_error).unwrap();
        assert!(receive.channel("ErrorType").is_some());
        assert!(frame.channel("ErrorType").is_none());
    }

    #[test]
    fn vlsd_mode_adds_a_payload_group_per_frame_group() {
        let (_dir, mut writer) = writer(StorageMode::Vlsd);
        let groups = writer.create_eth_log_configuration().unwrap();
        let dg = writer.file().data_group(groups.data_group).unwrap();
        assert_eq!(dg.channel_groups.iter().filter(|cg| cg.is_vlsd()).count(), 4);
    }

    #[test]
    fn message_defaults() {
        let message = EthMessage::new([1; 6], [0xFF; 6], &[0u8; 60]).with_bus_channel(0x13);
        assert_eq!(message.eth_type, ETHERTYPE_IPV4);
        assert_eq!(message.bus_channel, 3);
        assert_eq!(message.data_length(), 60);
        assert_eq!(message.received_data_byte_count, 60);
    }
}
