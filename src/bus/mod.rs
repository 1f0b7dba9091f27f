//! Bus logging.
//!
//! Each bus gets one data group of standard frame channel groups. A group
//! holds the master `t` and a composite byte array named after the group,
//! whose components carry the frame fields.
//!
//! [`MdfWriter::create_bus_log_configuration`] lays out the CAN groups
//! (`CAN_DataFrame`, `CAN_RemoteFrame`, `CAN_ErrorFrame`):
//!
//! | byte | bits | component |
//! |------|------|-----------|
//! | 0..4 | 0..29 | `ID` |
//! | 3 | 7 | `IDE` |
//! | 4 | 0..4 | `DLC`, `DataLength` |
//! | 4 | 4..8 | `BusChannel` |
//! | 5 | 0..7 | `Dir`, `SRR`, `EDL`, `BRS`, `ESI`, `WakeUp`, `SingleWire` |
//! | 6 | | `ErrorType` (error frames) |
//! | 6/7 | | `DataBytes` |
//!
//! Frames are then written with [`MdfWriter::save_can_message`]. Ethernet
//! and LIN follow the same pattern, see [`ethernet`] and [`lin`].

mod can;
pub mod ethernet;
pub mod lin;

pub use can::{
    CanDirection, CanMessage, ID_MASK, MAX_FD_DATA_LEN, MAX_STANDARD_ID, dlc_to_len, len_to_dlc,
};
pub use ethernet::{EthBusGroups, EthMessage};
pub use lin::{LinBusGroups, LinChecksumModel, LinMessage};

use crate::{
    Error, Result,
    blocks::{
        BusType, ChannelType, DataType, Generation, SourceType, channel_block::cn_flags,
        channel_group_block::{CG_FLAG_BUS_EVENT, CG_FLAG_PLAIN_BUS_EVENT},
    },
    conversion::Conversion,
    model::{Channel, ChannelGroupId, ChannelId, DataGroupId, SourceInformation},
    types::Value,
    writer::{MdfWriter, WriteState},
};

/// How variable-length payloads (`DataBytes`) are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StorageMode {
    /// Variable-length `DataBytes` with the payloads in signal data blocks.
    #[default]
    FixedLength,
    /// Variable-length `DataBytes` with the payloads in a VLSD channel group.
    Vlsd,
    /// Payload inline in the record, sized by `DataLength`. Ethernet frames
    /// are too long for this and keep signal data blocks.
    MaxLength,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BusLogConfig {
    pub storage: StorageMode,
    /// Inline payload bytes in [`StorageMode::MaxLength`]; 8 for classic
    /// CAN, 64 for CAN FD.
    pub max_payload: usize,
    /// Name of the source information attached to every CAN frame group.
    pub source_name: String,
}

impl Default for BusLogConfig {
    fn default() -> Self {
        Self {
            storage: StorageMode::FixedLength,
            max_payload: 8,
            source_name: "CAN".to_string(),
        }
    }
}

/// Groups created by [`MdfWriter::create_bus_log_configuration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanBusGroups {
    pub data_group: DataGroupId,
    pub data_frame: ChannelGroupId,
    pub remote_frame: ChannelGroupId,
    pub error_frame: ChannelGroupId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Data,
    Remote,
    Error,
}

impl FrameKind {
    fn group_name(self) -> &'static str {
        match self {
            Self::Data => "CAN_DataFrame",
            Self::Remote => "CAN_RemoteFrame",
            Self::Error => "CAN_ErrorFrame",
        }
    }

    /// Byte of `DataBytes` within the composite channel.
    fn payload_offset(self) -> Option<u32> {
        match self {
            Self::Data => Some(6),
            Self::Error => Some(7),
            Self::Remote => None,
        }
    }
}

static DIR_TEXT: [(f64, &str); 2] = [(0.0, "Rx"), (1.0, "Tx")];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Unsigned,
    Signed,
    Float,
    Bytes,
}

/// One fixed-size component of a frame, positioned within the composite.
#[derive(Debug, Clone, Copy)]
struct FrameField {
    name: &'static str,
    byte: u32,
    bit: u8,
    bits: u32,
    kind: FieldKind,
    unit: &'static str,
    text: Option<&'static [(f64, &'static str)]>,
}

impl FrameField {
    const fn unsigned(name: &'static str, byte: u32, bit: u8, bits: u32) -> Self {
        Self {
            name,
            byte,
            bit,
            bits,
            kind: FieldKind::Unsigned,
            unit: "",
            text: None,
        }
    }

    const fn signed(name: &'static str, byte: u32, bit: u8, bits: u32) -> Self {
        Self {
            kind: FieldKind::Signed,
            ..Self::unsigned(name, byte, bit, bits)
        }
    }

    const fn float(name: &'static str, byte: u32) -> Self {
        Self {
            kind: FieldKind::Float,
            ..Self::unsigned(name, byte, 0, 32)
        }
    }

    const fn bytes(name: &'static str, byte: u32, len: u32) -> Self {
        Self {
            kind: FieldKind::Bytes,
            ..Self::unsigned(name, byte, 0, len * 8)
        }
    }

    const fn unit(self, unit: &'static str) -> Self {
        Self { unit, ..self }
    }

    const fn text(self, table: &'static [(f64, &'static str)]) -> Self {
        Self {
            text: Some(table),
            ..self
        }
    }

    fn channel(&self, parent: usize) -> Channel {
        let data_type = match self.kind {
            FieldKind::Unsigned => DataType::UnsignedIntegerLE,
            FieldKind::Signed => DataType::SignedIntegerLE,
            FieldKind::Float => DataType::FloatLE,
            FieldKind::Bytes => DataType::ByteArray,
        };
        Channel {
            byte_offset: self.byte,
            bit_offset: self.bit,
            parent: Some(parent),
            conversion: self.text.map(|table| Conversion::value_to_text(table, "")),
            ..Channel::new(self.name, data_type, self.bits).with_unit(self.unit)
        }
    }
}

fn component(name: &'static str, parent: usize, byte: u32, bit: u8, bits: u32) -> Channel {
    FrameField::unsigned(name, byte, bit, bits).channel(parent)
}

fn data_length_conversion() -> Conversion {
    let table = (0..=15u8)
        .map(|dlc| (f64::from(dlc), dlc_to_len(dlc) as f64))
        .collect();
    Conversion::value_to_value(table, false)
}

/// Payload bytes with `fill` up to `len`, cut at `len`.
fn padded(data: &[u8], len: usize, fill: u8) -> Vec<u8> {
    let mut bytes = data[..data.len().min(len)].to_vec();
    bytes.resize(len, fill);
    bytes
}

impl MdfWriter {
    fn check_bus_setup(&self, bus: &str) -> Result<()> {
        if self.state() != WriteState::Create {
            return Err(Error::invalid_state(format!(
                "{bus} bus logging must be configured before init_measurement"
            )));
        }
        if self.config().generation == Generation::Mdf3 {
            return Err(Error::invalid_state("MDF 3 has no bus logging groups"));
        }
        Ok(())
    }

    /// Creates a bus event channel group with its source, the master `t` and
    /// the composite frame channel. Returns the group and the position of
    /// the composite.
    fn create_bus_group(
        &mut self,
        dg: DataGroupId,
        name: &str,
        bus_type: BusType,
        source_name: &str,
        composite_bytes: u32,
    ) -> Result<(ChannelGroupId, usize)> {
        let cg = self.create_channel_group(dg, name)?;
        {
            let group = self.group_mut(cg)?;
            group.flags |= CG_FLAG_BUS_EVENT | CG_FLAG_PLAIN_BUS_EVENT;
            group.path_separator = Some('.');
        }
        self.create_source_information(
            cg,
            SourceInformation::new(source_name, SourceType::Bus, bus_type),
        )?;
        self.create_channel(cg, Channel::master_time("t"))?;
        let frame = Channel {
            flags: cn_flags::BUS_EVENT,
            ..Channel::new(name, DataType::ByteArray, composite_bytes * 8)
        };
        let parent = self.create_channel(cg, frame)?.cn;
        Ok((cg, parent))
    }

    fn create_fields(
        &mut self,
        cg: ChannelGroupId,
        parent: usize,
        fields: &[FrameField],
    ) -> Result<()> {
        for field in fields {
            self.create_channel(cg, field.channel(parent))?;
        }
        Ok(())
    }

    /// Variable-length `DataBytes`, in signal data or a VLSD group.
    fn create_variable_payload(
        &mut self,
        cg: ChannelGroupId,
        parent: usize,
        byte: u32,
    ) -> Result<ChannelId> {
        let bytes = Channel {
            channel_type: ChannelType::VariableLength,
            byte_offset: byte,
            parent: Some(parent),
            ..Channel::new("DataBytes", DataType::ByteArray, 64)
        };
        let bytes = self.create_channel(cg, bytes)?;
        if self.config().bus.storage == StorageMode::Vlsd {
            self.create_vlsd_channel_group(bytes)?;
        }
        Ok(bytes)
    }

    /// Sets every component of a bus event group that `value_of` yields a
    /// value for, then saves one sample.
    fn save_bus_sample<F>(
        &mut self,
        group: ChannelGroupId,
        time_ns: u64,
        mut value_of: F,
    ) -> Result<()>
    where
        F: FnMut(&Channel) -> Option<Value>,
    {
        let cg = self
            .file()
            .channel_group(group)
            .ok_or_else(|| Error::invalid_state(format!("unknown channel group {group:?}")))?;
        if !cg.is_bus_event() {
            return Err(Error::invalid_state(format!(
                "channel group {:?} is not a bus logging group",
                cg.name
            )));
        }
        let values: Vec<(usize, Value)> = cg
            .channels
            .iter()
            .enumerate()
            .filter(|(_, ch)| ch.parent.is_some())
            .filter_map(|(cn, ch)| value_of(ch).map(|value| (cn, value)))
            .collect();

        for (cn, value) in values {
            self.set_channel_value(group.channel(cn), value)?;
        }
        self.save_sample(group, time_ns)
    }

    /// Creates the CAN bus logging data group. Only valid before
    /// [`init_measurement`](Self::init_measurement) and only for MDF 4.
    pub fn create_bus_log_configuration(&mut self) -> Result<CanBusGroups> {
        self.check_bus_setup("CAN")?;
        let data_group = self.create_data_group("CAN bus logging")?;
        let groups = CanBusGroups {
            data_group,
            data_frame: self.create_frame_group(data_group, FrameKind::Data)?,
            remote_frame: self.create_frame_group(data_group, FrameKind::Remote)?,
            error_frame: self.create_frame_group(data_group, FrameKind::Error)?,
        };
        tracing::debug!(storage = ?self.config().bus.storage, "created CAN bus logging groups");
        Ok(groups)
    }

    fn create_frame_group(&mut self, dg: DataGroupId, kind: FrameKind) -> Result<ChannelGroupId> {
        let bus = self.config().bus.clone();
        let name = kind.group_name();
        let payload = kind.payload_offset();
        let composite_len = match (payload, bus.storage) {
            (None, _) => 6,
            (Some(offset), StorageMode::MaxLength) => offset + bus.max_payload as u32,
            (Some(offset), _) => offset + 8,
        };
        let (cg, parent) =
            self.create_bus_group(dg, name, BusType::Can, &bus.source_name, composite_len)?;

        self.create_fields(
            cg,
            parent,
            &[
                FrameField::unsigned("BusChannel", 4, 4, 4),
                FrameField::unsigned("ID", 0, 0, 29),
                FrameField::unsigned("IDE", 3, 7, 1),
                FrameField::unsigned("DLC", 4, 0, 4),
            ],
        )?;
        let data_length = Channel {
            conversion: Some(data_length_conversion()),
            ..component("DataLength", parent, 4, 0, 4)
        };
        let data_length = self.create_channel(cg, data_length)?.cn;

        if kind == FrameKind::Error {
            self.create_channel(cg, component("ErrorType", parent, 6, 0, 8))?;
        }
        match (payload, bus.storage) {
            (Some(offset), StorageMode::MaxLength) => {
                let field = FrameField::bytes("DataBytes", offset, bus.max_payload as u32);
                let bytes = Channel {
                    channel_type: ChannelType::MaxLength,
                    size_channel: Some(data_length),
                    ..field.channel(parent)
                };
                self.create_channel(cg, bytes)?;
            }
            (Some(offset), _) => {
                self.create_variable_payload(cg, parent, offset)?;
            }
            (None, _) => {}
        }

        let dir = FrameField::unsigned("Dir", 5, 0, 1).text(&DIR_TEXT);
        self.create_channel(cg, dir.channel(parent))?;
        for (bit, flag) in ["SRR", "EDL", "BRS", "ESI", "WakeUp", "SingleWire"]
            .into_iter()
            .enumerate()
        {
            self.create_channel(cg, component(flag, parent, 5, bit as u8 + 1, 1))?;
        }
        Ok(cg)
    }

    /// Maps `message` onto the frame channels of `group` and saves one
    /// sample. Fields without a channel in the group are skipped.
    pub fn save_can_message(
        &mut self,
        group: ChannelGroupId,
        time_ns: u64,
        message: &CanMessage,
    ) -> Result<()> {
        let mut payload = message.data.clone();
        self.save_bus_sample(group, time_ns, |ch| {
            let value = match ch.name.as_str() {
                "BusChannel" => Value::from(message.bus_channel & 0x0F),
                "ID" => Value::from(message.id & ID_MASK),
                "IDE" => Value::from(message.is_extended()),
                "DLC" | "DataLength" => Value::from(message.dlc & 0x0F),
                "ErrorType" => Value::from(message.error_type),
                "Dir" => Value::from(message.direction == CanDirection::Tx),
                "SRR" => Value::from(message.srr),
                "EDL" => Value::from(message.edl),
                "BRS" => Value::from(message.brs),
                "ESI" => Value::from(message.esi),
                "WakeUp" => Value::from(message.wake_up),
                "SingleWire" => Value::from(message.single_wire),
                "DataBytes" => {
                    if ch.channel_type == ChannelType::MaxLength {
                        let max = (ch.bit_count / 8) as usize;
                        if payload.len() > max {
                            tracing::warn!(
                                id = message.id,
                                len = payload.len(),
                                max,
                                "CAN payload truncated"
                            );
                            payload.truncate(max);
                        }
                    }
                    Value::ByteArray(std::mem::take(&mut payload))
                }
                _ => return None,
            };
            Some(value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::WriterConfig;
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
        let writer = MdfWriter::init(dir.path().join("can.mf4"), config).unwrap();
        (dir, writer)
    }

    #[test]
    fn creates_three_frame_groups() {
        let (_dir, mut writer) = writer(StorageMode::FixedLength);
        let groups = writer.create_bus_log_configuration().unwrap();
        let file = writer.file();
        let data = file.channel_group(groups.data_frame).unwrap();
        assert_eq!(data.name, "CAN_DataFrame");
        assert!(data.is_bus_event());
        assert_eq!(data.channel("CAN_DataFrame.ID"), data.channel("ID"));
        assert_eq!(
            data.source.as_ref().map(|s| s.bus_type),
            Some(BusType::Can)
        );

        let remote = file.channel_group(groups.remote_frame).unwrap();
        assert!(remote.channel("DataBytes").is_none());
        let error = file.channel_group(groups.error_frame).unwrap();
        assert!(error.channel("ErrorType").is_some());
        assert_eq!(file.data_group(groups.data_group).unwrap().channel_groups.len(), 3);
    }

    #[test]
    fn vlsd_mode_adds_payload_groups() {
        let (_dir, mut writer) = writer(StorageMode::Vlsd);
        let groups = writer.create_bus_log_configuration().unwrap();
        let dg = writer.file().data_group(groups.data_group).unwrap();
        // Data and error frames carry payloads.
        assert_eq!(dg.channel_groups.iter().filter(|cg| cg.is_vlsd()).count(), 2);
    }

    #[test]
    fn rejected_after_init_and_for_mdf3() {
        let (_dir, mut writer) = writer(StorageMode::FixedLength);
        writer.init_measurement().unwrap();
        assert!(writer.create_bus_log_configuration().is_err());

        let dir = tempdir().unwrap();
        let config = WriterConfig {
            generation: Generation::Mdf3,
            ..Default::default()
        };
        let mut writer = MdfWriter::init(dir.path().join("can.mdf"), config).unwrap();
        assert!(writer.create_bus_log_configuration().is_err());
    }

    #[test]
    fn save_requires_bus_group() {
        let (_dir, mut writer) = writer(StorageMode::MaxLength);
        let dg = writer.create_data_group("plain").unwrap();
        let cg = writer.create_channel_group(dg, "plain").unwrap();
        writer.create_channel(cg, Channel::master_time("t")).unwrap();
        let groups = writer.create_bus_log_configuration().unwrap();
        writer.init_measurement().unwrap();
        writer.start_measurement(1_000).unwrap();

        let message = CanMessage::new(12, &[1, 2]);
        assert!(writer.save_can_message(cg, 1_000, &message).is_err());
        writer.save_can_message(groups.data_frame, 1_000, &message).unwrap();
        writer.stop_measurement(2_000).unwrap();
        writer.finalize_measurement().unwrap();
    }
}
