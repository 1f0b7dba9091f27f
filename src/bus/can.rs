//! CAN message representation for bus logging.
//!
//! # DLC to data length mapping
//!
//! CAN FD uses a non-linear mapping above 8:
//!
//! | DLC | 0..=8 | 9  | 10 | 11 | 12 | 13 | 14 | 15 |
//! |-----|-------|----|----|----|----|----|----|----|
//! | len | DLC   | 12 | 16 | 20 | 24 | 32 | 48 | 64 |

/// Largest CAN FD payload.
pub const MAX_FD_DATA_LEN: usize = 64;

/// Largest identifier of a standard (11-bit) frame.
pub const MAX_STANDARD_ID: u32 = 0x7FF;

/// Mask of the 29 identifier bits stored in the `ID` channel.
pub const ID_MASK: u32 = 0x1FFF_FFFF;

#[inline]
pub const fn dlc_to_len(dlc: u8) -> usize {
    match dlc {
        0..=8 => dlc as usize,
        9 => 12,
        10 => 16,
        11 => 20,
        12 => 24,
        13 => 32,
        14 => 48,
        _ => 64,
    }
}

/// Smallest DLC whose data length holds `len` bytes.
#[inline]
pub const fn len_to_dlc(len: usize) -> u8 {
    match len {
        0..=8 => len as u8,
        9..=12 => 9,
        13..=16 => 10,
        17..=20 => 11,
        21..=24 => 12,
        25..=32 => 13,
        33..=48 => 14,
        _ => 15,
    }
}

/// Direction of a logged frame, stored in the `Dir` channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CanDirection {
    #[default]
    Rx,
    Tx,
}

/// One CAN or CAN FD frame as written by
/// [`MdfWriter::save_can_message`](crate::MdfWriter::save_can_message).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CanMessage {
    /// 11 or 29 bit identifier.
    pub id: u32,
    /// 29-bit identifier; implied by identifiers above 0x7FF.
    pub extended: bool,
    pub dlc: u8,
    pub data: Vec<u8>,
    /// Bus channel number, 0..=15.
    pub bus_channel: u8,
    pub direction: CanDirection,
    pub srr: bool,
    /// CAN FD frame.
    pub edl: bool,
    pub brs: bool,
    pub esi: bool,
    pub wake_up: bool,
    pub single_wire: bool,
    /// Error type of an error frame, 0 when unknown.
    pub error_type: u8,
}

impl CanMessage {
    /// Data frame with the DLC derived from the payload length.
    pub fn new(id: u32, data: &[u8]) -> Self {
        let data = &data[..data.len().min(MAX_FD_DATA_LEN)];
        Self {
            id,
            extended: id > MAX_STANDARD_ID,
            dlc: len_to_dlc(data.len()),
            edl: data.len() > 8,
            data: data.to_vec(),
            ..Default::default()
        }
    }

    pub fn with_bus_channel(mut self, bus_channel: u8) -> Self {
        self.bus_channel = bus_channel & 0x0F;
        self
    }

    pub fn with_direction(mut self, direction: CanDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn is_extended(&self) -> bool {
        self.extended || self.id > MAX_STANDARD_ID
    }

    pub fn data_length(&self) -> usize {
        dlc_to_len(self.dlc)
    }

    /// Converts any `embedded_can` frame. Remote frames keep their DLC
    /// without payload.
    #[cfg(feature = "can")]
    pub fn from_frame<F: embedded_can::Frame>(frame: &F) -> Self {
        let (id, extended) = match frame.id() {
            embedded_can::Id::Standard(id) => (u32::from(id.as_raw()), false),
            embedded_can::Id::Extended(id) => (id.as_raw(), true),
        };
        let mut message = Self::new(id, frame.data());
        message.extended = extended;
        message.dlc = len_to_dlc(frame.dlc());
        if frame.is_remote_frame() {
            message.data.clear();
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dlc_mapping_is_monotonic() {
        for dlc in 0..=15u8 {
            assert_eq!(len_to_dlc(dlc_to_len(dlc)), dlc);
        }
        assert_eq!(len_to_dlc(9), 9);
        assert_eq!(len_to_dlc(64), 15);
    }

    #[test]
    fn new_derives_flags() {
        let msg = CanMessage::new(12, &[1, 2]);
        assert_eq!(msg.dlc, 2);
        assert!(!msg.is_extended());
        assert!(!msg.edl);

        let fd = CanMessage::new(0x1234_5678, &[0u8; 20]).with_bus_channel(0x13);
        assert!(fd.is_extended());
        assert!(fd.edl);
        assert_eq!(fd.dlc, 11);
        assert_eq!(fd.data_length(), 20);
        assert_eq!(fd.bus_channel, 3);
    }

    #[cfg(feature = "can")]
    #[test]
    fn from_embedded_can_frame() {
        use embedded_can::{ExtendedId, Frame, Id, StandardId};

        #[derive(Debug)]
        struct TestFrame {
            id: Id,
            data: Vec<u8>,
            remote: bool,
        }

        impl Frame for TestFrame {
            fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
                Some(Self {
                    id: id.into(),
                    data: data.to_vec(),
                    remote: false,
                })
            }
            fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
                Some(Self {
                    id: id.into(),
                    data: vec![0; dlc],
                    remote: true,
                })
            }
            fn is_extended(&self) -> bool {
                matches!(self.id, Id::Extended(_))
            }
            fn is_remote_frame(&self) -> bool {
                self.remote
            }
            fn id(&self) -> Id {
                self.id
            }
            fn dlc(&self) -> usize {
                self.data.len()
            }
            fn data(&self) -> &[u8] {
                &self.data
            }
        }

        let frame = TestFrame::new(StandardId::new(12).unwrap(), &[0xAA, 0xBB]).unwrap();
        let msg = CanMessage::from_frame(&frame);
        assert_eq!((msg.id, msg.extended, msg.dlc), (12, false, 2));
        assert_eq!(msg.data, vec![0xAA, 0xBB]);

        let remote = TestFrame::new_remote(ExtendedId::new(0x100).unwrap(), 4).unwrap();
        let msg = CanMessage::from_frame(&remote);
        assert!(msg.extended);
        assert_eq!(msg.dlc, 4);
        assert!(msg.data.is_empty());
    }
}
