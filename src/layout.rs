//! Record layout engine.
//!
//! A channel group's record is `record id | data bytes | invalidation bytes`.
//! [`Field`] locates one channel value inside the data bytes; the functions
//! here extract and pack values of any bit width up to 64 in either byte
//! order, handle invalidation bits and split a data group's payload into
//! per channel group record streams.

use std::collections::HashMap;

use crate::{
    Error, Result,
    blocks::{DataType, common::u64_to_usize},
    types::Value,
};

/// Position and type of a value inside a record's data bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub byte_offset: u32,
    pub bit_offset: u8,
    pub bit_count: u32,
    pub data_type: DataType,
}

impl Field {
    pub fn new(byte_offset: u32, bit_offset: u8, bit_count: u32, data_type: DataType) -> Self {
        Self {
            byte_offset,
            bit_offset,
            bit_count,
            data_type,
        }
    }

    /// Bytes touched by the field.
    pub fn byte_len(&self) -> usize {
        if self.data_type.is_byte_sequence() {
            (self.bit_count / 8) as usize
        } else {
            (self.bit_offset as usize + self.bit_count as usize).div_ceil(8)
        }
    }

    /// First byte after the field.
    pub fn end(&self) -> usize {
        self.byte_offset as usize + self.byte_len()
    }
}

/// Record sizes of one channel group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordLayout {
    pub record_id_size: u8,
    /// Record id repeated after the data (MDF3 with two record ids).
    pub trailing_record_id: bool,
    pub data_bytes: u32,
    pub inval_bytes: u32,
}

impl RecordLayout {
    /// Data plus invalidation bytes, the part kept per sample.
    pub fn payload_size(&self) -> usize {
        self.data_bytes as usize + self.inval_bytes as usize
    }

    /// Full record size on disk.
    pub fn record_size(&self) -> usize {
        let ids = if self.trailing_record_id { 2 } else { 1 };
        self.payload_size() + self.record_id_size as usize * ids
    }
}

fn mask(bit_count: u32) -> u64 {
    if bit_count >= 64 {
        u64::MAX
    } else {
        (1u64 << bit_count) - 1
    }
}

/// Extracts `bit_count` bits starting `bit_offset` bits into the bytes at
/// `byte_offset`. Big endian fields count bits from the least significant
/// end of the big endian integer.
pub fn read_bits(
    data: &[u8],
    byte_offset: usize,
    bit_offset: u8,
    bit_count: u32,
    big_endian: bool,
) -> Option<u64> {
    if bit_count == 0 || bit_count > 64 {
        return None;
    }
    let len = (bit_offset as usize + bit_count as usize).div_ceil(8);
    let slice = data.get(byte_offset..byte_offset + len)?;
    let raw: u128 = if big_endian {
        slice.iter().fold(0u128, |acc, &b| (acc << 8) | u128::from(b))
    } else {
        slice
            .iter()
            .rev()
            .fold(0u128, |acc, &b| (acc << 8) | u128::from(b))
    };
    Some(((raw >> bit_offset) as u64) & mask(bit_count))
}

/// Inverse of [`read_bits`]; bits outside the field are preserved.
pub fn write_bits(
    data: &mut [u8],
    byte_offset: usize,
    bit_offset: u8,
    bit_count: u32,
    big_endian: bool,
    value: u64,
) -> Result<()> {
    if bit_count == 0 || bit_count > 64 {
        return Err(Error::BlockSerializationError(format!(
            "unsupported bit count {bit_count}"
        )));
    }
    let len = (bit_offset as usize + bit_count as usize).div_ceil(8);
    let available = data.len();
    let slice = data
        .get_mut(byte_offset..byte_offset + len)
        .ok_or(Error::TooShortBuffer {
            actual: available,
            expected: byte_offset + len,
            file: file!(),
            line: line!(),
        })?;
    let field_mask = u128::from(mask(bit_count)) << bit_offset;
    let mut raw: u128 = if big_endian {
        slice.iter().fold(0u128, |acc, &b| (acc << 8) | u128::from(b))
    } else {
        slice
            .iter()
            .rev()
            .fold(0u128, |acc, &b| (acc << 8) | u128::from(b))
    };
    raw = (raw & !field_mask) | ((u128::from(value) << bit_offset) & field_mask);
    for i in 0..len {
        let byte = (raw >> (8 * i)) as u8;
        if big_endian {
            slice[len - 1 - i] = byte;
        } else {
            slice[i] = byte;
        }
    }
    Ok(())
}

/// Decodes whole-byte data (strings, byte arrays, MIME, CANopen) as a value.
pub fn decode_bytes(data_type: DataType, bytes: &[u8]) -> Value {
    match data_type {
        DataType::StringLatin1 => Value::String(
            bytes
                .iter()
                .map(|&b| b as char)
                .collect::<String>()
                .trim_end_matches('\0')
                .to_string(),
        ),
        DataType::StringUtf8 => Value::String(
            String::from_utf8_lossy(bytes)
                .trim_end_matches('\0')
                .to_string(),
        ),
        DataType::StringUtf16LE | DataType::StringUtf16BE => {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| {
                    if data_type == DataType::StringUtf16LE {
                        u16::from_le_bytes([c[0], c[1]])
                    } else {
                        u16::from_be_bytes([c[0], c[1]])
                    }
                })
                .collect();
            Value::String(
                String::from_utf16_lossy(&units)
                    .trim_end_matches('\0')
                    .to_string(),
            )
        }
        _ => Value::ByteArray(bytes.to_vec()),
    }
}

/// Byte representation of a value for a whole-byte field.
pub fn encode_bytes(data_type: DataType, value: &Value) -> Vec<u8> {
    match (data_type, value) {
        (_, Value::ByteArray(bytes)) => bytes.clone(),
        (DataType::StringLatin1, v) => crate::blocks::text_block::latin1_bytes(&text_of(v)),
        (DataType::StringUtf16LE, v) => text_of(v)
            .encode_utf16()
            .flat_map(u16::to_le_bytes)
            .collect(),
        (DataType::StringUtf16BE, v) => text_of(v)
            .encode_utf16()
            .flat_map(u16::to_be_bytes)
            .collect(),
        (_, v) => text_of(v).into_bytes(),
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Decodes the value of `field` from a record's data bytes (record id
/// already stripped). `None` when the record is too short or the type has
/// no scalar decoding.
pub fn decode_value(data: &[u8], field: &Field) -> Option<Value> {
    let offset = field.byte_offset as usize;
    let dt = field.data_type;
    if dt.is_byte_sequence() || matches!(dt, DataType::CanOpenDate | DataType::CanOpenTime) {
        let len = if dt.is_byte_sequence() {
            field.byte_len()
        } else {
            (field.bit_count / 8) as usize
        };
        return data.get(offset..offset + len).map(|b| decode_bytes(dt, b));
    }
    let big_endian = dt.is_big_endian();
    match dt {
        DataType::UnsignedIntegerLE | DataType::UnsignedIntegerBE => {
            read_bits(data, offset, field.bit_offset, field.bit_count, big_endian)
                .map(Value::UnsignedInteger)
        }
        DataType::SignedIntegerLE | DataType::SignedIntegerBE => {
            let raw = read_bits(data, offset, field.bit_offset, field.bit_count, big_endian)?;
            let bits = field.bit_count;
            let signed = if bits < 64 && raw & (1u64 << (bits - 1)) != 0 {
                (raw | !mask(bits)) as i64
            } else {
                raw as i64
            };
            Some(Value::SignedInteger(signed))
        }
        DataType::FloatLE | DataType::FloatBE => {
            let raw = read_bits(data, offset, field.bit_offset, field.bit_count, big_endian)?;
            match field.bit_count {
                32 => Some(Value::Float(f64::from(f32::from_bits(raw as u32)))),
                64 => Some(Value::Float(f64::from_bits(raw))),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Packs `value` into `field` of a record's data bytes.
pub fn encode_value(data: &mut [u8], field: &Field, value: &Value) -> Result<()> {
    let offset = field.byte_offset as usize;
    let dt = field.data_type;
    if dt.is_byte_sequence() || matches!(dt, DataType::CanOpenDate | DataType::CanOpenTime) {
        let len = (field.bit_count / 8) as usize;
        let slot = data.get_mut(offset..offset + len).ok_or_else(|| {
            Error::BlockSerializationError(format!(
                "field at byte {offset} with {len} bytes exceeds the record"
            ))
        })?;
        let bytes = encode_bytes(dt, value);
        slot.fill(0);
        let n = bytes.len().min(len);
        slot[..n].copy_from_slice(&bytes[..n]);
        return Ok(());
    }
    let big_endian = dt.is_big_endian();
    let raw = match dt {
        DataType::FloatLE | DataType::FloatBE => {
            let v = value.as_f64().unwrap_or(0.0);
            match field.bit_count {
                32 => u64::from((v as f32).to_bits()),
                64 => v.to_bits(),
                other => {
                    return Err(Error::BlockSerializationError(format!(
                        "float channels must be 32 or 64 bits, got {other}"
                    )));
                }
            }
        }
        DataType::SignedIntegerLE | DataType::SignedIntegerBE => {
            integer_of(value).map_or(0, |v| v as u64)
        }
        _ => match value {
            Value::UnsignedInteger(v) => *v,
            other => integer_of(other).map_or(0, |v| v as u64),
        },
    };
    write_bits(data, offset, field.bit_offset, field.bit_count, big_endian, raw)
}

fn integer_of(value: &Value) -> Option<i64> {
    match value {
        Value::Float(v) if v.is_finite() => Some(v.round() as i64),
        other => other.as_i64(),
    }
}

/// True when the invalidation bit at `bit_pos` is set. `data` holds the data
/// bytes followed by the invalidation bytes.
pub fn invalidation_bit(data: &[u8], data_bytes: u32, bit_pos: u32) -> bool {
    let index = data_bytes as usize + (bit_pos >> 3) as usize;
    data.get(index)
        .is_some_and(|byte| (byte >> (bit_pos & 7)) & 1 != 0)
}

pub fn set_invalidation_bit(data: &mut [u8], data_bytes: u32, bit_pos: u32, invalid: bool) {
    let index = data_bytes as usize + (bit_pos >> 3) as usize;
    if let Some(byte) = data.get_mut(index) {
        let bit = 1u8 << (bit_pos & 7);
        if invalid {
            *byte |= bit;
        } else {
            *byte &= !bit;
        }
    }
}

pub fn read_record_id(bytes: &[u8], size: u8) -> Option<u64> {
    match size {
        0 => Some(0),
        1 => bytes.first().map(|&b| u64::from(b)),
        2 | 4 | 8 => read_bits(bytes, 0, 0, u32::from(size) * 8, false),
        _ => None,
    }
}

pub fn push_record_id(out: &mut Vec<u8>, size: u8, record_id: u64) {
    out.extend_from_slice(&record_id.to_le_bytes()[..size as usize]);
}

/// How records of one record id are stored in the data stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Fixed(RecordLayout),
    /// VLSD channel group: `u32 length` followed by the bytes.
    Variable,
}

/// Records of one channel group taken from a data stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupRecords {
    /// Concatenated data and invalidation bytes.
    pub fixed: Vec<u8>,
    /// VLSD entries as `u32 length + bytes`, in stream order.
    pub variable: Vec<u8>,
    pub count: u64,
}

/// Splits a data group's payload by record id. Trailing bytes that do not
/// form a complete record are ignored.
pub fn split_records(
    payload: &[u8],
    record_id_size: u8,
    kinds: &HashMap<u64, RecordKind>,
) -> Result<HashMap<u64, GroupRecords>> {
    let mut out: HashMap<u64, GroupRecords> = HashMap::new();
    if record_id_size == 0 {
        let (&id, kind) = kinds.iter().next().ok_or_else(|| {
            Error::BlockLinkError("data group without channel groups has data".into())
        })?;
        let entry = out.entry(id).or_default();
        if let RecordKind::Fixed(layout) = kind {
            let size = layout.payload_size();
            if size > 0 {
                let complete = payload.len() / size * size;
                entry.fixed.extend_from_slice(&payload[..complete]);
                entry.count = (payload.len() / size) as u64;
            }
        }
        return Ok(out);
    }

    let id_len = record_id_size as usize;
    let mut pos = 0usize;
    while pos + id_len <= payload.len() {
        let Some(id) = read_record_id(&payload[pos..], record_id_size) else {
            break;
        };
        let kind = kinds.get(&id).ok_or_else(|| {
            Error::BlockSerializationError(format!(
                "unknown record id {id} at data offset {pos}"
            ))
        })?;
        let start = pos + id_len;
        match kind {
            RecordKind::Fixed(layout) => {
                let end = start + layout.payload_size();
                let next = end + if layout.trailing_record_id { id_len } else { 0 };
                if next > payload.len() {
                    break;
                }
                let entry = out.entry(id).or_default();
                entry.fixed.extend_from_slice(&payload[start..end]);
                entry.count += 1;
                pos = next;
            }
            RecordKind::Variable => {
                if start + 4 > payload.len() {
                    break;
                }
                let len = u64::from(u32::from_le_bytes([
                    payload[start],
                    payload[start + 1],
                    payload[start + 2],
                    payload[start + 3],
                ]));
                let end = start + 4 + u64_to_usize(len, "VLSD record length")?;
                if end > payload.len() {
                    break;
                }
                let entry = out.entry(id).or_default();
                entry.variable.extend_from_slice(&payload[start..end]);
                entry.count += 1;
                pos = end;
            }
        }
    }
    Ok(out)
}

/// Bytes of the `u32 length + bytes` entry at `offset` in a signal data or
/// VLSD stream.
pub fn signal_entry(stream: &[u8], offset: u64) -> Option<&[u8]> {
    let start = usize::try_from(offset).ok()?;
    let head = stream.get(start..start.checked_add(4)?)?;
    let len = u32::from_le_bytes([head[0], head[1], head[2], head[3]]) as usize;
    stream.get(start + 4..start + 4 + len)
}

/// Appends a `u32 length + bytes` entry and returns its offset.
pub fn push_signal_entry(stream: &mut Vec<u8>, bytes: &[u8]) -> Result<u64> {
    let len = u32::try_from(bytes.len()).map_err(|_| {
        Error::BlockSerializationError(format!(
            "signal value of {} bytes exceeds the u32 length field",
            bytes.len()
        ))
    })?;
    let offset = stream.len() as u64;
    stream.extend_from_slice(&len.to_le_bytes());
    stream.extend_from_slice(bytes);
    Ok(offset)
}
