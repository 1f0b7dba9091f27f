//! Record assembly and data block output.

use std::collections::HashMap;

use super::{MdfWriter, io::BlockWriter, queue::QueuedSample};
use crate::{
    Error, Result,
    blocks::{
        DataBlock, DataListBlock, DzBlock, HeaderListBlock, SignalDataBlock, SyncType,
        channel_block::CN_LINK_DATA, data_group_block::DG_LINK_DATA, v3::DG3_LINK_DATA,
    },
    layout,
    model::{ChannelGroup, ChannelId},
    types::Value,
};

/// Current record of a channel group, updated by the `set_channel_*` calls
/// and copied into the queue by `save_sample`.
#[derive(Debug, Clone, Default)]
pub(crate) struct GroupRecord {
    /// Data bytes followed by the invalidation bytes.
    pub record: Vec<u8>,
    /// Bytes of variable-length channels by channel position.
    pub variable: HashMap<usize, Vec<u8>>,
}

impl GroupRecord {
    pub fn new(cg: &ChannelGroup) -> Self {
        let variable = cg
            .channels
            .iter()
            .enumerate()
            .filter(|(_, ch)| ch.is_variable_length())
            .map(|(cn, _)| (cn, Vec::new()))
            .collect();
        Self {
            record: vec![0; cg.data_bytes as usize + cg.inval_bytes as usize],
            variable,
        }
    }

    pub fn set_value(&mut self, cg: &ChannelGroup, cn: usize, value: &Value) -> Result<()> {
        let ch = cg.channels.get(cn).ok_or(Error::OutOfRange {
            index: cn as u64,
            count: cg.channels.len() as u64,
        })?;
        if ch.is_virtual() {
            return Ok(());
        }
        if ch.is_variable_length() {
            self.variable
                .insert(cn, layout::encode_bytes(ch.data_type, value));
        } else {
            layout::encode_value(&mut self.record, &ch.field(), value)?;
        }
        if ch.has_invalidation_bit() {
            layout::set_invalidation_bit(&mut self.record, cg.data_bytes, ch.invalidation_bit, false);
        }
        Ok(())
    }

    pub fn set_invalid(&mut self, cg: &ChannelGroup, cn: usize) -> Result<()> {
        let ch = cg.channels.get(cn).ok_or(Error::OutOfRange {
            index: cn as u64,
            count: cg.channels.len() as u64,
        })?;
        if !ch.has_invalidation_bit() {
            return Err(Error::invalid_state(format!(
                "channel {:?} has no invalidation bit",
                ch.name
            )));
        }
        layout::set_invalidation_bit(&mut self.record, cg.data_bytes, ch.invalidation_bit, true);
        Ok(())
    }
}

/// Written and pending data of one data group.
#[derive(Debug, Clone, Default)]
pub(crate) struct DataGroupOutput {
    /// Records not yet in a data block, including their record ids.
    pub pending: Vec<u8>,
    /// Position and uncompressed length of every written DT/DZ block.
    pub blocks: Vec<(u64, u64)>,
    /// Next offset into the VLSD stream per VLSD record id.
    pub vlsd_offsets: HashMap<u64, u64>,
    /// Compression of the written DZ blocks, `None` for plain DT blocks.
    pub zip_type: Option<u8>,
}

/// Assigns byte offsets and invalidation bits to the channels of `cg` and
/// sets its record sizes. Top-level channels are packed in creation order;
/// component offsets are relative to their parent.
pub(crate) fn assign_layout(cg: &mut ChannelGroup) -> Result<()> {
    if cg.is_vlsd() {
        cg.data_bytes = 0;
        cg.inval_bytes = 0;
        return Ok(());
    }
    let mut offset = 0u32;
    for ch in cg.channels.iter_mut() {
        if ch.is_variable_length() {
            ch.bit_offset = 0;
            ch.bit_count = 64;
        }
        if ch.is_virtual() || ch.parent.is_some() {
            continue;
        }
        ch.byte_offset = offset;
        offset = offset
            .checked_add(ch.record_bytes() as u32)
            .ok_or_else(|| Error::invalid_state(format!("record of {:?} too large", cg.name)))?;
    }
    for cn in 0..cg.channels.len() {
        if let Some(parent) = cg.channels[cn].parent {
            let base = cg.channels[parent].byte_offset;
            cg.channels[cn].byte_offset += base;
        }
    }

    let mut data_bytes = 0usize;
    let mut inval_bits = 0u32;
    for ch in cg.channels.iter_mut() {
        if !ch.is_virtual() {
            data_bytes = data_bytes.max(ch.byte_offset as usize + ch.record_bytes());
        }
        if ch.has_invalidation_bit() {
            ch.invalidation_bit = inval_bits;
            inval_bits += 1;
        }
    }
    cg.data_bytes = u32::try_from(data_bytes)
        .map_err(|_| Error::invalid_state(format!("record of {:?} too large", cg.name)))?;
    cg.inval_bytes = inval_bits.div_ceil(8);
    Ok(())
}

impl MdfWriter {
    /// Completes a queued record and appends it to its data group's pending
    /// data.
    pub(super) fn write_sample(&mut self, sample: QueuedSample) -> Result<()> {
        let QueuedSample {
            time_ns,
            group,
            mut record,
            variable,
        } = sample;
        let start = self.start_ns.unwrap_or(time_ns);
        let seconds = (i128::from(time_ns) - i128::from(start)) as f64 / 1e9;

        let dg = self
            .file
            .header
            .data_groups
            .get(group.dg)
            .ok_or_else(|| Error::invalid_state(format!("unknown channel group {group:?}")))?;
        let record_id_size = dg.record_id_size;
        let cg = dg
            .channel_groups
            .get(group.cg)
            .ok_or_else(|| Error::invalid_state(format!("unknown channel group {group:?}")))?;
        let record_id = cg.record_id;
        for ch in &cg.channels {
            if ch.is_master() && !ch.is_virtual() && ch.sync_type == SyncType::Time {
                layout::encode_value(&mut record, &ch.field(), &Value::Float(seconds))?;
            }
        }
        let mut slots = Vec::with_capacity(variable.len());
        for (cn, bytes) in variable {
            let ch = cg.channels.get(cn).ok_or(Error::OutOfRange {
                index: cn as u64,
                count: cg.channels.len() as u64,
            })?;
            slots.push((cn, ch.byte_offset as usize, bytes));
        }

        for (cn, byte_offset, bytes) in slots {
            let offset = self.store_variable(group.channel(cn), record_id_size, &bytes)?;
            layout::write_bits(&mut record, byte_offset, 0, 64, false, offset)?;
        }

        let output = self
            .outputs
            .get_mut(group.dg)
            .ok_or_else(|| Error::invalid_state("writer outputs not initialized"))?;
        layout::push_record_id(&mut output.pending, record_id_size, record_id);
        output.pending.extend_from_slice(&record);
        if let Some(cg) = self.file.channel_group_mut(group) {
            cg.nof_samples += 1;
        }
        Ok(())
    }

    /// Stores one variable-length value and returns the offset written to
    /// the record.
    fn store_variable(&mut self, id: ChannelId, record_id_size: u8, bytes: &[u8]) -> Result<u64> {
        let Some(&target) = self.vlsd_targets.get(&id) else {
            let stream = self.signal_data.entry(id).or_default();
            return layout::push_signal_entry(stream, bytes);
        };
        let len = u32::try_from(bytes.len()).map_err(|_| {
            Error::BlockSerializationError(format!("VLSD value of {} bytes", bytes.len()))
        })?;
        let vlsd = self
            .file
            .channel_group_mut(target)
            .ok_or_else(|| Error::invalid_state(format!("unknown VLSD group {target:?}")))?;
        vlsd.nof_samples += 1;
        let vlsd_record_id = vlsd.record_id;

        let output = self
            .outputs
            .get_mut(target.dg)
            .ok_or_else(|| Error::invalid_state("writer outputs not initialized"))?;
        let next = output.vlsd_offsets.entry(vlsd_record_id).or_insert(0);
        let offset = *next;
        *next += 4 + u64::from(len);
        layout::push_record_id(&mut output.pending, record_id_size, vlsd_record_id);
        output.pending.extend_from_slice(&len.to_le_bytes());
        output.pending.extend_from_slice(bytes);
        Ok(offset)
    }

    /// Moves pending records of every data group into DT (or DZ) blocks.
    pub(super) fn write_pending_blocks(&mut self, out: &mut BlockWriter) -> Result<()> {
        for (position, output) in self.outputs.iter_mut().enumerate() {
            if output.pending.is_empty() {
                continue;
            }
            let data = std::mem::take(&mut output.pending);
            let len = data.len() as u64;
            let bytes = if self.config.compress {
                // Transposition only pays off when every record has the same size.
                let record_size = match self.file.header.data_groups.get(position) {
                    Some(dg) if dg.channel_groups.len() == 1 && dg.record_id_size == 0 => {
                        dg.channel_groups[0].layout(0).record_size()
                    }
                    _ => 0,
                };
                let dz = DzBlock::compress("DT", &data, record_size)?;
                output.zip_type = Some(dz.zip_type as u8);
                dz.to_bytes()?
            } else {
                DataBlock::new(data).to_bytes()?
            };
            let pos = out.write_block(&bytes)?;
            output.blocks.push((pos, len));
            tracing::trace!(data_group = position, pos, len, "wrote data block");
        }
        Ok(())
    }

    /// Links the written data blocks to their data groups, through a DL
    /// block when there is more than one. A DL of DZ blocks gets an HL block
    /// in front.
    pub(super) fn write_data_blocks_v4(&mut self, out: &mut BlockWriter) -> Result<()> {
        self.write_pending_blocks(out)?;
        for (position, output) in self.outputs.iter().enumerate() {
            let dg_addr = self.file.header.data_groups[position].index;
            let link = match output.blocks.as_slice() {
                [] => continue,
                [(pos, _)] => *pos,
                blocks => {
                    let links: Vec<u64> = blocks.iter().map(|(pos, _)| *pos).collect();
                    let lengths: Vec<u64> = blocks.iter().map(|(_, len)| *len).collect();
                    let dl = DataListBlock::new(links, &lengths);
                    let dl_addr = out.write_block(&dl.to_bytes()?)?;
                    match output.zip_type {
                        Some(zip_type) => {
                            out.write_block(&HeaderListBlock::new(dl_addr, zip_type).to_bytes()?)?
                        }
                        None => dl_addr,
                    }
                }
            };
            out.update_link(dg_addr + DG_LINK_DATA, link)?;
        }
        Ok(())
    }

    /// MDF 3 keeps all records in memory and writes them as one contiguous
    /// data section per data group.
    pub(super) fn write_data_blocks_v3(&mut self, out: &mut BlockWriter) -> Result<()> {
        for (position, output) in self.outputs.iter_mut().enumerate() {
            if output.pending.is_empty() {
                continue;
            }
            let data = std::mem::take(&mut output.pending);
            let pos = out.write_raw(&data)?;
            let dg_addr = self.file.header.data_groups[position].index;
            out.update_link_v3(dg_addr + DG3_LINK_DATA, pos)?;
        }
        Ok(())
    }

    /// Writes one SD (or DZ) block per variable-length channel.
    pub(super) fn write_signal_data_v4(&mut self, out: &mut BlockWriter) -> Result<()> {
        let mut streams: Vec<(ChannelId, Vec<u8>)> = self.signal_data.drain().collect();
        streams.sort_by_key(|(id, _)| *id);
        for (id, stream) in streams {
            if stream.is_empty() {
                continue;
            }
            let cn_addr = self
                .file
                .channel(id)
                .map(|ch| ch.index)
                .ok_or_else(|| Error::invalid_state(format!("unknown channel {id:?}")))?;
            let bytes = if self.config.compress {
                DzBlock::compress("SD", &stream, 0)?.to_bytes()?
            } else {
                SignalDataBlock::new(stream).to_bytes()?
            };
            let pos = out.write_block(&bytes)?;
            out.update_link(cn_addr + CN_LINK_DATA, pos)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{ChannelType, DataType, channel_block::cn_flags};
    use crate::model::Channel;

    fn group() -> ChannelGroup {
        let mut cg = ChannelGroup::new("g");
        cg.channels.push(Channel::master_time("t"));
        let mut flag = Channel::new("Flag", DataType::UnsignedIntegerLE, 1);
        flag.flags = cn_flags::INVAL_BIT_VALID;
        cg.channels.push(flag);
        cg.channels.push(
            Channel::new("Text", DataType::StringUtf8, 64).with_type(ChannelType::VariableLength),
        );
        cg.channels.push(Channel::new("Frame", DataType::ByteArray, 32));
        let mut id = Channel::new("ID", DataType::UnsignedIntegerLE, 16);
        id.parent = Some(3);
        id.byte_offset = 2;
        cg.channels.push(id);
        cg
    }

    #[test]
    fn layout_packs_channels_and_components() {
        let mut cg = group();
        assign_layout(&mut cg).unwrap();
        let offsets: Vec<u32> = cg.channels.iter().map(|c| c.byte_offset).collect();
        assert_eq!(offsets, vec![0, 8, 9, 17, 19]);
        assert_eq!(cg.data_bytes, 21);
        assert_eq!(cg.inval_bytes, 1);
        assert_eq!(cg.channels[2].bit_count, 64);
    }

    #[test]
    fn record_values_and_invalidation() {
        let mut cg = group();
        assign_layout(&mut cg).unwrap();
        let mut record = GroupRecord::new(&cg);
        assert_eq!(record.record.len(), 22);
        assert!(record.variable.contains_key(&2));

        record.set_invalid(&cg, 1).unwrap();
        assert!(layout::invalidation_bit(&record.record, cg.data_bytes, 0));
        record.set_value(&cg, 1, &Value::UnsignedInteger(1)).unwrap();
        assert!(!layout::invalidation_bit(&record.record, cg.data_bytes, 0));
        assert_eq!(record.record[8], 1);

        record.set_value(&cg, 2, &Value::String("abc".into())).unwrap();
        assert_eq!(record.variable[&2], b"abc".to_vec());
        assert!(record.set_invalid(&cg, 4).is_err());
    }

    #[test]
    fn vlsd_groups_have_no_record_bytes() {
        let mut cg = ChannelGroup::new("vlsd");
        cg.flags = crate::blocks::channel_group_block::CG_FLAG_VLSD;
        cg.data_bytes = 12;
        assign_layout(&mut cg).unwrap();
        assert_eq!((cg.data_bytes, cg.inval_bytes), (0, 0));
    }
}
