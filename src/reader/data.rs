//! Sample loading for one data group.

use std::collections::HashMap;
use std::io::{Read, Seek};

use super::TreeReader;
use crate::{
    Result,
    blocks::{
        Generation,
        data_block::{read_payload, read_payload_unfinalized},
    },
    layout::{self, RecordKind, RecordLayout},
    model::{DataGroup, SampleBuffer},
};

impl<R: Read + Seek> TreeReader<'_, R> {
    /// Reads and splits the data group's records into per channel group
    /// sample buffers.
    pub(super) fn load_data_group(&mut self, group: &mut DataGroup, finalized: bool) -> Result<()> {
        let payload = self.data_payload(group, finalized)?;

        let kinds: HashMap<u64, RecordKind> = group
            .channel_groups
            .iter()
            .map(|cg| {
                let kind = if cg.is_vlsd() {
                    RecordKind::Variable
                } else {
                    RecordKind::Fixed(RecordLayout {
                        record_id_size: group.record_id_size,
                        trailing_record_id: group.trailing_record_id,
                        data_bytes: cg.data_bytes,
                        inval_bytes: cg.inval_bytes,
                    })
                };
                (cg.record_id, kind)
            })
            .collect();
        let mut split = if payload.is_empty() || kinds.is_empty() {
            HashMap::new()
        } else {
            layout::split_records(&payload, group.record_id_size, &kinds)?
        };

        // VLSD streams are shared by every channel pointing at that group.
        let vlsd_streams: HashMap<u64, Vec<u8>> = group
            .channel_groups
            .iter()
            .filter(|cg| cg.is_vlsd())
            .filter_map(|cg| {
                split
                    .get(&cg.record_id)
                    .map(|records| (cg.record_id, records.variable.clone()))
            })
            .collect();

        for cg in &mut group.channel_groups {
            let records = split.remove(&cg.record_id).unwrap_or_default();
            let count = if finalized {
                if records.count < cg.nof_samples {
                    self.diagnostics.warning(
                        "reader",
                        &format!(
                            "channel group {:?}: {} records found, {} declared",
                            cg.name, records.count, cg.nof_samples
                        ),
                    );
                }
                records.count.min(cg.nof_samples)
            } else {
                records.count
            };
            cg.nof_samples = count;

            if cg.is_vlsd() {
                cg.samples = Some(SampleBuffer {
                    count,
                    ..Default::default()
                });
                continue;
            }

            let record_len = (cg.data_bytes + cg.inval_bytes) as usize;
            let mut fixed = records.fixed;
            fixed.truncate(record_len.saturating_mul(count as usize));

            let mut signal = HashMap::new();
            for (position, channel) in cg.channels.iter().enumerate() {
                if !channel.is_variable_length() {
                    continue;
                }
                if let Some(record_id) = channel.vlsd_record_id {
                    if let Some(stream) = vlsd_streams.get(&record_id) {
                        signal.insert(position, stream.clone());
                    }
                } else if channel.data_link != 0 {
                    signal.insert(
                        position,
                        read_payload(&self.codec, self.stream, channel.data_link)?,
                    );
                }
            }

            cg.samples = Some(SampleBuffer {
                records: fixed,
                record_len,
                count,
                signal,
            });
        }
        Ok(())
    }

    fn data_payload(&mut self, group: &DataGroup, finalized: bool) -> Result<Vec<u8>> {
        if group.data_link == 0 {
            return Ok(Vec::new());
        }
        match self.codec.generation() {
            Generation::Mdf4 if finalized => read_payload(&self.codec, self.stream, group.data_link),
            Generation::Mdf4 => read_payload_unfinalized(&self.codec, self.stream, group.data_link),
            Generation::Mdf3 => {
                let id_bytes = u64::from(group.record_id_size)
                    * if group.trailing_record_id { 2 } else { 1 };
                let len = group
                    .channel_groups
                    .iter()
                    .map(|cg| (id_bytes + u64::from(cg.data_bytes)) * cg.nof_samples)
                    .sum();
                self.raw_bytes(group.data_link, len)
            }
        }
    }
}
