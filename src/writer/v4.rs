//! MDF 4.x block output.
//!
//! Blocks are written children first so that every link is known when its
//! block is emitted; only the next-links that run forward in the file and
//! the data links are patched afterwards.

use super::{HistoryLinks, MdfWriter, io::BlockWriter, now_ns};
use crate::{
    Error, Result,
    blocks::{
        AttachmentBlock, ChannelBlock, ChannelGroupBlock, ConversionBlock, DataGroupBlock,
        EventBlock, FileHistoryBlock, Generation, HeaderBlock, IdentificationBlock,
        MetadataBlock, SourceBlock, TextBlock,
        channel_block::{CN_LINK_DATA, cn_flags},
        channel_group_block::{CG_CYCLES, CG_DATA_BYTES, CG_INVAL_BYTES},
        conversion_block::{CC_FLAG_PRECISION_VALID, CC_FLAG_RANGE_VALID},
        header_block::{HD_FLAG_ANGLE_VALID, HD_FLAG_DISTANCE_VALID, HD_LINK_DG},
        identification_block::{UNFIN_CG_COUNTERS, UNFIN_DT_LENGTH, UNFINALIZED_ID},
        source_block::SI_FLAG_SIMULATED,
    },
    conversion::{Conversion, ConversionKind, TextValue},
    metadata::MetaData,
    model::{Channel, ChannelGroup, DataGroup, FileHistory, Header, SourceInformation},
};

/// Writes a TX block; empty text gives a zero link.
fn write_text(out: &mut BlockWriter, text: &str) -> Result<u64> {
    if text.is_empty() {
        return Ok(0);
    }
    out.write_block(&TextBlock::new(text).to_bytes()?)
}

/// Writes an MD block with `text` as its `<TX>` content.
fn write_comment(
    out: &mut BlockWriter,
    root: &str,
    metadata: Option<&MetaData>,
    text: &str,
) -> Result<u64> {
    let mut meta = match metadata {
        Some(meta) if !meta.root().is_empty() => meta.clone(),
        _ => MetaData::new(root),
    };
    meta.set_text(text);
    write_metadata(out, &meta)
}

fn write_metadata(out: &mut BlockWriter, meta: &MetaData) -> Result<u64> {
    if meta.is_empty() {
        return Ok(0);
    }
    out.write_block(&MetadataBlock::new(&meta.to_xml()?).to_bytes()?)
}

fn write_source(out: &mut BlockWriter, source: Option<&SourceInformation>) -> Result<u64> {
    let Some(source) = source else {
        return Ok(0);
    };
    let mut si = SourceBlock::new(source.source_type, source.bus_type);
    si.name_addr = write_text(out, &source.name)?;
    si.path_addr = write_text(out, &source.path)?;
    si.comment_addr = write_comment(
        out,
        "SIcomment",
        source.metadata.as_ref(),
        &source.description,
    )?;
    if source.simulated {
        si.flags |= SI_FLAG_SIMULATED;
    }
    out.write_block(&si.to_bytes()?)
}

fn write_text_value(out: &mut BlockWriter, value: &TextValue) -> Result<u64> {
    match value {
        TextValue::Text(text) => write_text(out, text),
        TextValue::Scale(conversion) => write_conversion(out, Some(conversion)),
    }
}

fn write_conversion(out: &mut BlockWriter, conversion: Option<&Conversion>) -> Result<u64> {
    let Some(cc) = conversion else {
        return Ok(0);
    };
    let inverse_addr = write_conversion(out, cc.inverse.as_deref())?;
    let pairs = |table: &[(f64, f64)]| -> Vec<f64> { table.iter().flat_map(|(k, v)| [*k, *v]).collect() };

    let (refs, values): (Vec<u64>, Vec<f64>) = match &cc.kind {
        ConversionKind::Identity => (Vec::new(), Vec::new()),
        ConversionKind::Linear { offset, factor } => (Vec::new(), vec![*offset, *factor]),
        ConversionKind::Rational { p } => (Vec::new(), p.to_vec()),
        ConversionKind::Algebraic { .. }
        | ConversionKind::Exponential { .. }
        | ConversionKind::Logarithmic { .. } => {
            let formula = cc.formula().unwrap_or_default();
            (vec![out.write_block(&TextBlock::new(&formula).to_bytes()?)?], Vec::new())
        }
        ConversionKind::ValueToValueInterp { table } | ConversionKind::ValueToValue { table } => {
            (Vec::new(), pairs(table.as_slice()))
        }
        ConversionKind::RangeToValue { ranges, default } => {
            let mut values: Vec<f64> = ranges.iter().flat_map(|(a, b, v)| [*a, *b, *v]).collect();
            values.push(*default);
            (Vec::new(), values)
        }
        ConversionKind::ValueToText { table, default } => {
            let mut refs = Vec::with_capacity(table.len() + 1);
            for (_, value) in table {
                refs.push(write_text_value(out, value)?);
            }
            refs.push(write_text_value(out, default)?);
            (refs, table.iter().map(|(key, _)| *key).collect())
        }
        ConversionKind::RangeToText { ranges, default } => {
            let mut refs = Vec::with_capacity(ranges.len() + 1);
            for (_, _, value) in ranges {
                refs.push(write_text_value(out, value)?);
            }
            refs.push(write_text_value(out, default)?);
            (refs, ranges.iter().flat_map(|(a, b, _)| [*a, *b]).collect())
        }
        ConversionKind::TextToValue { table, default } => {
            let mut refs = Vec::with_capacity(table.len());
            for (key, _) in table {
                refs.push(write_text(out, key)?);
            }
            let mut values: Vec<f64> = table.iter().map(|(_, v)| *v).collect();
            values.push(*default);
            (refs, values)
        }
        ConversionKind::TextToText { table, default } => {
            let mut refs = Vec::with_capacity(table.len() * 2 + 1);
            for (from, to) in table {
                refs.push(write_text(out, from)?);
                refs.push(write_text(out, to)?);
            }
            refs.push(match default {
                Some(text) => out.write_block(&TextBlock::new(text).to_bytes()?)?,
                None => 0,
            });
            (refs, Vec::new())
        }
    };

    let mut block = ConversionBlock {
        name_addr: write_text(out, &cc.name)?,
        unit_addr: write_text(out, &cc.unit)?,
        comment_addr: write_text(out, &cc.description)?,
        inverse_addr,
        refs,
        conversion_type: cc.type_code(),
        values,
        ..Default::default()
    };
    if let Some(precision) = cc.precision {
        block.precision = precision;
        block.flags |= CC_FLAG_PRECISION_VALID;
    }
    if let Some((min, max)) = cc.range {
        block.phys_range_min = min;
        block.phys_range_max = max;
        block.flags |= CC_FLAG_RANGE_VALID;
    }
    out.write_block(&block.to_bytes()?)
}

fn write_channel(out: &mut BlockWriter, ch: &Channel, next: u64, component: u64) -> Result<u64> {
    let mut meta = MetaData::new("CNcomment");
    meta.set_text(&ch.description);
    if !ch.display_name.is_empty() {
        meta.set_element("display_name", &ch.display_name);
    }
    let mut block = ChannelBlock {
        next_ch_addr: next,
        component_addr: component,
        name_addr: write_text(out, &ch.name)?,
        source_addr: write_source(out, ch.source.as_ref())?,
        conversion_addr: write_conversion(out, ch.conversion.as_ref())?,
        unit_addr: write_text(out, &ch.unit)?,
        comment_addr: write_metadata(out, &meta)?,
        channel_type: ch.channel_type,
        sync_type: ch.sync_type,
        data_type: ch.data_type,
        bit_offset: ch.bit_offset,
        byte_offset: ch.byte_offset,
        bit_count: ch.bit_count,
        flags: ch.flags,
        pos_invalidation_bit: ch.invalidation_bit,
        ..Default::default()
    };
    if let Some(precision) = ch.precision {
        block.precision = precision;
        block.flags |= cn_flags::PRECISION_VALID;
    }
    if let Some((min, max)) = ch.range {
        (block.min_raw_value, block.max_raw_value) = (min, max);
        block.flags |= cn_flags::RANGE_VALID;
    }
    if let Some((lo, hi)) = ch.limit {
        (block.lower_limit, block.upper_limit) = (lo, hi);
        block.flags |= cn_flags::LIMIT_VALID;
    }
    if let Some((lo, hi)) = ch.ext_limit {
        (block.lower_ext_limit, block.upper_ext_limit) = (lo, hi);
        block.flags |= cn_flags::EXT_LIMIT_VALID;
    }
    out.write_block(&block.to_bytes()?)
}

/// Writes the channels below `parent` (top level for `None`) and returns
/// the address of the first one.
fn write_channels(out: &mut BlockWriter, channels: &mut [Channel], parent: Option<usize>) -> Result<u64> {
    let children: Vec<usize> = (0..channels.len())
        .filter(|&cn| channels[cn].parent == parent && Some(cn) != parent)
        .collect();
    let mut next = 0;
    for &cn in children.iter().rev() {
        let component = write_channels(out, channels, Some(cn))?;
        next = write_channel(out, &channels[cn], next, component)?;
        channels[cn].index = next;
    }
    Ok(next)
}

fn write_channel_group(out: &mut BlockWriter, cg: &mut ChannelGroup, next: u64) -> Result<u64> {
    let first_ch_addr = write_channels(out, &mut cg.channels, None)?;
    for cn in 0..cg.channels.len() {
        if let Some(size) = cg.channels[cn].size_channel {
            let target = cg.channels[size].index;
            out.update_link(cg.channels[cn].index + CN_LINK_DATA, target)?;
        }
    }
    let block = ChannelGroupBlock {
        next_cg_addr: next,
        first_ch_addr,
        acq_name_addr: write_text(out, &cg.name)?,
        acq_source_addr: write_source(out, cg.source.as_ref())?,
        comment_addr: write_comment(out, "CGcomment", cg.metadata.as_ref(), &cg.description)?,
        record_id: cg.record_id,
        flags: cg.flags,
        path_separator: cg
            .path_separator
            .and_then(|c| u16::try_from(u32::from(c)).ok())
            .unwrap_or(0),
        samples_byte_nr: cg.data_bytes,
        invalidation_bytes_nr: cg.inval_bytes,
        ..Default::default()
    };
    cg.index = out.write_block(&block.to_bytes()?)?;
    Ok(cg.index)
}

fn write_data_group(out: &mut BlockWriter, dg: &mut DataGroup, next: u64) -> Result<u64> {
    let mut first_cg_addr = 0;
    for cg in dg.channel_groups.iter_mut().rev() {
        first_cg_addr = write_channel_group(out, cg, first_cg_addr)?;
    }
    let block = DataGroupBlock {
        next_dg_addr: next,
        first_cg_addr,
        data_block_addr: 0,
        comment_addr: write_comment(out, "DGcomment", dg.metadata.as_ref(), &dg.description)?,
        record_id_size: dg.record_id_size,
    };
    dg.index = out.write_block(&block.to_bytes()?)?;
    Ok(dg.index)
}

fn header_block(header: &Header, first_dg_addr: u64, links: &HistoryLinks) -> HeaderBlock {
    let mut hd = HeaderBlock {
        first_dg_addr,
        file_history_addr: links.file_history,
        first_attachment_addr: links.attachments,
        first_event_addr: links.events,
        comment_addr: links.comment,
        abs_time: header.start_time_ns,
        tz_offset: header.tz_offset_min,
        dst_offset: header.dst_offset_min,
        time_flags: header.time_flags,
        ..Default::default()
    };
    if let Some(angle) = header.start_angle {
        hd.start_angle = angle;
        hd.flags |= HD_FLAG_ANGLE_VALID;
    }
    if let Some(distance) = header.start_distance {
        hd.start_distance = distance;
        hd.flags |= HD_FLAG_DISTANCE_VALID;
    }
    hd
}

impl MdfWriter {
    /// Writes the unfinalized identification, the header and the channel
    /// tree.
    pub(super) fn write_configuration_v4(&mut self, out: &mut BlockWriter) -> Result<()> {
        let mut id = IdentificationBlock::new(Generation::Mdf4, &self.config.program_id);
        id.file_id = UNFINALIZED_ID.to_string();
        id.format_version = self.file.version.clone();
        id.version_number = self.file.version_number;
        id.unfinalized_flags = UNFIN_CG_COUNTERS | UNFIN_DT_LENGTH;
        out.write_block(&id.to_bytes()?)?;

        let header = &mut self.file.header;
        header.index = out.write_block(
            &header_block(header, 0, &HistoryLinks::default()).to_bytes()?,
        )?;

        let mut first_dg = 0;
        for dg in header.data_groups.iter_mut().rev() {
            first_dg = write_data_group(out, dg, first_dg)?;
        }
        out.update_link(header.index + HD_LINK_DG, first_dg)?;

        for (channel, group) in &self.vlsd_targets {
            let cn_addr = self.file.channel(*channel).map_or(0, |ch| ch.index);
            let cg_addr = self.file.channel_group(*group).map_or(0, |cg| cg.index);
            if cn_addr != 0 && cg_addr != 0 {
                out.update_link(cn_addr + CN_LINK_DATA, cg_addr)?;
            }
        }
        out.flush()
    }

    /// File history, events, attachments and the header comment.
    pub(super) fn write_history_v4(&mut self, out: &mut BlockWriter) -> Result<HistoryLinks> {
        let header = &mut self.file.header;
        if header.file_histories.is_empty() {
            header.file_histories.push(FileHistory {
                time_ns: now_ns(),
                tool_id: self.config.program_id.clone(),
                tool_vendor: env!("CARGO_PKG_NAME").to_string(),
                tool_version: env!("CARGO_PKG_VERSION").to_string(),
                description: "created".to_string(),
                ..Default::default()
            });
        }

        let histories = header.file_histories.len();
        let creators = header
            .events
            .iter()
            .map(|ev| (ev.name.as_str(), ev.creator_index))
            .chain(header.attachments.iter().map(|at| (at.file_name.as_str(), at.creator_index)));
        for (name, creator) in creators {
            if usize::from(creator) >= histories {
                return Err(Error::BlockLinkError(format!(
                    "{name:?} names creator {creator}, the file has {histories} file histories"
                )));
            }
        }

        let mut links = HistoryLinks::default();
        for history in header.file_histories.iter_mut().rev() {
            let mut fh = FileHistoryBlock::new(history.time_ns);
            fh.next_fh_addr = links.file_history;
            fh.comment_addr = write_metadata(out, &history.comment())?;
            history.index = out.write_block(&fh.to_bytes()?)?;
            links.file_history = history.index;
        }

        for event in header.events.iter_mut().rev() {
            let ev = EventBlock {
                next_ev_addr: links.events,
                name_addr: write_text(out, &event.name)?,
                comment_addr: write_metadata(out, &event.comment())?,
                event_type: event.event_type,
                sync_type: event.sync_type,
                range_type: event.range_type,
                cause: event.cause,
                creator_index: event.creator_index,
                sync_base_value: event.sync_base_value,
                sync_factor: event.sync_factor,
                ..Default::default()
            };
            event.index = out.write_block(&ev.to_bytes()?)?;
            links.events = event.index;
        }

        for attachment in header.attachments.iter_mut().rev() {
            let mut at = if attachment.embedded {
                AttachmentBlock::embedded(&attachment.data, attachment.compressed)?
            } else {
                AttachmentBlock::external(attachment.original_size)
            };
            at.next_at_addr = links.attachments;
            at.filename_addr = write_text(out, &attachment.file_name)?;
            at.mimetype_addr = write_text(out, &attachment.mime_type)?;
            at.comment_addr = write_comment(out, "ATcomment", None, &attachment.description)?;
            at.creator_index = attachment.creator_index;
            attachment.index = out.write_block(&at.to_bytes()?)?;
            links.attachments = attachment.index;
        }

        links.comment = write_metadata(out, &header.comment())?;
        Ok(links)
    }

    /// Cycle counters, VLSD sizes and the final header block.
    pub(super) fn update_counters_v4(&mut self, out: &mut BlockWriter, links: &HistoryLinks) -> Result<()> {
        for (position, dg) in self.file.header.data_groups.iter().enumerate() {
            for cg in &dg.channel_groups {
                out.update_u64(cg.index + CG_CYCLES, cg.nof_samples)?;
                if cg.is_vlsd() {
                    let size = self
                        .outputs
                        .get(position)
                        .and_then(|o| o.vlsd_offsets.get(&cg.record_id))
                        .copied()
                        .unwrap_or(0);
                    out.update_u32(cg.index + CG_DATA_BYTES, size as u32)?;
                    out.update_u32(cg.index + CG_INVAL_BYTES, (size >> 32) as u32)?;
                }
            }
        }
        let header = &self.file.header;
        let first_dg = header.data_groups.first().map_or(0, |dg| dg.index);
        out.update_bytes(header.index, &header_block(header, first_dg, links).to_bytes()?)
    }
}
