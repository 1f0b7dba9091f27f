//! MDF 3.x block output.

use super::{HistoryLinks, MdfWriter, io::BlockWriter};
use crate::{
    Error, Result,
    blocks::{
        Generation, IdentificationBlock, TextBlock,
        identification_block::{UNFIN_CG_COUNTERS, UNFINALIZED_ID},
        v3::{
            CG3_NOF_RECORDS, CN3_TYPE_DATA, CN3_TYPE_MASTER, Channel3Block, ChannelGroup3Block,
            Conversion3Block, Conversion3Data, DataGroup3Block, HD3_LINK_DG, Header3Block,
            cc3_type,
        },
    },
    conversion::{Conversion, ConversionKind, TextValue},
    model::{Channel, ChannelGroup, DataGroup, Header},
};

/// Longest short name that fits the fixed CN field.
const SHORT_NAME_LEN: usize = 31;

fn write_text(out: &mut BlockWriter, text: &str) -> Result<u64> {
    if text.is_empty() {
        return Ok(0);
    }
    out.write_block(&TextBlock::new(text).to_bytes_v3()?)
}

fn not_representable(conversion: &Conversion) -> Error {
    Error::invalid_state(format!(
        "conversion type {} cannot be stored in MDF 3",
        conversion.type_code()
    ))
}

fn write_conversion(out: &mut BlockWriter, conversion: Option<&Conversion>, unit: &str) -> Result<u64> {
    let Some(cc) = conversion else {
        if unit.is_empty() {
            return Ok(0);
        }
        let block = Conversion3Block {
            unit: unit.to_string(),
            conversion_type: cc3_type::IDENTITY,
            ..Default::default()
        };
        return out.write_block(&block.to_bytes()?);
    };

    let (conversion_type, data) = match &cc.kind {
        ConversionKind::Identity => (cc3_type::IDENTITY, Conversion3Data::None),
        ConversionKind::Linear { offset, factor } => (
            cc3_type::LINEAR,
            Conversion3Data::Parameters(vec![*offset, *factor]),
        ),
        ConversionKind::Rational { p } => (cc3_type::RATIONAL, Conversion3Data::Parameters(p.to_vec())),
        ConversionKind::Exponential { p } => {
            (cc3_type::EXPONENTIAL, Conversion3Data::Parameters(p.to_vec()))
        }
        ConversionKind::Logarithmic { p } => {
            (cc3_type::LOGARITHMIC, Conversion3Data::Parameters(p.to_vec()))
        }
        ConversionKind::Algebraic { formula, .. } => {
            (cc3_type::FORMULA, Conversion3Data::Formula(formula.clone()))
        }
        ConversionKind::ValueToValueInterp { table } => {
            (cc3_type::TABLE_INTERP, Conversion3Data::Table(table.clone()))
        }
        ConversionKind::ValueToValue { table } => {
            (cc3_type::TABLE, Conversion3Data::Table(table.clone()))
        }
        ConversionKind::ValueToText { table, .. } => {
            let mut entries = Vec::with_capacity(table.len());
            for (key, value) in table {
                match value {
                    TextValue::Text(text) => entries.push((*key, text.clone())),
                    TextValue::Scale(_) => return Err(not_representable(cc)),
                }
            }
            (cc3_type::TEXT_TABLE, Conversion3Data::TextTable(entries))
        }
        ConversionKind::RangeToText { ranges, default } => {
            let text = |value: &TextValue| match value {
                TextValue::Text(text) => Ok(text.clone()),
                TextValue::Scale(_) => Err(not_representable(cc)),
            };
            // The first entry carries the default text.
            let mut entries = vec![(0.0, 0.0, write_text(out, &text(default)?)?)];
            for (lower, upper, value) in ranges {
                entries.push((*lower, *upper, write_text(out, &text(value)?)?));
            }
            (cc3_type::TEXT_RANGE, Conversion3Data::TextRange(entries))
        }
        ConversionKind::RangeToValue { .. }
        | ConversionKind::TextToValue { .. }
        | ConversionKind::TextToText { .. } => return Err(not_representable(cc)),
    };

    let (range_valid, min, max) = match cc.range {
        Some((min, max)) => (true, min, max),
        None => (false, 0.0, 0.0),
    };
    let block = Conversion3Block {
        range_valid,
        min,
        max,
        unit: if cc.unit.is_empty() { unit.to_string() } else { cc.unit.clone() },
        conversion_type,
        data,
    };
    out.write_block(&block.to_bytes()?)
}

fn write_channel(out: &mut BlockWriter, ch: &Channel, next: u64) -> Result<u64> {
    let too_large = |what: &str| {
        Error::invalid_state(format!("channel {:?}: {what} does not fit MDF 3", ch.name))
    };
    let short_name: String = ch.name.chars().take(SHORT_NAME_LEN).collect();
    let long_name_addr = if short_name.len() < ch.name.len() {
        write_text(out, &ch.name)?
    } else {
        0
    };
    let bit = u32::from(ch.bit_offset);
    let (start_bit, additional_byte_offset) = match u16::try_from(ch.byte_offset * 8 + bit) {
        Ok(start_bit) => (start_bit, 0),
        Err(_) => (
            u16::from(ch.bit_offset),
            u16::try_from(ch.byte_offset).map_err(|_| too_large("byte offset"))?,
        ),
    };
    let (range_valid, min, max) = match ch.range {
        Some((min, max)) => (true, min, max),
        None => (false, 0.0, 0.0),
    };
    let block = Channel3Block {
        next_cn_addr: next,
        conversion_addr: write_conversion(out, ch.conversion.as_ref(), &ch.unit)?,
        comment_addr: write_text(out, &ch.description)?,
        channel_type: if ch.is_master() {
            CN3_TYPE_MASTER
        } else {
            CN3_TYPE_DATA
        },
        short_name,
        description: ch.description.chars().take(127).collect(),
        start_bit,
        bit_count: u16::try_from(ch.bit_count).map_err(|_| too_large("bit count"))?,
        data_type: ch.data_type,
        range_valid,
        min,
        max,
        sample_rate: ch.sampling_rate.unwrap_or(0.0),
        long_name_addr,
        display_name_addr: write_text(out, &ch.display_name)?,
        additional_byte_offset,
        ..Default::default()
    };
    out.write_block(&block.to_bytes()?)
}

fn write_channel_group(out: &mut BlockWriter, cg: &mut ChannelGroup, next: u64) -> Result<u64> {
    let mut first_cn_addr = 0;
    for ch in cg.channels.iter_mut().rev() {
        first_cn_addr = write_channel(out, ch, first_cn_addr)?;
        ch.index = first_cn_addr;
    }
    let block = ChannelGroup3Block {
        next_cg_addr: next,
        first_cn_addr,
        comment_addr: write_text(out, &cg.name)?,
        record_id: u16::try_from(cg.record_id)
            .map_err(|_| Error::invalid_state("MDF 3 record ids are 8 bits"))?,
        channel_count: u16::try_from(cg.channels.len())
            .map_err(|_| Error::invalid_state(format!("too many channels in {:?}", cg.name)))?,
        record_size: u16::try_from(cg.data_bytes)
            .map_err(|_| Error::invalid_state(format!("record of {:?} too large for MDF 3", cg.name)))?,
        record_count: 0,
    };
    cg.index = out.write_block(&block.to_bytes()?)?;
    Ok(cg.index)
}

fn write_data_group(out: &mut BlockWriter, dg: &mut DataGroup, next: u64) -> Result<u64> {
    let mut first_cg_addr = 0;
    for cg in dg.channel_groups.iter_mut().rev() {
        first_cg_addr = write_channel_group(out, cg, first_cg_addr)?;
    }
    let block = DataGroup3Block {
        next_dg_addr: next,
        first_cg_addr,
        cg_count: dg.channel_groups.len() as u16,
        record_id_count: u16::from(dg.record_id_size > 0),
        ..Default::default()
    };
    dg.index = out.write_block(&block.to_bytes()?)?;
    Ok(dg.index)
}

fn header_block(header: &Header, comment_addr: u64) -> Header3Block {
    Header3Block {
        first_dg_addr: header.data_groups.first().map_or(0, |dg| dg.index),
        comment_addr,
        dg_count: header.data_groups.len() as u16,
        author: header.author.clone(),
        organization: header.department.clone(),
        project: header.project.clone(),
        subject: header.subject.clone(),
        start_time_ns: header.start_time_ns,
        utc_offset_hours: header.tz_offset_min / 60,
        timer_id: "Local PC Reference Time".to_string(),
        ..Default::default()
    }
}

impl MdfWriter {
    /// Writes the unfinalized identification, the header and the channel
    /// tree. The record counters stay zero until finalize.
    pub(super) fn write_configuration_v3(&mut self, out: &mut BlockWriter) -> Result<()> {
        let mut id = IdentificationBlock::new(Generation::Mdf3, &self.config.program_id);
        id.file_id = UNFINALIZED_ID.to_string();
        id.unfinalized_flags = UNFIN_CG_COUNTERS;
        id.format_version = self.file.version.clone();
        id.version_number = self.file.version_number;
        out.write_block(&id.to_bytes()?)?;

        let header = &mut self.file.header;
        header.index = out.write_block(&header_block(header, 0).to_bytes()?)?;
        let mut first_dg = 0;
        for dg in header.data_groups.iter_mut().rev() {
            first_dg = write_data_group(out, dg, first_dg)?;
        }
        out.update_link_v3(header.index + HD3_LINK_DG, first_dg)?;
        out.flush()
    }

    /// MDF 3 only keeps the header comment.
    pub(super) fn write_history_v3(&mut self, out: &mut BlockWriter) -> Result<HistoryLinks> {
        let header = &self.file.header;
        if !header.events.is_empty() || !header.attachments.is_empty() {
            self.diagnostics.warning(
                "writer",
                "MDF 3 has no events or attachments, they are not written",
            );
        }
        Ok(HistoryLinks {
            comment: write_text(out, &header.description)?,
            ..Default::default()
        })
    }

    pub(super) fn update_counters_v3(&mut self, out: &mut BlockWriter, links: &HistoryLinks) -> Result<()> {
        for (_, cg) in self.file.channel_groups() {
            let count = u32::try_from(cg.nof_samples)
                .map_err(|_| Error::invalid_state(format!("too many samples in {:?}", cg.name)))?;
            out.update_u32(cg.index + CG3_NOF_RECORDS, count)?;
        }
        let header = &self.file.header;
        out.update_bytes(header.index, &header_block(header, links.comment).to_bytes()?)
    }
}
