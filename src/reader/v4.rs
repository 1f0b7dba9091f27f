//! MDF 4.x tree reading.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Seek};

use super::TreeReader;
use crate::{
    Error, Result,
    blocks::{
        AttachmentBlock, BlockParse, ChannelArrayBlock, ChannelBlock, ChannelGroupBlock,
        ConversionBlock, DataGroupBlock, EventBlock, FileHistoryBlock, HeaderBlock, SourceBlock,
        channel_block::cn_flags,
        conversion_block::{CC_FLAG_PRECISION_VALID, CC_FLAG_RANGE_VALID},
        header_block::{HD_FLAG_ANGLE_VALID, HD_FLAG_DISTANCE_VALID},
        source_block::SI_FLAG_SIMULATED,
    },
    conversion::{Conversion, ConversionKind, TextValue, formula},
    model::{
        Attachment, Channel, ChannelArray, ChannelGroup, DataGroup, Event, FileHistory, Header,
        SourceInformation,
    },
};

impl<R: Read + Seek> TreeReader<'_, R> {
    pub(super) fn header_v4(&mut self, header: &mut Header) -> Result<HeaderBlock> {
        let hd = HeaderBlock::read_at(&self.codec, self.stream, 64)?;
        header.index = 64;
        header.start_time_ns = hd.abs_time;
        header.tz_offset_min = hd.tz_offset;
        header.dst_offset_min = hd.dst_offset;
        header.time_flags = hd.time_flags;
        header.start_angle = (hd.flags & HD_FLAG_ANGLE_VALID != 0).then_some(hd.start_angle);
        header.start_distance =
            (hd.flags & HD_FLAG_DISTANCE_VALID != 0).then_some(hd.start_distance);
        if let Some(meta) = self.comment(hd.comment_addr, "HDcomment")? {
            header.apply_comment(meta);
        }
        Ok(hd)
    }

    pub(super) fn measurement_info_v4(&mut self, hd: &HeaderBlock, header: &mut Header) -> Result<()> {
        header.file_histories.clear();
        let mut visited = HashSet::new();
        let mut addr = hd.file_history_addr;
        while addr != 0 && visited.insert(addr) {
            let fh = FileHistoryBlock::read_at(&self.codec, self.stream, addr)?;
            let mut history = FileHistory {
                index: addr,
                time_ns: fh.time_ns,
                ..Default::default()
            };
            if let Some(meta) = self.comment(fh.comment_addr, "FHcomment")? {
                history.apply_comment(&meta);
            }
            header.file_histories.push(history);
            addr = fh.next_fh_addr;
        }

        header.events.clear();
        let mut addr = hd.first_event_addr;
        while addr != 0 && visited.insert(addr) {
            let ev = EventBlock::read_at(&self.codec, self.stream, addr)?;
            let mut event = Event {
                index: addr,
                name: self.text(ev.name_addr)?,
                event_type: ev.event_type,
                sync_type: ev.sync_type,
                range_type: ev.range_type,
                cause: ev.cause,
                creator_index: ev.creator_index,
                sync_base_value: ev.sync_base_value,
                sync_factor: ev.sync_factor,
                ..Default::default()
            };
            if let Some(meta) = self.comment(ev.comment_addr, "EVcomment")? {
                event.apply_comment(&meta);
            }
            header.events.push(event);
            addr = ev.next_ev_addr;
        }

        header.attachments.clear();
        let mut addr = hd.first_attachment_addr;
        while addr != 0 && visited.insert(addr) {
            let at = AttachmentBlock::read_at(&self.codec, self.stream, addr)?;
            let description = self
                .comment(at.comment_addr, "ATcomment")?
                .map(|m| m.text().to_string())
                .unwrap_or_default();
            header.attachments.push(Attachment {
                index: addr,
                file_name: self.text(at.filename_addr)?,
                mime_type: self.text(at.mimetype_addr)?,
                description,
                embedded: at.flags.is_embedded(),
                compressed: at.flags.is_compressed(),
                creator_index: at.creator_index,
                original_size: at.original_size,
                data: Vec::new(),
            });
            addr = at.next_at_addr;
        }
        Ok(())
    }

    pub(super) fn structure_v4(&mut self, hd: &HeaderBlock, header: &mut Header) -> Result<()> {
        header.data_groups.clear();
        let mut visited = HashSet::new();
        let mut addr = hd.first_dg_addr;
        while addr != 0 {
            if !visited.insert(addr) {
                return Err(Error::BlockLinkError(format!(
                    "data group chain revisits block at {addr:#x}"
                )));
            }
            let dg = DataGroupBlock::read_at(&self.codec, self.stream, addr)?;
            let position = header.data_groups.len();
            let group = self.data_group_v4(addr, &dg, position)?;
            header.data_groups.push(group);
            addr = dg.next_dg_addr;
        }
        Ok(())
    }

    fn data_group_v4(&mut self, addr: u64, dg: &DataGroupBlock, position: usize) -> Result<DataGroup> {
        let meta = self.comment(dg.comment_addr, "DGcomment")?;
        let mut group = DataGroup {
            index: addr,
            description: meta.as_ref().map(|m| m.text().to_string()).unwrap_or_default(),
            metadata: meta,
            record_id_size: dg.record_id_size,
            data_link: dg.data_block_addr,
            ..Default::default()
        };

        let mut cg_record_ids = HashMap::new();
        let mut vlsd_links = Vec::new();
        let mut visited = HashSet::new();
        let mut addr = dg.first_cg_addr;
        while addr != 0 {
            if !visited.insert(addr) {
                return Err(Error::BlockLinkError(format!(
                    "channel group chain revisits block at {addr:#x}"
                )));
            }
            let cg = ChannelGroupBlock::read_at(&self.codec, self.stream, addr)?;
            cg_record_ids.insert(addr, cg.record_id);
            let cg_pos = group.channel_groups.len();
            let channel_group = self.channel_group_v4(addr, &cg, position, cg_pos, &mut vlsd_links)?;
            group.channel_groups.push(channel_group);
            addr = cg.next_cg_addr;
        }

        // Channels whose data link names a VLSD channel group.
        for (cg_pos, cn_pos, target) in vlsd_links {
            if let Some(&record_id) = cg_record_ids.get(&target) {
                let channel = &mut group.channel_groups[cg_pos].channels[cn_pos];
                channel.vlsd_record_id = Some(record_id);
                channel.data_link = 0;
            }
        }
        Ok(group)
    }

    fn channel_group_v4(
        &mut self,
        addr: u64,
        cg: &ChannelGroupBlock,
        dg_pos: usize,
        cg_pos: usize,
        vlsd_links: &mut Vec<(usize, usize, u64)>,
    ) -> Result<ChannelGroup> {
        let meta = self.comment(cg.comment_addr, "CGcomment")?;
        let mut group = ChannelGroup {
            index: addr,
            data_group: dg_pos,
            name: self.text(cg.acq_name_addr)?,
            description: meta.as_ref().map(|m| m.text().to_string()).unwrap_or_default(),
            record_id: cg.record_id,
            nof_samples: cg.cycles_nr,
            flags: cg.flags,
            path_separator: cg.separator(),
            data_bytes: cg.samples_byte_nr,
            inval_bytes: cg.invalidation_bytes_nr,
            source: self.source_v4(cg.acq_source_addr)?,
            metadata: meta,
            ..Default::default()
        };

        let mut positions = HashMap::new();
        let mut size_links = Vec::new();
        let mut visited = HashSet::new();
        self.channel_chain_v4(
            cg.first_ch_addr,
            None,
            &mut group.channels,
            &mut positions,
            &mut size_links,
            &mut visited,
        )?;

        for (cn_pos, target) in size_links {
            match positions.get(&target) {
                Some(&size_pos) => group.channels[cn_pos].size_channel = Some(size_pos),
                None => vlsd_links.push((cg_pos, cn_pos, target)),
            }
        }
        group.check_size_links()?;
        Ok(group)
    }

    fn channel_chain_v4(
        &mut self,
        first: u64,
        parent: Option<usize>,
        channels: &mut Vec<Channel>,
        positions: &mut HashMap<u64, usize>,
        data_links: &mut Vec<(usize, u64)>,
        visited: &mut HashSet<u64>,
    ) -> Result<()> {
        let mut addr = first;
        while addr != 0 {
            if !visited.insert(addr) {
                return Err(Error::BlockLinkError(format!(
                    "channel chain revisits block at {addr:#x}"
                )));
            }
            let cn = ChannelBlock::read_at(&self.codec, self.stream, addr)?;
            let mut channel = self.channel_v4(addr, &cn)?;
            channel.parent = parent;
            let position = channels.len();
            positions.insert(addr, position);

            if cn.data_addr != 0 {
                let id = self.codec.peek_id(self.stream, cn.data_addr)?;
                match id.as_str() {
                    "##CN" | "##CG" => data_links.push((position, cn.data_addr)),
                    _ => channel.data_link = cn.data_addr,
                }
            }
            channels.push(channel);

            if cn.component_addr != 0 {
                if self.codec.peek_id(self.stream, cn.component_addr)? == ChannelBlock::ID {
                    self.channel_chain_v4(
                        cn.component_addr,
                        Some(position),
                        channels,
                        positions,
                        data_links,
                        visited,
                    )?;
                } else {
                    let ca =
                        ChannelArrayBlock::read_at(&self.codec, self.stream, cn.component_addr)?;
                    if ca.composition_addr() != 0 {
                        self.diagnostics.debug(
                            "reader",
                            &format!("channel at {addr:#x}: nested array blocks are not decoded"),
                        );
                    }
                    channels[position].array = Some(ChannelArray {
                        array_type: ca.array_type,
                        storage: ca.storage,
                        flags: ca.flags,
                        dimensions: ca.dim_sizes,
                        byte_offset_base: ca.byte_offset_base,
                        invalidation_bit_base: ca.invalidation_bit_base,
                        axis_values: ca.axis_values,
                    });
                }
            }
            addr = cn.next_ch_addr;
        }
        Ok(())
    }

    fn channel_v4(&mut self, addr: u64, cn: &ChannelBlock) -> Result<Channel> {
        let meta = self.comment(cn.comment_addr, "CNcomment")?;
        let pair = |valid: u32, lo: f64, hi: f64| (cn.flags & valid != 0).then_some((lo, hi));
        let conversion = self.conversion_v4(cn.conversion_addr, 0)?;
        let display_name = meta
            .as_ref()
            .and_then(|m| m.element("display_name"))
            .unwrap_or_default()
            .to_string();
        Ok(Channel {
            index: addr,
            name: self.text(cn.name_addr)?,
            display_name,
            description: meta.map(|m| m.text().to_string()).unwrap_or_default(),
            unit: self.plain_text(cn.unit_addr)?,
            channel_type: cn.channel_type,
            sync_type: cn.sync_type,
            data_type: cn.data_type,
            byte_offset: cn.byte_offset,
            bit_offset: cn.bit_offset,
            bit_count: cn.bit_count,
            flags: cn.flags,
            invalidation_bit: cn.pos_invalidation_bit,
            precision: (cn.flags & cn_flags::PRECISION_VALID != 0).then_some(cn.precision),
            range: pair(cn_flags::RANGE_VALID, cn.min_raw_value, cn.max_raw_value),
            limit: pair(cn_flags::LIMIT_VALID, cn.lower_limit, cn.upper_limit),
            ext_limit: pair(cn_flags::EXT_LIMIT_VALID, cn.lower_ext_limit, cn.upper_ext_limit),
            sampling_rate: None,
            conversion,
            source: self.source_v4(cn.source_addr)?,
            ..Default::default()
        })
    }

    fn source_v4(&mut self, addr: u64) -> Result<Option<SourceInformation>> {
        if addr == 0 {
            return Ok(None);
        }
        let si = SourceBlock::read_at(&self.codec, self.stream, addr)?;
        let meta = self.comment(si.comment_addr, "SIcomment")?;
        Ok(Some(SourceInformation {
            index: addr,
            name: self.text(si.name_addr)?,
            path: self.text(si.path_addr)?,
            description: meta.as_ref().map(|m| m.text().to_string()).unwrap_or_default(),
            source_type: si.source_type,
            bus_type: si.bus_type,
            simulated: si.flags & SI_FLAG_SIMULATED != 0,
            metadata: meta,
        }))
    }

    pub(super) fn conversion_v4(&mut self, addr: u64, depth: usize) -> Result<Option<Conversion>> {
        if addr == 0 {
            return Ok(None);
        }
        if depth > self.max_conversion_depth {
            return Err(Error::ConversionChainTooDeep {
                max_depth: self.max_conversion_depth,
            });
        }
        let cc = ConversionBlock::read_at(&self.codec, self.stream, addr)?;
        let kind = self.conversion_kind_v4(addr, &cc, depth)?;
        let inverse = self.conversion_v4(cc.inverse_addr, depth + 1)?.map(Box::new);
        Ok(Some(Conversion {
            name: self.text(cc.name_addr)?,
            unit: self.plain_text(cc.unit_addr)?,
            description: self.plain_text(cc.comment_addr)?,
            precision: (cc.flags & CC_FLAG_PRECISION_VALID != 0).then_some(cc.precision),
            range: (cc.flags & CC_FLAG_RANGE_VALID != 0)
                .then_some((cc.phys_range_min, cc.phys_range_max)),
            kind,
            inverse,
        }))
    }

    fn conversion_kind_v4(
        &mut self,
        addr: u64,
        cc: &ConversionBlock,
        depth: usize,
    ) -> Result<ConversionKind> {
        let v = &cc.values;
        let value = |i: usize| v.get(i).copied().unwrap_or(0.0);
        let pairs = || v.chunks_exact(2).map(|c| (c[0], c[1])).collect::<Vec<_>>();
        Ok(match cc.conversion_type {
            0 => ConversionKind::Identity,
            1 => ConversionKind::Linear {
                offset: value(0),
                factor: value(1),
            },
            2 => ConversionKind::Rational {
                p: [value(0), value(1), value(2), value(3), value(4), value(5)],
            },
            3 => {
                let formula = self.text(cc.refs.first().copied().unwrap_or(0))?;
                let expr = match formula::compile(&formula) {
                    Ok(expr) => Some(expr),
                    Err(e) => {
                        self.diagnostics
                            .warning("reader", &format!("conversion at {addr:#x}: {e}"));
                        None
                    }
                };
                ConversionKind::Algebraic { formula, expr }
            }
            4 => ConversionKind::ValueToValueInterp { table: pairs() },
            5 => ConversionKind::ValueToValue { table: pairs() },
            6 => {
                let n = v.len() / 3;
                ConversionKind::RangeToValue {
                    ranges: (0..n)
                        .map(|i| (v[3 * i], v[3 * i + 1], v[3 * i + 2]))
                        .collect(),
                    default: value(3 * n),
                }
            }
            7 => {
                let mut table = Vec::with_capacity(v.len());
                for (i, key) in v.iter().enumerate() {
                    let target = cc.refs.get(i).copied().unwrap_or(0);
                    table.push((*key, self.text_value(target, depth)?));
                }
                let default = self.text_value(cc.refs.get(v.len()).copied().unwrap_or(0), depth)?;
                ConversionKind::ValueToText { table, default }
            }
            8 => {
                let n = v.len() / 2;
                let mut ranges = Vec::with_capacity(n);
                for i in 0..n {
                    let target = cc.refs.get(i).copied().unwrap_or(0);
                    ranges.push((v[2 * i], v[2 * i + 1], self.text_value(target, depth)?));
                }
                let default = self.text_value(cc.refs.get(n).copied().unwrap_or(0), depth)?;
                ConversionKind::RangeToText { ranges, default }
            }
            9 => {
                let mut table = Vec::with_capacity(cc.refs.len());
                for (i, target) in cc.refs.iter().enumerate() {
                    table.push((self.text(*target)?, value(i)));
                }
                ConversionKind::TextToValue {
                    default: value(cc.refs.len()),
                    table,
                }
            }
            10 => {
                let n = cc.refs.len() / 2;
                let mut table = Vec::with_capacity(n);
                for i in 0..n {
                    table.push((self.text(cc.refs[2 * i])?, self.text(cc.refs[2 * i + 1])?));
                }
                let default = match cc.refs.get(2 * n).copied().unwrap_or(0) {
                    0 => None,
                    target => Some(self.text(target)?),
                };
                ConversionKind::TextToText { table, default }
            }
            other => {
                self.diagnostics.warning(
                    "reader",
                    &format!("conversion at {addr:#x}: type {other} treated as identity"),
                );
                ConversionKind::Identity
            }
        })
    }

    fn text_value(&mut self, addr: u64, depth: usize) -> Result<TextValue> {
        if addr != 0 && self.codec.peek_id(self.stream, addr)? == ConversionBlock::ID {
            let nested = self.conversion_v4(addr, depth + 1)?.unwrap_or_default();
            return Ok(TextValue::Scale(Box::new(nested)));
        }
        Ok(TextValue::Text(self.text(addr)?))
    }
}
