//! MDF 3.x tree reading.

use std::collections::HashSet;
use std::io::{Read, Seek};

use super::TreeReader;
use crate::{
    Error, Result,
    blocks::{
        BlockParse, ChannelType, SyncType,
        v3::{
            CN3_TYPE_MASTER, Channel3Block, ChannelGroup3Block, Conversion3Block, Conversion3Data,
            DataGroup3Block, Header3Block, cc3_type,
        },
    },
    conversion::{Conversion, ConversionKind, TextValue, formula},
    model::{Channel, ChannelGroup, DataGroup, Header},
};

impl<R: Read + Seek> TreeReader<'_, R> {
    pub(super) fn header_v3(&mut self, header: &mut Header) -> Result<Header3Block> {
        let hd = Header3Block::read_at(&self.codec, self.stream, 64)?;
        header.index = 64;
        header.author = hd.author.clone();
        header.department = hd.organization.clone();
        header.project = hd.project.clone();
        header.subject = hd.subject.clone();
        header.description = self.text(hd.comment_addr)?;
        header.start_time_ns = hd.start_time_ns;
        header.tz_offset_min = hd.utc_offset_hours.saturating_mul(60);
        Ok(hd)
    }

    pub(super) fn structure_v3(&mut self, hd: &Header3Block, header: &mut Header) -> Result<()> {
        header.data_groups.clear();
        let mut visited = HashSet::new();
        let mut addr = hd.first_dg_addr;
        while addr != 0 {
            if !visited.insert(addr) {
                return Err(Error::BlockLinkError(format!(
                    "data group chain revisits block at {addr:#x}"
                )));
            }
            let dg = DataGroup3Block::read_at(&self.codec, self.stream, addr)?;
            let mut group = DataGroup {
                index: addr,
                record_id_size: u8::from(dg.record_id_count > 0),
                trailing_record_id: dg.record_id_count == 2,
                data_link: dg.data_addr,
                ..Default::default()
            };
            let position = header.data_groups.len();

            let mut cg_addr = dg.first_cg_addr;
            while cg_addr != 0 {
                if !visited.insert(cg_addr) {
                    return Err(Error::BlockLinkError(format!(
                        "channel group chain revisits block at {cg_addr:#x}"
                    )));
                }
                let cg = ChannelGroup3Block::read_at(&self.codec, self.stream, cg_addr)?;
                let channel_group = self.channel_group_v3(cg_addr, &cg, position, &mut visited)?;
                group.channel_groups.push(channel_group);
                cg_addr = cg.next_cg_addr;
            }
            if group.channel_groups.len() != usize::from(dg.cg_count) {
                self.diagnostics.warning(
                    "reader",
                    &format!(
                        "data group at {addr:#x} declares {} channel groups, found {}",
                        dg.cg_count,
                        group.channel_groups.len()
                    ),
                );
            }
            header.data_groups.push(group);
            addr = dg.next_dg_addr;
        }
        Ok(())
    }

    fn channel_group_v3(
        &mut self,
        addr: u64,
        cg: &ChannelGroup3Block,
        dg_pos: usize,
        visited: &mut HashSet<u64>,
    ) -> Result<ChannelGroup> {
        let comment = self.text(cg.comment_addr)?;
        let mut group = ChannelGroup {
            index: addr,
            data_group: dg_pos,
            name: comment,
            record_id: u64::from(cg.record_id),
            nof_samples: u64::from(cg.record_count),
            data_bytes: u32::from(cg.record_size),
            ..Default::default()
        };

        let mut cn_addr = cg.first_cn_addr;
        while cn_addr != 0 {
            if !visited.insert(cn_addr) {
                return Err(Error::BlockLinkError(format!(
                    "channel chain revisits block at {cn_addr:#x}"
                )));
            }
            let cn = Channel3Block::read_at(&self.codec, self.stream, cn_addr)?;
            group.channels.push(self.channel_v3(cn_addr, &cn)?);
            cn_addr = cn.next_cn_addr;
        }
        Ok(group)
    }

    fn channel_v3(&mut self, addr: u64, cn: &Channel3Block) -> Result<Channel> {
        let long_name = self.text(cn.long_name_addr)?;
        let comment = self.text(cn.comment_addr)?;
        let master = cn.channel_type == CN3_TYPE_MASTER;
        Ok(Channel {
            index: addr,
            name: if long_name.is_empty() {
                cn.short_name.clone()
            } else {
                long_name
            },
            display_name: self.text(cn.display_name_addr)?,
            description: if cn.description.is_empty() {
                comment
            } else {
                cn.description.clone()
            },
            channel_type: if master {
                ChannelType::Master
            } else {
                ChannelType::FixedLength
            },
            sync_type: if master { SyncType::Time } else { SyncType::None },
            data_type: cn.data_type,
            byte_offset: cn.byte_offset(),
            bit_offset: cn.bit_offset(),
            bit_count: u32::from(cn.bit_count),
            range: cn.range_valid.then_some((cn.min, cn.max)),
            sampling_rate: (cn.sample_rate > 0.0).then_some(cn.sample_rate),
            conversion: self.conversion_v3(cn.conversion_addr)?,
            ..Default::default()
        })
    }

    fn conversion_v3(&mut self, addr: u64) -> Result<Option<Conversion>> {
        if addr == 0 {
            return Ok(None);
        }
        let cc = Conversion3Block::read_at(&self.codec, self.stream, addr)?;
        let kind = match (&cc.data, cc.conversion_type) {
            (Conversion3Data::Parameters(p), cc3_type::LINEAR) => ConversionKind::Linear {
                offset: param(p, 0),
                factor: param(p, 1),
            },
            (Conversion3Data::Parameters(p), cc3_type::POLYNOMIAL) => {
                let shift = param(p, 4) + param(p, 5);
                ConversionKind::Rational {
                    p: [
                        0.0,
                        -param(p, 3),
                        param(p, 1) + param(p, 3) * shift,
                        0.0,
                        param(p, 2),
                        -(param(p, 0) + param(p, 2) * shift),
                    ],
                }
            }
            (Conversion3Data::Parameters(p), cc3_type::EXPONENTIAL) => ConversionKind::Exponential {
                p: std::array::from_fn(|i| param(p, i)),
            },
            (Conversion3Data::Parameters(p), cc3_type::LOGARITHMIC) => ConversionKind::Logarithmic {
                p: std::array::from_fn(|i| param(p, i)),
            },
            (Conversion3Data::Parameters(p), cc3_type::RATIONAL) => ConversionKind::Rational {
                p: std::array::from_fn(|i| param(p, i)),
            },
            (Conversion3Data::Table(table), cc3_type::TABLE_INTERP) => {
                ConversionKind::ValueToValueInterp {
                    table: table.clone(),
                }
            }
            (Conversion3Data::Table(table), cc3_type::TABLE) => ConversionKind::ValueToValue {
                table: table.clone(),
            },
            (Conversion3Data::Formula(text), _) => {
                let expr = match formula::compile(text) {
                    Ok(expr) => Some(expr),
                    Err(e) => {
                        self.diagnostics
                            .warning("reader", &format!("conversion at {addr:#x}: {e}"));
                        None
                    }
                };
                ConversionKind::Algebraic {
                    formula: text.clone(),
                    expr,
                }
            }
            (Conversion3Data::TextTable(entries), _) => ConversionKind::ValueToText {
                table: entries
                    .iter()
                    .map(|(raw, text)| (*raw, TextValue::text(text)))
                    .collect(),
                default: TextValue::text(""),
            },
            (Conversion3Data::TextRange(entries), _) => {
                let mut ranges = Vec::with_capacity(entries.len().saturating_sub(1));
                let mut default = TextValue::text("");
                for (i, (lower, upper, link)) in entries.iter().enumerate() {
                    let text = TextValue::Text(self.text(*link)?);
                    if i == 0 {
                        default = text;
                    } else {
                        ranges.push((*lower, *upper, text));
                    }
                }
                ConversionKind::RangeToText { ranges, default }
            }
            (_, cc3_type::IDENTITY) => ConversionKind::Identity,
            (_, other) => {
                self.diagnostics.debug(
                    "reader",
                    &format!("conversion at {addr:#x}: type {other} read as identity"),
                );
                ConversionKind::Identity
            }
        };
        let mut conversion = Conversion::new(kind).with_unit(&cc.unit);
        conversion.range = cc.range_valid.then_some((cc.min, cc.max));
        Ok(Some(conversion))
    }
}

fn param(p: &[f64], i: usize) -> f64 {
    p.get(i).copied().unwrap_or(0.0)
}
