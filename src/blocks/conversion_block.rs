use crate::{
    Result,
    blocks::common::{BlockParse, RawBlock, encode_v4, read_f64, read_u8, read_u16, validate_buffer_size},
};

/// `cc_flags` bits.
pub const CC_FLAG_PRECISION_VALID: u16 = 0x0001;
pub const CC_FLAG_RANGE_VALID: u16 = 0x0002;

/// Conversion Block (##CC), undecoded.
///
/// Fixed links are name, unit, comment and inverse; the remaining links
/// (`refs`) point to TX blocks or nested CC blocks depending on the type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionBlock {
    pub name_addr: u64,
    pub unit_addr: u64,
    pub comment_addr: u64,
    pub inverse_addr: u64,
    pub refs: Vec<u64>,
    pub conversion_type: u8,
    pub precision: u8,
    pub flags: u16,
    pub phys_range_min: f64,
    pub phys_range_max: f64,
    pub values: Vec<f64>,
}

impl BlockParse for ConversionBlock {
    const ID: &'static str = "##CC";

    fn from_raw(block: &RawBlock) -> Result<Self> {
        let d = &block.data;
        validate_buffer_size(d, 8)?;
        let value_count = read_u16(d, 6) as usize;

        // Some writers omit the physical range when the flag is clear.
        let with_range = 8 + 16 + value_count * 8;
        let (phys_range_min, phys_range_max, values_at) = if d.len() >= with_range {
            (read_f64(d, 8), read_f64(d, 16), 24)
        } else {
            validate_buffer_size(d, 8 + value_count * 8)?;
            (0.0, 0.0, 8)
        };
        let values = (0..value_count)
            .map(|i| read_f64(d, values_at + i * 8))
            .collect();

        Ok(Self {
            name_addr: block.link(0),
            unit_addr: block.link(1),
            comment_addr: block.link(2),
            inverse_addr: block.link(3),
            refs: block.links.iter().skip(4).copied().collect(),
            conversion_type: read_u8(d, 0),
            precision: read_u8(d, 1),
            flags: read_u16(d, 2),
            phys_range_min,
            phys_range_max,
            values,
        })
    }
}

impl ConversionBlock {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut links = vec![
            self.name_addr,
            self.unit_addr,
            self.comment_addr,
            self.inverse_addr,
        ];
        links.extend_from_slice(&self.refs);

        let mut data = Vec::with_capacity(24 + self.values.len() * 8);
        data.push(self.conversion_type);
        data.push(self.precision);
        data.extend_from_slice(&self.flags.to_le_bytes());
        data.extend_from_slice(&(self.refs.len() as u16).to_le_bytes());
        data.extend_from_slice(&(self.values.len() as u16).to_le_bytes());
        data.extend_from_slice(&self.phys_range_min.to_le_bytes());
        data.extend_from_slice(&self.phys_range_max.to_le_bytes());
        for v in &self.values {
            data.extend_from_slice(&v.to_le_bytes());
        }
        encode_v4(Self::ID, &links, &data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::common::{BlockCodec, Generation};
    use std::io::Cursor;

    #[test]
    fn value_to_text_round_trip() {
        let cc = ConversionBlock {
            refs: vec![0x100, 0x180, 0x200],
            conversion_type: 7,
            values: vec![0.0, 1.0],
            ..Default::default()
        };
        let mut file = vec![0u8; 8];
        file.extend(cc.to_bytes().unwrap());
        let codec = BlockCodec::new(Generation::Mdf4, file.len() as u64);
        let parsed = ConversionBlock::read_at(&codec, &mut Cursor::new(file), 8).unwrap();
        assert_eq!(parsed, cc);
    }
}
