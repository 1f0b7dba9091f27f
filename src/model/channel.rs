use crate::{
    blocks::{ArrayStorage, ArrayType, ChannelType, DataType, SyncType, channel_block::cn_flags},
    conversion::Conversion,
    layout::Field,
    model::SourceInformation,
};

/// One measured signal of a channel group.
///
/// `byte_offset` is relative to the record's data bytes (after the record
/// id). Composite channels link their components through `parent`; a
/// max-length channel takes its length from the channel at `size_channel`.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    /// File position of the channel block, 0 until written.
    pub index: u64,
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub unit: String,
    pub channel_type: ChannelType,
    pub sync_type: SyncType,
    pub data_type: DataType,
    pub byte_offset: u32,
    pub bit_offset: u8,
    pub bit_count: u32,
    pub flags: u32,
    pub invalidation_bit: u32,
    pub precision: Option<u8>,
    pub range: Option<(f64, f64)>,
    pub limit: Option<(f64, f64)>,
    pub ext_limit: Option<(f64, f64)>,
    /// MDF3 sampling rate in seconds.
    pub sampling_rate: Option<f64>,
    pub conversion: Option<Conversion>,
    pub source: Option<SourceInformation>,
    /// Position of the composite parent within the same channel group.
    pub parent: Option<usize>,
    /// Position of the channel holding the length of a max-length channel.
    pub size_channel: Option<usize>,
    /// Record id of the VLSD channel group carrying this channel's values.
    pub vlsd_record_id: Option<u64>,
    /// Array description from a CA block.
    pub array: Option<ChannelArray>,
    pub(crate) data_link: u64,
}

/// Dimensions of an array channel. Element `i` (row-major over
/// `dimensions`) sits `i * byte_offset_base` bytes after the channel's own
/// position.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChannelArray {
    pub array_type: ArrayType,
    pub storage: ArrayStorage,
    pub flags: u32,
    pub dimensions: Vec<u64>,
    pub byte_offset_base: i32,
    pub invalidation_bit_base: u32,
    pub axis_values: Vec<f64>,
}

impl ChannelArray {
    pub fn element_count(&self) -> usize {
        self.dimensions
            .iter()
            .map(|&d| usize::try_from(d).unwrap_or(usize::MAX))
            .fold(1usize, usize::saturating_mul)
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            index: 0,
            name: String::new(),
            display_name: String::new(),
            description: String::new(),
            unit: String::new(),
            channel_type: ChannelType::FixedLength,
            sync_type: SyncType::None,
            data_type: DataType::UnsignedIntegerLE,
            byte_offset: 0,
            bit_offset: 0,
            bit_count: 32,
            flags: 0,
            invalidation_bit: 0,
            precision: None,
            range: None,
            limit: None,
            ext_limit: None,
            sampling_rate: None,
            conversion: None,
            source: None,
            parent: None,
            size_channel: None,
            vlsd_record_id: None,
            array: None,
            data_link: 0,
        }
    }
}

impl Channel {
    pub fn new(name: &str, data_type: DataType, bit_count: u32) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            bit_count,
            ..Default::default()
        }
    }

    /// Time master channel in seconds.
    pub fn master_time(name: &str) -> Self {
        Self {
            name: name.to_string(),
            unit: "s".to_string(),
            channel_type: ChannelType::Master,
            sync_type: SyncType::Time,
            data_type: DataType::FloatLE,
            bit_count: 64,
            ..Default::default()
        }
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = unit.to_string();
        self
    }

    pub fn with_type(mut self, channel_type: ChannelType) -> Self {
        self.channel_type = channel_type;
        self
    }

    pub fn with_conversion(mut self, conversion: Conversion) -> Self {
        self.conversion = Some(conversion);
        self
    }

    pub fn field(&self) -> Field {
        Field::new(self.byte_offset, self.bit_offset, self.bit_count, self.data_type)
    }

    pub fn is_master(&self) -> bool {
        self.channel_type.is_master()
    }

    /// Virtual channels have no record bytes; their raw value is the sample
    /// index.
    pub fn is_virtual(&self) -> bool {
        self.channel_type.is_virtual()
    }

    /// Values live outside the record (signal data or a VLSD group).
    pub fn is_variable_length(&self) -> bool {
        self.channel_type == ChannelType::VariableLength
    }

    pub fn has_invalidation_bit(&self) -> bool {
        self.flags & cn_flags::INVAL_BIT_VALID != 0
    }

    pub fn all_invalid(&self) -> bool {
        self.flags & cn_flags::ALL_INVALID != 0
    }

    /// Bytes occupied in the record; 0 for virtual channels.
    pub fn record_bytes(&self) -> usize {
        if self.is_virtual() {
            0
        } else if self.is_variable_length() {
            (self.bit_count as usize).div_ceil(8).max(8)
        } else {
            self.field().byte_len()
        }
    }

    pub fn unit(&self) -> &str {
        if self.unit.is_empty() {
            self.conversion.as_ref().map_or("", |c| c.unit.as_str())
        } else {
            &self.unit
        }
    }
}
