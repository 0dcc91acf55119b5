//! CNBLOCK: one channel inside a channel group.

use crate::blocks::common::{
    read_f64, read_u16, read_u32, read_u64, validate_buffer_size, BlockHeader, BlockParse,
    BlockProperty, DataType,
};
use crate::blocks::conversion::ConversionBlock;
use crate::blocks::text_block::TextBlock;
use crate::error::MdfError;

/// cn_flags bit 0: every value of this channel is invalid.
pub const CN_FLAG_ALL_INVALID: u32 = 0x01;
/// cn_flags bit 1: the invalidation bit position is meaningful.
pub const CN_FLAG_INVAL_BIT_VALID: u32 = 0x02;
/// cn_flags bit 3: default value in the record when never written.
pub const CN_FLAG_DEFAULT_VALUE: u32 = 0x08;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    FixedLength,
    VariableLength,
    Master,
    VirtualMaster,
    Sync,
    MaxLength,
    VirtualData,
    Unknown(u8),
}

impl ChannelType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ChannelType::FixedLength,
            1 => ChannelType::VariableLength,
            2 => ChannelType::Master,
            3 => ChannelType::VirtualMaster,
            4 => ChannelType::Sync,
            5 => ChannelType::MaxLength,
            6 => ChannelType::VirtualData,
            other => ChannelType::Unknown(other),
        }
    }

    pub fn to_u8(&self) -> u8 {
        match self {
            ChannelType::FixedLength => 0,
            ChannelType::VariableLength => 1,
            ChannelType::Master => 2,
            ChannelType::VirtualMaster => 3,
            ChannelType::Sync => 4,
            ChannelType::MaxLength => 5,
            ChannelType::VirtualData => 6,
            ChannelType::Unknown(raw) => *raw,
        }
    }

    pub fn is_master(&self) -> bool {
        matches!(self, ChannelType::Master | ChannelType::VirtualMaster)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncType {
    None,
    Time,
    Angle,
    Distance,
    Index,
    Unknown(u8),
}

impl SyncType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => SyncType::None,
            1 => SyncType::Time,
            2 => SyncType::Angle,
            3 => SyncType::Distance,
            4 => SyncType::Index,
            other => SyncType::Unknown(other),
        }
    }

    pub fn to_u8(&self) -> u8 {
        match self {
            SyncType::None => 0,
            SyncType::Time => 1,
            SyncType::Angle => 2,
            SyncType::Distance => 3,
            SyncType::Index => 4,
            SyncType::Unknown(raw) => *raw,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChannelBlock {
    pub header: BlockHeader,
    pub next_ch_addr: u64,
    pub component_addr: u64,
    pub name_addr: u64,
    pub source_addr: u64,
    pub conversion_addr: u64,
    /// For VLSD channels: link to the SD/DZ/DL data, or the referenced CG.
    pub data: u64,
    pub unit_addr: u64,
    pub comment_addr: u64,
    pub channel_type: ChannelType,
    pub sync_type: SyncType,
    pub data_type: DataType,
    /// 0..7; offset of the least significant bit within the first byte.
    pub bit_offset: u8,
    pub byte_offset: u32,
    pub bit_count: u32,
    pub flags: u32,
    pub pos_invalidation_bit: u32,
    pub precision: u8,
    pub attachment_nr: u16,
    pub min_raw_value: f64,
    pub max_raw_value: f64,
    pub lower_limit: f64,
    pub upper_limit: f64,
    pub lower_ext_limit: f64,
    pub upper_ext_limit: f64,

    // Resolved lazily from the link section (v3 files fill these from
    // their inline fields instead).
    pub name: Option<String>,
    pub unit: Option<String>,
    pub conversion: Option<ConversionBlock>,
}

impl BlockParse<'_> for ChannelBlock {
    const ID: &'static str = "##CN";

    /// Parse a channel block from a 160-byte slice. Name and conversion are
    /// resolved separately through their link addresses.
    fn from_bytes(bytes: &[u8]) -> Result<Self, MdfError> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, 160)?;

        Ok(Self {
            header,
            next_ch_addr: read_u64(bytes, 24),
            component_addr: read_u64(bytes, 32),
            name_addr: read_u64(bytes, 40),
            source_addr: read_u64(bytes, 48),
            conversion_addr: read_u64(bytes, 56),
            data: read_u64(bytes, 64),
            unit_addr: read_u64(bytes, 72),
            comment_addr: read_u64(bytes, 80),
            channel_type: ChannelType::from_u8(bytes[88]),
            sync_type: SyncType::from_u8(bytes[89]),
            data_type: DataType::from_u8(bytes[90]),
            bit_offset: bytes[91],
            byte_offset: read_u32(bytes, 92),
            bit_count: read_u32(bytes, 96),
            flags: read_u32(bytes, 100),
            pos_invalidation_bit: read_u32(bytes, 104),
            precision: bytes[108],
            attachment_nr: read_u16(bytes, 110),
            min_raw_value: read_f64(bytes, 112),
            max_raw_value: read_f64(bytes, 120),
            lower_limit: read_f64(bytes, 128),
            upper_limit: read_f64(bytes, 136),
            lower_ext_limit: read_f64(bytes, 144),
            upper_ext_limit: read_f64(bytes, 152),
            name: None,
            unit: None,
            conversion: None,
        })
    }
}

impl ChannelBlock {
    /// Serialize to the fixed 160-byte CN layout.
    ///
    /// The cached `name` and `conversion` are not written here; they live in
    /// their own blocks reachable through `name_addr` / `conversion_addr`.
    pub fn to_bytes(&self) -> Result<Vec<u8>, MdfError> {
        if self.header.id != "##CN" {
            return Err(MdfError::BlockSerializationError(format!(
                "ChannelBlock must have ID '##CN', found '{}'",
                self.header.id
            )));
        }
        if self.bit_offset > 7 {
            return Err(MdfError::BlockSerializationError(format!(
                "bit offset must be 0..7, got {}",
                self.bit_offset
            )));
        }

        let mut buffer = Vec::with_capacity(160);
        buffer.extend_from_slice(&self.header.to_bytes()?);
        buffer.extend_from_slice(&self.next_ch_addr.to_le_bytes());
        buffer.extend_from_slice(&self.component_addr.to_le_bytes());
        buffer.extend_from_slice(&self.name_addr.to_le_bytes());
        buffer.extend_from_slice(&self.source_addr.to_le_bytes());
        buffer.extend_from_slice(&self.conversion_addr.to_le_bytes());
        buffer.extend_from_slice(&self.data.to_le_bytes());
        buffer.extend_from_slice(&self.unit_addr.to_le_bytes());
        buffer.extend_from_slice(&self.comment_addr.to_le_bytes());
        buffer.push(self.channel_type.to_u8());
        buffer.push(self.sync_type.to_u8());
        buffer.push(self.data_type.to_u8());
        buffer.push(self.bit_offset);
        buffer.extend_from_slice(&self.byte_offset.to_le_bytes());
        buffer.extend_from_slice(&self.bit_count.to_le_bytes());
        buffer.extend_from_slice(&self.flags.to_le_bytes());
        buffer.extend_from_slice(&self.pos_invalidation_bit.to_le_bytes());
        buffer.push(self.precision);
        buffer.push(0);
        buffer.extend_from_slice(&self.attachment_nr.to_le_bytes());
        buffer.extend_from_slice(&self.min_raw_value.to_le_bytes());
        buffer.extend_from_slice(&self.max_raw_value.to_le_bytes());
        buffer.extend_from_slice(&self.lower_limit.to_le_bytes());
        buffer.extend_from_slice(&self.upper_limit.to_le_bytes());
        buffer.extend_from_slice(&self.lower_ext_limit.to_le_bytes());
        buffer.extend_from_slice(&self.upper_ext_limit.to_le_bytes());

        if buffer.len() != 160 {
            return Err(MdfError::BlockSerializationError(format!(
                "ChannelBlock must be exactly 160 bytes, got {}",
                buffer.len()
            )));
        }
        Ok(buffer)
    }

    /// Number of whole bytes the channel occupies in a record.
    pub fn byte_width(&self) -> usize {
        ((self.bit_offset as usize + self.bit_count as usize) + 7) / 8
    }

    pub fn uses_invalidation_bit(&self) -> bool {
        self.flags & CN_FLAG_INVAL_BIT_VALID != 0
    }

    /// Resolve the channel name through `name_addr`, caching the result.
    pub fn resolve_name(&mut self, file_data: &[u8]) -> Result<(), MdfError> {
        if self.name.is_none() && self.name_addr != 0 {
            let offset = self.name_addr as usize;
            if offset + 24 <= file_data.len() {
                let text_block = TextBlock::from_bytes(&file_data[offset..])?;
                self.name = Some(text_block.text);
            }
        }
        Ok(())
    }

    /// Resolve and cache the conversion block through `conversion_addr`.
    pub fn resolve_conversion(&mut self, bytes: &[u8]) -> Result<(), MdfError> {
        if self.conversion.is_none() && self.conversion_addr != 0 {
            let offset = self.conversion_addr as usize;
            validate_buffer_size(bytes, offset + 24)?;

            let mut conv_block = ConversionBlock::from_bytes(&bytes[offset..])?;
            let _ = conv_block.resolve_formula(bytes);
            self.conversion = Some(conv_block);
        }
        Ok(())
    }

    /// Apply the resolved conversion to a decoded value, when one is
    /// attached. Without a conversion the raw value passes through.
    pub fn apply_conversion_value(
        &self,
        raw: crate::parsing::decoder::DecodedValue,
        file_data: &[u8],
    ) -> Result<crate::parsing::decoder::DecodedValue, MdfError> {
        match &self.conversion {
            Some(conv) => conv.apply_decoded(raw, file_data),
            None => Ok(raw),
        }
    }

    pub fn block_properties(&self) -> Vec<BlockProperty> {
        vec![
            BlockProperty::new("Name", self.name.clone().unwrap_or_default()),
            BlockProperty::new("Channel Type", self.channel_type.to_u8()),
            BlockProperty::new("Sync Type", self.sync_type.to_u8()),
            BlockProperty::new("Data Type", self.data_type),
            BlockProperty::new("Byte Offset", self.byte_offset),
            BlockProperty::new("Bit Offset", self.bit_offset),
            BlockProperty::new("Bit Count", self.bit_count),
            BlockProperty::new("Invalidation Bit", self.pos_invalidation_bit),
        ]
    }
}

impl Default for ChannelBlock {
    fn default() -> Self {
        ChannelBlock {
            header: BlockHeader::new("##CN", 160, 8),
            next_ch_addr: 0,
            component_addr: 0,
            name_addr: 0,
            source_addr: 0,
            conversion_addr: 0,
            data: 0,
            unit_addr: 0,
            comment_addr: 0,
            channel_type: ChannelType::FixedLength,
            sync_type: SyncType::None,
            data_type: DataType::UnsignedIntegerLE,
            bit_offset: 0,
            byte_offset: 0,
            bit_count: 0,
            flags: 0,
            pos_invalidation_bit: 0,
            precision: 0,
            attachment_nr: 0,
            min_raw_value: 0.0,
            max_raw_value: 0.0,
            lower_limit: 0.0,
            upper_limit: 0.0,
            lower_ext_limit: 0.0,
            upper_ext_limit: 0.0,
            name: None,
            unit: None,
            conversion: None,
        }
    }
}
