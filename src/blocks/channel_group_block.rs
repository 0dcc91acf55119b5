//! CGBLOCK: describes the fixed record layout of one channel group.

use crate::blocks::channel_block::ChannelBlock;
use crate::blocks::common::{
    read_u16, read_u32, read_u64, validate_buffer_size, BlockHeader, BlockParse, BlockProperty,
};
use crate::error::MdfError;

/// cg_flags bit 0: the group itself stores variable-length payloads keyed by
/// record index (VLSD storage inside a CG instead of an SD block).
pub const CG_FLAG_VLSD_CHANNEL: u16 = 0x01;
/// cg_flags bit 1: bus-event group.
pub const CG_FLAG_BUS_EVENT: u16 = 0x02;

#[derive(Debug, Clone)]
pub struct ChannelGroupBlock {
    pub header: BlockHeader,
    pub next_cg_addr: u64,
    pub first_ch_addr: u64,
    pub acq_name_addr: u64,
    pub acq_source_addr: u64,
    pub first_sample_reduction_addr: u64,
    pub comment_addr: u64,
    /// Record id, unique within the owning data group.
    pub record_id: u64,
    /// Number of records written for this group.
    pub cycles_nr: u64,
    pub flags: u16,
    pub path_separator: u16,
    /// Bytes of valid payload per record.
    pub samples_byte_nr: u32,
    /// Bytes of invalidation bits appended to each record.
    pub invalidation_bytes_nr: u32,
}

impl BlockParse<'_> for ChannelGroupBlock {
    const ID: &'static str = "##CG";

    fn from_bytes(bytes: &[u8]) -> Result<Self, MdfError> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, 104)?;

        Ok(Self {
            header,
            next_cg_addr: read_u64(bytes, 24),
            first_ch_addr: read_u64(bytes, 32),
            acq_name_addr: read_u64(bytes, 40),
            acq_source_addr: read_u64(bytes, 48),
            first_sample_reduction_addr: read_u64(bytes, 56),
            comment_addr: read_u64(bytes, 64),
            record_id: read_u64(bytes, 72),
            cycles_nr: read_u64(bytes, 80),
            flags: read_u16(bytes, 88),
            path_separator: read_u16(bytes, 90),
            samples_byte_nr: read_u32(bytes, 96),
            invalidation_bytes_nr: read_u32(bytes, 100),
        })
    }
}

impl ChannelGroupBlock {
    pub fn to_bytes(&self) -> Result<Vec<u8>, MdfError> {
        if self.header.id != "##CG" {
            return Err(MdfError::BlockSerializationError(format!(
                "ChannelGroupBlock must have ID '##CG', found '{}'",
                self.header.id
            )));
        }

        let mut buffer = Vec::with_capacity(104);
        buffer.extend_from_slice(&self.header.to_bytes()?);
        buffer.extend_from_slice(&self.next_cg_addr.to_le_bytes());
        buffer.extend_from_slice(&self.first_ch_addr.to_le_bytes());
        buffer.extend_from_slice(&self.acq_name_addr.to_le_bytes());
        buffer.extend_from_slice(&self.acq_source_addr.to_le_bytes());
        buffer.extend_from_slice(&self.first_sample_reduction_addr.to_le_bytes());
        buffer.extend_from_slice(&self.comment_addr.to_le_bytes());
        buffer.extend_from_slice(&self.record_id.to_le_bytes());
        buffer.extend_from_slice(&self.cycles_nr.to_le_bytes());
        buffer.extend_from_slice(&self.flags.to_le_bytes());
        buffer.extend_from_slice(&self.path_separator.to_le_bytes());
        buffer.extend_from_slice(&0u32.to_le_bytes());
        buffer.extend_from_slice(&self.samples_byte_nr.to_le_bytes());
        buffer.extend_from_slice(&self.invalidation_bytes_nr.to_le_bytes());

        if buffer.len() != 104 {
            return Err(MdfError::BlockSerializationError(format!(
                "ChannelGroupBlock must be exactly 104 bytes, got {}",
                buffer.len()
            )));
        }
        Ok(buffer)
    }

    pub fn is_vlsd(&self) -> bool {
        self.flags & CG_FLAG_VLSD_CHANNEL != 0
    }

    /// Full on-disk record width: payload plus invalidation bytes.
    pub fn record_len(&self) -> usize {
        self.samples_byte_nr as usize + self.invalidation_bytes_nr as usize
    }

    /// Read all channels linked from this channel group, paired with the
    /// file offset each CN block was parsed from.
    pub fn read_channels(&self, mmap: &[u8]) -> Result<Vec<(u64, ChannelBlock)>, MdfError> {
        let mut channels = Vec::new();
        let mut current_ch_addr = self.first_ch_addr;

        while current_ch_addr != 0 {
            let ch_offset = current_ch_addr as usize;
            validate_buffer_size(mmap, ch_offset + 24)?;
            let mut channel = ChannelBlock::from_bytes(&mmap[ch_offset..])?;
            channel.resolve_conversion(mmap)?;
            let address = current_ch_addr;
            current_ch_addr = channel.next_ch_addr;
            channels.push((address, channel));
        }

        Ok(channels)
    }

    pub fn block_properties(&self) -> Vec<BlockProperty> {
        vec![
            BlockProperty::new("Record ID", self.record_id),
            BlockProperty::new("Cycle Count", self.cycles_nr),
            BlockProperty::new("Data Bytes", self.samples_byte_nr),
            BlockProperty::new("Invalidation Bytes", self.invalidation_bytes_nr),
            BlockProperty::new("VLSD Group", self.is_vlsd()),
        ]
    }
}

impl Default for ChannelGroupBlock {
    fn default() -> Self {
        ChannelGroupBlock {
            header: BlockHeader::new("##CG", 104, 6),
            next_cg_addr: 0,
            first_ch_addr: 0,
            acq_name_addr: 0,
            acq_source_addr: 0,
            first_sample_reduction_addr: 0,
            comment_addr: 0,
            record_id: 0,
            cycles_nr: 0,
            flags: 0,
            path_separator: 0,
            samples_byte_nr: 0,
            invalidation_bytes_nr: 0,
        }
    }
}
