//! EVBLOCK: events (triggers, markers) attached to the header.

use crate::blocks::common::{
    read_f64, read_string_block, read_u16, read_u32, read_u64, validate_buffer_size, BlockHeader,
    BlockParse, BlockProperty,
};
use crate::error::MdfError;

#[derive(Debug, Clone)]
pub struct EventBlock {
    pub header: BlockHeader,
    pub next_ev_addr: u64,
    pub parent_ev_addr: u64,
    pub range_ev_addr: u64,
    pub name_addr: u64,
    pub comment_addr: u64,
    pub event_type: u8,
    pub sync_type: u8,
    pub range_type: u8,
    pub cause: u8,
    pub flags: u8,
    pub scope_count: u32,
    pub attachment_count: u16,
    pub creator_index: u16,
    pub sync_base_value: i64,
    pub sync_factor: f64,
}

impl BlockParse<'_> for EventBlock {
    const ID: &'static str = "##EV";

    fn from_bytes(bytes: &[u8]) -> Result<Self, MdfError> {
        let header = Self::parse_header(bytes)?;
        let link_section = 24 + header.links_nr as usize * 8;
        validate_buffer_size(bytes, link_section + 32)?;

        Ok(Self {
            header,
            next_ev_addr: read_u64(bytes, 24),
            parent_ev_addr: read_u64(bytes, 32),
            range_ev_addr: read_u64(bytes, 40),
            name_addr: read_u64(bytes, 48),
            comment_addr: read_u64(bytes, 56),
            event_type: bytes[link_section],
            sync_type: bytes[link_section + 1],
            range_type: bytes[link_section + 2],
            cause: bytes[link_section + 3],
            flags: bytes[link_section + 4],
            scope_count: read_u32(bytes, link_section + 8),
            attachment_count: read_u16(bytes, link_section + 12),
            creator_index: read_u16(bytes, link_section + 14),
            sync_base_value: read_u64(bytes, link_section + 16) as i64,
            sync_factor: read_f64(bytes, link_section + 24),
        })
    }
}

impl EventBlock {
    pub fn name(&self, mmap: &[u8]) -> Result<Option<String>, MdfError> {
        read_string_block(mmap, self.name_addr)
    }

    /// Event time/position: base value scaled by the sync factor.
    pub fn sync_value(&self) -> f64 {
        self.sync_base_value as f64 * self.sync_factor
    }

    pub fn block_properties(&self) -> Vec<BlockProperty> {
        vec![
            BlockProperty::new("Event Type", self.event_type),
            BlockProperty::new("Sync Type", self.sync_type),
            BlockProperty::new("Cause", self.cause),
            BlockProperty::new("Sync Value", self.sync_value()),
        ]
    }
}
