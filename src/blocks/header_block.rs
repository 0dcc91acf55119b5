//! HDBLOCK: the single measurement header owned by every MDF 4 file.

use crate::blocks::common::{
    read_f64, read_u64, validate_buffer_size, BlockHeader, BlockParse, BlockProperty,
};
use crate::error::MdfError;

/// Time flags, byte 84.
pub const HD_TIME_FLAG_LOCAL: u8 = 0x01;
pub const HD_TIME_FLAG_TZ_VALID: u8 = 0x02;
/// General flags, byte 86.
pub const HD_FLAG_START_ANGLE_VALID: u8 = 0x01;
pub const HD_FLAG_START_DISTANCE_VALID: u8 = 0x02;

#[derive(Debug, Clone)]
pub struct HeaderBlock {
    pub header: BlockHeader,
    pub first_dg_addr: u64,
    pub file_history_addr: u64,
    pub channel_tree_addr: u64,
    pub first_attachment_addr: u64,
    pub first_event_addr: u64,
    pub comment_addr: u64,
    /// Absolute start time, nanoseconds since the Unix epoch (UTC).
    pub abs_time: u64,
    /// Timezone offset in minutes.
    pub tz_offset: i16,
    /// DST offset in minutes.
    pub dst_offset: i16,
    pub time_flags: u8,
    pub time_quality: u8,
    pub flags: u8,
    pub reserved1: u8,
    /// Start angle in radians; valid when [`HD_FLAG_START_ANGLE_VALID`] set.
    pub start_angle: f64,
    /// Start distance in meters; valid when [`HD_FLAG_START_DISTANCE_VALID`] set.
    pub start_distance: f64,
}

impl BlockParse<'_> for HeaderBlock {
    const ID: &'static str = "##HD";

    fn from_bytes(bytes: &[u8]) -> Result<Self, MdfError> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, 104)?;

        Ok(Self {
            header,
            first_dg_addr: read_u64(bytes, 24),
            file_history_addr: read_u64(bytes, 32),
            channel_tree_addr: read_u64(bytes, 40),
            first_attachment_addr: read_u64(bytes, 48),
            first_event_addr: read_u64(bytes, 56),
            comment_addr: read_u64(bytes, 64),
            abs_time: read_u64(bytes, 72),
            tz_offset: i16::from_le_bytes([bytes[80], bytes[81]]),
            dst_offset: i16::from_le_bytes([bytes[82], bytes[83]]),
            time_flags: bytes[84],
            time_quality: bytes[85],
            flags: bytes[86],
            reserved1: bytes[87],
            start_angle: read_f64(bytes, 88),
            start_distance: read_f64(bytes, 96),
        })
    }
}

impl HeaderBlock {
    pub fn to_bytes(&self) -> Result<Vec<u8>, MdfError> {
        if self.header.id != "##HD" {
            return Err(MdfError::BlockSerializationError(format!(
                "HeaderBlock must have ID '##HD', found '{}'",
                self.header.id
            )));
        }

        let mut buffer = Vec::with_capacity(104);
        buffer.extend_from_slice(&self.header.to_bytes()?);
        buffer.extend_from_slice(&self.first_dg_addr.to_le_bytes());
        buffer.extend_from_slice(&self.file_history_addr.to_le_bytes());
        buffer.extend_from_slice(&self.channel_tree_addr.to_le_bytes());
        buffer.extend_from_slice(&self.first_attachment_addr.to_le_bytes());
        buffer.extend_from_slice(&self.first_event_addr.to_le_bytes());
        buffer.extend_from_slice(&self.comment_addr.to_le_bytes());
        buffer.extend_from_slice(&self.abs_time.to_le_bytes());
        buffer.extend_from_slice(&self.tz_offset.to_le_bytes());
        buffer.extend_from_slice(&self.dst_offset.to_le_bytes());
        buffer.push(self.time_flags);
        buffer.push(self.time_quality);
        buffer.push(self.flags);
        buffer.push(self.reserved1);
        buffer.extend_from_slice(&self.start_angle.to_le_bytes());
        buffer.extend_from_slice(&self.start_distance.to_le_bytes());

        if buffer.len() != 104 {
            return Err(MdfError::BlockSerializationError(format!(
                "HeaderBlock must be exactly 104 bytes, got {}",
                buffer.len()
            )));
        }
        Ok(buffer)
    }

    pub fn start_angle(&self) -> Option<f64> {
        (self.flags & HD_FLAG_START_ANGLE_VALID != 0).then_some(self.start_angle)
    }

    pub fn start_distance(&self) -> Option<f64> {
        (self.flags & HD_FLAG_START_DISTANCE_VALID != 0).then_some(self.start_distance)
    }

    pub fn set_start_angle(&mut self, radians: f64) {
        self.start_angle = radians;
        self.flags |= HD_FLAG_START_ANGLE_VALID;
    }

    pub fn set_start_distance(&mut self, meters: f64) {
        self.start_distance = meters;
        self.flags |= HD_FLAG_START_DISTANCE_VALID;
    }

    pub fn block_properties(&self) -> Vec<BlockProperty> {
        vec![
            BlockProperty::new("Start Time [ns]", self.abs_time),
            BlockProperty::new("Timezone Offset [min]", self.tz_offset),
            BlockProperty::new("DST Offset [min]", self.dst_offset),
            BlockProperty::new("Time Quality", self.time_quality),
            BlockProperty::new(
                "Start Angle [rad]",
                self.start_angle().map_or(String::from("-"), |v| v.to_string()),
            ),
            BlockProperty::new(
                "Start Distance [m]",
                self.start_distance().map_or(String::from("-"), |v| v.to_string()),
            ),
        ]
    }
}

impl Default for HeaderBlock {
    fn default() -> Self {
        HeaderBlock {
            header: BlockHeader::new("##HD", 104, 6),
            first_dg_addr: 0,
            file_history_addr: 0,
            channel_tree_addr: 0,
            first_attachment_addr: 0,
            first_event_addr: 0,
            comment_addr: 0,
            abs_time: 0,
            tz_offset: 0,
            dst_offset: 0,
            time_flags: 0,
            time_quality: 0,
            flags: 0,
            reserved1: 0,
            start_angle: 0.0,
            start_distance: 0.0,
        }
    }
}
