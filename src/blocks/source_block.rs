//! SIBLOCK: acquisition source information for channels and channel groups.

use crate::blocks::common::{
    read_string_block, read_u64, validate_buffer_size, BlockHeader, BlockParse, BlockProperty,
};
use crate::error::MdfError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    Other,
    Ecu,
    Bus,
    Io,
    Tool,
    User,
    Unknown(u8),
}

impl SourceType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => SourceType::Other,
            1 => SourceType::Ecu,
            2 => SourceType::Bus,
            3 => SourceType::Io,
            4 => SourceType::Tool,
            5 => SourceType::User,
            other => SourceType::Unknown(other),
        }
    }

    pub fn to_u8(&self) -> u8 {
        match self {
            SourceType::Other => 0,
            SourceType::Ecu => 1,
            SourceType::Bus => 2,
            SourceType::Io => 3,
            SourceType::Tool => 4,
            SourceType::User => 5,
            SourceType::Unknown(raw) => *raw,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceBlock {
    pub header: BlockHeader,
    pub name_addr: u64,
    pub path_addr: u64,
    pub comment_addr: u64,
    pub source_type: SourceType,
    pub bus_type: u8,
    pub flags: u8,
}

impl BlockParse<'_> for SourceBlock {
    const ID: &'static str = "##SI";

    fn from_bytes(bytes: &[u8]) -> Result<Self, MdfError> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, 56)?;

        Ok(Self {
            header,
            name_addr: read_u64(bytes, 24),
            path_addr: read_u64(bytes, 32),
            comment_addr: read_u64(bytes, 40),
            source_type: SourceType::from_u8(bytes[48]),
            bus_type: bytes[49],
            flags: bytes[50],
        })
    }
}

impl SourceBlock {
    pub fn to_bytes(&self) -> Result<Vec<u8>, MdfError> {
        if self.header.id != "##SI" {
            return Err(MdfError::BlockSerializationError(format!(
                "SourceBlock must have ID '##SI', found '{}'",
                self.header.id
            )));
        }

        let mut buffer = Vec::with_capacity(56);
        buffer.extend_from_slice(&self.header.to_bytes()?);
        buffer.extend_from_slice(&self.name_addr.to_le_bytes());
        buffer.extend_from_slice(&self.path_addr.to_le_bytes());
        buffer.extend_from_slice(&self.comment_addr.to_le_bytes());
        buffer.push(self.source_type.to_u8());
        buffer.push(self.bus_type);
        buffer.push(self.flags);
        buffer.extend_from_slice(&[0u8; 5]);

        if buffer.len() != 56 {
            return Err(MdfError::BlockSerializationError(format!(
                "SourceBlock must be exactly 56 bytes, got {}",
                buffer.len()
            )));
        }
        Ok(buffer)
    }

    pub fn name(&self, mmap: &[u8]) -> Result<Option<String>, MdfError> {
        read_string_block(mmap, self.name_addr)
    }

    pub fn path(&self, mmap: &[u8]) -> Result<Option<String>, MdfError> {
        read_string_block(mmap, self.path_addr)
    }

    pub fn block_properties(&self) -> Vec<BlockProperty> {
        vec![
            BlockProperty::new("Source Type", self.source_type.to_u8()),
            BlockProperty::new("Bus Type", self.bus_type),
            BlockProperty::new("Flags", format!("{:#x}", self.flags)),
        ]
    }
}

impl Default for SourceBlock {
    fn default() -> Self {
        SourceBlock {
            header: BlockHeader::new("##SI", 56, 3),
            name_addr: 0,
            path_addr: 0,
            comment_addr: 0,
            source_type: SourceType::Other,
            bus_type: 0,
            flags: 0,
        }
    }
}
