//! DGBLOCK: groups one or more channel groups over a shared data payload.

use crate::blocks::common::{
    read_u64, validate_buffer_size, BlockHeader, BlockParse, BlockProperty,
};
use crate::error::MdfError;

#[derive(Debug, Clone)]
pub struct DataGroupBlock {
    pub header: BlockHeader,
    pub next_dg_addr: u64,
    pub first_cg_addr: u64,
    /// Root of the payload: a DT, DZ, DL, HL or LD block.
    pub data_block_addr: u64,
    pub comment_addr: u64,
    /// Bytes of record-id prefix per record: 0, 1, 2, 4 or 8.
    pub record_id_len: u8,
}

impl BlockParse<'_> for DataGroupBlock {
    const ID: &'static str = "##DG";

    fn from_bytes(bytes: &[u8]) -> Result<Self, MdfError> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, 64)?;

        Ok(Self {
            header,
            next_dg_addr: read_u64(bytes, 24),
            first_cg_addr: read_u64(bytes, 32),
            data_block_addr: read_u64(bytes, 40),
            comment_addr: read_u64(bytes, 48),
            record_id_len: bytes[56],
        })
    }
}

impl DataGroupBlock {
    pub fn to_bytes(&self) -> Result<Vec<u8>, MdfError> {
        if self.header.id != "##DG" {
            return Err(MdfError::BlockSerializationError(format!(
                "DataGroupBlock must have ID '##DG', found '{}'",
                self.header.id
            )));
        }
        if !matches!(self.record_id_len, 0 | 1 | 2 | 4 | 8) {
            return Err(MdfError::BlockSerializationError(format!(
                "record id size must be 0, 1, 2, 4 or 8, got {}",
                self.record_id_len
            )));
        }

        let mut buffer = Vec::with_capacity(64);
        buffer.extend_from_slice(&self.header.to_bytes()?);
        buffer.extend_from_slice(&self.next_dg_addr.to_le_bytes());
        buffer.extend_from_slice(&self.first_cg_addr.to_le_bytes());
        buffer.extend_from_slice(&self.data_block_addr.to_le_bytes());
        buffer.extend_from_slice(&self.comment_addr.to_le_bytes());
        buffer.push(self.record_id_len);
        buffer.extend_from_slice(&[0u8; 7]);

        if buffer.len() != 64 {
            return Err(MdfError::BlockSerializationError(format!(
                "DataGroupBlock must be exactly 64 bytes, got {}",
                buffer.len()
            )));
        }
        Ok(buffer)
    }

    pub fn block_properties(&self) -> Vec<BlockProperty> {
        vec![
            BlockProperty::new("Next DG", format!("{:#x}", self.next_dg_addr)),
            BlockProperty::new("First CG", format!("{:#x}", self.first_cg_addr)),
            BlockProperty::new("Data Block", format!("{:#x}", self.data_block_addr)),
            BlockProperty::new("Record ID Size", self.record_id_len),
        ]
    }
}

impl Default for DataGroupBlock {
    fn default() -> Self {
        DataGroupBlock {
            header: BlockHeader::new("##DG", 64, 4),
            next_dg_addr: 0,
            first_cg_addr: 0,
            data_block_addr: 0,
            comment_addr: 0,
            record_id_len: 0,
        }
    }
}
