//! The v3 block header: a 2-character ASCII tag followed by a `u16` size
//! that includes the 4 header bytes. Links are plain `u32` offsets inside
//! the block body, declared per block type.

use crate::error::MdfError;
use crate::v3::V3Cursor;

#[derive(Debug, Clone)]
pub struct BlockHeader3 {
    pub id: String,
    pub block_size: u16,
}

impl BlockHeader3 {
    pub fn new(id: &str, block_size: u16) -> Self {
        BlockHeader3 {
            id: String::from(id),
            block_size,
        }
    }

    /// Parse a header from the cursor and verify the expected tag.
    pub fn read(cursor: &mut V3Cursor<'_>, expected: &str) -> Result<Self, MdfError> {
        let id_bytes = [cursor.u8()?, cursor.u8()?];
        let id = String::from_utf8_lossy(&id_bytes).into_owned();
        if id != expected {
            return Err(MdfError::BlockIDError {
                actual: id,
                expected: expected.to_string(),
            });
        }
        let block_size = cursor.u16()?;
        Ok(BlockHeader3 { id, block_size })
    }

    /// Serialize the 4 header bytes (always little endian on write).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4);
        let id = self.id.as_bytes();
        bytes.push(*id.first().unwrap_or(&b' '));
        bytes.push(*id.get(1).unwrap_or(&b' '));
        bytes.extend_from_slice(&self.block_size.to_le_bytes());
        bytes
    }
}
