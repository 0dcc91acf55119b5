//! CG block, version 3.

use crate::error::MdfError;
use crate::v3::block::BlockHeader3;
use crate::v3::V3Cursor;

/// v3.3 size including the sample-reduction link.
pub const CG3_BLOCK_SIZE: u16 = 30;

#[derive(Debug, Clone)]
pub struct Cg3Block {
    pub next_cg_addr: u32,
    pub first_cn_addr: u32,
    pub comment_addr: u32,
    pub record_id: u16,
    pub nof_channels: u16,
    /// Bytes of one record, record-id prefix excluded.
    pub record_size: u16,
    pub nof_records: u32,
    pub first_sr_addr: u32,
    pub comment: Option<String>,
}

impl Default for Cg3Block {
    fn default() -> Self {
        Cg3Block {
            next_cg_addr: 0,
            first_cn_addr: 0,
            comment_addr: 0,
            record_id: 0,
            nof_channels: 0,
            record_size: 0,
            nof_records: 0,
            first_sr_addr: 0,
            comment: None,
        }
    }
}

impl Cg3Block {
    pub fn read(mmap: &[u8], address: u32, big_endian: bool) -> Result<Self, MdfError> {
        let mut cursor = V3Cursor::new(&mmap[address as usize..], big_endian);
        let header = BlockHeader3::read(&mut cursor, "CG")?;

        let next_cg_addr = cursor.u32()?;
        let first_cn_addr = cursor.u32()?;
        let comment_addr = cursor.u32()?;
        let record_id = cursor.u16()?;
        let nof_channels = cursor.u16()?;
        let record_size = cursor.u16()?;
        let nof_records = cursor.u32()?;
        let first_sr_addr = if header.block_size >= CG3_BLOCK_SIZE {
            cursor.u32()?
        } else {
            0
        };

        let comment =
            crate::v3::text_block::read_text_block(mmap, comment_addr, big_endian, "TX")?;

        Ok(Cg3Block {
            next_cg_addr,
            first_cn_addr,
            comment_addr,
            record_id,
            nof_channels,
            record_size,
            nof_records,
            first_sr_addr,
            comment,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let header = BlockHeader3::new("CG", CG3_BLOCK_SIZE);
        let mut bytes = header.to_bytes();
        bytes.extend_from_slice(&self.next_cg_addr.to_le_bytes());
        bytes.extend_from_slice(&self.first_cn_addr.to_le_bytes());
        bytes.extend_from_slice(&self.comment_addr.to_le_bytes());
        bytes.extend_from_slice(&self.record_id.to_le_bytes());
        bytes.extend_from_slice(&self.nof_channels.to_le_bytes());
        bytes.extend_from_slice(&self.record_size.to_le_bytes());
        bytes.extend_from_slice(&self.nof_records.to_le_bytes());
        bytes.extend_from_slice(&self.first_sr_addr.to_le_bytes());
        bytes
    }
}
