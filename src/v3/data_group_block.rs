//! DG block, version 3. The data link targets raw record bytes with no
//! surrounding block header.

use crate::error::MdfError;
use crate::v3::block::BlockHeader3;
use crate::v3::V3Cursor;

pub const DG3_BLOCK_SIZE: u16 = 28;

#[derive(Debug, Clone)]
pub struct Dg3Block {
    pub next_dg_addr: u32,
    pub first_cg_addr: u32,
    pub trigger_addr: u32,
    pub data_addr: u32,
    pub nof_cg_blocks: u16,
    /// Record-id prefix bytes per record: 0 or 1 (2 repeats the id at the
    /// record end; only the leading id is interpreted here).
    pub nof_record_ids: u16,
}

impl Default for Dg3Block {
    fn default() -> Self {
        Dg3Block {
            next_dg_addr: 0,
            first_cg_addr: 0,
            trigger_addr: 0,
            data_addr: 0,
            nof_cg_blocks: 0,
            nof_record_ids: 0,
        }
    }
}

impl Dg3Block {
    pub fn read(mmap: &[u8], address: u32, big_endian: bool) -> Result<Self, MdfError> {
        let mut cursor = V3Cursor::new(&mmap[address as usize..], big_endian);
        let _header = BlockHeader3::read(&mut cursor, "DG")?;
        Ok(Dg3Block {
            next_dg_addr: cursor.u32()?,
            first_cg_addr: cursor.u32()?,
            trigger_addr: cursor.u32()?,
            data_addr: cursor.u32()?,
            nof_cg_blocks: cursor.u16()?,
            nof_record_ids: cursor.u16()?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let header = BlockHeader3::new("DG", DG3_BLOCK_SIZE);
        let mut bytes = header.to_bytes();
        bytes.extend_from_slice(&self.next_dg_addr.to_le_bytes());
        bytes.extend_from_slice(&self.first_cg_addr.to_le_bytes());
        bytes.extend_from_slice(&self.trigger_addr.to_le_bytes());
        bytes.extend_from_slice(&self.data_addr.to_le_bytes());
        bytes.extend_from_slice(&self.nof_cg_blocks.to_le_bytes());
        bytes.extend_from_slice(&self.nof_record_ids.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 4]);
        bytes
    }
}
