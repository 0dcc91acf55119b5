use crate::blocks::common::{read_string_block, u64_to_usize, validate_buffer_size, BlockParse};
use crate::blocks::source_block::{SourceBlock, SourceType};
use crate::error::MdfError;

/// Ergonomic view of an SIBLOCK: resolved name, path and comment.
#[derive(Debug)]
pub struct SourceInfo {
    pub source_type: SourceType,
    pub bus_type: u8,
    pub name: Option<String>,
    pub path: Option<String>,
    pub comment: Option<String>,
}

impl SourceInfo {
    /// Parse the SIBLOCK at `address` and resolve its string links.
    pub fn from_mmap(mmap: &[u8], address: u64) -> Result<Option<Self>, MdfError> {
        if address == 0 {
            return Ok(None);
        }
        let offset = u64_to_usize(address, "SI address")?;
        validate_buffer_size(mmap, offset + 56)?;
        let sb = SourceBlock::from_bytes(&mmap[offset..])?;

        Ok(Some(SourceInfo {
            source_type: sb.source_type,
            bus_type: sb.bus_type,
            name: read_string_block(mmap, sb.name_addr)?,
            path: read_string_block(mmap, sb.path_addr)?,
            comment: read_string_block(mmap, sb.comment_addr)?,
        }))
    }
}
