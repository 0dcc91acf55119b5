//! DLBLOCK: an ordered list of data blocks forming one logical stream.
//!
//! Two shapes exist: equal-length lists (every element but the last has the
//! same payload size) and offset lists (each element carries its absolute
//! byte offset within the logical stream). The v4.2 LDBLOCK is the same
//! idea for the DV/DI split representation and is read through here.

use crate::blocks::common::{
    read_u32, read_u64, validate_buffer_size, BlockHeader, BlockParse, BlockProperty,
};
use crate::error::MdfError;

/// dl_flags bit 0: all elements share one payload length.
pub const DL_FLAG_EQUAL_LENGTH: u8 = 0x01;

#[derive(Debug, Clone)]
pub struct DataListBlock {
    pub header: BlockHeader,
    /// Link to the next DLBLOCK of the chain, NIL for the last.
    pub next: u64,
    /// Offsets of the listed DT/DZ/SD/RD blocks.
    pub data_links: Vec<u64>,
    pub flags: u8,
    /// Equal-length lists: the shared payload byte count.
    pub equal_length: Option<u64>,
    /// Offset lists: logical stream offset per element.
    pub offsets: Vec<u64>,
}

impl BlockParse<'_> for DataListBlock {
    const ID: &'static str = "##DL";

    fn from_bytes(bytes: &[u8]) -> Result<Self, MdfError> {
        let header = Self::parse_header(bytes)?;
        Self::parse_list(header, bytes, 0)
    }
}

impl DataListBlock {
    /// Parse the list body shared by DL and LD. `extra_links` skips link
    /// slots that precede the data links (LD invalidation companions).
    fn parse_list(header: BlockHeader, bytes: &[u8], extra_links: usize) -> Result<Self, MdfError> {
        let link_section = 24 + header.links_nr as usize * 8;
        validate_buffer_size(bytes, link_section + 8)?;

        let next = read_u64(bytes, 24);
        let data_link_count = (header.links_nr as usize)
            .saturating_sub(1)
            .saturating_sub(extra_links);
        let mut data_links = Vec::with_capacity(data_link_count);
        for i in 0..data_link_count {
            data_links.push(read_u64(bytes, 32 + i * 8));
        }

        let flags = bytes[link_section];
        let count = read_u32(bytes, link_section + 4) as usize;
        if count != data_links.len() {
            return Err(MdfError::LengthMismatch {
                context: "DL element count",
                declared: count as u64,
                actual: data_links.len() as u64,
            });
        }

        let mut offset = link_section + 8;
        let (equal_length, offsets) = if flags & DL_FLAG_EQUAL_LENGTH != 0 {
            validate_buffer_size(bytes, offset + 8)?;
            (Some(read_u64(bytes, offset)), Vec::new())
        } else {
            validate_buffer_size(bytes, offset + count * 8)?;
            let mut offsets = Vec::with_capacity(count);
            for _ in 0..count {
                offsets.push(read_u64(bytes, offset));
                offset += 8;
            }
            // Offsets index a sparse logical stream and must not run backwards.
            if offsets.windows(2).any(|w| w[1] < w[0]) {
                return Err(MdfError::LengthMismatch {
                    context: "DL element offsets",
                    declared: count as u64,
                    actual: offsets.len() as u64,
                });
            }
            (None, offsets)
        };

        Ok(DataListBlock {
            header,
            next,
            data_links,
            flags,
            equal_length,
            offsets,
        })
    }

    /// Create an equal-length DLBLOCK referencing the given data blocks.
    pub fn new_equal(data_links: Vec<u64>, data_block_len: u64) -> Self {
        let links_nr = data_links.len() as u64 + 1;
        let block_len = 24 + links_nr * 8 + 16;
        DataListBlock {
            header: BlockHeader::new("##DL", block_len, links_nr),
            next: 0,
            data_links,
            flags: DL_FLAG_EQUAL_LENGTH,
            equal_length: Some(data_block_len),
            offsets: Vec::new(),
        }
    }

    /// Create an offset DLBLOCK; `offsets` must parallel `data_links`.
    pub fn new_with_offsets(data_links: Vec<u64>, offsets: Vec<u64>) -> Self {
        let links_nr = data_links.len() as u64 + 1;
        let block_len = 24 + links_nr * 8 + 8 + offsets.len() as u64 * 8;
        DataListBlock {
            header: BlockHeader::new("##DL", block_len, links_nr),
            next: 0,
            data_links,
            flags: 0,
            equal_length: None,
            offsets,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, MdfError> {
        if self.header.id != "##DL" {
            return Err(MdfError::BlockSerializationError(format!(
                "DataListBlock must have ID '##DL', found '{}'",
                self.header.id
            )));
        }
        let links_nr = self.data_links.len() as u64 + 1;
        if self.header.links_nr != links_nr {
            return Err(MdfError::BlockSerializationError(format!(
                "DataListBlock links_nr mismatch: header {} vs actual {}",
                self.header.links_nr, links_nr
            )));
        }
        if self.equal_length.is_none() && self.offsets.len() != self.data_links.len() {
            return Err(MdfError::BlockSerializationError(
                "offset DataListBlock needs one offset per data link".to_string(),
            ));
        }

        let mut buf = Vec::with_capacity(self.header.block_len as usize);
        buf.extend_from_slice(&self.header.to_bytes()?);
        buf.extend_from_slice(&self.next.to_le_bytes());
        for link in &self.data_links {
            buf.extend_from_slice(&link.to_le_bytes());
        }
        buf.push(self.flags);
        buf.extend_from_slice(&[0u8; 3]);
        buf.extend_from_slice(&(self.data_links.len() as u32).to_le_bytes());
        match self.equal_length {
            Some(len) => buf.extend_from_slice(&len.to_le_bytes()),
            None => {
                for off in &self.offsets {
                    buf.extend_from_slice(&off.to_le_bytes());
                }
            }
        }

        if buf.len() as u64 != self.header.block_len {
            return Err(MdfError::BlockSerializationError(format!(
                "DataListBlock block_len mismatch: header {} vs actual {}",
                self.header.block_len,
                buf.len()
            )));
        }
        Ok(buf)
    }

    /// Logical stream offset of element `index`.
    pub fn element_offset(&self, index: usize) -> u64 {
        match self.equal_length {
            Some(len) => len * index as u64,
            None => self.offsets.get(index).copied().unwrap_or(0),
        }
    }

    pub fn block_properties(&self) -> Vec<BlockProperty> {
        vec![
            BlockProperty::new("Elements", self.data_links.len()),
            BlockProperty::new("Flags", format!("{:#x}", self.flags)),
            BlockProperty::new(
                "Equal Length",
                self.equal_length.map_or(String::from("-"), |v| v.to_string()),
            ),
        ]
    }
}

/// LDBLOCK (v4.2): list block for the DV/DI split representation. Parsed
/// into the same shape as a DL; invalidation companion links are skipped.
pub fn parse_ld_block(bytes: &[u8]) -> Result<DataListBlock, MdfError> {
    validate_buffer_size(bytes, 24)?;
    let header = BlockHeader::from_bytes(&bytes[0..24])?;
    if header.id != "##LD" {
        return Err(MdfError::BlockIDError {
            actual: header.id,
            expected: "##LD".to_string(),
        });
    }
    DataListBlock::parse_list(header, bytes, 0)
}
