//! ATBLOCK: file attachments, either referenced by path or embedded.

use miniz_oxide::inflate::decompress_to_vec_zlib;

use crate::blocks::common::{
    read_string_block, read_u16, read_u64, validate_buffer_size, BlockHeader, BlockParse,
    BlockProperty,
};
use crate::error::MdfError;

pub const AT_FLAG_EMBEDDED: u16 = 0x01;
pub const AT_FLAG_COMPRESSED: u16 = 0x02;
pub const AT_FLAG_MD5_VALID: u16 = 0x04;

#[derive(Debug, Clone)]
pub struct AttachmentBlock {
    pub header: BlockHeader,
    pub next_at_addr: u64,
    pub file_name_addr: u64,
    pub mime_type_addr: u64,
    pub comment_addr: u64,
    pub flags: u16,
    pub creator_index: u16,
    /// MD5 of the original (uncompressed) payload; valid per flag bit 2.
    pub md5_checksum: [u8; 16],
    pub original_size: u64,
    pub embedded_size: u64,
    /// File offset this AT block was parsed from; the embedded payload
    /// follows the 96 fixed bytes.
    pub address: u64,
}

impl BlockParse<'_> for AttachmentBlock {
    const ID: &'static str = "##AT";

    fn from_bytes(bytes: &[u8]) -> Result<Self, MdfError> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, 96)?;

        let mut md5_checksum = [0u8; 16];
        md5_checksum.copy_from_slice(&bytes[64..80]);

        Ok(Self {
            header,
            next_at_addr: read_u64(bytes, 24),
            file_name_addr: read_u64(bytes, 32),
            mime_type_addr: read_u64(bytes, 40),
            comment_addr: read_u64(bytes, 48),
            flags: read_u16(bytes, 56),
            creator_index: read_u16(bytes, 58),
            md5_checksum,
            original_size: read_u64(bytes, 80),
            embedded_size: read_u64(bytes, 88),
            address: 0,
        })
    }
}

impl AttachmentBlock {
    pub fn is_embedded(&self) -> bool {
        self.flags & AT_FLAG_EMBEDDED != 0
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & AT_FLAG_COMPRESSED != 0
    }

    pub fn file_name(&self, mmap: &[u8]) -> Result<Option<String>, MdfError> {
        read_string_block(mmap, self.file_name_addr)
    }

    pub fn mime_type(&self, mmap: &[u8]) -> Result<Option<String>, MdfError> {
        read_string_block(mmap, self.mime_type_addr)
    }

    /// Extract the embedded payload, inflating when the block is stored
    /// deflated. `mmap` is the whole file; `address` must be set.
    pub fn embedded_data(&self, mmap: &[u8]) -> Result<Option<Vec<u8>>, MdfError> {
        if !self.is_embedded() {
            return Ok(None);
        }
        let start = self.address as usize + 96;
        let end = start + self.embedded_size as usize;
        validate_buffer_size(mmap, end)?;
        let stored = &mmap[start..end];

        if self.is_compressed() {
            let inflated = decompress_to_vec_zlib(stored).map_err(|e| {
                MdfError::BadCompression(format!("attachment inflate failed: {:?}", e))
            })?;
            if inflated.len() as u64 != self.original_size {
                return Err(MdfError::LengthMismatch {
                    context: "attachment original size",
                    declared: self.original_size,
                    actual: inflated.len() as u64,
                });
            }
            Ok(Some(inflated))
        } else {
            Ok(Some(stored.to_vec()))
        }
    }

    pub fn block_properties(&self) -> Vec<BlockProperty> {
        vec![
            BlockProperty::new("Embedded", self.is_embedded()),
            BlockProperty::new("Compressed", self.is_compressed()),
            BlockProperty::new("Original Size", self.original_size),
            BlockProperty::new("Embedded Size", self.embedded_size),
            BlockProperty::new("Creator Index", self.creator_index),
        ]
    }
}
