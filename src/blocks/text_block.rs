//! TXBLOCK: NUL-terminated UTF-8 text used for names, units and comments.

use crate::blocks::common::{
    padding_to_align_8, validate_buffer_size, BlockHeader, BlockParse,
};
use crate::error::MdfError;

#[derive(Debug, Clone)]
pub struct TextBlock {
    pub header: BlockHeader,
    /// The text content, without the trailing NUL.
    pub text: String,
}

impl BlockParse<'_> for TextBlock {
    const ID: &'static str = "##TX";

    fn from_bytes(bytes: &[u8]) -> Result<Self, MdfError> {
        let header = Self::parse_header(bytes)?;

        let data_len = (header.block_len as usize).saturating_sub(24);
        validate_buffer_size(bytes, 24 + data_len)?;
        let data = &bytes[24..24 + data_len];

        let text = match core::str::from_utf8(data) {
            Ok(s) => s.trim_matches('\0').to_string(),
            Err(_) => String::from_utf8_lossy(data).trim_matches('\0').to_string(),
        };

        Ok(Self { header, text })
    }
}

impl TextBlock {
    /// Create a TXBLOCK holding `text`, sized to the next 8-byte boundary.
    pub fn new(text: &str) -> Self {
        Self {
            header: BlockHeader::new("##TX", Self::calculate_block_len(text) as u64, 0),
            text: String::from(text),
        }
    }

    fn calculate_block_len(text: &str) -> usize {
        // Always NUL-terminated, then zero-padded to alignment.
        let unpadded = 24 + text.len() + 1;
        unpadded + padding_to_align_8(unpadded)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, MdfError> {
        let total_size = Self::calculate_block_len(&self.text);
        if self.header.block_len as usize != total_size {
            return Err(MdfError::BlockSerializationError(format!(
                "TextBlock header length {} does not match computed size {}",
                self.header.block_len, total_size
            )));
        }

        let mut buffer = Vec::with_capacity(total_size);
        buffer.extend_from_slice(&self.header.to_bytes()?);
        buffer.extend_from_slice(self.text.as_bytes());
        buffer.resize(total_size, 0);
        Ok(buffer)
    }
}

impl Default for TextBlock {
    fn default() -> Self {
        Self::new("")
    }
}
