//! SDBLOCK: variable-length signal values for a VLSD channel.

use crate::blocks::common::{validate_buffer_size, BlockHeader, BlockParse};
use crate::error::MdfError;

/// The payload is the concatenation of `[u32 length][value bytes]` records;
/// a VLSD index stored in a fixed record is the byte offset of one such
/// record from the start of this stream.
pub struct SignalDataBlock<'a> {
    pub header: BlockHeader,
    pub data: &'a [u8],
}

impl<'a> BlockParse<'a> for SignalDataBlock<'a> {
    const ID: &'static str = "##SD";

    fn from_bytes(bytes: &'a [u8]) -> Result<Self, MdfError> {
        let header = Self::parse_header(bytes)?;
        let expected_bytes = header.block_len as usize;
        validate_buffer_size(bytes, expected_bytes)?;

        Ok(SignalDataBlock {
            header,
            data: &bytes[24..expected_bytes],
        })
    }
}

impl SignalDataBlock<'_> {
    /// Resolve one VLSD value by its byte offset within the stream.
    pub fn value_at(&self, index: u64) -> Result<&[u8], MdfError> {
        value_at_offset(self.data, index)
    }
}

/// Shared resolution for SD payloads, also used after DZ inflation.
pub fn value_at_offset(stream: &[u8], index: u64) -> Result<&[u8], MdfError> {
    let pos = index as usize;
    if pos + 4 > stream.len() {
        return Err(MdfError::ShortRecord {
            expected: pos + 4,
            actual: stream.len(),
        });
    }
    let len = u32::from_le_bytes(stream[pos..pos + 4].try_into().unwrap()) as usize;
    let start = pos + 4;
    let end = start + len;
    if end > stream.len() {
        return Err(MdfError::ShortRecord {
            expected: end,
            actual: stream.len(),
        });
    }
    Ok(&stream[start..end])
}

/// Build the on-disk bytes of an SD block around a VLSD stream.
pub fn sd_block_bytes(payload: &[u8]) -> Result<Vec<u8>, MdfError> {
    let header = BlockHeader::new("##SD", 24 + payload.len() as u64, 0);
    let mut bytes = header.to_bytes()?;
    bytes.extend_from_slice(payload);
    Ok(bytes)
}
