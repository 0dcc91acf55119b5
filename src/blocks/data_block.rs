//! DTBLOCK: raw concatenated records.
//!
//! The v4.2 split representations (DV/DI value/invalidation and RV/RI
//! reduction data, plus the RD reduction block) share the DT payload shape
//! and are read through the same code path.

use crate::blocks::common::{validate_buffer_size, BlockHeader, BlockParse};
use crate::error::MdfError;

/// Tags whose payload is "header then raw bytes".
pub const RAW_DATA_TAGS: [&str; 6] = ["##DT", "##DV", "##DI", "##RV", "##RI", "##RD"];

#[derive(Debug)]
pub struct DataBlock<'a> {
    pub header: BlockHeader,
    pub data: &'a [u8],
}

impl<'a> BlockParse<'a> for DataBlock<'a> {
    const ID: &'static str = "##DT";

    fn from_bytes(bytes: &'a [u8]) -> Result<Self, MdfError> {
        let header = Self::parse_header(bytes)?;
        Self::with_header(header, bytes)
    }
}

impl<'a> DataBlock<'a> {
    /// Parse any of the raw-payload block kinds ([`RAW_DATA_TAGS`]).
    pub fn from_raw_bytes(bytes: &'a [u8]) -> Result<Self, MdfError> {
        validate_buffer_size(bytes, 24)?;
        let header = BlockHeader::from_bytes(&bytes[0..24])?;
        if !RAW_DATA_TAGS.contains(&header.id.as_str()) {
            return Err(MdfError::BlockIDError {
                actual: header.id,
                expected: "##DT/##DV/##DI/##RV/##RI/##RD".to_string(),
            });
        }
        Self::with_header(header, bytes)
    }

    fn with_header(header: BlockHeader, bytes: &'a [u8]) -> Result<Self, MdfError> {
        let data_len = (header.block_len as usize).saturating_sub(24);
        validate_buffer_size(bytes, 24 + data_len)?;
        let data = &bytes[24..24 + data_len];
        Ok(Self { header, data })
    }

    /// Iterate over raw records of fixed size. A trailing partial record is
    /// silently dropped; the caller accounts for it via the cycle counter.
    pub fn records(&self, record_size: usize) -> impl Iterator<Item = &'a [u8]> {
        self.data.chunks_exact(record_size)
    }
}

/// Build the on-disk bytes of a DT block around a payload.
pub fn dt_block_bytes(payload: &[u8]) -> Result<Vec<u8>, MdfError> {
    let header = BlockHeader::new("##DT", 24 + payload.len() as u64, 0);
    let mut bytes = header.to_bytes()?;
    bytes.extend_from_slice(payload);
    Ok(bytes)
}
