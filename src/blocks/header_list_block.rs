//! HLBLOCK: wraps a DL chain and declares the compression of its leaves.

use crate::blocks::common::{
    read_u16, read_u64, validate_buffer_size, BlockHeader, BlockParse, BlockProperty,
};
use crate::blocks::dz_block::DzCompressionType;
use crate::error::MdfError;

#[derive(Debug, Clone)]
pub struct HeaderListBlock {
    pub header: BlockHeader,
    /// Link to the first DLBLOCK of the chain.
    pub first_dl_addr: u64,
    pub flags: u16,
    /// Compression used by the DZ leaves under this list.
    pub zip_type: DzCompressionType,
}

impl BlockParse<'_> for HeaderListBlock {
    const ID: &'static str = "##HL";

    fn from_bytes(bytes: &[u8]) -> Result<Self, MdfError> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, 40)?;

        let zip_raw = bytes[34];
        let zip_type = DzCompressionType::from_u8(zip_raw).ok_or_else(|| {
            MdfError::BadCompression(format!("unknown HL compression type {}", zip_raw))
        })?;

        Ok(Self {
            header,
            first_dl_addr: read_u64(bytes, 24),
            flags: read_u16(bytes, 32),
            zip_type,
        })
    }
}

impl HeaderListBlock {
    pub fn new(zip_type: DzCompressionType) -> Self {
        HeaderListBlock {
            header: BlockHeader::new("##HL", 40, 1),
            first_dl_addr: 0,
            flags: 0,
            zip_type,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, MdfError> {
        if self.header.id != "##HL" {
            return Err(MdfError::BlockSerializationError(format!(
                "HeaderListBlock must have ID '##HL', found '{}'",
                self.header.id
            )));
        }

        let mut buf = Vec::with_capacity(40);
        buf.extend_from_slice(&self.header.to_bytes()?);
        buf.extend_from_slice(&self.first_dl_addr.to_le_bytes());
        buf.extend_from_slice(&self.flags.to_le_bytes());
        buf.push(self.zip_type.to_u8());
        buf.extend_from_slice(&[0u8; 5]);

        if buf.len() != 40 {
            return Err(MdfError::BlockSerializationError(format!(
                "HeaderListBlock must be exactly 40 bytes, got {}",
                buf.len()
            )));
        }
        Ok(buf)
    }

    pub fn block_properties(&self) -> Vec<BlockProperty> {
        vec![
            BlockProperty::new("First DL", format!("{:#x}", self.first_dl_addr)),
            BlockProperty::new("Compression", self.zip_type.to_u8()),
        ]
    }
}
