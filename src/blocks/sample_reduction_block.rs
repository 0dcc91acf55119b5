//! SRBLOCK: sample reduction data (mean/min/max at a fixed interval).
//!
//! Reduction records ride the regular data-block layer through the data
//! link; this crate reads the block through without interpreting the
//! reduced triples.

use crate::blocks::common::{
    read_f64, read_u64, validate_buffer_size, BlockHeader, BlockParse, BlockProperty,
};
use crate::error::MdfError;

#[derive(Debug, Clone)]
pub struct SampleReductionBlock {
    pub header: BlockHeader,
    pub next_sr_addr: u64,
    /// RD/RV or DZ/DL tree with the reduced records.
    pub data_addr: u64,
    pub cycles_nr: u64,
    pub interval: f64,
    pub sync_type: u8,
    pub flags: u8,
}

impl BlockParse<'_> for SampleReductionBlock {
    const ID: &'static str = "##SR";

    fn from_bytes(bytes: &[u8]) -> Result<Self, MdfError> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, 64)?;

        Ok(Self {
            header,
            next_sr_addr: read_u64(bytes, 24),
            data_addr: read_u64(bytes, 32),
            cycles_nr: read_u64(bytes, 40),
            interval: read_f64(bytes, 48),
            sync_type: bytes[56],
            flags: bytes[57],
        })
    }
}

impl SampleReductionBlock {
    pub fn to_bytes(&self) -> Result<Vec<u8>, MdfError> {
        if self.header.id != "##SR" {
            return Err(MdfError::BlockSerializationError(format!(
                "SampleReductionBlock must have ID '##SR', found '{}'",
                self.header.id
            )));
        }

        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(&self.header.to_bytes()?);
        buf.extend_from_slice(&self.next_sr_addr.to_le_bytes());
        buf.extend_from_slice(&self.data_addr.to_le_bytes());
        buf.extend_from_slice(&self.cycles_nr.to_le_bytes());
        buf.extend_from_slice(&self.interval.to_le_bytes());
        buf.push(self.sync_type);
        buf.push(self.flags);
        buf.extend_from_slice(&[0u8; 6]);

        if buf.len() != 64 {
            return Err(MdfError::BlockSerializationError(format!(
                "SampleReductionBlock must be exactly 64 bytes, got {}",
                buf.len()
            )));
        }
        Ok(buf)
    }

    pub fn block_properties(&self) -> Vec<BlockProperty> {
        vec![
            BlockProperty::new("Cycle Count", self.cycles_nr),
            BlockProperty::new("Interval", self.interval),
            BlockProperty::new("Sync Type", self.sync_type),
        ]
    }
}
