//! DZBLOCK: zlib-compressed wrapper over another data block.
//!
//! The block stores the two-character tag of the original block ("DT",
//! "SD", …), the compression algorithm, and both the original and the
//! compressed byte counts. For the transposition variant the payload was
//! reordered column-by-column (column count = record length) before
//! deflation, which helps zlib on fixed-width records.

use miniz_oxide::deflate::compress_to_vec_zlib;
use miniz_oxide::inflate::decompress_to_vec_zlib;

use crate::blocks::common::{
    read_u32, read_u64, read_u8, validate_buffer_size, BlockHeader, BlockParse, BlockProperty,
};
use crate::error::MdfError;

/// Compression algorithm carried by a DZ block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DzCompressionType {
    /// zlib deflate only.
    Deflate,
    /// Byte transposition followed by deflate.
    TranspositionDeflate,
}

impl DzCompressionType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Deflate),
            1 => Some(Self::TranspositionDeflate),
            _ => None,
        }
    }

    pub fn to_u8(&self) -> u8 {
        match self {
            Self::Deflate => 0,
            Self::TranspositionDeflate => 1,
        }
    }
}

/// DZ block header size: 24 common + 24 DZ-specific bytes.
pub const DZ_HEADER_SIZE: usize = 48;

/// Default zlib compression level used when writing DZ blocks.
const DZ_COMPRESSION_LEVEL: u8 = 6;

#[derive(Debug, Clone)]
pub struct DzBlock<'a> {
    pub header: BlockHeader,
    /// Tag of the block this DZ stands in for, without the "##" prefix.
    pub original_block_type: [u8; 2],
    pub zip_type: DzCompressionType,
    /// Transposition column count (record length); 0 for plain deflate.
    pub zip_parameter: u32,
    pub original_data_length: u64,
    pub compressed_data_length: u64,
    pub data: &'a [u8],
}

impl<'a> BlockParse<'a> for DzBlock<'a> {
    const ID: &'static str = "##DZ";

    fn from_bytes(bytes: &'a [u8]) -> Result<Self, MdfError> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, DZ_HEADER_SIZE)?;

        let original_block_type = [bytes[24], bytes[25]];
        let zip_type_raw = read_u8(bytes, 26);
        let zip_type = DzCompressionType::from_u8(zip_type_raw).ok_or_else(|| {
            MdfError::BadCompression(format!("unknown DZ compression type {}", zip_type_raw))
        })?;
        let zip_parameter = read_u32(bytes, 28);
        let original_data_length = read_u64(bytes, 32);
        let compressed_data_length = read_u64(bytes, 40);

        let data_end = DZ_HEADER_SIZE + compressed_data_length as usize;
        validate_buffer_size(bytes, data_end)?;

        Ok(Self {
            header,
            original_block_type,
            zip_type,
            zip_parameter,
            original_data_length,
            compressed_data_length,
            data: &bytes[DZ_HEADER_SIZE..data_end],
        })
    }
}

impl DzBlock<'_> {
    /// Inflate the payload, undoing the transposition when declared.
    ///
    /// A mismatch between the inflated length and the declared original
    /// length is fatal for the block.
    pub fn decompress(&self) -> Result<Vec<u8>, MdfError> {
        let decompressed = decompress_to_vec_zlib(self.data)
            .map_err(|e| MdfError::BadCompression(format!("DZ inflate failed: {:?}", e)))?;

        if decompressed.len() != self.original_data_length as usize {
            return Err(MdfError::LengthMismatch {
                context: "DZ original size",
                declared: self.original_data_length,
                actual: decompressed.len() as u64,
            });
        }

        match self.zip_type {
            DzCompressionType::Deflate => Ok(decompressed),
            DzCompressionType::TranspositionDeflate => {
                inverse_transpose(&decompressed, self.zip_parameter as usize)
            }
        }
    }

    pub fn block_properties(&self) -> Vec<BlockProperty> {
        vec![
            BlockProperty::new(
                "Original Type",
                String::from_utf8_lossy(&self.original_block_type).into_owned(),
            ),
            BlockProperty::new("Compression", self.zip_type.to_u8()),
            BlockProperty::new("Columns", self.zip_parameter),
            BlockProperty::new("Original Size", self.original_data_length),
            BlockProperty::new("Compressed Size", self.compressed_data_length),
        ]
    }
}

/// Compress `payload` into a complete on-disk DZ block standing in for a
/// block of type `original_type` ("DT", "SD", …).
pub fn dz_block_bytes(
    original_type: &[u8; 2],
    zip_type: DzCompressionType,
    columns: u32,
    payload: &[u8],
) -> Result<Vec<u8>, MdfError> {
    let staged;
    let to_deflate: &[u8] = match zip_type {
        DzCompressionType::Deflate => payload,
        DzCompressionType::TranspositionDeflate => {
            staged = transpose(payload, columns as usize)?;
            &staged
        }
    };
    let compressed = compress_to_vec_zlib(to_deflate, DZ_COMPRESSION_LEVEL);

    let block_len = (DZ_HEADER_SIZE + compressed.len()) as u64;
    let header = BlockHeader::new("##DZ", block_len, 0);

    let mut bytes = Vec::with_capacity(block_len as usize);
    bytes.extend_from_slice(&header.to_bytes()?);
    bytes.extend_from_slice(original_type);
    bytes.push(zip_type.to_u8());
    bytes.push(0);
    bytes.extend_from_slice(&columns.to_le_bytes());
    bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&(compressed.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&compressed);
    Ok(bytes)
}

/// Reorder row-major data column-by-column. The trailing partial row is
/// appended untransposed, as the standard prescribes.
fn transpose(data: &[u8], columns: usize) -> Result<Vec<u8>, MdfError> {
    if columns == 0 {
        return Err(MdfError::BadCompression(
            "DZ transposition requires a nonzero column count".to_string(),
        ));
    }
    let rows = data.len() / columns;
    let body = rows * columns;
    let mut result = Vec::with_capacity(data.len());
    for col in 0..columns {
        for row in 0..rows {
            result.push(data[row * columns + col]);
        }
    }
    result.extend_from_slice(&data[body..]);
    Ok(result)
}

/// Restore row-major order from column-major transposed data.
fn inverse_transpose(data: &[u8], columns: usize) -> Result<Vec<u8>, MdfError> {
    if columns == 0 {
        return Err(MdfError::BadCompression(
            "DZ transposition requires a nonzero column count".to_string(),
        ));
    }
    let rows = data.len() / columns;
    let body = rows * columns;
    let mut result = vec![0u8; data.len()];
    for col in 0..columns {
        for row in 0..rows {
            result[row * columns + col] = data[col * rows + row];
        }
    }
    result[body..].copy_from_slice(&data[body..]);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transpose_roundtrip() {
        let data: Vec<u8> = (0..=22).collect(); // 3 full rows of 7 plus 2 spare bytes
        let t = transpose(&data, 7).unwrap();
        assert_eq!(inverse_transpose(&t, 7).unwrap(), data);
    }

    #[test]
    fn dz_roundtrip_deflate() {
        let payload: Vec<u8> = (0u16..2000).flat_map(|v| v.to_le_bytes()).collect();
        let bytes = dz_block_bytes(b"DT", DzCompressionType::Deflate, 0, &payload).unwrap();
        let dz = DzBlock::from_bytes(&bytes).unwrap();
        assert_eq!(dz.original_block_type, *b"DT");
        assert_eq!(dz.decompress().unwrap(), payload);
        assert!(bytes.len() < DZ_HEADER_SIZE + payload.len());
    }

    #[test]
    fn dz_roundtrip_transposed() {
        let payload: Vec<u8> = (0u32..512).flat_map(|v| v.to_le_bytes()).collect();
        let bytes =
            dz_block_bytes(b"DT", DzCompressionType::TranspositionDeflate, 8, &payload).unwrap();
        let dz = DzBlock::from_bytes(&bytes).unwrap();
        assert_eq!(dz.zip_parameter, 8);
        assert_eq!(dz.decompress().unwrap(), payload);
    }

    #[test]
    fn dz_length_mismatch_is_fatal() {
        let payload = b"short payload".to_vec();
        let mut bytes = dz_block_bytes(b"DT", DzCompressionType::Deflate, 0, &payload).unwrap();
        // Corrupt the declared original length.
        bytes[32..40].copy_from_slice(&999u64.to_le_bytes());
        let dz = DzBlock::from_bytes(&bytes).unwrap();
        assert!(matches!(
            dz.decompress(),
            Err(MdfError::LengthMismatch { .. })
        ));
    }
}
