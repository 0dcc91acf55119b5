//! Common types, traits, and helper functions for MDF 4 block parsing.
//!
//! Every MDF 4 block starts with the same 24-byte header ([`BlockHeader`]):
//! a 4-character type tag beginning with `##`, four reserved bytes, the total
//! block length and the number of link fields. All numerics are little
//! endian and every block starts on an 8-byte boundary.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::error::MdfError;

// ============================================================================
// Byte parsing helpers
// ============================================================================

/// Read a little-endian u64 at `offset`. Panics on out-of-range offsets;
/// callers validate the buffer first via [`validate_buffer_size`].
#[inline]
pub fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    LittleEndian::read_u64(&bytes[offset..offset + 8])
}

#[inline]
pub fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    LittleEndian::read_u32(&bytes[offset..offset + 4])
}

#[inline]
pub fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    LittleEndian::read_u16(&bytes[offset..offset + 2])
}

#[inline]
pub fn read_u8(bytes: &[u8], offset: usize) -> u8 {
    bytes[offset]
}

#[inline]
pub fn read_f64(bytes: &[u8], offset: usize) -> f64 {
    LittleEndian::read_f64(&bytes[offset..offset + 8])
}

/// Read a link slot, mapping the NIL link (0) to `None`.
#[inline]
pub fn read_link(bytes: &[u8], offset: usize) -> Option<u64> {
    match read_u64(bytes, offset) {
        0 => None,
        addr => Some(addr),
    }
}

/// Validate that a buffer holds at least `expected` bytes.
#[inline]
pub fn validate_buffer_size(bytes: &[u8], expected: usize) -> Result<(), MdfError> {
    if bytes.len() < expected {
        return Err(MdfError::TooShortBuffer {
            actual:   bytes.len(),
            expected,
            file:     file!(),
            line:     line!(),
        });
    }
    Ok(())
}

/// Padding needed after `size` bytes to reach the next 8-byte boundary.
#[inline]
pub const fn padding_to_align_8(size: usize) -> usize {
    (8 - (size % 8)) % 8
}

/// Convert a file offset to `usize`, guarding 32-bit hosts.
#[inline]
pub fn u64_to_usize(value: u64, context: &str) -> Result<usize, MdfError> {
    usize::try_from(value).map_err(|_| {
        MdfError::BlockSerializationError(format!(
            "{} value {} exceeds the addressable size on this platform",
            context, value
        ))
    })
}

// ============================================================================
// Block header
// ============================================================================

#[derive(Debug, Clone)]
pub struct BlockHeader {
    /// 4-byte block type identifier (e.g. "##HD", "##DG").
    pub id: String,
    /// Reserved field, always 0.
    pub reserved0: u32,
    /// Total length of the block in bytes, including this header.
    pub block_len: u64,
    /// Number of link fields following the header.
    pub links_nr: u64,
}

impl BlockHeader {
    /// Build a header for a block of type `id` with the given geometry.
    pub fn new(id: &str, block_len: u64, links_nr: u64) -> Self {
        BlockHeader {
            id: String::from(id),
            reserved0: 0,
            block_len,
            links_nr,
        }
    }

    /// Parse a block header from the first 24 bytes of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MdfError> {
        validate_buffer_size(bytes, 24)?;

        let id = match core::str::from_utf8(&bytes[0..4]) {
            Ok(s) => String::from(s),
            Err(_) => String::from_utf8_lossy(&bytes[0..4]).into_owned(),
        };

        Ok(Self {
            id,
            reserved0: read_u32(bytes, 4),
            block_len: read_u64(bytes, 8),
            links_nr: read_u64(bytes, 16),
        })
    }

    /// Serialize the 24-byte header.
    pub fn to_bytes(&self) -> Result<Vec<u8>, MdfError> {
        let mut buffer = Vec::with_capacity(24);

        let id_bytes = self.id.as_bytes();
        let mut id_field = [0u8; 4];
        let id_len = core::cmp::min(id_bytes.len(), 4);
        id_field[..id_len].copy_from_slice(&id_bytes[..id_len]);
        buffer.extend_from_slice(&id_field);

        buffer.extend_from_slice(&self.reserved0.to_le_bytes());
        buffer.extend_from_slice(&self.block_len.to_le_bytes());
        buffer.extend_from_slice(&self.links_nr.to_le_bytes());

        debug_assert_eq!(buffer.len(), 24);
        Ok(buffer)
    }
}

impl Default for BlockHeader {
    /// Placeholder header; not a valid MDF block until the id is set.
    fn default() -> Self {
        BlockHeader {
            id: String::from("UNSET"),
            reserved0: 0,
            block_len: 0,
            links_nr: 0,
        }
    }
}

pub trait BlockParse<'a>: Sized {
    const ID: &'static str;

    fn parse_header(bytes: &[u8]) -> Result<BlockHeader, MdfError> {
        validate_buffer_size(bytes, 24)?;
        let header = BlockHeader::from_bytes(&bytes[0..24])?;
        if header.id != Self::ID {
            return Err(MdfError::BlockIDError {
                actual: header.id.clone(),
                expected: Self::ID.to_string(),
            });
        }
        Ok(header)
    }

    fn from_bytes(bytes: &'a [u8]) -> Result<Self, MdfError>;
}

// ============================================================================
// Block properties (inspection surface)
// ============================================================================

/// A single labeled value reported by a block for inspection tooling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockProperty {
    pub label: String,
    pub value: String,
}

impl BlockProperty {
    pub fn new(label: &str, value: impl ToString) -> Self {
        BlockProperty {
            label: String::from(label),
            value: value.to_string(),
        }
    }
}

// ============================================================================
// Channel data type
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    UnsignedIntegerLE,
    UnsignedIntegerBE,
    SignedIntegerLE,
    SignedIntegerBE,
    FloatLE,
    FloatBE,
    StringLatin1,
    StringUtf8,
    StringUtf16LE,
    StringUtf16BE,
    ByteArray,
    MimeSample,
    MimeStream,
    CanOpenDate,
    CanOpenTime,
    ComplexLE,
    ComplexBE,
    Unknown(u8),
}

impl DataType {
    pub fn to_u8(&self) -> u8 {
        match self {
            DataType::UnsignedIntegerLE => 0,
            DataType::UnsignedIntegerBE => 1,
            DataType::SignedIntegerLE => 2,
            DataType::SignedIntegerBE => 3,
            DataType::FloatLE => 4,
            DataType::FloatBE => 5,
            DataType::StringLatin1 => 6,
            DataType::StringUtf8 => 7,
            DataType::StringUtf16LE => 8,
            DataType::StringUtf16BE => 9,
            DataType::ByteArray => 10,
            DataType::MimeSample => 11,
            DataType::MimeStream => 12,
            DataType::CanOpenDate => 13,
            DataType::CanOpenTime => 14,
            DataType::ComplexLE => 15,
            DataType::ComplexBE => 16,
            DataType::Unknown(raw) => *raw,
        }
    }

    /// Convert a raw type code to the corresponding `DataType`.
    /// Values outside the known range yield `DataType::Unknown`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => DataType::UnsignedIntegerLE,
            1 => DataType::UnsignedIntegerBE,
            2 => DataType::SignedIntegerLE,
            3 => DataType::SignedIntegerBE,
            4 => DataType::FloatLE,
            5 => DataType::FloatBE,
            6 => DataType::StringLatin1,
            7 => DataType::StringUtf8,
            8 => DataType::StringUtf16LE,
            9 => DataType::StringUtf16BE,
            10 => DataType::ByteArray,
            11 => DataType::MimeSample,
            12 => DataType::MimeStream,
            13 => DataType::CanOpenDate,
            14 => DataType::CanOpenTime,
            15 => DataType::ComplexLE,
            16 => DataType::ComplexBE,
            other => DataType::Unknown(other),
        }
    }

    /// Typical bit width used when a channel is created without an explicit
    /// bit count.
    pub fn default_bits(&self) -> u32 {
        match self {
            DataType::UnsignedIntegerLE
            | DataType::UnsignedIntegerBE
            | DataType::SignedIntegerLE
            | DataType::SignedIntegerBE => 32,
            DataType::FloatLE | DataType::FloatBE => 32,
            DataType::CanOpenDate => 56,
            DataType::CanOpenTime => 48,
            DataType::ComplexLE | DataType::ComplexBE => 64,
            _ => 8,
        }
    }

    /// True for the numeric types whose extraction honors bit offsets.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::UnsignedIntegerLE
                | DataType::UnsignedIntegerBE
                | DataType::SignedIntegerLE
                | DataType::SignedIntegerBE
                | DataType::FloatLE
                | DataType::FloatBE
        )
    }

    pub fn is_big_endian(&self) -> bool {
        matches!(
            self,
            DataType::UnsignedIntegerBE
                | DataType::SignedIntegerBE
                | DataType::FloatBE
                | DataType::StringUtf16BE
                | DataType::ComplexBE
        )
    }
}

impl core::fmt::Display for DataType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DataType::UnsignedIntegerLE => write!(f, "uint (LE)"),
            DataType::UnsignedIntegerBE => write!(f, "uint (BE)"),
            DataType::SignedIntegerLE => write!(f, "int (LE)"),
            DataType::SignedIntegerBE => write!(f, "int (BE)"),
            DataType::FloatLE => write!(f, "float (LE)"),
            DataType::FloatBE => write!(f, "float (BE)"),
            DataType::StringLatin1 => write!(f, "string (Latin-1)"),
            DataType::StringUtf8 => write!(f, "string (UTF-8)"),
            DataType::StringUtf16LE => write!(f, "string (UTF-16 LE)"),
            DataType::StringUtf16BE => write!(f, "string (UTF-16 BE)"),
            DataType::ByteArray => write!(f, "byte array"),
            DataType::MimeSample => write!(f, "MIME sample"),
            DataType::MimeStream => write!(f, "MIME stream"),
            DataType::CanOpenDate => write!(f, "CANopen date"),
            DataType::CanOpenTime => write!(f, "CANopen time"),
            DataType::ComplexLE => write!(f, "complex (LE)"),
            DataType::ComplexBE => write!(f, "complex (BE)"),
            DataType::Unknown(raw) => write!(f, "unknown ({})", raw),
        }
    }
}

/// Read a text or metadata block at `address` and return its contents.
///
/// Returns `Ok(None)` when `address` is NIL or the target is neither a
/// `##TX` nor a `##MD` block.
pub fn read_string_block(mmap: &[u8], address: u64) -> Result<Option<String>, MdfError> {
    use crate::blocks::metadata_block::MetadataBlock;
    use crate::blocks::text_block::TextBlock;

    if address == 0 {
        return Ok(None);
    }

    let offset = u64_to_usize(address, "block address")?;
    validate_buffer_size(mmap, offset + 24)?;
    let header = BlockHeader::from_bytes(&mmap[offset..offset + 24])?;

    match header.id.as_str() {
        "##TX" => Ok(Some(TextBlock::from_bytes(&mmap[offset..])?.text)),
        "##MD" => Ok(Some(MetadataBlock::from_bytes(&mmap[offset..])?.xml)),
        _ => Ok(None),
    }
}
