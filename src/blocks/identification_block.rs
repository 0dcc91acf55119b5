//! The 64-byte identification block at file offset 0.
//!
//! The same fixed layout serves MDF 3 and MDF 4. For version 3 files the
//! byte-order, float-format and code-page words are meaningful; version 4
//! files are always little endian and use the trailing unfinalized flag
//! words instead.

use crate::blocks::common::{read_u16, validate_buffer_size, BlockProperty};
use crate::error::MdfError;

/// Magic written once a file has been finalized.
pub const ID_FILE_FINALIZED: &str = "MDF     ";
/// Magic of a measurement that was never finalized (e.g. a crashed logger).
pub const ID_FILE_UNFINISHED: &str = "UnFinMF ";

/// Default byte order for the rest of a version 3 file: 0 = little endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

#[derive(Debug, Clone)]
pub struct IdentificationBlock {
    pub file_identifier: String,
    pub version_identifier: String,
    pub program_identifier: String,
    /// MDF 3 only: default byte order of the file (0 = LE, nonzero = BE).
    pub byte_order: u16,
    /// MDF 3 only: default floating-point format (0 = IEEE 754).
    pub float_format: u16,
    /// Numeric version, `major * 100 + minor` (e.g. 330, 410).
    pub version_number: u16,
    /// MDF 3 only: code page of text fields.
    pub code_page: u16,
    pub standard_unfinalized_flags: u16,
    pub custom_unfinalized_flags: u16,
}

impl Default for IdentificationBlock {
    fn default() -> Self {
        IdentificationBlock {
            file_identifier: String::from(ID_FILE_FINALIZED),
            version_identifier: String::from("4.10    "),
            program_identifier: String::from("mdf-rs  "),
            byte_order: 0,
            float_format: 0,
            version_number: 410,
            code_page: 0,
            standard_unfinalized_flags: 0,
            custom_unfinalized_flags: 0,
        }
    }
}

impl IdentificationBlock {
    /// An identification block for a new MDF 3.30 file.
    pub fn new_v3() -> Self {
        IdentificationBlock {
            version_identifier: String::from("3.30    "),
            version_number: 330,
            ..Default::default()
        }
    }

    pub fn is_mdf4(&self) -> bool {
        self.version_number >= 400
    }

    pub fn is_finalized(&self) -> bool {
        self.file_identifier != ID_FILE_UNFINISHED
    }

    /// Effective byte order for version 3 numerics. Version 4 files are
    /// little endian by definition.
    pub fn default_byte_order(&self) -> ByteOrder {
        if !self.is_mdf4() && self.byte_order != 0 {
            ByteOrder::BigEndian
        } else {
            ByteOrder::LittleEndian
        }
    }

    /// Serialize the identification block. Always exactly 64 bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, MdfError> {
        let mut buffer = Vec::with_capacity(64);

        buffer.extend_from_slice(&fixed_field(&self.file_identifier));
        buffer.extend_from_slice(&fixed_field(&self.version_identifier));
        buffer.extend_from_slice(&fixed_field(&self.program_identifier));
        buffer.extend_from_slice(&self.byte_order.to_le_bytes());
        buffer.extend_from_slice(&self.float_format.to_le_bytes());
        buffer.extend_from_slice(&self.version_number.to_le_bytes());
        buffer.extend_from_slice(&self.code_page.to_le_bytes());
        buffer.extend_from_slice(&[0u8; 28]);
        buffer.extend_from_slice(&self.standard_unfinalized_flags.to_le_bytes());
        buffer.extend_from_slice(&self.custom_unfinalized_flags.to_le_bytes());

        if buffer.len() != 64 {
            return Err(MdfError::BlockSerializationError(format!(
                "IdentificationBlock must be exactly 64 bytes, got {}",
                buffer.len()
            )));
        }
        Ok(buffer)
    }

    /// Parse an identification block from the first 64 bytes of a file.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MdfError> {
        validate_buffer_size(bytes, 64)?;

        let file_identifier = String::from_utf8_lossy(&bytes[0..8]).into_owned();
        if file_identifier != ID_FILE_FINALIZED && file_identifier != ID_FILE_UNFINISHED {
            return Err(MdfError::FileIdentifierError(file_identifier));
        }

        let version_identifier = String::from_utf8_lossy(&bytes[8..16]).into_owned();
        let program_identifier = String::from_utf8_lossy(&bytes[16..24]).into_owned();

        let (major, minor) = Self::parse_block_version(&bytes[8..16])?;
        let from_text = major * 100 + minor;
        let stored = read_u16(bytes, 28);
        // Some writers leave the numeric version at 0; trust the text then.
        let version_number = if stored == 0 { from_text } else { stored };

        Ok(Self {
            file_identifier,
            version_identifier,
            program_identifier,
            byte_order: read_u16(bytes, 24),
            float_format: read_u16(bytes, 26),
            version_number,
            code_page: read_u16(bytes, 30),
            standard_unfinalized_flags: read_u16(bytes, 60),
            custom_unfinalized_flags: read_u16(bytes, 62),
        })
    }

    /// Parse the textual version ("4.10", "3.30", …) into `(major, minor)`.
    pub fn parse_block_version(bytes: &[u8]) -> Result<(u16, u16), MdfError> {
        let raw = core::str::from_utf8(bytes)
            .map_err(|_| MdfError::InvalidVersionString("Invalid UTF-8".to_string()))?;
        let s = raw.trim_end_matches(char::from(0)).trim();
        let mut parts = s.split('.');
        let maj = parts
            .next()
            .ok_or_else(|| MdfError::InvalidVersionString("Missing major version".to_string()))?
            .parse::<u16>()
            .map_err(|_| MdfError::InvalidVersionString(format!("Bad major version in {:?}", s)))?;
        let min = parts
            .next()
            .unwrap_or("0")
            .trim_end_matches(char::from(0))
            .parse::<u16>()
            .map_err(|_| MdfError::InvalidVersionString(format!("Bad minor version in {:?}", s)))?;
        Ok((maj, min))
    }

    pub fn block_properties(&self) -> Vec<BlockProperty> {
        vec![
            BlockProperty::new("File ID", self.file_identifier.trim_end()),
            BlockProperty::new("Version", self.version_identifier.trim_end()),
            BlockProperty::new("Program", self.program_identifier.trim_end()),
            BlockProperty::new("Version Number", self.version_number),
            BlockProperty::new(
                "Byte Order",
                if self.byte_order == 0 { "Little Endian" } else { "Big Endian" },
            ),
            BlockProperty::new("Finalized", self.is_finalized()),
        ]
    }
}

fn fixed_field(text: &str) -> [u8; 8] {
    let mut field = [b' '; 8];
    let src = text.as_bytes();
    let n = src.len().min(8);
    field[..n].copy_from_slice(&src[..n]);
    field
}
