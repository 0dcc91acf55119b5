//! CCBLOCK: channel conversion storage.
//!
//! The struct doubles as the in-memory form for MDF 3 conversions: the v3
//! parser maps its fixed parameter layouts into `cc_val` and stores its
//! embedded text tables in `inline_texts` (MDF 4 keeps texts behind
//! `cc_ref` links instead).

use byteorder::{ByteOrder, LittleEndian};

use crate::blocks::common::{read_u16, validate_buffer_size, BlockHeader, BlockParse, BlockProperty};
use crate::error::MdfError;

use super::types::ConversionType;

/// cc_flags bit 1: physical range limits are present.
pub const CC_FLAG_RANGE_VALID: u16 = 0x02;

#[derive(Debug, Clone)]
pub struct ConversionBlock {
    pub header: BlockHeader,

    // Link section
    pub cc_tx_name: Option<u64>,
    pub cc_md_unit: Option<u64>,
    pub cc_md_comment: Option<u64>,
    pub cc_cc_inverse: Option<u64>,
    /// Table links: text blocks or nested conversions.
    pub cc_ref: Vec<u64>,

    // Data section
    pub cc_type: ConversionType,
    pub cc_precision: u8,
    pub cc_flags: u16,
    pub cc_ref_count: u16,
    pub cc_val_count: u16,
    pub cc_phy_range_min: Option<f64>,
    pub cc_phy_range_max: Option<f64>,
    pub cc_val: Vec<f64>,

    /// Resolved algebraic formula text.
    pub formula: Option<String>,
    /// MDF 3 only: table texts stored inline in the block instead of behind
    /// links. Indexed like `cc_ref`; the last entry is the default.
    pub inline_texts: Vec<String>,
}

impl BlockParse<'_> for ConversionBlock {
    const ID: &'static str = "##CC";

    fn from_bytes(bytes: &[u8]) -> Result<Self, MdfError> {
        let header = Self::parse_header(bytes)?;

        let fixed_links = 4usize;
        let total_links = header.links_nr as usize;
        let link_section = 24 + total_links * 8;
        validate_buffer_size(bytes, link_section + 8)?;

        let mut offset = 24;
        let link = |offset: &mut usize| {
            let value = LittleEndian::read_u64(&bytes[*offset..*offset + 8]);
            *offset += 8;
            if value == 0 { None } else { Some(value) }
        };
        let cc_tx_name = link(&mut offset);
        let cc_md_unit = link(&mut offset);
        let cc_md_comment = link(&mut offset);
        let cc_cc_inverse = link(&mut offset);

        let additional_links = total_links.saturating_sub(fixed_links);
        let mut cc_ref = Vec::with_capacity(additional_links);
        for _ in 0..additional_links {
            cc_ref.push(LittleEndian::read_u64(&bytes[offset..offset + 8]));
            offset += 8;
        }

        let cc_type = ConversionType::from_v4_u8(bytes[offset]);
        let cc_precision = bytes[offset + 1];
        let cc_flags = read_u16(bytes, offset + 2);
        let cc_ref_count = read_u16(bytes, offset + 4);
        let cc_val_count = read_u16(bytes, offset + 6);
        offset += 8;

        let (cc_phy_range_min, cc_phy_range_max) = if cc_flags & CC_FLAG_RANGE_VALID != 0 {
            validate_buffer_size(bytes, offset + 16)?;
            let min = LittleEndian::read_f64(&bytes[offset..offset + 8]);
            let max = LittleEndian::read_f64(&bytes[offset + 8..offset + 16]);
            offset += 16;
            (Some(min), Some(max))
        } else {
            (None, None)
        };

        validate_buffer_size(bytes, offset + cc_val_count as usize * 8)?;
        let mut cc_val = Vec::with_capacity(cc_val_count as usize);
        for _ in 0..cc_val_count {
            cc_val.push(LittleEndian::read_f64(&bytes[offset..offset + 8]));
            offset += 8;
        }

        Ok(Self {
            header,
            cc_tx_name,
            cc_md_unit,
            cc_md_comment,
            cc_cc_inverse,
            cc_ref,
            cc_type,
            cc_precision,
            cc_flags,
            cc_ref_count,
            cc_val_count,
            cc_phy_range_min,
            cc_phy_range_max,
            cc_val,
            formula: None,
            inline_texts: Vec::new(),
        })
    }
}

impl ConversionBlock {
    fn with_type(cc_type: ConversionType, cc_ref: Vec<u64>, cc_val: Vec<f64>) -> Self {
        let links_nr = 4 + cc_ref.len() as u64;
        let block_len = 24 + links_nr * 8 + 8 + cc_val.len() as u64 * 8;
        ConversionBlock {
            header: BlockHeader::new("##CC", block_len, links_nr),
            cc_tx_name: None,
            cc_md_unit: None,
            cc_md_comment: None,
            cc_cc_inverse: None,
            cc_ref_count: cc_ref.len() as u16,
            cc_val_count: cc_val.len() as u16,
            cc_ref,
            cc_type,
            cc_precision: 0,
            cc_flags: 0,
            cc_phy_range_min: None,
            cc_phy_range_max: None,
            cc_val,
            formula: None,
            inline_texts: Vec::new(),
        }
    }

    /// `y = offset + factor·x`
    pub fn linear(offset: f64, factor: f64) -> Self {
        Self::with_type(ConversionType::Linear, Vec::new(), vec![offset, factor])
    }

    /// Second-degree rational with the six numerator/denominator parameters.
    pub fn rational(params: [f64; 6]) -> Self {
        Self::with_type(ConversionType::Rational, Vec::new(), params.to_vec())
    }

    /// Algebraic conversion; the formula text link is filled when the block
    /// is written (`cc_ref[0]`).
    pub fn algebraic(formula: &str) -> Self {
        let mut block = Self::with_type(ConversionType::Algebraic, vec![0], Vec::new());
        block.formula = Some(String::from(formula));
        block
    }

    /// Interpolated table lookup over `[key, value]` pairs.
    pub fn table_interp(pairs: &[(f64, f64)]) -> Self {
        let vals = pairs.iter().flat_map(|&(k, v)| [k, v]).collect();
        Self::with_type(ConversionType::TableLookupInterp, Vec::new(), vals)
    }

    /// Exact table lookup over `[key, value]` pairs.
    pub fn table(pairs: &[(f64, f64)]) -> Self {
        let vals = pairs.iter().flat_map(|&(k, v)| [k, v]).collect();
        Self::with_type(ConversionType::TableLookupNoInterp, Vec::new(), vals)
    }

    /// Value-to-text table. Text links (one per key plus the default) are
    /// filled when the referenced TX blocks are written.
    pub fn value_to_text(keys: &[f64]) -> Self {
        Self::with_type(
            ConversionType::ValueToText,
            vec![0; keys.len() + 1],
            keys.to_vec(),
        )
    }

    /// Range-to-text table over `[lo, hi)` pairs plus a default link slot.
    pub fn value_range_to_text(ranges: &[(f64, f64)]) -> Self {
        let vals = ranges.iter().flat_map(|&(lo, hi)| [lo, hi]).collect();
        Self::with_type(
            ConversionType::RangeToText,
            vec![0; ranges.len() + 1],
            vals,
        )
    }

    pub fn is_identity(&self) -> bool {
        matches!(
            self.cc_type,
            ConversionType::Identity | ConversionType::NoConversion
        ) || (self.cc_type == ConversionType::Linear
            && self.cc_val.len() >= 2
            && self.cc_val[0] == 0.0
            && self.cc_val[1] == 1.0)
    }

    /// Serialize to the MDF 4 CC layout.
    pub fn to_bytes(&self) -> Result<Vec<u8>, MdfError> {
        if self.header.id != "##CC" {
            return Err(MdfError::BlockSerializationError(format!(
                "ConversionBlock must have ID '##CC', found '{}'",
                self.header.id
            )));
        }

        let links_nr = 4 + self.cc_ref.len() as u64;
        let range_bytes = if self.cc_flags & CC_FLAG_RANGE_VALID != 0 { 16 } else { 0 };
        let block_len = 24 + links_nr * 8 + 8 + range_bytes + self.cc_val.len() as u64 * 8;

        let mut buf = Vec::with_capacity(block_len as usize);
        let mut header = self.header.clone();
        header.block_len = block_len;
        header.links_nr = links_nr;
        buf.extend_from_slice(&header.to_bytes()?);
        buf.extend_from_slice(&self.cc_tx_name.unwrap_or(0).to_le_bytes());
        buf.extend_from_slice(&self.cc_md_unit.unwrap_or(0).to_le_bytes());
        buf.extend_from_slice(&self.cc_md_comment.unwrap_or(0).to_le_bytes());
        buf.extend_from_slice(&self.cc_cc_inverse.unwrap_or(0).to_le_bytes());
        for link in &self.cc_ref {
            buf.extend_from_slice(&link.to_le_bytes());
        }
        buf.push(self.cc_type.to_v4_u8());
        buf.push(self.cc_precision);
        buf.extend_from_slice(&self.cc_flags.to_le_bytes());
        buf.extend_from_slice(&(self.cc_ref.len() as u16).to_le_bytes());
        buf.extend_from_slice(&(self.cc_val.len() as u16).to_le_bytes());
        if self.cc_flags & CC_FLAG_RANGE_VALID != 0 {
            buf.extend_from_slice(&self.cc_phy_range_min.unwrap_or(0.0).to_le_bytes());
            buf.extend_from_slice(&self.cc_phy_range_max.unwrap_or(0.0).to_le_bytes());
        }
        for val in &self.cc_val {
            buf.extend_from_slice(&val.to_le_bytes());
        }

        if buf.len() as u64 != block_len {
            return Err(MdfError::BlockSerializationError(format!(
                "ConversionBlock length mismatch: computed {} wrote {}",
                block_len,
                buf.len()
            )));
        }
        Ok(buf)
    }

    pub fn block_properties(&self) -> Vec<BlockProperty> {
        vec![
            BlockProperty::new("Conversion Type", format!("{:?}", self.cc_type)),
            BlockProperty::new("Parameters", self.cc_val.len()),
            BlockProperty::new("References", self.cc_ref.len()),
            BlockProperty::new(
                "Formula",
                self.formula.clone().unwrap_or_else(|| String::from("-")),
            ),
        ]
    }
}
