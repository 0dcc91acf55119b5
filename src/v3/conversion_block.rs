//! CC block, version 3, mapped onto the shared [`ConversionBlock`] form.
//!
//! v3 keeps parameters and table texts inline in the block: text tables
//! carry `char[32]` strings, text range tables carry TX links that are
//! resolved eagerly here. Range tables store their default as entry 0; the
//! shared engine expects the default last, so entries are reordered on the
//! way in.

use crate::blocks::common::BlockHeader;
use crate::blocks::conversion::{ConversionBlock, ConversionType};
use crate::error::MdfError;
use crate::v3::block::BlockHeader3;
use crate::v3::text_block::read_text_block;
use crate::v3::V3Cursor;

#[derive(Debug, Clone)]
pub struct Cc3Block {
    pub range_valid: bool,
    pub min: f64,
    pub max: f64,
    pub unit: String,
    pub conversion: ConversionBlock,
}

impl Cc3Block {
    pub fn read(mmap: &[u8], address: u32, big_endian: bool) -> Result<Self, MdfError> {
        let mut cursor = V3Cursor::new(&mmap[address as usize..], big_endian);
        let header = BlockHeader3::read(&mut cursor, "CC")?;

        let range_valid = cursor.u16()? != 0;
        let min = cursor.f64()?;
        let max = cursor.f64()?;
        let unit = cursor.str(20)?;
        let type_raw = cursor.u16()?;
        let cc_type = ConversionType::from_v3_u16(type_raw);
        let nof_values = if cursor.position() < header.block_size as usize {
            cursor.u16()?
        } else {
            0
        };

        let mut cc_val = Vec::new();
        let mut inline_texts = Vec::new();
        let mut formula = None;

        if nof_values > 0 {
            match cc_type {
                ConversionType::Linear
                | ConversionType::Polynomial
                | ConversionType::Exponential
                | ConversionType::Logarithmic
                | ConversionType::Rational => {
                    for _ in 0..nof_values {
                        cc_val.push(cursor.f64()?);
                    }
                }
                ConversionType::TableLookupInterp | ConversionType::TableLookupNoInterp => {
                    for _ in 0..nof_values {
                        cc_val.push(cursor.f64()?);
                        cc_val.push(cursor.f64()?);
                    }
                }
                ConversionType::Algebraic => {
                    formula = Some(cursor.str(nof_values as usize)?);
                }
                ConversionType::ValueToText => {
                    for _ in 0..nof_values {
                        cc_val.push(cursor.f64()?);
                        inline_texts.push(cursor.str(32)?);
                    }
                }
                ConversionType::RangeToText => {
                    // Entry 0 holds the default text with an undefined range.
                    let mut entries = Vec::with_capacity(nof_values as usize);
                    for _ in 0..nof_values {
                        let lower = cursor.f64()?;
                        let upper = cursor.f64()?;
                        let link = cursor.u32()?;
                        let text = read_text_block(mmap, link, big_endian, "TX")?
                            .unwrap_or_default();
                        entries.push((lower, upper, text));
                    }
                    let default_text = entries
                        .first()
                        .map(|(_, _, text)| text.clone())
                        .unwrap_or_default();
                    for (lower, upper, text) in entries.into_iter().skip(1) {
                        cc_val.push(lower);
                        cc_val.push(upper);
                        inline_texts.push(text);
                    }
                    inline_texts.push(default_text);
                }
                _ => {}
            }
        }

        let conversion = ConversionBlock {
            header: BlockHeader::new("##CC", 0, 0),
            cc_tx_name: None,
            cc_md_unit: None,
            cc_md_comment: None,
            cc_cc_inverse: None,
            cc_ref: Vec::new(),
            cc_type,
            cc_precision: 0,
            cc_flags: 0,
            cc_ref_count: inline_texts.len() as u16,
            cc_val_count: cc_val.len() as u16,
            cc_phy_range_min: range_valid.then_some(min),
            cc_phy_range_max: range_valid.then_some(max),
            cc_val,
            formula,
            inline_texts,
        };

        Ok(Cc3Block {
            range_valid,
            min,
            max,
            unit,
            conversion,
        })
    }

    /// Serialize a minimal v3 CC block (linear or unit-only identity).
    pub fn to_bytes(&self) -> Vec<u8> {
        let params: &[f64] = match self.conversion.cc_type {
            ConversionType::Linear => &self.conversion.cc_val,
            _ => &[],
        };
        let type_raw = self.conversion.cc_type.to_v3_u16();
        let block_size = (4 + 2 + 8 + 8 + 20 + 2 + 2 + params.len() * 8) as u16;
        let header = BlockHeader3::new("CC", block_size);

        let mut bytes = header.to_bytes();
        bytes.extend_from_slice(&(self.range_valid as u16).to_le_bytes());
        bytes.extend_from_slice(&self.min.to_le_bytes());
        bytes.extend_from_slice(&self.max.to_le_bytes());
        bytes.extend_from_slice(&crate::helper::fixed_string_bytes(&self.unit, 20, 0));
        bytes.extend_from_slice(&type_raw.to_le_bytes());
        bytes.extend_from_slice(&(params.len() as u16).to_le_bytes());
        for param in params {
            bytes.extend_from_slice(&param.to_le_bytes());
        }
        bytes
    }
}
