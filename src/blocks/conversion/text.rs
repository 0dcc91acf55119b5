//! Text table conversions: value→text, range→text, text→value, text→text.
//!
//! Table entries reference either TX blocks (plain text) or nested CC
//! blocks (scale conversions); nested application is depth-guarded by the
//! dispatcher. MDF 3 text tables store their strings inline in the block,
//! carried here through `inline_texts`.

use crate::blocks::common::{read_string_block, BlockHeader, BlockParse};
use crate::blocks::conversion::base::ConversionBlock;
use crate::blocks::conversion::linear::extract_numeric;
use crate::error::MdfError;
use crate::parsing::decoder::DecodedValue;

/// Given `cc_val = [lo0, hi0, lo1, hi1, …]`, return the first index whose
/// half-open range `[lo, hi)` contains `raw`, or `n` (the default index).
pub fn find_range_to_text_index(cc_val: &[f64], raw: f64) -> usize {
    let len = cc_val.len();
    if len < 2 || len % 2 != 0 {
        return 0;
    }
    let n = len / 2;
    for i in 0..n {
        if raw >= cc_val[2 * i] && raw < cc_val[2 * i + 1] {
            return i;
        }
    }
    n
}

/// Resolve table entry `idx` to a decoded value: inline text (MDF 3),
/// TX text, or a nested conversion applied to `value`.
fn resolve_table_entry(
    block: &ConversionBlock,
    idx: usize,
    value: DecodedValue,
    file_data: &[u8],
    depth: usize,
) -> Result<DecodedValue, MdfError> {
    if !block.inline_texts.is_empty() {
        return Ok(match block.inline_texts.get(idx) {
            Some(text) => DecodedValue::String(text.clone()),
            None => DecodedValue::Unknown,
        });
    }

    let link = *block.cc_ref.get(idx).unwrap_or(&0);
    if link == 0 {
        return Ok(DecodedValue::Unknown);
    }
    let off = link as usize;
    if off + 24 > file_data.len() {
        return Ok(DecodedValue::Unknown);
    }
    let hdr = BlockHeader::from_bytes(&file_data[off..off + 24])?;
    if hdr.id == "##TX" || hdr.id == "##MD" {
        return match read_string_block(file_data, link)? {
            Some(txt) => Ok(DecodedValue::String(txt)),
            None => Ok(DecodedValue::Unknown),
        };
    }
    if hdr.id == "##CC" {
        let mut nested = ConversionBlock::from_bytes(&file_data[off..])?;
        let _ = nested.resolve_formula(file_data);
        return nested.apply_decoded_depth(value, file_data, depth + 1);
    }
    Ok(DecodedValue::Unknown)
}

pub fn apply_value_to_text(
    block: &ConversionBlock,
    value: DecodedValue,
    file_data: &[u8],
    depth: usize,
) -> Result<DecodedValue, MdfError> {
    let raw = match extract_numeric(&value) {
        Some(x) => x,
        None => return Ok(value),
    };
    let key_count = block.cc_val.len();
    let idx = block
        .cc_val
        .iter()
        .position(|&k| k == raw)
        .unwrap_or(key_count);
    resolve_table_entry(block, idx, value, file_data, depth)
}

pub fn apply_range_to_text(
    block: &ConversionBlock,
    value: DecodedValue,
    file_data: &[u8],
    depth: usize,
) -> Result<DecodedValue, MdfError> {
    let raw = match extract_numeric(&value) {
        Some(x) => x,
        None => return Ok(value),
    };
    let idx = find_range_to_text_index(&block.cc_val, raw);
    resolve_table_entry(block, idx, value, file_data, depth)
}

pub fn apply_text_to_value(
    block: &ConversionBlock,
    value: DecodedValue,
    file_data: &[u8],
) -> Result<DecodedValue, MdfError> {
    let input = match value {
        DecodedValue::String(s) => s,
        other => return Ok(other),
    };

    if !block.inline_texts.is_empty() {
        let n = block.inline_texts.len();
        for (i, key) in block.inline_texts.iter().enumerate() {
            if *key == input && i < block.cc_val.len() {
                return Ok(DecodedValue::Float(block.cc_val[i]));
            }
        }
        return Ok(match block.cc_val.get(n) {
            Some(default) => DecodedValue::Float(*default),
            None => DecodedValue::Unknown,
        });
    }

    let n = block.cc_ref.len();
    for i in 0..n {
        let link = block.cc_ref[i];
        if link == 0 {
            continue;
        }
        if let Some(key_str) = read_string_block(file_data, link)? {
            if input == key_str {
                return if i < block.cc_val.len() {
                    Ok(DecodedValue::Float(block.cc_val[i]))
                } else {
                    Ok(DecodedValue::Unknown)
                };
            }
        }
    }
    if block.cc_val.len() > n {
        Ok(DecodedValue::Float(block.cc_val[n]))
    } else {
        Ok(DecodedValue::Unknown)
    }
}

pub fn apply_text_to_text(
    block: &ConversionBlock,
    value: DecodedValue,
    file_data: &[u8],
) -> Result<DecodedValue, MdfError> {
    let input = match value {
        DecodedValue::String(s) => s,
        other => return Ok(other),
    };
    let pairs = block.cc_ref.len().saturating_sub(1) / 2;
    for i in 0..pairs {
        let key_link = block.cc_ref[2 * i];
        let output_link = block.cc_ref[2 * i + 1];
        if let Some(key_str) = read_string_block(file_data, key_link)? {
            if key_str == input {
                return if output_link == 0 {
                    Ok(DecodedValue::String(input))
                } else {
                    Ok(read_string_block(file_data, output_link)?
                        .map(DecodedValue::String)
                        .unwrap_or(DecodedValue::String(input)))
                };
            }
        }
    }
    let default_link = *block.cc_ref.get(2 * pairs).unwrap_or(&0);
    if default_link == 0 {
        Ok(DecodedValue::String(input))
    } else {
        Ok(read_string_block(file_data, default_link)?
            .map(DecodedValue::String)
            .unwrap_or(DecodedValue::String(input)))
    }
}
