//! Bitfield text table: each entry masks the raw integer and feeds the
//! masked value to a nested conversion; resulting texts join with `|`.

use crate::blocks::common::{read_string_block, BlockHeader, BlockParse};
use crate::blocks::conversion::base::ConversionBlock;
use crate::error::MdfError;
use crate::parsing::decoder::DecodedValue;

pub fn apply_bitfield_text(
    block: &ConversionBlock,
    value: DecodedValue,
    file_data: &[u8],
    depth: usize,
) -> Result<DecodedValue, MdfError> {
    let raw = match value {
        DecodedValue::UnsignedInteger(u) => u,
        DecodedValue::SignedInteger(i) => i as u64,
        _ => return Ok(value),
    };

    let mut parts = Vec::new();
    for (i, &link_addr) in block.cc_ref.iter().enumerate() {
        if i >= block.cc_val.len() {
            break;
        }
        // The mask is a UINT64 stored in a REAL slot; reinterpret its bits.
        let mask = block.cc_val[i].to_bits();
        let masked = raw & mask;
        if link_addr == 0 {
            continue;
        }

        let off = link_addr as usize;
        if off + 24 > file_data.len() {
            continue;
        }
        let hdr = BlockHeader::from_bytes(&file_data[off..off + 24])?;
        if hdr.id != "##CC" {
            continue;
        }
        let mut nested = ConversionBlock::from_bytes(&file_data[off..])?;
        let _ = nested.resolve_formula(file_data);
        let decoded_masked = nested.apply_decoded_depth(
            DecodedValue::UnsignedInteger(masked),
            file_data,
            depth + 1,
        )?;
        if let DecodedValue::String(s) = decoded_masked {
            let part = match nested.cc_tx_name {
                Some(name_ptr) => match read_string_block(file_data, name_ptr)? {
                    Some(name) => format!("{} = {}", name, s),
                    None => s,
                },
                None => s,
            };
            parts.push(part);
        }
    }

    Ok(DecodedValue::String(parts.join("|")))
}
