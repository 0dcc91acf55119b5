//! Record codec: bit-exact extraction and insertion of channel values.
//!
//! A record is `data_bytes` of payload followed by `invalid_bytes` of
//! invalidation bits, optionally prefixed by a record id the caller skips
//! via `record_id_size`. Aligned byte-multiple layouts take the fast copy
//! path; everything else goes through shift-and-mask with sign extension.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::blocks::channel_block::{ChannelBlock, ChannelType, CN_FLAG_ALL_INVALID, CN_FLAG_INVAL_BIT_VALID};
use crate::blocks::common::DataType;
use crate::error::MdfError;
use crate::helper;

/// An enum representing the decoded value of a channel sample.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    UnsignedInteger(u64),
    SignedInteger(i64),
    Float(f64),
    String(String),
    ByteArray(Vec<u8>),
    MimeSample(Vec<u8>),
    MimeStream(Vec<u8>),
    Unknown,
}

impl DecodedValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DecodedValue::UnsignedInteger(v) => Some(*v as f64),
            DecodedValue::SignedInteger(v) => Some(*v as f64),
            DecodedValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

/// Result of decoding a channel value, including validity status.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedChannelValue {
    pub value: DecodedValue,
    pub is_valid: bool,
}

/// Checks whether a channel value is valid based on invalidation bits.
///
/// - cn_flags bit 0 set: every value is invalid.
/// - cn_flags bits 0 and 1 both clear: every value is valid.
/// - Otherwise bit `pos_invalidation_bit` within the invalidation byte
///   range decides; a set bit marks the value invalid.
pub fn check_value_validity(
    record: &[u8],
    record_id_size: usize,
    cg_data_bytes: u32,
    channel: &ChannelBlock,
) -> bool {
    if channel.flags & CN_FLAG_ALL_INVALID != 0 {
        return false;
    }
    if channel.flags & (CN_FLAG_ALL_INVALID | CN_FLAG_INVAL_BIT_VALID) == 0 {
        return true;
    }

    let inval_byte_offset =
        record_id_size + cg_data_bytes as usize + (channel.pos_invalidation_bit >> 3) as usize;
    let inval_bit_index = (channel.pos_invalidation_bit & 0x07) as usize;

    if inval_byte_offset < record.len() {
        let inval_byte = record[inval_byte_offset];
        (inval_byte >> inval_bit_index) & 0x01 == 0
    } else {
        true
    }
}

/// Set or clear a channel's invalidation bit inside a staged record buffer.
pub fn set_invalidation_bit(
    record: &mut [u8],
    record_id_size: usize,
    cg_data_bytes: u32,
    channel: &ChannelBlock,
    valid: bool,
) {
    if channel.flags & CN_FLAG_INVAL_BIT_VALID == 0 {
        return;
    }
    let byte_offset =
        record_id_size + cg_data_bytes as usize + (channel.pos_invalidation_bit >> 3) as usize;
    let bit = (channel.pos_invalidation_bit & 0x07) as u8;
    if byte_offset < record.len() {
        if valid {
            record[byte_offset] &= !(1 << bit);
        } else {
            record[byte_offset] |= 1 << bit;
        }
    }
}

/// Decode a channel's sample from a record, without validity checking.
pub fn decode_channel_value(
    record: &[u8],
    record_id_size: usize,
    channel: &ChannelBlock,
) -> Option<DecodedValue> {
    decode_value_internal(record, record_id_size, channel)
}

/// Decode a channel's sample together with its invalidation state.
pub fn decode_channel_value_with_validity(
    record: &[u8],
    record_id_size: usize,
    cg_data_bytes: u32,
    channel: &ChannelBlock,
) -> Option<DecodedChannelValue> {
    let value = decode_value_internal(record, record_id_size, channel)?;
    let is_valid = check_value_validity(record, record_id_size, cg_data_bytes, channel);
    Some(DecodedChannelValue { value, is_valid })
}

/// Assemble the selected bytes honoring the declared endianness, then
/// shift out the bit offset and mask to the bit count. Works through u128
/// so a 64-bit value straddling nine bytes keeps its top bits.
fn extract_bits(slice: &[u8], big_endian: bool, bit_offset: usize, bit_count: usize) -> u64 {
    let raw = if big_endian {
        slice.iter().fold(0u128, |acc, &b| (acc << 8) | b as u128)
    } else {
        slice.iter().rev().fold(0u128, |acc, &b| (acc << 8) | b as u128)
    };
    let shifted = (raw >> bit_offset) as u64;
    if bit_count >= 64 {
        shifted
    } else {
        shifted & ((1u64 << bit_count) - 1)
    }
}

fn sign_extend(unsigned: u64, bit_count: usize) -> i64 {
    if bit_count == 0 || bit_count >= 64 {
        return unsigned as i64;
    }
    let sign_bit = 1u64 << (bit_count - 1);
    let mask = (1u64 << bit_count) - 1;
    if unsigned & sign_bit != 0 {
        (unsigned as i64) | !(mask as i64)
    } else {
        unsigned as i64
    }
}

fn decode_value_internal(
    record: &[u8],
    record_id_size: usize,
    channel: &ChannelBlock,
) -> Option<DecodedValue> {
    let base_offset = record_id_size + channel.byte_offset as usize;
    let bit_offset = channel.bit_offset as usize;
    let bit_count = channel.bit_count as usize;

    let slice: &[u8] = if channel.channel_type == ChannelType::VariableLength && channel.data != 0 {
        // VLSD: the caller already resolved the record to the payload bytes.
        record
    } else {
        let num_bytes = if matches!(
            channel.data_type,
            DataType::StringLatin1
                | DataType::StringUtf8
                | DataType::StringUtf16LE
                | DataType::StringUtf16BE
                | DataType::ByteArray
                | DataType::MimeSample
                | DataType::MimeStream
                | DataType::CanOpenDate
                | DataType::CanOpenTime
        ) {
            bit_count / 8
        } else {
            ((bit_offset + bit_count + 7) / 8).max(1)
        };

        if base_offset + num_bytes > record.len() {
            return None;
        }
        &record[base_offset..base_offset + num_bytes]
    };

    match &channel.data_type {
        DataType::UnsignedIntegerLE => Some(DecodedValue::UnsignedInteger(extract_bits(
            slice, false, bit_offset, bit_count,
        ))),
        DataType::UnsignedIntegerBE => Some(DecodedValue::UnsignedInteger(extract_bits(
            slice, true, bit_offset, bit_count,
        ))),
        DataType::SignedIntegerLE => {
            let unsigned = extract_bits(slice, false, bit_offset, bit_count);
            Some(DecodedValue::SignedInteger(sign_extend(unsigned, bit_count)))
        }
        DataType::SignedIntegerBE => {
            let unsigned = extract_bits(slice, true, bit_offset, bit_count);
            Some(DecodedValue::SignedInteger(sign_extend(unsigned, bit_count)))
        }
        DataType::FloatLE | DataType::FloatBE => {
            // Floats never straddle byte boundaries.
            if bit_offset != 0 {
                return None;
            }
            let big = channel.data_type.is_big_endian();
            let raw = extract_bits(slice, big, 0, bit_count);
            match bit_count {
                32 => Some(DecodedValue::Float(f32::from_bits(raw as u32) as f64)),
                64 => Some(DecodedValue::Float(f64::from_bits(raw))),
                _ => None,
            }
        }
        DataType::StringLatin1 => {
            let end = slice.iter().position(|&b| b == 0).unwrap_or(slice.len());
            Some(DecodedValue::String(helper::latin1_to_utf8(&slice[..end])))
        }
        DataType::StringUtf8 => match core::str::from_utf8(slice) {
            Ok(s) => Some(DecodedValue::String(s.trim_end_matches('\0').to_string())),
            Err(_) => Some(DecodedValue::String(String::from("<Invalid UTF8>"))),
        },
        DataType::StringUtf16LE | DataType::StringUtf16BE => {
            if slice.len() % 2 != 0 {
                return None;
            }
            let units: Vec<u16> = slice
                .chunks_exact(2)
                .map(|chunk| {
                    if channel.data_type == DataType::StringUtf16BE {
                        BigEndian::read_u16(chunk)
                    } else {
                        LittleEndian::read_u16(chunk)
                    }
                })
                .take_while(|&u| u != 0)
                .collect();
            Some(DecodedValue::String(helper::utf16_to_string(&units)))
        }
        DataType::CanOpenDate => {
            let array: &[u8; 7] = slice.get(0..7)?.try_into().ok()?;
            Some(DecodedValue::UnsignedInteger(helper::canopen_date_array_to_ns(array)))
        }
        DataType::CanOpenTime => {
            let array: &[u8; 6] = slice.get(0..6)?.try_into().ok()?;
            Some(DecodedValue::UnsignedInteger(helper::canopen_time_array_to_ns(array)))
        }
        DataType::ByteArray => Some(DecodedValue::ByteArray(slice.to_vec())),
        DataType::MimeSample => Some(DecodedValue::MimeSample(slice.to_vec())),
        DataType::MimeStream => Some(DecodedValue::MimeStream(slice.to_vec())),
        _ => Some(DecodedValue::Unknown),
    }
}

/// Insert an integer into the record honoring bit offset and count, leaving
/// neighboring bits untouched.
fn insert_bits(slice: &mut [u8], big_endian: bool, bit_offset: usize, bit_count: usize, value: u64) {
    let mask = if bit_count >= 64 {
        u64::MAX as u128
    } else {
        (1u128 << bit_count) - 1
    };
    let value = (value as u128 & mask) << bit_offset;
    let mask = mask << bit_offset;

    let existing = if big_endian {
        slice.iter().fold(0u128, |acc, &b| (acc << 8) | b as u128)
    } else {
        slice.iter().rev().fold(0u128, |acc, &b| (acc << 8) | b as u128)
    };
    let merged = (existing & !mask) | value;

    let n = slice.len();
    for (i, byte) in slice.iter_mut().enumerate() {
        let shift = if big_endian { (n - 1 - i) * 8 } else { i * 8 };
        *byte = (merged >> shift) as u8;
    }
}

/// Write a channel value into a staged record buffer (the inverse of
/// [`decode_channel_value`]). Fails when the value kind cannot be carried
/// by the channel's declared layout.
pub fn encode_channel_value(
    record: &mut [u8],
    record_id_size: usize,
    channel: &ChannelBlock,
    value: &DecodedValue,
) -> Result<(), MdfError> {
    let base_offset = record_id_size + channel.byte_offset as usize;
    let bit_offset = channel.bit_offset as usize;
    let bit_count = channel.bit_count as usize;
    let num_bytes = ((bit_offset + bit_count + 7) / 8).max(1);

    if base_offset + num_bytes > record.len() {
        return Err(MdfError::ShortRecord {
            expected: base_offset + num_bytes,
            actual: record.len(),
        });
    }
    let slice = &mut record[base_offset..base_offset + num_bytes];
    let big = channel.data_type.is_big_endian();

    match (&channel.data_type, value) {
        (DataType::UnsignedIntegerLE | DataType::UnsignedIntegerBE, DecodedValue::UnsignedInteger(v)) => {
            insert_bits(slice, big, bit_offset, bit_count, *v);
        }
        (DataType::SignedIntegerLE | DataType::SignedIntegerBE, DecodedValue::SignedInteger(v)) => {
            insert_bits(slice, big, bit_offset, bit_count, *v as u64);
        }
        (DataType::FloatLE | DataType::FloatBE, DecodedValue::Float(v)) => {
            if bit_offset != 0 {
                return Err(MdfError::InvalidBitLayout(
                    "float channels require bit offset 0".to_string(),
                ));
            }
            match bit_count {
                32 => insert_bits(slice, big, 0, 32, (*v as f32).to_bits() as u64),
                64 => insert_bits(slice, big, 0, 64, v.to_bits()),
                other => {
                    return Err(MdfError::InvalidBitLayout(format!(
                        "float channels must be 32 or 64 bits, got {}",
                        other
                    )))
                }
            }
        }
        (
            DataType::StringLatin1 | DataType::StringUtf8,
            DecodedValue::String(text),
        ) => {
            let width = bit_count / 8;
            let field = &mut slice[..width.min(num_bytes)];
            field.fill(0);
            let src = text.as_bytes();
            let n = src.len().min(field.len());
            field[..n].copy_from_slice(&src[..n]);
        }
        (
            DataType::ByteArray | DataType::MimeSample | DataType::MimeStream,
            DecodedValue::ByteArray(bytes)
            | DecodedValue::MimeSample(bytes)
            | DecodedValue::MimeStream(bytes),
        ) => {
            let width = bit_count / 8;
            let field = &mut slice[..width.min(num_bytes)];
            field.fill(0);
            let n = bytes.len().min(field.len());
            field[..n].copy_from_slice(&bytes[..n]);
        }
        (DataType::CanOpenDate, DecodedValue::UnsignedInteger(ns)) => {
            let array = helper::ns_to_canopen_date_array(*ns);
            slice[..7.min(num_bytes)].copy_from_slice(&array[..7.min(num_bytes)]);
        }
        (DataType::CanOpenTime, DecodedValue::UnsignedInteger(ns)) => {
            let array = helper::ns_to_canopen_time_array(*ns);
            slice[..6.min(num_bytes)].copy_from_slice(&array[..6.min(num_bytes)]);
        }
        (data_type, other) => {
            return Err(MdfError::Unrepresentable(format!(
                "{:?} cannot be stored in a {} channel",
                other, data_type
            )))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::common::BlockHeader;

    fn channel(data_type: DataType, byte_offset: u32, bit_offset: u8, bit_count: u32) -> ChannelBlock {
        ChannelBlock {
            header: BlockHeader::new("##CN", 160, 8),
            data_type,
            byte_offset,
            bit_offset,
            bit_count,
            ..Default::default()
        }
    }

    #[test]
    fn unaligned_unsigned_roundtrip() {
        let ch = channel(DataType::UnsignedIntegerLE, 1, 3, 11);
        let mut record = vec![0u8; 4];
        encode_channel_value(&mut record, 0, &ch, &DecodedValue::UnsignedInteger(0x5A5)).unwrap();
        assert_eq!(
            decode_channel_value(&record, 0, &ch),
            Some(DecodedValue::UnsignedInteger(0x5A5))
        );
    }

    #[test]
    fn signed_sign_extension() {
        let ch = channel(DataType::SignedIntegerLE, 0, 0, 12);
        let mut record = vec![0u8; 2];
        encode_channel_value(&mut record, 0, &ch, &DecodedValue::SignedInteger(-5)).unwrap();
        assert_eq!(
            decode_channel_value(&record, 0, &ch),
            Some(DecodedValue::SignedInteger(-5))
        );
    }

    #[test]
    fn big_endian_float() {
        let ch = channel(DataType::FloatBE, 0, 0, 32);
        let mut record = vec![0u8; 4];
        encode_channel_value(&mut record, 0, &ch, &DecodedValue::Float(1.5)).unwrap();
        assert_eq!(record, 1.5f32.to_be_bytes());
        assert_eq!(
            decode_channel_value(&record, 0, &ch),
            Some(DecodedValue::Float(1.5))
        );
    }

    #[test]
    fn insert_preserves_neighbors() {
        let ch = channel(DataType::UnsignedIntegerLE, 0, 2, 4);
        let mut record = vec![0xFFu8; 1];
        encode_channel_value(&mut record, 0, &ch, &DecodedValue::UnsignedInteger(0)).unwrap();
        assert_eq!(record[0], 0b1100_0011);
    }

    #[test]
    fn canopen_time_roundtrip_in_record() {
        let ch = channel(DataType::CanOpenTime, 2, 0, 48);
        let ns = 1_700_000_000_123_000_000u64;
        let mut record = vec![0u8; 8];
        encode_channel_value(&mut record, 0, &ch, &DecodedValue::UnsignedInteger(ns)).unwrap();
        assert_eq!(
            decode_channel_value(&record, 0, &ch),
            Some(DecodedValue::UnsignedInteger(ns))
        );
    }

    #[test]
    fn mismatched_value_kind_is_rejected() {
        let ch = channel(DataType::FloatLE, 0, 0, 32);
        let mut record = vec![0u8; 4];
        let err = encode_channel_value(
            &mut record,
            0,
            &ch,
            &DecodedValue::String(String::from("nope")),
        );
        assert!(matches!(err, Err(MdfError::Unrepresentable(_))));
    }
}
