//! CN block, version 3, mapped onto the shared [`ChannelBlock`] form.

use crate::blocks::channel_block::{ChannelBlock, ChannelType, SyncType};
use crate::blocks::common::{BlockHeader, DataType};
use crate::blocks::conversion::ConversionType;
use crate::error::MdfError;
use crate::helper;
use crate::v3::block::BlockHeader3;
use crate::v3::conversion_block::Cc3Block;
use crate::v3::text_block::read_text_block;
use crate::v3::V3Cursor;

/// v3.3 CN block size with long/display name links and the extra offset.
pub const CN3_BLOCK_SIZE: u16 = 228;

#[derive(Debug, Clone)]
pub struct Cn3Block {
    pub next_cn_addr: u32,
    pub conversion_addr: u32,
    pub source_addr: u32,
    pub dependency_addr: u32,
    pub comment_addr: u32,
    pub channel_type: u16,
    pub short_name: String,
    pub description: String,
    /// Bit position within the record, modulo the additional byte offset.
    pub start_offset: u16,
    pub nof_bits: u16,
    pub signal_type: u16,
    pub range_valid: bool,
    pub min: f64,
    pub max: f64,
    pub sample_rate: f64,
    pub long_name_addr: u32,
    pub display_name_addr: u32,
    /// Additional byte offset prepended to `start_offset` (v3.0+).
    pub byte_offset: u16,
}

impl Cn3Block {
    pub fn read(mmap: &[u8], address: u32, big_endian: bool) -> Result<Self, MdfError> {
        let mut cursor = V3Cursor::new(&mmap[address as usize..], big_endian);
        let header = BlockHeader3::read(&mut cursor, "CN")?;

        let next_cn_addr = cursor.u32()?;
        let conversion_addr = cursor.u32()?;
        let source_addr = cursor.u32()?;
        let dependency_addr = cursor.u32()?;
        let comment_addr = cursor.u32()?;
        let channel_type = cursor.u16()?;
        let short_name = cursor.str(32)?;
        let description = cursor.str(128)?;
        let start_offset = cursor.u16()?;
        let nof_bits = cursor.u16()?;
        let signal_type = cursor.u16()?;
        let range_valid = cursor.u16()? != 0;
        let min = cursor.f64()?;
        let max = cursor.f64()?;
        let sample_rate = cursor.f64()?;

        // Later fields exist from v2.1 on; older blocks stop short.
        let size = header.block_size as usize;
        let long_name_addr = if cursor.position() + 4 <= size { cursor.u32()? } else { 0 };
        let display_name_addr = if cursor.position() + 4 <= size { cursor.u32()? } else { 0 };
        let byte_offset = if cursor.position() + 2 <= size { cursor.u16()? } else { 0 };

        Ok(Cn3Block {
            next_cn_addr,
            conversion_addr,
            source_addr,
            dependency_addr,
            comment_addr,
            channel_type,
            short_name,
            description,
            start_offset,
            nof_bits,
            signal_type,
            range_valid,
            min,
            max,
            sample_rate,
            long_name_addr,
            display_name_addr,
            byte_offset,
        })
    }

    /// Map the v3 signal type to the shared [`DataType`], taking the file
    /// byte order into account for the order-agnostic codes.
    fn data_type(&self, big_endian: bool, conversion: Option<&ConversionType>) -> DataType {
        match self.signal_type {
            0 => {
                if big_endian {
                    DataType::UnsignedIntegerBE
                } else {
                    DataType::UnsignedIntegerLE
                }
            }
            1 => {
                if big_endian {
                    DataType::SignedIntegerBE
                } else {
                    DataType::SignedIntegerLE
                }
            }
            2..=6 => {
                if big_endian {
                    DataType::FloatBE
                } else {
                    DataType::FloatLE
                }
            }
            7 => DataType::StringLatin1,
            8 => match conversion {
                Some(ConversionType::DateConversion) => DataType::CanOpenDate,
                Some(ConversionType::TimeConversion) => DataType::CanOpenTime,
                _ => DataType::ByteArray,
            },
            9 => DataType::UnsignedIntegerBE,
            10 => DataType::SignedIntegerBE,
            11 | 12 => DataType::FloatBE,
            13 => DataType::UnsignedIntegerLE,
            14 => DataType::SignedIntegerLE,
            15 | 16 => DataType::FloatLE,
            _ => {
                if big_endian {
                    DataType::UnsignedIntegerBE
                } else {
                    DataType::UnsignedIntegerLE
                }
            }
        }
    }

    /// Convert into the shared channel form, resolving names, unit and
    /// conversion from their v3 storage.
    pub fn into_channel_block(
        self,
        mmap: &[u8],
        big_endian: bool,
    ) -> Result<ChannelBlock, MdfError> {
        let conversion = if self.conversion_addr != 0 {
            Some(Cc3Block::read(mmap, self.conversion_addr, big_endian)?)
        } else {
            None
        };

        let long_name = read_text_block(mmap, self.long_name_addr, big_endian, "TX")?;
        let name = match long_name {
            Some(name) if !name.is_empty() => name,
            _ => self.short_name.clone(),
        };

        let total_bits = self.byte_offset as u32 * 8 + self.start_offset as u32;
        let cc_type = conversion.as_ref().map(|cc| cc.conversion.cc_type);
        let data_type = self.data_type(big_endian, cc_type.as_ref());

        let (channel_type, sync_type) = if self.channel_type == 1 {
            (ChannelType::Master, SyncType::Time)
        } else {
            (ChannelType::FixedLength, SyncType::None)
        };

        Ok(ChannelBlock {
            header: BlockHeader::new("##CN", 160, 8),
            next_ch_addr: self.next_cn_addr as u64,
            // v3 dependency/source/comment blocks use v3-only layouts; the
            // mapped form resolves what it carries and clears the rest so
            // nothing downstream misparses them as v4 blocks.
            component_addr: 0,
            name_addr: 0,
            source_addr: 0,
            conversion_addr: 0,
            data: 0,
            unit_addr: 0,
            comment_addr: 0,
            channel_type,
            sync_type,
            data_type,
            bit_offset: (total_bits % 8) as u8,
            byte_offset: total_bits / 8,
            bit_count: self.nof_bits as u32,
            flags: 0,
            pos_invalidation_bit: 0,
            precision: 0,
            attachment_nr: 0,
            min_raw_value: self.min,
            max_raw_value: self.max,
            lower_limit: if self.range_valid { self.min } else { 0.0 },
            upper_limit: if self.range_valid { self.max } else { 0.0 },
            lower_ext_limit: 0.0,
            upper_ext_limit: 0.0,
            name: Some(name),
            unit: conversion.as_ref().and_then(|cc| {
                if cc.unit.is_empty() {
                    None
                } else {
                    Some(cc.unit.clone())
                }
            }),
            conversion: conversion.map(|cc| cc.conversion),
        })
    }

    /// Serialize a v3 CN block (always the full v3.3 layout, little
    /// endian). `name` goes to the fixed short-name field.
    pub fn to_bytes(&self) -> Vec<u8> {
        let header = BlockHeader3::new("CN", CN3_BLOCK_SIZE);
        let mut bytes = header.to_bytes();
        bytes.extend_from_slice(&self.next_cn_addr.to_le_bytes());
        bytes.extend_from_slice(&self.conversion_addr.to_le_bytes());
        bytes.extend_from_slice(&self.source_addr.to_le_bytes());
        bytes.extend_from_slice(&self.dependency_addr.to_le_bytes());
        bytes.extend_from_slice(&self.comment_addr.to_le_bytes());
        bytes.extend_from_slice(&self.channel_type.to_le_bytes());
        bytes.extend_from_slice(&helper::fixed_string_bytes(&self.short_name, 32, 0));
        bytes.extend_from_slice(&helper::fixed_string_bytes(&self.description, 128, 0));
        bytes.extend_from_slice(&self.start_offset.to_le_bytes());
        bytes.extend_from_slice(&self.nof_bits.to_le_bytes());
        bytes.extend_from_slice(&self.signal_type.to_le_bytes());
        bytes.extend_from_slice(&(self.range_valid as u16).to_le_bytes());
        bytes.extend_from_slice(&self.min.to_le_bytes());
        bytes.extend_from_slice(&self.max.to_le_bytes());
        bytes.extend_from_slice(&self.sample_rate.to_le_bytes());
        bytes.extend_from_slice(&self.long_name_addr.to_le_bytes());
        bytes.extend_from_slice(&self.display_name_addr.to_le_bytes());
        bytes.extend_from_slice(&self.byte_offset.to_le_bytes());
        bytes
    }
}

impl Default for Cn3Block {
    fn default() -> Self {
        Cn3Block {
            next_cn_addr: 0,
            conversion_addr: 0,
            source_addr: 0,
            dependency_addr: 0,
            comment_addr: 0,
            channel_type: 0,
            short_name: String::new(),
            description: String::new(),
            start_offset: 0,
            nof_bits: 0,
            signal_type: 0,
            range_valid: false,
            min: 0.0,
            max: 0.0,
            sample_rate: 0.0,
            long_name_addr: 0,
            display_name_addr: 0,
            byte_offset: 0,
        }
    }
}
