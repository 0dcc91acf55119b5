//! High level handle for a single channel within a group.

use crate::blocks::channel_block::{ChannelBlock, ChannelType};
use crate::blocks::common::read_string_block;
use crate::error::MdfError;
use crate::parsing::decoder::{
    decode_channel_value, decode_channel_value_with_validity, DecodedChannelValue, DecodedValue,
};
use crate::parsing::raw_channel::RawChannel;
use crate::parsing::raw_channel_group::RawChannelGroup;
use crate::parsing::raw_data_group::RawDataGroup;
use crate::parsing::source_info::SourceInfo;

/// Holds references to the raw blocks and decodes values on demand.
pub struct Channel<'a> {
    block: &'a ChannelBlock,
    raw_data_group: &'a RawDataGroup,
    raw_channel_group: &'a RawChannelGroup,
    raw_channel: &'a RawChannel,
    mmap: &'a [u8],
}

impl<'a> Channel<'a> {
    pub fn new(
        block: &'a ChannelBlock,
        raw_data_group: &'a RawDataGroup,
        raw_channel_group: &'a RawChannelGroup,
        raw_channel: &'a RawChannel,
        mmap: &'a [u8],
    ) -> Self {
        Channel {
            block,
            raw_data_group,
            raw_channel_group,
            raw_channel,
            mmap,
        }
    }

    pub fn name(&self) -> Result<Option<String>, MdfError> {
        if let Some(name) = &self.block.name {
            return Ok(Some(name.clone()));
        }
        read_string_block(self.mmap, self.block.name_addr)
    }

    pub fn unit(&self) -> Result<Option<String>, MdfError> {
        if let Some(unit) = &self.block.unit {
            return Ok(Some(unit.clone()));
        }
        read_string_block(self.mmap, self.block.unit_addr)
    }

    pub fn comment(&self) -> Result<Option<String>, MdfError> {
        read_string_block(self.mmap, self.block.comment_addr)
    }

    /// The acquisition source for this channel if available.
    pub fn source(&self) -> Result<Option<SourceInfo>, MdfError> {
        SourceInfo::from_mmap(self.mmap, self.block.source_addr)
    }

    pub fn is_master(&self) -> bool {
        self.block.channel_type.is_master()
    }

    pub fn block(&self) -> &ChannelBlock {
        self.block
    }

    /// Decode all raw samples of this channel, without conversion.
    pub fn raw_values(&self) -> Result<Vec<DecodedChannelValue>, MdfError> {
        let record_id_len = self.raw_data_group.block.record_id_len as usize;
        let data_bytes = self.raw_channel_group.block.samples_byte_nr;
        let mut out = Vec::new();

        if self.block.channel_type == ChannelType::VariableLength {
            return self.vlsd_values(record_id_len);
        }

        // MaxLength channels carry a fixed-width buffer truncated per
        // record by a companion length channel.
        let length_channel = if self.block.channel_type == ChannelType::MaxLength {
            self.raw_channel_group
                .raw_channels
                .iter()
                .find(|ch| ch.address == self.block.data)
                .map(|ch| &ch.block)
        } else {
            None
        };

        for record in self
            .raw_channel
            .fixed_records(self.raw_data_group, self.raw_channel_group, self.mmap)?
        {
            let mut decoded =
                decode_channel_value_with_validity(&record, record_id_len, data_bytes, self.block)
                    .unwrap_or(DecodedChannelValue {
                        value: DecodedValue::Unknown,
                        is_valid: false,
                    });
            if let (Some(length_channel), DecodedValue::ByteArray(bytes)) =
                (length_channel, &mut decoded.value)
            {
                if let Some(DecodedValue::UnsignedInteger(len)) =
                    decode_channel_value(&record, record_id_len, length_channel)
                {
                    bytes.truncate(len as usize);
                }
            }
            out.push(decoded);
        }
        Ok(out)
    }

    /// Resolve variable-length samples, either from the channel's own
    /// signal-data stream (byte-offset indices) or from a sibling VLSD
    /// channel group (record-ordinal indices).
    fn vlsd_values(&self, record_id_len: usize) -> Result<Vec<DecodedChannelValue>, MdfError> {
        let index_channel = fixed_index_view(self.block);
        let fixed = self
            .raw_channel
            .fixed_records(self.raw_data_group, self.raw_channel_group, self.mmap)?;
        let mut out = Vec::with_capacity(fixed.len());

        if self.raw_channel.points_to_cg(self.mmap) {
            // VLSD-CG mode: collect the referenced group's records once,
            // then index them by ordinal.
            let vlsd_cg = self
                .raw_data_group
                .channel_groups
                .iter()
                .find(|cg| cg.address == self.block.data && cg.block.is_vlsd());
            let vlsd_cg = match vlsd_cg {
                Some(cg) => cg,
                None => return Ok(Vec::new()),
            };
            let vlsd_rec_id_len = self.raw_data_group.block.record_id_len as usize;
            let records = self
                .raw_channel
                .fixed_records(self.raw_data_group, vlsd_cg, self.mmap)?;

            for record in &fixed {
                let ordinal = match decode_channel_value(record, record_id_len, &index_channel) {
                    Some(DecodedValue::UnsignedInteger(i)) => i as usize,
                    _ => continue,
                };
                let value = match records.get(ordinal) {
                    Some(vlsd_record) => {
                        // VLSD records carry `[rec_id][u32 len][bytes]`.
                        let payload = &vlsd_record[vlsd_rec_id_len + 4..];
                        decode_channel_value(payload, 0, self.block)
                            .unwrap_or(DecodedValue::Unknown)
                    }
                    None => DecodedValue::Unknown,
                };
                out.push(DecodedChannelValue {
                    value,
                    is_valid: true,
                });
            }
            return Ok(out);
        }

        let stream = match self.raw_channel.signal_data(self.mmap)? {
            Some(stream) => stream,
            None => return Ok(Vec::new()),
        };
        for record in &fixed {
            let index = match decode_channel_value(record, record_id_len, &index_channel) {
                Some(DecodedValue::UnsignedInteger(index)) => index,
                _ => continue,
            };
            let payload = self.raw_channel.vlsd_value(&stream, index)?;
            let value =
                decode_channel_value(payload, 0, self.block).unwrap_or(DecodedValue::Unknown);
            out.push(DecodedChannelValue {
                value,
                is_valid: true,
            });
        }
        Ok(out)
    }

    /// Decode and convert all samples of this channel.
    pub fn values(&self) -> Result<Vec<DecodedValue>, MdfError> {
        let raw = self.raw_values()?;
        let mut out = Vec::with_capacity(raw.len());
        for decoded in raw {
            out.push(
                self.block
                    .apply_conversion_value(decoded.value, self.mmap)?,
            );
        }
        Ok(out)
    }
}

/// View a VLSD channel's fixed record slot as the u64 index it stores.
pub(crate) fn fixed_index_view(block: &ChannelBlock) -> ChannelBlock {
    ChannelBlock {
        channel_type: ChannelType::FixedLength,
        data_type: crate::blocks::common::DataType::UnsignedIntegerLE,
        bit_count: 64,
        bit_offset: 0,
        data: 0,
        conversion: None,
        name: block.name.clone(),
        ..block.clone()
    }
}
