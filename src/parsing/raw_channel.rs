//! Per-channel access to raw record bytes, fixed-length or VLSD.

use std::borrow::Cow;

use crate::blocks::channel_block::{ChannelBlock, ChannelType};
use crate::blocks::common::{validate_buffer_size, BlockHeader};
use crate::blocks::signal_data_block::value_at_offset;
use crate::error::MdfError;
use crate::parsing::raw_channel_group::RawChannelGroup;
use crate::parsing::raw_data_group::{assemble_data_chain, RawDataGroup};

/// A channel with lazy access to its raw record bytes.
#[derive(Debug)]
pub struct RawChannel {
    pub block: ChannelBlock,
    /// File offset of the CN block, used to resolve companion references
    /// (MaxLength length channels, VLSD group links).
    pub address: u64,
}

impl RawChannel {
    /// True when this channel stores variable-length data behind a data
    /// link; [`Self::points_to_cg`] distinguishes the VLSD-CG mode.
    pub fn has_signal_data(&self) -> bool {
        self.block.channel_type == ChannelType::VariableLength && self.block.data != 0
    }

    /// True when the data link of this VLSD channel targets a CG block: the
    /// stored indices are then record ordinals into that group.
    pub fn points_to_cg(&self, mmap: &[u8]) -> bool {
        if self.block.channel_type != ChannelType::VariableLength || self.block.data == 0 {
            return false;
        }
        let offset = self.block.data as usize;
        if offset + 24 > mmap.len() {
            return false;
        }
        matches!(
            BlockHeader::from_bytes(&mmap[offset..offset + 24]),
            Ok(header) if header.id == "##CG"
        )
    }

    /// Assemble this channel's signal-data chain into one logical stream.
    pub fn signal_data<'a>(&self, mmap: &'a [u8]) -> Result<Option<Cow<'a, [u8]>>, MdfError> {
        if self.block.channel_type != ChannelType::VariableLength || self.block.data == 0 {
            return Ok(None);
        }
        Ok(Some(assemble_data_chain(mmap, self.block.data)?))
    }

    /// Iterate this channel's fixed-size records: `record_size` slices of
    /// the owning group's logical payload. VLSD payload resolution happens
    /// on top of these via [`Self::vlsd_value`].
    pub fn fixed_records<'a>(
        &self,
        data_group: &RawDataGroup,
        channel_group: &RawChannelGroup,
        mmap: &'a [u8],
    ) -> Result<Vec<Cow<'a, [u8]>>, MdfError> {
        let record_size = data_group.record_size_for(channel_group);
        if record_size == 0 {
            return Ok(Vec::new());
        }
        let payload = data_group.payload(mmap)?;

        match payload {
            Cow::Borrowed(bytes) => Ok(select_records(bytes, data_group, channel_group)?
                .into_iter()
                .map(|range| Cow::Borrowed(&bytes[range]))
                .collect()),
            Cow::Owned(bytes) => Ok(select_records(&bytes, data_group, channel_group)?
                .into_iter()
                .map(|range| Cow::Owned(bytes[range].to_vec()))
                .collect()),
        }
    }

    /// Resolve one VLSD value by the index stored in a fixed record.
    pub fn vlsd_value<'a>(&self, stream: &'a [u8], index: u64) -> Result<&'a [u8], MdfError> {
        value_at_offset(stream, index)
    }
}

/// Byte ranges of the records belonging to `channel_group` within the
/// logical payload. With a record-id prefix the payload interleaves the
/// records of every group in the DG; records of other groups are skipped
/// by their own width (VLSD groups by their inline `u32` length).
fn select_records(
    bytes: &[u8],
    data_group: &RawDataGroup,
    channel_group: &RawChannelGroup,
) -> Result<Vec<std::ops::Range<usize>>, MdfError> {
    let rec_id_len = data_group.block.record_id_len as usize;
    let mut ranges = Vec::new();

    if rec_id_len == 0 {
        let record_size = data_group.record_size_for(channel_group);
        let valid_len = (bytes.len() / record_size) * record_size;
        ranges.extend((0..valid_len / record_size).map(|i| i * record_size..(i + 1) * record_size));
        return Ok(ranges);
    }

    let target_id = channel_group.block.record_id;
    let mut pos = 0usize;
    while pos + rec_id_len <= bytes.len() {
        let record_id = read_record_id(&bytes[pos..], rec_id_len);
        let group = data_group
            .channel_groups
            .iter()
            .find(|cg| cg.block.record_id == record_id);
        let group = match group {
            Some(group) => group,
            // A record id with no matching group ends the scan; the caller
            // keeps whatever was decoded so far.
            None => break,
        };

        let body_len = if group.block.is_vlsd() {
            if pos + rec_id_len + 4 > bytes.len() {
                break;
            }
            let len = u32::from_le_bytes(
                bytes[pos + rec_id_len..pos + rec_id_len + 4].try_into().unwrap(),
            ) as usize;
            4 + len
        } else {
            group.block.record_len()
        };
        let end = pos + rec_id_len + body_len;
        if end > bytes.len() {
            break;
        }
        if record_id == target_id {
            ranges.push(pos..end);
        }
        pos = end;
    }
    Ok(ranges)
}

/// Read a little-endian record id of 1, 2, 4 or 8 bytes.
pub fn read_record_id(bytes: &[u8], rec_id_len: usize) -> u64 {
    match rec_id_len {
        1 => bytes[0] as u64,
        2 => u16::from_le_bytes(bytes[0..2].try_into().unwrap()) as u64,
        4 => u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as u64,
        8 => u64::from_le_bytes(bytes[0..8].try_into().unwrap()),
        _ => 0,
    }
}

/// Split an SD-style stream (`[u32 length][bytes]`*) into its values.
pub fn split_vlsd_stream(stream: &[u8]) -> Result<Vec<&[u8]>, MdfError> {
    let mut values = Vec::new();
    let mut pos = 0usize;
    while pos + 4 <= stream.len() {
        let len = u32::from_le_bytes(stream[pos..pos + 4].try_into().unwrap()) as usize;
        let start = pos + 4;
        let end = start + len;
        validate_buffer_size(stream, end)?;
        values.push(&stream[start..end]);
        pos = end;
    }
    Ok(values)
}
