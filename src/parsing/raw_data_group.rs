//! Assembly of a data group's payload into one logical byte stream.
//!
//! A DG's data link may target a lone DT, a compressed DZ, a DL/HL list
//! tree, or the v4.2 LD split form. Reading presents all of these as a
//! single stream: a contiguous DT is exposed zero-copy, anything else is
//! spooled into an owned buffer in on-wire order.

use std::borrow::Cow;

use log::debug;

use crate::blocks::common::{u64_to_usize, validate_buffer_size, BlockHeader};
use crate::blocks::data_block::{DataBlock, RAW_DATA_TAGS};
use crate::blocks::data_list_block::{parse_ld_block, DataListBlock};
use crate::blocks::dz_block::DzBlock;
use crate::blocks::header_list_block::HeaderListBlock;
use crate::blocks::signal_data_block::SignalDataBlock;
use crate::blocks::common::BlockParse;
use crate::blocks::data_group_block::DataGroupBlock;
use crate::error::MdfError;
use crate::parsing::raw_channel_group::RawChannelGroup;

#[derive(Debug)]
pub struct RawDataGroup {
    pub block: DataGroupBlock,
    pub channel_groups: Vec<RawChannelGroup>,
    /// MDF 3 groups: record bytes sit at `(offset, length)` with no block
    /// header around them. `None` for MDF 4 groups.
    pub raw_span: Option<(u64, u64)>,
}

impl RawDataGroup {
    /// Materialize the group's payload as one logical stream.
    pub fn payload<'a>(&self, mmap: &'a [u8]) -> Result<Cow<'a, [u8]>, MdfError> {
        if let Some((offset, length)) = self.raw_span {
            let start = u64_to_usize(offset, "record span offset")?;
            let end = start + u64_to_usize(length, "record span length")?;
            validate_buffer_size(mmap, end)?;
            return Ok(Cow::Borrowed(&mmap[start..end]));
        }
        assemble_data_chain(mmap, self.block.data_block_addr)
    }

    /// Total record width including the record-id prefix, per channel group.
    pub fn record_size_for(&self, cg: &RawChannelGroup) -> usize {
        self.block.record_id_len as usize + cg.block.record_len()
    }
}

/// Walk a data chain rooted at `addr` and return the logical stream.
///
/// Used both for DG payloads and for a channel's VLSD signal data; the
/// chain grammar is the same (DT/SD/DZ leaf, DL/HL/LD interior).
pub fn assemble_data_chain<'a>(mmap: &'a [u8], addr: u64) -> Result<Cow<'a, [u8]>, MdfError> {
    if addr == 0 {
        return Ok(Cow::Borrowed(&[]));
    }

    let offset = u64_to_usize(addr, "data chain address")?;
    validate_buffer_size(mmap, offset + 24)?;
    let header = BlockHeader::from_bytes(&mmap[offset..offset + 24])?;

    match header.id.as_str() {
        // A lone raw data block is served in place, zero-copy.
        tag if RAW_DATA_TAGS.contains(&tag) => {
            let dt = DataBlock::from_raw_bytes(&mmap[offset..])?;
            Ok(Cow::Borrowed(dt.data))
        }
        "##SD" => {
            let sd = SignalDataBlock::from_bytes(&mmap[offset..])?;
            Ok(Cow::Borrowed(sd.data))
        }
        _ => {
            let mut spool = Vec::new();
            append_chain(mmap, addr, &mut spool)?;
            Ok(Cow::Owned(spool))
        }
    }
}

fn append_chain(mmap: &[u8], addr: u64, spool: &mut Vec<u8>) -> Result<(), MdfError> {
    if addr == 0 {
        return Ok(());
    }
    let offset = u64_to_usize(addr, "data chain address")?;
    validate_buffer_size(mmap, offset + 24)?;
    let header = BlockHeader::from_bytes(&mmap[offset..offset + 24])?;

    match header.id.as_str() {
        tag if RAW_DATA_TAGS.contains(&tag) => {
            let dt = DataBlock::from_raw_bytes(&mmap[offset..])?;
            spool.extend_from_slice(dt.data);
        }
        "##SD" => {
            let sd = SignalDataBlock::from_bytes(&mmap[offset..])?;
            spool.extend_from_slice(sd.data);
        }
        "##DZ" => {
            let dz = DzBlock::from_bytes(&mmap[offset..])?;
            spool.extend_from_slice(&dz.decompress()?);
        }
        "##HL" => {
            let hl = HeaderListBlock::from_bytes(&mmap[offset..])?;
            append_chain(mmap, hl.first_dl_addr, spool)?;
        }
        "##DL" | "##LD" => {
            let mut dl_addr = addr;
            while dl_addr != 0 {
                let dl_offset = u64_to_usize(dl_addr, "DL address")?;
                validate_buffer_size(mmap, dl_offset + 24)?;
                let dl_header = BlockHeader::from_bytes(&mmap[dl_offset..dl_offset + 24])?;
                let dl = if dl_header.id == "##LD" {
                    parse_ld_block(&mmap[dl_offset..])?
                } else {
                    DataListBlock::from_bytes(&mmap[dl_offset..])?
                };
                append_list_elements(mmap, &dl, spool)?;
                dl_addr = dl.next;
            }
        }
        other => {
            return Err(MdfError::UnknownBlock {
                tag: other.to_string(),
                offset: addr,
            })
        }
    }
    Ok(())
}

/// Append a DL's elements, honoring per-element offsets for sparse lists.
fn append_list_elements(
    mmap: &[u8],
    dl: &DataListBlock,
    spool: &mut Vec<u8>,
) -> Result<(), MdfError> {
    for (index, &link) in dl.data_links.iter().enumerate() {
        if link == 0 {
            continue;
        }
        if dl.equal_length.is_none() {
            let declared = dl.element_offset(index);
            // Elements must land at or after the current stream end;
            // overlapping offsets would double-cover the stream.
            if declared < spool.len() as u64 {
                return Err(MdfError::LengthMismatch {
                    context: "DL element offsets",
                    declared,
                    actual: spool.len() as u64,
                });
            }
            if declared > spool.len() as u64 {
                debug!(
                    "sparse DL element {}: padding {} bytes",
                    index,
                    declared - spool.len() as u64
                );
                spool.resize(declared as usize, 0);
            }
        }
        append_chain(mmap, link, spool)?;
    }
    Ok(())
}
