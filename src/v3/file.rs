//! Mdf3File: memory-mapped parse of a version 3 block tree into the
//! shared in-memory model, so the record codec and observers work on both
//! file flavors.

use memmap2::Mmap;
use std::fs::File;

use log::warn;

use crate::blocks::channel_group_block::ChannelGroupBlock;
use crate::blocks::common::BlockHeader;
use crate::blocks::data_group_block::DataGroupBlock;
use crate::blocks::identification_block::{ByteOrder, IdentificationBlock};
use crate::error::MdfError;
use crate::parsing::raw_channel::RawChannel;
use crate::parsing::raw_channel_group::RawChannelGroup;
use crate::parsing::raw_data_group::RawDataGroup;
use crate::v3::channel_block::Cn3Block;
use crate::v3::channel_group_block::Cg3Block;
use crate::v3::data_group_block::Dg3Block;
use crate::v3::header_block::Hd3Block;

#[derive(Debug)]
pub struct Mdf3File {
    pub identification: IdentificationBlock,
    pub header: Hd3Block,
    pub data_groups: Vec<RawDataGroup>,
    pub mmap: Mmap,
}

impl Mdf3File {
    pub fn parse_from_file(path: &str) -> Result<Self, MdfError> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        let identification = IdentificationBlock::from_bytes(&mmap[0..64.min(mmap.len())])?;
        if identification.is_mdf4() {
            return Err(MdfError::InvalidVersionString(format!(
                "not a version 3 file: {}",
                identification.version_number
            )));
        }
        let big_endian = identification.default_byte_order() == ByteOrder::BigEndian;

        let header = Hd3Block::read(&mmap, big_endian)?;
        let data_groups = Self::read_data_groups(&mmap, &header, big_endian)?;

        Ok(Mdf3File {
            identification,
            header,
            data_groups,
            mmap,
        })
    }

    fn read_data_groups(
        mmap: &[u8],
        header: &Hd3Block,
        big_endian: bool,
    ) -> Result<Vec<RawDataGroup>, MdfError> {
        let mut data_groups = Vec::new();
        let mut dg_addr = header.first_dg_addr;

        while dg_addr != 0 {
            let dg3 = Dg3Block::read(mmap, dg_addr, big_endian)?;
            let next_dg_addr = dg3.next_dg_addr;

            let mut rec_id_len = dg3.nof_record_ids.min(1) as u8;
            if dg3.nof_record_ids > 2 {
                warn!(
                    "unsupported record-id count {}, reading as 1",
                    dg3.nof_record_ids
                );
                rec_id_len = 1;
            }
            // A trailing record id (count 2) rides along as one extra
            // payload byte per record.
            let trailing_id = if dg3.nof_record_ids == 2 { 1u32 } else { 0 };

            let mut channel_groups = Vec::new();
            let mut total_payload = 0u64;
            let mut cg_addr = dg3.first_cg_addr;
            while cg_addr != 0 {
                let cg3 = Cg3Block::read(mmap, cg_addr, big_endian)?;
                let next_cg_addr = cg3.next_cg_addr;

                let mut raw_channels = Vec::new();
                let mut cn_addr = cg3.first_cn_addr;
                while cn_addr != 0 {
                    let cn3 = Cn3Block::read(mmap, cn_addr, big_endian)?;
                    let next_cn_addr = cn3.next_cn_addr;
                    let block = cn3.into_channel_block(mmap, big_endian)?;
                    raw_channels.push(RawChannel {
                        block,
                        address: cn_addr as u64,
                    });
                    cn_addr = next_cn_addr;
                }

                let record_len = cg3.record_size as u32 + trailing_id;
                total_payload +=
                    cg3.nof_records as u64 * (rec_id_len as u64 + record_len as u64);

                let block = ChannelGroupBlock {
                    header: BlockHeader::new("##CG", 104, 6),
                    next_cg_addr: next_cg_addr as u64,
                    first_ch_addr: cg3.first_cn_addr as u64,
                    acq_name_addr: 0,
                    acq_source_addr: 0,
                    first_sample_reduction_addr: cg3.first_sr_addr as u64,
                    comment_addr: 0,
                    record_id: cg3.record_id as u64,
                    cycles_nr: cg3.nof_records as u64,
                    flags: 0,
                    path_separator: 0,
                    samples_byte_nr: record_len,
                    invalidation_bytes_nr: 0,
                };
                channel_groups.push(RawChannelGroup {
                    block,
                    raw_channels,
                    address: cg_addr as u64,
                });
                cg_addr = next_cg_addr;
            }

            // v3 record data has no block header; clamp the computed span
            // to the file so truncated files read partially.
            let span_start = dg3.data_addr as u64;
            let available = (mmap.len() as u64).saturating_sub(span_start);
            let span_len = total_payload.min(available);
            if span_len < total_payload {
                warn!(
                    "data group truncated: expected {} payload bytes, file holds {}",
                    total_payload, span_len
                );
            }

            let block = DataGroupBlock {
                header: BlockHeader::new("##DG", 64, 4),
                next_dg_addr: next_dg_addr as u64,
                first_cg_addr: dg3.first_cg_addr as u64,
                data_block_addr: dg3.data_addr as u64,
                comment_addr: 0,
                record_id_len: rec_id_len,
            };
            data_groups.push(RawDataGroup {
                block,
                channel_groups,
                raw_span: (dg3.data_addr != 0).then_some((span_start, span_len)),
            });
            dg_addr = next_dg_addr;
        }
        Ok(data_groups)
    }
}
