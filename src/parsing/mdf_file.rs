//! Mdf4File: memory-mapped parse of the MDF 4 block tree.

use memmap2::Mmap;
use std::fs::File;

use crate::blocks::attachment_block::AttachmentBlock;
use crate::blocks::channel_group_block::ChannelGroupBlock;
use crate::blocks::common::{validate_buffer_size, BlockParse};
use crate::blocks::data_group_block::DataGroupBlock;
use crate::blocks::event_block::EventBlock;
use crate::blocks::header_block::HeaderBlock;
use crate::blocks::identification_block::IdentificationBlock;
use crate::blocks::sample_reduction_block::SampleReductionBlock;
use crate::error::MdfError;
use crate::parsing::raw_channel::RawChannel;
use crate::parsing::raw_channel_group::RawChannelGroup;
use crate::parsing::raw_data_group::RawDataGroup;

#[derive(Debug)]
pub struct Mdf4File {
    pub identification: IdentificationBlock,
    pub header: HeaderBlock,
    pub data_groups: Vec<RawDataGroup>,
    pub attachments: Vec<AttachmentBlock>,
    pub events: Vec<EventBlock>,
    pub sample_reductions: Vec<SampleReductionBlock>,
    // The mmap outlives every borrowed block slice.
    pub mmap: Mmap,
}

impl Mdf4File {
    /// Parse an MDF 4 file: identification, header, and the full DG/CG/CN
    /// tree including attachments and events (everything but record data).
    pub fn parse_from_file(path: &str) -> Result<Self, MdfError> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        let identification = IdentificationBlock::from_bytes(&mmap[0..64.min(mmap.len())])?;
        validate_buffer_size(&mmap, 64 + 104)?;
        let header = HeaderBlock::from_bytes(&mmap[64..64 + 104])?;

        let data_groups = Self::read_data_groups(&mmap, &header)?;
        let attachments = Self::read_attachments(&mmap, &header)?;
        let events = Self::read_events(&mmap, &header)?;
        let sample_reductions = Self::read_sample_reductions(&mmap, &data_groups)?;

        Ok(Self {
            identification,
            header,
            data_groups,
            attachments,
            events,
            sample_reductions,
            mmap,
        })
    }

    /// Walk the DG chain and, per DG, the CG chain with all channels.
    pub(crate) fn read_data_groups(
        mmap: &[u8],
        header: &HeaderBlock,
    ) -> Result<Vec<RawDataGroup>, MdfError> {
        let mut data_groups = Vec::new();
        let mut dg_addr = header.first_dg_addr;
        while dg_addr != 0 {
            let dg_offset = dg_addr as usize;
            validate_buffer_size(mmap, dg_offset + 64)?;
            let data_group_block = DataGroupBlock::from_bytes(&mmap[dg_offset..])?;
            let next_dg_addr = data_group_block.next_dg_addr;

            let mut next_cg_addr = data_group_block.first_cg_addr;
            let mut raw_channel_groups = Vec::new();
            while next_cg_addr != 0 {
                let cg_address = next_cg_addr;
                let offset = next_cg_addr as usize;
                validate_buffer_size(mmap, offset + 104)?;
                let channel_group_block = ChannelGroupBlock::from_bytes(&mmap[offset..])?;
                next_cg_addr = channel_group_block.next_cg_addr;

                let mut channels = channel_group_block.read_channels(mmap)?;
                for (_, channel) in &mut channels {
                    channel.resolve_name(mmap)?;
                }

                raw_channel_groups.push(RawChannelGroup {
                    block: channel_group_block,
                    raw_channels: channels
                        .into_iter()
                        .map(|(address, block)| RawChannel { block, address })
                        .collect(),
                    address: cg_address,
                });
            }

            data_groups.push(RawDataGroup {
                block: data_group_block,
                channel_groups: raw_channel_groups,
                raw_span: None,
            });
            dg_addr = next_dg_addr;
        }
        Ok(data_groups)
    }

    pub(crate) fn read_attachments(
        mmap: &[u8],
        header: &HeaderBlock,
    ) -> Result<Vec<AttachmentBlock>, MdfError> {
        let mut attachments = Vec::new();
        let mut at_addr = header.first_attachment_addr;
        while at_addr != 0 {
            let offset = at_addr as usize;
            validate_buffer_size(mmap, offset + 96)?;
            let mut at = AttachmentBlock::from_bytes(&mmap[offset..])?;
            // The payload accessor needs the block's own file offset.
            at.address = at_addr;
            at_addr = at.next_at_addr;
            attachments.push(at);
        }
        Ok(attachments)
    }

    pub(crate) fn read_events(
        mmap: &[u8],
        header: &HeaderBlock,
    ) -> Result<Vec<EventBlock>, MdfError> {
        let mut events = Vec::new();
        let mut ev_addr = header.first_event_addr;
        while ev_addr != 0 {
            let offset = ev_addr as usize;
            validate_buffer_size(mmap, offset + 24)?;
            let ev = EventBlock::from_bytes(&mmap[offset..])?;
            ev_addr = ev.next_ev_addr;
            events.push(ev);
        }
        Ok(events)
    }

    fn read_sample_reductions(
        mmap: &[u8],
        data_groups: &[RawDataGroup],
    ) -> Result<Vec<SampleReductionBlock>, MdfError> {
        let mut reductions = Vec::new();
        for dg in data_groups {
            for cg in &dg.channel_groups {
                let mut sr_addr = cg.block.first_sample_reduction_addr;
                while sr_addr != 0 {
                    let offset = sr_addr as usize;
                    validate_buffer_size(mmap, offset + 64)?;
                    let sr = SampleReductionBlock::from_bytes(&mmap[offset..])?;
                    sr_addr = sr.next_sr_addr;
                    reductions.push(sr);
                }
            }
        }
        Ok(reductions)
    }

    /// Extract an attachment's payload (embedded data only; referenced
    /// files stay external by design).
    pub fn read_attachment_data(&self, index: usize) -> Result<Option<Vec<u8>>, MdfError> {
        let at = match self.attachments.get(index) {
            Some(at) => at,
            None => return Ok(None),
        };
        at.embedded_data(&self.mmap)
    }
}
