//! Block registry: tag-dispatched parsing over every known MDF 4 block
//! kind, with an opaque fallback for tags this crate does not model.

use std::collections::HashSet;

use crate::blocks::attachment_block::AttachmentBlock;
use crate::blocks::channel_block::ChannelBlock;
use crate::blocks::channel_group_block::ChannelGroupBlock;
use crate::blocks::common::{
    u64_to_usize, validate_buffer_size, BlockHeader, BlockParse, BlockProperty,
};
use crate::blocks::conversion::ConversionBlock;
use crate::blocks::data_block::{DataBlock, RAW_DATA_TAGS};
use crate::blocks::data_group_block::DataGroupBlock;
use crate::blocks::data_list_block::{parse_ld_block, DataListBlock};
use crate::blocks::dz_block::DzBlock;
use crate::blocks::event_block::EventBlock;
use crate::blocks::header_block::HeaderBlock;
use crate::blocks::header_list_block::HeaderListBlock;
use crate::blocks::metadata_block::MetadataBlock;
use crate::blocks::sample_reduction_block::SampleReductionBlock;
use crate::blocks::signal_data_block::SignalDataBlock;
use crate::blocks::source_block::SourceBlock;
use crate::blocks::text_block::TextBlock;
use crate::error::MdfError;

/// A parsed block of any known kind. Payload-bearing variants borrow from
/// the memory map instead of copying.
pub enum Block<'a> {
    Header(HeaderBlock),
    Text(TextBlock),
    Metadata(MetadataBlock),
    DataGroup(DataGroupBlock),
    ChannelGroup(ChannelGroupBlock),
    Channel(ChannelBlock),
    Conversion(ConversionBlock),
    Source(SourceBlock),
    Attachment(AttachmentBlock),
    Event(EventBlock),
    Data(DataBlock<'a>),
    CompressedData(DzBlock<'a>),
    DataList(DataListBlock),
    HeaderList(HeaderListBlock),
    SignalData(SignalDataBlock<'a>),
    SampleReduction(SampleReductionBlock),
    /// Unrecognized tag: header plus raw payload.
    Opaque { header: BlockHeader, payload: &'a [u8] },
}

impl<'a> Block<'a> {
    /// Seek to `offset`, read the header, dispatch by tag and fully parse
    /// the block.
    pub fn parse_at(mmap: &'a [u8], offset: u64) -> Result<Block<'a>, MdfError> {
        let pos = u64_to_usize(offset, "block offset")?;
        validate_buffer_size(mmap, pos + 24)?;
        let bytes = &mmap[pos..];
        let header = BlockHeader::from_bytes(&bytes[0..24])?;

        let tag = header.id.clone();
        let block = match tag.as_str() {
            "##HD" => Block::Header(HeaderBlock::from_bytes(bytes)?),
            "##TX" => Block::Text(TextBlock::from_bytes(bytes)?),
            "##MD" => Block::Metadata(MetadataBlock::from_bytes(bytes)?),
            "##DG" => Block::DataGroup(DataGroupBlock::from_bytes(bytes)?),
            "##CG" => Block::ChannelGroup(ChannelGroupBlock::from_bytes(bytes)?),
            "##CN" => Block::Channel(ChannelBlock::from_bytes(bytes)?),
            "##CC" => Block::Conversion(ConversionBlock::from_bytes(bytes)?),
            "##SI" => Block::Source(SourceBlock::from_bytes(bytes)?),
            "##AT" => Block::Attachment(AttachmentBlock::from_bytes(bytes)?),
            "##EV" => Block::Event(EventBlock::from_bytes(bytes)?),
            "##DZ" => Block::CompressedData(DzBlock::from_bytes(bytes)?),
            "##DL" => Block::DataList(DataListBlock::from_bytes(bytes)?),
            "##LD" => Block::DataList(parse_ld_block(bytes)?),
            "##HL" => Block::HeaderList(HeaderListBlock::from_bytes(bytes)?),
            "##SD" => Block::SignalData(SignalDataBlock::from_bytes(bytes)?),
            "##SR" => Block::SampleReduction(SampleReductionBlock::from_bytes(bytes)?),
            tag if RAW_DATA_TAGS.contains(&tag) => Block::Data(DataBlock::from_raw_bytes(bytes)?),
            other if other.starts_with("##") => {
                let len = (header.block_len as usize).max(24);
                validate_buffer_size(bytes, len)?;
                Block::Opaque {
                    payload: &bytes[24..len],
                    header,
                }
            }
            _ => {
                return Err(MdfError::UnknownBlock {
                    tag: tag.clone(),
                    offset,
                })
            }
        };
        Ok(block)
    }

    /// Offsets of the blocks this block owns, in traversal order.
    pub fn child_links(&self) -> Vec<u64> {
        let links = match self {
            Block::Header(hd) => vec![
                hd.first_dg_addr,
                hd.file_history_addr,
                hd.channel_tree_addr,
                hd.first_attachment_addr,
                hd.first_event_addr,
                hd.comment_addr,
            ],
            Block::DataGroup(dg) => vec![
                dg.next_dg_addr,
                dg.first_cg_addr,
                dg.data_block_addr,
                dg.comment_addr,
            ],
            Block::ChannelGroup(cg) => vec![
                cg.next_cg_addr,
                cg.first_ch_addr,
                cg.acq_name_addr,
                cg.acq_source_addr,
                cg.first_sample_reduction_addr,
                cg.comment_addr,
            ],
            Block::Channel(cn) => vec![
                cn.next_ch_addr,
                cn.component_addr,
                cn.name_addr,
                cn.source_addr,
                cn.conversion_addr,
                cn.data,
                cn.unit_addr,
                cn.comment_addr,
            ],
            Block::Conversion(cc) => {
                let mut links = vec![
                    cc.cc_tx_name.unwrap_or(0),
                    cc.cc_md_unit.unwrap_or(0),
                    cc.cc_md_comment.unwrap_or(0),
                    cc.cc_cc_inverse.unwrap_or(0),
                ];
                links.extend_from_slice(&cc.cc_ref);
                links
            }
            Block::Source(si) => vec![si.name_addr, si.path_addr, si.comment_addr],
            Block::Attachment(at) => vec![
                at.next_at_addr,
                at.file_name_addr,
                at.mime_type_addr,
                at.comment_addr,
            ],
            Block::Event(ev) => vec![
                ev.next_ev_addr,
                ev.parent_ev_addr,
                ev.range_ev_addr,
                ev.name_addr,
                ev.comment_addr,
            ],
            Block::DataList(dl) => {
                let mut links = vec![dl.next];
                links.extend_from_slice(&dl.data_links);
                links
            }
            Block::HeaderList(hl) => vec![hl.first_dl_addr],
            Block::SampleReduction(sr) => vec![sr.next_sr_addr, sr.data_addr],
            Block::Text(_)
            | Block::Metadata(_)
            | Block::Data(_)
            | Block::CompressedData(_)
            | Block::SignalData(_)
            | Block::Opaque { .. } => Vec::new(),
        };
        links.into_iter().filter(|&addr| addr != 0).collect()
    }

    /// The common header of the parsed block.
    pub fn header(&self) -> BlockHeader {
        match self {
            Block::Header(b) => b.header.clone(),
            Block::Text(b) => b.header.clone(),
            Block::Metadata(b) => b.header.clone(),
            Block::DataGroup(b) => b.header.clone(),
            Block::ChannelGroup(b) => b.header.clone(),
            Block::Channel(b) => b.header.clone(),
            Block::Conversion(b) => b.header.clone(),
            Block::Source(b) => b.header.clone(),
            Block::Attachment(b) => b.header.clone(),
            Block::Event(b) => b.header.clone(),
            Block::Data(b) => b.header.clone(),
            Block::CompressedData(b) => b.header.clone(),
            Block::DataList(b) => b.header.clone(),
            Block::HeaderList(b) => b.header.clone(),
            Block::SignalData(b) => b.header.clone(),
            Block::SampleReduction(b) => b.header.clone(),
            Block::Opaque { header, .. } => header.clone(),
        }
    }

    /// Key/value list describing the block, for inspection tooling.
    pub fn block_properties(&self) -> Vec<BlockProperty> {
        let mut props = vec![
            BlockProperty::new("Type", self.header().id),
            BlockProperty::new("Length", self.header().block_len),
        ];
        let specific = match self {
            Block::Header(b) => b.block_properties(),
            Block::DataGroup(b) => b.block_properties(),
            Block::ChannelGroup(b) => b.block_properties(),
            Block::Channel(b) => b.block_properties(),
            Block::Conversion(b) => b.block_properties(),
            Block::Source(b) => b.block_properties(),
            Block::Attachment(b) => b.block_properties(),
            Block::Event(b) => b.block_properties(),
            Block::CompressedData(b) => b.block_properties(),
            Block::DataList(b) => b.block_properties(),
            Block::HeaderList(b) => b.block_properties(),
            Block::SampleReduction(b) => b.block_properties(),
            Block::Text(b) => vec![BlockProperty::new("Text", b.text.clone())],
            Block::Metadata(b) => vec![BlockProperty::new("XML Bytes", b.xml.len())],
            Block::Data(b) => vec![BlockProperty::new("Payload Bytes", b.data.len())],
            Block::SignalData(b) => vec![BlockProperty::new("Payload Bytes", b.data.len())],
            Block::Opaque { payload, .. } => {
                vec![BlockProperty::new("Payload Bytes", payload.len())]
            }
        };
        props.extend(specific);
        props
    }

    /// JSON rendering of [`Self::block_properties`].
    pub fn properties_json(&self) -> String {
        serde_json::to_string(&self.block_properties()).unwrap_or_else(|_| String::from("[]"))
    }
}

/// Depth-first search through owned children starting at `root_offset`,
/// returning the parsed block at `target_offset` if it is reachable.
/// Already-visited offsets are skipped so link cycles cannot loop.
pub fn find<'a>(
    mmap: &'a [u8],
    root_offset: u64,
    target_offset: u64,
) -> Result<Option<Block<'a>>, MdfError> {
    let mut visited: HashSet<u64> = HashSet::new();
    let mut stack = vec![root_offset];

    while let Some(offset) = stack.pop() {
        if offset == 0 || !visited.insert(offset) {
            continue;
        }
        let block = Block::parse_at(mmap, offset)?;
        if offset == target_offset {
            return Ok(Some(block));
        }
        // Push in reverse so the first child is explored first.
        let mut children = block.child_links();
        children.reverse();
        stack.extend(children);
    }
    Ok(None)
}
