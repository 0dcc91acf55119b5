use crate::api::channel::Channel;
use crate::blocks::common::read_string_block;
use crate::error::MdfError;
use crate::parsing::raw_channel_group::RawChannelGroup;
use crate::parsing::raw_data_group::RawDataGroup;
use crate::parsing::source_info::SourceInfo;

/// A high-level ChannelGroup exposing metadata and lazy [`Channel`]s.
pub struct ChannelGroup<'a> {
    raw_data_group: &'a RawDataGroup,
    raw_channel_group: &'a RawChannelGroup,
    mmap: &'a [u8],
}

impl<'a> ChannelGroup<'a> {
    pub fn new(
        raw_data_group: &'a RawDataGroup,
        raw_channel_group: &'a RawChannelGroup,
        mmap: &'a [u8],
    ) -> Self {
        ChannelGroup {
            raw_data_group,
            raw_channel_group,
            mmap,
        }
    }

    pub fn name(&self) -> Result<Option<String>, MdfError> {
        read_string_block(self.mmap, self.raw_channel_group.block.acq_name_addr)
    }

    pub fn comment(&self) -> Result<Option<String>, MdfError> {
        read_string_block(self.mmap, self.raw_channel_group.block.comment_addr)
    }

    /// The acquisition source for this group, if present.
    pub fn source(&self) -> Result<Option<SourceInfo>, MdfError> {
        SourceInfo::from_mmap(self.mmap, self.raw_channel_group.block.acq_source_addr)
    }

    /// Declared number of records.
    pub fn cycle_count(&self) -> u64 {
        self.raw_channel_group.block.cycles_nr
    }

    pub fn record_id(&self) -> u64 {
        self.raw_channel_group.block.record_id
    }

    /// Build all [`Channel`]s of this group; nothing is decoded yet.
    pub fn channels(&self) -> Vec<Channel<'a>> {
        self.raw_channel_group
            .raw_channels
            .iter()
            .map(|raw_channel| {
                Channel::new(
                    &raw_channel.block,
                    self.raw_data_group,
                    self.raw_channel_group,
                    raw_channel,
                    self.mmap,
                )
            })
            .collect()
    }
}
