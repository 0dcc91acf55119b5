//! High level representation of an opened MDF file, version 3 or 4.

use crate::api::channel_group::ChannelGroup;
use crate::blocks::attachment_block::AttachmentBlock;
use crate::error::MdfError;
use crate::parsing::mdf_file::Mdf4File;
use crate::parsing::raw_data_group::RawDataGroup;
use crate::v3::file::Mdf3File;

/// The concrete file flavor behind the common interface.
#[derive(Debug)]
pub enum MdfFile {
    V3(Mdf3File),
    V4(Mdf4File),
}

impl MdfFile {
    /// Open a file, dispatching on the version in the identification block.
    pub fn from_file(path: &str) -> Result<Self, MdfError> {
        use std::io::Read;
        let mut probe = [0u8; 64];
        std::fs::File::open(path)?.read_exact(&mut probe)?;
        let id = crate::blocks::identification_block::IdentificationBlock::from_bytes(&probe)?;

        if id.is_mdf4() {
            Ok(MdfFile::V4(Mdf4File::parse_from_file(path)?))
        } else {
            Ok(MdfFile::V3(Mdf3File::parse_from_file(path)?))
        }
    }

    pub fn version(&self) -> u16 {
        match self {
            MdfFile::V3(f) => f.identification.version_number,
            MdfFile::V4(f) => f.identification.version_number,
        }
    }

    pub fn program_id(&self) -> String {
        match self {
            MdfFile::V3(f) => f.identification.program_identifier.trim_end().to_string(),
            MdfFile::V4(f) => f.identification.program_identifier.trim_end().to_string(),
        }
    }

    pub fn is_mdf4(&self) -> bool {
        matches!(self, MdfFile::V4(_))
    }

    /// Measurement start time, nanoseconds since the Unix epoch.
    pub fn start_time_ns(&self) -> u64 {
        match self {
            MdfFile::V3(f) => f.header.abs_time,
            MdfFile::V4(f) => f.header.abs_time,
        }
    }

    pub fn data_groups(&self) -> &[RawDataGroup] {
        match self {
            MdfFile::V3(f) => &f.data_groups,
            MdfFile::V4(f) => &f.data_groups,
        }
    }

    /// Attachments (always empty for version 3 files).
    pub fn attachments(&self) -> &[AttachmentBlock] {
        match self {
            MdfFile::V3(_) => &[],
            MdfFile::V4(f) => &f.attachments,
        }
    }

    /// Key/value summary of the measurement header.
    pub fn header_properties(&self) -> Vec<crate::blocks::common::BlockProperty> {
        match self {
            MdfFile::V3(f) => f.header.block_properties(),
            MdfFile::V4(f) => f.header.block_properties(),
        }
    }

    pub fn mmap(&self) -> &[u8] {
        match self {
            MdfFile::V3(f) => &f.mmap[..],
            MdfFile::V4(f) => &f.mmap[..],
        }
    }
}

/// High level convenience wrapper: opens a file and exposes lazy
/// [`ChannelGroup`] views for inspection and decoding.
#[derive(Debug)]
pub struct MDF {
    raw: MdfFile,
}

impl MDF {
    /// Parse an MDF file (version 3 or 4) from disk.
    pub fn from_file(path: &str) -> Result<Self, MdfError> {
        Ok(MDF {
            raw: MdfFile::from_file(path)?,
        })
    }

    /// Retrieve channel groups contained in the file.
    ///
    /// Each [`ChannelGroup`] is created lazily and does not decode samples.
    pub fn channel_groups(&self) -> Vec<ChannelGroup<'_>> {
        let mut groups = Vec::new();
        for raw_data_group in self.raw.data_groups() {
            for raw_channel_group in &raw_data_group.channel_groups {
                groups.push(ChannelGroup::new(
                    raw_data_group,
                    raw_channel_group,
                    self.raw.mmap(),
                ));
            }
        }
        groups
    }

    /// The absolute start timestamp, or `None` when it was never set.
    pub fn start_time_ns(&self) -> Option<u64> {
        match self.raw.start_time_ns() {
            0 => None,
            time => Some(time),
        }
    }

    pub fn file(&self) -> &MdfFile {
        &self.raw
    }
}
