//! HD block, version 3: fixed text fields plus an optional PR program
//! block (v4 keeps the same data as XML common properties instead).

use crate::blocks::common::BlockProperty;
use crate::error::MdfError;
use crate::helper;
use crate::v3::block::BlockHeader3;
use crate::v3::text_block::{read_text_block, text_block_bytes};
use crate::v3::V3Cursor;

/// Full v3.2+ HD block size including the 4 header bytes.
pub const HD3_BLOCK_SIZE: u16 = 208;

#[derive(Debug, Clone)]
pub struct Hd3Block {
    pub first_dg_addr: u32,
    pub comment_addr: u32,
    pub program_addr: u32,
    pub nof_dg_blocks: u16,
    pub date: String,
    pub time: String,
    pub author: String,
    pub organisation: String,
    pub project: String,
    pub subject: String,
    /// Nanoseconds since the Unix epoch (v3.2+; zero on older files).
    pub abs_time: u64,
    /// UTC offset in hours.
    pub utc_offset: i16,
    pub time_quality: u16,
    pub timer_id: String,
    /// Resolved comment text (TX link).
    pub comment: Option<String>,
    /// Resolved program block body (PR link).
    pub program_data: Option<String>,
}

impl Default for Hd3Block {
    fn default() -> Self {
        Hd3Block {
            first_dg_addr: 0,
            comment_addr: 0,
            program_addr: 0,
            nof_dg_blocks: 0,
            date: String::new(),
            time: String::new(),
            author: String::new(),
            organisation: String::new(),
            project: String::new(),
            subject: String::new(),
            abs_time: 0,
            utc_offset: 0,
            time_quality: 0,
            timer_id: String::from("Local PC Reference Time"),
            comment: None,
            program_data: None,
        }
    }
}

impl Hd3Block {
    /// Parse the HD block at byte 64 and resolve its TX/PR links.
    pub fn read(mmap: &[u8], big_endian: bool) -> Result<Self, MdfError> {
        let mut cursor = V3Cursor::new(&mmap[64..], big_endian);
        let header = BlockHeader3::read(&mut cursor, "HD")?;

        let first_dg_addr = cursor.u32()?;
        let comment_addr = cursor.u32()?;
        let program_addr = cursor.u32()?;
        let nof_dg_blocks = cursor.u16()?;
        let date = cursor.str(10)?;
        let time = cursor.str(8)?;
        let author = cursor.str(32)?;
        let organisation = cursor.str(32)?;
        let project = cursor.str(32)?;
        let subject = cursor.str(32)?;

        // Fields below exist from v3.2 on; older files stop at 164 bytes.
        let (abs_time, utc_offset, time_quality, timer_id) =
            if header.block_size >= HD3_BLOCK_SIZE {
                (
                    cursor.u64()?,
                    cursor.i16()?,
                    cursor.u16()?,
                    cursor.str(32)?,
                )
            } else {
                (0, 0, 0, String::new())
            };

        let comment = read_text_block(mmap, comment_addr, big_endian, "TX")?;
        let program_data = read_text_block(mmap, program_addr, big_endian, "PR")?;

        Ok(Hd3Block {
            first_dg_addr,
            comment_addr,
            program_addr,
            nof_dg_blocks,
            date,
            time,
            author,
            organisation,
            project,
            subject,
            abs_time,
            utc_offset,
            time_quality,
            timer_id,
            comment,
            program_data,
        })
    }

    /// Serialize the HD block (always the full v3.2 layout, little endian).
    pub fn to_bytes(&self) -> Result<Vec<u8>, MdfError> {
        let header = BlockHeader3::new("HD", HD3_BLOCK_SIZE);
        let mut bytes = header.to_bytes();
        bytes.extend_from_slice(&self.first_dg_addr.to_le_bytes());
        bytes.extend_from_slice(&self.comment_addr.to_le_bytes());
        bytes.extend_from_slice(&self.program_addr.to_le_bytes());
        bytes.extend_from_slice(&self.nof_dg_blocks.to_le_bytes());

        let date = if self.date.is_empty() {
            helper::ns_to_ddmmyyyy(self.abs_time)
        } else {
            self.date.clone()
        };
        let time = if self.time.is_empty() {
            helper::ns_to_hhmmss(self.abs_time)
        } else {
            self.time.clone()
        };
        bytes.extend_from_slice(&helper::fixed_string_bytes(&date, 10, 0));
        bytes.extend_from_slice(&helper::fixed_string_bytes(&time, 8, 0));
        bytes.extend_from_slice(&helper::fixed_string_bytes(&self.author, 32, 0));
        bytes.extend_from_slice(&helper::fixed_string_bytes(&self.organisation, 32, 0));
        bytes.extend_from_slice(&helper::fixed_string_bytes(&self.project, 32, 0));
        bytes.extend_from_slice(&helper::fixed_string_bytes(&self.subject, 32, 0));
        bytes.extend_from_slice(&self.abs_time.to_le_bytes());
        bytes.extend_from_slice(&self.utc_offset.to_le_bytes());
        bytes.extend_from_slice(&self.time_quality.to_le_bytes());
        bytes.extend_from_slice(&helper::fixed_string_bytes(&self.timer_id, 32, 0));

        if bytes.len() != HD3_BLOCK_SIZE as usize {
            return Err(MdfError::BlockSerializationError(format!(
                "Hd3Block must be {} bytes, got {}",
                HD3_BLOCK_SIZE,
                bytes.len()
            )));
        }
        Ok(bytes)
    }

    /// Serialize the optional PR block for `program_data`.
    pub fn program_block_bytes(&self) -> Option<Vec<u8>> {
        self.program_data
            .as_ref()
            .map(|data| text_block_bytes("PR", data))
    }

    pub fn block_properties(&self) -> Vec<BlockProperty> {
        vec![
            BlockProperty::new("Author", self.author.clone()),
            BlockProperty::new("Organisation", self.organisation.clone()),
            BlockProperty::new("Project", self.project.clone()),
            BlockProperty::new("Subject", self.subject.clone()),
            BlockProperty::new("Start Time [ns]", self.abs_time),
            BlockProperty::new("Data Groups", self.nof_dg_blocks),
        ]
    }
}
