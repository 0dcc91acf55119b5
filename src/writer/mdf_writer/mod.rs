//! Low-level MDF 4 block writer, split across several submodules.
//!
//! Writes blocks with 8-byte alignment and zero padding, tracks block
//! positions under caller-supplied ids, and supports patching links and
//! fields inside already-written blocks.

use std::collections::HashMap;
use std::io::{Seek, Write};

use crate::blocks::channel_block::ChannelBlock;
use crate::error::MdfError;

mod io;
pub(crate) mod init;
mod data;

/// Anything the writer can target: a buffered file in practice.
pub trait MdfWrite: Write + Seek + Send {}
impl<T: Write + Seek + Send> MdfWrite for T {}

/// Maximum size of a DTBLOCK including its header (4 MiB).
pub(crate) const MAX_DT_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Helper structure tracking an open DTBLOCK during writing.
pub(crate) struct OpenDataBlock {
    pub dg_id: String,
    pub start_pos: u64,
    pub record_size: usize,
    pub record_count: u64,
    pub total_record_count: u64,
    pub record_id_len: usize,
    pub channels: Vec<ChannelBlock>,
    pub dt_positions: Vec<u64>,
    pub dt_sizes: Vec<u64>,
}

/// Writer for MDF blocks, ensuring 8-byte alignment and zero padding.
pub struct MdfWriter {
    file: Box<dyn MdfWrite>,
    offset: u64,
    /// Maps caller-chosen block ids to their file offsets for later
    /// link updates.
    block_positions: HashMap<String, u64>,
    open_dts: HashMap<String, OpenDataBlock>,
    dt_counter: usize,
    last_dg: Option<String>,
    cg_to_dg: HashMap<String, String>,
    cg_offsets: HashMap<String, usize>,
    cg_channels: HashMap<String, Vec<ChannelBlock>>,
    channel_map: HashMap<String, (String, usize)>,
}
