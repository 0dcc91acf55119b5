//! Reading and writing ASAM MDF (Measurement Data Format) files.
//!
//! The crate handles version 3 (little/big endian, 32-bit offsets) and
//! version 4 (little endian, 64-bit offsets, compression, variable-length
//! data) recordings. A high level API lives under [`api`]: [`api::mdf::MDF`]
//! for quick inspection, [`api::reader::MdfReader`] for staged reading with
//! per-channel observers. New files are produced either block by block with
//! [`writer::MdfWriter`] or through the streaming
//! [`writer::MdfStreamWriter`], which feeds a background worker from a
//! sample queue.

pub mod blocks;
pub mod error;
pub mod helper;
pub mod writer;
pub mod v3;

pub mod parsing {
    pub mod decoder;
    pub mod mdf_file;
    pub mod raw_data_group;
    pub mod raw_channel_group;
    pub mod raw_channel;
    pub mod source_info;
}

pub mod api {
    pub mod mdf;
    pub mod channel_group;
    pub mod channel;
    pub mod reader;
}
