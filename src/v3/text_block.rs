//! TX and PR blocks: NUL-terminated Latin-1 text with a v3 header.

use crate::error::MdfError;
use crate::helper;
use crate::v3::block::BlockHeader3;
use crate::v3::V3Cursor;

pub fn read_text_block(
    mmap: &[u8],
    address: u32,
    big_endian: bool,
    expected: &str,
) -> Result<Option<String>, MdfError> {
    if address == 0 {
        return Ok(None);
    }
    let offset = address as usize;
    if offset + 4 > mmap.len() {
        return Err(MdfError::TooShortBuffer {
            actual: mmap.len(),
            expected: offset + 4,
            file: file!(),
            line: line!(),
        });
    }
    let mut cursor = V3Cursor::new(&mmap[offset..], big_endian);
    let header = BlockHeader3::read(&mut cursor, expected)?;
    let body_len = (header.block_size as usize).saturating_sub(4);
    if offset + 4 + body_len > mmap.len() {
        return Err(MdfError::TooShortBuffer {
            actual: mmap.len(),
            expected: offset + 4 + body_len,
            file: file!(),
            line: line!(),
        });
    }
    let body = &mmap[offset + 4..offset + 4 + body_len];
    let end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
    Ok(Some(helper::latin1_to_utf8(&body[..end])))
}

/// Serialize a TX (or PR) block holding `text`.
pub fn text_block_bytes(tag: &str, text: &str) -> Vec<u8> {
    let body_len = text.len() + 1;
    let header = BlockHeader3::new(tag, (4 + body_len) as u16);
    let mut bytes = header.to_bytes();
    bytes.extend_from_slice(text.as_bytes());
    bytes.push(0);
    bytes
}
