//! Version 3 measurement writer.
//!
//! Builds the ID/HD/DG/CG/CN skeleton, appends record bytes at the DG data
//! link and patches cycle counters on finalize. All numerics are written
//! little endian; the ID block declares the order for readers.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};

use crate::blocks::channel_block::ChannelBlock;
use crate::error::MdfError;
use crate::parsing::decoder::{encode_channel_value, DecodedValue};
use crate::v3::channel_block::Cn3Block;
use crate::v3::channel_group_block::Cg3Block;
use crate::v3::conversion_block::Cc3Block;
use crate::v3::data_group_block::Dg3Block;
use crate::v3::header_block::Hd3Block;
use crate::blocks::identification_block::IdentificationBlock;

// Field offsets used for in-place patch-ups.
const HD3_FIRST_DG_OFFSET: u64 = 4;
const HD3_NOF_DG_OFFSET: u64 = 16;
const DG3_NEXT_DG_OFFSET: u64 = 4;
const DG3_FIRST_CG_OFFSET: u64 = 8;
const DG3_DATA_OFFSET: u64 = 16;
const DG3_NOF_CG_OFFSET: u64 = 20;
const DG3_NOF_REC_ID_OFFSET: u64 = 22;
const CG3_NEXT_CG_OFFSET: u64 = 4;
const CG3_FIRST_CN_OFFSET: u64 = 8;
const CG3_NOF_CHANNELS_OFFSET: u64 = 18;
const CG3_RECORD_SIZE_OFFSET: u64 = 20;
const CG3_NOF_RECORDS_OFFSET: u64 = 22;
const CN3_NEXT_CN_OFFSET: u64 = 4;
const CN3_CONVERSION_OFFSET: u64 = 8;

struct OpenGroup {
    dg_id: String,
    record_id: u16,
    record_size: usize,
    record_count: u32,
    /// Channel views in the shared form, used by the record encoder.
    channels: Vec<ChannelBlock>,
}

/// Writer for MDF 3 files. Blocks are 2-byte aligned and linked through
/// 32-bit absolute offsets.
pub struct Mdf3Writer {
    file: BufWriter<File>,
    offset: u64,
    block_positions: HashMap<String, u64>,
    groups: HashMap<String, OpenGroup>,
    last_dg: Option<String>,
    last_cg_in_dg: HashMap<String, String>,
    last_cn_in_cg: HashMap<String, String>,
    cg_counter: usize,
    cn_counter: usize,
    data_started: Option<String>,
}

impl Mdf3Writer {
    pub fn new(path: &str) -> Result<Self, MdfError> {
        let file = BufWriter::new(File::create(path)?);
        Ok(Mdf3Writer {
            file,
            offset: 0,
            block_positions: HashMap::new(),
            groups: HashMap::new(),
            last_dg: None,
            last_cg_in_dg: HashMap::new(),
            last_cn_in_cg: HashMap::new(),
            cg_counter: 0,
            cn_counter: 0,
            data_started: None,
        })
    }

    fn write_block(&mut self, bytes: &[u8], block_id: &str) -> Result<u64, MdfError> {
        // v3 blocks start on 2-byte boundaries.
        if self.offset % 2 != 0 {
            self.file.write_all(&[0])?;
            self.offset += 1;
        }
        let start = self.offset;
        self.file.write_all(bytes)?;
        self.offset += bytes.len() as u64;
        self.block_positions.insert(block_id.to_string(), start);
        Ok(start)
    }

    fn update_u32(&mut self, position: u64, value: u32) -> Result<(), MdfError> {
        let current = self.offset;
        self.file.seek(SeekFrom::Start(position))?;
        self.file.write_all(&value.to_le_bytes())?;
        self.file.seek(SeekFrom::Start(current))?;
        Ok(())
    }

    fn update_u16(&mut self, position: u64, value: u16) -> Result<(), MdfError> {
        let current = self.offset;
        self.file.seek(SeekFrom::Start(position))?;
        self.file.write_all(&value.to_le_bytes())?;
        self.file.seek(SeekFrom::Start(current))?;
        Ok(())
    }

    fn position_of(&self, block_id: &str) -> Result<u64, MdfError> {
        self.block_positions
            .get(block_id)
            .copied()
            .ok_or_else(|| MdfError::BlockLinkError(format!("Block '{}' not found", block_id)))
    }

    /// Write the identification and header blocks.
    pub fn init_file(&mut self, header: &Hd3Block) -> Result<(), MdfError> {
        let id_block = IdentificationBlock::new_v3();
        self.write_block(&id_block.to_bytes()?, "id_block")?;
        self.write_block(&header.to_bytes()?, "hd_block")?;
        Ok(())
    }

    /// Append a data group and link it from the header or the previous DG.
    pub fn add_data_group(&mut self) -> Result<String, MdfError> {
        let dg_count = self
            .block_positions
            .keys()
            .filter(|k| k.starts_with("dg_"))
            .count();
        let dg_id = format!("dg_{}", dg_count);

        let dg_block = Dg3Block::default();
        let dg_pos = self.write_block(&dg_block.to_bytes(), &dg_id)?;

        match self.last_dg.clone() {
            None => {
                let hd_pos = self.position_of("hd_block")?;
                self.update_u32(hd_pos + HD3_FIRST_DG_OFFSET, dg_pos as u32)?;
            }
            Some(prev) => {
                let prev_pos = self.position_of(&prev)?;
                self.update_u32(prev_pos + DG3_NEXT_DG_OFFSET, dg_pos as u32)?;
            }
        }
        let hd_pos = self.position_of("hd_block")?;
        self.update_u16(hd_pos + HD3_NOF_DG_OFFSET, (dg_count + 1) as u16)?;
        self.last_dg = Some(dg_id.clone());
        Ok(dg_id)
    }

    /// Append a channel group under `dg_id`.
    pub fn add_channel_group(&mut self, dg_id: &str) -> Result<String, MdfError> {
        let cg_id = format!("cg_{}", self.cg_counter);
        self.cg_counter += 1;

        let record_id = (self.groups.values().filter(|g| g.dg_id == dg_id).count() + 1) as u16;
        let cg_block = Cg3Block {
            record_id,
            ..Default::default()
        };
        let cg_pos = self.write_block(&cg_block.to_bytes(), &cg_id)?;

        match self.last_cg_in_dg.get(dg_id).cloned() {
            None => {
                let dg_pos = self.position_of(dg_id)?;
                self.update_u32(dg_pos + DG3_FIRST_CG_OFFSET, cg_pos as u32)?;
                self.update_u16(dg_pos + DG3_NOF_CG_OFFSET, 1)?;
            }
            Some(prev) => {
                let prev_pos = self.position_of(&prev)?;
                self.update_u32(prev_pos + CG3_NEXT_CG_OFFSET, cg_pos as u32)?;
                let dg_pos = self.position_of(dg_id)?;
                let count = self.groups.values().filter(|g| g.dg_id == dg_id).count() + 1;
                self.update_u16(dg_pos + DG3_NOF_CG_OFFSET, count as u16)?;
                // More than one group needs a record-id prefix.
                self.update_u16(dg_pos + DG3_NOF_REC_ID_OFFSET, 1)?;
            }
        }
        self.last_cg_in_dg
            .insert(dg_id.to_string(), cg_id.clone());
        self.groups.insert(
            cg_id.clone(),
            OpenGroup {
                dg_id: dg_id.to_string(),
                record_id,
                record_size: 0,
                record_count: 0,
                channels: Vec::new(),
            },
        );
        Ok(cg_id)
    }

    /// Append a channel under `cg_id`; `configure` fills the v3 fields.
    /// The optional `unit` and linear conversion land in a CC block.
    pub fn add_channel<F>(
        &mut self,
        cg_id: &str,
        configure: F,
        unit: Option<&str>,
        linear: Option<(f64, f64)>,
    ) -> Result<String, MdfError>
    where
        F: FnOnce(&mut Cn3Block),
    {
        let cn_id = format!("cn_{}", self.cn_counter);
        self.cn_counter += 1;

        let mut cn_block = Cn3Block::default();
        configure(&mut cn_block);

        // Auto-layout: append after the widest existing channel.
        let group = self
            .groups
            .get(cg_id)
            .ok_or_else(|| MdfError::BlockLinkError(format!("unknown channel group {}", cg_id)))?;
        if cn_block.start_offset == 0 && cn_block.byte_offset == 0 && !group.channels.is_empty() {
            let bits = group.record_size as u32 * 8;
            cn_block.byte_offset = (bits / 8) as u16;
            cn_block.start_offset = 0;
        }

        let cn_pos = self.write_block(&cn_block.to_bytes(), &cn_id)?;

        if unit.is_some() || linear.is_some() {
            let (offset, factor) = linear.unwrap_or((0.0, 1.0));
            let cc = Cc3Block {
                range_valid: false,
                min: 0.0,
                max: 0.0,
                unit: unit.unwrap_or("").to_string(),
                conversion: crate::blocks::conversion::ConversionBlock::linear(offset, factor),
            };
            let cc_id = format!("cc_{}", cn_id);
            let cc_pos = self.write_block(&cc.to_bytes(), &cc_id)?;
            self.update_u32(cn_pos + CN3_CONVERSION_OFFSET, cc_pos as u32)?;
        }

        match self.last_cn_in_cg.get(cg_id).cloned() {
            None => {
                let cg_pos = self.position_of(cg_id)?;
                self.update_u32(cg_pos + CG3_FIRST_CN_OFFSET, cn_pos as u32)?;
            }
            Some(prev) => {
                let prev_pos = self.position_of(&prev)?;
                self.update_u32(prev_pos + CN3_NEXT_CN_OFFSET, cn_pos as u32)?;
            }
        }
        self.last_cn_in_cg
            .insert(cg_id.to_string(), cn_id.clone());

        // Track the channel in the shared form for record encoding.
        let view = cn_block.clone().into_channel_block(&[], false)?;
        let (record_size, channel_count) = {
            let group = self.groups.get_mut(cg_id).unwrap();
            let end = view.byte_offset as usize + view.byte_width();
            group.record_size = group.record_size.max(end);
            group.channels.push(view);
            (group.record_size, group.channels.len())
        };

        let cg_pos = self.position_of(cg_id)?;
        self.update_u16(cg_pos + CG3_RECORD_SIZE_OFFSET, record_size as u16)?;
        self.update_u16(cg_pos + CG3_NOF_CHANNELS_OFFSET, channel_count as u16)?;
        Ok(cn_id)
    }

    /// Mark the current end of file as the record area of `dg_id`.
    pub fn start_data(&mut self, dg_id: &str) -> Result<(), MdfError> {
        if self.offset % 2 != 0 {
            self.file.write_all(&[0])?;
            self.offset += 1;
        }
        let dg_pos = self.position_of(dg_id)?;
        let data_pos = self.offset;
        self.update_u32(dg_pos + DG3_DATA_OFFSET, data_pos as u32)?;
        self.data_started = Some(dg_id.to_string());
        Ok(())
    }

    /// Append one record for `cg_id`, prefixed by its record id when the
    /// owning DG holds several groups.
    pub fn write_record(&mut self, cg_id: &str, values: &[DecodedValue]) -> Result<(), MdfError> {
        let (record, dg_id) = {
            let group = self.groups.get(cg_id).ok_or_else(|| {
                MdfError::BlockLinkError(format!("unknown channel group {}", cg_id))
            })?;
            if values.len() != group.channels.len() {
                return Err(MdfError::BlockSerializationError(
                    "value count mismatch".to_string(),
                ));
            }
            let with_id = self
                .groups
                .values()
                .filter(|g| g.dg_id == group.dg_id)
                .count()
                > 1;
            let rec_id_len = if with_id { 1 } else { 0 };
            let mut record = vec![0u8; rec_id_len + group.record_size];
            if with_id {
                record[0] = group.record_id as u8;
            }
            for (channel, value) in group.channels.iter().zip(values.iter()) {
                encode_channel_value(&mut record, rec_id_len, channel, value)?;
            }
            (record, group.dg_id.clone())
        };

        if self.data_started.as_deref() != Some(dg_id.as_str()) {
            return Err(MdfError::WrongPhase {
                operation: "write_record",
                expected: "start_data",
                actual: "skeleton",
            });
        }
        self.file.write_all(&record)?;
        self.offset += record.len() as u64;
        self.groups.get_mut(cg_id).unwrap().record_count += 1;
        Ok(())
    }

    /// Patch cycle counters and flush.
    pub fn finalize(mut self) -> Result<(), MdfError> {
        let patches: Vec<(String, u32)> = self
            .groups
            .iter()
            .map(|(cg_id, group)| (cg_id.clone(), group.record_count))
            .collect();
        for (cg_id, count) in patches {
            let cg_pos = self.position_of(&cg_id)?;
            self.update_u32(cg_pos + CG3_NOF_RECORDS_OFFSET, count)?;
        }
        self.file.flush()?;
        Ok(())
    }
}
