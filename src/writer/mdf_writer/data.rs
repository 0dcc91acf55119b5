// Handling of DT blocks and record writing
use super::*;

use crate::blocks::common::BlockHeader;
use crate::blocks::data_list_block::DataListBlock;
use crate::parsing::decoder::{encode_channel_value, DecodedValue};
use crate::writer::mdf_writer::init::{
    CG_CYCLES_OFFSET, CG_DATA_BYTES_OFFSET, DG_DATA_OFFSET, DG_REC_ID_LEN_OFFSET,
};

impl MdfWriter {
    /// Start writing a DTBLOCK for the given data group. `channels`
    /// describes the fixed layout of one record.
    pub fn start_data_block(
        &mut self,
        dg_id: &str,
        cg_id: &str,
        record_id_len: u8,
        channels: &[ChannelBlock],
    ) -> Result<(), MdfError> {
        if self.open_dts.contains_key(cg_id) {
            return Err(MdfError::BlockSerializationError(
                "data block already open for this channel group".into(),
            ));
        }

        let mut record_bytes = 0usize;
        for ch in channels {
            let byte_end = ch.byte_offset as usize + ch.byte_width();
            record_bytes = record_bytes.max(byte_end);
        }
        let record_size = record_bytes + record_id_len as usize;

        let header = BlockHeader::new("##DT", 24, 0);
        let dt_id = format!("dt_{}", self.dt_counter);
        self.dt_counter += 1;
        let dt_pos = self.write_block_with_id(&header.to_bytes()?, &dt_id)?;

        self.update_block_link(dg_id, DG_DATA_OFFSET, &dt_id)?;
        self.update_block_u8(dg_id, DG_REC_ID_LEN_OFFSET, record_id_len)?;
        self.update_block_u32(cg_id, CG_DATA_BYTES_OFFSET, record_bytes as u32)?;

        self.open_dts.insert(
            cg_id.to_string(),
            OpenDataBlock {
                dg_id: dg_id.to_string(),
                start_pos: dt_pos,
                record_size,
                record_count: 0,
                total_record_count: 0,
                record_id_len: record_id_len as usize,
                channels: channels.to_vec(),
                dt_positions: vec![dt_pos],
                dt_sizes: Vec::new(),
            },
        );
        Ok(())
    }

    /// Convenience wrapper resolving the data group from the channel group.
    pub fn start_data_block_for_cg(
        &mut self,
        cg_id: &str,
        record_id_len: u8,
    ) -> Result<(), MdfError> {
        let dg = self
            .cg_to_dg
            .get(cg_id)
            .ok_or_else(|| MdfError::BlockSerializationError("unknown channel group".into()))?
            .clone();
        let channels = self
            .cg_channels
            .get(cg_id)
            .ok_or_else(|| {
                MdfError::BlockSerializationError("no channels for channel group".into())
            })?
            .clone();
        self.start_data_block(&dg, cg_id, record_id_len, &channels)
    }

    /// Append one record to the currently open DTBLOCK for the given
    /// channel group, rolling over to a fresh DT at the 4 MiB boundary.
    pub fn write_record(&mut self, cg_id: &str, values: &[DecodedValue]) -> Result<(), MdfError> {
        let needs_new_block = {
            let dt = self.open_dts.get(cg_id).ok_or_else(|| {
                MdfError::BlockSerializationError("no open DT block for this channel group".into())
            })?;
            if values.len() != dt.channels.len() {
                return Err(MdfError::BlockSerializationError(
                    "value count mismatch".into(),
                ));
            }
            24 + dt.record_size * (dt.record_count as usize + 1) > MAX_DT_BLOCK_SIZE
        };

        if needs_new_block {
            self.roll_over_data_block(cg_id)?;
        }

        let dt = self.open_dts.get_mut(cg_id).unwrap();
        let mut buf = vec![0u8; dt.record_size];
        for (ch, val) in dt.channels.iter().zip(values.iter()) {
            encode_channel_value(&mut buf, dt.record_id_len, ch, val)?;
        }

        self.file.write_all(&buf)?;
        self.offset += buf.len() as u64;
        let dt = self.open_dts.get_mut(cg_id).unwrap();
        dt.record_count += 1;
        Ok(())
    }

    /// Append multiple records sequentially for the specified channel group.
    pub fn write_records<'a, I>(&mut self, cg_id: &str, records: I) -> Result<(), MdfError>
    where
        I: IntoIterator<Item = &'a [DecodedValue]>,
    {
        for record in records {
            self.write_record(cg_id, record)?;
        }
        Ok(())
    }

    /// Close the current DT of `cg_id` and open a new one right after it.
    fn roll_over_data_block(&mut self, cg_id: &str) -> Result<(), MdfError> {
        let (start_pos, record_count, record_size) = {
            let dt = self.open_dts.get(cg_id).unwrap();
            (dt.start_pos, dt.record_count, dt.record_size)
        };
        let size = 24 + record_size * record_count as usize;
        self.update_link(start_pos + 8, size as u64)?;
        {
            let dt = self.open_dts.get_mut(cg_id).unwrap();
            dt.total_record_count += record_count;
            dt.dt_sizes.push(size as u64);
        }

        let header = BlockHeader::new("##DT", 24, 0);
        let new_dt_id = format!("dt_{}", self.dt_counter);
        self.dt_counter += 1;
        let new_dt_pos = self.write_block_with_id(&header.to_bytes()?, &new_dt_id)?;

        let dt = self.open_dts.get_mut(cg_id).unwrap();
        dt.start_pos = new_dt_pos;
        dt.record_count = 0;
        dt.dt_positions.push(new_dt_pos);
        Ok(())
    }

    /// Finalize the open DTBLOCK for a channel group: patch its size and
    /// the group's cycle counter, and link a DLBLOCK when the data rolled
    /// over into several DT blocks.
    pub fn finish_data_block(&mut self, cg_id: &str) -> Result<(), MdfError> {
        let mut dt = self.open_dts.remove(cg_id).ok_or_else(|| {
            MdfError::BlockSerializationError("no open DT block for this channel group".into())
        })?;
        let size = 24 + dt.record_size as u64 * dt.record_count;
        self.update_link(dt.start_pos + 8, size)?;
        dt.dt_sizes.push(size);
        dt.total_record_count += dt.record_count;
        self.update_block_u64(cg_id, CG_CYCLES_OFFSET, dt.total_record_count)?;

        if dt.dt_positions.len() > 1 {
            let dl_count = self
                .block_positions
                .keys()
                .filter(|k| k.starts_with("dl_"))
                .count();
            let dl_id = format!("dl_{}", dl_count);
            let common_len = *dt.dt_sizes.first().unwrap_or(&size);
            let dl_block = DataListBlock::new_equal(dt.dt_positions.clone(), common_len - 24);
            let _pos = self.write_block_with_id(&dl_block.to_bytes()?, &dl_id)?;
            self.update_block_link(&dt.dg_id, DG_DATA_OFFSET, &dl_id)?;
        }
        Ok(())
    }
}
