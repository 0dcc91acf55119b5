// Functions for creating and linking MDF structure blocks
use super::*;

use crate::blocks::channel_block::{ChannelType, SyncType};
use crate::blocks::channel_group_block::ChannelGroupBlock;
use crate::blocks::conversion::{ConversionBlock, ConversionType};
use crate::blocks::data_group_block::DataGroupBlock;
use crate::blocks::header_block::HeaderBlock;
use crate::blocks::identification_block::IdentificationBlock;
use crate::blocks::metadata_block::{MetadataBlock, PropertyType};
use crate::blocks::source_block::SourceBlock;
use crate::blocks::text_block::TextBlock;

// Link slot offsets inside the fixed blocks.
pub(crate) const HD_FIRST_DG_OFFSET: u64 = 24;
pub(crate) const HD_COMMENT_OFFSET: u64 = 64;
pub(crate) const DG_NEXT_DG_OFFSET: u64 = 24;
pub(crate) const DG_FIRST_CG_OFFSET: u64 = 32;
pub(crate) const DG_DATA_OFFSET: u64 = 40;
pub(crate) const DG_REC_ID_LEN_OFFSET: u64 = 56;
pub(crate) const CG_NEXT_CG_OFFSET: u64 = 24;
pub(crate) const CG_FIRST_CN_OFFSET: u64 = 32;
pub(crate) const CG_ACQ_NAME_OFFSET: u64 = 40;
pub(crate) const CG_ACQ_SOURCE_OFFSET: u64 = 48;
pub(crate) const CG_COMMENT_OFFSET: u64 = 64;
pub(crate) const CG_RECORD_ID_OFFSET: u64 = 72;
pub(crate) const CG_CYCLES_OFFSET: u64 = 80;
pub(crate) const CG_DATA_BYTES_OFFSET: u64 = 96;
pub(crate) const CG_INVAL_BYTES_OFFSET: u64 = 100;
pub(crate) const CN_NEXT_CN_OFFSET: u64 = 24;
pub(crate) const CN_NAME_OFFSET: u64 = 40;
pub(crate) const CN_CONVERSION_OFFSET: u64 = 56;
pub(crate) const CN_DATA_OFFSET: u64 = 64;
pub(crate) const CN_UNIT_OFFSET: u64 = 72;
pub(crate) const CN_COMMENT_OFFSET: u64 = 80;
pub(crate) const CN_CHANNEL_TYPE_OFFSET: u64 = 88;
pub(crate) const CN_SYNC_TYPE_OFFSET: u64 = 89;
pub(crate) const SI_NAME_OFFSET: u64 = 24;

impl MdfWriter {
    /// Initializes a new MDF 4.1 file with identification and header
    /// blocks, stamping the given absolute start time.
    pub fn init_mdf_file(&mut self, start_time_ns: u64) -> Result<(u64, u64), MdfError> {
        let id_block = IdentificationBlock::default();
        let id_pos = self.write_block_with_id(&id_block.to_bytes()?, "id_block")?;

        let hd_block = HeaderBlock {
            abs_time: start_time_ns,
            ..Default::default()
        };
        let hd_pos = self.write_block_with_id(&hd_block.to_bytes()?, "hd_block")?;
        Ok((id_pos, hd_pos))
    }

    /// Attach an HDcomment metadata block with common properties
    /// (author, department, project, subject, …).
    pub fn set_header_properties(
        &mut self,
        comment: &str,
        entries: &[(&str, &str)],
    ) -> Result<(), MdfError> {
        let typed: Vec<(&str, &str, PropertyType)> = entries
            .iter()
            .map(|&(name, value)| (name, value, PropertyType::String))
            .collect();
        let md = MetadataBlock::with_common_properties("HDcomment", comment, &typed);
        let md_pos = self.write_block_with_id(&md.to_bytes()?, "hd_comment")?;
        let hd_pos = self.get_block_position("hd_block").ok_or_else(|| {
            MdfError::BlockLinkError("Header block not written yet".to_string())
        })?;
        self.update_link(hd_pos + HD_COMMENT_OFFSET, md_pos)
    }

    /// Adds a data group block and links it from the header block or the
    /// previous data group.
    pub fn add_data_group(&mut self, prev_dg_id: Option<&str>) -> Result<String, MdfError> {
        let dg_count = self
            .block_positions
            .keys()
            .filter(|k| k.starts_with("dg_"))
            .count();
        let dg_id = format!("dg_{}", dg_count);
        let dg_block = DataGroupBlock::default();
        let _pos = self.write_block_with_id(&dg_block.to_bytes()?, &dg_id)?;

        if let Some(prev) = prev_dg_id {
            self.update_block_link(prev, DG_NEXT_DG_OFFSET, &dg_id)?;
        } else {
            self.update_block_link("hd_block", HD_FIRST_DG_OFFSET, &dg_id)?;
        }
        self.last_dg = Some(dg_id.clone());
        Ok(dg_id)
    }

    /// Adds a channel group block to the specified data group.
    pub fn add_channel_group_with_dg<F>(
        &mut self,
        dg_id: &str,
        prev_cg_id: Option<&str>,
        configure: F,
    ) -> Result<String, MdfError>
    where
        F: FnOnce(&mut ChannelGroupBlock),
    {
        let cg_count = self
            .block_positions
            .keys()
            .filter(|k| k.starts_with("cg_"))
            .count();
        let cg_id = format!("cg_{}", cg_count);

        let mut cg_block = ChannelGroupBlock::default();
        configure(&mut cg_block);

        let _pos = self.write_block_with_id(&cg_block.to_bytes()?, &cg_id)?;

        if let Some(prev) = prev_cg_id {
            self.update_block_link(prev, CG_NEXT_CG_OFFSET, &cg_id)?;
        } else {
            self.update_block_link(dg_id, DG_FIRST_CG_OFFSET, &cg_id)?;
        }
        self.cg_to_dg.insert(cg_id.clone(), dg_id.to_string());
        self.cg_offsets.insert(cg_id.clone(), 0);
        self.cg_channels.insert(cg_id.clone(), Vec::new());
        Ok(cg_id)
    }

    /// Adds a channel group inside a fresh data group.
    pub fn add_channel_group<F>(
        &mut self,
        prev_cg_id: Option<&str>,
        configure: F,
    ) -> Result<String, MdfError>
    where
        F: FnOnce(&mut ChannelGroupBlock),
    {
        let dg_id = match self.last_dg.clone() {
            Some(last) => self.add_data_group(Some(&last))?,
            None => self.add_data_group(None)?,
        };
        self.add_channel_group_with_dg(&dg_id, prev_cg_id, configure)
    }

    pub fn data_group_of(&self, cg_id: &str) -> Option<&str> {
        self.cg_to_dg.get(cg_id).map(|s| s.as_str())
    }

    pub fn channels_of(&self, cg_id: &str) -> Option<&[ChannelBlock]> {
        self.cg_channels.get(cg_id).map(|v| v.as_slice())
    }

    /// Adds a channel block to the specified channel group. Byte layout is
    /// assigned automatically when the configure closure leaves it at 0.
    pub fn add_channel<F>(
        &mut self,
        cg_id: &str,
        prev_cn_id: Option<&str>,
        configure: F,
    ) -> Result<String, MdfError>
    where
        F: FnOnce(&mut ChannelBlock),
    {
        let cn_count = self
            .block_positions
            .keys()
            .filter(|k| k.starts_with("cn_"))
            .count();
        let cn_id = format!("cn_{}", cn_count);

        let mut ch = ChannelBlock::default();
        configure(&mut ch);
        if ch.bit_count == 0 {
            ch.bit_count = ch.data_type.default_bits();
        }
        // VLSD channels store a u64 byte index in the fixed record.
        if ch.channel_type == ChannelType::VariableLength {
            ch.bit_count = 64;
        }
        if let Some(off) = self.cg_offsets.get_mut(cg_id) {
            if ch.byte_offset == 0 {
                ch.byte_offset = *off as u32;
            }
            let used = (ch.bit_offset as usize + ch.bit_count as usize).div_ceil(8);
            *off = (*off).max(ch.byte_offset as usize + used);
        }

        let cn_pos = self.write_block_with_id(&ch.to_bytes()?, &cn_id)?;
        if let Some(channel_name) = &ch.name {
            let tx_id = format!("tx_name_{}", cn_id);
            let tx_block = TextBlock::new(channel_name);
            let tx_pos = self.write_block_with_id(&tx_block.to_bytes()?, &tx_id)?;
            self.update_link(cn_pos + CN_NAME_OFFSET, tx_pos)?;
        }
        if let Some(unit) = ch.unit.clone() {
            self.set_channel_unit(&cn_id, &unit)?;
        }

        let entry = self.cg_channels.entry(cg_id.to_string()).or_default();
        entry.push(ch.clone());
        let idx = entry.len() - 1;
        self.channel_map
            .insert(cn_id.clone(), (cg_id.to_string(), idx));

        if let Some(prev_cn) = prev_cn_id {
            self.update_block_link(prev_cn, CN_NEXT_CN_OFFSET, &cn_id)?;
        } else {
            self.update_block_link(cg_id, CG_FIRST_CN_OFFSET, &cn_id)?;
        }
        Ok(cn_id)
    }

    /// Mark an existing channel as the time master of its group.
    pub fn set_time_channel(&mut self, cn_id: &str) -> Result<(), MdfError> {
        self.update_block_u8(cn_id, CN_CHANNEL_TYPE_OFFSET, ChannelType::Master.to_u8())?;
        self.update_block_u8(cn_id, CN_SYNC_TYPE_OFFSET, SyncType::Time.to_u8())?;

        if let Some((cg, idx)) = self.channel_map.get(cn_id).cloned() {
            if let Some(ch) = self.cg_channels.get_mut(&cg).and_then(|chs| chs.get_mut(idx)) {
                ch.channel_type = ChannelType::Master;
                ch.sync_type = SyncType::Time;
            }
        }
        Ok(())
    }

    /// Sets the unit string for an existing channel.
    pub fn set_channel_unit(&mut self, cn_id: &str, unit: &str) -> Result<(), MdfError> {
        if unit.is_empty() {
            return Ok(());
        }
        let cn_pos = self
            .get_block_position(cn_id)
            .ok_or_else(|| MdfError::BlockLinkError(format!("Channel '{}' not found", cn_id)))?;

        let tx_id = format!("tx_unit_{}", cn_id);
        let tx_block = TextBlock::new(unit);
        let tx_pos = self.write_block_with_id(&tx_block.to_bytes()?, &tx_id)?;
        self.update_link(cn_pos + CN_UNIT_OFFSET, tx_pos)
    }

    /// Sets the comment/description for an existing channel.
    pub fn set_channel_comment(&mut self, cn_id: &str, comment: &str) -> Result<(), MdfError> {
        if comment.is_empty() {
            return Ok(());
        }
        let cn_pos = self
            .get_block_position(cn_id)
            .ok_or_else(|| MdfError::BlockLinkError(format!("Channel '{}' not found", cn_id)))?;

        let tx_id = format!("tx_comment_{}", cn_id);
        let tx_block = TextBlock::new(comment);
        let tx_pos = self.write_block_with_id(&tx_block.to_bytes()?, &tx_id)?;
        self.update_link(cn_pos + CN_COMMENT_OFFSET, tx_pos)
    }

    /// Writes a conversion block and links it to the channel. Table texts
    /// and formula references are written first and wired into `cc_ref`.
    pub fn set_channel_conversion(
        &mut self,
        cn_id: &str,
        conversion: &ConversionBlock,
    ) -> Result<(), MdfError> {
        if conversion.is_identity() {
            return Ok(());
        }
        let cn_pos = self
            .get_block_position(cn_id)
            .ok_or_else(|| MdfError::BlockLinkError(format!("Channel '{}' not found", cn_id)))?;

        let cc_count = self
            .block_positions
            .keys()
            .filter(|k| k.starts_with("cc_"))
            .count();
        let cc_id = format!("cc_{}", cc_count);

        let mut block = conversion.clone();

        // Inline texts become referenced TX blocks on disk.
        if !block.inline_texts.is_empty() {
            block.cc_ref.clear();
            for (idx, text) in block.inline_texts.iter().enumerate() {
                let tx_id = format!("tx_{}_{}", cc_id, idx);
                let tx_block = TextBlock::new(text);
                let pos = self.write_block_with_id(&tx_block.to_bytes()?, &tx_id)?;
                block.cc_ref.push(pos);
            }
            block.inline_texts.clear();
        } else if block.cc_type == ConversionType::Algebraic {
            if let Some(formula) = &block.formula {
                let tx_id = format!("tx_{}_formula", cc_id);
                let tx_block = TextBlock::new(formula);
                let pos = self.write_block_with_id(&tx_block.to_bytes()?, &tx_id)?;
                block.cc_ref = vec![pos];
            }
        }

        let cc_pos = self.write_block_with_id(&block.to_bytes()?, &cc_id)?;
        self.update_link(cn_pos + CN_CONVERSION_OFFSET, cc_pos)?;

        if let Some((cg, idx)) = self.channel_map.get(cn_id).cloned() {
            if let Some(ch) = self.cg_channels.get_mut(&cg).and_then(|chs| chs.get_mut(idx)) {
                ch.conversion = Some(block);
            }
        }
        Ok(())
    }

    /// Sets the acquisition name for an existing channel group.
    pub fn set_channel_group_name(&mut self, cg_id: &str, name: &str) -> Result<(), MdfError> {
        if name.is_empty() {
            return Ok(());
        }
        let cg_pos = self.get_block_position(cg_id).ok_or_else(|| {
            MdfError::BlockLinkError(format!("Channel group '{}' not found", cg_id))
        })?;

        let tx_id = format!("tx_cgname_{}", cg_id);
        let tx_block = TextBlock::new(name);
        let tx_pos = self.write_block_with_id(&tx_block.to_bytes()?, &tx_id)?;
        self.update_link(cg_pos + CG_ACQ_NAME_OFFSET, tx_pos)
    }

    /// Sets the comment for an existing channel group.
    pub fn set_channel_group_comment(&mut self, cg_id: &str, comment: &str) -> Result<(), MdfError> {
        if comment.is_empty() {
            return Ok(());
        }
        let cg_pos = self.get_block_position(cg_id).ok_or_else(|| {
            MdfError::BlockLinkError(format!("Channel group '{}' not found", cg_id))
        })?;

        let tx_id = format!("tx_cgcomment_{}", cg_id);
        let tx_block = TextBlock::new(comment);
        let tx_pos = self.write_block_with_id(&tx_block.to_bytes()?, &tx_id)?;
        self.update_link(cg_pos + CG_COMMENT_OFFSET, tx_pos)
    }

    /// Attaches an acquisition source to a channel group.
    pub fn set_channel_group_source(
        &mut self,
        cg_id: &str,
        source: &SourceBlock,
        source_name: Option<&str>,
    ) -> Result<(), MdfError> {
        let cg_pos = self.get_block_position(cg_id).ok_or_else(|| {
            MdfError::BlockLinkError(format!("Channel group '{}' not found", cg_id))
        })?;

        let si_count = self
            .block_positions
            .keys()
            .filter(|k| k.starts_with("si_"))
            .count();
        let si_id = format!("si_{}", si_count);

        let mut name_pos = 0u64;
        if let Some(name) = source_name {
            if !name.is_empty() {
                let tx_id = format!("tx_siname_{}", si_id);
                let tx_block = TextBlock::new(name);
                name_pos = self.write_block_with_id(&tx_block.to_bytes()?, &tx_id)?;
            }
        }

        let si_pos = self.write_block_with_id(&source.to_bytes()?, &si_id)?;
        if name_pos != 0 {
            self.update_link(si_pos + SI_NAME_OFFSET, name_pos)?;
        }
        self.update_link(cg_pos + CG_ACQ_SOURCE_OFFSET, si_pos)
    }
}
