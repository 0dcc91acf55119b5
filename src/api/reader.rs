//! Staged MDF reader and per-channel sample observers.
//!
//! The reader walks `Closed → Open → HeaderRead → InfoRead → FullyRead`;
//! each transition is idempotent and cheap once reached. `read_data`
//! decodes one data group's records into typed column buffers, one
//! observer per channel, so the inner loop stays free of dispatch.

use log::{debug, warn};

use crate::api::channel::fixed_index_view;
use crate::api::mdf::MdfFile;
use crate::blocks::channel_block::ChannelType;
use crate::blocks::common::read_string_block;
use crate::blocks::identification_block::IdentificationBlock;
use crate::error::MdfError;
use crate::parsing::decoder::{
    check_value_validity, decode_channel_value, DecodedChannelValue, DecodedValue,
};
use crate::parsing::raw_channel::read_record_id;
use crate::parsing::raw_data_group::RawDataGroup;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReaderState {
    Closed,
    Open,
    HeaderRead,
    InfoRead,
    FullyRead,
}

impl ReaderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReaderState::Closed => "Closed",
            ReaderState::Open => "Open",
            ReaderState::HeaderRead => "HeaderRead",
            ReaderState::InfoRead => "InfoRead",
            ReaderState::FullyRead => "FullyRead",
        }
    }
}

/// Column buffer for one channel of one channel group.
#[derive(Debug)]
pub struct ChannelObserver {
    pub name: String,
    pub unit: Option<String>,
    pub is_master: bool,
    /// Raw decoded values with their invalidation state.
    values: Vec<DecodedChannelValue>,
    /// Conversion-applied values, parallel to `values`.
    eng_values: Vec<DecodedValue>,
    /// Set when any conversion degraded to NaN/empty for this channel.
    pub conversion_degraded: bool,
}

impl ChannelObserver {
    pub fn nof_samples(&self) -> usize {
        self.values.len()
    }

    /// Raw channel value at `sample`.
    pub fn channel_value(&self, sample: usize) -> Option<&DecodedValue> {
        self.values.get(sample).map(|v| &v.value)
    }

    pub fn channel_value_f64(&self, sample: usize) -> Option<f64> {
        self.values.get(sample).and_then(|v| v.value.as_f64())
    }

    /// Engineering (conversion-applied) value at `sample`.
    pub fn eng_value(&self, sample: usize) -> Option<&DecodedValue> {
        self.eng_values.get(sample)
    }

    pub fn eng_value_f64(&self, sample: usize) -> Option<f64> {
        self.eng_values.get(sample).and_then(|v| v.as_f64())
    }

    pub fn is_valid(&self, sample: usize) -> bool {
        self.values.get(sample).map(|v| v.is_valid).unwrap_or(false)
    }
}

/// Observers of one channel group after `read_data`.
#[derive(Debug)]
pub struct GroupObservers {
    pub record_id: u64,
    pub observers: Vec<ChannelObserver>,
    pub records_read: u64,
}

impl GroupObservers {
    /// The time/angle/distance axis observer, when the group has one.
    pub fn master(&self) -> Option<&ChannelObserver> {
        self.observers.iter().find(|obs| obs.is_master)
    }

    pub fn find(&self, name: &str) -> Option<&ChannelObserver> {
        self.observers.iter().find(|obs| obs.name == name)
    }
}

/// Result of reading one data group.
#[derive(Debug)]
pub struct DataGroupObservers {
    pub groups: Vec<GroupObservers>,
    /// Set when the scan stopped early (unknown record id, short record);
    /// everything decoded before the boundary is kept.
    pub truncation: Option<MdfError>,
}

/// Staged reader over an MDF 3 or MDF 4 file.
pub struct MdfReader {
    path: String,
    state: ReaderState,
    identification: Option<IdentificationBlock>,
    file: Option<MdfFile>,
}

impl MdfReader {
    /// Open the file and validate the identification magic.
    pub fn open(path: &str) -> Result<Self, MdfError> {
        use std::io::Read;
        let mut probe = [0u8; 64];
        std::fs::File::open(path)?.read_exact(&mut probe)?;
        let identification = IdentificationBlock::from_bytes(&probe)?;

        Ok(MdfReader {
            path: String::from(path),
            state: ReaderState::Open,
            identification: Some(identification),
            file: None,
        })
    }

    pub fn is_ok(&self) -> bool {
        self.state != ReaderState::Closed
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    pub fn file(&self) -> Option<&MdfFile> {
        self.file.as_ref()
    }

    pub fn identification(&self) -> Option<&IdentificationBlock> {
        self.identification.as_ref()
    }

    /// Load the ID and header blocks.
    pub fn read_header(&mut self) -> Result<(), MdfError> {
        if self.state >= ReaderState::HeaderRead {
            return Ok(());
        }
        // The header proper is materialized together with the block tree on
        // the next stage; validating the ID block is all this stage needs.
        if self.identification.is_none() {
            return Err(MdfError::WrongPhase {
                operation: "read_header",
                expected: "Open",
                actual: self.state.as_str(),
            });
        }
        self.state = ReaderState::HeaderRead;
        Ok(())
    }

    /// Load measurement structure: data groups and channel groups.
    pub fn read_measurement_info(&mut self) -> Result<(), MdfError> {
        self.read_header()?;
        if self.state >= ReaderState::InfoRead {
            return Ok(());
        }
        self.ensure_parsed()?;
        self.state = ReaderState::InfoRead;
        Ok(())
    }

    /// Load everything but record data: channels, conversions, sources,
    /// attachments, events, and VLSD cross-links.
    pub fn read_everything_but_data(&mut self) -> Result<(), MdfError> {
        self.read_measurement_info()?;
        if self.state >= ReaderState::FullyRead {
            return Ok(());
        }
        self.state = ReaderState::FullyRead;
        Ok(())
    }

    fn ensure_parsed(&mut self) -> Result<(), MdfError> {
        if self.file.is_none() {
            self.file = Some(MdfFile::from_file(&self.path)?);
        }
        Ok(())
    }

    /// Extract an embedded attachment payload by index.
    pub fn read_attachment_data(&self, index: usize) -> Result<Option<Vec<u8>>, MdfError> {
        match self.file.as_ref() {
            Some(MdfFile::V4(file)) => file.read_attachment_data(index),
            _ => Ok(None),
        }
    }

    /// Decode all records of data group `dg_index` into observers.
    pub fn read_data(&mut self, dg_index: usize) -> Result<DataGroupObservers, MdfError> {
        if self.state != ReaderState::FullyRead {
            return Err(MdfError::WrongPhase {
                operation: "read_data",
                expected: "FullyRead",
                actual: self.state.as_str(),
            });
        }
        let file = self.file.as_ref().ok_or(MdfError::WrongPhase {
            operation: "read_data",
            expected: "FullyRead",
            actual: "Closed",
        })?;
        let dg = file
            .data_groups()
            .get(dg_index)
            .ok_or_else(|| MdfError::BlockLinkError(format!("no data group {}", dg_index)))?;

        read_data_group(dg, file.mmap())
    }
}

/// Scan one data group's logical payload and fill per-channel observers.
pub fn read_data_group(dg: &RawDataGroup, mmap: &[u8]) -> Result<DataGroupObservers, MdfError> {
    let payload = dg.payload(mmap)?;
    let rec_id_len = dg.block.record_id_len as usize;

    // Record boundaries per channel group, filled by the single scan pass.
    let mut record_slices: Vec<Vec<(usize, usize)>> =
        vec![Vec::new(); dg.channel_groups.len()];
    let mut truncation = None;

    // Pass 1: walk the payload once, slicing records per group.
    let bytes: &[u8] = &payload;
    let mut pos = 0usize;
    'scan: while pos < bytes.len() {
        let (cg_index, body_len) = if rec_id_len == 0 {
            if dg.channel_groups.is_empty() {
                break;
            }
            (0usize, dg.channel_groups[0].block.record_len())
        } else {
            if pos + rec_id_len > bytes.len() {
                break;
            }
            let record_id = read_record_id(&bytes[pos..], rec_id_len);
            let found = dg
                .channel_groups
                .iter()
                .position(|cg| cg.block.record_id == record_id);
            let cg_index = match found {
                Some(index) => index,
                None => {
                    truncation = Some(MdfError::RecordIdNotFound { record_id });
                    break 'scan;
                }
            };
            let cg = &dg.channel_groups[cg_index];
            let body_len = if cg.block.is_vlsd() {
                if pos + rec_id_len + 4 > bytes.len() {
                    truncation = Some(MdfError::ShortRecord {
                        expected: pos + rec_id_len + 4,
                        actual: bytes.len(),
                    });
                    break 'scan;
                }
                let len = u32::from_le_bytes(
                    bytes[pos + rec_id_len..pos + rec_id_len + 4].try_into().unwrap(),
                ) as usize;
                4 + len
            } else {
                cg.block.record_len()
            };
            (cg_index, body_len)
        };

        let end = pos + rec_id_len + body_len;
        if end > bytes.len() || body_len == 0 {
            if end > bytes.len() {
                debug!("dropping trailing partial record of {} bytes", bytes.len() - pos);
            }
            break;
        }

        let cg = &dg.channel_groups[cg_index];
        if cg.block.is_vlsd() {
            // VLSD records: remember the value bytes, not the framing.
            record_slices[cg_index].push((pos + rec_id_len + 4, end));
        } else {
            record_slices[cg_index].push((pos, end));
        }
        pos = end;
    }

    // Pass 2: decode column by column, one data-type match per channel.
    let mut groups = Vec::with_capacity(dg.channel_groups.len());
    for (cg_index, cg) in dg.channel_groups.iter().enumerate() {
        let slices = &record_slices[cg_index];
        let mut observers = Vec::with_capacity(cg.raw_channels.len());

        for raw_channel in &cg.raw_channels {
            let channel = &raw_channel.block;
            let mut values = Vec::with_capacity(slices.len());

            if channel.channel_type == ChannelType::VariableLength {
                let index_channel = fixed_index_view(channel);
                let in_cg_mode = raw_channel.points_to_cg(mmap);
                let stream = if in_cg_mode {
                    None
                } else {
                    raw_channel.signal_data(mmap)?
                };
                let cg_values: Vec<(usize, usize)> = if in_cg_mode {
                    dg.channel_groups
                        .iter()
                        .position(|sibling| {
                            sibling.address == channel.data && sibling.block.is_vlsd()
                        })
                        .map(|sibling| record_slices[sibling].clone())
                        .unwrap_or_default()
                } else {
                    Vec::new()
                };

                for &(start, end) in slices {
                    let record = &bytes[start..end];
                    let index = decode_channel_value(record, rec_id_len, &index_channel);
                    let value = match index {
                        Some(DecodedValue::UnsignedInteger(index)) => {
                            if in_cg_mode {
                                match cg_values.get(index as usize) {
                                    Some(&(vs, ve)) => {
                                        decode_channel_value(&bytes[vs..ve], 0, channel)
                                            .unwrap_or(DecodedValue::Unknown)
                                    }
                                    None => DecodedValue::Unknown,
                                }
                            } else if let Some(stream) = &stream {
                                match crate::blocks::signal_data_block::value_at_offset(
                                    stream, index,
                                ) {
                                    Ok(payload) => decode_channel_value(payload, 0, channel)
                                        .unwrap_or(DecodedValue::Unknown),
                                    Err(err) => {
                                        warn!("VLSD index out of range: {}", err);
                                        DecodedValue::Unknown
                                    }
                                }
                            } else {
                                DecodedValue::Unknown
                            }
                        }
                        _ => DecodedValue::Unknown,
                    };
                    values.push(DecodedChannelValue {
                        value,
                        is_valid: true,
                    });
                }
            } else {
                for &(start, end) in slices {
                    let record = &bytes[start..end];
                    let value = decode_channel_value(record, rec_id_len, channel)
                        .unwrap_or(DecodedValue::Unknown);
                    let is_valid = check_value_validity(
                        record,
                        rec_id_len,
                        cg.block.samples_byte_nr,
                        channel,
                    );
                    values.push(DecodedChannelValue { value, is_valid });
                }
            }

            // Apply conversions; degradations flag the observer but keep
            // the sample stream intact.
            let mut conversion_degraded = false;
            let mut eng_values = Vec::with_capacity(values.len());
            for decoded in &values {
                let eng = match &channel.conversion {
                    Some(conversion) => {
                        match conversion.apply_decoded_depth(decoded.value.clone(), mmap, 0) {
                            Ok(value) => value,
                            Err(
                                err @ (MdfError::DivideByZero
                                | MdfError::DomainError(_)
                                | MdfError::ConversionChainTooDeep { .. }
                                | MdfError::ConversionChainCycle { .. }),
                            ) => {
                                warn!("conversion degraded: {}", err);
                                conversion_degraded = true;
                                DecodedValue::Float(f64::NAN)
                            }
                            Err(err) => return Err(err),
                        }
                    }
                    None => decoded.value.clone(),
                };
                eng_values.push(eng);
            }

            let name = match &channel.name {
                Some(name) => name.clone(),
                None => read_string_block(mmap, channel.name_addr)?.unwrap_or_default(),
            };
            let unit = match &channel.unit {
                Some(unit) => Some(unit.clone()),
                None => read_string_block(mmap, channel.unit_addr)?,
            };
            observers.push(ChannelObserver {
                name,
                unit,
                is_master: channel.channel_type.is_master(),
                values,
                eng_values,
                conversion_degraded,
            });
        }

        groups.push(GroupObservers {
            record_id: cg.block.record_id,
            records_read: slices.len() as u64,
            observers,
        });
    }

    Ok(DataGroupObservers { groups, truncation })
}
