//! Streaming measurement writer.
//!
//! The caller builds the block tree (`create_*`), then `init_measurement`
//! flushes the skeleton, hands the file to a background worker and starts
//! collecting samples. `save_sample` clones the staged record of a channel
//! group into the queue; the worker trims the pre-trigger window, composes
//! records (patching VLSD indices), optionally batches ~4 MiB DZ blocks,
//! and appends to the file. `finalize_measurement` drains the worker and
//! patches lengths, cycle counters and signal-data links in place.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, error, warn};

use crate::blocks::channel_block::{ChannelBlock, ChannelType};
use crate::blocks::common::BlockHeader;
use crate::blocks::conversion::ConversionBlock;
use crate::blocks::data_list_block::DataListBlock;
use crate::blocks::dz_block::{dz_block_bytes, DzCompressionType};
use crate::blocks::header_list_block::HeaderListBlock;
use crate::blocks::signal_data_block::sd_block_bytes;
use crate::error::MdfError;
use crate::helper;
use crate::parsing::decoder::{encode_channel_value, set_invalidation_bit, DecodedValue};
use crate::writer::mdf_writer::MdfWriter;
use crate::writer::mdf_writer::init::{
    CG_CYCLES_OFFSET, CG_DATA_BYTES_OFFSET, CG_INVAL_BYTES_OFFSET, CG_RECORD_ID_OFFSET,
    CN_DATA_OFFSET, DG_DATA_OFFSET, DG_REC_ID_LEN_OFFSET,
};
use crate::writer::sample_queue::{
    SampleQueue, SampleRecord, WriteState, WORKER_WAKE_INTERVAL,
};

/// Compressed batches target this many bytes of raw records per DZ block.
const DZ_BATCH_SIZE: usize = 4_000_000;

/// Buffers smaller than this are stored as a plain DT instead of a DZ.
const MIN_DZ_PAYLOAD: usize = 100;

const HD_ABS_TIME_OFFSET: u64 = 72;

struct StreamChannel {
    cn_id: String,
    block: ChannelBlock,
}

struct StreamGroup {
    cg_id: String,
    dg_id: String,
    record_id: u64,
    channels: Vec<StreamChannel>,
    data_bytes: usize,
    invalid_bytes: usize,
    /// Staged record body, rewritten by `set_channel_value` calls.
    staged: Vec<u8>,
    staged_vlsd: Option<Vec<u8>>,
    vlsd_channel: Option<usize>,
}

/// Streaming writer over a single MDF 4 file.
pub struct MdfStreamWriter {
    writer: Option<MdfWriter>,
    queue: Arc<SampleQueue>,
    worker: Option<JoinHandle<WorkerOutcome>>,
    groups: Vec<StreamGroup>,
    cg_index: HashMap<String, usize>,
    data_groups: Vec<String>,
    compress: bool,
    pre_trig_ns: u64,
    state: WriteState,
}

impl MdfStreamWriter {
    /// Create the file and write the identification and header skeleton.
    pub fn new(path: &str) -> Result<Self, MdfError> {
        let mut writer = MdfWriter::new(path)?;
        writer.init_mdf_file(helper::now_ns())?;
        Ok(MdfStreamWriter {
            writer: Some(writer),
            queue: Arc::new(SampleQueue::new()),
            worker: None,
            groups: Vec::new(),
            cg_index: HashMap::new(),
            data_groups: Vec::new(),
            compress: false,
            pre_trig_ns: 0,
            state: WriteState::Create,
        })
    }

    /// Retain this many seconds of samples before `start_measurement`.
    pub fn set_pre_trig_time(&mut self, seconds: f64) {
        self.pre_trig_ns = (seconds.max(0.0) * 1e9) as u64;
    }

    /// Batch records into deflated DZ blocks instead of a plain DT.
    pub fn set_compression(&mut self, enabled: bool) {
        self.compress = enabled;
    }

    pub fn state(&self) -> WriteState {
        self.state
    }

    fn writer_mut(&mut self, operation: &'static str) -> Result<&mut MdfWriter, MdfError> {
        if self.state != WriteState::Create {
            return Err(MdfError::WrongPhase {
                operation,
                expected: "Create",
                actual: self.state.as_str(),
            });
        }
        self.writer.as_mut().ok_or(MdfError::WrongPhase {
            operation,
            expected: "Create",
            actual: "Finalize",
        })
    }

    /// Append a data group to the tree.
    pub fn create_data_group(&mut self) -> Result<String, MdfError> {
        let prev = self.data_groups.last().cloned();
        let writer = self.writer_mut("create_data_group")?;
        let dg_id = writer.add_data_group(prev.as_deref())?;
        self.data_groups.push(dg_id.clone());
        Ok(dg_id)
    }

    /// Append a channel group under `dg_id`.
    pub fn create_channel_group(&mut self, dg_id: &str, name: &str) -> Result<String, MdfError> {
        let prev = self
            .groups
            .iter()
            .rev()
            .find(|g| g.dg_id == dg_id)
            .map(|g| g.cg_id.clone());
        let writer = self.writer_mut("create_channel_group")?;
        let cg_id = writer.add_channel_group_with_dg(dg_id, prev.as_deref(), |_| {})?;
        if !name.is_empty() {
            writer.set_channel_group_name(&cg_id, name)?;
        }

        let index = self.groups.len();
        self.groups.push(StreamGroup {
            cg_id: cg_id.clone(),
            dg_id: dg_id.to_string(),
            record_id: 0,
            channels: Vec::new(),
            data_bytes: 0,
            invalid_bytes: 0,
            staged: Vec::new(),
            staged_vlsd: None,
            vlsd_channel: None,
        });
        self.cg_index.insert(cg_id.clone(), index);
        Ok(cg_id)
    }

    /// Append a channel under `cg_id`; layout is assigned automatically
    /// when the configure closure leaves offsets at zero.
    pub fn create_channel<F>(&mut self, cg_id: &str, configure: F) -> Result<String, MdfError>
    where
        F: FnOnce(&mut ChannelBlock),
    {
        let group_index = *self.cg_index.get(cg_id).ok_or_else(|| {
            MdfError::BlockLinkError(format!("unknown channel group {}", cg_id))
        })?;
        let prev = self.groups[group_index]
            .channels
            .last()
            .map(|ch| ch.cn_id.clone());

        let writer = self.writer_mut("create_channel")?;
        let cn_id = writer.add_channel(cg_id, prev.as_deref(), configure)?;
        let block = writer
            .channels_of(cg_id)
            .and_then(|chs| chs.last().cloned())
            .ok_or_else(|| MdfError::BlockLinkError("channel not tracked".to_string()))?;

        let group = &mut self.groups[group_index];
        if block.channel_type == ChannelType::VariableLength {
            group.vlsd_channel = Some(group.channels.len());
        }
        group.channels.push(StreamChannel {
            cn_id: cn_id.clone(),
            block,
        });
        Ok(cn_id)
    }

    /// Mark a channel as the time master of its group.
    pub fn create_time_channel(&mut self, cg_id: &str, name: &str) -> Result<String, MdfError> {
        let cn_id = self.create_channel(cg_id, |ch| {
            ch.name = Some(String::from(name));
            ch.data_type = crate::blocks::common::DataType::FloatLE;
            ch.bit_count = 64;
            ch.unit = Some(String::from("s"));
        })?;
        let group_index = self.cg_index[cg_id];
        {
            let writer = self.writer_mut("create_time_channel")?;
            writer.set_time_channel(&cn_id)?;
        }
        let group = &mut self.groups[group_index];
        if let Some(ch) = group.channels.last_mut() {
            ch.block.channel_type = ChannelType::Master;
            ch.block.sync_type = crate::blocks::channel_block::SyncType::Time;
        }
        Ok(cn_id)
    }

    /// Attach a conversion to a channel.
    pub fn create_conversion(
        &mut self,
        cn_id: &str,
        conversion: &ConversionBlock,
    ) -> Result<(), MdfError> {
        let writer = self.writer_mut("create_conversion")?;
        writer.set_channel_conversion(cn_id, conversion)?;
        for group in &mut self.groups {
            for channel in &mut group.channels {
                if channel.cn_id == cn_id {
                    channel.block.conversion = Some(conversion.clone());
                }
            }
        }
        Ok(())
    }

    /// Validate the tree, flush the skeleton and start the worker.
    pub fn init_measurement(&mut self) -> Result<(), MdfError> {
        if self.state != WriteState::Create {
            return Err(MdfError::WrongPhase {
                operation: "init_measurement",
                expected: "Create",
                actual: self.state.as_str(),
            });
        }
        let mut writer = self.writer.take().ok_or(MdfError::WrongPhase {
            operation: "init_measurement",
            expected: "Create",
            actual: "Finalize",
        })?;

        // Compute per-group record geometry and validate channel layouts.
        let mut worker_dgs: Vec<WorkerDg> = Vec::new();
        let mut dg_lookup: HashMap<String, usize> = HashMap::new();
        for dg_id in &self.data_groups {
            dg_lookup.insert(dg_id.clone(), worker_dgs.len());
            worker_dgs.push(WorkerDg::new(dg_id.clone()));
        }

        for group in &mut self.groups {
            let mut data_bytes = 0usize;
            let mut invalidation_bits = 0u32;
            let mut master_count = 0usize;
            for channel in &group.channels {
                let block = &channel.block;
                let end = block.byte_offset as usize + block.byte_width();
                data_bytes = data_bytes.max(end);
                if block.uses_invalidation_bit() {
                    invalidation_bits = invalidation_bits.max(block.pos_invalidation_bit + 1);
                }
                if block.channel_type.is_master() {
                    master_count += 1;
                }
                if block.data_type.is_numeric()
                    && block.channel_type == ChannelType::FixedLength
                    && block.bit_count > 64
                {
                    return Err(MdfError::InvalidBitLayout(format!(
                        "channel {} declares {} bits",
                        channel.cn_id, block.bit_count
                    )));
                }
            }
            if master_count > 1 {
                return Err(MdfError::BlockSerializationError(format!(
                    "channel group {} has {} master channels",
                    group.cg_id, master_count
                )));
            }
            if master_count == 0 {
                debug!("channel group {} is masterless", group.cg_id);
            }
            group.data_bytes = data_bytes;
            group.invalid_bytes = invalidation_bits.div_ceil(8) as usize;
            group.staged = vec![0u8; group.data_bytes + group.invalid_bytes];

            writer.update_block_u32(&group.cg_id, CG_DATA_BYTES_OFFSET, group.data_bytes as u32)?;
            writer.update_block_u32(
                &group.cg_id,
                CG_INVAL_BYTES_OFFSET,
                group.invalid_bytes as u32,
            )?;
        }

        // Record-id width per data group: none for a single group, else
        // the smallest width that can carry the highest id.
        for (dg_index, dg) in worker_dgs.iter_mut().enumerate() {
            let members: Vec<usize> = self
                .groups
                .iter()
                .enumerate()
                .filter(|(_, g)| dg_lookup[&g.dg_id] == dg_index)
                .map(|(i, _)| i)
                .collect();
            let rec_id_len: usize = if members.len() <= 1 {
                0
            } else {
                match members.len() {
                    n if n < 0x100 => 1,
                    n if n < 0x10000 => 2,
                    n if n < 0x1_0000_0000 => 4,
                    _ => 8,
                }
            };
            dg.rec_id_len = rec_id_len;
            writer.update_block_u8(&dg.dg_id, DG_REC_ID_LEN_OFFSET, rec_id_len as u8)?;

            for (ordinal, &group_index) in members.iter().enumerate() {
                let group = &mut self.groups[group_index];
                group.record_id = if rec_id_len == 0 { 0 } else { ordinal as u64 + 1 };
                writer.update_block_u64(&group.cg_id, CG_RECORD_ID_OFFSET, group.record_id)?;
                dg.groups.push(WorkerGroup {
                    cg_id: group.cg_id.clone(),
                    record_id: group.record_id,
                    cycle_count: 0,
                    vlsd: group.vlsd_channel.map(|idx| WorkerVlsd {
                        cn_id: group.channels[idx].cn_id.clone(),
                        byte_offset: group.channels[idx].block.byte_offset as usize,
                        sd_stream: Vec::new(),
                    }),
                });
            }
        }

        // Uncompressed runs append into one open DT per data group.
        if !self.compress {
            for dg in &mut worker_dgs {
                let header = BlockHeader::new("##DT", 24, 0);
                let dt_id = format!("dt_{}_stream", dg.dg_id);
                let dt_pos = writer.write_block_with_id(&header.to_bytes()?, &dt_id)?;
                writer.update_block_link(&dg.dg_id, DG_DATA_OFFSET, &dt_id)?;
                dg.open_dt = Some(DtState {
                    start_pos: dt_pos,
                    bytes: 0,
                    positions: vec![dt_pos],
                    sizes: Vec::new(),
                });
            }
        }
        writer.flush()?;

        // Hand the file to the worker and start collecting samples.
        {
            let mut inner = self.queue.inner.lock().unwrap();
            inner.state = WriteState::Init;
            inner.pre_trig_ns = self.pre_trig_ns;
            inner.stop_thread = false;
        }
        self.state = WriteState::Init;

        let queue = Arc::clone(&self.queue);
        let compress = self.compress;
        let handle = std::thread::spawn(move || worker_thread(writer, worker_dgs, queue, compress));
        self.worker = Some(handle);
        Ok(())
    }

    /// Stage a channel value into the group's current record buffer.
    pub fn set_channel_value(
        &mut self,
        cg_id: &str,
        cn_id: &str,
        value: &DecodedValue,
        valid: bool,
    ) -> Result<(), MdfError> {
        let group_index = *self.cg_index.get(cg_id).ok_or_else(|| {
            MdfError::BlockLinkError(format!("unknown channel group {}", cg_id))
        })?;
        let group = &mut self.groups[group_index];
        if group.staged.is_empty() {
            return Err(MdfError::WrongPhase {
                operation: "set_channel_value",
                expected: "Init",
                actual: "Create",
            });
        }
        let channel_index = group
            .channels
            .iter()
            .position(|ch| ch.cn_id == cn_id)
            .ok_or_else(|| MdfError::BlockLinkError(format!("unknown channel {}", cn_id)))?;
        let channel = &group.channels[channel_index].block;

        if channel.channel_type == ChannelType::VariableLength {
            let bytes = match value {
                DecodedValue::String(s) => s.as_bytes().to_vec(),
                DecodedValue::ByteArray(b) => b.clone(),
                other => {
                    return Err(MdfError::Unrepresentable(format!(
                        "{:?} cannot be stored in a variable-length channel",
                        other
                    )))
                }
            };
            group.staged_vlsd = Some(bytes);
            // The index slot is patched by the worker at write time.
            return Ok(());
        }

        encode_channel_value(&mut group.staged, 0, channel, value)?;
        set_invalidation_bit(
            &mut group.staged,
            0,
            group.data_bytes as u32,
            channel,
            valid,
        );
        Ok(())
    }

    /// Clone the staged record of `cg_id` into the queue.
    pub fn save_sample(&mut self, cg_id: &str, timestamp_ns: u64) -> Result<(), MdfError> {
        let group_index = *self.cg_index.get(cg_id).ok_or_else(|| {
            MdfError::BlockLinkError(format!("unknown channel group {}", cg_id))
        })?;
        let group = &mut self.groups[group_index];

        let mut inner = self.queue.inner.lock().unwrap();
        match inner.state {
            WriteState::Create | WriteState::Finalize => {
                return Err(MdfError::WrongPhase {
                    operation: "save_sample",
                    expected: "Init/StartMeas/StopMeas",
                    actual: inner.state.as_str(),
                });
            }
            _ => {}
        }
        if inner.poisoned {
            warn!("writer poisoned; sample dropped");
            return Ok(());
        }

        let sample = SampleRecord {
            record_id: group.record_id,
            timestamp_ns,
            record_bytes: group.staged.clone(),
            vlsd_bytes: group.staged_vlsd.take(),
        };
        inner.queue_bytes += sample.sample_size();
        inner.deque.push_back(sample);
        drop(inner);
        self.queue.signal.notify_one();
        Ok(())
    }

    /// Start flushing samples to disk; older samples outside the
    /// pre-trigger window are dropped.
    pub fn start_measurement(&mut self, start_time_ns: u64) {
        let mut inner = self.queue.inner.lock().unwrap();
        if inner.state != WriteState::Init {
            return;
        }
        inner.start_time_ns = start_time_ns;
        let keep_from = start_time_ns.saturating_sub(inner.pre_trig_ns);
        while let Some(front) = inner.deque.front() {
            if front.timestamp_ns < keep_from {
                let dropped = inner.deque.pop_front().unwrap();
                inner.queue_bytes -= dropped.sample_size();
            } else {
                break;
            }
        }
        inner.state = WriteState::StartMeas;
        self.state = WriteState::StartMeas;
        drop(inner);
        self.queue.signal.notify_one();
    }

    /// Stop collecting; samples after `stop_time_ns` are discarded.
    pub fn stop_measurement(&mut self, stop_time_ns: u64) {
        let mut inner = self.queue.inner.lock().unwrap();
        if inner.state != WriteState::StartMeas && inner.state != WriteState::Init {
            return;
        }
        inner.stop_time_ns = stop_time_ns;
        inner.state = WriteState::StopMeas;
        self.state = WriteState::StopMeas;
        drop(inner);
        self.queue.signal.notify_one();
    }

    /// Drain the worker and patch sizes, cycle counters and VLSD links.
    /// Safe to call twice; the second call is a no-op.
    pub fn finalize_measurement(&mut self) -> Result<(), MdfError> {
        if self.state == WriteState::Finalize {
            return Ok(());
        }
        if self.state == WriteState::Create {
            // Nothing streamed; just flush the skeleton.
            if let Some(mut writer) = self.writer.take() {
                writer.flush()?;
            }
            self.state = WriteState::Finalize;
            return Ok(());
        }

        {
            let mut inner = self.queue.inner.lock().unwrap();
            if inner.state == WriteState::StartMeas || inner.state == WriteState::Init {
                inner.stop_time_ns = u64::MAX;
                inner.state = WriteState::StopMeas;
            }
            inner.stop_thread = true;
        }
        self.queue.signal.notify_one();

        let outcome = match self.worker.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| MdfError::BlockLinkError("worker thread panicked".to_string()))?,
            None => {
                self.state = WriteState::Finalize;
                return Ok(());
            }
        };
        let mut writer = outcome.writer;
        if let Some(err) = &outcome.error {
            error!("worker stopped after error: {}", err);
        }

        // Patch the measurement start time and per-group cycle counters.
        let start_time = self.queue.inner.lock().unwrap().start_time_ns;
        if start_time != 0 {
            if let Some(hd_pos) = writer.get_block_position("hd_block") {
                writer.update_link(hd_pos + HD_ABS_TIME_OFFSET, start_time)?;
            }
        }
        for dg in &outcome.dgs {
            for group in &dg.groups {
                writer.update_block_u64(&group.cg_id, CG_CYCLES_OFFSET, group.cycle_count)?;
            }
        }

        {
            let mut inner = self.queue.inner.lock().unwrap();
            inner.state = WriteState::Finalize;
        }
        self.state = WriteState::Finalize;
        writer.flush()?;
        self.writer = Some(writer);
        Ok(())
    }
}

impl Drop for MdfStreamWriter {
    fn drop(&mut self) {
        if self.state != WriteState::Finalize {
            if let Err(err) = self.finalize_measurement() {
                error!("finalize on drop failed: {}", err);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Worker side
// ---------------------------------------------------------------------------

struct DtState {
    start_pos: u64,
    bytes: u64,
    positions: Vec<u64>,
    sizes: Vec<u64>,
}

struct WorkerVlsd {
    cn_id: String,
    byte_offset: usize,
    sd_stream: Vec<u8>,
}

struct WorkerGroup {
    cg_id: String,
    record_id: u64,
    cycle_count: u64,
    vlsd: Option<WorkerVlsd>,
}

struct WorkerDg {
    dg_id: String,
    rec_id_len: usize,
    groups: Vec<WorkerGroup>,
    open_dt: Option<DtState>,
    /// Compressed path: staged raw records awaiting deflation.
    staging: Vec<u8>,
    /// Written DZ/DT leaves: (file position, uncompressed length).
    dz_entries: Vec<(u64, u64)>,
    /// Cumulative uncompressed offset of the next leaf.
    logical_offset: u64,
}

impl WorkerDg {
    fn new(dg_id: String) -> Self {
        WorkerDg {
            dg_id,
            rec_id_len: 0,
            groups: Vec::new(),
            open_dt: None,
            staging: Vec::new(),
            dz_entries: Vec::new(),
            logical_offset: 0,
        }
    }
}

struct WorkerOutcome {
    writer: MdfWriter,
    dgs: Vec<WorkerDg>,
    error: Option<String>,
}

/// Maximum bytes of one DT block's payload before rolling over.
const DT_ROLL_SIZE: u64 = super::mdf_writer::MAX_DT_BLOCK_SIZE as u64 - 24;

fn worker_thread(
    writer: MdfWriter,
    dgs: Vec<WorkerDg>,
    queue: Arc<SampleQueue>,
    compress: bool,
) -> WorkerOutcome {
    let mut ctx = WorkerOutcome {
        writer,
        dgs,
        error: None,
    };

    loop {
        // Take a snapshot under the lock, then write with the lock
        // released so producers only ever block briefly.
        let (batch, stop_time, drop_late, stop_thread) = {
            let guard = queue.inner.lock().unwrap();
            // Skip the wait when there is already work or a stop request;
            // a notify sent while writing must not cost a full period.
            let pending = guard.stop_thread
                || (!guard.deque.is_empty()
                    && matches!(
                        guard.state,
                        WriteState::StartMeas | WriteState::StopMeas
                    ));
            let mut guard = if pending {
                guard
            } else {
                queue
                    .signal
                    .wait_timeout(guard, WORKER_WAKE_INTERVAL)
                    .unwrap()
                    .0
            };

            match guard.state {
                WriteState::Init => {
                    let newest = guard.deque.back().map(|s| s.timestamp_ns).unwrap_or(0);
                    SampleQueue::trim(&mut guard, newest);
                    (Vec::new(), u64::MAX, false, guard.stop_thread)
                }
                WriteState::StartMeas | WriteState::StopMeas => {
                    let batch: Vec<SampleRecord> = guard.deque.drain(..).collect();
                    guard.queue_bytes = 0;
                    let drop_late = guard.state == WriteState::StopMeas;
                    (batch, guard.stop_time_ns, drop_late, guard.stop_thread)
                }
                _ => (Vec::new(), u64::MAX, false, guard.stop_thread),
            }
        };

        process_batch(&mut ctx, batch, stop_time, drop_late, compress, false, &queue);

        if stop_thread {
            break;
        }
    }

    // Final drain plus tail assembly.
    let (batch, stop_time) = {
        let mut guard = queue.inner.lock().unwrap();
        let batch: Vec<SampleRecord> = guard.deque.drain(..).collect();
        guard.queue_bytes = 0;
        let stop_time = if guard.stop_time_ns == 0 {
            u64::MAX
        } else {
            guard.stop_time_ns
        };
        (batch, stop_time)
    };
    process_batch(&mut ctx, batch, stop_time, true, compress, true, &queue);
    if let Err(err) = finish_data(&mut ctx, compress) {
        ctx.error = Some(err.to_string());
    }
    ctx
}

/// Persist one drained batch. With `finalize` set, partial compressed
/// batches are flushed too.
fn process_batch(
    ctx: &mut WorkerOutcome,
    batch: Vec<SampleRecord>,
    stop_time: u64,
    drop_late: bool,
    compress: bool,
    finalize: bool,
    queue: &SampleQueue,
) {
    let mut failed: Option<String> = None;

    for sample in batch {
        if drop_late && sample.timestamp_ns > stop_time {
            debug!("dropping sample after stop time");
            continue;
        }
        if failed.is_some() {
            continue;
        }
        if let Err(err) = write_sample(ctx, sample, compress) {
            error!("worker write failed: {}", err);
            failed = Some(err.to_string());
        }
    }

    if failed.is_none() {
        let tail = if compress {
            flush_full_batches(ctx, finalize)
        } else {
            patch_open_dt_sizes(ctx)
        };
        if let Err(err) = tail {
            error!("worker flush failed: {}", err);
            failed = Some(err.to_string());
        }
    }

    if let Some(message) = failed {
        ctx.error = Some(message);
        queue.inner.lock().unwrap().poisoned = true;
    }
}

fn write_sample(
    ctx: &mut WorkerOutcome,
    mut sample: SampleRecord,
    compress: bool,
) -> Result<(), MdfError> {
    let dg_index = ctx
        .dgs
        .iter()
        .position(|dg| dg.groups.iter().any(|g| g.record_id == sample.record_id))
        .ok_or(MdfError::RecordIdNotFound {
            record_id: sample.record_id,
        })?;

    // Resolve VLSD payload first: append to the channel's SD stream and
    // patch the index into the fixed record slot.
    {
        let dg = &mut ctx.dgs[dg_index];
        let group = dg
            .groups
            .iter_mut()
            .find(|g| g.record_id == sample.record_id)
            .unwrap();
        group.cycle_count += 1;
        if let (Some(vlsd), Some(payload)) = (group.vlsd.as_mut(), sample.vlsd_bytes.take()) {
            let index = vlsd.sd_stream.len() as u64;
            vlsd.sd_stream
                .extend_from_slice(&(payload.len() as u32).to_le_bytes());
            vlsd.sd_stream.extend_from_slice(&payload);
            let slot = vlsd.byte_offset;
            if slot + 8 <= sample.record_bytes.len() {
                sample.record_bytes[slot..slot + 8].copy_from_slice(&index.to_le_bytes());
            }
        }
    }

    let rec_id_len = ctx.dgs[dg_index].rec_id_len;
    let mut record = Vec::with_capacity(rec_id_len + sample.record_bytes.len());
    match rec_id_len {
        0 => {}
        1 => record.push(sample.record_id as u8),
        2 => record.extend_from_slice(&(sample.record_id as u16).to_le_bytes()),
        4 => record.extend_from_slice(&(sample.record_id as u32).to_le_bytes()),
        _ => record.extend_from_slice(&sample.record_id.to_le_bytes()),
    }
    record.extend_from_slice(&sample.record_bytes);

    if compress {
        // Flush before the record would cross the batch boundary so a DZ
        // block never splits a single record.
        let staged = ctx.dgs[dg_index].staging.len();
        if staged > 0 && staged + record.len() > DZ_BATCH_SIZE {
            flush_one_batch(ctx, dg_index, staged)?;
        }
        ctx.dgs[dg_index].staging.extend_from_slice(&record);
        return Ok(());
    }

    // Uncompressed: append into the open DT, rolling over at the limit.
    let needs_roll = {
        let dt = ctx.dgs[dg_index].open_dt.as_ref().ok_or_else(|| {
            MdfError::BlockSerializationError("no open DT for data group".to_string())
        })?;
        dt.bytes + record.len() as u64 > DT_ROLL_SIZE
    };
    if needs_roll {
        let (start_pos, bytes) = {
            let dt = ctx.dgs[dg_index].open_dt.as_ref().unwrap();
            (dt.start_pos, dt.bytes)
        };
        ctx.writer.update_link(start_pos + 8, 24 + bytes)?;
        let header = BlockHeader::new("##DT", 24, 0);
        let dt_id = format!("dt_{}_roll_{}", ctx.dgs[dg_index].dg_id, start_pos);
        let new_pos = ctx.writer.write_block_with_id(&header.to_bytes()?, &dt_id)?;
        let dt = ctx.dgs[dg_index].open_dt.as_mut().unwrap();
        dt.sizes.push(bytes);
        dt.positions.push(new_pos);
        dt.start_pos = new_pos;
        dt.bytes = 0;
    }

    ctx.writer.write_raw(&record)?;
    let dt = ctx.dgs[dg_index].open_dt.as_mut().unwrap();
    dt.bytes += record.len() as u64;
    Ok(())
}

/// Keep the open DT headers honest after every drain so an unfinalized
/// file stays readable up to the last flush.
fn patch_open_dt_sizes(ctx: &mut WorkerOutcome) -> Result<(), MdfError> {
    let updates: Vec<(u64, u64)> = ctx
        .dgs
        .iter()
        .filter_map(|dg| dg.open_dt.as_ref())
        .map(|dt| (dt.start_pos + 8, 24 + dt.bytes))
        .collect();
    for (position, length) in updates {
        ctx.writer.update_link(position, length)?;
    }
    ctx.writer.flush()?;
    Ok(())
}

/// Write out the remaining partial batches; record-aligned full batches
/// were already emitted inline by [`write_sample`].
fn flush_full_batches(ctx: &mut WorkerOutcome, finalize: bool) -> Result<(), MdfError> {
    if !finalize {
        return Ok(());
    }
    for dg_index in 0..ctx.dgs.len() {
        let rest = ctx.dgs[dg_index].staging.len();
        if rest > 0 {
            flush_one_batch(ctx, dg_index, rest)?;
        }
    }
    Ok(())
}

fn flush_one_batch(
    ctx: &mut WorkerOutcome,
    dg_index: usize,
    flush_len: usize,
) -> Result<(), MdfError> {
    let batch: Vec<u8> = ctx.dgs[dg_index].staging.drain(..flush_len).collect();
    // Tiny tails do not benefit from deflation; store them raw.
    let block_bytes = if batch.len() < MIN_DZ_PAYLOAD {
        crate::blocks::data_block::dt_block_bytes(&batch)?
    } else {
        dz_block_bytes(b"DT", DzCompressionType::Deflate, 0, &batch)?
    };
    let pos = ctx.writer.write_block(&block_bytes)?;
    let dg = &mut ctx.dgs[dg_index];
    dg.dz_entries.push((pos, dg.logical_offset));
    dg.logical_offset += batch.len() as u64;
    Ok(())
}

/// Assemble trailing structures: SD blocks for VLSD channels, the final
/// DT sizes or the HL/DL list for the compressed path.
fn finish_data(ctx: &mut WorkerOutcome, compress: bool) -> Result<(), MdfError> {
    for dg_index in 0..ctx.dgs.len() {
        // VLSD signal data lands in one SD block per channel.
        let sd_writes: Vec<(String, Vec<u8>)> = ctx.dgs[dg_index]
            .groups
            .iter()
            .filter_map(|group| group.vlsd.as_ref())
            .filter(|vlsd| !vlsd.sd_stream.is_empty())
            .map(|vlsd| (vlsd.cn_id.clone(), vlsd.sd_stream.clone()))
            .collect();
        for (cn_id, stream) in sd_writes {
            let sd_id = format!("sd_{}", cn_id);
            let bytes = sd_block_bytes(&stream)?;
            ctx.writer.write_block_with_id(&bytes, &sd_id)?;
            ctx.writer
                .update_block_link(&cn_id, CN_DATA_OFFSET, &sd_id)?;
        }

        if compress {
            let entries = std::mem::take(&mut ctx.dgs[dg_index].dz_entries);
            if entries.is_empty() {
                continue;
            }
            let (positions, offsets): (Vec<u64>, Vec<u64>) = entries.into_iter().unzip();
            let dl_block = DataListBlock::new_with_offsets(positions, offsets);
            let dl_id = format!("dl_{}_stream", ctx.dgs[dg_index].dg_id);
            ctx.writer.write_block_with_id(&dl_block.to_bytes()?, &dl_id)?;

            let mut hl_block = HeaderListBlock::new(DzCompressionType::Deflate);
            hl_block.first_dl_addr = ctx.writer.get_block_position(&dl_id).unwrap_or(0);
            let hl_id = format!("hl_{}_stream", ctx.dgs[dg_index].dg_id);
            ctx.writer.write_block_with_id(&hl_block.to_bytes()?, &hl_id)?;
            let dg_id = ctx.dgs[dg_index].dg_id.clone();
            ctx.writer.update_block_link(&dg_id, DG_DATA_OFFSET, &hl_id)?;
        } else if let Some(dt) = ctx.dgs[dg_index].open_dt.as_ref() {
            let (position, length) = (dt.start_pos + 8, 24 + dt.bytes);
            ctx.writer.update_link(position, length)?;
            if ctx.dgs[dg_index]
                .open_dt
                .as_ref()
                .map(|dt| dt.positions.len() > 1)
                .unwrap_or(false)
            {
                // Rolled-over DTs get stitched with an offset list.
                let dt = ctx.dgs[dg_index].open_dt.as_ref().unwrap();
                let mut offsets = Vec::with_capacity(dt.positions.len());
                let mut logical = 0u64;
                for size in &dt.sizes {
                    offsets.push(logical);
                    logical += size;
                }
                offsets.push(logical);
                let dl_block = DataListBlock::new_with_offsets(dt.positions.clone(), offsets);
                let dl_id = format!("dl_{}_stream", ctx.dgs[dg_index].dg_id);
                ctx.writer.write_block_with_id(&dl_block.to_bytes()?, &dl_id)?;
                let dg_id = ctx.dgs[dg_index].dg_id.clone();
                ctx.writer.update_block_link(&dg_id, DG_DATA_OFFSET, &dl_id)?;
            }
        }
    }
    ctx.writer.flush()?;
    Ok(())
}
