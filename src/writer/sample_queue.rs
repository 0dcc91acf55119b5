//! The producer/consumer handoff between `save_sample` and the worker.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Writer lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    /// File not yet opened; samples are rejected.
    Create,
    /// Worker running; samples collect in the queue, trimmed to the
    /// pre-trigger window.
    Init,
    /// Samples are flushed to disk in order.
    StartMeas,
    /// Remaining samples up to the stop time drain; later ones drop.
    StopMeas,
    /// Worker exited; metadata patched.
    Finalize,
}

impl WriteState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteState::Create => "Create",
            WriteState::Init => "Init",
            WriteState::StartMeas => "StartMeas",
            WriteState::StopMeas => "StopMeas",
            WriteState::Finalize => "Finalize",
        }
    }
}

/// One staged sample: the composed record plus optional variable-length
/// payload whose index the worker patches in at write time.
#[derive(Debug, Clone)]
pub struct SampleRecord {
    pub record_id: u64,
    pub timestamp_ns: u64,
    /// Record body: data bytes plus invalidation bytes, no record id.
    pub record_bytes: Vec<u8>,
    pub vlsd_bytes: Option<Vec<u8>>,
}

impl SampleRecord {
    pub fn sample_size(&self) -> usize {
        self.record_bytes.len() + self.vlsd_bytes.as_ref().map_or(0, |v| v.len())
    }
}

#[derive(Debug)]
pub struct QueueInner {
    pub deque: VecDeque<SampleRecord>,
    pub state: WriteState,
    pub stop_thread: bool,
    pub start_time_ns: u64,
    pub stop_time_ns: u64,
    pub pre_trig_ns: u64,
    pub queue_bytes: usize,
    /// Set when the worker hit an unrecoverable error; producers drop
    /// samples from then on.
    pub poisoned: bool,
}

/// Mutex+condvar pair shared between the caller and the worker thread.
#[derive(Debug)]
pub struct SampleQueue {
    pub inner: Mutex<QueueInner>,
    pub signal: Condvar,
}

/// Periodic worker wake-up when no signal arrives.
pub const WORKER_WAKE_INTERVAL: Duration = Duration::from_secs(10);

impl SampleQueue {
    pub fn new() -> Self {
        SampleQueue {
            inner: Mutex::new(QueueInner {
                deque: VecDeque::new(),
                state: WriteState::Create,
                stop_thread: false,
                start_time_ns: 0,
                stop_time_ns: 0,
                pre_trig_ns: 0,
                queue_bytes: 0,
                poisoned: false,
            }),
            signal: Condvar::new(),
        }
    }

    /// Enqueue a sample; FIFO order is the on-disk order per group.
    pub fn push(&self, sample: SampleRecord) {
        let mut inner = self.inner.lock().unwrap();
        inner.queue_bytes += sample.sample_size();
        inner.deque.push_back(sample);
        self.signal.notify_one();
    }

    /// Drop queued samples older than the pre-trigger window. Runs in
    /// state Init, keeping `now - pre_trig` worth of history.
    pub fn trim(inner: &mut QueueInner, now_ns: u64) {
        let keep_from = now_ns.saturating_sub(inner.pre_trig_ns);
        while let Some(front) = inner.deque.front() {
            if front.timestamp_ns < keep_from {
                let dropped = inner.deque.pop_front().unwrap();
                inner.queue_bytes -= dropped.sample_size();
            } else {
                break;
            }
        }
    }
}

impl Default for SampleQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: u64) -> SampleRecord {
        SampleRecord {
            record_id: 0,
            timestamp_ns: ts,
            record_bytes: vec![0; 8],
            vlsd_bytes: None,
        }
    }

    #[test]
    fn trim_keeps_pre_trigger_window() {
        let queue = SampleQueue::new();
        {
            let mut inner = queue.inner.lock().unwrap();
            inner.pre_trig_ns = 1_000;
            for ts in [100, 500, 900, 1_500, 2_100] {
                inner.deque.push_back(sample(ts));
                inner.queue_bytes += 8;
            }
            SampleQueue::trim(&mut inner, 2_200);
            let kept: Vec<u64> = inner.deque.iter().map(|s| s.timestamp_ns).collect();
            assert_eq!(kept, vec![1_500, 2_100]);
            assert_eq!(inner.queue_bytes, 16);
        }
    }

    #[test]
    fn trim_without_window_drops_history() {
        let queue = SampleQueue::new();
        let mut inner = queue.inner.lock().unwrap();
        for ts in [1, 2, 3] {
            inner.deque.push_back(sample(ts));
            inner.queue_bytes += 8;
        }
        SampleQueue::trim(&mut inner, 10);
        assert!(inner.deque.is_empty());
        assert_eq!(inner.queue_bytes, 0);
    }
}
