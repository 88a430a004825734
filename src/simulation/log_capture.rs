//! Log capture for routing simulator logs to per-model log streams.
//!
//! Every model logs with a `[id]` prefix, for example `[3] dcf: backoff 5 slots`. The [`TeeLogger`]
//! forwards each record to the wrapped `env_logger` and, for records coming from this crate, extracts
//! the model id from the prefix and keeps the entry in a bounded global buffer. The run report reads
//! the buffer back per model.

use chrono::{DateTime, Utc};
use log::{Level, Log, Metadata, Record};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::kernel::ModelId;

/// Maximum number of log entries to buffer before the oldest are dropped.
const LOG_BUFFER_CAPACITY: usize = 10000;

const CAPTURED_CRATE: &str = "swarm_radio_simulator";

/// A captured log entry with extracted model id.
#[derive(Debug, Clone)]
pub struct CapturedLogEntry {
    pub model: ModelId,
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub target: String,
    pub content: String,
}

/// Global buffer for captured log entries.
static CAPTURED_LOGS: Mutex<Option<VecDeque<CapturedLogEntry>>> = Mutex::new(None);

/// Initialize (or reset) the log capture buffer.
pub fn init_log_capture() {
    let mut guard = CAPTURED_LOGS.lock().unwrap_or_else(PoisonError::into_inner);
    *guard = Some(VecDeque::with_capacity(LOG_BUFFER_CAPACITY));
}

/// Drain all captured log entries from the buffer.
pub fn drain_captured_logs() -> Vec<CapturedLogEntry> {
    let mut guard = CAPTURED_LOGS.lock().unwrap_or_else(PoisonError::into_inner);
    guard.as_mut().map(|buffer| buffer.drain(..).collect()).unwrap_or_default()
}

/// Copies of the buffered entries of one model, oldest first.
pub fn captured_logs_for(model: ModelId) -> Vec<CapturedLogEntry> {
    let guard = CAPTURED_LOGS.lock().unwrap_or_else(PoisonError::into_inner);
    guard
        .as_ref()
        .map(|buffer| buffer.iter().filter(|entry| entry.model == model).cloned().collect())
        .unwrap_or_default()
}

fn push_log_entry(entry: CapturedLogEntry) {
    let mut guard = CAPTURED_LOGS.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(buffer) = guard.as_mut() {
        if buffer.len() >= LOG_BUFFER_CAPACITY {
            buffer.pop_front();
        }
        buffer.push_back(entry);
    }
}

/// Split a `[N] ...` message into the model id and the rest.
fn extract_model_id(message: &str) -> Option<(ModelId, &str)> {
    let trimmed = message.trim_start().strip_prefix('[')?;
    let end_bracket = trimmed.find(']')?;
    let id: u32 = trimmed[..end_bracket].parse().ok()?;
    Some((ModelId(id), trimmed[end_bracket + 1..].trim_start()))
}

/// A tee logger that forwards to `env_logger` and captures model-tagged records of this crate.
pub struct TeeLogger {
    inner: env_logger::Logger,
}

impl TeeLogger {
    pub fn new(inner: env_logger::Logger) -> Self {
        Self { inner }
    }

    /// Maximum level filter of the inner logger.
    pub fn filter(&self) -> log::LevelFilter {
        self.inner.filter()
    }
}

impl Log for TeeLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        self.inner.log(record);

        if !self.inner.matches(record) || !record.module_path().is_some_and(|module| module.starts_with(CAPTURED_CRATE)) {
            return;
        }
        let message = record.args().to_string();
        if let Some((model, content)) = extract_model_id(&message) {
            push_log_entry(CapturedLogEntry {
                model,
                timestamp: Utc::now(),
                level: record.level(),
                target: record.target().to_string(),
                content: content.to_string(),
            });
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}
