//! Structured scan log
//!
//! Entries are buffered for later retrieval, pushed synchronously to any
//! registered listener, and mirrored to `tracing`. Listeners run on the
//! scanning task and must return quickly.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::session::ScanPhase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    Info,
    Success,
    Warning,
    Error,
    Debug,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanLogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub log_type: LogType,
    pub phase: ScanPhase,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ScanLogEntry {
    pub fn new(
        log_type: LogType,
        phase: ScanPhase,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            log_type,
            phase,
            title: title.into(),
            message: message.into(),
            details: None,
            metadata: BTreeMap::new(),
            duration_ms: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_duration(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }
}

/// Handle returned by [`ScanLog::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

pub type LogListener = Arc<dyn Fn(&ScanLogEntry) + Send + Sync>;

#[derive(Default)]
struct LogState {
    entries: Vec<ScanLogEntry>,
    listeners: BTreeMap<ListenerId, LogListener>,
}

/// Shared, cloneable log. Clones see the same entries and listeners.
#[derive(Clone, Default)]
pub struct ScanLog {
    state: Arc<Mutex<LogState>>,
    next_listener: Arc<AtomicU64>,
}

impl std::fmt::Debug for ScanLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanLog").field("entries", &self.len()).finish()
    }
}

impl ScanLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_listener(&self, listener: impl Fn(&ScanLogEntry) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.lock().listeners.insert(id, Arc::new(listener));
        id
    }

    /// Returns false if `id` was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.lock().listeners.remove(&id).is_some()
    }

    pub fn emit(&self, entry: ScanLogEntry) {
        match entry.log_type {
            LogType::Error => {
                tracing::error!(phase = %entry.phase, "{}: {}", entry.title, entry.message)
            }
            LogType::Warning => {
                tracing::warn!(phase = %entry.phase, "{}: {}", entry.title, entry.message)
            }
            LogType::Debug => {
                tracing::debug!(phase = %entry.phase, "{}: {}", entry.title, entry.message)
            }
            LogType::Info | LogType::Success => {
                tracing::info!(phase = %entry.phase, "{}: {}", entry.title, entry.message)
            }
        }

        // Listeners are invoked outside the lock so they may call back in.
        let listeners: Vec<LogListener> = {
            let mut state = self.lock();
            state.entries.push(entry.clone());
            state.listeners.values().cloned().collect()
        };
        for listener in listeners {
            listener(&entry);
        }
    }

    pub fn info(&self, phase: ScanPhase, title: &str, message: impl Into<String>) {
        self.emit(ScanLogEntry::new(LogType::Info, phase, title, message));
    }

    pub fn success(&self, phase: ScanPhase, title: &str, message: impl Into<String>) {
        self.emit(ScanLogEntry::new(LogType::Success, phase, title, message));
    }

    pub fn warning(&self, phase: ScanPhase, title: &str, message: impl Into<String>) {
        self.emit(ScanLogEntry::new(LogType::Warning, phase, title, message));
    }

    pub fn error(&self, phase: ScanPhase, title: &str, message: impl Into<String>) {
        self.emit(ScanLogEntry::new(LogType::Error, phase, title, message));
    }

    pub fn entries(&self) -> Vec<ScanLogEntry> {
        self.lock().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn entries_are_buffered_in_order() {
        let log = ScanLog::new();
        log.info(ScanPhase::Init, "Start", "scanning");
        log.warning(ScanPhase::ToolAnalysis, "Slow", "tool took long");

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].log_type, LogType::Info);
        assert_eq!(entries[1].phase, ScanPhase::ToolAnalysis);
    }

    #[test]
    fn listeners_receive_until_removed() {
        let log = ScanLog::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let id = log.add_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        log.info(ScanPhase::Init, "a", "1");
        assert!(log.remove_listener(id));
        log.info(ScanPhase::Init, "b", "2");

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(!log.remove_listener(id));
    }

    #[test]
    fn listener_may_read_log() {
        let log = ScanLog::new();
        let inner = log.clone();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        log.add_listener(move |_| {
            counter.store(inner.len(), Ordering::SeqCst);
        });
        log.info(ScanPhase::Init, "a", "1");
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn entry_serializes_type_field() {
        let entry = ScanLogEntry::new(LogType::Error, ScanPhase::Summary, "t", "m")
            .with_details("raw")
            .with_metadata("component", "exec")
            .with_duration(12);
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["phase"], "summary");
        assert_eq!(value["metadata"]["component"], "exec");
        assert_eq!(value["durationMs"], 12);
    }
}
