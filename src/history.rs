//! Bounded in-memory log of dispatched consequences.
//! The UI queries this for the session timeline; nothing is persisted —
//! session state does not outlive the session.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

use crate::violation::{Consequence, Modality};

/// One dispatched consequence. `sequence` is monotonic per session and
/// totally orders records within a modality.
#[derive(Debug, Clone, Serialize)]
pub struct ConsequenceRecord {
    pub session_id: String,
    pub sequence: u64,
    pub modality: Modality,
    pub consequence: Consequence,
    /// Unix timestamp, seconds.
    pub recorded_at: i64,
}

/// Ring-bounded consequence log; oldest entries are evicted first.
pub struct ConsequenceLog {
    entries: Mutex<VecDeque<ConsequenceRecord>>,
    capacity: usize,
    next_sequence: AtomicU64,
}

impl ConsequenceLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Append a consequence, returning the stored record.
    pub fn record(
        &self,
        session_id: &str,
        modality: Modality,
        consequence: Consequence,
    ) -> ConsequenceRecord {
        let record = ConsequenceRecord {
            session_id: session_id.to_string(),
            sequence: self.next_sequence.fetch_add(1, Ordering::SeqCst),
            modality,
            consequence,
            recorded_at: now_unix(),
        };
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(record.clone());
        record
    }

    /// Most recent records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<ConsequenceRecord> {
        let entries = self.entries.lock();
        entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Current time as Unix timestamp (seconds).
fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
