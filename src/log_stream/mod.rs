//! Append-only workflow log with selector-gated subscriptions.
//!
//! Grounded on the teacher's `result_store.rs` FIFO-bounded storage and on
//! `status_manager.rs`'s `Arc<RwLock<HashMap>>` layout, generalized into a
//! sequence-numbered log plus a broadcast fan-out for subscribers, since the
//! design requires every subscriber to see a strictly ordered, ungapped
//! stream (§4.1 "no dropped entries").

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, RwLock};

use crate::constants::LOG_BROADCAST_CAPACITY;
use crate::models::WorkflowLogEntry;

/// Projects a log entry down to the value a subscriber actually cares about.
/// Two consecutive entries that project to equal values are collapsed: the
/// subscriber only ever observes a change (design §4.1).
pub type Selector = Arc<dyn Fn(&WorkflowLogEntry) -> Value + Send + Sync>;

struct Inner {
    entries: Vec<WorkflowLogEntry>,
    next_sequence: u64,
}

/// The workflow log for one team. Writes are serialized behind a single
/// `RwLock` write-guard (single-threaded dispatch per design §4.1); reads of
/// history take the read-guard.
pub struct LogStream {
    inner: RwLock<Inner>,
    sender: broadcast::Sender<WorkflowLogEntry>,
}

impl LogStream {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(LOG_BROADCAST_CAPACITY);
        Self {
            inner: RwLock::new(Inner {
                entries: Vec::new(),
                next_sequence: 0,
            }),
            sender,
        }
    }

    /// Appends a log entry, assigning it the next sequence number, and fans
    /// it out to all live subscribers. Entries are never dropped: a lagging
    /// subscriber that misses broadcast capacity can always recover the gap
    /// via [`LogStream::history`].
    pub async fn append(&self, mut entry: WorkflowLogEntry) -> WorkflowLogEntry {
        let mut guard = self.inner.write().await;
        entry.sequence = guard.next_sequence;
        guard.next_sequence += 1;
        guard.entries.push(entry.clone());
        drop(guard);
        // A subscriber count of zero means `send` errors; that's fine, there
        // is nobody listening yet.
        let _ = self.sender.send(entry.clone());
        entry
    }

    /// Full history appended so far, in sequence order.
    pub async fn history(&self) -> Vec<WorkflowLogEntry> {
        self.inner.read().await.entries.clone()
    }

    /// Subscribes to future entries. The returned [`LogSubscription`] only
    /// yields an entry when `selector` produces a value different from the
    /// one it produced for the previously yielded entry (value-equality
    /// gating, design §4.1).
    pub fn subscribe(&self, selector: Selector) -> LogSubscription {
        LogSubscription {
            receiver: self.sender.subscribe(),
            selector,
            last_value: None,
        }
    }
}

impl Default for LogStream {
    fn default() -> Self {
        Self::new()
    }
}

/// A live handle onto a [`LogStream`]'s broadcast, filtered through a
/// selector. Dropping this handle unsubscribes.
pub struct LogSubscription {
    receiver: broadcast::Receiver<WorkflowLogEntry>,
    selector: Selector,
    last_value: Option<Value>,
}

impl LogSubscription {
    /// Awaits the next entry whose selected value differs from the last one
    /// observed. Returns `None` once the underlying stream is closed.
    pub async fn next(&mut self) -> Option<WorkflowLogEntry> {
        loop {
            match self.receiver.recv().await {
                Ok(entry) => {
                    let value = (self.selector)(&entry);
                    if self.last_value.as_ref() != Some(&value) {
                        self.last_value = Some(value);
                        return Some(entry);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Selector that passes every entry through unchanged, keyed by sequence
/// number so no two entries ever compare equal.
pub fn select_all() -> Selector {
    Arc::new(|entry| serde_json::json!(entry.sequence))
}

/// Selector that projects down to a single task's status, ignoring entries
/// about other tasks or agents.
pub fn select_task_status(task_id: String) -> Selector {
    Arc::new(move |entry| match &entry.payload {
        crate::models::LogPayload::TaskStatusUpdate {
            task_id: id,
            task_status,
            ..
        } if *id == task_id => serde_json::json!(task_status),
        _ => Value::Null,
    })
}
