//! Single-flight execution tracking
//!
//! Guarantees at-most-one concurrent execution per [`AnalysisKey`]. The
//! first caller for a key becomes the *leader* and must run the step and
//! publish the outcome; every caller that arrives while the key is active
//! becomes a *follower* and awaits the leader's published outcome. Publish
//! wakes all subscribed waiters with a clone of the identical outcome and
//! clears the active entry.
//!
//! The leader slot also carries a waiter: the orchestrator runs leader work
//! in a detached task and has the leader's own caller wait like a follower,
//! so cancelling any single caller never cancels the execution other
//! subscribers depend on.
//!
//! A dropped waiter decrements the record's subscriber count, so cancelled
//! followers unsubscribe themselves and the count stays meaningful under a
//! stuck step.

use chrono::Utc;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use super::error::{AnalysisError, TrackerError};
use super::types::{AnalysisKey, AnalysisRecord, AnalysisRequest, AnalysisResult, AnalysisStatus};

/// Terminal outcome of one execution, broadcast identically to every waiter.
pub type AnalysisOutcome = Result<AnalysisResult, AnalysisError>;

struct ActiveEntry {
    record: AnalysisRecord,
    tx: broadcast::Sender<AnalysisOutcome>,
    subscribers: Arc<AtomicUsize>,
}

/// Awaits the published outcome for one key. Dropping the waiter before the
/// outcome arrives unsubscribes the caller without affecting anyone else.
pub struct OutcomeWaiter {
    rx: broadcast::Receiver<AnalysisOutcome>,
    _guard: SubscriberGuard,
}

impl OutcomeWaiter {
    /// Waits for the leader's publish. `TrackerError::LeaderGone` means the
    /// active entry vanished without an outcome; the orchestrator treats the
    /// key as absent and re-executes.
    pub async fn wait(mut self) -> Result<AnalysisOutcome, TrackerError> {
        self.rx
            .recv()
            .await
            .map_err(|_| TrackerError::LeaderGone)
    }
}

struct SubscriberGuard {
    subscribers: Arc<AtomicUsize>,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.subscribers.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Role handed to a caller by [`ActiveExecutionTracker::begin_or_join`].
pub enum ExecutionSlot {
    /// This caller must execute and publish. Its waiter receives the same
    /// published outcome as every follower.
    Leader { waiter: OutcomeWaiter },
    /// Another caller is already executing this key.
    Follower { waiter: OutcomeWaiter },
}

impl ExecutionSlot {
    pub fn is_leader(&self) -> bool {
        matches!(self, ExecutionSlot::Leader { .. })
    }
}

pub struct ActiveExecutionTracker {
    active: Mutex<HashMap<AnalysisKey, ActiveEntry>>,
}

impl ActiveExecutionTracker {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Claims the leader slot for `key`, or joins the in-flight execution.
    pub fn begin_or_join(
        &self,
        key: AnalysisKey,
        request: &AnalysisRequest,
    ) -> Result<ExecutionSlot, TrackerError> {
        let mut active = self.active.lock().map_err(|_| TrackerError::Poisoned)?;
        match active.entry(key.clone()) {
            Entry::Occupied(entry) => {
                let entry = entry.get();
                entry.subscribers.fetch_add(1, Ordering::SeqCst);
                Ok(ExecutionSlot::Follower {
                    waiter: OutcomeWaiter {
                        rx: entry.tx.subscribe(),
                        _guard: SubscriberGuard {
                            subscribers: Arc::clone(&entry.subscribers),
                        },
                    },
                })
            }
            Entry::Vacant(slot) => {
                let (tx, rx) = broadcast::channel(1);
                let subscribers = Arc::new(AtomicUsize::new(1));
                slot.insert(ActiveEntry {
                    record: AnalysisRecord::new(key, request.clone()),
                    tx,
                    subscribers: Arc::clone(&subscribers),
                });
                Ok(ExecutionSlot::Leader {
                    waiter: OutcomeWaiter {
                        rx,
                        _guard: SubscriberGuard { subscribers },
                    },
                })
            }
        }
    }

    /// Transitions the key's record to Running. Called once by the leader
    /// before its first attempt.
    pub fn mark_running(&self, key: &AnalysisKey) -> Result<(), TrackerError> {
        let mut active = self.active.lock().map_err(|_| TrackerError::Poisoned)?;
        if let Some(entry) = active.get_mut(key) {
            entry.record.status = AnalysisStatus::Running;
            entry.record.started_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Records that attempt number `attempt` is underway.
    pub fn record_attempt(&self, key: &AnalysisKey, attempt: u32) -> Result<(), TrackerError> {
        let mut active = self.active.lock().map_err(|_| TrackerError::Poisoned)?;
        if let Some(entry) = active.get_mut(key) {
            entry.record.attempt_count = attempt;
        }
        Ok(())
    }

    /// Publishes the leader's outcome: clears the active entry and wakes
    /// every waiter subscribed before this call with an identical clone.
    /// Returns the number of waiters woken.
    pub fn publish(&self, key: &AnalysisKey, outcome: AnalysisOutcome) -> Result<usize, TrackerError> {
        let entry = {
            let mut active = self.active.lock().map_err(|_| TrackerError::Poisoned)?;
            active.remove(key)
        };
        match entry {
            // Send after the map lock is released; a send with no remaining
            // receivers (every caller cancelled) is not an error, the
            // outcome is already cached.
            Some(entry) => Ok(entry.tx.send(outcome).unwrap_or(0)),
            None => Ok(0),
        }
    }

    /// Point-in-time copy of the active record for `key`, with a live
    /// subscriber count.
    pub fn snapshot(&self, key: &AnalysisKey) -> Result<Option<AnalysisRecord>, TrackerError> {
        let active = self.active.lock().map_err(|_| TrackerError::Poisoned)?;
        Ok(active.get(key).map(|entry| {
            let mut record = entry.record.clone();
            record.subscribers = entry.subscribers.load(Ordering::SeqCst);
            record
        }))
    }

    pub fn active_keys(&self) -> Vec<AnalysisKey> {
        self.active
            .lock()
            .map(|active| active.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.active.lock().map(|active| active.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ActiveExecutionTracker {
    fn default() -> Self {
        Self::new()
    }
}
