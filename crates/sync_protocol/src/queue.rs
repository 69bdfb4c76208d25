//! Client-side upload queue
//!
//! One pending mutation per item, drained sequentially: a single upload
//! is in flight at a time, so the retry order is deterministic. An item
//! leaves the queue only on confirmed server acceptance; a failed upload
//! stays at the head with its attempt count incremented. The queue is
//! device-local and disposable; everything in it can be rebuilt from user
//! action, never from server state.

use chrono::{DateTime, Utc};
use core_kernel::SubmissionKey;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::error::SyncError;
use crate::payload::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueOperation {
    Create,
    Update,
}

/// One queued mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueItem {
    /// Client-assigned key, doubling as the server-side idempotency key
    pub local_id: SubmissionKey,
    pub kind: EntityKind,
    pub operation: QueueOperation,
    pub payload: serde_json::Value,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

/// Sequential outbound queue for one device
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SyncQueue {
    items: VecDeque<SyncQueueItem>,
    in_flight: Option<SubmissionKey>,
}

impl SyncQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        local_id: SubmissionKey,
        kind: EntityKind,
        operation: QueueOperation,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) {
        self.items.push_back(SyncQueueItem {
            local_id,
            kind,
            operation,
            payload,
            attempts: 0,
            last_error: None,
            enqueued_at: now,
        });
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Keys of mutations not yet accepted by the server. The merge uses
    /// this to protect local values from being overwritten.
    pub fn pending_keys(&self) -> impl Iterator<Item = SubmissionKey> + '_ {
        self.items.iter().map(|i| i.local_id)
    }

    pub fn contains(&self, key: SubmissionKey) -> bool {
        self.items.iter().any(|i| i.local_id == key)
    }

    /// Takes the head item for upload. Refused while another upload is in
    /// flight; the queue drains strictly one at a time.
    pub fn begin_upload(&mut self) -> Result<&SyncQueueItem, SyncError> {
        if self.in_flight.is_some() {
            return Err(SyncError::UploadInFlight);
        }
        let item = self.items.front().ok_or(SyncError::QueueEmpty)?;
        self.in_flight = Some(item.local_id);
        Ok(item)
    }

    /// Server accepted (or idempotently replayed) the in-flight item
    pub fn confirm(&mut self, key: SubmissionKey) {
        if self.in_flight == Some(key) {
            self.in_flight = None;
        }
        self.items.retain(|i| i.local_id != key);
    }

    /// The in-flight upload failed; the item stays at the head with its
    /// attempt count incremented
    pub fn fail(&mut self, key: SubmissionKey, error: impl Into<String>) {
        if self.in_flight == Some(key) {
            self.in_flight = None;
        }
        if let Some(item) = self.items.iter_mut().find(|i| i.local_id == key) {
            item.attempts += 1;
            item.last_error = Some(error.into());
        }
    }

    /// Connectivity dropped with no verdict; the item stays queued with
    /// its attempt count untouched
    pub fn abort_in_flight(&mut self) {
        self.in_flight = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn queue_with(n: usize) -> (SyncQueue, Vec<SubmissionKey>) {
        let mut queue = SyncQueue::new();
        let keys: Vec<SubmissionKey> = (0..n).map(|_| SubmissionKey::new()).collect();
        for key in &keys {
            queue.push(
                *key,
                EntityKind::Reading,
                QueueOperation::Create,
                json!({"value": "150.0000"}),
                Utc::now(),
            );
        }
        (queue, keys)
    }

    #[test]
    fn test_uploads_drain_in_order() {
        let (mut queue, keys) = queue_with(3);

        for expected in &keys {
            let item = queue.begin_upload().unwrap();
            assert_eq!(item.local_id, *expected);
            queue.confirm(*expected);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_one_upload_in_flight_at_a_time() {
        let (mut queue, keys) = queue_with(2);

        queue.begin_upload().unwrap();
        assert_eq!(queue.begin_upload().unwrap_err(), SyncError::UploadInFlight);

        queue.confirm(keys[0]);
        assert!(queue.begin_upload().is_ok());
    }

    #[test]
    fn test_failed_upload_stays_at_the_head() {
        let (mut queue, keys) = queue_with(2);

        let first = queue.begin_upload().unwrap().local_id;
        queue.fail(first, "HTTP 503");

        let retried = queue.begin_upload().unwrap();
        assert_eq!(retried.local_id, keys[0]);
        assert_eq!(retried.attempts, 1);
        assert_eq!(retried.last_error.as_deref(), Some("HTTP 503"));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_aborted_upload_keeps_attempt_count() {
        let (mut queue, keys) = queue_with(1);

        queue.begin_upload().unwrap();
        queue.abort_in_flight();

        let item = queue.begin_upload().unwrap();
        assert_eq!(item.local_id, keys[0]);
        assert_eq!(item.attempts, 0);
    }

    #[test]
    fn test_empty_queue_has_nothing_to_upload() {
        let mut queue = SyncQueue::new();
        assert_eq!(queue.begin_upload().unwrap_err(), SyncError::QueueEmpty);
    }
}
