//! Append-only status history
//!
//! Every record is chained to its predecessor with SHA-256, so a history
//! that was reordered, truncated and re-extended, or edited in place fails
//! [`StatusHistory::verify_integrity`].

use crate::error::HistoryError;
use crate::types::{ActorId, WorkflowState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One applied transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChangeRecord {
    /// State transitioned into
    pub status: WorkflowState,
    /// State transitioned out of
    pub previous: WorkflowState,
    /// When the transition was applied
    pub timestamp: DateTime<Utc>,
    /// Principal who requested it
    pub actor_id: ActorId,
    /// Free-text note from the actor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Hash of the preceding record, zero for the first
    pub prev_hash: [u8; 32],
    /// SHA-256 over this record and `prev_hash`
    pub hash: [u8; 32],
}

impl StatusChangeRecord {
    /// Unsealed record; hashes are filled in by [`StatusHistory::append`].
    #[must_use]
    pub fn new(
        previous: WorkflowState,
        status: WorkflowState,
        timestamp: DateTime<Utc>,
        actor_id: ActorId,
        comment: Option<String>,
    ) -> Self {
        Self {
            status,
            previous,
            timestamp,
            actor_id,
            comment,
            prev_hash: [0u8; 32],
            hash: [0u8; 32],
        }
    }

    /// Hex form of the record hash
    #[must_use]
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

/// Ordered, append-only ledger of status changes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusHistory {
    records: Vec<StatusChangeRecord>,
}

impl StatusHistory {
    /// Empty history
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seal and append a record.
    ///
    /// # Errors
    /// `NonMonotonicTimestamp` if the record is older than the latest entry.
    pub fn append(&mut self, mut record: StatusChangeRecord) -> Result<&StatusChangeRecord, HistoryError> {
        if let Some(last) = self.records.last() {
            if record.timestamp < last.timestamp {
                return Err(HistoryError::NonMonotonicTimestamp);
            }
        }
        record.prev_hash = self.head_hash();
        record.hash = compute_hash(&record);
        self.records.push(record);
        Ok(&self.records[self.records.len() - 1])
    }

    /// All records, oldest first
    #[inline]
    #[must_use]
    pub fn records(&self) -> &[StatusChangeRecord] {
        &self.records
    }

    /// Number of records
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True before the first transition
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Most recent record
    #[inline]
    #[must_use]
    pub fn latest(&self) -> Option<&StatusChangeRecord> {
        self.records.last()
    }

    /// Status implied by the ledger: latest record, or the initial state.
    #[must_use]
    pub fn current_status(&self) -> WorkflowState {
        self.latest()
            .map_or(WorkflowState::INITIAL, |record| record.status)
    }

    /// Hash of the latest record, zero for an empty history
    #[must_use]
    pub fn head_hash(&self) -> [u8; 32] {
        self.latest().map_or([0u8; 32], |record| record.hash)
    }

    /// Iterate oldest first
    pub fn iter(&self) -> impl Iterator<Item = &StatusChangeRecord> {
        self.records.iter()
    }

    /// Re-derive the hash chain and check time ordering.
    ///
    /// # Errors
    /// `IntegrityViolation` naming the first bad record.
    pub fn verify_integrity(&self) -> Result<(), HistoryError> {
        let mut prev = [0u8; 32];
        let mut prev_status = WorkflowState::INITIAL;
        let mut prev_time: Option<DateTime<Utc>> = None;
        for (index, record) in self.records.iter().enumerate() {
            if record.prev_hash != prev
                || record.hash != compute_hash(record)
                || record.previous != prev_status
                || prev_time.is_some_and(|t| record.timestamp < t)
            {
                return Err(HistoryError::IntegrityViolation { index });
            }
            prev = record.hash;
            prev_status = record.status;
            prev_time = Some(record.timestamp);
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a StatusHistory {
    type Item = &'a StatusChangeRecord;
    type IntoIter = std::slice::Iter<'a, StatusChangeRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

fn compute_hash(record: &StatusChangeRecord) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(record.previous.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(record.status.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(record.timestamp.timestamp().to_le_bytes());
    hasher.update(record.timestamp.timestamp_subsec_nanos().to_le_bytes());
    hasher.update(record.actor_id.as_str().as_bytes());
    hasher.update([0]);
    match &record.comment {
        Some(comment) => {
            hasher.update([1]);
            hasher.update(comment.as_bytes());
        }
        None => hasher.update([0]),
    }
    hasher.update(record.prev_hash);
    hasher.finalize().into()
}
