//! Project aggregate
//!
//! A loaded snapshot of one project's workflow state plus the documents read
//! from storage. All checks and the apply step here are synchronous; the
//! engine wraps them with loading, locking and persistence.

use crate::error::WorkflowError;
use crate::history::{StatusChangeRecord, StatusHistory};
use crate::state_machine;
use crate::types::{ActorId, DocumentRef, DocumentType, ProjectId, WorkflowState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Workflow view of a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Project identifier
    pub id: ProjectId,
    status: WorkflowState,
    history: StatusHistory,
    /// Read-only copy of the storage collaborator's document set
    pub documents: Vec<DocumentRef>,
}

/// Outcome of a transition applied to a [`Project`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedTransition {
    /// State before the transition
    pub previous: WorkflowState,
    /// Sealed record appended to the history
    pub record: StatusChangeRecord,
}

impl Project {
    /// New project in the initial state with no history
    #[must_use]
    pub fn new(id: ProjectId) -> Self {
        Self {
            id,
            status: WorkflowState::INITIAL,
            history: StatusHistory::new(),
            documents: Vec::new(),
        }
    }

    /// Rebuild from persisted status and history.
    ///
    /// # Errors
    /// `History` when the ledger fails verification or disagrees with `status`.
    pub fn from_parts(
        id: ProjectId,
        status: WorkflowState,
        history: StatusHistory,
        documents: Vec<DocumentRef>,
    ) -> Result<Self, WorkflowError> {
        history.verify_integrity()?;
        if history.current_status() != status {
            return Err(WorkflowError::History(
                crate::error::HistoryError::IntegrityViolation {
                    index: history.len().saturating_sub(1),
                },
            ));
        }
        Ok(Self {
            id,
            status,
            history,
            documents,
        })
    }

    /// Replace the document set
    #[must_use]
    pub fn with_documents(mut self, documents: Vec<DocumentRef>) -> Self {
        self.documents = documents;
        self
    }

    /// Current workflow state
    #[inline]
    #[must_use]
    pub fn status(&self) -> WorkflowState {
        self.status
    }

    /// Applied transitions so far
    #[inline]
    #[must_use]
    pub fn history(&self) -> &StatusHistory {
        &self.history
    }

    /// States reachable from the current one
    pub fn allowed_transitions(&self) -> &'static [WorkflowState] {
        state_machine::allowed_transitions(self.status)
    }

    /// Required-but-absent documents for a hypothetical move to `target`.
    ///
    /// Ignores reachability; pair with [`Project::allowed_transitions`].
    #[must_use]
    pub fn missing_documents_for(&self, target: WorkflowState) -> Vec<DocumentType> {
        state_machine::missing_documents(target, &self.documents)
    }

    /// Validate without applying.
    ///
    /// # Errors
    /// `InvalidTransition` or `MissingDocuments`.
    pub fn check_transition(&self, target: WorkflowState) -> Result<(), WorkflowError> {
        state_machine::check_transition(self.status, target, &self.documents)
    }

    /// Validate and apply a transition.
    ///
    /// `at` is clamped to the latest history timestamp so the ledger stays
    /// monotonic under clock skew. On error the project is unchanged.
    ///
    /// # Errors
    /// `InvalidTransition` or `MissingDocuments`.
    pub fn request_transition(
        &mut self,
        target: WorkflowState,
        actor_id: ActorId,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<AppliedTransition, WorkflowError> {
        self.check_transition(target)?;

        let previous = self.status;
        let timestamp = match self.history.latest() {
            Some(last) if last.timestamp > at => last.timestamp,
            _ => at,
        };
        let record = StatusChangeRecord::new(previous, target, timestamp, actor_id, comment);
        let sealed = self.history.append(record)?.clone();
        self.status = target;

        Ok(AppliedTransition {
            previous,
            record: sealed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn actor() -> ActorId {
        ActorId::new("proponent-1")
    }

    #[test]
    fn new_project_is_draft() {
        let project = Project::new(ProjectId::new());
        assert_eq!(project.status(), WorkflowState::Draft);
        assert!(project.history().is_empty());
        assert_eq!(project.allowed_transitions(), &[WorkflowState::InProgress]);
    }

    #[test]
    fn failed_transition_leaves_project_untouched() {
        let mut project = Project::new(ProjectId::new());
        let before = project.clone();
        let err = project
            .request_transition(WorkflowState::InProgress, actor(), None, Utc::now())
            .unwrap_err();
        assert_eq!(
            err.missing_documents(),
            Some(&[DocumentType::ProjectDesignDocument][..])
        );
        assert_eq!(project, before);
    }

    #[test]
    fn successful_transition_appends_record() {
        let mut project = Project::new(ProjectId::new())
            .with_documents(vec![DocumentRef::new(DocumentType::ProjectDesignDocument)]);
        let applied = project
            .request_transition(
                WorkflowState::InProgress,
                actor(),
                Some("kick-off".to_string()),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(applied.previous, WorkflowState::Draft);
        assert_eq!(applied.record.status, WorkflowState::InProgress);
        assert_eq!(project.status(), WorkflowState::InProgress);
        assert_eq!(project.history().len(), 1);
        assert_eq!(project.history().latest(), Some(&applied.record));
    }

    #[test]
    fn skewed_clock_is_clamped() {
        let mut project = Project::new(ProjectId::new())
            .with_documents(vec![DocumentRef::new(DocumentType::ProjectDesignDocument)]);
        let now = Utc::now();
        project
            .request_transition(WorkflowState::InProgress, actor(), None, now)
            .unwrap();
        let applied = project
            .request_transition(
                WorkflowState::Draft,
                actor(),
                None,
                now - Duration::minutes(10),
            )
            .unwrap();
        assert_eq!(applied.record.timestamp, now);
        assert!(project.history().verify_integrity().is_ok());
    }

    #[test]
    fn from_parts_rejects_status_mismatch() {
        let mut project = Project::new(ProjectId::new())
            .with_documents(vec![DocumentRef::new(DocumentType::ProjectDesignDocument)]);
        project
            .request_transition(WorkflowState::InProgress, actor(), None, Utc::now())
            .unwrap();
        let result = Project::from_parts(
            project.id,
            WorkflowState::Submitted,
            project.history().clone(),
            Vec::new(),
        );
        assert!(matches!(result, Err(WorkflowError::History(_))));
    }
}
