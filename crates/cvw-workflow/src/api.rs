//! Collaborator contracts
//!
//! The engine reaches document storage, persistence and notification
//! delivery only through these traits.

use crate::error::{CollaboratorError, NotificationError, RepositoryError};
use crate::history::{StatusChangeRecord, StatusHistory};
use crate::types::{ActorId, DocumentRef, ProjectId, WorkflowState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted workflow state of one project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStatusRecord {
    /// Project the record belongs to
    pub project_id: ProjectId,
    /// Current workflow state
    pub status: WorkflowState,
    /// Every committed transition, oldest first
    pub history: StatusHistory,
    /// Bumped on every successful save
    pub version: u64,
}

impl ProjectStatusRecord {
    /// Fresh record in the initial state
    #[must_use]
    pub fn initial(project_id: ProjectId) -> Self {
        Self {
            project_id,
            status: WorkflowState::INITIAL,
            history: StatusHistory::new(),
            version: 0,
        }
    }
}

/// Event emitted after a committed transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionEvent {
    /// Project that changed state
    pub project_id: ProjectId,
    /// State before the transition
    pub previous_state: WorkflowState,
    /// State after the transition
    pub new_state: WorkflowState,
    /// Principal who requested the transition
    pub actor_id: ActorId,
    /// Timestamp of the appended history record
    pub occurred_at: DateTime<Utc>,
}

/// Read access to a project's documents
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every document currently attached to the project.
    ///
    /// # Errors
    /// `CollaboratorError` when the store cannot be read.
    async fn documents_for(&self, project_id: ProjectId) -> Result<Vec<DocumentRef>, CollaboratorError>;
}

/// Fire-and-forget notification delivery
///
/// Retry policy, if any, belongs to the implementation.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one event.
    ///
    /// # Errors
    /// `NotificationError` when the event could not be handed over.
    async fn emit(&self, event: TransitionEvent) -> Result<(), NotificationError>;
}

/// Durable workflow state with optimistic concurrency
#[async_trait]
pub trait StatusRepository: Send + Sync {
    /// Initialize a project at the initial state, version 0.
    ///
    /// # Errors
    /// `AlreadyExists` for a known project.
    async fn create_project(&self, project_id: ProjectId) -> Result<ProjectStatusRecord, RepositoryError>;

    /// # Errors
    /// `NotFound` for an unknown project.
    async fn load_project_status(&self, project_id: ProjectId) -> Result<ProjectStatusRecord, RepositoryError>;

    /// Atomically set `status` and append `record`, conditional on the
    /// stored version equalling `expected_version`.
    ///
    /// Returns the new version.
    ///
    /// # Errors
    /// `Conflict` when the stored version moved on.
    async fn save_project_status(
        &self,
        project_id: ProjectId,
        expected_version: u64,
        status: WorkflowState,
        record: StatusChangeRecord,
    ) -> Result<u64, RepositoryError>;
}
