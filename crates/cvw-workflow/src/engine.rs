//! Workflow engine service
//!
//! Composes the collaborators into the transition sequence:
//!
//! 1. take the per-project lock
//! 2. load status, history and version; read the document set
//! 3. validate and apply on the [`Project`] snapshot
//! 4. persist conditional on the loaded version
//! 5. release the lock, then notify
//!
//! Steps 1-4 either complete or leave storage untouched. Step 5 can only
//! produce warnings.

use crate::api::{
    DocumentStore, NotificationSink, ProjectStatusRecord, StatusRepository, TransitionEvent,
};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{NotificationError, WorkflowError};
use crate::history::{StatusChangeRecord, StatusHistory};
use crate::locks::ProjectLocks;
use crate::project::Project;
use crate::state_machine;
use crate::types::{ActorId, DocumentType, ProjectId, WorkflowState};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Non-fatal condition attached to a committed transition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionWarning {
    /// The sink rejected the event
    #[error("transition committed but not announced: {0}")]
    NotificationFailed(NotificationError),
}

/// Result of a committed transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutcome {
    /// Project that changed state
    pub project_id: ProjectId,
    /// State before the transition
    pub previous: WorkflowState,
    /// State after the transition
    pub status: WorkflowState,
    /// Record appended by this transition
    pub record: StatusChangeRecord,
    /// Full history including `record`
    pub history: StatusHistory,
    /// Stored version after the save
    pub version: u64,
    /// Non-fatal problems after the commit
    pub warnings: Vec<TransitionWarning>,
}

impl TransitionOutcome {
    /// Whether anything went wrong after the commit
    #[inline]
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Async workflow service
pub struct WorkflowEngine {
    repository: Arc<dyn StatusRepository>,
    documents: Arc<dyn DocumentStore>,
    notifications: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    locks: ProjectLocks,
    config: EngineConfig,
}

impl WorkflowEngine {
    /// Engine with the system clock and default configuration
    pub fn new(
        repository: Arc<dyn StatusRepository>,
        documents: Arc<dyn DocumentStore>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            repository,
            documents,
            notifications,
            clock: Arc::new(SystemClock),
            locks: ProjectLocks::new(),
            config: EngineConfig::default(),
        }
    }

    /// Replace the time source
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the configuration
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Active configuration
    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Initialize workflow state for a new project.
    ///
    /// # Errors
    /// `ProjectExists` when already initialized.
    pub async fn create_project(
        &self,
        project_id: ProjectId,
    ) -> Result<ProjectStatusRecord, WorkflowError> {
        let record = self.repository.create_project(project_id).await?;
        debug!(project_id = %project_id, "project created");
        Ok(record)
    }

    /// Load a project snapshot with its current documents.
    ///
    /// # Errors
    /// `ProjectNotFound`, `Documents` on storage failure, or `History` when
    /// the persisted ledger does not verify.
    pub async fn load_project(&self, project_id: ProjectId) -> Result<Project, WorkflowError> {
        let stored = self.repository.load_project_status(project_id).await?;
        let documents = self.documents.documents_for(project_id).await?;
        Project::from_parts(project_id, stored.status, stored.history, documents)
    }

    /// Required-but-absent documents for moving the project to `target`.
    ///
    /// Reads only; never takes the project lock.
    ///
    /// # Errors
    /// Same as [`Self::load_project`].
    pub async fn missing_documents_for(
        &self,
        project_id: ProjectId,
        target: WorkflowState,
    ) -> Result<Vec<DocumentType>, WorkflowError> {
        let project = self.load_project(project_id).await?;
        Ok(project.missing_documents_for(target))
    }

    /// States reachable from `from`
    #[inline]
    pub fn allowed_transitions(&self, from: WorkflowState) -> &'static [WorkflowState] {
        state_machine::allowed_transitions(from)
    }

    /// Validate, persist and announce one transition.
    ///
    /// # Errors
    /// `InvalidTransition` and `MissingDocuments` leave the project unchanged.
    /// `PersistenceConflict` when another writer saved first; retry with
    /// [`Self::request_transition_with_retry`]. Collaborator failures map to
    /// `ProjectNotFound`, `Documents` or `Storage`.
    pub async fn request_transition(
        &self,
        project_id: ProjectId,
        target: WorkflowState,
        actor_id: ActorId,
        comment: Option<String>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let guard = self.locks.lock(project_id).await;

        let stored = self.repository.load_project_status(project_id).await?;
        let expected_version = stored.version;
        let documents = self.documents.documents_for(project_id).await?;
        let mut project =
            Project::from_parts(project_id, stored.status, stored.history, documents)?;

        let applied = project
            .request_transition(target, actor_id, comment, self.clock.now())
            .map_err(|e| {
                debug!(
                    project_id = %project_id,
                    from = %project.status(),
                    to = %target,
                    error = %e,
                    "transition rejected"
                );
                e
            })?;

        let version = self
            .repository
            .save_project_status(project_id, expected_version, target, applied.record.clone())
            .await
            .map_err(|e| {
                let err = WorkflowError::from(e);
                if err.is_retryable() {
                    warn!(project_id = %project_id, expected_version, "version conflict on save");
                }
                err
            })?;
        drop(guard);

        info!(
            project_id = %project_id,
            from = %applied.previous,
            to = %target,
            actor = %applied.record.actor_id,
            version,
            "transition committed"
        );

        let mut warnings = Vec::new();
        if self.config.notifications_enabled {
            let event = TransitionEvent {
                project_id,
                previous_state: applied.previous,
                new_state: target,
                actor_id: applied.record.actor_id.clone(),
                occurred_at: applied.record.timestamp,
            };
            if let Err(e) = self.notifications.emit(event).await {
                warn!(project_id = %project_id, error = %e, "notification failed");
                warnings.push(TransitionWarning::NotificationFailed(e));
            }
        }

        Ok(TransitionOutcome {
            project_id,
            previous: applied.previous,
            status: project.status(),
            record: applied.record,
            history: project.history().clone(),
            version,
            warnings,
        })
    }

    /// [`Self::request_transition`], re-run from a fresh load on
    /// `PersistenceConflict`, at most `max_conflict_retries` attempts.
    ///
    /// # Errors
    /// The first non-retryable error, or the last conflict once attempts run out.
    pub async fn request_transition_with_retry(
        &self,
        project_id: ProjectId,
        target: WorkflowState,
        actor_id: ActorId,
        comment: Option<String>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let attempts = self.config.max_conflict_retries.max(1);
        let mut attempt = 1;
        loop {
            match self
                .request_transition(project_id, target, actor_id.clone(), comment.clone())
                .await
            {
                Err(e) if e.is_retryable() && attempt < attempts => {
                    debug!(project_id = %project_id, attempt, "retrying after conflict");
                    attempt += 1;
                    tokio::task::yield_now().await;
                }
                result => return result,
            }
        }
    }

    /// Drop lock entries for idle projects.
    pub fn prune_locks(&self) -> usize {
        self.locks.prune()
    }
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("config", &self.config)
            .field("locks", &self.locks.len())
            .finish_non_exhaustive()
    }
}
