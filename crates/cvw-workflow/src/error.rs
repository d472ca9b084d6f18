//! Error types for the workflow engine
//!
//! Validation outcomes (`InvalidTransition`, `MissingDocuments`) are expected
//! results callers render to users. `PersistenceConflict` is the only error
//! worth retrying automatically.

use crate::types::{DocumentType, ProjectId, WorkflowState};

/// Main workflow error type
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Target state not reachable from the current one
    #[error("cannot transition from {from} to {to}")]
    InvalidTransition {
        /// Current state
        from: WorkflowState,
        /// Requested state
        to: WorkflowState,
    },

    /// Reachable, but prerequisite documents are absent
    #[error("cannot enter {target}: missing documents [{}]", join_types(.missing))]
    MissingDocuments {
        /// Requested state
        target: WorkflowState,
        /// Every absent type, in table order
        missing: Vec<DocumentType>,
    },

    /// Another writer changed the project between load and save
    #[error("concurrent modification of project {project_id}: expected version {expected_version}")]
    PersistenceConflict {
        /// Project that was modified concurrently
        project_id: ProjectId,
        /// Version the failed save was based on
        expected_version: u64,
    },

    /// No workflow state stored for the project
    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),

    /// Workflow state already initialized
    #[error("project already exists: {0}")]
    ProjectExists(ProjectId),

    /// Document storage could not be read
    #[error("document storage error: {0}")]
    Documents(#[from] CollaboratorError),

    /// Persistence backend failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Loaded history is inconsistent
    #[error("history error: {0}")]
    History(#[from] HistoryError),
}

impl WorkflowError {
    /// User-correctable validation outcome
    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition { .. } | Self::MissingDocuments { .. }
        )
    }

    /// Whether the caller should retry the whole operation on fresh state
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PersistenceConflict { .. })
    }

    /// Whether the condition is part of normal workflow operation
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::InvalidTransition { .. }
            | Self::MissingDocuments { .. }
            | Self::PersistenceConflict { .. }
            | Self::ProjectNotFound(_)
            | Self::ProjectExists(_) => true,
            Self::Documents(_) | Self::Storage(_) | Self::History(_) => false,
        }
    }

    /// Missing document types, when this is a gating failure
    #[must_use]
    pub fn missing_documents(&self) -> Option<&[DocumentType]> {
        match self {
            Self::MissingDocuments { missing, .. } => Some(missing),
            _ => None,
        }
    }
}

fn join_types(types: &[DocumentType]) -> String {
    types
        .iter()
        .map(DocumentType::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Status history errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    /// Record would move time backwards
    #[error("record timestamp precedes latest entry")]
    NonMonotonicTimestamp,

    /// Hash chain broken at the given record
    #[error("integrity violation at record {index}")]
    IntegrityViolation {
        /// Position of the first bad record
        index: usize,
    },
}

/// Persistence collaborator errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    /// No record for the project
    #[error("project not found: {0}")]
    NotFound(ProjectId),

    /// Project was already created
    #[error("project already exists: {0}")]
    AlreadyExists(ProjectId),

    /// Optimistic version check failed
    #[error("version conflict on project {project_id}: expected {expected_version}, found {actual_version}")]
    Conflict {
        /// Project being saved
        project_id: ProjectId,
        /// Version the caller loaded
        expected_version: u64,
        /// Version currently stored
        actual_version: u64,
    },

    /// Storage backend failure
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<RepositoryError> for WorkflowError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound(id) => WorkflowError::ProjectNotFound(id),
            RepositoryError::AlreadyExists(id) => WorkflowError::ProjectExists(id),
            RepositoryError::Conflict {
                project_id,
                expected_version,
                ..
            } => WorkflowError::PersistenceConflict {
                project_id,
                expected_version,
            },
            RepositoryError::Backend(msg) => WorkflowError::Storage(msg),
        }
    }
}

/// Document storage collaborator errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    /// Store could not be reached
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Any other read failure
    #[error("{0}")]
    Other(String),
}

/// Notification delivery failure
///
/// Never fails a transition; surfaced as a warning.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    /// Receiving side is gone
    #[error("notification sink closed")]
    Closed,

    /// Event could not be handed over
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed TOML or wrong field types
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Parsed but failed validation
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
