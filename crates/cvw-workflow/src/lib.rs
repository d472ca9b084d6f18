//! Carbon-credit project verification workflow
//!
//! Governs how a project moves through its certification lifecycle, from
//! `draft` through validation, registration and recurring monitoring and
//! verification to credit issuance:
//! 1. **Pure core**: the static transition table ([`state_machine`]) and the
//!    [`Project`] aggregate validate and apply transitions synchronously
//! 2. **Service**: [`WorkflowEngine`] loads, locks, persists and notifies
//!    through collaborator traits ([`api`])
//!
//! Every committed transition appends a hash-chained record to the project's
//! [`StatusHistory`].
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use cvw_workflow::prelude::*;
//!
//! let documents = Arc::new(MemoryDocumentStore::new());
//! let engine = WorkflowEngine::new(
//!     Arc::new(MemoryStatusRepository::new()),
//!     documents.clone(),
//!     Arc::new(TracingSink),
//! );
//!
//! let id = ProjectId::new();
//! engine.create_project(id).await?;
//! documents.add(id, DocumentRef::new(DocumentType::ProjectDesignDocument));
//!
//! let outcome = engine
//!     .request_transition(id, WorkflowState::InProgress, ActorId::new("proponent"), None)
//!     .await?;
//! assert_eq!(outcome.history.len(), 1);
//! ```

// Core modules
pub mod error;
pub mod history;
pub mod project;
pub mod state_machine;
pub mod types;

// Service layer
pub mod api;
pub mod clock;
pub mod config;
pub mod engine;
pub mod locks;
pub mod memory;
pub mod notify;
pub mod telemetry;

// Test harness
pub mod test_harness;

// Re-exports
pub use engine::{TransitionOutcome, TransitionWarning, WorkflowEngine};
pub use error::*;
pub use history::{StatusChangeRecord, StatusHistory};
pub use project::{AppliedTransition, Project};
pub use types::*;

/// Common imports for embedding the engine
pub mod prelude {
    pub use crate::api::{
        DocumentStore, NotificationSink, ProjectStatusRecord, StatusRepository, TransitionEvent,
    };
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::{EngineConfig, LoggingConfig};
    pub use crate::engine::{TransitionOutcome, TransitionWarning, WorkflowEngine};
    pub use crate::error::{
        CollaboratorError, HistoryError, NotificationError, RepositoryError, WorkflowError,
    };
    pub use crate::history::{StatusChangeRecord, StatusHistory};
    pub use crate::memory::{MemoryDocumentStore, MemoryStatusRepository};
    pub use crate::notify::{ChannelSink, NullSink, TracingSink};
    pub use crate::project::Project;
    pub use crate::types::{ActorId, DocumentRef, DocumentType, ProjectId, WorkflowState};
    pub use std::sync::Arc;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
