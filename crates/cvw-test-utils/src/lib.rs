//! Testing utilities for CVW workspace
//!
//! Shared fixtures: document sets, projects advanced along the lifecycle,
//! an engine wired to in-memory collaborators, and a recording sink.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use cvw_workflow::api::{NotificationSink, TransitionEvent};
use cvw_workflow::clock::ManualClock;
use cvw_workflow::config::EngineConfig;
use cvw_workflow::error::NotificationError;
use cvw_workflow::memory::{MemoryDocumentStore, MemoryStatusRepository};
use cvw_workflow::state_machine;
use cvw_workflow::{ActorId, DocumentRef, DocumentType, Project, ProjectId, WorkflowEngine, WorkflowState};
use parking_lot::Mutex;
use std::sync::Arc;

/// Forward path from `draft` to `issued`
pub const LIFECYCLE: [WorkflowState; 10] = WorkflowState::ALL;

pub fn test_actor() -> ActorId {
    ActorId::new("test-actor")
}

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// States visited from `draft` to reach `state` along the forward path,
/// excluding `draft` itself.
pub fn path_to(state: WorkflowState) -> Vec<WorkflowState> {
    let end = LIFECYCLE.iter().position(|s| *s == state).unwrap();
    LIFECYCLE[1..=end].to_vec()
}

/// One reference per required type of `target`
pub fn documents_for(target: WorkflowState) -> Vec<DocumentRef> {
    state_machine::required_documents(target)
        .iter()
        .cloned()
        .map(DocumentRef::new)
        .collect()
}

/// One reference per vocabulary type
pub fn full_document_set() -> Vec<DocumentRef> {
    DocumentType::KNOWN.into_iter().map(DocumentRef::new).collect()
}

/// Pure project walked forward to `state` with every document present
pub fn project_at(state: WorkflowState) -> Project {
    let mut project = Project::new(ProjectId::new()).with_documents(full_document_set());
    let mut at = epoch();
    for step in path_to(state) {
        at += Duration::minutes(1);
        project
            .request_transition(step, test_actor(), None, at)
            .unwrap();
    }
    project
}

/// Sink that keeps every event
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TransitionEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TransitionEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn emit(&self, event: TransitionEvent) -> Result<(), NotificationError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Engine wired to in-memory collaborators and a manual clock
pub struct TestEngine {
    pub engine: Arc<WorkflowEngine>,
    pub repository: Arc<MemoryStatusRepository>,
    pub documents: Arc<MemoryDocumentStore>,
    pub sink: Arc<RecordingSink>,
    pub clock: Arc<ManualClock>,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let repository = Arc::new(MemoryStatusRepository::new());
        let documents = Arc::new(MemoryDocumentStore::new());
        let sink = Arc::new(RecordingSink::new());
        Self::with_sink(repository, documents, sink.clone(), sink, config)
    }

    /// Use `notifications` for delivery; `sink` is kept for inspection.
    pub fn with_sink(
        repository: Arc<MemoryStatusRepository>,
        documents: Arc<MemoryDocumentStore>,
        sink: Arc<RecordingSink>,
        notifications: Arc<dyn NotificationSink>,
        config: EngineConfig,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(epoch()));
        let engine = WorkflowEngine::new(repository.clone(), documents.clone(), notifications)
            .with_clock(clock.clone())
            .with_config(config);
        Self {
            engine: Arc::new(engine),
            repository,
            documents,
            sink,
            clock,
        }
    }

    pub async fn new_project(&self) -> ProjectId {
        let id = ProjectId::new();
        self.engine.create_project(id).await.unwrap();
        id
    }

    pub fn add_documents(&self, id: ProjectId, documents: Vec<DocumentRef>) {
        for document in documents {
            self.documents.add(id, document);
        }
    }

    /// Upload what each step needs and walk the project forward to `state`.
    pub async fn advance_to(&self, id: ProjectId, state: WorkflowState) {
        for step in path_to(state) {
            self.add_documents(id, documents_for(step));
            self.clock.advance(Duration::minutes(1));
            self.engine
                .request_transition(id, step, test_actor(), None)
                .await
                .unwrap();
        }
    }

    pub async fn project_in(&self, state: WorkflowState) -> ProjectId {
        let id = self.new_project().await;
        self.advance_to(id, state).await;
        id
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}
