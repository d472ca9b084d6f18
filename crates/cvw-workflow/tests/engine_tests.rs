//! Engine service: persistence, notification, locking and conflict handling.

use async_trait::async_trait;
use chrono::Duration;
use cvw_test_utils::{documents_for, test_actor, RecordingSink, TestEngine};
use cvw_workflow::api::{
    DocumentStore, NotificationSink, ProjectStatusRecord, StatusRepository, TransitionEvent,
};
use cvw_workflow::config::EngineConfig;
use cvw_workflow::error::{CollaboratorError, NotificationError, RepositoryError};
use cvw_workflow::memory::{MemoryDocumentStore, MemoryStatusRepository};
use cvw_workflow::notify::NullSink;
use cvw_workflow::{
    ActorId, DocumentRef, DocumentType, ProjectId, StatusChangeRecord, StatusHistory,
    TransitionWarning, WorkflowEngine, WorkflowError, WorkflowState,
};
use mockall::mock;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

mock! {
    pub Sink {}

    #[async_trait]
    impl NotificationSink for Sink {
        async fn emit(&self, event: TransitionEvent) -> Result<(), NotificationError>;
    }
}

mock! {
    pub Documents {}

    #[async_trait]
    impl DocumentStore for Documents {
        async fn documents_for(&self, project_id: ProjectId) -> Result<Vec<DocumentRef>, CollaboratorError>;
    }
}

/// Repository that lets another writer slip in before the engine's save.
struct InterferingRepository {
    inner: MemoryStatusRepository,
    interference: AtomicU32,
}

impl InterferingRepository {
    fn new(rounds: u32) -> Self {
        Self {
            inner: MemoryStatusRepository::new(),
            interference: AtomicU32::new(rounds),
        }
    }

    /// Toggle draft -> in-progress -> draft as an outside service would.
    async fn interfere(&self, project_id: ProjectId, at: chrono::DateTime<chrono::Utc>) -> Result<(), RepositoryError> {
        let current = self.inner.load_project_status(project_id).await?;
        let other = ActorId::new("other-service");
        let forward = StatusChangeRecord::new(
            current.status,
            WorkflowState::InProgress,
            at,
            other.clone(),
            None,
        );
        let version = self
            .inner
            .save_project_status(project_id, current.version, WorkflowState::InProgress, forward)
            .await?;
        let back = StatusChangeRecord::new(
            WorkflowState::InProgress,
            WorkflowState::Draft,
            at,
            other,
            Some("withdrawn".to_string()),
        );
        self.inner
            .save_project_status(project_id, version, WorkflowState::Draft, back)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl StatusRepository for InterferingRepository {
    async fn create_project(&self, project_id: ProjectId) -> Result<ProjectStatusRecord, RepositoryError> {
        self.inner.create_project(project_id).await
    }

    async fn load_project_status(&self, project_id: ProjectId) -> Result<ProjectStatusRecord, RepositoryError> {
        self.inner.load_project_status(project_id).await
    }

    async fn save_project_status(
        &self,
        project_id: ProjectId,
        expected_version: u64,
        status: WorkflowState,
        record: StatusChangeRecord,
    ) -> Result<u64, RepositoryError> {
        let remaining = self.interference.load(Ordering::SeqCst);
        if remaining > 0 {
            self.interference.store(remaining - 1, Ordering::SeqCst);
            self.interfere(project_id, record.timestamp).await?;
        }
        self.inner
            .save_project_status(project_id, expected_version, status, record)
            .await
    }
}

/// Repository whose stored status disagrees with its history
struct CorruptRepository;

#[async_trait]
impl StatusRepository for CorruptRepository {
    async fn create_project(&self, project_id: ProjectId) -> Result<ProjectStatusRecord, RepositoryError> {
        Err(RepositoryError::AlreadyExists(project_id))
    }

    async fn load_project_status(&self, project_id: ProjectId) -> Result<ProjectStatusRecord, RepositoryError> {
        Ok(ProjectStatusRecord {
            project_id,
            status: WorkflowState::Issued,
            history: StatusHistory::new(),
            version: 4,
        })
    }

    async fn save_project_status(
        &self,
        _project_id: ProjectId,
        _expected_version: u64,
        _status: WorkflowState,
        _record: StatusChangeRecord,
    ) -> Result<u64, RepositoryError> {
        Err(RepositoryError::Backend("read-only".to_string()))
    }
}

fn engine_over(
    repository: Arc<dyn StatusRepository>,
    documents: Arc<MemoryDocumentStore>,
    config: EngineConfig,
) -> WorkflowEngine {
    WorkflowEngine::new(repository, documents, Arc::new(NullSink)).with_config(config)
}

#[tokio::test]
async fn test_rejected_transition_has_no_side_effects() {
    let fx = TestEngine::new();
    let id = fx.new_project().await;

    let err = fx
        .engine
        .request_transition(id, WorkflowState::InProgress, test_actor(), None)
        .await
        .unwrap_err();

    assert_eq!(
        err.missing_documents(),
        Some(&[DocumentType::ProjectDesignDocument][..])
    );
    let stored = fx.repository.load_project_status(id).await.unwrap();
    assert_eq!(stored.version, 0);
    assert!(stored.history.is_empty());
    assert!(fx.sink.events().is_empty());
}

#[tokio::test]
async fn test_committed_transition_appends_one_record_and_notifies() {
    let fx = TestEngine::new();
    let id = fx.project_in(WorkflowState::Submitted).await;
    let before = fx.engine.load_project(id).await.unwrap();

    fx.add_documents(id, documents_for(WorkflowState::Validated));
    fx.clock.advance(Duration::hours(1));
    let outcome = fx
        .engine
        .request_transition(
            id,
            WorkflowState::Validated,
            ActorId::new("vvb-auditor"),
            Some("validation opinion issued".to_string()),
        )
        .await
        .unwrap();

    assert_eq!(outcome.history.len(), before.history().len() + 1);
    assert_eq!(&outcome.history.records()[..before.history().len()], before.history().records());
    assert_eq!(outcome.status, WorkflowState::Validated);
    assert_eq!(outcome.record.previous, WorkflowState::Submitted);

    let events = fx.sink.events();
    let last = events.last().unwrap();
    assert_eq!(last.project_id, id);
    assert_eq!(last.previous_state, WorkflowState::Submitted);
    assert_eq!(last.new_state, WorkflowState::Validated);
    assert_eq!(last.actor_id, ActorId::new("vvb-auditor"));
    assert_eq!(events.len(), outcome.history.len());
}

#[tokio::test]
async fn test_full_lifecycle_and_recurring_crediting_period() {
    let fx = TestEngine::new();
    let id = fx.project_in(WorkflowState::Issued).await;

    // Monitoring report from the first period is still on file.
    fx.clock.advance(Duration::days(365));
    let outcome = fx
        .engine
        .request_transition(id, WorkflowState::Monitoring, test_actor(), None)
        .await
        .unwrap();
    assert_eq!(outcome.status, WorkflowState::Monitoring);
    assert_eq!(outcome.history.len(), 10);
    assert!(outcome.history.verify_integrity().is_ok());
}

#[tokio::test]
async fn test_issued_to_monitoring_requires_report_on_file() {
    let fx = TestEngine::new();
    let id = fx.project_in(WorkflowState::Issued).await;
    fx.documents.remove_type(id, &DocumentType::MonitoringReport);

    let err = fx
        .engine
        .request_transition(id, WorkflowState::Monitoring, test_actor(), None)
        .await
        .unwrap_err();
    assert_eq!(
        err.missing_documents(),
        Some(&[DocumentType::MonitoringReport][..])
    );
    assert_eq!(
        fx.engine.load_project(id).await.unwrap().status(),
        WorkflowState::Issued
    );
}

#[tokio::test]
async fn test_notification_failure_is_a_warning() {
    let mut sink = MockSink::new();
    sink.expect_emit()
        .times(1)
        .returning(|_| Err(NotificationError::Delivery("smtp down".to_string())));

    let documents = Arc::new(MemoryDocumentStore::new());
    let repository = Arc::new(MemoryStatusRepository::new());
    let engine = WorkflowEngine::new(repository.clone(), documents.clone(), Arc::new(sink));

    let id = ProjectId::new();
    engine.create_project(id).await.unwrap();
    documents.add(id, DocumentRef::new(DocumentType::ProjectDesignDocument));

    let outcome = engine
        .request_transition(id, WorkflowState::InProgress, test_actor(), None)
        .await
        .unwrap();

    assert_eq!(
        outcome.warnings,
        vec![TransitionWarning::NotificationFailed(NotificationError::Delivery(
            "smtp down".to_string()
        ))]
    );
    let stored = repository.load_project_status(id).await.unwrap();
    assert_eq!(stored.status, WorkflowState::InProgress);
    assert_eq!(stored.version, 1);
}

#[tokio::test]
async fn test_disabled_notifications_never_reach_sink() {
    let mut sink = MockSink::new();
    sink.expect_emit().never();

    let documents = Arc::new(MemoryDocumentStore::new());
    let engine = WorkflowEngine::new(
        Arc::new(MemoryStatusRepository::new()),
        documents.clone(),
        Arc::new(sink),
    )
    .with_config(EngineConfig::default().with_notifications(false));

    let id = ProjectId::new();
    engine.create_project(id).await.unwrap();
    documents.add(id, DocumentRef::new(DocumentType::ProjectDesignDocument));

    let outcome = engine
        .request_transition(id, WorkflowState::InProgress, test_actor(), None)
        .await
        .unwrap();
    assert!(!outcome.has_warnings());
}

#[tokio::test]
async fn test_document_store_failure_aborts_without_changes() {
    let mut documents = MockDocuments::new();
    documents
        .expect_documents_for()
        .returning(|_| Err(CollaboratorError::Unavailable("object store timeout".to_string())));

    let repository = Arc::new(MemoryStatusRepository::new());
    let engine = WorkflowEngine::new(repository.clone(), Arc::new(documents), Arc::new(NullSink));
    let id = ProjectId::new();
    engine.create_project(id).await.unwrap();

    let err = engine
        .request_transition(id, WorkflowState::InProgress, test_actor(), None)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::Documents(CollaboratorError::Unavailable(_))));
    assert!(!err.is_recoverable());
    assert_eq!(repository.load_project_status(id).await.unwrap().version, 0);
}

#[tokio::test]
async fn test_outside_writer_causes_conflict() {
    let repository = Arc::new(InterferingRepository::new(1));
    let documents = Arc::new(MemoryDocumentStore::new());
    let engine = engine_over(repository.clone(), documents.clone(), EngineConfig::default());

    let id = ProjectId::new();
    engine.create_project(id).await.unwrap();
    documents.add(id, DocumentRef::new(DocumentType::ProjectDesignDocument));

    let err = engine
        .request_transition(id, WorkflowState::InProgress, test_actor(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::PersistenceConflict { project_id, expected_version: 0 } if project_id == id
    ));

    // Only the outside writer's records landed.
    let stored = repository.load_project_status(id).await.unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.history.len(), 2);
    assert!(stored
        .history
        .iter()
        .all(|r| r.actor_id == ActorId::new("other-service")));
}

#[tokio::test]
async fn test_retry_succeeds_after_competing_writer_finishes() {
    let repository = Arc::new(InterferingRepository::new(2));
    let documents = Arc::new(MemoryDocumentStore::new());
    let engine = engine_over(
        repository.clone(),
        documents.clone(),
        EngineConfig::default().with_max_conflict_retries(3),
    );

    let id = ProjectId::new();
    engine.create_project(id).await.unwrap();
    documents.add(id, DocumentRef::new(DocumentType::ProjectDesignDocument));

    let outcome = engine
        .request_transition_with_retry(id, WorkflowState::InProgress, test_actor(), None)
        .await
        .unwrap();

    assert_eq!(outcome.status, WorkflowState::InProgress);
    assert_eq!(outcome.version, 5);
    assert_eq!(outcome.history.len(), 5);
    assert_eq!(outcome.record.actor_id, test_actor());
    assert!(outcome.history.verify_integrity().is_ok());
}

#[tokio::test]
async fn test_retry_gives_up_after_configured_attempts() {
    let repository = Arc::new(InterferingRepository::new(u32::MAX));
    let documents = Arc::new(MemoryDocumentStore::new());
    let engine = engine_over(
        repository.clone(),
        documents.clone(),
        EngineConfig::default().with_max_conflict_retries(2),
    );

    let id = ProjectId::new();
    engine.create_project(id).await.unwrap();
    documents.add(id, DocumentRef::new(DocumentType::ProjectDesignDocument));

    let err = engine
        .request_transition_with_retry(id, WorkflowState::InProgress, test_actor(), None)
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    // Two attempts, each preceded by two outside saves.
    let stored = repository.load_project_status(id).await.unwrap();
    assert_eq!(stored.version, 4);
    assert_eq!(stored.status, WorkflowState::Draft);
}

#[tokio::test]
async fn test_validation_errors_are_not_retried() {
    let repository = Arc::new(InterferingRepository::new(0));
    let documents = Arc::new(MemoryDocumentStore::new());
    let engine = engine_over(repository.clone(), documents, EngineConfig::default());

    let id = ProjectId::new();
    engine.create_project(id).await.unwrap();

    let err = engine
        .request_transition_with_retry(id, WorkflowState::Issued, test_actor(), None)
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_corrupt_stored_history_is_refused() {
    let engine = WorkflowEngine::new(
        Arc::new(CorruptRepository),
        Arc::new(MemoryDocumentStore::new()),
        Arc::new(NullSink),
    );
    let id = ProjectId::new();

    assert!(matches!(
        engine.load_project(id).await,
        Err(WorkflowError::History(_))
    ));
    assert!(matches!(
        engine
            .request_transition(id, WorkflowState::Monitoring, test_actor(), None)
            .await,
        Err(WorkflowError::History(_))
    ));
    assert!(matches!(
        engine.create_project(id).await,
        Err(WorkflowError::ProjectExists(p)) if p == id
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_commit_once() {
    let fx = TestEngine::new();
    let id = fx.new_project().await;
    fx.add_documents(id, documents_for(WorkflowState::InProgress));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let engine = Arc::clone(&fx.engine);
            tokio::spawn(async move {
                engine
                    .request_transition(
                        id,
                        WorkflowState::InProgress,
                        ActorId::new(format!("reviewer-{i}")),
                        None,
                    )
                    .await
            })
        })
        .collect();

    let mut committed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => committed += 1,
            Err(e) => assert!(
                matches!(e, WorkflowError::InvalidTransition { .. }),
                "unexpected error: {e}"
            ),
        }
    }

    assert_eq!(committed, 1);
    let project = fx.engine.load_project(id).await.unwrap();
    assert_eq!(project.history().len(), 1);
    assert_eq!(fx.sink.events().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_independent_projects_progress_in_parallel() {
    let fx = TestEngine::new();
    let ids: Vec<ProjectId> = {
        let mut ids = Vec::new();
        for _ in 0..8 {
            ids.push(fx.new_project().await);
        }
        ids
    };
    for id in &ids {
        fx.add_documents(*id, cvw_test_utils::full_document_set());
    }

    let handles: Vec<_> = ids
        .iter()
        .map(|&id| {
            let engine = Arc::clone(&fx.engine);
            tokio::spawn(async move {
                for step in cvw_test_utils::path_to(WorkflowState::Issued) {
                    engine
                        .request_transition(id, step, test_actor(), None)
                        .await
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    for id in ids {
        let project = fx.engine.load_project(id).await.unwrap();
        assert_eq!(project.status(), WorkflowState::Issued);
        assert_eq!(project.history().len(), 9);
    }
    assert_eq!(fx.sink.events().len(), 72);
    assert_eq!(fx.engine.prune_locks(), 8);
}

#[tokio::test]
async fn test_backwards_clock_keeps_history_monotonic() {
    let fx = TestEngine::new();
    let id = fx.project_in(WorkflowState::InProgress).await;

    fx.clock.advance(Duration::days(-2));
    fx.engine
        .request_transition(id, WorkflowState::Draft, test_actor(), None)
        .await
        .unwrap();

    let project = fx.engine.load_project(id).await.unwrap();
    let records = project.history().records();
    assert!(records.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test]
async fn test_missing_documents_query_leaves_project_untouched() {
    let fx = TestEngine::new();
    let id = fx.project_in(WorkflowState::InProgress).await;
    let before = fx.repository.load_project_status(id).await.unwrap();

    let missing = fx
        .engine
        .missing_documents_for(id, WorkflowState::Submitted)
        .await
        .unwrap();
    assert_eq!(missing, vec![DocumentType::SupportingDocumentation]);
    assert_eq!(
        fx.engine.allowed_transitions(WorkflowState::InProgress),
        &[WorkflowState::Submitted, WorkflowState::Draft]
    );

    assert_eq!(fx.repository.load_project_status(id).await.unwrap(), before);
}

#[tokio::test]
async fn test_missing_documents_query_for_unknown_project_is_not_found() {
    let fx = TestEngine::new();
    let id = ProjectId::new();

    let result = fx
        .engine
        .missing_documents_for(id, WorkflowState::Submitted)
        .await;
    assert!(matches!(result, Err(WorkflowError::ProjectNotFound(p)) if p == id));
}

#[tokio::test]
async fn test_missing_documents_query_refuses_corrupt_history() {
    let engine = WorkflowEngine::new(
        Arc::new(CorruptRepository),
        Arc::new(MemoryDocumentStore::new()),
        Arc::new(NullSink),
    );

    let result = engine
        .missing_documents_for(ProjectId::new(), WorkflowState::Monitoring)
        .await;
    assert!(matches!(result, Err(WorkflowError::History(_))));
}

#[tokio::test]
async fn test_recording_sink_sees_events_in_commit_order() {
    let sink = Arc::new(RecordingSink::new());
    let fx = TestEngine::with_sink(
        Arc::new(MemoryStatusRepository::new()),
        Arc::new(MemoryDocumentStore::new()),
        sink.clone(),
        sink.clone(),
        EngineConfig::default(),
    );
    let id = fx.project_in(WorkflowState::Registered).await;

    let states: Vec<_> = sink.events().iter().map(|e| e.new_state).collect();
    assert_eq!(states, cvw_test_utils::path_to(WorkflowState::Registered));
    assert!(sink.events().iter().all(|e| e.project_id == id));
}
