//! Workflow simulator
//!
//! Drives many projects concurrently through random document uploads,
//! removals and transition requests against the in-memory collaborators.
//! Every engine result is compared with the pure transition table, and the
//! stored history is re-read and verified after each step.
//!
//! Invariants checked:
//! - a rejected request leaves the history identical
//! - a committed request appends exactly one record whose status is the target
//! - the stored status equals the latest record and the hash chain verifies
//! - concurrent requests on one project commit exactly once

use crate::api::{NotificationSink, StatusRepository, TransitionEvent};
use crate::clock::ManualClock;
use crate::config::EngineConfig;
use crate::engine::WorkflowEngine;
use crate::error::{NotificationError, WorkflowError};
use crate::memory::{MemoryDocumentStore, MemoryStatusRepository};
use crate::state_machine;
use crate::types::{ActorId, DocumentRef, DocumentType, ProjectId, WorkflowState};
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Simulator configuration
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Projects driven concurrently
    pub projects: usize,
    /// Operations per project
    pub steps_per_project: u64,
    /// Concurrent identical requests fired at one extra project
    pub contenders: usize,
    /// Stop a worker at its first violation
    pub stop_on_first_violation: bool,
    /// Configuration of the engine under test
    pub engine: EngineConfig,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            projects: 8,
            steps_per_project: 200,
            contenders: 8,
            stop_on_first_violation: true,
            engine: EngineConfig::default(),
        }
    }
}

/// One randomized step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedOperation {
    /// Attach a document of this type
    UploadDocument(DocumentType),
    /// Detach every document of this type
    RemoveDocuments(DocumentType),
    /// Ask the engine to move to this state
    RequestTransition(WorkflowState),
}

/// A violation detected during simulation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Engine result disagrees with the transition table
    UnexpectedOutcome {
        /// Project under test
        project_id: ProjectId,
        /// State before the request
        from: WorkflowState,
        /// Requested state
        target: WorkflowState,
        /// Outcome the table predicts
        expected: String,
        /// Outcome the engine returned
        actual: String,
    },
    /// Rejected request still modified the history
    HistoryChangedOnRejection {
        /// Project under test
        project_id: ProjectId,
        /// Requested state
        target: WorkflowState,
    },
    /// Committed request did not append exactly one matching record
    BadAppend {
        /// Project under test
        project_id: ProjectId,
        /// Requested state
        target: WorkflowState,
        /// History length before the request
        before: usize,
        /// History length after the request
        after: usize,
    },
    /// Stored project failed to load or verify
    IntegrityFailure {
        /// Project under test
        project_id: ProjectId,
        /// Load or verification error
        error: String,
    },
    /// Contended project committed other than once
    ContentionNotSerialized {
        /// Requests that committed
        commits: usize,
        /// Stored history length afterwards
        history_len: usize,
    },
    /// Sink saw a different number of events than commits
    NotificationCountMismatch {
        /// Events the configuration calls for
        expected: u64,
        /// Events the sink received
        delivered: u64,
    },
    /// Worker task panicked or was cancelled
    TaskFailed(String),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedOutcome {
                project_id,
                from,
                target,
                expected,
                actual,
            } => write!(
                f,
                "{project_id}: {from} -> {target} expected {expected}, got {actual}"
            ),
            Self::HistoryChangedOnRejection { project_id, target } => {
                write!(f, "{project_id}: rejected move to {target} changed history")
            }
            Self::BadAppend {
                project_id,
                target,
                before,
                after,
            } => write!(
                f,
                "{project_id}: move to {target} grew history {before} -> {after}"
            ),
            Self::IntegrityFailure { project_id, error } => {
                write!(f, "{project_id}: {error}")
            }
            Self::ContentionNotSerialized {
                commits,
                history_len,
            } => write!(
                f,
                "contended project: {commits} commits, history length {history_len}"
            ),
            Self::NotificationCountMismatch {
                expected,
                delivered,
            } => write!(
                f,
                "expected {expected} notifications, sink received {delivered}"
            ),
            Self::TaskFailed(msg) => write!(f, "worker failed: {msg}"),
        }
    }
}

/// Statistics for simulation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulatorStats {
    /// Projects created
    pub projects: u64,
    /// Documents attached
    pub documents_uploaded: u64,
    /// Documents detached
    pub documents_removed: u64,
    /// Transition requests issued
    pub transitions_attempted: u64,
    /// Requests that committed
    pub transitions_committed: u64,
    /// Rejections for unreachable targets
    pub rejected_invalid: u64,
    /// Rejections for absent prerequisites
    pub rejected_missing_documents: u64,
    /// Commits into `issued`
    pub issuances: u64,
    /// Commits in the contention round
    pub contended_commits: u64,
    /// Events received by the sink
    pub notifications_delivered: u64,
}

impl SimulatorStats {
    fn merge(&mut self, other: &Self) {
        self.projects += other.projects;
        self.documents_uploaded += other.documents_uploaded;
        self.documents_removed += other.documents_removed;
        self.transitions_attempted += other.transitions_attempted;
        self.transitions_committed += other.transitions_committed;
        self.rejected_invalid += other.rejected_invalid;
        self.rejected_missing_documents += other.rejected_missing_documents;
        self.issuances += other.issuances;
        self.contended_commits += other.contended_commits;
        self.notifications_delivered += other.notifications_delivered;
    }
}

/// Final report from simulator
#[derive(Debug, Clone)]
pub struct SimulatorReport {
    /// Configuration the run used
    pub config: SimulatorConfig,
    /// Aggregated counters
    pub stats: SimulatorStats,
    /// Everything that broke an invariant
    pub violations: Vec<Violation>,
}

impl SimulatorReport {
    /// True when no violation was recorded
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Generate text report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Workflow Simulator Report ===\n\n");
        report.push_str(&format!("Seed: {}\n", self.config.seed));
        report.push_str(&format!("Projects: {}\n", self.stats.projects));
        report.push_str(&format!("Documents Uploaded: {}\n", self.stats.documents_uploaded));
        report.push_str(&format!("Documents Removed: {}\n", self.stats.documents_removed));
        report.push_str(&format!(
            "Transitions Attempted: {}\n",
            self.stats.transitions_attempted
        ));
        report.push_str(&format!(
            "Transitions Committed: {}\n",
            self.stats.transitions_committed
        ));
        report.push_str(&format!("Rejected (unreachable): {}\n", self.stats.rejected_invalid));
        report.push_str(&format!(
            "Rejected (missing documents): {}\n",
            self.stats.rejected_missing_documents
        ));
        report.push_str(&format!("Issuances: {}\n", self.stats.issuances));
        report.push_str(&format!(
            "Contended Commits: {} (of {})\n",
            self.stats.contended_commits, self.config.contenders
        ));
        report.push_str(&format!(
            "Notifications Delivered: {}{}\n",
            self.stats.notifications_delivered,
            if self.config.engine.notifications_enabled { "" } else { " (disabled)" }
        ));
        report.push_str(&format!(
            "Max Conflict Retries: {}\n",
            self.config.engine.max_conflict_retries
        ));
        report.push_str(&format!("Violations: {}\n", self.violations.len()));

        if !self.violations.is_empty() {
            report.push_str("\n=== Violations ===\n");
            for (i, v) in self.violations.iter().enumerate() {
                report.push_str(&format!("{}. {}\n", i + 1, v));
            }
        }

        report.push_str(&format!(
            "\n=== Result: {} ===\n",
            if self.passed() { "PASS" } else { "FAIL" }
        ));

        report
    }
}

/// Counts delivered events
#[derive(Debug, Default)]
struct CountingSink {
    delivered: AtomicU64,
}

#[async_trait]
impl NotificationSink for CountingSink {
    async fn emit(&self, _event: TransitionEvent) -> Result<(), NotificationError> {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

struct Harness {
    engine: WorkflowEngine,
    documents: Arc<MemoryDocumentStore>,
    clock: Arc<ManualClock>,
}

/// Run the workflow simulator
pub async fn run_simulator(config: SimulatorConfig) -> SimulatorReport {
    let documents = Arc::new(MemoryDocumentStore::new());
    let repository: Arc<dyn StatusRepository> = Arc::new(MemoryStatusRepository::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(Utc::now),
    ));
    let sink = Arc::new(CountingSink::default());
    let engine = WorkflowEngine::new(repository, documents.clone(), sink.clone())
        .with_clock(clock.clone())
        .with_config(config.engine.clone());
    let harness = Arc::new(Harness {
        engine,
        documents,
        clock,
    });

    let mut stats = SimulatorStats::default();
    let mut violations = Vec::new();

    let workers: Vec<_> = (0..config.projects)
        .map(|index| {
            let harness = Arc::clone(&harness);
            let config = config.clone();
            let seed = config.seed.wrapping_add(index as u64);
            tokio::spawn(async move { drive_project(&harness, &config, seed).await })
        })
        .collect();

    for worker in workers {
        match worker.await {
            Ok((project_stats, project_violations)) => {
                stats.merge(&project_stats);
                violations.extend(project_violations);
            }
            Err(e) => violations.push(Violation::TaskFailed(e.to_string())),
        }
    }

    if config.contenders > 0 && !(config.stop_on_first_violation && !violations.is_empty()) {
        run_contention(&harness, config.contenders, &mut stats, &mut violations).await;
    }

    stats.notifications_delivered = sink.delivered.load(Ordering::Relaxed);
    let expected = if config.engine.notifications_enabled {
        stats.transitions_committed + stats.contended_commits
    } else {
        0
    };
    if stats.notifications_delivered != expected {
        violations.push(Violation::NotificationCountMismatch {
            expected,
            delivered: stats.notifications_delivered,
        });
    }

    tracing::debug!(
        committed = stats.transitions_committed,
        violations = violations.len(),
        "simulation finished"
    );

    SimulatorReport {
        config,
        stats,
        violations,
    }
}

async fn drive_project(
    harness: &Harness,
    config: &SimulatorConfig,
    seed: u64,
) -> (SimulatorStats, Vec<Violation>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut stats = SimulatorStats::default();
    let mut violations = Vec::new();
    let project_id = ProjectId::new();
    let actor = ActorId::new(format!("actor-{seed}"));

    if let Err(e) = harness.engine.create_project(project_id).await {
        violations.push(Violation::IntegrityFailure {
            project_id,
            error: e.to_string(),
        });
        return (stats, violations);
    }
    stats.projects += 1;

    for _ in 0..config.steps_per_project {
        let current = match harness.engine.load_project(project_id).await {
            Ok(project) => project,
            Err(e) => {
                violations.push(Violation::IntegrityFailure {
                    project_id,
                    error: e.to_string(),
                });
                break;
            }
        };

        // Occasionally step the clock backwards to exercise clamping.
        harness
            .clock
            .advance(Duration::seconds(rng.random_range(-30..600)));

        match generate_operation(&mut rng, current.status()) {
            SimulatedOperation::UploadDocument(document_type) => {
                harness
                    .documents
                    .add(project_id, DocumentRef::new(document_type));
                stats.documents_uploaded += 1;
            }
            SimulatedOperation::RemoveDocuments(document_type) => {
                let removed = harness.documents.remove_type(project_id, &document_type);
                stats.documents_removed += removed as u64;
            }
            SimulatedOperation::RequestTransition(target) => {
                stats.transitions_attempted += 1;
                let expected =
                    state_machine::check_transition(current.status(), target, &current.documents);
                let result = harness
                    .engine
                    .request_transition_with_retry(project_id, target, actor.clone(), None)
                    .await;

                let after = match harness.engine.load_project(project_id).await {
                    Ok(project) => project,
                    Err(e) => {
                        violations.push(Violation::IntegrityFailure {
                            project_id,
                            error: e.to_string(),
                        });
                        break;
                    }
                };

                let before_len = current.history().len();
                match (&expected, &result) {
                    (Ok(()), Ok(outcome)) => {
                        stats.transitions_committed += 1;
                        if target == WorkflowState::Issued {
                            stats.issuances += 1;
                        }
                        let appended_ok = after.history().len() == before_len + 1
                            && after.status() == target
                            && after.history().latest() == Some(&outcome.record)
                            && outcome.record.previous == current.status();
                        if !appended_ok {
                            violations.push(Violation::BadAppend {
                                project_id,
                                target,
                                before: before_len,
                                after: after.history().len(),
                            });
                        }
                    }
                    (Err(want), Err(got)) if same_rejection(want, got) => {
                        match got {
                            WorkflowError::InvalidTransition { .. } => stats.rejected_invalid += 1,
                            _ => stats.rejected_missing_documents += 1,
                        }
                        if after.history() != current.history() {
                            violations.push(Violation::HistoryChangedOnRejection {
                                project_id,
                                target,
                            });
                        }
                    }
                    _ => violations.push(Violation::UnexpectedOutcome {
                        project_id,
                        from: current.status(),
                        target,
                        expected: describe(&expected),
                        actual: describe(&result),
                    }),
                }
            }
        }

        if config.stop_on_first_violation && !violations.is_empty() {
            break;
        }
    }

    (stats, violations)
}

/// Fire identical requests at one project at once; exactly one may commit.
async fn run_contention(
    harness: &Arc<Harness>,
    contenders: usize,
    stats: &mut SimulatorStats,
    violations: &mut Vec<Violation>,
) {
    let project_id = ProjectId::new();
    if let Err(e) = harness.engine.create_project(project_id).await {
        violations.push(Violation::IntegrityFailure {
            project_id,
            error: e.to_string(),
        });
        return;
    }
    harness.documents.add(
        project_id,
        DocumentRef::new(DocumentType::ProjectDesignDocument),
    );

    let requests: Vec<_> = (0..contenders)
        .map(|i| {
            let harness = Arc::clone(harness);
            tokio::spawn(async move {
                harness
                    .engine
                    .request_transition(
                        project_id,
                        WorkflowState::InProgress,
                        ActorId::new(format!("contender-{i}")),
                        None,
                    )
                    .await
            })
        })
        .collect();

    let mut commits = 0;
    for request in requests {
        match request.await {
            Ok(Ok(_)) => commits += 1,
            Ok(Err(_)) => {}
            Err(e) => violations.push(Violation::TaskFailed(e.to_string())),
        }
    }
    stats.contended_commits = commits as u64;

    let history_len = match harness.engine.load_project(project_id).await {
        Ok(project) => project.history().len(),
        Err(e) => {
            violations.push(Violation::IntegrityFailure {
                project_id,
                error: e.to_string(),
            });
            return;
        }
    };
    if commits != 1 || history_len != 1 {
        violations.push(Violation::ContentionNotSerialized {
            commits,
            history_len,
        });
    }
}

/// Generate a random operation
///
/// Uploads favour documents that unlock a reachable state so projects make
/// progress through the lifecycle instead of idling in `draft`.
fn generate_operation(rng: &mut StdRng, current: WorkflowState) -> SimulatedOperation {
    let roll = rng.random_range(0..100);
    if roll < 30 {
        let reachable = state_machine::allowed_transitions(current);
        let pick = reachable[rng.random_range(0..reachable.len())];
        let required = state_machine::required_documents(pick);
        let document_type = if required.is_empty() || rng.random_bool(0.1) {
            random_document_type(rng)
        } else {
            required[rng.random_range(0..required.len())].clone()
        };
        SimulatedOperation::UploadDocument(document_type)
    } else if roll < 35 {
        SimulatedOperation::RemoveDocuments(random_document_type(rng))
    } else if roll < 80 {
        let reachable = state_machine::allowed_transitions(current);
        SimulatedOperation::RequestTransition(reachable[rng.random_range(0..reachable.len())])
    } else {
        let all = WorkflowState::ALL;
        SimulatedOperation::RequestTransition(all[rng.random_range(0..all.len())])
    }
}

fn random_document_type(rng: &mut StdRng) -> DocumentType {
    if rng.random_bool(0.05) {
        return DocumentType::Other("site-photo".to_string());
    }
    let known = DocumentType::KNOWN;
    known[rng.random_range(0..known.len())].clone()
}

fn same_rejection(want: &WorkflowError, got: &WorkflowError) -> bool {
    match (want, got) {
        (
            WorkflowError::InvalidTransition { from: a, to: b },
            WorkflowError::InvalidTransition { from: c, to: d },
        ) => a == c && b == d,
        (
            WorkflowError::MissingDocuments {
                target: a,
                missing: m,
            },
            WorkflowError::MissingDocuments {
                target: b,
                missing: n,
            },
        ) => a == b && m == n,
        _ => false,
    }
}

fn describe<T>(result: &Result<T, WorkflowError>) -> String {
    match result {
        Ok(_) => "commit".to_string(),
        Err(e) => e.to_string(),
    }
}
