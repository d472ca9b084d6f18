//! In-memory collaborators
//!
//! Used by tests, the simulator and embedders without a database. The
//! repository keeps the same optimistic-version contract a SQL backend would.

use crate::api::{DocumentStore, ProjectStatusRecord, StatusRepository};
use crate::error::{CollaboratorError, RepositoryError};
use crate::history::StatusChangeRecord;
use crate::types::{DocumentRef, DocumentType, ProjectId, WorkflowState};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Document sets keyed by project
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: DashMap<ProjectId, Vec<DocumentRef>>,
}

impl MemoryDocumentStore {
    /// Empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a document to a project
    pub fn add(&self, project_id: ProjectId, document: DocumentRef) {
        self.documents.entry(project_id).or_default().push(document);
    }

    /// Detach every document of the given type; returns how many were removed
    pub fn remove_type(&self, project_id: ProjectId, document_type: &DocumentType) -> usize {
        self.documents
            .get_mut(&project_id)
            .map(|mut docs| {
                let before = docs.len();
                docs.retain(|doc| &doc.document_type != document_type);
                before - docs.len()
            })
            .unwrap_or(0)
    }

    /// Copy of the project's current documents
    #[must_use]
    pub fn snapshot(&self, project_id: ProjectId) -> Vec<DocumentRef> {
        self.documents
            .get(&project_id)
            .map(|docs| docs.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn documents_for(&self, project_id: ProjectId) -> Result<Vec<DocumentRef>, CollaboratorError> {
        Ok(self.snapshot(project_id))
    }
}

/// Versioned status records behind one lock
///
/// Save is a read-modify-write under the write lock, so the version check and
/// the append happen atomically.
#[derive(Debug, Default)]
pub struct MemoryStatusRepository {
    records: RwLock<HashMap<ProjectId, ProjectStatusRecord>>,
}

impl MemoryStatusRepository {
    /// Empty repository
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of initialized projects
    #[must_use]
    pub fn project_count(&self) -> usize {
        self.records.read().len()
    }

    /// Ids of initialized projects, unordered
    #[must_use]
    pub fn project_ids(&self) -> Vec<ProjectId> {
        self.records.read().keys().copied().collect()
    }
}

#[async_trait]
impl StatusRepository for MemoryStatusRepository {
    async fn create_project(&self, project_id: ProjectId) -> Result<ProjectStatusRecord, RepositoryError> {
        let mut records = self.records.write();
        if records.contains_key(&project_id) {
            return Err(RepositoryError::AlreadyExists(project_id));
        }
        let record = ProjectStatusRecord::initial(project_id);
        records.insert(project_id, record.clone());
        Ok(record)
    }

    async fn load_project_status(&self, project_id: ProjectId) -> Result<ProjectStatusRecord, RepositoryError> {
        self.records
            .read()
            .get(&project_id)
            .cloned()
            .ok_or(RepositoryError::NotFound(project_id))
    }

    async fn save_project_status(
        &self,
        project_id: ProjectId,
        expected_version: u64,
        status: WorkflowState,
        record: StatusChangeRecord,
    ) -> Result<u64, RepositoryError> {
        let mut records = self.records.write();
        let stored = records
            .get_mut(&project_id)
            .ok_or(RepositoryError::NotFound(project_id))?;

        if stored.version != expected_version {
            return Err(RepositoryError::Conflict {
                project_id,
                expected_version,
                actual_version: stored.version,
            });
        }
        if record.status != status {
            return Err(RepositoryError::Backend(format!(
                "record status {} does not match {}",
                record.status, status
            )));
        }

        // Append to a copy so a rejected record leaves the stored ledger intact.
        let mut history = stored.history.clone();
        history
            .append(record)
            .map_err(|e| RepositoryError::Backend(e.to_string()))?;

        stored.history = history;
        stored.status = status;
        stored.version += 1;
        Ok(stored.version)
    }
}
