//! Core types for the verification workflow
//!
//! Defines:
//! - Project and actor identifiers
//! - The closed set of workflow states
//! - The document-type vocabulary and document references

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique project identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub Uuid);

impl ProjectId {
    /// Generate new project ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the principal requesting a transition
///
/// Opaque to the engine; authentication happens upstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub String);

impl ActorId {
    /// Wrap an opaque principal id
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw id
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Workflow states a project can occupy
///
/// The set is closed. Declaration order follows the nominal lifecycle, so
/// `ALL` doubles as the canonical ordering for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowState {
    /// Project is being drafted
    Draft,
    /// Design work under way
    InProgress,
    /// Submitted for validation
    Submitted,
    /// Validated by a validation/verification body
    Validated,
    /// Registered with the standard
    Registered,
    /// Monitoring period running
    Monitoring,
    /// Monitoring results under verification
    Verification,
    /// Emission reductions verified
    Verified,
    /// Credit issuance requested
    Issuance,
    /// Credits issued
    Issued,
}

impl WorkflowState {
    /// Every state, in lifecycle order
    pub const ALL: [WorkflowState; 10] = [
        WorkflowState::Draft,
        WorkflowState::InProgress,
        WorkflowState::Submitted,
        WorkflowState::Validated,
        WorkflowState::Registered,
        WorkflowState::Monitoring,
        WorkflowState::Verification,
        WorkflowState::Verified,
        WorkflowState::Issuance,
        WorkflowState::Issued,
    ];

    /// State every new project starts in
    pub const INITIAL: WorkflowState = WorkflowState::Draft;

    /// Wire name (kebab-case)
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            WorkflowState::Draft => "draft",
            WorkflowState::InProgress => "in-progress",
            WorkflowState::Submitted => "submitted",
            WorkflowState::Validated => "validated",
            WorkflowState::Registered => "registered",
            WorkflowState::Monitoring => "monitoring",
            WorkflowState::Verification => "verification",
            WorkflowState::Verified => "verified",
            WorkflowState::Issuance => "issuance",
            WorkflowState::Issued => "issued",
        }
    }
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a workflow state name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown workflow state: {0}")]
pub struct UnknownState(pub String);

impl FromStr for WorkflowState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkflowState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}

/// Role a document plays in satisfying standard requirements
///
/// Tags outside the controlled vocabulary are kept as [`DocumentType::Other`];
/// they are carried through but never satisfy a prerequisite.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DocumentType {
    /// Project design document (PDD)
    ProjectDesignDocument,
    /// Evidence backing the design document
    SupportingDocumentation,
    /// Validation body's report
    ValidationReport,
    /// Registry confirmation of registration
    RegistrationProof,
    /// Monitoring results for a crediting period
    MonitoringReport,
    /// Verification body's report
    VerificationReport,
    /// Verification body's formal statement
    VerificationStatement,
    /// Request to issue credits
    IssuanceRequest,
    /// Registry confirmation of issuance
    IssuanceConfirmation,
    /// Any tag outside the vocabulary
    Other(String),
}

impl DocumentType {
    /// Controlled vocabulary
    pub const KNOWN: [DocumentType; 9] = [
        DocumentType::ProjectDesignDocument,
        DocumentType::SupportingDocumentation,
        DocumentType::ValidationReport,
        DocumentType::RegistrationProof,
        DocumentType::MonitoringReport,
        DocumentType::VerificationReport,
        DocumentType::VerificationStatement,
        DocumentType::IssuanceRequest,
        DocumentType::IssuanceConfirmation,
    ];

    /// Wire tag
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            DocumentType::ProjectDesignDocument => "project-design-document",
            DocumentType::SupportingDocumentation => "supporting-documentation",
            DocumentType::ValidationReport => "validation-report",
            DocumentType::RegistrationProof => "registration-proof",
            DocumentType::MonitoringReport => "monitoring-report",
            DocumentType::VerificationReport => "verification-report",
            DocumentType::VerificationStatement => "verification-statement",
            DocumentType::IssuanceRequest => "issuance-request",
            DocumentType::IssuanceConfirmation => "issuance-confirmation",
            DocumentType::Other(tag) => tag,
        }
    }

    /// Whether the tag belongs to the controlled vocabulary
    #[inline]
    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, DocumentType::Other(_))
    }
}

impl From<&str> for DocumentType {
    fn from(tag: &str) -> Self {
        DocumentType::KNOWN
            .into_iter()
            .find(|known| known.as_str() == tag)
            .unwrap_or_else(|| DocumentType::Other(tag.to_string()))
    }
}

impl From<String> for DocumentType {
    fn from(tag: String) -> Self {
        match DocumentType::from(tag.as_str()) {
            DocumentType::Other(_) => DocumentType::Other(tag),
            known => known,
        }
    }
}

impl From<DocumentType> for String {
    fn from(value: DocumentType) -> Self {
        match value {
            DocumentType::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl FromStr for DocumentType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(DocumentType::from(s))
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a stored document
///
/// Only `document_type` takes part in gating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Role of the document
    pub document_type: DocumentType,
    /// Storage identifier, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    /// Original file name, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl DocumentRef {
    /// Create reference with only a type
    #[inline]
    #[must_use]
    pub fn new(document_type: impl Into<DocumentType>) -> Self {
        Self {
            document_type: document_type.into(),
            document_id: None,
            file_name: None,
        }
    }

    /// With storage identifier
    #[inline]
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.document_id = Some(id.into());
        self
    }

    /// With file name
    #[inline]
    #[must_use]
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }
}
