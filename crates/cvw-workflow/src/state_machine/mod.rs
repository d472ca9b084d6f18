//! Transition table
//!
//! Each state maps to the states reachable from it and the document types
//! required to enter it. Everything here is pure.

use crate::error::WorkflowError;
use crate::types::{DocumentRef, DocumentType, WorkflowState};

/// Row of the transition table
#[derive(Debug, Clone, Copy)]
pub struct StateRule {
    /// States directly reachable from this one
    pub reachable: &'static [WorkflowState],
    /// Document types that must exist before entering this state
    pub required: &'static [DocumentType],
}

const NO_DOCUMENTS: &[DocumentType] = &[];
const DESIGN: &[DocumentType] = &[DocumentType::ProjectDesignDocument];
const SUBMISSION: &[DocumentType] = &[
    DocumentType::ProjectDesignDocument,
    DocumentType::SupportingDocumentation,
];
const VALIDATION: &[DocumentType] = &[DocumentType::ValidationReport];
const REGISTRATION: &[DocumentType] = &[DocumentType::RegistrationProof];
const MONITORING: &[DocumentType] = &[DocumentType::MonitoringReport];
const VERIFICATION: &[DocumentType] = &[DocumentType::VerificationReport];
const VERIFIED: &[DocumentType] = &[DocumentType::VerificationStatement];
const ISSUANCE: &[DocumentType] = &[DocumentType::IssuanceRequest];
const ISSUED: &[DocumentType] = &[DocumentType::IssuanceConfirmation];

/// Transition table row for `state`.
pub fn rule(state: WorkflowState) -> StateRule {
    use WorkflowState::*;
    match state {
        Draft => StateRule {
            reachable: &[InProgress],
            required: NO_DOCUMENTS,
        },
        InProgress => StateRule {
            reachable: &[Submitted, Draft],
            required: DESIGN,
        },
        Submitted => StateRule {
            reachable: &[InProgress, Validated],
            required: SUBMISSION,
        },
        Validated => StateRule {
            reachable: &[Registered],
            required: VALIDATION,
        },
        Registered => StateRule {
            reachable: &[Monitoring],
            required: REGISTRATION,
        },
        Monitoring => StateRule {
            reachable: &[Verification],
            required: MONITORING,
        },
        Verification => StateRule {
            reachable: &[Verified, Monitoring],
            required: VERIFICATION,
        },
        Verified => StateRule {
            reachable: &[Issuance, Monitoring],
            required: VERIFIED,
        },
        Issuance => StateRule {
            reachable: &[Issued, Verified],
            required: ISSUANCE,
        },
        Issued => StateRule {
            reachable: &[Monitoring],
            required: ISSUED,
        },
    }
}

/// States directly reachable from `from`.
pub fn allowed_transitions(from: WorkflowState) -> &'static [WorkflowState] {
    rule(from).reachable
}

/// Document types required to enter `target`.
pub fn required_documents(target: WorkflowState) -> &'static [DocumentType] {
    rule(target).required
}

/// Whether `to` is listed as reachable from `from`.
pub fn is_reachable(from: WorkflowState, to: WorkflowState) -> bool {
    allowed_transitions(from).contains(&to)
}

/// Reachability check only; document gating is separate.
pub fn validate_transition(from: WorkflowState, to: WorkflowState) -> Result<(), WorkflowError> {
    if is_reachable(from, to) {
        Ok(())
    } else {
        Err(WorkflowError::InvalidTransition { from, to })
    }
}

/// Required-but-absent document types for entering `target`, in table order.
pub fn missing_documents(target: WorkflowState, documents: &[DocumentRef]) -> Vec<DocumentType> {
    required_documents(target)
        .iter()
        .filter(|required| !documents.iter().any(|doc| &doc.document_type == *required))
        .cloned()
        .collect()
}

/// Full check: reachability first, then prerequisites.
pub fn check_transition(
    from: WorkflowState,
    to: WorkflowState,
    documents: &[DocumentRef],
) -> Result<(), WorkflowError> {
    validate_transition(from, to)?;
    let missing = missing_documents(to, documents);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(WorkflowError::MissingDocuments {
            target: to,
            missing,
        })
    }
}
