//! Dispute domain: dispute workflow states, audit trail, persistence traits.

pub mod model;
pub mod repository;

pub use model::{
    ALLOWED_EVIDENCE_TYPES, DisputeAuditEntry, DisputeReason, DisputeStatus, EvidenceUpload,
    MAX_EVIDENCE_BYTES, SessionDispute,
};
pub use repository::{DisputeAuditRepository, DisputeRepository};
