//! lifecert-core: verification decision pipeline for life-certificate
//! attestation.
//!
//! Combines face similarity against an enrolled reference embedding with a
//! blink-based liveness check over 68-point facial landmarks, and routes the
//! combined verdict to automatic approval or a manual-review case.

pub mod blink;
pub mod capture;
pub mod collaborator;
pub mod decision;
pub mod ear;
pub mod escalation;
pub mod landmarks;
pub mod similarity;

pub use blink::{BlinkParams, BlinkState};
pub use capture::{CaptureEngine, CaptureError};
pub use collaborator::{CollaboratorError, Embedder, LandmarkLocator};
pub use decision::{
    Attempt, DecisionEngine, EvaluateError, FailureReason, Policy, Verdict, VerificationOutcome,
};
pub use escalation::{
    AuditEntry, CaseId, CaseStore, CaseStoreError, EscalationError, ManualReviewCase,
    RecordReceipt, ReviewRecorder, ReviewStatus,
};
pub use landmarks::{EyePoints, LandmarkFrame, Point};
pub use similarity::{Embedding, SimilarityError};
