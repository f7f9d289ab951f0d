//! Review escalation and audit recording.
//!
//! Every recorded attempt produces one append-only [`AuditEntry`]. An
//! attempt that needs review additionally opens exactly one
//! [`ManualReviewCase`] in `pending` status; resolving it is someone
//! else's job.
//!
//! Opening the review case is on the critical path: if the store refuses
//! it, the caller gets an error. Appending the audit entry is best-effort:
//! a failure is logged and reported in the receipt but never blocks the
//! verdict.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::decision::{FailureReason, Verdict, VerificationOutcome};

pub type CaseId = i64;

/// Opaque failure reported by a [`CaseStore`] implementation.
#[derive(Error, Debug)]
#[error("case store: {0}")]
pub struct CaseStoreError(#[source] Box<dyn std::error::Error + Send + Sync>);

impl CaseStoreError {
    pub fn new(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(err.into())
    }
}

#[derive(Error, Debug)]
pub enum EscalationError {
    #[error("manual review for '{subject_id}' ({reason}) was not opened: {source}")]
    ReviewCaseNotOpened {
        subject_id: String,
        reason: FailureReason,
        attempt_id: Uuid,
        audit_recorded: bool,
        #[source]
        source: CaseStoreError,
    },
    #[error("outcome is {verdict} but its failure reason is {reason:?}")]
    InconsistentOutcome {
        verdict: Verdict,
        reason: Option<FailureReason>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewStatus {
    Pending,
    Reviewed,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Reviewed => "reviewed",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReviewStatus::Pending),
            "reviewed" => Ok(ReviewStatus::Reviewed),
            "approved" => Ok(ReviewStatus::Approved),
            "rejected" => Ok(ReviewStatus::Rejected),
            other => Err(format!("unknown review status '{other}'")),
        }
    }
}

/// A request for human adjudication of one failed attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualReviewCase {
    pub subject_id: String,
    pub failure: FailureReason,
    pub details: String,
    pub status: ReviewStatus,
    pub created_at: DateTime<Utc>,
}

/// Append-only record of one attempt and why it was decided that way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub attempt_id: Uuid,
    pub subject_id: String,
    pub verdict: Verdict,
    pub reason: Option<FailureReason>,
    pub similarity: f64,
    pub blink_count: Option<u32>,
    pub frames_with_face: usize,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn status(&self) -> &'static str {
        match self.verdict {
            Verdict::Verified => "success",
            Verdict::NeedsReview => "failure",
        }
    }
}

/// Persistence for review cases and audit entries.
pub trait CaseStore {
    fn create_manual_review(&self, case: &ManualReviewCase) -> Result<CaseId, CaseStoreError>;
    fn append_audit(&self, entry: &AuditEntry) -> Result<(), CaseStoreError>;
}

impl<T: CaseStore + ?Sized> CaseStore for &T {
    fn create_manual_review(&self, case: &ManualReviewCase) -> Result<CaseId, CaseStoreError> {
        (**self).create_manual_review(case)
    }

    fn append_audit(&self, entry: &AuditEntry) -> Result<(), CaseStoreError> {
        (**self).append_audit(entry)
    }
}

/// What `record_outcome` actually managed to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordReceipt {
    pub attempt_id: Uuid,
    pub review_case_id: Option<CaseId>,
    pub audit_recorded: bool,
}

impl RecordReceipt {
    pub fn review_case_created(&self) -> bool {
        self.review_case_id.is_some()
    }
}

pub struct ReviewRecorder<S> {
    store: S,
}

impl<S: CaseStore> ReviewRecorder<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Persist the consequences of one evaluated attempt.
    ///
    /// A `needs-review` outcome must carry its failure reason and a
    /// `verified` one must not; anything else is rejected before the store
    /// is touched.
    pub fn record_outcome(
        &self,
        subject_id: &str,
        outcome: &VerificationOutcome,
    ) -> Result<RecordReceipt, EscalationError> {
        let review_reason = match (outcome.verdict, outcome.reason) {
            (Verdict::NeedsReview, Some(reason)) => Some(reason),
            (Verdict::Verified, None) => None,
            (verdict, reason) => {
                return Err(EscalationError::InconsistentOutcome { verdict, reason });
            }
        };

        let attempt_id = Uuid::new_v4();
        let now = Utc::now();
        let details = outcome.evidence();

        let review = review_reason.map(|reason| {
            let case = ManualReviewCase {
                subject_id: subject_id.to_string(),
                failure: reason,
                details: details.clone(),
                status: ReviewStatus::Pending,
                created_at: now,
            };
            (reason, self.store.create_manual_review(&case))
        });

        let entry = AuditEntry {
            attempt_id,
            subject_id: subject_id.to_string(),
            verdict: outcome.verdict,
            reason: outcome.reason,
            similarity: outcome.similarity,
            blink_count: outcome.blink_count,
            frames_with_face: outcome.frames_with_face,
            details,
            created_at: now,
        };
        let audit_recorded = match self.store.append_audit(&entry) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    subject_id,
                    attempt_id = %attempt_id,
                    "audit entry not recorded"
                );
                false
            }
        };

        let review_case_id = match review {
            None => None,
            Some((_, Ok(case_id))) => {
                tracing::info!(
                    subject_id,
                    case_id,
                    reason = ?outcome.reason,
                    "manual review opened"
                );
                Some(case_id)
            }
            Some((reason, Err(source))) => {
                tracing::error!(
                    error = %source,
                    subject_id,
                    reason = %reason,
                    "manual review could not be opened"
                );
                return Err(EscalationError::ReviewCaseNotOpened {
                    subject_id: subject_id.to_string(),
                    reason,
                    attempt_id,
                    audit_recorded,
                    source,
                });
            }
        };

        Ok(RecordReceipt {
            attempt_id,
            review_case_id,
            audit_recorded,
        })
    }
}
