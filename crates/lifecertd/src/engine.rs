use std::path::Path;

use lifecert_core::{
    Attempt, CaseId, DecisionEngine, EscalationError, EvaluateError, Policy, RecordReceipt,
    ReviewRecorder, ReviewStatus, VerificationOutcome,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::store::{AuditRecord, ReviewRecord, SqliteCaseStore, StoreError};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid attempt: {0}")]
    Evaluate(#[from] EvaluateError),
    #[error("attempt has {got} frames (limit {max})")]
    TooManyFrames { got: usize, max: usize },
    #[error(transparent)]
    Escalation(#[from] EscalationError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Outcome of an attempt together with what was persisted for it.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptResult {
    pub outcome: VerificationOutcome,
    pub receipt: RecordReceipt,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Record {
        subject_id: String,
        outcome: VerificationOutcome,
        reply: oneshot::Sender<Result<RecordReceipt, EngineError>>,
    },
    PendingReviews {
        reply: oneshot::Sender<Result<Vec<ReviewRecord>, EngineError>>,
    },
    SubjectReviews {
        subject_id: String,
        reply: oneshot::Sender<Result<Vec<ReviewRecord>, EngineError>>,
    },
    SetReviewStatus {
        case_id: CaseId,
        status: ReviewStatus,
        reply: oneshot::Sender<Result<bool, EngineError>>,
    },
    AuditHistory {
        subject_id: String,
        limit: u32,
        reply: oneshot::Sender<Result<Vec<AuditRecord>, EngineError>>,
    },
    CountPending {
        reply: oneshot::Sender<Result<u64, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
///
/// Evaluation runs on the caller's task; only persistence is serialized
/// through the engine thread, which owns the SQLite connection.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    decision: DecisionEngine,
    max_frames: usize,
}

impl EngineHandle {
    pub fn policy(&self) -> &Policy {
        self.decision.policy()
    }

    /// Evaluate an attempt and record its outcome.
    ///
    /// Malformed attempts return an error before anything is persisted.
    pub async fn verify(
        &self,
        subject_id: &str,
        attempt: Attempt,
    ) -> Result<AttemptResult, EngineError> {
        if attempt.frames.len() > self.max_frames {
            return Err(EngineError::TooManyFrames {
                got: attempt.frames.len(),
                max: self.max_frames,
            });
        }

        let outcome = self.decision.evaluate_attempt(&attempt)?;

        let receipt = self
            .request(|reply| EngineRequest::Record {
                subject_id: subject_id.to_string(),
                outcome: outcome.clone(),
                reply,
            })
            .await?;

        Ok(AttemptResult { outcome, receipt })
    }

    pub async fn pending_reviews(&self) -> Result<Vec<ReviewRecord>, EngineError> {
        self.request(|reply| EngineRequest::PendingReviews { reply })
            .await
    }

    pub async fn subject_reviews(&self, subject_id: &str) -> Result<Vec<ReviewRecord>, EngineError> {
        let subject_id = subject_id.to_string();
        self.request(|reply| EngineRequest::SubjectReviews { subject_id, reply })
            .await
    }

    pub async fn set_review_status(
        &self,
        case_id: CaseId,
        status: ReviewStatus,
    ) -> Result<bool, EngineError> {
        self.request(|reply| EngineRequest::SetReviewStatus {
            case_id,
            status,
            reply,
        })
        .await
    }

    pub async fn audit_history(
        &self,
        subject_id: &str,
        limit: u32,
    ) -> Result<Vec<AuditRecord>, EngineError> {
        let subject_id = subject_id.to_string();
        self.request(|reply| EngineRequest::AuditHistory {
            subject_id,
            limit,
            reply,
        })
        .await
    }

    pub async fn count_pending(&self) -> Result<u64, EngineError> {
        self.request(|reply| EngineRequest::CountPending { reply })
            .await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, EngineError>>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

#[cfg(test)]
impl EngineHandle {
    /// Handle whose engine thread is already gone.
    pub(crate) fn disconnected(policy: Policy, max_frames: usize) -> Self {
        let (tx, _) = mpsc::channel(1);
        Self {
            tx,
            decision: DecisionEngine::new(policy),
            max_frames,
        }
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Opens the case store synchronously so a bad database path fails at
/// startup, then enters a request loop.
pub fn spawn_engine(
    db_path: &Path,
    policy: Policy,
    max_frames: usize,
) -> Result<EngineHandle, EngineError> {
    let store = SqliteCaseStore::open(db_path)?;
    tracing::info!(path = %db_path.display(), "case store opened");

    let recorder = ReviewRecorder::new(store);
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(32);

    std::thread::Builder::new()
        .name("lifecert-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                handle(&recorder, req);
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle {
        tx,
        decision: DecisionEngine::new(policy),
        max_frames,
    })
}

fn handle(recorder: &ReviewRecorder<SqliteCaseStore>, req: EngineRequest) {
    let store = recorder.store();
    // A dropped receiver means the caller gave up; nothing to do.
    match req {
        EngineRequest::Record {
            subject_id,
            outcome,
            reply,
        } => {
            let result = recorder
                .record_outcome(&subject_id, &outcome)
                .map_err(EngineError::from);
            let _ = reply.send(result);
        }
        EngineRequest::PendingReviews { reply } => {
            let _ = reply.send(store.pending_reviews().map_err(EngineError::from));
        }
        EngineRequest::SubjectReviews { subject_id, reply } => {
            let _ = reply.send(
                store
                    .reviews_for_subject(&subject_id)
                    .map_err(EngineError::from),
            );
        }
        EngineRequest::SetReviewStatus {
            case_id,
            status,
            reply,
        } => {
            let result = store
                .set_review_status(case_id, status)
                .map_err(EngineError::from);
            match result {
                Ok(true) => tracing::info!(case_id, status = %status, "review resolved"),
                Ok(false) => match store.review_status(case_id) {
                    Ok(Some(current)) => {
                        tracing::warn!(case_id, current = %current, "review already resolved")
                    }
                    Ok(None) => tracing::warn!(case_id, "review not found"),
                    Err(e) => tracing::warn!(case_id, error = %e, "review lookup failed"),
                },
                Err(_) => {}
            }
            let _ = reply.send(result);
        }
        EngineRequest::AuditHistory {
            subject_id,
            limit,
            reply,
        } => {
            let _ = reply.send(
                store
                    .audit_for_subject(&subject_id, limit)
                    .map_err(EngineError::from),
            );
        }
        EngineRequest::CountPending { reply } => {
            let _ = reply.send(store.count_pending().map_err(EngineError::from));
        }
    }
}
