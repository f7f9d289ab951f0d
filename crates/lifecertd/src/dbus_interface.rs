use std::sync::Arc;

use lifecert_core::{Attempt, ReviewStatus};
use zbus::interface;

use crate::config::Config;
use crate::engine::{EngineError, EngineHandle};

/// Audit rows returned by `AuditHistory` when the caller asks for 0.
const DEFAULT_AUDIT_LIMIT: u32 = 50;

/// Shared state accessible by D-Bus method handlers.
pub struct AppState {
    pub config: Config,
    pub engine: EngineHandle,
}

/// D-Bus interface for the life-certificate verification daemon.
///
/// Bus name: org.lifecert.Verifier1
/// Object path: /org/lifecert/Verifier1
pub struct VerifierService {
    pub state: Arc<AppState>,
}

impl VerifierService {
    /// On the system bus only root and the configured client account may
    /// call in. Session bus (development) skips the check.
    async fn authorize(
        &self,
        header: &zbus::message::Header<'_>,
        conn: &zbus::Connection,
    ) -> zbus::fdo::Result<()> {
        if self.state.config.session_bus {
            return Ok(());
        }

        let sender = header
            .sender()
            .ok_or_else(|| zbus::fdo::Error::Failed("no sender in message".to_string()))?;
        let caller_uid = get_caller_uid(sender.as_str(), conn).await?;
        if caller_uid == 0 {
            return Ok(());
        }

        let allowed = self
            .state
            .config
            .client_user
            .as_deref()
            .and_then(uid_for_name);
        if allowed == Some(caller_uid) {
            return Ok(());
        }

        tracing::warn!(caller_uid, "caller is not permitted");
        Err(zbus::fdo::Error::AccessDenied(format!(
            "uid {caller_uid} is not permitted to use the verifier"
        )))
    }
}

/// Retrieve the UID of the D-Bus peer identified by `sender_str` (a unique bus name).
async fn get_caller_uid(sender_str: &str, conn: &zbus::Connection) -> zbus::fdo::Result<u32> {
    let dbus_proxy = zbus::fdo::DBusProxy::new(conn)
        .await
        .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
    let bus_name = zbus::names::BusName::try_from(sender_str)
        .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
    dbus_proxy
        .get_connection_unix_user(bus_name)
        .await
        .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

/// Look up the numeric UID for a local account name.
fn uid_for_name(name: &str) -> Option<u32> {
    nix::unistd::User::from_name(name)
        .ok()
        .flatten()
        .map(|user| user.uid.as_raw())
}

fn to_fdo(e: EngineError) -> zbus::fdo::Error {
    match e {
        EngineError::Evaluate(_) | EngineError::TooManyFrames { .. } => {
            zbus::fdo::Error::InvalidArgs(e.to_string())
        }
        other => zbus::fdo::Error::Failed(other.to_string()),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

#[interface(name = "org.lifecert.Verifier1")]
impl VerifierService {
    /// Evaluate one verification attempt for a subject and record the outcome.
    ///
    /// `attempt_json` is `{"reference": [..], "probe": [..], "frames": [null | [[x, y] × 68]]}`.
    /// Returns `{"outcome": {..}, "receipt": {..}}` as JSON.
    async fn evaluate(
        &self,
        subject_id: &str,
        attempt_json: &str,
        #[zbus(header)] header: zbus::message::Header<'_>,
        #[zbus(connection)] conn: &zbus::Connection,
    ) -> zbus::fdo::Result<String> {
        self.authorize(&header, conn).await?;

        let attempt: Attempt = serde_json::from_str(attempt_json).map_err(|e| {
            tracing::warn!(subject_id, error = %e, "evaluate: malformed attempt");
            zbus::fdo::Error::InvalidArgs(format!("malformed attempt: {e}"))
        })?;
        tracing::info!(subject_id, frames = attempt.frames.len(), "evaluate requested");

        let result = self
            .state
            .engine
            .verify(subject_id, attempt)
            .await
            .map_err(|e| {
                tracing::error!(subject_id, error = %e, "evaluate failed");
                to_fdo(e)
            })?;

        tracing::info!(
            subject_id,
            verdict = %result.outcome.verdict,
            similarity = result.outcome.similarity,
            blinks = ?result.outcome.blink_count,
            review_case = ?result.receipt.review_case_id,
            audit_recorded = result.receipt.audit_recorded,
            "evaluate complete"
        );

        to_json(&result)
    }

    /// List all pending manual reviews as JSON.
    async fn pending_reviews(
        &self,
        #[zbus(header)] header: zbus::message::Header<'_>,
        #[zbus(connection)] conn: &zbus::Connection,
    ) -> zbus::fdo::Result<String> {
        self.authorize(&header, conn).await?;
        let reviews = self.state.engine.pending_reviews().await.map_err(to_fdo)?;
        to_json(&reviews)
    }

    /// List the review history of one subject as JSON.
    async fn subject_reviews(
        &self,
        subject_id: &str,
        #[zbus(header)] header: zbus::message::Header<'_>,
        #[zbus(connection)] conn: &zbus::Connection,
    ) -> zbus::fdo::Result<String> {
        self.authorize(&header, conn).await?;
        let reviews = self
            .state
            .engine
            .subject_reviews(subject_id)
            .await
            .map_err(to_fdo)?;
        to_json(&reviews)
    }

    /// Resolve a pending review (`reviewed`, `approved` or `rejected`).
    ///
    /// Returns false if the case does not exist or was already resolved.
    async fn set_review_status(
        &self,
        case_id: i64,
        status: &str,
        #[zbus(header)] header: zbus::message::Header<'_>,
        #[zbus(connection)] conn: &zbus::Connection,
    ) -> zbus::fdo::Result<bool> {
        self.authorize(&header, conn).await?;
        let status: ReviewStatus = status.parse().map_err(zbus::fdo::Error::InvalidArgs)?;
        tracing::info!(case_id, status = %status, "set_review_status requested");

        self.state
            .engine
            .set_review_status(case_id, status)
            .await
            .map_err(to_fdo)
    }

    /// Most recent audit entries for a subject as JSON, newest first.
    async fn audit_history(
        &self,
        subject_id: &str,
        limit: u32,
        #[zbus(header)] header: zbus::message::Header<'_>,
        #[zbus(connection)] conn: &zbus::Connection,
    ) -> zbus::fdo::Result<String> {
        self.authorize(&header, conn).await?;
        let limit = if limit == 0 { DEFAULT_AUDIT_LIMIT } else { limit };
        let entries = self
            .state
            .engine
            .audit_history(subject_id, limit)
            .await
            .map_err(to_fdo)?;
        to_json(&entries)
    }

    /// Return daemon status information as JSON.
    async fn status(
        &self,
        #[zbus(header)] header: zbus::message::Header<'_>,
        #[zbus(connection)] conn: &zbus::Connection,
    ) -> zbus::fdo::Result<String> {
        self.authorize(&header, conn).await?;
        let report = status_report(&self.state).await.map_err(|e| {
            tracing::warn!(error = %e, "status: case store unavailable");
            to_fdo(e)
        })?;
        Ok(report.to_string())
    }
}

async fn status_report(state: &AppState) -> Result<serde_json::Value, EngineError> {
    let pending = state.engine.count_pending().await?;
    Ok(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "pending_reviews": pending,
        "policy": state.engine.policy(),
        "max_frames": state.config.max_frames,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    use lifecert_core::Policy;

    use crate::engine::spawn_engine;

    fn state(engine: EngineHandle) -> AppState {
        AppState {
            config: Config {
                db_path: PathBuf::from(":memory:"),
                policy: Policy::default(),
                max_frames: 100,
                client_user: None,
                session_bus: true,
            },
            engine,
        }
    }

    #[tokio::test]
    async fn test_status_report() {
        let engine = spawn_engine(Path::new(":memory:"), Policy::default(), 100).unwrap();
        let report = status_report(&state(engine)).await.unwrap();
        assert_eq!(report["pending_reviews"], 0);
        assert_eq!(report["max_frames"], 100);
        assert_eq!(report["policy"]["min_blinks_required"], 2);
    }

    #[tokio::test]
    async fn test_status_surfaces_store_failure() {
        let engine = EngineHandle::disconnected(Policy::default(), 100);
        let err = status_report(&state(engine)).await.unwrap_err();
        assert!(matches!(err, EngineError::ChannelClosed));
        assert!(matches!(to_fdo(err), zbus::fdo::Error::Failed(_)));
    }

    #[test]
    fn test_input_errors_map_to_invalid_args() {
        let err = to_fdo(EngineError::TooManyFrames { got: 901, max: 900 });
        assert!(matches!(err, zbus::fdo::Error::InvalidArgs(_)));
    }
}
