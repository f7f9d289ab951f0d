//! `lifecert`: run verification attempts and administer manual reviews.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lifecert_core::{Attempt, DecisionEngine, ReviewStatus};
use tracing_subscriber::EnvFilter;

#[zbus::proxy(
    interface = "org.lifecert.Verifier1",
    default_service = "org.lifecert.Verifier1",
    default_path = "/org/lifecert/Verifier1"
)]
trait Verifier {
    fn evaluate(&self, subject_id: &str, attempt_json: &str) -> zbus::Result<String>;
    fn pending_reviews(&self) -> zbus::Result<String>;
    fn subject_reviews(&self, subject_id: &str) -> zbus::Result<String>;
    fn set_review_status(&self, case_id: i64, status: &str) -> zbus::Result<bool>;
    fn audit_history(&self, subject_id: &str, limit: u32) -> zbus::Result<String>;
    fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "lifecert", version, about = "Life-certificate verification")]
struct Cli {
    /// Talk to a daemon on the session bus instead of the system bus.
    #[arg(long, global = true)]
    session: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate an attempt file locally with the default policy. Nothing is recorded.
    Check {
        /// JSON file: {"reference": [..], "probe": [..], "frames": [..]}
        attempt: PathBuf,
    },
    /// Submit an attempt to the daemon, which evaluates and records it.
    Evaluate {
        subject_id: String,
        attempt: PathBuf,
    },
    /// List pending manual reviews, or the review history of one subject.
    Reviews {
        #[arg(long)]
        subject: Option<String>,
    },
    /// Resolve a pending review as reviewed, approved or rejected.
    Resolve { case_id: i64, status: ReviewStatus },
    /// Show recent audit entries for a subject.
    Audit {
        subject_id: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Show daemon status.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let session = cli.session;

    match cli.command {
        Command::Check { attempt } => check(&attempt)?,
        Command::Evaluate {
            subject_id,
            attempt,
        } => {
            let json = std::fs::read_to_string(&attempt)
                .with_context(|| format!("failed to read {}", attempt.display()))?;
            let proxy = connect(session).await?;
            print_json(&proxy.evaluate(&subject_id, &json).await?)?;
        }
        Command::Reviews { subject } => {
            let proxy = connect(session).await?;
            let json = match subject {
                Some(subject_id) => proxy.subject_reviews(&subject_id).await?,
                None => proxy.pending_reviews().await?,
            };
            print_json(&json)?;
        }
        Command::Resolve { case_id, status } => {
            if status == ReviewStatus::Pending {
                bail!("a review cannot be moved back to pending");
            }
            let proxy = connect(session).await?;
            if proxy.set_review_status(case_id, status.as_str()).await? {
                println!("review {case_id} marked {status}");
            } else {
                bail!("review {case_id} not found or already resolved");
            }
        }
        Command::Audit { subject_id, limit } => {
            let proxy = connect(session).await?;
            print_json(&proxy.audit_history(&subject_id, limit).await?)?;
        }
        Command::Status => {
            let proxy = connect(session).await?;
            print_json(&proxy.status().await?)?;
        }
    }

    Ok(())
}

async fn connect(session: bool) -> Result<VerifierProxy<'static>> {
    let conn = if session {
        zbus::Connection::session().await
    } else {
        zbus::Connection::system().await
    }
    .context("failed to connect to D-Bus")?;
    VerifierProxy::new(&conn)
        .await
        .context("lifecertd is not reachable")
}

fn check(path: &Path) -> Result<()> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let attempt: Attempt = serde_json::from_str(&json).context("malformed attempt file")?;
    tracing::debug!(
        path = %path.display(),
        frames = attempt.frames.len(),
        "evaluating attempt locally"
    );
    let outcome = DecisionEngine::default()
        .evaluate_attempt(&attempt)
        .context("attempt could not be evaluated")?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if let Some(reason) = outcome.reason {
        eprintln!("needs review ({reason}): {}", outcome.evidence());
    }
    Ok(())
}

/// Re-indent a JSON reply from the daemon.
fn print_json(raw: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(raw).context("daemon returned invalid JSON")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn resolve_parses_status() {
        let cli = Cli::try_parse_from(["lifecert", "resolve", "12", "approved"]).unwrap();
        match cli.command {
            Command::Resolve { case_id, status } => {
                assert_eq!(case_id, 12);
                assert_eq!(status, ReviewStatus::Approved);
            }
            _ => panic!("expected resolve"),
        }
        assert!(Cli::try_parse_from(["lifecert", "resolve", "12", "done"]).is_err());
    }

    #[test]
    fn session_flag_is_global() {
        let cli = Cli::try_parse_from(["lifecert", "status", "--session"]).unwrap();
        assert!(cli.session);
    }
}
