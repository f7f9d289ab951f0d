use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod store;

use config::Config;
use dbus_interface::{AppState, VerifierService};

const BUS_NAME: &str = "org.lifecert.Verifier1";
const OBJECT_PATH: &str = "/org/lifecert/Verifier1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("lifecertd starting");

    let config = Config::from_env();
    tracing::info!(
        db = %config.db_path.display(),
        similarity_threshold = config.policy.similarity_threshold,
        ear_threshold = config.policy.blink.ear_threshold,
        min_consec_closed_frames = config.policy.blink.min_consec_closed_frames,
        min_blinks = config.policy.min_blinks_required,
        max_frames = config.max_frames,
        session_bus = config.session_bus,
        "configuration loaded"
    );

    let engine = engine::spawn_engine(&config.db_path, config.policy, config.max_frames)
        .context("failed to start engine")?;

    let session_bus = config.session_bus;
    let service = VerifierService {
        state: Arc::new(AppState { config, engine }),
    };

    let builder = if session_bus {
        zbus::connection::Builder::session()?
    } else {
        zbus::connection::Builder::system()?
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .with_context(|| format!("failed to acquire bus name {BUS_NAME}"))?;

    tracing::info!(bus = BUS_NAME, path = OBJECT_PATH, "lifecertd ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("lifecertd shutting down");

    Ok(())
}
