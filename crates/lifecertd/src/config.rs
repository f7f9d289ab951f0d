use std::path::PathBuf;

use lifecert_core::{BlinkParams, Policy};

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite database holding review cases and the audit log.
    pub db_path: PathBuf,
    /// Decision thresholds. Defaults are the published contract constants.
    pub policy: Policy,
    /// Upper bound on landmark frames accepted per liveness attempt.
    pub max_frames: usize,
    /// Local account, besides root, permitted to call the daemon on the
    /// system bus (typically the web backend's service user).
    pub client_user: Option<String>,
    /// Whether the daemon is running on the session bus (development mode).
    /// UID validation is skipped on the session bus.
    pub session_bus: bool,
}

impl Config {
    /// Load configuration from `LIFECERT_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("lifecert");

        let db_path = std::env::var("LIFECERT_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("cases.db"));

        let defaults = Policy::default();
        let policy = Policy {
            similarity_threshold: env_f64(
                "LIFECERT_SIMILARITY_THRESHOLD",
                defaults.similarity_threshold,
            ),
            blink: BlinkParams {
                ear_threshold: env_f64("LIFECERT_EAR_THRESHOLD", defaults.blink.ear_threshold),
                min_consec_closed_frames: env_u32(
                    "LIFECERT_MIN_CONSEC_CLOSED_FRAMES",
                    defaults.blink.min_consec_closed_frames,
                ),
            },
            min_blinks_required: env_u32("LIFECERT_MIN_BLINKS", defaults.min_blinks_required),
        };

        Self {
            db_path,
            policy,
            max_frames: env_usize("LIFECERT_MAX_FRAMES", 900),
            client_user: std::env::var("LIFECERT_CLIENT_USER")
                .ok()
                .filter(|u| !u.is_empty()),
            session_bus: std::env::var("LIFECERT_SESSION_BUS").is_ok(),
        }
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
