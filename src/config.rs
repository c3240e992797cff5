//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Numeric values that are missing or
//! unparsable fall back to their defaults.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::GatewayError;

/// Default path prefix under which websocket upgrades are accepted.
pub const DEFAULT_WS_PATH_PREFIX: &str = "/ws/chat/";

/// Timing budgets for the heartbeat broadcaster, the per-session farewell
/// and the shutdown drain.
///
/// Shutdown is bounded by `heartbeat_stop_timeout + drain_timeout` plus
/// scheduling overhead, whatever the number of connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleSettings {
    /// Pause between heartbeat rounds.
    pub heartbeat_interval: Duration,
    /// Upper bound on one heartbeat fan-out.
    pub heartbeat_round_timeout: Duration,
    /// How long shutdown waits for the broadcaster before aborting it.
    pub heartbeat_stop_timeout: Duration,
    /// Upper bound on sending close frames to every connection at shutdown.
    pub drain_timeout: Duration,
    /// Upper bound on a session's final `{"bye": true, ...}` frame.
    pub farewell_timeout: Duration,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_round_timeout: Duration::from_secs(5),
            heartbeat_stop_timeout: Duration::from_secs(2),
            drain_timeout: Duration::from_secs(8),
            farewell_timeout: Duration::from_secs(5),
        }
    }
}

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:8000`).
    pub listen_addr: SocketAddr,

    /// Path prefix for websocket upgrades, always starting and ending with `/`.
    pub ws_path_prefix: String,

    /// Heartbeat, farewell and drain timings.
    pub lifecycle: LifecycleSettings,

    /// Whether to install the Prometheus recorder and serve `/metrics`.
    pub metrics_enabled: bool,

    /// Emit logs as JSON instead of human-readable text.
    pub log_json: bool,
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if `LISTEN_ADDR` is set but cannot
    /// be parsed as a [`SocketAddr`].
    pub fn from_env() -> Result<Self, GatewayError> {
        dotenvy::dotenv().ok();

        let raw_addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let listen_addr: SocketAddr = raw_addr
            .parse()
            .map_err(|e| GatewayError::Config(format!("LISTEN_ADDR {raw_addr:?}: {e}")))?;

        let ws_path_prefix = normalize_prefix(
            &std::env::var("WS_PATH_PREFIX").unwrap_or_else(|_| DEFAULT_WS_PATH_PREFIX.to_string()),
        );

        let defaults = LifecycleSettings::default();
        let lifecycle = LifecycleSettings {
            heartbeat_interval: parse_env_secs("HEARTBEAT_INTERVAL_SECS", defaults.heartbeat_interval),
            heartbeat_round_timeout: parse_env_secs(
                "HEARTBEAT_ROUND_TIMEOUT_SECS",
                defaults.heartbeat_round_timeout,
            ),
            heartbeat_stop_timeout: parse_env_secs(
                "HEARTBEAT_STOP_TIMEOUT_SECS",
                defaults.heartbeat_stop_timeout,
            ),
            drain_timeout: parse_env_secs("DRAIN_TIMEOUT_SECS", defaults.drain_timeout),
            farewell_timeout: parse_env_secs("FAREWELL_TIMEOUT_SECS", defaults.farewell_timeout),
        };

        let metrics_enabled = parse_env_bool("METRICS_ENABLED", true);
        let log_json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

        Ok(Self {
            listen_addr,
            ws_path_prefix,
            lifecycle,
            metrics_enabled,
            log_json,
        })
    }
}

/// Ensures a path prefix starts and ends with exactly one `/`.
#[must_use]
pub fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

/// Parses an environment variable holding whole seconds. Returns `default`
/// on missing or invalid values.
fn parse_env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}
