//! Hub configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).

use std::net::SocketAddr;
use std::time::Duration;

/// Top-level hub configuration.
///
/// Loaded once at startup via [`HubConfig::from_env`].
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Seconds a controller may sit idle before the sweeper evicts it.
    /// `0` disables idle eviction entirely.
    pub controller_idle_timeout_secs: u64,

    /// Seconds between idle-controller sweeps.
    pub controller_sweep_interval_secs: u64,
}

impl HubConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to sensible defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`].
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()?;

        let controller_idle_timeout_secs = parse_env("CONTROLLER_IDLE_TIMEOUT_SECS", 300);
        let controller_sweep_interval_secs = parse_env("CONTROLLER_SWEEP_INTERVAL_SECS", 60);

        Ok(Self {
            listen_addr,
            controller_idle_timeout_secs,
            controller_sweep_interval_secs,
        })
    }

    /// Idle timeout as a [`Duration`], or `None` when eviction is disabled.
    #[must_use]
    pub const fn controller_idle_timeout(&self) -> Option<Duration> {
        if self.controller_idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.controller_idle_timeout_secs))
        }
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
