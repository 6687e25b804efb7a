//! Client configuration loaded from environment variables.
//!
//! The host application normally builds a `Config` once at startup and hands
//! it to [`crate::services::SweatpactClient`]. Tests use `Config::default()`.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Record-zone name prefix for pair groups.
pub const ZONE_PREFIX: &str = "SweatpactGroup_";

/// Client configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// GCP project ID (Firestore-backed store only)
    pub gcp_project_id: String,
    /// Stable account credential for this device
    pub account_id: String,
    /// IANA timezone identifier for this device
    pub timezone: String,
    /// Invite-code lifetime before expiry
    pub invite_code_ttl_hours: i64,
    /// Interval between partner-join polls
    pub partner_poll_interval: Duration,
    /// Where durable local state (pending invite code, change tokens) lives;
    /// `None` keeps it in memory only.
    pub local_state_path: Option<PathBuf>,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            gcp_project_id: "test-project".to_string(),
            account_id: "test-account".to_string(),
            timezone: "UTC".to_string(),
            invite_code_ttl_hours: 48,
            partner_poll_interval: Duration::from_secs(5),
            local_state_path: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            account_id: env::var("SWEATPACT_ACCOUNT_ID")
                .map_err(|_| ConfigError::Missing("SWEATPACT_ACCOUNT_ID"))?,
            timezone: env::var("SWEATPACT_TIMEZONE").unwrap_or_else(|_| "UTC".to_string()),
            invite_code_ttl_hours: env::var("SWEATPACT_INVITE_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(48),
            partner_poll_interval: Duration::from_secs(
                env::var("SWEATPACT_PARTNER_POLL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5),
            ),
            local_state_path: env::var("SWEATPACT_LOCAL_STATE_PATH").ok().map(PathBuf::from),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        env::set_var("SWEATPACT_ACCOUNT_ID", "acct-123");
        env::set_var("SWEATPACT_PARTNER_POLL_SECS", "2");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.account_id, "acct-123");
        assert_eq!(config.partner_poll_interval, Duration::from_secs(2));
        assert_eq!(config.invite_code_ttl_hours, 48);
    }
}
