//! Environment-derived configuration.
//!
//! The server reads its configuration once at startup into [`ServerConfig`].
//! The watchdog's hot parameters are the exception: [`WatchdogConfig`] is
//! re-read at the top of every scan iteration so action, TTL, interval,
//! batch limit, and project filter can be changed without a restart.

use std::env;
use std::net::SocketAddr;

/// Placeholder tokens refused at startup unless `ALLOW_INSECURE_DEV=true`.
const PLACEHOLDER_TOKENS: &[&str] = &["change-me", "dev"];

/// Interpret a flag-style environment value (`1`, `true`, `yes`, `on`).
pub fn env_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(raw) => matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("MCP_TOKEN is required and must be non-empty")]
    MissingToken,
    #[error("MCP_TOKEN must not be the placeholder '{0}' (set ALLOW_INSECURE_DEV=true to override)")]
    PlaceholderToken(String),
    #[error("invalid bind address '{0}'")]
    InvalidBindAddr(String),
}

/// Startup configuration, frozen for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub mcp_token: String,
    pub allow_query_token: bool,
    pub allow_insecure_dev: bool,
    pub database_url: Option<String>,
    pub orchestrator_enabled: bool,
    pub ingest_max_content_chars: usize,
    pub bind_addr: SocketAddr,
}

impl ServerConfig {
    /// Read configuration from the environment and validate the auth token.
    ///
    /// Placeholder tokens are always refused unless `ALLOW_INSECURE_DEV=true`,
    /// in which case a warning is logged instead.
    pub fn from_env() -> Result<Self, ConfigError> {
        let allow_insecure_dev = env_flag("ALLOW_INSECURE_DEV", false);
        let mcp_token = env::var("MCP_TOKEN").unwrap_or_default();
        if mcp_token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }
        if PLACEHOLDER_TOKENS.contains(&mcp_token.as_str()) {
            if allow_insecure_dev {
                tracing::warn!(
                    token = %mcp_token,
                    "placeholder MCP_TOKEN accepted because ALLOW_INSECURE_DEV=true"
                );
            } else {
                return Err(ConfigError::PlaceholderToken(mcp_token));
            }
        }

        let bind_raw = env::var("MCP_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let bind_addr = bind_raw
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(bind_raw))?;

        Ok(Self {
            mcp_token,
            allow_query_token: env_flag("MCP_ALLOW_QUERY_TOKEN", false),
            allow_insecure_dev,
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty()),
            orchestrator_enabled: env_flag("ORCHESTRATOR_ENABLED", true),
            ingest_max_content_chars: env_parse("INGEST_EVENT_MAX_CONTENT_CHARS", 100_000),
            bind_addr,
        })
    }
}

/// What the watchdog does to a stale task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogAction {
    Requeue,
    Fail,
}

impl WatchdogAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            WatchdogAction::Requeue => "requeue",
            WatchdogAction::Fail => "fail",
        }
    }
}

impl std::str::FromStr for WatchdogAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "requeue" => Ok(WatchdogAction::Requeue),
            "fail" => Ok(WatchdogAction::Fail),
            _ => Err(()),
        }
    }
}

/// Watchdog loop parameters, re-read every iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogConfig {
    pub enabled: bool,
    pub action: WatchdogAction,
    pub ttl_seconds: i64,
    pub interval_seconds: u64,
    pub batch_limit: i64,
    pub project_id: Option<String>,
}

impl WatchdogConfig {
    pub fn from_env() -> Self {
        let action = env::var("TASK_WATCHDOG_ACTION")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(WatchdogAction::Requeue);
        Self {
            enabled: env_flag("TASK_WATCHDOG_ENABLED", false),
            action,
            ttl_seconds: env_parse("TASK_WATCHDOG_TTL_SECONDS", 600).max(1),
            // Interval clamps to a minimum of 1s so a misconfigured value
            // cannot turn the loop into a busy spin.
            interval_seconds: env_parse("TASK_WATCHDOG_INTERVAL_SECONDS", 30).max(1),
            batch_limit: env_parse("TASK_WATCHDOG_BATCH_LIMIT", 100).max(1),
            project_id: env::var("TASK_WATCHDOG_PROJECT_ID")
                .ok()
                .filter(|v| !v.trim().is_empty()),
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            action: WatchdogAction::Requeue,
            ttl_seconds: 600,
            interval_seconds: 30,
            batch_limit: 100,
            project_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "MCP_TOKEN",
            "ALLOW_INSECURE_DEV",
            "MCP_ALLOW_QUERY_TOKEN",
            "MCP_BIND",
            "DATABASE_URL",
            "ORCHESTRATOR_ENABLED",
            "INGEST_EVENT_MAX_CONTENT_CHARS",
            "TASK_WATCHDOG_ENABLED",
            "TASK_WATCHDOG_ACTION",
            "TASK_WATCHDOG_TTL_SECONDS",
            "TASK_WATCHDOG_INTERVAL_SECONDS",
            "TASK_WATCHDOG_BATCH_LIMIT",
            "TASK_WATCHDOG_PROJECT_ID",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_missing_token_refused() {
        clear_env();
        let err = ServerConfig::from_env().unwrap_err();
        assert_eq!(err, ConfigError::MissingToken);
    }

    #[test]
    #[serial]
    fn test_placeholder_token_refused_by_default() {
        clear_env();
        env::set_var("MCP_TOKEN", "change-me");
        let err = ServerConfig::from_env().unwrap_err();
        assert_eq!(err, ConfigError::PlaceholderToken("change-me".to_string()));

        env::set_var("MCP_TOKEN", "dev");
        let err = ServerConfig::from_env().unwrap_err();
        assert_eq!(err, ConfigError::PlaceholderToken("dev".to_string()));
    }

    #[test]
    #[serial]
    fn test_placeholder_token_allowed_with_insecure_dev() {
        clear_env();
        env::set_var("MCP_TOKEN", "dev");
        env::set_var("ALLOW_INSECURE_DEV", "true");
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.mcp_token, "dev");
        assert!(config.allow_insecure_dev);
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        env::set_var("MCP_TOKEN", "secret-token");
        let config = ServerConfig::from_env().unwrap();
        assert!(!config.allow_query_token);
        assert!(config.orchestrator_enabled);
        assert_eq!(config.ingest_max_content_chars, 100_000);
        assert!(config.database_url.is_none());
    }

    #[test]
    #[serial]
    fn test_watchdog_defaults_and_clamps() {
        clear_env();
        let config = WatchdogConfig::from_env();
        assert_eq!(config, WatchdogConfig::default());

        env::set_var("TASK_WATCHDOG_ENABLED", "yes");
        env::set_var("TASK_WATCHDOG_ACTION", "fail");
        env::set_var("TASK_WATCHDOG_INTERVAL_SECONDS", "0");
        env::set_var("TASK_WATCHDOG_TTL_SECONDS", "120");
        env::set_var("TASK_WATCHDOG_BATCH_LIMIT", "7");
        env::set_var("TASK_WATCHDOG_PROJECT_ID", "p1");
        let config = WatchdogConfig::from_env();
        assert!(config.enabled);
        assert_eq!(config.action, WatchdogAction::Fail);
        assert_eq!(config.interval_seconds, 1, "interval clamps to minimum 1s");
        assert_eq!(config.ttl_seconds, 120);
        assert_eq!(config.batch_limit, 7);
        assert_eq!(config.project_id.as_deref(), Some("p1"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_unknown_watchdog_action_falls_back_to_requeue() {
        clear_env();
        env::set_var("TASK_WATCHDOG_ACTION", "explode");
        assert_eq!(WatchdogConfig::from_env().action, WatchdogAction::Requeue);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_flag_parsing() {
        for raw in ["1", "true", "YES", " on "] {
            env::set_var("MNEMO_TEST_FLAG", raw);
            assert!(env_flag("MNEMO_TEST_FLAG", false), "{raw:?} is truthy");
        }
        env::set_var("MNEMO_TEST_FLAG", "0");
        assert!(!env_flag("MNEMO_TEST_FLAG", true), "explicit value beats default");
        env::remove_var("MNEMO_TEST_FLAG");
        assert!(env_flag("MNEMO_TEST_FLAG", true), "default applies when unset");
    }
}
