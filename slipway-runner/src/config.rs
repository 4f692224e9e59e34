//! Runner configuration
//!
//! Defines all configurable parameters for the runner: orchestrator
//! connection, polling, the external APIs it drives, and the knobs of the
//! synchronizer, build monitor and publisher.

use std::path::PathBuf;
use std::time::Duration;

use slipway_core::domain::identity::NamespaceConfig;

use crate::monitor::MonitorConfig;
use crate::publish::{DEFAULT_COMPATIBILITY_DATE, DEFAULT_SCRIPT_SIZE_LIMIT, PublisherConfig};
use crate::sync::DEFAULT_SYNC_ATTEMPTS;

/// Runner configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Unique identifier for this runner instance
    pub runner_id: String,

    /// Orchestrator base URL (e.g., "http://localhost:8080")
    pub orchestrator_url: String,

    /// How often to poll the orchestrator for pending deployments; also the
    /// cadence of the per-attempt cancellation check
    pub poll_interval: Duration,

    /// How often to send buffered logs to the orchestrator
    pub log_send_interval: Duration,

    pub max_parallel_deployments: usize,

    /// Parent directory of the per-attempt workspaces
    pub workspace_base: PathBuf,

    pub source_api_url: String,
    pub source_api_token: String,
    pub build_api_url: String,
    pub files_api_url: String,
    pub platform_api_url: String,
    pub platform_account_id: String,
    pub platform_api_token: String,

    pub sync_max_attempts: u32,
    pub monitor: MonitorConfig,
    pub publisher: PublisherConfig,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(runner_id: String, orchestrator_url: String) -> Self {
        Self {
            runner_id,
            orchestrator_url,
            poll_interval: Duration::from_secs(5),
            log_send_interval: Duration::from_secs(10),
            max_parallel_deployments: 4,
            workspace_base: std::env::temp_dir().join("slipway"),
            source_api_url: "https://api.github.com".to_string(),
            source_api_token: String::new(),
            build_api_url: "https://api.github.com".to_string(),
            files_api_url: "http://localhost:8090".to_string(),
            platform_api_url: "https://api.cloudflare.com/client/v4".to_string(),
            platform_account_id: String::new(),
            platform_api_token: String::new(),
            sync_max_attempts: DEFAULT_SYNC_ATTEMPTS,
            monitor: MonitorConfig::default(),
            publisher: PublisherConfig::default(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// A `.env` file in the working directory is loaded first, if present.
    ///
    /// Required: RUNNER_ID, ORCHESTRATOR_URL. Everything else falls back to
    /// the defaults of [`Config::new`]; durations are given in seconds.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let runner_id = std::env::var("RUNNER_ID")
            .map_err(|_| anyhow::anyhow!("RUNNER_ID environment variable not set"))?;

        let orchestrator_url = std::env::var("ORCHESTRATOR_URL")
            .map_err(|_| anyhow::anyhow!("ORCHESTRATOR_URL environment variable not set"))?;

        let defaults = Self::new(runner_id, orchestrator_url);
        let monitor_defaults = MonitorConfig::default();

        let monitor = MonitorConfig {
            timeout: env_secs("BUILD_TIMEOUT", monitor_defaults.timeout),
            poll_interval: env_secs("BUILD_POLL_INTERVAL", monitor_defaults.poll_interval),
            max_interval: env_secs("BUILD_MAX_INTERVAL", monitor_defaults.max_interval),
            max_attempts: env_parse("BUILD_MAX_ATTEMPTS", monitor_defaults.max_attempts),
            grace_period: env_secs("BUILD_GRACE_PERIOD", monitor_defaults.grace_period),
            recency_window: env_secs("BUILD_RECENCY_WINDOW", monitor_defaults.recency_window),
        };

        let apps_domain = env_or("APPS_DOMAIN", &defaults.publisher.apps_domain);
        let publisher = PublisherConfig {
            namespaces: NamespaceConfig::from_env(),
            assets_public_url: env_or("ASSETS_PUBLIC_URL", &format!("https://assets.{}", apps_domain)),
            apps_domain,
            script_size_limit: env_parse("SCRIPT_SIZE_LIMIT", DEFAULT_SCRIPT_SIZE_LIMIT),
            asset_offload_enabled: env_parse("ASSET_OFFLOAD_ENABLED", true),
            compatibility_date: env_or("COMPATIBILITY_DATE", DEFAULT_COMPATIBILITY_DATE),
        };

        Ok(Self {
            poll_interval: env_secs("POLL_INTERVAL", defaults.poll_interval),
            log_send_interval: env_secs("LOG_SEND_INTERVAL", defaults.log_send_interval),
            max_parallel_deployments: env_parse(
                "MAX_PARALLEL_DEPLOYMENTS",
                defaults.max_parallel_deployments,
            ),
            workspace_base: std::env::var("WORKSPACE_BASE")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_base.clone()),
            source_api_url: env_or("SOURCE_API_URL", &defaults.source_api_url),
            source_api_token: env_or("SOURCE_API_TOKEN", ""),
            build_api_url: env_or("BUILD_API_URL", &defaults.build_api_url),
            files_api_url: env_or("FILES_API_URL", &defaults.files_api_url),
            platform_api_url: env_or("PLATFORM_API_URL", &defaults.platform_api_url),
            platform_account_id: env_or("PLATFORM_ACCOUNT_ID", ""),
            platform_api_token: env_or("PLATFORM_API_TOKEN", ""),
            sync_max_attempts: env_parse("SYNC_MAX_ATTEMPTS", defaults.sync_max_attempts),
            monitor,
            publisher,
            ..defaults
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.runner_id.is_empty() {
            anyhow::bail!("runner_id cannot be empty");
        }

        for (name, url) in [
            ("orchestrator_url", &self.orchestrator_url),
            ("source_api_url", &self.source_api_url),
            ("build_api_url", &self.build_api_url),
            ("files_api_url", &self.files_api_url),
            ("platform_api_url", &self.platform_api_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} must start with http:// or https://", name);
            }
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.log_send_interval.is_zero() {
            anyhow::bail!("log_send_interval must be greater than 0");
        }

        if self.max_parallel_deployments == 0 {
            anyhow::bail!("max_parallel_deployments must be greater than 0");
        }

        if self.sync_max_attempts == 0 {
            anyhow::bail!("sync_max_attempts must be greater than 0");
        }

        self.monitor.validate()?;
        self.publisher.validate()?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            "http://localhost:8080".to_string(),
        )
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.sync_max_attempts, 3);
        assert_eq!(config.monitor.grace_period, Duration::from_secs(15));
        assert_eq!(config.monitor.max_attempts, 30);
        assert!(config.publisher.asset_offload_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.runner_id = String::new();
        assert!(config.validate().is_err());
        config.runner_id = "runner-1".to_string();

        config.orchestrator_url = "not-a-url".to_string();
        assert!(config.validate().is_err());
        config.orchestrator_url = "http://localhost:8080".to_string();

        config.max_parallel_deployments = 0;
        assert!(config.validate().is_err());
        config.max_parallel_deployments = 1;

        config.monitor.max_interval = Duration::from_secs(1);
        assert!(config.validate().is_err());
        config.monitor.max_interval = Duration::from_secs(60);

        config.publisher.namespaces.staging = config.publisher.namespaces.production.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_helpers_fall_back_on_garbage() {
        assert_eq!(env_parse("SLIPWAY_TEST_UNSET_NUMBER", 7u32), 7);
        assert_eq!(
            env_secs("SLIPWAY_TEST_UNSET_SECS", Duration::from_secs(3)),
            Duration::from_secs(3)
        );
        assert_eq!(env_or("SLIPWAY_TEST_UNSET_STRING", "x"), "x");
    }
}
