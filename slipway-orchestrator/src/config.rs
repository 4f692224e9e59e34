//! Orchestrator configuration

use std::time::Duration;

use anyhow::{Result, bail};

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string; without one, state is kept in memory
    pub database_url: Option<String>,
    pub bind_addr: String,
    /// Silence after which a claimed attempt is failed
    pub lease_timeout: Duration,
    /// How often claimed attempts are checked for expired leases
    pub lease_sweep_interval: Duration,
}

impl Config {
    pub fn new() -> Self {
        Self {
            database_url: None,
            bind_addr: "0.0.0.0:8080".to_string(),
            lease_timeout: Duration::from_secs(10 * 60),
            lease_sweep_interval: Duration::from_secs(30),
        }
    }

    /// Reads configuration from the environment (and `.env`, if present)
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let defaults = Self::new();

        Self {
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            bind_addr: std::env::var("ORCHESTRATOR_BIND_ADDR").unwrap_or(defaults.bind_addr),
            lease_timeout: std::env::var("LEASE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.lease_timeout),
            lease_sweep_interval: std::env::var("LEASE_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.lease_sweep_interval),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bind_addr.trim().is_empty() {
            bail!("ORCHESTRATOR_BIND_ADDR cannot be empty");
        }

        if let Some(url) = &self.database_url
            && !url.starts_with("postgres://")
            && !url.starts_with("postgresql://")
        {
            bail!("DATABASE_URL must be a postgres:// URL");
        }

        if self.lease_timeout.is_zero() || self.lease_sweep_interval.is_zero() {
            bail!("LEASE_TIMEOUT_SECS and LEASE_SWEEP_INTERVAL_SECS must be greater than 0");
        }

        if self.lease_sweep_interval >= self.lease_timeout {
            bail!("LEASE_SWEEP_INTERVAL_SECS must be shorter than LEASE_TIMEOUT_SECS");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::new();
        assert!(config.database_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_non_postgres_url() {
        let config = Config {
            database_url: Some("mysql://localhost/slipway".to_string()),
            ..Config::new()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lease_sweep_must_be_shorter_than_timeout() {
        let config = Config {
            lease_timeout: Duration::from_secs(30),
            lease_sweep_interval: Duration::from_secs(60),
            ..Config::new()
        };
        assert!(config.validate().is_err());

        let config = Config {
            lease_timeout: Duration::ZERO,
            ..Config::new()
        };
        assert!(config.validate().is_err());
    }
}
