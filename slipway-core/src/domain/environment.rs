//! Environment classes
//!
//! Every tenant has exactly three environments. Each one maps to its own
//! dispatch namespace and its own linear branch at the source host.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Deployment environment of a tenant application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Preview,
    Staging,
    Production,
}

impl Environment {
    pub const ALL: [Environment; 3] = [
        Environment::Preview,
        Environment::Staging,
        Environment::Production,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Preview => "preview",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    /// Hostname/script-name suffix for non-production environments
    ///
    /// Production has no marker: its script name is the tenant's public subdomain.
    pub fn marker(&self) -> Option<&'static str> {
        match self {
            Environment::Preview => Some("-preview"),
            Environment::Staging => Some("-staging"),
            Environment::Production => None,
        }
    }

    /// Source branch holding this environment's linear history
    pub fn branch(&self) -> &'static str {
        match self {
            Environment::Preview => "preview",
            Environment::Staging => "staging",
            Environment::Production => "main",
        }
    }

    /// Splits a DNS label into (prefix, environment) if it carries a marker
    pub fn strip_marker(label: &str) -> Option<(&str, Environment)> {
        [Environment::Preview, Environment::Staging]
            .into_iter()
            .find_map(|env| {
                let marker = env.marker()?;
                label.strip_suffix(marker).map(|prefix| (prefix, env))
            })
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "preview" => Ok(Environment::Preview),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_marker() {
        assert_eq!(
            Environment::strip_marker("a1b2c3-preview"),
            Some(("a1b2c3", Environment::Preview))
        );
        assert_eq!(
            Environment::strip_marker("a1b2c3-staging"),
            Some(("a1b2c3", Environment::Staging))
        );
        assert_eq!(Environment::strip_marker("alpha"), None);
    }

    #[test]
    fn test_parse_round_trips_display() {
        for env in Environment::ALL {
            assert_eq!(env.to_string().parse::<Environment>(), Ok(env));
        }
        assert_eq!("PROD".parse::<Environment>(), Ok(Environment::Production));
        assert!("qa".parse::<Environment>().is_err());
    }
}
