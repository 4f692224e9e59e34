//! Hostname routing
//!
//! Resolution of an inbound hostname to a script identity is a pure function
//! of the hostname and static configuration. There is no per-tenant routing
//! table: adding or redeploying a tenant never changes anything here.
//!
//! Order matters. The reserved-hostname check runs before any parsing, since
//! reserved names (the apex, `www`, `api`, ...) may look like tenant hosts.

use std::collections::HashSet;

use crate::domain::environment::Environment;
use crate::domain::identity::{NamespaceConfig, ScriptIdentity};
use crate::domain::tenant::is_dns_label;

/// Closed set of hostnames that must never resolve to a tenant script
#[derive(Debug, Clone, Default)]
pub struct ReservedHostnames {
    hosts: HashSet<String>,
}

impl ReservedHostnames {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .filter_map(|h| normalize_host(h.as_ref()))
                .collect(),
        }
    }

    /// Parses an operator-managed list
    ///
    /// Entries are separated by newlines or commas; `#` starts a comment.
    pub fn parse_list(text: &str) -> Self {
        Self::new(
            text.lines()
                .map(|line| line.split('#').next().unwrap_or_default())
                .flat_map(|line| line.split(','))
                .map(str::trim)
                .filter(|entry| !entry.is_empty()),
        )
    }

    pub fn extend(&mut self, other: ReservedHostnames) {
        self.hosts.extend(other.hosts);
    }

    pub fn contains(&self, host: &str) -> bool {
        normalize_host(host).is_some_and(|h| self.hosts.contains(&h))
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Lowercases a Host header value and strips the port and trailing dot
pub fn normalize_host(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let without_port = if raw.starts_with('[') {
        // IPv6 literal, keep the brackets
        raw.split_once(']').map(|(addr, _)| format!("{}]", addr))?
    } else {
        raw.split(':').next().unwrap_or_default().to_string()
    };

    let host = without_port.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() { None } else { Some(host) }
}

/// Outcome of resolving a hostname
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Reserved system hostname; not handled by the dispatcher
    Reserved,
    /// Not a tenant hostname (wrong domain, nested labels, malformed)
    Foreign,
    /// A tenant slot; it may or may not have a deployed script
    Tenant {
        environment: Environment,
        tenant_key: String,
        identity: ScriptIdentity,
    },
}

/// Resolves hostnames under the apps domain to script identities
#[derive(Debug, Clone)]
pub struct HostResolver {
    apps_domain: String,
    namespaces: NamespaceConfig,
    reserved: ReservedHostnames,
}

impl HostResolver {
    pub fn new(
        apps_domain: impl AsRef<str>,
        namespaces: NamespaceConfig,
        reserved: ReservedHostnames,
    ) -> Self {
        Self {
            apps_domain: normalize_host(apps_domain.as_ref()).unwrap_or_default(),
            namespaces,
            reserved,
        }
    }

    pub fn apps_domain(&self) -> &str {
        &self.apps_domain
    }

    pub fn resolve(&self, raw_host: &str) -> Resolution {
        if self.reserved.contains(raw_host) {
            return Resolution::Reserved;
        }

        let Some(host) = normalize_host(raw_host) else {
            return Resolution::Foreign;
        };

        let Some(label) = host
            .strip_suffix(&self.apps_domain)
            .and_then(|rest| rest.strip_suffix('.'))
        else {
            return Resolution::Foreign;
        };

        if !is_dns_label(label) {
            return Resolution::Foreign;
        }

        let (tenant_key, environment) = match Environment::strip_marker(label) {
            Some((prefix, env)) if is_dns_label(prefix) => (prefix, env),
            Some(_) => return Resolution::Foreign,
            None => (label, Environment::Production),
        };

        Resolution::Tenant {
            environment,
            tenant_key: tenant_key.to_string(),
            identity: ScriptIdentity::from_key(&self.namespaces, environment, tenant_key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> HostResolver {
        HostResolver::new(
            "example.app",
            NamespaceConfig::default(),
            ReservedHostnames::parse_list("example.app\nWWW.example.app, api.example.app # system"),
        )
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("Alpha.Example.App:443"), Some("alpha.example.app".into()));
        assert_eq!(normalize_host("alpha.example.app."), Some("alpha.example.app".into()));
        assert_eq!(normalize_host("[::1]:8080"), Some("[::1]".into()));
        assert_eq!(normalize_host("  "), None);
    }

    #[test]
    fn test_reserved_is_case_insensitive_exact_match() {
        let r = resolver();
        assert_eq!(r.resolve("www.example.app"), Resolution::Reserved);
        assert_eq!(r.resolve("WWW.EXAMPLE.APP:8443"), Resolution::Reserved);
        assert_eq!(r.resolve("example.app"), Resolution::Reserved);
        // not a prefix/suffix match
        assert!(matches!(r.resolve("www2.example.app"), Resolution::Tenant { .. }));
    }

    #[test]
    fn test_reserved_dominates_tenant_pattern() {
        let reserved = ReservedHostnames::parse_list("www.example.app\nops-preview.example.app");
        let r = HostResolver::new("example.app", NamespaceConfig::default(), reserved);
        // both would parse as tenant hosts if not reserved
        assert_eq!(r.resolve("www.example.app"), Resolution::Reserved);
        assert_eq!(r.resolve("ops-preview.example.app"), Resolution::Reserved);
    }

    #[test]
    fn test_production_host() {
        match resolver().resolve("alpha.example.app") {
            Resolution::Tenant {
                environment,
                tenant_key,
                identity,
            } => {
                assert_eq!(environment, Environment::Production);
                assert_eq!(tenant_key, "alpha");
                assert_eq!(identity.namespace, "prod-ns");
                assert_eq!(identity.script_name, "alpha");
            }
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn test_preview_and_staging_hosts() {
        let r = resolver();
        match r.resolve("3f9c0a1b2c3d4e5f-preview.example.app") {
            Resolution::Tenant { environment, identity, .. } => {
                assert_eq!(environment, Environment::Preview);
                assert_eq!(identity.namespace, "preview-ns");
                assert_eq!(identity.script_name, "3f9c0a1b2c3d4e5f-preview");
            }
            other => panic!("unexpected resolution: {other:?}"),
        }
        match r.resolve("3f9c0a1b2c3d4e5f-staging.example.app") {
            Resolution::Tenant { environment, identity, .. } => {
                assert_eq!(environment, Environment::Staging);
                assert_eq!(identity.namespace, "staging-ns");
            }
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn test_foreign_hosts() {
        let r = resolver();
        assert_eq!(r.resolve("alpha.other.app"), Resolution::Foreign);
        assert_eq!(r.resolve("a.b.example.app"), Resolution::Foreign);
        assert_eq!(r.resolve("notexample.app"), Resolution::Foreign);
        assert_eq!(r.resolve("-preview.example.app"), Resolution::Foreign);
        assert_eq!(r.resolve("under_score.example.app"), Resolution::Foreign);
        assert_eq!(r.resolve(""), Resolution::Foreign);
    }
}
