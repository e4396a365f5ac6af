//! # Node Configuration
//!
//! A node is configured from an optional TOML file, then from `SHARDGATE_*`
//! environment variables, then from command line flags.
//!
//! ```toml
//! [node]
//! host = "0.0.0.0"
//! port = 8080
//! advertised_host = "10.0.0.1"
//!
//! [cluster]
//! members = ["10.0.0.1:8080", "10.0.0.2:8080"]
//! partitions = 12
//!
//! [forward]
//! timeout_secs = 60
//!
//! [response]
//! status = "http"        # or "always_ok"
//! remote = "collapse"    # or "distinct"
//!
//! [server]
//! api_key = "cluster-secret"
//! rate_limit = 100
//!
//! [[resources]]
//! name = "accounts"
//! store = "accountStore"
//! singular = "account"
//! key = "integer"
//! ```

use crate::api::{ErrorPolicy, ServerSettings};
use crate::router::{ResourceRegistry, ResourceSpec, default_resources};
use serde::{Deserialize, Serialize};
use shardgate_core::primitives::{DEFAULT_PARTITIONS, FORWARD_TIMEOUT_SECS};
use shardgate_core::{NodeAddress, ShardgateError};
use std::path::Path;
use std::time::Duration;

/// Largest config file accepted.
const MAX_CONFIG_SIZE: u64 = 1024 * 1024;

// =============================================================================
// SECTIONS
// =============================================================================

/// `[node]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Interface the HTTP server binds.
    pub host: String,
    pub port: u16,
    /// Host peers use to reach this node; defaults to `host`.
    pub advertised_host: Option<String>,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            advertised_host: None,
        }
    }
}

/// `[cluster]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    /// Every node as `host:port`, this one included. Empty means a single-node cluster.
    pub members: Vec<String>,
    pub partitions: u32,
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            members: Vec::new(),
            partitions: DEFAULT_PARTITIONS,
        }
    }
}

/// `[forward]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardSection {
    pub timeout_secs: u64,
}

impl Default for ForwardSection {
    fn default() -> Self {
        Self {
            timeout_secs: FORWARD_TIMEOUT_SECS,
        }
    }
}

/// Complete node configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node: NodeSection,
    pub cluster: ClusterSection,
    pub forward: ForwardSection,
    pub response: ErrorPolicy,
    pub server: ServerSettings,
    pub resources: Vec<ResourceSpec>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node: NodeSection::default(),
            cluster: ClusterSection::default(),
            forward: ForwardSection::default(),
            response: ErrorPolicy::default(),
            server: ServerSettings::default(),
            resources: default_resources(),
        }
    }
}

// =============================================================================
// LOADING
// =============================================================================

impl NodeConfig {
    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, ShardgateError> {
        toml::from_str(text).map_err(|e| ShardgateError::Config(format!("Invalid TOML: {}", e)))
    }

    /// Read the file at `path` (if any), then apply the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ShardgateError> {
        let mut config = match path {
            Some(path) => {
                let metadata = std::fs::metadata(path).map_err(|e| {
                    ShardgateError::Io(format!("Cannot read config {}: {}", path.display(), e))
                })?;
                if metadata.len() > MAX_CONFIG_SIZE {
                    return Err(ShardgateError::Config(format!(
                        "Config file too large: {} bytes (max {})",
                        metadata.len(),
                        MAX_CONFIG_SIZE
                    )));
                }
                let text = std::fs::read_to_string(path).map_err(|e| {
                    ShardgateError::Io(format!("Cannot read config {}: {}", path.display(), e))
                })?;
                tracing::debug!(path = %path.display(), "Loaded config file");
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Override fields from `SHARDGATE_*` variables looked up through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ShardgateError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(host) = var("SHARDGATE_HOST") {
            self.node.host = host;
        }
        if let Some(port) = var("SHARDGATE_PORT") {
            self.node.port = parse_env("SHARDGATE_PORT", &port)?;
        }
        if let Some(host) = var("SHARDGATE_ADVERTISED_HOST") {
            self.node.advertised_host = Some(host);
        }
        if let Some(key) = var("SHARDGATE_API_KEY") {
            self.server.api_key = Some(key);
        }
        if let Some(rps) = var("SHARDGATE_RATE_LIMIT") {
            self.server.rate_limit = parse_env("SHARDGATE_RATE_LIMIT", &rps)?;
        }
        if let Some(origins) = var("SHARDGATE_CORS_ORIGINS") {
            self.server.cors_origins = Some(origins);
        }
        if let Some(secs) = var("SHARDGATE_FORWARD_TIMEOUT_SECS") {
            self.forward.timeout_secs = parse_env("SHARDGATE_FORWARD_TIMEOUT_SECS", &secs)?;
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ShardgateError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ShardgateError::Config(format!("{}='{}': {}", name, raw, e)))
}

// =============================================================================
// DERIVED VALUES
// =============================================================================

impl NodeConfig {
    /// Address peers use to reach this node.
    #[must_use]
    pub fn self_address(&self) -> NodeAddress {
        let host = self
            .node
            .advertised_host
            .clone()
            .unwrap_or_else(|| self.node.host.clone());
        NodeAddress::new(host, self.node.port)
    }

    /// Cluster members, or just this node when none are listed.
    pub fn members(&self) -> Result<Vec<NodeAddress>, ShardgateError> {
        if self.cluster.members.is_empty() {
            return Ok(vec![self.self_address()]);
        }
        self.cluster.members.iter().map(|m| m.parse()).collect()
    }

    /// `host:port` the server binds.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.node.host, self.node.port)
    }

    #[must_use]
    pub fn forward_timeout(&self) -> Duration {
        Duration::from_secs(self.forward.timeout_secs)
    }

    pub fn registry(&self) -> Result<ResourceRegistry, ShardgateError> {
        ResourceRegistry::new(self.resources.clone())
    }

    /// Check the configuration describes a node that can join its cluster.
    pub fn validate(&self) -> Result<(), ShardgateError> {
        if self.cluster.partitions == 0 {
            return Err(ShardgateError::Config(
                "cluster.partitions must be greater than 0".to_string(),
            ));
        }
        if self.forward.timeout_secs == 0 {
            return Err(ShardgateError::Config(
                "forward.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.resources.is_empty() {
            return Err(ShardgateError::Config("no resources configured".to_string()));
        }
        self.registry()?;

        let me = self.self_address();
        let members = self.members()?;
        if !members.contains(&me) {
            return Err(ShardgateError::Config(format!(
                "this node ({}) is not listed in cluster.members",
                me
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{RemoteMode, StatusMode};
    use shardgate_core::KeyKind;
    use std::collections::HashMap;

    const TWO_NODES: &str = r#"
[node]
host = "0.0.0.0"
port = 9001
advertised_host = "10.0.0.1"

[cluster]
members = ["10.0.0.1:9001", "10.0.0.2:9001"]
partitions = 6

[response]
remote = "distinct"

[[resources]]
name = "users"
store = "userStore"
singular = "user"
key = "string"
"#;

    #[test]
    fn defaults_describe_single_node() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.members().expect("members"), vec![config.self_address()]);
        assert_eq!(config.forward_timeout(), Duration::from_secs(60));
        assert_eq!(config.cluster.partitions, DEFAULT_PARTITIONS);
        assert_eq!(config.registry().expect("registry").stores().len(), 2);
    }

    #[test]
    fn parses_full_file() {
        let config = NodeConfig::from_toml(TWO_NODES).expect("parse");
        assert_eq!(config.self_address(), NodeAddress::new("10.0.0.1", 9001));
        assert_eq!(config.bind_address(), "0.0.0.0:9001");
        assert_eq!(config.members().expect("members").len(), 2);
        assert_eq!(config.response.remote, RemoteMode::Distinct);
        assert_eq!(config.response.status, StatusMode::Http);
        assert_eq!(config.resources.len(), 1);
        assert_eq!(config.resources[0].key, KeyKind::String);
        assert_eq!(config.resources[0].key_field, "id");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_file() {
        let mut config = NodeConfig::from_toml(TWO_NODES).expect("parse");
        let env: HashMap<&str, &str> = [
            ("SHARDGATE_PORT", "9100"),
            ("SHARDGATE_API_KEY", "s3cret"),
            ("SHARDGATE_FORWARD_TIMEOUT_SECS", "5"),
            ("SHARDGATE_RATE_LIMIT", ""),
        ]
        .into_iter()
        .collect();
        config
            .apply_env(|name| env.get(name).map(|v| v.to_string()))
            .expect("env");

        assert_eq!(config.node.port, 9100);
        assert_eq!(config.server.api_key.as_deref(), Some("s3cret"));
        assert_eq!(config.forward_timeout(), Duration::from_secs(5));
        assert_eq!(config.server.rate_limit, 100, "empty values are ignored");
    }

    #[test]
    fn bad_env_value_is_config_error() {
        let mut config = NodeConfig::default();
        let result = config.apply_env(|name| (name == "SHARDGATE_PORT").then(|| "http".to_string()));
        assert!(matches!(result, Err(ShardgateError::Config(_))));
    }

    #[test]
    fn node_must_be_a_member() {
        let mut config = NodeConfig::from_toml(TWO_NODES).expect("parse");
        config.node.advertised_host = Some("10.0.0.9".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_partitions_rejected() {
        let mut config = NodeConfig::default();
        config.cluster.partitions = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_member_rejected() {
        let mut config = NodeConfig::default();
        config.cluster.members = vec!["no-port".to_string()];
        assert!(config.members().is_err());
    }
}
