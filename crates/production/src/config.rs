//! Production configuration: the cluster-wide system settings plus the
//! transport layout.

use hawklock_types::{NodeId, SystemConfig};
use serde::{Deserialize, Serialize};

/// Transport layout. Node `n` listens on `base_port + n` at `host`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Host every node binds and dials on.
    pub host: String,
    /// Base TCP port; node ids are added to it.
    pub base_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            host: "127.0.0.1".to_string(),
            base_port: 8000,
        }
    }
}

impl NetworkConfig {
    /// The listen/dial address of a node.
    pub fn addr_of(&self, node: NodeId) -> String {
        format!("{}:{}", self.host, self.base_port + node.0 as u16)
    }
}

/// Top-level configuration file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductionConfig {
    /// Cluster-wide system configuration, identical on every node.
    pub system: SystemConfig,
    /// Transport layout.
    pub network: NetworkConfig,
}

impl ProductionConfig {
    /// Parse a TOML configuration file.
    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}
