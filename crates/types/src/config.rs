//! System configuration, fixed at start.

use crate::{NodeId, ResourcePartition};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which deadlock-detection engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionMode {
    /// No detection; deadlocked transactions stay blocked.
    None,
    /// Coordinator periodically aggregates WFGs from all nodes.
    #[default]
    Centralized,
    /// Hierarchical/adaptive zone-based detection.
    Hawk,
    /// Probes forwarded along wait chains.
    PathPushing,
}

impl std::str::FromStr for DetectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(DetectionMode::None),
            "centralized" => Ok(DetectionMode::Centralized),
            "hawk" => Ok(DetectionMode::Hawk),
            "path-pushing" => Ok(DetectionMode::PathPushing),
            other => Err(format!("unknown detection mode: {other}")),
        }
    }
}

/// Cluster-wide configuration, identical on every node and fixed at start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Number of nodes in the cluster.
    pub num_nodes: u32,
    /// Resources owned by each node.
    pub resources_per_node: u64,
    /// The statically designated coordinator.
    pub coordinator: NodeId,
    /// Active detection engine.
    pub mode: DetectionMode,
    /// Period of the centralized and path-pushing detection timers.
    #[serde(with = "duration_millis")]
    pub detection_interval: Duration,
    /// Period of the HAWK coordinator's PAG sampling timer.
    #[serde(with = "duration_millis")]
    pub pag_sample_interval: Duration,
    /// Period of the zone-leader detection timer.
    #[serde(with = "duration_millis")]
    pub zone_detection_interval: Duration,
    /// Minimum window between adaptive re-cut evaluations.
    #[serde(with = "duration_millis")]
    pub check_interval: Duration,
    /// Minimum SCC size that becomes a multi-node zone.
    pub scc_cut_threshold: usize,
    /// Re-cut fires when the central/zone deadlock ratio exceeds this.
    pub r_threshold: f64,
    /// Workload driver concurrency cap per node.
    pub max_concurrent_transactions: usize,
}

impl Default for SystemConfig {
    fn default() -> Self {
        SystemConfig {
            num_nodes: 4,
            resources_per_node: 1000,
            coordinator: NodeId(1),
            mode: DetectionMode::Centralized,
            detection_interval: Duration::from_millis(50),
            pag_sample_interval: Duration::from_millis(5000),
            zone_detection_interval: Duration::from_millis(5000),
            check_interval: Duration::from_millis(5000),
            scc_cut_threshold: 2,
            r_threshold: 1.0,
            max_concurrent_transactions: 8,
        }
    }
}

impl SystemConfig {
    /// The resource ownership map implied by this configuration.
    pub fn partition(&self) -> ResourcePartition {
        ResourcePartition::new(self.num_nodes, self.resources_per_node)
    }

    /// Whether `node` is the coordinator.
    pub fn is_coordinator(&self, node: NodeId) -> bool {
        node == self.coordinator
    }

    /// All node ids in the cluster, in order.
    pub fn all_nodes(&self) -> impl Iterator<Item = NodeId> {
        (1..=self.num_nodes).map(NodeId)
    }
}

/// Serialize `Duration` fields as integer milliseconds so TOML configs read
/// naturally (`detection_interval = 50`).
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_self_consistent() {
        let cfg = SystemConfig::default();
        assert!(cfg.is_coordinator(NodeId(1)));
        assert_eq!(cfg.all_nodes().count(), cfg.num_nodes as usize);
        assert_eq!(cfg.partition().total_resources(), 4000);
    }

    #[test]
    fn detection_mode_parses_from_kebab_case() {
        assert_eq!(
            "path-pushing".parse::<DetectionMode>().unwrap(),
            DetectionMode::PathPushing
        );
        assert!("bogus".parse::<DetectionMode>().is_err());
    }
}
