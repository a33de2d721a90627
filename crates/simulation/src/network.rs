//! Simulated network with deterministic latency, packet loss, and partitions.

use hawklock_types::NodeId;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use std::time::Duration;

/// Configuration for the simulated network.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Base one-way message latency.
    pub latency: Duration,
    /// Jitter as a fraction of base latency (0.0 - 1.0).
    pub jitter_fraction: f64,
    /// Packet loss rate (0.0 - 1.0). Messages are dropped with this
    /// probability.
    pub packet_loss_rate: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            latency: Duration::from_millis(5),
            jitter_fraction: 0.1,
            packet_loss_rate: 0.0,
        }
    }
}

/// Simulated network for deterministic message delivery.
///
/// Supports configurable latency with jitter, probabilistic packet loss
/// (deterministic under a seeded RNG), and directional partitions between
/// node pairs.
#[derive(Debug)]
pub struct SimulatedNetwork {
    config: NetworkConfig,
    /// Partitioned node pairs. If (a, b) is in this set, messages from a to
    /// b are dropped. Partitions are directional; add both directions for a
    /// full split.
    partitions: HashSet<(NodeId, NodeId)>,
}

impl SimulatedNetwork {
    /// Create a new simulated network.
    pub fn new(config: NetworkConfig) -> Self {
        SimulatedNetwork {
            config,
            partitions: HashSet::new(),
        }
    }

    /// Check whether messages from `from` to `to` are currently dropped.
    pub fn is_partitioned(&self, from: NodeId, to: NodeId) -> bool {
        self.partitions.contains(&(from, to))
    }

    /// Block messages from `from` to `to`.
    pub fn partition_unidirectional(&mut self, from: NodeId, to: NodeId) {
        self.partitions.insert((from, to));
    }

    /// Block messages in both directions between two nodes.
    pub fn partition_bidirectional(&mut self, a: NodeId, b: NodeId) {
        self.partitions.insert((a, b));
        self.partitions.insert((b, a));
    }

    /// Restore messages from `from` to `to`.
    pub fn heal_unidirectional(&mut self, from: NodeId, to: NodeId) {
        self.partitions.remove(&(from, to));
    }

    /// Restore full connectivity.
    pub fn heal_all(&mut self) {
        self.partitions.clear();
    }

    /// Decide whether a message is delivered and with what latency.
    /// `None` means dropped (partition or packet loss).
    pub fn should_deliver(
        &self,
        from: NodeId,
        to: NodeId,
        rng: &mut ChaCha8Rng,
    ) -> Option<Duration> {
        if self.is_partitioned(from, to) {
            return None;
        }
        if self.config.packet_loss_rate > 0.0 && rng.gen::<f64>() < self.config.packet_loss_rate {
            return None;
        }
        Some(self.sample_latency(rng))
    }

    /// Sample a delivery latency with jitter.
    pub fn sample_latency(&self, rng: &mut ChaCha8Rng) -> Duration {
        let base = self.config.latency.as_secs_f64();
        let jitter_range = base * self.config.jitter_fraction;
        let jitter = if jitter_range > 0.0 {
            rng.gen_range(-jitter_range..jitter_range)
        } else {
            0.0
        };
        Duration::from_secs_f64((base + jitter).max(0.0001))
    }

    /// Network configuration.
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn same_seed_same_latency() {
        let net = SimulatedNetwork::new(NetworkConfig::default());
        let mut rng1 = ChaCha8Rng::seed_from_u64(42);
        let mut rng2 = ChaCha8Rng::seed_from_u64(42);
        assert_eq!(net.sample_latency(&mut rng1), net.sample_latency(&mut rng2));
    }

    #[test]
    fn partitions_are_directional() {
        let mut net = SimulatedNetwork::new(NetworkConfig::default());
        net.partition_unidirectional(NodeId(1), NodeId(2));
        assert!(net.is_partitioned(NodeId(1), NodeId(2)));
        assert!(!net.is_partitioned(NodeId(2), NodeId(1)));

        net.heal_unidirectional(NodeId(1), NodeId(2));
        assert!(!net.is_partitioned(NodeId(1), NodeId(2)));
    }

    #[test]
    fn full_loss_drops_everything() {
        let net = SimulatedNetwork::new(NetworkConfig {
            packet_loss_rate: 1.0,
            ..NetworkConfig::default()
        });
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..10 {
            assert!(net.should_deliver(NodeId(1), NodeId(2), &mut rng).is_none());
        }
    }

    #[test]
    fn partition_blocks_delivery() {
        let mut net = SimulatedNetwork::new(NetworkConfig::default());
        net.partition_bidirectional(NodeId(1), NodeId(2));
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        assert!(net.should_deliver(NodeId(1), NodeId(2), &mut rng).is_none());
        assert!(net.should_deliver(NodeId(2), NodeId(1), &mut rng).is_none());
        assert!(net.should_deliver(NodeId(1), NodeId(3), &mut rng).is_some());
    }
}
