//! End-to-end deadlock scenarios.
//!
//! Each test drives a full simulated cluster through a known lock pattern
//! and verifies the detection engines resolve (or correctly ignore) it:
//!
//! 1. Two-transaction deadlock on one node, centralized detection
//! 2. Three-node cycle, centralized detection
//! 3. Three-node cycle, path-pushing probes
//! 4. HAWK zone formation from sampled PAG SCCs
//! 5. HAWK adaptive re-cut when only the central layer detects
//! 6. Deadlock-free workload produces no reports and no aborts

use hawklock_messages::Message;
use hawklock_simulation::{NetworkConfig, SimulationRunner};
use hawklock_types::{
    DetectionMode, LockStep, NodeId, ResourceId, SystemConfig, TransactionId,
};
use std::time::Duration;
use tracing_test::traced_test;

/// Fixed-latency, loss-free network so scenarios are exactly reproducible.
fn quiet_network() -> NetworkConfig {
    NetworkConfig {
        latency: Duration::from_millis(5),
        jitter_fraction: 0.0,
        packet_loss_rate: 0.0,
    }
}

fn config(num_nodes: u32, mode: DetectionMode) -> SystemConfig {
    SystemConfig {
        num_nodes,
        resources_per_node: 1000,
        mode,
        detection_interval: Duration::from_millis(50),
        ..SystemConfig::default()
    }
}

/// The classic three-node cycle: each transaction holds the resource the
/// next one wants. Returns (txn, home) pairs in submission order.
fn submit_three_node_cycle(sim: &mut SimulationRunner) -> Vec<(TransactionId, NodeId)> {
    // t_a@N1 holds r1001 (owned by N2), then wants r2001 (held by t_b).
    // t_b@N2 holds r2001 (owned by N3), then wants r1    (held by t_c).
    // t_c@N3 holds r1    (owned by N1), then wants r1001 (held by t_a).
    let t_a = sim.submit(
        NodeId(1),
        vec![
            LockStep::exclusive(ResourceId(1001)),
            LockStep::exclusive(ResourceId(2001)),
        ],
    );
    let t_b = sim.submit(
        NodeId(2),
        vec![
            LockStep::exclusive(ResourceId(2001)),
            LockStep::exclusive(ResourceId(1)),
        ],
    );
    let t_c = sim.submit(
        NodeId(3),
        vec![
            LockStep::exclusive(ResourceId(1)),
            LockStep::exclusive(ResourceId(1001)),
        ],
    );
    vec![
        (t_a, NodeId(1)),
        (t_b, NodeId(2)),
        (t_c, NodeId(3)),
    ]
}

#[traced_test]
#[test]
fn two_transaction_deadlock_on_one_node() {
    let mut sim = SimulationRunner::new(
        config(1, DetectionMode::Centralized),
        quiet_network(),
        42,
    );
    sim.initialize();

    let t1 = sim.submit(
        NodeId(1),
        vec![
            LockStep::exclusive(ResourceId(1)),
            LockStep::exclusive(ResourceId(2)),
        ],
    );
    let t2 = sim.submit(
        NodeId(1),
        vec![
            LockStep::exclusive(ResourceId(2)),
            LockStep::exclusive(ResourceId(1)),
        ],
    );

    sim.run_until(Duration::from_secs(1));

    // Frequencies tie, so the smaller id (t1) is the victim; t2 commits.
    let outcome = |txn| {
        sim.outcomes()
            .iter()
            .find(|o| o.txn == txn)
            .copied()
            .expect("transaction should finish")
    };
    assert!(!outcome(t1).committed, "t1 should be the abort victim");
    assert!(outcome(t2).committed, "t2 should proceed to commit");

    // The coordinator reported the cycle.
    assert!(!sim.stats().deadlock_reports.is_empty());
    let (reporter, cycles, _) = &sim.stats().deadlock_reports[0];
    assert_eq!(*reporter, NodeId(1));
    assert!(cycles.iter().any(|c| c.contains(&t1) && c.contains(&t2)));
}

#[traced_test]
#[test]
fn three_node_cycle_resolved_by_centralized_engine() {
    let mut sim = SimulationRunner::new(
        config(3, DetectionMode::Centralized),
        quiet_network(),
        42,
    );
    sim.initialize();

    let txns = submit_three_node_cycle(&mut sim);
    sim.run_until(Duration::from_secs(2));

    // Exactly one victim is aborted; the remaining two commit.
    let mut committed = 0;
    let mut aborted = 0;
    for (txn, _) in &txns {
        let outcome = sim
            .outcomes()
            .iter()
            .find(|o| o.txn == *txn)
            .expect("every transaction should finish");
        if outcome.committed {
            committed += 1;
        } else {
            aborted += 1;
        }
    }
    assert_eq!(aborted, 1, "exactly one victim breaks the cycle");
    assert_eq!(committed, 2);

    // The reported cycle spans all three transactions.
    assert!(!sim.stats().deadlock_reports.is_empty());
    assert!(sim
        .stats()
        .deadlock_reports
        .iter()
        .any(|(_, cycles, _)| cycles.iter().any(|c| c.len() == 3)));
}

#[traced_test]
#[test]
fn three_node_cycle_resolved_by_path_pushing() {
    let mut sim = SimulationRunner::new(
        config(3, DetectionMode::PathPushing),
        quiet_network(),
        42,
    );
    sim.initialize();

    let txns = submit_three_node_cycle(&mut sim);
    sim.run_until(Duration::from_secs(2));

    // All three nodes seed probes and the cycle is discovered repeatedly,
    // but idempotent aborts leave exactly one transaction dead.
    let mut committed = 0;
    let mut aborted = 0;
    for (txn, _) in &txns {
        let outcome = sim
            .outcomes()
            .iter()
            .find(|o| o.txn == *txn)
            .expect("every transaction should finish");
        if outcome.committed {
            committed += 1;
        } else {
            aborted += 1;
        }
    }
    assert_eq!(aborted, 1);
    assert_eq!(committed, 2);
    assert!(sim.node(NodeId(1)).path_pushing().probes_seeded() > 0);
}

/// Keep resubmitting the three-node cycle so cross-node wait pressure is
/// continuously visible to PAG samples and zone rounds.
fn sustain_cycle_pressure(sim: &mut SimulationRunner, until: Duration) -> bool {
    let scripts = [
        (NodeId(1), ResourceId(1001), ResourceId(2001)),
        (NodeId(2), ResourceId(2001), ResourceId(1)),
        (NodeId(3), ResourceId(1), ResourceId(1001)),
    ];
    let mut live: Vec<Option<TransactionId>> = vec![None; 3];
    let mut multi_node_zone_seen = false;

    while sim.now() < until {
        for (i, (home, first, second)) in scripts.iter().enumerate() {
            let finished = live[i]
                .map(|t| !sim.node(*home).registry().is_active(t))
                .unwrap_or(true);
            if finished {
                live[i] = Some(sim.submit(
                    *home,
                    vec![LockStep::exclusive(*first), LockStep::exclusive(*second)],
                ));
            }
        }
        sim.run_for(Duration::from_millis(50));
        if sim.node(NodeId(2)).zones().leader() == NodeId(1) {
            multi_node_zone_seen = true;
        }
    }
    multi_node_zone_seen
}

#[traced_test]
#[test]
fn hawk_forms_zone_from_pag_scc() {
    let mut sim = SimulationRunner::new(
        SystemConfig {
            num_nodes: 3,
            resources_per_node: 1000,
            mode: DetectionMode::Hawk,
            pag_sample_interval: Duration::from_millis(100),
            zone_detection_interval: Duration::from_millis(150),
            check_interval: Duration::from_millis(200),
            ..SystemConfig::default()
        },
        quiet_network(),
        42,
    );
    sim.initialize();

    let multi_node_zone_seen = sustain_cycle_pressure(&mut sim, Duration::from_secs(5));

    let hawk = sim.node(NodeId(1)).hawk();
    assert!(
        hawk.deadlocks_from_central() > 0,
        "singleton zones cannot see the cross-node cycle; escalation must"
    );
    assert!(hawk.recuts() > 0, "adaptive re-cut should have fired");
    assert!(
        multi_node_zone_seen,
        "a PAG sample taken under pressure should cut the 3-node SCC into one zone"
    );
    // Once the zone spans the cycle, its leader starts catching deadlocks.
    assert!(hawk.deadlocks_from_zones() > 0);
}

#[traced_test]
#[test]
fn hawk_recut_fires_when_only_central_layer_detects() {
    let mut sim = SimulationRunner::new(
        SystemConfig {
            num_nodes: 3,
            resources_per_node: 1000,
            mode: DetectionMode::Hawk,
            pag_sample_interval: Duration::from_millis(100),
            zone_detection_interval: Duration::from_millis(150),
            check_interval: Duration::from_millis(300),
            ..SystemConfig::default()
        },
        quiet_network(),
        7,
    );
    sim.initialize();

    // One cross-node cycle: the initial singleton zones cannot detect it,
    // so the first detections are central (ΔZ = 0, ΔR > 0).
    submit_three_node_cycle(&mut sim);
    sim.run_until(Duration::from_secs(2));

    let hawk = sim.node(NodeId(1)).hawk();
    assert!(hawk.deadlocks_from_central() > 0);
    assert!(
        hawk.recuts() > 0,
        "ΔZ = 0 with ΔR > 0 must trigger a re-cut at the next window boundary"
    );
    // The cycle itself was resolved: exactly one abort.
    let aborted = sim.outcomes().iter().filter(|o| !o.committed).count();
    assert_eq!(aborted, 1);
}

#[traced_test]
#[test]
fn deadlock_free_workload_reports_nothing() {
    let mut sim = SimulationRunner::new(
        config(3, DetectionMode::Centralized),
        quiet_network(),
        42,
    );
    sim.initialize();

    // Each node locks only its own resources in ascending order: ordered
    // acquisition cannot produce a circular wait.
    for node in 1..=3u32 {
        let base = (node as u64 - 1) * 1000;
        for t in 0..4u64 {
            let ops = vec![
                LockStep::exclusive(ResourceId(base + 1 + t)),
                LockStep::shared(ResourceId(base + 10 + t)),
                LockStep::exclusive(ResourceId(base + 20 + t)),
            ];
            sim.submit(NodeId(node), ops);
        }
    }

    // Ten detection periods.
    sim.run_until(Duration::from_millis(500));

    assert!(sim.stats().deadlock_reports.is_empty(), "no cycles exist");
    assert!(sim.outcomes().iter().all(|o| o.committed));
    assert_eq!(sim.outcomes().len(), 12);
}

#[traced_test]
#[test]
fn client_surface_collect_print_and_abort() {
    let mut sim = SimulationRunner::new(
        config(1, DetectionMode::Centralized),
        quiet_network(),
        42,
    );
    sim.initialize();

    // Build a deadlock, let the engine find it, then interrogate.
    let t1 = sim.submit(
        NodeId(1),
        vec![
            LockStep::exclusive(ResourceId(1)),
            LockStep::exclusive(ResourceId(2)),
        ],
    );
    let t2 = sim.submit(
        NodeId(1),
        vec![
            LockStep::exclusive(ResourceId(2)),
            LockStep::exclusive(ResourceId(1)),
        ],
    );
    sim.run_until(Duration::from_millis(200));
    let _ = (t1, t2);

    sim.client_request(Message::ClientPrintDeadlockRequest);
    sim.client_request(Message::ClientCollectWfgRequest);
    sim.run_for(Duration::from_millis(100));

    let replies = &sim.stats().client_replies;
    assert!(replies.iter().any(|(_, m)| matches!(
        m,
        Message::DeadlockReportToClient { deadlock_count, .. } if *deadlock_count >= 1
    )));
    assert!(replies
        .iter()
        .any(|(_, m)| matches!(m, Message::ClientCollectWfgResponse { .. })));

    // Operator abort: wedge two fresh transactions against each other and
    // kill the larger one by command before the next detection period.
    // Step off the detection-round boundary first so the engine does not
    // race the operator for the victim.
    sim.run_for(Duration::from_millis(10));
    let t3 = sim.submit(
        NodeId(1),
        vec![
            LockStep::exclusive(ResourceId(5)),
            LockStep::exclusive(ResourceId(6)),
        ],
    );
    let t4 = sim.submit(
        NodeId(1),
        vec![
            LockStep::exclusive(ResourceId(6)),
            LockStep::exclusive(ResourceId(5)),
        ],
    );
    sim.client_request(Message::ClientResolveDeadlockRequest { txn: t4 });
    sim.run_for(Duration::from_millis(100));

    assert!(!sim.node(NodeId(1)).registry().is_active(t4));
    let t3_outcome = sim
        .outcomes()
        .iter()
        .find(|o| o.txn == t3)
        .expect("t3 should finish");
    assert!(t3_outcome.committed, "t3 proceeds once t4 is killed");
    let t4_outcome = sim
        .outcomes()
        .iter()
        .find(|o| o.txn == t4)
        .expect("t4 should finish");
    assert!(!t4_outcome.committed);
}

#[traced_test]
#[test]
fn detection_tolerates_packet_loss() {
    let mut sim = SimulationRunner::new(
        config(3, DetectionMode::Centralized),
        NetworkConfig {
            latency: Duration::from_millis(5),
            jitter_fraction: 0.1,
            packet_loss_rate: 0.2,
        },
        42,
    );
    sim.initialize();

    submit_three_node_cycle(&mut sim);
    // Plenty of detection periods: every lost round is retried by the next.
    sim.run_until(Duration::from_secs(10));

    let aborted = sim.outcomes().iter().filter(|o| !o.committed).count();
    assert!(aborted >= 1, "the cycle must eventually be broken");
    assert!(sim.stats().messages_dropped() > 0, "loss was configured");
}
