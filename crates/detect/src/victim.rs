//! Victim selection for deadlock resolution.

use hawklock_types::TransactionId;
use std::collections::HashMap;

/// Pick the abort victim from a cycle.
///
/// Candidates are ordered by participation frequency descending, then id
/// ascending; the first wins. A vertex present in many cycles is likely to
/// break the most of them when aborted, and the id tie-break keeps the
/// choice deterministic. Vertices missing from the frequency map count as
/// zero, so an empty map degrades to smallest-id selection (the
/// path-pushing case). Age, priority, and cost are deliberately not
/// consulted.
pub fn select_victim(
    cycle: &[TransactionId],
    frequency: &HashMap<TransactionId, u32>,
) -> Option<TransactionId> {
    cycle.iter().copied().min_by(|a, b| {
        let fa = frequency.get(a).copied().unwrap_or(0);
        let fb = frequency.get(b).copied().unwrap_or(0);
        fb.cmp(&fa).then(a.cmp(b))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hawklock_types::NodeId;

    fn txn(seq: u32) -> TransactionId {
        TransactionId::new(NodeId(1), seq)
    }

    #[test]
    fn highest_frequency_wins() {
        let cycle = vec![txn(1), txn(2), txn(3)];
        let freq = HashMap::from([(txn(1), 1), (txn(2), 3), (txn(3), 2)]);
        assert_eq!(select_victim(&cycle, &freq), Some(txn(2)));
    }

    #[test]
    fn frequency_ties_break_by_smallest_id() {
        let cycle = vec![txn(3), txn(1), txn(2)];
        let freq = HashMap::from([(txn(1), 2), (txn(2), 2), (txn(3), 2)]);
        assert_eq!(select_victim(&cycle, &freq), Some(txn(1)));
    }

    #[test]
    fn empty_frequency_map_degrades_to_smallest_id() {
        let cycle = vec![txn(9), txn(4), txn(7)];
        assert_eq!(select_victim(&cycle, &HashMap::new()), Some(txn(4)));
    }

    #[test]
    fn identical_inputs_give_identical_victims() {
        let cycle = vec![txn(5), txn(6)];
        let freq = HashMap::from([(txn(5), 1), (txn(6), 1)]);
        let first = select_victim(&cycle, &freq);
        for _ in 0..10 {
            assert_eq!(select_victim(&cycle, &freq), first);
        }
    }

    #[test]
    fn empty_cycle_has_no_victim() {
        assert_eq!(select_victim(&[], &HashMap::new()), None);
    }
}
