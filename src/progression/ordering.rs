//! Sidequest sequencing rules: who is "current", contiguous reindexing, and
//! the proportional shrink of a quest's bonus when work is removed.

use crate::types::{QuestProgress, SidequestRecord};

/// Sort in place by `order_index`. Stable, so ties keep their existing order.
pub fn sort_by_order(sidequests: &mut [SidequestRecord]) {
    sidequests.sort_by_key(|s| s.order_index);
}

/// Rewrite indices to `0..n` following the current relative order. Returns the
/// ids whose index actually changed, so callers only persist those.
pub fn reindex(sidequests: &mut [SidequestRecord]) -> Vec<String> {
    sort_by_order(sidequests);
    let mut changed = Vec::new();
    for (position, sidequest) in sidequests.iter_mut().enumerate() {
        let index = position as u32;
        if sidequest.order_index != index {
            sidequest.order_index = index;
            changed.push(sidequest.id.clone());
        }
    }
    changed
}

/// The lowest-index incomplete sidequest: the only one that may be completed next.
pub fn current_sidequest(sidequests: &[SidequestRecord]) -> Option<&SidequestRecord> {
    sidequests
        .iter()
        .filter(|s| !s.is_completed)
        .min_by_key(|s| s.order_index)
}

/// Index assigned to a sidequest appended to this set.
pub fn next_order_index(sidequests: &[SidequestRecord]) -> u32 {
    sidequests.len() as u32
}

/// True when the indices are exactly `0..n` in some order.
pub fn is_contiguous(sidequests: &[SidequestRecord]) -> bool {
    let mut indices: Vec<u32> = sidequests.iter().map(|s| s.order_index).collect();
    indices.sort_unstable();
    indices.iter().enumerate().all(|(pos, idx)| *idx == pos as u32)
}

pub fn progress(sidequests: &[SidequestRecord]) -> QuestProgress {
    QuestProgress {
        completed: sidequests.iter().filter(|s| s.is_completed).count(),
        total: sidequests.len(),
    }
}

/// `round(quest_xp * removed_xp / total_xp)`, half rounding up, capped at
/// `quest_xp`. Zero when `total_xp` is zero.
pub fn proportional_reduction(quest_xp: u64, removed_xp: u64, total_xp: u64) -> u64 {
    if total_xp == 0 {
        return 0;
    }
    let numerator = u128::from(quest_xp) * u128::from(removed_xp) * 2 + u128::from(total_xp);
    let rounded = numerator / (u128::from(total_xp) * 2);
    rounded.min(u128::from(quest_xp)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(id: &str, index: u32, done: bool) -> SidequestRecord {
        let mut s = SidequestRecord::new(id, "q1", "u1", id, "", 10, index);
        s.is_completed = done;
        s
    }

    #[test]
    fn reindex_closes_gaps_preserving_order() {
        let mut set = vec![sq("c", 5, false), sq("a", 0, false), sq("b", 2, false)];
        let changed = reindex(&mut set);
        let ids: Vec<_> = set.iter().map(|s| (s.id.as_str(), s.order_index)).collect();
        assert_eq!(ids, vec![("a", 0), ("b", 1), ("c", 2)]);
        assert_eq!(changed, vec!["b".to_string(), "c".to_string()]);
        assert!(is_contiguous(&set));
    }

    #[test]
    fn current_is_lowest_incomplete() {
        let set = vec![sq("b", 1, false), sq("a", 0, true), sq("c", 2, false)];
        assert_eq!(current_sidequest(&set).map(|s| s.id.as_str()), Some("b"));
        let done = vec![sq("a", 0, true)];
        assert!(current_sidequest(&done).is_none());
    }

    #[test]
    fn reduction_matches_documented_example() {
        // sidequests [100, 100, 200], quest bonus 400, remove the 200 one
        assert_eq!(proportional_reduction(400, 200, 400), 200);
    }

    #[test]
    fn reduction_rounds_half_up_and_caps() {
        // 100 * 1/3 = 33.33 -> 33
        assert_eq!(proportional_reduction(100, 1, 3), 33);
        // 100 * 2/3 = 66.67 -> 67
        assert_eq!(proportional_reduction(100, 2, 3), 67);
        // 5 * 1/2 = 2.5 -> 3
        assert_eq!(proportional_reduction(5, 1, 2), 3);
        assert_eq!(proportional_reduction(100, 0, 0), 0);
        assert_eq!(proportional_reduction(100, 50, 50), 100);
    }

    #[test]
    fn contiguity_detects_duplicates() {
        assert!(!is_contiguous(&[sq("a", 0, false), sq("b", 0, false)]));
        assert!(is_contiguous(&[]));
    }
}
