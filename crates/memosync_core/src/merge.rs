//! Last-write-wins merge of two memo collections.
//!
//! ## Rules
//!
//! - The map is seeded from `local`.
//! - A remote memo replaces its local counterpart only when its
//!   `updated_at` is strictly greater; ties keep the local copy.
//! - Nothing is ever dropped. Tombstones travel like any other record,
//!   which is how deletions replicate.
//! - Output is sorted by `updated_at` descending, then id ascending.
//!
//! Precedence assumes device clocks are roughly in agreement. A device
//! whose clock runs ahead wins merges it should lose; this is not
//! compensated here.

use crate::entity::Memo;
use std::collections::HashMap;

/// Merges `remote` into `local`.
#[must_use]
pub fn merge(local: &[Memo], remote: &[Memo]) -> Vec<Memo> {
    merge_report(local, remote).merged
}

/// Outcome of a merge together with the counts adapters need to decide
/// whether the remote side is stale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// The merged collection.
    pub merged: Vec<Memo>,
    /// Ids where the remote copy replaced or added to local.
    pub remote_wins: usize,
    /// Ids that exist only locally.
    pub local_only: usize,
    /// Ids present on both sides where local is strictly newer.
    pub local_newer: usize,
}

impl MergeReport {
    /// Returns true if the remote side is missing something local has.
    #[must_use]
    pub fn remote_is_stale(&self) -> bool {
        self.local_only > 0 || self.local_newer > 0
    }
}

/// Merges `remote` into `local` and reports what happened.
#[must_use]
pub fn merge_report(local: &[Memo], remote: &[Memo]) -> MergeReport {
    let mut by_id: HashMap<&str, &Memo> = HashMap::with_capacity(local.len() + remote.len());
    for memo in local {
        by_id.insert(memo.id.as_str(), memo);
    }

    let mut remote_ids: HashMap<&str, &Memo> = HashMap::with_capacity(remote.len());
    let mut remote_wins = 0;

    for memo in remote {
        remote_ids.insert(memo.id.as_str(), memo);
        match by_id.get(memo.id.as_str()) {
            Some(existing) if memo.updated_at <= existing.updated_at => {}
            _ => {
                by_id.insert(memo.id.as_str(), memo);
                remote_wins += 1;
            }
        }
    }

    let mut local_only = 0;
    let mut local_newer = 0;
    for memo in local {
        match remote_ids.get(memo.id.as_str()) {
            None => local_only += 1,
            Some(theirs) if memo.updated_at > theirs.updated_at => local_newer += 1,
            Some(_) => {}
        }
    }

    let mut merged: Vec<Memo> = by_id.into_values().cloned().collect();
    sort_newest_first(&mut merged);

    MergeReport {
        merged,
        remote_wins,
        local_only,
        local_newer,
    }
}

/// Sorts by `updated_at` descending with id as tie-breaker.
pub fn sort_newest_first(memos: &mut [Memo]) {
    memos.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::MemoKind;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn memo(id: &str, updated_at: i64, content: &str) -> Memo {
        let mut m = Memo::new(id, content, MemoKind::Memo, 0);
        m.updated_at = updated_at;
        m
    }

    #[test]
    fn remote_newer_wins() {
        let local = vec![memo("a", 100, "x")];
        let remote = vec![memo("a", 200, "y")];

        let merged = merge(&local, &remote);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].content, "y");
        assert_eq!(merged[0].updated_at, 200);
    }

    #[test]
    fn tie_prefers_local() {
        let merged = merge(&[memo("a", 100, "local")], &[memo("a", 100, "remote")]);
        assert_eq!(merged[0].content, "local");
    }

    #[test]
    fn empty_remote_keeps_local() {
        let local = vec![memo("a", 100, "x")];
        assert_eq!(merge(&local, &[]), local);
    }

    #[test]
    fn tombstones_survive() {
        let mut gone = memo("a", 300, "x");
        gone.is_deleted = true;

        let merged = merge(&[memo("a", 100, "x")], &[gone]);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].is_deleted);
    }

    #[test]
    fn output_sorted_newest_first() {
        let merged = merge(
            &[memo("a", 10, ""), memo("c", 30, "")],
            &[memo("b", 20, ""), memo("d", 30, "")],
        );
        let ids: Vec<_> = merged.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "d", "b", "a"]);
    }

    #[test]
    fn report_counts() {
        let report = merge_report(
            &[memo("a", 10, ""), memo("b", 50, ""), memo("c", 5, "")],
            &[memo("b", 40, ""), memo("c", 9, ""), memo("d", 1, "")],
        );
        assert_eq!(report.local_only, 1);
        assert_eq!(report.local_newer, 1);
        assert_eq!(report.remote_wins, 2);
        assert!(report.remote_is_stale());

        let report = merge_report(&[memo("a", 10, "")], &[memo("a", 10, "")]);
        assert!(!report.remote_is_stale());
    }

    fn memos_strategy() -> impl Strategy<Value = Vec<Memo>> {
        prop::collection::vec(("[a-f]", 0i64..50, any::<bool>()), 0..12).prop_map(|rows| {
            let mut seen = HashSet::new();
            rows.into_iter()
                .filter(|(id, _, _)| seen.insert(id.clone()))
                .map(|(id, ts, deleted)| {
                    let mut m = memo(&id, ts, &format!("{id}-{ts}"));
                    m.is_deleted = deleted;
                    m
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn merge_is_union_with_lww(local in memos_strategy(), remote in memos_strategy()) {
            let merged = merge(&local, &remote);

            let expected: HashSet<_> = local.iter().chain(&remote).map(|m| m.id.clone()).collect();
            let actual: HashSet<_> = merged.iter().map(|m| m.id.clone()).collect();
            prop_assert_eq!(merged.len(), actual.len());
            prop_assert_eq!(actual, expected);

            for m in &merged {
                let l = local.iter().find(|x| x.id == m.id);
                let r = remote.iter().find(|x| x.id == m.id);
                let winner = match (l, r) {
                    (Some(l), Some(r)) if r.updated_at > l.updated_at => r,
                    (Some(l), _) => l,
                    (None, Some(r)) => r,
                    (None, None) => unreachable!(),
                };
                prop_assert_eq!(m, winner);
            }
        }

        #[test]
        fn merge_is_idempotent(local in memos_strategy(), remote in memos_strategy()) {
            let once = merge(&local, &remote);
            prop_assert_eq!(merge(&once, &remote), once.clone());
            prop_assert_eq!(merge(&once, &local), once.clone());
        }
    }
}
