//! Property-based test generators using proptest.
//!
//! Collections come with unique ids so merges have well-defined inputs.

use memosync_core::{Memo, MemoKind, Priority, Timestamp};
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Strategy for memo ids from a small alphabet, so collections overlap.
pub fn memo_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-f][0-9]{0,2}").expect("Invalid regex")
}

/// Strategy for timestamps in a narrow window, so ties happen.
pub fn timestamp_strategy() -> impl Strategy<Value = Timestamp> {
    0i64..64
}

/// Strategy for record kinds.
pub fn memo_kind_strategy() -> impl Strategy<Value = MemoKind> {
    prop_oneof![
        Just(MemoKind::Memo),
        Just(MemoKind::Todo),
        Just(MemoKind::Whiteboard),
    ]
}

/// Strategy for a single memo.
pub fn memo_strategy() -> impl Strategy<Value = Memo> {
    (
        memo_id_strategy(),
        ".{0,24}",
        memo_kind_strategy(),
        timestamp_strategy(),
        any::<bool>(),
        prop::option::of(prop_oneof![
            Just(Priority::Low),
            Just(Priority::Medium),
            Just(Priority::High)
        ]),
    )
        .prop_map(|(id, content, kind, at, deleted, priority)| {
            let mut memo = Memo::new(id, content, kind, at);
            memo.is_deleted = deleted;
            memo.priority = priority;
            memo
        })
}

/// Strategy for a collection with unique ids.
pub fn memo_collection_strategy(max: usize) -> impl Strategy<Value = Vec<Memo>> {
    prop::collection::vec(memo_strategy(), 0..=max).prop_map(|memos| {
        let unique: BTreeMap<String, Memo> = memos.into_iter().map(|m| (m.id.clone(), m)).collect();
        unique.into_values().collect()
    })
}
