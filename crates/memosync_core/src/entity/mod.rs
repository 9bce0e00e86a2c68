//! Entity types and the local entity store.

mod memo;
mod store;

pub use memo::{visible, Memo, MemoKind, Priority, ReminderRepeat, TodoItem};
pub use store::{EntityStore, MemoryEntityStore};
