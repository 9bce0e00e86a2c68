//! The memo record.

use crate::types::Timestamp;
use serde::{Deserialize, Serialize};

/// Kind of a memo; decides which snapshot partition it lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoKind {
    /// Free-form note.
    Memo,
    /// Checklist.
    Todo,
    /// Sketch canvas.
    Whiteboard,
}

/// Priority attached to a memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Low priority.
    Low,
    /// Medium priority.
    Medium,
    /// High priority.
    High,
}

/// Recurrence rule for reminders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderRepeat {
    /// Fires once.
    None,
    /// Every day.
    Daily,
    /// Every week.
    Weekly,
    /// Every month.
    Monthly,
    /// Every year.
    Yearly,
}

/// A single checklist line inside a todo memo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    /// Item id, unique within its memo.
    pub id: String,
    /// Item text.
    pub text: String,
    /// Whether the item is checked off.
    #[serde(default)]
    pub completed: bool,
}

/// A task or note record.
///
/// `updated_at` is the only input to merge precedence. Deletion never
/// removes a record; it sets `is_deleted` and bumps `updated_at` so the
/// tombstone wins merges on other devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memo {
    /// Unique, immutable id.
    pub id: String,
    /// Body text.
    #[serde(default)]
    pub content: String,
    /// Record kind.
    #[serde(rename = "type")]
    pub kind: MemoKind,
    /// Checklist items for todo memos.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub todos: Option<Vec<TodoItem>>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last mutation time.
    pub updated_at: Timestamp,
    /// Due date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Timestamp>,
    /// Next reminder time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_at: Option<Timestamp>,
    /// Reminder recurrence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_repeat: Option<ReminderRepeat>,
    /// Archived flag.
    #[serde(default)]
    pub is_archived: bool,
    /// Favorite flag.
    #[serde(default)]
    pub is_favorite: bool,
    /// Tombstone flag.
    #[serde(default)]
    pub is_deleted: bool,
    /// Category label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Serialized sketch for whiteboards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sketch_data: Option<String>,
    /// Reference to an audio attachment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}

impl Memo {
    /// Creates a new memo with `created_at == updated_at == now`.
    pub fn new(id: impl Into<String>, content: impl Into<String>, kind: MemoKind, now: Timestamp) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            kind,
            todos: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            due_date: None,
            reminder_at: None,
            reminder_repeat: None,
            is_archived: false,
            is_favorite: false,
            is_deleted: false,
            category: None,
            priority: None,
            sketch_data: None,
            audio: None,
        }
    }

    /// Records a mutation at `now`.
    ///
    /// `updated_at` strictly increases even when the clock stalls or steps back.
    pub fn touch(&mut self, now: Timestamp) {
        self.updated_at = now.max(self.updated_at.saturating_add(1));
    }

    /// Replaces the body text.
    pub fn set_content(&mut self, content: impl Into<String>, now: Timestamp) {
        self.content = content.into();
        self.touch(now);
    }

    /// Turns the memo into a tombstone.
    pub fn mark_deleted(&mut self, now: Timestamp) {
        self.is_deleted = true;
        self.touch(now);
    }

    /// Moves the reminder to `at`.
    pub fn reschedule_reminder(&mut self, at: Timestamp, now: Timestamp) {
        self.reminder_at = Some(at);
        self.touch(now);
    }

    /// Returns true if the memo belongs in the application-visible list.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        !self.is_deleted
    }
}

/// Filters out tombstones.
#[must_use]
pub fn visible(memos: &[Memo]) -> Vec<Memo> {
    memos.iter().filter(|m| m.is_visible()).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_memo_timestamps_match() {
        let memo = Memo::new("a", "hello", MemoKind::Memo, 42);
        assert_eq!(memo.created_at, 42);
        assert_eq!(memo.updated_at, 42);
        assert!(memo.is_visible());
    }

    #[test]
    fn touch_is_strictly_monotonic() {
        let mut memo = Memo::new("a", "", MemoKind::Memo, 100);
        memo.touch(100);
        assert_eq!(memo.updated_at, 101);
        memo.touch(50);
        assert_eq!(memo.updated_at, 102);
        memo.touch(500);
        assert_eq!(memo.updated_at, 500);
    }

    #[test]
    fn delete_leaves_tombstone() {
        let mut memo = Memo::new("a", "x", MemoKind::Todo, 100);
        memo.mark_deleted(200);
        assert!(memo.is_deleted);
        assert_eq!(memo.updated_at, 200);
        assert!(visible(&[memo]).is_empty());
    }

    #[test]
    fn reminder_reschedule_bumps_updated_at() {
        let mut memo = Memo::new("a", "x", MemoKind::Todo, 100);
        memo.reschedule_reminder(9_000, 300);
        assert_eq!(memo.reminder_at, Some(9_000));
        assert_eq!(memo.updated_at, 300);
    }

    #[test]
    fn json_uses_camel_case_and_type_tag() {
        let mut memo = Memo::new("a", "x", MemoKind::Todo, 7);
        memo.is_favorite = true;
        let json = serde_json::to_value(&memo).unwrap();
        assert_eq!(json["type"], "todo");
        assert_eq!(json["updatedAt"], 7);
        assert_eq!(json["isFavorite"], true);
        assert!(json.get("dueDate").is_none());
    }

    #[test]
    fn json_missing_optional_fields_default() {
        let memo: Memo = serde_json::from_str(
            r#"{"id":"z","type":"memo","createdAt":1,"updatedAt":2}"#,
        )
        .unwrap();
        assert_eq!(memo.id, "z");
        assert!(!memo.is_deleted);
        assert!(memo.tags.is_empty());
        assert_eq!(memo.content, "");
    }
}
