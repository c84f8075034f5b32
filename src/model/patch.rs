use std::collections::BTreeSet;

use serde::Serialize;
use time::{OffsetDateTime, PrimitiveDateTime};

use super::encoding::{serialize_instant_change, serialize_naive_change};

/// A sparse change set: only the fields that changed are present.
///
/// Date fields are doubly optional. `None` leaves the field untouched while
/// `Some(None)` clears it and serializes as `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_instant_change"
    )]
    pub schedule: Option<Option<OffsetDateTime>>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_naive_change"
    )]
    pub start: Option<Option<PrimitiveDateTime>>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_instant_change"
    )]
    pub due: Option<Option<OffsetDateTime>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self == &TaskPatch::default()
    }

    /// Names of the fields carried by this patch, in wire order.
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.content.is_some() {
            names.push("content");
        }
        if self.tags.is_some() {
            names.push("tags");
        }
        if self.completed.is_some() {
            names.push("completed");
        }
        if self.locked.is_some() {
            names.push("locked");
        }
        if self.schedule.is_some() {
            names.push("schedule");
        }
        if self.start.is_some() {
            names.push("start");
        }
        if self.due.is_some() {
            names.push("due");
        }
        names
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn empty_patch_serializes_to_empty_object() -> anyhow::Result<()> {
        let patch = TaskPatch::default();
        assert!(patch.is_empty());
        assert_eq!(patch.to_json()?, json!({}));
        Ok(())
    }

    #[test]
    fn cleared_dates_serialize_as_null() -> anyhow::Result<()> {
        let patch = TaskPatch {
            locked: Some(false),
            schedule: Some(None),
            ..TaskPatch::default()
        };
        assert_eq!(patch.to_json()?, json!({"locked": false, "schedule": null}));
        Ok(())
    }

    #[test]
    fn mixed_patch_uses_per_field_encodings() -> anyhow::Result<()> {
        let patch = TaskPatch {
            start: Some(Some(datetime!(2024-01-01 00:00))),
            due: Some(Some(datetime!(2024-01-01 00:00 UTC))),
            tags: Some(["b".to_string(), "a".to_string()].into_iter().collect()),
            ..TaskPatch::default()
        };
        assert_eq!(
            patch.to_json()?,
            json!({
                "tags": ["a", "b"],
                "start": "2024-01-01T00:00:00",
                "due": 1_704_067_200_000i64,
            })
        );
        assert_eq!(patch.field_names(), vec!["tags", "start", "due"]);
        Ok(())
    }
}
