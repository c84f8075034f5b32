use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use time::OffsetDateTime;
use uuid::Uuid;

/// Opaque, stable task identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// The three optional instants a task carries, each edited through its own overlay.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DateField {
    Schedule,
    Start,
    Due,
}

impl DateField {
    pub const ALL: [DateField; 3] = [DateField::Schedule, DateField::Start, DateField::Due];

    pub(crate) fn index(self) -> usize {
        match self {
            DateField::Schedule => 0,
            DateField::Start => 1,
            DateField::Due => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub content: String,
    pub tags: BTreeSet<String>,
    pub schedule: Option<OffsetDateTime>,
    /// Persisted without an offset; read back as UTC wall-clock.
    pub start: Option<OffsetDateTime>,
    pub due: Option<OffsetDateTime>,
    pub completed: bool,
    /// Set exactly when a schedule was explicitly committed.
    pub locked: bool,
    pub captured: OffsetDateTime,
}

impl Task {
    pub fn new(id: TaskId, content: impl Into<String>, captured: OffsetDateTime) -> Self {
        Self {
            id,
            content: content.into(),
            tags: BTreeSet::new(),
            schedule: None,
            start: None,
            due: None,
            completed: false,
            locked: false,
            captured,
        }
    }

    pub fn date(&self, field: DateField) -> Option<OffsetDateTime> {
        match field {
            DateField::Schedule => self.schedule,
            DateField::Start => self.start,
            DateField::Due => self.due,
        }
    }
}
