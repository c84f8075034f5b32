use std::collections::BTreeSet;
use std::sync::Arc;

use time::OffsetDateTime;

use crate::model::encoding::strip_offset;
use crate::model::{DateField, TaskId, TaskPatch};

/// Mutation-intent channel into the backing store.
///
/// Both calls are fire-and-forget: nothing is returned, nothing is awaited.
/// Whatever the store does with a failing request is invisible here.
pub trait StoreClient: Send + Sync {
    fn request_edit(&self, id: &TaskId, patch: TaskPatch);
    fn request_remove(&self, id: &TaskId);
}

/// A discrete user intent against one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditIntent {
    Content(String),
    Tags(BTreeSet<String>),
    Date(DateField, Option<OffsetDateTime>),
    ToggleCompletion { current: bool },
    Delete,
}

/// Store-bound request produced from an intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreRequest {
    Edit(TaskPatch),
    Remove,
}

impl EditIntent {
    pub fn into_request(self) -> StoreRequest {
        let patch = match self {
            EditIntent::Content(content) => TaskPatch {
                content: Some(content),
                ..TaskPatch::default()
            },
            EditIntent::Tags(tags) => TaskPatch {
                tags: Some(tags),
                ..TaskPatch::default()
            },
            EditIntent::ToggleCompletion { current } => TaskPatch {
                completed: Some(!current),
                ..TaskPatch::default()
            },
            EditIntent::Date(DateField::Schedule, value) => TaskPatch {
                locked: Some(value.is_some()),
                schedule: Some(value),
                ..TaskPatch::default()
            },
            EditIntent::Date(DateField::Start, value) => TaskPatch {
                start: Some(value.map(strip_offset)),
                ..TaskPatch::default()
            },
            EditIntent::Date(DateField::Due, value) => TaskPatch {
                due: Some(value),
                ..TaskPatch::default()
            },
            EditIntent::Delete => return StoreRequest::Remove,
        };
        StoreRequest::Edit(patch)
    }
}

#[derive(Clone)]
pub struct EditDispatcher {
    client: Arc<dyn StoreClient>,
}

impl EditDispatcher {
    pub fn new(client: Arc<dyn StoreClient>) -> Self {
        Self { client }
    }

    pub fn dispatch(&self, id: &TaskId, intent: EditIntent) {
        match intent.into_request() {
            StoreRequest::Edit(patch) => {
                tracing::debug!(task = %id, fields = ?patch.field_names(), "dispatching edit");
                self.client.request_edit(id, patch);
            }
            StoreRequest::Remove => {
                tracing::debug!(task = %id, "dispatching removal");
                self.client.request_remove(id);
            }
        }
    }
}

impl std::fmt::Debug for EditDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditDispatcher").finish_non_exhaustive()
    }
}
