//! Per-row interaction core: focus, date overlays and edit dispatch for one task.

use std::collections::BTreeSet;

use time::OffsetDateTime;

use crate::model::{DateField, Task};
use crate::strings::Strings;

pub mod action_bar;
mod deferred;
pub mod dispatch;
mod focus;
pub mod overlay;
pub mod surface;

pub use action_bar::{ActionBarOptions, ActionBarView, ActionEntry, ActionKind, TooltipGroup};
pub use deferred::is_deferred;
pub use dispatch::{EditDispatcher, EditIntent, StoreClient, StoreRequest};
pub use focus::{FocusCallback, FocusController};
pub use overlay::{OverlayCommand, OverlayCoordinator, OverlayPolicy, OverlayPort};
pub use surface::{InteractionSurface, OutsideListener, Point, Region};

/// Props the text widget is rendered with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorProps {
    pub value: String,
    pub focus_requested: bool,
    pub strikethrough: bool,
}

/// Props a date overlay is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayProps {
    pub field: DateField,
    pub initial: Option<OffsetDateTime>,
}

/// Caller-supplied mount options.
#[derive(Default)]
pub struct ItemProps {
    pub initial_focus: bool,
    pub on_focus_change: Option<FocusCallback>,
    pub overlay_policy: OverlayPolicy,
}

/// One mounted task row. Created when the row enters view and dropped when
/// it leaves; dropping releases the outside-interaction listener.
#[derive(Debug)]
pub struct TaskItem {
    task: Task,
    initial_focus: bool,
    focus: FocusController,
    overlays: OverlayCoordinator,
    dispatcher: EditDispatcher,
    listener: OutsideListener,
}

impl TaskItem {
    pub fn mount(
        task: Task,
        props: ItemProps,
        surface: &InteractionSurface,
        region: Region,
        dispatcher: EditDispatcher,
    ) -> Self {
        let mut focus = FocusController::new(props.initial_focus);
        if let Some(callback) = props.on_focus_change {
            focus = focus.with_callback(callback);
        }
        tracing::debug!(task = %task.id, initial_focus = props.initial_focus, "task item mounted");
        Self {
            task,
            initial_focus: props.initial_focus,
            focus,
            overlays: OverlayCoordinator::new(props.overlay_policy),
            dispatcher,
            listener: surface.listen(region),
        }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Replaces the externally owned snapshot, e.g. after the store reports a change.
    pub fn sync_task(&mut self, task: Task) {
        self.task = task;
    }

    pub fn has_focus(&self) -> bool {
        self.focus.has_focus()
    }

    pub fn set_focus(&mut self, focus: bool) -> bool {
        self.focus.set_focus(focus)
    }

    pub fn is_deferred(&self, now: OffsetDateTime) -> bool {
        is_deferred(self.task.start, now)
    }

    pub fn overlays(&self) -> &OverlayCoordinator {
        &self.overlays
    }

    pub fn set_region(&self, region: Region) {
        self.listener.set_region(region);
    }

    pub fn region(&self) -> Option<Region> {
        self.listener.region()
    }

    /// Applies outside interactions queued by the surface. Returns `true`
    /// when focus collapsed as a result.
    pub fn poll_surface(&mut self) -> bool {
        if self.listener.take_outside() {
            return self.focus.set_focus(false);
        }
        false
    }

    pub fn editor_props(&self) -> EditorProps {
        EditorProps {
            value: self.task.content.clone(),
            focus_requested: self.initial_focus,
            strikethrough: self.task.completed,
        }
    }

    pub fn overlay_props(&self, field: DateField) -> OverlayProps {
        OverlayProps {
            field,
            initial: self.task.date(field),
        }
    }

    pub fn on_editor_focus_change(&mut self, focused: bool) -> bool {
        self.focus.on_editor_focus_change(focused)
    }

    pub fn on_content_change(&self, content: impl Into<String>) {
        self.dispatch(EditIntent::Content(content.into()));
    }

    pub fn on_tags_changed(&self, tags: BTreeSet<String>) {
        self.dispatch(EditIntent::Tags(tags));
    }

    pub fn toggle_completion(&mut self) {
        self.dispatch(EditIntent::ToggleCompletion {
            current: self.task.completed,
        });
        self.focus.set_focus(false);
    }

    pub fn delete(&self) {
        self.dispatch(EditIntent::Delete);
    }

    pub fn attach_overlay(&mut self, field: DateField) -> OverlayPort {
        self.overlays.attach(field)
    }

    pub fn open_overlay(&mut self, field: DateField) {
        self.overlays.open(field);
    }

    pub fn close_overlay(&mut self, field: DateField) {
        self.overlays.close(field);
    }

    pub fn overlay_closed(&mut self, field: DateField) {
        self.overlays.on_closed(field);
    }

    pub fn commit_overlay(&mut self, field: DateField, value: Option<OffsetDateTime>) {
        self.overlays
            .commit(field, value, &self.dispatcher, &self.task.id);
    }

    pub fn action_bar(
        &self,
        now: OffsetDateTime,
        strings: &Strings,
        options: &ActionBarOptions,
    ) -> ActionBarView {
        ActionBarView::build(
            &self.task,
            self.focus.has_focus(),
            &self.overlays,
            now,
            strings,
            options,
        )
    }

    fn dispatch(&self, intent: EditIntent) {
        self.dispatcher.dispatch(&self.task.id, intent);
    }
}
