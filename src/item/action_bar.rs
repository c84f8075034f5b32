use time::OffsetDateTime;

use super::deferred::is_deferred;
use super::overlay::OverlayCoordinator;
use crate::format;
use crate::model::{DateField, Task};
use crate::strings::{StringKey, Strings};

const COMPLETE_ICON: &str = "✓";
const REOPEN_ICON: &str = "↺";
const DELETE_ICON: &str = "✕";

/// Which shared tooltip surface an entry binds to. Only the focused item
/// binds to the active group, so unfocused rows never collide with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TooltipGroup {
    Active,
    Inactive,
}

impl TooltipGroup {
    pub fn for_focus(has_focus: bool) -> Self {
        if has_focus {
            TooltipGroup::Active
        } else {
            TooltipGroup::Inactive
        }
    }

    pub fn id<'a>(&self, options: &'a ActionBarOptions) -> &'a str {
        match self {
            TooltipGroup::Active => &options.tooltip_active_id,
            TooltipGroup::Inactive => &options.tooltip_inactive_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionBarOptions {
    pub tooltip_active_id: String,
    pub tooltip_inactive_id: String,
    pub date_pattern: String,
}

impl Default for ActionBarOptions {
    fn default() -> Self {
        Self {
            tooltip_active_id: "rootp".to_string(),
            tooltip_inactive_id: "notp".to_string(),
            date_pattern: format::DEFAULT_DATE_PATTERN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Complete,
    Date(DateField),
    Tags,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionEntry {
    pub kind: ActionKind,
    pub label: String,
    pub tooltip: String,
    pub tooltip_group: TooltipGroup,
    /// Id of the shared tooltip surface this entry binds to.
    pub tooltip_target: String,
    /// Set while the entry's overlay is open.
    pub active: bool,
}

/// Everything a renderer needs to draw one task row's action bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionBarView {
    pub visible: bool,
    pub deferred: bool,
    pub strikethrough: bool,
    pub entries: Vec<ActionEntry>,
}

impl ActionBarView {
    pub fn build(
        task: &Task,
        has_focus: bool,
        overlays: &OverlayCoordinator,
        now: OffsetDateTime,
        strings: &Strings,
        options: &ActionBarOptions,
    ) -> Self {
        let group = TooltipGroup::for_focus(has_focus);
        let target = group.id(options);
        let entry = |kind, label: String, tooltip: StringKey, active| ActionEntry {
            kind,
            label,
            tooltip: strings.get(tooltip).to_string(),
            tooltip_group: group,
            tooltip_target: target.to_string(),
            active,
        };

        let (icon, complete_tooltip) = if task.completed {
            (REOPEN_ICON, StringKey::TooltipUncomplete)
        } else {
            (COMPLETE_ICON, StringKey::TooltipComplete)
        };

        let mut entries = vec![entry(
            ActionKind::Complete,
            icon.to_string(),
            complete_tooltip,
            false,
        )];
        for field in DateField::ALL {
            entries.push(entry(
                ActionKind::Date(field),
                date_label(task, field, now, strings, options),
                date_tooltip(field),
                overlays.is_open(field),
            ));
        }
        entries.push(entry(
            ActionKind::Tags,
            tags_label(task, strings),
            StringKey::TooltipTags,
            false,
        ));
        entries.push(entry(
            ActionKind::Delete,
            DELETE_ICON.to_string(),
            StringKey::TooltipDelete,
            false,
        ));

        Self {
            visible: has_focus,
            deferred: is_deferred(task.start, now),
            strikethrough: task.completed,
            entries,
        }
    }

    pub fn entry(&self, kind: ActionKind) -> Option<&ActionEntry> {
        self.entries.iter().find(|entry| entry.kind == kind)
    }

    /// Tooltip text for the entry at `index`, if it is bound to the surface
    /// the renderer shows (`options.tooltip_active_id`).
    pub fn active_tooltip(&self, index: usize, options: &ActionBarOptions) -> Option<&str> {
        self.entries
            .get(index)
            .filter(|entry| entry.tooltip_target == options.tooltip_active_id)
            .map(|entry| entry.tooltip.as_str())
    }
}

fn date_label(
    task: &Task,
    field: DateField,
    now: OffsetDateTime,
    strings: &Strings,
    options: &ActionBarOptions,
) -> String {
    match (field, task.date(field)) {
        (DateField::Schedule, Some(at)) => format::relative(at, now),
        (_, Some(at)) => format::pattern(at, &options.date_pattern),
        (DateField::Schedule, None) => strings.get(StringKey::TapToSchedule).to_string(),
        (DateField::Start, None) => strings.get(StringKey::NoStartDate).to_string(),
        (DateField::Due, None) => strings.get(StringKey::NoDueDate).to_string(),
    }
}

fn date_tooltip(field: DateField) -> StringKey {
    match field {
        DateField::Schedule => StringKey::TooltipScheduled,
        DateField::Start => StringKey::TooltipStart,
        DateField::Due => StringKey::TooltipDue,
    }
}

fn tags_label(task: &Task, strings: &Strings) -> String {
    if task.tags.is_empty() {
        return strings.get(StringKey::NoTags).to_string();
    }
    task.tags
        .iter()
        .map(|tag| format!("#{tag}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use time::Duration;

    fn task() -> Task {
        Task::new("t1".into(), "draft slides", datetime!(2024-01-01 00:00 UTC))
    }

    fn build(task: &Task, focus: bool, overlays: &OverlayCoordinator) -> ActionBarView {
        ActionBarView::build(
            task,
            focus,
            overlays,
            datetime!(2024-01-10 12:00 UTC),
            &Strings::default(),
            &ActionBarOptions::default(),
        )
    }

    #[test]
    fn tooltip_group_follows_focus_for_every_entry() {
        let overlays = OverlayCoordinator::default();
        let focused = build(&task(), true, &overlays);
        assert!(focused.visible);
        assert!(focused
            .entries
            .iter()
            .all(|entry| entry.tooltip_group == TooltipGroup::Active));

        let idle = build(&task(), false, &overlays);
        assert!(!idle.visible);
        assert!(idle
            .entries
            .iter()
            .all(|entry| entry.tooltip_group == TooltipGroup::Inactive));
        let options = ActionBarOptions::default();
        assert_eq!(idle.active_tooltip(0, &options), None);
        assert_eq!(focused.active_tooltip(0, &options), Some("Mark as complete"));
    }

    #[test]
    fn entries_bind_to_configured_group_ids() {
        let options = ActionBarOptions {
            tooltip_active_id: "row-tip".to_string(),
            tooltip_inactive_id: "idle-tip".to_string(),
            ..ActionBarOptions::default()
        };
        let overlays = OverlayCoordinator::default();
        let now = datetime!(2024-01-10 12:00 UTC);
        let strings = Strings::default();
        let focused = ActionBarView::build(&task(), true, &overlays, now, &strings, &options);
        let idle = ActionBarView::build(&task(), false, &overlays, now, &strings, &options);

        assert!(focused.entries.iter().all(|entry| entry.tooltip_target == "row-tip"));
        assert!(idle.entries.iter().all(|entry| entry.tooltip_target == "idle-tip"));
        assert_eq!(focused.active_tooltip(1, &options), Some("When to work on this"));
        assert_eq!(idle.active_tooltip(1, &options), None);
        assert_eq!(focused.active_tooltip(1, &ActionBarOptions::default()), None);
    }

    #[test]
    fn completion_entry_reflects_state() {
        let overlays = OverlayCoordinator::default();
        let mut done = task();
        done.completed = true;
        let view = build(&done, true, &overlays);
        let entry = view.entry(ActionKind::Complete).unwrap();
        assert_eq!(entry.label, REOPEN_ICON);
        assert_eq!(entry.tooltip, "Mark as not complete");
        assert!(view.strikethrough);
    }

    #[test]
    fn date_entries_show_placeholders_or_values() {
        let overlays = OverlayCoordinator::default();
        let view = build(&task(), true, &overlays);
        let label = |field| view.entry(ActionKind::Date(field)).unwrap().label.clone();
        assert_eq!(label(DateField::Schedule), "tap to schedule");
        assert_eq!(label(DateField::Start), "no start date");
        assert_eq!(label(DateField::Due), "no due date");

        let mut dated = task();
        let now = datetime!(2024-01-10 12:00 UTC);
        dated.schedule = Some(now + Duration::hours(3));
        dated.due = Some(datetime!(2024-02-01 00:00 UTC));
        let view = build(&dated, true, &overlays);
        let label = |field| view.entry(ActionKind::Date(field)).unwrap().label.clone();
        assert_eq!(label(DateField::Schedule), "in 3h");
        assert_eq!(label(DateField::Due), "Feb 1, 2024");
    }

    #[test]
    fn open_overlay_marks_entry_active() {
        let mut overlays = OverlayCoordinator::default();
        overlays.open(DateField::Start);
        let view = build(&task(), true, &overlays);
        let active: Vec<_> = view
            .entries
            .iter()
            .filter(|entry| entry.active)
            .map(|entry| entry.kind)
            .collect();
        assert_eq!(active, vec![ActionKind::Date(DateField::Start)]);
    }

    #[test]
    fn deferred_flag_uses_start_against_now() {
        let overlays = OverlayCoordinator::default();
        let mut later = task();
        later.start = Some(datetime!(2024-02-01 00:00 UTC));
        assert!(build(&later, false, &overlays).deferred);
        later.start = Some(datetime!(2024-01-01 00:00 UTC));
        assert!(!build(&later, false, &overlays).deferred);
    }

    #[test]
    fn tags_entry_lists_tags() {
        let overlays = OverlayCoordinator::default();
        let mut tagged = task();
        tagged.tags = ["work".to_string(), "q1".to_string()].into();
        let view = build(&tagged, true, &overlays);
        assert_eq!(view.entry(ActionKind::Tags).unwrap().label, "#q1 #work");
        assert_eq!(
            build(&task(), true, &overlays)
                .entry(ActionKind::Tags)
                .unwrap()
                .label,
            "no tags"
        );
    }
}
