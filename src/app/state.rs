use std::collections::BTreeSet;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use crate::format;
use crate::item::{
    EditDispatcher, InteractionSurface, ItemProps, OverlayCommand, OverlayPort, OverlayProps,
    Region, TaskItem,
};
use crate::model::{DateField, Task};

/// Single-line text buffer with a grapheme-aware cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineEditor {
    buffer: String,
    cursor: usize,
}

impl LineEditor {
    pub fn new(text: impl Into<String>) -> Self {
        let buffer = text.into();
        let cursor = buffer.len();
        Self { buffer, cursor }
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Replaces the text and moves the cursor to the end.
    pub fn set_text(&mut self, text: &str) {
        if self.buffer != text {
            self.buffer = text.to_string();
            self.cursor = self.buffer.len();
        }
    }

    /// Display column of the cursor.
    pub fn cursor_column(&self) -> usize {
        self.buffer[..self.cursor].width()
    }

    pub fn insert_char(&mut self, ch: char) -> bool {
        if ch == '\n' || ch == '\r' {
            return false;
        }
        let mut scratch = [0u8; 4];
        let encoded = ch.encode_utf8(&mut scratch);
        self.buffer.insert_str(self.cursor, encoded);
        self.cursor += encoded.len();
        true
    }

    pub fn backspace(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        let prev = prev_grapheme_boundary(&self.buffer, self.cursor);
        self.buffer.drain(prev..self.cursor);
        self.cursor = prev;
        true
    }

    pub fn delete(&mut self) -> bool {
        if self.cursor >= self.buffer.len() {
            return false;
        }
        let next = next_grapheme_boundary(&self.buffer, self.cursor);
        self.buffer.drain(self.cursor..next);
        true
    }

    pub fn move_left(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor = prev_grapheme_boundary(&self.buffer, self.cursor);
        true
    }

    pub fn move_right(&mut self) -> bool {
        if self.cursor >= self.buffer.len() {
            return false;
        }
        self.cursor = next_grapheme_boundary(&self.buffer, self.cursor);
        true
    }

    pub fn move_home(&mut self) -> bool {
        let moved = self.cursor != 0;
        self.cursor = 0;
        moved
    }

    pub fn move_end(&mut self) -> bool {
        let moved = self.cursor != self.buffer.len();
        self.cursor = self.buffer.len();
        moved
    }
}

/// Date entry widget for one field. It owns its own draft and visibility and
/// only takes open/close commands from the row's coordinator.
#[derive(Debug)]
pub struct DatePicker {
    port: OverlayPort,
    open: bool,
    input: LineEditor,
    error: Option<String>,
}

impl DatePicker {
    pub fn new(port: OverlayPort) -> Self {
        Self {
            port,
            open: false,
            input: LineEditor::default(),
            error: None,
        }
    }

    pub fn field(&self) -> DateField {
        self.port.field()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn input(&self) -> &LineEditor {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut LineEditor {
        self.error = None;
        &mut self.input
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Applies the latest coordinator command. Opening seeds the draft from
    /// the task's current value.
    pub fn sync(&mut self, props: OverlayProps) {
        match self.port.take_command() {
            Some(OverlayCommand::Open) if !self.open => {
                self.open = true;
                self.error = None;
                let seed = props
                    .initial
                    .and_then(|at| at.format(&Rfc3339).ok())
                    .unwrap_or_default();
                self.input = LineEditor::new(seed);
            }
            Some(OverlayCommand::Close) => {
                self.open = false;
                self.error = None;
            }
            _ => {}
        }
    }

    /// Closes on the widget's own initiative, e.g. on Escape.
    pub fn dismiss(&mut self) {
        self.open = false;
        self.error = None;
    }

    /// Parses the draft. On failure the message is kept for display.
    pub fn submit(&mut self, now: OffsetDateTime) -> Option<Option<OffsetDateTime>> {
        match format::parse_input(self.input.buffer(), now) {
            Ok(value) => Some(value),
            Err(err) => {
                self.error = Some(format!("{err:#}"));
                None
            }
        }
    }
}

/// Everything the host keeps for one mounted task row.
#[derive(Debug)]
pub struct Row {
    pub item: TaskItem,
    pub editor: LineEditor,
    pub pickers: [DatePicker; 3],
    /// Picker receiving keyboard input, when several are open.
    pub picker_focus: Option<DateField>,
    pub tag_input: Option<LineEditor>,
    pub action_cursor: Option<usize>,
}

impl Row {
    pub fn mount(
        task: Task,
        props: ItemProps,
        surface: &InteractionSurface,
        dispatcher: EditDispatcher,
    ) -> Self {
        let mut item = TaskItem::mount(task, props, surface, Region::default(), dispatcher);
        let pickers = DateField::ALL.map(|field| DatePicker::new(item.attach_overlay(field)));
        let editor = LineEditor::new(item.editor_props().value);
        Self {
            item,
            editor,
            pickers,
            picker_focus: None,
            tag_input: None,
            action_cursor: None,
        }
    }

    pub fn picker(&self, field: DateField) -> &DatePicker {
        &self.pickers[field.index()]
    }

    pub fn picker_mut(&mut self, field: DateField) -> &mut DatePicker {
        &mut self.pickers[field.index()]
    }

    pub fn open_pickers(&self) -> impl Iterator<Item = &DatePicker> {
        self.pickers.iter().filter(|picker| picker.is_open())
    }

    /// Takes a fresh snapshot from the store. The editor only follows it
    /// while the row is not being typed into.
    pub fn sync_task(&mut self, task: Task) {
        self.item.sync_task(task);
        if !self.item.has_focus() {
            self.editor.set_text(&self.item.task().content);
        }
    }

    /// Delivers pending coordinator commands to every picker.
    pub fn sync_pickers(&mut self) {
        for field in DateField::ALL {
            let props = self.item.overlay_props(field);
            self.picker_mut(field).sync(props);
        }
        let focus_open = self
            .picker_focus
            .map_or(false, |field| self.picker(field).is_open());
        if !focus_open {
            self.picker_focus = self.open_pickers().last().map(DatePicker::field);
        }
    }

    pub fn open_picker(&mut self, field: DateField) {
        self.item.open_overlay(field);
        self.sync_pickers();
        self.picker_focus = Some(field);
    }

    pub fn dismiss_picker(&mut self, field: DateField) {
        self.picker_mut(field).dismiss();
        self.item.overlay_closed(field);
        self.sync_pickers();
    }

    /// Commits the focused picker's draft. Returns `false` when the draft
    /// did not parse.
    pub fn submit_picker(&mut self, field: DateField, now: OffsetDateTime) -> bool {
        let Some(value) = self.picker_mut(field).submit(now) else {
            return false;
        };
        self.item.commit_overlay(field, value);
        self.sync_pickers();
        true
    }

    pub fn clear_picker(&mut self, field: DateField) {
        self.item.commit_overlay(field, None);
        self.sync_pickers();
    }

    /// Moves keyboard input to the next open picker.
    pub fn cycle_picker_focus(&mut self) {
        let open: Vec<DateField> = self.open_pickers().map(DatePicker::field).collect();
        let current = self
            .picker_focus
            .and_then(|field| open.iter().position(|open| *open == field));
        let next = match current {
            Some(pos) => open.get((pos + 1) % open.len()).copied(),
            None => open.first().copied(),
        };
        self.picker_focus = next;
    }

    /// Drops per-focus state after the row loses focus: the action cursor,
    /// any tag draft, unsaved editor text and every open date overlay.
    pub fn collapse(&mut self) {
        self.action_cursor = None;
        self.tag_input = None;
        let content = self.item.task().content.clone();
        self.editor.set_text(&content);
        for field in self.item.overlays().open_fields() {
            self.item.close_overlay(field);
        }
        self.sync_pickers();
    }

    pub fn begin_tag_input(&mut self) {
        let current = self.item.task().tags.iter().cloned().collect::<Vec<_>>();
        self.tag_input = Some(LineEditor::new(current.join(" ")));
    }

    pub fn submit_tag_input(&mut self) {
        if let Some(input) = self.tag_input.take() {
            self.item.on_tags_changed(parse_tags(input.buffer()));
        }
    }

    pub fn edit_content<F>(&mut self, edit: F) -> bool
    where
        F: FnOnce(&mut LineEditor) -> bool,
    {
        let before = self.editor.buffer().to_string();
        if !edit(&mut self.editor) {
            return false;
        }
        if self.editor.buffer() != before {
            self.item.on_content_change(self.editor.buffer());
        }
        true
    }
}

pub fn parse_tags(input: &str) -> BTreeSet<String> {
    input
        .split(|ch: char| ch.is_whitespace() || ch == ',')
        .map(|tag| tag.trim_start_matches('#'))
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

fn prev_grapheme_boundary(text: &str, cursor: usize) -> usize {
    if cursor == 0 {
        return 0;
    }
    let mut last = 0;
    for (idx, _) in text[..cursor].grapheme_indices(true) {
        last = idx;
    }
    last
}

fn next_grapheme_boundary(text: &str, cursor: usize) -> usize {
    if cursor >= text.len() {
        return text.len();
    }
    let mut iter = text[cursor..].graphemes(true);
    if let Some(grapheme) = iter.next() {
        cursor + grapheme.len()
    } else {
        text.len()
    }
}
