use std::io::Stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use time::OffsetDateTime;

use crate::config::themes::Palette;
use crate::config::AppConfig;
use crate::item::{
    ActionBarOptions, ActionKind, EditDispatcher, InteractionSurface, ItemProps, Point,
};
use crate::model::{DateField, Task, TaskId};
use crate::search::BrowseRequest;
use crate::storage::{DispatchEvent, StorageHandle, StoreWorker};
use crate::strings::{StringKey, Strings};
use crate::ui::{self, FrameLayout, Screen};

mod actions;
pub mod state;

use self::actions::Action;
pub use self::state::{DatePicker, LineEditor, Row};

pub struct App {
    pub config: Arc<AppConfig>,
    pub storage: StorageHandle,
    strings: Strings,
    action_options: ActionBarOptions,
    palette: Palette,
    worker: Arc<StoreWorker>,
    dispatcher: EditDispatcher,
    surface: InteractionSurface,
    request: BrowseRequest,
    query_text: String,
    rows: Vec<Row>,
    selected: usize,
    query: Option<LineEditor>,
    focus_tx: Sender<(TaskId, bool)>,
    focus_rx: Receiver<(TaskId, bool)>,
    focused: Option<TaskId>,
    layout: FrameLayout,
    status: Option<String>,
    should_quit: bool,
    tick_rate: Duration,
}

impl App {
    pub fn new(config: Arc<AppConfig>, storage: StorageHandle) -> Result<Self> {
        let worker =
            Arc::new(StoreWorker::spawn(storage.clone()).context("starting store worker")?);
        let dispatcher = EditDispatcher::new(worker.clone());
        let (focus_tx, focus_rx) = unbounded();
        let mut app = Self {
            strings: Strings::with_overrides(&config.strings),
            action_options: config.item.action_bar(),
            palette: Palette::for_theme(&config.theme),
            request: config.list.browse_request(),
            config,
            storage,
            worker,
            dispatcher,
            surface: InteractionSurface::new(),
            query_text: String::new(),
            rows: Vec::new(),
            selected: 0,
            query: None,
            focus_tx,
            focus_rx,
            focused: None,
            layout: FrameLayout::default(),
            status: None,
            should_quit: false,
            tick_rate: Duration::from_millis(250),
        };
        app.refresh(None)
            .context("loading tasks for initial state")?;
        Ok(app)
    }

    pub fn run(&mut self) -> Result<()> {
        let mut terminal = setup_terminal()?;
        let result = self.event_loop(&mut terminal);
        restore_terminal(&mut terminal)?;
        self.worker.shutdown();
        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        loop {
            let now = OffsetDateTime::now_utc();
            let mut layout = FrameLayout::default();
            terminal
                .draw(|frame| {
                    layout = ui::draw_app(frame, &self.screen(now));
                })
                .context("rendering frame")?;
            self.apply_layout(layout);

            if self.should_quit {
                break;
            }

            let timeout = self
                .tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(0));

            if event::poll(timeout).context("polling for terminal events")? {
                match event::read().context("reading terminal event")? {
                    Event::Key(key) => self.handle_key(key),
                    Event::Mouse(mouse) => self.handle_mouse(mouse),
                    _ => {}
                }
                self.drain_focus_events();
            }

            if last_tick.elapsed() >= self.tick_rate {
                self.on_tick();
                last_tick = Instant::now();
            }
        }
        Ok(())
    }

    fn screen(&self, now: OffsetDateTime) -> Screen<'_> {
        Screen {
            rows: &self.rows,
            selected: self.selected,
            focused: self.focused_index(),
            query: self.query.as_ref(),
            query_text: &self.query_text,
            status: self.status.as_deref(),
            strings: &self.strings,
            options: &self.action_options,
            palette: self.palette,
            now,
        }
    }

    /// Hands each row the region it was drawn at; rows scrolled out of view
    /// get an empty region so every interaction is outside them.
    fn apply_layout(&mut self, layout: FrameLayout) {
        for (index, row) in self.rows.iter().enumerate() {
            let region = layout
                .rows
                .iter()
                .find(|drawn| drawn.index == index)
                .map(|drawn| drawn.region)
                .unwrap_or_default();
            row.item.set_region(region);
        }
        self.layout = layout;
    }

    fn on_tick(&mut self) {
        self.drain_focus_events();
        self.drain_store_events();
    }

    fn drain_focus_events(&mut self) {
        let events: Vec<_> = self.focus_rx.try_iter().collect();
        for (id, focus) in events {
            tracing::trace!(task = %id, focus, "row focus changed");
            if focus {
                self.focused = Some(id);
                continue;
            }
            if self.focused.as_ref() == Some(&id) {
                self.focused = None;
            }
            if let Some(row) = self.rows.iter_mut().find(|row| row.item.task().id == id) {
                row.collapse();
            }
        }
    }

    fn drain_store_events(&mut self) {
        let mut needs_refresh = false;
        for event in self.worker.events().try_iter() {
            match event {
                DispatchEvent::Applied { .. } | DispatchEvent::Removed { .. } => {
                    needs_refresh = true;
                }
                DispatchEvent::Failed { message, .. } => {
                    self.status = Some(format!(
                        "{}: {message}",
                        self.strings.get(StringKey::StoreFailed)
                    ));
                    needs_refresh = true;
                }
            }
        }
        if needs_refresh {
            if let Err(err) = self.refresh(None) {
                tracing::error!(?err, "failed to refresh tasks after store update");
                self.status = Some(format!("Refresh failed: {err:#}"));
            }
        }
    }

    /// Reloads tasks and reconciles mounted rows: surviving tasks keep their
    /// row, new ones are mounted and the rest are dropped.
    fn refresh(&mut self, focus_new: Option<&TaskId>) -> Result<()> {
        let tasks = self.storage.fetch_tasks().context("loading tasks")?;
        let now = OffsetDateTime::now_utc();
        let visible: Vec<Task> = self
            .request
            .execute(&tasks, now)?
            .into_iter()
            .cloned()
            .collect();

        let selected_id = self
            .rows
            .get(self.selected)
            .map(|row| row.item.task().id.clone());
        let mut previous = std::mem::take(&mut self.rows);
        for task in visible {
            match previous
                .iter()
                .position(|row| row.item.task().id == task.id)
            {
                Some(pos) => {
                    let mut row = previous.swap_remove(pos);
                    row.sync_task(task);
                    self.rows.push(row);
                }
                None => {
                    let initial_focus = focus_new == Some(&task.id);
                    let row = self.mount_row(task, initial_focus);
                    self.rows.push(row);
                }
            }
        }
        drop(previous);

        let wanted = focus_new.cloned().or(selected_id);
        self.selected = wanted
            .and_then(|id| self.rows.iter().position(|row| row.item.task().id == id))
            .unwrap_or_else(|| self.selected.min(self.rows.len().saturating_sub(1)));
        Ok(())
    }

    fn mount_row(&mut self, task: Task, initial_focus: bool) -> Row {
        let tx = self.focus_tx.clone();
        let id = task.id.clone();
        if initial_focus {
            self.focused = Some(id.clone());
        }
        let props = ItemProps {
            initial_focus,
            on_focus_change: Some(Box::new(move |focus| {
                if tx.send((id.clone(), focus)).is_err() {
                    tracing::trace!("focus receiver dropped");
                }
            })),
            overlay_policy: self.config.item.overlay_policy,
        };
        Row::mount(task, props, &self.surface, self.dispatcher.clone())
    }

    fn focused_index(&self) -> Option<usize> {
        let focused = self.focused.as_ref()?;
        self.rows
            .iter()
            .position(|row| &row.item.task().id == focused && row.item.has_focus())
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if self.query.is_some() {
            self.handle_query_key(key);
            return;
        }

        let target = self.focused_index().or_else(|| {
            if self.rows.is_empty() {
                None
            } else {
                Some(self.selected)
            }
        });
        if let Some(index) = target {
            if let Some(field) = self.rows[index].picker_focus {
                self.handle_picker_key(index, field, key);
                return;
            }
            if self.rows[index].tag_input.is_some() {
                self.handle_tag_key(index, key);
                return;
            }
        }

        if let Some(index) = self.focused_index() {
            self.handle_row_key(index, key);
        } else if let Some(action) = Action::from_key(key) {
            self.handle_action(action);
        }
    }

    fn handle_action(&mut self, action: Action) {
        match action {
            Action::Quit => self.should_quit = true,
            Action::SelectNext => self.move_selection(1),
            Action::SelectPrevious => self.move_selection(-1),
            Action::FocusSelected => {
                if let Some(row) = self.rows.get_mut(self.selected) {
                    row.item.on_editor_focus_change(true);
                }
            }
            Action::NewTask => self.create_task(),
            Action::StartQuery => self.query = Some(LineEditor::new(self.query_text.clone())),
            Action::ToggleCompletion => {
                if let Some(row) = self.rows.get_mut(self.selected) {
                    row.item.toggle_completion();
                }
            }
            Action::Refresh => {
                if let Err(err) = self.refresh(None) {
                    tracing::error!(?err, "manual refresh failed");
                    self.status = Some(format!("Refresh failed: {err:#}"));
                }
            }
        }
    }

    fn move_selection(&mut self, delta: isize) {
        if self.rows.is_empty() {
            return;
        }
        if let Some(row) = self.rows.get_mut(self.selected) {
            row.item.set_focus(false);
        }
        let last = self.rows.len() - 1;
        self.selected = self.selected.saturating_add_signed(delta).min(last);
    }

    fn create_task(&mut self) {
        let created = self
            .storage
            .create_task("", &Default::default())
            .and_then(|task| {
                self.refresh(Some(&task.id))?;
                Ok(task)
            });
        match created {
            Ok(task) if self.rows.iter().any(|row| row.item.task().id == task.id) => {
                self.status = None;
            }
            Ok(_) => self.status = Some("Task created outside the current filter".into()),
            Err(err) => {
                tracing::error!(?err, "failed to create task");
                self.status = Some(format!("Create failed: {err:#}"));
            }
        }
    }

    fn handle_query_key(&mut self, key: KeyEvent) {
        let Some(query) = self.query.as_mut() else {
            return;
        };
        match key.code {
            KeyCode::Esc => self.query = None,
            KeyCode::Enter => {
                let text = query.buffer().trim().to_string();
                self.query = None;
                self.apply_query(text);
            }
            _ => {
                edit_line(query, key);
            }
        }
    }

    fn apply_query(&mut self, text: String) {
        let request = self.config.list.browse_request().with_query(&text);
        if let Err(err) = request.execute(&[], OffsetDateTime::now_utc()) {
            self.status = Some(format!("{err:#}"));
            return;
        }
        let previous = std::mem::replace(&mut self.request, request);
        if let Err(err) = self.refresh(None) {
            tracing::error!(?err, "failed to apply query");
            self.status = Some(format!("Query failed: {err:#}"));
            self.request = previous;
            return;
        }
        self.query_text = text;
        self.status = None;
    }

    fn handle_picker_key(&mut self, index: usize, field: DateField, key: KeyEvent) {
        let row = &mut self.rows[index];
        match key.code {
            KeyCode::Esc => row.dismiss_picker(field),
            KeyCode::Enter => {
                if !row.submit_picker(field, OffsetDateTime::now_utc()) {
                    self.status = row.picker(field).error().map(str::to_string);
                }
            }
            KeyCode::Tab => row.cycle_picker_focus(),
            KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                row.clear_picker(field);
            }
            _ => {
                edit_line(row.picker_mut(field).input_mut(), key);
            }
        }
    }

    fn handle_tag_key(&mut self, index: usize, key: KeyEvent) {
        let row = &mut self.rows[index];
        match key.code {
            KeyCode::Esc => row.tag_input = None,
            KeyCode::Enter => row.submit_tag_input(),
            _ => {
                if let Some(input) = row.tag_input.as_mut() {
                    edit_line(input, key);
                }
            }
        }
    }

    fn handle_row_key(&mut self, index: usize, key: KeyEvent) {
        let now = OffsetDateTime::now_utc();
        let entries = self.rows[index]
            .item
            .action_bar(now, &self.strings, &self.action_options)
            .entries;
        let row = &mut self.rows[index];
        match key.code {
            KeyCode::Esc if row.action_cursor.is_some() => row.action_cursor = None,
            KeyCode::Esc => {
                row.item.set_focus(false);
            }
            KeyCode::Tab => {
                row.action_cursor = Some(row.action_cursor.map_or(0, |i| (i + 1) % entries.len()));
            }
            KeyCode::BackTab => {
                let last = entries.len() - 1;
                row.action_cursor = Some(row.action_cursor.map_or(last, |i| {
                    if i == 0 {
                        last
                    } else {
                        i - 1
                    }
                }));
            }
            KeyCode::Enter => match row.action_cursor.and_then(|i| entries.get(i)) {
                Some(entry) => self.activate(index, entry.kind),
                None => {
                    row.item.set_focus(false);
                }
            },
            KeyCode::Up => self.move_selection(-1),
            KeyCode::Down => self.move_selection(1),
            _ => {
                row.edit_content(|editor| edit_line(editor, key));
            }
        }
    }

    fn activate(&mut self, index: usize, kind: ActionKind) {
        let Some(row) = self.rows.get_mut(index) else {
            return;
        };
        match kind {
            ActionKind::Complete => row.item.toggle_completion(),
            ActionKind::Date(field) if row.picker(field).is_open() => {
                row.item.close_overlay(field);
                row.sync_pickers();
            }
            ActionKind::Date(field) => row.open_picker(field),
            ActionKind::Tags => row.begin_tag_input(),
            ActionKind::Delete => row.item.delete(),
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        if !matches!(mouse.kind, MouseEventKind::Down(MouseButton::Left)) {
            return;
        }
        let point = Point::new(mouse.column, mouse.row);
        if self
            .layout
            .popup
            .map_or(false, |popup| popup.contains(point))
        {
            return;
        }

        self.surface.interact(point);
        for row in &mut self.rows {
            row.item.poll_surface();
        }

        let Some(drawn) = self
            .layout
            .rows
            .iter()
            .find(|drawn| drawn.region.contains(point))
        else {
            return;
        };
        let index = drawn.index;
        let entry = drawn
            .entries
            .iter()
            .position(|(_, region)| region.contains(point))
            .map(|position| (position, drawn.entries[position].0));

        self.selected = index;
        let Some(row) = self.rows.get_mut(index) else {
            return;
        };
        row.item.on_editor_focus_change(true);
        if let Some((position, kind)) = entry {
            row.action_cursor = Some(position);
            self.activate(index, kind);
        }
    }
}

/// Applies a cursor or text key to a line editor. Returns `true` when the
/// editor changed.
fn edit_line(editor: &mut LineEditor, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Char(ch)
            if !key
                .modifiers
                .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
        {
            editor.insert_char(ch)
        }
        KeyCode::Backspace => editor.backspace(),
        KeyCode::Delete => editor.delete(),
        KeyCode::Left => editor.move_left(),
        KeyCode::Right => editor.move_right(),
        KeyCode::Home => editor.move_home(),
        KeyCode::End => editor.move_end(),
        _ => false,
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
        .context("switching to alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("creating terminal backend")?;
    terminal.hide_cursor().context("hiding cursor")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    terminal.show_cursor().ok();
    disable_raw_mode().context("disabling raw mode")?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )
    .context("restoring screen state")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use tempfile::TempDir;

    use super::*;
    use crate::storage::tests::init_storage;
    use crate::ui::RowLayout;
    use crate::item::Region;

    fn app_with(tasks: &[(&str, &[&str])]) -> Result<(TempDir, App)> {
        let (temp, storage) = init_storage()?;
        for (content, tags) in tasks {
            let tags: BTreeSet<String> = tags.iter().map(|tag| tag.to_string()).collect();
            storage.create_task(content, &tags)?;
        }
        let app = App::new(Arc::new(AppConfig::default()), storage)?;
        Ok((temp, app))
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
        app.drain_focus_events();
    }

    fn type_text(app: &mut App, text: &str) {
        for ch in text.chars() {
            press(app, KeyCode::Char(ch));
        }
    }

    fn row_index(app: &App, content: &str) -> Option<usize> {
        app.rows
            .iter()
            .position(|row| row.item.task().content == content)
    }

    fn click(app: &mut App, x: u16, y: u16) {
        app.handle_mouse(MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column: x,
            row: y,
            modifiers: KeyModifiers::NONE,
        });
        app.drain_focus_events();
    }

    #[test]
    fn new_task_is_focused_and_typing_is_saved() -> Result<()> {
        let (_temp, mut app) = app_with(&[])?;
        press(&mut app, KeyCode::Char('n'));
        assert_eq!(app.rows.len(), 1);
        assert_eq!(app.focused_index(), Some(0));

        type_text(&mut app, "ab");
        let id = app.rows[0].item.task().id.clone();
        app.worker.shutdown();

        let stored = app.storage.fetch_task(&id)?.context("task present")?;
        assert_eq!(stored.content, "ab");
        Ok(())
    }

    #[test]
    fn escape_collapses_focus() -> Result<()> {
        let (_temp, mut app) = app_with(&[("water plants", &[])])?;
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.focused_index(), Some(0));
        press(&mut app, KeyCode::Esc);
        assert_eq!(app.focused_index(), None);
        assert!(app.focused.is_none());
        Ok(())
    }

    #[test]
    fn clicking_another_row_moves_focus() -> Result<()> {
        let (_temp, mut app) = app_with(&[("first", &[]), ("second", &[])])?;
        let first = row_index(&app, "first").context("first row")?;
        let second = row_index(&app, "second").context("second row")?;
        app.selected = first;
        press(&mut app, KeyCode::Enter);

        let rows = [(first, Region::new(0, 1, 20, 2)), (second, Region::new(0, 3, 20, 1))];
        app.apply_layout(FrameLayout {
            rows: rows
                .iter()
                .map(|(index, region)| RowLayout {
                    index: *index,
                    region: *region,
                    entries: Vec::new(),
                })
                .collect(),
            popup: None,
        });

        click(&mut app, 5, 3);
        assert!(!app.rows[first].item.has_focus());
        assert!(app.rows[second].item.has_focus());
        assert_eq!(app.focused_index(), Some(second));
        assert_eq!(app.selected, second);

        click(&mut app, 40, 20);
        assert_eq!(app.focused_index(), None);
        Ok(())
    }

    #[test]
    fn outside_click_closes_the_collapsed_rows_overlays() -> Result<()> {
        let (_temp, mut app) = app_with(&[("pay rent", &[])])?;
        press(&mut app, KeyCode::Enter);
        app.activate(0, ActionKind::Date(DateField::Due));
        assert!(app.rows[0].item.overlays().is_open(DateField::Due));

        app.apply_layout(FrameLayout {
            rows: vec![RowLayout {
                index: 0,
                region: Region::new(0, 1, 20, 2),
                entries: Vec::new(),
            }],
            popup: None,
        });
        click(&mut app, 40, 20);

        assert_eq!(app.focused_index(), None);
        assert!(app.rows[0].item.overlays().open_fields().is_empty());
        assert!(!app.rows[0].picker(DateField::Due).is_open());
        Ok(())
    }

    #[test]
    fn clicks_inside_a_popup_keep_focus() -> Result<()> {
        let (_temp, mut app) = app_with(&[("pay rent", &[])])?;
        press(&mut app, KeyCode::Enter);
        app.apply_layout(FrameLayout {
            rows: vec![RowLayout {
                index: 0,
                region: Region::new(0, 1, 20, 2),
                entries: Vec::new(),
            }],
            popup: Some(Region::new(30, 10, 20, 5)),
        });
        click(&mut app, 35, 12);
        assert_eq!(app.focused_index(), Some(0));
        Ok(())
    }

    #[test]
    fn picker_commits_date_through_worker() -> Result<()> {
        let (_temp, mut app) = app_with(&[("pay rent", &[])])?;
        press(&mut app, KeyCode::Enter);
        app.activate(0, ActionKind::Date(DateField::Due));
        assert!(app.rows[0].picker(DateField::Due).is_open());

        type_text(&mut app, "2024-03-01");
        press(&mut app, KeyCode::Enter);
        assert!(!app.rows[0].picker(DateField::Due).is_open());

        let id = app.rows[0].item.task().id.clone();
        app.worker.shutdown();
        let stored = app.storage.fetch_task(&id)?.context("task present")?;
        assert_eq!(
            stored.due,
            Some(time::macros::datetime!(2024-03-01 00:00 UTC))
        );
        Ok(())
    }

    #[test]
    fn invalid_picker_input_is_reported() -> Result<()> {
        let (_temp, mut app) = app_with(&[("pay rent", &[])])?;
        press(&mut app, KeyCode::Enter);
        app.activate(0, ActionKind::Date(DateField::Start));
        type_text(&mut app, "soon");
        press(&mut app, KeyCode::Enter);
        assert!(app.rows[0].picker(DateField::Start).is_open());
        assert!(app.status.is_some());
        press(&mut app, KeyCode::Esc);
        assert!(!app.rows[0].picker(DateField::Start).is_open());
        assert_eq!(app.focused_index(), Some(0));
        Ok(())
    }

    #[test]
    fn failed_store_request_sets_status() -> Result<()> {
        let (_temp, mut app) = app_with(&[("ghost", &[])])?;
        let id = app.rows[0].item.task().id.clone();
        app.storage.remove_task(&id)?;
        app.rows[0].item.toggle_completion();
        app.worker.shutdown();

        app.drain_store_events();
        let status = app.status.clone().context("status set")?;
        assert!(status.starts_with("Could not save change"));
        assert!(app.rows.is_empty());
        Ok(())
    }

    #[test]
    fn query_filters_rows_and_rejects_bad_patterns() -> Result<()> {
        let (_temp, mut app) = app_with(&[("Prepare talk", &["work"]), ("Buy milk", &["home"])])?;
        app.apply_query("tag:work".into());
        assert_eq!(app.rows.len(), 1);
        assert_eq!(app.query_text, "tag:work");

        app.apply_query("re:(".into());
        assert!(app.status.is_some());
        assert_eq!(app.rows.len(), 1);
        assert_eq!(app.query_text, "tag:work");
        Ok(())
    }
}
