use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;
use time::OffsetDateTime;
use unicode_width::UnicodeWidthStr;

use crate::app::state::{LineEditor, Row};
use crate::config::themes::Palette;
use crate::item::{ActionBarOptions, ActionBarView, ActionKind, Region};
use crate::strings::{StringKey, Strings};

const CHECKBOX_WIDTH: u16 = 4;
const ENTRY_SEPARATOR: &str = " │ ";

/// Everything one frame is drawn from.
pub struct Screen<'a> {
    pub rows: &'a [Row],
    pub selected: usize,
    pub focused: Option<usize>,
    pub query: Option<&'a LineEditor>,
    pub query_text: &'a str,
    pub status: Option<&'a str>,
    pub strings: &'a Strings,
    pub options: &'a ActionBarOptions,
    pub palette: Palette,
    pub now: OffsetDateTime,
}

/// Where things ended up on screen, fed back into hit testing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameLayout {
    pub rows: Vec<RowLayout>,
    pub popup: Option<Region>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowLayout {
    pub index: usize,
    pub region: Region,
    pub entries: Vec<(ActionKind, Region)>,
}

impl From<Rect> for Region {
    fn from(rect: Rect) -> Self {
        Region::new(rect.x, rect.y, rect.width, rect.height)
    }
}

pub fn draw_app(frame: &mut Frame, screen: &Screen<'_>) -> FrameLayout {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(2)])
        .split(frame.size());

    let title = if screen.query_text.is_empty() {
        "Tasks".to_string()
    } else {
        format!("Tasks · {}", screen.query_text)
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(screen.palette.accent));
    let list_area = block.inner(vertical[0]);
    frame.render_widget(block, vertical[0]);

    let mut layout = FrameLayout::default();
    if screen.rows.is_empty() {
        frame.render_widget(
            Paragraph::new(Span::styled(
                "No tasks. Press n to capture one.",
                Style::default().fg(screen.palette.muted),
            )),
            list_area,
        );
    } else {
        layout.rows = draw_rows(frame, screen, list_area);
    }

    let tooltip = draw_action_cursor_tooltip(screen);
    draw_status(frame, screen, vertical[1], tooltip.as_deref());
    layout.popup = draw_popup(frame, screen);
    layout
}

fn draw_rows(frame: &mut Frame, screen: &Screen<'_>, area: Rect) -> Vec<RowLayout> {
    let heights: Vec<u16> = (0..screen.rows.len())
        .map(|index| row_height(screen.focused == Some(index)))
        .collect();
    let first = first_visible(&heights, screen.selected, area.height);

    let mut drawn = Vec::new();
    let mut y = area.y;
    let bottom = area.y.saturating_add(area.height);
    for (index, row) in screen.rows.iter().enumerate().skip(first) {
        let height = heights[index];
        if y.saturating_add(height) > bottom {
            break;
        }
        let region = Rect::new(area.x, y, area.width, height);
        drawn.push(draw_row(frame, screen, index, row, region));
        y += height;
    }
    drawn
}

fn row_height(focused: bool) -> u16 {
    if focused {
        2
    } else {
        1
    }
}

/// First row index to draw so that `selected` fits in `available` lines.
fn first_visible(heights: &[u16], selected: usize, available: u16) -> usize {
    if heights.is_empty() {
        return 0;
    }
    let selected = selected.min(heights.len() - 1);
    let mut first = 0;
    let mut used: u32 = heights[..=selected]
        .iter()
        .map(|h| u32::from(*h))
        .sum();
    while used > u32::from(available) && first < selected {
        used -= u32::from(heights[first]);
        first += 1;
    }
    first
}

fn draw_row(
    frame: &mut Frame,
    screen: &Screen<'_>,
    index: usize,
    row: &Row,
    area: Rect,
) -> RowLayout {
    let task = row.item.task();
    let focused = screen.focused == Some(index);
    let view = row
        .item
        .action_bar(screen.now, screen.strings, screen.options);

    let mut content_style = Style::default();
    if view.strikethrough {
        content_style = content_style
            .add_modifier(Modifier::CROSSED_OUT)
            .fg(screen.palette.muted);
    } else if view.deferred {
        content_style = content_style.fg(screen.palette.deferred);
    }
    if index == screen.selected && !focused {
        content_style = content_style.add_modifier(Modifier::REVERSED);
    }

    let checkbox = if task.completed { "[x] " } else { "[ ] " };
    let text = if focused {
        row.editor.buffer()
    } else {
        task.content.as_str()
    };
    let mut spans = vec![Span::styled(checkbox, Style::default().fg(screen.palette.accent))];
    if text.is_empty() && !focused {
        spans.push(Span::styled(
            "(empty)",
            Style::default()
                .fg(screen.palette.muted)
                .add_modifier(Modifier::ITALIC),
        ));
    } else {
        spans.push(Span::styled(text.to_string(), content_style));
    }
    if !focused && !task.tags.is_empty() {
        let tags = task
            .tags
            .iter()
            .map(|tag| format!("#{tag}"))
            .collect::<Vec<_>>()
            .join(" ");
        spans.push(Span::styled(
            format!("  {tags}"),
            Style::default().fg(screen.palette.muted),
        ));
    }
    if view.deferred {
        spans.push(Span::styled(
            format!("  {}", screen.strings.get(StringKey::DeferredBadge)),
            Style::default()
                .fg(screen.palette.deferred)
                .add_modifier(Modifier::ITALIC),
        ));
    }

    let line_area = Rect::new(area.x, area.y, area.width, 1);
    frame.render_widget(Paragraph::new(Line::from(spans)), line_area);

    let mut entries = Vec::new();
    if focused && view.visible && area.height > 1 {
        let bar_area = Rect::new(area.x, area.y + 1, area.width, 1);
        entries = draw_action_bar(frame, screen, &view, row.action_cursor, bar_area);
        if row.picker_focus.is_none() && row.tag_input.is_none() && screen.query.is_none() {
            let column = (row.editor.cursor_column() as u16).saturating_add(CHECKBOX_WIDTH);
            let x = area.x.saturating_add(column.min(area.width.saturating_sub(1)));
            frame.set_cursor(x, area.y);
        }
    }

    RowLayout {
        index,
        region: area.into(),
        entries,
    }
}

fn draw_action_bar(
    frame: &mut Frame,
    screen: &Screen<'_>,
    view: &ActionBarView,
    cursor: Option<usize>,
    area: Rect,
) -> Vec<(ActionKind, Region)> {
    let mut spans = vec![Span::raw("    ")];
    let mut regions = Vec::with_capacity(view.entries.len());
    let mut x = area.x.saturating_add(CHECKBOX_WIDTH);
    let right = area.x.saturating_add(area.width);

    for (position, entry) in view.entries.iter().enumerate() {
        if position > 0 {
            spans.push(Span::styled(
                ENTRY_SEPARATOR,
                Style::default().fg(screen.palette.muted),
            ));
            x = x.saturating_add(ENTRY_SEPARATOR.width() as u16);
        }
        let mut style = Style::default().fg(screen.palette.muted);
        if entry.active {
            style = style.fg(screen.palette.active).add_modifier(Modifier::BOLD);
        }
        if cursor == Some(position) {
            style = style.add_modifier(Modifier::UNDERLINED);
        }
        let width = entry.label.width() as u16;
        if x < right {
            let visible = width.min(right - x);
            regions.push((entry.kind, Region::new(x, area.y, visible, 1)));
        }
        spans.push(Span::styled(entry.label.clone(), style));
        x = x.saturating_add(width);
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
    regions
}

/// Only the focused row's bar feeds the shared tooltip line.
fn draw_action_cursor_tooltip(screen: &Screen<'_>) -> Option<String> {
    let index = screen.focused?;
    let row = screen.rows.get(index)?;
    let cursor = row.action_cursor?;
    let view = row
        .item
        .action_bar(screen.now, screen.strings, screen.options);
    view.active_tooltip(cursor, screen.options).map(str::to_string)
}

fn draw_status(frame: &mut Frame, screen: &Screen<'_>, area: Rect, tooltip: Option<&str>) {
    let lines = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(area);

    if let Some(query) = screen.query {
        let prompt = "/ ";
        frame.render_widget(
            Paragraph::new(Line::from(vec![
                Span::styled(prompt, Style::default().fg(screen.palette.accent)),
                Span::raw(query.buffer().to_string()),
            ])),
            lines[0],
        );
        let column = (prompt.width() + query.cursor_column()) as u16;
        frame.set_cursor(
            lines[0].x.saturating_add(column.min(lines[0].width.saturating_sub(1))),
            lines[0].y,
        );
    } else {
        let position = if screen.rows.is_empty() {
            "0/0".to_string()
        } else {
            format!("{}/{}", screen.selected + 1, screen.rows.len())
        };
        frame.render_widget(
            Paragraph::new(Line::from(vec![
                Span::raw("Tasks: "),
                Span::styled(position, Style::default().add_modifier(Modifier::BOLD)),
                Span::styled(
                    "  n new · e edit · x done · / filter · q quit",
                    Style::default().fg(screen.palette.muted),
                ),
            ])),
            lines[0],
        );
    }

    let message = match (screen.status, tooltip) {
        (Some(status), _) => Span::styled(
            status.to_string(),
            Style::default().fg(screen.palette.error),
        ),
        (None, Some(tooltip)) => {
            Span::styled(tooltip.to_string(), Style::default().fg(screen.palette.accent))
        }
        (None, None) => Span::raw(""),
    };
    frame.render_widget(Paragraph::new(Line::from(message)), lines[1]);
}

fn draw_popup(frame: &mut Frame, screen: &Screen<'_>) -> Option<Region> {
    let index = screen.focused.or(Some(screen.selected))?;
    let row = screen.rows.get(index)?;

    if let Some(input) = &row.tag_input {
        let area = centered_rect(50, 20, frame.size());
        frame.render_widget(Clear, area);
        let paragraph = Paragraph::new(vec![
            Line::from(input.buffer().to_string()),
            Line::from(""),
            Line::from(Span::styled(
                "Enter to save • Esc to cancel",
                Style::default().fg(screen.palette.muted),
            )),
        ])
        .block(popup_block(screen, screen.strings.get(StringKey::TooltipTags)));
        frame.render_widget(paragraph, area);
        place_cursor(frame, area, 0, input);
        return Some(area.into());
    }

    let open: Vec<_> = row.open_pickers().collect();
    if open.is_empty() {
        return None;
    }
    let area = centered_rect(60, 40, frame.size());
    frame.render_widget(Clear, area);

    let mut lines = Vec::new();
    let mut cursor_line = None;
    for picker in &open {
        let field = picker.field();
        let focused = row.picker_focus == Some(field);
        let title_style = if focused {
            Style::default()
                .fg(screen.palette.active)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(screen.palette.muted)
        };
        lines.push(Line::from(Span::styled(field.to_string(), title_style)));
        if focused {
            cursor_line = Some(lines.len() as u16);
        }
        lines.push(Line::from(picker.input().buffer().to_string()));
        if let Some(error) = picker.error() {
            lines.push(Line::from(Span::styled(
                error.to_string(),
                Style::default().fg(screen.palette.error),
            )));
        }
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Enter to set • Ctrl-d to clear • Tab to switch • Esc to close",
        Style::default().fg(screen.palette.muted),
    )));

    let paragraph = Paragraph::new(lines)
        .block(popup_block(screen, "Dates"))
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);

    if let (Some(line), Some(field)) = (cursor_line, row.picker_focus) {
        place_cursor(frame, area, line, row.picker(field).input());
    }
    Some(area.into())
}

fn popup_block<'a>(screen: &Screen<'_>, title: &'a str) -> Block<'a> {
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(screen.palette.accent))
}

/// Puts the terminal cursor on `line` inside a bordered popup.
fn place_cursor(frame: &mut Frame, area: Rect, line: u16, editor: &LineEditor) {
    let inner_width = area.width.saturating_sub(2);
    let column = (editor.cursor_column() as u16).min(inner_width.saturating_sub(1));
    frame.set_cursor(
        area.x.saturating_add(1).saturating_add(column),
        area.y.saturating_add(1).saturating_add(line),
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Percentage((100 - percent_y) / 2),
                Constraint::Percentage(percent_y),
                Constraint::Percentage((100 - percent_y) / 2),
            ]
            .as_ref(),
        )
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Percentage((100 - percent_x) / 2),
                Constraint::Percentage(percent_x),
                Constraint::Percentage((100 - percent_x) / 2),
            ]
            .as_ref(),
        )
        .split(vertical[1])[1]
}
