use std::cmp::Ordering;
use std::collections::BTreeSet;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;

use crate::model::Task;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum Availability {
    All,
    #[default]
    Incomplete,
    /// Not completed and already started (or never given a start).
    Available,
    Done,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum OrderType {
    #[default]
    Captured,
    Start,
    Due,
    Scheduled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderRequest {
    pub order: OrderType,
    pub ascending: bool,
}

/// Oldest captured first unless asked otherwise.
impl Default for OrderRequest {
    fn default() -> Self {
        Self {
            order: OrderType::Captured,
            ascending: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowseRequest {
    pub availability: Availability,
    pub order: OrderRequest,
    pub tags: Vec<String>,
    pub query_regexp: Option<String>,
    pub query_text: Option<String>,
}

impl BrowseRequest {
    /// Merges filters typed into a query line: `tag:name`, `re:pattern`, and
    /// free text that is matched as a substring.
    pub fn with_query(mut self, input: &str) -> Self {
        let mut words = Vec::new();
        for raw in input.split_whitespace() {
            if let Some(tag) = raw.strip_prefix("tag:") {
                if let Some(value) = sanitize_tag(tag) {
                    self.tags.push(value);
                }
                continue;
            }
            if let Some(pattern) = raw.strip_prefix("re:") {
                if !pattern.is_empty() {
                    self.query_regexp = Some(pattern.to_string());
                }
                continue;
            }
            words.push(raw);
        }
        if !words.is_empty() {
            self.query_text = Some(words.join(" "));
        }
        self
    }

    pub fn has_filters(&self) -> bool {
        !self.tags.is_empty() || self.query_regexp.is_some() || self.query_text.is_some()
    }

    /// Filters and orders `tasks`. Fails only when `query_regexp` does not compile.
    pub fn execute<'a>(&self, tasks: &'a [Task], now: OffsetDateTime) -> Result<Vec<&'a Task>> {
        let pattern = self
            .query_regexp
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern).with_context(|| format!("compiling query pattern '{pattern}'"))
            })
            .transpose()?;
        let needle = self.query_text.as_deref().map(str::to_lowercase);
        let wanted: BTreeSet<String> = self.tags.iter().map(|tag| tag.to_lowercase()).collect();

        let mut matched: Vec<&Task> = tasks
            .iter()
            .filter(|task| self.availability_matches(task, now))
            .filter(|task| {
                wanted.is_empty() || {
                    let carried: BTreeSet<String> =
                        task.tags.iter().map(|tag| tag.to_lowercase()).collect();
                    wanted.is_subset(&carried)
                }
            })
            .filter(|task| pattern.as_ref().map_or(true, |re| re.is_match(&task.content)))
            .filter(|task| {
                needle
                    .as_deref()
                    .map_or(true, |needle| task.content.to_lowercase().contains(needle))
            })
            .collect();

        matched.sort_by(|a, b| compare(self.order.order, a, b));
        if !self.order.ascending {
            matched.reverse();
        }
        tracing::trace!(
            total = tasks.len(),
            matched = matched.len(),
            availability = %self.availability,
            order = %self.order.order,
            "browse executed"
        );
        Ok(matched)
    }

    fn availability_matches(&self, task: &Task, now: OffsetDateTime) -> bool {
        match self.availability {
            Availability::All => true,
            Availability::Incomplete => !task.completed,
            Availability::Available => {
                !task.completed && task.start.map_or(true, |start| start < now)
            }
            Availability::Done => task.completed,
        }
    }
}

fn compare(order: OrderType, a: &Task, b: &Task) -> Ordering {
    let key: fn(&Task) -> Option<OffsetDateTime> = match order {
        OrderType::Captured => return a.captured.cmp(&b.captured),
        OrderType::Start => |task: &Task| task.start,
        OrderType::Due => |task: &Task| task.due,
        OrderType::Scheduled => |task: &Task| task.schedule,
    };
    let by_date = match (key(a), key(b)) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_date.then_with(|| a.captured.cmp(&b.captured))
}

fn sanitize_tag(raw: &str) -> Option<String> {
    let tag: String = raw
        .chars()
        .filter(|ch| ch.is_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/'))
        .collect();
    if tag.is_empty() {
        None
    } else {
        Some(tag)
    }
}
