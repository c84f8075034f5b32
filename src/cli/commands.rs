use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::io::{self, Read};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use serde_json::{json, Value};
use time::OffsetDateTime;

use crate::app::App;
use crate::config::AppConfig;
use crate::format;
use crate::item::{is_deferred, EditDispatcher, EditIntent};
use crate::model::{encoding, DateField, Task};
use crate::search::{Availability, OrderType};
use crate::storage::{DispatchEvent, StorageHandle, StoreWorker};

const SHORT_ID_LEN: usize = 8;

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    /// Task text. If omitted, reads from stdin.
    #[arg()]
    pub content: Vec<String>,
    /// Tag to attach (repeatable)
    #[arg(long = "tag", short)]
    pub tags: Vec<String>,
    /// Due instant (RFC 3339)
    #[arg(long)]
    pub due: Option<String>,
    /// Start instant (RFC 3339)
    #[arg(long)]
    pub start: Option<String>,
    /// Scheduled instant (RFC 3339); also locks the task
    #[arg(long)]
    pub schedule: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Query terms (supports tag:name and re:pattern)
    #[arg()]
    pub query: Vec<String>,
    /// all, incomplete, available or done (defaults to the config value)
    #[arg(long)]
    pub availability: Option<Availability>,
    /// captured, start, due or scheduled (defaults to the config value)
    #[arg(long)]
    pub order: Option<OrderType>,
    /// Reverse the order
    #[arg(long)]
    pub descending: bool,
    /// Print tasks as JSON using the patch wire encoding for dates
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DateArgs {
    /// Task id or unique id prefix
    pub id: String,
    /// schedule, start or due
    pub field: DateField,
    /// New instant (RFC 3339); omit together with --clear to remove the date
    pub value: Option<String>,
    #[arg(long, conflicts_with = "value")]
    pub clear: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DoneArgs {
    /// Task id or unique id prefix
    pub id: String,
}

#[derive(Args, Debug, Clone)]
pub struct RemoveArgs {
    /// Task id or unique id prefix
    pub id: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum TagCommand {
    /// Replace a task's tags
    Set(TagSetArgs),
    /// List every tag attached to at least one task
    List,
}

#[derive(Args, Debug, Clone)]
pub struct TagSetArgs {
    /// Task id or unique id prefix
    pub id: String,
    /// New tags; none clears them
    pub tags: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct TagArgs {
    #[command(subcommand)]
    pub command: TagCommand,
}

pub fn run_tui(app: &mut App) -> Result<()> {
    app.run()
}

pub fn add_task(storage: &StorageHandle, args: AddArgs) -> Result<()> {
    let content = if args.content.is_empty() {
        read_stdin()?.unwrap_or_default()
    } else {
        args.content.join(" ")
    };
    let content = content.trim();
    if content.is_empty() {
        bail!("task content cannot be empty");
    }

    let mut intents = Vec::new();
    for (field, raw) in [
        (DateField::Schedule, &args.schedule),
        (DateField::Start, &args.start),
        (DateField::Due, &args.due),
    ] {
        if let Some(raw) = raw {
            let at = format::parse_instant(raw).with_context(|| format!("reading --{field}"))?;
            intents.push(EditIntent::Date(field, Some(at)));
        }
    }

    let task = storage
        .create_task(content, &normalize_tags(&args.tags))
        .context("creating task")?;
    dispatch_and_flush(storage, &task, intents)?;
    println!("Created task {}", short_id(&task));
    Ok(())
}

pub fn list_tasks(config: &AppConfig, storage: &StorageHandle, args: ListArgs) -> Result<()> {
    let output = run_list(config, storage, &args, OffsetDateTime::now_utc())?;
    print!("{output}");
    Ok(())
}

fn run_list(
    config: &AppConfig,
    storage: &StorageHandle,
    args: &ListArgs,
    now: OffsetDateTime,
) -> Result<String> {
    let mut request = config.list.browse_request().with_query(&args.query.join(" "));
    if let Some(availability) = args.availability {
        request.availability = availability;
    }
    if let Some(order) = args.order {
        request.order.order = order;
    }
    if args.descending {
        request.order.ascending = !request.order.ascending;
    }

    let tasks = storage.fetch_tasks().context("loading tasks")?;
    let matched = request.execute(&tasks, now)?;
    if args.json {
        let value = tasks_to_json(&matched)?;
        return Ok(format!("{}\n", serde_json::to_string_pretty(&value)?));
    }
    Ok(format_tasks(&matched, now, &config.item.date_pattern))
}

fn tasks_to_json(tasks: &[&Task]) -> Result<Value> {
    tasks
        .iter()
        .map(|task| -> Result<Value> {
            let start = task
                .start
                .map(|at| encoding::format_naive(encoding::strip_offset(at)))
                .transpose()
                .context("formatting start date")?;
            Ok(json!({
                "id": task.id,
                "content": task.content,
                "tags": task.tags,
                "schedule": task.schedule.map(encoding::epoch_millis),
                "start": start,
                "due": task.due.map(encoding::epoch_millis),
                "completed": task.completed,
                "locked": task.locked,
                "captured": encoding::epoch_millis(task.captured),
            }))
        })
        .collect::<Result<Vec<_>>>()
        .map(Value::Array)
}

fn format_tasks(tasks: &[&Task], now: OffsetDateTime, pattern: &str) -> String {
    if tasks.is_empty() {
        return "No matching tasks.\n".to_string();
    }
    let mut out = String::new();
    for task in tasks {
        let mark = if task.completed { "x" } else { " " };
        let mut headline = format!("{}  [{mark}] {}", short_id(task), task.content);
        if !task.tags.is_empty() {
            let tags: Vec<_> = task.tags.iter().map(|tag| format!("#{tag}")).collect();
            let _ = write!(headline, "  {}", tags.join(" "));
        }
        if is_deferred(task.start, now) {
            headline.push_str("  [DEFERRED]");
        }
        let _ = writeln!(&mut out, "{headline}");

        let mut dates = Vec::new();
        if let Some(at) = task.schedule {
            dates.push(format!("scheduled {}", format::relative(at, now)));
        }
        if let Some(at) = task.start {
            dates.push(format!("start {}", format::pattern(at, pattern)));
        }
        if let Some(at) = task.due {
            dates.push(format!("due {}", format::pattern(at, pattern)));
        }
        if !dates.is_empty() {
            let _ = writeln!(&mut out, "{:width$}  {}", "", dates.join(", "), width = SHORT_ID_LEN);
        }
    }
    out
}

pub fn set_date(storage: &StorageHandle, args: DateArgs) -> Result<()> {
    let task = resolve_task(storage, &args.id)?;
    let value = match (&args.value, args.clear) {
        (Some(raw), _) => Some(format::parse_instant(raw)?),
        (None, true) => None,
        (None, false) => bail!("pass a date or --clear"),
    };
    dispatch_and_flush(storage, &task, vec![EditIntent::Date(args.field, value)])?;
    match value {
        Some(_) => println!("Set {} on task {}", args.field, short_id(&task)),
        None => println!("Cleared {} on task {}", args.field, short_id(&task)),
    }
    Ok(())
}

pub fn toggle_done(storage: &StorageHandle, args: DoneArgs) -> Result<()> {
    let task = resolve_task(storage, &args.id)?;
    dispatch_and_flush(
        storage,
        &task,
        vec![EditIntent::ToggleCompletion {
            current: task.completed,
        }],
    )?;
    let state = if task.completed { "reopened" } else { "completed" };
    println!("Task {} {state}", short_id(&task));
    Ok(())
}

pub fn remove_task(storage: &StorageHandle, args: RemoveArgs) -> Result<()> {
    let task = resolve_task(storage, &args.id)?;
    dispatch_and_flush(storage, &task, vec![EditIntent::Delete])?;
    println!("Removed task {} ({})", short_id(&task), task.content);
    Ok(())
}

pub fn handle_tag_command(storage: &StorageHandle, args: TagArgs) -> Result<()> {
    match args.command {
        TagCommand::Set(args) => {
            let task = resolve_task(storage, &args.id)?;
            let tags = normalize_tags(&args.tags);
            let count = tags.len();
            dispatch_and_flush(storage, &task, vec![EditIntent::Tags(tags)])?;
            println!("Task {} now has {count} tag(s)", short_id(&task));
            Ok(())
        }
        TagCommand::List => {
            let tags = storage.list_all_tags()?;
            if tags.is_empty() {
                println!("(no tags)");
            }
            for tag in tags {
                println!("- {tag}");
            }
            Ok(())
        }
    }
}

/// Sends `intents` through a dispatcher backed by a fresh worker and waits
/// for the worker to drain. The first failure becomes the command's error.
fn dispatch_and_flush(
    storage: &StorageHandle,
    task: &Task,
    intents: Vec<EditIntent>,
) -> Result<()> {
    if intents.is_empty() {
        return Ok(());
    }
    let worker = Arc::new(StoreWorker::spawn(storage.clone())?);
    let dispatcher = EditDispatcher::new(worker.clone());
    for intent in intents {
        dispatcher.dispatch(&task.id, intent);
    }
    worker.shutdown();

    for event in worker.events().try_iter() {
        if let DispatchEvent::Failed { message, .. } = event {
            bail!("store rejected the change: {message}");
        }
    }
    Ok(())
}

fn resolve_task(storage: &StorageHandle, prefix: &str) -> Result<Task> {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        bail!("task id cannot be empty");
    }
    let mut matches: Vec<Task> = storage
        .fetch_tasks()?
        .into_iter()
        .filter(|task| task.id.as_str().starts_with(prefix))
        .collect();
    match matches.len() {
        0 => bail!("no task with id {prefix}"),
        1 => Ok(matches.remove(0)),
        n => bail!("id prefix {prefix} matches {n} tasks"),
    }
}

fn normalize_tags(raw: &[String]) -> BTreeSet<String> {
    raw.iter()
        .map(|tag| tag.trim().trim_start_matches('#').to_string())
        .filter(|tag| !tag.is_empty())
        .collect()
}

fn short_id(task: &Task) -> &str {
    let id = task.id.as_str();
    id.get(..SHORT_ID_LEN).unwrap_or(id)
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(Some(buf))
}
