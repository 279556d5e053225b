use crate::descriptor::{ArgKind, ToolArgument, ToolDescriptor};
use crate::error::ToolError;
use crate::execution_context::ExecutionContext;
use crate::tools::base::{parse_args, ToolHandler, ToolResult};
use async_trait::async_trait;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeDelta};
use serde::Deserialize;
use serde_json::{json, Map, Value};

const NAME: &str = "datetime";
const DEFAULT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        NAME,
        "Get current date/time, format dates, or calculate time differences.",
    )
    .arg(
        ToolArgument::required(
            "action",
            ArgKind::String,
            "Action: 'now' (current time), 'format' (format a date), 'diff' (time difference), 'add' (add to date)",
        )
        .one_of(&["now", "format", "diff", "add"]),
    )
    .arg(ToolArgument::optional(
        "date",
        ArgKind::String,
        "Date string for format/diff/add (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS)",
    ))
    .arg(
        ToolArgument::optional("format", ArgKind::String, "Output format using strftime codes")
            .with_default(json!(DEFAULT_FORMAT)),
    )
    .arg(
        ToolArgument::optional("days", ArgKind::Integer, "Days to add (for 'add', can be negative)")
            .with_default(json!(0)),
    )
    .arg(
        ToolArgument::optional("hours", ArgKind::Integer, "Hours to add (for 'add')")
            .with_default(json!(0)),
    )
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum Action {
    Now,
    Format,
    Diff,
    Add,
}

#[derive(Deserialize)]
struct DateTimeInput {
    action: Action,
    date: Option<String>,
    #[serde(default = "default_format")]
    format: String,
    #[serde(default)]
    days: i64,
    #[serde(default)]
    hours: i64,
}

fn default_format() -> String {
    DEFAULT_FORMAT.to_string()
}

pub struct DateTimeTool;

#[async_trait]
impl ToolHandler for DateTimeTool {
    async fn run(
        &self,
        _ctx: ExecutionContext,
        args: Map<String, Value>,
    ) -> Result<ToolResult, ToolError> {
        let input: DateTimeInput = parse_args(args)?;
        let outcome = evaluate(&input, Local::now());
        Ok(ToolResult::from_outcome(NAME, outcome))
    }
}

fn evaluate(input: &DateTimeInput, now: DateTime<Local>) -> Result<Value, ToolError> {
    let now_naive = now.naive_local();
    match input.action {
        Action::Now => Ok(json!({
            "iso": now.to_rfc3339(),
            "formatted": format_with(&now_naive, &input.format)?,
            "timestamp": now.timestamp(),
            "timezone": now.format("%:z").to_string(),
            "weekday": now.format("%A").to_string(),
        })),
        Action::Format => {
            let dt = match input.date.as_deref() {
                Some(date) => parse_date(date)?,
                None => now_naive,
            };
            Ok(json!({
                "input": input.date.as_deref().unwrap_or("now"),
                "formatted": format_with(&dt, &input.format)?,
            }))
        }
        Action::Diff => {
            let date = input
                .date
                .as_deref()
                .ok_or_else(|| ToolError::Validation("Date required for diff action".into()))?;
            let delta = now_naive - parse_date(date)?;
            let seconds = delta.num_seconds();
            Ok(json!({
                "from": date,
                "to": now_naive.format("%Y-%m-%dT%H:%M:%S").to_string(),
                "days": delta.num_days(),
                "hours": (seconds % 86_400) / 3_600,
                "minutes": (seconds % 3_600) / 60,
                "total_seconds": seconds,
                "human": humanize(seconds),
            }))
        }
        Action::Add => {
            let base = match input.date.as_deref() {
                Some(date) => parse_date(date)?,
                None => now_naive,
            };
            let delta = TimeDelta::try_days(input.days)
                .zip(TimeDelta::try_hours(input.hours))
                .and_then(|(d, h)| d.checked_add(&h))
                .ok_or_else(|| ToolError::Validation("Offset out of range".into()))?;
            let result = base
                .checked_add_signed(delta)
                .ok_or_else(|| ToolError::Validation("Resulting date out of range".into()))?;
            Ok(json!({
                "original": base.format("%Y-%m-%dT%H:%M:%S").to_string(),
                "added": format!("{} days, {} hours", input.days, input.hours),
                "result": result.format("%Y-%m-%dT%H:%M:%S").to_string(),
                "formatted": format_with(&result, &input.format)?,
            }))
        }
    }
}

fn parse_date(text: &str) -> Result<NaiveDateTime, ToolError> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.naive_local());
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, pattern) {
            return Ok(dt);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| ToolError::Validation(format!("Invalid date format: {}", text)))
}

/// Formats with a user-supplied strftime string, rejecting unknown
/// specifiers instead of panicking inside `Display`.
fn format_with(dt: &NaiveDateTime, format: &str) -> Result<String, ToolError> {
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(ToolError::Validation(format!("Invalid format string: {}", format)));
    }
    Ok(dt.format_with_items(items.into_iter()).to_string())
}

fn humanize(total_seconds: i64) -> String {
    if total_seconds < 0 {
        return format!("{} seconds in the future", total_seconds.unsigned_abs());
    }
    match total_seconds {
        s if s < 60 => format!("{} seconds ago", s),
        s if s < 3_600 => format!("{} minutes ago", s / 60),
        s if s < 86_400 => format!("{} hours ago", s / 3_600),
        s => format!("{} days ago", s / 86_400),
    }
}
