//! Output rendering for log records
//!
//! One rendering mode is picked at configuration time and applied to every
//! record. `Plain` produces a single human-readable line; `Json` produces one
//! JSON object per line.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;

use crate::record::LogRecord;

/// Rendering mode for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    /// `<timestamp> <LEVEL> <topic> [<username>] <message>`
    #[default]
    Plain,
    /// JSON lines
    Json,
}

impl RecordFormat {
    /// Render a record as a single line (no trailing newline)
    pub fn render(&self, record: &LogRecord) -> String {
        match self {
            RecordFormat::Plain => render_plain(record),
            RecordFormat::Json => render_json(record),
        }
    }
}

impl FromStr for RecordFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "text" => Ok(RecordFormat::Plain),
            "json" => Ok(RecordFormat::Json),
            other => Err(format!("unknown record format '{}'", other)),
        }
    }
}

fn render_plain(record: &LogRecord) -> String {
    let mut line = format!(
        "{} {:<5} {}",
        record.timestamp().to_rfc3339(),
        record.level(),
        record.topic()
    );
    let ctx = record.context();
    if !ctx.username.is_empty() {
        line.push_str(" [");
        line.push_str(&ctx.username);
        if !ctx.source_address.is_empty() {
            line.push_str(" at ");
            line.push_str(&ctx.source_address);
        }
        line.push(']');
    }
    line.push_str(", ");
    line.push_str(record.message());
    if let Some(throwable) = record.throwable() {
        line.push_str(", error: ");
        line.push_str(&throwable.cause_messages().join(" <- "));
    }
    line
}

fn render_json(record: &LogRecord) -> String {
    let ctx = record.context();
    let mut value = json!({
        "timestamp": record.timestamp().to_rfc3339(),
        "level": record.level().as_str(),
        "topic": record.topic(),
        "message": record.message(),
    });
    if let Some(obj) = value.as_object_mut() {
        for (key, field) in [
            ("session_id", &ctx.session_id),
            ("request_id", &ctx.request_id),
            ("username", &ctx.username),
            ("domain", &ctx.domain),
            ("source_address", &ctx.source_address),
        ] {
            if !field.is_empty() {
                obj.insert(key.to_string(), json!(field));
            }
        }
        if let Some(throwable) = record.throwable() {
            obj.insert("error".to_string(), json!(throwable.cause_messages()));
        }
    }
    value.to_string()
}
