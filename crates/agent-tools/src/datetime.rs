//! DateTime Tool

use agent_core::{FunctionTool, Schema};
use chrono::{DateTime, FixedOffset, Utc};
use serde_json::{Value, json};

pub const NAME: &str = "datetime";

/// `datetime {format?, utc_offset_hours?}`
pub fn datetime_tool() -> FunctionTool {
    FunctionTool::from_fn(
        NAME,
        "Get the current date and time",
        Schema::object([
            (
                "format",
                Schema::enumeration(["iso", "human", "unix"])
                    .description("Output format")
                    .default("human")
                    .optional(),
            ),
            (
                "utc_offset_hours",
                Schema::integer()
                    .min(-12)
                    .max(14)
                    .description("Offset from UTC in whole hours (default: 0)")
                    .optional(),
            ),
        ]),
        |args, _ctx| {
            let format = args.get("format").and_then(Value::as_str).unwrap_or("human");
            let offset_hours = args
                .get("utc_offset_hours")
                .and_then(Value::as_i64)
                .unwrap_or_default();
            let offset = i32::try_from(offset_hours * 3600)
                .ok()
                .and_then(FixedOffset::east_opt)
                .ok_or_else(|| anyhow::anyhow!("Invalid UTC offset: {offset_hours}"))?;

            Ok(json!(render(Utc::now().with_timezone(&offset), format)))
        },
    )
}

fn render(now: DateTime<FixedOffset>, format: &str) -> String {
    match format {
        "iso" => now.to_rfc3339(),
        "unix" => now.timestamp().to_string(),
        _ => now.format("%A, %B %d, %Y at %H:%M:%S (UTC%:z)").to_string(),
    }
}
