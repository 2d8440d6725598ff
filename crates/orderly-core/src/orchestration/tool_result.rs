//! Tool result formatting
//!
//! Provides consistent formatting of routed tool calls for LLM consumption.

use serde_json::Value;

use super::events::ToolCallRecord;

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Format one record as a line the model can read
pub fn format_record(record: &ToolCallRecord) -> String {
    let prefix = if record.fallback { "[fallback] " } else { "" };
    match (&record.result, &record.error) {
        (_, Some(error)) if record.blocked => {
            format!("{}{} was not run: {}", prefix, record.tool_name, error)
        }
        (_, Some(error)) => format!("{}{} failed: {}", prefix, record.tool_name, error),
        (Some(result), None) => format!("{}{} returned: {}", prefix, record.tool_name, render_value(result)),
        (None, None) => format!("{}{} returned nothing", prefix, record.tool_name),
    }
}

/// Format everything that happened for one requested call
///
/// The requested call and any calls the fallback policy made on its behalf
/// are reported together, so the model sees the cart and search results it
/// did not ask for.
pub fn format_tool_result_for_llm(tool_call_id: &str, records: &[ToolCallRecord]) -> String {
    let body = records.iter().map(format_record).collect::<Vec<_>>().join("\n");
    format!("[Tool result for {}]\n{}\n[End of tool result]", tool_call_id, body)
}
