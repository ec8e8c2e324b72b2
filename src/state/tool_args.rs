use serde_json::Value;

use crate::types::protocol::extract_text;
use crate::util::truncate_chars;

const FALLBACK_ARGS_CHARS: usize = 80;

/// Human-friendly one-liner for a tool call's arguments.
///
/// Shell tools show their command, file tools their path and search tools
/// their pattern. Anything else shows the raw argument document, flattened
/// to one line and cut to a bounded length.
pub fn format_tool_args(tool_name: &str, args: Option<&Value>) -> String {
    let Some(args) = args else {
        return String::new();
    };

    let specific = match tool_name.to_ascii_lowercase().as_str() {
        "bash" | "shell" | "exec" => string_field(args, &["command", "cmd"]).map(|cmd| format!("$ {cmd}")),
        "read" | "edit" | "write" | "multiedit" | "ls" => {
            string_field(args, &["path", "file_path", "filePath"])
        }
        "grep" | "glob" | "find" => string_field(args, &["pattern", "query"]),
        _ => None,
    };
    if let Some(formatted) = specific {
        return formatted;
    }

    let raw = match args {
        Value::Null => return String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    truncate_chars(&raw.replace('\n', " "), FALLBACK_ARGS_CHARS)
}

/// Plain text of a tool result: text content blocks when present, a bare
/// string as is, and compact JSON otherwise.
pub fn tool_result_text(result: &Value) -> String {
    if let Some(content) = result.get("content") {
        if let Some(text) = extract_text(content) {
            return text;
        }
    }
    match result {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => extract_text(other).unwrap_or_else(|| other.to_string()),
    }
}

fn string_field(args: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| args.get(*key))
        .find_map(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
