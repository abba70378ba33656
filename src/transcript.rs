//! Claude Code JSONL transcript parsing.

use std::path::Path;

/// Extract a session name from the first user message in the transcript.
///
/// Returns an empty string if the transcript is missing or has no usable
/// user message.
#[must_use]
pub fn session_name(transcript_path: &str) -> String {
    if transcript_path.is_empty() || !Path::new(transcript_path).exists() {
        return String::new();
    }
    let Ok(content) = std::fs::read_to_string(transcript_path) else {
        return String::new();
    };

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(entry) = serde_json::from_str::<serde_json::Value>(line) else {
            continue;
        };
        if entry.get("type").and_then(serde_json::Value::as_str) != Some("user") {
            continue;
        }
        let content = entry
            .get("message")
            .and_then(|m| m.get("content"))
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        return match content {
            serde_json::Value::String(s) => truncate_chars(s.trim(), 80),
            serde_json::Value::Array(blocks) => blocks
                .iter()
                .find(|b| b.get("type").and_then(serde_json::Value::as_str) == Some("text"))
                .and_then(|b| b.get("text"))
                .and_then(serde_json::Value::as_str)
                .map(|t| truncate_chars(t.trim(), 80))
                .unwrap_or_default(),
            _ => String::new(),
        };
    }
    String::new()
}

/// Parse the JSONL transcript and extract the last assistant message text.
///
/// Returns an empty string if the transcript is missing or holds no
/// assistant text.
#[must_use]
pub fn last_assistant_message(transcript_path: &str) -> String {
    if transcript_path.is_empty() || !Path::new(transcript_path).exists() {
        return String::new();
    }
    let Ok(content) = std::fs::read_to_string(transcript_path) else {
        return String::new();
    };

    for line in content.lines().rev() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(entry) = serde_json::from_str::<serde_json::Value>(line) else {
            continue;
        };
        if entry.get("type").and_then(serde_json::Value::as_str) != Some("assistant") {
            continue;
        }
        let texts: Vec<&str> = entry
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(serde_json::Value::as_array)
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| {
                        b.get("type").and_then(serde_json::Value::as_str) == Some("text")
                    })
                    .filter_map(|b| b.get("text").and_then(serde_json::Value::as_str))
                    .collect()
            })
            .unwrap_or_default();
        let result = texts.join("\n").trim().to_string();
        if !result.is_empty() {
            return result;
        }
    }
    String::new()
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
