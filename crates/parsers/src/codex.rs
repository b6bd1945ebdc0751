//! Parser for `codex exec --json` newline-delimited event streams.
//!
//! Text arrives incrementally as `item.completed` events; when a final
//! `message.completed` event is present its content supersedes whatever was
//! accumulated. Usage is summed over `response.completed` events. Lines that
//! fail to parse are dropped, not treated as errors.

use progress::TokenUsage;
use serde_json::Value;

use crate::ParsedOutput;

pub(crate) struct Extracted {
    pub(crate) content: Option<String>,
    pub(crate) tokens: Option<TokenUsage>,
    pub(crate) parsed_any: bool,
}

pub(crate) fn parse(raw: &str) -> ParsedOutput {
    let extracted = extract(raw);
    if !extracted.parsed_any {
        return ParsedOutput::raw(raw);
    }
    ParsedOutput {
        content: extracted.content.unwrap_or_default(),
        tokens: extracted.tokens,
        cost: None,
    }
}

pub(crate) fn extract(raw: &str) -> Extracted {
    let mut accumulated = String::new();
    let mut final_message: Option<String> = None;
    let mut input = 0u64;
    let mut output = 0u64;
    let mut saw_usage = false;
    let mut parsed_any = false;

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(event) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        parsed_any = true;

        match event.get("type").and_then(Value::as_str) {
            Some("item.completed") => {
                if let Some(text) = text_item(&event) {
                    accumulated.push_str(text);
                }
            }
            Some("message.completed") => {
                if let Some(text) = message_content(&event) {
                    final_message = Some(text);
                }
            }
            Some("response.completed") => {
                if let Some(usage) = event.get("response").and_then(|r| r.get("usage")) {
                    input += usage
                        .get("input_tokens")
                        .and_then(Value::as_u64)
                        .unwrap_or(0);
                    output += usage
                        .get("output_tokens")
                        .and_then(Value::as_u64)
                        .unwrap_or(0);
                    saw_usage = true;
                }
            }
            _ => {}
        }
    }

    let content = final_message.or_else(|| {
        if accumulated.is_empty() && !parsed_any {
            None
        } else {
            Some(accumulated)
        }
    });

    Extracted {
        content,
        tokens: saw_usage.then_some(TokenUsage { input, output }),
        parsed_any,
    }
}

fn text_item(event: &Value) -> Option<&str> {
    let item = event.get("item")?;
    let kind = item
        .get("type")
        .or_else(|| item.get("item_type"))
        .and_then(Value::as_str)?;
    match kind {
        "text" | "agent_message" | "assistant_message" => item.get("text").and_then(Value::as_str),
        _ => None,
    }
}

/// `message.completed` content: a bare `text` field, a string `content`, or
/// an array of `{type:"text"|"output_text", text}` blocks.
fn message_content(event: &Value) -> Option<String> {
    let message = event.get("message")?;
    if let Some(text) = message.get("text").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    match message.get("content") {
        Some(Value::String(text)) => Some(text.clone()),
        Some(Value::Array(blocks)) => {
            let joined: String = blocks
                .iter()
                .filter_map(|block| {
                    match block.get("type").and_then(Value::as_str) {
                        Some("text") | Some("output_text") | None => {}
                        Some(_) => return None,
                    }
                    block.get("text").and_then(Value::as_str)
                })
                .collect();
            if joined.is_empty() { None } else { Some(joined) }
        }
        _ => None,
    }
}
