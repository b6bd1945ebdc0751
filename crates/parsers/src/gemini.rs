//! Parser for `gemini --output-format json`.

use progress::TokenUsage;
use serde_json::Value;

use crate::ParsedOutput;

pub(crate) fn parse(raw: &str) -> ParsedOutput {
    let Ok(value) = serde_json::from_str::<Value>(raw.trim()) else {
        return ParsedOutput::raw(raw);
    };
    if !value.is_object() {
        return ParsedOutput::raw(raw);
    }

    let content = ["response", "content", "text"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| serde_json::to_string(&value).unwrap_or_else(|_| raw.to_string()));

    // Token counts live under `stats.tokens` on current CLIs, bare `tokens`
    // on older ones.
    let tokens = value
        .get("stats")
        .and_then(|stats| stats.get("tokens"))
        .or_else(|| value.get("tokens"))
        .and_then(token_usage);

    ParsedOutput {
        content,
        tokens,
        cost: None,
    }
}

fn token_usage(value: &Value) -> Option<TokenUsage> {
    let input = value
        .get("input")
        .or_else(|| value.get("input_tokens"))
        .and_then(Value::as_u64);
    let output = value
        .get("output")
        .or_else(|| value.get("output_tokens"))
        .and_then(Value::as_u64);
    if input.is_none() && output.is_none() {
        return None;
    }
    Some(TokenUsage {
        input: input.unwrap_or(0),
        output: output.unwrap_or(0),
    })
}
