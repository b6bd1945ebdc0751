//! Parser for `claude --print --output-format json`.
//!
//! The CLI prints a single JSON object describing the whole run. Content
//! lives in `result` (newer CLIs), `content` (older ones), or
//! `structured_output`; usage under `usage`, cost under `total_cost_usd`.

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

    let content = value
        .get("result")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            value
                .get("content")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .or_else(|| {
            value
                .get("structured_output")
                .map(|v| serde_json::to_string(v).unwrap_or_default())
        })
        .unwrap_or_else(|| serde_json::to_string(&value).unwrap_or_else(|_| raw.to_string()));

    let tokens = value.get("usage").and_then(|usage| {
        let input = usage.get("input_tokens").and_then(Value::as_u64);
        let output = usage.get("output_tokens").and_then(Value::as_u64);
        if input.is_none() && output.is_none() {
            return None;
        }
        Some(TokenUsage {
            input: input.unwrap_or(0),
            output: output.unwrap_or(0),
        })
    });

    let cost = value
        .get("total_cost_usd")
        .and_then(Value::as_f64)
        .or_else(|| value.get("cost_usd").and_then(Value::as_f64));

    ParsedOutput {
        content,
        tokens,
        cost,
    }
}
