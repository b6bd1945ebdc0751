//! Parser for `opencode run --format json` newline-delimited event streams.
//!
//! Content is the concatenation of `text` part events; token and cost totals
//! are summed over `step_finish` events. Unparseable lines are dropped.

use progress::TokenUsage;
use serde_json::Value;

use crate::ParsedOutput;

pub(crate) struct Extracted {
    pub(crate) content: Option<String>,
    pub(crate) tokens: Option<TokenUsage>,
    pub(crate) cost: Option<f64>,
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
        cost: extracted.cost,
    }
}

pub(crate) fn extract(raw: &str) -> Extracted {
    let mut content = String::new();
    let mut input = 0u64;
    let mut output = 0u64;
    let mut cost = 0.0f64;
    let mut saw_usage = false;
    let mut saw_cost = false;
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
            Some("text") => {
                if let Some(text) = event
                    .get("part")
                    .and_then(|part| part.get("text"))
                    .and_then(Value::as_str)
                {
                    content.push_str(text);
                }
            }
            // Current CLIs emit `step_finish`; some builds used a dash.
            Some("step_finish") | Some("step-finish") => {
                let part = event.get("part").unwrap_or(&event);
                if let Some(tokens) = part.get("tokens").or_else(|| event.get("tokens")) {
                    input += tokens.get("input").and_then(Value::as_u64).unwrap_or(0);
                    output += tokens.get("output").and_then(Value::as_u64).unwrap_or(0);
                    saw_usage = true;
                }
                if let Some(step_cost) = part
                    .get("cost")
                    .or_else(|| event.get("cost"))
                    .and_then(Value::as_f64)
                {
                    cost += step_cost;
                    saw_cost = true;
                }
            }
            _ => {}
        }
    }

    Extracted {
        content: parsed_any.then_some(content),
        tokens: saw_usage.then_some(TokenUsage { input, output }),
        cost: saw_cost.then_some(cost),
        parsed_any,
    }
}
