//! Wire types for the ACP dialect and the content shape-sniffing helpers.
//!
//! Outbound request parameters are typed; inbound payloads are deliberately
//! tolerant. Different agent implementations disagree on the shape of text
//! content and on where tool metadata lives, so session updates are parsed
//! from raw values with ordered fallback strategies instead of strict
//! deserialization - an unknown update kind must never be an error.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Truncation bound for tool-call input summaries. Presentation policy, not
/// an invariant.
pub const TOOL_INPUT_PREVIEW_MAX: usize = 60;

/// Protocol version we speak.
pub const PROTOCOL_VERSION: u16 = 1;

/// Config-option category used for thinking-mode selection.
pub const THOUGHT_LEVEL_CATEGORY: &str = "thought_level";

// ---------------------------------------------------------------------------
// Outbound request parameters

pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "clientInfo": {
            "name": "inkwell",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "clientCapabilities": {
            "fs": { "readTextFile": false, "writeTextFile": false },
        },
    })
}

pub fn new_session_params(cwd: &str) -> Value {
    json!({
        "cwd": cwd,
        "mcpServers": [],
    })
}

pub fn prompt_params(session_id: &str, text: &str) -> Value {
    json!({
        "sessionId": session_id,
        "prompt": [{ "type": "text", "text": text }],
    })
}

pub fn cancel_params(session_id: &str) -> Value {
    json!({ "sessionId": session_id })
}

pub fn set_model_params(session_id: &str, model_id: &str) -> Value {
    json!({ "sessionId": session_id, "modelId": model_id })
}

pub fn set_config_option_params(session_id: &str, option_id: &str, value: &str) -> Value {
    json!({ "sessionId": session_id, "optionId": option_id, "value": value })
}

// ---------------------------------------------------------------------------
// Inbound response shapes

/// A model the agent offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub model_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// The session's current and available models as reported by the agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionModelState {
    pub current_model_id: Option<String>,
    pub available_models: Vec<ModelInfo>,
}

/// One value of a config option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigValue {
    #[serde(alias = "value")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A named group of config values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigGroup {
    #[serde(default, alias = "group")]
    pub name: Option<String>,
    #[serde(default)]
    pub options: Vec<ConfigValue>,
}

/// Config-option values arrive either flat or grouped.
///
/// `Flat` must be tried first: group entries have no `id`, so a grouped list
/// fails the flat shape, while the reverse is not true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigOptionValues {
    Flat(Vec<ConfigValue>),
    Grouped(Vec<ConfigGroup>),
}

impl ConfigOptionValues {
    /// Flatten either shape into one uniform list.
    pub fn flatten(&self) -> Vec<ConfigValue> {
        match self {
            ConfigOptionValues::Flat(values) => values.clone(),
            ConfigOptionValues::Grouped(groups) => groups
                .iter()
                .flat_map(|group| group.options.iter().cloned())
                .collect(),
        }
    }
}

/// A session configuration option advertised by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigOption {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub current_value: Option<Value>,
    #[serde(default)]
    pub options: Option<ConfigOptionValues>,
}

/// Result of `session/new`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionResponse {
    pub session_id: String,
    #[serde(default)]
    pub models: Option<SessionModelState>,
    #[serde(default)]
    pub config_options: Option<Vec<ConfigOption>>,
}

/// Result of `session/set_config_option`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetConfigOptionResponse {
    pub config_options: Option<Vec<ConfigOption>>,
}

// ---------------------------------------------------------------------------
// Session updates

/// Whether an agent-reported tool status maps to our `Completed`.
pub fn is_terminal_status(status: &str) -> bool {
    matches!(status, "completed" | "failed")
}

/// Whether an agent-reported tool status maps to our `Started`.
pub fn is_active_status(status: &str) -> bool {
    matches!(status, "pending" | "in_progress")
}

/// One `session/update` notification, pre-chewed for the client.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    AgentMessageChunk { content: Value },
    AgentThoughtChunk { content: Value },
    UserMessageChunk { content: Value },
    ToolCall(Value),
    ToolCallUpdate(Value),
    /// Anything we do not recognize; kept for forward compatibility.
    Other(String),
}

/// Split a `session/update` notification's params into session id + update.
///
/// Returns `None` only when the notification is structurally unusable (no
/// update object at all); unknown update kinds map to [`SessionUpdate::Other`].
pub fn parse_session_update(params: &Value) -> Option<(String, SessionUpdate)> {
    let session_id = params
        .get("sessionId")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let update = params.get("update")?;
    let kind = update.get("sessionUpdate").and_then(Value::as_str)?;

    let content = || update.get("content").cloned().unwrap_or(Value::Null);
    let parsed = match kind {
        "agent_message_chunk" => SessionUpdate::AgentMessageChunk { content: content() },
        "agent_thought_chunk" => SessionUpdate::AgentThoughtChunk { content: content() },
        "user_message_chunk" => SessionUpdate::UserMessageChunk { content: content() },
        "tool_call" => SessionUpdate::ToolCall(update.clone()),
        "tool_call_update" => SessionUpdate::ToolCallUpdate(update.clone()),
        other => SessionUpdate::Other(other.to_string()),
    };
    Some((session_id, parsed))
}

// ---------------------------------------------------------------------------
// Content shape sniffing

type Extractor = fn(&Value) -> Option<String>;

/// Ordered text-extraction strategies; first match wins. Agents disagree on
/// how a "text chunk" looks, so each known shape gets its own strategy
/// instead of ad-hoc branching at the call sites.
const TEXT_EXTRACTORS: &[Extractor] = &[
    typed_text_object,
    bare_string,
    untyped_text_field,
    array_of_chunks,
];

/// Pull text out of any of the known content shapes.
pub fn extract_text(content: &Value) -> Option<String> {
    TEXT_EXTRACTORS.iter().find_map(|extract| extract(content))
}

fn typed_text_object(content: &Value) -> Option<String> {
    if content.get("type").and_then(Value::as_str) == Some("text") {
        content
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string)
    } else {
        None
    }
}

fn bare_string(content: &Value) -> Option<String> {
    content.as_str().map(str::to_string)
}

fn untyped_text_field(content: &Value) -> Option<String> {
    content
        .get("text")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn array_of_chunks(content: &Value) -> Option<String> {
    let items = content.as_array()?;
    let joined: String = items.iter().filter_map(extract_text).collect();
    if joined.is_empty() { None } else { Some(joined) }
}

// ---------------------------------------------------------------------------
// Tool-call field extraction

/// Best available human-readable tool name for a `tool_call` /
/// `tool_call_update` payload: vendor metadata, then the title, then a
/// generic placeholder.
pub fn tool_name(update: &Value) -> String {
    if let Some(meta) = update.get("_meta") {
        if let Some(name) = meta.get("name").and_then(Value::as_str) {
            return name.to_string();
        }
        if let Some(object) = meta.as_object() {
            for vendor in object.values() {
                if let Some(name) = vendor.get("name").and_then(Value::as_str) {
                    return name.to_string();
                }
            }
        }
    }
    if let Some(title) = update.get("title").and_then(Value::as_str) {
        if !title.is_empty() {
            return title.to_string();
        }
    }
    "Tool".to_string()
}

/// Short human-readable summary of a tool call's input: a well-known field
/// from the raw input (truncated), else the first reported file location.
pub fn tool_input_summary(update: &Value) -> Option<String> {
    const INTERESTING: &[&str] = &["query", "file_path", "path", "pattern", "url", "command"];

    if let Some(raw_input) = update.get("rawInput") {
        for key in INTERESTING {
            if let Some(text) = raw_input.get(*key).and_then(Value::as_str) {
                return Some(truncate(text, TOOL_INPUT_PREVIEW_MAX));
            }
        }
    }

    location_summary(update)
}

/// `path:line` from the first entry of a `locations` array.
pub fn location_summary(update: &Value) -> Option<String> {
    let location = update.get("locations")?.as_array()?.first()?;
    let path = location.get("path").and_then(Value::as_str)?;
    match location.get("line").and_then(Value::as_u64) {
        Some(line) => Some(format!("{path}:{line}")),
        None => Some(path.to_string()),
    }
}

pub fn tool_call_id(update: &Value) -> Option<&str> {
    update.get("toolCallId").and_then(Value::as_str)
}

pub fn tool_status(update: &Value) -> Option<&str> {
    update.get("status").and_then(Value::as_str)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn all_four_text_shapes_are_recognized() {
        assert_eq!(
            extract_text(&json!({"type": "text", "text": "typed"})),
            Some("typed".into())
        );
        assert_eq!(extract_text(&json!("bare")), Some("bare".into()));
        assert_eq!(
            extract_text(&json!({"text": "untyped"})),
            Some("untyped".into())
        );
        assert_eq!(
            extract_text(&json!([
                {"type": "text", "text": "a"},
                "b",
                {"text": "c"}
            ])),
            Some("abc".into())
        );
    }

    #[test]
    fn unknown_content_shapes_yield_nothing() {
        assert_eq!(extract_text(&json!({"type": "image", "data": "…"})), None);
        assert_eq!(extract_text(&json!(42)), None);
        assert_eq!(extract_text(&json!([])), None);
    }

    #[test]
    fn tool_name_prefers_vendor_metadata_over_title() {
        let update = json!({
            "title": "Reading a file",
            "_meta": {"example.com/toolInfo": {"name": "Read"}}
        });
        assert_eq!(tool_name(&update), "Read");
    }

    #[test]
    fn tool_name_falls_back_to_title_then_placeholder() {
        assert_eq!(tool_name(&json!({"title": "Grep"})), "Grep");
        assert_eq!(tool_name(&json!({})), "Tool");
    }

    #[test]
    fn input_summary_prefers_structured_fields() {
        let update = json!({
            "rawInput": {"file_path": "notes/daily.md", "limit": 100},
            "locations": [{"path": "other.md", "line": 3}]
        });
        assert_eq!(tool_input_summary(&update), Some("notes/daily.md".into()));
    }

    #[test]
    fn input_summary_truncates_long_values() {
        let long = "q".repeat(200);
        let update = json!({ "rawInput": { "query": long } });
        let summary = tool_input_summary(&update).unwrap();
        assert_eq!(summary.chars().count(), TOOL_INPUT_PREVIEW_MAX + 1);
        assert!(summary.ends_with('…'));
    }

    #[test]
    fn input_summary_falls_back_to_location() {
        let update = json!({ "locations": [{"path": "src/lib.rs", "line": 42}] });
        assert_eq!(tool_input_summary(&update), Some("src/lib.rs:42".into()));
    }

    #[test]
    fn session_updates_parse_by_kind() {
        let params = json!({
            "sessionId": "s1",
            "update": {
                "sessionUpdate": "agent_message_chunk",
                "content": {"type": "text", "text": "hi"}
            }
        });
        let (session_id, update) = parse_session_update(&params).unwrap();
        assert_eq!(session_id, "s1");
        assert!(matches!(update, SessionUpdate::AgentMessageChunk { .. }));
    }

    #[test]
    fn unknown_update_kinds_become_other() {
        let params = json!({
            "sessionId": "s1",
            "update": {"sessionUpdate": "plan"}
        });
        let (_, update) = parse_session_update(&params).unwrap();
        assert_eq!(update, SessionUpdate::Other("plan".into()));
    }

    #[test]
    fn grouped_and_flat_config_values_flatten_identically() {
        let flat: ConfigOptionValues = serde_json::from_value(json!([
            {"id": "low", "name": "Low"},
            {"id": "high", "name": "High"}
        ]))
        .unwrap();
        let grouped: ConfigOptionValues = serde_json::from_value(json!([
            {"group": "Levels", "options": [
                {"id": "low", "name": "Low"},
                {"id": "high", "name": "High"}
            ]}
        ]))
        .unwrap();

        assert_eq!(flat.flatten(), grouped.flatten());
        assert_eq!(flat.flatten().len(), 2);
    }

    #[test]
    fn config_values_accept_value_as_an_id_alias() {
        let value: ConfigValue =
            serde_json::from_value(json!({"value": "medium", "name": "Medium"})).unwrap();
        assert_eq!(value.id, "medium");
    }

    #[test]
    fn new_session_response_tolerates_minimal_payloads() {
        let response: NewSessionResponse =
            serde_json::from_value(json!({"sessionId": "abc"})).unwrap();
        assert_eq!(response.session_id, "abc");
        assert!(response.models.is_none());
        assert!(response.config_options.is_none());
    }

    #[test]
    fn status_vocabulary_maps_to_two_values() {
        assert!(is_active_status("pending"));
        assert!(is_active_status("in_progress"));
        assert!(is_terminal_status("completed"));
        assert!(is_terminal_status("failed"));
        assert!(!is_terminal_status("in_progress"));
    }
}
