//! Event and response types shared by both executors.

use std::path::PathBuf;
use std::time::Duration;

use providers::ProviderKind;
use serde::{Deserialize, Serialize};

/// A single user submission routed to one provider.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub prompt: String,
    pub provider: ProviderKind,
    pub cwd: Option<PathBuf>,
}

impl ExecutionRequest {
    pub fn new(provider: ProviderKind, prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            provider,
            cwd: None,
        }
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

/// Token counts reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

/// Terminal result of one execution. Produced exactly once per request, even
/// on failure (content may be empty with `error` set).
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub provider: ProviderKind,
    pub tokens: Option<TokenUsage>,
    pub cost: Option<f64>,
    pub duration: Duration,
    pub error: Option<String>,
}

impl LlmResponse {
    pub fn duration_ms(&self) -> u128 {
        self.duration.as_millis()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Normalized two-value tool activity status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolUseStatus {
    Started,
    Completed,
}

/// Agent activity during a single prompt.
///
/// `Text` events carry the *cumulative* content so far, not a delta; each one
/// supersedes the previous for display. `Thinking` events are incremental.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Thinking {
        content: String,
    },
    ToolUse {
        tool: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        input: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<ToolUseStatus>,
    },
    Text {
        content: String,
    },
    Status {
        message: String,
    },
}

impl ProgressEvent {
    pub fn text(content: impl Into<String>) -> Self {
        ProgressEvent::Text {
            content: content.into(),
        }
    }

    pub fn thinking(content: impl Into<String>) -> Self {
        ProgressEvent::Thinking {
            content: content.into(),
        }
    }

    pub fn status(message: impl Into<String>) -> Self {
        ProgressEvent::Status {
            message: message.into(),
        }
    }

    pub fn tool_use(
        tool: impl Into<String>,
        input: Option<String>,
        status: Option<ToolUseStatus>,
    ) -> Self {
        ProgressEvent::ToolUse {
            tool: tool.into(),
            input,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn events_serialize_with_a_type_tag() {
        let event = ProgressEvent::tool_use("Read", Some("notes/daily.md".into()), None);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tool_use");
        assert_eq!(json["tool"], "Read");
        assert!(json.get("status").is_none());
    }

    #[test]
    fn response_reports_duration_in_millis() {
        let response = LlmResponse {
            content: "ok".into(),
            provider: ProviderKind::Claude,
            tokens: None,
            cost: None,
            duration: Duration::from_millis(1500),
            error: None,
        };
        assert_eq!(response.duration_ms(), 1500);
        assert!(!response.is_error());
    }
}
