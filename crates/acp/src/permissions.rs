//! Permission negotiation seam.
//!
//! Agents ask before sensitive actions via `session/request_permission`. The
//! host can install a handler to surface an interactive prompt; without one,
//! the default policy auto-approves using the first offered option. The
//! client imposes no timeout on the handler - a caller that blocks here owns
//! that risk.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

/// One option the agent offers in a permission request.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionOption {
    pub option_id: String,
    pub name: Option<String>,
    pub kind: Option<String>,
}

/// A permission request as presented to the handler.
#[derive(Debug, Clone)]
pub struct PermissionRequest {
    pub session_id: String,
    /// The tool call this request concerns, verbatim from the agent.
    pub tool_call: Value,
    pub options: Vec<PermissionOption>,
}

impl PermissionRequest {
    /// Parse the wire params of a `session/request_permission` request.
    pub fn from_params(params: &Value) -> Self {
        let options = params
            .get("options")
            .and_then(Value::as_array)
            .map(|options| {
                options
                    .iter()
                    .filter_map(|option| {
                        Some(PermissionOption {
                            option_id: option
                                .get("optionId")
                                .and_then(Value::as_str)?
                                .to_string(),
                            name: option
                                .get("name")
                                .and_then(Value::as_str)
                                .map(str::to_string),
                            kind: option
                                .get("kind")
                                .and_then(Value::as_str)
                                .map(str::to_string),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            session_id: params
                .get("sessionId")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            tool_call: params.get("toolCall").cloned().unwrap_or(Value::Null),
            options,
        }
    }
}

/// The handler's decision.
#[derive(Debug, Clone, PartialEq)]
pub enum PermissionReply {
    /// Select one of the offered options by id.
    Selected(String),
    Cancelled,
}

impl PermissionReply {
    /// Wire shape of the `session/request_permission` response result.
    pub fn to_outcome(&self) -> Value {
        match self {
            PermissionReply::Selected(option_id) => json!({
                "outcome": { "outcome": "selected", "optionId": option_id }
            }),
            PermissionReply::Cancelled => json!({
                "outcome": { "outcome": "cancelled" }
            }),
        }
    }
}

/// Hook invoked for every permission request on a session.
#[async_trait]
pub trait PermissionHandler: Send + Sync {
    async fn on_permission_request(&self, request: &PermissionRequest) -> PermissionReply;
}

/// Default policy: approve with the first offered option.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowFirstOption;

#[async_trait]
impl PermissionHandler for AllowFirstOption {
    async fn on_permission_request(&self, request: &PermissionRequest) -> PermissionReply {
        match request.options.first() {
            Some(option) => {
                debug!(option_id = %option.option_id, "auto-approving permission request");
                PermissionReply::Selected(option.option_id.clone())
            }
            None => PermissionReply::Cancelled,
        }
    }
}
