//! The ACP session client state machine.
//!
//! One `AcpClient` owns at most one live agent session at a time:
//!
//! ```text
//! Disconnected -> Connecting -> Initializing -> SessionCreating -> Ready
//!                      |              |                |            |
//!                      +------- Crashed (process exit at any point) +
//! ```
//!
//! `connect()` reuses a live connection for the same provider and fully
//! tears down anything else first. The handshake (`initialize`, then
//! `session/new`) is raced phase-by-phase against process exit and a startup
//! timeout; after a successful handshake a later unexpected exit is only
//! reported lazily through `is_connected()`, which is the sole liveness
//! authority and self-heals by clearing all state when the process is gone.
//!
//! Sessions support one in-flight `prompt()` at a time. That precondition is
//! owned by the caller (the chat view disables input while loading); the
//! client resets its per-prompt accumulation on entry rather than policing
//! overlap.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use progress::{ProgressBus, ProgressEvent, ToolUseStatus};
use providers::{AgentCommand, ProviderKind, Settings, acp_command};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::connection::{AcpConnection, InboundChannels, IncomingRequest};
use crate::error::{AcpError, Result};
use crate::permissions::{AllowFirstOption, PermissionHandler, PermissionRequest};
use crate::types::{
    self, NewSessionResponse, SessionModelState, SessionUpdate, SetConfigOptionResponse,
    THOUGHT_LEVEL_CATEGORY, is_terminal_status, parse_session_update,
};

/// Upper bound on each handshake phase.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of one prompt round-trip. Content is whatever text accumulated via
/// `session/update` notifications during the call; the prompt RPC's own
/// result never carries content (only a stop reason), an asymmetry real
/// agents rely on.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptOutcome {
    pub content: String,
    pub error: Option<String>,
}

/// A selectable thinking level, flattened from the agent's config options.
#[derive(Debug, Clone, PartialEq)]
pub struct ThinkingOption {
    pub id: String,
    pub name: String,
}

#[derive(Default)]
pub(crate) struct PromptState {
    pub(crate) text: String,
    pub(crate) chunk_count: u64,
    pub(crate) tool_names: HashMap<String, String>,
}

impl PromptState {
    fn reset(&mut self) {
        self.text.clear();
        self.chunk_count = 0;
        self.tool_names.clear();
    }
}

#[derive(Default)]
struct ClientState {
    connection: Option<Arc<AcpConnection>>,
    child: Option<Child>,
    session_id: Option<String>,
    provider: Option<ProviderKind>,
    config_options: Vec<types::ConfigOption>,
    model_state: Option<SessionModelState>,
    dispatch: Option<JoinHandle<()>>,
    stderr_task: Option<JoinHandle<()>>,
}

/// Client for one persistent agent connection.
pub struct AcpClient {
    state: tokio::sync::Mutex<ClientState>,
    prompt_state: Arc<Mutex<PromptState>>,
    progress: ProgressBus,
    permissions: Arc<dyn PermissionHandler>,
}

impl Default for AcpClient {
    fn default() -> Self {
        Self::new(ProgressBus::new())
    }
}

impl AcpClient {
    pub fn new(progress: ProgressBus) -> Self {
        Self {
            state: tokio::sync::Mutex::new(ClientState::default()),
            prompt_state: Arc::new(Mutex::new(PromptState::default())),
            progress,
            permissions: Arc::new(AllowFirstOption),
        }
    }

    /// Replace the permission policy. Applies to sessions connected after
    /// the call.
    pub fn with_permission_handler(mut self, handler: Arc<dyn PermissionHandler>) -> Self {
        self.permissions = handler;
        self
    }

    pub fn progress(&self) -> &ProgressBus {
        &self.progress
    }

    /// Establish (or reuse) a session with `provider`'s ACP-mode agent.
    ///
    /// A no-op when already connected to the same provider. Otherwise any
    /// previous session is fully torn down first; on handshake failure no
    /// process or connection is left referenced.
    pub async fn connect(
        &self,
        provider: ProviderKind,
        cwd: &Path,
        settings: &Settings,
    ) -> Result<()> {
        let provider_settings = settings.provider(provider);
        let command = acp_command(provider, &provider_settings)?;

        let mut state = self.state.lock().await;
        if live_check(&mut state) && state.provider == Some(provider) {
            debug!(provider = %provider, "reusing live ACP connection");
            return Ok(());
        }
        teardown(&mut state).await;

        info!(provider = %provider, program = %command.program.display(), "starting ACP agent");
        let mut child = spawn_agent(&command, cwd)?;

        let stderr_task = child.stderr.take().map(|stderr| {
            let provider_name = provider.as_str();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(provider = provider_name, "agent stderr: {line}");
                }
            })
        });

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AcpError::Protocol("agent stdout missing".into()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AcpError::Protocol("agent stdin missing".into()))?;

        let (connection, inbound) = AcpConnection::new(stdout, stdin);
        let dispatch = tokio::spawn(dispatch_inbound(
            inbound,
            connection.clone(),
            self.prompt_state.clone(),
            self.progress.clone(),
            self.permissions.clone(),
        ));

        let handshake: Result<NewSessionResponse> = async {
            let init = race_startup(
                &mut child,
                STARTUP_TIMEOUT,
                connection.request("initialize", types::initialize_params()),
            )
            .await?;
            debug!(agent_info = ?init.get("agentInfo"), "agent initialized");

            let raw = race_startup(
                &mut child,
                STARTUP_TIMEOUT,
                connection.request(
                    "session/new",
                    types::new_session_params(&cwd.display().to_string()),
                ),
            )
            .await?;
            serde_json::from_value(raw)
                .map_err(|err| AcpError::Protocol(format!("bad session/new response: {err}")))
        }
        .await;

        let response = match handshake {
            Ok(response) => response,
            Err(err) => {
                warn!(provider = %provider, error = %err, "ACP handshake failed");
                let _ = child.start_kill();
                let _ = child.wait().await;
                connection.close();
                dispatch.abort();
                if let Some(task) = stderr_task {
                    task.abort();
                }
                return Err(err);
            }
        };

        info!(provider = %provider, session_id = %response.session_id, "ACP session established");
        state.connection = Some(connection.clone());
        state.child = Some(child);
        state.session_id = Some(response.session_id.clone());
        state.provider = Some(provider);
        state.model_state = response.models;
        state.config_options = response.config_options.unwrap_or_default();
        state.dispatch = Some(dispatch);
        state.stderr_task = stderr_task;

        // Model selection is best-effort and experimental: failure to apply
        // it must never fail the connect.
        if let Some(model) = &provider_settings.model {
            let params = types::set_model_params(&response.session_id, model);
            match connection.request("session/set_model", params).await {
                Ok(_) => {
                    let model_state = state.model_state.get_or_insert_with(Default::default);
                    model_state.current_model_id = Some(model.clone());
                }
                Err(err) => {
                    warn!(provider = %provider, model = %model, error = %err, "could not apply configured model");
                }
            }
        }

        // Same policy for thinking mode: only applied when both configured
        // and advertised, silently ignored otherwise.
        if let Some(value) = &provider_settings.thinking_mode {
            if let Some(option_id) = advertised_thought_level(&state.config_options, value) {
                let params =
                    types::set_config_option_params(&response.session_id, &option_id, value);
                match connection.request("session/set_config_option", params).await {
                    Ok(raw) => {
                        let parsed: SetConfigOptionResponse =
                            serde_json::from_value(raw).unwrap_or_default();
                        if let Some(options) = parsed.config_options {
                            state.config_options = options;
                        }
                    }
                    Err(err) => {
                        warn!(provider = %provider, value = %value, error = %err, "could not apply thinking mode");
                    }
                }
            }
        }

        Ok(())
    }

    /// Send one prompt and wait for the turn to finish.
    ///
    /// Requires a live connection; calling this without a successful
    /// `connect()` is a precondition error. RPC failures surface in the
    /// outcome's `error` field alongside whatever content had accumulated.
    pub async fn prompt(&self, text: &str) -> Result<PromptOutcome> {
        let (connection, session_id) = {
            let mut state = self.state.lock().await;
            if !live_check(&mut state) {
                return Err(AcpError::NotConnected);
            }
            match (&state.connection, &state.session_id) {
                (Some(connection), Some(session_id)) => {
                    (connection.clone(), session_id.clone())
                }
                _ => return Err(AcpError::NotConnected),
            }
        };

        self.prompt_state.lock().reset();

        let result = connection
            .request("session/prompt", types::prompt_params(&session_id, text))
            .await;

        let content = self.prompt_state.lock().text.clone();
        match result {
            Ok(raw) => {
                let stop_reason = raw.get("stopReason").and_then(Value::as_str);
                debug!(?stop_reason, chars = content.len(), "prompt turn finished");
                if content.is_empty() {
                    // Anomalous: a turn that neither failed nor produced text.
                    warn!(session_id = %session_id, "prompt completed with no content");
                }
                Ok(PromptOutcome {
                    content,
                    error: None,
                })
            }
            Err(err) => {
                warn!(session_id = %session_id, error = %err, "prompt failed");
                Ok(PromptOutcome {
                    content,
                    error: Some(err.to_string()),
                })
            }
        }
    }

    /// Ask the agent to stop the current turn. No-op without a session; the
    /// session stays usable afterwards.
    pub async fn cancel(&self) {
        let target = {
            let state = self.state.lock().await;
            match (&state.connection, &state.session_id) {
                (Some(connection), Some(session_id)) => {
                    Some((connection.clone(), session_id.clone()))
                }
                _ => None,
            }
        };
        if let Some((connection, session_id)) = target {
            debug!(session_id = %session_id, "cancelling active session");
            if let Err(err) = connection
                .notify("session/cancel", types::cancel_params(&session_id))
                .await
            {
                debug!(error = %err, "cancel notification failed");
            }
        }
    }

    /// Kill the agent and clear all state. Always safe, including when
    /// already disconnected.
    pub async fn disconnect(&self) {
        let mut state = self.state.lock().await;
        teardown(&mut state).await;
    }

    /// Sole authority for liveness. Returns `false` (and clears state as a
    /// side effect, so later calls are cheap) once the process has exited,
    /// even without an explicit `disconnect()`.
    pub async fn is_connected(&self) -> bool {
        let mut state = self.state.lock().await;
        live_check(&mut state)
    }

    pub async fn provider(&self) -> Option<ProviderKind> {
        self.state.lock().await.provider
    }

    pub async fn current_model(&self) -> Option<String> {
        self.state
            .lock()
            .await
            .model_state
            .as_ref()
            .and_then(|state| state.current_model_id.clone())
    }

    /// Models the connected agent reported for this session, if any.
    pub async fn available_models(&self) -> Vec<types::ModelInfo> {
        self.state
            .lock()
            .await
            .model_state
            .as_ref()
            .map(|state| state.available_models.clone())
            .unwrap_or_default()
    }

    /// Thinking levels advertised by the agent, or `None` when the session
    /// has no `thought_level` config option.
    pub async fn thinking_options(&self) -> Option<Vec<ThinkingOption>> {
        let state = self.state.lock().await;
        let option = thought_level_option(&state.config_options)?;
        let values = option.options.as_ref()?;
        Some(
            values
                .flatten()
                .into_iter()
                .map(|value| ThinkingOption {
                    name: value.name.unwrap_or_else(|| value.id.clone()),
                    id: value.id,
                })
                .collect(),
        )
    }

    /// Apply a thinking level. Returns `false` (not an error) when
    /// disconnected or unsupported; on success the cached config options are
    /// refreshed from the agent's response.
    pub async fn set_thinking_mode(&self, value: &str) -> bool {
        let (connection, session_id, option_id) = {
            let mut state = self.state.lock().await;
            if !live_check(&mut state) {
                return false;
            }
            let Some(option) = thought_level_option(&state.config_options) else {
                return false;
            };
            let option_id = option.id.clone();
            match (&state.connection, &state.session_id) {
                (Some(connection), Some(session_id)) => {
                    (connection.clone(), session_id.clone(), option_id)
                }
                _ => return false,
            }
        };

        let params = types::set_config_option_params(&session_id, &option_id, value);
        match connection.request("session/set_config_option", params).await {
            Ok(raw) => {
                let parsed: SetConfigOptionResponse = serde_json::from_value(raw).unwrap_or_default();
                if let Some(options) = parsed.config_options {
                    self.state.lock().await.config_options = options;
                }
                true
            }
            Err(err) => {
                warn!(value = %value, error = %err, "set_thinking_mode failed");
                false
            }
        }
    }
}

fn spawn_agent(command: &AgentCommand, cwd: &Path) -> Result<Child> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args);
    for (key, value) in &command.env {
        cmd.env(key, value);
    }
    cmd.current_dir(cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    cmd.spawn().map_err(|source| AcpError::Spawn {
        program: command.program.display().to_string(),
        source,
    })
}

/// Race a handshake phase against process exit and the startup timeout;
/// whichever settles first wins. Shared by the `initialize` and
/// `session/new` phases.
async fn race_startup<T>(
    child: &mut Child,
    timeout: Duration,
    operation: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        result = operation => result,
        status = child.wait() => {
            let status = status
                .map(|s| s.to_string())
                .unwrap_or_else(|err| format!("wait failed: {err}"));
            Err(AcpError::StartupExit(status))
        }
        _ = tokio::time::sleep(timeout) => Err(AcpError::StartupTimeout(timeout)),
    }
}

/// `true` while connection, session, and process are all live. Clears all
/// state as a side effect when the process has exited.
fn live_check(state: &mut ClientState) -> bool {
    if state.connection.is_none() || state.session_id.is_none() {
        return false;
    }
    let Some(child) = state.child.as_mut() else {
        return false;
    };
    match child.try_wait() {
        Ok(None) => state.connection.as_ref().is_some_and(|c| !c.is_closed()),
        Ok(Some(status)) => {
            warn!(%status, "agent process exited unexpectedly");
            clear_dead(state);
            false
        }
        Err(err) => {
            warn!(error = %err, "could not poll agent process");
            clear_dead(state);
            false
        }
    }
}

/// Synchronous cleanup for a process that is already gone.
fn clear_dead(state: &mut ClientState) {
    if let Some(task) = state.dispatch.take() {
        task.abort();
    }
    if let Some(task) = state.stderr_task.take() {
        task.abort();
    }
    if let Some(connection) = state.connection.take() {
        connection.close();
    }
    state.child = None;
    state.session_id = None;
    state.provider = None;
    state.model_state = None;
    state.config_options.clear();
}

async fn teardown(state: &mut ClientState) {
    if let Some(mut child) = state.child.take() {
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
    clear_dead(state);
}

fn thought_level_option(options: &[types::ConfigOption]) -> Option<&types::ConfigOption> {
    options
        .iter()
        .find(|option| option.category.as_deref() == Some(THOUGHT_LEVEL_CATEGORY))
}

/// The option id to use when `value` is actually advertised by the agent.
fn advertised_thought_level(options: &[types::ConfigOption], value: &str) -> Option<String> {
    let option = thought_level_option(options)?;
    let values = option.options.as_ref()?.flatten();
    values
        .iter()
        .any(|v| v.id == value)
        .then(|| option.id.clone())
}

async fn dispatch_inbound(
    mut inbound: InboundChannels,
    connection: Arc<AcpConnection>,
    prompt_state: Arc<Mutex<PromptState>>,
    progress: ProgressBus,
    permissions: Arc<dyn PermissionHandler>,
) {
    loop {
        tokio::select! {
            request = inbound.requests.recv() => match request {
                Some(request) => handle_request(request, &connection, permissions.as_ref()).await,
                None => break,
            },
            notification = inbound.notifications.recv() => match notification {
                Some(notification) => {
                    if notification.method == "session/update" {
                        if let Some((_, update)) = parse_session_update(&notification.params) {
                            apply_session_update(update, &prompt_state, &progress);
                        }
                    } else {
                        trace!(method = %notification.method, "ignoring notification");
                    }
                }
                None => break,
            },
        }
    }
    debug!("inbound dispatch stopped");
}

async fn handle_request(
    request: IncomingRequest,
    connection: &Arc<AcpConnection>,
    permissions: &dyn PermissionHandler,
) {
    if request.method == "session/request_permission" {
        let parsed = PermissionRequest::from_params(&request.params);
        let reply = permissions.on_permission_request(&parsed).await;
        if let Err(err) = connection.respond(request.id, reply.to_outcome()).await {
            warn!(error = %err, "failed to answer permission request");
        }
    } else if let Err(err) = connection
        .respond_error(request.id, -32601, "method not found")
        .await
    {
        debug!(error = %err, method = %request.method, "failed to reject unknown request");
    }
}

/// Interpret one session update into progress events and accumulation state.
pub(crate) fn apply_session_update(
    update: SessionUpdate,
    prompt_state: &Mutex<PromptState>,
    progress: &ProgressBus,
) {
    match update {
        SessionUpdate::AgentMessageChunk { content } => {
            let Some(text) = types::extract_text(&content) else {
                trace!("message chunk with unrecognized content shape");
                return;
            };
            let cumulative = {
                let mut state = prompt_state.lock();
                state.text.push_str(&text);
                state.chunk_count += 1;
                state.text.clone()
            };
            progress.emit(ProgressEvent::text(cumulative));
        }
        SessionUpdate::AgentThoughtChunk { content } => {
            if let Some(text) = types::extract_text(&content) {
                progress.emit(ProgressEvent::thinking(text));
            }
        }
        SessionUpdate::UserMessageChunk { .. } => {
            trace!("user message chunk echoed back");
        }
        SessionUpdate::ToolCall(update) => {
            let name = types::tool_name(&update);
            let input = types::tool_input_summary(&update);
            if let Some(id) = types::tool_call_id(&update) {
                prompt_state
                    .lock()
                    .tool_names
                    .insert(id.to_string(), name.clone());
            }
            let status = match types::tool_status(&update) {
                Some(status) if is_terminal_status(status) => ToolUseStatus::Completed,
                _ => ToolUseStatus::Started,
            };
            progress.emit(ProgressEvent::tool_use(name, input, Some(status)));
        }
        SessionUpdate::ToolCallUpdate(update) => {
            // Intermediate updates are suppressed; only the transition to a
            // terminal status reaches the UI.
            let terminal = types::tool_status(&update).is_some_and(is_terminal_status);
            if !terminal {
                return;
            }
            let remembered = types::tool_call_id(&update)
                .and_then(|id| prompt_state.lock().tool_names.remove(id));
            let name = remembered.unwrap_or_else(|| types::tool_name(&update));
            let input = types::location_summary(&update);
            progress.emit(ProgressEvent::tool_use(
                name,
                input,
                Some(ToolUseStatus::Completed),
            ));
        }
        SessionUpdate::Other(kind) => {
            trace!(kind = %kind, "ignoring unknown session update");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn chunk(text: &str) -> SessionUpdate {
        SessionUpdate::AgentMessageChunk {
            content: json!({"type": "text", "text": text}),
        }
    }

    fn drain_events(
        rx: &mut tokio::sync::mpsc::UnboundedReceiver<ProgressEvent>,
    ) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn text_accumulates_cumulatively_across_chunks() {
        let progress = ProgressBus::new();
        let mut rx = progress.subscribe();
        let state = Mutex::new(PromptState::default());

        for text in ["A", "B", "C"] {
            apply_session_update(chunk(text), &state, &progress);
        }

        let texts: Vec<String> = drain_events(&mut rx)
            .into_iter()
            .filter_map(|event| match event {
                ProgressEvent::Text { content } => Some(content),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["A", "AB", "ABC"]);
        assert_eq!(state.lock().chunk_count, 3);
    }

    #[tokio::test]
    async fn tool_calls_correlate_across_start_and_terminal_update() {
        let progress = ProgressBus::new();
        let mut rx = progress.subscribe();
        let state = Mutex::new(PromptState::default());

        apply_session_update(
            SessionUpdate::ToolCall(json!({
                "toolCallId": "t1",
                "title": "Read",
                "status": "pending"
            })),
            &state,
            &progress,
        );
        assert_eq!(state.lock().tool_names.get("t1"), Some(&"Read".to_string()));

        apply_session_update(
            SessionUpdate::ToolCallUpdate(json!({
                "toolCallId": "t1",
                "status": "completed"
            })),
            &state,
            &progress,
        );

        let events = drain_events(&mut rx);
        let completed: Vec<_> = events
            .iter()
            .filter(|event| {
                matches!(
                    event,
                    ProgressEvent::ToolUse {
                        tool,
                        status: Some(ToolUseStatus::Completed),
                        ..
                    } if tool == "Read"
                )
            })
            .collect();
        assert_eq!(completed.len(), 1, "exactly one completed event: {events:?}");
        assert!(
            state.lock().tool_names.is_empty(),
            "the id->name mapping must be forgotten after completion"
        );
    }

    #[tokio::test]
    async fn intermediate_tool_updates_emit_nothing() {
        let progress = ProgressBus::new();
        let mut rx = progress.subscribe();
        let state = Mutex::new(PromptState::default());

        apply_session_update(
            SessionUpdate::ToolCallUpdate(json!({
                "toolCallId": "t9",
                "status": "in_progress"
            })),
            &state,
            &progress,
        );

        assert!(drain_events(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn thought_chunks_become_thinking_events() {
        let progress = ProgressBus::new();
        let mut rx = progress.subscribe();
        let state = Mutex::new(PromptState::default());

        apply_session_update(
            SessionUpdate::AgentThoughtChunk {
                content: json!("planning the edit"),
            },
            &state,
            &progress,
        );

        assert_eq!(
            drain_events(&mut rx),
            vec![ProgressEvent::thinking("planning the edit")]
        );
    }

    #[tokio::test]
    async fn unknown_updates_are_ignored() {
        let progress = ProgressBus::new();
        let mut rx = progress.subscribe();
        let state = Mutex::new(PromptState::default());

        apply_session_update(SessionUpdate::Other("plan".into()), &state, &progress);
        assert!(drain_events(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn completed_update_without_remembered_name_uses_metadata() {
        let progress = ProgressBus::new();
        let mut rx = progress.subscribe();
        let state = Mutex::new(PromptState::default());

        apply_session_update(
            SessionUpdate::ToolCallUpdate(json!({
                "toolCallId": "unseen",
                "status": "failed",
                "title": "Write",
                "locations": [{"path": "notes/a.md", "line": 7}]
            })),
            &state,
            &progress,
        );

        assert_eq!(
            drain_events(&mut rx),
            vec![ProgressEvent::tool_use(
                "Write",
                Some("notes/a.md:7".into()),
                Some(ToolUseStatus::Completed)
            )]
        );
    }

    #[test]
    fn advertised_thought_level_requires_a_matching_value() {
        let options: Vec<types::ConfigOption> = serde_json::from_value(json!([
            {
                "id": "thought-level",
                "category": "thought_level",
                "options": [
                    {"id": "low"},
                    {"id": "high"}
                ]
            }
        ]))
        .unwrap();

        assert_eq!(
            advertised_thought_level(&options, "high"),
            Some("thought-level".to_string())
        );
        assert_eq!(advertised_thought_level(&options, "ultra"), None);
        assert_eq!(advertised_thought_level(&[], "low"), None);
    }
}
