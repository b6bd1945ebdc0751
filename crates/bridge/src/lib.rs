//! Host-facing facade over both executors.
//!
//! The note-taking application talks to this crate only. Per request it
//! selects the executor from the provider's configuration - a persistent ACP
//! session when `use_acp` is set (and the provider supports it), the
//! one-shot process runner otherwise - and funnels everything into one
//! progress stream and one response shape.
//!
//! Settings are re-read from the shared handle at every `execute()` /
//! `connect()` boundary, so host-side settings changes apply to the next
//! call without re-building the bridge. Switching the active provider tears
//! down the previous provider's persistent session.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use acp::{AcpClient, AcpError, PermissionHandler, ThinkingOption};
use models::ModelCatalog;
use parking_lot::RwLock;
use progress::{ExecutionRequest, LlmResponse, ProgressBus, ProgressEvent};
use providers::{ProviderError, ProviderKind, Settings};
use runner::ProcessRunner;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Acp(#[from] AcpError),
}

/// The integration layer's single entry point.
pub struct AgentBridge {
    settings: Arc<RwLock<Settings>>,
    runner: ProcessRunner,
    acp: AcpClient,
    catalog: ModelCatalog,
    progress: ProgressBus,
}

impl AgentBridge {
    pub fn new(settings: Settings) -> Self {
        Self::with_shared_settings(Arc::new(RwLock::new(settings)))
    }

    /// Build over a settings handle the host mutates in place.
    pub fn with_shared_settings(settings: Arc<RwLock<Settings>>) -> Self {
        let progress = ProgressBus::new();
        Self {
            settings,
            runner: ProcessRunner::new(),
            acp: AcpClient::new(progress.clone()),
            catalog: ModelCatalog::new(),
            progress,
        }
    }

    /// Install a permission policy for ACP sessions connected from now on.
    pub fn with_permission_handler(mut self, handler: Arc<dyn PermissionHandler>) -> Self {
        self.acp = AcpClient::new(self.progress.clone()).with_permission_handler(handler);
        self
    }

    /// Replace the persisted settings snapshot.
    pub fn update_settings(&self, settings: Settings) {
        *self.settings.write() = settings;
    }

    /// Subscribe to the unified progress stream (both executors emit here).
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ProgressEvent> {
        self.progress.subscribe()
    }

    pub fn progress(&self) -> &ProgressBus {
        &self.progress
    }

    /// Run one prompt to completion, selecting the executor per provider
    /// configuration. Always yields a well-formed response; failures are in
    /// its `error` field.
    pub async fn execute(&self, request: ExecutionRequest) -> LlmResponse {
        let settings = self.settings.read().clone();
        let provider_settings = settings.provider(request.provider);

        if provider_settings.use_acp {
            self.execute_acp(request, &settings).await
        } else {
            self.progress
                .emit(ProgressEvent::status(format!("Running {}…", request.provider)));
            self.runner.execute(&request, &settings, &self.progress).await
        }
    }

    async fn execute_acp(&self, request: ExecutionRequest, settings: &Settings) -> LlmResponse {
        let started = Instant::now();
        let cwd = request
            .cwd
            .clone()
            .unwrap_or_else(|| std::env::temp_dir());

        self.progress.emit(ProgressEvent::status(format!(
            "Connecting to {}…",
            request.provider
        )));

        if let Err(err) = self.connect(request.provider, cwd).await {
            return LlmResponse {
                content: String::new(),
                provider: request.provider,
                tokens: None,
                cost: None,
                duration: started.elapsed(),
                error: Some(err.to_string()),
            };
        }

        match self.acp.prompt(&request.prompt).await {
            Ok(outcome) => LlmResponse {
                content: outcome.content,
                provider: request.provider,
                tokens: None,
                cost: None,
                duration: started.elapsed(),
                error: outcome.error,
            },
            Err(err) => LlmResponse {
                content: String::new(),
                provider: request.provider,
                tokens: None,
                cost: None,
                duration: started.elapsed(),
                error: Some(err.to_string()),
            },
        }
    }

    /// Establish (or reuse) the persistent session for a provider.
    ///
    /// Connecting to a different provider than the current session's tears
    /// the old one down first (inside the client), and its ACP-tier model
    /// cache entry is invalidated here.
    pub async fn connect(&self, provider: ProviderKind, cwd: PathBuf) -> Result<(), BridgeError> {
        let settings = self.settings.read().clone();

        if let Some(previous) = self.acp.provider().await {
            if previous != provider {
                debug!(%previous, %provider, "provider switch invalidates previous session");
                self.catalog.clear_acp_models(previous);
            }
        }

        self.acp.connect(provider, &cwd, &settings).await?;

        let reported: Vec<String> = self
            .acp
            .available_models()
            .await
            .into_iter()
            .map(|model| model.model_id)
            .collect();
        if !reported.is_empty() {
            self.catalog.set_acp_models(provider, reported);
        }
        info!(%provider, "agent session ready");
        Ok(())
    }

    /// Prompt over the persistent session. Precondition: a successful
    /// `connect()`; one in-flight prompt per session.
    pub async fn prompt(&self, text: &str) -> Result<acp::PromptOutcome, BridgeError> {
        Ok(self.acp.prompt(text).await?)
    }

    /// Cancel in-flight work on both executors. Safe when idle.
    pub async fn cancel(&self) {
        self.runner.cancel();
        self.acp.cancel().await;
    }

    /// Tear down the persistent session (if any) and drop its ACP-tier model
    /// cache entry. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        if let Some(provider) = self.acp.provider().await {
            self.catalog.clear_acp_models(provider);
        }
        self.acp.disconnect().await;
    }

    pub async fn is_connected(&self) -> bool {
        self.acp.is_connected().await
    }

    /// The session's current model id, when an ACP session is live.
    pub async fn current_model(&self) -> Option<String> {
        self.acp.current_model().await
    }

    /// Model list for a provider via the three-tier catalog.
    pub async fn available_models(&self, provider: ProviderKind) -> Vec<String> {
        let settings = self.settings.read().clone();
        self.catalog.fetch_models(provider, &settings).await
    }

    pub async fn thinking_options(&self) -> Option<Vec<ThinkingOption>> {
        self.acp.thinking_options().await
    }

    pub async fn set_thinking_mode(&self, value: &str) -> bool {
        self.acp.set_thinking_mode(value).await
    }
}
