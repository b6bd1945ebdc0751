//! Three-tier model/capability cache.
//!
//! "What models can I pick for provider X" resolves through three tiers:
//!
//! 1. models reported by an active ACP session - exact and current, they
//!    supersede everything else whenever present and non-empty
//! 2. a TTL-bounded cache of models queried from the provider's CLI, for the
//!    providers whose CLI has a listing subcommand
//! 3. a static per-provider fallback list
//!
//! A failing CLI query (missing binary, non-zero exit, garbage output) falls
//! through to the static list without surfacing an error. Entries are keyed
//! per provider; disconnecting an ACP session clears that provider's ACP
//! tier only. The catalog is process-scoped state with an explicit
//! lifecycle - populate on connect, invalidate on disconnect, expire on
//! read - and explicit clear functions for test isolation.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use providers::{ProviderKind, Settings, command::model_list_command};
use tracing::{debug, warn};

/// How long a CLI-queried model list stays fresh.
pub const CLI_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Upper bound on a model-listing subprocess.
const CLI_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

struct CliEntry {
    models: Vec<String>,
    fetched_at: Instant,
}

/// Process-scoped model catalog.
pub struct ModelCatalog {
    acp: Mutex<HashMap<ProviderKind, Vec<String>>>,
    cli: Mutex<HashMap<ProviderKind, CliEntry>>,
    ttl: Duration,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::with_ttl(CLI_CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            acp: Mutex::new(HashMap::new()),
            cli: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Record the models an ACP session reported for a provider.
    pub fn set_acp_models(&self, kind: ProviderKind, models: Vec<String>) {
        if models.is_empty() {
            return;
        }
        self.acp.lock().insert(kind, models);
    }

    /// Drop the ACP tier for one provider (on session disconnect). The CLI
    /// tier and static fallback are unaffected.
    pub fn clear_acp_models(&self, kind: ProviderKind) {
        self.acp.lock().remove(&kind);
    }

    /// Drop everything. Test isolation hook.
    pub fn clear(&self) {
        self.acp.lock().clear();
        self.cli.lock().clear();
    }

    /// Resolve the model list for a provider through the three tiers.
    /// Never fails; the static fallback is always available.
    pub async fn fetch_models(&self, kind: ProviderKind, settings: &Settings) -> Vec<String> {
        if let Some(models) = self.acp.lock().get(&kind) {
            if !models.is_empty() {
                return models.clone();
            }
        }

        if let Some(entry) = self.cli.lock().get(&kind) {
            if entry.fetched_at.elapsed() < self.ttl {
                return entry.models.clone();
            }
        }

        if let Some(models) = query_cli_models(kind, settings).await {
            self.cli.lock().insert(
                kind,
                CliEntry {
                    models: models.clone(),
                    fetched_at: Instant::now(),
                },
            );
            return models;
        }

        static_models(kind)
    }
}

fn static_models(kind: ProviderKind) -> Vec<String> {
    kind.static_models()
        .iter()
        .map(|model| model.to_string())
        .collect()
}

/// Ask the provider's CLI for its model list. Any failure is `None`.
async fn query_cli_models(kind: ProviderKind, settings: &Settings) -> Option<Vec<String>> {
    let provider_settings = settings.provider(kind);
    let command = match model_list_command(kind, &provider_settings) {
        Ok(Some(command)) => command,
        Ok(None) => return None,
        Err(err) => {
            debug!(provider = %kind, error = %err, "model listing unavailable");
            return None;
        }
    };

    let mut cmd = tokio::process::Command::new(&command.program);
    cmd.args(&command.args);
    for (key, value) in &command.env {
        cmd.env(key, value);
    }
    cmd.stdin(std::process::Stdio::null()).kill_on_drop(true);

    let output = match tokio::time::timeout(CLI_QUERY_TIMEOUT, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            warn!(provider = %kind, error = %err, "model listing failed to run");
            return None;
        }
        Err(_) => {
            warn!(provider = %kind, "model listing timed out");
            return None;
        }
    };

    if !output.status.success() {
        warn!(provider = %kind, status = %output.status, "model listing exited non-zero");
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let models: Vec<String> = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if models.is_empty() { None } else { Some(models) }
}
