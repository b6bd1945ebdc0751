//! Persisted provider configuration.
//!
//! The host application owns the settings store; this crate only defines the
//! shape. Executors are handed a fresh snapshot at every `connect()` /
//! `execute()` boundary and must not cache mutable fields such as timeouts or
//! enablement across calls.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::kind::ProviderKind;

/// Global default for one-shot command timeouts, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Per-provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Whether this provider may be used at all.
    pub enabled: bool,
    /// Model identifier passed to the CLI / applied to the ACP session.
    pub model: Option<String>,
    /// Full command-line override for one-shot mode. Replaces the default
    /// program *and* its baseline arguments; split on whitespace.
    pub custom_command: Option<String>,
    /// Extra arguments appended after the baseline (or custom) arguments.
    pub extra_args: Vec<String>,
    /// Environment variable overrides merged over the inherited environment.
    pub env: HashMap<String, String>,
    /// One-shot timeout override, in seconds.
    pub timeout_secs: Option<u64>,
    /// Whether to drive this provider over a persistent ACP connection
    /// instead of one-shot subprocesses.
    pub use_acp: bool,
    /// Full command-line override for ACP mode.
    pub acp_command: Option<String>,
    /// Selected thinking-mode / thought-level value, applied best-effort
    /// after an ACP connect.
    pub thinking_mode: Option<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            model: None,
            custom_command: None,
            extra_args: Vec::new(),
            env: HashMap::new(),
            timeout_secs: None,
            use_acp: false,
            acp_command: None,
            thinking_mode: None,
        }
    }
}

/// The full persisted configuration the host hands to the integration layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Fallback timeout for providers without an override, in seconds.
    pub default_timeout_secs: u64,
    pub providers: HashMap<ProviderKind, ProviderSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            providers: HashMap::new(),
        }
    }
}

impl Settings {
    /// Settings for one provider, falling back to defaults when the host has
    /// never configured it.
    pub fn provider(&self, kind: ProviderKind) -> ProviderSettings {
        self.providers.get(&kind).cloned().unwrap_or_default()
    }

    /// Effective one-shot timeout for one provider, in seconds.
    pub fn timeout_secs(&self, kind: ProviderKind) -> u64 {
        self.provider(kind)
            .timeout_secs
            .unwrap_or(self.default_timeout_secs)
    }
}
