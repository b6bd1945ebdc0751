//! The fixed set of supported agent providers.
//!
//! Each provider has a CLI invocation convention: the default program and
//! arguments for one-shot execution, whether the prompt travels over stdin or
//! as a trailing positional argument, whether stdout is a line-oriented JSON
//! event stream (and therefore live-streamable), and - for the providers that
//! support it - the command that starts the agent in ACP mode.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the supported external agent implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Claude,
    Gemini,
    Codex,
    Opencode,
}

impl ProviderKind {
    /// All providers, in display order.
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Claude,
        ProviderKind::Gemini,
        ProviderKind::Codex,
        ProviderKind::Opencode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Claude => "claude",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Codex => "codex",
            ProviderKind::Opencode => "opencode",
        }
    }

    /// Default one-shot command: program plus baseline arguments.
    pub fn default_command(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            ProviderKind::Claude => ("claude", &["--print", "--output-format", "json"]),
            ProviderKind::Gemini => ("gemini", &["--output-format", "json"]),
            ProviderKind::Codex => ("codex", &["exec", "--json"]),
            ProviderKind::Opencode => ("opencode", &["run", "--format", "json"]),
        }
    }

    /// Command that starts this provider's agent in ACP mode, if it has one.
    pub fn acp_command(&self) -> Option<(&'static str, &'static [&'static str])> {
        match self {
            ProviderKind::Claude => Some(("claude-code-acp", &[])),
            ProviderKind::Gemini => Some(("gemini", &["--experimental-acp"])),
            ProviderKind::Codex | ProviderKind::Opencode => None,
        }
    }

    /// Whether the one-shot CLI reads the prompt from standard input.
    ///
    /// The other providers take the prompt as a trailing positional argument.
    pub fn prompt_via_stdin(&self) -> bool {
        matches!(self, ProviderKind::Gemini | ProviderKind::Opencode)
    }

    /// Whether stdout is a newline-delimited JSON event stream.
    ///
    /// Line-oriented providers can be streamed incrementally while the
    /// process is still running; the others only yield content at completion.
    pub fn line_oriented(&self) -> bool {
        matches!(self, ProviderKind::Codex | ProviderKind::Opencode)
    }

    /// The flag used to select a model on the one-shot CLI.
    pub fn model_flag(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "-m",
            _ => "--model",
        }
    }

    /// Arguments for the CLI's model-listing subcommand, if it has one.
    pub fn model_list_args(&self) -> Option<&'static [&'static str]> {
        match self {
            ProviderKind::Opencode => Some(&["models"]),
            _ => None,
        }
    }

    /// Hardcoded fallback model list, used when nothing better is known.
    pub fn static_models(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::Claude => &["sonnet", "opus", "haiku"],
            ProviderKind::Gemini => &["gemini-2.5-pro", "gemini-2.5-flash"],
            ProviderKind::Codex => &["gpt-5-codex", "gpt-5"],
            ProviderKind::Opencode => &["anthropic/claude-sonnet-4-5", "openai/gpt-5"],
        }
    }

    /// Home-relative (or absolute) locations searched when the executable is
    /// not on PATH. Mirrors where the popular installers drop these binaries.
    pub fn fallback_paths(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::Claude => &[
                ".claude/local/claude",
                ".npm-global/bin/claude",
                ".local/bin/claude",
                "/usr/local/bin/claude",
                "/opt/homebrew/bin/claude",
            ],
            ProviderKind::Gemini => &[
                ".npm-global/bin/gemini",
                ".local/bin/gemini",
                "/usr/local/bin/gemini",
                "/opt/homebrew/bin/gemini",
            ],
            ProviderKind::Codex => &[
                ".npm-global/bin/codex",
                ".local/bin/codex",
                "node_modules/.bin/codex",
                "/usr/local/bin/codex",
                "/opt/homebrew/bin/codex",
            ],
            ProviderKind::Opencode => &[
                ".opencode/bin/opencode",
                ".local/bin/opencode",
                "/usr/local/bin/opencode",
                "/opt/homebrew/bin/opencode",
            ],
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn exactly_two_providers_read_the_prompt_from_stdin() {
        let stdin_count = ProviderKind::ALL
            .iter()
            .filter(|k| k.prompt_via_stdin())
            .count();
        assert_eq!(stdin_count, 2);
    }

    #[test]
    fn line_oriented_providers_are_codex_and_opencode() {
        assert!(ProviderKind::Codex.line_oriented());
        assert!(ProviderKind::Opencode.line_oriented());
        assert!(!ProviderKind::Claude.line_oriented());
        assert!(!ProviderKind::Gemini.line_oriented());
    }

    #[test]
    fn acp_mode_is_limited_to_claude_and_gemini() {
        assert!(ProviderKind::Claude.acp_command().is_some());
        assert!(ProviderKind::Gemini.acp_command().is_some());
        assert!(ProviderKind::Codex.acp_command().is_none());
        assert!(ProviderKind::Opencode.acp_command().is_none());
    }

    #[test]
    fn every_provider_has_a_static_model_fallback() {
        for kind in ProviderKind::ALL {
            assert!(!kind.static_models().is_empty(), "{kind} has no fallback");
        }
    }

    #[test]
    fn serde_round_trips_lowercase_names() {
        let json = serde_json::to_string(&ProviderKind::Opencode).unwrap();
        assert_eq!(json, "\"opencode\"");
        let back: ProviderKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ProviderKind::Opencode);
    }
}
