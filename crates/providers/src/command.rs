//! Executable resolution and argv/env assembly.
//!
//! A custom command override, when present, replaces the provider's default
//! program and baseline arguments wholesale; configured extra arguments are
//! appended in both cases. Executables given as bare names are resolved via
//! PATH first, then a short list of home-relative install locations.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ProviderError;
use crate::kind::ProviderKind;
use crate::settings::ProviderSettings;

/// A fully assembled agent invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Whether the prompt is written to stdin (and stdin then closed) rather
    /// than appended as a trailing positional argument.
    pub prompt_via_stdin: bool,
}

impl AgentCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            prompt_via_stdin: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Resolve an executable name to a concrete path.
///
/// Names containing a path separator are taken verbatim. Bare names are
/// looked up on PATH, then in the provider's known install locations
/// (home-relative entries joined onto the user's home directory).
pub fn resolve_program(kind: ProviderKind, name: &str) -> Result<PathBuf, ProviderError> {
    if name.contains(std::path::MAIN_SEPARATOR) {
        return Ok(PathBuf::from(name));
    }

    if let Ok(path) = which::which(name) {
        debug!(provider = %kind, path = %path.display(), "resolved executable on PATH");
        return Ok(path);
    }

    let mut searched = Vec::new();
    let home = dirs::home_dir();
    for candidate in kind.fallback_paths() {
        let full = if candidate.starts_with('/') {
            PathBuf::from(candidate)
        } else if let Some(home) = &home {
            home.join(candidate)
        } else {
            continue;
        };
        if full.is_file() {
            debug!(provider = %kind, path = %full.display(), "resolved executable via fallback path");
            return Ok(full);
        }
        searched.push(full);
    }

    Err(ProviderError::ExecutableNotFound {
        kind,
        name: name.to_string(),
        searched,
    })
}

/// Build the one-shot invocation for a provider.
///
/// Does not include the prompt itself; the runner appends it (or writes it to
/// stdin) according to `prompt_via_stdin`.
pub fn one_shot_command(
    kind: ProviderKind,
    settings: &ProviderSettings,
) -> Result<AgentCommand, ProviderError> {
    if !settings.enabled {
        return Err(ProviderError::Disabled(kind));
    }

    let mut command = match &settings.custom_command {
        Some(custom) => split_custom_command(kind, custom)?,
        None => {
            let (program, args) = kind.default_command();
            AgentCommand::new(resolve_program(kind, program)?).args(args.iter().copied())
        }
    };

    if let Some(model) = &settings.model {
        command = command.arg(kind.model_flag()).arg(model);
    }
    command = command.args(settings.extra_args.iter().cloned());
    command.prompt_via_stdin = kind.prompt_via_stdin();
    command.env = sorted_env(settings);
    Ok(command)
}

/// Build the ACP-mode invocation for a provider.
pub fn acp_command(
    kind: ProviderKind,
    settings: &ProviderSettings,
) -> Result<AgentCommand, ProviderError> {
    if !settings.enabled {
        return Err(ProviderError::Disabled(kind));
    }

    let mut command = match (&settings.acp_command, kind.acp_command()) {
        (Some(custom), _) => split_custom_command(kind, custom)?,
        (None, Some((program, args))) => {
            AgentCommand::new(resolve_program(kind, program)?).args(args.iter().copied())
        }
        (None, None) => return Err(ProviderError::AcpUnsupported(kind)),
    };

    command = command.args(settings.extra_args.iter().cloned());
    command.env = sorted_env(settings);
    Ok(command)
}

/// A custom command override is a full command line: program plus arguments,
/// split on whitespace.
fn split_custom_command(kind: ProviderKind, custom: &str) -> Result<AgentCommand, ProviderError> {
    let mut parts = custom.split_whitespace();
    let program = parts
        .next()
        .ok_or(ProviderError::EmptyCustomCommand(kind))?;
    Ok(AgentCommand::new(resolve_program(kind, program)?).args(parts.map(str::to_string)))
}

fn sorted_env(settings: &ProviderSettings) -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = settings
        .env
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    env.sort();
    env
}

/// Build the command used to query a provider's model list, if its CLI
/// exposes one.
pub fn model_list_command(
    kind: ProviderKind,
    settings: &ProviderSettings,
) -> Result<Option<AgentCommand>, ProviderError> {
    let Some(args) = kind.model_list_args() else {
        return Ok(None);
    };
    let program = match &settings.custom_command {
        Some(custom) => custom
            .split_whitespace()
            .next()
            .ok_or(ProviderError::EmptyCustomCommand(kind))?
            .to_string(),
        None => kind.default_command().0.to_string(),
    };
    let mut command = AgentCommand::new(resolve_program(kind, &program)?);
    command = command.args(args.iter().copied());
    command.env = sorted_env(settings);
    Ok(Some(command))
}
