//! Configuration and executable-resolution errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::kind::ProviderKind;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider is switched off in the persisted settings.
    #[error("provider `{0}` is disabled in settings")]
    Disabled(ProviderKind),

    /// ACP mode was requested for a provider that has no ACP-mode command.
    #[error("provider `{0}` does not support ACP mode")]
    AcpUnsupported(ProviderKind),

    /// The executable could not be found on PATH or in any known location.
    #[error("executable `{name}` for provider `{kind}` not found (searched PATH and {searched:?})")]
    ExecutableNotFound {
        kind: ProviderKind,
        name: String,
        searched: Vec<PathBuf>,
    },

    /// A custom command override was configured but empty.
    #[error("custom command for provider `{0}` is empty")]
    EmptyCustomCommand(ProviderKind),
}
