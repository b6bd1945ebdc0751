//! Error types for the ACP connection layer.

use std::time::Duration;

use providers::ProviderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcpError {
    /// Configuration problems: provider disabled, no ACP mode, executable
    /// unresolvable.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The agent process could not be started.
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// An operation requiring a live session was called without one.
    #[error("not connected to an agent")]
    NotConnected,

    /// The agent process exited while the handshake was still in flight.
    #[error("agent exited during startup ({0})")]
    StartupExit(String),

    /// The handshake did not complete within the startup window.
    #[error("agent did not complete the handshake within {0:?}")]
    StartupTimeout(Duration),

    /// The agent answered an RPC with an error object.
    #[error("agent returned error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The connection (or the process behind it) went away.
    #[error("agent connection closed")]
    ConnectionClosed,

    /// A message violated the protocol badly enough that we could not use it.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AcpError>;
