//! Agent Client Protocol (ACP) client over child-process stdio.
//!
//! This crate owns the persistent-connection half of the executor subsystem:
//! it spawns a provider's agent in ACP mode and drives it over newline-
//! delimited JSON-RPC messages on the child's standard streams.
//!
//! # Architecture
//!
//! ```text
//! +-----------+     +------------------+     +---------------------+
//! | chat view |---->|    AcpClient     |---->|  agent subprocess   |
//! | (host)    |     |  (this crate)    |     |  (claude / gemini)  |
//! +-----------+     +------------------+     +---------------------+
//!                        |        |
//!              connection.rs   transport.rs
//!              (RPC multiplex) (NDJSON framing)
//! ```
//!
//! - `transport` - bridges raw byte streams into a framed duplex message
//!   channel with backpressure and orderly shutdown
//! - `connection` - JSON-RPC request/response correlation plus inbound
//!   request and notification routing
//! - `types` - wire types and the content shape-sniffing strategies
//! - `permissions` - the permission-request callback seam
//! - `client` - the session state machine the host talks to

pub mod client;
pub mod connection;
pub mod error;
pub mod permissions;
pub mod transport;
pub mod types;

pub use client::{AcpClient, PromptOutcome, ThinkingOption};
pub use connection::{AcpConnection, InboundChannels, IncomingNotification, IncomingRequest};
pub use error::{AcpError, Result};
pub use permissions::{
    AllowFirstOption, PermissionHandler, PermissionOption, PermissionReply, PermissionRequest,
};
pub use transport::MessageStream;
pub use types::{ConfigOption, ModelInfo, SessionModelState, SessionUpdate};
