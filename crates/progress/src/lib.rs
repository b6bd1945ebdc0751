//! Normalized progress events and responses for agent executions.
//!
//! Both executors (the one-shot process runner and the persistent ACP client)
//! speak the same small vocabulary to the chat view:
//!
//! - `event` - the `ProgressEvent` union and the final `LlmResponse`
//! - `bus` - a typed multi-subscriber channel the executors emit into and the
//!   host drains
//! - `aggregate` - collapses a raw event stream into de-duplicated,
//!   human-meaningful status lines for display

pub mod aggregate;
pub mod bus;
pub mod event;

pub use aggregate::{AggregatorConfig, ProgressAggregator};
pub use bus::ProgressBus;
pub use event::{ExecutionRequest, LlmResponse, ProgressEvent, TokenUsage, ToolUseStatus};
