//! Channel to the identity service.
//!
//! The transport itself (platform service binding, NFC tag dispatch, native
//! callbacks) lives outside this crate. The flow controller only needs the
//! three capabilities captured by [`ChannelAdapter`], and receives the adapter
//! as an explicitly constructed dependency.

mod memory;

pub use memory::MemoryChannel;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors raised by a channel adapter.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Binding to the identity service failed
    #[error("Failed to bind identity service: {0}")]
    Bind(String),

    /// The adapter refused a command
    #[error("Identity service rejected command {0}")]
    Rejected(&'static str),

    /// A command could not be encoded
    #[error("Failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),

    /// The subscriber fell behind and messages were dropped
    #[error("Missed {0} messages from identity service")]
    Lagged(u64),

    /// The service side hung up
    #[error("Identity service message stream closed")]
    Closed,
}

/// Transport binding carrying commands to, and messages from, the identity
/// service.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Bring the channel up. Resolves once commands can be sent.
    async fn initialize(&self) -> Result<(), ChannelError>;

    /// Hand one JSON command to the service. `false` means it was not delivered.
    fn send(&self, command: &str) -> bool;

    /// Subscribe to raw JSON messages. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<String>;
}
