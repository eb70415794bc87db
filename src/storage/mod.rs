//! Storage module: the transport seam and its in-memory implementation

pub mod memory_store;

pub use memory_store::MemoryStore;

use crate::protocol::{Command, Response};
use async_trait::async_trait;

/// Failures raised by a transport while talking to the store
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("server replied with error: {0}")]
    Server(String),

    #[error("unexpected reply: {0}")]
    Protocol(String),

    #[error("connection closed")]
    Closed,
}

/// Something that can run store commands.
///
/// `execute_atomic` must apply the whole batch as one indivisible step:
/// no command from another caller may interleave with it.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, command: Command) -> Result<Response, TransportError>;

    async fn execute_atomic(&self, commands: Vec<Command>)
    -> Result<Vec<Response>, TransportError>;

    /// Release the underlying connection. Later calls fail with `Closed`.
    async fn close(&self) {}
}
