//! Redis Store - typed key/value and list access on top of a Redis client
//!
//! This crate provides a `Database` handle that:
//! - Encodes values (JSON or MessagePack) before writing them
//! - Decodes values on read, keeping "absent" distinct from zero values
//! - Pushes and pops list elements at both ends
//! - Pops several elements at once, natively on Redis >= 6.2 and through an
//!   atomic LRANGE + LTRIM transaction on older servers

pub mod client;
pub mod codec;
pub mod config;
pub mod database;
pub mod protocol;
pub mod storage;

pub use client::RedisClient;
pub use codec::{Codec, CodecError};
pub use config::Config;
pub use database::{Capabilities, Database, End};
pub use protocol::{Command, Response, ServerVersion};
pub use storage::{MemoryStore, Transport, TransportError};

/// Result type for redis-store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for redis-store
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("encode error for key \"{key}\": {source}")]
    Encode { key: String, source: CodecError },

    #[error("decode error for key \"{key}\": {source}")]
    Decode { key: String, source: CodecError },

    #[error("key \"{key}\" not found")]
    NotFound { key: String },

    #[error("no items in the list \"{key}\"")]
    EmptyList { key: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("store error during {op} on \"{key}\": {source}")]
    Store {
        op: &'static str,
        key: String,
        source: TransportError,
    },

    #[error("{op} on \"{key}\" cancelled: deadline exceeded")]
    Cancelled { op: &'static str, key: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for the expected absence outcomes (`NotFound`, `EmptyList`).
    pub fn is_absent(&self) -> bool {
        matches!(self, Error::NotFound { .. } | Error::EmptyList { .. })
    }
}
