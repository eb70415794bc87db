//! Typed key/value and list access with encoding at the store boundary

use crate::client::RedisClient;
use crate::codec::Codec;
use crate::config::Config;
use crate::protocol::{Command, Parser, Response, ServerVersion};
use crate::storage::{Transport, TransportError};
use crate::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// List end addressed by a push or pop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum End {
    Left,
    Right,
}

/// Server features discovered once per database handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub server_version: ServerVersion,
    /// `LPOP`/`RPOP` accept a count and remove the elements atomically
    pub atomic_pop_count: bool,
}

impl Capabilities {
    pub fn from_version(server_version: ServerVersion) -> Self {
        Capabilities {
            server_version,
            atomic_pop_count: server_version.supports_pop_count(),
        }
    }
}

/// Handle to one logical Redis database.
///
/// Values are encoded with the configured [`Codec`] on every write and
/// decoded into the caller's type on every read. Cloning is cheap; clones
/// share the transport and the probed [`Capabilities`].
#[derive(Clone)]
pub struct Database {
    transport: Arc<dyn Transport>,
    codec: Codec,
    timeout: Option<Duration>,
    capabilities: Arc<OnceCell<Capabilities>>,
}

impl Database {
    /// Connect to a Redis server, check it answers and probe its features.
    pub async fn connect(config: Config) -> Result<Self> {
        config.validate()?;
        let client = RedisClient::connect(&config)
            .await
            .map_err(|source| Error::Store {
                op: "connect",
                key: String::new(),
                source,
            })?;

        let db = Database::from_transport(Arc::new(client), config.codec)
            .with_timeout(config.command_timeout);
        db.ping().await?;
        let caps = db.capabilities().await?;
        info!(
            "Database \"{}\" ready: redis {} (atomic pop count: {})",
            config.name, caps.server_version, caps.atomic_pop_count
        );
        Ok(db)
    }

    /// Wrap an existing transport. The capability probe runs on first use.
    pub fn from_transport(transport: Arc<dyn Transport>, codec: Codec) -> Self {
        Database {
            transport,
            codec,
            timeout: None,
            capabilities: Arc::new(OnceCell::new()),
        }
    }

    /// Same handle with a deadline applied to every operation.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Features of the connected server, probed once via `INFO server`.
    ///
    /// Concurrent first callers share a single probe.
    pub async fn capabilities(&self) -> Result<Capabilities> {
        self.capabilities
            .get_or_try_init(|| async {
                let info = match self.run(Command::Info {
                    section: Some("server".to_string()),
                })
                .await?
                {
                    Response::Info(text) => text,
                    Response::Value(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                    other => return Err(unexpected("info", "", other)),
                };
                let version = Parser::parse_version(&info).map_err(|msg| Error::Store {
                    op: "info",
                    key: String::new(),
                    source: TransportError::Protocol(msg),
                })?;
                debug!("Probed server version {}", version);
                Ok::<_, Error>(Capabilities::from_version(version))
            })
            .await
            .copied()
    }

    /// Round-trip a `PING`
    pub async fn ping(&self) -> Result<()> {
        match self.run(Command::Ping).await? {
            Response::Pong => Ok(()),
            other => Err(unexpected("ping", "", other)),
        }
    }

    // ==================== Key/value ====================

    /// Encode `value` and store it under `key`, replacing any previous value.
    ///
    /// A `ttl` of `None` or zero keeps the key until it is deleted.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let value = self.encode(key, value)?;
        let ttl_ms = ttl
            .filter(|ttl| !ttl.is_zero())
            // PX takes whole milliseconds; never round a live TTL down to zero
            .map(|ttl| ttl.as_millis().clamp(1, u64::MAX as u128) as u64);
        let command = Command::Set {
            key: key.to_string(),
            value,
            ttl_ms,
        };
        match self.run(command).await? {
            Response::Ok => Ok(()),
            other => Err(unexpected("set", key, other)),
        }
    }

    /// Read and decode the value stored under `key`.
    ///
    /// A missing key, or an empty stored value, is `NotFound`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let command = Command::Get {
            key: key.to_string(),
        };
        match self.run(command).await? {
            Response::Value(bytes) if !bytes.is_empty() => self.decode(key, &bytes),
            Response::Value(_) | Response::Nil => Err(Error::NotFound {
                key: key.to_string(),
            }),
            other => Err(unexpected("get", key, other)),
        }
    }

    pub async fn get_string(&self, key: &str) -> Result<String> {
        self.get(key).await
    }

    pub async fn get_int(&self, key: &str) -> Result<i64> {
        self.get(key).await
    }

    pub async fn get_float(&self, key: &str) -> Result<f64> {
        self.get(key).await
    }

    pub async fn get_bool(&self, key: &str) -> Result<bool> {
        self.get(key).await
    }

    /// Remove `key`. Removing a missing key is not an error.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let command = Command::Del {
            key: key.to_string(),
        };
        match self.run(command).await? {
            Response::Integer(_) => Ok(()),
            other => Err(unexpected("delete", key, other)),
        }
    }

    // ==================== Lists ====================

    /// Push onto the head of the list; returns the new length.
    pub async fn lpush<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<u64> {
        self.push(End::Left, key, value).await
    }

    /// Push onto the tail of the list; returns the new length.
    pub async fn rpush<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<u64> {
        self.push(End::Right, key, value).await
    }

    pub async fn push<T: Serialize + ?Sized>(&self, end: End, key: &str, value: &T) -> Result<u64> {
        let value = self.encode(key, value)?;
        let key_owned = key.to_string();
        let command = match end {
            End::Left => Command::LPush {
                key: key_owned,
                value,
            },
            End::Right => Command::RPush {
                key: key_owned,
                value,
            },
        };
        match self.run(command).await? {
            Response::Integer(len) => Ok(len.max(0) as u64),
            other => Err(unexpected("push", key, other)),
        }
    }

    pub async fn lpop<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.pop(End::Left, key).await
    }

    pub async fn rpop<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.pop(End::Right, key).await
    }

    /// Remove and decode one element; `EmptyList` when there is none.
    pub async fn pop<T: DeserializeOwned>(&self, end: End, key: &str) -> Result<T> {
        let command = pop_command(end, key, None);
        match self.run(command).await? {
            Response::Value(bytes) => self.decode(key, &bytes),
            Response::Nil => Err(Error::EmptyList {
                key: key.to_string(),
            }),
            other => Err(unexpected("pop", key, other)),
        }
    }

    /// Number of elements in the list; 0 when it does not exist.
    pub async fn len(&self, key: &str) -> Result<u64> {
        let command = Command::LLen {
            key: key.to_string(),
        };
        match self.run(command).await? {
            Response::Integer(len) => Ok(len.max(0) as u64),
            other => Err(unexpected("len", key, other)),
        }
    }

    pub async fn lpop_count<T: DeserializeOwned>(&self, key: &str, count: i64) -> Result<Vec<T>> {
        self.pop_count(End::Left, key, count).await
    }

    pub async fn rpop_count<T: DeserializeOwned>(&self, key: &str, count: i64) -> Result<Vec<T>> {
        self.pop_count(End::Right, key, count).await
    }

    /// Remove up to `count` elements from one end, returned in removal order.
    ///
    /// Servers from 6.2 on do this with a single `LPOP`/`RPOP key count`.
    /// Older servers get an `LRANGE` + `LTRIM` pair sent as one `MULTI/EXEC`
    /// transaction. That fallback is only as safe as the store's
    /// transaction: if the store does not apply the pair atomically, a
    /// concurrent popper can receive the same elements or cause elements
    /// to be skipped.
    ///
    /// Fails with `InvalidArgument` for `count <= 0` without touching the
    /// store, and with `EmptyList` when nothing is there to pop.
    pub async fn pop_count<T: DeserializeOwned>(
        &self,
        end: End,
        key: &str,
        count: i64,
    ) -> Result<Vec<T>> {
        if count <= 0 {
            return Err(Error::InvalidArgument(format!(
                "pop count for \"{}\" must be positive, got {}",
                key, count
            )));
        }

        let raw = if self.capabilities().await?.atomic_pop_count {
            match self.run(pop_command(end, key, Some(count as u64))).await? {
                Response::Array(items) => items,
                Response::Nil => Vec::new(),
                other => return Err(unexpected("pop count", key, other)),
            }
        } else {
            warn!(
                "Server lacks pop count; emulating with LRANGE + LTRIM on \"{}\"",
                key
            );
            self.range_and_trim(end, key, count).await?
        };

        if raw.is_empty() {
            return Err(Error::EmptyList {
                key: key.to_string(),
            });
        }
        raw.iter().map(|bytes| self.decode(key, bytes)).collect()
    }

    async fn range_and_trim(&self, end: End, key: &str, count: i64) -> Result<Vec<Vec<u8>>> {
        let key_owned = key.to_string();
        // read exactly the positions the trim drops
        let (range, trim) = match end {
            End::Left => (
                Command::LRange {
                    key: key_owned.clone(),
                    start: 0,
                    stop: count - 1,
                },
                Command::LTrim {
                    key: key_owned,
                    start: count,
                    stop: -1,
                },
            ),
            End::Right => (
                Command::LRange {
                    key: key_owned.clone(),
                    start: -count,
                    stop: -1,
                },
                Command::LTrim {
                    key: key_owned,
                    start: 0,
                    stop: -count - 1,
                },
            ),
        };

        let mut replies = self.run_atomic("pop count", key, vec![range, trim]).await?;
        let trimmed = replies.pop();
        let ranged = replies.pop();
        match (ranged, trimmed) {
            (Some(Response::Array(mut items)), Some(Response::Ok)) => {
                if end == End::Right {
                    items.reverse();
                }
                Ok(items)
            }
            (Some(Response::Error(msg)), _) | (_, Some(Response::Error(msg))) => {
                Err(store_error("pop count", key, TransportError::Server(msg)))
            }
            (ranged, trimmed) => Err(Error::Store {
                op: "pop count",
                key: key.to_string(),
                source: TransportError::Protocol(format!(
                    "unexpected transaction replies {:?}, {:?}",
                    ranged, trimmed
                )),
            }),
        }
    }

    /// Release the connection. Operations on any clone fail afterwards.
    pub async fn close(&self) {
        self.transport.close().await;
    }

    // ==================== Plumbing ====================

    fn encode<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<Vec<u8>> {
        self.codec.encode(value).map_err(|source| Error::Encode {
            key: key.to_string(),
            source,
        })
    }

    fn decode<T: DeserializeOwned>(&self, key: &str, bytes: &[u8]) -> Result<T> {
        self.codec.decode(bytes).map_err(|source| Error::Decode {
            key: key.to_string(),
            source,
        })
    }

    /// Execute one command under the deadline, turning error replies into
    /// `Store` errors.
    async fn run(&self, command: Command) -> Result<Response> {
        let op = command.name();
        let key = command.key().to_string();
        let response = self
            .deadline(op, &key, self.transport.execute(command))
            .await?;
        match response {
            Response::Error(msg) => Err(store_error(op, &key, TransportError::Server(msg))),
            response => Ok(response),
        }
    }

    async fn run_atomic(
        &self,
        op: &'static str,
        key: &str,
        commands: Vec<Command>,
    ) -> Result<Vec<Response>> {
        self.deadline(op, key, self.transport.execute_atomic(commands))
            .await
    }

    async fn deadline<T, F>(&self, op: &'static str, key: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, TransportError>>,
    {
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| Error::Cancelled {
                    op,
                    key: key.to_string(),
                })?,
            None => fut.await,
        };
        result.map_err(|source| store_error(op, key, source))
    }
}

fn pop_command(end: End, key: &str, count: Option<u64>) -> Command {
    let key = key.to_string();
    match end {
        End::Left => Command::LPop { key, count },
        End::Right => Command::RPop { key, count },
    }
}

fn store_error(op: &'static str, key: &str, source: TransportError) -> Error {
    Error::Store {
        op,
        key: key.to_string(),
        source,
    }
}

fn unexpected(op: &'static str, key: &str, response: Response) -> Error {
    store_error(
        op,
        key,
        TransportError::Protocol(format!("unexpected reply {:?}", response)),
    )
}
