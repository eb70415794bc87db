//! Redis client transport built on the `redis` crate

use crate::config::Config;
use crate::protocol::{Command, Response};
use crate::storage::{Transport, TransportError};
use async_trait::async_trait;
use redis::Value;
use redis::aio::ConnectionManager;
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, info};

/// Transport over a multiplexed, auto-reconnecting Redis connection.
pub struct RedisClient {
    conn: RwLock<Option<ConnectionManager>>,
    permits: Semaphore,
    addr: String,
}

impl RedisClient {
    /// Connect to the server described by `config`.
    pub async fn connect(config: &Config) -> Result<Self, TransportError> {
        let client = redis::Client::open(config.connection_info())?;
        let conn = ConnectionManager::new(client).await?;
        info!(
            "Connected to {} (db {}, name {})",
            config.address(),
            config.database,
            config.name
        );

        Ok(RedisClient {
            conn: RwLock::new(Some(conn)),
            permits: Semaphore::new(config.pool_size),
            addr: config.address(),
        })
    }

    /// Server address this client talks to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn connection(&self) -> Result<ConnectionManager, TransportError> {
        self.conn.read().await.clone().ok_or(TransportError::Closed)
    }
}

#[async_trait]
impl Transport for RedisClient {
    async fn execute(&self, command: Command) -> Result<Response, TransportError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| TransportError::Closed)?;
        let mut conn = self.connection().await?;

        debug!("Sending: {} {}", command.name(), command.key());
        let value: Value = command.to_cmd().query_async(&mut conn).await?;

        let response = into_response(value)?;
        Ok(match (&command, response) {
            (Command::Info { .. }, Response::Value(text)) => {
                Response::Info(String::from_utf8_lossy(&text).into_owned())
            }
            (_, response) => response,
        })
    }

    async fn execute_atomic(
        &self,
        commands: Vec<Command>,
    ) -> Result<Vec<Response>, TransportError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| TransportError::Closed)?;
        let mut conn = self.connection().await?;

        // MULTI ... EXEC, written to the socket as one pipeline
        let mut pipe = redis::pipe();
        pipe.atomic();
        for command in &commands {
            debug!("Queueing: {} {}", command.name(), command.key());
            pipe.add_command(command.to_cmd());
        }

        let values: Vec<Value> = pipe.query_async(&mut conn).await?;
        if values.len() != commands.len() {
            return Err(TransportError::Protocol(format!(
                "transaction returned {} replies for {} commands",
                values.len(),
                commands.len()
            )));
        }
        values.into_iter().map(into_response).collect()
    }

    async fn close(&self) {
        if self.conn.write().await.take().is_some() {
            self.permits.close();
            info!("Closed connection to {}", self.addr);
        }
    }
}

/// Map a raw reply onto the crate's response type.
fn into_response(value: Value) -> Result<Response, TransportError> {
    match value {
        Value::Nil => Ok(Response::Nil),
        Value::Okay => Ok(Response::Ok),
        Value::Int(n) => Ok(Response::Integer(n)),
        Value::BulkString(bytes) => Ok(Response::Value(bytes)),
        Value::SimpleString(s) => Ok(match s.as_str() {
            "OK" => Response::Ok,
            "PONG" => Response::Pong,
            _ => Response::Value(s.into_bytes()),
        }),
        Value::VerbatimString { text, .. } => Ok(Response::Value(text.into_bytes())),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::BulkString(bytes) => Ok(bytes),
                Value::SimpleString(s) => Ok(s.into_bytes()),
                other => Err(TransportError::Protocol(format!(
                    "unexpected list element {:?}",
                    other
                ))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Response::Array),
        other => Err(TransportError::Protocol(format!("{:?}", other))),
    }
}
