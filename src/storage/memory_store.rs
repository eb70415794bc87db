//! In-memory storage implementation

use crate::protocol::{Command, Response, ServerVersion};
use crate::storage::{Transport, TransportError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

#[derive(Debug, Clone)]
enum Value {
    String(Vec<u8>),
    List(VecDeque<Vec<u8>>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expire_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expire_at.is_some_and(|t| now >= t)
    }
}

struct State {
    data: HashMap<String, Entry>,
    version: ServerVersion,
    ops_count: u64,
    closed: bool,
}

/// In-process key/value and list store speaking the same commands as Redis.
///
/// Expiry follows the tokio clock, so tests can pause and advance time.
/// The reported server version decides whether `LPOP`/`RPOP` accept a count.
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    /// Create an empty store reporting a current server version
    pub fn new() -> Self {
        Self::with_version(ServerVersion::new(7, 2, 4))
    }

    /// Create an empty store that behaves like the given server release
    pub fn with_version(version: ServerVersion) -> Self {
        MemoryStore {
            state: RwLock::new(State {
                data: HashMap::new(),
                version,
                ops_count: 0,
                closed: false,
            }),
        }
    }

    /// Number of commands applied so far
    pub async fn ops_count(&self) -> u64 {
        self.state.read().await.ops_count
    }

    /// Number of live keys
    pub async fn len(&self) -> usize {
        let state = self.state.read().await;
        let now = Instant::now();
        state.data.values().filter(|e| !e.is_expired(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryStore {
    async fn execute(&self, command: Command) -> Result<Response, TransportError> {
        let mut state = self.state.write().await;
        if state.closed {
            return Err(TransportError::Closed);
        }
        Ok(state.execute(command))
    }

    async fn execute_atomic(
        &self,
        commands: Vec<Command>,
    ) -> Result<Vec<Response>, TransportError> {
        // one write guard for the whole batch
        let mut state = self.state.write().await;
        if state.closed {
            return Err(TransportError::Closed);
        }
        Ok(commands.into_iter().map(|c| state.execute(c)).collect())
    }

    async fn close(&self) {
        let mut state = self.state.write().await;
        state.closed = true;
        state.data.clear();
    }
}

impl State {
    fn execute(&mut self, command: Command) -> Response {
        debug!("Executing command: {} {}", command.name(), command.key());
        self.ops_count += 1;

        match command {
            Command::Ping => Response::Pong,

            Command::Info { .. } => {
                let now = Instant::now();
                let keys = self.data.values().filter(|e| !e.is_expired(now)).count();
                let expires = self
                    .data
                    .values()
                    .filter(|e| e.expire_at.is_some() && !e.is_expired(now))
                    .count();
                Response::Info(format!(
                    "# Server\r\nredis_version:{}\r\nredis_mode:standalone\r\n# Keyspace\r\ndb0:keys={},expires={}\r\n# Stats\r\ntotal_commands_processed:{}\r\n",
                    self.version, keys, expires, self.ops_count
                ))
            }

            Command::Set { key, value, ttl_ms } => {
                let expire_at = ttl_ms.map(|ms| Instant::now() + Duration::from_millis(ms));
                self.data.insert(
                    key,
                    Entry {
                        value: Value::String(value),
                        expire_at,
                    },
                );
                Response::Ok
            }

            Command::Get { key } => match self.live(&key) {
                Some(Entry {
                    value: Value::String(v),
                    ..
                }) => Response::Value(v.clone()),
                Some(_) => Response::Error(WRONGTYPE.to_string()),
                None => Response::Nil,
            },

            Command::Del { key } => {
                let existed = self.live(&key).is_some();
                self.data.remove(&key);
                Response::Integer(existed as i64)
            }

            Command::LPush { key, value } => self.push(key, value, true),
            Command::RPush { key, value } => self.push(key, value, false),

            Command::LPop { key, count } => self.pop(&key, count, true),
            Command::RPop { key, count } => self.pop(&key, count, false),

            Command::LLen { key } => match self.live(&key) {
                Some(Entry {
                    value: Value::List(list),
                    ..
                }) => Response::Integer(list.len() as i64),
                Some(_) => Response::Error(WRONGTYPE.to_string()),
                None => Response::Integer(0),
            },

            Command::LRange { key, start, stop } => match self.live(&key) {
                Some(Entry {
                    value: Value::List(list),
                    ..
                }) => match range_bounds(list.len(), start, stop) {
                    Some((from, to)) => {
                        Response::Array(list.range(from..=to).cloned().collect())
                    }
                    None => Response::Array(Vec::new()),
                },
                Some(_) => Response::Error(WRONGTYPE.to_string()),
                None => Response::Array(Vec::new()),
            },

            Command::LTrim { key, start, stop } => {
                let emptied = match self.live(&key) {
                    Some(Entry {
                        value: Value::List(list),
                        ..
                    }) => {
                        match range_bounds(list.len(), start, stop) {
                            Some((from, to)) => {
                                list.truncate(to + 1);
                                list.drain(..from);
                            }
                            None => list.clear(),
                        }
                        list.is_empty()
                    }
                    Some(_) => return Response::Error(WRONGTYPE.to_string()),
                    None => false,
                };
                if emptied {
                    self.data.remove(&key);
                }
                Response::Ok
            }
        }
    }

    /// Entry for `key`, dropping it first if it has expired.
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        if self
            .data
            .get(key)
            .is_some_and(|e| e.is_expired(Instant::now()))
        {
            self.data.remove(key);
        }
        self.data.get_mut(key)
    }

    fn push(&mut self, key: String, value: Vec<u8>, front: bool) -> Response {
        if self.live(&key).is_none() {
            self.data.insert(
                key.clone(),
                Entry {
                    value: Value::List(VecDeque::new()),
                    expire_at: None,
                },
            );
        }
        match self.data.get_mut(&key) {
            Some(Entry {
                value: Value::List(list),
                ..
            }) => {
                if front {
                    list.push_front(value);
                } else {
                    list.push_back(value);
                }
                Response::Integer(list.len() as i64)
            }
            _ => Response::Error(WRONGTYPE.to_string()),
        }
    }

    fn pop(&mut self, key: &str, count: Option<u64>, front: bool) -> Response {
        if count.is_some() && !self.version.supports_pop_count() {
            let name = if front { "lpop" } else { "rpop" };
            return Response::Error(format!(
                "ERR wrong number of arguments for '{}' command",
                name
            ));
        }

        let (response, emptied) = match self.live(key) {
            Some(Entry {
                value: Value::List(list),
                ..
            }) => {
                let mut take = || {
                    if front {
                        list.pop_front()
                    } else {
                        list.pop_back()
                    }
                };
                let response = match count {
                    None => take().map_or(Response::Nil, Response::Value),
                    Some(n) => {
                        let mut popped = Vec::new();
                        while (popped.len() as u64) < n {
                            match take() {
                                Some(v) => popped.push(v),
                                None => break,
                            }
                        }
                        Response::Array(popped)
                    }
                };
                (response, list.is_empty())
            }
            Some(_) => return Response::Error(WRONGTYPE.to_string()),
            None => return Response::Nil,
        };

        if emptied {
            self.data.remove(key);
        }
        response
    }
}

/// Clamp Redis-style inclusive indices (negative counts from the tail).
fn range_bounds(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(items: &[&str]) -> Vec<Vec<u8>> {
        items.iter().map(|s| s.as_bytes().to_vec()).collect()
    }

    async fn seeded(store: &MemoryStore, key: &str, items: &[&str]) {
        for item in items {
            store
                .execute(Command::RPush {
                    key: key.to_string(),
                    value: item.as_bytes().to_vec(),
                })
                .await
                .unwrap();
        }
    }

    #[test]
    fn range_bounds_follow_redis_rules() {
        assert_eq!(range_bounds(5, 0, 2), Some((0, 2)));
        assert_eq!(range_bounds(5, -3, -1), Some((2, 4)));
        assert_eq!(range_bounds(5, 0, -4), Some((0, 1)));
        assert_eq!(range_bounds(5, 3, -1), Some((3, 4)));
        assert_eq!(range_bounds(5, -10, 100), Some((0, 4)));
        assert_eq!(range_bounds(5, 5, -1), None);
        assert_eq!(range_bounds(5, 0, -6), None);
        assert_eq!(range_bounds(0, 0, -1), None);
    }

    #[tokio::test]
    async fn get_on_missing_key_is_nil() {
        let store = MemoryStore::new();
        let response = store
            .execute(Command::Get { key: "nope".into() })
            .await
            .unwrap();
        assert_eq!(response, Response::Nil);
    }

    #[tokio::test]
    async fn list_commands_against_string_are_wrongtype() {
        let store = MemoryStore::new();
        store
            .execute(Command::Set {
                key: "s".into(),
                value: b"1".to_vec(),
                ttl_ms: None,
            })
            .await
            .unwrap();
        let response = store
            .execute(Command::LLen { key: "s".into() })
            .await
            .unwrap();
        assert!(matches!(response, Response::Error(msg) if msg.starts_with("WRONGTYPE")));
    }

    #[tokio::test]
    async fn trim_keeps_only_the_requested_window() {
        let store = MemoryStore::new();
        seeded(&store, "l", &["a", "b", "c", "d", "e"]).await;
        store
            .execute(Command::LTrim {
                key: "l".into(),
                start: 3,
                stop: -1,
            })
            .await
            .unwrap();
        let rest = store
            .execute(Command::LRange {
                key: "l".into(),
                start: 0,
                stop: -1,
            })
            .await
            .unwrap();
        assert_eq!(rest, Response::Array(bytes(&["d", "e"])));
    }

    #[tokio::test]
    async fn trimming_everything_removes_the_key() {
        let store = MemoryStore::new();
        seeded(&store, "l", &["a"]).await;
        store
            .execute(Command::LTrim {
                key: "l".into(),
                start: 1,
                stop: -1,
            })
            .await
            .unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn old_servers_reject_pop_with_count() {
        let store = MemoryStore::with_version(ServerVersion::new(6, 0, 16));
        seeded(&store, "l", &["a", "b"]).await;
        let response = store
            .execute(Command::LPop {
                key: "l".into(),
                count: Some(2),
            })
            .await
            .unwrap();
        assert!(matches!(response, Response::Error(msg) if msg.contains("wrong number of arguments")));
    }

    #[tokio::test]
    async fn pop_with_count_stops_at_list_end() {
        let store = MemoryStore::new();
        seeded(&store, "l", &["a", "b"]).await;
        let response = store
            .execute(Command::RPop {
                key: "l".into(),
                count: Some(5),
            })
            .await
            .unwrap();
        assert_eq!(response, Response::Array(bytes(&["b", "a"])));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn info_reports_configured_version() {
        let store = MemoryStore::with_version(ServerVersion::new(6, 0, 9));
        let response = store
            .execute(Command::Info { section: None })
            .await
            .unwrap();
        match response {
            Response::Info(text) => assert!(text.contains("redis_version:6.0.9")),
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn expired_keys_disappear() {
        let store = MemoryStore::new();
        store
            .execute(Command::Set {
                key: "t".into(),
                value: b"1".to_vec(),
                ttl_ms: Some(100),
            })
            .await
            .unwrap();
        tokio::time::advance(Duration::from_millis(150)).await;
        let response = store
            .execute(Command::Get { key: "t".into() })
            .await
            .unwrap();
        assert_eq!(response, Response::Nil);
    }

    #[tokio::test]
    async fn closed_store_refuses_commands() {
        let store = MemoryStore::new();
        store.close().await;
        assert!(matches!(
            store.execute(Command::Ping).await,
            Err(TransportError::Closed)
        ));
        assert!(matches!(
            store.execute_atomic(vec![Command::Ping]).await,
            Err(TransportError::Closed)
        ));
    }
}
