//! Connection configuration

use crate::codec::Codec;
use crate::{Error, Result};
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use serde::Deserialize;
use std::time::Duration;

/// Connection settings for a [`Database`](crate::Database).
///
/// Every field has a default, so a partial document deserializes cleanly:
///
/// ```
/// let config: redis_store::Config =
///     serde_json::from_str(r#"{"host": "cache.internal", "port": 6380}"#).unwrap();
/// assert_eq!(config.database, 0);
/// assert_eq!(config.address(), "cache.internal:6380");
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Label used in logs
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Logical database index
    pub database: i64,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Upper bound on commands in flight over the shared connection
    pub pool_size: usize,
    pub tls: bool,
    pub codec: Codec,
    /// Deadline applied to every operation
    #[serde(with = "millis")]
    pub command_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            name: "main".to_string(),
            host: "127.0.0.1".to_string(),
            port: 6379,
            database: 0,
            username: None,
            password: None,
            pool_size: default_pool_size(),
            tls: false,
            codec: Codec::Json,
            command_timeout: None,
        }
    }
}

fn default_pool_size() -> usize {
    10 * std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Config {
    /// `host:port` pair for logging
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reject settings the client cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(Error::Config("port must be non-zero".to_string()));
        }
        if self.database < 0 {
            return Err(Error::Config(format!(
                "database index must be non-negative, got {}",
                self.database
            )));
        }
        if self.pool_size == 0 {
            return Err(Error::Config("pool_size must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Connection parameters for the `redis` client
    pub fn connection_info(&self) -> ConnectionInfo {
        let addr = if self.tls {
            ConnectionAddr::TcpTls {
                host: self.host.clone(),
                port: self.port,
                insecure: false,
                tls_params: None,
            }
        } else {
            ConnectionAddr::Tcp(self.host.clone(), self.port)
        };

        ConnectionInfo {
            addr,
            redis: RedisConnectionInfo {
                db: self.database,
                username: self.username.clone().filter(|u| !u.is_empty()),
                password: self.password.clone().filter(|p| !p.is_empty()),
                ..Default::default()
            },
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_server() {
        let config = Config::default();
        assert_eq!(config.name, "main");
        assert_eq!(config.address(), "127.0.0.1:6379");
        assert_eq!(config.database, 0);
        assert!(config.pool_size >= 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"host":"10.0.0.5","password":"s3cret","codec":"msgpack","command_timeout":250}"#,
        )
        .unwrap();
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, 6379);
        assert_eq!(config.codec, Codec::MessagePack);
        assert_eq!(config.command_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn connection_info_carries_credentials_and_db() {
        let config = Config {
            database: 3,
            username: Some("default".to_string()),
            password: Some("pw".to_string()),
            ..Config::default()
        };
        let info = config.connection_info();
        assert_eq!(info.redis.db, 3);
        assert_eq!(info.redis.username.as_deref(), Some("default"));
        assert_eq!(info.redis.password.as_deref(), Some("pw"));
        assert!(matches!(info.addr, ConnectionAddr::Tcp(ref h, 6379) if h == "127.0.0.1"));
    }

    #[test]
    fn tls_switches_address_kind() {
        let config = Config {
            tls: true,
            ..Config::default()
        };
        assert!(matches!(
            config.connection_info().addr,
            ConnectionAddr::TcpTls { port: 6379, .. }
        ));
    }

    #[test]
    fn rejects_unusable_settings() {
        let bad = [
            Config {
                port: 0,
                ..Config::default()
            },
            Config {
                pool_size: 0,
                ..Config::default()
            },
            Config {
                database: -1,
                ..Config::default()
            },
            Config {
                host: " ".to_string(),
                ..Config::default()
            },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(Error::Config(_))));
        }
    }
}
