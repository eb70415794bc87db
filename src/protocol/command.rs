//! Command definitions sent to the store

/// Store commands issued by the database layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ping,
    Info { section: Option<String> },
    Set {
        key: String,
        value: Vec<u8>,
        ttl_ms: Option<u64>,
    },
    Get { key: String },
    Del { key: String },
    LPush { key: String, value: Vec<u8> },
    RPush { key: String, value: Vec<u8> },
    LPop { key: String, count: Option<u64> },
    RPop { key: String, count: Option<u64> },
    LLen { key: String },
    LRange { key: String, start: i64, stop: i64 },
    LTrim { key: String, start: i64, stop: i64 },
}

/// Reply from command execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok,
    Pong,
    Value(Vec<u8>),
    Nil,
    Integer(i64),
    Array(Vec<Vec<u8>>),
    Error(String),
    Info(String),
}

impl Command {
    /// Get command name as string
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "PING",
            Command::Info { .. } => "INFO",
            Command::Set { .. } => "SET",
            Command::Get { .. } => "GET",
            Command::Del { .. } => "DEL",
            Command::LPush { .. } => "LPUSH",
            Command::RPush { .. } => "RPUSH",
            Command::LPop { .. } => "LPOP",
            Command::RPop { .. } => "RPOP",
            Command::LLen { .. } => "LLEN",
            Command::LRange { .. } => "LRANGE",
            Command::LTrim { .. } => "LTRIM",
        }
    }

    /// Key the command addresses; empty for server-level commands.
    pub fn key(&self) -> &str {
        match self {
            Command::Ping | Command::Info { .. } => "",
            Command::Set { key, .. }
            | Command::Get { key }
            | Command::Del { key }
            | Command::LPush { key, .. }
            | Command::RPush { key, .. }
            | Command::LPop { key, .. }
            | Command::RPop { key, .. }
            | Command::LLen { key }
            | Command::LRange { key, .. }
            | Command::LTrim { key, .. } => key,
        }
    }

    /// Build the `redis` crate command for this request.
    pub fn to_cmd(&self) -> redis::Cmd {
        let mut cmd = redis::cmd(self.name());
        match self {
            Command::Ping => {}
            Command::Info { section } => {
                if let Some(section) = section {
                    cmd.arg(section);
                }
            }
            Command::Set { key, value, ttl_ms } => {
                cmd.arg(key).arg(value.as_slice());
                if let Some(ms) = ttl_ms {
                    cmd.arg("PX").arg(*ms);
                }
            }
            Command::Get { key } | Command::Del { key } | Command::LLen { key } => {
                cmd.arg(key);
            }
            Command::LPush { key, value } | Command::RPush { key, value } => {
                cmd.arg(key).arg(value.as_slice());
            }
            Command::LPop { key, count } | Command::RPop { key, count } => {
                cmd.arg(key);
                if let Some(count) = count {
                    cmd.arg(*count);
                }
            }
            Command::LRange { key, start, stop } | Command::LTrim { key, start, stop } => {
                cmd.arg(key).arg(*start).arg(*stop);
            }
        }
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packed(command: &Command) -> String {
        String::from_utf8(command.to_cmd().get_packed_command()).unwrap()
    }

    #[test]
    fn set_without_ttl_is_plain_set() {
        let cmd = Command::Set {
            key: "k".into(),
            value: b"\"v\"".to_vec(),
            ttl_ms: None,
        };
        assert_eq!(packed(&cmd), "*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$3\r\n\"v\"\r\n");
    }

    #[test]
    fn set_with_ttl_appends_px() {
        let cmd = Command::Set {
            key: "k".into(),
            value: b"1".to_vec(),
            ttl_ms: Some(1500),
        };
        assert_eq!(
            packed(&cmd),
            "*5\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\n1\r\n$2\r\nPX\r\n$4\r\n1500\r\n"
        );
    }

    #[test]
    fn pop_count_is_optional() {
        let single = Command::LPop {
            key: "q".into(),
            count: None,
        };
        let many = Command::RPop {
            key: "q".into(),
            count: Some(3),
        };
        assert_eq!(packed(&single), "*2\r\n$4\r\nLPOP\r\n$1\r\nq\r\n");
        assert_eq!(packed(&many), "*3\r\n$4\r\nRPOP\r\n$1\r\nq\r\n$1\r\n3\r\n");
    }

    #[test]
    fn trim_carries_signed_bounds() {
        let cmd = Command::LTrim {
            key: "q".into(),
            start: 0,
            stop: -4,
        };
        assert_eq!(
            packed(&cmd),
            "*4\r\n$5\r\nLTRIM\r\n$1\r\nq\r\n$1\r\n0\r\n$2\r\n-4\r\n"
        );
    }

    #[test]
    fn server_commands_have_no_key() {
        assert_eq!(Command::Ping.key(), "");
        assert_eq!(Command::Info { section: None }.name(), "INFO");
        assert_eq!(
            Command::LLen { key: "jobs".into() }.key(),
            "jobs"
        );
    }
}
