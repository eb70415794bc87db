//! Redis Store command-line entry point

use chrono::Utc;
use clap::{Parser, Subcommand};
use redis_store::{Codec, Config, Database, End, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::fmt::{format::Writer, time::FormatTime};

struct ChronoUtc;

impl FormatTime for ChronoUtc {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Utc::now().to_rfc3339())
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = 6379)]
    port: u16,

    /// Logical database index
    #[arg(short = 'n', long, default_value_t = 0)]
    database: i64,

    #[arg(short, long)]
    username: Option<String>,

    #[arg(short = 'a', long, env = "REDIS_PASSWORD")]
    password: Option<String>,

    /// Connect over TLS
    #[arg(long)]
    tls: bool,

    /// Value encoding: json or msgpack
    #[arg(long, default_value = "json")]
    codec: Codec,

    /// Per-command deadline in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Store a value (parsed as JSON, otherwise taken as a string)
    Set {
        key: String,
        value: String,
        /// Expire after this many milliseconds
        #[arg(long)]
        ttl_ms: Option<u64>,
    },
    /// Print the value stored under a key
    Get { key: String },
    /// Delete a key
    Del { key: String },
    /// Push a value onto a list
    Push {
        key: String,
        value: String,
        /// Push onto the head instead of the tail
        #[arg(long)]
        left: bool,
    },
    /// Pop one or more values from a list
    Pop {
        key: String,
        /// Pop from the tail instead of the head
        #[arg(long)]
        right: bool,
        /// Pop up to this many elements
        #[arg(short, long, allow_negative_numbers = true)]
        count: Option<i64>,
    },
    /// Print a list's length
    Len { key: String },
    /// Print the server version and detected capabilities
    Info,
}

impl Args {
    fn config(&self) -> Config {
        Config {
            host: self.host.clone(),
            port: self.port,
            database: self.database,
            username: self.username.clone(),
            password: self.password.clone(),
            tls: self.tls,
            codec: self.codec,
            command_timeout: self.timeout_ms.map(Duration::from_millis),
            ..Config::default()
        }
    }
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn print_value(value: &Value) {
    match value {
        Value::String(s) => println!("\"{}\"", s),
        other => println!("{}", other),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_timer(ChronoUtc)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let db = Database::connect(args.config()).await?;

    let outcome = run(&db, args.command).await;
    db.close().await;

    match outcome {
        Err(e) if e.is_absent() => {
            println!("(nil)");
            Ok(())
        }
        Err(e) => {
            error!("{}", e);
            Err(e)
        }
        Ok(()) => Ok(()),
    }
}

async fn run(db: &Database, command: Cmd) -> Result<()> {
    match command {
        Cmd::Set { key, value, ttl_ms } => {
            db.set(&key, &parse_value(&value), ttl_ms.map(Duration::from_millis))
                .await?;
            println!("OK");
        }
        Cmd::Get { key } => print_value(&db.get::<Value>(&key).await?),
        Cmd::Del { key } => {
            db.delete(&key).await?;
            println!("OK");
        }
        Cmd::Push { key, value, left } => {
            let end = if left { End::Left } else { End::Right };
            let len = db.push(end, &key, &parse_value(&value)).await?;
            println!("(integer) {}", len);
        }
        Cmd::Pop { key, right, count } => {
            let end = if right { End::Right } else { End::Left };
            match count {
                Some(n) => {
                    for value in db.pop_count::<Value>(end, &key, n).await? {
                        print_value(&value);
                    }
                }
                None => print_value(&db.pop::<Value>(end, &key).await?),
            }
        }
        Cmd::Len { key } => println!("(integer) {}", db.len(&key).await?),
        Cmd::Info => {
            let caps = db.capabilities().await?;
            println!("redis_version:{}", caps.server_version);
            println!("atomic_pop_count:{}", caps.atomic_pop_count);
            println!("codec:{}", db.codec().name());
        }
    }
    Ok(())
}
