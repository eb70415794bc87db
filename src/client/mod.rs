//! Client module for talking to a live Redis server

pub mod redis_client;

pub use redis_client::RedisClient;
