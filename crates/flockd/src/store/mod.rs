//! Coordination store — a thin, typed adapter over a key/value service.
//!
//! Every domain module (pools, engine, reconciler) accesses the store
//! through the [`KvStore`] trait. `redis_store.rs` provides the real
//! Redis-backed implementation; `memory.rs` provides a deterministic
//! in-process test double with identical semantics.

pub mod keys;
pub mod memory;
pub mod redis_store;

use std::pin::Pin;

use thiserror::Error;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("coordination store connection error: {0}")]
    Connection(String),
    #[error("coordination store operation failed: {0}")]
    Operation(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

type BoxFut<'a, T> = Pin<Box<dyn std::future::Future<Output = StoreResult<T>> + Send + 'a>>;

/// Unified async interface over the coordination store's primitives.
///
/// Object-safe thanks to `Pin<Box<…>>` returns, mirroring the runtime
/// abstraction used elsewhere in this codebase. Implementations must be
/// `Send + Sync` so they can live inside an `Arc`.
pub trait KvStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> BoxFut<'a, Option<String>>;
    fn set<'a>(&'a self, key: &'a str, value: &'a str, ttl_secs: Option<u64>) -> BoxFut<'a, ()>;
    fn del<'a>(&'a self, key: &'a str) -> BoxFut<'a, ()>;
    fn exists<'a>(&'a self, key: &'a str) -> BoxFut<'a, bool>;
    fn expire<'a>(&'a self, key: &'a str, ttl_secs: u64) -> BoxFut<'a, ()>;
    /// Remaining TTL in seconds, or `None` if the key has no expiry (or does
    /// not exist). Used to preserve a key's TTL across an in-place update.
    fn ttl<'a>(&'a self, key: &'a str) -> BoxFut<'a, Option<u64>>;
    fn persist<'a>(&'a self, key: &'a str) -> BoxFut<'a, ()>;

    fn incrby<'a>(&'a self, key: &'a str, field: &'a str, delta: i64) -> BoxFut<'a, i64>;

    fn hget<'a>(&'a self, key: &'a str, field: &'a str) -> BoxFut<'a, Option<String>>;
    fn hset<'a>(&'a self, key: &'a str, field: &'a str, value: &'a str) -> BoxFut<'a, ()>;
    fn hmset<'a>(&'a self, key: &'a str, fields: &'a [(String, String)]) -> BoxFut<'a, ()>;
    fn hgetall<'a>(&'a self, key: &'a str) -> BoxFut<'a, Vec<(String, String)>>;

    fn sadd<'a>(&'a self, key: &'a str, member: &'a str) -> BoxFut<'a, ()>;
    fn srem<'a>(&'a self, key: &'a str, member: &'a str) -> BoxFut<'a, ()>;
    fn sismember<'a>(&'a self, key: &'a str, member: &'a str) -> BoxFut<'a, bool>;
    fn smembers<'a>(&'a self, key: &'a str) -> BoxFut<'a, Vec<String>>;
    fn scard<'a>(&'a self, key: &'a str) -> BoxFut<'a, u64>;
    fn spop<'a>(&'a self, key: &'a str) -> BoxFut<'a, Option<String>>;
    fn srandmember<'a>(&'a self, key: &'a str) -> BoxFut<'a, Option<String>>;

    fn rpush<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFut<'a, ()>;
    fn lpop<'a>(&'a self, key: &'a str) -> BoxFut<'a, Option<String>>;
    fn lrange<'a>(&'a self, key: &'a str, start: i64, stop: i64) -> BoxFut<'a, Vec<String>>;
    fn lrem<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFut<'a, ()>;
    fn llen<'a>(&'a self, key: &'a str) -> BoxFut<'a, u64>;

    fn zadd<'a>(&'a self, key: &'a str, score: f64, member: &'a str) -> BoxFut<'a, ()>;
    fn zrank<'a>(&'a self, key: &'a str, member: &'a str) -> BoxFut<'a, Option<u64>>;
    fn zrange<'a>(&'a self, key: &'a str, start: i64, stop: i64) -> BoxFut<'a, Vec<String>>;
    fn zrem<'a>(&'a self, key: &'a str, member: &'a str) -> BoxFut<'a, ()>;

    fn keys<'a>(&'a self, pattern: &'a str) -> BoxFut<'a, Vec<String>>;
}
