//! Redis-backed `KvStore`. Wraps `redis::aio::ConnectionManager`, which
//! transparently reconnects, so callers never see a dead connection as
//! anything but a transient error.

use std::pin::Pin;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{KvStore, StoreError, StoreResult};

pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url).map_err(|e| StoreError::Connection(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { conn })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

fn op_err(e: redis::RedisError) -> StoreError {
    StoreError::Operation(e.to_string())
}

macro_rules! boxed {
    ($body:expr) => {
        Box::pin(async move { $body })
    };
}

impl KvStore for RedisStore {
    fn get<'a>(&'a self, key: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<Option<String>>> + Send + 'a>> {
        boxed!(self.conn().get(key).await.map_err(op_err))
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        ttl_secs: Option<u64>,
    ) -> Pin<Box<dyn std::future::Future<Output = StoreResult<()>> + Send + 'a>> {
        boxed!({
            let mut conn = self.conn();
            match ttl_secs {
                Some(secs) => conn.set_ex(key, value, secs).await.map_err(op_err),
                None => conn.set(key, value).await.map_err(op_err),
            }
        })
    }

    fn del<'a>(&'a self, key: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<()>> + Send + 'a>> {
        boxed!(self.conn().del::<_, ()>(key).await.map_err(op_err))
    }

    fn exists<'a>(&'a self, key: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<bool>> + Send + 'a>> {
        boxed!(self.conn().exists(key).await.map_err(op_err))
    }

    fn expire<'a>(&'a self, key: &'a str, ttl_secs: u64) -> Pin<Box<dyn std::future::Future<Output = StoreResult<()>> + Send + 'a>> {
        boxed!(self
            .conn()
            .expire::<_, ()>(key, ttl_secs as i64)
            .await
            .map_err(op_err))
    }

    fn persist<'a>(&'a self, key: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<()>> + Send + 'a>> {
        boxed!(self.conn().persist::<_, ()>(key).await.map_err(op_err))
    }

    fn ttl<'a>(&'a self, key: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<Option<u64>>> + Send + 'a>> {
        boxed!({
            let secs: i64 = self.conn().ttl(key).await.map_err(op_err)?;
            Ok(if secs < 0 { None } else { Some(secs as u64) })
        })
    }

    fn incrby<'a>(&'a self, key: &'a str, field: &'a str, delta: i64) -> Pin<Box<dyn std::future::Future<Output = StoreResult<i64>> + Send + 'a>> {
        boxed!(self.conn().hincr(key, field, delta).await.map_err(op_err))
    }

    fn hget<'a>(&'a self, key: &'a str, field: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<Option<String>>> + Send + 'a>> {
        boxed!(self.conn().hget(key, field).await.map_err(op_err))
    }

    fn hset<'a>(&'a self, key: &'a str, field: &'a str, value: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<()>> + Send + 'a>> {
        boxed!(self.conn().hset::<_, _, _, ()>(key, field, value).await.map_err(op_err))
    }

    fn hmset<'a>(&'a self, key: &'a str, fields: &'a [(String, String)]) -> Pin<Box<dyn std::future::Future<Output = StoreResult<()>> + Send + 'a>> {
        boxed!(self.conn().hset_multiple::<_, _, _, ()>(key, fields).await.map_err(op_err))
    }

    fn hgetall<'a>(&'a self, key: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<Vec<(String, String)>>> + Send + 'a>> {
        boxed!(self.conn().hgetall(key).await.map_err(op_err))
    }

    fn sadd<'a>(&'a self, key: &'a str, member: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<()>> + Send + 'a>> {
        boxed!(self.conn().sadd::<_, _, ()>(key, member).await.map_err(op_err))
    }

    fn srem<'a>(&'a self, key: &'a str, member: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<()>> + Send + 'a>> {
        boxed!(self.conn().srem::<_, _, ()>(key, member).await.map_err(op_err))
    }

    fn sismember<'a>(&'a self, key: &'a str, member: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<bool>> + Send + 'a>> {
        boxed!(self.conn().sismember(key, member).await.map_err(op_err))
    }

    fn smembers<'a>(&'a self, key: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<Vec<String>>> + Send + 'a>> {
        boxed!(self.conn().smembers(key).await.map_err(op_err))
    }

    fn scard<'a>(&'a self, key: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<u64>> + Send + 'a>> {
        boxed!(self.conn().scard(key).await.map_err(op_err))
    }

    fn spop<'a>(&'a self, key: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<Option<String>>> + Send + 'a>> {
        boxed!(self.conn().spop(key).await.map_err(op_err))
    }

    fn srandmember<'a>(&'a self, key: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<Option<String>>> + Send + 'a>> {
        boxed!(self.conn().srandmember(key).await.map_err(op_err))
    }

    fn rpush<'a>(&'a self, key: &'a str, value: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<()>> + Send + 'a>> {
        boxed!(self.conn().rpush::<_, _, ()>(key, value).await.map_err(op_err))
    }

    fn lpop<'a>(&'a self, key: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<Option<String>>> + Send + 'a>> {
        boxed!(self.conn().lpop(key, None).await.map_err(op_err))
    }

    fn lrange<'a>(&'a self, key: &'a str, start: i64, stop: i64) -> Pin<Box<dyn std::future::Future<Output = StoreResult<Vec<String>>> + Send + 'a>> {
        boxed!(self
            .conn()
            .lrange(key, start as isize, stop as isize)
            .await
            .map_err(op_err))
    }

    fn lrem<'a>(&'a self, key: &'a str, value: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<()>> + Send + 'a>> {
        boxed!(self.conn().lrem::<_, _, ()>(key, 0, value).await.map_err(op_err))
    }

    fn llen<'a>(&'a self, key: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<u64>> + Send + 'a>> {
        boxed!(self.conn().llen(key).await.map_err(op_err))
    }

    fn zadd<'a>(&'a self, key: &'a str, score: f64, member: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<()>> + Send + 'a>> {
        boxed!(self.conn().zadd::<_, _, _, ()>(key, member, score).await.map_err(op_err))
    }

    fn zrank<'a>(&'a self, key: &'a str, member: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<Option<u64>>> + Send + 'a>> {
        boxed!(self.conn().zrank(key, member).await.map_err(op_err))
    }

    fn zrange<'a>(&'a self, key: &'a str, start: i64, stop: i64) -> Pin<Box<dyn std::future::Future<Output = StoreResult<Vec<String>>> + Send + 'a>> {
        boxed!(self
            .conn()
            .zrange(key, start as isize, stop as isize)
            .await
            .map_err(op_err))
    }

    fn zrem<'a>(&'a self, key: &'a str, member: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<()>> + Send + 'a>> {
        boxed!(self.conn().zrem::<_, _, ()>(key, member).await.map_err(op_err))
    }

    fn keys<'a>(&'a self, pattern: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<Vec<String>>> + Send + 'a>> {
        boxed!(self.conn().keys(pattern).await.map_err(op_err))
    }
}
