//! In-memory `KvStore` test double. Same mutex-protected-inner shape as the
//! rest of this codebase's fakes: one lock around a plain-data struct, no
//! shortcuts around the semantics real callers depend on (TTL expiry,
//! sorted-set ranking, FIFO list order).

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::pin::Pin;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{KvStore, StoreResult};

#[derive(Default)]
struct Inner {
    strings: HashMap<String, String>,
    expirations: HashMap<String, Instant>,
    hashes: HashMap<String, HashMap<String, String>>,
    sets: HashMap<String, HashSet<String>>,
    lists: HashMap<String, VecDeque<String>>,
    zsets: HashMap<String, BTreeMap<String, f64>>,
}

impl Inner {
    fn sweep_expired(&mut self) {
        let now = Instant::now();
        let dead: Vec<String> = self
            .expirations
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in dead {
            self.strings.remove(&key);
            self.hashes.remove(&key);
            self.sets.remove(&key);
            self.lists.remove(&key);
            self.zsets.remove(&key);
            self.expirations.remove(&key);
        }
    }
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        let mut guard = self.inner.lock().expect("memory store mutex poisoned");
        guard.sweep_expired();
        guard
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! boxed {
    ($body:expr) => {
        Box::pin(async move { $body })
    };
}

impl KvStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<Option<String>>> + Send + 'a>> {
        boxed!(Ok(self.lock().strings.get(key).cloned()))
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        ttl_secs: Option<u64>,
    ) -> Pin<Box<dyn std::future::Future<Output = StoreResult<()>> + Send + 'a>> {
        boxed!({
            let mut inner = self.lock();
            inner.strings.insert(key.to_string(), value.to_string());
            match ttl_secs {
                Some(secs) => {
                    inner
                        .expirations
                        .insert(key.to_string(), Instant::now() + Duration::from_secs(secs));
                }
                None => {
                    inner.expirations.remove(key);
                }
            }
            Ok(())
        })
    }

    fn del<'a>(&'a self, key: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<()>> + Send + 'a>> {
        boxed!({
            let mut inner = self.lock();
            inner.strings.remove(key);
            inner.hashes.remove(key);
            inner.sets.remove(key);
            inner.lists.remove(key);
            inner.zsets.remove(key);
            inner.expirations.remove(key);
            Ok(())
        })
    }

    fn exists<'a>(&'a self, key: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<bool>> + Send + 'a>> {
        boxed!({
            let inner = self.lock();
            Ok(inner.strings.contains_key(key)
                || inner.hashes.contains_key(key)
                || inner.sets.contains_key(key)
                || inner.lists.contains_key(key)
                || inner.zsets.contains_key(key))
        })
    }

    fn expire<'a>(&'a self, key: &'a str, ttl_secs: u64) -> Pin<Box<dyn std::future::Future<Output = StoreResult<()>> + Send + 'a>> {
        boxed!({
            self.lock()
                .expirations
                .insert(key.to_string(), Instant::now() + Duration::from_secs(ttl_secs));
            Ok(())
        })
    }

    fn persist<'a>(&'a self, key: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<()>> + Send + 'a>> {
        boxed!({
            self.lock().expirations.remove(key);
            Ok(())
        })
    }

    fn ttl<'a>(&'a self, key: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<Option<u64>>> + Send + 'a>> {
        boxed!({
            let inner = self.lock();
            Ok(inner.expirations.get(key).map(|at| {
                at.saturating_duration_since(Instant::now()).as_secs()
            }))
        })
    }

    fn incrby<'a>(&'a self, key: &'a str, field: &'a str, delta: i64) -> Pin<Box<dyn std::future::Future<Output = StoreResult<i64>> + Send + 'a>> {
        boxed!({
            let mut inner = self.lock();
            let hash = inner.hashes.entry(key.to_string()).or_default();
            let current: i64 = hash.get(field).and_then(|v| v.parse().ok()).unwrap_or(0);
            let next = current + delta;
            hash.insert(field.to_string(), next.to_string());
            Ok(next)
        })
    }

    fn hget<'a>(&'a self, key: &'a str, field: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<Option<String>>> + Send + 'a>> {
        boxed!(Ok(self
            .lock()
            .hashes
            .get(key)
            .and_then(|h| h.get(field))
            .cloned()))
    }

    fn hset<'a>(&'a self, key: &'a str, field: &'a str, value: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<()>> + Send + 'a>> {
        boxed!({
            self.lock()
                .hashes
                .entry(key.to_string())
                .or_default()
                .insert(field.to_string(), value.to_string());
            Ok(())
        })
    }

    fn hmset<'a>(&'a self, key: &'a str, fields: &'a [(String, String)]) -> Pin<Box<dyn std::future::Future<Output = StoreResult<()>> + Send + 'a>> {
        boxed!({
            let mut inner = self.lock();
            let hash = inner.hashes.entry(key.to_string()).or_default();
            for (field, value) in fields {
                hash.insert(field.clone(), value.clone());
            }
            Ok(())
        })
    }

    fn hgetall<'a>(&'a self, key: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<Vec<(String, String)>>> + Send + 'a>> {
        boxed!(Ok(self
            .lock()
            .hashes
            .get(key)
            .map(|h| h.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()))
    }

    fn sadd<'a>(&'a self, key: &'a str, member: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<()>> + Send + 'a>> {
        boxed!({
            self.lock()
                .sets
                .entry(key.to_string())
                .or_default()
                .insert(member.to_string());
            Ok(())
        })
    }

    fn srem<'a>(&'a self, key: &'a str, member: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<()>> + Send + 'a>> {
        boxed!({
            if let Some(set) = self.lock().sets.get_mut(key) {
                set.remove(member);
            }
            Ok(())
        })
    }

    fn sismember<'a>(&'a self, key: &'a str, member: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<bool>> + Send + 'a>> {
        boxed!(Ok(self
            .lock()
            .sets
            .get(key)
            .map(|s| s.contains(member))
            .unwrap_or(false)))
    }

    fn smembers<'a>(&'a self, key: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<Vec<String>>> + Send + 'a>> {
        boxed!(Ok(self
            .lock()
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()))
    }

    fn scard<'a>(&'a self, key: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<u64>> + Send + 'a>> {
        boxed!(Ok(self.lock().sets.get(key).map(|s| s.len() as u64).unwrap_or(0)))
    }

    fn spop<'a>(&'a self, key: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<Option<String>>> + Send + 'a>> {
        boxed!({
            let mut inner = self.lock();
            if let Some(set) = inner.sets.get_mut(key) {
                let member = set.iter().next().cloned();
                if let Some(ref m) = member {
                    set.remove(m);
                }
                Ok(member)
            } else {
                Ok(None)
            }
        })
    }

    fn srandmember<'a>(&'a self, key: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<Option<String>>> + Send + 'a>> {
        boxed!(Ok(self.lock().sets.get(key).and_then(|s| s.iter().next().cloned())))
    }

    fn rpush<'a>(&'a self, key: &'a str, value: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<()>> + Send + 'a>> {
        boxed!({
            self.lock()
                .lists
                .entry(key.to_string())
                .or_default()
                .push_back(value.to_string());
            Ok(())
        })
    }

    fn lpop<'a>(&'a self, key: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<Option<String>>> + Send + 'a>> {
        boxed!({
            let mut inner = self.lock();
            Ok(inner.lists.get_mut(key).and_then(|l| l.pop_front()))
        })
    }

    fn lrange<'a>(&'a self, key: &'a str, start: i64, stop: i64) -> Pin<Box<dyn std::future::Future<Output = StoreResult<Vec<String>>> + Send + 'a>> {
        boxed!({
            let inner = self.lock();
            let list = match inner.lists.get(key) {
                Some(l) => l,
                None => return Ok(Vec::new()),
            };
            let len = list.len() as i64;
            let norm = |i: i64| -> i64 {
                if i < 0 {
                    (len + i).max(0)
                } else {
                    i.min(len)
                }
            };
            let (s, e) = (norm(start), norm(stop));
            if s > e || len == 0 {
                return Ok(Vec::new());
            }
            Ok(list
                .iter()
                .skip(s as usize)
                .take((e - s + 1).max(0) as usize)
                .cloned()
                .collect())
        })
    }

    fn lrem<'a>(&'a self, key: &'a str, value: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<()>> + Send + 'a>> {
        boxed!({
            if let Some(list) = self.lock().lists.get_mut(key) {
                list.retain(|v| v != value);
            }
            Ok(())
        })
    }

    fn llen<'a>(&'a self, key: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<u64>> + Send + 'a>> {
        boxed!(Ok(self.lock().lists.get(key).map(|l| l.len() as u64).unwrap_or(0)))
    }

    fn zadd<'a>(&'a self, key: &'a str, score: f64, member: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<()>> + Send + 'a>> {
        boxed!({
            self.lock()
                .zsets
                .entry(key.to_string())
                .or_default()
                .insert(member.to_string(), score);
            Ok(())
        })
    }

    fn zrank<'a>(&'a self, key: &'a str, member: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<Option<u64>>> + Send + 'a>> {
        boxed!({
            let inner = self.lock();
            let zset = match inner.zsets.get(key) {
                Some(z) => z,
                None => return Ok(None),
            };
            let mut ordered: Vec<(&String, &f64)> = zset.iter().collect();
            ordered.sort_by(|a, b| a.1.partial_cmp(b.1).unwrap().then_with(|| a.0.cmp(b.0)));
            Ok(ordered.iter().position(|(m, _)| *m == member).map(|p| p as u64))
        })
    }

    fn zrange<'a>(&'a self, key: &'a str, start: i64, stop: i64) -> Pin<Box<dyn std::future::Future<Output = StoreResult<Vec<String>>> + Send + 'a>> {
        boxed!({
            let inner = self.lock();
            let zset = match inner.zsets.get(key) {
                Some(z) => z,
                None => return Ok(Vec::new()),
            };
            let mut ordered: Vec<(&String, &f64)> = zset.iter().collect();
            ordered.sort_by(|a, b| a.1.partial_cmp(b.1).unwrap().then_with(|| a.0.cmp(b.0)));
            let len = ordered.len() as i64;
            let norm = |i: i64| -> i64 {
                if i < 0 {
                    (len + i).max(0)
                } else {
                    i.min(len)
                }
            };
            let (s, e) = (norm(start), norm(stop));
            if s > e || len == 0 {
                return Ok(Vec::new());
            }
            Ok(ordered
                .into_iter()
                .skip(s as usize)
                .take((e - s + 1).max(0) as usize)
                .map(|(m, _)| m.clone())
                .collect())
        })
    }

    fn zrem<'a>(&'a self, key: &'a str, member: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<()>> + Send + 'a>> {
        boxed!({
            if let Some(zset) = self.lock().zsets.get_mut(key) {
                zset.remove(member);
            }
            Ok(())
        })
    }

    fn keys<'a>(&'a self, pattern: &'a str) -> Pin<Box<dyn std::future::Future<Output = StoreResult<Vec<String>>> + Send + 'a>> {
        boxed!({
            let inner = self.lock();
            let prefix = pattern.trim_end_matches('*');
            let mut out: Vec<String> = inner
                .strings
                .keys()
                .chain(inner.hashes.keys())
                .chain(inner.sets.keys())
                .chain(inner.lists.keys())
                .chain(inner.zsets.keys())
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect();
            out.sort();
            out.dedup();
            Ok(out)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_with_ttl_expires() {
        let store = MemoryStore::new();
        store.set("k", "v", Some(0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn zrank_orders_by_score_then_member() {
        let store = MemoryStore::new();
        store.zadd("q", 2.0, "b").await.unwrap();
        store.zadd("q", 1.0, "a").await.unwrap();
        assert_eq!(store.zrank("q", "a").await.unwrap(), Some(0));
        assert_eq!(store.zrank("q", "b").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn fifo_list_preserves_order() {
        let store = MemoryStore::new();
        store.rpush("wq", "x").await.unwrap();
        store.rpush("wq", "y").await.unwrap();
        assert_eq!(store.lpop("wq").await.unwrap(), Some("x".to_string()));
        assert_eq!(store.lpop("wq").await.unwrap(), Some("y".to_string()));
    }
}
