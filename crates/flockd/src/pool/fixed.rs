//! FixedSizePool (spec §4.5.2, `type = fixed`): bounded capacity `N`, a
//! sorted-set wait queue keyed by a monotonic counter, and short-TTL liveness
//! pings so stale queue entries can be swept lazily.

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::{FlockEngine, RequestOptions};
use crate::error::FlockResult;
use crate::netpool::NetworkPool;
use crate::store::{keys, KvStore};

use super::{BoxFut, Pool, PoolConfig, PoolPrimitives, StartOutcome};

const COUNTER_FIELD: &str = "next";
/// Sweep at most this many queue entries per admission check (spec §4.5.2).
const SWEEP_LIMIT: u64 = 10;

pub struct FixedSizePool {
    engine: Arc<FlockEngine>,
    network_pool: Arc<dyn NetworkPool>,
    store: Arc<dyn KvStore>,
    prim: PoolPrimitives,
    config: PoolConfig,
}

impl FixedSizePool {
    pub fn new(
        engine: Arc<FlockEngine>,
        network_pool: Arc<dyn NetworkPool>,
        store: Arc<dyn KvStore>,
        config: PoolConfig,
    ) -> Self {
        let prim = PoolPrimitives::new(store.clone(), config.name.clone());
        Self {
            engine,
            network_pool,
            store,
            prim,
            config,
        }
    }

    fn queue_key(&self) -> String {
        keys::fixed_queue(&self.config.name)
    }

    async fn enqueue(&self, reqid: &str) {
        let next = self.store.incrby(&keys::pool_info(&self.config.name), COUNTER_FIELD, 1).await.unwrap_or(1);
        let _ = self.store.zadd(&self.queue_key(), next as f64, reqid).await;
    }

    /// Refresh the reqid's liveness ping and extend its record TTL — called
    /// on every `start` while the reqid sits in the wait queue.
    async fn ensure_queued(&self, reqid: &str) {
        let _ = self
            .store
            .set(&keys::fixed_ping(&self.config.name, reqid), "1", Some(self.config.wait_ping_ttl_secs))
            .await;
        let _ = self.store.expire(&keys::req(reqid), self.config.duration_secs).await;
    }

    async fn ping_alive(&self, reqid: &str) -> bool {
        self.store.exists(&keys::fixed_ping(&self.config.name, reqid)).await.unwrap_or(false)
    }

    /// Sweep the first `min(SWEEP_LIMIT, pos)` queue entries, dropping any
    /// whose liveness ping has expired, then return the recomputed rank.
    async fn sweep_and_rerank(&self, reqid: &str, pos: u64) -> u64 {
        let limit = pos.min(SWEEP_LIMIT);
        let candidates = self.store.zrange(&self.queue_key(), 0, limit as i64 - 1).await.unwrap_or_default();
        for other in candidates {
            if other != reqid && !self.ping_alive(&other).await {
                let _ = self.store.zrem(&self.queue_key(), &other).await;
                self.prim.mark_expired(&other).await;
            }
        }
        self.store.zrank(&self.queue_key(), reqid).await.ok().flatten().unwrap_or(pos)
    }

    async fn teardown(&self, reqid: &str) {
        let _ = self.store.zrem(&self.queue_key(), reqid).await;
        let _ = self.store.del(&keys::fixed_ping(&self.config.name, reqid)).await;
        let _ = self
            .engine
            .remove(reqid, false, self.config.grace_time_secs, self.network_pool.as_ref())
            .await;
        self.prim.forget_reqid(reqid).await;
    }
}

impl Pool for FixedSizePool {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn request<'a>(&'a self, flock: &'a str, opts: RequestOptions) -> BoxFut<'a, FlockResult<String>> {
        Box::pin(async move {
            let reqid = self.engine.request(flock, opts).await?;
            self.enqueue(&reqid).await;
            Ok(reqid)
        })
    }

    fn start<'a>(&'a self, reqid: &'a str, environ: HashMap<String, String>) -> BoxFut<'a, FlockResult<StartOutcome>> {
        Box::pin(async move {
            if self.prim.is_running(reqid).await {
                let labels = HashMap::from([(crate::labels::POOL_LABEL.to_string(), self.config.name.clone())]);
                let resp = self
                    .engine
                    .start(reqid, labels, environ, self.network_pool.as_ref())
                    .await?;
                return Ok(StartOutcome::Launched(resp));
            }

            self.ensure_queued(reqid).await;
            let mut pos = match self.store.zrank(&self.queue_key(), reqid).await.ok().flatten() {
                Some(p) => p,
                None => {
                    // Lazily re-register a reqid the sweep already dropped.
                    self.enqueue(reqid).await;
                    self.store.zrank(&self.queue_key(), reqid).await.ok().flatten().unwrap_or(0)
                }
            };
            let avail = self.config.capacity().saturating_sub(self.prim.running_count().await);

            if pos >= avail && pos > 1 {
                pos = self.sweep_and_rerank(reqid, pos).await;
            }

            if pos < avail {
                let _ = self.store.zrem(&self.queue_key(), reqid).await;
                let _ = self.store.del(&keys::fixed_ping(&self.config.name, reqid)).await;
                let labels = HashMap::from([(crate::labels::POOL_LABEL.to_string(), self.config.name.clone())]);
                let resp = self
                    .engine
                    .start(reqid, labels, environ, self.network_pool.as_ref())
                    .await?;
                self.prim.add_running(reqid).await;
                self.prim.mark_wait_duration(reqid, self.config.duration_secs).await;
                Ok(StartOutcome::Launched(resp))
            } else {
                Ok(StartOutcome::Queued { position: pos })
            }
        })
    }

    fn remove<'a>(&'a self, reqid: &'a str) -> BoxFut<'a, ()> {
        Box::pin(async move { self.teardown(reqid).await })
    }

    fn on_expired<'a>(&'a self, reqid: &'a str) -> BoxFut<'a, ()> {
        Box::pin(async move { self.teardown(reqid).await })
    }

    fn expiry_tick<'a>(&'a self) -> BoxFut<'a, ()> {
        Box::pin(async move {
            for reqid in self.prim.expired_running().await {
                self.on_expired(&reqid).await;
            }
        })
    }

    fn handle_die_event<'a>(&'a self, reqid: &'a str, _exit_code: Option<i64>, _is_deferred: bool) -> BoxFut<'a, ()> {
        Box::pin(async move { self.prim.mark_expired(reqid).await })
    }

    fn shutdown<'a>(&'a self) -> BoxFut<'a, ()> {
        Box::pin(async move {
            for reqid in self.prim.running_ids().await {
                self.teardown(&reqid).await;
            }
            self.network_pool.shutdown().await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::fake::FakeRuntime;
    use crate::netpool::PlainNetworkPool;
    use crate::spec::{ContainerSpec, FlockSpec, SpecStore};
    use crate::store::MemoryStore;
    use std::collections::HashMap as Map;

    fn write_spec_store(spec: FlockSpec) -> SpecStore {
        let dir = std::env::temp_dir().join(format!("flockd-test-{}", crate::engine::reqid::generate()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("spec.yaml"), serde_yaml::to_string(&spec).unwrap()).unwrap();
        SpecStore::load(dir.to_str().unwrap()).unwrap()
    }

    fn one_container_spec() -> FlockSpec {
        FlockSpec {
            name: "test_fixed".into(),
            containers: vec![ContainerSpec {
                name: "box".into(),
                image: "busybox:latest".into(),
                ..Default::default()
            }],
            volumes: Map::new(),
            auto_remove: false,
        }
    }

    fn test_pool(capacity: u64) -> (FixedSizePool, Arc<FakeRuntime>) {
        let runtime = Arc::new(FakeRuntime::new());
        let store = Arc::new(MemoryStore::new());
        let specs = Arc::new(write_spec_store(one_container_spec()));
        let engine = Arc::new(FlockEngine::new(
            runtime.clone(),
            store.clone(),
            specs,
            "owt.shepherd.reqid".into(),
            "owt.shepherd.deferred".into(),
        ));
        let network_pool = Arc::new(PlainNetworkPool::new(
            runtime.clone(),
            "fixed".into(),
            "owt.network.managed".into(),
        ));
        let config = PoolConfig {
            name: "fixed".into(),
            duration_secs: 60,
            max_size: Some(capacity),
            expire_check_secs: 1,
            grace_time_secs: 0,
            wait_ping_ttl_secs: 10,
            network_pool_size: None,
        };
        (FixedSizePool::new(engine, network_pool, store, config), runtime)
    }

    #[tokio::test]
    async fn admits_up_to_capacity_then_queues() {
        let (pool, runtime) = test_pool(2);
        let mut reqids = Vec::new();
        for _ in 0..4 {
            reqids.push(pool.request("test_fixed", RequestOptions::default()).await.unwrap());
        }
        let mut launched = 0;
        let mut queued = 0;
        for reqid in &reqids {
            match pool.start(reqid, Map::new()).await.unwrap() {
                StartOutcome::Launched(_) => launched += 1,
                StartOutcome::Queued { .. } => queued += 1,
            }
        }
        assert_eq!(launched, 2);
        assert_eq!(queued, 2);
        assert_eq!(runtime.container_count(), 2);
    }

    #[tokio::test]
    async fn freed_slot_admits_head_of_queue() {
        let (pool, _runtime) = test_pool(1);
        let first = pool.request("test_fixed", RequestOptions::default()).await.unwrap();
        let second = pool.request("test_fixed", RequestOptions::default()).await.unwrap();
        assert!(matches!(pool.start(&first, Map::new()).await.unwrap(), StartOutcome::Launched(_)));
        assert!(matches!(pool.start(&second, Map::new()).await.unwrap(), StartOutcome::Queued { position: 0 }));

        pool.remove(&first).await;
        assert!(matches!(pool.start(&second, Map::new()).await.unwrap(), StartOutcome::Launched(_)));
    }
}
