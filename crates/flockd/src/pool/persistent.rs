//! PersistentPool (spec §4.5.3, `type = persist`): bounded capacity with
//! preemption. Every admitted reqid is *persisted* — added to `p:<pool>:a`,
//! its record's TTL dropped entirely — and survives preemption eligible for
//! re-scheduling, rather than being torn down like the other two pool kinds.

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::{FlockEngine, RequestOptions};
use crate::error::FlockResult;
use crate::netpool::NetworkPool;
use crate::store::{keys, KvStore};

use super::{BoxFut, Pool, PoolConfig, PoolPrimitives, StartOutcome};

pub struct PersistentPool {
    engine: Arc<FlockEngine>,
    network_pool: Arc<dyn NetworkPool>,
    store: Arc<dyn KvStore>,
    prim: PoolPrimitives,
    config: PoolConfig,
}

impl PersistentPool {
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

    fn labels(&self) -> HashMap<String, String> {
        HashMap::from([(crate::labels::POOL_LABEL.to_string(), self.config.name.clone())])
    }

    async fn wait_position(&self, reqid: &str) -> Option<u64> {
        let list = self.store.lrange(&keys::persist_wait_queue(&self.config.name), 0, -1).await.unwrap_or_default();
        list.iter().position(|r| r == reqid).map(|p| p as u64)
    }

    async fn launch(&self, reqid: &str, environ: HashMap<String, String>) -> FlockResult<crate::engine::LaunchResponse> {
        let resp = self
            .engine
            .start(reqid, self.labels(), environ, self.network_pool.as_ref())
            .await?;
        self.prim.add_running(reqid).await;
        self.prim.mark_wait_duration(reqid, self.config.duration_secs).await;
        let _ = self.store.persist(&keys::req(reqid)).await;
        Ok(resp)
    }

    /// Pop the next waiting reqid and try to start it, dropping reqids that
    /// fail to launch until one succeeds or the wait queue is empty.
    async fn promote_next(&self) {
        let wq = keys::persist_wait_queue(&self.config.name);
        let ws = keys::persist_wait_set(&self.config.name);
        while let Ok(Some(candidate)) = self.store.lpop(&wq).await {
            let _ = self.store.srem(&ws, &candidate).await;
            if self.launch(&candidate, HashMap::new()).await.is_ok() {
                return;
            }
            // Failed to launch — drop it from the persist set entirely
            // rather than leave an unreachable reqid behind.
            let _ = self.store.srem(&keys::persist_all(&self.config.name), &candidate).await;
            self.prim.forget_reqid(&candidate).await;
        }
    }
}

impl Pool for PersistentPool {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn request<'a>(&'a self, flock: &'a str, opts: RequestOptions) -> BoxFut<'a, FlockResult<String>> {
        Box::pin(async move { self.engine.request(flock, opts).await })
    }

    fn start<'a>(&'a self, reqid: &'a str, environ: HashMap<String, String>) -> BoxFut<'a, FlockResult<StartOutcome>> {
        Box::pin(async move {
            if self.prim.is_running(reqid).await {
                let resp = self
                    .engine
                    .start(reqid, self.labels(), environ, self.network_pool.as_ref())
                    .await?;
                return Ok(StartOutcome::Launched(resp));
            }

            let ws = keys::persist_wait_set(&self.config.name);
            if self.store.sismember(&ws, reqid).await.unwrap_or(false) {
                let pos = self.wait_position(reqid).await.unwrap_or(0);
                return Ok(StartOutcome::Queued { position: pos });
            }

            let _ = self.store.sadd(&keys::persist_all(&self.config.name), reqid).await;
            let avail = self.config.capacity().saturating_sub(self.prim.running_count().await);
            if avail == 0 {
                let wq = keys::persist_wait_queue(&self.config.name);
                let _ = self.store.rpush(&wq, reqid).await;
                let _ = self.store.sadd(&ws, reqid).await;
                let position = self.store.llen(&wq).await.unwrap_or(1).saturating_sub(1);
                return Ok(StartOutcome::Queued { position });
            }

            let resp = self.launch(reqid, environ).await?;
            Ok(StartOutcome::Launched(resp))
        })
    }

    fn remove<'a>(&'a self, reqid: &'a str) -> BoxFut<'a, ()> {
        Box::pin(async move {
            let was_running = self.prim.is_running(reqid).await;
            let _ = self.store.srem(&keys::persist_all(&self.config.name), reqid).await;
            self.prim.remove_running(reqid).await;
            let _ = self.store.lrem(&keys::persist_wait_queue(&self.config.name), reqid).await;
            let _ = self.store.srem(&keys::persist_wait_set(&self.config.name), reqid).await;
            self.prim.mark_expired(reqid).await;
            let _ = self
                .engine
                .remove(reqid, false, self.config.grace_time_secs, self.network_pool.as_ref())
                .await;
            if was_running {
                self.promote_next().await;
            }
        })
    }

    fn on_expired<'a>(&'a self, reqid: &'a str) -> BoxFut<'a, ()> {
        Box::pin(async move {
            let wq = keys::persist_wait_queue(&self.config.name);
            let ws = keys::persist_wait_set(&self.config.name);
            match self.store.lpop(&wq).await.ok().flatten() {
                None => {
                    // No one waiting — refresh the duration timer in place.
                    self.prim.mark_wait_duration(reqid, self.config.duration_secs).await;
                }
                Some(next_reqid) => {
                    let _ = self.store.srem(&ws, &next_reqid).await;
                    self.prim.remove_running(reqid).await;
                    self.prim.mark_expired(reqid).await;
                    // keep_reqid: the record survives as `stopped`, re-eligible later.
                    let _ = self
                        .engine
                        .remove(reqid, true, self.config.grace_time_secs, self.network_pool.as_ref())
                        .await;
                    let _ = self.store.rpush(&wq, reqid).await;
                    let _ = self.store.sadd(&ws, reqid).await;

                    let mut candidate = Some(next_reqid);
                    while let Some(c) = candidate {
                        if self.launch(&c, HashMap::new()).await.is_ok() {
                            let _ = self.store.srem(&ws, &c).await;
                            break;
                        }
                        let _ = self.store.srem(&ws, &c).await;
                        let _ = self.store.srem(&keys::persist_all(&self.config.name), &c).await;
                        self.prim.forget_reqid(&c).await;
                        candidate = self.store.lpop(&wq).await.ok().flatten();
                        if let Some(next) = &candidate {
                            let _ = self.store.srem(&ws, next).await;
                        }
                    }
                }
            }
        })
    }

    fn expiry_tick<'a>(&'a self) -> BoxFut<'a, ()> {
        Box::pin(async move {
            for reqid in self.prim.expired_running().await {
                self.on_expired(&reqid).await;
            }
        })
    }

    fn handle_die_event<'a>(&'a self, reqid: &'a str, exit_code: Option<i64>, is_deferred: bool) -> BoxFut<'a, ()> {
        Box::pin(async move {
            if exit_code == Some(0) && !is_deferred {
                self.remove(reqid).await;
            } else {
                self.prim.mark_expired(reqid).await;
            }
        })
    }

    fn shutdown<'a>(&'a self) -> BoxFut<'a, ()> {
        Box::pin(async move {
            for reqid in self.prim.running_ids().await {
                self.remove(&reqid).await;
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
            name: "test_persist".into(),
            containers: vec![ContainerSpec {
                name: "box".into(),
                image: "busybox:latest".into(),
                ..Default::default()
            }],
            volumes: Map::new(),
            auto_remove: false,
        }
    }

    fn test_pool(capacity: u64) -> (PersistentPool, Arc<MemoryStore>) {
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
            runtime,
            "persist".into(),
            "owt.network.managed".into(),
        ));
        let config = PoolConfig {
            name: "persist".into(),
            duration_secs: 60,
            max_size: Some(capacity),
            expire_check_secs: 1,
            grace_time_secs: 0,
            wait_ping_ttl_secs: 10,
            network_pool_size: None,
        };
        (PersistentPool::new(engine, network_pool, store.clone(), config), store)
    }

    #[tokio::test]
    async fn fourth_request_queues_at_capacity() {
        let (pool, _store) = test_pool(3);
        let mut reqids = Vec::new();
        for _ in 0..4 {
            reqids.push(pool.request("test_persist", RequestOptions::default()).await.unwrap());
        }
        for reqid in &reqids[..3] {
            assert!(matches!(pool.start(reqid, Map::new()).await.unwrap(), StartOutcome::Launched(_)));
        }
        assert!(matches!(
            pool.start(&reqids[3], Map::new()).await.unwrap(),
            StartOutcome::Queued { position: 0 }
        ));
    }

    #[tokio::test]
    async fn expiry_preempts_oldest_for_queued_reqid() {
        let (pool, store) = test_pool(1);
        let first = pool.request("test_persist", RequestOptions::default()).await.unwrap();
        let second = pool.request("test_persist", RequestOptions::default()).await.unwrap();
        pool.start(&first, Map::new()).await.unwrap();
        assert!(matches!(
            pool.start(&second, Map::new()).await.unwrap(),
            StartOutcome::Queued { position: 0 }
        ));

        pool.prim.mark_expired(&first).await;
        pool.on_expired(&first).await;

        assert!(pool.prim.is_running(&second).await);
        assert!(!pool.prim.is_running(&first).await);
        let wq = store.lrange("p:persist:wq", 0, -1).await.unwrap();
        assert_eq!(wq, vec![first]);
    }

    #[tokio::test]
    async fn remove_promotes_next_waiter() {
        let (pool, _store) = test_pool(1);
        let first = pool.request("test_persist", RequestOptions::default()).await.unwrap();
        let second = pool.request("test_persist", RequestOptions::default()).await.unwrap();
        pool.start(&first, Map::new()).await.unwrap();
        pool.start(&second, Map::new()).await.unwrap();

        pool.remove(&first).await;
        assert!(pool.prim.is_running(&second).await);
    }
}
