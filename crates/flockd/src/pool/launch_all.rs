//! LaunchAllPool (spec §4.5.1, `type = all`): admits every request
//! immediately. No capacity, no queue.

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::{FlockEngine, RequestOptions};
use crate::error::FlockResult;
use crate::netpool::NetworkPool;
use crate::store::KvStore;

use super::{BoxFut, Pool, PoolConfig, PoolPrimitives, StartOutcome};

pub struct LaunchAllPool {
    engine: Arc<FlockEngine>,
    network_pool: Arc<dyn NetworkPool>,
    prim: PoolPrimitives,
    config: PoolConfig,
}

impl LaunchAllPool {
    pub fn new(
        engine: Arc<FlockEngine>,
        network_pool: Arc<dyn NetworkPool>,
        store: Arc<dyn KvStore>,
        config: PoolConfig,
    ) -> Self {
        let prim = PoolPrimitives::new(store, config.name.clone());
        Self {
            engine,
            network_pool,
            prim,
            config,
        }
    }

    async fn teardown(&self, reqid: &str) {
        let _ = self
            .engine
            .remove(reqid, false, self.config.grace_time_secs, self.network_pool.as_ref())
            .await;
        self.prim.forget_reqid(reqid).await;
    }
}

impl Pool for LaunchAllPool {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn request<'a>(&'a self, flock: &'a str, opts: RequestOptions) -> BoxFut<'a, FlockResult<String>> {
        Box::pin(async move { self.engine.request(flock, opts).await })
    }

    fn start<'a>(&'a self, reqid: &'a str, environ: HashMap<String, String>) -> BoxFut<'a, FlockResult<StartOutcome>> {
        Box::pin(async move {
            let labels = HashMap::from([(crate::labels::POOL_LABEL.to_string(), self.config.name.clone())]);
            let resp = self
                .engine
                .start(reqid, labels, environ, self.network_pool.as_ref())
                .await?;
            self.prim.add_running(reqid).await;
            self.prim.mark_wait_duration(reqid, self.config.duration_secs).await;
            Ok(StartOutcome::Launched(resp))
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
    use crate::spec::{FlockSpec, ContainerSpec, SpecStore};
    use crate::store::MemoryStore;
    use std::collections::HashMap as Map;

    fn one_container_spec() -> FlockSpec {
        FlockSpec {
            name: "test_all".into(),
            containers: vec![ContainerSpec {
                name: "box".into(),
                image: "busybox:latest".into(),
                ..Default::default()
            }],
            volumes: Map::new(),
            auto_remove: false,
        }
    }

    fn write_spec_store(spec: FlockSpec) -> SpecStore {
        let dir = std::env::temp_dir().join(format!("flockd-test-{}", crate::engine::reqid::generate()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("spec.yaml"), serde_yaml::to_string(&spec).unwrap()).unwrap();
        SpecStore::load(dir.to_str().unwrap()).unwrap()
    }

    fn test_pool() -> (LaunchAllPool, Arc<FakeRuntime>, Arc<MemoryStore>) {
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
            "all".into(),
            "owt.network.managed".into(),
        ));
        let config = PoolConfig {
            name: "all".into(),
            duration_secs: 60,
            max_size: None,
            expire_check_secs: 1,
            grace_time_secs: 0,
            wait_ping_ttl_secs: 10,
            network_pool_size: None,
        };
        (LaunchAllPool::new(engine, network_pool, store.clone(), config), runtime, store)
    }

    #[tokio::test]
    async fn request_and_start_admits_immediately() {
        let (pool, runtime, store) = test_pool();
        let reqid = pool.request("test_all", RequestOptions::default()).await.unwrap();
        let outcome = pool.start(&reqid, Map::new()).await.unwrap();
        match outcome {
            StartOutcome::Launched(resp) => assert_eq!(resp.containers.len(), 1),
            StartOutcome::Queued { .. } => panic!("launch-all pool must never queue"),
        }
        assert_eq!(runtime.container_count(), 1);
        assert!(store.sismember("p:all:f", &reqid).await.unwrap());
    }

    #[tokio::test]
    async fn expiry_tick_tears_down_lapsed_reqid() {
        let (pool, runtime, _store) = test_pool();
        let reqid = pool.request("test_all", RequestOptions::default()).await.unwrap();
        pool.start(&reqid, Map::new()).await.unwrap();
        // Simulate the duration sentinel lapsing without waiting real time.
        pool.prim.mark_expired(&reqid).await;
        pool.expiry_tick().await;
        assert_eq!(runtime.container_count(), 0);
        assert!(pool.prim.running_ids().await.is_empty());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let (pool, _runtime, _store) = test_pool();
        let reqid = pool.request("test_all", RequestOptions::default()).await.unwrap();
        pool.start(&reqid, Map::new()).await.unwrap();
        pool.remove(&reqid).await;
        pool.remove(&reqid).await;
        assert!(pool.prim.running_ids().await.is_empty());
    }
}
