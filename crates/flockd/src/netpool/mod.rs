//! Network Pool (spec §4.3): create, label, disconnect and destroy isolated
//! networks; the cached variant recycles a bounded number for reuse.
//!
//! Failure here is never fatal to the caller — both operations return a
//! plain boolean/`Option`, and the flock engine treats a failure as "let the
//! reconciler handle it."

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use rand::Rng;

use crate::docker::ContainerRuntime;
use crate::store::{keys, KvStore};

type BoxFut<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

pub trait NetworkPool: Send + Sync {
    fn create_network<'a>(&'a self) -> BoxFut<'a, Option<String>>;
    fn remove_network<'a>(&'a self, network_id: &'a str) -> BoxFut<'a, bool>;
    fn shutdown<'a>(&'a self) -> BoxFut<'a, ()>;
}

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..8).map(|_| format!("{:x}", rng.gen_range(0..16))).collect()
}

pub struct PlainNetworkPool {
    runtime: Arc<dyn ContainerRuntime>,
    pool_name: String,
    network_label: String,
}

impl PlainNetworkPool {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, pool_name: String, network_label: String) -> Self {
        Self {
            runtime,
            pool_name,
            network_label,
        }
    }

    /// Disconnects every container attached to `network_id`, but only if it
    /// actually carries this pool's label. Returns whether it was found.
    async fn disconnect_all(&self, network_id: &str) -> bool {
        let filter = crate::labels::filter(&self.network_label, &self.pool_name);
        let Ok(nets) = self.runtime.list_networks_by_label(&filter).await else {
            return false;
        };
        let Some(net) = nets.iter().find(|n| n.id == network_id) else {
            return false;
        };
        for container in &net.attached {
            let _ = self.runtime.network_disconnect(network_id, container, true).await;
        }
        true
    }
}

impl NetworkPool for PlainNetworkPool {
    fn create_network<'a>(&'a self) -> BoxFut<'a, Option<String>> {
        Box::pin(async move {
            let name = format!("{}-{}", self.pool_name, random_suffix());
            let labels = HashMap::from([(self.network_label.clone(), self.pool_name.clone())]);
            match self.runtime.create_network(&name, labels).await {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to create network");
                    None
                }
            }
        })
    }

    fn remove_network<'a>(&'a self, network_id: &'a str) -> BoxFut<'a, bool> {
        Box::pin(async move {
            if !self.disconnect_all(network_id).await {
                return false;
            }
            match self.runtime.remove_network(network_id).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, network = network_id, "failed to remove network");
                    false
                }
            }
        })
    }

    fn shutdown<'a>(&'a self) -> BoxFut<'a, ()> {
        Box::pin(async move {})
    }
}

/// Recycles up to `capacity` network names for reuse, backed by a
/// coordination-store set (`n:<pool>`).
pub struct CachedNetworkPool {
    plain: PlainNetworkPool,
    store: Arc<dyn KvStore>,
    pool_name: String,
    capacity: u64,
}

impl CachedNetworkPool {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        store: Arc<dyn KvStore>,
        pool_name: String,
        network_label: String,
        capacity: u64,
    ) -> Self {
        Self {
            plain: PlainNetworkPool::new(runtime, pool_name.clone(), network_label),
            store,
            pool_name,
            capacity,
        }
    }

    fn cache_key(&self) -> String {
        keys::cached_network_pool(&self.pool_name)
    }
}

impl NetworkPool for CachedNetworkPool {
    fn create_network<'a>(&'a self) -> BoxFut<'a, Option<String>> {
        Box::pin(async move {
            let cache_key = self.cache_key();
            while let Ok(Some(candidate)) = self.store.spop(&cache_key).await {
                let filter = crate::labels::filter(&self.plain.network_label, &self.pool_name);
                let still_valid = self
                    .plain
                    .runtime
                    .list_networks_by_label(&filter)
                    .await
                    .ok()
                    .and_then(|nets| nets.into_iter().find(|n| n.id == candidate))
                    .map(|n| n.attached.is_empty())
                    .unwrap_or(false);
                if still_valid {
                    return Some(candidate);
                }
                // Network vanished or still has members — try the next cached entry.
            }
            self.plain.create_network().await
        })
    }

    fn remove_network<'a>(&'a self, network_id: &'a str) -> BoxFut<'a, bool> {
        Box::pin(async move {
            if !self.plain.disconnect_all(network_id).await {
                return false;
            }
            let cache_key = self.cache_key();
            let cached = self.store.scard(&cache_key).await.unwrap_or(0);
            if cached < self.capacity {
                let _ = self.store.sadd(&cache_key, network_id).await;
                true
            } else {
                match self.plain.runtime.remove_network(network_id).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(error = %e, network = network_id, "failed to remove network");
                        false
                    }
                }
            }
        })
    }

    fn shutdown<'a>(&'a self) -> BoxFut<'a, ()> {
        Box::pin(async move {
            let cache_key = self.cache_key();
            while let Ok(Some(network_id)) = self.store.spop(&cache_key).await {
                let _ = self.plain.runtime.remove_network(&network_id).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::fake::FakeRuntime;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn plain_pool_creates_and_removes() {
        let runtime = Arc::new(FakeRuntime::new());
        let pool = PlainNetworkPool::new(runtime, "testpool".into(), "owt.network.managed".into());
        let id = pool.create_network().await.expect("network created");
        assert!(pool.remove_network(&id).await);
    }

    #[tokio::test]
    async fn cached_pool_recycles_up_to_capacity() {
        let runtime = Arc::new(FakeRuntime::new());
        let store = Arc::new(MemoryStore::new());
        let pool = CachedNetworkPool::new(runtime, store, "testpool".into(), "owt.network.managed".into(), 2);
        let a = pool.create_network().await.unwrap();
        assert!(pool.remove_network(&a).await);
        let b = pool.create_network().await.unwrap();
        assert_eq!(a, b, "recycled network should be reused");
    }
}
