//! Reconciler (spec §4.7): periodically sweeps the container/volume/network
//! inventory for orphans whose request record no longer exists.
//!
//! Mirrors the mark-and-sweep shape this codebase already uses for inventory
//! sync: tick on an interval, tolerate individual failures without killing
//! the loop, log and move on.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::docker::ContainerRuntime;
use crate::netpool::NetworkPool;
use crate::store::{keys, KvStore};

pub struct Reconciler {
    runtime: Arc<dyn ContainerRuntime>,
    store: Arc<dyn KvStore>,
    network_pool: Arc<dyn NetworkPool>,
    request_label: String,
    network_label: String,
    interval_secs: u64,
}

impl Reconciler {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        store: Arc<dyn KvStore>,
        network_pool: Arc<dyn NetworkPool>,
        request_label: String,
        network_label: String,
        interval_secs: u64,
    ) -> Self {
        Self {
            runtime,
            store,
            network_pool,
            request_label,
            network_label,
            interval_secs,
        }
    }

    /// Runs forever at `interval_secs`. A 0 interval means "disabled" per
    /// spec §4.7; callers should simply not spawn this task in that case,
    /// but we guard here too in case one does anyway.
    pub async fn run(&self) {
        if self.interval_secs == 0 {
            tracing::info!("reconciler disabled (interval_secs=0)");
            return;
        }
        let mut ticker = tokio::time::interval(Duration::from_secs(self.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.sweep().await;
        }
    }

    /// One sweep pass (spec §4.7, steps 1-3). Exceptions from any single
    /// runtime call are logged and do not abort the rest of the sweep.
    pub async fn sweep(&self) {
        let containers = match self.runtime.list_containers_by_label(&self.request_label).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "reconciler: failed to list containers");
                return;
            }
        };

        let mut orphan_reqids = HashSet::new();
        let mut candidate_networks = HashSet::new();

        for c in &containers {
            let reqid = match c.labels.get(&self.request_label) {
                Some(r) => r.clone(),
                None => continue,
            };
            // Treat a store error as "the record might still exist" —
            // never destroy a live flock's containers on a transient
            // coordination-store failure.
            let record_exists = self.store.exists(&keys::req(&reqid)).await.unwrap_or(true);
            if record_exists {
                continue;
            }

            orphan_reqids.insert(reqid);
            for network_id in c.networks.keys() {
                candidate_networks.insert(network_id.clone());
            }
            if let Err(e) = self.runtime.remove_container(&c.id, true).await {
                tracing::warn!(error = %e, container = %c.id, "reconciler: failed to remove orphan container");
            }
        }

        for reqid in &orphan_reqids {
            let filter = crate::labels::filter(&self.request_label, reqid);
            if let Err(e) = self.runtime.prune_volumes(&filter).await {
                tracing::warn!(error = %e, reqid = %reqid, "reconciler: failed to prune volumes");
            }
            let _ = self.store.del(&keys::req(reqid)).await;
        }

        let managed_networks = self
            .runtime
            .list_networks_by_label(&self.network_label)
            .await
            .unwrap_or_default();
        for network_id in candidate_networks {
            let empty = managed_networks
                .iter()
                .find(|n| n.id == network_id)
                .map(|n| n.attached.is_empty())
                .unwrap_or(false);
            if empty {
                self.network_pool.remove_network(&network_id).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::container::CreateContainerSpec;
    use crate::docker::fake::FakeRuntime;
    use crate::netpool::PlainNetworkPool;
    use crate::store::MemoryStore;
    use std::collections::HashMap;

    fn reconciler(runtime: Arc<FakeRuntime>, store: Arc<MemoryStore>) -> Reconciler {
        let network_pool = Arc::new(PlainNetworkPool::new(
            runtime.clone(),
            "default".into(),
            "owt.network.managed".into(),
        ));
        Reconciler::new(
            runtime,
            store,
            network_pool,
            "owt.shepherd.reqid".into(),
            "owt.network.managed".into(),
            30,
        )
    }

    #[tokio::test]
    async fn sweep_removes_containers_with_no_matching_record() {
        let runtime = Arc::new(FakeRuntime::new());
        let store = Arc::new(MemoryStore::new());

        let net = runtime.create_network("flock-orphan", HashMap::new()).await.unwrap();
        let id = runtime
            .create_container(CreateContainerSpec {
                name: "box",
                image: "img",
                env: vec![],
                labels: HashMap::from([("owt.shepherd.reqid".to_string(), "orphan1".to_string())]),
                exposed_ports: vec![],
                shm_size: None,
                auto_remove: false,
            })
            .await
            .unwrap();
        runtime.network_connect(&net, &id).await.unwrap();
        runtime.start_container(&id).await.unwrap();

        let rec = reconciler(runtime.clone(), store.clone());
        rec.sweep().await;

        assert_eq!(runtime.container_count(), 0);
        assert!(!store.exists("req:orphan1").await.unwrap());
    }

    #[tokio::test]
    async fn sweep_leaves_containers_with_a_live_record_alone() {
        let runtime = Arc::new(FakeRuntime::new());
        let store = Arc::new(MemoryStore::new());
        store.set("req:live1", "{}", None).await.unwrap();

        let id = runtime
            .create_container(CreateContainerSpec {
                name: "box",
                image: "img",
                env: vec![],
                labels: HashMap::from([("owt.shepherd.reqid".to_string(), "live1".to_string())]),
                exposed_ports: vec![],
                shm_size: None,
                auto_remove: false,
            })
            .await
            .unwrap();
        runtime.start_container(&id).await.unwrap();

        let rec = reconciler(runtime.clone(), store.clone());
        rec.sweep().await;

        assert_eq!(runtime.container_count(), 1);
    }
}
