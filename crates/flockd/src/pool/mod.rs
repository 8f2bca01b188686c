//! Pool Schedulers (spec §4.5): three admission/lifetime disciplines sharing
//! one coordination-store primitive set. Modeled as tagged variants over the
//! same primitives rather than an inheritance hierarchy — the spec's explicit
//! guidance (§9) — so `Pool` below is the common interface and each variant
//! lives in its own module.

pub mod config;
pub mod fixed;
pub mod launch_all;
pub mod persistent;

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use crate::engine::{FlockEngine, LaunchResponse, RequestOptions};
use crate::error::FlockResult;
use crate::store::{keys, KvStore};

pub use config::{PoolConfigError, PoolEntry, PoolFileConfig, PoolKind};
pub use fixed::FixedSizePool;
pub use launch_all::LaunchAllPool;
pub use persistent::PersistentPool;

type BoxFut<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Outcome of an admission attempt: either the flock launched, or it is
/// waiting at the given zero-based queue position.
#[derive(Debug, Clone)]
pub enum StartOutcome {
    Launched(LaunchResponse),
    Queued { position: u64 },
}

/// Static configuration for one pool instance (spec §6.5).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub name: String,
    pub duration_secs: u64,
    pub max_size: Option<u64>,
    pub expire_check_secs: u64,
    pub grace_time_secs: u32,
    pub wait_ping_ttl_secs: u64,
    pub network_pool_size: Option<u64>,
}

impl PoolConfig {
    pub fn capacity(&self) -> u64 {
        self.max_size.unwrap_or(u64::MAX)
    }
}

/// Common admission interface (spec §9: "tagged variants over the same
/// primitive set"). Every pool owns a [`FlockEngine`] handle, a coordination
/// store and a `request`/`start`/`remove` surface; construction also wires up
/// the event loop and expiry loop (spec §5), driven from `main` rather than
/// from inside the trait so tests can drive `expiry_tick` deterministically.
pub trait Pool: Send + Sync {
    fn name(&self) -> &str;

    fn request<'a>(&'a self, flock: &'a str, opts: RequestOptions) -> BoxFut<'a, FlockResult<String>>;

    fn start<'a>(&'a self, reqid: &'a str, environ: HashMap<String, String>) -> BoxFut<'a, FlockResult<StartOutcome>>;

    /// Explicit client-requested teardown (the forceful path, or following a
    /// `stop` on the engine for the graceful path).
    fn remove<'a>(&'a self, reqid: &'a str) -> BoxFut<'a, ()>;

    /// Called by the expiry loop for a reqid whose duration lapsed. Base
    /// pools tear the flock down; the persistent pool preempts instead.
    fn on_expired<'a>(&'a self, reqid: &'a str) -> BoxFut<'a, ()>;

    /// Runs one pass of the expiry loop: find every running reqid whose
    /// wait-duration sentinel has lapsed and hand it to `on_expired`.
    fn expiry_tick<'a>(&'a self) -> BoxFut<'a, ()>;

    /// Dispatch for a runtime `die` event (spec §4.6).
    fn handle_die_event<'a>(&'a self, reqid: &'a str, exit_code: Option<i64>, is_deferred: bool) -> BoxFut<'a, ()>;

    /// Dispatch for a runtime `start` event. No pool kind in this spec acts
    /// on it beyond bookkeeping; default is a no-op.
    fn handle_start_event<'a>(&'a self, _reqid: &'a str) -> BoxFut<'a, ()> {
        Box::pin(async {})
    }

    /// Stop both background tasks, remove every running reqid and drain any
    /// cached network pool (spec §5).
    fn shutdown<'a>(&'a self) -> BoxFut<'a, ()>;
}

/// Shared coordination-store primitives every pool kind builds on (spec
/// §4.5): the running set `p:<pool>:f`, the `rq` duration sentinel, and the
/// `reqp:<reqid>` reverse index.
pub(crate) struct PoolPrimitives {
    pub store: Arc<dyn KvStore>,
    pub pool_name: String,
}

impl PoolPrimitives {
    pub fn new(store: Arc<dyn KvStore>, pool_name: String) -> Self {
        Self { store, pool_name }
    }

    pub async fn add_running(&self, reqid: &str) {
        let _ = self.store.sadd(&keys::pool_running(&self.pool_name), reqid).await;
    }

    pub async fn remove_running(&self, reqid: &str) {
        let _ = self.store.srem(&keys::pool_running(&self.pool_name), reqid).await;
    }

    pub async fn is_running(&self, reqid: &str) -> bool {
        self.store
            .sismember(&keys::pool_running(&self.pool_name), reqid)
            .await
            .unwrap_or(false)
    }

    pub async fn running_count(&self) -> u64 {
        self.store.scard(&keys::pool_running(&self.pool_name)).await.unwrap_or(0)
    }

    pub async fn running_ids(&self) -> Vec<String> {
        self.store.smembers(&keys::pool_running(&self.pool_name)).await.unwrap_or_default()
    }

    pub async fn mark_wait_duration(&self, reqid: &str, duration_secs: u64) {
        let _ = self
            .store
            .set(&keys::pool_wait_sentinel(&self.pool_name, reqid), "1", Some(duration_secs))
            .await;
        let _ = self.store.set(&keys::reqp(reqid), &self.pool_name, None).await;
    }

    pub async fn mark_expired(&self, reqid: &str) {
        let _ = self.store.del(&keys::pool_wait_sentinel(&self.pool_name, reqid)).await;
    }

    pub async fn has_wait_sentinel(&self, reqid: &str) -> bool {
        self.store
            .exists(&keys::pool_wait_sentinel(&self.pool_name, reqid))
            .await
            .unwrap_or(false)
    }

    /// Reqids currently in the running set whose duration sentinel has
    /// lapsed — the work list for one expiry-loop pass.
    pub async fn expired_running(&self) -> Vec<String> {
        let mut expired = Vec::new();
        for reqid in self.running_ids().await {
            if !self.has_wait_sentinel(&reqid).await {
                expired.push(reqid);
            }
        }
        expired
    }

    pub async fn forget_reqid(&self, reqid: &str) {
        self.remove_running(reqid).await;
        self.mark_expired(reqid).await;
        let _ = self.store.del(&keys::reqp(reqid)).await;
    }
}

/// Shared engine handle + network pool every variant needs to materialise or
/// tear down a flock.
pub(crate) struct PoolDeps {
    pub engine: Arc<FlockEngine>,
    pub network_pool: Arc<dyn crate::netpool::NetworkPool>,
}
