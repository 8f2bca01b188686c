use std::collections::HashMap;
use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flockd::docker::DockerClient;
use flockd::engine::FlockEngine;
use flockd::events::EventSubscriber;
use flockd::netpool::{CachedNetworkPool, NetworkPool, PlainNetworkPool};
use flockd::pool::{FixedSizePool, LaunchAllPool, PersistentPool, Pool, PoolFileConfig, PoolKind};
use flockd::reconciler::Reconciler;
use flockd::spec::SpecStore;
use flockd::store::RedisStore;
use flockd::FlockdConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flockd=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting flockd");

    let config = FlockdConfig::load()?;
    config.validate().map_err(|e| {
        error!("invalid configuration: {}", e);
        e
    })?;

    info!(socket = %config.docker_socket, "connecting to Docker daemon");
    let runtime: Arc<DockerClient> = Arc::new(DockerClient::new(&config.docker_socket)?);

    info!(url = %config.redis_url, "connecting to coordination store");
    let store = Arc::new(RedisStore::connect(&config.redis_url).await?);

    info!(path = %config.spec_path, "loading flock spec catalog");
    let specs = Arc::new(SpecStore::load(&config.spec_path)?);
    info!(count = specs.len(), "loaded flock specs");

    info!(path = %config.pool_config_path, "loading pool configuration");
    let pool_file = PoolFileConfig::load(&config.pool_config_path)?;

    let engine = Arc::new(FlockEngine::new(
        runtime.clone() as Arc<dyn flockd::docker::ContainerRuntime>,
        store.clone() as Arc<dyn flockd::store::KvStore>,
        specs,
        config.request_label.clone(),
        config.deferred_label.clone(),
    ));

    let mut pools: HashMap<String, Arc<dyn Pool>> = HashMap::new();
    for (name, entry) in &pool_file.pools {
        let network_pool: Arc<dyn NetworkPool> = match entry.config.network_pool_size {
            Some(capacity) => Arc::new(CachedNetworkPool::new(
                runtime.clone() as Arc<dyn flockd::docker::ContainerRuntime>,
                store.clone() as Arc<dyn flockd::store::KvStore>,
                name.clone(),
                config.network_label.clone(),
                capacity,
            )),
            None => Arc::new(PlainNetworkPool::new(
                runtime.clone() as Arc<dyn flockd::docker::ContainerRuntime>,
                name.clone(),
                config.network_label.clone(),
            )),
        };
        let pool: Arc<dyn Pool> = match entry.kind {
            PoolKind::All => Arc::new(LaunchAllPool::new(
                engine.clone(),
                network_pool,
                store.clone() as Arc<dyn flockd::store::KvStore>,
                entry.config.clone(),
            )),
            PoolKind::Fixed => Arc::new(FixedSizePool::new(
                engine.clone(),
                network_pool,
                store.clone() as Arc<dyn flockd::store::KvStore>,
                entry.config.clone(),
            )),
            PoolKind::Persist => Arc::new(PersistentPool::new(
                engine.clone(),
                network_pool,
                store.clone() as Arc<dyn flockd::store::KvStore>,
                entry.config.clone(),
            )),
        };
        info!(pool = %name, kind = ?entry.kind, "pool configured");
        pools.insert(name.clone(), pool);
    }

    let reconciler = Reconciler::new(
        runtime.clone() as Arc<dyn flockd::docker::ContainerRuntime>,
        store.clone() as Arc<dyn flockd::store::KvStore>,
        // The reconciler only needs network removal, so any one pool's
        // network pool will do for that concern — it owns no per-pool state.
        Arc::new(PlainNetworkPool::new(
            runtime.clone() as Arc<dyn flockd::docker::ContainerRuntime>,
            "reconciler".into(),
            config.network_label.clone(),
        )),
        config.request_label.clone(),
        config.network_label.clone(),
        config.reconciler_interval_secs,
    );
    tokio::spawn(async move { reconciler.run().await });

    for (name, pool) in pools.clone() {
        let interval_secs = pool_file.pools[&name].config.expire_check_secs;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                pool.expiry_tick().await;
            }
        });
    }

    let subscriber = EventSubscriber::new(
        runtime.clone(),
        pools.clone(),
        config.pool_label.clone(),
        config.request_label.clone(),
        config.deferred_label.clone(),
    );
    tokio::spawn(async move {
        loop {
            subscriber.run().await;
            tracing::warn!("event stream ended, reconnecting in 1s");
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        }
    });

    info!(default_pool = %pool_file.default_pool, pools = pools.len(), "flockd is ready");

    shutdown_signal().await;
    info!("shutting down, draining pools");
    for pool in pools.values() {
        pool.shutdown().await;
    }
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, initiating graceful shutdown"),
        _ = terminate => info!("received SIGTERM, initiating graceful shutdown"),
    }
}
