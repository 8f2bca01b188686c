//! Container flock scheduler: accepts requests to launch groups of related
//! containers ("flocks"), schedules them onto one of several pool
//! disciplines, drives each through its lifecycle, and reconciles runtime
//! state against lost tracking records.

pub mod config;
pub mod docker;
pub mod engine;
pub mod error;
pub mod events;
pub mod labels;
pub mod netpool;
pub mod pool;
pub mod reconciler;
pub mod spec;
pub mod store;

pub use config::FlockdConfig;
pub use docker::{DockerClient, DockerError};
pub use engine::FlockEngine;
pub use error::{FlockError, FlockResult};
pub use events::EventSubscriber;
pub use pool::{FixedSizePool, LaunchAllPool, PersistentPool, Pool, PoolConfig, PoolFileConfig, PoolKind};
pub use reconciler::Reconciler;
pub use spec::SpecStore;
pub use store::{KvStore, MemoryStore, RedisStore};
