//! Container-runtime interface: a thin Bollard-backed client plus the
//! `ContainerRuntime` trait the engine actually depends on, so engine/pool/
//! reconciler tests can run against an in-memory fake instead of a live
//! daemon.

pub mod ancestry;
pub mod client;
pub mod container;
pub mod event;
pub mod fake;
pub mod image;
pub mod inventory;
pub mod network;
pub mod ops;
pub mod volume;

pub use client::{DockerClient, DockerError};
pub use inventory::RuntimeContainer;
pub use ops::ContainerRuntime;
