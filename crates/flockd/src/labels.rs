//! Bit-stable label names placed on containers, volumes and networks.
//!
//! These strings are part of the on-disk/on-wire contract: every container,
//! volume and network created by the engine carries them, and the
//! reconciler and event subscriber key their queries off the same strings.
//! Keep them in this one module.

pub const REQUEST_LABEL: &str = "owt.shepherd.reqid";
pub const DEFERRED_LABEL: &str = "owt.shepherd.deferred";
pub const POOL_LABEL: &str = "owt.shepherd.pool";
pub const NETWORK_LABEL: &str = "owt.network.managed";

/// Render a `label=value` filter string understood by the container runtime's
/// list/filter APIs.
pub fn filter(label: &str, value: &str) -> String {
    format!("{label}={value}")
}
