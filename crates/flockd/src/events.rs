//! Container Event Subscriber (spec §4.6): streams runtime events filtered
//! to `die`/`start` carrying the pool label, reads the reqid out of the
//! event's actor attributes, and dispatches to the owning pool's handler.
//!
//! Tied to the live Docker event stream — there is no meaningful fake event
//! source to drive here, so each pool's `handle_die_event`/`handle_start_event`
//! is exercised directly in its own unit tests instead.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;

use crate::docker::DockerClient;
use crate::pool::Pool;

pub struct EventSubscriber {
    client: Arc<DockerClient>,
    pools: HashMap<String, Arc<dyn Pool>>,
    pool_label: String,
    request_label: String,
    deferred_label: String,
}

impl EventSubscriber {
    pub fn new(
        client: Arc<DockerClient>,
        pools: HashMap<String, Arc<dyn Pool>>,
        pool_label: String,
        request_label: String,
        deferred_label: String,
    ) -> Self {
        Self {
            client,
            pools,
            pool_label,
            request_label,
            deferred_label,
        }
    }

    /// Runs until the event stream ends — normally only on daemon connection
    /// loss. Callers wrap this in a reconnect loop.
    pub async fn run(&self) {
        // Bare key (no `=value`): matches any container carrying the pool
        // label, regardless of which pool it names; we dispatch on the
        // actual value below.
        let mut stream = self.client.stream_container_events(&self.pool_label);
        while let Some(item) = stream.next().await {
            match item {
                Ok(event) => self.handle_event(event).await,
                Err(e) => tracing::warn!(error = %e, "event stream error, continuing"),
            }
        }
    }

    async fn handle_event(&self, event: bollard::models::EventMessage) {
        let attributes = match event.actor.and_then(|a| a.attributes) {
            Some(attrs) => attrs,
            None => {
                tracing::debug!("event with no actor attributes, skipping");
                return;
            }
        };

        let pool_name = match attributes.get(&self.pool_label) {
            Some(name) => name,
            None => {
                tracing::debug!("event missing pool label, skipping");
                return;
            }
        };
        let pool = match self.pools.get(pool_name) {
            Some(p) => p,
            None => {
                tracing::debug!(pool = %pool_name, "event for unknown pool, skipping");
                return;
            }
        };
        let reqid = match attributes.get(&self.request_label) {
            Some(r) => r,
            None => {
                tracing::debug!("event missing reqid label, skipping");
                return;
            }
        };

        let is_deferred = attributes.get(&self.deferred_label).map(|v| v == "1").unwrap_or(false);

        match event.action.as_deref().unwrap_or("") {
            "die" => {
                let exit_code = attributes.get("exitCode").and_then(|v| v.parse::<i64>().ok());
                pool.handle_die_event(reqid, exit_code, is_deferred).await;
            }
            "start" => {
                pool.handle_start_event(reqid).await;
            }
            other => {
                tracing::debug!(action = other, "unhandled event action");
            }
        }
    }
}
