//! Event domain — runtime event streaming, filtered to `die`/`start` events
//! carrying a pool label, as consumed by the container event subscriber.

use super::client::{DockerClient, DockerError};
use futures_util::stream::StreamExt;

impl DockerClient {
    /// Stream runtime events restricted to `status in {die, start}` and the
    /// given `label=value` filter (typically the pool label).
    pub fn stream_container_events(
        &self,
        label_filter: &str,
    ) -> impl futures_util::Stream<Item = Result<bollard::models::EventMessage, DockerError>> + '_ {
        use bollard::query_parameters::EventsOptionsBuilder;
        use std::collections::HashMap;

        let mut filters = HashMap::new();
        filters.insert("type", vec!["container"]);
        filters.insert("event", vec!["die", "start"]);
        filters.insert("label", vec![label_filter]);

        let options = EventsOptionsBuilder::default().filters(&filters).build();

        self.client
            .events(Some(options))
            .map(|r| r.map_err(DockerError::from))
    }
}
