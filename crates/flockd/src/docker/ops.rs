//! `ContainerRuntime` — the container-runtime interface the flock engine
//! actually depends on (spec §6.1), abstracted so the engine, pools and
//! reconciler can be tested against [`fake::FakeRuntime`] instead of a live
//! daemon. `DockerClient` is the live implementation (see `live` impl below).

use std::collections::HashMap;
use std::pin::Pin;

use super::client::DockerError;
use super::container::CreateContainerSpec;
use super::inventory::RuntimeContainer;

#[derive(Debug, Clone)]
pub struct NetworkInfo {
    pub id: String,
    pub name: String,
    pub labels: HashMap<String, String>,
    /// container ids currently attached.
    pub attached: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct VolumeInfo {
    pub name: String,
    pub labels: HashMap<String, String>,
}

pub type DockerResult<T> = Result<T, DockerError>;
type BoxFut<'a, T> = Pin<Box<dyn std::future::Future<Output = DockerResult<T>> + Send + 'a>>;

pub trait ContainerRuntime: Send + Sync {
    fn list_containers_by_label<'a>(&'a self, label_filter: &'a str) -> BoxFut<'a, Vec<RuntimeContainer>>;
    fn inspect_container<'a>(&'a self, id: &'a str) -> BoxFut<'a, RuntimeContainer>;
    fn create_container<'a>(&'a self, spec: CreateContainerSpec<'a>) -> BoxFut<'a, String>;
    fn start_container<'a>(&'a self, id: &'a str) -> BoxFut<'a, ()>;
    fn stop_container<'a>(&'a self, id: &'a str, grace_time_secs: u32) -> BoxFut<'a, ()>;
    fn kill_container<'a>(&'a self, id: &'a str) -> BoxFut<'a, ()>;
    fn remove_container<'a>(&'a self, id: &'a str, force: bool) -> BoxFut<'a, ()>;

    fn create_network<'a>(&'a self, name: &'a str, labels: HashMap<String, String>) -> BoxFut<'a, String>;
    fn list_networks_by_label<'a>(&'a self, label_filter: &'a str) -> BoxFut<'a, Vec<NetworkInfo>>;
    fn remove_network<'a>(&'a self, network_id: &'a str) -> BoxFut<'a, ()>;
    fn network_connect<'a>(&'a self, network_id: &'a str, container_id: &'a str) -> BoxFut<'a, ()>;
    fn network_disconnect<'a>(&'a self, network_id: &'a str, container_id: &'a str, force: bool) -> BoxFut<'a, ()>;

    fn create_volume<'a>(&'a self, name: &'a str, labels: HashMap<String, String>) -> BoxFut<'a, ()>;
    fn list_volumes_by_label<'a>(&'a self, label_filter: &'a str) -> BoxFut<'a, Vec<VolumeInfo>>;
    fn prune_volumes<'a>(&'a self, label_filter: &'a str) -> BoxFut<'a, ()>;

    fn image_layers<'a>(&'a self, image: &'a str) -> BoxFut<'a, Vec<String>>;
    /// True if the image carries the given label, optionally with an exact value match.
    fn image_has_label<'a>(&'a self, image: &'a str, label: &'a str, value: Option<&'a str>) -> BoxFut<'a, bool>;
}

mod live {
    use super::*;
    use crate::docker::client::DockerClient;

    impl ContainerRuntime for DockerClient {
        fn list_containers_by_label<'a>(&'a self, label_filter: &'a str) -> BoxFut<'a, Vec<RuntimeContainer>> {
            Box::pin(self.list_containers_by_label(label_filter))
        }

        fn inspect_container<'a>(&'a self, id: &'a str) -> BoxFut<'a, RuntimeContainer> {
            Box::pin(DockerClient::inspect_container(self, id))
        }

        fn create_container<'a>(&'a self, spec: CreateContainerSpec<'a>) -> BoxFut<'a, String> {
            Box::pin(DockerClient::create_container(self, spec))
        }

        fn start_container<'a>(&'a self, id: &'a str) -> BoxFut<'a, ()> {
            Box::pin(DockerClient::start_container(self, id))
        }

        fn stop_container<'a>(&'a self, id: &'a str, grace_time_secs: u32) -> BoxFut<'a, ()> {
            Box::pin(DockerClient::stop_container(self, id, grace_time_secs))
        }

        fn kill_container<'a>(&'a self, id: &'a str) -> BoxFut<'a, ()> {
            Box::pin(DockerClient::kill_container(self, id))
        }

        fn remove_container<'a>(&'a self, id: &'a str, force: bool) -> BoxFut<'a, ()> {
            Box::pin(DockerClient::remove_container(self, id, force))
        }

        fn create_network<'a>(&'a self, name: &'a str, labels: HashMap<String, String>) -> BoxFut<'a, String> {
            Box::pin(async move {
                let response = DockerClient::create_network(
                    self,
                    name,
                    None,
                    labels,
                    false,
                    true,
                    false,
                    HashMap::new(),
                    None,
                )
                .await?;
                Ok(if response.id.is_empty() { name.to_string() } else { response.id })
            })
        }

        fn list_networks_by_label<'a>(&'a self, label_filter: &'a str) -> BoxFut<'a, Vec<NetworkInfo>> {
            Box::pin(async move {
                let networks = DockerClient::list_networks_by_label(self, label_filter).await?;
                Ok(networks
                    .into_iter()
                    .map(|n| NetworkInfo {
                        id: n.id.unwrap_or_default(),
                        name: n.name.unwrap_or_default(),
                        labels: n.labels.unwrap_or_default(),
                        attached: Vec::new(),
                    })
                    .collect())
            })
        }

        fn remove_network<'a>(&'a self, network_id: &'a str) -> BoxFut<'a, ()> {
            Box::pin(DockerClient::remove_network(self, network_id))
        }

        fn network_connect<'a>(&'a self, network_id: &'a str, container_id: &'a str) -> BoxFut<'a, ()> {
            Box::pin(DockerClient::network_connect(self, network_id, container_id))
        }

        fn network_disconnect<'a>(&'a self, network_id: &'a str, container_id: &'a str, force: bool) -> BoxFut<'a, ()> {
            Box::pin(DockerClient::network_disconnect(self, network_id, container_id, force))
        }

        fn create_volume<'a>(&'a self, name: &'a str, labels: HashMap<String, String>) -> BoxFut<'a, ()> {
            Box::pin(async move {
                DockerClient::create_volume(self, name, None, labels, HashMap::new()).await?;
                Ok(())
            })
        }

        fn list_volumes_by_label<'a>(&'a self, label_filter: &'a str) -> BoxFut<'a, Vec<VolumeInfo>> {
            Box::pin(async move {
                let volumes = DockerClient::list_volumes_by_label(self, label_filter).await?;
                Ok(volumes
                    .into_iter()
                    .map(|v| VolumeInfo {
                        name: v.name,
                        labels: v.labels,
                    })
                    .collect())
            })
        }

        fn prune_volumes<'a>(&'a self, label_filter: &'a str) -> BoxFut<'a, ()> {
            Box::pin(DockerClient::prune_volumes(self, label_filter))
        }

        fn image_layers<'a>(&'a self, image: &'a str) -> BoxFut<'a, Vec<String>> {
            Box::pin(DockerClient::image_layers(self, image))
        }

        fn image_has_label<'a>(&'a self, image: &'a str, label: &'a str, value: Option<&'a str>) -> BoxFut<'a, bool> {
            Box::pin(async move {
                let details = self.inspect_image(image).await?;
                let labels = details
                    .config
                    .and_then(|c| c.labels)
                    .unwrap_or_default();
                Ok(match value {
                    Some(v) => labels.get(label).map(|lv| lv == v).unwrap_or(false),
                    None => labels.contains_key(label),
                })
            })
        }
    }
}
