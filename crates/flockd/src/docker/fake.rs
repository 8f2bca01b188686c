//! In-memory `ContainerRuntime` test double. Same shape as the rest of this
//! codebase's fakes: one mutex around plain data, full trait coverage, no
//! shortcuts — so engine/pool/reconciler tests exercise real admission and
//! cleanup logic without a live daemon.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Mutex;

use super::client::DockerError;
use super::container::CreateContainerSpec;
use super::inventory::{PortMapping, RuntimeContainer};
use super::ops::{ContainerRuntime, DockerResult, NetworkInfo, VolumeInfo};

#[derive(Clone)]
struct FakeContainer {
    id: String,
    image: String,
    labels: HashMap<String, String>,
    networks: HashMap<String, String>,
    running: bool,
    ports: Vec<PortMapping>,
}

#[derive(Clone)]
struct FakeNetwork {
    id: String,
    labels: HashMap<String, String>,
    attached: Vec<String>,
}

#[derive(Clone)]
struct FakeVolume {
    labels: HashMap<String, String>,
}

#[derive(Default)]
struct Inner {
    containers: HashMap<String, FakeContainer>,
    networks: HashMap<String, FakeNetwork>,
    volumes: HashMap<String, FakeVolume>,
    images: HashMap<String, (Vec<String>, HashMap<String, String>)>,
    next_id: u64,
}

/// Deterministic, in-memory Docker stand-in. Seed images via [`FakeRuntime::add_image`]
/// before exercising engine code that validates an override against
/// `image_label`.
pub struct FakeRuntime {
    inner: Mutex<Inner>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("fake runtime mutex poisoned")
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut inner = self.lock();
        inner.next_id += 1;
        format!("{prefix}{:012x}", inner.next_id)
    }

    /// Seed an image with its layer chain (bottom-to-top) and labels.
    pub fn add_image(&self, tag: &str, layers: Vec<String>, labels: HashMap<String, String>) {
        self.lock().images.insert(tag.to_string(), (layers, labels));
    }

    /// Mark a running container as having exited with the given code — used
    /// by event-subscriber and reconciler tests to simulate external death.
    pub fn kill_externally(&self, container_id: &str) {
        if let Some(c) = self.lock().containers.get_mut(container_id) {
            c.running = false;
        }
    }

    pub fn container_count(&self) -> usize {
        self.lock().containers.len()
    }

    pub fn network_count(&self) -> usize {
        self.lock().networks.len()
    }

    pub fn volume_count(&self) -> usize {
        self.lock().volumes.len()
    }
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_label(labels: &HashMap<String, String>, filter: &str) -> bool {
    match filter.split_once('=') {
        Some((k, v)) => labels.get(k).map(|lv| lv == v).unwrap_or(false),
        None => labels.contains_key(filter),
    }
}

macro_rules! boxed {
    ($body:expr) => {
        Box::pin(async move { $body })
    };
}

impl ContainerRuntime for FakeRuntime {
    fn list_containers_by_label<'a>(&'a self, label_filter: &'a str) -> Pin<Box<dyn std::future::Future<Output = DockerResult<Vec<RuntimeContainer>>> + Send + 'a>> {
        boxed!({
            let inner = self.lock();
            Ok(inner
                .containers
                .values()
                .filter(|c| matches_label(&c.labels, label_filter))
                .map(|c| RuntimeContainer {
                    id: c.id.clone(),
                    name: c.id.clone(),
                    image: c.image.clone(),
                    state: if c.running { "running".into() } else { "exited".into() },
                    labels: c.labels.clone(),
                    networks: c.networks.clone(),
                    ports: c.ports.clone(),
                    exit_code: if c.running { None } else { Some(0) },
                })
                .collect())
        })
    }

    fn inspect_container<'a>(&'a self, id: &'a str) -> Pin<Box<dyn std::future::Future<Output = DockerResult<RuntimeContainer>> + Send + 'a>> {
        boxed!({
            let inner = self.lock();
            let c = inner
                .containers
                .get(id)
                .ok_or_else(|| DockerError::ContainerNotFound(id.to_string()))?;
            Ok(RuntimeContainer {
                id: c.id.clone(),
                name: c.id.clone(),
                image: c.image.clone(),
                state: if c.running { "running".into() } else { "exited".into() },
                labels: c.labels.clone(),
                networks: c.networks.clone(),
                ports: c.ports.clone(),
                exit_code: if c.running { None } else { Some(0) },
            })
        })
    }

    fn create_container<'a>(&'a self, spec: CreateContainerSpec<'a>) -> Pin<Box<dyn std::future::Future<Output = DockerResult<String>> + Send + 'a>> {
        boxed!({
            let id = self.next_id("c");
            let ports = spec
                .exposed_ports
                .iter()
                .map(|(port, proto)| PortMapping {
                    container_port: *port,
                    protocol: proto.clone(),
                    host_port: Some(30000 + (*port % 10000)),
                })
                .collect();
            self.lock().containers.insert(
                id.clone(),
                FakeContainer {
                    id: id.clone(),
                    image: spec.image.to_string(),
                    labels: spec.labels,
                    networks: HashMap::new(),
                    running: false,
                    ports,
                },
            );
            Ok(id)
        })
    }

    fn start_container<'a>(&'a self, id: &'a str) -> Pin<Box<dyn std::future::Future<Output = DockerResult<()>> + Send + 'a>> {
        boxed!({
            let mut inner = self.lock();
            let networks: Vec<String> = inner.networks.keys().cloned().collect();
            let container = inner
                .containers
                .get_mut(id)
                .ok_or_else(|| DockerError::ContainerNotFound(id.to_string()))?;
            container.running = true;
            if container.networks.is_empty() {
                if let Some(net) = networks.first() {
                    let ip = format!("10.{}.{}.2", (id.len() % 250), 1);
                    container.networks.insert(net.clone(), ip);
                }
            }
            Ok(())
        })
    }

    fn stop_container<'a>(&'a self, id: &'a str, _grace_time_secs: u32) -> Pin<Box<dyn std::future::Future<Output = DockerResult<()>> + Send + 'a>> {
        boxed!({
            if let Some(c) = self.lock().containers.get_mut(id) {
                c.running = false;
            }
            Ok(())
        })
    }

    fn kill_container<'a>(&'a self, id: &'a str) -> Pin<Box<dyn std::future::Future<Output = DockerResult<()>> + Send + 'a>> {
        boxed!({
            if let Some(c) = self.lock().containers.get_mut(id) {
                c.running = false;
            }
            Ok(())
        })
    }

    fn remove_container<'a>(&'a self, id: &'a str, _force: bool) -> Pin<Box<dyn std::future::Future<Output = DockerResult<()>> + Send + 'a>> {
        boxed!({
            self.lock().containers.remove(id);
            Ok(())
        })
    }

    fn create_network<'a>(&'a self, name: &'a str, labels: HashMap<String, String>) -> Pin<Box<dyn std::future::Future<Output = DockerResult<String>> + Send + 'a>> {
        boxed!({
            let id = self.next_id("n");
            self.lock().networks.insert(
                id.clone(),
                FakeNetwork {
                    id: id.clone(),
                    labels,
                    attached: Vec::new(),
                },
            );
            let _ = name;
            Ok(id)
        })
    }

    fn list_networks_by_label<'a>(&'a self, label_filter: &'a str) -> Pin<Box<dyn std::future::Future<Output = DockerResult<Vec<NetworkInfo>>> + Send + 'a>> {
        boxed!({
            let inner = self.lock();
            Ok(inner
                .networks
                .values()
                .filter(|n| matches_label(&n.labels, label_filter))
                .map(|n| NetworkInfo {
                    id: n.id.clone(),
                    name: n.id.clone(),
                    labels: n.labels.clone(),
                    attached: n.attached.clone(),
                })
                .collect())
        })
    }

    fn remove_network<'a>(&'a self, network_id: &'a str) -> Pin<Box<dyn std::future::Future<Output = DockerResult<()>> + Send + 'a>> {
        boxed!({
            self.lock().networks.remove(network_id);
            Ok(())
        })
    }

    fn network_connect<'a>(&'a self, network_id: &'a str, container_id: &'a str) -> Pin<Box<dyn std::future::Future<Output = DockerResult<()>> + Send + 'a>> {
        boxed!({
            let mut inner = self.lock();
            if let Some(net) = inner.networks.get_mut(network_id) {
                if !net.attached.contains(&container_id.to_string()) {
                    net.attached.push(container_id.to_string());
                }
            }
            if let Some(c) = inner.containers.get_mut(container_id) {
                c.networks.insert(network_id.to_string(), "10.0.0.3".to_string());
            }
            Ok(())
        })
    }

    fn network_disconnect<'a>(&'a self, network_id: &'a str, container_id: &'a str, _force: bool) -> Pin<Box<dyn std::future::Future<Output = DockerResult<()>> + Send + 'a>> {
        boxed!({
            let mut inner = self.lock();
            if let Some(net) = inner.networks.get_mut(network_id) {
                net.attached.retain(|c| c != container_id);
            }
            if let Some(c) = inner.containers.get_mut(container_id) {
                c.networks.remove(network_id);
            }
            Ok(())
        })
    }

    fn create_volume<'a>(&'a self, name: &'a str, labels: HashMap<String, String>) -> Pin<Box<dyn std::future::Future<Output = DockerResult<()>> + Send + 'a>> {
        boxed!({
            self.lock().volumes.insert(name.to_string(), FakeVolume { labels });
            Ok(())
        })
    }

    fn list_volumes_by_label<'a>(&'a self, label_filter: &'a str) -> Pin<Box<dyn std::future::Future<Output = DockerResult<Vec<VolumeInfo>>> + Send + 'a>> {
        boxed!({
            let inner = self.lock();
            Ok(inner
                .volumes
                .iter()
                .filter(|(_, v)| matches_label(&v.labels, label_filter))
                .map(|(name, v)| VolumeInfo {
                    name: name.clone(),
                    labels: v.labels.clone(),
                })
                .collect())
        })
    }

    fn prune_volumes<'a>(&'a self, label_filter: &'a str) -> Pin<Box<dyn std::future::Future<Output = DockerResult<()>> + Send + 'a>> {
        boxed!({
            self.lock().volumes.retain(|_, v| !matches_label(&v.labels, label_filter));
            Ok(())
        })
    }

    fn image_layers<'a>(&'a self, image: &'a str) -> Pin<Box<dyn std::future::Future<Output = DockerResult<Vec<String>>> + Send + 'a>> {
        boxed!({
            let inner = self.lock();
            inner
                .images
                .get(image)
                .map(|(layers, _)| layers.clone())
                .ok_or_else(|| DockerError::ImageNotFound(image.to_string()))
        })
    }

    fn image_has_label<'a>(&'a self, image: &'a str, label: &'a str, value: Option<&'a str>) -> Pin<Box<dyn std::future::Future<Output = DockerResult<bool>> + Send + 'a>> {
        boxed!({
            let inner = self.lock();
            let (_, labels) = inner
                .images
                .get(image)
                .ok_or_else(|| DockerError::ImageNotFound(image.to_string()))?;
            Ok(match value {
                Some(v) => labels.get(label).map(|lv| lv == v).unwrap_or(false),
                None => labels.contains_key(label),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_start_remove_roundtrip() {
        let runtime = FakeRuntime::new();
        let net = runtime.create_network("flock-1", HashMap::new()).await.unwrap();
        let id = runtime
            .create_container(CreateContainerSpec {
                name: "box",
                image: "img",
                env: vec![],
                labels: HashMap::from([("owt.shepherd.reqid".to_string(), "r1".to_string())]),
                exposed_ports: vec![],
                shm_size: None,
                auto_remove: false,
            })
            .await
            .unwrap();
        runtime.network_connect(&net, &id).await.unwrap();
        runtime.start_container(&id).await.unwrap();
        let info = runtime.inspect_container(&id).await.unwrap();
        assert_eq!(info.state, "running");
        runtime.remove_container(&id, true).await.unwrap();
        assert!(runtime.inspect_container(&id).await.is_err());
    }

    #[tokio::test]
    async fn image_ancestry_lookup() {
        let runtime = FakeRuntime::new();
        runtime.add_image(
            "app:v2",
            vec!["l1".into(), "l2".into()],
            HashMap::from([("test.isbox".to_string(), "box".to_string())]),
        );
        assert!(runtime.image_has_label("app:v2", "test.isbox", Some("box")).await.unwrap());
        assert!(!runtime.image_has_label("app:v2", "test.isbox", Some("other")).await.unwrap());
    }
}
