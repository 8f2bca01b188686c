//! Container domain — list, create, lifecycle.

use std::collections::HashMap;

use bollard::models::{ContainerCreateBody, HostConfig, PortBinding};
use bollard::query_parameters::{
    CreateContainerOptions, InspectContainerOptions, KillContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StopContainerOptions,
};

use super::client::{DockerClient, DockerError};
use super::inventory::RuntimeContainer;

/// Parameters for creating one flock-owned container.
pub struct CreateContainerSpec<'a> {
    pub name: &'a str,
    pub image: &'a str,
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    /// container-port -> protocol, for ports that should be published on the host.
    pub exposed_ports: Vec<(u16, String)>,
    pub shm_size: Option<i64>,
    /// Mirrors the owning flock spec's `auto_remove` hint (spec §3):
    /// the runtime deletes the container itself once it exits.
    pub auto_remove: bool,
}

impl DockerClient {
    /// List every container carrying the given label (`label=value`), including
    /// stopped ones — the engine and reconciler both look up flocks by label,
    /// never by cached id.
    pub async fn list_containers_by_label(&self, label_filter: &str) -> Result<Vec<RuntimeContainer>, DockerError> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![label_filter.to_string()]);
        let options = Some(ListContainersOptions {
            all: true,
            filters: Some(filters),
            ..Default::default()
        });
        let containers = self.client.list_containers(options).await?;
        Ok(containers.into_iter().map(RuntimeContainer::from).collect())
    }

    pub async fn inspect_container(&self, id: &str) -> Result<RuntimeContainer, DockerError> {
        let details = self
            .client
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError { status_code: 404, .. } => {
                    DockerError::ContainerNotFound(id.to_string())
                }
                other => DockerError::BollardError(other),
            })?;
        Ok(RuntimeContainer::from(details))
    }

    /// Create (but do not start) a container.
    pub async fn create_container(&self, spec: CreateContainerSpec<'_>) -> Result<String, DockerError> {
        let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        let mut exposed = Vec::new();
        for (port, proto) in &spec.exposed_ports {
            let key = format!("{port}/{proto}");
            exposed.push(key.clone());
            port_bindings.insert(
                key,
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: None,
                }]),
            );
        }

        let host_config = HostConfig {
            port_bindings: if port_bindings.is_empty() {
                None
            } else {
                Some(port_bindings)
            },
            shm_size: spec.shm_size,
            publish_all_ports: Some(!spec.exposed_ports.is_empty()),
            auto_remove: Some(spec.auto_remove),
            ..Default::default()
        };

        let body = ContainerCreateBody {
            image: Some(spec.image.to_string()),
            env: Some(spec.env),
            labels: Some(spec.labels),
            exposed_ports: if exposed.is_empty() { None } else { Some(exposed) },
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = Some(CreateContainerOptions {
            name: Some(spec.name.to_string()),
            ..Default::default()
        });

        let response = self
            .client
            .create_container(options, body)
            .await
            .map_err(DockerError::from)?;
        Ok(response.id)
    }

    pub async fn start_container(&self, container_id: &str) -> Result<(), DockerError> {
        self.client
            .start_container(container_id, None)
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError { status_code: 404, .. } => {
                    DockerError::ContainerNotFound(container_id.to_string())
                }
                other => DockerError::BollardError(other),
            })
    }

    /// Request a graceful stop with the given grace period (seconds).
    pub async fn stop_container(&self, container_id: &str, grace_time_secs: u32) -> Result<(), DockerError> {
        let options = Some(StopContainerOptions {
            t: Some(grace_time_secs as i32),
            ..Default::default()
        });
        self.client
            .stop_container(container_id, options)
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError { status_code: 404, .. } => {
                    DockerError::ContainerNotFound(container_id.to_string())
                }
                other => DockerError::BollardError(other),
            })
    }

    pub async fn kill_container(&self, container_id: &str) -> Result<(), DockerError> {
        self.client
            .kill_container(container_id, None::<KillContainerOptions>)
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError { status_code: 404, .. } => {
                    DockerError::ContainerNotFound(container_id.to_string())
                }
                other => DockerError::BollardError(other),
            })
    }

    /// Remove a container; `force` kills first if still running.
    pub async fn remove_container(&self, container_id: &str, force: bool) -> Result<(), DockerError> {
        let options = Some(RemoveContainerOptions {
            force,
            v: true,
            ..Default::default()
        });
        self.client
            .remove_container(container_id, options)
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError { status_code: 404, .. } => {
                    DockerError::ContainerNotFound(container_id.to_string())
                }
                other => DockerError::BollardError(other),
            })
    }
}
