//! Flock Engine (spec §4.4): resolves images, creates the network, volumes
//! and containers for a flock request, handles deferred containers, rolls
//! back on partial failure, and exposes the request's state transitions.
//!
//! Every write to a `req:<reqid>` record goes through [`FlockEngine`] so the
//! at-most-once/idempotent-start contract lives in one place.

pub mod model;
pub mod reqid;

use std::collections::HashMap;
use std::sync::Arc;

use crate::docker::ContainerRuntime;
use crate::docker::container::CreateContainerSpec;
use crate::error::{FlockError, FlockResult};
use crate::netpool::NetworkPool;
use crate::spec::{parse_image_label, ContainerSpec, FlockSpec, SpecStore};
use crate::store::{keys, KvStore};

pub use model::{ContainerInfo, FlockRequest, LaunchResponse, RequestOptions, RequestState};

/// TTL a fresh `FlockRequest` carries until its first successful `start`.
const NEW_REQUEST_TTL_SECS: u64 = 120;

/// Materialises flock specs into concrete containers, networks and volumes.
///
/// Holds no request-specific state itself — every operation reads the
/// current `FlockRequest` from the coordination store, mutates a local copy,
/// and writes it back. Pools and the reconciler share one engine instance.
pub struct FlockEngine {
    runtime: Arc<dyn ContainerRuntime>,
    store: Arc<dyn KvStore>,
    specs: Arc<SpecStore>,
    request_label: String,
    deferred_label: String,
}

impl FlockEngine {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        store: Arc<dyn KvStore>,
        specs: Arc<SpecStore>,
        request_label: String,
        deferred_label: String,
    ) -> Self {
        Self {
            runtime,
            store,
            specs,
            request_label,
            deferred_label,
        }
    }

    pub fn is_valid_flock_name(&self, flock: &str) -> bool {
        self.specs.get(flock).is_some()
    }

    /// For each container, pick `overrides[name]` if present else the spec's
    /// default image. An override is accepted only if the image carries the
    /// container's `image_label` (by name, or an exact `name=value` match).
    pub async fn resolve_image_list(
        &self,
        spec: &FlockSpec,
        overrides: &HashMap<String, String>,
    ) -> FlockResult<Vec<String>> {
        let mut images = Vec::with_capacity(spec.containers.len());
        for container in &spec.containers {
            let image = match overrides.get(&container.name) {
                Some(ov) => {
                    let label_spec = container.image_label.as_deref().ok_or_else(|| {
                        FlockError::InvalidImageParam {
                            image_passed: ov.clone(),
                            label_expected: format!("<{} accepts no override>", container.name),
                        }
                    })?;
                    let (label, value) = parse_image_label(label_spec);
                    let satisfies = self
                        .runtime
                        .image_has_label(ov, &label, value.as_deref())
                        .await
                        .map_err(|e| FlockError::Runtime(e.to_string()))?;
                    if !satisfies {
                        return Err(FlockError::InvalidImageParam {
                            image_passed: ov.clone(),
                            label_expected: label_spec.to_string(),
                        });
                    }
                    ov.clone()
                }
                None => container.image.clone(),
            };
            images.push(image);
        }
        Ok(images)
    }

    pub async fn request(&self, flock: &str, opts: RequestOptions) -> FlockResult<String> {
        let spec = self
            .specs
            .get(flock)
            .ok_or_else(|| FlockError::InvalidFlock(flock.to_string()))?
            .clone();
        let image_list = self.resolve_image_list(&spec, &opts.overrides).await?;
        let id = reqid::generate();
        let req = FlockRequest::new(id.clone(), flock.to_string(), &opts, image_list);
        self.save_record(&req, Some(NEW_REQUEST_TTL_SECS)).await?;
        Ok(id)
    }

    pub async fn is_valid_flock(&self, reqid: &str, ensure_state: Option<RequestState>) -> bool {
        match self.load_record(reqid).await {
            Ok(req) => ensure_state.map(|s| s == req.state).unwrap_or(true),
            Err(_) => false,
        }
    }

    pub async fn start(
        &self,
        reqid: &str,
        labels: HashMap<String, String>,
        environ: HashMap<String, String>,
        network_pool: &dyn NetworkPool,
    ) -> FlockResult<LaunchResponse> {
        let mut req = self.load_record(reqid).await?;
        if req.state == RequestState::Stopped {
            return Err(FlockError::AlreadyDone);
        }
        if let Some(resp) = &req.resp {
            return Ok(resp.clone());
        }

        let spec = self
            .specs
            .get(&req.flock)
            .ok_or_else(|| FlockError::InvalidFlock(req.flock.clone()))?
            .clone();

        req.environ.extend(environ);
        req.auto_remove = spec.auto_remove;

        match self.materialise(&mut req, &spec, labels, network_pool).await {
            Ok(resp) => {
                req.state = RequestState::Running;
                req.resp = Some(resp.clone());
                self.save_preserving_ttl(&req).await?;
                Ok(resp)
            }
            Err(e) => {
                let _ = self.remove(reqid, false, 0, network_pool).await;
                Err(FlockError::StartError(e.to_string()))
            }
        }
    }

    async fn materialise(
        &self,
        req: &mut FlockRequest,
        spec: &FlockSpec,
        caller_labels: HashMap<String, String>,
        network_pool: &dyn NetworkPool,
    ) -> FlockResult<LaunchResponse> {
        let network_id = network_pool
            .create_network()
            .await
            .ok_or_else(|| FlockError::StartError("network pool exhausted".to_string()))?;
        req.net = Some(network_id.clone());

        for vol_name in spec.volumes.keys() {
            let volume_name = format!("vol-{vol_name}-{}", req.id);
            let vol_labels = HashMap::from([(self.request_label.clone(), req.id.clone())]);
            self.runtime
                .create_volume(&volume_name, vol_labels)
                .await
                .map_err(|e| FlockError::Runtime(e.to_string()))?;
        }
        req.num_volumes = spec.volumes.len();

        let mut base_labels = caller_labels;
        base_labels.insert(self.request_label.clone(), req.id.clone());

        let mut containers = HashMap::new();
        for (idx, cspec) in spec.containers.iter().enumerate() {
            let deferred = req.effective_deferred(&cspec.name, cspec.deferred);
            let image = req.image_list.get(idx).cloned().unwrap_or_else(|| cspec.image.clone());
            if deferred {
                containers.insert(
                    cspec.name.clone(),
                    ContainerInfo {
                        id: String::new(),
                        image,
                        ip: None,
                        ports: HashMap::new(),
                        environ: HashMap::new(),
                        deferred: true,
                    },
                );
                continue;
            }
            let info = self
                .create_and_start_container(req, cspec, &image, &network_id, &base_labels, false)
                .await?;
            containers.insert(cspec.name.clone(), info);
        }

        Ok(LaunchResponse {
            containers,
            network: network_id,
        })
    }

    /// Starts a container not yet created that's declared by `start`/`start_deferred_container`.
    /// `deferred_start` marks it with the deferred label so the reconciler and
    /// persistent pool can tell a sidecar's exit apart from the flock's own.
    async fn create_and_start_container(
        &self,
        req: &FlockRequest,
        cspec: &ContainerSpec,
        image: &str,
        network_id: &str,
        base_labels: &HashMap<String, String>,
        deferred_start: bool,
    ) -> FlockResult<ContainerInfo> {
        let mut labels = base_labels.clone();
        if deferred_start {
            labels.insert(self.deferred_label.clone(), "1".to_string());
        }

        let mut env: Vec<String> = cspec.environment.iter().map(|(k, v)| format!("{k}={v}")).collect();
        env.extend(req.environ.iter().map(|(k, v)| format!("{k}={v}")));

        let exposed_ports: Vec<(u16, String)> = cspec.ports.values().map(|p| (p.number, p.protocol.clone())).collect();
        let shm_size = cspec.shm_size.as_deref().and_then(parse_shm_size);

        let container_name = format!(
            "{}-{}-{}",
            spec_slug(&req.flock),
            cspec.name,
            &req.id[..req.id.len().min(8)]
        );

        let id = self
            .runtime
            .create_container(CreateContainerSpec {
                name: &container_name,
                image,
                env,
                labels,
                exposed_ports,
                shm_size,
                auto_remove: req.auto_remove,
            })
            .await
            .map_err(|e| FlockError::Runtime(e.to_string()))?;

        self.runtime
            .network_connect(network_id, &id)
            .await
            .map_err(|e| FlockError::Runtime(e.to_string()))?;

        let mut ip_network = network_id.to_string();
        if let Some(external) = &cspec.external_network {
            self.runtime
                .network_connect(external, &id)
                .await
                .map_err(|e| FlockError::Runtime(e.to_string()))?;
            ip_network = external.clone();
        }

        self.runtime
            .start_container(&id)
            .await
            .map_err(|e| FlockError::Runtime(e.to_string()))?;

        let details = self
            .runtime
            .inspect_container(&id)
            .await
            .map_err(|e| FlockError::Runtime(e.to_string()))?;

        let ip = details.ip_on(&ip_network).map(|s| s.to_string());

        let mut ports = HashMap::new();
        for (port_name, port_spec) in &cspec.ports {
            if let Some(host_port) = details.host_port(port_spec.number, &port_spec.protocol) {
                ports.insert(port_name.clone(), host_port);
            }
        }

        let mut environ = cspec.environment.clone();
        environ.extend(req.environ.clone());

        if cspec.set_user_params {
            if let Some(ip) = &ip {
                let fields: Vec<(String, String)> = req.user_params.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                if !fields.is_empty() {
                    let _ = self.store.hmset(&keys::user_params(ip), &fields).await;
                }
            }
        }

        Ok(ContainerInfo {
            id: id.chars().take(12).collect(),
            image: image.to_string(),
            ip,
            ports,
            environ,
            deferred: false,
        })
    }

    pub async fn start_deferred_container(
        &self,
        reqid: &str,
        container_name: &str,
        labels: HashMap<String, String>,
    ) -> FlockResult<ContainerInfo> {
        let mut req = self.load_record(reqid).await?;
        if req.state != RequestState::Running {
            return Err(FlockError::FlockNotRunning);
        }

        let spec = self
            .specs
            .get(&req.flock)
            .ok_or_else(|| FlockError::InvalidFlock(req.flock.clone()))?
            .clone();
        let cspec = spec
            .container(container_name)
            .ok_or_else(|| FlockError::InvalidDeferred {
                container: container_name.to_string(),
            })?
            .clone();

        let mut resp = req.resp.clone().ok_or(FlockError::FlockNotRunning)?;
        let existing = resp
            .containers
            .get(container_name)
            .ok_or_else(|| FlockError::InvalidDeferred {
                container: container_name.to_string(),
            })?;
        if !existing.deferred {
            // Already started — repeating the call returns the same info unchanged.
            return Ok(existing.clone());
        }

        let network_id = req.net.clone().ok_or(FlockError::FlockNotRunning)?;
        let idx = spec
            .containers
            .iter()
            .position(|c| c.name == container_name)
            .expect("container name resolved from this spec");
        let image = req.image_list.get(idx).cloned().unwrap_or_else(|| cspec.image.clone());

        let mut base_labels = labels;
        base_labels.insert(self.request_label.clone(), req.id.clone());

        let info = self
            .create_and_start_container(&req, &cspec, &image, &network_id, &base_labels, true)
            .await?;

        resp.containers.insert(container_name.to_string(), info.clone());
        req.resp = Some(resp);
        self.save_preserving_ttl(&req).await?;

        Ok(info)
    }

    pub async fn stop(&self, reqid: &str, grace_time_secs: u32) -> FlockResult<()> {
        let mut req = self.load_record(reqid).await?;
        if req.state != RequestState::Running {
            return Err(FlockError::NotRunning);
        }

        let filter = crate::labels::filter(&self.request_label, reqid);
        let containers = self
            .runtime
            .list_containers_by_label(&filter)
            .await
            .map_err(|e| FlockError::Runtime(e.to_string()))?;

        // Fire-and-forget graceful stops in parallel so a slow container
        // doesn't block the others; the reconciler reaps anything the
        // runtime couldn't kill within grace_time_secs.
        let mut handles = Vec::with_capacity(containers.len());
        for c in containers {
            let runtime = Arc::clone(&self.runtime);
            handles.push(tokio::spawn(async move {
                let _ = runtime.stop_container(&c.id, grace_time_secs).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }

        req.state = RequestState::Stopped;
        self.save_preserving_ttl(&req).await?;
        Ok(())
    }

    /// Idempotent teardown: looks up containers by label (never cached ids),
    /// kills/removes them with their volumes, releases the network, and
    /// either deletes the record or — with `keep_reqid` — clears `resp` and
    /// marks it `stopped` so a caller that queried before `stop` can still
    /// recover the last IP/port map.
    pub async fn remove(
        &self,
        reqid: &str,
        keep_reqid: bool,
        grace_time_secs: u32,
        network_pool: &dyn NetworkPool,
    ) -> FlockResult<()> {
        let record = self.load_record(reqid).await.ok();

        let filter = crate::labels::filter(&self.request_label, reqid);
        let containers = self.runtime.list_containers_by_label(&filter).await.unwrap_or_default();

        for c in &containers {
            for ip in c.networks.values() {
                let _ = self.store.del(&keys::user_params(ip)).await;
            }
            if grace_time_secs > 0 {
                let _ = self.runtime.stop_container(&c.id, grace_time_secs).await;
            } else {
                let _ = self.runtime.kill_container(&c.id).await;
            }
            let _ = self.runtime.remove_container(&c.id, true).await;
        }

        if let Some(net) = record.as_ref().and_then(|r| r.net.clone()) {
            let _ = network_pool.remove_network(&net).await;
        }

        for attempt in 0..3 {
            let _ = self.runtime.prune_volumes(&filter).await;
            let remaining = self.runtime.list_volumes_by_label(&filter).await.unwrap_or_default();
            if remaining.is_empty() {
                break;
            }
            if attempt < 2 {
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }

        if keep_reqid {
            if let Some(mut req) = record {
                req.state = RequestState::Stopped;
                req.resp = None;
                let _ = self.save_preserving_ttl(&req).await;
            }
        } else {
            let _ = self.store.del(&keys::req(reqid)).await;
        }

        Ok(())
    }

    async fn load_record(&self, reqid: &str) -> FlockResult<FlockRequest> {
        let raw = self
            .store
            .get(&keys::req(reqid))
            .await
            .map_err(|e| FlockError::Store(e.to_string()))?
            .ok_or_else(|| FlockError::InvalidReqid(reqid.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| FlockError::Store(e.to_string()))
    }

    async fn save_record(&self, req: &FlockRequest, ttl_secs: Option<u64>) -> FlockResult<()> {
        let body = serde_json::to_string(req).map_err(|e| FlockError::Store(e.to_string()))?;
        self.store
            .set(&keys::req(&req.id), &body, ttl_secs)
            .await
            .map_err(|e| FlockError::Store(e.to_string()))
    }

    /// Rewrites a record without disturbing its current TTL — `set()`
    /// treats `ttl_secs: None` as "no expiry", so a blind in-place update
    /// would otherwise erase the pool's duration timer or the initial
    /// 120s grace window.
    async fn save_preserving_ttl(&self, req: &FlockRequest) -> FlockResult<()> {
        let ttl = self
            .store
            .ttl(&keys::req(&req.id))
            .await
            .map_err(|e| FlockError::Store(e.to_string()))?;
        self.save_record(req, ttl).await
    }
}

fn spec_slug(flock: &str) -> String {
    flock.chars().map(|c| if c.is_alphanumeric() || c == '-' { c } else { '-' }).collect()
}

/// Parses a runtime size string (`"64m"`, `"1g"`, a bare byte count) into bytes.
fn parse_shm_size(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (digits, mult): (&str, i64) = if let Some(n) = raw.strip_suffix(['g', 'G']) {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = raw.strip_suffix(['m', 'M']) {
        (n, 1024 * 1024)
    } else if let Some(n) = raw.strip_suffix(['k', 'K']) {
        (n, 1024)
    } else if let Some(n) = raw.strip_suffix('b') {
        (n, 1)
    } else {
        (raw, 1)
    };
    digits.trim().parse::<i64>().ok().map(|n| n * mult)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::fake::FakeRuntime;
    use crate::netpool::PlainNetworkPool;
    use crate::spec::{ContainerSpec, FlockSpec, PortSpec};
    use crate::store::MemoryStore;

    fn one_container_spec(name: &str) -> FlockSpec {
        FlockSpec {
            name: name.to_string(),
            containers: vec![ContainerSpec {
                name: "box".to_string(),
                image: "app:v1".to_string(),
                ports: HashMap::from([(
                    "http".to_string(),
                    PortSpec {
                        number: 80,
                        protocol: "tcp".to_string(),
                    },
                )]),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn test_engine(spec: FlockSpec) -> (FlockEngine, Arc<FakeRuntime>, Arc<MemoryStore>) {
        let runtime = Arc::new(FakeRuntime::new());
        let store = Arc::new(MemoryStore::new());
        let mut specs = HashMap::new();
        specs.insert(spec.name.clone(), spec);
        let spec_store = Arc::new(unsafe_spec_store(specs));
        let engine = FlockEngine::new(
            runtime.clone(),
            store.clone(),
            spec_store,
            "owt.shepherd.reqid".to_string(),
            "owt.shepherd.deferred".to_string(),
        );
        (engine, runtime, store)
    }

    // SpecStore's fields are private and it only builds from disk; tests
    // construct one in-memory via its public, file-backed loader instead.
    fn unsafe_spec_store(specs: HashMap<String, FlockSpec>) -> SpecStore {
        let dir = std::env::temp_dir().join(format!("flockd-engine-test-{}", specs.len()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        for (i, spec) in specs.values().enumerate() {
            let path = dir.join(format!("{i}.yaml"));
            std::fs::write(path, serde_yaml::to_string(spec).unwrap()).unwrap();
        }
        SpecStore::load(dir.to_str().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn request_then_start_launches_one_container() {
        let (engine, runtime, _store) = test_engine(one_container_spec("web"));
        let pool = PlainNetworkPool::new(runtime.clone(), "default".into(), "owt.network.managed".into());

        let reqid = engine.request("web", RequestOptions::default()).await.unwrap();
        let resp = engine
            .start(&reqid, HashMap::new(), HashMap::new(), &pool)
            .await
            .unwrap();

        assert_eq!(resp.containers.len(), 1);
        assert_eq!(runtime.container_count(), 1);
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let (engine, runtime, _store) = test_engine(one_container_spec("web"));
        let pool = PlainNetworkPool::new(runtime.clone(), "default".into(), "owt.network.managed".into());

        let reqid = engine.request("web", RequestOptions::default()).await.unwrap();
        let first = engine
            .start(&reqid, HashMap::new(), HashMap::new(), &pool)
            .await
            .unwrap();
        let second = engine
            .start(&reqid, HashMap::new(), HashMap::new(), &pool)
            .await
            .unwrap();

        assert_eq!(first.containers["box"].id, second.containers["box"].id);
        assert_eq!(runtime.container_count(), 1);
    }

    #[tokio::test]
    async fn remove_is_idempotent_and_converges() {
        let (engine, runtime, store) = test_engine(one_container_spec("web"));
        let pool = PlainNetworkPool::new(runtime.clone(), "default".into(), "owt.network.managed".into());

        let reqid = engine.request("web", RequestOptions::default()).await.unwrap();
        engine.start(&reqid, HashMap::new(), HashMap::new(), &pool).await.unwrap();

        engine.remove(&reqid, false, 0, &pool).await.unwrap();
        engine.remove(&reqid, false, 0, &pool).await.unwrap();

        assert_eq!(runtime.container_count(), 0);
        assert!(store.get(&keys::req(&reqid)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn override_rejected_without_matching_label() {
        let mut spec = one_container_spec("test_b");
        spec.containers[0].image_label = Some("test.isbox=box".to_string());
        let (engine, runtime, _store) = test_engine(spec);
        runtime.add_image("unlabeled/image", vec![], HashMap::new());

        let opts = RequestOptions {
            overrides: HashMap::from([("box".to_string(), "unlabeled/image".to_string())]),
            ..Default::default()
        };
        let err = engine.request("test_b", opts).await.unwrap_err();
        match err {
            FlockError::InvalidImageParam { image_passed, label_expected } => {
                assert_eq!(image_passed, "unlabeled/image");
                assert_eq!(label_expected, "test.isbox=box");
            }
            other => panic!("expected InvalidImageParam, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn deferred_container_starts_on_demand() {
        let mut spec = one_container_spec("test_deferred");
        spec.containers.push(ContainerSpec {
            name: "box-p".to_string(),
            image: "app:v1".to_string(),
            deferred: true,
            ports: HashMap::from([(
                "port_a".to_string(),
                PortSpec {
                    number: 81,
                    protocol: "tcp".to_string(),
                },
            )]),
            ..Default::default()
        });
        let (engine, runtime, _store) = test_engine(spec);
        let pool = PlainNetworkPool::new(runtime.clone(), "default".into(), "owt.network.managed".into());

        let reqid = engine.request("test_deferred", RequestOptions::default()).await.unwrap();
        let resp = engine
            .start(&reqid, HashMap::new(), HashMap::new(), &pool)
            .await
            .unwrap();
        assert!(resp.containers["box-p"].deferred);
        assert!(!resp.containers["box"].deferred);

        let info = engine
            .start_deferred_container(&reqid, "box-p", HashMap::new())
            .await
            .unwrap();
        assert!(!info.deferred);

        let repeat = engine
            .start_deferred_container(&reqid, "box-p", HashMap::new())
            .await
            .unwrap();
        assert_eq!(info.id, repeat.id);
    }

    #[test]
    fn shm_size_parses_suffixes() {
        assert_eq!(parse_shm_size("64m"), Some(64 * 1024 * 1024));
        assert_eq!(parse_shm_size("1g"), Some(1024 * 1024 * 1024));
        assert_eq!(parse_shm_size("512"), Some(512));
    }
}
