//! Flock request / launch response data model (spec §3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    New,
    Running,
    /// Reserved for an external pause/resume collaborator; no core operation
    /// currently produces this state.
    Paused,
    Stopped,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestOptions {
    #[serde(default)]
    pub overrides: HashMap<String, String>,
    #[serde(default)]
    pub user_params: HashMap<String, String>,
    #[serde(default)]
    pub environ: HashMap<String, String>,
    #[serde(default)]
    pub deferred: HashMap<String, bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    pub image: String,
    pub ip: Option<String>,
    pub ports: HashMap<String, u16>,
    pub environ: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deferred: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LaunchResponse {
    pub containers: HashMap<String, ContainerInfo>,
    pub network: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlockRequest {
    pub id: String,
    pub flock: String,
    #[serde(default)]
    pub overrides: HashMap<String, String>,
    #[serde(default)]
    pub user_params: HashMap<String, String>,
    #[serde(default)]
    pub environ: HashMap<String, String>,
    #[serde(default)]
    pub deferred: HashMap<String, bool>,
    pub image_list: Vec<String>,
    #[serde(default)]
    pub num_volumes: usize,
    pub state: RequestState,
    #[serde(default)]
    pub net: Option<String>,
    #[serde(default)]
    pub auto_remove: bool,
    #[serde(default)]
    pub resp: Option<LaunchResponse>,
}

impl FlockRequest {
    pub fn new(id: String, flock: String, opts: &RequestOptions, image_list: Vec<String>) -> Self {
        Self {
            id,
            flock,
            overrides: opts.overrides.clone(),
            user_params: opts.user_params.clone(),
            environ: opts.environ.clone(),
            deferred: opts.deferred.clone(),
            image_list,
            num_volumes: 0,
            state: RequestState::New,
            net: None,
            auto_remove: false,
            resp: None,
        }
    }

    pub fn effective_deferred(&self, container: &str, spec_default: bool) -> bool {
        self.deferred.get(container).copied().unwrap_or(spec_default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_serialises_cleanly() {
        let opts = RequestOptions::default();
        let req = FlockRequest::new("abc".into(), "flock".into(), &opts, vec!["img".into()]);
        let json = serde_json::to_string(&req).unwrap();
        let back: FlockRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, req.id);
        assert_eq!(back.state, RequestState::New);
    }

    #[test]
    fn effective_deferred_prefers_request_override() {
        let opts = RequestOptions {
            deferred: HashMap::from([("box".to_string(), true)]),
            ..Default::default()
        };
        let req = FlockRequest::new("a".into(), "f".into(), &opts, vec![]);
        assert!(req.effective_deferred("box", false));
        assert!(!req.effective_deferred("other", false));
    }
}
