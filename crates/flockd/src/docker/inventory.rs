//! Runtime-facing container/port shapes used by the flock engine.

use bollard::models::{ContainerInspectResponse, ContainerSummary};
use std::collections::HashMap;

#[derive(Debug, Clone, serde::Serialize)]
pub struct PortMapping {
    pub container_port: u16,
    pub protocol: String,
    pub host_port: Option<u16>,
}

/// Basic container information derived from the runtime.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RuntimeContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: String,
    pub labels: HashMap<String, String>,
    /// network name -> IP address, from `NetworkSettings.Networks`.
    pub networks: HashMap<String, String>,
    pub ports: Vec<PortMapping>,
    pub exit_code: Option<i64>,
}

impl RuntimeContainer {
    /// IP of this container on the given network, if attached.
    pub fn ip_on(&self, network: &str) -> Option<&str> {
        self.networks.get(network).map(|s| s.as_str())
    }

    /// Host port bound for the given canonical `"<num>/<proto>"` key.
    pub fn host_port(&self, port_num: u16, proto: &str) -> Option<u16> {
        self.ports
            .iter()
            .find(|p| p.container_port == port_num && p.protocol == proto)
            .and_then(|p| p.host_port)
    }
}

fn parse_port_key(key: &str) -> (u16, String) {
    let (num, proto) = key.split_once('/').unwrap_or((key, "tcp"));
    (num.parse().unwrap_or(0), proto.to_string())
}

impl From<ContainerSummary> for RuntimeContainer {
    fn from(s: ContainerSummary) -> Self {
        let ports = s
            .ports
            .unwrap_or_default()
            .into_iter()
            .map(|p| PortMapping {
                container_port: p.private_port,
                protocol: p
                    .typ
                    .map(|t| t.to_string().to_lowercase())
                    .unwrap_or_else(|| "tcp".to_string()),
                host_port: p.public_port,
            })
            .collect();

        let networks = s
            .network_settings
            .and_then(|ns| ns.networks)
            .map(|nets| {
                nets.into_iter()
                    .filter_map(|(name, ep)| ep.ip_address.filter(|ip| !ip.is_empty()).map(|ip| (name, ip)))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id: s.id.unwrap_or_default(),
            name: s
                .names
                .as_deref()
                .and_then(|n| n.first())
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            image: s.image.unwrap_or_default(),
            state: s
                .state
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".into()),
            labels: s.labels.unwrap_or_default(),
            networks,
            ports,
            exit_code: None,
        }
    }
}

impl From<ContainerInspectResponse> for RuntimeContainer {
    fn from(details: ContainerInspectResponse) -> Self {
        let ports = details
            .network_settings
            .as_ref()
            .and_then(|ns| ns.ports.as_ref())
            .map(|port_map| {
                port_map
                    .iter()
                    .flat_map(|(key, bindings)| {
                        let (container_port, protocol) = parse_port_key(key);
                        bindings
                            .as_deref()
                            .unwrap_or(&[])
                            .iter()
                            .filter_map(|b| b.host_port.as_ref()?.parse::<u16>().ok())
                            .map(move |host_port| PortMapping {
                                container_port,
                                protocol: protocol.clone(),
                                host_port: Some(host_port),
                            })
                            .collect::<Vec<_>>()
                    })
                    .collect()
            })
            .unwrap_or_default();

        let networks = details
            .network_settings
            .as_ref()
            .and_then(|ns| ns.networks.clone())
            .map(|nets| {
                nets.into_iter()
                    .filter_map(|(name, ep)| ep.ip_address.filter(|ip| !ip.is_empty()).map(|ip| (name, ip)))
                    .collect()
            })
            .unwrap_or_default();

        let exit_code = details.state.as_ref().and_then(|s| s.exit_code);

        Self {
            id: details.id.unwrap_or_default(),
            name: details
                .name
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_else(|| "unknown".into()),
            image: details.image.unwrap_or_default(),
            state: details
                .state
                .as_ref()
                .and_then(|s| s.status.as_ref())
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".into()),
            labels: details.config.and_then(|c| c.labels).unwrap_or_default(),
            networks,
            ports,
            exit_code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_on_returns_none_for_absent_network() {
        let c = RuntimeContainer {
            id: "a".into(),
            name: "n".into(),
            image: "i".into(),
            state: "running".into(),
            labels: HashMap::new(),
            networks: HashMap::from([("flock-net".to_string(), "10.0.0.2".to_string())]),
            ports: vec![],
            exit_code: None,
        };
        assert_eq!(c.ip_on("flock-net"), Some("10.0.0.2"));
        assert_eq!(c.ip_on("other"), None);
    }
}
