//! Flock spec data model — immutable templates loaded at startup.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A port value as written in the YAML: a bare number (defaults to tcp) or
/// a `"<num>/<proto>"` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    pub number: u16,
    pub protocol: String,
}

impl PortSpec {
    /// Canonical `"<num>/<proto>"` key used for host-port lookups.
    pub fn key(&self) -> String {
        format!("{}/{}", self.number, self.protocol)
    }
}

impl Serialize for PortSpec {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.key())
    }
}

impl<'de> Deserialize<'de> for PortSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(u16),
            Str(String),
        }
        let raw = Raw::deserialize(deserializer)?;
        Ok(match raw {
            Raw::Int(n) => PortSpec {
                number: n,
                protocol: "tcp".to_string(),
            },
            Raw::Str(s) => match s.split_once('/') {
                Some((num, proto)) => PortSpec {
                    number: num.parse().map_err(serde::de::Error::custom)?,
                    protocol: proto.to_string(),
                },
                None => PortSpec {
                    number: s.parse().map_err(serde::de::Error::custom)?,
                    protocol: "tcp".to_string(),
                },
            },
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub image_label: Option<String>,
    pub ports: HashMap<String, PortSpec>,
    pub environment: HashMap<String, String>,
    pub external_network: Option<String>,
    pub set_user_params: bool,
    pub deferred: bool,
    pub shm_size: Option<String>,
}

impl Default for ContainerSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            image: String::new(),
            image_label: None,
            ports: HashMap::new(),
            environment: HashMap::new(),
            external_network: None,
            set_user_params: false,
            deferred: false,
            shm_size: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlockSpec {
    pub name: String,
    pub containers: Vec<ContainerSpec>,
    pub volumes: HashMap<String, String>,
    pub auto_remove: bool,
}

impl Default for FlockSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            containers: Vec::new(),
            volumes: HashMap::new(),
            auto_remove: false,
        }
    }
}

impl FlockSpec {
    pub fn container(&self, name: &str) -> Option<&ContainerSpec> {
        self.containers.iter().find(|c| c.name == name)
    }
}

/// `image_label` constraint, either a bare label name or a `name=value` pair.
pub fn parse_image_label(spec: &str) -> (String, Option<String>) {
    match spec.split_once('=') {
        Some((k, v)) => (k.to_string(), Some(v.to_string())),
        None => (spec.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_spec_parses_bare_int() {
        let yaml = "80";
        let port: PortSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(port.number, 80);
        assert_eq!(port.protocol, "tcp");
        assert_eq!(port.key(), "80/tcp");
    }

    #[test]
    fn port_spec_parses_num_proto_string() {
        let yaml = "\"53/udp\"";
        let port: PortSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(port.number, 53);
        assert_eq!(port.protocol, "udp");
    }

    #[test]
    fn image_label_splits_name_value() {
        assert_eq!(
            parse_image_label("test.isbox=box"),
            ("test.isbox".to_string(), Some("box".to_string()))
        );
        assert_eq!(parse_image_label("test.isbox"), ("test.isbox".to_string(), None));
    }
}
