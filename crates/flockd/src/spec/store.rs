//! Spec Store — loads flock specs from a YAML file or a directory of YAML
//! files, expanding `${VAR}` from the process environment everywhere except
//! inside a container's `environment` map (those values are runtime
//! injections and must survive interpolation verbatim).

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

use super::model::FlockSpec;

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("invalid spec in {path}: {message}")]
    InvalidSpec { path: String, message: String },
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub struct SpecStore {
    specs: HashMap<String, FlockSpec>,
}

impl SpecStore {
    /// Load from a single YAML file or every `.yaml`/`.yml` file in a directory.
    pub fn load(path: &str) -> Result<Self, SpecError> {
        let p = Path::new(path);
        let mut specs: HashMap<String, FlockSpec> = HashMap::new();

        let files: Vec<std::path::PathBuf> = if p.is_dir() {
            std::fs::read_dir(p)
                .map_err(|e| SpecError::Io {
                    path: path.to_string(),
                    source: e,
                })?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| {
                    matches!(
                        path.extension().and_then(|e| e.to_str()),
                        Some("yaml") | Some("yml")
                    )
                })
                .collect()
        } else {
            vec![p.to_path_buf()]
        };

        for file in files {
            for spec in load_file(&file)? {
                if let Some(existing) = specs.get(&spec.name) {
                    tracing::warn!(
                        flock = %spec.name,
                        previous = ?existing.name,
                        "duplicate flock name, overwriting"
                    );
                }
                specs.insert(spec.name.clone(), spec);
            }
        }

        Ok(Self { specs })
    }

    pub fn get(&self, name: &str) -> Option<&FlockSpec> {
        self.specs.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

fn load_file(path: &Path) -> Result<Vec<FlockSpec>, SpecError> {
    let text = std::fs::read_to_string(path).map_err(|e| SpecError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    serde_yaml::Deserializer::from_str(&text)
        .map(|doc| {
            let mut value = serde_yaml::Value::deserialize(doc).map_err(|e| SpecError::InvalidSpec {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            interpolate_value(&mut value, false);
            serde_yaml::from_value(value).map_err(|e| SpecError::InvalidSpec {
                path: path.display().to_string(),
                message: e.to_string(),
            })
        })
        .collect()
}

use serde::Deserialize as _;

/// Walk a parsed YAML value tree, substituting `${VAR}` in scalar strings from
/// the process environment, except inside values under a container's
/// `environment` mapping.
fn interpolate_value(value: &mut serde_yaml::Value, under_environment: bool) {
    match value {
        serde_yaml::Value::String(s) => {
            if !under_environment {
                *s = substitute_env(s);
            }
        }
        serde_yaml::Value::Sequence(items) => {
            for item in items {
                interpolate_value(item, under_environment);
            }
        }
        serde_yaml::Value::Mapping(map) => {
            let keys: Vec<serde_yaml::Value> = map.keys().cloned().collect();
            for key in keys {
                let is_environment_key = matches!(&key, serde_yaml::Value::String(k) if k == "environment");
                if let Some(v) = map.get_mut(&key) {
                    interpolate_value(v, under_environment || is_environment_key);
                }
            }
        }
        _ => {}
    }
}

fn substitute_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '$' && input[i..].starts_with("${") {
            if let Some(end) = input[i..].find('}') {
                let var = &input[i + 2..i + end];
                out.push_str(&std::env::var(var).unwrap_or_default());
                for _ in 0..end {
                    chars.next();
                }
                continue;
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitute_env_replaces_var() {
        std::env::set_var("FLOCKD_TEST_VAR", "hello");
        assert_eq!(substitute_env("prefix-${FLOCKD_TEST_VAR}-suffix"), "prefix-hello-suffix");
    }

    #[test]
    fn substitute_env_missing_var_becomes_empty() {
        std::env::remove_var("FLOCKD_TEST_MISSING");
        assert_eq!(substitute_env("${FLOCKD_TEST_MISSING}"), "");
    }

    #[test]
    fn interpolation_skips_environment_map() {
        std::env::set_var("FLOCKD_TEST_VAR", "resolved");
        let yaml = r#"
name: "${FLOCKD_TEST_VAR}"
containers:
  - name: box
    image: img
    environment:
      FOO: "${FLOCKD_TEST_VAR}"
"#;
        let mut value: serde_yaml::Value = serde_yaml::from_str(yaml).unwrap();
        interpolate_value(&mut value, false);
        let spec: FlockSpec = serde_yaml::from_value(value).unwrap();
        assert_eq!(spec.name, "resolved");
        assert_eq!(
            spec.containers[0].environment.get("FOO").unwrap(),
            "${FLOCKD_TEST_VAR}"
        );
    }
}
