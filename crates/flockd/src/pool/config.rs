//! Pool configuration YAML (spec §6.5): names the default pool and lists
//! each pool's admission discipline and tunables.

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

use super::PoolConfig;

#[derive(Debug, Error)]
pub enum PoolConfigError {
    #[error("failed to read pool config {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("failed to parse pool config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("default_pool '{0}' is not listed in pools")]
    UnknownDefault(String),
    #[error("duplicate pool name '{0}'")]
    DuplicateName(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolKind {
    All,
    Fixed,
    Persist,
}

#[derive(Debug, Clone, Deserialize)]
struct RawPoolEntry {
    name: String,
    #[serde(rename = "type")]
    kind: PoolKind,
    duration: u64,
    max_size: Option<u64>,
    expire_check: Option<u64>,
    grace_time: Option<u32>,
    wait_ping_ttl: Option<u64>,
    network_pool_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawPoolFile {
    default_pool: String,
    pools: Vec<RawPoolEntry>,
}

/// One entry from the pool config file, resolved to the shared [`PoolConfig`]
/// plus the discipline tag `main.rs` dispatches on to build the concrete
/// pool type.
#[derive(Debug, Clone)]
pub struct PoolEntry {
    pub kind: PoolKind,
    pub config: PoolConfig,
}

#[derive(Debug, Clone)]
pub struct PoolFileConfig {
    pub default_pool: String,
    pub pools: HashMap<String, PoolEntry>,
}

impl PoolFileConfig {
    pub fn load(path: &str) -> Result<Self, PoolConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| PoolConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::parse(&contents)
    }

    fn parse(contents: &str) -> Result<Self, PoolConfigError> {
        let raw: RawPoolFile = serde_yaml::from_str(contents)?;
        let mut pools = HashMap::new();
        for entry in raw.pools {
            if pools.contains_key(&entry.name) {
                return Err(PoolConfigError::DuplicateName(entry.name));
            }
            let config = PoolConfig {
                name: entry.name.clone(),
                duration_secs: entry.duration,
                max_size: entry.max_size,
                expire_check_secs: entry.expire_check.unwrap_or(10),
                grace_time_secs: entry.grace_time.unwrap_or(5),
                wait_ping_ttl_secs: entry.wait_ping_ttl.unwrap_or(30),
                network_pool_size: entry.network_pool_size,
            };
            pools.insert(entry.name, PoolEntry { kind: entry.kind, config });
        }
        if !pools.contains_key(&raw.default_pool) {
            return Err(PoolConfigError::UnknownDefault(raw.default_pool));
        }
        Ok(Self { default_pool: raw.default_pool, pools })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_three_pool_kinds() {
        let yaml = r#"
default_pool: quick
pools:
  - { name: quick, type: all, duration: 300 }
  - { name: limited, type: fixed, duration: 600, max_size: 4 }
  - { name: sticky, type: persist, duration: 900, max_size: 2, grace_time: 10 }
"#;
        let cfg = PoolFileConfig::parse(yaml).unwrap();
        assert_eq!(cfg.default_pool, "quick");
        assert_eq!(cfg.pools.len(), 3);
        assert_eq!(cfg.pools["limited"].kind, PoolKind::Fixed);
        assert_eq!(cfg.pools["limited"].config.max_size, Some(4));
        assert_eq!(cfg.pools["sticky"].config.grace_time_secs, 10);
        assert_eq!(cfg.pools["quick"].config.grace_time_secs, 5);
    }

    #[test]
    fn rejects_unknown_default_pool() {
        let yaml = r#"
default_pool: missing
pools:
  - { name: quick, type: all, duration: 300 }
"#;
        assert!(matches!(PoolFileConfig::parse(yaml), Err(PoolConfigError::UnknownDefault(_))));
    }

    #[test]
    fn rejects_duplicate_pool_names() {
        let yaml = r#"
default_pool: quick
pools:
  - { name: quick, type: all, duration: 300 }
  - { name: quick, type: fixed, duration: 300, max_size: 1 }
"#;
        assert!(matches!(PoolFileConfig::parse(yaml), Err(PoolConfigError::DuplicateName(_))));
    }
}
