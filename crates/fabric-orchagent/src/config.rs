//! Controller configuration.
//!
//! Loaded from an optional JSON file; every field has a default so an
//! empty object (or no file at all) yields a working controller.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use crate::flow::{FlowProfile, WriterConfig};
use crate::topology::TopologyOrchConfig;

const MAX_REFRESH_DELAY_MS: u64 = 60_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FabricConfig {
    /// Flow table every rule is written to
    #[serde(default)]
    pub flow_table_id: u8,

    /// Host and hop rules
    #[serde(default = "default_unicast")]
    pub unicast: FlowProfile,

    /// Multicast forward rules
    #[serde(default = "default_mdns")]
    pub mdns: FlowProfile,

    /// Rules pointing at fan-out groups
    #[serde(default = "default_multicast_group")]
    pub multicast_group: FlowProfile,

    /// Send-to-controller rule
    #[serde(default)]
    pub table_miss: FlowProfile,

    #[serde(default = "default_multicast_address")]
    pub multicast_address: Ipv4Addr,

    #[serde(default = "default_mdns_port")]
    pub mdns_port: u16,

    /// Debounce window before a topology rebuild
    #[serde(default = "default_refresh_delay_ms")]
    pub topology_refresh_delay_ms: u64,

    /// Idle tick of the daemon loop
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

fn default_unicast() -> FlowProfile {
    FlowProfile::new(1000, 15, 0)
}

fn default_mdns() -> FlowProfile {
    FlowProfile::new(10, 0, 35)
}

fn default_multicast_group() -> FlowProfile {
    FlowProfile::new(10, 0, 0)
}

fn default_multicast_address() -> Ipv4Addr {
    Ipv4Addr::new(224, 0, 0, 251)
}

fn default_mdns_port() -> u16 {
    5353
}

fn default_refresh_delay_ms() -> u64 {
    1000
}

fn default_heartbeat_interval_ms() -> u64 {
    100
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            flow_table_id: 0,
            unicast: default_unicast(),
            mdns: default_mdns(),
            multicast_group: default_multicast_group(),
            table_miss: FlowProfile::default(),
            multicast_address: default_multicast_address(),
            mdns_port: default_mdns_port(),
            topology_refresh_delay_ms: default_refresh_delay_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
        }
    }
}

impl FabricConfig {
    /// Parses and validates a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`from_file`](Self::from_file), but a missing file yields the
    /// defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        match Self::from_file(path.as_ref()) {
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!(
                    "FabricConfig: {} not found, using defaults",
                    path.as_ref().display()
                );
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "heartbeat_interval_ms must be > 0".to_string(),
            ));
        }

        if !self.multicast_address.is_multicast() {
            return Err(ConfigError::Invalid(format!(
                "multicast_address {} is not a multicast address",
                self.multicast_address
            )));
        }

        if self.topology_refresh_delay_ms > MAX_REFRESH_DELAY_MS {
            return Err(ConfigError::Invalid(format!(
                "topology_refresh_delay_ms must be <= {}",
                MAX_REFRESH_DELAY_MS
            )));
        }

        Ok(())
    }

    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.topology_refresh_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            table_id: self.flow_table_id,
            unicast: self.unicast,
            mdns: self.mdns,
            multicast_group: self.multicast_group,
            table_miss: self.table_miss,
            multicast_address: self.multicast_address,
            mdns_port: self.mdns_port,
        }
    }

    pub fn topology_config(&self) -> TopologyOrchConfig {
        TopologyOrchConfig {
            refresh_delay: self.refresh_delay(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = FabricConfig::default();
        assert_eq!(config.unicast, FlowProfile::new(1000, 15, 0));
        assert_eq!(config.mdns, FlowProfile::new(10, 0, 35));
        assert_eq!(config.multicast_address, Ipv4Addr::new(224, 0, 0, 251));
        assert_eq!(config.mdns_port, 5353);
        assert_eq!(config.refresh_delay(), Duration::from_millis(1000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_writer_config_matches_defaults() {
        assert_eq!(FabricConfig::default().writer_config(), WriterConfig::default());
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let file = write_config("{}");
        let config = FabricConfig::from_file(file.path()).unwrap();
        assert_eq!(config, FabricConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let file = write_config(
            r#"{"unicast": {"priority": 2000, "idle_timeout": 30, "hard_timeout": 0},
                "topology_refresh_delay_ms": 250}"#,
        );
        let config = FabricConfig::from_file(file.path()).unwrap();
        assert_eq!(config.unicast.priority, 2000);
        assert_eq!(config.unicast.idle_timeout, 30);
        assert_eq!(config.topology_refresh_delay_ms, 250);
        assert_eq!(config.mdns_port, 5353);
    }

    #[test]
    fn test_parse_error() {
        let file = write_config("{not json");
        assert!(matches!(
            FabricConfig::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_unicast_rendezvous() {
        let file = write_config(r#"{"multicast_address": "10.0.0.1"}"#);
        assert!(matches!(
            FabricConfig::from_file(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_heartbeat() {
        let config = FabricConfig {
            heartbeat_interval_ms: 0,
            ..FabricConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_long_refresh_delay() {
        let config = FabricConfig {
            topology_refresh_delay_ms: MAX_REFRESH_DELAY_MS + 1,
            ..FabricConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = FabricConfig::load_or_default(dir.path().join("absent.json")).unwrap();
        assert_eq!(config, FabricConfig::default());
    }
}
