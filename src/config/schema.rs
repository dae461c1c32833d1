use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::{ConfigError, Limits, Membership, Mode, ReplicaId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub replica_id: ReplicaId,
    pub mode: Mode,
    pub listen_addr: String,
    /// Address of every replica, self included; the index is the replica id.
    pub peers: Vec<String>,
    pub coordinator_addr: Option<String>,
    pub limits: Limits,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            replica_id: ReplicaId::new(0),
            mode: Mode::Causal,
            listen_addr: "127.0.0.1:7100".to_string(),
            peers: vec!["127.0.0.1:7100".to_string()],
            coordinator_addr: None,
            limits: Limits::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Cluster view implied by `peers` and `replica_id`.
    pub fn membership(&self) -> Result<Membership, ConfigError> {
        if self.peers.is_empty() {
            return Err(ConfigError::EmptyCluster);
        }
        Membership::new(self.replica_id, self.peers.len())
    }

    pub fn validate(&self) -> Result<Membership, ConfigError> {
        self.limits.validate()?;
        self.membership()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRotation {
    Daily,
    Hourly,
    Minutely,
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub stdout: bool,
    pub stdout_format: LogFormat,
    /// `EnvFilter` directives used when `KV_LOG` is unset.
    pub filter: Option<String>,
    pub file: FileLoggingConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stdout: true,
            stdout_format: LogFormat::Compact,
            filter: None,
            file: FileLoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    pub enabled: bool,
    pub dir: Option<PathBuf>,
    pub format: LogFormat,
    pub rotation: LogRotation,
    pub retention_max_files: Option<usize>,
}

impl Default for FileLoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            format: LogFormat::Json,
            rotation: LogRotation::Never,
            retention_max_files: Some(10),
        }
    }
}

/// Partial config: every field optional. Layers are applied in order onto
/// the defaults, later layers winning.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConfigLayer {
    pub replica_id: Option<ReplicaId>,
    pub mode: Option<Mode>,
    pub listen_addr: Option<String>,
    pub peers: Option<Vec<String>>,
    pub coordinator_addr: Option<String>,
    pub limits: LimitsOverride,
    pub logging: LoggingConfigOverride,
}

impl ConfigLayer {
    pub fn apply_to(&self, base: &mut Config) {
        if let Some(replica_id) = self.replica_id {
            base.replica_id = replica_id;
        }
        if let Some(mode) = self.mode {
            base.mode = mode;
        }
        if let Some(addr) = &self.listen_addr {
            base.listen_addr = addr.clone();
        }
        if let Some(peers) = &self.peers {
            base.peers = peers.clone();
        }
        if let Some(addr) = &self.coordinator_addr {
            base.coordinator_addr = Some(addr.clone());
        }
        self.limits.apply_to(&mut base.limits);
        self.logging.apply_to(&mut base.logging);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LimitsOverride {
    pub buffer_capacity: Option<usize>,
    pub max_frame_bytes: Option<usize>,
    pub fanout_parallelism: Option<usize>,
}

impl LimitsOverride {
    pub fn apply_to(&self, limits: &mut Limits) {
        if let Some(value) = self.buffer_capacity {
            limits.buffer_capacity = value;
        }
        if let Some(value) = self.max_frame_bytes {
            limits.max_frame_bytes = value;
        }
        if let Some(value) = self.fanout_parallelism {
            limits.fanout_parallelism = value;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfigOverride {
    pub stdout: Option<bool>,
    pub stdout_format: Option<LogFormat>,
    pub filter: Option<String>,
    pub file: Option<FileLoggingConfigOverride>,
}

impl LoggingConfigOverride {
    pub fn apply_to(&self, target: &mut LoggingConfig) {
        if let Some(stdout) = self.stdout {
            target.stdout = stdout;
        }
        if let Some(format) = self.stdout_format {
            target.stdout_format = format;
        }
        if let Some(filter) = self.filter.as_ref() {
            target.filter = Some(filter.clone());
        }
        if let Some(file) = self.file.as_ref() {
            file.apply_to(&mut target.file);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FileLoggingConfigOverride {
    pub enabled: Option<bool>,
    pub dir: Option<PathBuf>,
    pub format: Option<LogFormat>,
    pub rotation: Option<LogRotation>,
    pub retention_max_files: Option<usize>,
}

impl FileLoggingConfigOverride {
    pub fn apply_to(&self, target: &mut FileLoggingConfig) {
        if let Some(enabled) = self.enabled {
            target.enabled = enabled;
        }
        if let Some(dir) = self.dir.as_ref() {
            target.dir = Some(dir.clone());
        }
        if let Some(format) = self.format {
            target.format = format;
        }
        if let Some(rotation) = self.rotation {
            target.rotation = rotation;
        }
        if let Some(files) = self.retention_max_files {
            target.retention_max_files = Some(files);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_follows_peer_list() {
        let mut cfg = Config {
            replica_id: ReplicaId::new(2),
            peers: vec!["a:1".into(), "b:1".into(), "c:1".into()],
            ..Config::default()
        };
        let membership = cfg.membership().unwrap();
        assert_eq!(membership.size(), 3);
        assert_eq!(membership.local(), ReplicaId::new(2));

        cfg.peers.pop();
        assert_eq!(
            cfg.membership().unwrap_err(),
            ConfigError::UnknownReplica {
                replica: ReplicaId::new(2),
                size: 2
            }
        );
        cfg.peers.clear();
        assert_eq!(cfg.membership().unwrap_err(), ConfigError::EmptyCluster);
    }

    #[test]
    fn validate_checks_limits_first() {
        let mut cfg = Config::default();
        cfg.limits.fanout_parallelism = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidLimit {
                field: "fanout_parallelism",
                ..
            })
        ));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            mode = "sequential"
            [limits]
            buffer_capacity = 8
            "#,
        )
        .unwrap();
        assert_eq!(cfg.mode, Mode::Sequential);
        assert_eq!(cfg.limits.buffer_capacity, 8);
        assert_eq!(cfg.limits.fanout_parallelism, 4);
        assert!(cfg.logging.stdout);
    }

    #[test]
    fn later_layer_wins() {
        let mut cfg = Config::default();
        let file: ConfigLayer = toml::from_str(
            r#"
            replica_id = 1
            peers = ["x:1", "y:1"]
            [logging.file]
            enabled = false
            "#,
        )
        .unwrap();
        let cli = ConfigLayer {
            replica_id: Some(ReplicaId::new(0)),
            ..ConfigLayer::default()
        };
        file.apply_to(&mut cfg);
        cli.apply_to(&mut cfg);
        assert_eq!(cfg.replica_id, ReplicaId::new(0));
        assert_eq!(cfg.peers.len(), 2);
        assert!(!cfg.logging.file.enabled);
    }
}
