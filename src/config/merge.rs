use crate::core::{Mode, ReplicaId};

use super::{Config, ConfigLayer};

pub const ENV_REPLICA_ID: &str = "KV_REPLICA_ID";
pub const ENV_MODE: &str = "KV_MODE";
pub const ENV_LISTEN_ADDR: &str = "KV_LISTEN_ADDR";
pub const ENV_COORDINATOR_ADDR: &str = "KV_COORDINATOR_ADDR";

pub fn merge_layers(layers: impl IntoIterator<Item = ConfigLayer>) -> Config {
    let mut config = Config::default();
    for layer in layers {
        layer.apply_to(&mut config);
    }
    config
}

pub fn apply_env_overrides(config: &mut Config) {
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

/// Applies overrides read through `lookup`. Invalid values are logged and
/// ignored.
pub fn apply_overrides_from(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let read = |key: &str| {
        lookup(key)
            .map(|raw| raw.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    if let Some(raw) = read(ENV_REPLICA_ID) {
        match raw.parse::<u32>() {
            Ok(id) => config.replica_id = ReplicaId::new(id),
            Err(err) => tracing::warn!("invalid {ENV_REPLICA_ID}, ignoring: {err}"),
        }
    }

    if let Some(raw) = read(ENV_MODE) {
        match raw.parse::<Mode>() {
            Ok(mode) => config.mode = mode,
            Err(err) => tracing::warn!("invalid {ENV_MODE}, ignoring: {err}"),
        }
    }

    if let Some(addr) = read(ENV_LISTEN_ADDR) {
        config.listen_addr = addr;
    }

    if let Some(addr) = read(ENV_COORDINATOR_ADDR) {
        config.coordinator_addr = Some(addr);
    }
}
