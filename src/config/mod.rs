//! Config loading and persistence.

mod load;
mod merge;
mod schema;

pub use load::{ConfigLoadError, DEFAULT_CONFIG_FILE, load, load_layer, write_config};
pub use merge::{
    ENV_COORDINATOR_ADDR, ENV_LISTEN_ADDR, ENV_MODE, ENV_REPLICA_ID, apply_env_overrides,
    apply_overrides_from, merge_layers,
};
pub use schema::{
    Config, ConfigLayer, FileLoggingConfig, FileLoggingConfigOverride, LimitsOverride, LogFormat,
    LogRotation, LoggingConfig, LoggingConfigOverride,
};
