//! Resource limits for one replica.

use serde::{Deserialize, Serialize};

use super::error::ConfigError;

/// Values are explicit about their units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Pending buffer bound. Overflow is a configuration error, not
    /// backpressure.
    pub buffer_capacity: usize,
    pub max_frame_bytes: usize,
    /// Upper bound on concurrent unicasts in one fan-out round.
    pub fanout_parallelism: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            buffer_capacity: 1024,
            max_frame_bytes: 1024 * 1024,
            fanout_parallelism: 4,
        }
    }
}

impl Limits {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_capacity == 0 {
            return Err(invalid("buffer_capacity"));
        }
        if self.max_frame_bytes == 0 {
            return Err(invalid("max_frame_bytes"));
        }
        if self.fanout_parallelism == 0 {
            return Err(invalid("fanout_parallelism"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str) -> ConfigError {
    ConfigError::InvalidLimit {
        field,
        reason: "must be > 0".to_string(),
    }
}
