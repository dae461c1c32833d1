use thiserror::Error;

use crate::core::{ConfigError, ProtocolViolation};
use crate::error::{Effect, Transience};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),

    #[error("scheduler is shutting down")]
    ShuttingDown,
}

impl SchedulerError {
    pub fn transience(&self) -> Transience {
        match self {
            SchedulerError::Config(e) => e.transience(),
            SchedulerError::Protocol(e) => e.transience(),
            SchedulerError::ShuttingDown => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            SchedulerError::Config(e) => e.effect(),
            SchedulerError::Protocol(e) => e.effect(),
            SchedulerError::ShuttingDown => Effect::None,
        }
    }
}
