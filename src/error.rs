use thiserror::Error;

use crate::config::ConfigLoadError;
use crate::core::ConfigError;
use crate::sched::SchedulerError;
use crate::transport::TransportError;

/// Whether retrying this operation may succeed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Transience {
    /// Retry will never help without changing inputs/state.
    Permanent,
    /// Retry may help (transient contention/outage).
    Retryable,
    /// Unknown if retry will help.
    Unknown,
}

impl Transience {
    pub fn is_retryable(self) -> bool {
        matches!(self, Transience::Retryable)
    }
}

/// What we know about side effects when an error is returned.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Effect {
    /// Definitely no side effects occurred.
    None,
    /// Side effects definitely occurred (locally or remotely).
    Some,
    /// We don't know if side effects occurred.
    Unknown,
}

impl Effect {
    pub fn as_str(self) -> &'static str {
        match self {
            Effect::None => "none",
            Effect::Some => "some",
            Effect::Unknown => "unknown",
        }
    }
}

/// Crate-level convenience error.
///
/// Not a "god error": it is a thin wrapper over canonical capability errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    ConfigLoad(#[from] ConfigLoadError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn transience(&self) -> Transience {
        match self {
            Error::Config(e) => e.transience(),
            Error::ConfigLoad(e) => e.transience(),
            Error::Scheduler(e) => e.transience(),
            Error::Transport(e) => e.transience(),
            Error::Io(_) => Transience::Unknown,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            Error::Config(e) => e.effect(),
            Error::ConfigLoad(e) => e.effect(),
            Error::Scheduler(e) => e.effect(),
            Error::Transport(e) => e.effect(),
            Error::Io(_) => Effect::Unknown,
        }
    }
}
