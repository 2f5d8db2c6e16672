use thiserror::Error;

/// Errors raised by the sizing engine
#[derive(Debug, Error)]
pub enum Error {
    /// A size was built from a negative dimension
    #[error("negative {axis} is not allowed for Size (got {value})")]
    NegativeDimension { axis: Axis, value: i64 },

    /// The binding or observable was used after `dispose`
    #[error("object is disposed")]
    Disposed,

    /// A resolution listener is already installed on the observable
    #[error("resolution listener is already installed")]
    ListenerAlreadyInstalled,

    /// The capability probe could not be scheduled
    #[error("failed to spawn capability probe: {0}")]
    Spawn(#[from] futures::task::SpawnError),

    /// Configuration could not be read or parsed
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Axis named in a [`Error::NegativeDimension`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Width,
    Height,
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Axis::Width => f.write_str("width"),
            Axis::Height => f.write_str("height"),
        }
    }
}

/// Failure reported by a host when it cannot observe an element
#[derive(Debug, Clone, Error)]
#[error("resize observation unavailable: {reason}")]
pub struct ObserverError {
    pub reason: String,
}

impl ObserverError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
