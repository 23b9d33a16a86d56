use cephmon_primitives::PrimitiveError;
use cephmon_relation::RelationError;
use thiserror::Error;

/// Operator configuration that cannot drive a cycle.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ConfigError {
    /// `fsid` is unset.
    #[error("No fsid supplied, cannot proceed.")]
    MissingFsid,

    /// `monitor-secret` is unset.
    #[error("No monitor-secret supplied, cannot proceed.")]
    MissingMonitorSecret,

    /// `monitor-count` is not a positive integer.
    #[error("monitor-count must be a positive integer, got {0:?}")]
    InvalidMonitorCount(String),
}

impl ConfigError {
    /// Whether this stops `config-changed` with a failure rather than deferring.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::MissingFsid | Self::MissingMonitorSecret)
    }
}

/// Failure while initialising the local monitor.
#[derive(Debug, Error)]
pub enum BootstrapError<PE>
where
    PE: PrimitiveError,
{
    /// A bootstrap primitive failed.
    #[error("bootstrap primitive failed: {0}")]
    Primitive(PE),

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),
}

/// Errors that end an event cycle abnormally.
#[derive(Debug, Error)]
pub enum Error<RE, PE>
where
    RE: RelationError,
    PE: PrimitiveError,
{
    /// Monitor initialisation failed; the next event retries it.
    #[error(transparent)]
    Bootstrap(BootstrapError<PE>),

    /// Operator configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// Errors passed through from the relation transport.
    #[error(transparent)]
    Transport(RE),
}

impl<RE, PE> Error<RE, PE>
where
    RE: RelationError,
    PE: PrimitiveError,
{
    /// Whether this is a precondition the operator must fix before any cycle can proceed.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::Config(e) => e.is_fatal(),
            _ => false,
        }
    }
}
