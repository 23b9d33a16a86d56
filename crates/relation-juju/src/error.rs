use std::process::ExitStatus;

use cephmon_relation::{RelationError, RelationErrorKind};
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Hook tool output was not valid UTF-8.
    #[error(transparent)]
    BadUtf8(#[from] std::string::FromUtf8Error),

    /// Failed to read the local host name.
    #[error("failed to read hostname: {0}")]
    Hostname(#[source] nix::Error),

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// Hook tool output was not the expected JSON.
    #[error("failed to parse {0} output: {1}")]
    Json(&'static str, #[source] serde_json::Error),

    /// Hook tool exited unsuccessfully.
    #[error("{0} unexpectedly exited with non-zero code: {1}")]
    NonZeroExit(&'static str, ExitStatus),

    /// Name lookup returned no addresses.
    #[error("no addresses found for host: {0}")]
    NoAddress(String),

    /// Name lookup failed.
    #[error("failed to resolve {0}: {1}")]
    Resolve(String, #[source] std::io::Error),
}

impl RelationError for Error {
    fn kind(&self) -> RelationErrorKind {
        match self {
            Self::NoAddress(_) | Self::Resolve(..) => RelationErrorKind::Resolution,
            Self::NonZeroExit(..) | Self::Io(..) => RelationErrorKind::External,
            Self::BadUtf8(_) | Self::Hostname(_) | Self::Json(..) => RelationErrorKind::Other,
        }
    }
}
