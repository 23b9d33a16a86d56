use std::process::ExitStatus;
use std::time::Duration;

use cephmon_primitives::{Primitive, PrimitiveError, PrimitiveErrorKind};
use thiserror::Error;

/// Result type for host primitives.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Output could not be understood.
    #[error("{0}: unexpected output: {1}")]
    BadOutput(Primitive, String),

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(Primitive, #[source] std::io::Error),

    /// The binary backing the primitive is not installed.
    #[error("{0}: {1} not found: {2}")]
    MissingBinary(Primitive, &'static str, #[source] which::Error),

    /// The command exited unsuccessfully.
    #[error("{0} unexpectedly exited with non-zero code: {1}")]
    NonZeroExit(Primitive, ExitStatus),

    /// The command did not finish in time and was killed.
    #[error("{0} timed out after {1:?}")]
    TimedOut(Primitive, Duration),
}

impl PrimitiveError for Error {
    fn primitive(&self) -> Primitive {
        match self {
            Self::BadOutput(primitive, _)
            | Self::Io(primitive, _)
            | Self::MissingBinary(primitive, ..)
            | Self::NonZeroExit(primitive, _)
            | Self::TimedOut(primitive, _) => *primitive,
        }
    }

    fn kind(&self) -> PrimitiveErrorKind {
        match self {
            Self::BadOutput(..) => PrimitiveErrorKind::BadOutput,
            Self::Io(..) | Self::MissingBinary(..) => PrimitiveErrorKind::Unavailable,
            Self::NonZeroExit(..) => PrimitiveErrorKind::Failed,
            Self::TimedOut(..) => PrimitiveErrorKind::TimedOut,
        }
    }
}
