//! Error types for the mock relation transport.

use cephmon_relation::{RelationError, RelationErrorKind};
use thiserror::Error;

/// Error type for the mock relation transport.
#[derive(Debug, Error)]
pub enum Error {
    /// Failure injected by a test.
    #[error("injected failure: {0}")]
    Injected(String),

    /// The requested relation instance does not exist.
    #[error("relation not found: {0}")]
    RelationNotFound(String),

    /// Error when loading or parsing a fixture file.
    #[error("fixture file error: {0}")]
    FixtureFile(String),

    /// The host name has no entry in the mock's host table.
    #[error("unresolvable host: {0}")]
    UnresolvableHost(String),
}

impl RelationError for Error {
    fn kind(&self) -> RelationErrorKind {
        match self {
            Self::UnresolvableHost(_) => RelationErrorKind::Resolution,
            Self::RelationNotFound(_) => RelationErrorKind::NotFound,
            Self::Injected(_) => RelationErrorKind::External,
            Self::FixtureFile(_) => RelationErrorKind::Other,
        }
    }
}
