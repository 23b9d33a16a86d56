use cephmon_primitives::{Primitive, PrimitiveError, PrimitiveErrorKind};
use thiserror::Error;

/// Error returned by an injected fault.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("mock {primitive} failed ({kind})")]
pub struct Error {
    /// The primitive that failed.
    pub primitive: Primitive,

    /// How it failed.
    pub kind: PrimitiveErrorKind,
}

impl PrimitiveError for Error {
    fn primitive(&self) -> Primitive {
        self.primitive
    }

    fn kind(&self) -> PrimitiveErrorKind {
        self.kind.clone()
    }
}
