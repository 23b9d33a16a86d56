use std::fmt::{self, Debug};

/// The shared monitor bootstrap secret. Never printed.
#[derive(Clone, Eq, PartialEq)]
pub struct MonitorSecret(String);

impl MonitorSecret {
    /// Wraps a secret value.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw secret, for handing to a primitive.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the secret is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Debug for MonitorSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MonitorSecret(<redacted>)")
    }
}

/// A role-scoped cluster key. Never printed.
#[derive(Clone, Eq, PartialEq)]
pub struct CephKey(String);

impl CephKey {
    /// Wraps a key value.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key, for publishing to a relation.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for CephKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CephKey(<redacted>)")
    }
}
