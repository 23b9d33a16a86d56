use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Named relation channels this charm participates in.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleChannel {
    /// Monitor peers.
    Mon,

    /// Object-storage daemon units.
    Osd,

    /// Gateway units.
    Radosgw,
}

impl RoleChannel {
    /// The relation name as used by the hook tools.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mon => "mon",
            Self::Osd => "osd",
            Self::Radosgw => "radosgw",
        }
    }
}

impl Display for RoleChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a relation name is not one of the known channels.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("unknown relation channel: {0}")]
pub struct ParseChannelError(pub String);

impl FromStr for RoleChannel {
    type Err = ParseChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mon" => Ok(Self::Mon),
            "osd" => Ok(Self::Osd),
            "radosgw" => Ok(Self::Radosgw),
            other => Err(ParseChannelError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_names_round_trip() {
        for channel in [RoleChannel::Mon, RoleChannel::Osd, RoleChannel::Radosgw] {
            assert_eq!(channel.as_str().parse::<RoleChannel>(), Ok(channel));
        }
    }

    #[test]
    fn test_unknown_channel() {
        assert_eq!(
            "mds".parse::<RoleChannel>(),
            Err(ParseChannelError("mds".to_string()))
        );
    }
}
