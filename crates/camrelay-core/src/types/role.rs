//! Peer roles within a session.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Role a connection holds once joined to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerRole {
    /// The single media source (the camera).
    Producer,
    /// A viewer receiving frames or negotiating a peer connection.
    Consumer,
}

impl PeerRole {
    /// Returns the role as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Producer => "producer",
            Self::Consumer => "consumer",
        }
    }
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeerRole {
    type Err = AppError;

    /// Parses a role name. Older mobile and viewer clients send `sender`
    /// and `viewer`; those are accepted as aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "producer" | "sender" => Ok(Self::Producer),
            "consumer" | "viewer" => Ok(Self::Consumer),
            other => Err(AppError::validation(format!(
                "Unknown role '{other}', expected 'producer' or 'consumer'"
            ))),
        }
    }
}

/// Role of a connection as tracked by the registry, including the state
/// before any join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionRole {
    /// Connected but not joined to any session.
    Unassigned,
    /// Bound as the session producer.
    Producer,
    /// Bound as a session consumer.
    Consumer,
}

impl From<PeerRole> for ConnectionRole {
    fn from(role: PeerRole) -> Self {
        match role {
            PeerRole::Producer => Self::Producer,
            PeerRole::Consumer => Self::Consumer,
        }
    }
}
