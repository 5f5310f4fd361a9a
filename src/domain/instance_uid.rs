//! `InstanceUID` identifies an [`crate::domain::agent::Agent`] for its whole
//! lifetime (`# 3 Agent`, invariant: immutable for the life of a record).

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceUid(Uuid);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum InstanceUidError {
    #[error("invalid instance uid `{0}`: {1}")]
    InvalidFormat(String, String),
}

impl InstanceUid {
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// The zero UID, used by a [`crate::domain::connection::Connection`]
    /// before the agent's first report is received.
    pub fn zero() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_nil()
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Display for InstanceUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for InstanceUid {
    type Err = InstanceUidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| InstanceUidError::InvalidFormat(s.to_string(), e.to_string()))
    }
}

impl From<Uuid> for InstanceUid {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl Default for InstanceUid {
    fn default() -> Self {
        InstanceUid::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_from_str() {
        let uid = InstanceUid::new_random();
        let parsed: InstanceUid = uid.to_string().parse().unwrap();
        assert_eq!(uid, parsed);
    }

    #[test]
    fn zero_uid_is_distinguishable() {
        assert!(InstanceUid::zero().is_zero());
        assert!(!InstanceUid::new_random().is_zero());
    }

    #[test]
    fn rejects_malformed_input() {
        assert!("not-a-uuid".parse::<InstanceUid>().is_err());
    }
}
