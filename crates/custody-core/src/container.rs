//! Container record and the roles that handle it

use std::fmt;

use serde::{Deserialize, Serialize};

/// Free-text id given to a container before anyone sets one
pub const UNDEFINED_ID: &str = "UNDEFINED";

/// Lifecycle of a container. Stored as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ContainerStatus {
    /// Created by a sender, not yet handed over
    ReadyToSend = 0,
    /// With a shipper
    Shipping = 1,
    /// Delivered to a receiver
    Received = 2,
}

impl ContainerStatus {
    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadyToSend => "READY_TO_SEND",
            Self::Shipping => "SHIPPING",
            Self::Received => "RECEIVED",
        }
    }

    /// The state a successful transfer moves to, if any
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::ReadyToSend => Some(Self::Shipping),
            Self::Shipping => Some(Self::Received),
            Self::Received => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next().is_none()
    }
}

impl TryFrom<u8> for ContainerStatus {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::ReadyToSend),
            1 => Ok(Self::Shipping),
            2 => Ok(Self::Received),
            other => Err(format!("unknown container status code {}", other)),
        }
    }
}

impl From<ContainerStatus> for u8 {
    fn from(status: ContainerStatus) -> u8 {
        status.code()
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared role of a caller in the supply chain.
///
/// Only the three named roles are privileged by any rule; anything else is
/// carried verbatim so it can be reported back in permission errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Affiliation {
    Sender,
    Shipper,
    Receiver,
    Other(String),
}

impl Affiliation {
    pub fn parse(s: &str) -> Self {
        match s {
            "sender" => Self::Sender,
            "shipper" => Self::Shipper,
            "receiver" => Self::Receiver,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Sender => "sender",
            Self::Shipper => "shipper",
            Self::Receiver => "receiver",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for Affiliation {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<Affiliation> for String {
    fn from(affiliation: Affiliation) -> String {
        affiliation.as_str().to_string()
    }
}

impl fmt::Display for Affiliation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked shipping container, stored under its `v5c_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub weight: u64,
    pub owner: String,
    pub status: ContainerStatus,
    #[serde(rename = "v5cID")]
    pub v5c_id: String,
    pub temperature: i64,
}

impl Container {
    /// Fresh record in its initial state, owned by `owner`
    pub fn new(v5c_id: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            id: UNDEFINED_ID.to_string(),
            weight: 0,
            owner: owner.into(),
            status: ContainerStatus::ReadyToSend,
            v5c_id: v5c_id.into(),
            temperature: 0,
        }
    }

    pub fn is_owned_by(&self, name: &str) -> bool {
        self.owner == name
    }
}
