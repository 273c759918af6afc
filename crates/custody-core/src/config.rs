//! Program configuration
//!
//! Deployed through DNA properties; every field has a default so an empty
//! properties block yields a working program.

use serde::{Deserialize, Serialize};

/// How strictly a candidate v5cID is matched against its shape.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierPolicy {
    /// Whole string must be two ASCII letters then seven ASCII digits
    #[default]
    Anchored,
    /// String only has to start with that shape
    Prefix,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CustodyConfig {
    /// Ledger key holding the registry of every created v5cID
    #[serde(default = "default_registry_key")]
    pub registry_key: String,

    /// Key namespace for enrollment certificates
    #[serde(default = "default_ecert_prefix")]
    pub ecert_prefix: String,

    /// Key namespace for participant profiles
    #[serde(default = "default_participant_prefix")]
    pub participant_prefix: String,

    #[serde(default)]
    pub identifier_policy: IdentifierPolicy,

    /// Require current ownership for weight/temperature/id updates
    #[serde(default)]
    pub guard_scalar_updates: bool,

    /// Compare-and-swap attempts before a registry append gives up
    #[serde(default = "default_registry_append_attempts")]
    pub registry_append_attempts: u32,
}

fn default_registry_key() -> String {
    "v5cIDs".to_string()
}

fn default_ecert_prefix() -> String {
    "ecert/".to_string()
}

fn default_participant_prefix() -> String {
    "participant/".to_string()
}

fn default_registry_append_attempts() -> u32 {
    5
}

impl Default for CustodyConfig {
    fn default() -> Self {
        Self {
            registry_key: default_registry_key(),
            ecert_prefix: default_ecert_prefix(),
            participant_prefix: default_participant_prefix(),
            identifier_policy: IdentifierPolicy::default(),
            guard_scalar_updates: false,
            registry_append_attempts: default_registry_append_attempts(),
        }
    }
}

impl CustodyConfig {
    /// Behaviour of the original deployment: prefix-only identifier match
    pub fn compatible() -> Self {
        Self {
            identifier_policy: IdentifierPolicy::Prefix,
            ..Default::default()
        }
    }

    pub fn ecert_key(&self, name: &str) -> String {
        format!("{}{}", self.ecert_prefix, name)
    }

    pub fn participant_key(&self, agent: &str) -> String {
        format!("{}{}", self.participant_prefix, agent)
    }

    /// Whether `key` is reserved for something other than a container record
    pub fn is_reserved_key(&self, key: &str) -> bool {
        key == self.registry_key
            || key.starts_with(&self.ecert_prefix)
            || key.starts_with(&self.participant_prefix)
    }
}
