//! Registry of every v5cID ever created
//!
//! Identifiers in creation order, append-only. On a ledger with native
//! indexes each id is its own index member, so concurrent appends commute.
//! Otherwise the registry is a single value and appends go through
//! compare-and-swap so a concurrent writer is retried rather than
//! overwritten.

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::config::CustodyConfig;
use crate::error::{CustodyError, Result};
use crate::ledger::Ledger;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(rename = "v5cs", default, deserialize_with = "null_as_empty")]
    v5c_ids: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> &[String] {
        &self.v5c_ids
    }

    pub fn len(&self) -> usize {
        self.v5c_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.v5c_ids.is_empty()
    }

    pub fn contains(&self, v5c_id: &str) -> bool {
        self.v5c_ids.iter().any(|id| id == v5c_id)
    }

    /// Registry over index members; repeats keep their first position
    fn from_members(members: Vec<String>) -> Self {
        let mut registry = Self::new();
        for member in members {
            if !registry.contains(&member) {
                registry.v5c_ids.push(member);
            }
        }
        registry
    }

    fn push(&mut self, v5c_id: &str) {
        self.v5c_ids.push(v5c_id.to_string());
    }

    fn encode(&self, key: &str) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CustodyError::encode(key, e))
    }
}

/// Current registry plus the exact bytes it was read from, for the
/// compare-and-swap that follows.
fn read<L: Ledger + ?Sized>(ledger: &L, key: &str) -> Result<(Registry, Option<Vec<u8>>)> {
    match ledger.get(key)? {
        None => Ok((Registry::new(), None)),
        Some(bytes) => {
            let registry = serde_json::from_slice(&bytes).map_err(|e| {
                warn!(key, error = %e, "corrupt registry");
                CustodyError::corrupt(key, e)
            })?;
            Ok((registry, Some(bytes)))
        }
    }
}

/// Registry as stored. An absent key reads as empty.
pub fn load<L: Ledger + ?Sized>(ledger: &L, config: &CustodyConfig) -> Result<Registry> {
    if let Some(members) = ledger.index_members(&config.registry_key)? {
        return Ok(Registry::from_members(members));
    }
    read(ledger, &config.registry_key).map(|(registry, _)| registry)
}

/// Write an empty registry unless one already exists.
///
/// Returns `true` when this call created it. A native index needs no
/// initial value, so nothing is written there.
pub fn initialize<L: Ledger + ?Sized>(ledger: &mut L, config: &CustodyConfig) -> Result<bool> {
    let key = &config.registry_key;
    if ledger.index_members(key)?.is_some() {
        return Ok(false);
    }
    let empty = Registry::new().encode(key)?;
    let created = ledger.compare_and_swap(key, None, &empty)?;
    if created {
        debug!(key = %key, "registry initialized");
    }
    Ok(created)
}

/// Append `v5c_id`, retrying on contention up to the configured attempts.
pub fn append<L: Ledger + ?Sized>(
    ledger: &mut L,
    config: &CustodyConfig,
    v5c_id: &str,
) -> Result<Registry> {
    let key = &config.registry_key;

    if let Some(members) = ledger.index_members(key)? {
        let mut registry = Registry::from_members(members);
        if !registry.contains(v5c_id) {
            ledger.index_append(key, v5c_id)?;
            registry.push(v5c_id);
            debug!(v5c_id, size = registry.len(), "registry index appended");
        }
        return Ok(registry);
    }

    let attempts = config.registry_append_attempts.max(1);

    for attempt in 1..=attempts {
        let (mut registry, current) = read(ledger, key)?;
        if registry.contains(v5c_id) {
            return Ok(registry);
        }
        registry.push(v5c_id);
        let next = registry.encode(key)?;

        if ledger.compare_and_swap(key, current.as_deref(), &next)? {
            debug!(v5c_id, attempt, size = registry.len(), "registry appended");
            return Ok(registry);
        }
        warn!(v5c_id, attempt, "registry changed underneath append, retrying");
    }

    Err(CustodyError::RegistryContention {
        v5c_id: v5c_id.to_string(),
        attempts,
    })
}
