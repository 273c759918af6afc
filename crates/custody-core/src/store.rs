//! Container records in the ledger, one JSON value per v5cID key

use tracing::{debug, warn};

use crate::container::Container;
use crate::error::{CustodyError, Result};
use crate::ledger::Ledger;

/// Whether anything is stored under `v5c_id`.
///
/// Undecodable bytes still count as present. A failed read is an error, not
/// absence.
pub fn exists<L: Ledger + ?Sized>(ledger: &L, v5c_id: &str) -> Result<bool> {
    Ok(ledger.get(v5c_id)?.is_some())
}

pub fn load<L: Ledger + ?Sized>(ledger: &L, v5c_id: &str) -> Result<Container> {
    let bytes = ledger.get(v5c_id)?.ok_or_else(|| CustodyError::NotFound {
        v5c_id: v5c_id.to_string(),
    })?;
    decode(v5c_id, &bytes)
}

pub fn decode(key: &str, bytes: &[u8]) -> Result<Container> {
    let container: Container = serde_json::from_slice(bytes).map_err(|e| {
        warn!(key, error = %e, "corrupt container record");
        CustodyError::corrupt(key, e)
    })?;

    if container.v5c_id != key {
        return Err(CustodyError::corrupt(
            key,
            format!("record carries v5cID '{}'", container.v5c_id),
        ));
    }

    Ok(container)
}

pub fn save<L: Ledger + ?Sized>(ledger: &mut L, container: &Container) -> Result<()> {
    let bytes =
        serde_json::to_vec(container).map_err(|e| CustodyError::encode(&container.v5c_id, e))?;
    ledger.put(&container.v5c_id, &bytes)?;
    debug!(v5c_id = %container.v5c_id, status = %container.status, owner = %container.owner, "container saved");
    Ok(())
}
