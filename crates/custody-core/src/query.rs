//! Read-only projections
//!
//! A caller sees a record when they own it or when they are a sender.

use tracing::debug;

use crate::config::CustodyConfig;
use crate::container::Container;
use crate::error::{CustodyError, GuardMismatch, Result};
use crate::identity::CallerContext;
use crate::ledger::Ledger;
use crate::{registry, store};

pub fn can_view(container: &Container, caller: &CallerContext) -> bool {
    container.is_owned_by(&caller.name) || caller.is_sender()
}

pub fn get_container_details<L: Ledger + ?Sized>(
    ledger: &L,
    caller: &CallerContext,
    v5c_id: &str,
) -> Result<Container> {
    let container = store::load(ledger, v5c_id)?;
    if can_view(&container, caller) {
        Ok(container)
    } else {
        Err(CustodyError::PermissionDenied {
            operation: "get_container_details",
            mismatches: vec![GuardMismatch::new("owner", &container.owner, &caller.name)],
        })
    }
}

/// True when nothing is stored under `v5c_id`. Read failures propagate.
pub fn check_unique_v5c<L: Ledger + ?Sized>(ledger: &L, v5c_id: &str) -> Result<bool> {
    Ok(!store::exists(ledger, v5c_id)?)
}

/// Every registered record the caller may see, in creation order.
///
/// Records hidden from the caller are skipped. A registered id whose record
/// cannot be loaded fails the whole query.
pub fn get_containers<L: Ledger + ?Sized>(
    ledger: &L,
    config: &CustodyConfig,
    caller: &CallerContext,
) -> Result<Vec<Container>> {
    let registry = registry::load(ledger, config)?;

    let mut visible = Vec::with_capacity(registry.len());
    for v5c_id in registry.ids() {
        let container = store::load(ledger, v5c_id)?;
        if can_view(&container, caller) {
            visible.push(container);
        }
    }

    debug!(
        caller = %caller.name,
        registered = registry.len(),
        visible = visible.len(),
        "containers listed"
    );
    Ok(visible)
}

pub fn add_ecert<L: Ledger + ?Sized>(
    ledger: &mut L,
    config: &CustodyConfig,
    name: &str,
    ecert: &str,
) -> Result<()> {
    ledger.put(&config.ecert_key(name), ecert.as_bytes())?;
    debug!(name, "ecert stored");
    Ok(())
}

pub fn get_ecert<L: Ledger + ?Sized>(ledger: &L, config: &CustodyConfig, name: &str) -> Result<String> {
    let key = config.ecert_key(name);
    let bytes = ledger.get(&key)?.ok_or_else(|| CustodyError::EcertNotFound {
        name: name.to_string(),
    })?;
    String::from_utf8(bytes).map_err(|e| CustodyError::corrupt(&key, e))
}
