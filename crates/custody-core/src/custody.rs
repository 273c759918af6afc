//! Custody state machine
//!
//! A container moves `READY_TO_SEND -> SHIPPING -> RECEIVED`, and each step
//! hands ownership to a named recipient. A step is allowed only when the
//! record is in the step's source state, the caller owns it, and the caller
//! holds the step's role. The recipient's role is fixed per step, never taken
//! from the caller.
//!
//! Guard failures leave the stored record untouched.

use tracing::{debug, info, warn};

use crate::config::CustodyConfig;
use crate::container::{Affiliation, Container, ContainerStatus};
use crate::error::{CustodyError, GuardMismatch, Result};
use crate::identifier::validate_v5c_id;
use crate::identity::CallerContext;
use crate::ledger::Ledger;
use crate::{registry, store};

/// An ownership hand-over between two roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    SenderToShipper,
    ShipperToReceiver,
}

impl Transfer {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SenderToShipper => "sender_to_shipper",
            Self::ShipperToReceiver => "shipper_to_receiver",
        }
    }

    pub fn source_status(&self) -> ContainerStatus {
        match self {
            Self::SenderToShipper => ContainerStatus::ReadyToSend,
            Self::ShipperToReceiver => ContainerStatus::Shipping,
        }
    }

    pub fn target_status(&self) -> ContainerStatus {
        match self {
            Self::SenderToShipper => ContainerStatus::Shipping,
            Self::ShipperToReceiver => ContainerStatus::Received,
        }
    }

    /// Role the caller must hold
    pub fn caller_affiliation(&self) -> Affiliation {
        match self {
            Self::SenderToShipper => Affiliation::Sender,
            Self::ShipperToReceiver => Affiliation::Shipper,
        }
    }

    /// Role the recipient takes on
    pub fn recipient_affiliation(&self) -> Affiliation {
        match self {
            Self::SenderToShipper => Affiliation::Shipper,
            Self::ShipperToReceiver => Affiliation::Receiver,
        }
    }

    /// Every guard that fails for `caller` acting on `container`
    pub fn check(&self, container: &Container, caller: &CallerContext) -> Vec<GuardMismatch> {
        let mut mismatches = Vec::new();
        if container.status != self.source_status() {
            mismatches.push(GuardMismatch::new(
                "status",
                self.source_status(),
                container.status,
            ));
        }
        if !container.is_owned_by(&caller.name) {
            mismatches.push(GuardMismatch::new("owner", &container.owner, &caller.name));
        }
        if caller.affiliation != self.caller_affiliation() {
            mismatches.push(GuardMismatch::new(
                "caller affiliation",
                self.caller_affiliation(),
                &caller.affiliation,
            ));
        }
        mismatches
    }

    /// The record after this step, or the guards that refused it
    pub fn apply(
        &self,
        container: &Container,
        caller: &CallerContext,
        recipient: &str,
    ) -> Result<Container> {
        let mismatches = self.check(container, caller);
        if !mismatches.is_empty() {
            return Err(CustodyError::PermissionDenied {
                operation: self.name(),
                mismatches,
            });
        }

        Ok(Container {
            owner: recipient.to_string(),
            status: self.target_status(),
            ..container.clone()
        })
    }
}

/// Create a fresh record owned by a sender and register it.
///
/// The record is written before the registry. A registry failure after
/// that write leaves an unregistered record behind and is reported as an
/// error.
pub fn create_container<L: Ledger + ?Sized>(
    ledger: &mut L,
    config: &CustodyConfig,
    caller: &CallerContext,
    v5c_id: &str,
) -> Result<Container> {
    validate_v5c_id(v5c_id, config.identifier_policy)?;

    if config.is_reserved_key(v5c_id) {
        return Err(CustodyError::InvalidIdentifier {
            v5c_id: v5c_id.to_string(),
        });
    }

    if store::exists(ledger, v5c_id)? {
        return Err(CustodyError::AlreadyExists {
            v5c_id: v5c_id.to_string(),
        });
    }

    if !caller.is_sender() {
        warn!(v5c_id, caller = %caller.name, affiliation = %caller.affiliation, "create_container denied");
        return Err(CustodyError::PermissionDenied {
            operation: "create_container",
            mismatches: vec![GuardMismatch::new(
                "caller affiliation",
                Affiliation::Sender,
                &caller.affiliation,
            )],
        });
    }

    let container = Container::new(v5c_id, caller.name.clone());
    store::save(ledger, &container)?;
    registry::append(ledger, config, v5c_id)?;

    info!(v5c_id, owner = %container.owner, "container created");
    Ok(container)
}

/// Run `step` against the stored record and write back the result.
pub fn transfer<L: Ledger + ?Sized>(
    ledger: &mut L,
    caller: &CallerContext,
    step: Transfer,
    v5c_id: &str,
    recipient: &str,
) -> Result<Container> {
    let container = store::load(ledger, v5c_id)?;

    let updated = step.apply(&container, caller, recipient).map_err(|e| {
        warn!(v5c_id, caller = %caller.name, error = %e, "transfer denied");
        e
    })?;

    store::save(ledger, &updated)?;
    info!(
        v5c_id,
        step = step.name(),
        from = %container.owner,
        to = %updated.owner,
        recipient_affiliation = %step.recipient_affiliation(),
        "custody transferred"
    );
    Ok(updated)
}

/// Plain fields that can be overwritten outside the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarField {
    Temperature,
    Weight,
    Id,
}

impl ScalarField {
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Temperature => "update_temperature",
            Self::Weight => "update_weight",
            Self::Id => "update_id",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Temperature => "Temperature",
            Self::Weight => "Weight",
            Self::Id => "Id",
        }
    }

    /// Parse `raw` and assign it to this field of `container`
    pub fn assign(&self, container: &mut Container, raw: &str) -> Result<()> {
        let invalid = || CustodyError::InvalidValue {
            field: self.label(),
            value: raw.to_string(),
        };
        match self {
            Self::Temperature => container.temperature = raw.parse().map_err(|_| invalid())?,
            Self::Weight => container.weight = raw.parse().map_err(|_| invalid())?,
            Self::Id => container.id = raw.to_string(),
        }
        Ok(())
    }
}

/// Overwrite one scalar field of a stored record.
///
/// No custody guard applies unless `guard_scalar_updates` is set, in which
/// case only the current owner may update.
pub fn update_scalar<L: Ledger + ?Sized>(
    ledger: &mut L,
    config: &CustodyConfig,
    caller: &CallerContext,
    v5c_id: &str,
    field: ScalarField,
    raw: &str,
) -> Result<Container> {
    let mut container = store::load(ledger, v5c_id)?;

    if config.guard_scalar_updates && !container.is_owned_by(&caller.name) {
        warn!(v5c_id, caller = %caller.name, field = field.operation(), "scalar update denied");
        return Err(CustodyError::PermissionDenied {
            operation: field.operation(),
            mismatches: vec![GuardMismatch::new("owner", &container.owner, &caller.name)],
        });
    }

    field.assign(&mut container, raw)?;
    store::save(ledger, &container)?;
    debug!(v5c_id, field = field.operation(), value = raw, "scalar updated");
    Ok(container)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::ledger::MemoryLedger;

    fn sender(name: &str) -> CallerContext {
        CallerContext::new(name, Affiliation::Sender)
    }

    fn shipper(name: &str) -> CallerContext {
        CallerContext::new(name, Affiliation::Shipper)
    }

    fn created(ledger: &mut MemoryLedger, v5c_id: &str, owner: &str) -> Container {
        create_container(ledger, &CustodyConfig::default(), &sender(owner), v5c_id).unwrap()
    }

    #[test]
    fn test_transfer_table() {
        assert_eq!(
            Transfer::SenderToShipper.source_status().next(),
            Some(Transfer::SenderToShipper.target_status())
        );
        assert_eq!(
            Transfer::ShipperToReceiver.source_status().next(),
            Some(Transfer::ShipperToReceiver.target_status())
        );
        assert_eq!(Transfer::SenderToShipper.recipient_affiliation(), Affiliation::Shipper);
        assert_eq!(Transfer::ShipperToReceiver.recipient_affiliation(), Affiliation::Receiver);
    }

    #[test]
    fn test_check_reports_all_failed_guards() {
        let mut container = Container::new("AB1234567", "alice");
        container.status = ContainerStatus::Received;

        let mismatches = Transfer::SenderToShipper.check(&container, &shipper("mallory"));
        let fields: Vec<_> = mismatches.iter().map(|m| m.field).collect();
        assert_eq!(fields, ["status", "owner", "caller affiliation"]);
    }

    #[test]
    fn test_create_sets_initial_state() {
        let mut ledger = MemoryLedger::new();
        let container = created(&mut ledger, "AB1234567", "alice");

        assert_eq!(container.owner, "alice");
        assert_eq!(container.status, ContainerStatus::ReadyToSend);
        assert_eq!(container.id, "UNDEFINED");
        assert_eq!(container.weight, 0);
        assert_eq!(container.temperature, 0);
        assert_eq!(store::load(&ledger, "AB1234567").unwrap(), container);
    }

    #[test]
    fn test_create_invalid_identifier_writes_nothing() {
        let mut ledger = MemoryLedger::new();
        let err = create_container(
            &mut ledger,
            &CustodyConfig::default(),
            &sender("alice"),
            "A1234567",
        )
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_create_checks_duplicate_before_affiliation() {
        let mut ledger = MemoryLedger::new();
        created(&mut ledger, "AB1234567", "alice");

        let err = create_container(
            &mut ledger,
            &CustodyConfig::default(),
            &shipper("bob"),
            "AB1234567",
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_create_propagates_lookup_failure() {
        let mut ledger = MemoryLedger::new();
        ledger.fail_reads("AB1234567");

        let err = create_container(
            &mut ledger,
            &CustodyConfig::default(),
            &sender("alice"),
            "AB1234567",
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert_eq!(ledger.write_count(), 0);
    }

    #[test]
    fn test_create_reports_registry_failure_after_record_write() {
        let config = CustodyConfig::default();
        let mut ledger = MemoryLedger::new();
        ledger.fail_writes(&config.registry_key);

        let err = create_container(&mut ledger, &config, &sender("alice"), "AB1234567").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(store::exists(&ledger, "AB1234567").unwrap());
    }

    #[test]
    fn test_full_custody_chain() {
        let mut ledger = MemoryLedger::new();
        created(&mut ledger, "AB1234567", "alice");

        let shipped = transfer(
            &mut ledger,
            &sender("alice"),
            Transfer::SenderToShipper,
            "AB1234567",
            "bob",
        )
        .unwrap();
        assert_eq!(shipped.status, ContainerStatus::Shipping);
        assert_eq!(shipped.owner, "bob");

        let received = transfer(
            &mut ledger,
            &shipper("bob"),
            Transfer::ShipperToReceiver,
            "AB1234567",
            "carol",
        )
        .unwrap();
        assert_eq!(received.status, ContainerStatus::Received);
        assert_eq!(received.owner, "carol");
        assert_eq!(store::load(&ledger, "AB1234567").unwrap(), received);
    }

    #[test]
    fn test_denied_transfer_leaves_record_untouched() {
        let mut ledger = MemoryLedger::new();
        let original = created(&mut ledger, "AB1234567", "alice");
        let writes = ledger.write_count();

        let err = transfer(
            &mut ledger,
            &sender("mallory"),
            Transfer::SenderToShipper,
            "AB1234567",
            "mallory",
        )
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Permission);
        assert!(err.to_string().contains("owner expected 'alice' got 'mallory'"));
        assert_eq!(ledger.write_count(), writes);
        assert_eq!(store::load(&ledger, "AB1234567").unwrap(), original);
    }

    #[test]
    fn test_transfer_missing_record_is_not_found() {
        let mut ledger = MemoryLedger::new();
        let err = transfer(
            &mut ledger,
            &sender("alice"),
            Transfer::SenderToShipper,
            "AB1234567",
            "bob",
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_scalar_updates_ignore_custody_by_default() {
        let config = CustodyConfig::default();
        let mut ledger = MemoryLedger::new();
        created(&mut ledger, "AB1234567", "alice");
        let stranger = CallerContext::new("eve", Affiliation::Other("auditor".into()));

        update_scalar(&mut ledger, &config, &stranger, "AB1234567", ScalarField::Temperature, "-20")
            .unwrap();
        update_scalar(&mut ledger, &config, &stranger, "AB1234567", ScalarField::Weight, "1200")
            .unwrap();
        let container =
            update_scalar(&mut ledger, &config, &stranger, "AB1234567", ScalarField::Id, "MSCU 123")
                .unwrap();

        assert_eq!(container.temperature, -20);
        assert_eq!(container.weight, 1200);
        assert_eq!(container.id, "MSCU 123");
        assert_eq!(container.owner, "alice");
    }

    #[test]
    fn test_guarded_scalar_update_requires_owner() {
        let config = CustodyConfig {
            guard_scalar_updates: true,
            ..Default::default()
        };
        let mut ledger = MemoryLedger::new();
        created(&mut ledger, "AB1234567", "alice");

        let err = update_scalar(
            &mut ledger,
            &config,
            &sender("eve"),
            "AB1234567",
            ScalarField::Weight,
            "10",
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);

        update_scalar(&mut ledger, &config, &sender("alice"), "AB1234567", ScalarField::Weight, "10")
            .unwrap();
    }

    #[test]
    fn test_negative_weight_is_invalid() {
        let mut container = Container::new("AB1234567", "alice");
        let err = ScalarField::Weight.assign(&mut container, "-5").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(container.weight, 0);

        ScalarField::Temperature.assign(&mut container, "-5").unwrap();
        assert_eq!(container.temperature, -5);
    }

    #[test]
    fn test_padded_number_is_invalid() {
        let mut container = Container::new("AB1234567", "alice");
        for raw in [" 12", "12 ", " 12 ", "1 2", ""] {
            let err = ScalarField::Weight.assign(&mut container, raw).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{raw:?}");
        }
        assert!(ScalarField::Temperature.assign(&mut container, "\t4").is_err());
        assert_eq!(container.weight, 0);
        assert_eq!(container.temperature, 0);
    }

    #[test]
    fn test_identifier_inside_reserved_namespace_is_rejected() {
        let config = CustodyConfig {
            ecert_prefix: "AB1".to_string(),
            ..Default::default()
        };
        let mut ledger = MemoryLedger::new();

        let err = create_container(&mut ledger, &config, &sender("alice"), "AB1234567").unwrap_err();
        assert!(matches!(err, CustodyError::InvalidIdentifier { .. }));
        assert!(ledger.is_empty());

        create_container(&mut ledger, &config, &sender("alice"), "AB2345678").unwrap();
    }
}
