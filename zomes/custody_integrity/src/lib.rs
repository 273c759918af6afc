//! Custody Integrity Zome
//!
//! Entry and link types backing the custody ledger:
//! - LedgerState: one committed value for one ledger key, chained to the
//!   state it replaces
//! - StringAnchor: deterministic link bases per ledger key and per index
//!
//! A key's current value is found by walking from its first root state
//! through first-committed successors. Index members (the v5cID registry)
//! are one link each, so concurrent appends never replace each other.
//!
//! Validation is the trust boundary: container states may only be created
//! fresh by their owner, handed over by the current owner, and never move
//! backwards. Nothing in this DNA is deleted.

use custody_core::identity::ParticipantProfile;
use custody_core::{store, Container, CustodyConfig, EcertSeed, IdentifierPolicy, Registry};
use hdi::prelude::*;

/// Anchor type for ledger keys
pub const LEDGER_KEY_ANCHOR: &str = "ledger_key";

/// Anchor type for append-only indexes
pub const LEDGER_INDEX_ANCHOR: &str = "ledger_index";

// =============================================================================
// DNA Properties
// =============================================================================

/// DNA properties. Every field is optional.
#[derive(Serialize, Deserialize, SerializedBytes, Debug, Clone, Default)]
pub struct CustodyProperties {
    #[serde(default)]
    pub custody: CustodyConfig,

    /// Certificates stored when a cell initializes
    #[serde(default)]
    pub ecerts: Vec<EcertSeed>,
}

/// Read properties from the running DNA, falling back to defaults when they
/// are absent or don't decode.
pub fn custody_properties() -> ExternResult<CustodyProperties> {
    let properties = dna_info()?.modifiers.properties;
    Ok(CustodyProperties::try_from(properties).unwrap_or_default())
}

// =============================================================================
// Entry Types
// =============================================================================

/// LedgerState - value of a ledger key at the time it was committed.
///
/// Values are the JSON bytes produced by custody-core. `previous` is the
/// state this one replaces; `None` only for the first value of a key.
#[hdk_entry_helper]
#[derive(Clone, PartialEq)]
pub struct LedgerState {
    pub key: String,
    pub value: Vec<u8>,
    pub previous: Option<ActionHash>,
}

/// Generic string anchor for creating deterministic link bases
#[hdk_entry_helper]
#[derive(Clone, PartialEq)]
pub struct StringAnchor {
    pub anchor_type: String,
    pub anchor_value: String,
}

impl StringAnchor {
    pub fn new(anchor_type: &str, anchor_value: &str) -> Self {
        Self {
            anchor_type: anchor_type.to_string(),
            anchor_value: anchor_value.to_string(),
        }
    }

    pub fn ledger_key(key: &str) -> Self {
        Self::new(LEDGER_KEY_ANCHOR, key)
    }

    pub fn ledger_index(key: &str) -> Self {
        Self::new(LEDGER_INDEX_ANCHOR, key)
    }
}

#[hdk_entry_types]
#[unit_enum(UnitEntryTypes)]
pub enum EntryTypes {
    LedgerState(LedgerState),
    StringAnchor(StringAnchor),
}

// =============================================================================
// Link Types
// =============================================================================

#[hdk_link_types]
pub enum LinkTypes {
    KeyToState,    // Anchor(ledger_key) -> LedgerState
    IndexToMember, // Anchor(ledger_index) -> Anchor(ledger_key of member), tag = member
}

// =============================================================================
// Validation
// =============================================================================

#[hdk_extern]
pub fn genesis_self_check(_data: GenesisSelfCheckData) -> ExternResult<ValidateCallbackResult> {
    Ok(ValidateCallbackResult::Valid)
}

#[hdk_extern]
pub fn validate(op: Op) -> ExternResult<ValidateCallbackResult> {
    match op.flattened::<EntryTypes, LinkTypes>()? {
        FlatOp::StoreEntry(store_entry) => match store_entry {
            OpEntry::CreateEntry { app_entry, action } => match app_entry {
                EntryTypes::LedgerState(state) => {
                    let config = custody_properties()?.custody;
                    let previous = match &state.previous {
                        Some(hash) => match previous_state(hash)? {
                            Some(previous) => Some(previous),
                            None => {
                                return Ok(ValidateCallbackResult::Invalid(
                                    "LedgerState.previous must point at a LedgerState".to_string(),
                                ))
                            }
                        },
                        None => None,
                    };
                    Ok(into_callback_result(check_ledger_state(
                        &state,
                        &action.author.to_string(),
                        previous.as_ref(),
                        &config,
                    )))
                }
                EntryTypes::StringAnchor(_) => Ok(ValidateCallbackResult::Valid),
            },
            OpEntry::UpdateEntry { app_entry, .. } => match app_entry {
                EntryTypes::LedgerState(_) => Ok(ValidateCallbackResult::Invalid(
                    "LedgerState is append-only; commit a new state instead".to_string(),
                )),
                _ => Ok(ValidateCallbackResult::Valid),
            },
            _ => Ok(ValidateCallbackResult::Valid),
        },
        FlatOp::StoreRecord(OpRecord::DeleteEntry { .. }) | FlatOp::RegisterDelete(_) => {
            Ok(deletion_rejected("Ledger entries"))
        }
        FlatOp::RegisterCreateLink { link_type, tag, .. } => match link_type {
            LinkTypes::KeyToState => Ok(ValidateCallbackResult::Valid),
            LinkTypes::IndexToMember => Ok(into_callback_result(check_index_member(&tag.0))),
        },
        FlatOp::RegisterDeleteLink { .. } => Ok(deletion_rejected("Ledger links")),
        _ => Ok(ValidateCallbackResult::Valid),
    }
}

/// The LedgerState committed at `hash`, or `None` when that action holds
/// something else
fn previous_state(hash: &ActionHash) -> ExternResult<Option<LedgerState>> {
    let record = must_get_valid_record(hash.clone())?;
    Ok(record.entry().to_app_option::<LedgerState>().ok().flatten())
}

fn into_callback_result(checked: Result<(), String>) -> ValidateCallbackResult {
    match checked {
        Ok(()) => ValidateCallbackResult::Valid,
        Err(reason) => ValidateCallbackResult::Invalid(reason),
    }
}

fn deletion_rejected(what: &str) -> ValidateCallbackResult {
    ValidateCallbackResult::Invalid(format!("{} cannot be deleted", what))
}

/// Validate a LedgerState against the namespace of its key and, for
/// containers, against the state it replaces.
///
/// Container keys are checked with the prefix identifier policy so records
/// written under either policy stay valid.
pub fn check_ledger_state(
    state: &LedgerState,
    author: &str,
    previous: Option<&LedgerState>,
    config: &CustodyConfig,
) -> Result<(), String> {
    if state.key.is_empty() {
        return Err("Ledger key cannot be empty".to_string());
    }

    if let Some(previous) = previous {
        if previous.key != state.key {
            return Err(format!(
                "State for '{}' cannot follow a state for '{}'",
                state.key, previous.key
            ));
        }
    }

    if state.key == config.registry_key {
        return serde_json::from_slice::<Registry>(&state.value)
            .map(|_| ())
            .map_err(|e| format!("Registry value does not decode: {}", e));
    }

    if let Some(name) = state.key.strip_prefix(&config.ecert_prefix) {
        if name.is_empty() {
            return Err("Certificate key needs an identity name".to_string());
        }
        return std::str::from_utf8(&state.value)
            .map(|_| ())
            .map_err(|_| format!("Certificate for '{}' is not UTF-8", name));
    }

    if let Some(agent) = state.key.strip_prefix(&config.participant_prefix) {
        // Self-registration only: the profile key must name the author
        if agent != author {
            return Err("Participant profile must be registered by its own agent".to_string());
        }
        return serde_json::from_slice::<ParticipantProfile>(&state.value)
            .map(|_| ())
            .map_err(|e| format!("Participant profile does not decode: {}", e));
    }

    if !custody_core::is_valid_v5c_id(&state.key, IdentifierPolicy::Prefix) {
        return Err(format!("'{}' is not a valid v5cID", state.key));
    }
    let container = store::decode(&state.key, &state.value).map_err(|e| e.to_string())?;

    match previous {
        None => check_fresh_container(&container, author),
        Some(previous) => {
            let before = store::decode(&previous.key, &previous.value).map_err(|e| e.to_string())?;
            check_container_step(&before, &container, author, config)
        }
    }
}

/// First state of a key: exactly what creation writes, owned by its author
fn check_fresh_container(container: &Container, author: &str) -> Result<(), String> {
    if *container != Container::new(container.v5c_id.clone(), author) {
        return Err(format!(
            "New container {} must be READY_TO_SEND, owned by its author, with default fields",
            container.v5c_id
        ));
    }
    Ok(())
}

/// A later state: a hand-over by the current owner to the next status, or a
/// scalar edit that keeps owner and status
fn check_container_step(
    before: &Container,
    after: &Container,
    author: &str,
    config: &CustodyConfig,
) -> Result<(), String> {
    if after.status == before.status {
        if after.owner != before.owner {
            return Err("Owner can only change together with a status advance".to_string());
        }
        if config.guard_scalar_updates && author != before.owner {
            return Err("Only the current owner can update this container".to_string());
        }
        return Ok(());
    }

    if before.status.next() != Some(after.status) {
        return Err(format!(
            "Status cannot move from {} to {}",
            before.status, after.status
        ));
    }
    if author != before.owner {
        return Err("Only the current owner can hand over a container".to_string());
    }
    Ok(())
}

/// Registry index links carry the member v5cID as their tag
pub fn check_index_member(tag: &[u8]) -> Result<(), String> {
    let member = std::str::from_utf8(tag).map_err(|_| "Index member is not UTF-8".to_string())?;
    if !custody_core::is_valid_v5c_id(member, IdentifierPolicy::Prefix) {
        return Err(format!("Index member '{}' is not a valid v5cID", member));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_core::{Affiliation, ContainerStatus};

    const ALICE: &str = "uhCAkalice";
    const BOB: &str = "uhCAkbob";
    const MALLORY: &str = "uhCAkmallory";

    fn state(key: &str, value: impl Into<Vec<u8>>) -> LedgerState {
        LedgerState {
            key: key.to_string(),
            value: value.into(),
            previous: None,
        }
    }

    fn container_state(container: &Container) -> LedgerState {
        state(&container.v5c_id, serde_json::to_vec(container).unwrap())
    }

    fn check_step(before: &Container, after: &Container, author: &str) -> Result<(), String> {
        check_ledger_state(
            &container_state(after),
            author,
            Some(&container_state(before)),
            &CustodyConfig::default(),
        )
    }

    #[test]
    fn test_fresh_container_owned_by_author() {
        let config = CustodyConfig::default();
        let fresh = Container::new("AB1234567", ALICE);

        assert!(check_ledger_state(&container_state(&fresh), ALICE, None, &config).is_ok());
        assert!(check_ledger_state(&container_state(&fresh), MALLORY, None, &config).is_err());

        let shipped = Container {
            status: ContainerStatus::Shipping,
            ..fresh
        };
        assert!(check_ledger_state(&container_state(&shipped), ALICE, None, &config).is_err());
    }

    #[test]
    fn test_container_record_must_match_key() {
        let config = CustodyConfig::default();
        let record = serde_json::to_vec(&Container::new("AB1234567", ALICE)).unwrap();

        assert!(check_ledger_state(&state("AB7654321", record), ALICE, None, &config).is_err());
        assert!(check_ledger_state(&state("AB1234567", "garbage"), ALICE, None, &config).is_err());
    }

    #[test]
    fn test_handover_by_owner_only() {
        let before = Container::new("AB1234567", ALICE);
        let after = Container {
            owner: BOB.to_string(),
            status: ContainerStatus::Shipping,
            ..before.clone()
        };

        assert!(check_step(&before, &after, ALICE).is_ok());
        assert!(check_step(&before, &after, MALLORY).is_err());
    }

    #[test]
    fn test_status_never_regresses_or_skips() {
        let received = Container {
            status: ContainerStatus::Received,
            owner: BOB.to_string(),
            ..Container::new("AB1234567", ALICE)
        };
        let reset = Container {
            status: ContainerStatus::ReadyToSend,
            ..received.clone()
        };
        let err = check_step(&received, &reset, BOB).unwrap_err();
        assert!(err.contains("cannot move"));

        let fresh = Container::new("AB1234567", ALICE);
        let skipped = Container {
            status: ContainerStatus::Received,
            ..fresh.clone()
        };
        assert!(check_step(&fresh, &skipped, ALICE).is_err());
    }

    #[test]
    fn test_owner_change_needs_status_advance() {
        let before = Container::new("AB1234567", ALICE);
        let stolen = Container {
            owner: MALLORY.to_string(),
            ..before.clone()
        };
        assert!(check_step(&before, &stolen, ALICE).is_err());
        assert!(check_step(&before, &stolen, MALLORY).is_err());
    }

    #[test]
    fn test_scalar_edit_follows_guard_setting() {
        let before = Container::new("AB1234567", ALICE);
        let heavier = Container {
            weight: 2400,
            ..before.clone()
        };
        assert!(check_step(&before, &heavier, MALLORY).is_ok());

        let guarded = CustodyConfig {
            guard_scalar_updates: true,
            ..Default::default()
        };
        let result = check_ledger_state(
            &container_state(&heavier),
            MALLORY,
            Some(&container_state(&before)),
            &guarded,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_previous_state_must_share_key() {
        let config = CustodyConfig::default();
        let other = Container::new("CD7654321", ALICE);
        let mine = Container {
            weight: 5,
            ..Container::new("AB1234567", ALICE)
        };
        let err = check_ledger_state(
            &container_state(&mine),
            ALICE,
            Some(&container_state(&other)),
            &config,
        )
        .unwrap_err();
        assert!(err.contains("cannot follow"));
    }

    #[test]
    fn test_unknown_key_shape_rejected() {
        let config = CustodyConfig::default();
        let err = check_ledger_state(&state("whatever", "{}"), ALICE, None, &config).unwrap_err();
        assert!(err.contains("not a valid v5cID"));
        assert!(check_ledger_state(&state("", "{}"), ALICE, None, &config).is_err());
    }

    #[test]
    fn test_registry_state() {
        let config = CustodyConfig::default();
        assert!(check_ledger_state(&state("v5cIDs", r#"{"v5cs":null}"#), ALICE, None, &config).is_ok());
        assert!(check_ledger_state(&state("v5cIDs", "42"), ALICE, None, &config).is_err());
    }

    #[test]
    fn test_participant_self_registration() {
        let config = CustodyConfig::default();
        let profile = serde_json::to_vec(&ParticipantProfile {
            name: "bob".into(),
            affiliation: Affiliation::Shipper,
        })
        .unwrap();

        let key = config.participant_key(BOB);
        assert!(check_ledger_state(&state(&key, profile.clone()), BOB, None, &config).is_ok());
        assert!(check_ledger_state(&state(&key, profile), MALLORY, None, &config).is_err());
    }

    #[test]
    fn test_ecert_state() {
        let config = CustodyConfig::default();
        let key = config.ecert_key("alice");
        assert!(check_ledger_state(&state(&key, "cert"), ALICE, None, &config).is_ok());
        assert!(check_ledger_state(&state(&key, vec![0xff, 0xfe]), ALICE, None, &config).is_err());
        assert!(check_ledger_state(&state("ecert/", "cert"), ALICE, None, &config).is_err());
    }

    #[test]
    fn test_index_member_tag() {
        assert!(check_index_member(b"AB1234567").is_ok());
        assert!(check_index_member(b"participant/uhCAk").is_err());
        assert!(check_index_member(&[0xff, 0x00]).is_err());
    }

    #[test]
    fn test_deletions_are_invalid() {
        assert!(matches!(
            deletion_rejected("Ledger entries"),
            ValidateCallbackResult::Invalid(reason) if reason.contains("cannot be deleted")
        ));
    }
}
