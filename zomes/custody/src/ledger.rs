//! Ledger backed by the source chain and DHT
//!
//! Each put commits a LedgerState chained to the key's current state and
//! links it from the key's anchor. A read walks that chain from its root,
//! taking the first-committed successor at every step, so concurrent writers
//! can fork a key but every agent resolves the same head.
//!
//! Indexes are native: one IndexToMember link per member, tagged with the
//! member, so appends from different agents never replace each other.

use custody_core::{Ledger, LedgerError};
use custody_integrity::*;
use hdk::prelude::*;

pub struct HdkLedger;

fn anchor_hash(key: &str) -> ExternResult<EntryHash> {
    hash_entry(&EntryTypes::StringAnchor(StringAnchor::ledger_key(key)))
}

fn index_hash(key: &str) -> ExternResult<EntryHash> {
    hash_entry(&EntryTypes::StringAnchor(StringAnchor::ledger_index(key)))
}

fn read_error(key: &str, err: WasmError) -> LedgerError {
    LedgerError::Read {
        key: key.to_string(),
        reason: format!("{:?}", err),
    }
}

fn write_error(key: &str, err: WasmError) -> LedgerError {
    LedgerError::Write {
        key: key.to_string(),
        reason: format!("{:?}", err),
    }
}

/// Links ordered by commit time; ties go to the smaller link hash so every
/// agent sees the same order.
fn ordered_links(base: EntryHash, link_type: LinkTypes) -> ExternResult<Vec<Link>> {
    let query = LinkQuery::try_new(base, link_type)?;
    let mut links = get_links(query, GetStrategy::default())?;
    links.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.create_link_hash.cmp(&b.create_link_hash))
    });
    Ok(links)
}

impl HdkLedger {
    /// Every state linked from the key's anchor, in link order
    fn states(key: &str) -> ExternResult<Vec<(ActionHash, LedgerState)>> {
        let mut states = Vec::new();

        for link in ordered_links(anchor_hash(key)?, LinkTypes::KeyToState)? {
            let action_hash = link.target.into_action_hash().ok_or_else(|| {
                wasm_error!(WasmErrorInner::Guest(format!(
                    "Ledger link for '{}' does not point at an action",
                    key
                )))
            })?;

            // A linked state that can't be fetched yet is a failed read, not absence
            let record = get(action_hash.clone(), GetOptions::default())?.ok_or_else(|| {
                wasm_error!(WasmErrorInner::Guest(format!(
                    "Ledger state for '{}' is not yet available",
                    key
                )))
            })?;

            let state = record
                .entry()
                .to_app_option::<LedgerState>()
                .map_err(|e| wasm_error!(e))?
                .ok_or_else(|| {
                    wasm_error!(WasmErrorInner::Guest(format!(
                        "Ledger link for '{}' does not point at a LedgerState",
                        key
                    )))
                })?;

            if state.key == key {
                states.push((action_hash, state));
            }
        }

        Ok(states)
    }

    /// Current state of a key: the first root, then the first successor of
    /// each state until none is left.
    fn head(key: &str) -> ExternResult<Option<(ActionHash, LedgerState)>> {
        let states = Self::states(key)?;

        let mut head = match states.iter().find(|(_, state)| state.previous.is_none()) {
            Some(root) => root,
            None if states.is_empty() => return Ok(None),
            None => {
                return Err(wasm_error!(WasmErrorInner::Guest(format!(
                    "First state of '{}' is not yet available",
                    key
                ))))
            }
        };

        for _ in 0..states.len() {
            match states
                .iter()
                .find(|(_, state)| state.previous.as_ref() == Some(&head.0))
            {
                Some(next) => head = next,
                None => break,
            }
        }

        Ok(Some(head.clone()))
    }

    fn write(key: &str, value: &[u8]) -> ExternResult<ActionHash> {
        let previous = Self::head(key)?.map(|(action_hash, _)| action_hash);
        let state = LedgerState {
            key: key.to_string(),
            value: value.to_vec(),
            previous,
        };
        let action_hash = create_entry(&EntryTypes::LedgerState(state))?;
        create_link(anchor_hash(key)?, action_hash.clone(), LinkTypes::KeyToState, ())?;
        Ok(action_hash)
    }

    fn members(key: &str) -> ExternResult<Vec<String>> {
        ordered_links(index_hash(key)?, LinkTypes::IndexToMember)?
            .into_iter()
            .map(|link| {
                String::from_utf8(link.tag.0).map_err(|_| {
                    wasm_error!(WasmErrorInner::Guest(format!(
                        "Index '{}' has a member that is not UTF-8",
                        key
                    )))
                })
            })
            .collect()
    }

    fn add_member(key: &str, member: &str) -> ExternResult<ActionHash> {
        create_link(
            index_hash(key)?,
            anchor_hash(member)?,
            LinkTypes::IndexToMember,
            LinkTag::new(member.as_bytes()),
        )
    }
}

impl Ledger for HdkLedger {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        Self::head(key)
            .map(|head| head.map(|(_, state)| state.value))
            .map_err(|e| read_error(key, e))
    }

    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), LedgerError> {
        let action_hash = Self::write(key, value).map_err(|e| write_error(key, e))?;
        debug!(key, %action_hash, "ledger state committed");
        Ok(())
    }

    fn index_members(&self, key: &str) -> Result<Option<Vec<String>>, LedgerError> {
        Self::members(key).map(Some).map_err(|e| read_error(key, e))
    }

    fn index_append(&mut self, key: &str, member: &str) -> Result<(), LedgerError> {
        let link_hash = Self::add_member(key, member).map_err(|e| write_error(key, e))?;
        debug!(key, member, %link_hash, "index member linked");
        Ok(())
    }
}
