//! Ledger accessor seam
//!
//! The runtime owns durable state. This program only sees opaque byte values
//! under string keys, with atomicity per key and nothing more.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::LedgerError;

/// Key-value view of the ledger supplied by the invoking runtime.
///
/// `get` distinguishes a missing key (`Ok(None)`) from a failed read
/// (`Err`); callers must not treat the latter as absence.
pub trait Ledger {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError>;

    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), LedgerError>;

    /// Write `value` only if the current value equals `expected`.
    ///
    /// Returns `Ok(false)` when the current value differs. The default is a
    /// read-compare-write and is only atomic where the runtime serializes
    /// writers to `key`.
    fn compare_and_swap(
        &mut self,
        key: &str,
        expected: Option<&[u8]>,
        value: &[u8],
    ) -> Result<bool, LedgerError> {
        let current = self.get(key)?;
        if current.as_deref() != expected {
            return Ok(false);
        }
        self.put(key, value)?;
        Ok(true)
    }

    /// Members of the native append-only index at `key`, in append order.
    ///
    /// `Ok(None)` means this ledger has no native indexes and lists are kept
    /// as single values under compare-and-swap.
    fn index_members(&self, _key: &str) -> Result<Option<Vec<String>>, LedgerError> {
        Ok(None)
    }

    /// Add `member` to the native index at `key`. Appends from different
    /// writers commute; none replaces another.
    fn index_append(&mut self, key: &str, _member: &str) -> Result<(), LedgerError> {
        Err(LedgerError::Write {
            key: key.to_string(),
            reason: "ledger keeps no native indexes".to_string(),
        })
    }
}

/// In-process ledger with failure injection.
#[derive(Debug, Default, Clone)]
pub struct MemoryLedger {
    entries: BTreeMap<String, Vec<u8>>,
    failing_reads: HashSet<String>,
    failing_writes: HashSet<String>,
    lost_races: HashMap<String, u32>,
    writes: usize,
    native_indexes: bool,
    indexes: BTreeMap<String, Vec<String>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger that keeps append-only indexes natively, one member per entry,
    /// the way the DHT binding does
    pub fn with_native_indexes() -> Self {
        Self {
            native_indexes: true,
            ..Self::default()
        }
    }

    /// Reads of `key` fail until cleared
    pub fn fail_reads(&mut self, key: &str) {
        self.failing_reads.insert(key.to_string());
    }

    /// Writes to `key` fail until cleared
    pub fn fail_writes(&mut self, key: &str) {
        self.failing_writes.insert(key.to_string());
    }

    pub fn clear_failures(&mut self) {
        self.failing_reads.clear();
        self.failing_writes.clear();
        self.lost_races.clear();
    }

    /// The next `times` compare-and-swaps on `key` behave as if another
    /// writer got there first
    pub fn lose_races(&mut self, key: &str, times: u32) {
        self.lost_races.insert(key.to_string(), times);
    }

    /// Raw access for tests that plant corrupt bytes
    pub fn insert_raw(&mut self, key: &str, value: impl Into<Vec<u8>>) {
        self.entries.insert(key.to_string(), value.into());
    }

    pub fn raw(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.writes
    }
}

impl Ledger for MemoryLedger {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        if self.failing_reads.contains(key) {
            return Err(LedgerError::Read {
                key: key.to_string(),
                reason: "injected read failure".to_string(),
            });
        }
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), LedgerError> {
        if self.failing_writes.contains(key) {
            return Err(LedgerError::Write {
                key: key.to_string(),
                reason: "injected write failure".to_string(),
            });
        }
        self.entries.insert(key.to_string(), value.to_vec());
        self.writes += 1;
        Ok(())
    }

    fn compare_and_swap(
        &mut self,
        key: &str,
        expected: Option<&[u8]>,
        value: &[u8],
    ) -> Result<bool, LedgerError> {
        if let Some(remaining) = self.lost_races.get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(false);
            }
        }
        let current = self.get(key)?;
        if current.as_deref() != expected {
            return Ok(false);
        }
        self.put(key, value)?;
        Ok(true)
    }

    fn index_members(&self, key: &str) -> Result<Option<Vec<String>>, LedgerError> {
        if !self.native_indexes {
            return Ok(None);
        }
        if self.failing_reads.contains(key) {
            return Err(LedgerError::Read {
                key: key.to_string(),
                reason: "injected read failure".to_string(),
            });
        }
        Ok(Some(self.indexes.get(key).cloned().unwrap_or_default()))
    }

    fn index_append(&mut self, key: &str, member: &str) -> Result<(), LedgerError> {
        if !self.native_indexes || self.failing_writes.contains(key) {
            return Err(LedgerError::Write {
                key: key.to_string(),
                reason: "index append refused".to_string(),
            });
        }
        self.indexes
            .entry(key.to_string())
            .or_default()
            .push(member.to_string());
        self.writes += 1;
        Ok(())
    }
}
