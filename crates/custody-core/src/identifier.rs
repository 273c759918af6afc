//! v5cID shape rules
//!
//! A v5cID is two ASCII letters followed by seven ASCII digits, e.g.
//! `AB1234567`. It is the ledger key of its container and never changes.

use std::sync::OnceLock;

use regex::Regex;

use crate::config::IdentifierPolicy;
use crate::error::{CustodyError, Result};

static ANCHORED: OnceLock<Regex> = OnceLock::new();
static PREFIX: OnceLock<Regex> = OnceLock::new();

fn pattern(policy: IdentifierPolicy) -> &'static Regex {
    match policy {
        IdentifierPolicy::Anchored => ANCHORED
            .get_or_init(|| Regex::new(r"^[A-Za-z]{2}[0-9]{7}$").expect("anchored v5cID pattern")),
        IdentifierPolicy::Prefix => PREFIX
            .get_or_init(|| Regex::new(r"^[A-Za-z]{2}[0-9]{7}").expect("prefix v5cID pattern")),
    }
}

pub fn is_valid_v5c_id(candidate: &str, policy: IdentifierPolicy) -> bool {
    pattern(policy).is_match(candidate)
}

pub fn validate_v5c_id(candidate: &str, policy: IdentifierPolicy) -> Result<()> {
    if is_valid_v5c_id(candidate, policy) {
        Ok(())
    } else {
        Err(CustodyError::InvalidIdentifier {
            v5c_id: candidate.to_string(),
        })
    }
}
