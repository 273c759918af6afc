//! Caller identity
//!
//! Every operation except `ping` runs on behalf of a resolved caller. The
//! resolver is supplied by the runtime binding; this module only defines the
//! seam, a fixed resolver and the participant directory the Holochain binding
//! resolves agents through.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CustodyConfig;
use crate::container::Affiliation;
use crate::error::IdentityError;
use crate::ledger::Ledger;

/// Who is calling and in which role. Passed explicitly into every operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    pub name: String,
    pub affiliation: Affiliation,
}

impl CallerContext {
    pub fn new(name: impl Into<String>, affiliation: Affiliation) -> Self {
        Self {
            name: name.into(),
            affiliation,
        }
    }

    pub fn is_sender(&self) -> bool {
        self.affiliation == Affiliation::Sender
    }
}

/// Resolves the caller of the current invocation.
pub trait IdentityResolver {
    fn resolve(&self) -> Result<CallerContext, IdentityError>;
}

/// Resolver that always answers with the same caller, or with a missing
/// credential when built anonymous.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    caller: Option<CallerContext>,
}

impl StaticIdentity {
    pub fn new(name: impl Into<String>, affiliation: Affiliation) -> Self {
        Self {
            caller: Some(CallerContext::new(name, affiliation)),
        }
    }

    pub fn anonymous() -> Self {
        Self { caller: None }
    }
}

impl IdentityResolver for StaticIdentity {
    fn resolve(&self) -> Result<CallerContext, IdentityError> {
        self.caller.clone().ok_or(IdentityError::MissingCredential)
    }
}

/// Display name and declared role an agent registered under.
///
/// The name is a label only and need not be unique; the directory identifies
/// callers by agent key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantProfile {
    pub name: String,
    pub affiliation: Affiliation,
}

/// Store `profile` as the identity of `agent`, replacing any earlier one.
pub fn register_participant<L: Ledger + ?Sized>(
    ledger: &mut L,
    config: &CustodyConfig,
    agent: &str,
    profile: &ParticipantProfile,
) -> Result<(), IdentityError> {
    let key = config.participant_key(agent);
    let bytes = serde_json::to_vec(profile).map_err(|e| IdentityError::CorruptProfile {
        agent: agent.to_string(),
        reason: e.to_string(),
    })?;
    ledger.put(&key, &bytes)?;
    debug!(agent, name = %profile.name, affiliation = %profile.affiliation, "participant registered");
    Ok(())
}

/// Resolves an agent key through profiles stored in the ledger.
///
/// The resolved caller name is the agent key itself, so record ownership is
/// bound to the agent and two agents registering the same display name stay
/// distinct.
pub struct DirectoryResolver<'a, L: Ledger + ?Sized> {
    ledger: &'a L,
    config: &'a CustodyConfig,
    agent: Option<String>,
}

impl<'a, L: Ledger + ?Sized> DirectoryResolver<'a, L> {
    pub fn new(ledger: &'a L, config: &'a CustodyConfig, agent: Option<String>) -> Self {
        Self {
            ledger,
            config,
            agent,
        }
    }

    pub fn profile(&self, agent: &str) -> Result<Option<ParticipantProfile>, IdentityError> {
        let key = self.config.participant_key(agent);
        let bytes = match self.ledger.get(&key)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| IdentityError::CorruptProfile {
                agent: agent.to_string(),
                reason: e.to_string(),
            })
    }
}

impl<L: Ledger + ?Sized> IdentityResolver for DirectoryResolver<'_, L> {
    fn resolve(&self) -> Result<CallerContext, IdentityError> {
        let agent = self.agent.as_deref().ok_or(IdentityError::MissingCredential)?;
        let profile = self
            .profile(agent)?
            .ok_or_else(|| IdentityError::MissingAttribute {
                attribute: "username".to_string(),
            })?;
        Ok(CallerContext::new(agent, profile.affiliation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;

    #[test]
    fn test_static_identity() {
        let resolver = StaticIdentity::new("alice", Affiliation::Sender);
        let caller = resolver.resolve().unwrap();
        assert_eq!(caller.name, "alice");
        assert!(caller.is_sender());

        assert_eq!(
            StaticIdentity::anonymous().resolve(),
            Err(IdentityError::MissingCredential)
        );
    }

    #[test]
    fn test_directory_resolves_registered_agent() {
        let config = CustodyConfig::default();
        let mut ledger = MemoryLedger::new();
        let profile = ParticipantProfile {
            name: "bob".into(),
            affiliation: Affiliation::Shipper,
        };
        register_participant(&mut ledger, &config, "uhCAkbob", &profile).unwrap();

        let resolver = DirectoryResolver::new(&ledger, &config, Some("uhCAkbob".into()));
        let caller = resolver.resolve().unwrap();
        assert_eq!(caller, CallerContext::new("uhCAkbob", Affiliation::Shipper));
        assert_eq!(resolver.profile("uhCAkbob").unwrap(), Some(profile));
    }

    #[test]
    fn test_shared_display_name_resolves_to_distinct_callers() {
        let config = CustodyConfig::default();
        let mut ledger = MemoryLedger::new();
        let alice = ParticipantProfile {
            name: "alice".into(),
            affiliation: Affiliation::Sender,
        };
        register_participant(&mut ledger, &config, "uhCAkalice", &alice).unwrap();
        register_participant(&mut ledger, &config, "uhCAkmallory", &alice).unwrap();

        let first = DirectoryResolver::new(&ledger, &config, Some("uhCAkalice".into()))
            .resolve()
            .unwrap();
        let second = DirectoryResolver::new(&ledger, &config, Some("uhCAkmallory".into()))
            .resolve()
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(second.name, "uhCAkmallory");
    }

    #[test]
    fn test_directory_rejects_unknown_agent() {
        let config = CustodyConfig::default();
        let ledger = MemoryLedger::new();

        let resolver = DirectoryResolver::new(&ledger, &config, Some("uhCAkeve".into()));
        assert!(matches!(
            resolver.resolve(),
            Err(IdentityError::MissingAttribute { .. })
        ));

        let anonymous = DirectoryResolver::new(&ledger, &config, None);
        assert_eq!(anonymous.resolve(), Err(IdentityError::MissingCredential));
    }

    #[test]
    fn test_directory_surfaces_read_failure() {
        let config = CustodyConfig::default();
        let mut ledger = MemoryLedger::new();
        ledger.fail_reads(&config.participant_key("uhCAkbob"));

        let resolver = DirectoryResolver::new(&ledger, &config, Some("uhCAkbob".into()));
        assert!(matches!(resolver.resolve(), Err(IdentityError::Directory(_))));
    }

    #[test]
    fn test_directory_reports_corrupt_profile() {
        let config = CustodyConfig::default();
        let mut ledger = MemoryLedger::new();
        ledger.insert_raw(&config.participant_key("uhCAkbob"), "not json");

        let resolver = DirectoryResolver::new(&ledger, &config, Some("uhCAkbob".into()));
        assert!(matches!(
            resolver.resolve(),
            Err(IdentityError::CorruptProfile { .. })
        ));
    }
}
