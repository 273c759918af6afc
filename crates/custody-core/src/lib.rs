//! # custody-core - Container Custody Rules
//!
//! Business logic of the custody DNA: a shipping container is created by a
//! sender, handed to a shipper, then handed to a receiver. Each hand-over is
//! gated on the record's state, on who currently holds it, and on the
//! caller's role.
//!
//! The crate has no Holochain dependency. The coordinator zome supplies a
//! [`Ledger`] backed by the source chain and DHT and an [`IdentityResolver`]
//! backed by registered participant profiles; tests use [`MemoryLedger`] and
//! [`StaticIdentity`].
//!
//! ```rust,ignore
//! use custody_core::{Affiliation, CustodyConfig, CustodyProgram, MemoryLedger, Operation, StaticIdentity};
//!
//! let mut program = CustodyProgram::new(MemoryLedger::new(), CustodyConfig::default());
//! program.init(&[])?;
//!
//! let alice = StaticIdentity::new("alice", Affiliation::Sender);
//! program.invoke(&alice, Operation::CreateContainer { v5c_id: "AB1234567".into() })?;
//! program.invoke(&alice, Operation::SenderToShipper {
//!     v5c_id: "AB1234567".into(),
//!     recipient: "bob".into(),
//! })?;
//! ```
//!
//! ## Module Organization
//!
//! - [`container`] - Container record, lifecycle status, roles
//! - [`identifier`] - v5cID shape rules
//! - [`ledger`] - Key-value ledger seam and the in-memory ledger
//! - [`identity`] - Caller context, resolvers, participant directory
//! - [`store`] - Container records by v5cID
//! - [`registry`] - Append-only index of created v5cIDs
//! - [`custody`] - Creation, transfers, scalar updates
//! - [`query`] - Read-only projections and certificates
//! - [`operation`] - Typed calls and replies
//! - [`program`] - Per-transaction entry point

pub mod config;
pub mod container;
pub mod custody;
pub mod error;
pub mod identifier;
pub mod identity;
pub mod ledger;
pub mod operation;
pub mod program;
pub mod query;
pub mod registry;
pub mod store;

pub use config::{CustodyConfig, IdentifierPolicy};
pub use container::{Affiliation, Container, ContainerStatus, UNDEFINED_ID};
pub use custody::{ScalarField, Transfer};
pub use error::{CustodyError, ErrorKind, GuardMismatch, IdentityError, LedgerError, Result};
pub use identifier::{is_valid_v5c_id, validate_v5c_id};
pub use identity::{
    register_participant, CallerContext, DirectoryResolver, IdentityResolver, ParticipantProfile,
    StaticIdentity,
};
pub use ledger::{Ledger, MemoryLedger};
pub use operation::{Operation, Response, PING_REPLY};
pub use program::{CustodyProgram, EcertSeed};
pub use registry::Registry;
