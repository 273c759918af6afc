//! Error types for custody operations
//!
//! Every failure is terminal for the invocation that raised it. Nothing is
//! retried here and no partial write is left behind by a guard failure.

use std::fmt;

use thiserror::Error;

/// Result type for custody operations
pub type Result<T> = std::result::Result<T, CustodyError>;

/// Failure of the underlying key-value ledger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The ledger could not be read at `key`
    #[error("ledger read failed for key '{key}': {reason}")]
    Read { key: String, reason: String },

    /// The ledger refused a write at `key`
    #[error("ledger write failed for key '{key}': {reason}")]
    Write { key: String, reason: String },
}

/// Failure to establish who is calling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// No credential was presented with the call
    #[error("caller credential is missing")]
    MissingCredential,

    /// A credential was presented but lacks a required attribute
    #[error("caller credential has no '{attribute}' attribute")]
    MissingAttribute { attribute: String },

    /// The stored participant profile could not be decoded
    #[error("participant profile for '{agent}' is corrupt: {reason}")]
    CorruptProfile { agent: String, reason: String },

    /// Reading the participant directory failed
    #[error("participant directory unavailable: {0}")]
    Directory(#[from] LedgerError),
}

/// One guard that did not hold, for permission-denied reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardMismatch {
    pub field: &'static str,
    pub expected: String,
    pub actual: String,
}

impl GuardMismatch {
    pub fn new(field: &'static str, expected: impl ToString, actual: impl ToString) -> Self {
        Self {
            field,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

impl fmt::Display for GuardMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} expected '{}' got '{}'", self.field, self.expected, self.actual)
    }
}

struct Mismatches<'a>(&'a [GuardMismatch]);

impl fmt::Display for Mismatches<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, mismatch) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", mismatch)?;
        }
        Ok(())
    }
}

/// Broad classes of failure a caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    Permission,
    Storage,
    NotFound,
    Identity,
    Dispatch,
}

/// Custody error types
#[derive(Error, Debug)]
pub enum CustodyError {
    /// Identifier does not have the required shape
    #[error("Invalid v5cID provided: '{v5c_id}'")]
    InvalidIdentifier { v5c_id: String },

    /// Scalar input could not be parsed for its field
    #[error("Invalid value passed for new {field}: '{value}'")]
    InvalidValue { field: &'static str, value: String },

    /// A record already exists under this identifier
    #[error("Container already exists: {v5c_id}")]
    AlreadyExists { v5c_id: String },

    /// A guard on ownership, state or affiliation failed
    #[error("Permission Denied. {operation}. {}", Mismatches(.mismatches))]
    PermissionDenied {
        operation: &'static str,
        mismatches: Vec<GuardMismatch>,
    },

    /// No record exists under this identifier
    #[error("Container not found: {v5c_id}")]
    NotFound { v5c_id: String },

    /// Certificate lookup for an unknown identity
    #[error("No ecert stored for user {name}")]
    EcertNotFound { name: String },

    /// Stored bytes under `key` do not decode
    #[error("Corrupt record at '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    /// Encoding a record for storage failed
    #[error("Error converting record for '{key}': {reason}")]
    Encode { key: String, reason: String },

    /// Optimistic registry append lost every race it entered
    #[error("Registry append for {v5c_id} gave up after {attempts} contended attempts")]
    RegistryContention { v5c_id: String, attempts: u32 },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Error retrieving caller information: {0}")]
    Identity(#[from] IdentityError),

    /// Call named a function this program does not expose
    #[error("Received unknown function invocation {function}")]
    UnknownFunction { function: String },

    /// Call omitted a positional argument
    #[error("Incorrect number of arguments passed to {function}: expected {expected}, got {actual}")]
    MissingArgument {
        function: String,
        expected: usize,
        actual: usize,
    },
}

impl CustodyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidIdentifier { .. } | Self::InvalidValue { .. } => ErrorKind::Validation,
            Self::AlreadyExists { .. } => ErrorKind::Conflict,
            Self::PermissionDenied { .. } => ErrorKind::Permission,
            Self::NotFound { .. } | Self::EcertNotFound { .. } => ErrorKind::NotFound,
            Self::Corrupt { .. }
            | Self::Encode { .. }
            | Self::RegistryContention { .. }
            | Self::Ledger(_) => ErrorKind::Storage,
            Self::Identity(_) => ErrorKind::Identity,
            Self::UnknownFunction { .. } | Self::MissingArgument { .. } => ErrorKind::Dispatch,
        }
    }

    pub(crate) fn corrupt(key: &str, err: impl fmt::Display) -> Self {
        Self::Corrupt {
            key: key.to_string(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn encode(key: &str, err: impl fmt::Display) -> Self {
        Self::Encode {
            key: key.to_string(),
            reason: err.to_string(),
        }
    }
}
