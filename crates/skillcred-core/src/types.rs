use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Longest identifier accepted from callers.
pub const MAX_IDENTIFIER_LEN: usize = 256;

/// Domain separator mixed into every idempotency key.
const IDEMPOTENCY_DOMAIN: &str = "skillcred/issue/v1:";

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Wrap a raw identifier without validation.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Parse an identifier supplied by an external caller.
            pub fn parse(raw: &str) -> Result<Self, CoreError> {
                validate_identifier(stringify!($name), raw)?;
                Ok(Self(raw.to_string()))
            }

            /// Get the identifier string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Local identifier of a reviewed task submission.
    SubmissionId
);
string_id!(
    /// Global credential identifier assigned by the ledger.
    CredentialId
);
string_id!(
    /// Holder address or identity the credential is issued to.
    HolderId
);
string_id!(
    /// Address of the issuer that signs ledger writes.
    IssuerId
);
string_id!(
    /// Ledger transaction reference returned by a successful write.
    TxRef
);

fn validate_identifier(kind: &str, raw: &str) -> Result<(), CoreError> {
    if raw.trim().is_empty() {
        return Err(CoreError::InvalidIdentifier(format!("{} must not be empty", kind)));
    }
    if raw.len() > MAX_IDENTIFIER_LEN {
        return Err(CoreError::InvalidIdentifier(format!(
            "{} exceeds {} bytes",
            kind, MAX_IDENTIFIER_LEN
        )));
    }
    if raw.chars().any(|c| c.is_control()) {
        return Err(CoreError::InvalidIdentifier(format!(
            "{} contains control characters",
            kind
        )));
    }
    Ok(())
}

/// Deterministic key that lets the ledger recognize a retried issuance.
///
/// Derived only from the submission id, so every attempt for the same
/// submission carries the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Derive the key for a submission.
    pub fn for_submission(submission_id: &SubmissionId) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(IDEMPOTENCY_DOMAIN.as_bytes());
        hasher.update(submission_id.as_str().as_bytes());
        Self(hex::encode(hasher.finalize().as_bytes()))
    }

    /// Get the hex-encoded key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
