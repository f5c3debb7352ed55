//! Scoped-token payload and revocation-entry data types.
//!
//! Signing, validation, and revocation bookkeeping live in `pg-credentials`
//! — this module holds only the wire-shape and the timestamps both that
//! crate and any external inspector need.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SCOPED_TOKEN_PREFIX: &str = "pgt_";
pub const MAX_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;

/// The signed payload embedded in a scoped token, serialized to canonical
/// JSON before HMAC-SHA256 signing (§4.3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopedTokenPayload {
    pub api_key: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A revoked token fingerprint (SHA-256 of the full token string).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevocationEntry {
    pub fingerprint: String,
    /// Copied from the token's own `expires_at` so the entry can be purged
    /// once it could no longer have been valid anyway.
    pub expires_at: DateTime<Utc>,
    pub revoked_at: DateTime<Utc>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Tagged outcome of `ScopedTokenMinter::validate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    Malformed,
    InvalidSignature,
    MalformedPayload,
    MissingRequiredFields,
    TokenExpired,
    TokenTtlExceeded,
    TokenRevoked,
}

impl TokenValidationError {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenValidationError::Malformed => "malformed",
            TokenValidationError::InvalidSignature => "invalid_signature",
            TokenValidationError::MalformedPayload => "malformed_payload",
            TokenValidationError::MissingRequiredFields => "missing_required_fields",
            TokenValidationError::TokenExpired => "token_expired",
            TokenValidationError::TokenTtlExceeded => "token_ttl_exceeded",
            TokenValidationError::TokenRevoked => "token_revoked",
        }
    }
}
