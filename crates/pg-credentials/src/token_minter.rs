//! `ScopedTokenMinter` — issues, validates, and revokes short-lived
//! HMAC-signed tokens that delegate from a parent API key.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use pg_domain::token::{
    RevocationEntry, ScopedTokenPayload, TokenValidationError, MAX_TOKEN_TTL_SECONDS,
    SCOPED_TOKEN_PREFIX,
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct MintOptions {
    pub api_key: String,
    pub ttl_seconds: i64,
    pub allowed_tools: Option<Vec<String>>,
    pub label: Option<String>,
}

/// Result of a successful [`ScopedTokenMinter::validate`] call.
#[derive(Debug, Clone)]
pub struct ValidatedToken {
    pub payload: ScopedTokenPayload,
    pub fingerprint: String,
}

pub struct ScopedTokenMinter {
    secret: Vec<u8>,
    revocations: RwLock<Vec<RevocationEntry>>,
}

impl ScopedTokenMinter {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            revocations: RwLock::new(Vec::new()),
        }
    }

    fn sign(&self, payload_bytes: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("hmac accepts any key length");
        mac.update(payload_bytes);
        mac.finalize().into_bytes().to_vec()
    }

    pub fn create(&self, opts: MintOptions) -> String {
        let issued_at = Utc::now();
        let ttl = opts.ttl_seconds.min(MAX_TOKEN_TTL_SECONDS).max(0);
        let expires_at = issued_at + Duration::seconds(ttl);

        let payload = ScopedTokenPayload {
            api_key: opts.api_key,
            issued_at,
            expires_at,
            allowed_tools: opts.allowed_tools,
            label: opts.label,
        };

        // Canonical JSON: `serde_json::Value`'s `Map` is BTreeMap-backed by
        // default (no `preserve_order`), so keys serialize sorted.
        let canonical = serde_json::to_vec(&payload).expect("payload always serializes");
        let payload_b64 = URL_SAFE_NO_PAD.encode(&canonical);
        let sig = self.sign(payload_b64.as_bytes());
        let sig_b64 = URL_SAFE_NO_PAD.encode(&sig);

        format!("{SCOPED_TOKEN_PREFIX}{payload_b64}.{sig_b64}")
    }

    pub fn validate(&self, token: &str) -> Result<ValidatedToken, TokenValidationError> {
        let body = token
            .strip_prefix(SCOPED_TOKEN_PREFIX)
            .ok_or(TokenValidationError::Malformed)?;
        let mut parts = body.splitn(2, '.');
        let (payload_b64, sig_b64) = match (parts.next(), parts.next(), parts.next()) {
            (Some(p), Some(s), None) if !p.is_empty() && !s.is_empty() => (p, s),
            _ => return Err(TokenValidationError::Malformed),
        };

        let expected_sig = self.sign(payload_b64.as_bytes());
        let provided_sig = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| TokenValidationError::InvalidSignature)?;
        if !bool::from(expected_sig.ct_eq(&provided_sig)) {
            return Err(TokenValidationError::InvalidSignature);
        }

        let payload_bytes = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| TokenValidationError::MalformedPayload)?;
        let payload: ScopedTokenPayload =
            serde_json::from_slice(&payload_bytes).map_err(|_| TokenValidationError::MalformedPayload)?;

        if payload.api_key.is_empty() {
            return Err(TokenValidationError::MissingRequiredFields);
        }

        let now = Utc::now();
        if now >= payload.expires_at {
            return Err(TokenValidationError::TokenExpired);
        }
        if payload.expires_at - payload.issued_at > Duration::seconds(MAX_TOKEN_TTL_SECONDS) {
            return Err(TokenValidationError::TokenTtlExceeded);
        }

        let fingerprint = Self::fingerprint(token);
        if self.is_revoked(&fingerprint) {
            return Err(TokenValidationError::TokenRevoked);
        }

        Ok(ValidatedToken { payload, fingerprint })
    }

    pub fn fingerprint(token: &str) -> String {
        hex::encode(Sha256::digest(token.as_bytes()))
    }

    fn is_revoked(&self, fingerprint: &str) -> bool {
        self.revocations.read().iter().any(|e| e.fingerprint == fingerprint)
    }

    /// Validates the token's own signature and TTL invariants before
    /// recording a revocation, so arbitrary strings cannot pollute the
    /// revocation list.
    pub fn revoke_token(&self, token: &str, reason: Option<String>) -> Result<(), TokenValidationError> {
        let validated = match self.validate(token) {
            Ok(v) => v,
            Err(TokenValidationError::TokenRevoked) => {
                // Already revoked: idempotent no-op, not an error.
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        self.revocations.write().push(RevocationEntry {
            fingerprint: validated.fingerprint,
            expires_at: validated.payload.expires_at,
            revoked_at: Utc::now(),
            reason,
        });
        Ok(())
    }

    /// Drops revocation entries whose embedded `expiresAt` has passed —
    /// the token could not have validated anyway, so retaining the entry
    /// serves no purpose.
    pub fn purge_expired_revocations(&self) -> usize {
        let now = Utc::now();
        let mut revocations = self.revocations.write();
        let before = revocations.len();
        revocations.retain(|e| e.expires_at > now);
        before - revocations.len()
    }

    pub fn revocation_count(&self) -> usize {
        self.revocations.read().len()
    }

    pub fn all_revocations(&self) -> Vec<RevocationEntry> {
        self.revocations.read().clone()
    }

    pub fn restore_revocations(&self, entries: Vec<RevocationEntry>) {
        *self.revocations.write() = entries;
    }
}

/// Constant-time HMAC verification exposed for inbound verification tests
/// elsewhere in the system.
pub fn verify_hmac_constant_time(secret: &[u8], message: &[u8], signature_hex: &str) -> bool {
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(message);
    let expected = mac.finalize().into_bytes();
    match hex::decode(signature_hex) {
        Ok(provided) => bool::from(expected.ct_eq(&provided)),
        Err(_) => false,
    }
}
