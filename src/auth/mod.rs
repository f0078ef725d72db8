//! # Discovery Request Authentication
//!
//! Every discovery call carries an opaque token in the node metadata under
//! the configured payload key. The token is a Fernet ciphertext (AES-CBC +
//! HMAC); decryption walks the ordered key list and the first key that
//! verifies wins, which lets operators rotate keys without a flag day. The
//! decrypted plaintext must parse as a JSON mapping whose fields satisfy the
//! configured claim predicates.
//!
//! Authentication runs before any source or template work on the request
//! path, and failure details are never echoed to the client.

use std::collections::BTreeMap;

use fernet::Fernet;

use crate::config::Settings;
use crate::discovery::types::DiscoveryRequest;
use crate::errors::{AuthErrorType, HeadwaterError, Result};

pub struct AuthValidator {
    enabled: bool,
    payload_key: String,
    keys: Vec<Fernet>,
    required_claims: BTreeMap<String, Vec<String>>,
    token_ttl_seconds: Option<u64>,
}

impl AuthValidator {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut keys = Vec::with_capacity(settings.encryption_keys.len());
        if settings.auth_enabled {
            for (index, key) in settings.encryption_keys.iter().enumerate() {
                let fernet = Fernet::new(key).ok_or_else(|| {
                    HeadwaterError::config(format!(
                        "Encryption key #{} is not a valid Fernet key",
                        index
                    ))
                })?;
                keys.push(fernet);
            }
            if keys.is_empty() {
                return Err(HeadwaterError::config(
                    "auth_enabled requires at least one encryption key",
                ));
            }
        }

        Ok(Self {
            enabled: settings.auth_enabled,
            payload_key: settings.auth_payload_key.clone(),
            keys,
            required_claims: settings.auth_required_claims.clone(),
            token_ttl_seconds: settings.auth_token_ttl_seconds,
        })
    }

    /// Validate one discovery request. A disabled validator accepts
    /// everything.
    pub fn authenticate(&self, request: &DiscoveryRequest) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let token = request
            .node
            .metadata
            .get(&self.payload_key)
            .and_then(|value| value.as_str())
            .ok_or_else(|| {
                HeadwaterError::auth(
                    format!("Node metadata is missing '{}'", self.payload_key),
                    AuthErrorType::MissingToken,
                )
            })?;

        let plaintext = self.decrypt(token)?;

        let claims: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(&plaintext).map_err(|_| {
                HeadwaterError::auth(
                    "Decrypted token payload is not a mapping",
                    AuthErrorType::InvalidClaims,
                )
            })?;

        for (field, allowed) in &self.required_claims {
            let value = claims.get(field).ok_or_else(|| {
                HeadwaterError::auth(
                    format!("Token payload is missing claim '{}'", field),
                    AuthErrorType::InvalidClaims,
                )
            })?;
            if !allowed.is_empty() {
                let value = value.as_str().unwrap_or_default();
                if !allowed.iter().any(|candidate| candidate == value) {
                    return Err(HeadwaterError::auth(
                        format!("Claim '{}' has a disallowed value", field),
                        AuthErrorType::InvalidClaims,
                    ));
                }
            }
        }
        Ok(())
    }

    /// First key that verifies wins; expired tokens fail even when the
    /// signature checks out.
    fn decrypt(&self, token: &str) -> Result<Vec<u8>> {
        for key in &self.keys {
            let decrypted = match self.token_ttl_seconds {
                Some(ttl) => key.decrypt_with_ttl(token, ttl),
                None => key.decrypt(token),
            };
            if let Ok(plaintext) = decrypted {
                return Ok(plaintext);
            }
        }
        Err(HeadwaterError::auth(
            "Token did not verify against any configured key",
            AuthErrorType::InvalidToken,
        ))
    }
}
