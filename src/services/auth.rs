//! Connection gate: verifies the signed credential presented at upgrade.
//!
//! ARCHITECTURE
//! ============
//! Credentials are issued elsewhere (the account service); this module only
//! checks them. A credential is an HS256 JWT carrying the user id and display
//! name. Verification runs once per connection, before the websocket upgrade,
//! so a rejected client never reaches room logic.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by a connection credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Stable user identifier.
    #[serde(alias = "id", alias = "userId")]
    pub sub: String,
    /// Name shown to other participants.
    #[serde(default, alias = "username", alias = "displayName")]
    pub name: String,
    /// Expiry, seconds since Unix epoch.
    pub exp: u64,
}

/// Authenticated identity attached to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("credential missing")]
    Missing,
    #[error("credential expired")]
    Expired,
    #[error("credential invalid: {0}")]
    Invalid(String),
}

/// Verifies connection credentials against a shared secret.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self { key: DecodingKey::from_secret(secret.as_bytes()), validation: Validation::new(Algorithm::HS256) }
    }

    /// Verify signature and expiry, returning the identity on success.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Missing`] for an empty credential,
    /// [`AuthError::Expired`] past `exp`, and [`AuthError::Invalid`] for
    /// anything else (bad signature, malformed token, empty subject).
    pub fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::Missing);
        }

        let data = jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::Invalid(e.to_string()),
        })?;

        let claims = data.claims;
        if claims.sub.trim().is_empty() {
            return Err(AuthError::Invalid("empty subject".into()));
        }
        let display_name = if claims.name.trim().is_empty() { claims.sub.clone() } else { claims.name };
        Ok(Identity { user_id: claims.sub, display_name })
    }
}

/// Pull the bearer credential out of an `Authorization` header value.
#[must_use]
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
pub(crate) fn sign_for_tests(secret: &str, user_id: &str, name: &str, exp: u64) -> String {
    let claims = Claims { sub: user_id.into(), name: name.into(), exp };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(Algorithm::HS256),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("test token should encode")
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
