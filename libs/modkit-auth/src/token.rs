//! `AuthService` — bearer token verification (spec §4.6).
//!
//! Verifies signed, timed tokens and decodes claims. Does not check
//! permissions; that is `AuthorizationService`'s job.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use modkit_errors::ApiError;
use serde::{Deserialize, Serialize};

use crate::models::PlatformRole;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_role: Option<PlatformRole>,
    /// Expiry, seconds since epoch.
    pub exp: i64,
    /// Issued-at, seconds since epoch.
    pub iat: i64,
}

pub struct AuthService {
    signing_key: Vec<u8>,
    token_ttl_seconds: i64,
}

impl AuthService {
    #[must_use]
    pub fn new(signing_key: impl Into<Vec<u8>>, token_ttl_seconds: i64) -> Self {
        Self {
            signing_key: signing_key.into(),
            token_ttl_seconds,
        }
    }

    /// Issue a signed token for the given user, optionally scoped to a
    /// resolved tenant (spec §4.6 "Tenant resolution for login").
    ///
    /// # Errors
    /// Returns `ApiError::internal` if the token cannot be encoded.
    pub fn issue_token(
        &self,
        user_id: &str,
        tenant_id: Option<&str>,
        platform_role: Option<PlatformRole>,
    ) -> Result<String, ApiError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_owned(),
            tenant_id: tenant_id.map(ToOwned::to_owned),
            platform_role,
            exp: now + self.token_ttl_seconds,
            iat: now,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.signing_key),
        )
        .map_err(|e| ApiError::internal(format!("failed to sign token: {e}")))
    }

    /// Verify a bearer token and return its claims.
    ///
    /// # Errors
    /// Returns `ApiError::unauthenticated` if the token is malformed,
    /// unsigned by this service, or expired.
    pub fn verify_token(&self, token: &str) -> Result<Claims, ApiError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.signing_key),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| ApiError::unauthenticated(format!("invalid token: {e}")))
    }

    /// Extract the bearer token from an `Authorization` header value.
    #[must_use]
    pub fn extract_bearer(header_value: &str) -> Option<&str> {
        header_value.strip_prefix("Bearer ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_issue_and_verify() {
        let svc = AuthService::new(b"test-secret".to_vec(), 3600);
        let token = svc
            .issue_token("user-1", Some("tenant-1"), None)
            .expect("issue token");
        let claims = svc.verify_token(&token).expect("verify token");
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.tenant_id.as_deref(), Some("tenant-1"));
    }

    #[test]
    fn rejects_token_signed_with_different_key() {
        let svc_a = AuthService::new(b"secret-a".to_vec(), 3600);
        let svc_b = AuthService::new(b"secret-b".to_vec(), 3600);
        let token = svc_a.issue_token("user-1", None, None).expect("issue");
        assert!(svc_b.verify_token(&token).is_err());
    }

    #[test]
    fn extract_bearer_strips_prefix() {
        assert_eq!(AuthService::extract_bearer("Bearer abc123"), Some("abc123"));
        assert_eq!(AuthService::extract_bearer("abc123"), None);
    }
}
