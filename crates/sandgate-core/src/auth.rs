//! Bearer-credential issue and verification.
//!
//! Credentials are stateless: the control plane never stores them, it only
//! verifies what clients present. The production implementation signs HS256
//! JWTs with the configured secret; tests substitute [`crate::fakes::StaticAuthority`].

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// How long an issued credential stays valid.
pub const CREDENTIAL_TTL_SECS: i64 = 3600;

/// A verified credential.
///
/// Exists only for the duration of the request or session that presented it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Identity the credential was issued to.
    pub subject: String,
    /// When the credential was issued.
    pub issued_at: DateTime<Utc>,
    /// When the credential stops verifying.
    pub expires_at: DateTime<Utc>,
}

/// Errors from credential verification or issue.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credential: {0}")]
    Invalid(String),

    #[error("credential expired")]
    Expired,
}

/// Issues and verifies bearer credentials.
///
/// Object-safe so the session manager and the façade can hold `Arc<dyn
/// CredentialAuthority>` and tests can swap in a static fake.
pub trait CredentialAuthority: Send + Sync {
    /// Issue a token for an identity, valid for [`CREDENTIAL_TTL_SECS`].
    fn issue(&self, subject: &str) -> Result<String, AuthError>;

    /// Verify a presented token and recover the credential it encodes.
    fn verify(&self, token: &str) -> Result<Credential, AuthError>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

/// HS256 JWT authority backed by a shared secret.
pub struct JwtAuthority {
    secret: String,
    ttl: Duration,
}

impl JwtAuthority {
    /// Authority with the standard one-hour credential lifetime.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ttl: Duration::seconds(CREDENTIAL_TTL_SECS),
        }
    }

    /// Authority with an explicit lifetime. Negative lifetimes produce
    /// already-expired tokens, which the tests rely on.
    pub fn with_ttl(secret: impl Into<String>, ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            ttl,
        }
    }

    fn credential_from_claims(claims: Claims) -> Credential {
        let issued_at = Utc
            .timestamp_opt(claims.iat, 0)
            .single()
            .unwrap_or_else(Utc::now);
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Credential {
            subject: claims.sub,
            issued_at,
            expires_at,
        }
    }
}

impl CredentialAuthority for JwtAuthority {
    fn issue(&self, subject: &str) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AuthError::Invalid(e.to_string()))
    }

    fn verify(&self, token: &str) -> Result<Credential, AuthError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::Invalid(e.to_string()),
        })?;

        Ok(Self::credential_from_claims(data.claims))
    }

    fn name(&self) -> &'static str {
        "jwt-hs256"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_then_verify_roundtrip() {
        let authority = JwtAuthority::new("test-secret");
        let token = authority.issue("alice").unwrap();
        let credential = authority.verify(&token).unwrap();

        assert_eq!(credential.subject, "alice");
        let lifetime = credential.expires_at - credential.issued_at;
        assert_eq!(lifetime.num_seconds(), CREDENTIAL_TTL_SECS);
    }

    #[test]
    fn tampered_token_rejected() {
        let authority = JwtAuthority::new("test-secret");
        let token = authority.issue("alice").unwrap();
        let mut tampered = token.clone();
        tampered.push('x');

        assert!(matches!(
            authority.verify(&tampered),
            Err(AuthError::Invalid(_))
        ));
    }

    #[test]
    fn wrong_secret_rejected() {
        let issuer = JwtAuthority::new("secret-a");
        let verifier = JwtAuthority::new("secret-b");
        let token = issuer.issue("alice").unwrap();

        assert!(matches!(verifier.verify(&token), Err(AuthError::Invalid(_))));
    }

    #[test]
    fn expired_token_rejected() {
        // Past the default 60s validation leeway.
        let authority = JwtAuthority::with_ttl("test-secret", Duration::seconds(-120));
        let token = authority.issue("alice").unwrap();

        assert!(matches!(authority.verify(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn garbage_token_rejected() {
        let authority = JwtAuthority::new("test-secret");
        assert!(authority.verify("not-a-jwt").is_err());
        assert!(authority.verify("").is_err());
    }
}
