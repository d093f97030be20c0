/// Access Token Signing and Verification
///
/// Access tokens are HS256 JWTs. Verification is self-contained: no storage
/// lookup happens, so a token stays valid until it expires even if the
/// session behind it was revoked. The access TTL is kept short for that
/// reason.

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::AccessClaims;
use crate::configuration::JwtSettings;
use crate::error::AuthError;

/// The only algorithm tokens are signed with or accepted in.
pub const ALGORITHM: Algorithm = Algorithm::HS256;

/// Clock skew tolerated on `iat` and `exp`, in seconds.
pub const LEEWAY_SECONDS: i64 = 5;

/// A freshly signed token and the moment it stops being valid.
#[derive(Clone)]
pub struct SignedAccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Identity proven by a verified access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub user_id: Uuid,
    pub email: String,
}

#[derive(Clone)]
pub struct AccessTokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: Vec<String>,
    ttl: chrono::Duration,
}

impl AccessTokenCodec {
    pub fn new(config: &JwtSettings) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            ttl: config.access_ttl(),
        }
    }

    /// Sign a new access token for a user, valid from `now` for the
    /// configured access TTL.
    ///
    /// # Errors
    /// Only library-level signing failures, reported as `Internal`.
    pub fn sign(
        &self,
        user_id: Uuid,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<SignedAccessToken, AuthError> {
        let claims = AccessClaims::new(user_id, email, &self.issuer, &self.audience, now, self.ttl);

        let token = encode(&Header::new(ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| AuthError::internal("sign_access_token", e))?;

        Ok(SignedAccessToken {
            token,
            expires_at: now + self.ttl,
        })
    }

    pub fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a token as of `now`
    ///
    /// Checks, in order: algorithm, issuer, audience, signature, subject
    /// shape, then `iat`/`exp` with `LEEWAY_SECONDS` of skew. Only the
    /// expiry check yields `TokenExpired`; everything else is
    /// `InvalidToken`.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<VerifiedIdentity, AuthError> {
        let mut validation = Validation::new(ALGORITHM);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&self.audience);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "aud", "sub"]);
        // Time claims are checked below against `now`.
        validation.validate_exp = false;

        let claims = decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Access token rejected");
                match e.kind() {
                    ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                    _ => AuthError::InvalidToken,
                }
            })?;

        let user_id = claims.user_id()?;

        let now = now.timestamp();
        if claims.iat > now + LEEWAY_SECONDS {
            tracing::debug!(user_id = %user_id, "Access token issued in the future");
            return Err(AuthError::InvalidToken);
        }
        if claims.exp < now - LEEWAY_SECONDS {
            return Err(AuthError::TokenExpired);
        }

        Ok(VerifiedIdentity {
            user_id,
            email: claims.email,
        })
    }
}
