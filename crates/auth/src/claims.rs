//! Access-token decoding.
//!
//! The storefront API issues JWT access tokens. The client decodes them only to
//! drive UI state (who is signed in, when the session lapses). Signatures are
//! **not** verified here; the API re-checks every bearer token it receives.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use storefront_core::UserId;

use crate::{Identity, Role};

/// Claims carried by a storefront access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Claims {
    pub subject_id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    /// Expiry, seconds since the Unix epoch (`exp`).
    pub expires_at: i64,
}

impl Claims {
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.subject_id.clone(),
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            role: self.role,
        }
    }

    /// Seconds left before expiry, clamped at zero.
    pub fn expires_in(&self, now_epoch_seconds: i64) -> i64 {
        self.expires_at.saturating_sub(now_epoch_seconds).max(0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("token is empty")]
    Empty,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token is missing the '{0}' claim")]
    MissingClaim(&'static str),

    #[error("invalid claim: {0}")]
    InvalidClaim(String),
}

/// Wire shape of the payload. Every field is optional so missing claims are
/// reported by name instead of as a generic serde failure.
#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: Option<UserId>,
    id: Option<UserId>,
    #[serde(rename = "userId")]
    user_id: Option<UserId>,
    email: Option<String>,
    #[serde(rename = "firstName")]
    first_name_camel: Option<String>,
    first_name: Option<String>,
    #[serde(rename = "lastName")]
    last_name_camel: Option<String>,
    last_name: Option<String>,
    role: Option<String>,
    exp: Option<i64>,
}

impl TryFrom<RawClaims> for Claims {
    type Error = DecodeError;

    fn try_from(raw: RawClaims) -> Result<Self, Self::Error> {
        let subject_id = raw
            .sub
            .or(raw.id)
            .or(raw.user_id)
            .ok_or(DecodeError::MissingClaim("sub"))?;

        let email = raw
            .email
            .filter(|e| !e.trim().is_empty())
            .ok_or(DecodeError::MissingClaim("email"))?;

        let role = raw
            .role
            .ok_or(DecodeError::MissingClaim("role"))?
            .parse::<Role>()
            .map_err(|e| DecodeError::InvalidClaim(e.to_string()))?;

        let expires_at = raw.exp.ok_or(DecodeError::MissingClaim("exp"))?;

        Ok(Claims {
            subject_id,
            email,
            first_name: raw.first_name_camel.or(raw.first_name).unwrap_or_default(),
            last_name: raw.last_name_camel.or(raw.last_name).unwrap_or_default(),
            role,
            expires_at,
        })
    }
}

fn unverified_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    validation
}

/// Decode an access token into [`Claims`] without verifying its signature.
///
/// Expired tokens decode successfully; use [`is_expired`] to check expiry.
pub fn decode_access_token(token: &str) -> Result<Claims, DecodeError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(DecodeError::Empty);
    }

    let data = jsonwebtoken::decode::<RawClaims>(
        token,
        &DecodingKey::from_secret(&[]),
        &unverified_validation(),
    )
    .map_err(|e| DecodeError::Malformed(e.to_string()))?;

    Claims::try_from(data.claims)
}

/// `true` iff the token's expiry is at or before `now_epoch_seconds`.
///
/// No grace period. This drives UX only; it is not a security check.
pub fn is_expired(claims: &Claims, now_epoch_seconds: i64) -> bool {
    claims.expires_at <= now_epoch_seconds
}

/// Current wall-clock time in epoch seconds.
pub fn now_epoch_seconds() -> i64 {
    Utc::now().timestamp()
}
