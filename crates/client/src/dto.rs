//! Wire types of the storefront auth endpoints.
//!
//! Requests are built from validated domain values; responses are parsed into
//! the loose envelope the API returns and then narrowed into typed results.

use serde::{Deserialize, Serialize};

use storefront_auth::{Identity, Role};

use crate::store::CredentialPair;

/// `POST /auth/login` body.
#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl core::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// `POST /auth/register` body. Self-registration always creates clients.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub first_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub password: String,
    pub role: Role,
}

impl core::fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .field("phone", &self.phone)
            .field("password", &"<redacted>")
            .field("role", &self.role)
            .finish()
    }
}

/// `POST /auth/refresh` body.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Response envelope shared by the three endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthEnvelope {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default, alias = "accessToken")]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Kept loose: a user object we cannot read falls back to token claims.
    #[serde(default)]
    pub user: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl AuthEnvelope {
    pub fn identity(&self) -> Option<Identity> {
        let user = self.user.as_ref().filter(|u| !u.is_null())?;
        match serde_json::from_value(user.clone()) {
            Ok(identity) => Some(identity),
            Err(err) => {
                tracing::warn!("ignoring unreadable user object in auth response: {err}");
                None
            }
        }
    }
}

/// Successful login or registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthGrant {
    /// User as returned by the server, when it sent one.
    pub user: Option<Identity>,
    pub credentials: CredentialPair,
}
