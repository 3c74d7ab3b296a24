//! Value objects: equality by value, not identity.
//!
//! Value objects are defined entirely by their attribute values and are
//! validated once, at construction. Everything downstream can rely on the
//! invariant instead of re-checking raw strings.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Minimum password length accepted when registering an account.
pub const MIN_PASSWORD_LEN: usize = 6;

/// A normalized e-mail address (trimmed, lowercase).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    /// Normalize and validate raw user input.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(DomainError::validation("email is required"));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Email {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A password captured from user input.
///
/// The value is never trimmed (whitespace is significant) and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    /// Accept any non-blank password (login).
    pub fn parse(raw: &str) -> DomainResult<Self> {
        if raw.trim().is_empty() {
            return Err(DomainError::validation("password is required"));
        }
        Ok(Self(raw.to_string()))
    }

    /// Accept a password for a new account, enforcing [`MIN_PASSWORD_LEN`].
    pub fn for_registration(raw: &str) -> DomainResult<Self> {
        let password = Self::parse(raw)?;
        if password.0.chars().count() < MIN_PASSWORD_LEN {
            return Err(DomainError::validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        Ok(password)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for Password {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}
