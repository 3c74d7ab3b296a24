use serde::Serialize;

use crate::{Identity, Role};

/// Published authentication state of the client.
///
/// Starts as `Initializing`, settles into one of the other two variants once
/// stored credentials have been checked, and never goes back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Initializing,
    Authenticated(Identity),
    /// Signed out; carries the message of the last failed attempt, if any.
    Unauthenticated(Option<String>),
}

impl SessionState {
    pub fn signed_out() -> Self {
        Self::Unauthenticated(None)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Unauthenticated(Some(message.into()))
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn is_initializing(&self) -> bool {
        matches!(self, Self::Initializing)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Unauthenticated(Some(message)) => Some(message),
            _ => None,
        }
    }

    /// Signed in with one of `roles` (empty = any role).
    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        self.identity().is_some_and(|identity| identity.has_any_role(roles))
    }
}
