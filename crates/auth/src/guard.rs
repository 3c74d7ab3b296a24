//! Route guarding: decide what a navigation to a protected path may render.
//!
//! Everything here is a pure function of the published [`SessionState`], so a
//! guard can be re-evaluated on every navigation or state change at no cost.
//! It gates UI only; the API enforces authorization independently.

use serde::Serialize;

use crate::{Identity, Role, SessionState, landing_path_for};

/// Default target for signed-out visitors.
pub const LOGIN_PATH: &str = "/login";

/// Access rules attached to a protected route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequirements {
    /// Roles allowed in; empty means any signed-in role.
    pub required_roles: Vec<Role>,
    /// Where to send signed-in users lacking a required role. Falls back to
    /// their own landing page.
    pub unauthorized_redirect: Option<String>,
    /// Where to send signed-out visitors.
    pub unauthenticated_redirect: String,
}

impl RouteRequirements {
    /// Any signed-in user may enter.
    pub fn authenticated() -> Self {
        Self {
            required_roles: Vec::new(),
            unauthorized_redirect: None,
            unauthenticated_redirect: LOGIN_PATH.to_string(),
        }
    }

    pub fn roles(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            required_roles: roles.into_iter().collect(),
            ..Self::authenticated()
        }
    }

    pub fn with_unauthorized_redirect(mut self, path: impl Into<String>) -> Self {
        self.unauthorized_redirect = Some(path.into());
        self
    }

    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.unauthenticated_redirect = path.into();
        self
    }
}

impl Default for RouteRequirements {
    fn default() -> Self {
        Self::authenticated()
    }
}

/// Outcome of guarding one navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GuardDecision {
    /// Stored credentials have not been checked yet; show a placeholder.
    Loading,
    /// Signed out. `return_to` is the location originally requested.
    RedirectToLogin { to: String, return_to: String },
    /// Signed in without a required role.
    Redirect { to: String },
    Render,
}

impl GuardDecision {
    pub fn is_render(&self) -> bool {
        matches!(self, Self::Render)
    }

    pub fn redirect_target(&self) -> Option<&str> {
        match self {
            Self::RedirectToLogin { to, .. } | Self::Redirect { to } => Some(to),
            Self::Loading | Self::Render => None,
        }
    }
}

/// Guard a single navigation.
///
/// - No IO
/// - No panics
/// - Deterministic in (state, requirements, requested location)
pub fn evaluate(
    state: &SessionState,
    requirements: &RouteRequirements,
    requested_location: &str,
) -> GuardDecision {
    match state {
        SessionState::Initializing => GuardDecision::Loading,
        SessionState::Unauthenticated(_) => GuardDecision::RedirectToLogin {
            to: requirements.unauthenticated_redirect.clone(),
            return_to: requested_location.to_string(),
        },
        SessionState::Authenticated(identity) => {
            if identity.has_any_role(&requirements.required_roles) {
                GuardDecision::Render
            } else {
                let to = requirements
                    .unauthorized_redirect
                    .clone()
                    .unwrap_or_else(|| landing_path_for(identity.role).to_string());
                GuardDecision::Redirect { to }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Route table
// ─────────────────────────────────────────────────────────────────────────────

/// Registry of protected path prefixes. Paths matching no prefix are public.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<(String, RouteRequirements)>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Protect `prefix` and everything below it.
    pub fn protect(mut self, prefix: impl Into<String>, requirements: RouteRequirements) -> Self {
        let prefix = normalize_prefix(prefix.into());
        self.routes.retain(|(existing, _)| *existing != prefix);
        self.routes.push((prefix, requirements));
        self
    }

    /// The storefront's role areas, each reserved to its own role.
    pub fn storefront() -> Self {
        Role::ALL.iter().fold(Self::new(), |table, role| {
            table.protect(format!("/{}", role.as_str()), RouteRequirements::roles([*role]))
        })
    }

    /// Requirements of the most specific prefix covering `location`.
    pub fn requirements_for(&self, location: &str) -> Option<&RouteRequirements> {
        let path = path_of(location);
        self.routes
            .iter()
            .filter(|(prefix, _)| covers(prefix, path))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, requirements)| requirements)
    }

    /// Guard a navigation against the table; unlisted paths always render.
    pub fn evaluate(&self, state: &SessionState, location: &str) -> GuardDecision {
        match self.requirements_for(location) {
            Some(requirements) => evaluate(state, requirements, location),
            None => GuardDecision::Render,
        }
    }
}

/// Where to send a user right after signing in.
///
/// Honors the location captured by [`GuardDecision::RedirectToLogin`] when it
/// is a local path the user may see, else the user's landing page.
pub fn post_login_destination(
    identity: &Identity,
    return_to: Option<&str>,
    table: &RouteTable,
) -> String {
    let state = SessionState::Authenticated(identity.clone());
    let usable = |location: &&str| {
        is_local_path(location)
            && path_of(location) != LOGIN_PATH
            && table.evaluate(&state, location).is_render()
    };

    match return_to.map(str::trim) {
        Some(location) if usable(&location) => location.to_string(),
        Some(location) => {
            tracing::debug!(location, role = %identity.role, "ignoring unusable return location");
            landing_path_for(identity.role).to_string()
        }
        None => landing_path_for(identity.role).to_string(),
    }
}

fn normalize_prefix(prefix: String) -> String {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn path_of(location: &str) -> &str {
    location
        .split(['?', '#'])
        .next()
        .unwrap_or(location)
}

fn covers(prefix: &str, path: &str) -> bool {
    prefix == "/"
        || path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

// "//host" and "/\host" are protocol-relative in browsers and would leave the app.
fn is_local_path(location: &str) -> bool {
    location.starts_with('/') && !matches!(location.as_bytes().get(1), Some(b'/' | b'\\'))
}
