//! Session manager: the client's authentication state machine.
//!
//! This module provides a `SessionManager` that:
//! - Restores the session from the credential store at startup
//! - Signs users in and registers new accounts through an [`AuthApi`]
//! - Silently refreshes expired access tokens, one network call at a time
//! - Publishes a single [`SessionState`] that route guards observe
//!
//! The manager is the only writer of both the credential store and the
//! published state. Each transition finishes its persistence side effects
//! before publishing, in one step, so readers never observe a new token
//! paired with an old identity.
//!
//! Transitions run on spawned tasks: a caller that goes away mid-request
//! (e.g. a closed view) drops only the result, not the state update.
//!
//! Sign-in, sign-out and forced logout start a new session generation. A
//! refresh that was in flight when the generation changed is discarded
//! without touching the store or the published state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::{Mutex, OnceCell, watch};

use storefront_auth::{
    Claims, DecodeError, Identity, Role, SessionState, decode_access_token, is_expired,
    now_epoch_seconds,
};
use storefront_core::{DomainError, Email, Password};

use crate::api::{AuthApi, AuthApiError};
use crate::dto::{AuthGrant, LoginRequest, RegisterRequest};
use crate::store::{
    ACCESS_TOKEN_KEY, CredentialPair, CredentialStore, REFRESH_TOKEN_KEY, clear_credentials,
};

const SESSION_EXPIRED: &str = "Your session has expired. Please sign in again.";
const INVALID_TOKEN: &str = "The server returned an invalid session token.";

/// Failure of a session operation. `Display` is the user-facing message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Rejected locally, before any network call.
    #[error("{0}")]
    Validation(String),
    /// Credentials or registration rejected, or the server was unusable.
    #[error("{0}")]
    Auth(String),
    /// The session could not be renewed; the user has been signed out.
    #[error("{0}")]
    Refresh(String),
    /// No session to act on.
    #[error("not signed in")]
    NotSignedIn,
    /// Credentials could not be written.
    #[error("{0}")]
    Store(String),
    /// The background task driving the operation died.
    #[error("session task failed: {0}")]
    Task(String),
}

impl From<DomainError> for SessionError {
    fn from(err: DomainError) -> Self {
        Self::Validation(err.message().to_string())
    }
}

/// Fields collected by the sign-up form.
#[derive(Clone, Default)]
pub struct RegistrationProfile {
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: String,
    pub phone: Option<String>,
    pub password: String,
}

impl RegistrationProfile {
    /// Validate locally and build the wire request (role is always `client`).
    pub fn validate(&self) -> Result<RegisterRequest, SessionError> {
        let first_name = self.first_name.trim();
        if first_name.is_empty() {
            return Err(DomainError::validation("first name is required").into());
        }
        let email = Email::parse(&self.email)?;
        let password = Password::for_registration(&self.password)?;

        Ok(RegisterRequest {
            first_name: first_name.to_string(),
            last_name: non_blank(self.last_name.as_deref()),
            email: email.as_str().to_string(),
            phone: non_blank(self.phone.as_deref()),
            password: password.expose().to_string(),
            role: Role::Client,
        })
    }
}

impl core::fmt::Debug for RegistrationProfile {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RegistrationProfile")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .field("phone", &self.phone)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Handle to the process-wide session. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    api: Arc<dyn AuthApi>,
    store: Arc<dyn CredentialStore>,
    state: watch::Sender<SessionState>,
    initialized: OnceCell<()>,
    /// Session generation. Held while a transition writes the store and
    /// publishes, so the two happen as one step.
    generation: std::sync::Mutex<u64>,
    /// Bumped each time a refresh completes; read before queueing on `refresh_gate`.
    refresh_epoch: AtomicU64,
    refresh_gate: Mutex<RefreshSlot>,
}

#[derive(Default)]
struct RefreshSlot {
    epoch: u64,
    outcome: Option<Result<Identity, SessionError>>,
}

/// Whether a refresh failure is reported in the published state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum FailureReport {
    /// Startup restore: fall back to a clean signed-out state.
    Silent,
    /// Explicit refresh: tell the user why they were signed out.
    Announce,
}

impl SessionManager {
    pub fn new(api: Arc<dyn AuthApi>, store: Arc<dyn CredentialStore>) -> Self {
        let (state, _) = watch::channel(SessionState::Initializing);
        Self {
            inner: Arc::new(Inner {
                api,
                store,
                state,
                initialized: OnceCell::new(),
                generation: std::sync::Mutex::new(0),
                refresh_epoch: AtomicU64::new(0),
                refresh_gate: Mutex::new(RefreshSlot::default()),
            }),
        }
    }

    /// Snapshot of the published state.
    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.inner.state.borrow().identity().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        self.inner.state.borrow().has_any_role(roles)
    }

    /// Restore the session from the credential store.
    ///
    /// Runs once per manager; later (or concurrent) calls wait for the first
    /// run and return the current state.
    pub async fn initialize(&self) -> SessionState {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let restoring = Arc::clone(&inner);
            inner
                .initialized
                .get_or_init(|| async move { restoring.restore().await })
                .await;
        });
        if let Err(err) = task.await {
            tracing::error!("session initialization task failed: {err}");
            self.inner.publish(SessionState::signed_out());
        }
        self.state()
    }

    /// Sign in with e-mail and password.
    ///
    /// Blank fields fail with [`SessionError::Validation`] without touching the
    /// network or the published state.
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, SessionError> {
        let email = Email::parse(email)?;
        let password = Password::parse(password)?;
        let request = LoginRequest {
            email: email.as_str().to_string(),
            password: password.expose().to_string(),
        };

        let inner = Arc::clone(&self.inner);
        join(tokio::spawn(async move {
            let result = inner.api.login(&request).await;
            inner.complete_grant(result, "login")
        }))
        .await
    }

    /// Create a client account and sign it in.
    pub async fn register(&self, profile: &RegistrationProfile) -> Result<Identity, SessionError> {
        let request = profile.validate()?;

        let inner = Arc::clone(&self.inner);
        join(tokio::spawn(async move {
            let result = inner.api.register(&request).await;
            inner.complete_grant(result, "registration")
        }))
        .await
    }

    /// Renew the access token with the stored refresh token.
    ///
    /// Concurrent calls share one network request. On failure both stored
    /// tokens are cleared and the user is signed out. Without a stored access
    /// token this fails with [`SessionError::NotSignedIn`] and changes nothing.
    pub async fn refresh(&self) -> Result<Identity, SessionError> {
        let inner = Arc::clone(&self.inner);
        join(tokio::spawn(async move {
            inner.refresh_deduplicated(FailureReport::Announce).await
        }))
        .await
    }

    /// Sign out locally. Always succeeds.
    pub fn logout(&self) {
        {
            let mut generation = self.inner.transition();
            *generation = generation.wrapping_add(1);
            self.inner.clear_store();
            self.inner.publish(SessionState::signed_out());
        }
        tracing::info!("signed out");
    }

    /// Drop the error message attached to a signed-out state.
    pub fn clear_error(&self) {
        self.inner.state.send_if_modified(|state| match state {
            SessionState::Unauthenticated(error @ Some(_)) => {
                *error = None;
                true
            }
            _ => false,
        });
    }

    /// Stored access token, if it decodes and has not expired.
    pub fn access_token(&self) -> Option<String> {
        let token = self.inner.store.get(ACCESS_TOKEN_KEY)?;
        let claims = decode_access_token(&token).ok()?;
        (!is_expired(&claims, now_epoch_seconds())).then_some(token)
    }

    /// Access token for an outgoing request, refreshing it first if expired.
    pub async fn valid_access_token(&self) -> Result<String, SessionError> {
        let Some(token) = self.inner.store.get(ACCESS_TOKEN_KEY) else {
            return Err(SessionError::NotSignedIn);
        };

        match decode_access_token(&token) {
            Ok(claims) if !is_expired(&claims, now_epoch_seconds()) => return Ok(token),
            Ok(_) => tracing::debug!("access token expired, refreshing"),
            Err(err) => {
                tracing::warn!("discarding undecodable access token: {err}");
                self.logout();
                return Err(SessionError::NotSignedIn);
            }
        }

        self.refresh().await?;
        self.inner
            .store
            .get(ACCESS_TOKEN_KEY)
            .ok_or(SessionError::NotSignedIn)
    }
}

async fn join(
    task: tokio::task::JoinHandle<Result<Identity, SessionError>>,
) -> Result<Identity, SessionError> {
    task.await
        .unwrap_or_else(|err| Err(SessionError::Task(err.to_string())))
}

impl Inner {
    fn transition(&self) -> MutexGuard<'_, u64> {
        self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, next: SessionState) {
        debug_assert!(!next.is_initializing(), "session never returns to Initializing");
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            tracing::info!(from = state_name(current), to = state_name(&next), "session state changed");
            *current = next;
            true
        });
    }

    /// Report a failed sign-in without signing out an existing session.
    fn publish_failure(&self, message: &str) {
        self.state.send_if_modified(|current| match current {
            SessionState::Authenticated(_) => false,
            _ => {
                *current = SessionState::failed(message);
                true
            }
        });
    }

    fn clear_store(&self) {
        if let Err(err) = clear_credentials(self.store.as_ref()) {
            tracing::warn!("failed to clear stored credentials: {err}");
        }
    }

    fn stored_refresh_token(&self) -> Option<String> {
        self.store
            .get(REFRESH_TOKEN_KEY)
            .filter(|token| !token.trim().is_empty())
    }

    async fn restore(&self) {
        let started = *self.transition();
        let restored = self.restore_identity().await;

        let generation = self.transition();
        if *generation != started {
            tracing::debug!("session changed during restore, keeping it");
            return;
        }
        self.publish(match restored {
            Some(identity) => SessionState::Authenticated(identity),
            None => SessionState::signed_out(),
        });
    }

    async fn restore_identity(&self) -> Option<Identity> {
        let Some(token) = self.store.get(ACCESS_TOKEN_KEY) else {
            tracing::info!("no stored session");
            return None;
        };

        let claims = match decode_access_token(&token) {
            Ok(claims) => claims,
            Err(err) => {
                tracing::warn!("discarding undecodable stored token: {err}");
                self.clear_store();
                return None;
            }
        };

        if !is_expired(&claims, now_epoch_seconds()) {
            tracing::info!(user_id = %claims.subject_id, role = %claims.role, "restored stored session");
            return Some(claims.identity());
        }

        if self.stored_refresh_token().is_none() {
            tracing::info!("stored session expired and cannot be refreshed");
            self.clear_store();
            return None;
        }

        self.refresh_deduplicated(FailureReport::Silent).await.ok()
    }

    async fn refresh_deduplicated(&self, report: FailureReport) -> Result<Identity, SessionError> {
        let observed = self.refresh_epoch.load(Ordering::Acquire);
        let mut slot = self.refresh_gate.lock().await;

        if slot.epoch != observed {
            if let Some(outcome) = &slot.outcome {
                tracing::debug!("reusing refresh completed while waiting");
                return outcome.clone();
            }
        }

        let outcome = self.run_refresh(report).await;
        slot.epoch = slot.epoch.wrapping_add(1);
        slot.outcome = Some(outcome.clone());
        self.refresh_epoch.store(slot.epoch, Ordering::Release);
        outcome
    }

    async fn run_refresh(&self, report: FailureReport) -> Result<Identity, SessionError> {
        let (started, refresh_token) = {
            let mut generation = self.transition();
            if self.store.get(ACCESS_TOKEN_KEY).is_none() {
                return Err(SessionError::NotSignedIn);
            }
            match self.stored_refresh_token() {
                Some(token) => (*generation, token),
                None => return Err(self.force_logout(&mut generation, report, SESSION_EXPIRED)),
            }
        };

        let result = self.api.refresh(&refresh_token).await;

        let mut generation = self.transition();
        if *generation != started {
            tracing::info!("discarding refresh result, session changed while it was in flight");
            return self
                .state
                .borrow()
                .identity()
                .cloned()
                .ok_or(SessionError::NotSignedIn);
        }

        let fresh = match result {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!("token refresh failed: {err}");
                let message = match err {
                    AuthApiError::Rejected(_) => SESSION_EXPIRED.to_string(),
                    other => other.user_message(),
                };
                return Err(self.force_logout(&mut generation, report, &message));
            }
        };

        // Servers that do not rotate refresh tokens omit them from the response.
        let pair = CredentialPair {
            refresh_token: fresh.refresh_token.or(Some(refresh_token)),
            ..fresh
        };

        let claims = match usable_claims(&pair.access_token) {
            Ok(claims) => claims,
            Err(err) => {
                tracing::warn!("refresh returned an unusable token: {err}");
                return Err(self.force_logout(&mut generation, report, INVALID_TOKEN));
            }
        };

        if let Err(err) = pair.persist(self.store.as_ref()) {
            tracing::warn!("failed to persist refreshed credentials: {err}");
            return Err(self.force_logout(&mut generation, report, &err.to_string()));
        }

        let identity = claims.identity();
        self.publish(SessionState::Authenticated(identity.clone()));
        tracing::info!(user_id = %identity.id, "session refreshed");
        Ok(identity)
    }

    fn force_logout(
        &self,
        generation: &mut u64,
        report: FailureReport,
        message: &str,
    ) -> SessionError {
        *generation = generation.wrapping_add(1);
        self.clear_store();
        self.publish(match report {
            FailureReport::Silent => SessionState::signed_out(),
            FailureReport::Announce => SessionState::failed(message),
        });
        SessionError::Refresh(message.to_string())
    }

    fn complete_grant(
        &self,
        result: Result<AuthGrant, AuthApiError>,
        operation: &'static str,
    ) -> Result<Identity, SessionError> {
        let grant = match result {
            Ok(grant) => grant,
            Err(err) => {
                tracing::warn!(operation, "authentication failed: {err}");
                let message = err.user_message();
                self.publish_failure(&message);
                return Err(SessionError::Auth(message));
            }
        };

        let claims = match usable_claims(&grant.credentials.access_token) {
            Ok(claims) => claims,
            Err(err) => {
                tracing::warn!(operation, "server issued an unusable token: {err}");
                self.publish_failure(INVALID_TOKEN);
                return Err(SessionError::Auth(INVALID_TOKEN.to_string()));
            }
        };

        let mut generation = self.transition();
        *generation = generation.wrapping_add(1);

        if let Err(err) = grant.credentials.persist(self.store.as_ref()) {
            tracing::warn!(operation, "failed to persist credentials: {err}");
            self.clear_store();
            let message = err.to_string();
            self.publish(SessionState::failed(message.clone()));
            return Err(SessionError::Store(message));
        }

        let identity = grant.user.unwrap_or_else(|| claims.identity());
        self.publish(SessionState::Authenticated(identity.clone()));
        tracing::info!(operation, user_id = %identity.id, role = %identity.role, "signed in");
        Ok(identity)
    }
}

/// Decode a freshly issued token, rejecting one that is already expired.
fn usable_claims(token: &str) -> Result<Claims, DecodeError> {
    let claims = decode_access_token(token)?;
    if is_expired(&claims, now_epoch_seconds()) {
        return Err(DecodeError::InvalidClaim("token is already expired".to_string()));
    }
    Ok(claims)
}

fn state_name(state: &SessionState) -> &'static str {
    match state {
        SessionState::Initializing => "initializing",
        SessionState::Authenticated(_) => "authenticated",
        SessionState::Unauthenticated(_) => "unauthenticated",
    }
}
