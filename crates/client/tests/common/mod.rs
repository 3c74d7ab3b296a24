#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::json;

use storefront_auth::{Identity, Role};
use storefront_client::store::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use storefront_client::{
    AuthApi, AuthApiError, AuthGrant, CredentialPair, CredentialStore, LoginRequest,
    MemoryCredentialStore, RegisterRequest,
};
use storefront_core::UserId;

pub const HOUR: i64 = 3600;

/// Mint an access token expiring `expires_in` seconds from now (negative = expired).
pub fn mint_token(id: &str, email: &str, role: Role, expires_in: i64) -> String {
    let claims = json!({
        "id": id,
        "email": email,
        "firstName": "Test",
        "lastName": "User",
        "role": role.as_str(),
        "iat": Utc::now().timestamp(),
        "exp": Utc::now().timestamp() + expires_in,
    });

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(b"backend-secret"),
    )
    .expect("failed to encode jwt")
}

pub fn identity(id: &str, email: &str, role: Role) -> Identity {
    Identity {
        id: UserId::new(id).unwrap(),
        email: email.to_string(),
        first_name: "Server".to_string(),
        last_name: "Side".to_string(),
        role,
    }
}

pub fn store_with(access: Option<&str>, refresh: Option<&str>) -> MemoryCredentialStore {
    let store = MemoryCredentialStore::new();
    if let Some(access) = access {
        store.set(ACCESS_TOKEN_KEY, access).unwrap();
    }
    if let Some(refresh) = refresh {
        store.set(REFRESH_TOKEN_KEY, refresh).unwrap();
    }
    store
}

/// Auth API double with canned responses and call counters.
#[derive(Default)]
pub struct ScriptedAuthApi {
    login: Mutex<Option<Result<AuthGrant, AuthApiError>>>,
    register: Mutex<Option<Result<AuthGrant, AuthApiError>>>,
    refresh: Mutex<Option<Result<CredentialPair, AuthApiError>>>,
    refresh_delay: Option<Duration>,
    pub login_calls: AtomicUsize,
    pub register_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub last_login: Mutex<Option<LoginRequest>>,
    pub last_register: Mutex<Option<RegisterRequest>>,
    pub last_refresh_token: Mutex<Option<String>>,
}

impl ScriptedAuthApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_login(self, result: Result<AuthGrant, AuthApiError>) -> Self {
        *self.login.lock().unwrap() = Some(result);
        self
    }

    pub fn with_register(self, result: Result<AuthGrant, AuthApiError>) -> Self {
        *self.register.lock().unwrap() = Some(result);
        self
    }

    pub fn with_refresh(self, result: Result<CredentialPair, AuthApiError>) -> Self {
        *self.refresh.lock().unwrap() = Some(result);
        self
    }

    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> (usize, usize, usize) {
        (
            self.login_calls.load(Ordering::SeqCst),
            self.register_calls.load(Ordering::SeqCst),
            self.refresh_calls.load(Ordering::SeqCst),
        )
    }
}

fn unexpected<T>(what: &str) -> Result<T, AuthApiError> {
    Err(AuthApiError::Network(format!("unexpected {what} call")))
}

#[async_trait]
impl AuthApi for ScriptedAuthApi {
    async fn login(&self, request: &LoginRequest) -> Result<AuthGrant, AuthApiError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_login.lock().unwrap() = Some(request.clone());
        let scripted = self.login.lock().unwrap().clone();
        scripted.unwrap_or_else(|| unexpected("login"))
    }

    async fn register(&self, request: &RegisterRequest) -> Result<AuthGrant, AuthApiError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_register.lock().unwrap() = Some(request.clone());
        let scripted = self.register.lock().unwrap().clone();
        scripted.unwrap_or_else(|| unexpected("register"))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<CredentialPair, AuthApiError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_refresh_token.lock().unwrap() = Some(refresh_token.to_string());
        if let Some(delay) = self.refresh_delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.refresh.lock().unwrap().clone();
        scripted.unwrap_or_else(|| unexpected("refresh"))
    }
}
