//! Remote auth API boundary.
//!
//! [`AuthApi`] abstracts the three remote operations the session engine needs.
//! Logout is purely local and has no remote counterpart. [`HttpAuthApi`] talks
//! to the storefront backend over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Serialize;
use thiserror::Error;

use crate::config::ClientConfig;
use crate::dto::{AuthEnvelope, AuthGrant, LoginRequest, RefreshRequest, RegisterRequest};
use crate::session::{SessionError, SessionManager};
use crate::store::CredentialPair;

pub const LOGIN_ENDPOINT: &str = "/auth/login";
pub const REGISTER_ENDPOINT: &str = "/auth/register";
pub const REFRESH_ENDPOINT: &str = "/auth/refresh";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthApiError {
    /// The server understood the request and said no. Carries its message.
    #[error("{0}")]
    Rejected(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("API error ({0}): {1}")]
    Api(u16, String),
    #[error("parse error: {0}")]
    Parse(String),
}

impl AuthApiError {
    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Rejected(message) => message.clone(),
            Self::Network(_) => "Unable to reach the server. Check your connection.".to_string(),
            Self::Api(status, _) => format!("The server returned an error ({status})."),
            Self::Parse(_) => "The server sent an unexpected response.".to_string(),
        }
    }
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> Result<AuthGrant, AuthApiError>;

    async fn register(&self, request: &RegisterRequest) -> Result<AuthGrant, AuthApiError>;

    async fn refresh(&self, refresh_token: &str) -> Result<CredentialPair, AuthApiError>;
}

/// Attach `Authorization: Bearer <token>` when a token is present.
pub fn with_bearer(builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token.map(str::trim).filter(|t| !t.is_empty()) {
        Some(token) => builder.bearer_auth(token),
        None => builder,
    }
}

/// HTTP implementation of [`AuthApi`].
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpAuthApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AuthApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthApiError::Network(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, AuthApiError> {
        Self::new(config.api_url.clone(), config.request_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    /// Build a request against the API, authenticated when `token` is given.
    pub fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        with_bearer(self.client.request(method, url), token)
    }

    async fn post_envelope<B>(&self, path: &str, body: &B) -> Result<AuthEnvelope, AuthApiError>
    where
        B: Serialize + ?Sized,
    {
        tracing::debug!(path, "calling auth endpoint");

        let resp = self
            .request(Method::POST, path, None)
            .json(body)
            .send()
            .await
            .map_err(|e| AuthApiError::Network(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| AuthApiError::Network(e.to_string()))?;

        let envelope = match serde_json::from_str::<AuthEnvelope>(&text) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => return Err(AuthApiError::Api(status.as_u16(), text)),
            Err(e) => return Err(AuthApiError::Parse(e.to_string())),
        };

        if !status.is_success() || envelope.success == Some(false) {
            let message = envelope
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| rejection_message(status));
            tracing::debug!(path, status = status.as_u16(), "auth endpoint rejected request");
            return Err(AuthApiError::Rejected(message));
        }

        Ok(envelope)
    }

    fn into_grant(envelope: AuthEnvelope) -> Result<AuthGrant, AuthApiError> {
        let user = envelope.identity();
        let credentials = credentials_of(envelope)?;
        Ok(AuthGrant { user, credentials })
    }
}

fn credentials_of(envelope: AuthEnvelope) -> Result<CredentialPair, AuthApiError> {
    let token = envelope
        .token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AuthApiError::Parse("response is missing the access token".to_string()))?;
    Ok(CredentialPair::new(token, envelope.refresh_token))
}

fn rejection_message(status: StatusCode) -> String {
    match status {
        StatusCode::UNAUTHORIZED => "Invalid email or password".to_string(),
        StatusCode::FORBIDDEN => "Access denied".to_string(),
        StatusCode::CONFLICT => "An account with this email already exists".to_string(),
        status => format!("Request failed ({})", status.as_u16()),
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, request: &LoginRequest) -> Result<AuthGrant, AuthApiError> {
        let envelope = self.post_envelope(LOGIN_ENDPOINT, request).await?;
        Self::into_grant(envelope)
    }

    async fn register(&self, request: &RegisterRequest) -> Result<AuthGrant, AuthApiError> {
        let envelope = self.post_envelope(REGISTER_ENDPOINT, request).await?;
        Self::into_grant(envelope)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<CredentialPair, AuthApiError> {
        let request = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        let envelope = self.post_envelope(REFRESH_ENDPOINT, &request).await?;
        credentials_of(envelope)
    }
}

/// Issues API requests on behalf of the signed-in user.
///
/// Every request carries a current bearer token; an expired one is refreshed
/// first through the session manager.
#[derive(Clone)]
pub struct AuthorizedClient {
    http: HttpAuthApi,
    session: SessionManager,
}

impl AuthorizedClient {
    pub fn new(http: HttpAuthApi, session: SessionManager) -> Self {
        Self { http, session }
    }

    pub async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, SessionError> {
        let token = self.session.valid_access_token().await?;
        Ok(self.http.request(method, path, Some(&token)))
    }
}
