//! `storefront-client`
//!
//! **Responsibility:** client-side session engine of the storefront.
//!
//! This crate provides:
//! - Durable credential storage
//! - The remote auth API boundary (login, register, refresh)
//! - The session state machine with deduplicated silent refresh
//! - Route guards bound to the live session
//!
//! Tokens are decoded for UI state only; the API stays the authority.

pub mod api;
pub mod config;
pub mod dto;
pub mod guard;
pub mod session;
pub mod store;

pub use api::{AuthApi, AuthApiError, AuthorizedClient, HttpAuthApi, with_bearer};
pub use config::ClientConfig;
pub use dto::{AuthGrant, LoginRequest, RegisterRequest};
pub use guard::RouteGuard;
pub use session::{RegistrationProfile, SessionError, SessionManager};
pub use store::{
    CredentialPair, CredentialStore, FileCredentialStore, MemoryCredentialStore, StoreError,
};
