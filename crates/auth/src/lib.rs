//! `storefront-auth`: pure session and route-authorization primitives.
//!
//! This crate is decoupled from HTTP and storage: it decodes
//! access tokens, models the published session state and decides what a
//! navigation may render.

pub mod claims;
pub mod guard;
pub mod identity;
pub mod roles;
pub mod state;

pub use claims::{Claims, DecodeError, decode_access_token, is_expired, now_epoch_seconds};
pub use guard::{
    GuardDecision, LOGIN_PATH, RouteRequirements, RouteTable, evaluate, post_login_destination,
};
pub use identity::Identity;
pub use roles::{Role, UnknownRole, landing_path_for};
pub use state::SessionState;
