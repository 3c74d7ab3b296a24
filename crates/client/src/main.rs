//! `storefront-session`: drive the session engine from a terminal.
//!
//! Usage:
//!   storefront-session status
//!   storefront-session login <email> <password>
//!   storefront-session register <first-name> <email> <password>
//!   storefront-session refresh
//!   storefront-session logout
//!   storefront-session visit <path>

use std::sync::Arc;

use anyhow::{Context, bail};

use storefront_auth::{RouteTable, SessionState, post_login_destination};
use storefront_client::{
    ClientConfig, FileCredentialStore, HttpAuthApi, RegistrationProfile, RouteGuard,
    SessionManager,
};

const USAGE: &str = "usage: storefront-session <status | login EMAIL PASSWORD | register FIRST EMAIL PASSWORD | refresh | logout | visit PATH>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ClientConfig::from_env().context("invalid client configuration")?;
    storefront_observability::init_with(config.log_format);

    let store = FileCredentialStore::open(&config.credentials_path).with_context(|| {
        format!("failed to open credential store at {:?}", config.credentials_path)
    })?;
    let api = HttpAuthApi::from_config(&config).context("failed to build HTTP client")?;
    let session = SessionManager::new(Arc::new(api), Arc::new(store));

    tracing::info!(api_url = %config.api_url, "restoring session");
    session.initialize().await;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let routes = RouteTable::storefront();

    match args.as_slice() {
        [] | ["status"] => print_state(&session.state()),
        ["login", email, password] => {
            let identity = session.login(email, password).await?;
            println!("signed in as {} ({})", identity.display_name(), identity.role);
            println!("continue at {}", post_login_destination(&identity, None, &routes));
        }
        ["register", first_name, email, password] => {
            let profile = RegistrationProfile {
                first_name: first_name.to_string(),
                email: email.to_string(),
                password: password.to_string(),
                ..Default::default()
            };
            let identity = session.register(&profile).await?;
            println!("registered and signed in as {}", identity.display_name());
        }
        ["refresh"] => {
            let identity = session.refresh().await?;
            println!("session renewed for {}", identity.email);
        }
        ["logout"] => {
            session.logout();
            println!("signed out");
        }
        ["visit", path] => {
            let mut guard = RouteGuard::new(&session, routes);
            let decision = guard.wait_until_decided(path).await;
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }
        _ => bail!(USAGE),
    }

    Ok(())
}

fn print_state(state: &SessionState) {
    match state {
        SessionState::Initializing => println!("session: initializing"),
        SessionState::Authenticated(identity) => println!(
            "session: signed in as {} <{}> ({})",
            identity.display_name(),
            identity.email,
            identity.role
        ),
        SessionState::Unauthenticated(None) => println!("session: signed out"),
        SessionState::Unauthenticated(Some(error)) => println!("session: signed out ({error})"),
    }
}
