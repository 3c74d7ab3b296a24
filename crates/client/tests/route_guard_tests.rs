mod common;

use std::sync::Arc;
use std::time::Duration;

use storefront_auth::{GuardDecision, LOGIN_PATH, Role, RouteRequirements, RouteTable, post_login_destination};
use storefront_client::{CredentialPair, MemoryCredentialStore, RouteGuard, SessionManager};

use common::{HOUR, ScriptedAuthApi, mint_token, store_with};

fn session_for(role: Role) -> SessionManager {
    let token = mint_token("1", "user@shop.test", role, HOUR);
    SessionManager::new(
        Arc::new(ScriptedAuthApi::new()),
        Arc::new(store_with(Some(&token), None)),
    )
}

#[tokio::test]
async fn guard_shows_loading_until_the_session_settles() {
    let expired = mint_token("1", "a@b.com", Role::Admin, -HOUR);
    let fresh = mint_token("1", "a@b.com", Role::Admin, HOUR);
    let api = ScriptedAuthApi::new()
        .with_refresh(Ok(CredentialPair::new(fresh, None)))
        .with_refresh_delay(Duration::from_millis(50));
    let session = SessionManager::new(
        Arc::new(api),
        Arc::new(store_with(Some(&expired), Some("r"))),
    );
    let mut guard = RouteGuard::new(&session, RouteTable::storefront());

    assert_eq!(guard.check("/admin/users"), GuardDecision::Loading);

    let background = session.clone();
    tokio::spawn(async move { background.initialize().await });

    assert_eq!(guard.wait_until_decided("/admin/users").await, GuardDecision::Render);
}

#[tokio::test]
async fn signed_out_visitors_are_sent_to_login_with_a_return_path() {
    let session = SessionManager::new(
        Arc::new(ScriptedAuthApi::new()),
        Arc::new(MemoryCredentialStore::new()),
    );
    session.initialize().await;
    let guard = RouteGuard::new(&session, RouteTable::storefront());

    assert_eq!(
        guard.check("/manager/reports?month=3"),
        GuardDecision::RedirectToLogin {
            to: LOGIN_PATH.to_string(),
            return_to: "/manager/reports?month=3".to_string(),
        }
    );
    assert_eq!(guard.check("/"), GuardDecision::Render);
    assert_eq!(guard.check(LOGIN_PATH), GuardDecision::Render);
}

#[tokio::test]
async fn wrong_role_is_sent_to_its_own_landing_page() {
    let session = session_for(Role::Cashier);
    session.initialize().await;
    let guard = RouteGuard::new(&session, RouteTable::storefront());

    assert_eq!(
        guard.check("/admin/dashboard"),
        GuardDecision::Redirect {
            to: "/cashier/pos".to_string()
        }
    );
    assert!(guard.check("/cashier/pos").is_render());
}

#[tokio::test]
async fn explicit_requirements_override_the_table() {
    let session = session_for(Role::Client);
    session.initialize().await;
    let guard = RouteGuard::new(&session, RouteTable::new());

    let staff_only = RouteRequirements::roles([Role::Admin, Role::Manager])
        .with_unauthorized_redirect("/forbidden");
    assert_eq!(
        guard.check_with(&staff_only, "/reports"),
        GuardDecision::Redirect {
            to: "/forbidden".to_string()
        }
    );
    assert!(guard.check_with(&RouteRequirements::authenticated(), "/account").is_render());
}

#[tokio::test]
async fn guard_follows_logout() {
    let session = session_for(Role::Admin);
    session.initialize().await;
    let mut guard = RouteGuard::new(&session, RouteTable::storefront());
    assert!(guard.check("/admin/dashboard").is_render());

    session.logout();

    let decision = guard.next_decision("/admin/dashboard").await.unwrap();
    assert_eq!(decision.redirect_target(), Some(LOGIN_PATH));
}

#[tokio::test]
async fn guard_outliving_the_session_treats_visitors_as_signed_out() {
    let session = session_for(Role::Admin);
    let mut guard = RouteGuard::new(&session, RouteTable::storefront());
    drop(session);

    assert!(matches!(
        guard.wait_until_decided("/admin").await,
        GuardDecision::RedirectToLogin { .. }
    ));
    assert_eq!(guard.next_decision("/admin").await, None);
}

#[tokio::test]
async fn login_returns_to_the_captured_location() {
    let session = SessionManager::new(
        Arc::new(ScriptedAuthApi::new().with_login(Ok(storefront_client::AuthGrant {
            user: None,
            credentials: CredentialPair::new(
                mint_token("3", "boss@shop.test", Role::Manager, HOUR),
                None,
            ),
        }))),
        Arc::new(MemoryCredentialStore::new()),
    );
    session.initialize().await;
    let guard = RouteGuard::new(&session, RouteTable::storefront());

    let GuardDecision::RedirectToLogin { return_to, .. } = guard.check("/manager/staff") else {
        panic!("expected a login redirect");
    };

    let identity = session.login("boss@shop.test", "pw").await.unwrap();
    assert_eq!(
        post_login_destination(&identity, Some(&return_to), guard.table()),
        "/manager/staff"
    );
    assert_eq!(
        post_login_destination(&identity, Some("/admin/users"), guard.table()),
        "/manager/dashboard"
    );
    assert!(guard.check(&return_to).is_render());
}
