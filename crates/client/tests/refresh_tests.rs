mod common;

use std::sync::Arc;
use std::time::Duration;

use storefront_auth::{Role, SessionState};
use storefront_client::store::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use storefront_client::{
    AuthApiError, AuthGrant, CredentialPair, CredentialStore, MemoryCredentialStore,
    SessionError, SessionManager,
};

use common::{HOUR, ScriptedAuthApi, mint_token, store_with};

async fn signed_in(api: ScriptedAuthApi) -> (SessionManager, Arc<ScriptedAuthApi>, Arc<MemoryCredentialStore>) {
    let token = mint_token("5", "stock@shop.test", Role::Stockist, HOUR);
    let api = Arc::new(api);
    let store = Arc::new(store_with(Some(&token), Some("refresh-1")));
    let session = SessionManager::new(api.clone(), store.clone());
    assert!(session.initialize().await.is_authenticated());
    (session, api, store)
}

#[tokio::test]
async fn concurrent_refreshes_share_one_request() {
    let fresh = mint_token("5", "stock@shop.test", Role::Stockist, 2 * HOUR);
    let (session, api, store) = signed_in(
        ScriptedAuthApi::new()
            .with_refresh(Ok(CredentialPair::new(fresh.clone(), Some("refresh-2".to_string()))))
            .with_refresh_delay(Duration::from_millis(50)),
    )
    .await;

    let (first, second) = tokio::join!(session.refresh(), session.refresh());

    assert_eq!(api.calls(), (0, 0, 1));
    assert_eq!(first, second);
    assert_eq!(first.unwrap().role, Role::Stockist);
    assert_eq!(store.get(ACCESS_TOKEN_KEY), Some(fresh));
    assert_eq!(store.get(REFRESH_TOKEN_KEY).as_deref(), Some("refresh-2"));
}

#[tokio::test]
async fn many_concurrent_callers_still_share_one_request() {
    let fresh = mint_token("5", "stock@shop.test", Role::Stockist, 2 * HOUR);
    let (session, api, _) = signed_in(
        ScriptedAuthApi::new()
            .with_refresh(Ok(CredentialPair::new(fresh, None)))
            .with_refresh_delay(Duration::from_millis(50)),
    )
    .await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let session = session.clone();
            tokio::spawn(async move { session.refresh().await })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    assert_eq!(api.calls(), (0, 0, 1));
}

#[tokio::test]
async fn sequential_refreshes_each_hit_the_network() {
    let fresh = mint_token("5", "stock@shop.test", Role::Stockist, 2 * HOUR);
    let (session, api, _) =
        signed_in(ScriptedAuthApi::new().with_refresh(Ok(CredentialPair::new(fresh, None)))).await;

    session.refresh().await.unwrap();
    session.refresh().await.unwrap();

    assert_eq!(api.calls(), (0, 0, 2));
}

#[tokio::test]
async fn rejected_refresh_signs_the_user_out() {
    let (session, _, store) = signed_in(
        ScriptedAuthApi::new().with_refresh(Err(AuthApiError::Rejected("revoked".to_string()))),
    )
    .await;

    let err = session.refresh().await.unwrap_err();

    assert!(matches!(err, SessionError::Refresh(_)));
    assert!(!session.is_authenticated());
    assert!(session.state().error().is_some());
    assert!(store.is_empty());
}

#[tokio::test]
async fn concurrent_failures_are_shared_too() {
    let (session, api, store) = signed_in(
        ScriptedAuthApi::new()
            .with_refresh(Err(AuthApiError::Network("down".to_string())))
            .with_refresh_delay(Duration::from_millis(50)),
    )
    .await;

    let (first, second) = tokio::join!(session.refresh(), session.refresh());

    assert_eq!(api.calls(), (0, 0, 1));
    assert!(first.is_err());
    assert_eq!(first, second);
    assert!(store.is_empty());
}

#[tokio::test]
async fn refresh_without_a_refresh_token_signs_out_without_network() {
    let token = mint_token("5", "a@b.com", Role::Client, HOUR);
    let api = Arc::new(ScriptedAuthApi::new());
    let store = Arc::new(store_with(Some(&token), None));
    let session = SessionManager::new(api.clone(), store.clone());
    session.initialize().await;

    let err = session.refresh().await.unwrap_err();

    assert!(matches!(err, SessionError::Refresh(_)));
    assert_eq!(api.calls(), (0, 0, 0));
    assert!(matches!(session.state(), SessionState::Unauthenticated(Some(_))));
    assert!(store.is_empty());
}

#[tokio::test]
async fn refresh_returning_an_expired_token_signs_out() {
    let stale = mint_token("5", "a@b.com", Role::Client, -HOUR);
    let (session, _, store) =
        signed_in(ScriptedAuthApi::new().with_refresh(Ok(CredentialPair::new(stale, None)))).await;

    assert!(session.refresh().await.is_err());
    assert!(!session.is_authenticated());
    assert!(store.is_empty());
}

#[tokio::test]
async fn refreshed_identity_follows_the_new_claims() {
    let promoted = mint_token("5", "stock@shop.test", Role::Manager, HOUR);
    let (session, _, _) =
        signed_in(ScriptedAuthApi::new().with_refresh(Ok(CredentialPair::new(promoted, None)))).await;

    session.refresh().await.unwrap();

    assert!(session.has_any_role(&[Role::Manager]));
    assert!(!session.has_any_role(&[Role::Stockist]));
}

#[tokio::test]
async fn refresh_without_a_session_changes_nothing() {
    let api = Arc::new(ScriptedAuthApi::new());
    let session = SessionManager::new(api.clone(), Arc::new(store_with(None, Some("orphan"))));
    session.initialize().await;

    assert_eq!(session.refresh().await, Err(SessionError::NotSignedIn));
    assert_eq!(api.calls(), (0, 0, 0));
    assert_eq!(session.state(), SessionState::Unauthenticated(None));
}

// ─── Transitions racing an in-flight refresh ────────────────────────────────

fn admin_grant(token: &str) -> AuthGrant {
    AuthGrant {
        user: None,
        credentials: CredentialPair::new(token.to_string(), Some("refresh-admin".to_string())),
    }
}

#[tokio::test]
async fn logout_during_refresh_stays_signed_out() {
    let fresh = mint_token("5", "stock@shop.test", Role::Stockist, 2 * HOUR);
    let (session, api, store) = signed_in(
        ScriptedAuthApi::new()
            .with_refresh(Ok(CredentialPair::new(fresh, Some("refresh-2".to_string()))))
            .with_refresh_delay(Duration::from_millis(100)),
    )
    .await;

    let pending = {
        let session = session.clone();
        tokio::spawn(async move { session.refresh().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    session.logout();

    assert_eq!(pending.await.unwrap(), Err(SessionError::NotSignedIn));
    assert_eq!(api.calls(), (0, 0, 1));
    assert_eq!(session.state(), SessionState::Unauthenticated(None));
    assert!(store.is_empty());
}

#[tokio::test]
async fn login_during_refresh_keeps_the_new_user() {
    let fresh = mint_token("5", "stock@shop.test", Role::Stockist, 2 * HOUR);
    let admin_token = mint_token("8", "admin@b.com", Role::Admin, HOUR);
    let (session, _, store) = signed_in(
        ScriptedAuthApi::new()
            .with_refresh(Ok(CredentialPair::new(fresh, Some("refresh-2".to_string()))))
            .with_refresh_delay(Duration::from_millis(100))
            .with_login(Ok(admin_grant(&admin_token))),
    )
    .await;

    let pending = {
        let session = session.clone();
        tokio::spawn(async move { session.refresh().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let admin = session.login("admin@b.com", "pw").await.unwrap();
    assert_eq!(admin.role, Role::Admin);

    // The superseded refresh reports the session that replaced it.
    assert_eq!(pending.await.unwrap().map(|identity| identity.role), Ok(Role::Admin));
    assert_eq!(session.identity().map(|identity| identity.role), Some(Role::Admin));
    assert_eq!(store.get(ACCESS_TOKEN_KEY), Some(admin_token));
    assert_eq!(store.get(REFRESH_TOKEN_KEY).as_deref(), Some("refresh-admin"));
}

#[tokio::test]
async fn failed_refresh_after_login_does_not_sign_the_new_user_out() {
    let admin_token = mint_token("8", "admin@b.com", Role::Admin, HOUR);
    let (session, _, store) = signed_in(
        ScriptedAuthApi::new()
            .with_refresh(Err(AuthApiError::Rejected("revoked".to_string())))
            .with_refresh_delay(Duration::from_millis(100))
            .with_login(Ok(admin_grant(&admin_token))),
    )
    .await;

    let pending = {
        let session = session.clone();
        tokio::spawn(async move { session.refresh().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    session.login("admin@b.com", "pw").await.unwrap();

    assert!(pending.await.unwrap().is_ok());
    assert!(session.has_any_role(&[Role::Admin]));
    assert_eq!(store.get(ACCESS_TOKEN_KEY), Some(admin_token));
}
