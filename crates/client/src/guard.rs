//! Route guard bound to a live session.

use tokio::sync::watch;

use storefront_auth::{GuardDecision, RouteRequirements, RouteTable, SessionState, evaluate};

use crate::session::SessionManager;

/// Evaluates navigations against the session manager's published state.
///
/// Holds only a read handle; the session manager remains the sole writer.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    session: watch::Receiver<SessionState>,
    table: RouteTable,
}

impl RouteGuard {
    pub fn new(session: &SessionManager, table: RouteTable) -> Self {
        Self {
            session: session.subscribe(),
            table,
        }
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    /// Decide for `location` using the route table.
    pub fn check(&self, location: &str) -> GuardDecision {
        self.table.evaluate(&self.session.borrow(), location)
    }

    /// Decide for `location` with explicit per-route requirements.
    pub fn check_with(&self, requirements: &RouteRequirements, location: &str) -> GuardDecision {
        evaluate(&self.session.borrow(), requirements, location)
    }

    /// Wait until the session has left `Initializing`, then decide.
    ///
    /// If the session manager is gone before deciding, the visitor is treated
    /// as signed out.
    pub async fn wait_until_decided(&mut self, location: &str) -> GuardDecision {
        let settled = match self.session.wait_for(|state| !state.is_initializing()).await {
            Ok(state) => state.clone(),
            Err(_) => SessionState::signed_out(),
        };
        self.table.evaluate(&settled, location)
    }

    /// Wait for the next session change and re-decide for `location`.
    ///
    /// Returns `None` once the session manager has been dropped.
    pub async fn next_decision(&mut self, location: &str) -> Option<GuardDecision> {
        self.session.changed().await.ok()?;
        Some(self.check(location))
    }
}
