//! Permission snapshot cache
//!
//! Holds the resolved permissions of the current session. The cache is created
//! unresolved and only answers "allowed" once a sign-in has produced a
//! snapshot; sign-out clears it. Every state change bumps an epoch under the
//! state lock, and a sign-in or refresh only installs its snapshot if the
//! epoch is unchanged, so a sign-out that lands while a sign-in is still
//! loading always wins.

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::engine::{self, UserPermissionSnapshot};
use super::matrix::PermissionMatrixStore;
use super::pages::{Page, PageControlStore, PageRegistry};
use super::permissions::PermissionLevel;

/// Route a denied guard redirects to
pub const DENIED_ROUTE: &str = "/access-denied";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Authentication has not resolved yet; everything is denied
    Unresolved,
    SignedOut,
    Active {
        user_id: String,
        snapshot: Arc<UserPermissionSnapshot>,
    },
}

impl SessionState {
    pub fn snapshot(&self) -> Option<&Arc<UserPermissionSnapshot>> {
        match self {
            SessionState::Active { snapshot, .. } => Some(snapshot),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Unresolved => "unresolved",
            SessionState::SignedOut => "signed_out",
            SessionState::Active { .. } => "active",
        }
    }
}

/// Verdict of a route guard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "camelCase")]
pub enum GuardDecision {
    Allow { level: PermissionLevel },
    Deny { redirect: &'static str },
}

pub struct PermissionSnapshotCache {
    matrix: Arc<PermissionMatrixStore>,
    pages: Arc<PageRegistry>,
    controls: Arc<PageControlStore>,
    state: RwLock<SessionState>,
    epoch: AtomicU64,
}

impl PermissionSnapshotCache {
    pub fn new(
        matrix: Arc<PermissionMatrixStore>,
        pages: Arc<PageRegistry>,
        controls: Arc<PageControlStore>,
    ) -> Self {
        Self {
            matrix,
            pages,
            controls,
            state: RwLock::new(SessionState::Unresolved),
            epoch: AtomicU64::new(0),
        }
    }

    pub async fn state(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn snapshot(&self) -> Option<Arc<UserPermissionSnapshot>> {
        self.state.read().await.snapshot().cloned()
    }

    /// Mark authentication as in progress, returning the new epoch
    pub async fn begin_authentication(&self) -> u64 {
        let mut state = self.state.write().await;
        *state = SessionState::Unresolved;
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Resolve the snapshot for an authenticated identity.
    ///
    /// Returns `None` when a sign-out or another sign-in superseded this one
    /// while the record was loading.
    pub async fn sign_in(&self, user_id: &str, role: &str) -> Option<Arc<UserPermissionSnapshot>> {
        let ticket = self.begin_authentication().await;
        let snapshot = Arc::new(self.resolve(role).await);

        if self.install(ticket, user_id, snapshot.clone()).await {
            info!(user_id = %user_id, role = %role, "Session permissions resolved");
            Some(snapshot)
        } else {
            debug!(user_id = %user_id, "Discarding superseded sign-in snapshot");
            None
        }
    }

    pub async fn sign_out(&self) {
        let mut state = self.state.write().await;
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *state = SessionState::SignedOut;
        info!("Session signed out");
    }

    /// Reload the active session's snapshot
    pub async fn refresh(&self) -> Option<Arc<UserPermissionSnapshot>> {
        let (ticket, user_id, role) = {
            let state = self.state.read().await;
            match &*state {
                SessionState::Active { user_id, snapshot } => (
                    self.epoch.load(Ordering::SeqCst),
                    user_id.clone(),
                    snapshot.role.clone(),
                ),
                _ => return None,
            }
        };

        self.reload(ticket, &user_id, &role).await
    }

    /// Refresh only if the active session holds `role`
    pub async fn refresh_role(&self, role: &str) -> bool {
        if self.active_role().await.as_deref() != Some(role) {
            return false;
        }
        self.refresh().await.is_some()
    }

    /// Move an active session holding `old_role` to `new_role`
    pub async fn role_renamed(&self, old_role: &str, new_role: &str) -> bool {
        let (ticket, user_id) = {
            let state = self.state.read().await;
            match &*state {
                SessionState::Active { user_id, snapshot } if snapshot.role == old_role => {
                    (self.epoch.load(Ordering::SeqCst), user_id.clone())
                }
                _ => return false,
            }
        };

        self.reload(ticket, &user_id, new_role).await.is_some()
    }

    /// Guard-side decision. Denied while unresolved or signed out.
    pub async fn can_access_page(&self, page: &str) -> bool {
        let Some(snapshot) = self.snapshot().await else {
            return false;
        };
        let controls = self.controls.controls().await;
        engine::can_access_page(&snapshot, &controls, page)
    }

    pub async fn permission_level(&self, page: &str) -> Option<PermissionLevel> {
        self.snapshot()
            .await
            .map(|snapshot| engine::permission_level(&snapshot, page))
    }

    pub async fn guard(&self, page: &str) -> GuardDecision {
        let Some(snapshot) = self.snapshot().await else {
            return GuardDecision::Deny {
                redirect: DENIED_ROUTE,
            };
        };
        let controls = self.controls.controls().await;

        if engine::can_access_page(&snapshot, &controls, page) {
            GuardDecision::Allow {
                level: engine::permission_level(&snapshot, page),
            }
        } else {
            GuardDecision::Deny {
                redirect: DENIED_ROUTE,
            }
        }
    }

    /// Pages to render in the sidebar and the bottom navigation
    pub async fn navigation(&self) -> Vec<Page> {
        let Some(snapshot) = self.snapshot().await else {
            return Vec::new();
        };

        if let Err(e) = self.pages.ensure_materialized().await {
            warn!(error = %e, "Page registry materialization failed");
        }
        let controls = self.controls.controls().await;
        let pages = self.pages.pages_with(&controls);

        engine::visible_pages(&pages, &snapshot, &controls)
    }

    async fn active_role(&self) -> Option<String> {
        self.snapshot().await.map(|snapshot| snapshot.role.clone())
    }

    async fn reload(
        &self,
        ticket: u64,
        user_id: &str,
        role: &str,
    ) -> Option<Arc<UserPermissionSnapshot>> {
        let snapshot = Arc::new(self.resolve(role).await);

        if self.install(ticket, user_id, snapshot.clone()).await {
            debug!(user_id = %user_id, role = %role, "Session permissions refreshed");
            Some(snapshot)
        } else {
            debug!(user_id = %user_id, "Discarding superseded refresh");
            None
        }
    }

    async fn install(&self, ticket: u64, user_id: &str, snapshot: Arc<UserPermissionSnapshot>) -> bool {
        let mut state = self.state.write().await;
        if self.epoch.load(Ordering::SeqCst) != ticket {
            return false;
        }
        *state = SessionState::Active {
            user_id: user_id.to_string(),
            snapshot,
        };
        true
    }

    async fn resolve(&self, role: &str) -> UserPermissionSnapshot {
        let record = match self.matrix.get_record(role).await {
            Ok(record) => record,
            Err(e) => {
                warn!(role = %role, error = %e, "Failed to load permission record, granting full access");
                self.matrix.full_access(role)
            }
        };
        UserPermissionSnapshot::from_record(record)
    }
}
