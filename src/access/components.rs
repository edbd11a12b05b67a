//! Access control components for dependency injection
//!
//! [`AccessControl`] bundles every store, the session cache and the document
//! store they share, and exposes the administrative operations. Each write is
//! followed by a refresh of the session snapshot when the write touches the
//! session's role, so an administrator editing their own role sees the change
//! on the next check.

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use super::matrix::{PermissionMatrixStore, ReconcileReport};
use super::pages::{MaterializeReport, Page, PageControlStore, PageDefinition, PageRegistry, CATALOG};
use super::permissions::{PermissionLevel, PermissionRecord};
use super::roles::{Role, RoleRegistry, RoleUpdate, UpdatedRole};
use super::session::PermissionSnapshotCache;
use super::AccessError;
use crate::config::{AccessConfig, StoreBackend, StoreConfig};
use crate::observability::{AdminOperation, WriteStatus, record_admin_write};
use crate::services::store::{DocumentStore, FileStore, MemoryStore};

/// What startup bootstrap did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapReport {
    pub pages_inserted: usize,
    pub duplicate_pages_removed: usize,
    pub seeded_admin_role: Option<String>,
    pub reconcile: Option<ReconcileReport>,
}

#[derive(Clone)]
pub struct AccessControl {
    pub store: Arc<dyn DocumentStore>,
    pub pages: Arc<PageRegistry>,
    pub page_controls: Arc<PageControlStore>,
    pub matrix: Arc<PermissionMatrixStore>,
    pub roles: Arc<RoleRegistry>,
    pub session: Arc<PermissionSnapshotCache>,
}

fn status_of<T>(result: &Result<T, AccessError>) -> WriteStatus {
    match result {
        Ok(_) => WriteStatus::Success,
        Err(AccessError::Store(_)) => WriteStatus::Error,
        Err(_) => WriteStatus::Rejected,
    }
}

impl AccessControl {
    /// Components over `store` with the built-in page catalog
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_catalog(store, CATALOG.to_vec())
    }

    pub fn with_catalog(store: Arc<dyn DocumentStore>, catalog: Vec<PageDefinition>) -> Self {
        let pages = Arc::new(PageRegistry::with_catalog(store.clone(), catalog));
        let page_controls = Arc::new(PageControlStore::new(store.clone(), pages.clone()));
        let matrix = Arc::new(PermissionMatrixStore::new(store.clone(), pages.clone()));
        let roles = Arc::new(RoleRegistry::new(store.clone(), matrix.clone()));
        let session = Arc::new(PermissionSnapshotCache::new(
            matrix.clone(),
            pages.clone(),
            page_controls.clone(),
        ));

        Self {
            store,
            pages,
            page_controls,
            matrix,
            roles,
            session,
        }
    }

    /// In-memory components, used by tests and development
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Components over the configured store backend
    pub async fn from_config(config: &StoreConfig) -> Result<Self> {
        let store: Arc<dyn DocumentStore> = match config.backend {
            StoreBackend::Memory => {
                info!("Using in-memory document store");
                Arc::new(MemoryStore::new())
            }
            StoreBackend::File => {
                info!(path = %config.path.display(), "Using file document store");
                Arc::new(
                    FileStore::open(&config.path)
                        .await
                        .with_context(|| format!("Failed to open store at {}", config.path.display()))?,
                )
            }
        };
        Ok(Self::new(store))
    }

    /// Materialize pages, seed the administrator role into an empty registry
    /// and optionally reconcile permission records
    pub async fn bootstrap(&self, config: &AccessConfig) -> Result<BootstrapReport, AccessError> {
        let MaterializeReport {
            inserted,
            duplicates_removed,
        } = self.pages.ensure_materialized().await?;

        let mut report = BootstrapReport {
            pages_inserted: inserted,
            duplicate_pages_removed: duplicates_removed,
            ..BootstrapReport::default()
        };

        if self.roles.list_roles().await?.is_empty() {
            let role = self
                .roles
                .create_role(&config.bootstrap_admin_role, "Built-in administrator role")
                .await?;
            info!(role = %role.name, "Seeded administrator role");
            report.seeded_admin_role = Some(role.name);
        }

        if config.reconcile_on_start {
            report.reconcile = Some(self.matrix.reconcile().await?);
        }

        Ok(report)
    }

    pub async fn list_pages(&self) -> Vec<Page> {
        self.pages.list_pages().await
    }

    pub async fn set_enabled(&self, page: &str, enabled: bool) -> Result<Page, AccessError> {
        let result = self.page_controls.set_enabled(page, enabled).await;
        record_admin_write(AdminOperation::SetEnabled, status_of(&result));
        // Page controls are read fresh on every check; nothing to refresh
        result
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>, AccessError> {
        self.roles.list_roles().await
    }

    pub async fn get_role(&self, id: &str) -> Result<Role, AccessError> {
        self.roles.get_role(id).await
    }

    pub async fn create_role(&self, name: &str, description: &str) -> Result<Role, AccessError> {
        let result = self.roles.create_role(name, description).await;
        record_admin_write(AdminOperation::CreateRole, status_of(&result));
        result
    }

    pub async fn rename_role(&self, id: &str, new_name: &str) -> Result<UpdatedRole, AccessError> {
        self.update_role(
            id,
            RoleUpdate {
                name: Some(new_name.to_string()),
                description: None,
            },
        )
        .await
    }

    pub async fn update_role(&self, id: &str, update: RoleUpdate) -> Result<UpdatedRole, AccessError> {
        let result = self.roles.update_role(id, update).await;
        record_admin_write(AdminOperation::RenameRole, status_of(&result));

        let updated = result?;
        if updated.renamed() {
            self.session
                .role_renamed(&updated.previous_name, &updated.role.name)
                .await;
        }
        Ok(updated)
    }

    pub async fn delete_role(&self, id: &str) -> Result<Role, AccessError> {
        let result = self.roles.delete_role(id).await;
        record_admin_write(AdminOperation::DeleteRole, status_of(&result));

        let role = result?;
        self.session.refresh_role(&role.name).await;
        Ok(role)
    }

    pub async fn get_record(&self, role: &str) -> Result<PermissionRecord, AccessError> {
        self.matrix.get_record(role).await
    }

    pub async fn list_records(&self) -> Result<Vec<PermissionRecord>, AccessError> {
        self.matrix.list_records().await
    }

    pub async fn set_level(
        &self,
        role: &str,
        page: &str,
        level: PermissionLevel,
    ) -> Result<PermissionRecord, AccessError> {
        let result = self.matrix.set_level(role, page, level).await;
        record_admin_write(AdminOperation::SetLevel, status_of(&result));

        let record = result?;
        self.session.refresh_role(role).await;
        Ok(record)
    }

    pub async fn reconcile(&self) -> Result<ReconcileReport, AccessError> {
        let result = self.matrix.reconcile().await;
        record_admin_write(AdminOperation::Reconcile, status_of(&result));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::pages::SETTINGS_PAGE;
    use crate::services::store::collections;
    use tempfile::TempDir;

    fn access() -> AccessControl {
        AccessControl::in_memory()
    }

    #[tokio::test]
    async fn test_bootstrap_seeds_admin_once() {
        let access = access();
        let config = AccessConfig::default();

        let report = access.bootstrap(&config).await.unwrap();
        assert_eq!(report.pages_inserted, CATALOG.len());
        assert_eq!(report.seeded_admin_role.as_deref(), Some("admin"));
        let reconcile = report.reconcile.unwrap();
        assert!(reconcile.is_clean());

        let again = access.bootstrap(&config).await.unwrap();
        assert_eq!(again.pages_inserted, 0);
        assert_eq!(again.seeded_admin_role, None);
        assert_eq!(access.list_roles().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_without_reconcile() {
        let access = access();
        let config = AccessConfig {
            bootstrap_admin_role: "Administrator".to_string(),
            reconcile_on_start: false,
        };

        let report = access.bootstrap(&config).await.unwrap();

        assert_eq!(report.seeded_admin_role.as_deref(), Some("Administrator"));
        assert!(report.reconcile.is_none());
    }

    #[tokio::test]
    async fn test_set_level_refreshes_session() {
        let access = access();
        access.create_role("Nurse", "").await.unwrap();
        access.session.sign_in("u1", "Nurse").await.unwrap();
        assert!(access.session.can_access_page("Payrolls").await);

        access
            .set_level("Nurse", "Payrolls", PermissionLevel::None)
            .await
            .unwrap();

        assert!(!access.session.can_access_page("Payrolls").await);
    }

    #[tokio::test]
    async fn test_edits_to_other_roles_leave_session_alone() {
        let access = access();
        access.create_role("Nurse", "").await.unwrap();
        access.create_role("Doctor", "").await.unwrap();
        let before = access.session.sign_in("u1", "Nurse").await.unwrap();

        access
            .set_level("Doctor", "Payrolls", PermissionLevel::None)
            .await
            .unwrap();

        let after = access.session.snapshot().await.unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn test_rename_moves_session_role() {
        let access = access();
        let role = access.create_role("Nurse", "").await.unwrap();
        access
            .set_level("Nurse", "Leave", PermissionLevel::View)
            .await
            .unwrap();
        access.session.sign_in("u1", "Nurse").await.unwrap();

        access.rename_role(&role.id, "Charge Nurse").await.unwrap();

        let snapshot = access.session.snapshot().await.unwrap();
        assert_eq!(snapshot.role, "Charge Nurse");
        assert_eq!(snapshot.level("Leave"), PermissionLevel::View);
    }

    #[tokio::test]
    async fn test_delete_role_session_falls_back_to_full() {
        let access = access();
        let role = access.create_role("Nurse", "").await.unwrap();
        access
            .set_level("Nurse", "Payrolls", PermissionLevel::None)
            .await
            .unwrap();
        access.session.sign_in("u1", "Nurse").await.unwrap();

        access.delete_role(&role.id).await.unwrap();

        assert!(access.session.can_access_page("Payrolls").await);
        assert!(access
            .store
            .get(collections::PERMISSIONS, "Nurse")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_settings_kill_switch_through_facade() {
        let access = access();
        access.bootstrap(&AccessConfig::default()).await.unwrap();
        access.create_role("Nurse", "").await.unwrap();
        access.set_enabled(SETTINGS_PAGE, false).await.unwrap();

        access.session.sign_in("u1", "Nurse").await.unwrap();
        assert!(!access.session.can_access_page(SETTINGS_PAGE).await);

        access.session.sign_in("u0", "admin").await.unwrap();
        assert!(access.session.can_access_page(SETTINGS_PAGE).await);
    }

    #[tokio::test]
    async fn test_file_backend_survives_restart() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig {
            backend: StoreBackend::File,
            path: dir.path().join("store.json"),
        };

        let access = AccessControl::from_config(&config).await.unwrap();
        access.bootstrap(&AccessConfig::default()).await.unwrap();
        access.create_role("Nurse", "").await.unwrap();
        access
            .set_level("Nurse", "Fines", PermissionLevel::Partial)
            .await
            .unwrap();

        let restarted = AccessControl::from_config(&config).await.unwrap();
        let report = restarted.bootstrap(&AccessConfig::default()).await.unwrap();

        assert_eq!(report.pages_inserted, 0);
        assert_eq!(report.seeded_admin_role, None);
        let record = restarted.get_record("Nurse").await.unwrap();
        assert_eq!(record.level("Fines"), PermissionLevel::Partial);
    }
}
