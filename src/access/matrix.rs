//! Permission matrix store
//!
//! One permission record per role, stored in the `permissions` collection under
//! the role name. Records are normalized on every read; when the canonical form
//! differs from what was stored it is written back.
//!
//! Every read-modify-write of a record runs under that role's lock, so two
//! administrators editing different pages of the same role cannot overwrite
//! each other, and a self-healing write-back never clobbers a concurrent edit.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use super::AccessError;
use super::pages::PageRegistry;
use super::permissions::{PermissionLevel, PermissionRecord, normalize_record};
use super::roles::load_roles;
use crate::observability::{SelfHealKind, record_self_heal};
use crate::services::store::{DocumentStore, StoreError, WriteOperation, collections};

/// Guard held while a role's record is being read-modified-written
pub(crate) type RoleGuard = OwnedMutexGuard<()>;

/// Async mutex per role name
#[derive(Default)]
struct RoleLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RoleLocks {
    /// Entries that only the map still references are dropped on each
    /// acquire, so the map holds at most the roles currently locked or waited on
    async fn acquire(&self, role: &str) -> RoleGuard {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(role.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// Lock several roles, always in name order
    async fn acquire_all(&self, roles: &[&str]) -> Vec<RoleGuard> {
        let ordered: BTreeSet<&str> = roles.iter().copied().collect();
        let mut guards = Vec::with_capacity(ordered.len());
        for role in ordered {
            guards.push(self.acquire(role).await);
        }
        guards
    }
}

/// What a read had to do to produce a canonical record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Healing {
    Clean,
    Normalized,
    Synthesized,
    /// No record and no such role: full access returned, nothing persisted
    Transient,
}

/// Outcome of a reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub orphans_removed: Vec<String>,
    pub records_synthesized: Vec<String>,
    pub records_normalized: Vec<String>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.orphans_removed.is_empty()
            && self.records_synthesized.is_empty()
            && self.records_normalized.is_empty()
    }
}

pub struct PermissionMatrixStore {
    store: Arc<dyn DocumentStore>,
    pages: Arc<PageRegistry>,
    locks: RoleLocks,
}

impl PermissionMatrixStore {
    pub fn new(store: Arc<dyn DocumentStore>, pages: Arc<PageRegistry>) -> Self {
        Self {
            store,
            pages,
            locks: RoleLocks::default(),
        }
    }

    /// Permission record of `role`, normalized against the current page set.
    ///
    /// A role without a record gets an all-`Full` record, persisted only when
    /// the role exists in the role registry.
    pub async fn get_record(&self, role: &str) -> Result<PermissionRecord, AccessError> {
        let _guard = self.locks.acquire(role).await;
        let (record, _) = self.load_and_heal(role).await?;
        Ok(record)
    }

    /// Set one page's level for an existing role
    pub async fn set_level(
        &self,
        role: &str,
        page: &str,
        level: PermissionLevel,
    ) -> Result<PermissionRecord, AccessError> {
        if !self.pages.contains(page) {
            return Err(AccessError::page_not_found(page));
        }

        let _guard = self.locks.acquire(role).await;

        if !self.role_exists(role).await? {
            return Err(AccessError::role_not_found(role));
        }

        let (mut record, _) = self.current_record(role).await?;
        record.pages.insert(page.to_string(), level);

        self.store
            .put(collections::PERMISSIONS, role, record.to_document())
            .await?;

        info!(role = %role, page = %page, level = %level, "Permission level updated");
        Ok(record)
    }

    /// Every stored record, normalized, ordered by role name
    pub async fn list_records(&self) -> Result<Vec<PermissionRecord>, AccessError> {
        let docs = self.store.list(collections::PERMISSIONS).await?;
        Ok(docs
            .iter()
            .map(|(role, doc)| normalize_record(role, Some(doc), self.pages.page_names()).record)
            .collect())
    }

    /// Remove records that match no role and heal the record of every role
    pub async fn reconcile(&self) -> Result<ReconcileReport, AccessError> {
        // Records are listed before roles so a role created mid-pass is never
        // mistaken for an orphan.
        let record_ids: Vec<String> = self
            .store
            .list(collections::PERMISSIONS)
            .await?
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        let role_names: BTreeSet<String> = load_roles(self.store.as_ref())
            .await?
            .into_iter()
            .map(|role| role.name)
            .collect();

        let mut report = ReconcileReport::default();

        for id in record_ids.iter().filter(|id| !role_names.contains(*id)) {
            let _guard = self.locks.acquire(id).await;
            if self.role_exists(id).await? {
                continue;
            }
            if self.store.delete(collections::PERMISSIONS, id).await? {
                info!(role = %id, "Removed orphan permission record");
                report.orphans_removed.push(id.clone());
            }
        }

        for role in &role_names {
            let _guard = self.locks.acquire(role).await;
            let (_, healing) = self.load_and_heal(role).await?;
            match healing {
                Healing::Synthesized => report.records_synthesized.push(role.clone()),
                Healing::Normalized => report.records_normalized.push(role.clone()),
                Healing::Clean | Healing::Transient => {}
            }
        }

        record_self_heal(SelfHealKind::OrphanRecordRemoved, report.orphans_removed.len() as u64);

        info!(
            orphans_removed = report.orphans_removed.len(),
            records_synthesized = report.records_synthesized.len(),
            records_normalized = report.records_normalized.len(),
            "Permission records reconciled"
        );
        Ok(report)
    }

    /// All-`Full` record over the current page set
    pub fn full_access(&self, role: &str) -> PermissionRecord {
        PermissionRecord::full_access(role, self.pages.page_names())
    }

    /// Lock the given roles for a multi-record write
    pub(crate) async fn lock_roles(&self, roles: &[&str]) -> Vec<RoleGuard> {
        self.locks.acquire_all(roles).await
    }

    /// Normalized record without writing anything back; the caller holds the
    /// role's lock. The flag tells whether a record was stored at all.
    pub(crate) async fn current_record(
        &self,
        role: &str,
    ) -> Result<(PermissionRecord, bool), StoreError> {
        let raw = self.store.get(collections::PERMISSIONS, role).await?;
        let exists = raw.is_some();
        let normalized = normalize_record(role, raw.as_ref(), self.pages.page_names());
        Ok((normalized.record, exists))
    }

    async fn load_and_heal(&self, role: &str) -> Result<(PermissionRecord, Healing), AccessError> {
        let raw = self.store.get(collections::PERMISSIONS, role).await?;
        let normalized = normalize_record(role, raw.as_ref(), self.pages.page_names());

        if !normalized.changed {
            return Ok((normalized.record, Healing::Clean));
        }

        let healing = if raw.is_some() {
            Healing::Normalized
        } else {
            match self.role_exists(role).await {
                Ok(true) => Healing::Synthesized,
                Ok(false) => Healing::Transient,
                Err(e) => {
                    warn!(role = %role, error = %e, "Could not check role existence, not persisting synthesized record");
                    Healing::Transient
                }
            }
        };

        if healing == Healing::Transient {
            debug!(role = %role, "No permission record for unknown role, granting full access without persisting");
            return Ok((normalized.record, healing));
        }

        match self
            .store
            .put(collections::PERMISSIONS, role, normalized.record.to_document())
            .await
        {
            Ok(()) if healing == Healing::Synthesized => {
                info!(role = %role, "Synthesized full-access permission record");
                record_self_heal(SelfHealKind::RecordSynthesized, 1);
            }
            Ok(()) => {
                debug!(role = %role, "Rewrote permission record in canonical form");
                record_self_heal(SelfHealKind::RecordNormalized, 1);
            }
            Err(e) => {
                warn!(role = %role, error = %e, "Failed to persist normalized permission record");
            }
        }

        Ok((normalized.record, healing))
    }

    async fn role_exists(&self, role: &str) -> Result<bool, StoreError> {
        Ok(load_roles(self.store.as_ref())
            .await?
            .iter()
            .any(|r| r.name == role))
    }

    /// Operations moving `record` to `new_role`, for inclusion in a rename batch
    pub(crate) fn rename_operations(
        &self,
        record: &PermissionRecord,
        old_role: &str,
        new_role: &str,
    ) -> Vec<WriteOperation> {
        let mut batch = vec![WriteOperation::put(
            collections::PERMISSIONS,
            new_role,
            record.renamed(new_role).to_document(),
        )];
        if old_role != new_role {
            batch.push(WriteOperation::delete(collections::PERMISSIONS, old_role));
        }
        batch
    }
}
