//! Role registry
//!
//! Roles are stored in the `roles` collection under a generated id. The role
//! name is the key of the role's permission record, so renaming and deleting a
//! role cascade into the permission matrix in the same atomic batch.
//!
//! Name collisions are checked case-insensitively.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use super::AccessError;
use super::matrix::PermissionMatrixStore;
use crate::observability::{SelfHealKind, record_self_heal};
use crate::services::store::{DocumentStore, StoreError, WriteOperation, collections};

const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Stored form of a role; the id is the document key
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleDocument {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    created_at: DateTime<Utc>,
}

impl Role {
    fn from_document(id: String, doc: Value) -> Result<Self, serde_json::Error> {
        let doc: RoleDocument = serde_json::from_value(doc)?;
        Ok(Self {
            id,
            name: doc.name,
            description: doc.description,
            created_at: doc.created_at,
        })
    }

    fn to_document(&self) -> Result<Value, StoreError> {
        Ok(serde_json::to_value(RoleDocument {
            name: self.name.clone(),
            description: self.description.clone(),
            created_at: self.created_at,
        })?)
    }

    /// Whether this role holds the built-in administrator name
    pub fn is_admin(&self) -> bool {
        super::engine::is_admin_role(&self.name)
    }
}

/// Every role in the store, ordered by name. Malformed documents are skipped.
pub(crate) async fn load_roles(store: &dyn DocumentStore) -> Result<Vec<Role>, StoreError> {
    let mut roles: Vec<Role> = store
        .list(collections::ROLES)
        .await?
        .into_iter()
        .filter_map(|(id, doc)| match Role::from_document(id.clone(), doc) {
            Ok(role) => Some(role),
            Err(e) => {
                warn!(role_id = %id, error = %e, "Skipping malformed role document");
                None
            }
        })
        .collect();

    roles.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(roles)
}

fn validate_name(name: &str) -> Result<String, AccessError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AccessError::InvalidInput("role name must not be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AccessError::InvalidInput(format!(
            "role name must be at most {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

fn collides(existing: &[Role], name: &str, except_id: Option<&str>) -> bool {
    let folded = name.to_lowercase();
    existing
        .iter()
        .filter(|role| Some(role.id.as_str()) != except_id)
        .any(|role| role.name.to_lowercase() == folded)
}

/// Changes applied by [`RoleRegistry::update_role`]
#[derive(Debug, Clone, Default)]
pub struct RoleUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Result of an update, with the name the role had before
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedRole {
    pub role: Role,
    pub previous_name: String,
}

impl UpdatedRole {
    pub fn renamed(&self) -> bool {
        self.role.name != self.previous_name
    }
}

pub struct RoleRegistry {
    store: Arc<dyn DocumentStore>,
    matrix: Arc<PermissionMatrixStore>,
    // Serializes registry writes so collision checks and the writes they guard
    // see the same role set.
    write_lock: Mutex<()>,
}

impl RoleRegistry {
    pub fn new(store: Arc<dyn DocumentStore>, matrix: Arc<PermissionMatrixStore>) -> Self {
        Self {
            store,
            matrix,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>, AccessError> {
        Ok(load_roles(self.store.as_ref()).await?)
    }

    pub async fn get_role(&self, id: &str) -> Result<Role, AccessError> {
        let doc = self
            .store
            .get(collections::ROLES, id)
            .await?
            .ok_or_else(|| AccessError::role_not_found(id))?;
        Role::from_document(id.to_string(), doc)
            .map_err(|e| AccessError::Store(StoreError::from(e)))
    }

    /// Role holding exactly `name`
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Role>, AccessError> {
        Ok(self
            .list_roles()
            .await?
            .into_iter()
            .find(|role| role.name == name))
    }

    /// Create a role together with its all-`Full` permission record
    pub async fn create_role(&self, name: &str, description: &str) -> Result<Role, AccessError> {
        let name = validate_name(name)?;
        let _write = self.write_lock.lock().await;

        let existing = load_roles(self.store.as_ref()).await?;
        if collides(&existing, &name, None) {
            return Err(AccessError::DuplicateRole(name));
        }

        let role = Role {
            id: Uuid::new_v4().to_string(),
            name,
            description: description.trim().to_string(),
            created_at: Utc::now(),
        };

        let _guards = self.matrix.lock_roles(&[role.name.as_str()]).await;
        let record = self.matrix.full_access(&role.name);
        self.store
            .commit(vec![
                WriteOperation::put(collections::ROLES, &role.id, role.to_document()?),
                WriteOperation::put(collections::PERMISSIONS, &role.name, record.to_document()),
            ])
            .await?;

        info!(role_id = %role.id, role = %role.name, "Role created");
        Ok(role)
    }

    /// Rename a role, moving its permission record to the new name
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

    /// Apply a rename and/or description change as one batch
    pub async fn update_role(&self, id: &str, update: RoleUpdate) -> Result<UpdatedRole, AccessError> {
        let new_name = update.name.as_deref().map(validate_name).transpose()?;
        let _write = self.write_lock.lock().await;

        let existing = load_roles(self.store.as_ref()).await?;
        let current = existing
            .iter()
            .find(|role| role.id == id)
            .cloned()
            .ok_or_else(|| AccessError::role_not_found(id))?;

        let mut role = current.clone();
        if let Some(name) = new_name {
            if collides(&existing, &name, Some(id)) {
                return Err(AccessError::DuplicateRole(name));
            }
            role.name = name;
        }
        if let Some(description) = update.description {
            role.description = description.trim().to_string();
        }

        if role == current {
            return Ok(UpdatedRole {
                previous_name: current.name,
                role,
            });
        }

        let mut batch = vec![WriteOperation::put(collections::ROLES, &role.id, role.to_document()?)];

        let _guards = self
            .matrix
            .lock_roles(&[current.name.as_str(), role.name.as_str()])
            .await;
        if role.name != current.name {
            let (record, _) = self.matrix.current_record(&current.name).await?;
            batch.extend(self.matrix.rename_operations(&record, &current.name, &role.name));
        }

        self.store.commit(batch).await?;

        if role.name != current.name {
            info!(role_id = %role.id, from = %current.name, to = %role.name, "Role renamed");
        } else {
            info!(role_id = %role.id, role = %role.name, "Role updated");
        }

        Ok(UpdatedRole {
            previous_name: current.name,
            role,
        })
    }

    /// Delete a role and its permission record
    pub async fn delete_role(&self, id: &str) -> Result<Role, AccessError> {
        let _write = self.write_lock.lock().await;
        let role = self.get_role(id).await?;

        let _guards = self.matrix.lock_roles(&[role.name.as_str()]).await;
        let has_record = self
            .store
            .get(collections::PERMISSIONS, &role.name)
            .await?
            .is_some();

        let mut batch = vec![WriteOperation::delete(collections::ROLES, &role.id)];
        if has_record {
            batch.push(WriteOperation::delete(collections::PERMISSIONS, &role.name));
        } else {
            warn!(role = %role.name, "Deleted role had no permission record");
            record_self_heal(SelfHealKind::MissingRecordOnDelete, 1);
        }

        self.store.commit(batch).await?;

        info!(role_id = %role.id, role = %role.name, "Role deleted");
        Ok(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::pages::{PageDefinition, PageRegistry, SETTINGS_PAGE};
    use crate::access::permissions::PermissionLevel;
    use crate::services::store::MemoryStore;
    use crate::services::store::testing::FaultyStore;
    use serde_json::json;
    use tracing_test::traced_test;

    fn setup_over(store: Arc<dyn DocumentStore>) -> (Arc<PermissionMatrixStore>, RoleRegistry) {
        let pages = Arc::new(PageRegistry::with_catalog(
            store.clone(),
            vec![
                PageDefinition::new("Dashboard", "/dashboard", "Overview", "dashboard"),
                PageDefinition::new("Leave", "/leave", "Leave", "event_busy"),
                PageDefinition::new(SETTINGS_PAGE, "/settings", "Settings", "settings"),
            ],
        ));
        let matrix = Arc::new(PermissionMatrixStore::new(store.clone(), pages));
        let roles = RoleRegistry::new(store, matrix.clone());
        (matrix, roles)
    }

    fn setup() -> (Arc<MemoryStore>, Arc<PermissionMatrixStore>, RoleRegistry) {
        let store = Arc::new(MemoryStore::new());
        let (matrix, roles) = setup_over(store.clone());
        (store, matrix, roles)
    }

    #[tokio::test]
    async fn test_create_role_writes_record() {
        let (store, matrix, roles) = setup();

        let role = roles.create_role("  Nurse ", "Ward staff").await.unwrap();

        assert_eq!(role.name, "Nurse");
        assert_eq!(roles.get_role(&role.id).await.unwrap(), role);
        assert!(store.get(collections::PERMISSIONS, "Nurse").await.unwrap().is_some());
        assert_eq!(matrix.get_record("Nurse").await.unwrap(), matrix.full_access("Nurse"));
    }

    #[tokio::test]
    async fn test_duplicate_name_is_case_insensitive() {
        let (_, _, roles) = setup();
        roles.create_role("Nurse", "").await.unwrap();

        let result = roles.create_role("NURSE", "").await;
        assert!(matches!(result, Err(AccessError::DuplicateRole(_))));
    }

    #[tokio::test]
    async fn test_duplicate_name_folds_non_ascii() {
        let (_, _, roles) = setup();
        roles.create_role("ärztin", "").await.unwrap();

        let result = roles.create_role("ÄRZTIN", "").await;
        assert!(matches!(result, Err(AccessError::DuplicateRole(_))));
        assert_eq!(roles.list_roles().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_names_rejected() {
        let (_, _, roles) = setup();

        assert!(matches!(roles.create_role("   ", "").await, Err(AccessError::InvalidInput(_))));
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(roles.create_role(&long, "").await, Err(AccessError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_rename_moves_record() {
        let (store, matrix, roles) = setup();
        let role = roles.create_role("Nurse", "").await.unwrap();
        matrix.set_level("Nurse", "Leave", PermissionLevel::None).await.unwrap();

        let updated = roles.rename_role(&role.id, "Charge Nurse").await.unwrap();

        assert!(updated.renamed());
        assert_eq!(updated.previous_name, "Nurse");
        assert!(store.get(collections::PERMISSIONS, "Nurse").await.unwrap().is_none());
        let record = matrix.get_record("Charge Nurse").await.unwrap();
        assert_eq!(record.role, "Charge Nurse");
        assert_eq!(record.level("Leave"), PermissionLevel::None);
        assert_eq!(roles.get_role(&role.id).await.unwrap().name, "Charge Nurse");
    }

    #[tokio::test]
    async fn test_rename_case_only_is_allowed() {
        let (store, _, roles) = setup();
        let role = roles.create_role("nurse", "").await.unwrap();

        let updated = roles.rename_role(&role.id, "Nurse").await.unwrap();

        assert_eq!(updated.role.name, "Nurse");
        let ids: Vec<String> = store
            .list(collections::PERMISSIONS)
            .await
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec!["Nurse"]);
    }

    #[tokio::test]
    async fn test_rename_collision_and_unknown_id() {
        let (_, _, roles) = setup();
        let nurse = roles.create_role("Nurse", "").await.unwrap();
        roles.create_role("Doctor", "").await.unwrap();

        let result = roles.rename_role(&nurse.id, "doctor").await;
        assert!(matches!(result, Err(AccessError::DuplicateRole(_))));

        let result = roles.rename_role("missing", "Clerk").await;
        assert!(matches!(result, Err(AccessError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_update_description_only() {
        let (_, _, roles) = setup();
        let role = roles.create_role("Nurse", "old").await.unwrap();

        let updated = roles
            .update_role(
                &role.id,
                RoleUpdate {
                    name: None,
                    description: Some("Ward staff".to_string()),
                },
            )
            .await
            .unwrap();

        assert!(!updated.renamed());
        assert_eq!(updated.role.description, "Ward staff");
    }

    #[tokio::test]
    async fn test_delete_cascades_to_record() {
        let (store, matrix, roles) = setup();
        let role = roles.create_role("Nurse", "").await.unwrap();
        matrix.set_level("Nurse", "Leave", PermissionLevel::None).await.unwrap();

        roles.delete_role(&role.id).await.unwrap();

        assert!(store.get(collections::PERMISSIONS, "Nurse").await.unwrap().is_none());
        // No stale data: an unknown role reads as full access
        assert_eq!(matrix.get_record("Nurse").await.unwrap(), matrix.full_access("Nurse"));
        assert!(store.get(collections::PERMISSIONS, "Nurse").await.unwrap().is_none());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_delete_without_record_succeeds() {
        let (store, _, roles) = setup();
        let role = roles.create_role("Nurse", "").await.unwrap();
        store.delete(collections::PERMISSIONS, "Nurse").await.unwrap();

        roles.delete_role(&role.id).await.unwrap();

        assert!(roles.list_roles().await.unwrap().is_empty());
        assert!(logs_contain("Deleted role had no permission record"));
    }

    #[tokio::test]
    async fn test_failed_rename_leaves_state_untouched() {
        let store = Arc::new(FaultyStore::new());
        let (matrix, roles) = setup_over(store.clone());
        let role = roles.create_role("Nurse", "").await.unwrap();

        store.fail_writes(true);
        assert!(matches!(
            roles.rename_role(&role.id, "Charge Nurse").await,
            Err(AccessError::Store(_))
        ));
        store.fail_writes(false);

        assert_eq!(roles.get_role(&role.id).await.unwrap().name, "Nurse");
        assert!(store.get(collections::PERMISSIONS, "Nurse").await.unwrap().is_some());
        assert_eq!(matrix.get_record("Nurse").await.unwrap(), matrix.full_access("Nurse"));
    }

    #[tokio::test]
    async fn test_list_roles_sorted_and_skips_malformed() {
        let (store, _, roles) = setup();
        roles.create_role("nurse", "").await.unwrap();
        roles.create_role("Doctor", "").await.unwrap();
        store.put(collections::ROLES, "broken", json!({"description": 1})).await.unwrap();

        let names: Vec<String> = roles.list_roles().await.unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["Doctor", "nurse"]);
    }
}
