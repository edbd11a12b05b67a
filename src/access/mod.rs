//! Page-access policy engine
//!
//! This module decides which screens of the staff portal a signed-in user may
//! reach and at what capability level. It is organized around a handful of
//! cooperating stores and one pure decision function:
//!
//! - [`pages`] - the fixed page catalog and the per-page kill switch
//! - [`roles`] - role definitions and their cascades
//! - [`matrix`] - one permission record per role, normalized on every read
//! - [`engine`] - the access decision shared by navigation and route guards
//! - [`session`] - the cached permission snapshot of the current session
//! - [`components`] - the bundle wiring everything together
//!
//! # Failure model
//!
//! Reads are fail-open: a missing page entry means `Full`, a missing page
//! control means enabled, and a failed record read yields an all-`Full`
//! snapshot. Two rules dominate that bias: nothing is reachable while the
//! session is unresolved, and a disabled page is unreachable for everyone
//! except administrators on the Settings page.

pub mod components;
pub mod engine;
pub mod matrix;
pub mod pages;
pub mod permissions;
pub mod roles;
pub mod session;

pub use components::{AccessControl, BootstrapReport};
pub use engine::{UserPermissionSnapshot, can_access_page, is_admin_role, permission_level};
pub use matrix::{PermissionMatrixStore, ReconcileReport};
pub use pages::{Page, PageControlStore, PageControls, PageDefinition, PageRegistry};
pub use permissions::{PermissionLevel, PermissionRecord};
pub use roles::{Role, RoleRegistry};
pub use session::{PermissionSnapshotCache, SessionState};

use thiserror::Error;

use crate::services::store::StoreError;

/// Kind of entity a `NotFound` error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Page,
    Role,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Page => f.write_str("page"),
            EntityKind::Role => f.write_str("role"),
        }
    }
}

/// Errors surfaced by administrative operations
///
/// Reads used by navigation and guards never return these; they resolve to
/// fail-open defaults instead.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("A role named '{0}' already exists")]
    DuplicateRole(String),

    #[error("Unknown {kind}: {key}")]
    NotFound { kind: EntityKind, key: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AccessError {
    pub fn page_not_found(name: &str) -> Self {
        AccessError::NotFound {
            kind: EntityKind::Page,
            key: name.to_string(),
        }
    }

    pub fn role_not_found(key: &str) -> Self {
        AccessError::NotFound {
            kind: EntityKind::Role,
            key: key.to_string(),
        }
    }
}
