//! Access decision engine
//!
//! [`can_access_page`] is the single decision function used by the sidebar, the
//! bottom navigation and the route guards. It is pure: callers hand it the
//! session snapshot and the page controls they read, so the same inputs always
//! produce the same verdict for every consumer.
//!
//! Precedence, highest first:
//!
//! 1. Administrators always reach the Settings page
//! 2. A disabled page is unreachable
//! 3. A page is reachable unless its level is `None` (missing entries are `Full`)

use serde::Serialize;
use std::collections::BTreeMap;

use super::pages::{Page, PageControls, SETTINGS_PAGE};
use super::permissions::{PermissionLevel, PermissionRecord};

/// Role names that carry the Settings override, compared case-insensitively
const ADMIN_ROLE_NAMES: [&str; 2] = ["admin", "administrator"];

pub fn is_admin_role(role: &str) -> bool {
    let role = role.trim();
    ADMIN_ROLE_NAMES
        .iter()
        .any(|admin| role.eq_ignore_ascii_case(admin))
}

/// Resolved permissions of the signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPermissionSnapshot {
    pub role: String,
    pub is_admin: bool,
    pub pages: BTreeMap<String, PermissionLevel>,
}

impl UserPermissionSnapshot {
    pub fn from_record(record: PermissionRecord) -> Self {
        Self {
            is_admin: is_admin_role(&record.role),
            role: record.role,
            pages: record.pages,
        }
    }

    pub fn level(&self, page: &str) -> PermissionLevel {
        self.pages.get(page).copied().unwrap_or(PermissionLevel::Full)
    }
}

pub fn can_access_page(
    snapshot: &UserPermissionSnapshot,
    controls: &PageControls,
    page: &str,
) -> bool {
    if page == SETTINGS_PAGE && snapshot.is_admin {
        return true;
    }
    if !controls.is_enabled(page) {
        return false;
    }
    snapshot.level(page).grants_access()
}

/// Stored level for a page. The Settings override does not apply here: an
/// administrator whose record says `None` on Settings reaches the page but
/// still reads `None`.
pub fn permission_level(snapshot: &UserPermissionSnapshot, page: &str) -> PermissionLevel {
    snapshot.level(page)
}

/// Pages to render in navigation, in registry order
pub fn visible_pages(
    pages: &[Page],
    snapshot: &UserPermissionSnapshot,
    controls: &PageControls,
) -> Vec<Page> {
    pages
        .iter()
        .filter(|page| can_access_page(snapshot, controls, &page.name))
        .cloned()
        .collect()
}
