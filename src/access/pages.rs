//! Page registry and page controls
//!
//! The set of gate-able pages is a fixed catalog compiled into the binary.
//! Each catalog page is mirrored by one row in the `pages` collection that
//! carries the page's kill switch (`enabled`). Rows are keyed by a generated
//! id, so the collection can end up with several rows for the same page name;
//! materialization keeps the first row (by id) and removes the others.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::AccessError;
use crate::observability::{SelfHealKind, record_self_heal};
use crate::services::store::{DocumentStore, StoreError, WriteOperation, collections};

/// Name of the page administrators can always reach
pub const SETTINGS_PAGE: &str = "Settings";

/// A catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageDefinition {
    pub name: &'static str,
    pub route: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
}

impl PageDefinition {
    pub const fn new(
        name: &'static str,
        route: &'static str,
        description: &'static str,
        icon: &'static str,
    ) -> Self {
        Self {
            name,
            route,
            description,
            icon,
        }
    }
}

/// Pages of the staff portal, in navigation order
pub const CATALOG: &[PageDefinition] = &[
    PageDefinition::new("Dashboard", "/dashboard", "Overview of staff activity", "dashboard"),
    PageDefinition::new("Staff", "/staff", "Staff directory and profiles", "people"),
    PageDefinition::new("Leave", "/leave", "Leave requests and approvals", "event_busy"),
    PageDefinition::new("Payrolls", "/payrolls", "Salary runs and payslips", "payments"),
    PageDefinition::new("Complaints", "/complaints", "Complaints raised by and about staff", "report"),
    PageDefinition::new("Fines", "/fines", "Disciplinary fines", "gavel"),
    PageDefinition::new("Schedules", "/schedules", "Shift schedules", "calendar_month"),
    PageDefinition::new("Documents", "/documents", "Staff documents and uploads", "folder"),
    PageDefinition::new(SETTINGS_PAGE, "/settings", "Roles, permissions and page controls", "settings"),
];

/// A catalog page together with its current kill-switch state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub name: String,
    pub route: String,
    pub description: String,
    pub icon: String,
    pub enabled: bool,
}

impl Page {
    fn from_definition(definition: &PageDefinition, enabled: bool) -> Self {
        Self {
            name: definition.name.to_string(),
            route: definition.route.to_string(),
            description: definition.description.to_string(),
            icon: definition.icon.to_string(),
            enabled,
        }
    }
}

/// Stored form of a page control row
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PageRow<'a> {
    page_name: &'a str,
    route: &'a str,
    description: &'a str,
    icon: &'a str,
    enabled: bool,
}

impl<'a> PageRow<'a> {
    fn new(definition: &'a PageDefinition, enabled: bool) -> Self {
        Self {
            page_name: definition.name,
            route: definition.route,
            description: definition.description,
            icon: definition.icon,
            enabled,
        }
    }
}

fn row_page_name(doc: &Value) -> Option<&str> {
    doc.get("pageName").and_then(Value::as_str)
}

/// Kill-switch state of every page, read in one pass
///
/// Pages without a row are enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageControls {
    enabled: HashMap<String, bool>,
}

impl PageControls {
    /// Build from page control rows ordered by id; the first row of a name wins
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a Value>) -> Self {
        let mut enabled = HashMap::new();
        for doc in rows {
            if let Some(name) = row_page_name(doc) {
                let flag = doc.get("enabled").and_then(Value::as_bool).unwrap_or(true);
                enabled.entry(name.to_string()).or_insert(flag);
            }
        }
        Self { enabled }
    }

    pub fn is_enabled(&self, page: &str) -> bool {
        self.enabled.get(page).copied().unwrap_or(true)
    }

    /// Same controls with one page overridden
    pub fn with(mut self, page: &str, enabled: bool) -> Self {
        self.enabled.insert(page.to_string(), enabled);
        self
    }
}

/// Counts from a materialization pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterializeReport {
    pub inserted: usize,
    pub duplicates_removed: usize,
}

/// The fixed page catalog, materialized into the page control store
pub struct PageRegistry {
    store: Arc<dyn DocumentStore>,
    catalog: Vec<PageDefinition>,
    materialized: OnceCell<MaterializeReport>,
}

impl PageRegistry {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_catalog(store, CATALOG.to_vec())
    }

    pub fn with_catalog(store: Arc<dyn DocumentStore>, catalog: Vec<PageDefinition>) -> Self {
        Self {
            store,
            catalog,
            materialized: OnceCell::new(),
        }
    }

    pub fn catalog(&self) -> &[PageDefinition] {
        &self.catalog
    }

    pub fn page_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.catalog.iter().map(|definition| definition.name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.catalog.iter().any(|definition| definition.name == name)
    }

    /// Materialize the catalog on first use.
    ///
    /// A failed attempt is retried on the next call.
    pub async fn ensure_materialized(&self) -> Result<MaterializeReport, AccessError> {
        let report = self
            .materialized
            .get_or_try_init(|| self.materialize())
            .await?;
        Ok(*report)
    }

    async fn materialize(&self) -> Result<MaterializeReport, AccessError> {
        let rows = self.store.list(collections::PAGES).await?;

        let mut seen = HashSet::new();
        let mut batch = Vec::new();
        let mut report = MaterializeReport::default();

        for (id, doc) in &rows {
            let Some(name) = row_page_name(doc) else {
                debug!(row_id = %id, "Ignoring page row without a pageName");
                continue;
            };
            if !seen.insert(name) {
                info!(row_id = %id, page = %name, "Removing duplicate page row");
                batch.push(WriteOperation::delete(collections::PAGES, id));
                report.duplicates_removed += 1;
            }
        }

        for definition in &self.catalog {
            if seen.contains(definition.name) {
                continue;
            }
            let row = serde_json::to_value(PageRow::new(definition, true)).map_err(StoreError::from)?;
            batch.push(WriteOperation::put(
                collections::PAGES,
                &Uuid::new_v4().to_string(),
                row,
            ));
            report.inserted += 1;
        }

        if !batch.is_empty() {
            self.store.commit(batch).await?;
            info!(
                inserted = report.inserted,
                duplicates_removed = report.duplicates_removed,
                "Page registry materialized"
            );
            record_self_heal(SelfHealKind::PageMaterialized, report.inserted as u64);
            record_self_heal(SelfHealKind::DuplicatePageRemoved, report.duplicates_removed as u64);
        }

        Ok(report)
    }

    /// Current kill-switch state, read fresh from the store
    pub async fn read_controls(&self) -> Result<PageControls, StoreError> {
        let rows = self.store.list(collections::PAGES).await?;
        Ok(PageControls::from_rows(rows.iter().map(|(_, doc)| doc)))
    }

    /// Every catalog page in declaration order.
    ///
    /// Never fails: when the store cannot be reached, pages are reported as
    /// enabled.
    pub async fn list_pages(&self) -> Vec<Page> {
        if let Err(e) = self.ensure_materialized().await {
            warn!(error = %e, "Page registry materialization failed");
        }

        let controls = match self.read_controls().await {
            Ok(controls) => controls,
            Err(e) => {
                warn!(error = %e, "Failed to read page controls, treating every page as enabled");
                PageControls::default()
            }
        };

        self.pages_with(&controls)
    }

    /// Catalog pages combined with already-read controls
    pub fn pages_with(&self, controls: &PageControls) -> Vec<Page> {
        self.catalog
            .iter()
            .map(|definition| Page::from_definition(definition, controls.is_enabled(definition.name)))
            .collect()
    }
}

/// Per-page kill switch, independent of role
pub struct PageControlStore {
    store: Arc<dyn DocumentStore>,
    registry: Arc<PageRegistry>,
}

impl PageControlStore {
    pub fn new(store: Arc<dyn DocumentStore>, registry: Arc<PageRegistry>) -> Self {
        Self { store, registry }
    }

    /// Kill-switch state for every page, enabled when unreadable
    pub async fn controls(&self) -> PageControls {
        match self.registry.read_controls().await {
            Ok(controls) => controls,
            Err(e) => {
                warn!(error = %e, "Failed to read page controls, treating every page as enabled");
                PageControls::default()
            }
        }
    }

    /// Whether a page is enabled; unknown pages are enabled
    pub async fn get_enabled(&self, page: &str) -> bool {
        self.controls().await.is_enabled(page)
    }

    pub async fn set_enabled(&self, page: &str, enabled: bool) -> Result<Page, AccessError> {
        let Some(definition) = self.registry.catalog().iter().find(|d| d.name == page).copied() else {
            return Err(AccessError::page_not_found(page));
        };

        self.registry.ensure_materialized().await?;

        let rows = self.store.list(collections::PAGES).await?;
        let existing = rows
            .into_iter()
            .find(|(_, doc)| row_page_name(doc) == Some(page));

        let (id, doc) = match existing {
            Some((id, mut doc)) => {
                if let Some(fields) = doc.as_object_mut() {
                    fields.insert("enabled".to_string(), Value::Bool(enabled));
                }
                (id, doc)
            }
            None => {
                // Row removed behind our back after materialization
                let row = serde_json::to_value(PageRow::new(&definition, enabled)).map_err(StoreError::from)?;
                (Uuid::new_v4().to_string(), row)
            }
        };

        self.store.put(collections::PAGES, &id, doc).await?;
        info!(page = %page, enabled, "Page control updated");

        Ok(Page::from_definition(&definition, enabled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::MemoryStore;
    use crate::services::store::testing::FaultyStore;
    use serde_json::json;
    use tracing_test::traced_test;

    fn small_catalog() -> Vec<PageDefinition> {
        vec![
            PageDefinition::new("Dashboard", "/dashboard", "Overview", "dashboard"),
            PageDefinition::new("Leave", "/leave", "Leave", "event_busy"),
            PageDefinition::new("Payrolls", "/payrolls", "Payrolls", "payments"),
            PageDefinition::new(SETTINGS_PAGE, "/settings", "Settings", "settings"),
        ]
    }

    fn setup() -> (Arc<MemoryStore>, Arc<PageRegistry>, PageControlStore) {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(PageRegistry::with_catalog(store.clone(), small_catalog()));
        let controls = PageControlStore::new(store.clone(), registry.clone());
        (store, registry, controls)
    }

    #[test]
    fn test_catalog_names_are_unique() {
        let names: HashSet<&str> = CATALOG.iter().map(|d| d.name).collect();
        assert_eq!(names.len(), CATALOG.len());
        assert!(names.contains(SETTINGS_PAGE));
    }

    #[tokio::test]
    async fn test_list_pages_materializes_in_order() {
        let (store, registry, _) = setup();

        let pages = registry.list_pages().await;

        let names: Vec<&str> = pages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Dashboard", "Leave", "Payrolls", "Settings"]);
        assert!(pages.iter().all(|p| p.enabled));
        assert_eq!(store.list(collections::PAGES).await.unwrap().len(), 4);

        // Second call does not insert again
        registry.list_pages().await;
        assert_eq!(store.list(collections::PAGES).await.unwrap().len(), 4);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_duplicate_rows_are_removed() {
        let (store, registry, _) = setup();
        store
            .commit(vec![
                WriteOperation::put(collections::PAGES, "a", json!({"pageName": "Leave", "enabled": false})),
                WriteOperation::put(collections::PAGES, "b", json!({"pageName": "Leave", "enabled": true})),
            ])
            .await
            .unwrap();

        let report = registry.ensure_materialized().await.unwrap();

        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.inserted, 3);
        assert!(store.get(collections::PAGES, "a").await.unwrap().is_some());
        assert!(store.get(collections::PAGES, "b").await.unwrap().is_none());
        assert!(logs_contain("Removing duplicate page row"));

        let leave = registry
            .list_pages()
            .await
            .into_iter()
            .find(|p| p.name == "Leave")
            .unwrap();
        assert!(!leave.enabled);
    }

    #[tokio::test]
    async fn test_set_enabled_round_trip() {
        let (_, _, controls) = setup();

        assert!(controls.get_enabled("Payrolls").await);
        let page = controls.set_enabled("Payrolls", false).await.unwrap();
        assert!(!page.enabled);
        assert!(!controls.get_enabled("Payrolls").await);

        controls.set_enabled("Payrolls", true).await.unwrap();
        assert!(controls.get_enabled("Payrolls").await);
    }

    #[tokio::test]
    async fn test_set_enabled_unknown_page() {
        let (_, _, controls) = setup();

        let result = controls.set_enabled("Inventory", false).await;
        assert!(matches!(result, Err(AccessError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_unknown_page_defaults_enabled() {
        let (_, _, controls) = setup();
        assert!(controls.get_enabled("Inventory").await);
    }

    #[tokio::test]
    async fn test_set_enabled_recreates_missing_row() {
        let (store, registry, controls) = setup();
        registry.ensure_materialized().await.unwrap();

        let rows = store.list(collections::PAGES).await.unwrap();
        let (leave_id, _) = rows.iter().find(|(_, doc)| row_page_name(doc) == Some("Leave")).unwrap();
        store.delete(collections::PAGES, leave_id).await.unwrap();

        controls.set_enabled("Leave", false).await.unwrap();
        assert!(!controls.get_enabled("Leave").await);
    }

    #[tokio::test]
    async fn test_unreadable_store_is_fail_open() {
        let store = Arc::new(FaultyStore::new());
        store.fail_reads(true);
        let registry = Arc::new(PageRegistry::with_catalog(store.clone(), small_catalog()));
        let controls = PageControlStore::new(store.clone(), registry.clone());

        let pages = registry.list_pages().await;
        assert_eq!(pages.len(), 4);
        assert!(pages.iter().all(|p| p.enabled));
        assert!(controls.get_enabled("Leave").await);

        // Materialization is retried once the store recovers
        store.fail_reads(false);
        let report = registry.ensure_materialized().await.unwrap();
        assert_eq!(report.inserted, 4);
    }

    #[test]
    fn test_controls_first_row_wins() {
        let rows = [
            json!({"pageName": "Fines", "enabled": false}),
            json!({"pageName": "Fines", "enabled": true}),
            json!({"enabled": false}),
        ];

        let controls = PageControls::from_rows(rows.iter());
        assert!(!controls.is_enabled("Fines"));
        assert!(controls.is_enabled("Staff"));
    }
}
