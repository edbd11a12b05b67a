//! Counters emitted by the access engine
//!
//! Label values come from closed enums, so cardinality is fixed. Role names,
//! page names and user ids never appear in labels.
//!
//! Individual access checks are deliberately not counted.

use metrics::counter;

/// Self-healing action taken while reading persisted state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfHealKind {
    /// Catalog page inserted into the page control store
    PageMaterialized,
    /// Extra page control row sharing a page name removed
    DuplicatePageRemoved,
    /// Stored record rewritten in canonical form
    RecordNormalized,
    /// All-`Full` record created for a role without one
    RecordSynthesized,
    /// Record whose role no longer exists removed
    OrphanRecordRemoved,
    /// Role deleted while its record was already absent
    MissingRecordOnDelete,
}

impl SelfHealKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelfHealKind::PageMaterialized => "page_materialized",
            SelfHealKind::DuplicatePageRemoved => "duplicate_page_removed",
            SelfHealKind::RecordNormalized => "record_normalized",
            SelfHealKind::RecordSynthesized => "record_synthesized",
            SelfHealKind::OrphanRecordRemoved => "orphan_record_removed",
            SelfHealKind::MissingRecordOnDelete => "missing_record_on_delete",
        }
    }
}

/// Administrative operation label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminOperation {
    CreateRole,
    RenameRole,
    DeleteRole,
    SetLevel,
    SetEnabled,
    Reconcile,
}

impl AdminOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminOperation::CreateRole => "create_role",
            AdminOperation::RenameRole => "rename_role",
            AdminOperation::DeleteRole => "delete_role",
            AdminOperation::SetLevel => "set_level",
            AdminOperation::SetEnabled => "set_enabled",
            AdminOperation::Reconcile => "reconcile",
        }
    }
}

/// Outcome of an administrative write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    Success,
    Rejected,
    Error,
}

impl WriteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteStatus::Success => "success",
            WriteStatus::Rejected => "rejected",
            WriteStatus::Error => "error",
        }
    }
}

pub fn record_self_heal(kind: SelfHealKind, count: u64) {
    if count == 0 {
        return;
    }
    counter!("access_self_heal_total", "kind" => kind.as_str()).increment(count);
}

pub fn record_admin_write(operation: AdminOperation, status: WriteStatus) {
    counter!(
        "access_admin_writes_total",
        "operation" => operation.as_str(),
        "status" => status.as_str()
    )
    .increment(1);
}
