//! Permission levels and the normalization of stored permission values
//!
//! Permission records have been written by several generations of the
//! administration screen, so a stored page value can be any of:
//!
//! - missing (the page was added after the record was written)
//! - a boolean (`true` / `false`)
//! - a deprecated level name (`"edit"`, `"not_access"`)
//! - a current level name (`"Full"`, `"View"`, `"Partial"`, `"None"`)
//!
//! [`StoredPermission`] classifies a raw value into one of those shapes and
//! [`normalize_record`] maps a whole stored document onto the current page set.
//! Normalization is total and idempotent: normalizing an already-normalized
//! record yields the same document, so a record is only rewritten when its raw
//! form actually differs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Capability granted to a role on a page
///
/// Levels are tags, not a ranking: each feature interprets `View` and
/// `Partial` its own way. The only universal rule is that `None` makes the
/// page unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionLevel {
    /// Create, edit, delete and approve
    Full,
    /// Read-only
    View,
    /// Create and submit one's own records only
    Partial,
    /// No access
    None,
}

impl PermissionLevel {
    pub fn all() -> [PermissionLevel; 4] {
        [
            PermissionLevel::Full,
            PermissionLevel::View,
            PermissionLevel::Partial,
            PermissionLevel::None,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::Full => "Full",
            PermissionLevel::View => "View",
            PermissionLevel::Partial => "Partial",
            PermissionLevel::None => "None",
        }
    }

    /// Whether a page with this level can be reached at all
    pub fn grants_access(&self) -> bool {
        !matches!(self, PermissionLevel::None)
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a current permission level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLevel(pub String);

impl fmt::Display for UnknownLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown permission level '{}', expected one of Full, View, Partial, None",
            self.0
        )
    }
}

impl std::error::Error for UnknownLevel {}

impl FromStr for PermissionLevel {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PermissionLevel::all()
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownLevel(s.to_string()))
    }
}

/// Level names written by older versions of the administration screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyLevel {
    /// `"edit"`, equivalent to `Full`
    Edit,
    /// `"not_access"`, equivalent to `None`
    NotAccess,
}

impl LegacyLevel {
    fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("edit") {
            Some(LegacyLevel::Edit)
        } else if s.eq_ignore_ascii_case("not_access") {
            Some(LegacyLevel::NotAccess)
        } else {
            None
        }
    }
}

/// Every shape a stored page value can take
#[derive(Debug, Clone, PartialEq)]
pub enum StoredPermission<'a> {
    Missing,
    Flag(bool),
    Legacy(LegacyLevel),
    Level(PermissionLevel),
    /// Anything else (numbers, unknown strings, objects)
    Unrecognized(&'a Value),
}

impl<'a> StoredPermission<'a> {
    pub fn classify(value: Option<&'a Value>) -> Self {
        match value {
            None | Some(Value::Null) => StoredPermission::Missing,
            Some(Value::Bool(flag)) => StoredPermission::Flag(*flag),
            Some(raw @ Value::String(s)) => {
                if let Some(legacy) = LegacyLevel::parse(s) {
                    StoredPermission::Legacy(legacy)
                } else if let Ok(level) = s.parse() {
                    StoredPermission::Level(level)
                } else {
                    StoredPermission::Unrecognized(raw)
                }
            }
            Some(other) => StoredPermission::Unrecognized(other),
        }
    }

    /// Map onto the current level model.
    ///
    /// Missing and unrecognized values are granted `Full`: an unconfigured
    /// page is reachable until an administrator restricts it.
    pub fn normalize(&self) -> PermissionLevel {
        match self {
            StoredPermission::Missing => PermissionLevel::Full,
            StoredPermission::Flag(true) => PermissionLevel::Full,
            StoredPermission::Flag(false) => PermissionLevel::None,
            StoredPermission::Legacy(LegacyLevel::Edit) => PermissionLevel::Full,
            StoredPermission::Legacy(LegacyLevel::NotAccess) => PermissionLevel::None,
            StoredPermission::Level(level) => *level,
            StoredPermission::Unrecognized(_) => PermissionLevel::Full,
        }
    }
}

/// Normalize a single raw stored value
pub fn normalize_value(value: Option<&Value>) -> PermissionLevel {
    StoredPermission::classify(value).normalize()
}

/// One role's page permissions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    pub role: String,
    pub pages: BTreeMap<String, PermissionLevel>,
}

impl PermissionRecord {
    /// Record granting `Full` on every given page
    pub fn full_access<'p>(role: &str, pages: impl IntoIterator<Item = &'p str>) -> Self {
        Self {
            role: role.to_string(),
            pages: pages
                .into_iter()
                .map(|page| (page.to_string(), PermissionLevel::Full))
                .collect(),
        }
    }

    /// Level for a page, `Full` when the page has no entry
    pub fn level(&self, page: &str) -> PermissionLevel {
        self.pages.get(page).copied().unwrap_or(PermissionLevel::Full)
    }

    /// Canonical stored form: `{ "role": ..., "pages": { page: level } }`
    pub fn to_document(&self) -> Value {
        let pages: Map<String, Value> = self
            .pages
            .iter()
            .map(|(page, level)| (page.clone(), Value::String(level.as_str().to_string())))
            .collect();

        let mut doc = Map::new();
        doc.insert("role".to_string(), Value::String(self.role.clone()));
        doc.insert("pages".to_string(), Value::Object(pages));
        Value::Object(doc)
    }

    /// Same permissions under another role name
    pub fn renamed(&self, role: &str) -> Self {
        Self {
            role: role.to_string(),
            pages: self.pages.clone(),
        }
    }
}

/// Result of normalizing a stored record
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub record: PermissionRecord,
    /// Whether the canonical form differs from what was stored
    pub changed: bool,
}

/// Page map inside a stored document.
///
/// Current documents nest it under `pages`; the oldest ones stored page keys at
/// the top level next to `role`.
fn stored_pages(raw: &Value) -> Option<&Map<String, Value>> {
    let doc = raw.as_object()?;
    match doc.get("pages") {
        Some(Value::Object(pages)) => Some(pages),
        _ => Some(doc),
    }
}

/// Normalize a stored document for `role` against the current page set.
///
/// The result has exactly one entry per page in `page_names`. Entries for pages
/// that are no longer in the registry are dropped.
pub fn normalize_record<'p>(
    role: &str,
    raw: Option<&Value>,
    page_names: impl IntoIterator<Item = &'p str>,
) -> Normalized {
    let stored = raw.and_then(stored_pages);

    let pages = page_names
        .into_iter()
        .map(|page| {
            let value = stored.and_then(|pages| pages.get(page));
            (page.to_string(), normalize_value(value))
        })
        .collect();

    let record = PermissionRecord {
        role: role.to_string(),
        pages,
    };
    let changed = raw != Some(&record.to_document());

    Normalized { record, changed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PAGES: [&str; 3] = ["Dashboard", "Leave", "Payrolls"];

    #[test]
    fn test_level_display_and_parse() {
        for level in PermissionLevel::all() {
            assert_eq!(level.to_string().parse::<PermissionLevel>(), Ok(level));
        }
        assert_eq!("view".parse::<PermissionLevel>(), Ok(PermissionLevel::View));
        assert!("admin".parse::<PermissionLevel>().is_err());
    }

    #[test]
    fn test_only_none_denies() {
        assert!(PermissionLevel::Full.grants_access());
        assert!(PermissionLevel::View.grants_access());
        assert!(PermissionLevel::Partial.grants_access());
        assert!(!PermissionLevel::None.grants_access());
    }

    #[test]
    fn test_normalize_value_table() {
        let cases = vec![
            (None, PermissionLevel::Full),
            (Some(json!(null)), PermissionLevel::Full),
            (Some(json!(true)), PermissionLevel::Full),
            (Some(json!(false)), PermissionLevel::None),
            (Some(json!("edit")), PermissionLevel::Full),
            (Some(json!("not_access")), PermissionLevel::None),
            (Some(json!("Full")), PermissionLevel::Full),
            (Some(json!("View")), PermissionLevel::View),
            (Some(json!("Partial")), PermissionLevel::Partial),
            (Some(json!("None")), PermissionLevel::None),
            (Some(json!(42)), PermissionLevel::Full),
            (Some(json!("garbage")), PermissionLevel::Full),
        ];

        for (raw, expected) in cases {
            assert_eq!(normalize_value(raw.as_ref()), expected, "raw value {:?}", raw);
        }
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let raws = vec![
            None,
            Some(json!(true)),
            Some(json!(false)),
            Some(json!("edit")),
            Some(json!("not_access")),
            Some(json!("Full")),
            Some(json!("View")),
            Some(json!("Partial")),
            Some(json!("None")),
        ];

        for raw in raws {
            let once = normalize_value(raw.as_ref());
            let stored = Value::String(once.as_str().to_string());
            let twice = normalize_value(Some(&stored));
            assert_eq!(once, twice, "raw value {:?}", raw);
        }
    }

    #[test]
    fn test_classify_shapes() {
        let legacy = json!("not_access");
        assert_eq!(
            StoredPermission::classify(Some(&legacy)),
            StoredPermission::Legacy(LegacyLevel::NotAccess)
        );

        let number = json!(1);
        assert_eq!(
            StoredPermission::classify(Some(&number)),
            StoredPermission::Unrecognized(&number)
        );
        assert_eq!(StoredPermission::classify(None), StoredPermission::Missing);
    }

    #[test]
    fn test_nurse_record_normalization() {
        let raw = json!({"role": "Nurse", "pages": {"Leave": true, "Payrolls": "not_access"}});

        let normalized = normalize_record("Nurse", Some(&raw), PAGES);

        assert!(normalized.changed);
        assert_eq!(normalized.record.level("Dashboard"), PermissionLevel::Full);
        assert_eq!(normalized.record.level("Leave"), PermissionLevel::Full);
        assert_eq!(normalized.record.level("Payrolls"), PermissionLevel::None);
        assert_eq!(normalized.record.pages.len(), 3);
    }

    #[test]
    fn test_canonical_record_is_unchanged() {
        let raw = json!({"role": "Nurse", "pages": {"Leave": true, "Payrolls": "not_access"}});
        let first = normalize_record("Nurse", Some(&raw), PAGES);

        let canonical = first.record.to_document();
        let second = normalize_record("Nurse", Some(&canonical), PAGES);

        assert!(!second.changed);
        assert_eq!(second.record, first.record);
    }

    #[test]
    fn test_flat_legacy_layout() {
        let raw = json!({"Leave": "edit", "Payrolls": false});

        let normalized = normalize_record("Clerk", Some(&raw), PAGES);

        assert!(normalized.changed);
        assert_eq!(normalized.record.role, "Clerk");
        assert_eq!(normalized.record.level("Leave"), PermissionLevel::Full);
        assert_eq!(normalized.record.level("Payrolls"), PermissionLevel::None);
    }

    #[test]
    fn test_missing_record_fills_full() {
        let normalized = normalize_record("Doctor", None, PAGES);

        assert!(normalized.changed);
        assert_eq!(normalized.record, PermissionRecord::full_access("Doctor", PAGES));
    }

    #[test]
    fn test_retired_pages_are_dropped() {
        let raw = json!({"role": "Nurse", "pages": {"Dashboard": "View", "Leave": "Full", "Payrolls": "None", "Inventory": "Full"}});

        let normalized = normalize_record("Nurse", Some(&raw), PAGES);

        assert!(normalized.changed);
        assert!(!normalized.record.pages.contains_key("Inventory"));
        assert_eq!(normalized.record.level("Dashboard"), PermissionLevel::View);
    }

    #[test]
    fn test_level_serializes_as_name() {
        assert_eq!(serde_json::to_value(PermissionLevel::Partial).unwrap(), json!("Partial"));
        let level: PermissionLevel = serde_json::from_value(json!("View")).unwrap();
        assert_eq!(level, PermissionLevel::View);
    }
}
