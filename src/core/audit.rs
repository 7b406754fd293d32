//! Audit log writer.
//!
//! Mutating operations describe what they did with an [`AuditEntry`] and hand
//! it to [`record`]. Writing the audit row is best effort: a failure is logged
//! and swallowed so it never undoes or blocks the change being audited.

use crate::{
    entities::{AuditLog, audit_log},
    errors::Result,
};
use sea_orm::{QueryOrder, Set, prelude::*};
use serde::Serialize;
use tracing::{debug, warn};

/// A single audit event waiting to be written.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    record_type: String,
    record_id: i64,
    action: String,
    performed_by: Option<String>,
    old_value: Option<String>,
    new_value: Option<String>,
    remarks: Option<String>,
}

impl AuditEntry {
    /// Starts an entry for `action` on the record `record_type`/`record_id`.
    #[must_use]
    pub fn new(record_type: &str, record_id: i64, action: &str) -> Self {
        Self {
            record_type: record_type.to_string(),
            record_id,
            action: action.to_string(),
            performed_by: None,
            old_value: None,
            new_value: None,
            remarks: None,
        }
    }

    /// Sets the actor.
    #[must_use]
    pub fn by(mut self, performed_by: Option<&str>) -> Self {
        self.performed_by = performed_by.map(ToString::to_string);
        self
    }

    /// Snapshots the state before the change.
    #[must_use]
    pub fn old<T: Serialize>(mut self, value: &T) -> Self {
        self.old_value = serde_json::to_string(value).ok();
        self
    }

    /// Snapshots the state after the change.
    #[must_use]
    pub fn new_value<T: Serialize>(mut self, value: &T) -> Self {
        self.new_value = serde_json::to_string(value).ok();
        self
    }

    /// Attaches free-text remarks.
    #[must_use]
    pub fn remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }
}

/// Writes an audit row. Never fails; errors are logged at `warn`.
pub async fn record<C>(db: &C, entry: AuditEntry)
where
    C: ConnectionTrait,
{
    let record_type = entry.record_type.clone();
    let record_id = entry.record_id;

    let row = audit_log::ActiveModel {
        record_type: Set(entry.record_type),
        record_id: Set(entry.record_id),
        action: Set(entry.action),
        performed_by: Set(entry.performed_by),
        old_value: Set(entry.old_value),
        new_value: Set(entry.new_value),
        remarks: Set(entry.remarks),
        created_at: Set(super::local_now()),
        ..Default::default()
    };

    match row.insert(db).await {
        Ok(saved) => debug!("Audit row {} written for {} {}", saved.id, record_type, record_id),
        Err(e) => warn!(
            "Failed to write audit row for {} {}: {}",
            record_type, record_id, e
        ),
    }
}

/// Lists audit rows for one record, newest first.
pub async fn for_record(
    db: &DatabaseConnection,
    record_type: &str,
    record_id: i64,
) -> Result<Vec<audit_log::Model>> {
    AuditLog::find()
        .filter(audit_log::Column::RecordType.eq(record_type))
        .filter(audit_log::Column::RecordId.eq(record_id))
        .order_by_desc(audit_log::Column::CreatedAt)
        .order_by_desc(audit_log::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}
