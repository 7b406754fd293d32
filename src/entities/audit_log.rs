//! Audit log entity - Append-only record of mutating actions.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Audit log database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "audit_log")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Kind of record touched (e.g. `"deal_price"`, `"voucher"`)
    pub record_type: String,
    /// Id of the record touched
    pub record_id: i64,
    /// What happened (e.g. `"create"`, `"status_change"`)
    pub action: String,
    /// Actor, when known
    pub performed_by: Option<String>,
    /// JSON snapshot before the change
    #[sea_orm(column_type = "Text", nullable)]
    pub old_value: Option<String>,
    /// JSON snapshot after the change
    #[sea_orm(column_type = "Text", nullable)]
    pub new_value: Option<String>,
    /// Free-text remarks
    pub remarks: Option<String>,
    /// When the action happened
    pub created_at: DateTime,
}

/// `AuditLog` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
