//! Voucher history entity - Every movement on a voucher with its running balance.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Kind of voucher movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum VoucherAction {
    /// Voucher opened with its first advance
    #[sea_orm(string_value = "opened")]
    Opened,
    /// Additional cash advanced
    #[sea_orm(string_value = "advance")]
    Advance,
    /// Expense item added
    #[sea_orm(string_value = "expense")]
    Expense,
    /// Voucher settled
    #[sea_orm(string_value = "closed")]
    Closed,
}

/// Voucher history database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "voucher_history")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning voucher
    pub voucher_id: i64,
    /// Movement kind
    pub action: VoucherAction,
    /// Amount moved
    pub amount: f64,
    /// `remaining_amount` before the movement
    pub remaining_before: f64,
    /// `remaining_amount` after the movement
    pub remaining_after: f64,
    /// When the movement happened
    pub created_at: DateTime,
}

/// Each history row belongs to one voucher
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Owning voucher
    #[sea_orm(
        belongs_to = "super::voucher::Entity",
        from = "Column::VoucherId",
        to = "super::voucher::Column::Id"
    )]
    Voucher,
}

impl Related<super::voucher::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Voucher.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
