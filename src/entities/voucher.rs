//! Voucher entity - Expense advance issued to a driver or employee.
//!
//! `remaining_amount` always equals `advance - total_expense`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Whether the voucher still accepts movements
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum VoucherStatus {
    /// Accepts advances and expenses
    #[sea_orm(string_value = "open")]
    Open,
    /// Settled, read-only
    #[sea_orm(string_value = "closed")]
    Closed,
}

/// Voucher database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vouchers")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Human-facing voucher number
    pub voucher_no: String,
    /// Employee or driver holding the advance
    pub emp_id: i64,
    /// Vehicle the trip is for, if any
    pub vehicle_no: Option<String>,
    /// Total cash advanced
    pub advance: f64,
    /// Total of expense items
    pub total_expense: f64,
    /// `advance - total_expense`
    pub remaining_amount: f64,
    /// Open or closed
    pub status: VoucherStatus,
    /// Creation timestamp
    pub created_at: DateTime,
    /// Last modification timestamp
    pub updated_at: DateTime,
}

/// Defines relationships between Voucher and its items/history
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One voucher has many expense items
    #[sea_orm(has_many = "super::voucher_item::Entity")]
    Items,
    /// One voucher has many history rows
    #[sea_orm(has_many = "super::voucher_history::Entity")]
    History,
}

impl Related<super::voucher_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl Related<super::voucher_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::History.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
