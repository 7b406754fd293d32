//! Filling history entity - Append-only ledger of customer balance movements.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// What moved the customer's balance or limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum HistoryType {
    /// Credit line lapsed and was zeroed by the cron
    #[sea_orm(string_value = "expired_auto_reset")]
    ExpiredAutoReset,
    /// Daily ceiling restored by the cron
    #[sea_orm(string_value = "day_limit_reset")]
    DayLimitReset,
    /// Credit moved onto hold
    #[sea_orm(string_value = "hold_reserve")]
    HoldReserve,
    /// Hold moved back to credit
    #[sea_orm(string_value = "hold_release")]
    HoldRelease,
    /// Hold consumed by a completed filling
    #[sea_orm(string_value = "hold_settle")]
    HoldSettle,
    /// Customer payment received
    #[sea_orm(string_value = "payment")]
    Payment,
    /// Customer suspended for overdue invoices
    #[sea_orm(string_value = "suspended")]
    Suspended,
}

/// Filling history database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "filling_history")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Customer (company) id
    pub com_id: i64,
    /// Related filling request, if any
    pub filling_request_id: Option<i64>,
    /// Movement kind
    pub trans_type: HistoryType,
    /// Amount moved
    pub amount: f64,
    /// `amtlimit` before the movement
    pub limit_before: f64,
    /// `amtlimit` after the movement
    pub limit_after: f64,
    /// Free-text remarks
    pub remarks: Option<String>,
    /// When the movement happened
    pub created_at: DateTime,
}

/// `FillingHistory` has no relationships with other modelled entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
