//! Customer balance entity - Credit, wallet and limit state for one customer.
//!
//! `amtlimit` is the spendable credit, `hold_balance` the part of it reserved
//! for in-flight filling requests, `remaining_day_limit` what is left of the
//! daily ceiling. `limit_expiry` ends the credit line; `day_limit_expiry`
//! ends the credit-days grace period.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Customer balance database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "customer_balances")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Customer (company) id, one row per customer
    #[sea_orm(unique)]
    pub com_id: i64,
    /// Wallet balance (payments in, settled fillings out)
    pub balance: f64,
    /// Sanctioned credit limit
    pub cst_limit: f64,
    /// Available credit amount
    pub amtlimit: f64,
    /// Credit reserved for pending filling requests
    pub hold_balance: f64,
    /// Daily spend ceiling
    pub day_limit: f64,
    /// What is left of today's ceiling
    pub remaining_day_limit: f64,
    /// When the credit line lapses
    pub limit_expiry: Option<DateTime>,
    /// End of the credit-days grace period for unpaid invoices
    pub day_limit_expiry: Option<DateTime>,
    /// Grace period length in days
    pub credit_days: i32,
    /// False when the customer is suspended
    pub is_active: bool,
    /// Last modification timestamp
    pub updated_at: DateTime,
}

/// `CustomerBalance` has no relationships with other modelled entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
