//! Voucher item entity - One expense line charged against a voucher.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Voucher item database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vouchers_items")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning voucher
    pub voucher_id: i64,
    /// What the money was spent on
    pub description: String,
    /// Expense amount
    pub amount: f64,
    /// When the expense was recorded
    pub created_at: DateTime,
}

/// Each item belongs to one voucher
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
