//! Filling request entity - One fuel-delivery request from a customer.
//!
//! Status moves `Pending -> Processing -> Completed | Cancelled`; the legal
//! moves are enforced in `core::filling_request`. A completed, invoiced request
//! doubles as the customer's invoice (`payment_status`).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Delivery status of a filling request
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum FillingStatus {
    /// Created, not yet picked up by the station
    #[sea_orm(string_value = "Pending")]
    Pending,
    /// Station is filling
    #[sea_orm(string_value = "Processing")]
    Processing,
    /// Delivered
    #[sea_orm(string_value = "Completed")]
    Completed,
    /// Abandoned before delivery
    #[sea_orm(string_value = "Cancelled")]
    Cancelled,
}

impl fmt::Display for FillingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Processing => "Processing",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

/// Invoice payment state, stored as the legacy integer codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
pub enum PaymentStatus {
    /// Not paid yet
    #[sea_orm(num_value = 0)]
    Unpaid,
    /// Paid
    #[sea_orm(num_value = 1)]
    Paid,
    /// Unpaid past the customer's credit days
    #[sea_orm(num_value = 2)]
    Overdue,
}

/// Filling request database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "filling_requests")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Human-facing request number
    pub rid: String,
    /// Customer (company) id
    pub com_id: i64,
    /// Filling station
    pub station_id: i64,
    /// Product
    pub product_id: i64,
    /// Sub-product / grade
    pub sub_product_id: i64,
    /// Requested quantity
    pub qty: f64,
    /// Unit price applied
    pub price: f64,
    /// `qty * price`, the amount reserved on the customer's hold
    pub amount: f64,
    /// Delivery status
    pub status: FillingStatus,
    /// Verified by back office
    pub is_checked: bool,
    /// Invoice issued
    pub is_invoiced: bool,
    /// Invoice payment state
    pub payment_status: PaymentStatus,
    /// Free-text remarks
    pub remarks: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime,
    /// When the request reached `Completed`
    pub completed_at: Option<DateTime>,
    /// Last modification timestamp
    pub updated_at: DateTime,
}

/// `FillingRequest` has no relationships with other modelled entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
