//! Deal price entity - A scheduled price rule for one customer at one station.
//!
//! Rows are keyed by (`com_id`, `station_id`, `product_id`, `sub_product_id`).
//! A row starts `scheduled`, becomes `active` once its schedule date/time has
//! passed, and ends `expired` when superseded or when its day is over.
//! Rows are never deleted.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a deal price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum DealPriceStatus {
    /// Waiting for its schedule date/time
    #[sea_orm(string_value = "scheduled")]
    Scheduled,
    /// The price currently applied for its key
    #[sea_orm(string_value = "active")]
    Active,
    /// Superseded or past its schedule date
    #[sea_orm(string_value = "expired")]
    Expired,
}

/// Deal price database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "deal_price")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Customer (company) the price is negotiated for
    pub com_id: i64,
    /// Filling station
    pub station_id: i64,
    /// Product (e.g. diesel)
    pub product_id: i64,
    /// Sub-product / grade
    pub sub_product_id: i64,
    /// Price per unit
    pub price: f64,
    /// Lifecycle state
    pub status: DealPriceStatus,
    /// Set once the scheduler has applied the price
    pub is_applied: bool,
    /// Admin on/off switch; inactive rows are ignored by the scheduler
    pub is_active: bool,
    /// Day the price takes effect
    #[sea_orm(column_name = "Schedule_Date")]
    pub schedule_date: Date,
    /// Time of day the price takes effect
    #[sea_orm(column_name = "Schedule_Time")]
    pub schedule_time: Time,
    /// When the scheduler activated the row
    pub applied_at: Option<DateTime>,
    /// Who scheduled the price
    pub created_by: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime,
    /// Last modification timestamp
    pub updated_at: DateTime,
}

impl Model {
    /// Combined schedule date and time.
    #[must_use]
    pub fn scheduled_at(&self) -> DateTime {
        self.schedule_date.and_time(self.schedule_time)
    }
}

/// `DealPrice` has no relationships with other modelled entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
