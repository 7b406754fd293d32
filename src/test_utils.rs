//! Shared test utilities for `petro-ledger`.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test rows with sensible defaults.

use crate::{
    core::{
        balance::{self, CreditTerms},
        deal_price::DealPriceKey,
        voucher::{self, NewVoucher},
    },
    entities::{
        DealPriceStatus, FillingStatus, PaymentStatus, customer_balance, deal_price,
        filling_request,
    },
    errors::Result,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Builds a timestamp. Panics on an impossible date, which is a test bug.
#[allow(clippy::unwrap_used)]
pub fn at(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(hour, min, sec)
        .unwrap()
}

/// Builds a time of day.
#[allow(clippy::unwrap_used)]
pub fn hms(hour: u32, min: u32, sec: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, min, sec).unwrap()
}

/// Inserts a deal price row directly, bypassing validation, so tests can
/// set up any status and any (past) schedule.
///
/// # Defaults
/// * `is_active`: true
/// * `is_applied` / `applied_at`: set from the schedule when `status` is `Active`
pub async fn insert_deal_price(
    db: &DatabaseConnection,
    key: DealPriceKey,
    price: f64,
    schedule_date: NaiveDate,
    schedule_time: NaiveTime,
    status: DealPriceStatus,
) -> Result<deal_price::Model> {
    let scheduled_at = schedule_date.and_time(schedule_time);
    let applied = status == DealPriceStatus::Active;
    let row = deal_price::ActiveModel {
        com_id: Set(key.com_id),
        station_id: Set(key.station_id),
        product_id: Set(key.product_id),
        sub_product_id: Set(key.sub_product_id),
        price: Set(price),
        status: Set(status),
        is_applied: Set(applied),
        is_active: Set(true),
        schedule_date: Set(schedule_date),
        schedule_time: Set(schedule_time),
        applied_at: Set(applied.then_some(scheduled_at)),
        created_by: Set(Some("test".to_string())),
        created_at: Set(scheduled_at),
        updated_at: Set(scheduled_at),
        ..Default::default()
    };
    Ok(row.insert(db).await?)
}

/// Opens a test customer account.
///
/// # Defaults
/// * `day_limit`: 0 (no daily ceiling)
/// * `credit_days`: 0
/// * `limit_expiry`: None
pub async fn create_test_customer(
    db: &DatabaseConnection,
    com_id: i64,
    cst_limit: f64,
) -> Result<customer_balance::Model> {
    balance::open_account(
        db,
        com_id,
        CreditTerms {
            cst_limit,
            day_limit: 0.0,
            credit_days: 0,
            limit_expiry: None,
        },
        at(2026, 1, 1, 0, 0, 0),
    )
    .await
}

/// Inserts a completed, invoiced, unpaid filling request without touching the
/// customer's balances.
pub async fn insert_completed_invoice(
    db: &DatabaseConnection,
    com_id: i64,
    amount: f64,
    completed_at: NaiveDateTime,
) -> Result<filling_request::Model> {
    let row = filling_request::ActiveModel {
        rid: Set(format!("INV-{com_id}-{}", completed_at.and_utc().timestamp())),
        com_id: Set(com_id),
        station_id: Set(1),
        product_id: Set(1),
        sub_product_id: Set(1),
        qty: Set(1.0),
        price: Set(amount),
        amount: Set(amount),
        status: Set(FillingStatus::Completed),
        is_checked: Set(true),
        is_invoiced: Set(true),
        payment_status: Set(PaymentStatus::Unpaid),
        remarks: Set(None),
        created_at: Set(completed_at),
        completed_at: Set(Some(completed_at)),
        updated_at: Set(completed_at),
        ..Default::default()
    };
    Ok(row.insert(db).await?)
}

/// Opens a test voucher for employee 7.
pub async fn create_test_voucher(
    db: &DatabaseConnection,
    advance: f64,
) -> Result<crate::entities::voucher::Model> {
    voucher::create_voucher(
        db,
        NewVoucher {
            emp_id: 7,
            vehicle_no: Some("TN-01-AB-1234".to_string()),
            advance,
            created_by: Some("test".to_string()),
        },
        at(2026, 3, 10, 8, 0, 0),
    )
    .await
}
