//! Deal price scheduling and lifecycle.
//!
//! Admins schedule a price for a (customer, station, product, sub-product) key
//! with [`schedule_deal_price`]. The cron job [`run_deal_price_scheduler`] then
//! moves rows through `scheduled -> active -> expired`:
//!
//! 1. rows whose schedule date/time has passed become `active`; when several
//!    rows of one key are due together the latest schedule wins and the rest
//!    expire unused,
//! 2. for every key, only the most recently applied `active` row survives,
//! 3. rows whose schedule date is before today expire.
//!
//! All three steps run in a single database transaction, so a failed run leaves
//! nothing half-applied and a key never ends a run with two active prices.

use crate::{
    core::audit::{self, AuditEntry},
    entities::{DealPrice, DealPriceStatus, deal_price},
    errors::{Error, Result},
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, instrument};

/// Identifies which price rule a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DealPriceKey {
    /// Customer (company)
    pub com_id: i64,
    /// Filling station
    pub station_id: i64,
    /// Product
    pub product_id: i64,
    /// Sub-product / grade
    pub sub_product_id: i64,
}

impl DealPriceKey {
    /// Key of an existing row.
    #[must_use]
    pub const fn of(row: &deal_price::Model) -> Self {
        Self {
            com_id: row.com_id,
            station_id: row.station_id,
            product_id: row.product_id,
            sub_product_id: row.sub_product_id,
        }
    }

    fn validate(&self) -> Result<()> {
        let ids = [
            ("com_id", self.com_id),
            ("station_id", self.station_id),
            ("product_id", self.product_id),
            ("sub_product_id", self.sub_product_id),
        ];
        for (name, value) in ids {
            if value <= 0 {
                return Err(Error::Validation {
                    message: format!("{name} must be a positive id"),
                });
            }
        }
        Ok(())
    }
}

/// Input for scheduling a new deal price.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDealPrice {
    /// Which rule the price belongs to
    #[serde(flatten)]
    pub key: DealPriceKey,
    /// Price per unit
    pub price: f64,
    /// Day the price takes effect
    pub schedule_date: NaiveDate,
    /// Time of day the price takes effect
    pub schedule_time: NaiveTime,
    /// Who scheduled it
    pub created_by: Option<String>,
}

/// Counts of rows each scheduler step changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DealPriceRunReport {
    /// Rows moved from `scheduled` to `active`
    pub activated: u64,
    /// Due rows that lost to a later schedule for the same key in the same run
    pub skipped: u64,
    /// Active rows replaced by a more recently applied row for the same key
    pub superseded: u64,
    /// Rows expired because their schedule date is over
    pub expired: u64,
}

impl DealPriceRunReport {
    /// True when the run changed nothing.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.activated == 0 && self.skipped == 0 && self.superseded == 0 && self.expired == 0
    }
}

/// Schedules a new price. The row stays `scheduled` until the next scheduler run
/// at or after its schedule date/time.
///
/// # Errors
/// Rejects non-positive ids, non-positive or non-finite prices and schedule
/// dates before `now`'s date.
pub async fn schedule_deal_price(
    db: &DatabaseConnection,
    new: NewDealPrice,
    now: NaiveDateTime,
) -> Result<deal_price::Model> {
    new.key.validate()?;

    if !new.price.is_finite() || new.price <= 0.0 {
        return Err(Error::InvalidAmount { amount: new.price });
    }

    if new.schedule_date < now.date() {
        return Err(Error::Validation {
            message: format!("schedule date {} is in the past", new.schedule_date),
        });
    }

    let row = deal_price::ActiveModel {
        com_id: Set(new.key.com_id),
        station_id: Set(new.key.station_id),
        product_id: Set(new.key.product_id),
        sub_product_id: Set(new.key.sub_product_id),
        price: Set(new.price),
        status: Set(DealPriceStatus::Scheduled),
        is_applied: Set(false),
        is_active: Set(true),
        schedule_date: Set(new.schedule_date),
        schedule_time: Set(new.schedule_time),
        applied_at: Set(None),
        created_by: Set(new.created_by.clone()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let saved = row.insert(db).await?;

    audit::record(
        db,
        AuditEntry::new("deal_price", saved.id, "schedule")
            .by(new.created_by.as_deref())
            .new_value(&saved),
    )
    .await;

    Ok(saved)
}

/// Ordering used to pick the surviving active row of a key: most recently
/// applied first, then latest schedule, then highest id.
fn survivor_rank(row: &deal_price::Model) -> (Option<NaiveDateTime>, NaiveDateTime, i64) {
    (row.applied_at, row.scheduled_at(), row.id)
}

async fn set_status<C>(
    db: &C,
    ids: Vec<i64>,
    status: DealPriceStatus,
    now: NaiveDateTime,
) -> Result<u64>
where
    C: ConnectionTrait,
{
    if ids.is_empty() {
        return Ok(0);
    }
    let result = DealPrice::update_many()
        .col_expr(deal_price::Column::Status, Expr::value(status))
        .col_expr(deal_price::Column::UpdatedAt, Expr::value(now))
        .filter(deal_price::Column::Id.is_in(ids))
        .filter(deal_price::Column::Status.ne(status))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Runs one scheduler pass as of `now`. Idempotent: a second run with no newly
/// due rows changes nothing.
#[instrument(skip(db))]
pub async fn run_deal_price_scheduler(
    db: &DatabaseConnection,
    now: NaiveDateTime,
) -> Result<DealPriceRunReport> {
    let today = now.date();
    let mut report = DealPriceRunReport::default();
    let txn = db.begin().await?;

    // Step 1: activate due rows, one winner per key
    let candidates = DealPrice::find()
        .filter(deal_price::Column::Status.eq(DealPriceStatus::Scheduled))
        .filter(deal_price::Column::IsActive.eq(true))
        .filter(deal_price::Column::ScheduleDate.lte(today))
        .order_by_asc(deal_price::Column::ScheduleDate)
        .order_by_asc(deal_price::Column::ScheduleTime)
        .order_by_asc(deal_price::Column::Id)
        .all(&txn)
        .await?;

    let mut winners: HashMap<DealPriceKey, i64> = HashMap::new();
    let mut losers = Vec::new();
    for row in candidates.iter().filter(|row| row.scheduled_at() <= now) {
        if let Some(previous) = winners.insert(DealPriceKey::of(row), row.id) {
            losers.push(previous);
        }
    }

    let winner_ids: Vec<i64> = winners.values().copied().collect();
    if !winner_ids.is_empty() {
        let result = DealPrice::update_many()
            .col_expr(
                deal_price::Column::Status,
                Expr::value(DealPriceStatus::Active),
            )
            .col_expr(deal_price::Column::IsApplied, Expr::value(true))
            .col_expr(deal_price::Column::AppliedAt, Expr::value(now))
            .col_expr(deal_price::Column::UpdatedAt, Expr::value(now))
            .filter(deal_price::Column::Id.is_in(winner_ids))
            .filter(deal_price::Column::Status.eq(DealPriceStatus::Scheduled))
            .exec(&txn)
            .await?;
        report.activated = result.rows_affected;
    }
    report.skipped = set_status(&txn, losers, DealPriceStatus::Expired, now).await?;

    // Step 2: keep one active row per key
    let active = DealPrice::find()
        .filter(deal_price::Column::Status.eq(DealPriceStatus::Active))
        .all(&txn)
        .await?;

    let mut survivors: HashMap<DealPriceKey, &deal_price::Model> = HashMap::new();
    let mut superseded = Vec::new();
    for row in &active {
        let key = DealPriceKey::of(row);
        match survivors.get(&key).copied() {
            Some(current) if survivor_rank(current) >= survivor_rank(row) => {
                superseded.push(row.id);
            }
            Some(current) => {
                superseded.push(current.id);
                survivors.insert(key, row);
            }
            None => {
                survivors.insert(key, row);
            }
        }
    }
    report.superseded = set_status(&txn, superseded, DealPriceStatus::Expired, now).await?;

    // Step 3: expire rows whose day is over
    let result = DealPrice::update_many()
        .col_expr(
            deal_price::Column::Status,
            Expr::value(DealPriceStatus::Expired),
        )
        .col_expr(deal_price::Column::UpdatedAt, Expr::value(now))
        .filter(deal_price::Column::ScheduleDate.lt(today))
        .filter(
            deal_price::Column::Status
                .is_in([DealPriceStatus::Active, DealPriceStatus::Scheduled]),
        )
        .exec(&txn)
        .await?;
    report.expired = result.rows_affected;

    txn.commit().await?;

    info!(
        "Deal price run: {} activated, {} skipped, {} superseded, {} expired",
        report.activated, report.skipped, report.superseded, report.expired
    );
    Ok(report)
}

/// The price currently applied for `key`, if any.
pub async fn get_active_deal_price(
    db: &DatabaseConnection,
    key: DealPriceKey,
) -> Result<Option<deal_price::Model>> {
    DealPrice::find()
        .filter(deal_price::Column::ComId.eq(key.com_id))
        .filter(deal_price::Column::StationId.eq(key.station_id))
        .filter(deal_price::Column::ProductId.eq(key.product_id))
        .filter(deal_price::Column::SubProductId.eq(key.sub_product_id))
        .filter(deal_price::Column::Status.eq(DealPriceStatus::Active))
        .order_by_desc(deal_price::Column::AppliedAt)
        .order_by_desc(deal_price::Column::Id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// All deal prices of a customer, newest schedule first.
pub async fn list_deal_prices(
    db: &DatabaseConnection,
    com_id: i64,
) -> Result<Vec<deal_price::Model>> {
    DealPrice::find()
        .filter(deal_price::Column::ComId.eq(com_id))
        .order_by_desc(deal_price::Column::ScheduleDate)
        .order_by_desc(deal_price::Column::ScheduleTime)
        .order_by_desc(deal_price::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Keys that currently have more than one active row, with their counts.
/// Empty after every successful scheduler run.
pub async fn active_duplicates(db: &DatabaseConnection) -> Result<Vec<(DealPriceKey, usize)>> {
    let active = DealPrice::find()
        .filter(deal_price::Column::Status.eq(DealPriceStatus::Active))
        .all(db)
        .await?;

    let mut counts: HashMap<DealPriceKey, usize> = HashMap::new();
    for row in &active {
        *counts.entry(DealPriceKey::of(row)).or_default() += 1;
    }

    let mut duplicates: Vec<_> = counts.into_iter().filter(|(_, n)| *n > 1).collect();
    duplicates.sort_by_key(|(key, _)| {
        (key.com_id, key.station_id, key.product_id, key.sub_product_id)
    });
    Ok(duplicates)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::*;

    fn key() -> DealPriceKey {
        DealPriceKey {
            com_id: 1,
            station_id: 10,
            product_id: 100,
            sub_product_id: 1000,
        }
    }

    async fn status_of(db: &DatabaseConnection, id: i64) -> Result<deal_price::Model> {
        Ok(DealPrice::find_by_id(id).one(db).await?.unwrap())
    }

    #[tokio::test]
    async fn test_schedule_validation() -> Result<()> {
        let db = setup_test_db().await?;
        let now = at(2026, 3, 10, 9, 0, 0);

        let mut new = NewDealPrice {
            key: key(),
            price: 0.0,
            schedule_date: now.date(),
            schedule_time: hms(10, 0, 0),
            created_by: None,
        };
        let result = schedule_deal_price(&db, new.clone(), now).await;
        assert!(matches!(result, Err(Error::InvalidAmount { amount: 0.0 })));

        new.price = f64::NAN;
        let result = schedule_deal_price(&db, new.clone(), now).await;
        assert!(matches!(result, Err(Error::InvalidAmount { .. })));

        new.price = 95.5;
        new.key.station_id = 0;
        let result = schedule_deal_price(&db, new.clone(), now).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        new.key = key();
        new.schedule_date = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        let result = schedule_deal_price(&db, new, now).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        assert!(list_deal_prices(&db, 1).await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_schedule_inserts_scheduled_row_and_audits() -> Result<()> {
        let db = setup_test_db().await?;
        let now = at(2026, 3, 10, 9, 0, 0);

        let row = schedule_deal_price(
            &db,
            NewDealPrice {
                key: key(),
                price: 95.5,
                schedule_date: now.date(),
                schedule_time: hms(12, 0, 0),
                created_by: Some("admin".to_string()),
            },
            now,
        )
        .await?;

        assert_eq!(row.status, DealPriceStatus::Scheduled);
        assert!(!row.is_applied);
        assert!(row.applied_at.is_none());

        let audit_rows = audit::for_record(&db, "deal_price", row.id).await?;
        assert_eq!(audit_rows.len(), 1);
        assert_eq!(audit_rows[0].action, "schedule");

        Ok(())
    }

    #[tokio::test]
    async fn test_midnight_schedule_today_activates() -> Result<()> {
        let db = setup_test_db().await?;
        let now = at(2026, 3, 10, 0, 0, 5);
        let row = insert_deal_price(
            &db,
            key(),
            90.0,
            now.date(),
            hms(0, 0, 0),
            DealPriceStatus::Scheduled,
        )
        .await?;

        let report = run_deal_price_scheduler(&db, now).await?;
        assert_eq!(report.activated, 1);

        let updated = status_of(&db, row.id).await?;
        assert_eq!(updated.status, DealPriceStatus::Active);
        assert!(updated.is_applied);
        assert_eq!(updated.applied_at, Some(now));

        Ok(())
    }

    #[tokio::test]
    async fn test_future_schedule_stays_scheduled() -> Result<()> {
        let db = setup_test_db().await?;
        let now = at(2026, 3, 10, 9, 0, 0);
        let row = insert_deal_price(
            &db,
            key(),
            90.0,
            now.date(),
            hms(18, 0, 0),
            DealPriceStatus::Scheduled,
        )
        .await?;

        let report = run_deal_price_scheduler(&db, now).await?;
        assert!(report.is_noop());
        assert_eq!(status_of(&db, row.id).await?.status, DealPriceStatus::Scheduled);

        Ok(())
    }

    #[tokio::test]
    async fn test_new_activation_supersedes_active_row() -> Result<()> {
        let db = setup_test_db().await?;
        let morning = at(2026, 3, 10, 8, 0, 0);
        let old = insert_deal_price(
            &db,
            key(),
            90.0,
            morning.date(),
            hms(6, 0, 0),
            DealPriceStatus::Scheduled,
        )
        .await?;
        run_deal_price_scheduler(&db, morning).await?;

        let new = insert_deal_price(
            &db,
            key(),
            92.0,
            morning.date(),
            hms(12, 0, 0),
            DealPriceStatus::Scheduled,
        )
        .await?;
        let report = run_deal_price_scheduler(&db, at(2026, 3, 10, 12, 1, 0)).await?;

        assert_eq!(report.activated, 1);
        assert_eq!(report.superseded, 1);
        assert_eq!(status_of(&db, old.id).await?.status, DealPriceStatus::Expired);
        assert_eq!(status_of(&db, new.id).await?.status, DealPriceStatus::Active);

        let active = get_active_deal_price(&db, key()).await?.unwrap();
        assert_eq!(active.id, new.id);
        assert_eq!(active.price, 92.0);
        assert!(active_duplicates(&db).await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_several_due_rows_same_key_latest_wins() -> Result<()> {
        let db = setup_test_db().await?;
        let now = at(2026, 3, 10, 15, 0, 0);
        let early = insert_deal_price(
            &db,
            key(),
            90.0,
            now.date(),
            hms(6, 0, 0),
            DealPriceStatus::Scheduled,
        )
        .await?;
        let late = insert_deal_price(
            &db,
            key(),
            91.0,
            now.date(),
            hms(14, 0, 0),
            DealPriceStatus::Scheduled,
        )
        .await?;

        let report = run_deal_price_scheduler(&db, now).await?;
        assert_eq!(report.activated, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(status_of(&db, early.id).await?.status, DealPriceStatus::Expired);
        assert_eq!(status_of(&db, late.id).await?.status, DealPriceStatus::Active);

        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_active_rows_are_healed() -> Result<()> {
        let db = setup_test_db().await?;
        let now = at(2026, 3, 10, 9, 0, 0);

        // Two active rows for one key: the state left by an interrupted run of
        // independent, non-transactional updates
        let first =
            insert_deal_price(&db, key(), 90.0, now.date(), hms(6, 0, 0), DealPriceStatus::Active)
                .await?;
        let second =
            insert_deal_price(&db, key(), 91.0, now.date(), hms(7, 0, 0), DealPriceStatus::Active)
                .await?;
        assert_eq!(active_duplicates(&db).await?, vec![(key(), 2)]);

        let report = run_deal_price_scheduler(&db, now).await?;
        assert_eq!(report.superseded, 1);
        assert_eq!(status_of(&db, first.id).await?.status, DealPriceStatus::Expired);
        assert_eq!(status_of(&db, second.id).await?.status, DealPriceStatus::Active);
        assert!(active_duplicates(&db).await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_past_dates_expire() -> Result<()> {
        let db = setup_test_db().await?;
        let now = at(2026, 3, 10, 9, 0, 0);
        let yesterday = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();

        let stale_active =
            insert_deal_price(&db, key(), 88.0, yesterday, hms(6, 0, 0), DealPriceStatus::Active)
                .await?;
        let other_key = DealPriceKey {
            station_id: 11,
            ..key()
        };
        let never_ran =
            insert_deal_price(&db, other_key, 89.0, yesterday, hms(6, 0, 0), DealPriceStatus::Scheduled)
                .await?;

        run_deal_price_scheduler(&db, now).await?;

        assert_eq!(status_of(&db, stale_active.id).await?.status, DealPriceStatus::Expired);
        // Due rows are never left scheduled
        assert_eq!(status_of(&db, never_ran.id).await?.status, DealPriceStatus::Expired);
        assert!(get_active_deal_price(&db, key()).await?.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_no_due_row_left_scheduled() -> Result<()> {
        let db = setup_test_db().await?;
        let now = at(2026, 3, 10, 12, 0, 0);
        let yesterday = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();

        for (station, date, time) in [
            (1, yesterday, hms(23, 0, 0)),
            (2, now.date(), hms(0, 0, 0)),
            (2, now.date(), hms(11, 59, 59)),
            (3, now.date(), hms(12, 0, 0)),
            (4, now.date(), hms(12, 0, 1)),
        ] {
            let key = DealPriceKey {
                station_id: station,
                ..key()
            };
            insert_deal_price(&db, key, 90.0, date, time, DealPriceStatus::Scheduled).await?;
        }

        run_deal_price_scheduler(&db, now).await?;

        for row in DealPrice::find().all(&db).await? {
            if row.scheduled_at() <= now {
                assert_ne!(row.status, DealPriceStatus::Scheduled, "row {} left scheduled", row.id);
            } else {
                assert_eq!(row.status, DealPriceStatus::Scheduled);
            }
        }
        assert!(active_duplicates(&db).await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_disabled_rows_are_not_activated() -> Result<()> {
        let db = setup_test_db().await?;
        let now = at(2026, 3, 10, 9, 0, 0);
        let row = insert_deal_price(
            &db,
            key(),
            90.0,
            now.date(),
            hms(6, 0, 0),
            DealPriceStatus::Scheduled,
        )
        .await?;
        let mut disabled: deal_price::ActiveModel = row.into();
        disabled.is_active = Set(false);
        let row = disabled.update(&db).await?;

        let report = run_deal_price_scheduler(&db, now).await?;
        assert_eq!(report.activated, 0);
        assert_eq!(status_of(&db, row.id).await?.status, DealPriceStatus::Scheduled);

        Ok(())
    }

    #[tokio::test]
    async fn test_second_run_is_noop() -> Result<()> {
        let db = setup_test_db().await?;
        let now = at(2026, 3, 10, 9, 0, 0);
        insert_deal_price(&db, key(), 90.0, now.date(), hms(6, 0, 0), DealPriceStatus::Scheduled)
            .await?;

        let first = run_deal_price_scheduler(&db, now).await?;
        assert_eq!(first.activated, 1);

        let second = run_deal_price_scheduler(&db, now).await?;
        assert!(second.is_noop());

        Ok(())
    }

    #[tokio::test]
    async fn test_list_deal_prices_newest_first() -> Result<()> {
        let db = setup_test_db().await?;
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        insert_deal_price(&db, key(), 90.0, today, hms(6, 0, 0), DealPriceStatus::Scheduled)
            .await?;
        insert_deal_price(&db, key(), 91.0, today, hms(9, 0, 0), DealPriceStatus::Scheduled)
            .await?;
        let other_customer = DealPriceKey { com_id: 2, ..key() };
        insert_deal_price(&db, other_customer, 70.0, today, hms(9, 0, 0), DealPriceStatus::Scheduled)
            .await?;

        let rows = list_deal_prices(&db, 1).await?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].price, 91.0);
        assert_eq!(rows[1].price, 90.0);

        Ok(())
    }
}
