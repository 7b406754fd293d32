//! Filling requests and their status machine.
//!
//! Creating a request reserves `qty * price` on the customer's hold and draws
//! it from today's ceiling. The hold follows the request: completing it
//! settles the amount, cancelling it puts whatever is still held back into
//! `amtlimit`. Legal moves are:
//!
//! ```text
//! Pending ──> Processing ──> Completed
//!    │             │
//!    └──> Cancelled <──┘
//! ```

use crate::{
    core::{
        audit::{self, AuditEntry},
        balance::lock_customer,
        deal_price::{DealPriceKey, get_active_deal_price},
        eligibility,
        hold::{release_request_in, reserve_in, settle_request_in},
    },
    entities::{
        CustomerBalance, FillingRequest, FillingStatus, PaymentStatus, customer_balance,
        filling_request,
    },
    errors::{Error, Result},
};
use chrono::{Duration, NaiveDateTime};
use sea_orm::{QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*, sea_query::Expr};
use serde::Deserialize;
use tracing::info;

/// Input for a new filling request.
#[derive(Debug, Clone, Deserialize)]
pub struct NewFillingRequest {
    /// Which customer, station and product
    #[serde(flatten)]
    pub key: DealPriceKey,
    /// Quantity to fill
    pub qty: f64,
    /// Unit price; the active deal price for the key when omitted
    #[serde(default)]
    pub price: Option<f64>,
    /// Free-text remarks
    #[serde(default)]
    pub remarks: Option<String>,
    /// Who raised the request
    #[serde(default)]
    pub created_by: Option<String>,
}

/// Whether `from -> to` is a legal status move.
#[must_use]
pub const fn can_transition(from: FillingStatus, to: FillingStatus) -> bool {
    matches!(
        (from, to),
        (FillingStatus::Pending, FillingStatus::Processing | FillingStatus::Cancelled)
            | (
                FillingStatus::Processing,
                FillingStatus::Completed | FillingStatus::Cancelled
            )
    )
}

fn invalid(from: FillingStatus, to: impl ToString) -> Error {
    Error::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}

async fn lock_request<C>(conn: &C, id: i64) -> Result<filling_request::Model>
where
    C: ConnectionTrait,
{
    FillingRequest::find_by_id(id)
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or(Error::FillingRequestNotFound { id })
}

/// Fetches a filling request.
pub async fn get_filling_request(
    db: &DatabaseConnection,
    id: i64,
) -> Result<filling_request::Model> {
    FillingRequest::find_by_id(id)
        .one(db)
        .await?
        .ok_or(Error::FillingRequestNotFound { id })
}

/// All filling requests of a customer, newest first.
pub async fn list_filling_requests(
    db: &DatabaseConnection,
    com_id: i64,
) -> Result<Vec<filling_request::Model>> {
    FillingRequest::find()
        .filter(filling_request::Column::ComId.eq(com_id))
        .order_by_desc(filling_request::Column::CreatedAt)
        .order_by_desc(filling_request::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Creates a `Pending` request and reserves its amount on the customer's hold
/// in the same transaction.
///
/// # Errors
/// `InvalidAmount` for a bad quantity or price, `DealPriceNotFound` when no price
/// was given and the key has no active deal price, and any eligibility failure of
/// the customer (`CustomerInactive`, `InsufficientLimit`, ...).
pub async fn create_filling_request(
    db: &DatabaseConnection,
    new: NewFillingRequest,
    now: NaiveDateTime,
) -> Result<filling_request::Model> {
    if !new.qty.is_finite() || new.qty <= 0.0 {
        return Err(Error::InvalidAmount { amount: new.qty });
    }

    let price = match new.price {
        Some(price) => price,
        None => get_active_deal_price(db, new.key)
            .await?
            .map(|row| row.price)
            .ok_or(Error::DealPriceNotFound {
                com_id: new.key.com_id,
                station_id: new.key.station_id,
            })?,
    };
    if !price.is_finite() || price <= 0.0 {
        return Err(Error::InvalidAmount { amount: price });
    }
    let amount = new.qty * price;
    let com_id = new.key.com_id;

    let txn = db.begin().await?;
    eligibility::evaluate(&txn, com_id, amount, now)
        .await?
        .into_result(amount)?;

    let row = filling_request::ActiveModel {
        rid: Set(String::new()),
        com_id: Set(com_id),
        station_id: Set(new.key.station_id),
        product_id: Set(new.key.product_id),
        sub_product_id: Set(new.key.sub_product_id),
        qty: Set(new.qty),
        price: Set(price),
        amount: Set(amount),
        status: Set(FillingStatus::Pending),
        is_checked: Set(false),
        is_invoiced: Set(false),
        payment_status: Set(PaymentStatus::Unpaid),
        remarks: Set(new.remarks),
        created_at: Set(now),
        completed_at: Set(None),
        updated_at: Set(now),
        ..Default::default()
    };
    let saved = row.insert(&txn).await?;

    let id = saved.id;
    let mut numbered: filling_request::ActiveModel = saved.into();
    numbered.rid = Set(format!("FR-{id:06}"));
    let saved = numbered.update(&txn).await?;

    reserve_in(&txn, com_id, amount, Some(saved.id), now).await?;
    txn.commit().await?;

    info!(
        "Filling request {} created for customer {}: {:.2}",
        saved.rid, com_id, amount
    );
    audit::record(
        db,
        AuditEntry::new("filling_request", saved.id, "create")
            .by(new.created_by.as_deref())
            .new_value(&saved),
    )
    .await;

    Ok(saved)
}

/// Moves a request to `to`, settling or releasing its hold as needed.
///
/// Completing a request also starts the customer's credit-days clock when it
/// is not already running.
pub async fn transition(
    db: &DatabaseConnection,
    id: i64,
    to: FillingStatus,
    performed_by: Option<&str>,
    now: NaiveDateTime,
) -> Result<filling_request::Model> {
    let txn = db.begin().await?;
    let current = lock_request(&txn, id).await?;
    if !can_transition(current.status, to) {
        return Err(invalid(current.status, to));
    }

    match to {
        FillingStatus::Completed => {
            settle_request_in(&txn, current.com_id, current.amount, id, now).await?;
            let customer = lock_customer(&txn, current.com_id).await?;
            if customer.credit_days > 0 && customer.day_limit_expiry.is_none() {
                CustomerBalance::update_many()
                    .col_expr(
                        customer_balance::Column::DayLimitExpiry,
                        Expr::value(now + Duration::days(i64::from(customer.credit_days))),
                    )
                    .filter(customer_balance::Column::Id.eq(customer.id))
                    .exec(&txn)
                    .await?;
            }
        }
        FillingStatus::Cancelled => {
            release_request_in(&txn, current.com_id, current.amount, id, now).await?;
        }
        FillingStatus::Pending | FillingStatus::Processing => {}
    }

    let mut update = FillingRequest::update_many()
        .col_expr(filling_request::Column::Status, Expr::value(to))
        .col_expr(filling_request::Column::UpdatedAt, Expr::value(now));
    if to == FillingStatus::Completed {
        update = update.col_expr(filling_request::Column::CompletedAt, Expr::value(now));
    }
    let result = update
        .filter(filling_request::Column::Id.eq(id))
        .filter(filling_request::Column::Status.eq(current.status))
        .exec(&txn)
        .await?;
    if result.rows_affected != 1 {
        return Err(invalid(current.status, to));
    }

    let updated = lock_request(&txn, id).await?;
    txn.commit().await?;

    info!("Filling request {}: {} -> {}", current.rid, current.status, to);
    audit::record(
        db,
        AuditEntry::new("filling_request", id, "status")
            .by(performed_by)
            .old(&current)
            .new_value(&updated),
    )
    .await;

    Ok(updated)
}

/// Marks a request as verified by the back office.
pub async fn mark_checked(
    db: &DatabaseConnection,
    id: i64,
    performed_by: Option<&str>,
    now: NaiveDateTime,
) -> Result<filling_request::Model> {
    let current = get_filling_request(db, id).await?;
    if current.is_checked {
        return Ok(current);
    }

    let mut active: filling_request::ActiveModel = current.into();
    active.is_checked = Set(true);
    active.updated_at = Set(now);
    let updated = active.update(db).await?;

    audit::record(
        db,
        AuditEntry::new("filling_request", id, "check").by(performed_by),
    )
    .await;

    Ok(updated)
}

/// Marks a completed request as invoiced.
///
/// # Errors
/// `InvalidTransition` unless the request is `Completed`.
pub async fn mark_invoiced(
    db: &DatabaseConnection,
    id: i64,
    performed_by: Option<&str>,
    now: NaiveDateTime,
) -> Result<filling_request::Model> {
    let current = get_filling_request(db, id).await?;
    if current.status != FillingStatus::Completed {
        return Err(invalid(current.status, "Invoiced"));
    }
    if current.is_invoiced {
        return Ok(current);
    }

    let mut active: filling_request::ActiveModel = current.into();
    active.is_invoiced = Set(true);
    active.updated_at = Set(now);
    let updated = active.update(db).await?;

    audit::record(
        db,
        AuditEntry::new("filling_request", id, "invoice").by(performed_by),
    )
    .await;

    Ok(updated)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::balance::{get_customer_balance, list_history};
    use crate::entities::{DealPriceStatus, HistoryType};
    use crate::test_utils::*;

    fn request(com_id: i64, qty: f64, price: Option<f64>) -> NewFillingRequest {
        NewFillingRequest {
            key: DealPriceKey {
                com_id,
                station_id: 2,
                product_id: 3,
                sub_product_id: 4,
            },
            qty,
            price,
            remarks: None,
            created_by: Some("station".to_string()),
        }
    }

    #[test]
    fn test_transition_table() {
        use FillingStatus::{Cancelled, Completed, Pending, Processing};
        let all = [Pending, Processing, Completed, Cancelled];
        let legal = [
            (Pending, Processing),
            (Pending, Cancelled),
            (Processing, Completed),
            (Processing, Cancelled),
        ];
        for from in all {
            for to in all {
                assert_eq!(
                    can_transition(from, to),
                    legal.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[tokio::test]
    async fn test_create_reserves_amount() -> Result<()> {
        let db = setup_test_db().await?;
        let now = at(2026, 3, 10, 9, 0, 0);
        create_test_customer(&db, 1, 1000.0).await?;

        let created = create_filling_request(&db, request(1, 4.0, Some(50.0)), now).await?;
        assert_eq!(created.rid, format!("FR-{:06}", created.id));
        assert_eq!(created.amount, 200.0);
        assert_eq!(created.status, FillingStatus::Pending);

        let customer = get_customer_balance(&db, 1).await?.unwrap();
        assert_eq!(customer.amtlimit, 800.0);
        assert_eq!(customer.hold_balance, 200.0);

        let history = list_history(&db, 1).await?;
        assert_eq!(history[0].trans_type, HistoryType::HoldReserve);
        assert_eq!(history[0].filling_request_id, Some(created.id));

        Ok(())
    }

    #[tokio::test]
    async fn test_create_uses_active_deal_price() -> Result<()> {
        let db = setup_test_db().await?;
        let now = at(2026, 3, 10, 9, 0, 0);
        create_test_customer(&db, 1, 1000.0).await?;

        let missing = create_filling_request(&db, request(1, 2.0, None), now).await;
        assert!(matches!(missing, Err(Error::DealPriceNotFound { .. })));

        insert_deal_price(
            &db,
            request(1, 0.0, None).key,
            92.5,
            now.date(),
            hms(6, 0, 0),
            DealPriceStatus::Active,
        )
        .await?;
        let created = create_filling_request(&db, request(1, 2.0, None), now).await?;
        assert_eq!(created.price, 92.5);
        assert_eq!(created.amount, 185.0);

        Ok(())
    }

    #[tokio::test]
    async fn test_create_rejects_ineligible_customer() -> Result<()> {
        let db = setup_test_db().await?;
        let now = at(2026, 3, 10, 9, 0, 0);
        create_test_customer(&db, 1, 100.0).await?;

        let result = create_filling_request(&db, request(1, 3.0, Some(50.0)), now).await;
        assert!(matches!(result, Err(Error::InsufficientLimit { .. })));

        let result = create_filling_request(&db, request(1, 0.0, Some(50.0)), now).await;
        assert!(matches!(result, Err(Error::InvalidAmount { .. })));

        // Nothing persisted
        assert!(list_filling_requests(&db, 1).await?.is_empty());
        assert_eq!(get_customer_balance(&db, 1).await?.unwrap().hold_balance, 0.0);

        Ok(())
    }

    #[tokio::test]
    async fn test_complete_settles_hold_and_starts_credit_clock() -> Result<()> {
        let db = setup_test_db().await?;
        let now = at(2026, 3, 10, 9, 0, 0);
        let customer = create_test_customer(&db, 1, 1000.0).await?;
        let mut active: customer_balance::ActiveModel = customer.into();
        active.credit_days = Set(15);
        active.update(&db).await?;

        let created = create_filling_request(&db, request(1, 10.0, Some(30.0)), now).await?;
        transition(&db, created.id, FillingStatus::Processing, None, now).await?;
        let done_at = at(2026, 3, 10, 11, 0, 0);
        let done = transition(&db, created.id, FillingStatus::Completed, Some("op"), done_at).await?;
        assert_eq!(done.status, FillingStatus::Completed);
        assert_eq!(done.completed_at, Some(done_at));

        let customer = get_customer_balance(&db, 1).await?.unwrap();
        assert_eq!(customer.hold_balance, 0.0);
        assert_eq!(customer.amtlimit, 700.0);
        assert_eq!(customer.balance, -300.0);
        assert_eq!(customer.day_limit_expiry, Some(at(2026, 3, 25, 11, 0, 0)));

        let again = transition(&db, created.id, FillingStatus::Cancelled, None, done_at).await;
        assert!(matches!(again, Err(Error::InvalidTransition { .. })));

        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_releases_hold() -> Result<()> {
        let db = setup_test_db().await?;
        let now = at(2026, 3, 10, 9, 0, 0);
        create_test_customer(&db, 1, 1000.0).await?;

        let keep = create_filling_request(&db, request(1, 1.0, Some(100.0)), now).await?;
        let dropped = create_filling_request(&db, request(1, 2.0, Some(100.0)), now).await?;
        transition(&db, dropped.id, FillingStatus::Cancelled, None, now).await?;

        let customer = get_customer_balance(&db, 1).await?.unwrap();
        assert_eq!(customer.amtlimit, 900.0);
        assert_eq!(customer.hold_balance, 100.0);
        assert_eq!(get_filling_request(&db, keep.id).await?.status, FillingStatus::Pending);

        let skip = transition(&db, keep.id, FillingStatus::Completed, None, now).await;
        assert!(matches!(skip, Err(Error::InvalidTransition { .. })));

        Ok(())
    }

    #[tokio::test]
    async fn test_open_requests_share_one_day_limit() -> Result<()> {
        let db = setup_test_db().await?;
        let now = at(2026, 3, 10, 9, 0, 0);
        let customer = create_test_customer(&db, 1, 1000.0).await?;
        let mut active: customer_balance::ActiveModel = customer.into();
        active.day_limit = Set(300.0);
        active.remaining_day_limit = Set(300.0);
        active.update(&db).await?;

        let first = create_filling_request(&db, request(1, 2.0, Some(100.0)), now).await?;
        let over = create_filling_request(&db, request(1, 2.0, Some(100.0)), now).await;
        assert!(matches!(
            over,
            Err(Error::DayLimitExceeded {
                remaining: 100.0,
                required: 200.0
            })
        ));
        let second = create_filling_request(&db, request(1, 1.0, Some(100.0)), now).await?;
        assert_eq!(
            get_customer_balance(&db, 1).await?.unwrap().remaining_day_limit,
            0.0
        );

        // Completing does not draw the ceiling a second time
        for id in [first.id, second.id] {
            transition(&db, id, FillingStatus::Processing, None, now).await?;
            transition(&db, id, FillingStatus::Completed, None, now).await?;
        }
        let customer = get_customer_balance(&db, 1).await?.unwrap();
        assert_eq!(customer.remaining_day_limit, 0.0);
        assert_eq!(customer.balance, -300.0);
        assert_eq!(list_filling_requests(&db, 1).await?.len(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_gives_day_limit_back() -> Result<()> {
        let db = setup_test_db().await?;
        let now = at(2026, 3, 10, 9, 0, 0);
        let customer = create_test_customer(&db, 1, 1000.0).await?;
        let mut active: customer_balance::ActiveModel = customer.into();
        active.day_limit = Set(300.0);
        active.remaining_day_limit = Set(300.0);
        active.update(&db).await?;

        let created = create_filling_request(&db, request(1, 2.0, Some(100.0)), now).await?;
        transition(&db, created.id, FillingStatus::Cancelled, None, now).await?;

        let customer = get_customer_balance(&db, 1).await?.unwrap();
        assert_eq!(customer.remaining_day_limit, 300.0);
        assert_eq!(customer.amtlimit, 1000.0);

        Ok(())
    }

    #[tokio::test]
    async fn test_requests_survive_release_all() -> Result<()> {
        let db = setup_test_db().await?;
        let now = at(2026, 3, 10, 9, 0, 0);
        create_test_customer(&db, 1, 1000.0).await?;

        let cancelled = create_filling_request(&db, request(1, 2.0, Some(100.0)), now).await?;
        let completed = create_filling_request(&db, request(1, 1.0, Some(150.0)), now).await?;
        assert_eq!(crate::core::hold::release_all(&db, 1, now).await?, 350.0);

        let row = transition(&db, cancelled.id, FillingStatus::Cancelled, None, now).await?;
        assert_eq!(row.status, FillingStatus::Cancelled);
        let customer = get_customer_balance(&db, 1).await?.unwrap();
        assert_eq!(customer.amtlimit, 1000.0);
        assert_eq!(customer.hold_balance, 0.0);

        transition(&db, completed.id, FillingStatus::Processing, None, now).await?;
        let row = transition(&db, completed.id, FillingStatus::Completed, None, now).await?;
        assert_eq!(row.status, FillingStatus::Completed);
        let customer = get_customer_balance(&db, 1).await?.unwrap();
        assert_eq!(customer.amtlimit, 850.0);
        assert_eq!(customer.hold_balance, 0.0);
        assert_eq!(customer.balance, -150.0);

        Ok(())
    }

    #[tokio::test]
    async fn test_check_and_invoice() -> Result<()> {
        let db = setup_test_db().await?;
        let now = at(2026, 3, 10, 9, 0, 0);
        create_test_customer(&db, 1, 1000.0).await?;
        let created = create_filling_request(&db, request(1, 1.0, Some(100.0)), now).await?;

        let early = mark_invoiced(&db, created.id, None, now).await;
        assert!(matches!(early, Err(Error::InvalidTransition { .. })));

        assert!(mark_checked(&db, created.id, Some("auditor"), now).await?.is_checked);

        transition(&db, created.id, FillingStatus::Processing, None, now).await?;
        transition(&db, created.id, FillingStatus::Completed, None, now).await?;
        let invoiced = mark_invoiced(&db, created.id, Some("billing"), now).await?;
        assert!(invoiced.is_invoiced);
        assert_eq!(invoiced.payment_status, PaymentStatus::Unpaid);

        let trail = audit::for_record(&db, "filling_request", created.id).await?;
        assert_eq!(trail[0].action, "invoice");
        assert_eq!(trail.len(), 5);

        let missing = mark_checked(&db, 999, None, now).await;
        assert!(matches!(missing, Err(Error::FillingRequestNotFound { id: 999 })));

        Ok(())
    }
}
