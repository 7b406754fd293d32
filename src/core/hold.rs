//! Hold-balance reserve, release and settlement.
//!
//! Reserving moves credit from `amtlimit` into `hold_balance` and, for
//! customers with a daily ceiling, draws the same amount from
//! `remaining_day_limit`; releasing moves both back; settling consumes the
//! hold when a filling completes. Each move is a single guarded `UPDATE`
//! (`... WHERE amtlimit >= ?`), so two callers racing for the same credit
//! cannot both win even when both passed the preliminary check, and the
//! history row is written in the same transaction.

use crate::{
    core::{
        audit::{self, AuditEntry},
        balance::{Movement, append_history, lock_customer},
    },
    entities::{CustomerBalance, HistoryType, customer_balance},
    errors::{Error, Result},
};
use chrono::NaiveDateTime;
use sea_orm::{TransactionTrait, prelude::*, sea_query::Expr};
use tracing::{debug, info};

fn validate_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(Error::InvalidAmount { amount });
    }
    Ok(())
}

/// Today's ceiling after `amount` is given back, never above `day_limit`.
fn restored_day_limit(customer: &customer_balance::Model, amount: f64) -> f64 {
    (customer.remaining_day_limit + amount).min(customer.day_limit)
}

/// Moves `amount` from `amtlimit` to `hold_balance` only if `amtlimit` still
/// covers it, and with `charge_day_limit` only if today's ceiling does too.
/// Returns whether the row was updated.
async fn guarded_reserve<C>(
    conn: &C,
    com_id: i64,
    amount: f64,
    charge_day_limit: bool,
    now: NaiveDateTime,
) -> Result<bool>
where
    C: ConnectionTrait,
{
    let mut update = CustomerBalance::update_many()
        .col_expr(
            customer_balance::Column::Amtlimit,
            Expr::col(customer_balance::Column::Amtlimit).sub(amount),
        )
        .col_expr(
            customer_balance::Column::HoldBalance,
            Expr::col(customer_balance::Column::HoldBalance).add(amount),
        )
        .col_expr(customer_balance::Column::UpdatedAt, Expr::value(now))
        .filter(customer_balance::Column::ComId.eq(com_id))
        .filter(customer_balance::Column::Amtlimit.gte(amount));
    if charge_day_limit {
        update = update
            .col_expr(
                customer_balance::Column::RemainingDayLimit,
                Expr::col(customer_balance::Column::RemainingDayLimit).sub(amount),
            )
            .filter(customer_balance::Column::RemainingDayLimit.gte(amount));
    }
    let result = update.exec(conn).await?;
    Ok(result.rows_affected == 1)
}

/// Moves `amount` from `hold_balance` back to `amtlimit` only if the hold
/// covers it, and gives it back to today's ceiling when the customer has one.
async fn guarded_release<C>(
    conn: &C,
    current: &customer_balance::Model,
    amount: f64,
    now: NaiveDateTime,
) -> Result<bool>
where
    C: ConnectionTrait,
{
    let mut update = CustomerBalance::update_many()
        .col_expr(
            customer_balance::Column::Amtlimit,
            Expr::col(customer_balance::Column::Amtlimit).add(amount),
        )
        .col_expr(
            customer_balance::Column::HoldBalance,
            Expr::col(customer_balance::Column::HoldBalance).sub(amount),
        )
        .col_expr(customer_balance::Column::UpdatedAt, Expr::value(now));
    if current.day_limit > 0.0 {
        update = update.col_expr(
            customer_balance::Column::RemainingDayLimit,
            Expr::value(restored_day_limit(current, amount)),
        );
    }
    let result = update
        .filter(customer_balance::Column::ComId.eq(current.com_id))
        .filter(customer_balance::Column::HoldBalance.gte(amount))
        .exec(conn)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Reserve inside an open transaction. See [`reserve`].
pub async fn reserve_in<C>(
    conn: &C,
    com_id: i64,
    amount: f64,
    filling_request_id: Option<i64>,
    now: NaiveDateTime,
) -> Result<customer_balance::Model>
where
    C: ConnectionTrait,
{
    validate_amount(amount)?;

    let current = lock_customer(conn, com_id).await?;
    if !current.is_active {
        return Err(Error::CustomerInactive { com_id });
    }
    if current.amtlimit < amount {
        return Err(Error::InsufficientLimit {
            available: current.amtlimit,
            required: amount,
        });
    }
    let charge_day_limit = current.day_limit > 0.0;
    if charge_day_limit && current.remaining_day_limit < amount {
        return Err(Error::DayLimitExceeded {
            remaining: current.remaining_day_limit,
            required: amount,
        });
    }

    if !guarded_reserve(conn, com_id, amount, charge_day_limit, now).await? {
        // Another writer consumed the credit after our read
        let latest = lock_customer(conn, com_id).await?;
        if latest.amtlimit < amount {
            return Err(Error::InsufficientLimit {
                available: latest.amtlimit,
                required: amount,
            });
        }
        return Err(Error::DayLimitExceeded {
            remaining: latest.remaining_day_limit,
            required: amount,
        });
    }

    append_history(
        conn,
        com_id,
        Movement::new(
            HistoryType::HoldReserve,
            amount,
            current.amtlimit,
            current.amtlimit - amount,
        )
        .for_request(filling_request_id),
        now,
    )
    .await?;

    lock_customer(conn, com_id).await
}

/// Release of a specific amount inside an open transaction.
pub async fn release_in<C>(
    conn: &C,
    com_id: i64,
    amount: f64,
    filling_request_id: Option<i64>,
    now: NaiveDateTime,
) -> Result<customer_balance::Model>
where
    C: ConnectionTrait,
{
    validate_amount(amount)?;

    let current = lock_customer(conn, com_id).await?;
    if !guarded_release(conn, &current, amount, now).await? {
        return Err(Error::InsufficientHold {
            held: current.hold_balance,
            required: amount,
        });
    }

    append_history(
        conn,
        com_id,
        Movement::new(
            HistoryType::HoldRelease,
            amount,
            current.amtlimit,
            current.amtlimit + amount,
        )
        .for_request(filling_request_id),
        now,
    )
    .await?;

    lock_customer(conn, com_id).await
}

/// Releases what is left of a cancelled request's hold. A hold already handed
/// back by [`release_all`] releases nothing, so the request can still cancel.
pub async fn release_request_in<C>(
    conn: &C,
    com_id: i64,
    amount: f64,
    filling_request_id: i64,
    now: NaiveDateTime,
) -> Result<customer_balance::Model>
where
    C: ConnectionTrait,
{
    validate_amount(amount)?;

    let current = lock_customer(conn, com_id).await?;
    let held = current.hold_balance.min(amount);
    if held <= 0.0 {
        debug!(
            "Request {} of customer {} has nothing left on hold",
            filling_request_id, com_id
        );
        return Ok(current);
    }
    release_in(conn, com_id, held, Some(filling_request_id), now).await
}

/// Consumes `from_hold` of the hold and charges the rest of `amount` to
/// `amtlimit` and today's ceiling. The wallet balance pays the full amount.
async fn apply_settlement<C>(
    conn: &C,
    current: &customer_balance::Model,
    amount: f64,
    from_hold: f64,
    filling_request_id: Option<i64>,
    now: NaiveDateTime,
) -> Result<customer_balance::Model>
where
    C: ConnectionTrait,
{
    let shortfall = amount - from_hold;
    let mut update = CustomerBalance::update_many()
        .col_expr(
            customer_balance::Column::HoldBalance,
            Expr::col(customer_balance::Column::HoldBalance).sub(from_hold),
        )
        .col_expr(
            customer_balance::Column::Balance,
            Expr::col(customer_balance::Column::Balance).sub(amount),
        )
        .col_expr(customer_balance::Column::UpdatedAt, Expr::value(now));
    if shortfall > 0.0 {
        update = update.col_expr(
            customer_balance::Column::Amtlimit,
            Expr::col(customer_balance::Column::Amtlimit).sub(shortfall),
        );
        if current.day_limit > 0.0 {
            update = update.col_expr(
                customer_balance::Column::RemainingDayLimit,
                Expr::value((current.remaining_day_limit - shortfall).max(0.0)),
            );
        }
    }
    let result = update
        .filter(customer_balance::Column::ComId.eq(current.com_id))
        .filter(customer_balance::Column::HoldBalance.gte(from_hold))
        .exec(conn)
        .await?;

    if result.rows_affected != 1 {
        return Err(Error::InsufficientHold {
            held: current.hold_balance,
            required: from_hold,
        });
    }

    append_history(
        conn,
        current.com_id,
        Movement::new(
            HistoryType::HoldSettle,
            amount,
            current.amtlimit,
            current.amtlimit - shortfall.max(0.0),
        )
        .for_request(filling_request_id),
        now,
    )
    .await?;

    lock_customer(conn, current.com_id).await
}

/// Settlement inside an open transaction: consumes `amount` of the hold and
/// charges it to the wallet balance. Today's ceiling was already drawn when
/// the hold was reserved.
pub async fn settle_in<C>(
    conn: &C,
    com_id: i64,
    amount: f64,
    filling_request_id: Option<i64>,
    now: NaiveDateTime,
) -> Result<customer_balance::Model>
where
    C: ConnectionTrait,
{
    validate_amount(amount)?;

    let current = lock_customer(conn, com_id).await?;
    apply_settlement(conn, &current, amount, amount, filling_request_id, now).await
}

/// Settles a completed request. Whatever part of its hold is gone (handed
/// back by [`release_all`]) is drawn from `amtlimit` again instead, so the
/// delivery is always booked.
pub async fn settle_request_in<C>(
    conn: &C,
    com_id: i64,
    amount: f64,
    filling_request_id: i64,
    now: NaiveDateTime,
) -> Result<customer_balance::Model>
where
    C: ConnectionTrait,
{
    validate_amount(amount)?;

    let current = lock_customer(conn, com_id).await?;
    let from_hold = current.hold_balance.clamp(0.0, amount);
    apply_settlement(
        conn,
        &current,
        amount,
        from_hold,
        Some(filling_request_id),
        now,
    )
    .await
}

/// Reserves `amount` of a customer's available credit.
///
/// # Errors
/// `InsufficientLimit` when `amtlimit < amount` (also when a concurrent
/// reserve took the credit first), `CustomerInactive` for suspended customers,
/// `CustomerNotFound`, `InvalidAmount`.
pub async fn reserve(
    db: &DatabaseConnection,
    com_id: i64,
    amount: f64,
    now: NaiveDateTime,
) -> Result<customer_balance::Model> {
    validate_amount(amount)?;
    let txn = db.begin().await?;
    let updated = reserve_in(&txn, com_id, amount, None, now).await?;
    txn.commit().await?;

    info!("Reserved {:.2} for customer {}", amount, com_id);
    audit::record(
        db,
        AuditEntry::new("customer_balance", com_id, "hold_reserve")
            .remarks(format!("{amount:.2}")),
    )
    .await;

    Ok(updated)
}

/// Moves the entire hold back into `amtlimit`. Returns the amount released
/// (zero when nothing was on hold).
pub async fn release_all(db: &DatabaseConnection, com_id: i64, now: NaiveDateTime) -> Result<f64> {
    let txn = db.begin().await?;
    let current = lock_customer(&txn, com_id).await?;
    let held = current.hold_balance;

    if held <= 0.0 {
        debug!("Nothing on hold for customer {}", com_id);
        txn.commit().await?;
        return Ok(0.0);
    }

    release_in(&txn, com_id, held, None, now).await?;
    txn.commit().await?;

    info!("Released {:.2} hold for customer {}", held, com_id);
    audit::record(
        db,
        AuditEntry::new("customer_balance", com_id, "hold_release_all")
            .remarks(format!("{held:.2}")),
    )
    .await;

    Ok(held)
}

/// Consumes `amount` of the hold for a completed delivery.
pub async fn settle(
    db: &DatabaseConnection,
    com_id: i64,
    amount: f64,
    now: NaiveDateTime,
) -> Result<customer_balance::Model> {
    let txn = db.begin().await?;
    let updated = settle_in(&txn, com_id, amount, None, now).await?;
    txn.commit().await?;
    Ok(updated)
}
