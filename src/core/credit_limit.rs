//! Credit limit lifecycle jobs.
//!
//! Three cron jobs keep customer credit in line with the calendar:
//!
//! - [`reset_expired_limits`] zeroes the credit line of customers whose
//!   `limit_expiry` has passed,
//! - [`restore_day_limits`] refills today's ceiling for customers still in good
//!   standing,
//! - [`enforce_credit_days`] marks unpaid invoices past their grace period as
//!   overdue and suspends the customer.
//!
//! Each job runs in one transaction and every row it touches is re-checked by
//! the `WHERE` clause of its update, so a customer modified between the read
//! and the write is skipped rather than clobbered.

use crate::{
    core::balance::{Movement, append_history},
    entities::{
        CustomerBalance, FillingRequest, FillingStatus, HistoryType, PaymentStatus,
        customer_balance, filling_request,
    },
    errors::Result,
};
use chrono::{Duration, NaiveDateTime};
use sea_orm::{
    Condition, QueryOrder, QuerySelect, TransactionTrait, prelude::*, sea_query::Expr,
};
use serde::Serialize;
use tracing::{info, instrument};

/// Customers whose credit line was zeroed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LimitResetReport {
    /// Affected customers
    pub customers: Vec<i64>,
}

/// Customers whose daily ceiling was refilled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DayLimitReport {
    /// Affected customers
    pub customers: Vec<i64>,
}

/// Invoices flagged overdue and customers suspended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CreditDaysReport {
    /// Filling requests moved to `Overdue`
    pub overdue_invoices: Vec<i64>,
    /// Customers newly suspended
    pub suspended: Vec<i64>,
}

/// When an unpaid completed request becomes overdue.
#[must_use]
pub fn due_at(invoice: &filling_request::Model, credit_days: i32) -> Option<NaiveDateTime> {
    invoice
        .completed_at
        .map(|completed| completed + Duration::days(i64::from(credit_days)))
}

/// True when the invoice is unpaid and its grace period is over at `now`.
#[must_use]
pub fn is_past_due(invoice: &filling_request::Model, credit_days: i32, now: NaiveDateTime) -> bool {
    match invoice.payment_status {
        PaymentStatus::Overdue => true,
        PaymentStatus::Paid => false,
        PaymentStatus::Unpaid => due_at(invoice, credit_days).is_some_and(|due| due <= now),
    }
}

/// Completed requests of a customer that are not paid yet, oldest first.
pub async fn outstanding_invoices<C>(conn: &C, com_id: i64) -> Result<Vec<filling_request::Model>>
where
    C: ConnectionTrait,
{
    FillingRequest::find()
        .filter(filling_request::Column::ComId.eq(com_id))
        .filter(filling_request::Column::Status.eq(FillingStatus::Completed))
        .filter(
            filling_request::Column::PaymentStatus
                .is_in([PaymentStatus::Unpaid, PaymentStatus::Overdue]),
        )
        .order_by_asc(filling_request::Column::CompletedAt)
        .order_by_asc(filling_request::Column::Id)
        .all(conn)
        .await
        .map_err(Into::into)
}

/// Zeroes `cst_limit` and `amtlimit` of every customer whose `limit_expiry`
/// is at or before `now`, clears the expiry and logs `expired_auto_reset`.
#[instrument(skip(db))]
pub async fn reset_expired_limits(
    db: &DatabaseConnection,
    now: NaiveDateTime,
) -> Result<LimitResetReport> {
    let txn = db.begin().await?;

    let expired = CustomerBalance::find()
        .filter(customer_balance::Column::LimitExpiry.lte(now))
        .order_by_asc(customer_balance::Column::ComId)
        .lock_exclusive()
        .all(&txn)
        .await?;

    let mut report = LimitResetReport::default();
    for customer in expired {
        let result = CustomerBalance::update_many()
            .col_expr(customer_balance::Column::CstLimit, Expr::value(0.0))
            .col_expr(customer_balance::Column::Amtlimit, Expr::value(0.0))
            .col_expr(
                customer_balance::Column::LimitExpiry,
                Expr::value(Option::<NaiveDateTime>::None),
            )
            .col_expr(customer_balance::Column::UpdatedAt, Expr::value(now))
            .filter(customer_balance::Column::Id.eq(customer.id))
            .filter(customer_balance::Column::LimitExpiry.lte(now))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            continue;
        }

        append_history(
            &txn,
            customer.com_id,
            Movement::new(
                HistoryType::ExpiredAutoReset,
                customer.amtlimit,
                customer.amtlimit,
                0.0,
            )
            .remarks(format!(
                "credit limit {:.2} expired at {}",
                customer.cst_limit,
                customer
                    .limit_expiry
                    .map_or_else(String::new, |expiry| expiry.to_string())
            )),
            now,
        )
        .await?;
        report.customers.push(customer.com_id);
    }

    txn.commit().await?;
    info!("Limit expiry run: {} customers reset", report.customers.len());
    Ok(report)
}

/// Sets `remaining_day_limit = day_limit` for active customers with a daily
/// ceiling whose credit line has not expired.
#[instrument(skip(db))]
pub async fn restore_day_limits(
    db: &DatabaseConnection,
    now: NaiveDateTime,
) -> Result<DayLimitReport> {
    let eligible = Condition::all()
        .add(customer_balance::Column::IsActive.eq(true))
        .add(customer_balance::Column::DayLimit.gt(0.0))
        .add(
            Condition::any()
                .add(customer_balance::Column::LimitExpiry.is_null())
                .add(customer_balance::Column::LimitExpiry.gt(now)),
        );

    let txn = db.begin().await?;

    let customers = CustomerBalance::find()
        .filter(eligible.clone())
        .filter(
            Expr::col(customer_balance::Column::RemainingDayLimit)
                .ne(Expr::col(customer_balance::Column::DayLimit)),
        )
        .order_by_asc(customer_balance::Column::ComId)
        .lock_exclusive()
        .all(&txn)
        .await?;

    let mut report = DayLimitReport::default();
    for customer in customers {
        let result = CustomerBalance::update_many()
            .col_expr(
                customer_balance::Column::RemainingDayLimit,
                Expr::col(customer_balance::Column::DayLimit).into(),
            )
            .col_expr(customer_balance::Column::UpdatedAt, Expr::value(now))
            .filter(customer_balance::Column::Id.eq(customer.id))
            .filter(eligible.clone())
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            continue;
        }

        append_history(
            &txn,
            customer.com_id,
            Movement::new(
                HistoryType::DayLimitReset,
                customer.day_limit - customer.remaining_day_limit,
                customer.amtlimit,
                customer.amtlimit,
            ),
            now,
        )
        .await?;
        report.customers.push(customer.com_id);
    }

    txn.commit().await?;
    info!("Day limit run: {} customers restored", report.customers.len());
    Ok(report)
}

/// For customers whose `day_limit_expiry` has passed, marks every unpaid
/// completed request whose grace period is over as `Overdue` and suspends
/// the customer when any were found.
#[instrument(skip(db))]
pub async fn enforce_credit_days(
    db: &DatabaseConnection,
    now: NaiveDateTime,
) -> Result<CreditDaysReport> {
    let txn = db.begin().await?;

    let customers = CustomerBalance::find()
        .filter(customer_balance::Column::DayLimitExpiry.lte(now))
        .order_by_asc(customer_balance::Column::ComId)
        .lock_exclusive()
        .all(&txn)
        .await?;

    let mut report = CreditDaysReport::default();
    for customer in customers {
        let invoices = outstanding_invoices(&txn, customer.com_id).await?;
        let newly_overdue: Vec<i64> = invoices
            .iter()
            .filter(|inv| inv.payment_status == PaymentStatus::Unpaid)
            .filter(|inv| is_past_due(inv, customer.credit_days, now))
            .map(|inv| inv.id)
            .collect();
        let has_overdue = invoices
            .iter()
            .any(|inv| is_past_due(inv, customer.credit_days, now));

        if !newly_overdue.is_empty() {
            FillingRequest::update_many()
                .col_expr(
                    filling_request::Column::PaymentStatus,
                    Expr::value(PaymentStatus::Overdue),
                )
                .col_expr(filling_request::Column::UpdatedAt, Expr::value(now))
                .filter(filling_request::Column::Id.is_in(newly_overdue.clone()))
                .filter(filling_request::Column::PaymentStatus.eq(PaymentStatus::Unpaid))
                .exec(&txn)
                .await?;
            report.overdue_invoices.extend(newly_overdue);
        }

        if has_overdue && customer.is_active {
            let result = CustomerBalance::update_many()
                .col_expr(customer_balance::Column::IsActive, Expr::value(false))
                .col_expr(customer_balance::Column::UpdatedAt, Expr::value(now))
                .filter(customer_balance::Column::Id.eq(customer.id))
                .filter(customer_balance::Column::IsActive.eq(true))
                .exec(&txn)
                .await?;

            if result.rows_affected == 1 {
                append_history(
                    &txn,
                    customer.com_id,
                    Movement::new(
                        HistoryType::Suspended,
                        0.0,
                        customer.amtlimit,
                        customer.amtlimit,
                    )
                    .remarks("unpaid invoices past credit days"),
                    now,
                )
                .await?;
                report.suspended.push(customer.com_id);
            }
        }
    }

    txn.commit().await?;
    info!(
        "Credit days run: {} invoices overdue, {} customers suspended",
        report.overdue_invoices.len(),
        report.suspended.len()
    );
    Ok(report)
}
