//! Expense vouchers: cash advanced to an employee and the expenses charged
//! against it.
//!
//! Totals are only ever changed with column expressions (`advance = advance +
//! ?`) guarded on the voucher still being open, and each change writes its
//! history row in the same transaction, so `remaining_amount` stays equal to
//! `advance - total_expense` under concurrent writers.

use crate::{
    core::audit::{self, AuditEntry},
    entities::{
        Voucher, VoucherAction, VoucherHistory, VoucherItem, VoucherStatus, voucher,
        voucher_history, voucher_item,
    },
    errors::{Error, Result},
};
use chrono::NaiveDateTime;
use sea_orm::{QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*, sea_query::Expr};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Input for opening a voucher.
#[derive(Debug, Clone, Deserialize)]
pub struct NewVoucher {
    /// Employee receiving the advance
    pub emp_id: i64,
    /// Vehicle the trip is for
    #[serde(default)]
    pub vehicle_no: Option<String>,
    /// Opening advance, may be zero
    pub advance: f64,
    /// Who issued the voucher
    #[serde(default)]
    pub created_by: Option<String>,
}

/// A voucher with its expense lines and movement history.
#[derive(Debug, Clone, Serialize)]
pub struct VoucherDetail {
    /// The voucher row
    #[serde(flatten)]
    pub voucher: voucher::Model,
    /// Expense lines, oldest first
    pub items: Vec<voucher_item::Model>,
    /// Movements, oldest first
    pub history: Vec<voucher_history::Model>,
}

fn validate_amount(amount: f64, allow_zero: bool) -> Result<()> {
    let too_small = if allow_zero { amount < 0.0 } else { amount <= 0.0 };
    if !amount.is_finite() || too_small {
        return Err(Error::InvalidAmount { amount });
    }
    Ok(())
}

async fn lock_open_voucher<C>(conn: &C, id: i64) -> Result<voucher::Model>
where
    C: ConnectionTrait,
{
    let current = Voucher::find_by_id(id)
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or(Error::VoucherNotFound { id })?;
    if current.status == VoucherStatus::Closed {
        return Err(Error::VoucherClosed { id });
    }
    Ok(current)
}

async fn append_history<C>(
    conn: &C,
    voucher_id: i64,
    action: VoucherAction,
    amount: f64,
    remaining_before: f64,
    remaining_after: f64,
    now: NaiveDateTime,
) -> Result<voucher_history::Model>
where
    C: ConnectionTrait,
{
    let row = voucher_history::ActiveModel {
        voucher_id: Set(voucher_id),
        action: Set(action),
        amount: Set(amount),
        remaining_before: Set(remaining_before),
        remaining_after: Set(remaining_after),
        created_at: Set(now),
        ..Default::default()
    };
    row.insert(conn).await.map_err(Into::into)
}

/// Adds `advance_delta` and `expense_delta` to an open voucher's totals and
/// recomputes `remaining_amount` from them. Returns false when the voucher was closed in the meantime.
async fn apply_totals<C>(
    conn: &C,
    id: i64,
    advance_delta: f64,
    expense_delta: f64,
    now: NaiveDateTime,
) -> Result<bool>
where
    C: ConnectionTrait,
{
    // MySQL assigns left to right, so the remaining amount goes first and
    // reads the totals as they were before this update.
    let result = Voucher::update_many()
        .col_expr(
            voucher::Column::RemainingAmount,
            Expr::col(voucher::Column::Advance)
                .add(advance_delta)
                .sub(Expr::col(voucher::Column::TotalExpense).add(expense_delta)),
        )
        .col_expr(
            voucher::Column::Advance,
            Expr::col(voucher::Column::Advance).add(advance_delta),
        )
        .col_expr(
            voucher::Column::TotalExpense,
            Expr::col(voucher::Column::TotalExpense).add(expense_delta),
        )
        .col_expr(voucher::Column::UpdatedAt, Expr::value(now))
        .filter(voucher::Column::Id.eq(id))
        .filter(voucher::Column::Status.eq(VoucherStatus::Open))
        .exec(conn)
        .await?;
    Ok(result.rows_affected == 1)
}

async fn reload<C>(conn: &C, id: i64) -> Result<voucher::Model>
where
    C: ConnectionTrait,
{
    Voucher::find_by_id(id)
        .one(conn)
        .await?
        .ok_or(Error::VoucherNotFound { id })
}

/// Opens a voucher with its first advance.
pub async fn create_voucher(
    db: &DatabaseConnection,
    new: NewVoucher,
    now: NaiveDateTime,
) -> Result<voucher::Model> {
    if new.emp_id <= 0 {
        return Err(Error::Validation {
            message: "emp_id must be a positive id".to_string(),
        });
    }
    validate_amount(new.advance, true)?;

    let txn = db.begin().await?;
    let row = voucher::ActiveModel {
        voucher_no: Set(String::new()),
        emp_id: Set(new.emp_id),
        vehicle_no: Set(new.vehicle_no),
        advance: Set(new.advance),
        total_expense: Set(0.0),
        remaining_amount: Set(new.advance),
        status: Set(VoucherStatus::Open),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let saved = row.insert(&txn).await?;

    let id = saved.id;
    let mut numbered: voucher::ActiveModel = saved.into();
    numbered.voucher_no = Set(format!("VCH-{id:06}"));
    let saved = numbered.update(&txn).await?;

    append_history(
        &txn,
        id,
        VoucherAction::Opened,
        new.advance,
        0.0,
        new.advance,
        now,
    )
    .await?;
    txn.commit().await?;

    info!(
        "Voucher {} opened for employee {} with advance {:.2}",
        saved.voucher_no, saved.emp_id, saved.advance
    );
    audit::record(
        db,
        AuditEntry::new("voucher", id, "create")
            .by(new.created_by.as_deref())
            .new_value(&saved),
    )
    .await;

    Ok(saved)
}

/// Charges an expense line to an open voucher.
pub async fn add_expense_item(
    db: &DatabaseConnection,
    voucher_id: i64,
    amount: f64,
    description: &str,
    performed_by: Option<&str>,
    now: NaiveDateTime,
) -> Result<voucher::Model> {
    validate_amount(amount, false)?;
    let description = description.trim();
    if description.is_empty() {
        return Err(Error::Validation {
            message: "expense description cannot be empty".to_string(),
        });
    }

    let txn = db.begin().await?;
    let current = lock_open_voucher(&txn, voucher_id).await?;
    if !apply_totals(&txn, voucher_id, 0.0, amount, now).await? {
        return Err(Error::VoucherClosed { id: voucher_id });
    }

    let item = voucher_item::ActiveModel {
        voucher_id: Set(voucher_id),
        description: Set(description.to_string()),
        amount: Set(amount),
        created_at: Set(now),
        ..Default::default()
    };
    item.insert(&txn).await?;

    let updated = reload(&txn, voucher_id).await?;
    append_history(
        &txn,
        voucher_id,
        VoucherAction::Expense,
        amount,
        current.remaining_amount,
        updated.remaining_amount,
        now,
    )
    .await?;
    txn.commit().await?;

    audit::record(
        db,
        AuditEntry::new("voucher", voucher_id, "expense")
            .by(performed_by)
            .remarks(format!("{description}: {amount:.2}")),
    )
    .await;

    Ok(updated)
}

/// Advances more cash on an open voucher.
pub async fn add_advance(
    db: &DatabaseConnection,
    voucher_id: i64,
    amount: f64,
    performed_by: Option<&str>,
    now: NaiveDateTime,
) -> Result<voucher::Model> {
    validate_amount(amount, false)?;

    let txn = db.begin().await?;
    let current = lock_open_voucher(&txn, voucher_id).await?;
    if !apply_totals(&txn, voucher_id, amount, 0.0, now).await? {
        return Err(Error::VoucherClosed { id: voucher_id });
    }

    let updated = reload(&txn, voucher_id).await?;
    append_history(
        &txn,
        voucher_id,
        VoucherAction::Advance,
        amount,
        current.remaining_amount,
        updated.remaining_amount,
        now,
    )
    .await?;
    txn.commit().await?;

    audit::record(
        db,
        AuditEntry::new("voucher", voucher_id, "advance")
            .by(performed_by)
            .remarks(format!("{amount:.2}")),
    )
    .await;

    Ok(updated)
}

/// Settles a voucher. Closed vouchers reject every further change.
pub async fn close_voucher(
    db: &DatabaseConnection,
    voucher_id: i64,
    performed_by: Option<&str>,
    now: NaiveDateTime,
) -> Result<voucher::Model> {
    let txn = db.begin().await?;
    let current = lock_open_voucher(&txn, voucher_id).await?;

    let result = Voucher::update_many()
        .col_expr(voucher::Column::Status, Expr::value(VoucherStatus::Closed))
        .col_expr(voucher::Column::UpdatedAt, Expr::value(now))
        .filter(voucher::Column::Id.eq(voucher_id))
        .filter(voucher::Column::Status.eq(VoucherStatus::Open))
        .exec(&txn)
        .await?;
    if result.rows_affected != 1 {
        return Err(Error::VoucherClosed { id: voucher_id });
    }

    append_history(
        &txn,
        voucher_id,
        VoucherAction::Closed,
        current.remaining_amount,
        current.remaining_amount,
        current.remaining_amount,
        now,
    )
    .await?;
    let updated = reload(&txn, voucher_id).await?;
    txn.commit().await?;

    info!(
        "Voucher {} closed with {:.2} remaining",
        updated.voucher_no, updated.remaining_amount
    );
    audit::record(
        db,
        AuditEntry::new("voucher", voucher_id, "close")
            .by(performed_by)
            .old(&current)
            .new_value(&updated),
    )
    .await;

    Ok(updated)
}

/// A voucher with its items and history.
pub async fn get_voucher(db: &DatabaseConnection, voucher_id: i64) -> Result<VoucherDetail> {
    let voucher = reload(db, voucher_id).await?;
    let items = VoucherItem::find()
        .filter(voucher_item::Column::VoucherId.eq(voucher_id))
        .order_by_asc(voucher_item::Column::Id)
        .all(db)
        .await?;
    let history = VoucherHistory::find()
        .filter(voucher_history::Column::VoucherId.eq(voucher_id))
        .order_by_asc(voucher_history::Column::Id)
        .all(db)
        .await?;

    Ok(VoucherDetail {
        voucher,
        items,
        history,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_voucher_lifecycle() -> Result<()> {
        let db = setup_test_db().await?;
        let now = at(2026, 3, 10, 9, 0, 0);

        let opened = create_test_voucher(&db, 1000.0).await?;
        assert_eq!(opened.voucher_no, format!("VCH-{:06}", opened.id));
        assert_eq!(opened.remaining_amount, 1000.0);

        add_expense_item(&db, opened.id, 250.0, "Diesel", Some("driver"), now).await?;
        add_expense_item(&db, opened.id, 120.5, "Toll", None, now).await?;
        let topped = add_advance(&db, opened.id, 300.0, None, now).await?;
        assert_eq!(topped.advance, 1300.0);
        assert_eq!(topped.total_expense, 370.5);
        assert_eq!(topped.remaining_amount, 929.5);

        let closed = close_voucher(&db, opened.id, Some("accounts"), now).await?;
        assert_eq!(closed.status, VoucherStatus::Closed);

        let detail = get_voucher(&db, opened.id).await?;
        assert_eq!(detail.items.len(), 2);
        assert_eq!(detail.items[0].description, "Diesel");
        let actions: Vec<_> = detail.history.iter().map(|h| h.action).collect();
        assert_eq!(
            actions,
            vec![
                VoucherAction::Opened,
                VoucherAction::Expense,
                VoucherAction::Expense,
                VoucherAction::Advance,
                VoucherAction::Closed,
            ]
        );
        assert_eq!(detail.history[1].remaining_before, 1000.0);
        assert_eq!(detail.history[1].remaining_after, 750.0);

        Ok(())
    }

    #[tokio::test]
    async fn test_remaining_always_matches_totals() -> Result<()> {
        let db = setup_test_db().await?;
        let now = at(2026, 3, 10, 9, 0, 0);
        let opened = create_test_voucher(&db, 100.0).await?;

        let (a, b, c) = tokio::join!(
            add_expense_item(&db, opened.id, 40.0, "Food", None, now),
            add_expense_item(&db, opened.id, 90.0, "Repair", None, now),
            add_advance(&db, opened.id, 50.0, None, now)
        );
        a?;
        b?;
        c?;

        let detail = get_voucher(&db, opened.id).await?;
        let v = detail.voucher;
        assert_eq!(v.total_expense, 130.0);
        assert_eq!(v.advance, 150.0);
        assert_eq!(v.remaining_amount, v.advance - v.total_expense);
        assert_eq!(detail.history.last().unwrap().remaining_after, 20.0);

        Ok(())
    }

    #[tokio::test]
    async fn test_remaining_is_recomputed_not_accumulated() -> Result<()> {
        let db = setup_test_db().await?;
        let now = at(2026, 3, 10, 9, 0, 0);
        let opened = create_test_voucher(&db, 1.0).await?;

        for _ in 0..10 {
            add_expense_item(&db, opened.id, 0.1, "Tea", None, now).await?;
        }
        let topped = add_advance(&db, opened.id, 0.7, None, now).await?;
        assert_eq!(topped.remaining_amount, topped.advance - topped.total_expense);

        Ok(())
    }

    #[tokio::test]
    async fn test_closed_voucher_rejects_changes() -> Result<()> {
        let db = setup_test_db().await?;
        let now = at(2026, 3, 10, 9, 0, 0);
        let opened = create_test_voucher(&db, 100.0).await?;
        close_voucher(&db, opened.id, None, now).await?;

        let expense = add_expense_item(&db, opened.id, 10.0, "Late", None, now).await;
        assert!(matches!(expense, Err(Error::VoucherClosed { .. })));
        let advance = add_advance(&db, opened.id, 10.0, None, now).await;
        assert!(matches!(advance, Err(Error::VoucherClosed { .. })));
        let again = close_voucher(&db, opened.id, None, now).await;
        assert!(matches!(again, Err(Error::VoucherClosed { .. })));

        Ok(())
    }

    #[tokio::test]
    async fn test_voucher_validation() -> Result<()> {
        let db = setup_test_db().await?;
        let now = at(2026, 3, 10, 9, 0, 0);
        let opened = create_test_voucher(&db, 100.0).await?;

        let negative = add_expense_item(&db, opened.id, -5.0, "Fuel", None, now).await;
        assert!(matches!(negative, Err(Error::InvalidAmount { .. })));
        let blank = add_expense_item(&db, opened.id, 5.0, "   ", None, now).await;
        assert!(matches!(blank, Err(Error::Validation { .. })));
        let missing = add_advance(&db, 999, 5.0, None, now).await;
        assert!(matches!(missing, Err(Error::VoucherNotFound { id: 999 })));

        let bad_emp = create_voucher(
            &db,
            NewVoucher {
                emp_id: 0,
                vehicle_no: None,
                advance: 10.0,
                created_by: None,
            },
            now,
        )
        .await;
        assert!(matches!(bad_emp, Err(Error::Validation { .. })));

        Ok(())
    }
}
