//! Customer payments against their credit account.

use crate::{
    core::{
        audit::{self, AuditEntry},
        balance::{Movement, append_history, lock_customer},
        credit_limit::{due_at, is_past_due, outstanding_invoices},
    },
    entities::{
        CustomerBalance, FillingRequest, HistoryType, PaymentStatus, customer_balance,
        filling_request,
    },
    errors::{Error, Result},
};
use chrono::NaiveDateTime;
use sea_orm::{TransactionTrait, prelude::*, sea_query::Expr};
use serde::Serialize;
use tracing::info;

/// Tolerance when comparing money amounts.
const CENT: f64 = 0.005;

/// What a payment did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentReceipt {
    /// Paying customer
    pub com_id: i64,
    /// Amount received
    pub amount: f64,
    /// Wallet balance after the payment
    pub balance: f64,
    /// Available credit after the payment
    pub amtlimit: f64,
    /// Invoices marked paid, oldest first
    pub invoices_paid: Vec<i64>,
    /// True when the payment lifted a suspension
    pub reactivated: bool,
}

/// Available credit after paying `amount`: restored up to the sanctioned
/// limit, less whatever is still on hold, and never reduced by a payment.
#[must_use]
pub fn restored_amtlimit(customer: &customer_balance::Model, amount: f64) -> f64 {
    let ceiling = (customer.cst_limit - customer.hold_balance).max(0.0);
    customer.amtlimit.max((customer.amtlimit + amount).min(ceiling))
}

/// Records a payment: credits the wallet, restores available credit, settles
/// outstanding invoices oldest first while the payment covers them, and lifts
/// a credit-days suspension once nothing is overdue.
pub async fn record_payment(
    db: &DatabaseConnection,
    com_id: i64,
    amount: f64,
    performed_by: Option<&str>,
    now: NaiveDateTime,
) -> Result<PaymentReceipt> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(Error::InvalidAmount { amount });
    }

    let txn = db.begin().await?;
    let current = lock_customer(&txn, com_id).await?;
    let amtlimit = restored_amtlimit(&current, amount);

    // Pay off invoices oldest first
    let mut pool = amount;
    let mut invoices_paid = Vec::new();
    let mut still_open = Vec::new();
    for invoice in outstanding_invoices(&txn, com_id).await? {
        if still_open.is_empty() && invoice.amount <= pool + CENT {
            pool -= invoice.amount;
            invoices_paid.push(invoice.id);
        } else {
            still_open.push(invoice);
        }
    }

    if !invoices_paid.is_empty() {
        FillingRequest::update_many()
            .col_expr(
                filling_request::Column::PaymentStatus,
                Expr::value(PaymentStatus::Paid),
            )
            .col_expr(filling_request::Column::UpdatedAt, Expr::value(now))
            .filter(filling_request::Column::Id.is_in(invoices_paid.clone()))
            .exec(&txn)
            .await?;
    }

    let day_limit_expiry = if current.credit_days > 0 {
        still_open
            .first()
            .and_then(|oldest| due_at(oldest, current.credit_days))
    } else {
        None
    };
    let still_overdue = still_open
        .iter()
        .any(|invoice| is_past_due(invoice, current.credit_days, now));
    let reactivated = !current.is_active && !still_overdue;

    CustomerBalance::update_many()
        .col_expr(
            customer_balance::Column::Balance,
            Expr::col(customer_balance::Column::Balance).add(amount),
        )
        .col_expr(customer_balance::Column::Amtlimit, Expr::value(amtlimit))
        .col_expr(
            customer_balance::Column::DayLimitExpiry,
            Expr::value(day_limit_expiry),
        )
        .col_expr(
            customer_balance::Column::IsActive,
            Expr::value(current.is_active || reactivated),
        )
        .col_expr(customer_balance::Column::UpdatedAt, Expr::value(now))
        .filter(customer_balance::Column::Id.eq(current.id))
        .exec(&txn)
        .await?;

    append_history(
        &txn,
        com_id,
        Movement::new(HistoryType::Payment, amount, current.amtlimit, amtlimit).remarks(
            format!("{} invoice(s) settled", invoices_paid.len()),
        ),
        now,
    )
    .await?;

    let updated = lock_customer(&txn, com_id).await?;
    txn.commit().await?;

    info!(
        "Payment {:.2} from customer {}: {} invoices paid{}",
        amount,
        com_id,
        invoices_paid.len(),
        if reactivated { ", reactivated" } else { "" }
    );

    let receipt = PaymentReceipt {
        com_id,
        amount,
        balance: updated.balance,
        amtlimit: updated.amtlimit,
        invoices_paid,
        reactivated,
    };

    audit::record(
        db,
        AuditEntry::new("customer_balance", com_id, "payment")
            .by(performed_by)
            .old(&current)
            .new_value(&receipt),
    )
    .await;

    Ok(receipt)
}
