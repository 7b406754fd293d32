//! Customer balance accounts and the balance history ledger.
//!
//! Every other credit operation (holds, payments, the limit crons) reads the
//! customer row through [`lock_customer`] inside its own transaction and records
//! what it did with [`append_history`].

use crate::{
    core::audit::{self, AuditEntry},
    entities::{CustomerBalance, FillingHistory, HistoryType, customer_balance, filling_history},
    errors::{Error, Result},
};
use chrono::NaiveDateTime;
use sea_orm::{QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*};
use serde::Deserialize;

/// Credit terms granted to a customer.
#[derive(Debug, Clone, Deserialize)]
pub struct CreditTerms {
    /// Sanctioned credit limit
    pub cst_limit: f64,
    /// Daily ceiling, 0 for none
    #[serde(default)]
    pub day_limit: f64,
    /// Grace period for invoices, 0 for none
    #[serde(default)]
    pub credit_days: i32,
    /// When the credit line lapses, `None` for open-ended
    #[serde(default)]
    pub limit_expiry: Option<NaiveDateTime>,
}

impl CreditTerms {
    fn validate(&self) -> Result<()> {
        for amount in [self.cst_limit, self.day_limit] {
            if !amount.is_finite() || amount < 0.0 {
                return Err(Error::InvalidAmount { amount });
            }
        }
        if self.credit_days < 0 {
            return Err(Error::Validation {
                message: "credit_days cannot be negative".to_string(),
            });
        }
        Ok(())
    }
}

/// One movement to write to `filling_history`.
#[derive(Debug, Clone)]
pub struct Movement {
    /// Movement kind
    pub kind: HistoryType,
    /// Amount moved
    pub amount: f64,
    /// `amtlimit` before
    pub limit_before: f64,
    /// `amtlimit` after
    pub limit_after: f64,
    /// Related filling request
    pub filling_request_id: Option<i64>,
    /// Free-text remarks
    pub remarks: Option<String>,
}

impl Movement {
    /// Movement with no request reference or remarks.
    #[must_use]
    pub const fn new(kind: HistoryType, amount: f64, limit_before: f64, limit_after: f64) -> Self {
        Self {
            kind,
            amount,
            limit_before,
            limit_after,
            filling_request_id: None,
            remarks: None,
        }
    }

    /// Links the movement to a filling request.
    #[must_use]
    pub const fn for_request(mut self, filling_request_id: Option<i64>) -> Self {
        self.filling_request_id = filling_request_id;
        self
    }

    /// Attaches remarks.
    #[must_use]
    pub fn remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }
}

/// Appends a row to the balance history ledger.
pub async fn append_history<C>(
    conn: &C,
    com_id: i64,
    movement: Movement,
    now: NaiveDateTime,
) -> Result<filling_history::Model>
where
    C: ConnectionTrait,
{
    let row = filling_history::ActiveModel {
        com_id: Set(com_id),
        filling_request_id: Set(movement.filling_request_id),
        trans_type: Set(movement.kind),
        amount: Set(movement.amount),
        limit_before: Set(movement.limit_before),
        limit_after: Set(movement.limit_after),
        remarks: Set(movement.remarks),
        created_at: Set(now),
        ..Default::default()
    };
    row.insert(conn).await.map_err(Into::into)
}

/// Reads a customer's balance row, locking it (`SELECT ... FOR UPDATE`) on
/// backends that support row locks. Call it inside a transaction.
pub async fn lock_customer<C>(conn: &C, com_id: i64) -> Result<customer_balance::Model>
where
    C: ConnectionTrait,
{
    CustomerBalance::find()
        .filter(customer_balance::Column::ComId.eq(com_id))
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or(Error::CustomerNotFound { com_id })
}

/// Reads a customer's balance row without locking.
pub async fn get_customer_balance<C>(
    conn: &C,
    com_id: i64,
) -> Result<Option<customer_balance::Model>>
where
    C: ConnectionTrait,
{
    CustomerBalance::find()
        .filter(customer_balance::Column::ComId.eq(com_id))
        .one(conn)
        .await
        .map_err(Into::into)
}

/// Opens a credit account for a customer with the full limit available.
pub async fn open_account(
    db: &DatabaseConnection,
    com_id: i64,
    terms: CreditTerms,
    now: NaiveDateTime,
) -> Result<customer_balance::Model> {
    if com_id <= 0 {
        return Err(Error::Validation {
            message: "com_id must be a positive id".to_string(),
        });
    }
    terms.validate()?;

    if get_customer_balance(db, com_id).await?.is_some() {
        return Err(Error::Validation {
            message: format!("customer {com_id} already has a balance account"),
        });
    }

    let row = customer_balance::ActiveModel {
        com_id: Set(com_id),
        balance: Set(0.0),
        cst_limit: Set(terms.cst_limit),
        amtlimit: Set(terms.cst_limit),
        hold_balance: Set(0.0),
        day_limit: Set(terms.day_limit),
        remaining_day_limit: Set(terms.day_limit),
        limit_expiry: Set(terms.limit_expiry),
        day_limit_expiry: Set(None),
        credit_days: Set(terms.credit_days),
        is_active: Set(true),
        updated_at: Set(now),
        ..Default::default()
    };
    let saved = row.insert(db).await?;

    audit::record(
        db,
        AuditEntry::new("customer_balance", com_id, "open").new_value(&saved),
    )
    .await;

    Ok(saved)
}

/// Changes a customer's credit terms. The available amount moves by the same
/// delta as the sanctioned limit (never below zero); today's remaining ceiling
/// is capped at the new day limit.
pub async fn set_credit_terms(
    db: &DatabaseConnection,
    com_id: i64,
    terms: CreditTerms,
    performed_by: Option<&str>,
    now: NaiveDateTime,
) -> Result<customer_balance::Model> {
    terms.validate()?;

    let txn = db.begin().await?;
    let current = lock_customer(&txn, com_id).await?;

    let amtlimit = (current.amtlimit + terms.cst_limit - current.cst_limit).max(0.0);
    let remaining_day_limit = (current.remaining_day_limit + terms.day_limit - current.day_limit)
        .clamp(0.0, terms.day_limit);

    let mut active: customer_balance::ActiveModel = current.clone().into();
    active.cst_limit = Set(terms.cst_limit);
    active.amtlimit = Set(amtlimit);
    active.day_limit = Set(terms.day_limit);
    active.remaining_day_limit = Set(remaining_day_limit);
    active.credit_days = Set(terms.credit_days);
    active.limit_expiry = Set(terms.limit_expiry);
    active.updated_at = Set(now);
    let updated = active.update(&txn).await?;

    txn.commit().await?;

    audit::record(
        db,
        AuditEntry::new("customer_balance", com_id, "credit_terms")
            .by(performed_by)
            .old(&current)
            .new_value(&updated),
    )
    .await;

    Ok(updated)
}

/// Balance history of a customer, newest first.
pub async fn list_history(
    db: &DatabaseConnection,
    com_id: i64,
) -> Result<Vec<filling_history::Model>> {
    FillingHistory::find()
        .filter(filling_history::Column::ComId.eq(com_id))
        .order_by_desc(filling_history::Column::CreatedAt)
        .order_by_desc(filling_history::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}
