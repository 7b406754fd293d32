//! Whether a customer may take `amount` of fuel on credit right now.
//!
//! Filling request creation, the HTTP eligibility endpoint and the cron jobs all
//! go through [`evaluate`], so every caller agrees on who is allowed to draw.

use crate::{
    core::{
        balance::{get_customer_balance, lock_customer},
        credit_limit::{is_past_due, outstanding_invoices},
    },
    entities::customer_balance,
    errors::{Error, Result},
};
use chrono::NaiveDateTime;
use sea_orm::prelude::*;
use serde::Serialize;
use std::fmt;

/// Why a customer cannot draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IneligibleReason {
    /// Customer is suspended
    Inactive,
    /// Credit line lapsed
    LimitExpired,
    /// `amtlimit` below the requested amount
    InsufficientAmtLimit,
    /// Today's remaining ceiling below the requested amount
    DayLimitExceeded,
    /// Unpaid invoices past credit days
    OverdueInvoices,
}

impl fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Inactive => "customer is inactive",
            Self::LimitExpired => "credit limit has expired",
            Self::InsufficientAmtLimit => "insufficient amtlimit",
            Self::DayLimitExceeded => "day limit exceeded",
            Self::OverdueInvoices => "overdue invoices outstanding",
        };
        f.write_str(s)
    }
}

/// Outcome of an eligibility check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Eligibility {
    /// Customer checked
    pub com_id: i64,
    /// True when `reasons` is empty
    pub eligible: bool,
    /// Every rule the customer fails
    pub reasons: Vec<IneligibleReason>,
    /// `amtlimit` at check time
    pub available: f64,
    /// Remaining daily ceiling, `None` when the customer has no day limit
    pub remaining_day_limit: Option<f64>,
}

impl Eligibility {
    /// Turns a failed check into the error the caller should surface.
    pub fn into_result(self, amount: f64) -> Result<Self> {
        let Some(first) = self.reasons.first() else {
            return Ok(self);
        };
        Err(match first {
            IneligibleReason::Inactive => Error::CustomerInactive {
                com_id: self.com_id,
            },
            IneligibleReason::InsufficientAmtLimit => Error::InsufficientLimit {
                available: self.available,
                required: amount,
            },
            IneligibleReason::DayLimitExceeded => Error::DayLimitExceeded {
                remaining: self.remaining_day_limit.unwrap_or_default(),
                required: amount,
            },
            other => Error::Validation {
                message: format!("customer {} is not eligible: {other}", self.com_id),
            },
        })
    }
}

/// Applies the rules to an already-loaded customer row.
#[must_use]
pub fn rules(
    customer: &customer_balance::Model,
    amount: f64,
    has_overdue: bool,
    now: NaiveDateTime,
) -> Vec<IneligibleReason> {
    let mut reasons = Vec::new();
    if !customer.is_active {
        reasons.push(IneligibleReason::Inactive);
    }
    if customer.limit_expiry.is_some_and(|expiry| expiry <= now) {
        reasons.push(IneligibleReason::LimitExpired);
    }
    if customer.amtlimit < amount {
        reasons.push(IneligibleReason::InsufficientAmtLimit);
    }
    if customer.day_limit > 0.0 && customer.remaining_day_limit < amount {
        reasons.push(IneligibleReason::DayLimitExceeded);
    }
    if has_overdue {
        reasons.push(IneligibleReason::OverdueInvoices);
    }
    reasons
}

async fn assess<C>(
    conn: &C,
    customer: &customer_balance::Model,
    amount: f64,
    now: NaiveDateTime,
) -> Result<Eligibility>
where
    C: ConnectionTrait,
{
    let has_overdue = outstanding_invoices(conn, customer.com_id)
        .await?
        .iter()
        .any(|invoice| is_past_due(invoice, customer.credit_days, now));

    let reasons = rules(customer, amount, has_overdue, now);
    Ok(Eligibility {
        com_id: customer.com_id,
        eligible: reasons.is_empty(),
        reasons,
        available: customer.amtlimit,
        remaining_day_limit: (customer.day_limit > 0.0).then_some(customer.remaining_day_limit),
    })
}

fn validate_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(Error::InvalidAmount { amount });
    }
    Ok(())
}

/// Evaluates eligibility inside an open transaction, locking the customer row
/// so the answer holds until the caller commits.
pub async fn evaluate<C>(
    conn: &C,
    com_id: i64,
    amount: f64,
    now: NaiveDateTime,
) -> Result<Eligibility>
where
    C: ConnectionTrait,
{
    validate_amount(amount)?;
    let customer = lock_customer(conn, com_id).await?;
    assess(conn, &customer, amount, now).await
}

/// Checks whether `com_id` may draw `amount` at `now`. Read only; nothing is
/// locked.
pub async fn check_eligibility(
    db: &DatabaseConnection,
    com_id: i64,
    amount: f64,
    now: NaiveDateTime,
) -> Result<Eligibility> {
    validate_amount(amount)?;
    let customer = get_customer_balance(db, com_id)
        .await?
        .ok_or(Error::CustomerNotFound { com_id })?;
    assess(db, &customer, amount, now).await
}
