//! Core business logic - framework-agnostic pricing, credit and voucher operations
//!
//! Every function here takes a SeaORM connection and an explicit `now`, so the
//! HTTP layer, the cron scheduler and the tests all drive the same code with
//! their own clock.

/// Audit log writer
pub mod audit;
/// Customer balance accounts and the balance history ledger
pub mod balance;
/// Limit expiry, day limit and credit days cron jobs
pub mod credit_limit;
/// Deal price scheduling and the deal price cron job
pub mod deal_price;
/// Whether a customer may draw credit
pub mod eligibility;
/// Filling requests and their status machine
pub mod filling_request;
/// Hold balance reserve, release and settlement
pub mod hold;
/// Customer payments
pub mod payment;
/// Expense vouchers
pub mod voucher;

use chrono::NaiveDateTime;

/// Current wall-clock time in the server's local timezone, the clock every
/// schedule date and expiry is compared against.
#[must_use]
pub fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}
