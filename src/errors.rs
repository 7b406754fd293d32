//! Unified error type for `petro-ledger`.
//!
//! Every fallible operation returns [`Result`]. Variants are grouped by how the
//! HTTP layer reports them: validation (400), authorization (401), missing
//! records (404), business-rule conflicts (409) and infrastructure (500).

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// All errors produced by the crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be read or parsed
    #[error("Configuration error: {message}")]
    Config {
        /// Human-readable description
        message: String,
    },

    /// Any error bubbled up from the database driver
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// I/O failure (binding sockets, reading files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A request field failed validation
    #[error("Validation error: {message}")]
    Validation {
        /// What was wrong with the input
        message: String,
    },

    /// Amount was zero, negative, NaN or infinite where a positive amount is required
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected amount
        amount: f64,
    },

    /// Cron endpoint called without the configured bearer secret
    #[error("Unauthorized")]
    Unauthorized,

    /// `/api/cron/:job` named a job that does not exist
    #[error("Unknown cron job: {name}")]
    UnknownCronJob {
        /// Name from the URL
        name: String,
    },

    /// No `customer_balances` row for the customer
    #[error("Customer not found: {com_id}")]
    CustomerNotFound {
        /// Customer id
        com_id: i64,
    },

    /// No active deal price to bill a request at
    #[error("No active deal price for customer {com_id} at station {station_id}")]
    DealPriceNotFound {
        /// Customer
        com_id: i64,
        /// Station
        station_id: i64,
    },

    /// Filling request missing
    #[error("Filling request not found: {id}")]
    FillingRequestNotFound {
        /// Filling request id
        id: i64,
    },

    /// Voucher missing
    #[error("Voucher not found: {id}")]
    VoucherNotFound {
        /// Voucher id
        id: i64,
    },

    /// Reserve asked for more than the available `amtlimit`
    #[error("Insufficient amtlimit: available {available:.2}, required {required:.2}")]
    InsufficientLimit {
        /// `amtlimit` at the time of the check
        available: f64,
        /// Amount requested
        required: f64,
    },

    /// Reserve asked for more than is left of today's ceiling
    #[error("Day limit exceeded: remaining {remaining:.2}, required {required:.2}")]
    DayLimitExceeded {
        /// `remaining_day_limit` at the time of the check
        remaining: f64,
        /// Amount requested
        required: f64,
    },

    /// Settlement asked for more than is on hold
    #[error("Insufficient hold balance: held {held:.2}, required {required:.2}")]
    InsufficientHold {
        /// `hold_balance` at the time of the check
        held: f64,
        /// Amount requested
        required: f64,
    },

    /// Customer account is suspended
    #[error("Customer {com_id} is inactive")]
    CustomerInactive {
        /// Customer id
        com_id: i64,
    },

    /// Filling request status change not allowed by the state machine
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },

    /// Voucher is closed and can no longer be changed
    #[error("Voucher {id} is closed")]
    VoucherClosed {
        /// Voucher id
        id: i64,
    },
}

impl Error {
    /// HTTP status the API reports for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } | Self::InvalidAmount { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::UnknownCronJob { .. }
            | Self::CustomerNotFound { .. }
            | Self::DealPriceNotFound { .. }
            | Self::FillingRequestNotFound { .. }
            | Self::VoucherNotFound { .. } => StatusCode::NOT_FOUND,
            Self::InsufficientLimit { .. }
            | Self::DayLimitExceeded { .. }
            | Self::InsufficientHold { .. }
            | Self::CustomerInactive { .. }
            | Self::InvalidTransition { .. }
            | Self::VoucherClosed { .. } => StatusCode::CONFLICT,
            Self::Config { .. } | Self::Database(_) | Self::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self);
        }
        let body = Json(serde_json::json!({
            "success": false,
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_error_kind() {
        assert_eq!(
            Error::InvalidAmount { amount: -1.0 }.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(Error::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            Error::CustomerNotFound { com_id: 7 }.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::InsufficientLimit {
                available: 10.0,
                required: 20.0
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::Database(sea_orm::DbErr::Custom("boom".to_string())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_insufficient_limit_message() {
        let err = Error::InsufficientLimit {
            available: 500.0,
            required: 1000.0,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient amtlimit: available 500.00, required 1000.00"
        );
    }
}
