//! HTTP API - axum routes over the core operations
//!
//! Handlers are thin: they pull ids and bodies out of the request, call into
//! [`crate::core`] with the local wall clock, and wrap the result in the
//! `{"success": true, "data": ...}` envelope. Errors render through
//! [`crate::errors::Error`]'s `IntoResponse`.

/// Cron trigger endpoints
pub mod cron;
/// Customer balance, hold, payment and eligibility endpoints
pub mod customers;
/// Deal price endpoints
pub mod deal_prices;
/// Filling request endpoints
pub mod filling_requests;
/// Voucher endpoints
pub mod vouchers;

use crate::{config::AppConfig, core::audit, errors::Result};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, patch, post, put},
};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Header naming the back-office user behind a mutating call.
pub const PERFORMED_BY_HEADER: &str = "x-performed-by";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Connection pool
    pub db: DatabaseConnection,
    /// Loaded configuration
    pub config: Arc<AppConfig>,
}

/// Success envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// Always true; failures render through `Error`
    pub success: bool,
    /// Payload
    pub data: T,
}

/// Wraps `data` in the success envelope.
pub const fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
    })
}

/// Reads the acting user from [`PERFORMED_BY_HEADER`].
#[must_use]
pub fn performed_by(headers: &HeaderMap) -> Option<String> {
    headers
        .get(PERFORMED_BY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<ApiResponse<Health>> {
    ok(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn audit_trail(
    State(state): State<AppState>,
    Path((record_type, record_id)): Path<(String, i64)>,
) -> Result<Json<ApiResponse<Vec<crate::entities::AuditLogModel>>>> {
    Ok(ok(audit::for_record(&state.db, &record_type, record_id).await?))
}

/// Builds the full router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/cron/:job", get(cron::run))
        .route("/api/deal-prices", post(deal_prices::schedule))
        .route("/api/deal-prices/active", get(deal_prices::active))
        .route("/api/deal-prices/duplicates", get(deal_prices::duplicates))
        .route("/api/customers", post(customers::open))
        .route("/api/customers/:com_id/balance", get(customers::balance))
        .route("/api/customers/:com_id/credit-terms", put(customers::credit_terms))
        .route("/api/customers/:com_id/history", get(customers::history))
        .route("/api/customers/:com_id/eligibility", get(customers::eligibility))
        .route("/api/customers/:com_id/hold", post(customers::reserve))
        .route("/api/customers/:com_id/hold/release", post(customers::release))
        .route("/api/customers/:com_id/payments", post(customers::payment))
        .route("/api/customers/:com_id/deal-prices", get(deal_prices::for_customer))
        .route(
            "/api/customers/:com_id/filling-requests",
            get(filling_requests::for_customer),
        )
        .route("/api/filling-requests", post(filling_requests::create))
        .route("/api/filling-requests/:id", get(filling_requests::get_one))
        .route("/api/filling-requests/:id/status", patch(filling_requests::status))
        .route("/api/filling-requests/:id/check", post(filling_requests::check))
        .route("/api/filling-requests/:id/invoice", post(filling_requests::invoice))
        .route("/api/vouchers", post(vouchers::create))
        .route("/api/vouchers/:id", get(vouchers::get_one))
        .route("/api/vouchers/:id/items", post(vouchers::add_item))
        .route("/api/vouchers/:id/advance", post(vouchers::advance))
        .route("/api/vouchers/:id/close", post(vouchers::close))
        .route("/api/audit/:record_type/:record_id", get(audit_trail))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
