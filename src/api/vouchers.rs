//! Voucher endpoints.

use super::{ApiResponse, AppState, ok, performed_by};
use crate::{
    core::{
        local_now,
        voucher::{self, NewVoucher, VoucherDetail},
    },
    entities::VoucherModel,
    errors::Result,
};
use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use serde::Deserialize;

type Reply<T> = Result<Json<ApiResponse<T>>>;

/// Body of the expense item endpoint.
#[derive(Debug, Deserialize)]
pub struct ExpenseItem {
    /// Expense amount
    pub amount: f64,
    /// What it was for
    pub description: String,
}

/// Body of the advance endpoint.
#[derive(Debug, Deserialize)]
pub struct Advance {
    /// Additional cash
    pub amount: f64,
}

/// `POST /api/vouchers`
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut body): Json<NewVoucher>,
) -> Reply<VoucherModel> {
    if body.created_by.is_none() {
        body.created_by = performed_by(&headers);
    }
    Ok(ok(voucher::create_voucher(&state.db, body, local_now()).await?))
}

/// `GET /api/vouchers/:id`
pub async fn get_one(State(state): State<AppState>, Path(id): Path<i64>) -> Reply<VoucherDetail> {
    Ok(ok(voucher::get_voucher(&state.db, id).await?))
}

/// `POST /api/vouchers/:id/items`
pub async fn add_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<ExpenseItem>,
) -> Reply<VoucherModel> {
    let actor = performed_by(&headers);
    Ok(ok(voucher::add_expense_item(
        &state.db,
        id,
        body.amount,
        &body.description,
        actor.as_deref(),
        local_now(),
    )
    .await?))
}

/// `POST /api/vouchers/:id/advance`
pub async fn advance(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<Advance>,
) -> Reply<VoucherModel> {
    let actor = performed_by(&headers);
    let updated =
        voucher::add_advance(&state.db, id, body.amount, actor.as_deref(), local_now()).await?;
    Ok(ok(updated))
}

/// `POST /api/vouchers/:id/close`
pub async fn close(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Reply<VoucherModel> {
    let actor = performed_by(&headers);
    Ok(ok(voucher::close_voucher(&state.db, id, actor.as_deref(), local_now()).await?))
}
