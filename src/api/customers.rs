//! Customer credit account endpoints.

use super::{ApiResponse, AppState, ok, performed_by};
use crate::{
    core::{
        balance::{self, CreditTerms},
        eligibility::{self, Eligibility},
        hold, local_now,
        payment::{self, PaymentReceipt},
    },
    entities::{CustomerBalanceModel, FillingHistoryModel},
    errors::{Error, Result},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};

type Reply<T> = Result<Json<ApiResponse<T>>>;

/// Body of `POST /api/customers`.
#[derive(Debug, Deserialize)]
pub struct OpenAccount {
    /// Customer (company) id
    pub com_id: i64,
    /// Credit terms
    #[serde(flatten)]
    pub terms: CreditTerms,
}

/// Body carrying an amount.
#[derive(Debug, Deserialize)]
pub struct AmountBody {
    /// Amount
    pub amount: f64,
}

/// Query of the eligibility endpoint.
#[derive(Debug, Deserialize)]
pub struct AmountQuery {
    /// Amount the customer wants to draw, 0 to only check standing
    #[serde(default)]
    pub amount: f64,
}

/// Result of releasing a hold.
#[derive(Debug, Serialize)]
pub struct Released {
    /// Amount moved back into `amtlimit`
    pub released: f64,
}

/// `POST /api/customers`
pub async fn open(
    State(state): State<AppState>,
    Json(body): Json<OpenAccount>,
) -> Reply<CustomerBalanceModel> {
    Ok(ok(balance::open_account(&state.db, body.com_id, body.terms, local_now()).await?))
}

/// `GET /api/customers/:com_id/balance`
pub async fn balance(
    State(state): State<AppState>,
    Path(com_id): Path<i64>,
) -> Reply<CustomerBalanceModel> {
    let row = balance::get_customer_balance(&state.db, com_id)
        .await?
        .ok_or(Error::CustomerNotFound { com_id })?;
    Ok(ok(row))
}

/// `PUT /api/customers/:com_id/credit-terms`
pub async fn credit_terms(
    State(state): State<AppState>,
    Path(com_id): Path<i64>,
    headers: HeaderMap,
    Json(terms): Json<CreditTerms>,
) -> Reply<CustomerBalanceModel> {
    let actor = performed_by(&headers);
    Ok(ok(balance::set_credit_terms(
        &state.db,
        com_id,
        terms,
        actor.as_deref(),
        local_now(),
    )
    .await?))
}

/// `GET /api/customers/:com_id/history`
pub async fn history(
    State(state): State<AppState>,
    Path(com_id): Path<i64>,
) -> Reply<Vec<FillingHistoryModel>> {
    Ok(ok(balance::list_history(&state.db, com_id).await?))
}

/// `GET /api/customers/:com_id/eligibility?amount=`
pub async fn eligibility(
    State(state): State<AppState>,
    Path(com_id): Path<i64>,
    Query(query): Query<AmountQuery>,
) -> Reply<Eligibility> {
    let result =
        eligibility::check_eligibility(&state.db, com_id, query.amount, local_now()).await?;
    Ok(ok(result))
}

/// `POST /api/customers/:com_id/hold`
pub async fn reserve(
    State(state): State<AppState>,
    Path(com_id): Path<i64>,
    Json(body): Json<AmountBody>,
) -> Reply<CustomerBalanceModel> {
    Ok(ok(hold::reserve(&state.db, com_id, body.amount, local_now()).await?))
}

/// `POST /api/customers/:com_id/hold/release`
pub async fn release(State(state): State<AppState>, Path(com_id): Path<i64>) -> Reply<Released> {
    let released = hold::release_all(&state.db, com_id, local_now()).await?;
    Ok(ok(Released { released }))
}

/// `POST /api/customers/:com_id/payments`
pub async fn payment(
    State(state): State<AppState>,
    Path(com_id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<AmountBody>,
) -> Reply<PaymentReceipt> {
    let actor = performed_by(&headers);
    Ok(ok(payment::record_payment(
        &state.db,
        com_id,
        body.amount,
        actor.as_deref(),
        local_now(),
    )
    .await?))
}
