//! Filling request endpoints.

use super::{ApiResponse, AppState, ok, performed_by};
use crate::{
    core::{
        filling_request::{self, NewFillingRequest},
        local_now,
    },
    entities::{FillingRequestModel, FillingStatus},
    errors::Result,
};
use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use serde::Deserialize;

type Reply<T> = Result<Json<ApiResponse<T>>>;

/// Body of the status endpoint.
#[derive(Debug, Deserialize)]
pub struct StatusChange {
    /// Target status
    pub status: FillingStatus,
}

/// `POST /api/filling-requests`
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut body): Json<NewFillingRequest>,
) -> Reply<FillingRequestModel> {
    if body.created_by.is_none() {
        body.created_by = performed_by(&headers);
    }
    let created = filling_request::create_filling_request(&state.db, body, local_now()).await?;
    Ok(ok(created))
}

/// `GET /api/filling-requests/:id`
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Reply<FillingRequestModel> {
    Ok(ok(filling_request::get_filling_request(&state.db, id).await?))
}

/// `GET /api/customers/:com_id/filling-requests`
pub async fn for_customer(
    State(state): State<AppState>,
    Path(com_id): Path<i64>,
) -> Reply<Vec<FillingRequestModel>> {
    Ok(ok(filling_request::list_filling_requests(&state.db, com_id).await?))
}

/// `PATCH /api/filling-requests/:id/status`
pub async fn status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<StatusChange>,
) -> Reply<FillingRequestModel> {
    let actor = performed_by(&headers);
    Ok(ok(filling_request::transition(
        &state.db,
        id,
        body.status,
        actor.as_deref(),
        local_now(),
    )
    .await?))
}

/// `POST /api/filling-requests/:id/check`
pub async fn check(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Reply<FillingRequestModel> {
    let actor = performed_by(&headers);
    let updated =
        filling_request::mark_checked(&state.db, id, actor.as_deref(), local_now()).await?;
    Ok(ok(updated))
}

/// `POST /api/filling-requests/:id/invoice`
pub async fn invoice(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Reply<FillingRequestModel> {
    let actor = performed_by(&headers);
    let updated =
        filling_request::mark_invoiced(&state.db, id, actor.as_deref(), local_now()).await?;
    Ok(ok(updated))
}
