//! Deal price endpoints.

use super::{ApiResponse, AppState, ok};
use crate::{
    core::{
        deal_price::{self, DealPriceKey, NewDealPrice},
        local_now,
    },
    entities::DealPriceModel,
    errors::Result,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::HeaderMap,
};
use serde::Serialize;

/// A key holding more than one active row.
#[derive(Debug, Serialize)]
pub struct Duplicate {
    /// The key
    #[serde(flatten)]
    pub key: DealPriceKey,
    /// How many rows are active
    pub active_rows: usize,
}

/// `POST /api/deal-prices`
pub async fn schedule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut body): Json<NewDealPrice>,
) -> Result<Json<ApiResponse<DealPriceModel>>> {
    if body.created_by.is_none() {
        body.created_by = super::performed_by(&headers);
    }
    Ok(ok(deal_price::schedule_deal_price(&state.db, body, local_now()).await?))
}

/// `GET /api/deal-prices/active?com_id=&station_id=&product_id=&sub_product_id=`
pub async fn active(
    State(state): State<AppState>,
    Query(key): Query<DealPriceKey>,
) -> Result<Json<ApiResponse<Option<DealPriceModel>>>> {
    Ok(ok(deal_price::get_active_deal_price(&state.db, key).await?))
}

/// `GET /api/customers/:com_id/deal-prices`
pub async fn for_customer(
    State(state): State<AppState>,
    Path(com_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<DealPriceModel>>>> {
    Ok(ok(deal_price::list_deal_prices(&state.db, com_id).await?))
}

/// `GET /api/deal-prices/duplicates`
pub async fn duplicates(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Duplicate>>>> {
    let rows = deal_price::active_duplicates(&state.db)
        .await?
        .into_iter()
        .map(|(key, active_rows)| Duplicate { key, active_rows })
        .collect();
    Ok(ok(rows))
}
