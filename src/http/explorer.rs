use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::explorer::normalize::{BlockSummary, TransactionSummary};
use crate::explorer::query::canonical_address;
use crate::explorer::{Explorer, SearchResult};
use crate::state::AppState;

use super::HttpError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/search", post(search))
        .route("/recent", get(recent))
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    success: bool,
    #[serde(rename = "type")]
    kind: &'static str,
    result: SearchResult,
    query: String,
}

#[derive(Debug, Deserialize, Default)]
struct RecentQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
    limit: Option<usize>,
    address: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RecentData {
    Blocks(Vec<BlockSummary>),
    Transactions(Vec<TransactionSummary>),
}

#[derive(Debug, Serialize)]
struct RecentResponse {
    success: bool,
    #[serde(rename = "type")]
    kind: String,
    data: RecentData,
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<String>,
}

async fn search(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, HttpError> {
    let Json(request) = payload?;
    let query = request.query.trim().to_string();
    if query.is_empty() {
        return Err(HttpError::bad_request("Search query is required"));
    }

    let result = state.explorer.search(&query).await?;
    Ok(Json(SearchResponse {
        success: true,
        kind: result.kind(),
        result,
        query,
    }))
}

async fn recent(
    query: Result<Query<RecentQuery>, QueryRejection>,
    State(state): State<AppState>,
) -> Result<Json<RecentResponse>, HttpError> {
    let Query(query) = query?;
    let limit = Explorer::clamp_limit(query.limit);
    let kind = query.kind.unwrap_or_else(|| "blocks".to_string());
    assert!(
        (1..=crate::explorer::MAX_RECENT_LIMIT).contains(&limit),
        "Recent limit escaped its clamp"
    );

    let (data, address) = match kind.as_str() {
        "blocks" => (
            RecentData::Blocks(state.explorer.recent_blocks(limit).await?),
            None,
        ),
        "transactions" => (
            RecentData::Transactions(state.explorer.recent_transactions(limit).await?),
            None,
        ),
        "address-transactions" => {
            let raw = query
                .address
                .ok_or_else(|| HttpError::bad_request("address is required for this listing"))?;
            let transactions = state.explorer.address_transactions(&raw, limit).await?;
            (
                RecentData::Transactions(transactions),
                canonical_address(&raw),
            )
        }
        other => {
            return Err(HttpError::bad_request(format!(
                "Unknown listing type {other}, expected blocks, transactions or address-transactions"
            )));
        }
    };

    Ok(Json(RecentResponse {
        success: true,
        kind,
        data,
        address,
    }))
}
