//! Faucet HTTP handlers.
//!
//! A client first fetches a challenge, then posts the recipient address together with the
//! challenge id and its answer. Each address is funded at most once per cooldown window.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::captcha::{Challenge, VerificationProof};
use crate::faucet::store::FaucetRecord;
use crate::faucet::{Disbursement, EligibilityReport, FaucetStatus};
use crate::state::AppState;

use super::HttpError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/challenge", get(issue_challenge))
        .route("/request", post(request_funds))
        .route("/check/{address}", get(check_eligibility))
        .route("/status", get(get_status))
        .route("/history", get(get_history))
}

#[derive(Debug, Deserialize)]
struct FaucetRequest {
    address: String,
    #[serde(flatten)]
    proof: VerificationProof,
}

#[derive(Debug, Serialize)]
struct FaucetResponse {
    success: bool,
    #[serde(flatten)]
    disbursement: Disbursement,
}

#[derive(Debug, Deserialize, Default)]
struct HistoryQuery {
    limit: Option<u64>,
}

async fn issue_challenge(State(state): State<AppState>) -> Json<Challenge> {
    Json(state.challenges.issue().await)
}

async fn request_funds(
    State(state): State<AppState>,
    payload: Result<Json<FaucetRequest>, JsonRejection>,
) -> Result<Json<FaucetResponse>, HttpError> {
    let Json(request) = payload?;
    let disbursement = state
        .faucet
        .disburse(&request.address, &request.proof)
        .await?;
    Ok(Json(FaucetResponse {
        success: true,
        disbursement,
    }))
}

async fn check_eligibility(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<EligibilityReport>, HttpError> {
    Ok(Json(state.faucet.eligibility(&address).await?))
}

async fn get_status(State(state): State<AppState>) -> Result<Json<FaucetStatus>, HttpError> {
    Ok(Json(state.faucet.status().await?))
}

async fn get_history(
    query: Result<Query<HistoryQuery>, QueryRejection>,
    State(state): State<AppState>,
) -> Result<Json<Vec<FaucetRecord>>, HttpError> {
    let Query(query) = query?;
    let entries = state.faucet.history(query.limit).await?;
    assert!(
        entries.len() <= crate::faucet::MAX_HISTORY_LIMIT as usize,
        "Returned more history entries than allowed"
    );
    Ok(Json(entries))
}
