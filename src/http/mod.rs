use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::header::{ACCEPT, CONTENT_TYPE, RETRY_AFTER};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::explorer::ExplorerError;
use crate::faucet::FaucetError;
use crate::rpc::GatewayError;
use crate::state::AppState;

mod explorer;
mod faucet;

pub fn router(state: AppState) -> Router {
    assert!(
        state.start_time.elapsed() < Duration::from_secs(86_400),
        "Application uptime exceeds 24 hours before router creation"
    );

    // Browser wallets and the docs site call the API directly.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    let explorer_router = explorer::router().with_state(state.clone());
    let faucet_router = faucet::router().with_state(state.clone());
    Router::new()
        .route("/health", get(health_live))
        .route("/health/ready", get(health_ready))
        .nest("/explorer", explorer_router)
        .nest("/faucet", faucet_router)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_live(State(state): State<AppState>) -> Result<Json<HealthResponse>, HttpError> {
    let uptime = state.start_time.elapsed().as_secs();
    let response = HealthResponse {
        status: "live",
        uptime_seconds: uptime,
    };
    Ok(Json(response))
}

async fn health_ready(State(state): State<AppState>) -> Result<Json<ReadyResponse>, HttpError> {
    state
        .faucet
        .store()
        .ping()
        .await
        .map_err(|err| HttpError::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string()))?;

    let head_block = state
        .rpc
        .block_number()
        .await
        .map_err(|err| HttpError::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string()))?;

    let response = ReadyResponse {
        status: "ready",
        head_block,
        outstanding_challenges: state.challenges.outstanding(),
        cache_entries: CacheSummary {
            blocks: state.cache.blocks.entry_count(),
            transactions: state.cache.transactions.entry_count(),
        },
    };
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadyResponse {
    status: &'static str,
    head_block: u64,
    outstanding_challenges: u64,
    cache_entries: CacheSummary,
}

#[derive(Debug, Serialize)]
struct CacheSummary {
    blocks: u64,
    transactions: u64,
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    message: String,
    retry: Option<RetryHint>,
}

#[derive(Debug, Clone, Copy)]
struct RetryHint {
    after_seconds: i64,
    next_eligible_at: DateTime<Utc>,
}

impl HttpError {
    pub fn new(status: StatusCode, message: String) -> Self {
        assert!(status != StatusCode::OK, "Error status cannot be 200");
        assert!(!message.is_empty(), "Error message cannot be empty");
        Self {
            status,
            message,
            retry: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message.into())
    }

    fn too_many_requests(
        message: String,
        remaining: chrono::Duration,
        next_eligible_at: DateTime<Utc>,
    ) -> Self {
        let mut err = Self::new(StatusCode::TOO_MANY_REQUESTS, message);
        err.retry = Some(RetryHint {
            after_seconds: remaining.num_seconds().max(1),
            next_eligible_at,
        });
        err
    }
}

impl From<JsonRejection> for HttpError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for HttpError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(format!("Invalid query string: {}", rejection.body_text()))
    }
}

impl From<GatewayError> for HttpError {
    fn from(err: GatewayError) -> Self {
        warn!("Node gateway failure: {err}");
        Self::new(StatusCode::BAD_GATEWAY, err.to_string())
    }
}

impl From<ExplorerError> for HttpError {
    fn from(err: ExplorerError) -> Self {
        match err {
            ExplorerError::Validation(message) => Self::bad_request(message),
            ExplorerError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            ExplorerError::Gateway(err) => err.into(),
        }
    }
}

impl From<FaucetError> for HttpError {
    fn from(err: FaucetError) -> Self {
        match err {
            FaucetError::Validation(_) | FaucetError::Verification => {
                Self::bad_request(err.to_string())
            }
            FaucetError::RateLimited {
                remaining,
                next_eligible_at,
            } => Self::too_many_requests(err.to_string(), remaining, next_eligible_at),
            FaucetError::Transfer(_) | FaucetError::Store(_) => {
                warn!("Faucet failure: {err}");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            FaucetError::Gateway(err) => err.into(),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        info!("HTTP error: {}", self.message);
        let body = Json(ErrorBody {
            error: self.message,
            retry_after_seconds: self.retry.map(|hint| hint.after_seconds),
            next_eligible_at: self.retry.map(|hint| hint.next_eligible_at),
        });
        let mut response = (self.status, body).into_response();
        if let Some(hint) = self.retry {
            if let Ok(value) = HeaderValue::from_str(&hint.after_seconds.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_eligible_at: Option<DateTime<Utc>>,
}
