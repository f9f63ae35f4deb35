//! REST API handlers for recommendation requests and operational endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use cinerank_core::ids::{AppUserId, CatalogId};
use cinerank_core::types::{ContextSummary, RecommendOutcome, ScoredItem};
use cinerank_ncf::RecommenderContext;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};
use uuid::Uuid;

/// Maximum number of rated ids accepted in one request.
const MAX_RATED_IDS: usize = 100_000;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub recommender: Arc<RecommenderContext>,
    pub default_top_n: usize,
    pub max_top_n: usize,
    pub start_time: Instant,
}

#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    pub user_id: AppUserId,
    #[serde(default)]
    pub rated_catalog_ids: Vec<CatalogId>,
    #[serde(default)]
    pub top_n: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecommendResponse {
    pub request_id: Uuid,
    pub user_id: AppUserId,
    pub outcome: RecommendOutcome,
    pub items: Vec<ScoredItem>,
    pub generated_at: DateTime<Utc>,
}

/// Validate a recommendation request at the API boundary and resolve `top_n`.
fn validate_request(request: &RecommendRequest, state: &AppState) -> Result<usize, &'static str> {
    if request.rated_catalog_ids.len() > MAX_RATED_IDS {
        return Err("'rated_catalog_ids' exceeds maximum length");
    }
    let top_n = request.top_n.unwrap_or(state.default_top_n);
    if top_n > state.max_top_n {
        return Err("'top_n' exceeds the configured maximum");
    }
    Ok(top_n)
}

fn outcome_label(outcome: &RecommendOutcome) -> &'static str {
    match outcome {
        RecommendOutcome::Complete => "complete",
        RecommendOutcome::Partial { .. } => "partial",
        RecommendOutcome::Disabled => "disabled",
        RecommendOutcome::UnseenUser => "unseen_user",
        RecommendOutcome::ScoringFailed => "scoring_failed",
    }
}

/// POST /v1/recommendations: rank unseen movies for a user.
pub async fn handle_recommend(
    State(state): State<AppState>,
    Json(request): Json<RecommendRequest>,
) -> Result<Json<RecommendResponse>, (StatusCode, Json<ErrorResponse>)> {
    let top_n = match validate_request(&request, &state) {
        Ok(top_n) => top_n,
        Err(msg) => {
            warn!(user_id = %request.user_id, error = msg, "Recommendation request validation failed");
            metrics::counter!("api.validation_errors").increment(1);
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "invalid_recommendation_request".to_string(),
                    message: msg.to_string(),
                }),
            ));
        }
    };

    let request_id = Uuid::new_v4();
    let user_id = request.user_id;
    let rated: HashSet<CatalogId> = request.rated_catalog_ids.into_iter().collect();
    let recommender = state.recommender.clone();

    // Scoring is CPU-bound; keep it off the async workers.
    let start = Instant::now();
    let result =
        tokio::task::spawn_blocking(move || recommender.recommend(user_id, &rated, top_n)).await;

    let recommendations = match result {
        Ok(recommendations) => recommendations,
        Err(e) => {
            error!(error = %e, request_id = %request_id, "Recommendation task failed");
            metrics::counter!("api.errors").increment(1);
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "recommendation_failed".to_string(),
                    message: "Internal processing error".to_string(),
                }),
            ));
        }
    };

    metrics::counter!("recommend.requests", "outcome" => outcome_label(&recommendations.outcome))
        .increment(1);
    metrics::histogram!("recommend.latency_us").record(start.elapsed().as_micros() as f64);
    if recommendations.is_empty() {
        metrics::counter!("recommend.empty").increment(1);
    }

    Ok(Json(RecommendResponse {
        request_id,
        user_id,
        outcome: recommendations.outcome,
        items: recommendations.items,
        generated_at: Utc::now(),
    }))
}

/// GET /v1/recommender/status: what the loader produced at startup.
pub async fn recommender_status(State(state): State<AppState>) -> Json<ContextSummary> {
    Json(state.recommender.summary())
}

/// GET /health: Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        recommender_enabled: state.recommender.is_enabled(),
    })
}

/// GET /ready: Readiness probe. A disabled recommender still serves
/// (empty) results, so it does not block readiness.
pub async fn readiness() -> StatusCode {
    StatusCode::OK
}

/// GET /live: Liveness probe.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub recommender_enabled: bool,
}
