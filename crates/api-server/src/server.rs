//! API server: HTTP endpoints and the optional metrics exporter.

use crate::rest::{self, AppState};
use axum::routing::{get, post};
use axum::Router;
use cinerank_core::config::AppConfig;
use cinerank_ncf::RecommenderContext;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the HTTP router over a loaded recommender.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Recommendations
        .route("/v1/recommendations", post(rest::handle_recommend))
        .route("/v1/recommender/status", get(rest::recommender_status))
        // Operational endpoints
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Main API server.
pub struct ApiServer {
    config: AppConfig,
    recommender: Arc<RecommenderContext>,
}

impl ApiServer {
    pub fn new(config: AppConfig, recommender: Arc<RecommenderContext>) -> Self {
        Self {
            config,
            recommender,
        }
    }

    fn state(&self) -> AppState {
        AppState {
            recommender: self.recommender.clone(),
            default_top_n: self.config.recommender.top_n,
            max_top_n: self.config.recommender.max_top_n,
            start_time: Instant::now(),
        }
    }

    /// Start the HTTP REST server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = router(self.state());

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the metrics server on a separate port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        builder
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::{HealthResponse, RecommendResponse};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use cinerank_core::ids::{AppUserId, CatalogId, DatasetItemId, ItemIndex, UserIndex};
    use cinerank_core::types::RecommendOutcome;
    use cinerank_core::{InferenceError, ScoringModel};
    use cinerank_ncf::mappings::{ItemMapArtifact, UserMapArtifact, MAP_FORMAT_VERSION};
    use cinerank_ncf::MappingStore;
    use serde_json::json;
    use tower::ServiceExt;

    struct FixedScorer(Vec<f32>);

    impl ScoringModel for FixedScorer {
        fn score_batch(
            &self,
            _user: UserIndex,
            items: &[ItemIndex],
        ) -> Result<Vec<f32>, InferenceError> {
            Ok(items.iter().map(|i| self.0[i.0]).collect())
        }

        fn num_users(&self) -> usize {
            1
        }

        fn num_items(&self) -> usize {
            self.0.len()
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn test_state(recommender: RecommenderContext) -> AppState {
        AppState {
            recommender: Arc::new(recommender),
            default_top_n: 2,
            max_top_n: 10,
            start_time: Instant::now(),
        }
    }

    fn scenario_context() -> RecommenderContext {
        let mut users = UserMapArtifact {
            format_version: MAP_FORMAT_VERSION,
            ..Default::default()
        };
        users.user_to_index.insert(AppUserId(7), UserIndex(0));
        let mut items = ItemMapArtifact {
            format_version: MAP_FORMAT_VERSION,
            ..Default::default()
        };
        for i in 0..3 {
            let d = DatasetItemId(100 + i as i64);
            let c = CatalogId(900 + i as i64);
            items.dataset_to_index.insert(d, ItemIndex(i));
            items.index_to_dataset.insert(ItemIndex(i), d);
            items.dataset_to_catalog.insert(d, c);
            items.catalog_to_dataset.insert(c, d);
        }
        RecommenderContext::new(
            Some(Arc::new(FixedScorer(vec![0.9, 0.2, 0.95]))),
            MappingStore::from_artifacts(users, items),
        )
    }

    async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn test_recommend_endpoint_uses_default_top_n() {
        let app = router(test_state(scenario_context()));
        let (status, body) = post_json(
            app,
            "/v1/recommendations",
            json!({ "user_id": 7, "rated_catalog_ids": [900] }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let response: RecommendResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(response.outcome, RecommendOutcome::Complete);
        let ids: Vec<_> = response.items.iter().map(|i| i.catalog_id).collect();
        assert_eq!(ids, vec![CatalogId(902), CatalogId(901)]);
    }

    #[tokio::test]
    async fn test_unseen_user_is_ok_with_empty_items() {
        let app = router(test_state(scenario_context()));
        let (status, body) = post_json(
            app,
            "/v1/recommendations",
            json!({ "user_id": 8, "rated_catalog_ids": [900], "top_n": 2 }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let response: RecommendResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(response.outcome, RecommendOutcome::UnseenUser);
        assert!(response.items.is_empty());
    }

    #[tokio::test]
    async fn test_top_n_above_maximum_rejected() {
        let app = router(test_state(scenario_context()));
        let (status, _) = post_json(
            app,
            "/v1/recommendations",
            json!({ "user_id": 7, "top_n": 11 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_reports_disabled_recommender() {
        let app = router(test_state(RecommenderContext::disabled(vec![])));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let health: HealthResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(!health.recommender_enabled);
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let app = router(test_state(scenario_context()));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/recommender/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let summary: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(summary["enabled"], true);
        assert_eq!(summary["items"], 3);
        assert_eq!(summary["model"], "fixed");
    }
}
