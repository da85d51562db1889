use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info};

use crate::core::{BridgeOrchestrator, PerformanceSnapshot};
use crate::types::{BackendHealth, Route, TransferRequest};

/// 읽기 전용 HTTP 모니터링 서버
///
/// `GET /health`, `GET /metrics`, `POST /routes` 만 노출하며 전송 실행은
/// 제공하지 않습니다.
#[derive(Clone)]
pub struct MonitoringManager {
    orchestrator: Arc<BridgeOrchestrator>,
    port: u16,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct RoutesBody {
    routes: Vec<Route>,
}

impl MonitoringManager {
    pub fn new(orchestrator: Arc<BridgeOrchestrator>, port: u16) -> Self {
        Self { orchestrator, port }
    }

    pub fn router(&self) -> Router {
        let health_orch = Arc::clone(&self.orchestrator);
        let metrics_orch = Arc::clone(&self.orchestrator);
        let routes_orch = Arc::clone(&self.orchestrator);

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/health", get(move || health_handler(Arc::clone(&health_orch))))
            .route("/metrics", get(move || metrics_handler(Arc::clone(&metrics_orch))))
            .route(
                "/routes",
                post(move |Json(request): Json<TransferRequest>| routes_handler(Arc::clone(&routes_orch), request)),
            )
            .layer(cors)
    }

    /// Bind and serve in the background; returns the bound address
    pub async fn start(&self) -> Result<SocketAddr> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let server = axum::Server::try_bind(&addr)
            .with_context(|| format!("failed to bind monitoring API on {}", addr))?
            .serve(self.router().into_make_service());
        let bound = server.local_addr();
        info!("🛰️ 모니터링 API 시작: http://{}", bound);

        tokio::spawn(async move {
            if let Err(e) = server.await {
                error!("모니터링 API 오류: {}", e);
            }
        });
        Ok(bound)
    }
}

async fn health_handler(orchestrator: Arc<BridgeOrchestrator>) -> Json<HashMap<String, BackendHealth>> {
    Json(orchestrator.get_system_health().await)
}

async fn metrics_handler(orchestrator: Arc<BridgeOrchestrator>) -> Json<PerformanceSnapshot> {
    Json(orchestrator.get_performance_metrics().await)
}

async fn routes_handler(orchestrator: Arc<BridgeOrchestrator>, request: TransferRequest) -> Response {
    if let Err(e) = orchestrator.validate_request(&request) {
        debug!("라우트 미리보기 요청 거부: {}", e);
        let body = ErrorBody {
            kind: e.kind.to_string(),
            message: e.message,
        };
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    }

    let routes = orchestrator.estimate_all_routes(&request).await;
    Json(RoutesBody { routes }).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridges::BackendRegistry;
    use crate::core::OrchestratorSettings;
    use crate::mocks::StubBackend;
    use crate::types::ChainId;

    const EVM_A: &str = "0x1111111111111111111111111111111111111111";
    const EVM_B: &str = "0x2222222222222222222222222222222222222222";

    fn orchestrator() -> Arc<BridgeOrchestrator> {
        let registry = Arc::new(BackendRegistry::new());
        let pairs = [(ChainId::Ethereum, ChainId::Base)];
        registry.register(
            "fast",
            Arc::new(StubBackend::new("fast").with_pairs(&pairs).with_profile(0.99, 60_000)),
        );
        registry.register(
            "slow",
            Arc::new(StubBackend::new("slow").with_pairs(&pairs).with_profile(0.99, 600_000)),
        );
        Arc::new(BridgeOrchestrator::new(registry, OrchestratorSettings::default()))
    }

    #[tokio::test]
    async fn test_routes_handler_previews_without_executing() {
        let orch = orchestrator();
        let request = TransferRequest::new(ChainId::Ethereum, ChainId::Base, EVM_A, EVM_B, "100");

        let response = routes_handler(Arc::clone(&orch), request).await;
        assert_eq!(response.status(), StatusCode::OK);

        let metrics = orch.get_performance_metrics().await;
        assert_eq!(metrics.total_transfers, 0);
    }

    #[tokio::test]
    async fn test_routes_handler_rejects_invalid_amount() {
        let request = TransferRequest::new(ChainId::Ethereum, ChainId::Base, EVM_A, EVM_B, "-5");
        let response = routes_handler(orchestrator(), request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_server_serves_health_and_routes() {
        let manager = MonitoringManager::new(orchestrator(), 0);
        let addr = manager.start().await.unwrap();
        let base = format!("http://127.0.0.1:{}", addr.port());
        let client = reqwest::Client::new();

        let health: HashMap<String, BackendHealth> =
            client.get(format!("{}/health", base)).send().await.unwrap().json().await.unwrap();
        assert_eq!(health.len(), 2);

        let body = serde_json::json!({
            "source_chain": "ethereum",
            "destination_chain": "base",
            "source_address": EVM_A,
            "destination_address": EVM_B,
            "amount": "250"
        });
        let routes: serde_json::Value = client
            .post(format!("{}/routes", base))
            .json(&body)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let routes = routes["routes"].as_array().unwrap();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0]["backend"], "fast");
    }
}
