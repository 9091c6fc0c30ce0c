use crate::backend::{Backend, CatalogStatus};
use crate::models::chat::ModelName;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use axum::{
    routing::get,
    Router,
    extract::State,
    response::IntoResponse,
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use log::{info, error};

#[derive(Serialize)]
struct ModelsResponse {
    models: Vec<ModelName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Clone)]
struct AppState {
    backend: Arc<Backend>,
}

pub fn router(backend: Arc<Backend>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/models", get(models_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(AppState { backend })
}

pub async fn start_http_server(
    http_port: u16,
    backend: Arc<Backend>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = format!("0.0.0.0:{}", http_port).parse::<SocketAddr>()?;
    info!("Starting HTTP API server on: http://{}", addr);

    let app = router(backend);

    tokio::spawn(async move {
        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                    error!("HTTP server error: {}", e);
                }
            },
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
            }
        }
    });

    info!("HTTP server started");
    Ok(())
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn models_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.backend.catalog_status().await {
        CatalogStatus::Unavailable(e) => {
            error!("Model listing failed: {}", e);
            let code = if e.is_connectivity() {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::BAD_GATEWAY
            };
            (code, Json(ErrorResponse { error: e.to_string() })).into_response()
        }
        status => {
            let body = ModelsResponse {
                models: status.models().to_vec(),
                warning: status.warning(),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::catalog::EMPTY_CATALOG_WARNING;
    use crate::llm::catalog::ollama::OllamaCatalog;
    use crate::llm::chat::openai::OpenAIChatClient;
    use axum::body::{ to_bytes, Body };
    use axum::http::Request;
    use httpmock::prelude::*;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app_for(ollama_url: String) -> Router {
        let catalog = OllamaCatalog::new(ollama_url, Duration::from_secs(2)).unwrap();
        let chat = OpenAIChatClient::new("ollama", "http://127.0.0.1:1/v1").unwrap();
        router(Arc::new(Backend::new(Arc::new(catalog), Arc::new(chat))))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn lists_models() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(GET).path("/api/tags");
            then.status(200).body(r#"{"models":[{"name":"llama3"},{"name":"mistral"}]}"#);
        }).await;

        let (status, body) = get_json(app_for(server.base_url()), "/api/models").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "models": ["llama3", "mistral"] }));
    }

    #[tokio::test]
    async fn empty_catalog_carries_guidance() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(GET).path("/api/tags");
            then.status(200).body(r#"{"models":[]}"#);
        }).await;

        let (status, body) = get_json(app_for(server.base_url()), "/api/models").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["models"], serde_json::json!([]));
        assert_eq!(body["warning"], EMPTY_CATALOG_WARNING);
    }

    #[tokio::test]
    async fn unreachable_runtime_is_service_unavailable() {
        let (status, body) = get_json(app_for("http://127.0.0.1:1".into()), "/api/models").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("unreachable"));
    }

    #[tokio::test]
    async fn runtime_failure_is_bad_gateway() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(GET).path("/api/tags");
            then.status(500).body("boom");
        }).await;

        let (status, body) = get_json(app_for(server.base_url()), "/api/models").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].is_string());
        assert!(body.get("models").is_none());
    }
}
