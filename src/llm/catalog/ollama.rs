use async_trait::async_trait;
use log::debug;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::error::Error as StdError;
use std::time::Duration;
use super::{ CatalogError, ModelCatalog };
use crate::llm::LlmConfig;
use crate::models::chat::ModelName;

#[derive(Debug, Clone)]
pub struct OllamaCatalog {
    http: HttpClient,
    base_url: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelDescriptor>,
}

#[derive(Deserialize)]
struct ModelDescriptor {
    name: String,
}

impl OllamaCatalog {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let http = HttpClient::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        Self::new(config.ollama_base_url.clone(), config.catalog_timeout)
    }

    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ModelCatalog for OllamaCatalog {
    async fn list_models(&self) -> Result<Vec<ModelName>, CatalogError> {
        let url = self.tags_url();
        let resp = self.http
            .get(&url)
            .send().await
            .map_err(|e| CatalogError::Connectivity { url: url.clone(), source: e })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CatalogError::Status { url, status });
        }

        let tags = resp.json::<TagsResponse>().await.map_err(|e| {
            if e.is_timeout() {
                CatalogError::Connectivity { url: url.clone(), source: e }
            } else {
                CatalogError::Malformed(e)
            }
        })?;

        let names: Vec<ModelName> = tags.models
            .into_iter()
            .map(|m| m.name)
            .collect();
        debug!("Runtime at {} reports {} model(s)", self.base_url, names.len());
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn catalog_for(base_url: String) -> OllamaCatalog {
        OllamaCatalog::new(base_url, Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn lists_names_in_runtime_order() {
        let server = MockServer::start_async().await;
        let tags = server.mock_async(|when, then| {
            when.method(GET).path("/api/tags");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"models":[
                    {"name":"mistral:latest","size":4109865159,"digest":"61e88e884507"},
                    {"name":"llama3:latest","size":4661224676,"digest":"365c0bd3c000"}
                ]}"#);
        }).await;

        let models = catalog_for(server.base_url()).list_models().await.unwrap();

        tags.assert_async().await;
        assert_eq!(models, vec!["mistral:latest", "llama3:latest"]);
    }

    #[tokio::test]
    async fn empty_runtime_is_not_an_error() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(GET).path("/api/tags");
            then.status(200).body(r#"{"models":[]}"#);
        }).await;

        let models = catalog_for(server.base_url()).list_models().await.unwrap();
        assert!(models.is_empty());
    }

    #[tokio::test]
    async fn missing_models_key_reads_as_empty() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(GET).path("/api/tags");
            then.status(200).body("{}");
        }).await;

        let models = catalog_for(server.base_url()).list_models().await.unwrap();
        assert!(models.is_empty());
    }

    #[tokio::test]
    async fn unreachable_runtime_is_connectivity_error() {
        // Nothing listens on port 1.
        let err = catalog_for("http://127.0.0.1:1".to_string())
            .list_models().await
            .unwrap_err();
        assert!(err.is_connectivity(), "unexpected error: {:?}", err);
    }

    #[tokio::test]
    async fn hangup_before_response_is_connectivity_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                drop(socket);
            }
        });

        let err = catalog_for(format!("http://{}", addr)).list_models().await.unwrap_err();
        assert!(err.is_connectivity(), "unexpected error: {:?}", err);
    }

    #[tokio::test]
    async fn server_error_is_distinct_from_connectivity() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(GET).path("/api/tags");
            then.status(500).body("boom");
        }).await;

        let err = catalog_for(server.base_url()).list_models().await.unwrap_err();
        match err {
            CatalogError::Status { status, .. } => assert_eq!(status.as_u16(), 500),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn garbage_body_is_malformed() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(GET).path("/api/tags");
            then.status(200).body("<html>not json</html>");
        }).await;

        let err = catalog_for(server.base_url()).list_models().await.unwrap_err();
        assert!(matches!(err, CatalogError::Malformed(_)), "unexpected error: {:?}", err);
    }
}
