pub mod ollama;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use crate::models::chat::ModelName;
use super::LlmConfig;
use self::ollama::OllamaCatalog;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// The runtime could not be reached at all (refused, timed out).
    #[error("model runtime is unreachable at {url}: {source}")]
    Connectivity {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("model runtime answered {status} for {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("model runtime returned an unreadable model list: {0}")]
    Malformed(#[source] reqwest::Error),
}

impl CatalogError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, CatalogError::Connectivity { .. })
    }
}

#[async_trait]
pub trait ModelCatalog: Send + Sync {
    /// Names of the installed models in the runtime's order. An empty list
    /// means nothing is installed and is not an error.
    async fn list_models(&self) -> Result<Vec<ModelName>, CatalogError>;
}

pub fn new_catalog(
    config: &LlmConfig
) -> Result<Arc<dyn ModelCatalog>, Box<dyn std::error::Error + Send + Sync>> {
    let catalog = OllamaCatalog::from_config(config)?;
    Ok(Arc::new(catalog))
}

/// User-facing guidance for an empty catalog.
pub const EMPTY_CATALOG_WARNING: &str = "You have not pulled any model from Ollama yet!";
