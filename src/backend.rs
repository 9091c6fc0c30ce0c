use log::{ info, warn };
use std::error::Error;
use std::sync::Arc;

use crate::cli::Args;
use crate::llm::catalog::{ new_catalog, CatalogError, ModelCatalog, EMPTY_CATALOG_WARNING };
use crate::llm::chat::{ new_client, ChatClient };
use crate::llm::LlmConfig;
use crate::models::chat::ModelName;
use crate::session::ConversationSession;

/// Outcome of asking the runtime for its models, as front ends present it.
#[derive(Debug)]
pub enum CatalogStatus {
    Ready(Vec<ModelName>),
    /// Reachable runtime with nothing installed.
    Empty,
    Unavailable(CatalogError),
}

impl CatalogStatus {
    pub fn models(&self) -> &[ModelName] {
        match self {
            CatalogStatus::Ready(models) => models,
            CatalogStatus::Empty | CatalogStatus::Unavailable(_) => &[],
        }
    }

    pub fn warning(&self) -> Option<String> {
        match self {
            CatalogStatus::Ready(_) => None,
            CatalogStatus::Empty => Some(EMPTY_CATALOG_WARNING.to_string()),
            CatalogStatus::Unavailable(e) => Some(e.to_string()),
        }
    }
}

/// The two external collaborators every front end talks to.
pub struct Backend {
    catalog: Arc<dyn ModelCatalog>,
    chat: Arc<dyn ChatClient>,
}

impl Backend {
    pub fn new(catalog: Arc<dyn ModelCatalog>, chat: Arc<dyn ChatClient>) -> Self {
        Self { catalog, chat }
    }

    pub fn from_args(args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let config = LlmConfig::from_args(args)?;
        info!("Model catalog: {}/api/tags", config.ollama_base_url);
        info!("Chat completions: {}/chat/completions", config.chat_base_url);

        let catalog = new_catalog(&config)?;
        let chat = new_client(&config)?;
        Ok(Self::new(catalog, chat))
    }

    pub async fn catalog_status(&self) -> CatalogStatus {
        match self.catalog.list_models().await {
            Ok(models) if models.is_empty() => {
                warn!("{}", EMPTY_CATALOG_WARNING);
                CatalogStatus::Empty
            }
            Ok(models) => CatalogStatus::Ready(models),
            Err(e) => {
                warn!("Could not list models: {}", e);
                CatalogStatus::Unavailable(e)
            }
        }
    }

    /// A fresh, empty conversation bound to this backend's chat client.
    pub fn new_session(&self) -> ConversationSession {
        ConversationSession::new(Arc::clone(&self.chat))
    }
}
