pub mod catalog;
pub mod chat;

use crate::cli::Args;
use std::fmt;
use std::time::Duration;
use url::Url;

#[derive(Debug, PartialEq, Eq)]
pub struct ParseLlmConfigError {
    message: String,
}

impl fmt::Display for ParseLlmConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseLlmConfigError {}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub ollama_base_url: String,
    pub chat_base_url: String,
    pub api_key: String,
    pub catalog_timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            ollama_base_url: "http://localhost:11434".to_string(),
            chat_base_url: "http://localhost:11434/v1".to_string(),
            api_key: "ollama".to_string(),
            catalog_timeout: Duration::from_secs(5),
        }
    }
}

impl LlmConfig {
    pub fn from_args(args: &Args) -> Result<Self, ParseLlmConfigError> {
        Ok(Self {
            ollama_base_url: validate_base_url("ollama base URL", &args.ollama_base_url)?,
            chat_base_url: validate_base_url("chat base URL", &args.chat_base_url)?,
            api_key: args.chat_api_key.clone(),
            catalog_timeout: Duration::from_secs(args.catalog_timeout_secs),
        })
    }
}

/// Checks that `raw` is an absolute http(s) URL and strips any trailing slash,
/// so routes can be appended with `format!`.
fn validate_base_url(label: &str, raw: &str) -> Result<String, ParseLlmConfigError> {
    let parsed = Url::parse(raw).map_err(|e| ParseLlmConfigError {
        message: format!("Invalid {}: '{}' ({})", label, raw, e),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(raw.trim_end_matches('/').to_string()),
        other =>
            Err(ParseLlmConfigError {
                message: format!("Invalid {}: unsupported scheme '{}'", label, other),
            }),
    }
}
