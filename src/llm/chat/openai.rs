use async_trait::async_trait;
use log::debug;
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;

use super::{ http_stream_generate, ChatClient, CompletionError, FragmentStream, LineEvent };
use crate::llm::LlmConfig;
use crate::models::chat::{ Role, Turn };

/// Client for any server speaking the OpenAI chat-completions protocol,
/// including Ollama's `/v1` compatibility layer.
pub struct OpenAIChatClient {
    http: HttpClient,
    base_url: String,
}

#[derive(Serialize)]
struct OpenAIMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize)]
struct OpenAIStreamResponse {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    error: Option<OpenAIStreamError>,
}

#[derive(Deserialize)]
struct OpenAIStreamChoice {
    #[serde(default)]
    delta: OpenAIDelta,
}

#[derive(Deserialize, Default)]
struct OpenAIDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIStreamError {
    message: String,
}

impl OpenAIChatClient {
    pub fn new(
        api_key: &str,
        base_url: impl Into<String>
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| format!("Invalid API key format: {}", e))?
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;

        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        Self::new(&config.api_key, config.chat_base_url.clone())
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Interprets one Server-Sent Events line of a streamed chat completion.
pub fn parse_stream_line(line: &str) -> Result<LineEvent, CompletionError> {
    let data = match line.strip_prefix("data:") {
        Some(data) => data.trim_start(),
        // Blank separators, `:` comments and other SSE fields.
        None => return Ok(LineEvent::Skip),
    };

    if data == "[DONE]" {
        return Ok(LineEvent::Done);
    }

    let chunk = serde_json::from_str::<OpenAIStreamResponse>(data)
        .map_err(|e| CompletionError::Malformed(format!("{} in {:?}", e, data)))?;

    if let Some(err) = chunk.error {
        return Err(CompletionError::Endpoint(err.message));
    }

    let text: String = chunk.choices
        .into_iter()
        .filter_map(|choice| choice.delta.content)
        .collect();

    if text.is_empty() {
        Ok(LineEvent::Skip)
    } else {
        Ok(LineEvent::Fragment(text))
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn stream_chat(
        &self,
        model: &str,
        messages: &[Turn]
    ) -> Result<FragmentStream, CompletionError> {
        let url = self.completions_url();
        let req = OpenAIChatRequest {
            model,
            messages: messages
                .iter()
                .map(|turn| OpenAIMessage { role: turn.role, content: &turn.content })
                .collect(),
            stream: true,
        };
        debug!("POST {} with {} message(s) for model {}", url, messages.len(), model);

        http_stream_generate(&self.http, &url, req, parse_stream_line).await
    }
}
