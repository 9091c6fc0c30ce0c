use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Model Runtime Args ---
    /// Base URL of the local Ollama runtime used to list installed models.
    #[arg(long, env = "OLLAMA_BASE_URL", default_value = "http://localhost:11434")]
    pub ollama_base_url: String,

    /// Seconds to wait for the runtime before reporting it unreachable.
    #[arg(long, env = "CATALOG_TIMEOUT_SECS", default_value = "5")]
    pub catalog_timeout_secs: u64,

    // --- Chat Completion Args ---
    /// Base URL of the OpenAI-compatible API (the `/chat/completions` route is appended).
    #[arg(long, env = "CHAT_BASE_URL", default_value = "http://localhost:11434/v1")]
    pub chat_base_url: String,

    /// Bearer token for the completion API. Ollama ignores it but requires one to be present.
    #[arg(long, env = "CHAT_API_KEY", default_value = "ollama")]
    pub chat_api_key: String,

    /// Model to chat with in the REPL (e.g., llama3). Defaults to the first installed model.
    #[arg(long, env = "CHAT_MODEL")]
    pub model: Option<String>,

    // --- General App Args ---
    /// Run an interactive terminal chat instead of the server.
    #[arg(long, env = "REPL", default_value = "false")]
    pub repl: bool,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,

    /// Host address and port for the WebSocket server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Optional port for the HTTP API (model listing, health). Disabled when unset.
    #[arg(long, env = "HTTP_PORT")]
    pub http_port: Option<u16>,
}
