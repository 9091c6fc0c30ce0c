pub mod backend;
pub mod cli;
pub mod llm;
pub mod models;
pub mod repl;
pub mod server;
pub mod session;

use backend::Backend;
use cli::Args;
use log::info;
use server::Server;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Ollama Base URL: {}", args.ollama_base_url);
    info!("Chat Base URL: {}", args.chat_base_url);
    info!("Chat Model: {}", args.model.as_deref().unwrap_or("(first installed)"));
    info!("Catalog Timeout: {}s", args.catalog_timeout_secs);
    info!("Mode: {}", if args.repl { "repl" } else { "server" });
    if !args.repl {
        info!("Server Address: {}", args.server_addr);
        match args.http_port {
            Some(port) => info!("HTTP API Port: {}", port),
            None => info!("HTTP API: disabled"),
        }
    }
    info!("-------------------------");

    let backend = Backend::from_args(&args)?;

    if args.repl {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        return repl::run_repl(&backend, args.model.clone(), stdin, tokio::io::stdout()).await;
    }

    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, Arc::new(backend), args);
    server.run().await?;

    Ok(())
}
