pub mod api;
pub mod websocket;

use crate::backend::Backend;
use crate::cli::Args;
use std::error::Error;
use std::sync::Arc;

pub struct Server {
    addr: String,
    backend: Arc<Backend>,
    args: Args,
}

impl Server {
    pub fn new(
        addr: String,
        backend: Arc<Backend>,
        args: Args,
    ) -> Self {
        Self {
            addr,
            backend,
            args,
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        if let Some(http_port) = self.args.http_port {
            self.start_http_server(http_port).await?;
        }

        self.start_ws_server().await?;

        Ok(())
    }

    async fn start_http_server(&self, http_port: u16) -> Result<(), Box<dyn Error + Send + Sync>> {
        api::start_http_server(http_port, self.backend.clone()).await
    }

    async fn start_ws_server(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        websocket::start_ws_server(&self.addr, self.backend.clone()).await
    }
}
