use crate::backend::Backend;
use crate::models::websocket::{ClientMessage, ServerMessage};
use crate::session::ConversationSession;

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::io::{AsyncRead, AsyncWrite};

use tokio_tungstenite::{accept_async, WebSocketStream};
use tokio_tungstenite::tungstenite::protocol::Message;

use chrono::Utc;
use log::{info, warn, error};
use futures::{Sink, SinkExt, StreamExt};

const MAX_MESSAGE_SIZE: usize = 1 * 1024 * 1024;

pub async fn start_ws_server(
    addr: &str,
    backend: Arc<Backend>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    info!("WS server listening on: {}", addr);

    loop {
        let (stream, peer) = listener.accept().await?;
        info!("Incoming connection from: {}", peer);
        let backend_clone = Arc::clone(&backend);

        tokio::spawn(async move {
            match accept_async(stream).await {
                Ok(ws) => handle_connection(peer, ws, backend_clone).await,
                Err(e) => error!("Handshake failed for {}: {}", peer, e),
            }
        });
    }
}

async fn send_message<T>(tx: &mut T, msg: &ServerMessage) -> Result<(), Box<dyn Error + Send + Sync>>
    where T: Sink<Message> + Unpin, T::Error: Error + Send + Sync + 'static
{
    let json = serde_json::to_string(msg)?;
    tx.send(Message::Text(json)).await.map_err(|e| Box::new(e) as _)
}

/// Serves one browser tab: one conversation session for the lifetime of the
/// socket. Client messages are handled strictly one at a time, so a new chat
/// request is only read once the previous reply has finished.
pub async fn handle_connection<S>(
    peer: SocketAddr,
    websocket: WebSocketStream<S>,
    backend: Arc<Backend>
)
    where S: AsyncRead + AsyncWrite + Unpin
{
    let (mut tx, mut rx) = websocket.split();
    let mut session = backend.new_session();
    info!("Assigned session {} to {}", session.id(), peer);

    if let Err(e) = send_catalog(&mut tx, &backend).await {
        error!("Failed to send model list to {}: {}", peer, e);
        return;
    }

    while let Some(msg) = rx.next().await {
        let message = match msg {
            Ok(message) => message,
            Err(e) => {
                info!("WebSocket receive error for {}: {}", peer, e);
                break;
            }
        };

        if message.len() > MAX_MESSAGE_SIZE {
            warn!(
                "Message from {} exceeds size limit ({} > {})",
                peer,
                message.len(),
                MAX_MESSAGE_SIZE
            );
            let error_msg = ServerMessage::Error {
                message: "Message too large".to_string(),
            };
            if send_message(&mut tx, &error_msg).await.is_err() {
                error!("Failed to send size limit error to {}", peer);
            }
            break;
        }

        let outcome: Result<(), Box<dyn Error + Send + Sync>> = match message {
            Message::Text(text) => {
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Chat { content, model }) => {
                        stream_reply(&mut tx, &mut session, &content, &model).await
                    }
                    Ok(ClientMessage::Transcript) => {
                        let turns = session.snapshot();
                        send_message(&mut tx, &ServerMessage::Transcript { turns }).await
                    }
                    Ok(ClientMessage::Models) => send_catalog(&mut tx, &backend).await,
                    Err(e) => {
                        error!("Failed to parse message from {}: {}", peer, e);
                        let error_msg = ServerMessage::Error {
                            message: format!("Failed to parse message: {}", e),
                        };
                        send_message(&mut tx, &error_msg).await
                    }
                }
            }
            Message::Close(_) => {
                info!("Received close frame from {}", peer);
                break;
            }
            Message::Ping(ping_data) => {
                tx.send(Message::Pong(ping_data)).await.map_err(|e| Box::new(e) as _)
            }
            Message::Binary(_) => {
                warn!("Ignoring binary message from {}", peer);
                Ok(())
            }
            Message::Pong(_) | Message::Frame(_) => Ok(()),
        };

        if let Err(e) = outcome {
            error!("Failed to reply to {}: {}", peer, e);
            break;
        }
    }
    info!("WebSocket connection closed for {} (session {}, {} turn(s))", peer, session.id(), session.len());
}

async fn send_catalog<T>(tx: &mut T, backend: &Backend) -> Result<(), Box<dyn Error + Send + Sync>>
    where T: Sink<Message> + Unpin, T::Error: Error + Send + Sync + 'static
{
    let status = backend.catalog_status().await;
    if let Some(message) = status.warning() {
        send_message(tx, &ServerMessage::Warning { message }).await?;
    }
    let models = status.models().to_vec();
    send_message(tx, &ServerMessage::Models { models }).await
}

/// Relays one reply as `partial` frames. A failed completion is reported to
/// the client as an `error` frame and is not a connection error; a failed send
/// is, and drops the reply mid-stream.
async fn stream_reply<T>(
    tx: &mut T,
    session: &mut ConversationSession,
    content: &str,
    model: &str
) -> Result<(), Box<dyn Error + Send + Sync>>
    where T: Sink<Message> + Unpin, T::Error: Error + Send + Sync + 'static
{
    send_message(tx, &ServerMessage::Typing).await?;

    let mut reply = match session.submit(content, model).await {
        Ok(reply) => reply,
        Err(e) => {
            return send_message(tx, &ServerMessage::Error { message: e.to_string() }).await;
        }
    };

    while let Some(chunk) = reply.next().await {
        match chunk {
            Ok(fragment) => {
                send_message(tx, &ServerMessage::Partial { content: fragment }).await?;
            }
            Err(e) => {
                return send_message(tx, &ServerMessage::Error { message: e.to_string() }).await;
            }
        }
    }
    drop(reply);

    send_message(tx, &ServerMessage::Done { timestamp: Utc::now().timestamp() }).await
}
