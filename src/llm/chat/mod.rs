pub mod openai;

use async_trait::async_trait;
use futures::{ Stream, StreamExt };
use log::debug;
use reqwest::{ Client as HttpClient, StatusCode };
use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use crate::models::chat::Turn;
use super::LlmConfig;
use self::openai::OpenAIChatClient;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion endpoint answered {status}: {body}")]
    Status {
        status: StatusCode,
        body: String,
    },
    #[error("completion endpoint reported an error: {0}")]
    Endpoint(String),
    #[error("malformed completion chunk: {0}")]
    Malformed(String),
}

/// Text fragments of one reply, in arrival order. Ends when the endpoint
/// closes the stream; an `Err` item is always the last one.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, CompletionError>> + Send>>;

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Sends the whole `messages` history and resolves once the response
    /// headers are in. Fragments are then pulled from the returned stream.
    async fn stream_chat(
        &self,
        model: &str,
        messages: &[Turn]
    ) -> Result<FragmentStream, CompletionError>;
}

pub fn new_client(
    config: &LlmConfig
) -> Result<Arc<dyn ChatClient>, Box<dyn StdError + Send + Sync>> {
    let client = OpenAIChatClient::from_config(config)?;
    Ok(Arc::new(client))
}

/// What one line of an event stream means for the reply.
#[derive(Debug, PartialEq, Eq)]
pub enum LineEvent {
    Fragment(String),
    Done,
    Skip,
}

/// Reassembles newline-terminated lines from arbitrarily split body chunks.
/// Bytes are held until the newline arrives, so multi-byte characters split
/// across chunks survive.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, CompletionError> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(decode_line(&raw[..raw.len() - 1])?);
        }
        Ok(lines)
    }

    /// The unterminated tail left when the body ends, if any.
    pub fn finish(self) -> Result<Option<String>, CompletionError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        decode_line(&self.pending).map(Some)
    }
}

fn decode_line(raw: &[u8]) -> Result<String, CompletionError> {
    let line = std::str::from_utf8(raw).map_err(|e|
        CompletionError::Malformed(format!("invalid UTF-8 in stream: {}", e))
    )?;
    Ok(line.trim_end_matches('\r').to_string())
}

/// POSTs `payload` to `url` and returns the parsed body as a fragment stream.
///
/// The request is sent and its status checked before returning; the body is
/// then read by a spawned task that forwards whatever `line_parser` extracts
/// through a bounded channel. Dropping the stream stops the task right away,
/// even while it waits on a silent endpoint, which drops the response and
/// releases the connection.
pub async fn http_stream_generate(
    http: &HttpClient,
    url: &str,
    payload: impl serde::Serialize,
    line_parser: fn(&str) -> Result<LineEvent, CompletionError>,
) -> Result<FragmentStream, CompletionError> {
    let resp = http.post(url).json(&payload).send().await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(CompletionError::Status { status, body });
    }

    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let mut bytes = resp.bytes_stream();
        let mut lines = LineBuffer::default();

        loop {
            let chunk = tokio::select! {
                _ = tx.closed() => {
                    debug!("Reply dropped, closing completion stream");
                    return;
                }
                chunk = bytes.next() => match chunk {
                    Some(chunk) => chunk,
                    None => break,
                },
            };
            let complete = match chunk.map_err(CompletionError::from).and_then(|buf| lines.push(&buf)) {
                Ok(complete) => complete,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };
            for line in complete {
                if !forward_line(&tx, &line, line_parser).await {
                    return;
                }
            }
        }

        match lines.finish() {
            Ok(Some(tail)) => {
                forward_line(&tx, &tail, line_parser).await;
            }
            Ok(None) => {}
            Err(e) => {
                let _ = tx.send(Err(e)).await;
            }
        }
    });

    Ok(Box::pin(ReceiverStream::new(rx)))
}

/// Returns `false` once the stream is finished, failed, or nobody is listening.
async fn forward_line(
    tx: &mpsc::Sender<Result<String, CompletionError>>,
    line: &str,
    line_parser: fn(&str) -> Result<LineEvent, CompletionError>
) -> bool {
    match line_parser(line) {
        Ok(LineEvent::Fragment(text)) => tx.send(Ok(text)).await.is_ok(),
        Ok(LineEvent::Skip) => true,
        Ok(LineEvent::Done) => {
            debug!("Completion stream signalled end of reply");
            false
        }
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_lines_split_across_chunks() {
        let mut buf = LineBuffer::default();
        assert!(buf.push(b"data: {\"a\"").unwrap().is_empty());
        let lines = buf.push(b":1}\r\n\ndata: [DO").unwrap();
        assert_eq!(lines, vec!["data: {\"a\":1}".to_string(), String::new()]);
        assert_eq!(buf.push(b"NE]\n").unwrap(), vec!["data: [DONE]".to_string()]);
        assert_eq!(buf.finish().unwrap(), None);
    }

    #[test]
    fn keeps_multibyte_characters_split_across_chunks() {
        let text = "héllo\n".as_bytes();
        let mut buf = LineBuffer::default();
        assert!(buf.push(&text[..2]).unwrap().is_empty());
        assert_eq!(buf.push(&text[2..]).unwrap(), vec!["héllo".to_string()]);
    }

    #[test]
    fn unterminated_tail_is_returned_on_finish() {
        let mut buf = LineBuffer::default();
        assert!(buf.push(b"data: tail").unwrap().is_empty());
        assert_eq!(buf.finish().unwrap().as_deref(), Some("data: tail"));
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        let mut buf = LineBuffer::default();
        let err = buf.push(&[0xff, 0xfe, b'\n']).unwrap_err();
        assert!(matches!(err, CompletionError::Malformed(_)));
    }
}
