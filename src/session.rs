//! Conversation state for one interactive user.
//!
//! A [`ConversationSession`] owns the transcript and moves between
//! [`SessionState::Idle`] and [`SessionState::Streaming`]. Each
//! [`ConversationSession::submit`] appends the user turn, resends the whole
//! transcript to the completion endpoint and hands back a [`Reply`] stream.
//! The assistant turn is committed only when that stream ends cleanly; a
//! failed or abandoned reply leaves just the user turn behind.

use futures::{ Stream, StreamExt };
use log::{ debug, info, warn };
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ Context, Poll };
use thiserror::Error;
use uuid::Uuid;

use crate::llm::chat::{ ChatClient, CompletionError, FragmentStream };
use crate::models::chat::{ Transcript, Turn };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no model selected")]
    EmptyModel,
    /// A previous reply was never finished or dropped.
    #[error("a reply is already streaming in this session")]
    InvalidState,
    #[error(transparent)]
    Completion(#[from] CompletionError),
}

pub struct ConversationSession {
    id: Uuid,
    client: Arc<dyn ChatClient>,
    transcript: Transcript,
    state: SessionState,
}

impl ConversationSession {
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        let id = Uuid::new_v4();
        debug!("Session {} created", id);
        Self {
            id,
            client,
            transcript: Vec::new(),
            state: SessionState::Idle,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    /// Owned copy of the transcript as it stands now.
    pub fn snapshot(&self) -> Transcript {
        self.transcript.clone()
    }

    pub fn len(&self) -> usize {
        self.transcript.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transcript.is_empty()
    }

    /// Appends `prompt` as a user turn and starts streaming the reply from
    /// `model`, with the entire transcript as context.
    ///
    /// Resolves once the endpoint has accepted the request. If it does not, or
    /// the returned future is dropped first, the user turn stays in the
    /// transcript and the session is idle again.
    pub async fn submit(&mut self, prompt: &str, model: &str) -> Result<Reply<'_>, SessionError> {
        if model.trim().is_empty() {
            return Err(SessionError::EmptyModel);
        }
        if self.state == SessionState::Streaming {
            return Err(SessionError::InvalidState);
        }

        self.transcript.push(Turn::user(prompt));
        info!(
            "Session {}: submitting {} turn(s) to model {}",
            self.id,
            self.transcript.len(),
            model
        );

        // Resets to Idle if this future is dropped while the request is pending.
        let guard = StreamingGuard::new(self.id, &mut self.state);
        let started = self.client.stream_chat(model, &self.transcript).await;
        match started {
            Ok(stream) => {
                guard.disarm();
                Ok(Reply {
                    session: self,
                    stream: Some(stream),
                    buffer: String::new(),
                })
            }
            Err(e) => {
                drop(guard);
                warn!("Session {}: completion request failed: {}", self.id, e);
                Err(e.into())
            }
        }
    }
}

/// Holds the session in [`SessionState::Streaming`] while a request is being
/// started and puts it back to `Idle` when dropped, unless disarmed.
struct StreamingGuard<'a> {
    id: Uuid,
    state: &'a mut SessionState,
    armed: bool,
}

impl<'a> StreamingGuard<'a> {
    fn new(id: Uuid, state: &'a mut SessionState) -> Self {
        *state = SessionState::Streaming;
        Self { id, state, armed: true }
    }

    /// The state now belongs to the [`Reply`].
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StreamingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!("Session {}: request not started, back to idle", self.id);
            *self.state = SessionState::Idle;
        }
    }
}

/// The streamed answer to one [`ConversationSession::submit`].
///
/// Yields fragments as they arrive. An `Err` item ends the stream. Dropping
/// the reply early closes the connection and commits nothing.
pub struct Reply<'a> {
    session: &'a mut ConversationSession,
    stream: Option<FragmentStream>,
    buffer: String,
}

impl Reply<'_> {
    /// Text received so far.
    pub fn received(&self) -> &str {
        &self.buffer
    }

    /// Drains the rest of the reply and returns the text of the fragments it
    /// yielded, or the first error.
    pub async fn collect_text(mut self) -> Result<String, CompletionError> {
        let mut text = String::new();
        while let Some(fragment) = self.next().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }
}

impl Stream for Reply<'_> {
    type Item = Result<String, CompletionError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let stream = match this.stream.as_mut() {
            Some(stream) => stream,
            None => return Poll::Ready(None),
        };

        match stream.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(fragment))) => {
                this.buffer.push_str(&fragment);
                Poll::Ready(Some(Ok(fragment)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.stream = None;
                warn!(
                    "Session {}: reply failed after {} byte(s), discarding partial reply: {}",
                    this.session.id,
                    this.buffer.len(),
                    e
                );
                // TODO: decide whether a partial reply should be kept in the
                // transcript; front ends already show it to the user.
                this.buffer.clear();
                this.session.state = SessionState::Idle;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.stream = None;
                let content = mem::take(&mut this.buffer);
                debug!("Session {}: reply complete ({} byte(s))", this.session.id, content.len());
                this.session.transcript.push(Turn::assistant(content));
                this.session.state = SessionState::Idle;
                Poll::Ready(None)
            }
        }
    }
}

impl Drop for Reply<'_> {
    fn drop(&mut self) {
        if self.stream.take().is_some() {
            debug!("Session {}: reply abandoned before completion", self.session.id);
            self.session.state = SessionState::Idle;
        }
    }
}
