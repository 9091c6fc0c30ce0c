use futures::StreamExt;
use log::info;
use std::error::Error;
use tokio::io::{ AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt };

use crate::backend::{ Backend, CatalogStatus };
use crate::models::chat::Role;

const PROMPT: &str = "> ";

/// Terminal chat over `input`/`output`. Lines starting with `/` are commands:
/// `/transcript` prints the conversation so far, `/quit` leaves.
pub async fn run_repl<R, W>(
    backend: &Backend,
    model: Option<String>,
    input: R,
    mut output: W
) -> Result<(), Box<dyn Error + Send + Sync>>
    where R: AsyncBufRead + Unpin, W: AsyncWrite + Unpin
{
    let status = backend.catalog_status().await;
    if let Some(warning) = status.warning() {
        output.write_all(format!("warning: {}\n", warning).as_bytes()).await?;
    }
    if let CatalogStatus::Ready(models) = &status {
        output.write_all(format!("Available models: {}\n", models.join(", ")).as_bytes()).await?;
    }

    let model = match model.or_else(|| status.models().first().cloned()) {
        Some(model) => model,
        None => {
            output.write_all(b"No model to chat with. Pull one with `ollama pull <name>` or pass --model.\n").await?;
            output.flush().await?;
            return Ok(());
        }
    };
    output.write_all(format!("Chatting with {}. /transcript shows the history, /quit exits.\n", model).as_bytes()).await?;

    let mut session = backend.new_session();
    let mut lines = input.lines();

    loop {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;

        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break,
        };
        let prompt = line.trim();

        match prompt {
            "" => continue,
            "/quit" => break,
            "/transcript" => {
                for turn in session.transcript() {
                    let who = match turn.role {
                        Role::User => "you",
                        Role::Assistant => "model",
                    };
                    output.write_all(format!("[{}] {}\n", who, turn.content).as_bytes()).await?;
                }
                continue;
            }
            _ => {}
        }

        let mut reply = match session.submit(prompt, &model).await {
            Ok(reply) => reply,
            Err(e) => {
                output.write_all(format!("error: {}\n", e).as_bytes()).await?;
                continue;
            }
        };

        while let Some(chunk) = reply.next().await {
            match chunk {
                Ok(fragment) => {
                    output.write_all(fragment.as_bytes()).await?;
                    output.flush().await?;
                }
                Err(e) => {
                    output.write_all(format!("\nerror: {}", e).as_bytes()).await?;
                    break;
                }
            }
        }
        output.write_all(b"\n").await?;
    }

    output.flush().await?;
    info!("REPL session {} ended with {} turn(s)", session.id(), session.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::{ Arc, Mutex };
    use crate::llm::catalog::{ CatalogError, ModelCatalog };
    use crate::llm::chat::{ ChatClient, CompletionError, FragmentStream };
    use crate::models::chat::{ ModelName, Turn };

    struct FixedCatalog(Vec<ModelName>);

    #[async_trait]
    impl ModelCatalog for FixedCatalog {
        async fn list_models(&self) -> Result<Vec<ModelName>, CatalogError> {
            Ok(self.0.clone())
        }
    }

    /// Replies with the prompt reversed, split in two fragments, and records
    /// which model each request went to.
    #[derive(Default)]
    struct EchoClient {
        models: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatClient for EchoClient {
        async fn stream_chat(
            &self,
            model: &str,
            messages: &[Turn]
        ) -> Result<FragmentStream, CompletionError> {
            self.models.lock().unwrap().push(model.to_string());
            let last = messages.last().map(|t| t.content.clone()).unwrap_or_default();
            if last == "fail" {
                return Ok(Box::pin(stream::iter(vec![
                    Ok("par".to_string()),
                    Err(CompletionError::Endpoint("overloaded".into())),
                ])));
            }
            let reversed: String = last.chars().rev().collect();
            let (a, b) = reversed.split_at(reversed.len() / 2);
            Ok(Box::pin(stream::iter(vec![Ok(a.to_string()), Ok(b.to_string())])))
        }
    }

    async fn run(models: &[&str], model: Option<&str>, input: &str) -> (String, Arc<EchoClient>) {
        let client = Arc::new(EchoClient::default());
        let catalog = FixedCatalog(models.iter().map(|m| m.to_string()).collect());
        let backend = Backend::new(Arc::new(catalog), client.clone());
        let mut out = Vec::new();
        run_repl(&backend, model.map(str::to_string), input.as_bytes(), &mut out).await.unwrap();
        (String::from_utf8(out).unwrap(), client)
    }

    #[tokio::test]
    async fn streams_replies_and_prints_transcript() {
        let (out, client) = run(&["llama3", "mistral"], None, "abcd\n/transcript\n/quit\nignored\n").await;

        assert!(out.contains("Available models: llama3, mistral"));
        assert!(out.contains("> dcba\n"));
        assert!(out.contains("[you] abcd\n[model] dcba\n"));
        assert!(!out.contains("ignored"));
        assert_eq!(*client.models.lock().unwrap(), vec!["llama3"]);
    }

    #[tokio::test]
    async fn explicit_model_wins_over_catalog() {
        let (_, client) = run(&["llama3"], Some("mistral"), "hi\n").await;
        assert_eq!(*client.models.lock().unwrap(), vec!["mistral"]);
    }

    #[tokio::test]
    async fn failed_reply_is_reported_and_not_committed() {
        let (out, _) = run(&["llama3"], None, "fail\n/transcript\n").await;

        assert!(out.contains("par\nerror: completion endpoint reported an error: overloaded\n"));
        assert!(out.contains("[you] fail\n"));
        assert!(!out.contains("[model]"));
    }

    #[tokio::test]
    async fn empty_catalog_without_model_stops_early() {
        let (out, client) = run(&[], None, "hi\n").await;

        assert!(out.contains("warning: You have not pulled any model from Ollama yet!"));
        assert!(out.contains("No model to chat with"));
        assert!(client.models.lock().unwrap().is_empty());
    }
}
