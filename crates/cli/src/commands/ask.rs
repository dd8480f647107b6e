//! Ask command handler.
//!
//! Sends one question through the answer pipeline and prints the answer.

use clap::Args;
use questline_core::{AppError, AppResult};
use questline_rag::{ChatEvent, ChatRequest, ChatResponse, ChatService};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

/// Ask a single question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// Continue an existing session
    #[arg(short, long)]
    pub session: Option<String>,

    /// Wait for the full answer instead of streaming it
    #[arg(long)]
    pub no_stream: bool,

    /// Output the full response as JSON (implies --no-stream)
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, service: Arc<ChatService>) -> AppResult<()> {
        tracing::info!("Executing ask command");

        let question = self.question()?;
        let mut request = ChatRequest::new(question);
        if let Some(ref session) = self.session {
            request = request.with_session(session.clone());
        }

        if self.json {
            let response = service.chat(request).await?;
            let json = serde_json::to_string_pretty(&response)?;
            println!("{}", json);
            return Ok(());
        }

        if self.no_stream {
            let response = service.chat(request).await?;
            println!("{}", response.answer);
            log_summary(&response);
            return Ok(());
        }

        stream_answer(&service, request).await.map(|_| ())
    }

    fn question(&self) -> AppResult<String> {
        if let Some(ref question) = self.question {
            return Ok(question.clone());
        }
        match self.file {
            Some(ref path) => Ok(std::fs::read_to_string(path)?),
            None => Err(AppError::InvalidInput("no question given".to_string())),
        }
    }
}

/// Stream an answer to stdout.
///
/// Ctrl-C cancels the request and drains it to its terminal event.
pub async fn stream_answer(service: &Arc<ChatService>, request: ChatRequest) -> AppResult<ChatResponse> {
    let mut stream = service.chat_stream(request)?;
    tracing::debug!(session_id = stream.session_id(), "Streaming answer");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let event = tokio::select! {
            event = stream.next_event() => event,
            _ = &mut ctrl_c => {
                stream.cancel_and_drain().await;
                println!();
                return Err(AppError::Other("Cancelled".to_string()));
            }
        };

        match event {
            Some(ChatEvent::Fragment(text)) => {
                print!("{}", text);
                std::io::stdout().flush().ok();
            }
            Some(ChatEvent::Done(response)) => {
                println!();
                log_summary(&response);
                return Ok(*response);
            }
            Some(ChatEvent::Error(message)) => {
                println!();
                return Err(AppError::Other(message));
            }
            Some(ChatEvent::Cancelled) | None => {
                println!();
                return Err(AppError::Other("Cancelled".to_string()));
            }
        }
    }
}

/// Text to show the user for a failed command.
///
/// `Other` carries messages that are already user-facing (stream errors,
/// cancellation).
pub fn user_facing(error: &AppError) -> String {
    match error {
        AppError::Other(message) => message.clone(),
        other => other.user_message(),
    }
}

fn log_summary(response: &ChatResponse) {
    let metadata = &response.metadata;
    tracing::info!(
        session_id = %response.session_id,
        sources = metadata.sources_count,
        fallback = response.fallback,
        "Answered"
    );
    tracing::debug!(
        "Token usage - Prompt: {}, Completion: {}, Total: {}",
        metadata.token_usage.prompt_tokens,
        metadata.token_usage.completion_tokens,
        metadata.token_usage.total_tokens
    );
    for warning in &metadata.warnings {
        tracing::debug!("Validation warning: {}", warning);
    }
}
