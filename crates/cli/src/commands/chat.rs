//! Interactive chat command handler.

use clap::Args;
use questline_core::AppResult;
use questline_rag::{ChatRequest, ChatService};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::ask::{stream_answer, user_facing};

/// Chat interactively (/clear resets the session, /exit quits)
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Continue an existing session
    #[arg(short, long)]
    pub session: Option<String>,

    /// Wait for full answers instead of streaming them
    #[arg(long)]
    pub no_stream: bool,
}

enum Input {
    Exit,
    Clear,
    Skip,
    Question(String),
}

fn parse_input(line: &str) -> Input {
    match line.trim() {
        "/exit" | "/quit" => Input::Exit,
        "/clear" => Input::Clear,
        "" => Input::Skip,
        question => Input::Question(question.to_string()),
    }
}

impl ChatCommand {
    /// Execute the chat command.
    pub async fn execute(&self, service: Arc<ChatService>) -> AppResult<()> {
        tracing::info!("Starting interactive chat");

        let mut session_id = self.session.clone();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            eprint!("> ");
            std::io::stderr().flush().ok();

            let Some(line) = lines.next_line().await? else {
                break;
            };

            match parse_input(&line) {
                Input::Exit => break,
                Input::Skip => continue,
                Input::Clear => {
                    let had_history = match session_id {
                        Some(ref id) => {
                            let had_history = !service.sessions().history(id).await.is_empty();
                            service.clear_session(id).await && had_history
                        }
                        None => false,
                    };
                    if had_history {
                        eprintln!("Conversation history cleared.");
                    } else {
                        eprintln!("There is no conversation to clear.");
                    }
                }
                Input::Question(question) => {
                    let mut request = ChatRequest::new(question);
                    if let Some(ref id) = session_id {
                        request = request.with_session(id.clone());
                    }

                    let result = if self.no_stream {
                        service.chat(request).await.map(|response| {
                            println!("{}", response.answer);
                            response
                        })
                    } else {
                        stream_answer(&service, request).await
                    };

                    match result {
                        Ok(response) => session_id = Some(response.session_id),
                        Err(e) => {
                            tracing::error!("Chat turn failed: {}", e);
                            eprintln!("{}", user_facing(&e));
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input() {
        assert!(matches!(parse_input("/exit"), Input::Exit));
        assert!(matches!(parse_input(" /quit \n"), Input::Exit));
        assert!(matches!(parse_input("/clear"), Input::Clear));
        assert!(matches!(parse_input("   "), Input::Skip));
        assert!(matches!(parse_input(" cube price? "), Input::Question(q) if q == "cube price?"));
    }
}
