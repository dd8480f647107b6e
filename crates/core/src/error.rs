//! Error types for Questline.
//!
//! One enum covers every failure category of the answer pipeline and its
//! surroundings. Only `Retrieval` and `Generation` interrupt a chat request;
//! the pipeline degrades every other soft failure to a documented fallback.

use thiserror::Error;

/// Unified error type for Questline.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors (transport, HTTP status, malformed payloads)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Rejected before any external call (empty or oversized query)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Vector store unreachable or returned an error
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Answer generation failed
    #[error("Generation error: {0}")]
    Generation(String),

    /// Prompt definition and rendering errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Text safe to show an end user.
    ///
    /// Never includes the underlying error string; internal detail belongs in
    /// the logs.
    pub fn user_message(&self) -> String {
        match self {
            AppError::InvalidInput(reason) => format!("Your question could not be processed: {}", reason),
            AppError::Retrieval(_) => {
                "The knowledge base is temporarily unavailable. Please try again later.".to_string()
            }
            AppError::Generation(_) | AppError::Llm(_) => {
                "The answer could not be generated right now. Please try again later.".to_string()
            }
            _ => "Something went wrong while answering your question.".to_string(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_hides_internal_detail() {
        let err = AppError::Retrieval("connection refused at 10.0.0.3:6333".to_string());
        let msg = err.user_message();
        assert!(!msg.contains("10.0.0.3"));
        assert!(msg.contains("temporarily unavailable"));

        let err = AppError::Generation("HTTP 529 overloaded".to_string());
        assert!(!err.user_message().contains("529"));
    }

    #[test]
    fn test_invalid_input_message_keeps_reason() {
        let err = AppError::InvalidInput("question is empty".to_string());
        assert!(err.user_message().contains("question is empty"));
    }

    #[test]
    fn test_from_serde_json() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: AppError = parse.unwrap_err().into();
        assert!(matches!(err, AppError::Serialization(_)));
    }
}
