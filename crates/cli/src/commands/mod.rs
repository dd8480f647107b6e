//! Command handlers for the Questline CLI.

pub mod ask;
pub mod chat;
pub mod sources;

pub use ask::AskCommand;
pub use chat::ChatCommand;
pub use sources::SourcesCommand;
