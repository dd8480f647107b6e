//! Sources command handler.
//!
//! Shows the citations a knowledge-base document yields, for checking
//! front matter before ingestion.

use clap::Args;
use questline_core::AppResult;
use questline_rag::citations::citations_for;
use questline_rag::{format_reference_block, parse_front_matter_sources, Document, DocumentMetadata};
use std::path::PathBuf;

/// Show the citations parsed from a markdown document
#[derive(Args, Debug)]
pub struct SourcesCommand {
    /// Markdown document to inspect
    pub file: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SourcesCommand {
    /// Execute the sources command.
    pub async fn execute(&self) -> AppResult<()> {
        let content = tokio::fs::read_to_string(&self.file).await?;
        let path = self.file.display().to_string();
        tracing::debug!("Inspecting sources of {}", path);

        let entries = parse_front_matter_sources(&content);
        let document = Document::new(path.clone(), content).with_metadata(DocumentMetadata {
            source: Some(path),
            ..Default::default()
        });
        let citations = citations_for(&document, 1.0);
        let block = format_reference_block(&citations);

        if self.json {
            let output = serde_json::json!({
                "sources": entries,
                "citations": citations,
                "referenceBlock": block,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }

        if entries.is_empty() {
            println!("No front-matter sources.");
        }
        for (i, entry) in entries.iter().enumerate() {
            println!(
                "{}. {} - {} : {}",
                i + 1,
                entry.creator.as_deref().unwrap_or("-"),
                entry.title.as_deref().unwrap_or("-"),
                entry.url.as_deref().unwrap_or("-")
            );
        }

        println!();
        match block {
            Some(block) => print!("{}", block),
            None => println!("No citation has a displayable URL."),
        }

        Ok(())
    }
}
