//! Citation extraction, de-duplication and formatting.

use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use crate::types::{Citation, Document, SourceEntry, ValidatedDocument};

static MARKDOWN_LINK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").ok());

static URL_LABEL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"URL:\s*`?([^`\s]+)`?").ok());

static HEADING: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,3}\s+(.+?)\s*$").ok());

static SOURCE_FIELD: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*(?:-\s+)?(url|title|creator)\s*:\s*(.*)$").ok());

const REFERENCE_HEADING: &str = "## References";

#[derive(Debug, Default, Deserialize)]
struct FrontMatter {
    #[serde(default)]
    sources: Vec<SourceEntry>,
}

/// Split `---` delimited front matter from the body.
fn split_front_matter(content: &str) -> (Option<&str>, &str) {
    let trimmed = content.trim_start_matches('\u{feff}');
    let Some(rest) = trimmed
        .strip_prefix("---\n")
        .or_else(|| trimmed.strip_prefix("---\r\n"))
    else {
        return (None, content);
    };

    match rest.find("\n---") {
        Some(end) => {
            let body_start = rest[end + 4..]
                .find('\n')
                .map(|offset| end + 4 + offset + 1)
                .unwrap_or(rest.len());
            (Some(&rest[..end]), &rest[body_start..])
        }
        None => (None, content),
    }
}

/// Every `sources:` entry declared in a document's front matter, in order.
///
/// Falls back to a line-based reading when the block is not valid YAML
/// (e.g. titles containing unescaped quotes).
pub fn parse_front_matter_sources(content: &str) -> Vec<SourceEntry> {
    let Some(block) = split_front_matter(content).0 else {
        return Vec::new();
    };

    match serde_yaml::from_str::<FrontMatter>(block) {
        Ok(front_matter) => front_matter.sources,
        Err(e) => {
            tracing::debug!("Front matter is not valid YAML ({}), parsing sources line by line", e);
            parse_sources_lines(block)
        }
    }
}

fn parse_sources_lines(block: &str) -> Vec<SourceEntry> {
    let Some(field) = SOURCE_FIELD.as_ref() else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    let mut in_sources = false;
    let mut current: Option<SourceEntry> = None;

    for line in block.lines() {
        if !in_sources {
            in_sources = line.trim_end() == "sources:";
            continue;
        }

        let starts_entry = line.trim_start().starts_with("- ");
        let indented = line.starts_with(' ') || line.starts_with('\t');
        if !starts_entry && !indented && !line.trim().is_empty() {
            break;
        }

        if starts_entry {
            entries.extend(current.take());
            current = Some(SourceEntry::default());
        }

        let (Some(entry), Some(captures)) = (current.as_mut(), field.captures(line)) else {
            continue;
        };
        let value = unquote(&captures[2]);
        if value.is_empty() {
            continue;
        }
        match &captures[1] {
            "url" => entry.url = Some(value),
            "title" => entry.title = Some(value),
            _ => entry.creator = Some(value),
        }
    }

    entries.extend(current);
    entries
}

/// Strip one layer of matching quotes.
fn unquote(raw: &str) -> String {
    let value = raw.trim();
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Whether a URL is fit for the end-user reference block.
pub fn is_displayable_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://") || url.starts_with("www.")
}

/// Structured `sources` entries of a document: metadata first, else the
/// front matter of its content.
fn structured_sources(document: &Document) -> Vec<SourceEntry> {
    if document.metadata.sources.is_empty() {
        parse_front_matter_sources(&document.content)
    } else {
        document.metadata.sources.clone()
    }
}

/// Derive every citation a document carries.
///
/// A document with structured `sources` yields one citation per entry in
/// declared order; entries repeating an earlier URL are skipped. Otherwise
/// the single citation comes from the fallback chain of [`citation_for`].
pub fn citations_for(document: &Document, relevance: f32) -> Vec<Citation> {
    let entries = structured_sources(document);
    if entries.is_empty() {
        return vec![build_citation(document, None, relevance)];
    }

    let mut urls = HashSet::new();
    entries
        .iter()
        .map(|entry| build_citation(document, Some(entry), relevance))
        .filter(|citation| citation.url.as_ref().is_none_or(|url| urls.insert(url.clone())))
        .collect()
}

/// Derive the primary citation for one document.
///
/// Field priority: first structured `sources` entry, then metadata, then an
/// inline markdown link, then a `URL:` label, and for the title finally the
/// first heading or the file name.
pub fn citation_for(document: &Document, relevance: f32) -> Citation {
    let entries = structured_sources(document);
    build_citation(document, entries.first(), relevance)
}

fn build_citation(document: &Document, structured: Option<&SourceEntry>, relevance: f32) -> Citation {
    let metadata = &document.metadata;
    let (_, body) = split_front_matter(&document.content);

    let url = non_empty(structured.and_then(|s| s.url.as_deref()))
        .or_else(|| non_empty(metadata.url.as_deref()))
        .or_else(|| capture(&MARKDOWN_LINK, body, 2))
        .or_else(|| capture(&URL_LABEL, body, 1));

    let title = non_empty(structured.and_then(|s| s.title.as_deref()))
        .or_else(|| non_empty(metadata.title.as_deref()))
        .or_else(|| capture(&HEADING, body, 1))
        .unwrap_or_else(|| title_from_source(document.source_id()));

    let creator = non_empty(structured.and_then(|s| s.creator.as_deref()))
        .or_else(|| non_empty(metadata.creator.as_deref()))
        .or_else(|| non_empty(metadata.author.as_deref()));

    Citation {
        title,
        creator,
        has_url: url.is_some(),
        url,
        relevance_score: relevance,
        source_id: document.source_id().to_string(),
        chunk_index: metadata.chunk_index,
        category: metadata.category.clone(),
        section: metadata.section.clone(),
    }
}

fn capture(regex: &LazyLock<Option<Regex>>, text: &str, group: usize) -> Option<String> {
    let re = regex.as_ref()?;
    re.captures(text)
        .and_then(|captures| captures.get(group))
        .and_then(|m| non_empty(Some(m.as_str())))
}

fn title_from_source(source_id: &str) -> String {
    let stem = Path::new(source_id)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(source_id);
    stem.replace(['_', '-'], " ")
}

/// Builds the citation list for a set of validated documents.
#[derive(Debug, Clone)]
pub struct SourceExtractor {
    max_reference_sources: usize,
}

impl SourceExtractor {
    pub fn new(max_reference_sources: usize) -> Self {
        Self {
            max_reference_sources,
        }
    }

    /// Documents are de-duplicated by `(source, chunk)`, first occurrence
    /// kept, and each expands into its citations. Best relevance first
    /// (entries of one document keep their declared order), truncated to
    /// the reference limit.
    pub fn extract(&self, documents: &[ValidatedDocument]) -> Vec<Citation> {
        let mut seen = HashSet::new();
        let mut citations: Vec<Citation> = documents
            .iter()
            .filter(|validated| {
                seen.insert((
                    validated.document.source_id().to_string(),
                    validated.document.metadata.chunk_index,
                ))
            })
            .flat_map(|validated| citations_for(&validated.document, validated.relevance))
            .collect();

        citations.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        citations.truncate(self.max_reference_sources);

        tracing::debug!("Extracted {} citations", citations.len());
        citations
    }
}

/// Human-readable reference block, or `None` when no citation has a
/// displayable URL.
pub fn format_reference_block(citations: &[Citation]) -> Option<String> {
    let lines: Vec<String> = citations
        .iter()
        .filter_map(|citation| {
            let url = citation.url.as_deref().filter(|u| is_displayable_url(u))?;
            Some(match citation.creator.as_deref() {
                Some(creator) => format!("* {} - {} : {}", creator, citation.title, url),
                None => format!("* **{}**: {}", citation.title, url),
            })
        })
        .collect();

    if lines.is_empty() {
        return None;
    }

    Some(format!("{}\n{}\n", REFERENCE_HEADING, lines.join("\n")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentMetadata;

    const TWO_SOURCES: &str = r#"---
title: "Summer Event Summary"
category: "game_event_guide"
author: "Doru"
sources:
- url: "https://youtu.be/abc"
  title: "Summer showcase recap"
  creator: "Doru"
- url: "https://www.inven.co.kr/board/maple/5974/5130182"
  title: "Level 260 on day one"
  creator: "RebootGuide"
---

# Summer Event Summary

The event runs for six weeks.
"#;

    fn validated(document: Document, relevance: f32) -> ValidatedDocument {
        ValidatedDocument {
            document,
            relevance,
        }
    }

    #[test]
    fn test_front_matter_sources_in_order() {
        let sources = parse_front_matter_sources(TWO_SOURCES);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].url.as_deref(), Some("https://youtu.be/abc"));
        assert_eq!(sources[0].creator.as_deref(), Some("Doru"));
        assert_eq!(
            sources[1].url.as_deref(),
            Some("https://www.inven.co.kr/board/maple/5974/5130182")
        );
        assert_eq!(sources[1].creator.as_deref(), Some("RebootGuide"));
    }

    #[test]
    fn test_malformed_front_matter_falls_back_to_lines() {
        let content = r#"---
title: "Event"
sources:
- url: "https://youtu.be/x"
  title: ""Is this too generous?" - event recap"
  creator: "Doru"
- url: "https://example.com/b"
  creator: "Other"
---
body
"#;
        let sources = parse_front_matter_sources(content);
        assert_eq!(sources.len(), 2);
        assert_eq!(
            sources[0].title.as_deref(),
            Some(r#""Is this too generous?" - event recap"#)
        );
        assert_eq!(sources[1].url.as_deref(), Some("https://example.com/b"));
        assert!(sources[1].title.is_none());
    }

    #[test]
    fn test_no_front_matter() {
        assert!(parse_front_matter_sources("# Title\nbody").is_empty());
    }

    #[test]
    fn test_citation_uses_first_structured_entry() {
        let citation = citation_for(&Document::new("d1", TWO_SOURCES), 0.8);
        assert_eq!(citation.url.as_deref(), Some("https://youtu.be/abc"));
        assert_eq!(citation.title, "Summer showcase recap");
        assert_eq!(citation.creator.as_deref(), Some("Doru"));
        assert!(citation.has_url);
    }

    #[test]
    fn test_extract_yields_every_structured_entry_in_order() {
        let content = "---\ntitle: Event\nsources:\n- url: \"https://a.example/video\"\n  creator: \"X\"\n- url: \"https://b.example/post\"\n  creator: \"Y\"\n- url: \"https://a.example/video\"\n  creator: \"X\"\n---\nBody";
        let documents = vec![
            validated(Document::new("event.md", content), 0.8),
            validated(Document::new("event.md", content), 0.6),
        ];

        let citations = SourceExtractor::new(3).extract(&documents);
        let pairs: Vec<(Option<&str>, Option<&str>)> = citations
            .iter()
            .map(|c| (c.url.as_deref(), c.creator.as_deref()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (Some("https://a.example/video"), Some("X")),
                (Some("https://b.example/post"), Some("Y")),
            ]
        );
        assert!(citations.iter().all(|c| c.title == "event"));
    }

    #[test]
    fn test_citations_for_without_entries_uses_fallback() {
        let document = Document::new("d", "# Boss Guide\nURL: https://example.com/boss");
        let citations = citations_for(&document, 0.5);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].url.as_deref(), Some("https://example.com/boss"));
    }

    #[test]
    fn test_citation_fallback_chain() {
        let link = Document::new("d", "See [patch notes](https://maplestory.nexon.net/news) now.");
        assert_eq!(
            citation_for(&link, 0.5).url.as_deref(),
            Some("https://maplestory.nexon.net/news")
        );

        let label = Document::new("d", "# Boss Guide\nURL: `https://example.com/boss`");
        let citation = citation_for(&label, 0.5);
        assert_eq!(citation.url.as_deref(), Some("https://example.com/boss"));
        assert_eq!(citation.title, "Boss Guide");

        let bare = Document::new("d", "no heading here").with_metadata(DocumentMetadata {
            source: Some("docs/hard_lucid-guide.md".to_string()),
            author: Some("Kim".to_string()),
            ..Default::default()
        });
        let citation = citation_for(&bare, 0.5);
        assert_eq!(citation.title, "hard lucid guide");
        assert_eq!(citation.creator.as_deref(), Some("Kim"));
        assert!(!citation.has_url);
    }

    #[test]
    fn test_extract_dedupes_sorts_and_truncates() {
        let meta = |source: &str, chunk: u32| DocumentMetadata {
            source: Some(source.to_string()),
            chunk_index: chunk,
            title: Some(format!("{} #{}", source, chunk)),
            ..Default::default()
        };
        let documents = vec![
            validated(Document::new("1", "a").with_metadata(meta("a.md", 0)), 0.4),
            validated(Document::new("2", "a").with_metadata(meta("a.md", 0)), 0.9),
            validated(Document::new("3", "b").with_metadata(meta("b.md", 0)), 0.7),
            validated(Document::new("4", "a").with_metadata(meta("a.md", 1)), 0.5),
            validated(Document::new("5", "c").with_metadata(meta("c.md", 0)), 0.6),
        ];

        let citations = SourceExtractor::new(3).extract(&documents);
        let keys: Vec<(&str, f32)> = citations
            .iter()
            .map(|c| (c.source_id.as_str(), c.relevance_score))
            .collect();
        assert_eq!(keys, vec![("b.md", 0.7), ("c.md", 0.6), ("a.md", 0.5)]);
    }

    #[test]
    fn test_reference_block_only_displayable_urls() {
        let citation = |title: &str, url: Option<&str>, creator: Option<&str>| Citation {
            title: title.to_string(),
            creator: creator.map(str::to_string),
            url: url.map(str::to_string),
            has_url: url.is_some(),
            relevance_score: 0.5,
            source_id: title.to_string(),
            chunk_index: 0,
            category: None,
            section: None,
        };
        let citations = vec![
            citation("Video", Some("https://youtu.be/abc"), Some("Doru")),
            citation("Relative", Some("docs/guide.md"), None),
            citation("Plain", Some("www.example.com"), None),
            citation("Nothing", None, None),
        ];

        let block = format_reference_block(&citations).unwrap();
        assert_eq!(
            block,
            "## References\n* Doru - Video : https://youtu.be/abc\n* **Plain**: www.example.com\n"
        );

        assert!(format_reference_block(&citations[1..2]).is_none());
    }
}
