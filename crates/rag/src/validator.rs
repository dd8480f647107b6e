//! Post-generation checks for unsupported claims.
//!
//! Quantities, amounts and item names that do not occur verbatim in the
//! validated documents only produce warnings; the answer text is left
//! alone. Hedging phrases are always stripped.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::config::ValidationConfig;
use crate::keywords::matched_keywords;
use crate::types::{ValidatedDocument, ValidationWarning};

/// Point, coin, currency and count amounts.
static AMOUNT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\d[\d,]*(?:\.\d+)?\s*(?:points?|coins?|mesos?|nx|maple points|포인트|코인|메소|억|만|개|회)",
    )
    .ok()
});

/// Bare numbers, including percentages.
static QUANTITY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\d[\d,]*(?:\.\d+)?%?").ok());

/// Bracketed or quoted names, and capitalised item phrases.
static NAMES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\[([^\]\n]{2,40})\]",
        r"「([^」\n]{2,40})」",
        r"『([^』\n]{2,40})』",
        r#""([^"\n]{2,40})""#,
        r"\b((?:[A-Z][\w']+\s+){1,3}(?:Cube|Belt|Ring|Pendant|Emblem|Badge|Symbol|Potion|Scroll|Weapon|Coin)s?)\b",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

static HEDGE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:approximately|roughly|usually|generally|typically|probably|possibly|perhaps|several|it seems that|i think)\b,?|(?:대략|아마도|아마|일반적으로|어쩌면)",
    )
    .ok()
});

/// Punctuation that closes up against the word before a removed hedge.
const CLOSING_PUNCT: &[char] = &[',', '.', '!', '?', ':', ';'];

/// Validated answer text and the findings that accompany it.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub text: String,
    pub warnings: Vec<ValidationWarning>,
}

#[derive(Debug, Clone)]
pub struct ResponseValidator {
    enabled: bool,
}

impl ResponseValidator {
    pub fn new(config: &ValidationConfig) -> Self {
        Self {
            enabled: config.enabled,
        }
    }

    pub fn validate(
        &self,
        answer: &str,
        query_keywords: &[String],
        documents: &[ValidatedDocument],
    ) -> ValidationOutcome {
        if !self.enabled {
            return ValidationOutcome {
                text: answer.to_string(),
                warnings: Vec::new(),
            };
        }

        let haystack = evidence(documents);
        let mut warnings = unverified_claims(answer, &haystack);

        let (text, hedges) = strip_hedges(answer);
        warnings.extend(hedges);

        if !query_keywords.is_empty() && matched_keywords(&text.to_lowercase(), query_keywords) == 0 {
            warnings.push(ValidationWarning::NoKeywordOverlap);
        }

        for warning in &warnings {
            tracing::warn!("Answer validation: {}", warning);
        }

        ValidationOutcome { text, warnings }
    }
}

/// Lower-cased content and metadata of every validated document.
fn evidence(documents: &[ValidatedDocument]) -> String {
    let mut haystack = String::new();
    for validated in documents {
        haystack.push_str(&validated.document.content);
        haystack.push('\n');
        for value in validated.document.metadata.text_values() {
            haystack.push_str(value);
            haystack.push('\n');
        }
    }
    haystack.to_lowercase()
}

fn unverified_claims(answer: &str, haystack: &str) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let mut seen = HashSet::new();
    let mut unverified = |text: &str| {
        let text = text.trim();
        !text.is_empty() && !haystack.contains(&text.to_lowercase()) && seen.insert(text.to_string())
    };

    let mut amount_spans = Vec::new();
    if let Some(re) = AMOUNT.as_ref() {
        for m in re.find_iter(answer) {
            amount_spans.push(m.range());
            if unverified(m.as_str()) {
                warnings.push(ValidationWarning::UnverifiedAmount {
                    text: m.as_str().trim().to_string(),
                });
            }
        }
    }

    if let Some(re) = QUANTITY.as_ref() {
        for m in re.find_iter(answer) {
            let inside_amount = amount_spans
                .iter()
                .any(|span| span.start <= m.start() && m.end() <= span.end);
            if !inside_amount && unverified(m.as_str()) {
                warnings.push(ValidationWarning::UnverifiedQuantity {
                    text: m.as_str().to_string(),
                });
            }
        }
    }

    for re in NAMES.iter() {
        for captures in re.captures_iter(answer) {
            if let Some(name) = captures.get(1) {
                if unverified(name.as_str()) {
                    warnings.push(ValidationWarning::UnverifiedName {
                        text: name.as_str().trim().to_string(),
                    });
                }
            }
        }
    }

    warnings
}

/// Remove hedging phrases.
///
/// Only the blanks next to each removed phrase are touched; indentation,
/// list nesting and code blocks elsewhere keep their layout.
fn strip_hedges(answer: &str) -> (String, Vec<ValidationWarning>) {
    let Some(hedge) = HEDGE.as_ref() else {
        return (answer.to_string(), Vec::new());
    };

    let mut text = String::with_capacity(answer.len());
    let mut warnings = Vec::new();
    let mut last = 0;

    for m in hedge.find_iter(answer) {
        if m.start() < last {
            continue;
        }
        warnings.push(ValidationWarning::HedgeRemoved {
            text: m.as_str().trim_end_matches(',').to_string(),
        });

        text.push_str(&answer[last..m.start()]);
        let rest = &answer[m.end()..];
        let blanks = rest.len() - rest.trim_start_matches([' ', '\t']).len();
        let next = rest[blanks..].chars().next();

        let line = &text[text.rfind('\n').map_or(0, |i| i + 1)..];
        let ends_with_blank = text.ends_with([' ', '\t']);
        last = m.end();

        if line.trim().is_empty() {
            // Line start: keep the indentation, drop the gap after the hedge.
            last += blanks;
        } else if next.is_none_or(|c| c == '\n' || c == '\r' || CLOSING_PUNCT.contains(&c)) {
            text.truncate(text.trim_end_matches([' ', '\t']).len());
            last += blanks;
        } else if ends_with_blank {
            last += blanks;
        }
    }
    text.push_str(&answer[last..]);

    (text, warnings)
}
