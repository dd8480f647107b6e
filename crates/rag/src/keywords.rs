//! Query keyword extraction and string similarity.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Domain phrasings tried before the generic token rule, so that multi-word
/// game terms ("hard lucid", "arcane symbol shop") survive as one keyword.
static DOMAIN_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // <term> boss / skill / cube / coin / point / event / class
        r"(?i)\b\p{L}[\p{L}\p{N}]*\s+(?:boss|skill|cube|coin|point|event|class)(?:es|s)?\b",
        r"[\p{L}\p{N}]+(?:보스|스킬|큐브|코인|포인트|이벤트|클래스|직업)",
        // difficulty + <name>
        r"(?i)\b(?:hard|easy|normal|hell|chaos|extreme)\s+[\p{L}\p{N}]+",
        r"(?:하드|이지|노말|헬|카오스|익스트림)\s*[\p{L}\p{N}]+",
        // shops
        r"(?i)\b\p{L}[\p{L}\p{N}]*\s+(?:shop|store)\b",
        r"[\p{L}\p{N}]+\s*(?:상점|샵)",
        // point / coin thresholds
        r"(?i)\d[\d,]*\s*(?:points?|coins?|포인트|코인)",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

static TOKEN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]{2,}").ok());

const STOPWORDS: &[&str] = &[
    "the", "is", "at", "on", "an", "as", "are", "was", "were", "for", "to", "of", "in", "and",
    "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "it", "its", "what",
    "how", "when", "where", "which", "who", "why", "do", "does", "can", "me", "my", "about",
    "tell", "please", "there", "any", "어떻게", "무엇", "뭐야", "알려줘", "있어", "있나요",
];

/// Extract up to `max` keywords from text.
///
/// Lower-cased, de-duplicated in first-seen order; domain matches come
/// before generic tokens.
pub fn extract_keywords(text: &str, max: usize) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut seen = HashSet::new();
    let mut keywords = Vec::new();

    let domain = DOMAIN_PATTERNS
        .iter()
        .flat_map(|re| re.find_iter(&lower).map(|m| m.as_str().to_string()))
        .filter(|phrase| !starts_with_stopword(phrase));

    let generic = TOKEN
        .as_ref()
        .into_iter()
        .flat_map(|re| re.find_iter(&lower).map(|m| m.as_str().to_string()))
        .filter(|token| !STOPWORDS.contains(&token.as_str()));

    for keyword in domain.chain(generic) {
        if keywords.len() >= max {
            break;
        }
        if seen.insert(keyword.clone()) {
            keywords.push(keyword);
        }
    }

    keywords
}

fn starts_with_stopword(phrase: &str) -> bool {
    phrase
        .split_whitespace()
        .next()
        .is_some_and(|first| STOPWORDS.contains(&first))
}

/// Fraction of query keywords that are contained in, or contain, some
/// candidate keyword.
pub fn keyword_overlap(candidates: &[String], query_keywords: &[String]) -> f32 {
    if query_keywords.is_empty() {
        return 0.0;
    }

    let matched = query_keywords
        .iter()
        .filter(|q| {
            candidates
                .iter()
                .any(|c| c.contains(q.as_str()) || q.contains(c.as_str()))
        })
        .count();

    matched as f32 / query_keywords.len() as f32
}

/// Number of query keywords that occur in the (lower-cased) text.
pub fn matched_keywords(text_lower: &str, query_keywords: &[String]) -> usize {
    query_keywords
        .iter()
        .filter(|keyword| text_lower.contains(keyword.as_str()))
        .count()
}

/// Normalised Levenshtein similarity in [0, 1].
pub fn string_similarity(a: &str, b: &str) -> f32 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let max_len = a_chars.len().max(b_chars.len());

    if max_len == 0 {
        return 1.0;
    }

    let distance = levenshtein_distance(&a_chars, &b_chars);
    (1.0 - distance as f32 / max_len as f32).max(0.0)
}

fn levenshtein_distance(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Two-row dynamic programme.
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, a_char) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, b_char) in b.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_phrases_come_first() {
        let keywords = extract_keywords("How do I beat Hard Lucid boss?", 10);
        assert_eq!(keywords[0], "lucid boss");
        assert!(keywords.contains(&"hard lucid".to_string()));
        assert!(keywords.contains(&"beat".to_string()));
        assert!(!keywords.contains(&"how".to_string()));
    }

    #[test]
    fn test_korean_patterns() {
        let keywords = extract_keywords("하드 루시드 보스 보상 알려줘", 10);
        assert!(keywords.contains(&"하드 루시드".to_string()));
        assert!(keywords.contains(&"보상".to_string()));
        assert!(!keywords.contains(&"알려줘".to_string()));
    }

    #[test]
    fn test_point_thresholds() {
        let keywords = extract_keywords("What can I buy with 3,000 points in the coin shop?", 10);
        assert!(keywords.contains(&"3,000 points".to_string()));
        assert!(keywords.contains(&"coin shop".to_string()));
        assert!(!keywords.contains(&"the coin".to_string()));
    }

    #[test]
    fn test_dedupe_and_cap() {
        let keywords = extract_keywords("cube cube cube red cube black cube", 10);
        assert_eq!(
            keywords.iter().filter(|k| k.as_str() == "cube").count(),
            1
        );

        let many = extract_keywords("alpha bravo charlie delta echo foxtrot golf hotel india juliet kilo lima", 10);
        assert_eq!(many.len(), 10);
        assert_eq!(many[0], "alpha");
    }

    #[test]
    fn test_keyword_overlap() {
        let title = vec!["lucid".to_string(), "guide".to_string()];
        let query = vec!["hard lucid".to_string(), "rewards".to_string()];
        assert_eq!(keyword_overlap(&title, &query), 0.5);
        assert_eq!(keyword_overlap(&title, &[]), 0.0);
    }

    #[test]
    fn test_matched_keywords() {
        let query = vec!["cube".to_string(), "price".to_string()];
        assert_eq!(matched_keywords("a red cube costs 1,200 points", &query), 1);
    }

    #[test]
    fn test_string_similarity() {
        assert_eq!(string_similarity("", ""), 1.0);
        assert_eq!(string_similarity("abc", "abc"), 1.0);
        assert_eq!(string_similarity("abc", ""), 0.0);
        assert!((string_similarity("kitten", "sitting") - (1.0 - 3.0 / 7.0)).abs() < 1e-6);
        assert!((string_similarity("보스", "보상") - 0.5).abs() < 1e-6);
    }
}
