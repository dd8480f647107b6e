//! Provider identification.

/// Supported generation providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    Ollama,
    Claude,
}

impl ProviderType {
    /// Parse provider type from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            "claude" | "anthropic" => Some(Self::Claude),
            _ => None,
        }
    }

    /// Get the canonical provider name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::Claude => "claude",
        }
    }

    /// Whether the provider needs an API key.
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::Claude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_type_parsing() {
        assert_eq!(ProviderType::parse("ollama"), Some(ProviderType::Ollama));
        assert_eq!(ProviderType::parse("Claude"), Some(ProviderType::Claude));
        assert_eq!(ProviderType::parse("anthropic"), Some(ProviderType::Claude));
        assert_eq!(ProviderType::parse("openai"), None);
    }

    #[test]
    fn test_api_key_requirement() {
        assert!(ProviderType::Claude.requires_api_key());
        assert!(!ProviderType::Ollama.requires_api_key());
    }
}
