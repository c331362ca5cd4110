//! Entity extraction feeding the cold tier's relation index.

use regex::Regex;

/// Abstract entity extraction backend.
pub trait EntityExtractor: Send + Sync {
    /// Extract entity strings from text, in order of first appearance.
    fn extract(&self, text: &str) -> Vec<String>;
}

/// Returns no entities; for testing.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubEntityExtractor;

impl EntityExtractor for StubEntityExtractor {
    fn extract(&self, _text: &str) -> Vec<String> {
        Vec::new()
    }
}

/// Pattern-based extraction: function names, class names, URLs, file paths.
pub struct RegexEntityExtractor {
    patterns: Vec<Regex>,
}

impl Default for RegexEntityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl RegexEntityExtractor {
    /// Build the extractor with the built-in pattern set.
    pub fn new() -> Self {
        let raw = [
            r"\bdef\s+(\w+)",
            r"\bclass\s+(\w+)",
            r"\bfn\s+(\w+)",
            r"(https?://\S+)",
            r"(/[\w/.-]+\.\w+)",
        ];
        Self {
            patterns: raw.iter().filter_map(|p| Regex::new(p).ok()).collect(),
        }
    }
}

impl EntityExtractor for RegexEntityExtractor {
    fn extract(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        let mut entities: Vec<String> = Vec::new();
        for pattern in &self.patterns {
            for captures in pattern.captures_iter(text) {
                let entity = captures
                    .get(1)
                    .or_else(|| captures.get(0))
                    .map(|m| m.as_str().to_owned());
                if let Some(entity) = entity {
                    if !entities.contains(&entity) {
                        entities.push(entity);
                    }
                }
            }
        }
        entities
    }
}
