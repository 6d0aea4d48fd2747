use crate::error::{AppError, Result};
use crate::models::{parse_choice, Genre, StoryLength, Tone, MAX_KEYWORDS_LEN};

const MIN_KEYWORDS_LEN: usize = 3;

/// Validated input for one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    keywords: String,
    pub genre: Genre,
    pub length: StoryLength,
    pub tone: Tone,
}

impl GenerationRequest {
    pub fn new(keywords: &str, genre: Genre, length: StoryLength, tone: Tone) -> Result<Self> {
        let keywords = keywords.trim();
        if keywords.is_empty() {
            return Err(AppError::validation("keywords cannot be empty"));
        }
        let len = keywords.chars().count();
        if len < MIN_KEYWORDS_LEN {
            return Err(AppError::validation(format!(
                "keywords must be at least {} characters long",
                MIN_KEYWORDS_LEN
            )));
        }
        if len > MAX_KEYWORDS_LEN {
            return Err(AppError::validation(format!(
                "keywords must be at most {} characters long",
                MAX_KEYWORDS_LEN
            )));
        }
        Ok(Self {
            keywords: keywords.to_string(),
            genre,
            length,
            tone,
        })
    }

    /// Builds a request from raw strings, as submitted by a form or the CLI.
    pub fn parse(keywords: &str, genre: &str, length: &str, tone: &str) -> Result<Self> {
        Self::new(
            keywords,
            parse_choice("genre", genre)?,
            parse_choice("length", length)?,
            parse_choice("tone", tone)?,
        )
    }

    pub fn keywords(&self) -> &str {
        &self.keywords
    }

    /// The comma-separated keywords, trimmed, empties dropped.
    pub fn keyword_list(&self) -> Vec<&str> {
        self.keywords
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_are_trimmed_and_split() {
        let req = GenerationRequest::parse("  dragon, castle ,, magic ", "fantasy", "short", "happy")
            .unwrap();
        assert_eq!(req.keywords(), "dragon, castle ,, magic");
        assert_eq!(req.keyword_list(), vec!["dragon", "castle", "magic"]);
    }

    #[test]
    fn short_or_blank_keywords_fail_validation() {
        for kw in ["", "   ", "ab", " a  "] {
            let err = GenerationRequest::parse(kw, "fantasy", "short", "happy").unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{:?}", kw);
        }
        assert!(GenerationRequest::parse("abc", "fantasy", "short", "happy").is_ok());
    }

    #[test]
    fn overlong_keywords_fail_validation() {
        let kw = "x".repeat(MAX_KEYWORDS_LEN + 1);
        assert!(GenerationRequest::parse(&kw, "fantasy", "short", "happy").is_err());
    }

    #[test]
    fn bad_enum_values_fail_validation() {
        assert!(GenerationRequest::parse("dragons", "western", "short", "happy").is_err());
        assert!(GenerationRequest::parse("dragons", "fantasy", "epic", "happy").is_err());
        assert!(GenerationRequest::parse("dragons", "fantasy", "short", "exciting").is_err());
    }
}
