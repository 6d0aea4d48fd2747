use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::error::{AppError, Result};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Genre {
    #[default]
    Fantasy,
    SciFi,
    Romance,
    Horror,
    Mystery,
    Adventure,
    Drama,
    Comedy,
}

impl Genre {
    pub fn label(&self) -> &'static str {
        match self {
            Genre::Fantasy => "Fantasy",
            Genre::SciFi => "Science Fiction",
            Genre::Romance => "Romance",
            Genre::Horror => "Horror",
            Genre::Mystery => "Mystery",
            Genre::Adventure => "Adventure",
            Genre::Drama => "Drama",
            Genre::Comedy => "Comedy",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StoryLength {
    #[default]
    Short,
    Medium,
    Long,
}

impl StoryLength {
    pub fn label(&self) -> &'static str {
        match self {
            StoryLength::Short => "Short (100-300 words)",
            StoryLength::Medium => "Medium (300-600 words)",
            StoryLength::Long => "Long (600-1000 words)",
        }
    }

    /// Word range handed to the AI providers.
    pub fn word_range(&self) -> &'static str {
        match self {
            StoryLength::Short => "100-300 words",
            StoryLength::Medium => "300-600 words",
            StoryLength::Long => "600-1000 words",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Tone {
    #[default]
    Happy,
    Dark,
    Humorous,
    Dramatic,
    Mysterious,
    Romantic,
}

impl Tone {
    pub fn label(&self) -> &'static str {
        match self {
            Tone::Happy => "Happy",
            Tone::Dark => "Dark",
            Tone::Humorous => "Humorous",
            Tone::Dramatic => "Dramatic",
            Tone::Mysterious => "Mysterious",
            Tone::Romantic => "Romantic",
        }
    }
}

/// Which generation tier produced a story.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GenerationMethod {
    AiPrimary,
    AiSecondary,
    Template,
}

impl GenerationMethod {
    pub fn is_ai(&self) -> bool {
        !matches!(self, GenerationMethod::Template)
    }

    pub fn label(&self) -> &'static str {
        match self {
            GenerationMethod::AiPrimary => "AI (primary)",
            GenerationMethod::AiSecondary => "AI (secondary)",
            GenerationMethod::Template => "Template",
        }
    }
}

/// Parse a user-facing choice string, reporting the field name on failure.
pub fn parse_choice<T: FromStr>(field: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| AppError::validation(format!("unknown {} '{}'", field, value.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn genre_codes_are_snake_case() {
        assert_eq!(Genre::SciFi.to_string(), "sci_fi");
        assert_eq!("sci_fi".parse::<Genre>().unwrap(), Genre::SciFi);
        assert_eq!(Genre::iter().count(), 8);
    }

    #[test]
    fn parse_choice_rejects_unknown_values() {
        let err = parse_choice::<Tone>("tone", "exciting").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(parse_choice::<Tone>("tone", " dark ").unwrap(), Tone::Dark);
    }

    #[test]
    fn template_is_the_only_non_ai_method() {
        let ai: Vec<_> = GenerationMethod::iter().filter(|m| m.is_ai()).collect();
        assert_eq!(ai, vec![GenerationMethod::AiPrimary, GenerationMethod::AiSecondary]);
    }
}
