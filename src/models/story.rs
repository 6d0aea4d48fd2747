use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

use super::{GenerationMethod, Genre, StoryLength, Tone};

pub const MAX_KEYWORDS_LEN: usize = 500;
const TITLE_PREFIX_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: i64,
    pub owner_id: i64,
    pub collection_id: Option<i64>,
    pub title: String,
    pub keywords: String,
    pub genre: Genre,
    pub length: StoryLength,
    pub tone: Tone,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_public: bool,
    pub is_favorite: bool,
    pub rating: Option<u8>,
    /// Seconds spent across every generation tier that was attempted.
    pub generation_time: f64,
    pub generation_method: GenerationMethod,
    pub model_used: String,
}

impl Story {
    pub fn word_count(&self) -> usize {
        count_words(&self.content)
    }

    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            "Untitled Story"
        } else {
            &self.title
        }
    }

    pub fn rating_label(&self) -> String {
        match self.rating {
            Some(r) => format!("{}/5 stars", r),
            None => "Not rated".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewStory {
    pub owner_id: i64,
    pub collection_id: Option<i64>,
    pub title: Option<String>,
    pub keywords: String,
    pub genre: Genre,
    pub length: StoryLength,
    pub tone: Tone,
    pub content: String,
    pub is_public: bool,
    pub generation_time: f64,
    pub generation_method: GenerationMethod,
    pub model_used: String,
    pub created_at: DateTime<Utc>,
}

impl NewStory {
    /// The stored title: the given one, or a prefix of the content.
    pub fn resolved_title(&self) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => derive_title(&self.content),
        }
    }
}

/// Partial update of the user-editable story fields.
#[derive(Debug, Clone, Default)]
pub struct StoryUpdate {
    pub title: Option<String>,
    pub is_public: Option<bool>,
    pub is_favorite: Option<bool>,
    /// `Some(0)` clears the rating.
    pub rating: Option<i64>,
}

pub fn count_words(content: &str) -> usize {
    content.split_whitespace().count()
}

pub fn derive_title(content: &str) -> String {
    let content = content.trim();
    if content.chars().count() > TITLE_PREFIX_CHARS {
        let prefix: String = content.chars().take(TITLE_PREFIX_CHARS).collect();
        format!("{}...", prefix)
    } else {
        content.to_string()
    }
}

/// Accepts exactly 1..=5.
pub fn validate_rating(rating: i64) -> Result<u8> {
    if (1..=5).contains(&rating) {
        Ok(rating as u8)
    } else {
        Err(AppError::validation(format!(
            "rating must be an integer between 1 and 5, got {}",
            rating
        )))
    }
}
