use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

use super::{Genre, StoryLength, Tone};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// Generation preferences plus counters cached from the account's stories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub account_id: i64,
    pub favorite_genre: Option<Genre>,
    pub preferred_length: Option<StoryLength>,
    pub preferred_tone: Option<Tone>,
    pub stories_generated: i64,
    pub favorite_stories_count: i64,
    pub average_rating: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct Preferences {
    pub favorite_genre: Option<Genre>,
    pub preferred_length: Option<StoryLength>,
    pub preferred_tone: Option<Tone>,
}

const MAX_USERNAME_LEN: usize = 150;

/// Usernames follow the usual account rules: 3-150 chars of letters, digits and `@.+-_`.
pub fn validate_username(username: &str) -> Result<String> {
    let username = username.trim();
    let len = username.chars().count();
    if !(3..=MAX_USERNAME_LEN).contains(&len) {
        return Err(AppError::validation(format!(
            "username must be between 3 and {} characters",
            MAX_USERNAME_LEN
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "@.+-_".contains(c))
    {
        return Err(AppError::validation(
            "username may only contain letters, digits and @/./+/-/_",
        ));
    }
    Ok(username.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames_are_checked() {
        assert_eq!(validate_username(" alice ").unwrap(), "alice");
        assert!(validate_username("al").is_err());
        assert!(validate_username("bad name").is_err());
        assert!(validate_username("ok.name+tag@x").is_ok());
    }
}
