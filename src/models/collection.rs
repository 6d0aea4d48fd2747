use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

pub const DEFAULT_COLLECTION_NAME: &str = "My Stories";
pub const DEFAULT_COLLECTION_DESCRIPTION: &str = "Your personal story collection";
pub const DEFAULT_COLLECTION_ICON: &str = "fas fa-book";
pub const DEFAULT_COLOR: &str = "#6f42c1";
pub const DEFAULT_ICON: &str = "fas fa-folder";
const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub description: String,
    pub color: String,
    pub icon: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCollection {
    pub name: String,
    pub description: String,
    pub color: String,
    pub icon: String,
}

impl NewCollection {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            color: DEFAULT_COLOR.to_string(),
            icon: DEFAULT_ICON.to_string(),
        }
    }

    pub fn validated(mut self) -> Result<Self> {
        self.name = validate_name(&self.name)?;
        validate_color(&self.color)?;
        if self.icon.trim().is_empty() {
            self.icon = DEFAULT_ICON.to_string();
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CollectionUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

impl CollectionUpdate {
    pub fn validated(mut self) -> Result<Self> {
        if let Some(name) = self.name.as_deref() {
            self.name = Some(validate_name(name)?);
        }
        if let Some(color) = self.color.as_deref() {
            validate_color(color)?;
        }
        Ok(self)
    }
}

/// A collection plus the stats derived from its stories.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionSummary {
    pub collection: Collection,
    pub story_count: usize,
    pub total_words: usize,
    pub average_rating: Option<f64>,
    pub genre_distribution: BTreeMap<String, usize>,
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("collection name cannot be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::validation(format!(
            "collection name must be at most {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

/// Colors are `#rrggbb` hex strings.
pub fn validate_color(color: &str) -> Result<()> {
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if valid {
        Ok(())
    } else {
        Err(AppError::validation(format!("invalid color '{}'", color)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors_must_be_six_digit_hex() {
        assert!(validate_color("#6f42c1").is_ok());
        assert!(validate_color("#FFFFFF").is_ok());
        assert!(validate_color("6f42c1").is_err());
        assert!(validate_color("#6f42c").is_err());
        assert!(validate_color("#zzzzzz").is_err());
    }

    #[test]
    fn new_collection_trims_name() {
        let c = NewCollection::named("  Favourites ").validated().unwrap();
        assert_eq!(c.name, "Favourites");
        assert!(NewCollection::named("   ").validated().is_err());
    }
}
