use std::collections::BTreeMap;
use std::io::{Cursor, Write};

use chrono::{DateTime, Utc};
use serde::Serialize;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::Result;
use crate::models::Story;

pub const METADATA_FILE: &str = "collection_info.json";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationMethods {
    pub ai_generated: usize,
    pub template_based: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateSpan {
    pub oldest: DateTime<Utc>,
    pub newest: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BundleEntry {
    pub id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub genre: String,
    pub word_count: usize,
    pub rating: Option<u8>,
    pub is_favorite: bool,
    pub model: String,
}

/// Summary written next to the rendered stories as `collection_info.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BundleMetadata {
    pub story_count: usize,
    pub total_words: usize,
    pub average_words_per_story: f64,
    pub average_rating: Option<f64>,
    pub genre_distribution: BTreeMap<String, usize>,
    pub generation_methods: GenerationMethods,
    pub date_range: Option<DateSpan>,
    pub exported_at: DateTime<Utc>,
    pub stories: Vec<BundleEntry>,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

impl BundleMetadata {
    pub fn from_stories(stories: &[Story], exported_at: DateTime<Utc>) -> Self {
        let total_words: usize = stories.iter().map(Story::word_count).sum();
        let ratings: Vec<u8> = stories.iter().filter_map(|s| s.rating).collect();
        let ai_generated = stories
            .iter()
            .filter(|s| s.generation_method.is_ai())
            .count();

        let mut genre_distribution = BTreeMap::new();
        for story in stories {
            *genre_distribution
                .entry(story.genre.label().to_string())
                .or_insert(0) += 1;
        }

        let oldest = stories.iter().map(|s| s.created_at).min();
        let newest = stories.iter().map(|s| s.created_at).max();

        Self {
            story_count: stories.len(),
            total_words,
            average_words_per_story: if stories.is_empty() {
                0.0
            } else {
                round1(total_words as f64 / stories.len() as f64)
            },
            average_rating: (!ratings.is_empty()).then(|| {
                round1(ratings.iter().map(|r| *r as f64).sum::<f64>() / ratings.len() as f64)
            }),
            genre_distribution,
            generation_methods: GenerationMethods {
                ai_generated,
                template_based: stories.len() - ai_generated,
            },
            date_range: oldest
                .zip(newest)
                .map(|(oldest, newest)| DateSpan { oldest, newest }),
            exported_at,
            stories: stories
                .iter()
                .map(|s| BundleEntry {
                    id: s.id,
                    title: s.display_title().to_string(),
                    created_at: s.created_at,
                    genre: s.genre.label().to_string(),
                    word_count: s.word_count(),
                    rating: s.rating,
                    is_favorite: s.is_favorite,
                    model: s.model_used.clone(),
                })
                .collect(),
        }
    }
}

pub(super) fn write_archive(files: &[(String, Vec<u8>)], metadata: &BundleMetadata) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut zip = ZipWriter::new(&mut cursor);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, bytes) in files {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes)?;
        }

        zip.start_file(METADATA_FILE, options)?;
        zip.write_all(&serde_json::to_vec_pretty(metadata)?)?;
        zip.finish()?;
    }
    tracing::debug!("Bundled {} stories", files.len());
    Ok(cursor.into_inner())
}

/// `stories_collection_<YYYYmmdd_HHMMSS>.zip`
pub fn bundle_file_name(now: DateTime<Utc>) -> String {
    format!("stories_collection_{}.zip", now.format("%Y%m%d_%H%M%S"))
}
