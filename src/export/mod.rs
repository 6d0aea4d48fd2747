mod bundle;
mod html;
mod pdf;
mod txt;

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::error::Result;
use crate::models::{parse_choice, Story};

pub use bundle::{bundle_file_name, BundleMetadata, METADATA_FILE};
pub use html::HtmlRenderer;

const DISPLAY_DATE: &str = "%B %d, %Y at %I:%M %p";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter, AsRefStr, Serialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Txt,
    Html,
    Pdf,
}

impl ExportFormat {
    /// Case-insensitive; anything but txt/html/pdf is a validation error.
    pub fn parse(value: &str) -> Result<Self> {
        parse_choice("format", &value.trim().to_ascii_lowercase())
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Txt => "txt",
            ExportFormat::Html => "html",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Txt => "text/plain; charset=utf-8",
            ExportFormat::Html => "text/html; charset=utf-8",
            ExportFormat::Pdf => "application/pdf",
        }
    }
}

pub const ZIP_CONTENT_TYPE: &str = "application/zip";

/// A rendered download: bytes plus the name and MIME type to serve them under.
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Fields every render shows, formatted once.
#[derive(Debug, Clone, Serialize)]
struct StoryView<'a> {
    title: &'a str,
    keywords: &'a str,
    genre: &'static str,
    length: &'static str,
    tone: &'static str,
    created: String,
    rating: String,
    word_count: usize,
    model: &'a str,
    method: String,
    paragraphs: Vec<&'a str>,
    content: &'a str,
    exported: String,
}

impl<'a> StoryView<'a> {
    fn new(story: &'a Story, exported_at: DateTime<Utc>) -> Self {
        Self {
            title: story.display_title(),
            keywords: &story.keywords,
            genre: story.genre.label(),
            length: story.length.label(),
            tone: story.tone.label(),
            created: story.created_at.format(DISPLAY_DATE).to_string(),
            rating: story.rating_label(),
            word_count: story.word_count(),
            model: &story.model_used,
            method: story.generation_method.label().to_string(),
            paragraphs: paragraphs(&story.content),
            content: &story.content,
            exported: exported_at.format(DISPLAY_DATE).to_string(),
        }
    }
}

fn paragraphs(content: &str) -> Vec<&str> {
    content
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Renders single stories and bundles. Holds the compiled HTML template.
pub struct Exporter {
    html: HtmlRenderer,
}

impl Exporter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            html: HtmlRenderer::new()?,
        })
    }

    pub fn render(
        &self,
        story: &Story,
        format: ExportFormat,
        exported_at: DateTime<Utc>,
    ) -> Result<Vec<u8>> {
        let view = StoryView::new(story, exported_at);
        match format {
            ExportFormat::Txt => Ok(txt::render(&view).into_bytes()),
            ExportFormat::Html => Ok(self.html.render(&view)?.into_bytes()),
            ExportFormat::Pdf => pdf::render(&view),
        }
    }

    /// One rendered file per story plus `collection_info.json`.
    pub fn bundle(
        &self,
        stories: &[Story],
        format: ExportFormat,
        exported_at: DateTime<Utc>,
    ) -> Result<Vec<u8>> {
        let files = stories
            .iter()
            .map(|story| {
                let bytes = self.render(story, format, exported_at)?;
                Ok((file_name(story, format), bytes))
            })
            .collect::<Result<Vec<_>>>()?;
        let metadata = BundleMetadata::from_stories(stories, exported_at);
        bundle::write_archive(&files, &metadata)
    }
}

static SLUG_SEPARATORS: OnceLock<Option<Regex>> = OnceLock::new();

/// Lowercase ASCII words joined by hyphens. `None` when nothing usable is left.
fn slugify(text: &str) -> Option<String> {
    let separators = SLUG_SEPARATORS
        .get_or_init(|| Regex::new(r"[^a-z0-9]+").ok())
        .as_ref()?;
    let slug = separators
        .replace_all(&text.to_lowercase(), "-")
        .trim_matches('-')
        .to_string();
    (!slug.is_empty()).then_some(slug)
}

/// `<slug>_<id>.<ext>`, with "story" when the title has no usable characters.
pub fn file_name(story: &Story, format: ExportFormat) -> String {
    let slug = slugify(&story.title).unwrap_or_else(|| "story".to_string());
    format!("{}_{}.{}", slug, story.id, format.extension())
}
