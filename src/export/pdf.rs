use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};

use crate::error::Result;

use super::StoryView;

// A4 in points.
const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 72;
const FOOTER_Y: i64 = 40;

const TITLE_SIZE: i64 = 20;
const META_SIZE: i64 = 10;
const BODY_SIZE: i64 = 11;
const FOOTER_SIZE: i64 = 9;

const TITLE_COLUMNS: usize = 40;
const META_COLUMNS: usize = 85;
const BODY_COLUMNS: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(&self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }
}

#[derive(Debug, Clone)]
struct Line {
    font: Font,
    size: i64,
    centered: bool,
    /// Vertical space consumed, including any gap above the line.
    advance: i64,
    text: String,
}

impl Line {
    fn new(font: Font, size: i64, text: impl Into<String>) -> Self {
        Self {
            font,
            size,
            centered: false,
            advance: size + size / 2,
            text: text.into(),
        }
    }

    fn centered(mut self) -> Self {
        self.centered = true;
        self
    }

    fn gap(mut self, points: i64) -> Self {
        self.advance += points;
        self
    }

    fn x(&self) -> i64 {
        if !self.centered {
            return MARGIN;
        }
        ((PAGE_WIDTH - estimated_width(&self.text, self.size, self.font)) / 2).max(MARGIN)
    }
}

/// Rough Helvetica advance width; good enough for centering.
fn estimated_width(text: &str, size: i64, font: Font) -> i64 {
    let per_mille = match font {
        Font::Regular => 520,
        Font::Bold => 570,
    };
    text.chars().count() as i64 * size * per_mille / 1000
}

fn wrapped(text: &str, columns: usize) -> Vec<String> {
    textwrap::wrap(text, columns)
        .into_iter()
        .map(|line| line.into_owned())
        .collect()
}

fn story_lines(view: &StoryView) -> Vec<Line> {
    let mut lines = Vec::new();

    for text in wrapped(view.title, TITLE_COLUMNS) {
        lines.push(Line::new(Font::Bold, TITLE_SIZE, text).centered());
    }

    let metadata = [
        format!("Created: {}", view.created),
        format!("Genre: {}", view.genre),
        format!("Length: {}", view.length),
        format!("Tone: {}", view.tone),
        format!("Word Count: {} words", view.word_count),
        format!("Rating: {}", view.rating),
        format!("Generated with: {} ({})", view.model, view.method),
        format!("Keywords: {}", view.keywords),
    ];
    for (i, entry) in metadata.iter().enumerate() {
        for text in wrapped(entry, META_COLUMNS) {
            let line = Line::new(Font::Regular, META_SIZE, text);
            lines.push(if i == 0 { line.gap(20) } else { line });
        }
    }

    for (i, paragraph) in view.paragraphs.iter().enumerate() {
        for (j, text) in wrapped(paragraph, BODY_COLUMNS).into_iter().enumerate() {
            let line = Line::new(Font::Regular, BODY_SIZE, text);
            let gap = match (i, j) {
                (0, 0) => 20,
                (_, 0) => 6,
                _ => 0,
            };
            lines.push(line.gap(gap));
        }
    }

    let exported = format!("Exported from Story Forge on {}", view.exported);
    lines.push(Line::new(Font::Regular, META_SIZE, exported).gap(24));
    lines
}

/// Splits lines into pages, returning each line with its baseline.
fn paginate(lines: Vec<Line>) -> Vec<Vec<(i64, Line)>> {
    let top = PAGE_HEIGHT - MARGIN;
    let mut pages = vec![Vec::new()];
    let mut y = top;

    for line in lines {
        let mut next = y - line.advance;
        if next < MARGIN {
            pages.push(Vec::new());
            next = top - line.size;
        }
        if let Some(page) = pages.last_mut() {
            page.push((next, line));
        }
        y = next;
    }
    pages
}

fn footer(page: usize, total: usize) -> Line {
    Line::new(Font::Regular, FOOTER_SIZE, format!("Page {} of {}", page, total)).centered()
}

/// Maps text onto WinAnsi bytes; characters outside it become `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{2018}' | '\u{2019}' => out.push(b'\''),
            '\u{201C}' | '\u{201D}' => out.push(b'"'),
            '\u{2013}' | '\u{2014}' => out.push(b'-'),
            '\u{2026}' => out.extend_from_slice(b"..."),
            c if (c as u32) < 0x80 || (0xA0..=0xFF).contains(&(c as u32)) => out.push(c as u32 as u8),
            _ => out.push(b'?'),
        }
    }
    out
}

fn show_text(ops: &mut Vec<Operation>, line: &Line, y: i64) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new(
        "Tf",
        vec![line.font.resource().into(), Object::Integer(line.size)],
    ));
    ops.push(Operation::new(
        "Td",
        vec![Object::Integer(line.x()), Object::Integer(y)],
    ));
    ops.push(Operation::new(
        "Tj",
        vec![Object::String(win_ansi(&line.text), StringFormat::Hexadecimal)],
    ));
    ops.push(Operation::new("ET", vec![]));
}

pub(super) fn render(view: &StoryView) -> Result<Vec<u8>> {
    let pages = paginate(story_lines(view));
    let total = pages.len();

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(total);
    for (index, page) in pages.iter().enumerate() {
        let mut operations = Vec::new();
        for (y, line) in page {
            show_text(&mut operations, line, *y);
        }
        show_text(&mut operations, &footer(index + 1, total), FOOTER_Y);

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => Object::Integer(total as i64),
        "Resources" => resources_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(PAGE_WIDTH),
            Object::Integer(PAGE_HEIGHT),
        ],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::String(win_ansi(view.title), StringFormat::Literal),
        "Producer" => Object::string_literal("Story Forge"),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{exported_at, story};
    use super::*;

    #[test]
    fn short_story_is_a_single_a4_page() {
        let s = story(1, "Lantern", "A short tale.\n\nWith two paragraphs.");
        let bytes = render(&StoryView::new(&s, exported_at())).unwrap();

        assert!(bytes.starts_with(b"%PDF-1.5"));
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn long_content_paginates() {
        let paragraph = "The caravan crossed the salt flats under a white sky. ".repeat(12);
        let content = vec![paragraph.trim(); 30].join("\n\n");
        let s = story(2, "Crossing", &content);

        let view = StoryView::new(&s, exported_at());
        let pages = paginate(story_lines(&view));
        assert!(pages.len() > 1);
        for page in &pages {
            assert!(page.iter().all(|(y, _)| *y >= MARGIN && *y <= PAGE_HEIGHT - MARGIN));
        }

        let bytes = render(&view).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), pages.len());
    }

    #[test]
    fn title_is_centered_and_bold() {
        let s = story(3, "Moth", "x");
        let view = StoryView::new(&s, exported_at());
        let lines = story_lines(&view);

        assert_eq!(lines[0].font, Font::Bold);
        assert!(lines[0].x() > MARGIN);
        assert!(lines.iter().any(|l| l.text == "Rating: Not rated"));
        assert!(lines.iter().any(|l| l.text.starts_with("Generated with: template-based")));
    }

    #[test]
    fn footer_numbers_pages() {
        assert_eq!(footer(2, 5).text, "Page 2 of 5");
        assert!(footer(2, 5).centered);
    }

    #[test]
    fn text_is_mapped_to_win_ansi() {
        assert_eq!(win_ansi("caf\u{e9} \u{2014} \u{201C}hi\u{201D}\u{2026}"), b"caf\xe9 - \"hi\"...");
        assert_eq!(win_ansi("\u{1F409}"), b"?");
    }
}
