use handlebars::Handlebars;

use crate::error::Result;

use super::StoryView;

const TEMPLATE_NAME: &str = "story_export";
const TEMPLATE: &str = include_str!("../../templates/story_export.hbs");

/// Handlebars registry with the story page compiled in. `{{value}}` output is HTML-escaped.
pub struct HtmlRenderer {
    registry: Handlebars<'static>,
}

impl HtmlRenderer {
    pub fn new() -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_template_string(TEMPLATE_NAME, TEMPLATE)?;
        Ok(Self { registry })
    }

    pub(super) fn render(&self, view: &StoryView) -> Result<String> {
        Ok(self.registry.render(TEMPLATE_NAME, view)?)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{exported_at, story};
    use super::*;

    #[test]
    fn content_is_escaped() {
        let renderer = HtmlRenderer::new().unwrap();
        let s = story(
            2,
            "<script>alert(1)</script>",
            "Tom & Jerry said \"hi\".\n\n<b>bold</b> move",
        );

        let html = renderer.render(&StoryView::new(&s, exported_at())).unwrap();

        assert!(!html.contains("<script>alert"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("Tom &amp; Jerry"));
        assert!(html.contains("&lt;b&gt;bold&lt;/b&gt; move"));
    }

    #[test]
    fn paragraphs_and_metadata_are_rendered() {
        let renderer = HtmlRenderer::new().unwrap();
        let mut s = story(5, "Harbor", "First part.\n\nSecond part.\n\n\n");
        s.rating = Some(5);

        let html = renderer.render(&StoryView::new(&s, exported_at())).unwrap();

        assert_eq!(html.matches("<p>").count(), 2);
        assert!(html.contains("<h1>Harbor</h1>"));
        assert!(html.contains("5/5 stars"));
        assert!(html.contains("Fantasy"));
        assert!(html.contains("dragon, castle"));
    }
}
