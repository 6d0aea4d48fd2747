use super::StoryView;

const RULE_WIDTH: usize = 60;

pub(super) fn render(view: &StoryView) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut lines = vec![
        format!("Title: {}", view.title),
        format!("Created: {}", view.created),
        format!("Genre: {}", view.genre),
        format!("Length: {}", view.length),
        format!("Tone: {}", view.tone),
        format!("Keywords: {}", view.keywords),
        format!("Word Count: {} words", view.word_count),
        format!("Rating: {}", view.rating),
        format!("Generated with: {} ({})", view.model, view.method),
        String::new(),
        rule.clone(),
        "STORY CONTENT".to_string(),
        rule.clone(),
        String::new(),
    ];
    lines.push(view.content.trim().to_string());
    lines.push(String::new());
    lines.push(rule);
    lines.push(format!("Exported from Story Forge on {}", view.exported));

    lines.join("\n")
}
