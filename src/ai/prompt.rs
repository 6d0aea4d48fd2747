use crate::models::{Genre, Tone};

use super::GenerationRequest;

fn genre_setting(genre: Genre) -> &'static str {
    match genre {
        Genre::Fantasy => "a magical fantasy world with mythical creatures, magic, and adventure",
        Genre::SciFi => {
            "a futuristic science fiction setting with advanced technology, space, or aliens"
        }
        Genre::Romance => {
            "a romantic story focusing on love, relationships, and emotional connections"
        }
        Genre::Horror => "a suspenseful horror story with dark, scary, or supernatural elements",
        Genre::Mystery => "a mysterious detective or puzzle story with secrets to uncover",
        Genre::Adventure => {
            "an exciting adventure story with action, exploration, and challenges"
        }
        Genre::Drama => {
            "a dramatic story with deep emotions, conflict, and character development"
        }
        Genre::Comedy => "a humorous and lighthearted story with funny situations and characters",
    }
}

fn tone_description(tone: Tone) -> &'static str {
    match tone {
        Tone::Happy => "upbeat, positive, and cheerful",
        Tone::Dark => "serious, somber, and intense",
        Tone::Humorous => "funny, witty, and entertaining",
        Tone::Dramatic => "emotional, intense, and compelling",
        Tone::Mysterious => "enigmatic, suspenseful, and intriguing",
        Tone::Romantic => "loving, passionate, and heartfelt",
    }
}

pub const SYSTEM_PROMPT: &str = r#"You are a creative fiction writer.
Write only the story itself, without titles, meta-commentary or explanations.
Separate paragraphs with a blank line."#;

/// The user prompt shared by every AI provider.
pub fn story_prompt(request: &GenerationRequest) -> String {
    let words = request.length.word_range();
    format!(
        r#"Write a complete, well-structured story of {words} set in {setting}.
The story should have a {tone} tone and must incorporate these keywords naturally: {keywords}

Requirements:
- Create a compelling narrative with a clear beginning, middle, and end
- Develop interesting characters and vivid descriptions
- Ensure the keywords "{keywords}" are woven naturally into the plot
- Match the {genre} genre and {tone_name} tone throughout
- Write approximately {words}
- Include dialogue if appropriate to the story"#,
        words = words,
        setting = genre_setting(request.genre),
        tone = tone_description(request.tone),
        keywords = request.keywords(),
        genre = request.genre.label(),
        tone_name = request.tone.label().to_lowercase(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_mentions_every_input() {
        let req = GenerationRequest::parse("lighthouse, storm", "mystery", "long", "dark").unwrap();
        let prompt = story_prompt(&req);
        assert!(prompt.contains("lighthouse, storm"));
        assert!(prompt.contains("600-1000 words"));
        assert!(prompt.contains("Mystery genre"));
        assert!(prompt.contains("serious, somber, and intense"));
    }
}
