mod choices;
mod collection;
mod page;
mod profile;
mod story;

pub use choices::{parse_choice, GenerationMethod, Genre, StoryLength, Tone};
pub use collection::{
    validate_color, Collection, CollectionSummary, CollectionUpdate, NewCollection,
    DEFAULT_COLLECTION_DESCRIPTION, DEFAULT_COLLECTION_ICON, DEFAULT_COLLECTION_NAME,
    DEFAULT_COLOR, DEFAULT_ICON,
};
pub use page::{Page, PAGE_SIZE};
pub use profile::{validate_username, Account, Preferences, Profile};
pub use story::{
    count_words, derive_title, validate_rating, NewStory, Story, StoryUpdate, MAX_KEYWORDS_LEN,
};
