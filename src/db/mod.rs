mod query;
mod repository;
mod schema;

pub use query::{
    sort_by_word_count, CollectionFilter, DateRange, FilterParams, Origin, RatingBucket, SortKey,
    StoryFilter,
};
pub use repository::{format_datetime, Repository};
