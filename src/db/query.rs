use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use rusqlite::types::Value;
use serde::Deserialize;

use crate::models::{GenerationMethod, Genre, Story, StoryLength, Tone};

use super::repository::format_datetime;

/// Raw list parameters as they arrive from a form or the command line.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    pub search: Option<String>,
    pub genre: Option<String>,
    pub length: Option<String>,
    pub tone: Option<String>,
    pub favorites: Option<String>,
    pub origin: Option<String>,
    pub rating: Option<String>,
    pub date_range: Option<String>,
    pub collection: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Ai,
    Template,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingBucket {
    Unrated,
    Five,
    FourPlus,
    ThreePlus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRange {
    Today,
    Week,
    Month,
    Year,
}

impl DateRange {
    /// Inclusive lower bound relative to `now`.
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            DateRange::Today => start_of(now.date_naive()),
            DateRange::Week => now - Duration::days(7),
            DateRange::Month => now - Duration::days(30),
            DateRange::Year => NaiveDate::from_ymd_opt(now.year(), 1, 1)
                .map(start_of)
                .unwrap_or(now),
        }
    }
}

fn start_of(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(chrono::NaiveTime::MIN))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionFilter {
    Id(i64),
    Uncategorized,
    /// Anything that cannot name one of the owner's collections.
    Unresolvable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Newest,
    Oldest,
    TitleAsc,
    TitleDesc,
    RatingDesc,
    RatingAsc,
    WordCountDesc,
    WordCountAsc,
}

impl SortKey {
    /// Unknown keys fall back to newest first.
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "-created_at" => SortKey::Newest,
            "created_at" => SortKey::Oldest,
            "title" => SortKey::TitleAsc,
            "-title" => SortKey::TitleDesc,
            "-rating" => SortKey::RatingDesc,
            "rating" => SortKey::RatingAsc,
            "-word_count" => SortKey::WordCountDesc,
            "word_count" => SortKey::WordCountAsc,
            _ => SortKey::Newest,
        }
    }

    pub fn as_param(&self) -> &'static str {
        match self {
            SortKey::Newest => "-created_at",
            SortKey::Oldest => "created_at",
            SortKey::TitleAsc => "title",
            SortKey::TitleDesc => "-title",
            SortKey::RatingDesc => "-rating",
            SortKey::RatingAsc => "rating",
            SortKey::WordCountDesc => "-word_count",
            SortKey::WordCountAsc => "word_count",
        }
    }

    pub fn is_word_count(&self) -> bool {
        matches!(self, SortKey::WordCountAsc | SortKey::WordCountDesc)
    }

    /// SQL ORDER BY for keys the store can sort. Ties always break newest first.
    pub fn order_by(&self) -> Option<&'static str> {
        match self {
            SortKey::Newest => Some("s.created_at DESC, s.id DESC"),
            SortKey::Oldest => Some("s.created_at ASC, s.id ASC"),
            SortKey::TitleAsc => Some("s.title COLLATE NOCASE ASC, s.created_at DESC, s.id DESC"),
            SortKey::TitleDesc => {
                Some("s.title COLLATE NOCASE DESC, s.created_at DESC, s.id DESC")
            }
            SortKey::RatingDesc => {
                Some("s.rating IS NULL, s.rating DESC, s.created_at DESC, s.id DESC")
            }
            SortKey::RatingAsc => {
                Some("s.rating IS NULL, s.rating ASC, s.created_at DESC, s.id DESC")
            }
            SortKey::WordCountDesc | SortKey::WordCountAsc => None,
        }
    }
}

/// Sorts by word count in memory. Ascending is the exact reverse of descending.
pub fn sort_by_word_count(stories: &mut [Story], key: SortKey) {
    stories.sort_by(|a, b| {
        b.word_count()
            .cmp(&a.word_count())
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| b.id.cmp(&a.id))
    });
    if key == SortKey::WordCountAsc {
        stories.reverse();
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoryFilter {
    pub search: Option<String>,
    pub genre: Option<Genre>,
    pub length: Option<StoryLength>,
    pub tone: Option<Tone>,
    pub favorites_only: bool,
    pub origin: Option<Origin>,
    pub rating: Option<RatingBucket>,
    pub date_range: Option<DateRange>,
    pub collection: Option<CollectionFilter>,
    pub sort: SortKey,
    pub page: usize,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl StoryFilter {
    /// Lenient parse: values that do not parse are treated as absent,
    /// except `collection`, which then matches nothing.
    pub fn from_params(params: &FilterParams) -> Self {
        let collection = present(&params.collection).map(|c| {
            if c.eq_ignore_ascii_case("uncategorized") {
                CollectionFilter::Uncategorized
            } else {
                c.parse::<i64>()
                    .map(CollectionFilter::Id)
                    .unwrap_or(CollectionFilter::Unresolvable)
            }
        });

        Self {
            search: present(&params.search).map(str::to_string),
            genre: present(&params.genre).and_then(|g| g.parse().ok()),
            length: present(&params.length).and_then(|l| l.parse().ok()),
            tone: present(&params.tone).and_then(|t| t.parse().ok()),
            favorites_only: present(&params.favorites)
                .map(|f| matches!(f.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"))
                .unwrap_or(false),
            origin: present(&params.origin).and_then(|o| match o {
                "ai" => Some(Origin::Ai),
                "template" => Some(Origin::Template),
                _ => None,
            }),
            rating: present(&params.rating).and_then(|r| match r {
                "unrated" => Some(RatingBucket::Unrated),
                "5" => Some(RatingBucket::Five),
                "4+" => Some(RatingBucket::FourPlus),
                "3+" => Some(RatingBucket::ThreePlus),
                _ => None,
            }),
            date_range: present(&params.date_range).and_then(|d| match d {
                "today" => Some(DateRange::Today),
                "week" => Some(DateRange::Week),
                "month" => Some(DateRange::Month),
                "year" => Some(DateRange::Year),
                _ => None,
            }),
            collection,
            sort: present(&params.sort).map(SortKey::parse).unwrap_or_default(),
            page: present(&params.page)
                .and_then(|p| p.parse::<usize>().ok())
                .filter(|p| *p >= 1)
                .unwrap_or(1),
        }
    }

    /// WHERE clause (over alias `s`) and its positional parameters.
    pub fn where_clause(&self, owner_id: i64, now: DateTime<Utc>) -> (String, Vec<Value>) {
        let mut clauses = vec!["s.owner_id = ?".to_string()];
        let mut values = vec![Value::Integer(owner_id)];

        if let Some(term) = &self.search {
            let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
            clauses.push(
                "(fold_case(s.title) LIKE ? ESCAPE '\\' OR fold_case(s.keywords) LIKE ? ESCAPE '\\' \
                 OR fold_case(s.content) LIKE ? ESCAPE '\\')"
                    .to_string(),
            );
            for _ in 0..3 {
                values.push(Value::Text(pattern.clone()));
            }
        }
        if let Some(genre) = self.genre {
            clauses.push("s.genre = ?".to_string());
            values.push(Value::Text(genre.to_string()));
        }
        if let Some(length) = self.length {
            clauses.push("s.length = ?".to_string());
            values.push(Value::Text(length.to_string()));
        }
        if let Some(tone) = self.tone {
            clauses.push("s.tone = ?".to_string());
            values.push(Value::Text(tone.to_string()));
        }
        if self.favorites_only {
            clauses.push("s.is_favorite = 1".to_string());
        }
        match self.origin {
            Some(Origin::Ai) => {
                clauses.push("s.generation_method <> ?".to_string());
                values.push(Value::Text(GenerationMethod::Template.to_string()));
            }
            Some(Origin::Template) => {
                clauses.push("s.generation_method = ?".to_string());
                values.push(Value::Text(GenerationMethod::Template.to_string()));
            }
            None => {}
        }
        match self.rating {
            Some(RatingBucket::Unrated) => clauses.push("s.rating IS NULL".to_string()),
            Some(RatingBucket::Five) => clauses.push("s.rating = 5".to_string()),
            Some(RatingBucket::FourPlus) => clauses.push("s.rating >= 4".to_string()),
            Some(RatingBucket::ThreePlus) => clauses.push("s.rating >= 3".to_string()),
            None => {}
        }
        if let Some(range) = self.date_range {
            clauses.push("s.created_at >= ?".to_string());
            values.push(Value::Text(format_datetime(&range.start(now))));
        }
        match &self.collection {
            Some(CollectionFilter::Id(id)) => {
                clauses.push(
                    "s.collection_id IN (SELECT c.id FROM collections c WHERE c.id = ? AND c.owner_id = ?)"
                        .to_string(),
                );
                values.push(Value::Integer(*id));
                values.push(Value::Integer(owner_id));
            }
            Some(CollectionFilter::Uncategorized) => {
                clauses.push("s.collection_id IS NULL".to_string())
            }
            Some(CollectionFilter::Unresolvable) => clauses.push("0 = 1".to_string()),
            None => {}
        }

        (clauses.join(" AND "), values)
    }
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> FilterParams {
        let map: serde_json::Map<String, serde_json::Value> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect();
        serde_json::from_value(serde_json::Value::Object(map)).unwrap()
    }

    #[test]
    fn invalid_values_are_ignored() {
        let filter = StoryFilter::from_params(&params(&[
            ("genre", "western"),
            ("rating", "2+"),
            ("date_range", "decade"),
            ("origin", "robot"),
            ("sort", "DROP TABLE"),
            ("page", "-3"),
        ]));
        assert_eq!(filter, StoryFilter { page: 1, ..StoryFilter::default() });
    }

    #[test]
    fn valid_values_are_parsed() {
        let filter = StoryFilter::from_params(&params(&[
            ("search", "  dragon "),
            ("genre", "sci_fi"),
            ("favorites", "true"),
            ("origin", "ai"),
            ("rating", "4+"),
            ("date_range", "week"),
            ("collection", "uncategorized"),
            ("sort", "-word_count"),
            ("page", "3"),
        ]));
        assert_eq!(filter.search.as_deref(), Some("dragon"));
        assert_eq!(filter.genre, Some(Genre::SciFi));
        assert!(filter.favorites_only);
        assert_eq!(filter.origin, Some(Origin::Ai));
        assert_eq!(filter.rating, Some(RatingBucket::FourPlus));
        assert_eq!(filter.date_range, Some(DateRange::Week));
        assert_eq!(filter.collection, Some(CollectionFilter::Uncategorized));
        assert_eq!(filter.sort, SortKey::WordCountDesc);
        assert_eq!(filter.page, 3);
    }

    #[test]
    fn garbage_collection_matches_nothing() {
        let filter = StoryFilter::from_params(&params(&[("collection", "abc")]));
        assert_eq!(filter.collection, Some(CollectionFilter::Unresolvable));
        let (sql, _) = filter.where_clause(1, Utc::now());
        assert!(sql.contains("0 = 1"));
    }

    #[test]
    fn placeholders_match_values() {
        let filter = StoryFilter::from_params(&params(&[
            ("search", "x"),
            ("genre", "horror"),
            ("tone", "dark"),
            ("origin", "template"),
            ("date_range", "today"),
            ("collection", "4"),
        ]));
        let (sql, values) = filter.where_clause(9, Utc::now());
        assert_eq!(sql.matches('?').count(), values.len());
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("100%_off\\"), "100\\%\\_off\\\\");
    }

    #[test]
    fn date_range_bounds() {
        let now = Utc.with_ymd_and_hms(2026, 10, 15, 13, 30, 0).unwrap();
        assert_eq!(
            DateRange::Today.start(now),
            Utc.with_ymd_and_hms(2026, 10, 15, 0, 0, 0).unwrap()
        );
        assert_eq!(DateRange::Week.start(now), now - Duration::days(7));
        assert_eq!(DateRange::Month.start(now), now - Duration::days(30));
        assert_eq!(
            DateRange::Year.start(now),
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn unknown_sort_falls_back_to_newest() {
        assert_eq!(SortKey::parse("-popularity"), SortKey::Newest);
        assert_eq!(SortKey::parse("title"), SortKey::TitleAsc);
        for key in [SortKey::Oldest, SortKey::RatingDesc, SortKey::WordCountAsc] {
            assert_eq!(SortKey::parse(key.as_param()), key);
        }
    }
}
