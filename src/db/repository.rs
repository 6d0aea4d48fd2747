use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{
    count_words, derive_title, validate_rating, Account, Collection, CollectionSummary,
    CollectionUpdate, Genre, NewCollection, NewStory, Page, Preferences, Profile, Story,
    StoryUpdate, DEFAULT_COLLECTION_DESCRIPTION, DEFAULT_COLLECTION_ICON,
    DEFAULT_COLLECTION_NAME, DEFAULT_COLOR, PAGE_SIZE,
};

use super::query::{sort_by_word_count, StoryFilter};
use super::schema::SCHEMA;

const STORY_COLUMNS: &str = "s.id, s.owner_id, s.collection_id, s.title, s.keywords, s.genre, \
     s.length, s.tone, s.content, s.created_at, s.updated_at, s.is_public, s.is_favorite, \
     s.rating, s.generation_time, s.generation_method, s.model_used";

const COLLECTION_COLUMNS: &str =
    "id, owner_id, name, description, color, icon, is_default, created_at, updated_at";

const PROFILE_COLUMNS: &str = "account_id, favorite_genre, preferred_length, preferred_tone, \
     stories_generated, favorite_stories_count, average_rating, created_at, updated_at";

/// Result of a write that may be refused for domain reasons. Refusals drop the
/// transaction, so nothing is applied.
enum Outcome<T> {
    Done(T),
    NotFound(String),
    Conflict(String),
}

impl<T> Outcome<T> {
    fn finish(self) -> Result<T> {
        match self {
            Outcome::Done(value) => Ok(value),
            Outcome::NotFound(msg) => Err(AppError::NotFound(msg)),
            Outcome::Conflict(msg) => Err(AppError::Conflict(msg)),
        }
    }
}

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            // SQLite's LOWER() only folds ASCII; search needs full Unicode folding.
            conn.create_scalar_function(
                "fold_case",
                1,
                FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
                |ctx| {
                    let text: Option<String> = ctx.get(0)?;
                    Ok(text.map(|t| t.to_lowercase()))
                },
            )?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Account operations

    /// Creates the account with its profile and default collection, all or nothing.
    pub async fn create_account(&self, username: String, now: DateTime<Utc>) -> Result<Account> {
        let ts = format_datetime(&now);
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let taken: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM accounts WHERE username = ?1",
                    params![username],
                    |row| row.get(0),
                )?;
                if taken > 0 {
                    return Ok(Outcome::Conflict(format!(
                        "username '{}' is already taken",
                        username
                    )));
                }

                tx.execute(
                    "INSERT INTO accounts (username, created_at) VALUES (?1, ?2)",
                    params![username, ts],
                )?;
                let account_id = tx.last_insert_rowid();
                tx.execute(
                    "INSERT INTO profiles (account_id, created_at, updated_at) VALUES (?1, ?2, ?2)",
                    params![account_id, ts],
                )?;
                tx.execute(
                    r#"INSERT INTO collections
                           (owner_id, name, description, color, icon, is_default, created_at, updated_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)"#,
                    params![
                        account_id,
                        DEFAULT_COLLECTION_NAME,
                        DEFAULT_COLLECTION_DESCRIPTION,
                        DEFAULT_COLOR,
                        DEFAULT_COLLECTION_ICON,
                        ts
                    ],
                )?;
                tx.commit()?;

                Ok(Outcome::Done(Account {
                    id: account_id,
                    username,
                    created_at: now,
                }))
            })
            .await?
            .finish()
    }

    pub async fn find_account(&self, username: &str) -> Result<Option<Account>> {
        let username = username.trim().to_string();
        let account = self
            .conn
            .call(move |conn| {
                let account = conn
                    .query_row(
                        "SELECT id, username, created_at FROM accounts WHERE username = ?1",
                        params![username],
                        account_from_row,
                    )
                    .optional()?;
                Ok(account)
            })
            .await?;
        Ok(account)
    }

    /// Stories, collections and the profile go with the account.
    pub async fn delete_account(&self, account_id: i64) -> Result<()> {
        let deleted = self
            .conn
            .call(move |conn| {
                Ok(conn.execute("DELETE FROM accounts WHERE id = ?1", params![account_id])?)
            })
            .await?;
        if deleted == 0 {
            return Err(AppError::not_found("account"));
        }
        Ok(())
    }

    // Story operations

    /// Inserts the story and refreshes the owner's profile counters in one transaction.
    pub async fn insert_story(&self, story: NewStory) -> Result<Story> {
        let title = story.resolved_title();
        let ts = format_datetime(&story.created_at);
        let owner_id = story.owner_id;
        let id = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    r#"INSERT INTO stories
                           (owner_id, collection_id, title, keywords, genre, length, tone, content,
                            created_at, updated_at, is_public, is_favorite, rating,
                            generation_time, generation_method, model_used)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9, ?10, 0, NULL, ?11, ?12, ?13)"#,
                    params![
                        story.owner_id,
                        story.collection_id,
                        title,
                        story.keywords,
                        story.genre.to_string(),
                        story.length.to_string(),
                        story.tone.to_string(),
                        story.content,
                        ts,
                        story.is_public,
                        story.generation_time,
                        story.generation_method.to_string(),
                        story.model_used,
                    ],
                )?;
                let id = tx.last_insert_rowid();
                update_profile_stats(&tx, owner_id, &ts)?;
                tx.commit()?;
                Ok(id)
            })
            .await?;
        self.get_story(owner_id, id).await
    }

    /// Another owner's story is reported exactly like a missing one.
    pub async fn get_story(&self, owner_id: i64, id: i64) -> Result<Story> {
        let story = self
            .conn
            .call(move |conn| {
                let story = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM stories s WHERE s.id = ?1 AND s.owner_id = ?2",
                            STORY_COLUMNS
                        ),
                        params![id, owner_id],
                        story_from_row,
                    )
                    .optional()?;
                Ok(story)
            })
            .await?;
        story.ok_or_else(|| AppError::not_found(format!("story {}", id)))
    }

    pub async fn update_story(
        &self,
        owner_id: i64,
        id: i64,
        update: StoryUpdate,
        now: DateTime<Utc>,
    ) -> Result<Story> {
        // `Some(None)` clears the rating.
        let rating: Option<Option<u8>> = match update.rating {
            None => None,
            Some(0) => Some(None),
            Some(r) => Some(Some(validate_rating(r)?)),
        };
        let ts = format_datetime(&now);

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let story = tx
                    .query_row(
                        &format!(
                            "SELECT {} FROM stories s WHERE s.id = ?1 AND s.owner_id = ?2",
                            STORY_COLUMNS
                        ),
                        params![id, owner_id],
                        story_from_row,
                    )
                    .optional()?;
                let Some(mut story) = story else {
                    return Ok(Outcome::NotFound(format!("story {}", id)));
                };

                if let Some(title) = update.title {
                    story.title = match title.trim() {
                        "" => derive_title(&story.content),
                        t => t.to_string(),
                    };
                }
                if let Some(is_public) = update.is_public {
                    story.is_public = is_public;
                }
                if let Some(is_favorite) = update.is_favorite {
                    story.is_favorite = is_favorite;
                }
                if let Some(rating) = rating {
                    story.rating = rating;
                }
                story.updated_at = now;

                tx.execute(
                    r#"UPDATE stories SET title = ?1, is_public = ?2, is_favorite = ?3, rating = ?4,
                           updated_at = ?5
                       WHERE id = ?6 AND owner_id = ?7"#,
                    params![
                        story.title,
                        story.is_public,
                        story.is_favorite,
                        story.rating,
                        ts,
                        id,
                        owner_id
                    ],
                )?;
                tx.commit()?;
                Ok(Outcome::Done(story))
            })
            .await?
            .finish()
    }

    /// Returns the new favorite state.
    pub async fn toggle_favorite(&self, owner_id: i64, id: i64, now: DateTime<Utc>) -> Result<bool> {
        let ts = format_datetime(&now);
        let state = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE stories SET is_favorite = NOT is_favorite, updated_at = ?1 WHERE id = ?2 AND owner_id = ?3",
                    params![ts, id, owner_id],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                let state: bool = conn.query_row(
                    "SELECT is_favorite FROM stories WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )?;
                Ok(Some(state))
            })
            .await?;
        state.ok_or_else(|| AppError::not_found(format!("story {}", id)))
    }

    pub async fn delete_story(&self, owner_id: i64, id: i64) -> Result<()> {
        let deleted = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM stories WHERE id = ?1 AND owner_id = ?2",
                    params![id, owner_id],
                )?)
            })
            .await?;
        if deleted == 0 {
            return Err(AppError::not_found(format!("story {}", id)));
        }
        Ok(())
    }

    /// Filtered, sorted, paginated listing of one owner's stories.
    pub async fn list_stories(
        &self,
        owner_id: i64,
        filter: &StoryFilter,
        now: DateTime<Utc>,
    ) -> Result<Page<Story>> {
        let (where_sql, values) = filter.where_clause(owner_id, now);
        let sort = filter.sort;
        let requested = filter.page;

        let page = self
            .conn
            .call(move |conn| {
                let total: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM stories s WHERE {}", where_sql),
                    params_from_iter(values.iter()),
                    |row| row.get(0),
                )?;
                let total = total as usize;
                let page = Page::<Story>::clamp(requested, total, PAGE_SIZE);
                let offset = (page - 1) * PAGE_SIZE;

                let items = match sort.order_by() {
                    Some(order) => {
                        let mut stmt = conn.prepare(&format!(
                            "SELECT {} FROM stories s WHERE {} ORDER BY {} LIMIT {} OFFSET {}",
                            STORY_COLUMNS, where_sql, order, PAGE_SIZE, offset
                        ))?;
                        let rows = stmt
                            .query_map(params_from_iter(values.iter()), story_from_row)?
                            .collect::<rusqlite::Result<Vec<_>>>()?;
                        rows
                    }
                    None => {
                        // Word count is derived, so the whole filtered set is sorted here.
                        let mut stmt = conn.prepare(&format!(
                            "SELECT {} FROM stories s WHERE {}",
                            STORY_COLUMNS, where_sql
                        ))?;
                        let mut all = stmt
                            .query_map(params_from_iter(values.iter()), story_from_row)?
                            .collect::<rusqlite::Result<Vec<_>>>()?;
                        sort_by_word_count(&mut all, sort);
                        all.into_iter().skip(offset).take(PAGE_SIZE).collect()
                    }
                };

                Ok(Page {
                    items,
                    page,
                    page_size: PAGE_SIZE,
                    total_items: total,
                    total_pages: Page::<Story>::page_count(total, PAGE_SIZE),
                })
            })
            .await?;
        Ok(page)
    }

    /// Public stories across all owners, newest first.
    pub async fn public_stories(&self, genre: Option<Genre>) -> Result<Vec<Story>> {
        let genre = genre.map(|g| g.to_string());
        let stories = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"SELECT {} FROM stories s
                       WHERE s.is_public = 1 AND (?1 IS NULL OR s.genre = ?1)
                       ORDER BY s.created_at DESC, s.id DESC"#,
                    STORY_COLUMNS
                ))?;
                let stories = stmt
                    .query_map(params![genre], story_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(stories)
            })
            .await?;
        Ok(stories)
    }

    /// The subset of `ids` owned by `owner_id`, newest first.
    pub async fn stories_by_ids(&self, owner_id: i64, ids: &[i64]) -> Result<Vec<Story>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: BTreeSet<i64> = ids.iter().copied().collect();
        let stories = self
            .conn
            .call(move |conn| {
                let mut values = vec![Value::Integer(owner_id)];
                values.extend(ids.iter().map(|id| Value::Integer(*id)));
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM stories s WHERE s.owner_id = ? AND s.id IN ({}) \
                     ORDER BY s.created_at DESC, s.id DESC",
                    STORY_COLUMNS,
                    placeholders(ids.len())
                ))?;
                let stories = stmt
                    .query_map(params_from_iter(values.iter()), story_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(stories)
            })
            .await?;
        Ok(stories)
    }

    pub async fn all_stories(&self, owner_id: i64) -> Result<Vec<Story>> {
        let stories = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM stories s WHERE s.owner_id = ?1 ORDER BY s.created_at DESC, s.id DESC",
                    STORY_COLUMNS
                ))?;
                let stories = stmt
                    .query_map(params![owner_id], story_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(stories)
            })
            .await?;
        Ok(stories)
    }

    /// Moves every story in `ids` to `collection_id` (`None` = uncategorized).
    ///
    /// Ownership of the collection and of every story is checked before any
    /// row changes; one ineligible id rejects the whole batch.
    pub async fn move_to_collection(
        &self,
        owner_id: i64,
        ids: &[i64],
        collection_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let ids: BTreeSet<i64> = ids.iter().copied().collect();
        if ids.is_empty() {
            return Err(AppError::validation("no stories selected"));
        }
        let ts = format_datetime(&now);

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                if let Some(cid) = collection_id {
                    let owned: i64 = tx.query_row(
                        "SELECT COUNT(*) FROM collections WHERE id = ?1 AND owner_id = ?2",
                        params![cid, owner_id],
                        |row| row.get(0),
                    )?;
                    if owned == 0 {
                        return Ok(Outcome::NotFound(format!("collection {}", cid)));
                    }
                }

                let mut owner_and_ids = vec![Value::Integer(owner_id)];
                owner_and_ids.extend(ids.iter().map(|id| Value::Integer(*id)));
                let in_list = placeholders(ids.len());

                let eligible: i64 = tx.query_row(
                    &format!(
                        "SELECT COUNT(*) FROM stories WHERE owner_id = ? AND id IN ({})",
                        in_list
                    ),
                    params_from_iter(owner_and_ids.iter()),
                    |row| row.get(0),
                )?;
                let ineligible = ids.len() - eligible as usize;
                if ineligible > 0 {
                    return Ok(Outcome::NotFound(format!(
                        "{} of {} stories not found; nothing was moved",
                        ineligible,
                        ids.len()
                    )));
                }

                let mut values = vec![
                    collection_id.map(Value::Integer).unwrap_or(Value::Null),
                    Value::Text(ts),
                ];
                values.extend(owner_and_ids);
                let moved = tx.execute(
                    &format!(
                        "UPDATE stories SET collection_id = ?, updated_at = ? WHERE owner_id = ? AND id IN ({})",
                        in_list
                    ),
                    params_from_iter(values.iter()),
                )?;
                tx.commit()?;
                Ok(Outcome::Done(moved))
            })
            .await?
            .finish()
    }

    // Collection operations

    pub async fn create_collection(
        &self,
        owner_id: i64,
        collection: NewCollection,
        now: DateTime<Utc>,
    ) -> Result<Collection> {
        let ts = format_datetime(&now);
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                if name_taken(&tx, owner_id, &collection.name, None)? {
                    return Ok(Outcome::Conflict(format!(
                        "a collection named '{}' already exists",
                        collection.name
                    )));
                }
                tx.execute(
                    r#"INSERT INTO collections
                           (owner_id, name, description, color, icon, is_default, created_at, updated_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)"#,
                    params![
                        owner_id,
                        collection.name,
                        collection.description,
                        collection.color,
                        collection.icon,
                        ts
                    ],
                )?;
                let id = tx.last_insert_rowid();
                let created = tx.query_row(
                    &format!("SELECT {} FROM collections WHERE id = ?1", COLLECTION_COLUMNS),
                    params![id],
                    collection_from_row,
                )?;
                tx.commit()?;
                Ok(Outcome::Done(created))
            })
            .await?
            .finish()
    }

    pub async fn get_collection(&self, owner_id: i64, id: i64) -> Result<Collection> {
        let collection = self
            .conn
            .call(move |conn| {
                let collection = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM collections WHERE id = ?1 AND owner_id = ?2",
                            COLLECTION_COLUMNS
                        ),
                        params![id, owner_id],
                        collection_from_row,
                    )
                    .optional()?;
                Ok(collection)
            })
            .await?;
        collection.ok_or_else(|| AppError::not_found(format!("collection {}", id)))
    }

    pub async fn default_collection(&self, owner_id: i64) -> Result<Option<Collection>> {
        let collection = self
            .conn
            .call(move |conn| {
                let collection = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM collections WHERE owner_id = ?1 AND is_default = 1 ORDER BY id LIMIT 1",
                            COLLECTION_COLUMNS
                        ),
                        params![owner_id],
                        collection_from_row,
                    )
                    .optional()?;
                Ok(collection)
            })
            .await?;
        Ok(collection)
    }

    pub async fn update_collection(
        &self,
        owner_id: i64,
        id: i64,
        update: CollectionUpdate,
        now: DateTime<Utc>,
    ) -> Result<Collection> {
        let ts = format_datetime(&now);
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let current = tx
                    .query_row(
                        &format!(
                            "SELECT {} FROM collections WHERE id = ?1 AND owner_id = ?2",
                            COLLECTION_COLUMNS
                        ),
                        params![id, owner_id],
                        collection_from_row,
                    )
                    .optional()?;
                let Some(mut collection) = current else {
                    return Ok(Outcome::NotFound(format!("collection {}", id)));
                };

                if let Some(name) = update.name {
                    if name_taken(&tx, owner_id, &name, Some(id))? {
                        return Ok(Outcome::Conflict(format!(
                            "a collection named '{}' already exists",
                            name
                        )));
                    }
                    collection.name = name;
                }
                if let Some(description) = update.description {
                    collection.description = description;
                }
                if let Some(color) = update.color {
                    collection.color = color;
                }
                if let Some(icon) = update.icon {
                    collection.icon = icon;
                }
                collection.updated_at = now;

                tx.execute(
                    r#"UPDATE collections SET name = ?1, description = ?2, color = ?3, icon = ?4,
                           updated_at = ?5
                       WHERE id = ?6"#,
                    params![
                        collection.name,
                        collection.description,
                        collection.color,
                        collection.icon,
                        ts,
                        id
                    ],
                )?;
                tx.commit()?;
                Ok(Outcome::Done(collection))
            })
            .await?
            .finish()
    }

    /// Deletes the collection; its stories become uncategorized. Returns how many were detached.
    pub async fn delete_collection(&self, owner_id: i64, id: i64) -> Result<usize> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let detached: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM stories WHERE collection_id = ?1 AND owner_id = ?2",
                    params![id, owner_id],
                    |row| row.get(0),
                )?;
                let deleted = tx.execute(
                    "DELETE FROM collections WHERE id = ?1 AND owner_id = ?2",
                    params![id, owner_id],
                )?;
                if deleted == 0 {
                    return Ok(Outcome::NotFound(format!("collection {}", id)));
                }
                tx.commit()?;
                Ok(Outcome::Done(detached as usize))
            })
            .await?
            .finish()
    }

    /// Every collection of the owner, by name, with stats derived from its stories.
    pub async fn collection_summaries(&self, owner_id: i64) -> Result<Vec<CollectionSummary>> {
        let summaries = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM collections WHERE owner_id = ?1 ORDER BY name COLLATE NOCASE",
                    COLLECTION_COLUMNS
                ))?;
                let collections = stmt
                    .query_map(params![owner_id], collection_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                let mut stmt = conn.prepare(
                    "SELECT collection_id, genre, content, rating FROM stories \
                     WHERE owner_id = ?1 AND collection_id IS NOT NULL",
                )?;
                let rows = stmt
                    .query_map(params![owner_id], |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            parse_column::<Genre>(row, 1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, Option<i64>>(3)?,
                        ))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                let mut by_collection: HashMap<i64, Vec<(Genre, String, Option<i64>)>> =
                    HashMap::new();
                for (cid, genre, content, rating) in rows {
                    by_collection
                        .entry(cid)
                        .or_default()
                        .push((genre, content, rating));
                }

                let summaries = collections
                    .into_iter()
                    .map(|collection| {
                        let stories = by_collection.remove(&collection.id).unwrap_or_default();
                        let ratings: Vec<i64> = stories.iter().filter_map(|s| s.2).collect();
                        let mut genre_distribution = BTreeMap::new();
                        for (genre, _, _) in &stories {
                            *genre_distribution
                                .entry(genre.label().to_string())
                                .or_insert(0) += 1;
                        }
                        CollectionSummary {
                            story_count: stories.len(),
                            total_words: stories.iter().map(|s| count_words(&s.1)).sum(),
                            average_rating: (!ratings.is_empty()).then(|| {
                                ratings.iter().sum::<i64>() as f64 / ratings.len() as f64
                            }),
                            genre_distribution,
                            collection,
                        }
                    })
                    .collect();
                Ok(summaries)
            })
            .await?;
        Ok(summaries)
    }

    pub async fn uncategorized_count(&self, owner_id: i64) -> Result<usize> {
        let count = self
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM stories WHERE owner_id = ?1 AND collection_id IS NULL",
                    params![owner_id],
                    |row| row.get(0),
                )?;
                Ok(count as usize)
            })
            .await?;
        Ok(count)
    }

    // Profile operations

    pub async fn get_profile(&self, account_id: i64) -> Result<Profile> {
        let profile = self
            .conn
            .call(move |conn| {
                let profile = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM profiles WHERE account_id = ?1",
                            PROFILE_COLUMNS
                        ),
                        params![account_id],
                        profile_from_row,
                    )
                    .optional()?;
                Ok(profile)
            })
            .await?;
        profile.ok_or_else(|| AppError::not_found("profile"))
    }

    pub async fn update_preferences(
        &self,
        account_id: i64,
        prefs: Preferences,
        now: DateTime<Utc>,
    ) -> Result<Profile> {
        let ts = format_datetime(&now);
        let changed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    r#"UPDATE profiles SET favorite_genre = ?1, preferred_length = ?2,
                           preferred_tone = ?3, updated_at = ?4
                       WHERE account_id = ?5"#,
                    params![
                        prefs.favorite_genre.map(|g| g.to_string()),
                        prefs.preferred_length.map(|l| l.to_string()),
                        prefs.preferred_tone.map(|t| t.to_string()),
                        ts,
                        account_id
                    ],
                )?)
            })
            .await?;
        if changed == 0 {
            return Err(AppError::not_found("profile"));
        }
        self.get_profile(account_id).await
    }

    /// Recomputes the cached counters from the account's stories.
    pub async fn refresh_profile_stats(
        &self,
        account_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Profile> {
        let ts = format_datetime(&now);
        self.conn
            .call(move |conn| {
                update_profile_stats(conn, account_id, &ts)?;
                Ok(())
            })
            .await?;
        self.get_profile(account_id).await
    }
}

fn update_profile_stats(
    conn: &rusqlite::Connection,
    account_id: i64,
    ts: &str,
) -> rusqlite::Result<usize> {
    conn.execute(
        r#"UPDATE profiles SET
               stories_generated = (SELECT COUNT(*) FROM stories WHERE owner_id = ?1),
               favorite_stories_count =
                   (SELECT COUNT(*) FROM stories WHERE owner_id = ?1 AND is_favorite = 1),
               average_rating =
                   (SELECT AVG(rating) FROM stories WHERE owner_id = ?1 AND rating IS NOT NULL),
               updated_at = ?2
           WHERE account_id = ?1"#,
        params![account_id, ts],
    )
}

fn name_taken(
    conn: &rusqlite::Connection,
    owner_id: i64,
    name: &str,
    except_id: Option<i64>,
) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM collections
         WHERE owner_id = ?1 AND name = ?2 COLLATE NOCASE AND (?3 IS NULL OR id <> ?3)",
        params![owner_id, name, except_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Fixed-width UTC timestamps so text comparison matches time order.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56.000000Z")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

#[derive(Debug, thiserror::Error)]
#[error("unparsable timestamp '{0}'")]
struct BadTimestamp(String);

fn datetime_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_datetime(&raw).ok_or_else(|| conversion_error(idx, BadTimestamp(raw)))
}

fn parse_column<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| conversion_error(idx, e))
}

fn optional_column<T>(row: &Row, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) if !raw.is_empty() => raw.parse::<T>().map(Some).map_err(|e| conversion_error(idx, e)),
        _ => Ok(None),
    }
}

fn account_from_row(row: &Row) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        username: row.get(1)?,
        created_at: datetime_column(row, 2)?,
    })
}

fn story_from_row(row: &Row) -> rusqlite::Result<Story> {
    Ok(Story {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        collection_id: row.get(2)?,
        title: row.get(3)?,
        keywords: row.get(4)?,
        genre: parse_column(row, 5)?,
        length: parse_column(row, 6)?,
        tone: parse_column(row, 7)?,
        content: row.get(8)?,
        created_at: datetime_column(row, 9)?,
        updated_at: datetime_column(row, 10)?,
        is_public: row.get(11)?,
        is_favorite: row.get(12)?,
        rating: row.get::<_, Option<i64>>(13)?.map(|r| r as u8),
        generation_time: row.get(14)?,
        generation_method: parse_column(row, 15)?,
        model_used: row.get(16)?,
    })
}

fn collection_from_row(row: &Row) -> rusqlite::Result<Collection> {
    Ok(Collection {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        color: row.get(4)?,
        icon: row.get(5)?,
        is_default: row.get(6)?,
        created_at: datetime_column(row, 7)?,
        updated_at: datetime_column(row, 8)?,
    })
}

fn profile_from_row(row: &Row) -> rusqlite::Result<Profile> {
    Ok(Profile {
        account_id: row.get(0)?,
        favorite_genre: optional_column(row, 1)?,
        preferred_length: optional_column(row, 2)?,
        preferred_tone: optional_column(row, 3)?,
        stories_generated: row.get(4)?,
        favorite_stories_count: row.get(5)?,
        average_rating: row.get(6)?,
        created_at: datetime_column(row, 7)?,
        updated_at: datetime_column(row, 8)?,
    })
}
