use chrono::Utc;
use serde::Serialize;

use crate::ai::{Dispatcher, GenerationRequest, TierStatus};
use crate::config::Config;
use crate::db::{FilterParams, Repository, StoryFilter};
use crate::error::{AppError, Result};
use crate::export::{
    bundle_file_name, file_name, ExportFile, ExportFormat, Exporter, ZIP_CONTENT_TYPE,
};
use crate::models::{
    validate_rating, validate_username, Account, Collection, CollectionSummary, CollectionUpdate,
    Genre, NewCollection, NewStory, Page, Preferences, Profile, Story, StoryLength, StoryUpdate,
    Tone,
};

/// Input for one generate-and-save call.
#[derive(Debug, Clone)]
pub struct GenerateStory {
    pub keywords: String,
    pub genre: Genre,
    pub length: StoryLength,
    pub tone: Tone,
    pub title: Option<String>,
    /// `None` files the story under the owner's default collection, if any.
    pub collection_id: Option<i64>,
    pub is_public: bool,
    /// Skip the AI tiers and use the template generator directly.
    pub force_template: bool,
}

impl GenerateStory {
    pub fn new(keywords: impl Into<String>, genre: Genre, length: StoryLength, tone: Tone) -> Self {
        Self {
            keywords: keywords.into(),
            genre,
            length,
            tone,
            title: None,
            collection_id: None,
            is_public: false,
            force_template: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionListing {
    pub collections: Vec<CollectionSummary>,
    pub uncategorized_count: usize,
}

/// The application service. Every operation that touches a user's data takes
/// the acting account and never reaches rows it does not own.
pub struct App {
    repository: Repository,
    dispatcher: Dispatcher,
    exporter: Exporter,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(&config.db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let repository = Repository::new(&config.db_path).await?;
        let dispatcher = Dispatcher::from_config(config)?;
        Self::from_parts(repository, dispatcher)
    }

    pub fn from_parts(repository: Repository, dispatcher: Dispatcher) -> Result<Self> {
        Ok(Self {
            repository,
            dispatcher,
            exporter: Exporter::new()?,
        })
    }

    // Accounts

    pub async fn create_account(&self, username: &str) -> Result<Account> {
        let username = validate_username(username)?;
        let account = self.repository.create_account(username, Utc::now()).await?;
        tracing::info!("Created account {} ({})", account.username, account.id);
        Ok(account)
    }

    pub async fn account(&self, username: &str) -> Result<Account> {
        self.repository
            .find_account(username)
            .await?
            .ok_or_else(|| AppError::not_found(format!("account '{}'", username.trim())))
    }

    pub async fn delete_account(&self, username: &str) -> Result<()> {
        let account = self.account(username).await?;
        self.repository.delete_account(account.id).await?;
        tracing::info!("Deleted account {} and all of its data", account.username);
        Ok(())
    }

    // Stories

    /// Validates, generates through the tier chain, saves, and refreshes the
    /// owner's profile counters.
    pub async fn generate_story(&self, owner: &Account, input: GenerateStory) -> Result<Story> {
        let request = GenerationRequest::new(&input.keywords, input.genre, input.length, input.tone)?;

        let collection_id = match input.collection_id {
            Some(id) => Some(self.repository.get_collection(owner.id, id).await?.id),
            None => self
                .repository
                .default_collection(owner.id)
                .await?
                .map(|c| c.id),
        };

        let outcome = if input.force_template {
            self.dispatcher.generate_template_only(&request).await?
        } else {
            self.dispatcher.generate(&request).await?
        };

        let story = self
            .repository
            .insert_story(NewStory {
                owner_id: owner.id,
                collection_id,
                title: input.title,
                keywords: request.keywords().to_string(),
                genre: request.genre,
                length: request.length,
                tone: request.tone,
                content: outcome.content,
                is_public: input.is_public,
                generation_time: outcome.elapsed.as_secs_f64(),
                generation_method: outcome.method,
                model_used: outcome.model,
                created_at: Utc::now(),
            })
            .await?;

        tracing::info!(
            "Saved story {} for {} via {}",
            story.id,
            owner.username,
            story.generation_method
        );
        Ok(story)
    }

    pub async fn get_story(&self, owner: &Account, id: i64) -> Result<Story> {
        self.repository.get_story(owner.id, id).await
    }

    pub async fn update_story(&self, owner: &Account, id: i64, update: StoryUpdate) -> Result<Story> {
        let touches_stats = update.rating.is_some() || update.is_favorite.is_some();
        let story = self
            .repository
            .update_story(owner.id, id, update, Utc::now())
            .await?;
        if touches_stats {
            self.repository
                .refresh_profile_stats(owner.id, Utc::now())
                .await?;
        }
        Ok(story)
    }

    pub async fn rate_story(&self, owner: &Account, id: i64, rating: i64) -> Result<Story> {
        validate_rating(rating)?;
        self.update_story(
            owner,
            id,
            StoryUpdate {
                rating: Some(rating),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn set_public(&self, owner: &Account, id: i64, is_public: bool) -> Result<Story> {
        self.update_story(
            owner,
            id,
            StoryUpdate {
                is_public: Some(is_public),
                ..Default::default()
            },
        )
        .await
    }

    /// Returns the new favorite state.
    pub async fn toggle_favorite(&self, owner: &Account, id: i64) -> Result<bool> {
        let state = self
            .repository
            .toggle_favorite(owner.id, id, Utc::now())
            .await?;
        self.repository
            .refresh_profile_stats(owner.id, Utc::now())
            .await?;
        Ok(state)
    }

    pub async fn delete_story(&self, owner: &Account, id: i64) -> Result<()> {
        self.repository.delete_story(owner.id, id).await?;
        self.repository
            .refresh_profile_stats(owner.id, Utc::now())
            .await?;
        Ok(())
    }

    pub async fn list_stories(&self, owner: &Account, params: &FilterParams) -> Result<Page<Story>> {
        let filter = StoryFilter::from_params(params);
        tracing::debug!("Listing stories for {} with {:?}", owner.username, filter);
        self.repository
            .list_stories(owner.id, &filter, Utc::now())
            .await
    }

    pub async fn public_gallery(&self, genre: Option<Genre>) -> Result<Vec<Story>> {
        self.repository.public_stories(genre).await
    }

    // Collections

    pub async fn create_collection(&self, owner: &Account, collection: NewCollection) -> Result<Collection> {
        let collection = collection.validated()?;
        self.repository
            .create_collection(owner.id, collection, Utc::now())
            .await
    }

    pub async fn update_collection(
        &self,
        owner: &Account,
        id: i64,
        update: CollectionUpdate,
    ) -> Result<Collection> {
        let update = update.validated()?;
        self.repository
            .update_collection(owner.id, id, update, Utc::now())
            .await
    }

    /// The collection's stories become uncategorized. Returns how many.
    pub async fn delete_collection(&self, owner: &Account, id: i64) -> Result<usize> {
        let detached = self.repository.delete_collection(owner.id, id).await?;
        tracing::info!(
            "Deleted collection {} for {}, {} stories uncategorized",
            id,
            owner.username,
            detached
        );
        Ok(detached)
    }

    pub async fn list_collections(&self, owner: &Account) -> Result<CollectionListing> {
        Ok(CollectionListing {
            collections: self.repository.collection_summaries(owner.id).await?,
            uncategorized_count: self.repository.uncategorized_count(owner.id).await?,
        })
    }

    /// All-or-nothing; `None` moves the stories out of every collection.
    pub async fn move_to_collection(
        &self,
        owner: &Account,
        story_ids: &[i64],
        collection_id: Option<i64>,
    ) -> Result<usize> {
        self.repository
            .move_to_collection(owner.id, story_ids, collection_id, Utc::now())
            .await
    }

    // Exports

    pub async fn export_story(&self, owner: &Account, id: i64, format: ExportFormat) -> Result<ExportFile> {
        let story = self.repository.get_story(owner.id, id).await?;
        let bytes = self.exporter.render(&story, format, Utc::now())?;
        Ok(ExportFile {
            file_name: file_name(&story, format),
            content_type: format.content_type(),
            bytes,
        })
    }

    /// Bundles the owned subset of `ids`; fails only when none of them are owned.
    pub async fn export_stories(
        &self,
        owner: &Account,
        ids: &[i64],
        format: ExportFormat,
    ) -> Result<ExportFile> {
        if ids.is_empty() {
            return Err(AppError::validation("no stories selected"));
        }
        let stories = self.repository.stories_by_ids(owner.id, ids).await?;
        if stories.is_empty() {
            return Err(AppError::not_found("none of the selected stories"));
        }
        if stories.len() < ids.len() {
            tracing::debug!(
                "Skipping {} unowned or missing stories in export",
                ids.len() - stories.len()
            );
        }
        self.bundle(&stories, format)
    }

    /// Every story the owner has; an empty account yields a metadata-only archive.
    pub async fn export_all(&self, owner: &Account, format: ExportFormat) -> Result<ExportFile> {
        let stories = self.repository.all_stories(owner.id).await?;
        self.bundle(&stories, format)
    }

    fn bundle(&self, stories: &[Story], format: ExportFormat) -> Result<ExportFile> {
        let now = Utc::now();
        Ok(ExportFile {
            file_name: bundle_file_name(now),
            content_type: ZIP_CONTENT_TYPE,
            bytes: self.exporter.bundle(stories, format, now)?,
        })
    }

    // Profile

    /// Counters are recomputed on every read.
    pub async fn profile(&self, owner: &Account) -> Result<Profile> {
        self.refresh_stats(owner).await
    }

    pub async fn refresh_stats(&self, owner: &Account) -> Result<Profile> {
        self.repository
            .refresh_profile_stats(owner.id, Utc::now())
            .await
    }

    pub async fn update_preferences(&self, owner: &Account, prefs: Preferences) -> Result<Profile> {
        self.repository
            .update_preferences(owner.id, prefs, Utc::now())
            .await
    }

    /// Genre, length and tone to use when the caller leaves them out.
    pub async fn preferred_choices(&self, owner: &Account) -> Result<(Genre, StoryLength, Tone)> {
        let profile = self.repository.get_profile(owner.id).await?;
        Ok((
            profile.favorite_genre.unwrap_or(Genre::Fantasy),
            profile.preferred_length.unwrap_or(StoryLength::Short),
            profile.preferred_tone.unwrap_or(Tone::Happy),
        ))
    }

    pub fn ai_status(&self) -> Vec<TierStatus> {
        self.dispatcher.status()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::ai::{GenerationStrategy, TemplateGenerator, TemplateStrategy};
    use crate::models::GenerationMethod;

    async fn app() -> App {
        let repository = Repository::in_memory().await.unwrap();
        let tiers: Vec<Box<dyn GenerationStrategy>> = vec![Box::new(TemplateStrategy::new(
            TemplateGenerator::new(Some(11)),
        ))];
        let dispatcher = Dispatcher::new(tiers, Duration::from_secs(1));
        App::from_parts(repository, dispatcher).unwrap()
    }

    fn input(keywords: &str) -> GenerateStory {
        GenerateStory::new(keywords, Genre::Mystery, StoryLength::Short, Tone::Dark)
    }

    #[tokio::test]
    async fn generated_story_lands_in_default_collection() {
        let app = app().await;
        let alice = app.create_account("alice").await.unwrap();

        let story = app.generate_story(&alice, input("fog, lantern")).await.unwrap();

        assert_eq!(story.generation_method, GenerationMethod::Template);
        assert!(story.content.contains("fog"));
        assert!(story.collection_id.is_some());
        assert!(!story.title.is_empty());
        assert_eq!(app.profile(&alice).await.unwrap().stories_generated, 1);
    }

    #[tokio::test]
    async fn validation_runs_before_anything_is_saved() {
        let app = app().await;
        let alice = app.create_account("alice").await.unwrap();

        let err = app.generate_story(&alice, input("ab")).await.unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(app.profile(&alice).await.unwrap().stories_generated, 0);
    }

    #[tokio::test]
    async fn foreign_collection_is_not_found() {
        let app = app().await;
        let alice = app.create_account("alice").await.unwrap();
        let bob = app.create_account("bobby").await.unwrap();
        let bobs = app.create_collection(&bob, NewCollection::named("Bob's")).await.unwrap();

        let mut request = input("fog, lantern");
        request.collection_id = Some(bobs.id);
        let err = app.generate_story(&alice, request).await.unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn usernames_are_unique_and_validated() {
        let app = app().await;
        app.create_account("alice").await.unwrap();

        assert!(matches!(app.create_account("ALICE").await, Err(AppError::Conflict(_))));
        assert!(matches!(app.create_account("a b").await, Err(AppError::Validation(_))));
        assert!(matches!(app.account("nobody").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn rating_outside_range_is_rejected() {
        let app = app().await;
        let alice = app.create_account("alice").await.unwrap();
        let story = app.generate_story(&alice, input("fog, lantern")).await.unwrap();

        for bad in [0, 6, -1] {
            assert!(matches!(
                app.rate_story(&alice, story.id, bad).await,
                Err(AppError::Validation(_))
            ));
        }
        let rated = app.rate_story(&alice, story.id, 3).await.unwrap();
        assert_eq!(rated.rating, Some(3));
        assert_eq!(app.profile(&alice).await.unwrap().average_rating, Some(3.0));
    }

    #[tokio::test]
    async fn export_skips_foreign_ids_and_fails_when_none_remain() {
        let app = app().await;
        let alice = app.create_account("alice").await.unwrap();
        let bob = app.create_account("bobby").await.unwrap();
        let mine = app.generate_story(&alice, input("fog, lantern")).await.unwrap();
        let theirs = app.generate_story(&bob, input("salt, wind")).await.unwrap();

        let file = app
            .export_stories(&alice, &[mine.id, theirs.id], ExportFormat::Txt)
            .await
            .unwrap();
        assert_eq!(file.content_type, "application/zip");
        assert!(file.file_name.starts_with("stories_collection_"));

        assert!(matches!(
            app.export_stories(&alice, &[theirs.id], ExportFormat::Txt).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            app.export_story(&alice, theirs.id, ExportFormat::Pdf).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn export_all_allows_an_empty_account() {
        let app = app().await;
        let alice = app.create_account("alice").await.unwrap();

        let file = app.export_all(&alice, ExportFormat::Html).await.unwrap();

        assert!(!file.bytes.is_empty());
    }

    #[tokio::test]
    async fn preferences_drive_default_choices() {
        let app = app().await;
        let alice = app.create_account("alice").await.unwrap();
        assert_eq!(
            app.preferred_choices(&alice).await.unwrap(),
            (Genre::Fantasy, StoryLength::Short, Tone::Happy)
        );

        app.update_preferences(
            &alice,
            Preferences {
                favorite_genre: Some(Genre::Horror),
                preferred_length: Some(StoryLength::Long),
                preferred_tone: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(
            app.preferred_choices(&alice).await.unwrap(),
            (Genre::Horror, StoryLength::Long, Tone::Happy)
        );
    }
}
