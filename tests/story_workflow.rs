use std::io::{Cursor, Read};

use story_forge::db::FilterParams;
use story_forge::export::{ExportFormat, METADATA_FILE};
use story_forge::models::{GenerationMethod, Genre, NewCollection, StoryLength, Tone};
use story_forge::{App, AppError, Config, GenerateStory};
use tempfile::TempDir;

async fn app_in(dir: &TempDir) -> App {
    let config = Config {
        db_path: dir.path().join("data").join("stories.db").to_string_lossy().to_string(),
        gemini_api_key: None,
        claude_api_key: None,
        provider_timeout_secs: 2,
        template_seed: Some(42),
        ..Config::default()
    };
    App::new(&config).await.unwrap()
}

fn request(keywords: &str, genre: Genre) -> GenerateStory {
    GenerateStory::new(keywords, genre, StoryLength::Medium, Tone::Mysterious)
}

#[tokio::test]
async fn generate_organize_and_export() {
    let dir = TempDir::new().unwrap();
    let app = app_in(&dir).await;
    let alice = app.create_account("alice").await.unwrap();

    // No API keys: every story comes from the template tier.
    let status = app.ai_status();
    assert!(status.iter().filter(|t| t.available).all(|t| t.method == GenerationMethod::Template));

    let first = app
        .generate_story(&alice, request("dragon, castle", Genre::Fantasy))
        .await
        .unwrap();
    let horror = app
        .generate_story(&alice, request("attic, whisper", Genre::Horror))
        .await
        .unwrap();
    let third = app
        .generate_story(&alice, request("ember, crown", Genre::Fantasy))
        .await
        .unwrap();
    for keyword in ["dragon", "castle"] {
        assert!(first.content.contains(keyword));
    }
    assert_eq!(first.generation_method, GenerationMethod::Template);

    app.rate_story(&alice, first.id, 5).await.unwrap();
    app.toggle_favorite(&alice, first.id).await.unwrap();
    app.rate_story(&alice, horror.id, 2).await.unwrap();

    let fantasy = app
        .list_stories(
            &alice,
            &FilterParams {
                genre: Some("fantasy".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let ids: Vec<i64> = fantasy.items.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![third.id, first.id]);

    let profile = app.profile(&alice).await.unwrap();
    assert_eq!(profile.stories_generated, 3);
    assert_eq!(profile.favorite_stories_count, 1);
    assert_eq!(profile.average_rating, Some(3.5));

    // Organize.
    let shelf = app
        .create_collection(&alice, NewCollection::named("Night Shelf"))
        .await
        .unwrap();
    assert!(matches!(
        app.create_collection(&alice, NewCollection::named("night shelf")).await,
        Err(AppError::Conflict(_))
    ));
    let moved = app
        .move_to_collection(&alice, &[horror.id, third.id], Some(shelf.id))
        .await
        .unwrap();
    assert_eq!(moved, 2);

    let listing = app.list_collections(&alice).await.unwrap();
    let night = listing
        .collections
        .iter()
        .find(|c| c.collection.id == shelf.id)
        .unwrap();
    assert_eq!(night.story_count, 2);
    assert_eq!(listing.uncategorized_count, 0);

    assert_eq!(app.delete_collection(&alice, shelf.id).await.unwrap(), 2);
    let listing = app.list_collections(&alice).await.unwrap();
    assert_eq!(listing.uncategorized_count, 2);

    // Export.
    let pdf = app.export_story(&alice, first.id, ExportFormat::Pdf).await.unwrap();
    assert!(pdf.bytes.starts_with(b"%PDF"));
    assert!(pdf.file_name.ends_with(&format!("_{}.pdf", first.id)));

    let bundle = app.export_all(&alice, ExportFormat::Txt).await.unwrap();
    let mut archive = zip::ZipArchive::new(Cursor::new(bundle.bytes)).unwrap();
    assert_eq!(archive.len(), 4);
    let mut json = String::new();
    archive
        .by_name(METADATA_FILE)
        .unwrap()
        .read_to_string(&mut json)
        .unwrap();
    let meta: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(meta["story_count"], 3);
    assert_eq!(meta["generation_methods"]["template_based"], 3);
}

#[tokio::test]
async fn accounts_are_isolated_and_deletion_cascades() {
    let dir = TempDir::new().unwrap();
    let app = app_in(&dir).await;
    let alice = app.create_account("alice").await.unwrap();
    let bob = app.create_account("bobby").await.unwrap();

    let mine = app
        .generate_story(&alice, request("lighthouse, storm", Genre::Adventure))
        .await
        .unwrap();
    let mut public = request("comet, garden", Genre::SciFi);
    public.is_public = true;
    app.generate_story(&bob, public).await.unwrap();

    assert!(matches!(app.get_story(&bob, mine.id).await, Err(AppError::NotFound(_))));
    assert!(matches!(
        app.move_to_collection(&bob, &[mine.id], None).await,
        Err(AppError::NotFound(_))
    ));
    assert_eq!(app.public_gallery(None).await.unwrap().len(), 1);

    app.delete_account("bobby").await.unwrap();

    assert!(app.public_gallery(None).await.unwrap().is_empty());
    assert!(matches!(app.account("bobby").await, Err(AppError::NotFound(_))));
    assert_eq!(app.get_story(&alice, mine.id).await.unwrap().id, mine.id);
}

#[tokio::test]
async fn data_survives_reopening_the_database() {
    let dir = TempDir::new().unwrap();
    let story_id = {
        let app = app_in(&dir).await;
        let alice = app.create_account("alice").await.unwrap();
        app.generate_story(&alice, request("river, stone", Genre::Drama))
            .await
            .unwrap()
            .id
    };

    let app = app_in(&dir).await;
    let alice = app.account("ALICE").await.unwrap();
    let story = app.get_story(&alice, story_id).await.unwrap();
    assert!(story.content.contains("river"));
}
