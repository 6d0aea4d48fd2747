use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use crate::app::{App, GenerateStory};
use crate::db::FilterParams;
use crate::error::AppError;
use crate::export::{ExportFile, ExportFormat};
use crate::models::{
    parse_choice, CollectionUpdate, Genre, NewCollection, Page, Preferences, Story, StoryLength,
    Tone, DEFAULT_COLOR, DEFAULT_ICON,
};

#[derive(Debug, Parser)]
#[command(name = "story-forge", version, about = "Generate, organize and export short stories")]
pub struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create or delete accounts
    Account {
        #[command(subcommand)]
        action: AccountCommand,
    },
    /// Generate a story and save it
    Generate(GenerateArgs),
    /// List your stories with filters, sorting and paging
    List(ListArgs),
    /// Print one story
    Show {
        #[arg(long)]
        user: String,
        id: i64,
        #[arg(long)]
        json: bool,
    },
    /// Rate a story from 1 to 5
    Rate {
        #[arg(long)]
        user: String,
        id: i64,
        #[arg(allow_negative_numbers = true)]
        rating: i64,
    },
    /// Toggle a story's favorite flag
    Favorite {
        #[arg(long)]
        user: String,
        id: i64,
    },
    /// Make a story public, or private again with --private
    Publish {
        #[arg(long)]
        user: String,
        id: i64,
        #[arg(long)]
        private: bool,
    },
    /// Delete a story
    Delete {
        #[arg(long)]
        user: String,
        id: i64,
    },
    /// Public stories from every account
    Gallery {
        #[arg(long)]
        genre: Option<String>,
    },
    /// Manage collections
    Collection {
        #[command(subcommand)]
        action: CollectionCommand,
    },
    /// Export one story as txt, html or pdf
    Export {
        #[arg(long)]
        user: String,
        id: i64,
        #[arg(long, default_value = "txt")]
        format: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Export several stories (or all of them) as a zip bundle
    Bundle {
        #[arg(long)]
        user: String,
        /// Comma-separated story ids; all stories when omitted
        #[arg(long, value_delimiter = ',')]
        ids: Vec<i64>,
        #[arg(long, default_value = "txt")]
        format: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show profile stats, optionally updating generation preferences
    Profile {
        #[arg(long)]
        user: String,
        #[arg(long)]
        genre: Option<String>,
        #[arg(long)]
        length: Option<String>,
        #[arg(long)]
        tone: Option<String>,
    },
    /// Show which generation tiers are configured
    Status,
}

#[derive(Debug, Subcommand)]
pub enum AccountCommand {
    Create { username: String },
    Delete { username: String },
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    #[arg(long)]
    pub user: String,
    /// Comma-separated keywords to weave into the story
    #[arg(long)]
    pub keywords: String,
    #[arg(long)]
    pub genre: Option<String>,
    #[arg(long)]
    pub length: Option<String>,
    #[arg(long)]
    pub tone: Option<String>,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub collection: Option<i64>,
    #[arg(long)]
    pub public: bool,
    /// Skip the AI providers
    #[arg(long)]
    pub template_only: bool,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long)]
    pub user: String,
    #[arg(long)]
    pub search: Option<String>,
    #[arg(long)]
    pub genre: Option<String>,
    #[arg(long)]
    pub length: Option<String>,
    #[arg(long)]
    pub tone: Option<String>,
    #[arg(long)]
    pub favorites: bool,
    /// ai or template
    #[arg(long)]
    pub origin: Option<String>,
    /// unrated, 5, 4+ or 3+
    #[arg(long)]
    pub rating: Option<String>,
    /// today, week, month or year
    #[arg(long)]
    pub date_range: Option<String>,
    /// Collection id, or "uncategorized"
    #[arg(long)]
    pub collection: Option<String>,
    /// e.g. -created_at, title, -rating, word_count
    #[arg(long, allow_hyphen_values = true)]
    pub sort: Option<String>,
    #[arg(long)]
    pub page: Option<String>,
    #[arg(long)]
    pub json: bool,
}

impl ListArgs {
    fn params(&self) -> FilterParams {
        FilterParams {
            search: self.search.clone(),
            genre: self.genre.clone(),
            length: self.length.clone(),
            tone: self.tone.clone(),
            favorites: self.favorites.then(|| "true".to_string()),
            origin: self.origin.clone(),
            rating: self.rating.clone(),
            date_range: self.date_range.clone(),
            collection: self.collection.clone(),
            sort: self.sort.clone(),
            page: self.page.clone(),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum CollectionCommand {
    Create {
        #[arg(long)]
        user: String,
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = DEFAULT_COLOR)]
        color: String,
        #[arg(long, default_value = DEFAULT_ICON)]
        icon: String,
    },
    List {
        #[arg(long)]
        user: String,
        #[arg(long)]
        json: bool,
    },
    Update {
        #[arg(long)]
        user: String,
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        icon: Option<String>,
    },
    Delete {
        #[arg(long)]
        user: String,
        id: i64,
    },
    /// Move stories into a collection, or out of every collection
    Move {
        #[arg(long)]
        user: String,
        #[arg(long, required_unless_present = "uncategorized")]
        to: Option<i64>,
        #[arg(long, conflicts_with = "to")]
        uncategorized: bool,
        #[arg(required = true)]
        ids: Vec<i64>,
    },
}

pub async fn run(app: &App, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Account { action } => match action {
            AccountCommand::Create { username } => {
                let account = app.create_account(&username).await?;
                println!("Created account '{}' (id {})", account.username, account.id);
            }
            AccountCommand::Delete { username } => {
                app.delete_account(&username).await?;
                println!("Deleted account '{}'", username);
            }
        },

        Command::Generate(args) => {
            let owner = app.account(&args.user).await?;
            let (genre, length, tone) = app.preferred_choices(&owner).await?;
            let mut input = GenerateStory::new(
                args.keywords,
                choice_or("genre", args.genre.as_deref(), genre)?,
                choice_or("length", args.length.as_deref(), length)?,
                choice_or("tone", args.tone.as_deref(), tone)?,
            );
            input.title = args.title;
            input.collection_id = args.collection;
            input.is_public = args.public;
            input.force_template = args.template_only;

            let story = app.generate_story(&owner, input).await?;
            print_story(&story);
        }

        Command::List(args) => {
            let owner = app.account(&args.user).await?;
            let page = app.list_stories(&owner, &args.params()).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&page)?);
            } else {
                print_page(&page);
            }
        }

        Command::Show { user, id, json } => {
            let owner = app.account(&user).await?;
            let story = app.get_story(&owner, id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&story)?);
            } else {
                print_story(&story);
            }
        }

        Command::Rate { user, id, rating } => {
            let owner = app.account(&user).await?;
            let story = app.rate_story(&owner, id, rating).await?;
            println!("Story {} rated {}", story.id, story.rating_label());
        }

        Command::Favorite { user, id } => {
            let owner = app.account(&user).await?;
            let favorite = app.toggle_favorite(&owner, id).await?;
            println!(
                "Story {} {} favorites",
                id,
                if favorite { "added to" } else { "removed from" }
            );
        }

        Command::Publish { user, id, private } => {
            let owner = app.account(&user).await?;
            let story = app.set_public(&owner, id, !private).await?;
            println!(
                "Story {} is now {}",
                story.id,
                if story.is_public { "public" } else { "private" }
            );
        }

        Command::Delete { user, id } => {
            let owner = app.account(&user).await?;
            app.delete_story(&owner, id).await?;
            println!("Deleted story {}", id);
        }

        Command::Gallery { genre } => {
            let genre = genre
                .as_deref()
                .map(|g| parse_choice::<Genre>("genre", g))
                .transpose()?;
            let stories = app.public_gallery(genre).await?;
            if stories.is_empty() {
                println!("No public stories yet.");
            }
            for story in &stories {
                print_summary_line(story);
            }
        }

        Command::Collection { action } => run_collection(app, action).await?,

        Command::Export {
            user,
            id,
            format,
            out,
        } => {
            let owner = app.account(&user).await?;
            let file = app
                .export_story(&owner, id, ExportFormat::parse(&format)?)
                .await?;
            write_export(&file, out.as_deref())?;
        }

        Command::Bundle {
            user,
            ids,
            format,
            out,
        } => {
            let owner = app.account(&user).await?;
            let format = ExportFormat::parse(&format)?;
            let file = if ids.is_empty() {
                app.export_all(&owner, format).await?
            } else {
                app.export_stories(&owner, &ids, format).await?
            };
            write_export(&file, out.as_deref())?;
        }

        Command::Profile {
            user,
            genre,
            length,
            tone,
        } => {
            let owner = app.account(&user).await?;
            let mut profile = app.profile(&owner).await?;
            if genre.is_some() || length.is_some() || tone.is_some() {
                let prefs = Preferences {
                    favorite_genre: optional_choice::<Genre>("genre", genre.as_deref())?
                        .or(profile.favorite_genre),
                    preferred_length: optional_choice::<StoryLength>("length", length.as_deref())?
                        .or(profile.preferred_length),
                    preferred_tone: optional_choice::<Tone>("tone", tone.as_deref())?
                        .or(profile.preferred_tone),
                };
                profile = app.update_preferences(&owner, prefs).await?;
            }
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }

        Command::Status => {
            for tier in app.ai_status() {
                println!(
                    "{:<13} {:<28} {}",
                    tier.method.to_string(),
                    tier.model,
                    if tier.available { "available" } else { "not configured" }
                );
            }
        }
    }
    Ok(())
}

async fn run_collection(app: &App, action: CollectionCommand) -> anyhow::Result<()> {
    match action {
        CollectionCommand::Create {
            user,
            name,
            description,
            color,
            icon,
        } => {
            let owner = app.account(&user).await?;
            let collection = app
                .create_collection(
                    &owner,
                    NewCollection {
                        name,
                        description,
                        color,
                        icon,
                    },
                )
                .await?;
            println!("Created collection '{}' (id {})", collection.name, collection.id);
        }
        CollectionCommand::List { user, json } => {
            let owner = app.account(&user).await?;
            let listing = app.list_collections(&owner).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&listing)?);
                return Ok(());
            }
            for summary in &listing.collections {
                let c = &summary.collection;
                println!(
                    "{:>4}  {:<30} {:>3} stories {:>6} words{}",
                    c.id,
                    c.name,
                    summary.story_count,
                    summary.total_words,
                    if c.is_default { "  (default)" } else { "" }
                );
            }
            println!("      Uncategorized: {} stories", listing.uncategorized_count);
        }
        CollectionCommand::Update {
            user,
            id,
            name,
            description,
            color,
            icon,
        } => {
            let owner = app.account(&user).await?;
            let collection = app
                .update_collection(
                    &owner,
                    id,
                    CollectionUpdate {
                        name,
                        description,
                        color,
                        icon,
                    },
                )
                .await?;
            println!("Updated collection '{}'", collection.name);
        }
        CollectionCommand::Delete { user, id } => {
            let owner = app.account(&user).await?;
            let detached = app.delete_collection(&owner, id).await?;
            println!("Deleted collection {}; {} stories are now uncategorized", id, detached);
        }
        CollectionCommand::Move {
            user,
            to,
            uncategorized,
            ids,
        } => {
            let owner = app.account(&user).await?;
            let target = if uncategorized { None } else { to };
            let moved = app.move_to_collection(&owner, &ids, target).await?;
            match target {
                Some(id) => println!("Moved {} stories to collection {}", moved, id),
                None => println!("Moved {} stories out of their collections", moved),
            }
        }
    }
    Ok(())
}

/// Exit status for a failed command: 2 when the input was at fault, 1 otherwise.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    let caller = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<AppError>())
        .is_some_and(AppError::is_caller_error);
    if caller {
        2
    } else {
        1
    }
}

fn choice_or<T: std::str::FromStr>(field: &str, value: Option<&str>, fallback: T) -> anyhow::Result<T> {
    Ok(optional_choice(field, value)?.unwrap_or(fallback))
}

fn optional_choice<T: std::str::FromStr>(field: &str, value: Option<&str>) -> anyhow::Result<Option<T>> {
    Ok(value.map(|v| parse_choice::<T>(field, v)).transpose()?)
}

fn write_export(file: &ExportFile, out: Option<&Path>) -> anyhow::Result<()> {
    let path = out
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&file.file_name));
    std::fs::write(&path, &file.bytes)
        .with_context(|| format!("writing export to {}", path.display()))?;
    println!(
        "Wrote {} ({}, {} bytes)",
        path.display(),
        file.content_type,
        file.bytes.len()
    );
    Ok(())
}

fn print_summary_line(story: &Story) {
    println!(
        "{:>4}  {:<40} {:<16} {:>5} words  {}{}",
        story.id,
        story.display_title(),
        story.genre.label(),
        story.word_count(),
        story.rating_label(),
        if story.is_favorite { "  *" } else { "" }
    );
}

fn print_page(page: &Page<Story>) {
    if page.items.is_empty() {
        println!("No stories match.");
        return;
    }
    for story in &page.items {
        print_summary_line(story);
    }
    println!(
        "Page {} of {} ({} stories)",
        page.page, page.total_pages, page.total_items
    );
}

fn print_story(story: &Story) {
    println!("#{} {}", story.id, story.display_title());
    println!(
        "{} | {} | {} | {} words | {}",
        story.genre.label(),
        story.length.label(),
        story.tone.label(),
        story.word_count(),
        story.rating_label()
    );
    println!(
        "Keywords: {} | {} via {} in {:.2}s",
        story.keywords,
        story.generation_method.label(),
        story.model_used,
        story.generation_time
    );
    println!();
    println!("{}", story.content);
}
