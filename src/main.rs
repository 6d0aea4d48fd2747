use anyhow::Context;
use clap::Parser;

use story_forge::cli::{self, Cli};
use story_forge::{App, Config};

#[tokio::main]
async fn main() {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();

    if let Err(e) = run(args).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(cli::exit_code(&e));
    }
}

async fn run(args: Cli) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load().context("loading config")?,
    };

    let app = App::new(&config)
        .await
        .with_context(|| format!("opening story database at {}", config.db_path))?;

    cli::run(&app, args.command).await
}
