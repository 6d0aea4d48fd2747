pub mod ai;
pub mod app;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod models;

pub use app::{App, CollectionListing, GenerateStory};
pub use config::Config;
pub use error::{AppError, Result};
