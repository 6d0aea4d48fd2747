pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- accounts table
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE COLLATE NOCASE,
    created_at TEXT NOT NULL
);

-- profiles table (counters are refreshed from stories, never edited directly)
CREATE TABLE IF NOT EXISTS profiles (
    account_id INTEGER PRIMARY KEY REFERENCES accounts(id) ON DELETE CASCADE,
    favorite_genre TEXT,
    preferred_length TEXT,
    preferred_tone TEXT,
    stories_generated INTEGER NOT NULL DEFAULT 0,
    favorite_stories_count INTEGER NOT NULL DEFAULT 0,
    average_rating REAL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- collections table
CREATE TABLE IF NOT EXISTS collections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    color TEXT NOT NULL DEFAULT '#6f42c1',
    icon TEXT NOT NULL DEFAULT 'fas fa-folder',
    is_default INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_collections_owner_name
    ON collections(owner_id, name COLLATE NOCASE);

-- stories table
CREATE TABLE IF NOT EXISTS stories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    collection_id INTEGER REFERENCES collections(id) ON DELETE SET NULL,
    title TEXT NOT NULL DEFAULT '',
    keywords TEXT NOT NULL,
    genre TEXT NOT NULL,
    length TEXT NOT NULL,
    tone TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    is_public INTEGER NOT NULL DEFAULT 0,
    is_favorite INTEGER NOT NULL DEFAULT 0,
    rating INTEGER CHECK (rating IS NULL OR rating BETWEEN 1 AND 5),
    generation_time REAL NOT NULL DEFAULT 0,
    generation_method TEXT NOT NULL,
    model_used TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_stories_owner_created ON stories(owner_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_stories_collection_id ON stories(collection_id);
CREATE INDEX IF NOT EXISTS idx_stories_public ON stories(is_public, created_at DESC);
"#;
