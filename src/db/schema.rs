pub const SCHEMA: &str = r#"
-- article_cache table: one row per URL, rewritten on every put
CREATE TABLE IF NOT EXISTS article_cache (
    url TEXT PRIMARY KEY,
    text_content TEXT NOT NULL DEFAULT '',
    summary TEXT NOT NULL DEFAULT '',
    og_metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_article_cache_created_at ON article_cache(created_at DESC);
"#;
