use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{ArticleRecord, ArticleUpdate, OgMetadata, RecentArticle};

use super::schema::SCHEMA;

/// Persistent article store keyed by URL.
///
/// Reads are best-effort: any storage or decode failure is logged and reported as a miss.
/// Writes merge the supplied fields onto the stored row inside a single immediate
/// transaction, so concurrent puts for the same URL cannot lose each other's fields.
pub struct ArticleCache {
    conn: Connection,
}

impl ArticleCache {
    pub async fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    pub async fn close(self) -> Result<()> {
        self.conn.close().await?;
        Ok(())
    }

    /// Make every subsequent read and write fail.
    #[cfg(test)]
    pub(crate) async fn break_storage(&self) {
        self.conn
            .call(|conn| {
                conn.execute_batch("DROP TABLE article_cache")?;
                Ok(())
            })
            .await
            .unwrap();
    }

    /// Look up the record for `url`. Failures degrade to `None`.
    pub async fn get(&self, url: &str) -> Option<ArticleRecord> {
        let key = url.to_string();
        let result = self
            .conn
            .call(move |conn| Ok(fetch_record(conn, &key)?))
            .await;

        match result {
            Ok(Some(record)) => {
                tracing::info!("Cache hit for URL: {}", url);
                Some(record)
            }
            Ok(None) => {
                tracing::info!("Cache miss for URL: {}", url);
                None
            }
            Err(e) => {
                tracing::error!("Error retrieving from cache: {}", e);
                None
            }
        }
    }

    /// Merge-upsert `update` into the row for `url`, stamping it with the current time.
    pub async fn put(&self, url: &str, update: ArticleUpdate) -> Result<()> {
        self.put_at(url, update, Utc::now()).await
    }

    pub(crate) async fn put_at(
        &self,
        url: &str,
        update: ArticleUpdate,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let key = url.to_string();
        let result = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                let existing = fetch_record(&tx, &key)?;
                let (text_content, summary, og_metadata) = update.merge(existing.as_ref());
                let metadata_json = serde_json::to_string(&og_metadata)
                    .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;

                tx.execute(
                    r#"INSERT INTO article_cache (url, text_content, summary, og_metadata, created_at)
                       VALUES (?1, ?2, ?3, ?4, ?5)
                       ON CONFLICT(url) DO UPDATE SET
                           text_content = excluded.text_content,
                           summary = excluded.summary,
                           og_metadata = excluded.og_metadata,
                           created_at = excluded.created_at"#,
                    params![
                        key,
                        text_content,
                        summary,
                        metadata_json,
                        format_timestamp(&now),
                    ],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await;

        match result {
            Ok(()) => {
                tracing::info!("Successfully cached article: {}", url);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Error caching article: {}", e);
                Err(e.into())
            }
        }
    }

    /// Most recently written records with non-empty metadata, newest first.
    /// Failures yield an empty list.
    pub async fn list_recent(&self, limit: usize) -> Vec<RecentArticle> {
        let result = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT url, og_metadata, created_at
                       FROM article_cache
                       WHERE og_metadata IS NOT NULL AND og_metadata NOT IN ('', '{}', 'null')
                       ORDER BY created_at DESC"#,
                )?;
                // Rows whose metadata fails to decode are skipped, so the limit is
                // applied while stepping the cursor rather than in SQL.
                let mut rows = Vec::new();
                for row in stmt.query_map([], recent_from_row)? {
                    if rows.len() >= limit {
                        break;
                    }
                    let article = row?;
                    if !article.metadata.is_empty() {
                        rows.push(article);
                    }
                }
                Ok(rows)
            })
            .await;

        match result {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!("Error getting latest articles: {}", e);
                Vec::new()
            }
        }
    }
}

fn fetch_record(conn: &rusqlite::Connection, url: &str) -> rusqlite::Result<Option<ArticleRecord>> {
    conn.query_row(
        "SELECT url, text_content, summary, og_metadata, created_at FROM article_cache WHERE url = ?1",
        params![url],
        record_from_row,
    )
    .optional()
}

fn record_from_row(row: &Row) -> rusqlite::Result<ArticleRecord> {
    Ok(ArticleRecord {
        url: row.get(0)?,
        text_content: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        summary: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        og_metadata: decode_metadata(row.get::<_, Option<String>>(3)?.as_deref()),
        created_at: row
            .get::<_, Option<String>>(4)?
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    })
}

fn recent_from_row(row: &Row) -> rusqlite::Result<RecentArticle> {
    Ok(RecentArticle {
        url: row.get(0)?,
        metadata: decode_metadata(row.get::<_, Option<String>>(1)?.as_deref()),
        created_at: row
            .get::<_, Option<String>>(2)?
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    })
}

/// Null, empty or undecodable metadata all read back as an empty mapping.
fn decode_metadata(raw: Option<&str>) -> OgMetadata {
    match raw {
        Some(s) if !s.trim().is_empty() => serde_json::from_str(s).unwrap_or_else(|e| {
            tracing::warn!("Discarding undecodable og_metadata: {}", e);
            OgMetadata::new()
        }),
        _ => OgMetadata::new(),
    }
}

// Fixed-width UTC so that lexical order in SQLite matches chronological order.
fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // SQLite datetime('now') format
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}
