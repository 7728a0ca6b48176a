use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Open Graph properties keyed by the suffix after `og:` (`title`, `image`, ...).
pub type OgMetadata = BTreeMap<String, String>;

/// One cached article. Absent fields are empty, never null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub url: String,
    pub text_content: String,
    pub summary: String,
    pub og_metadata: OgMetadata,
    /// Last time the row was written, not first-seen time.
    pub created_at: DateTime<Utc>,
}

impl ArticleRecord {
    /// True when text, summary and metadata are all non-empty.
    pub fn is_complete(&self) -> bool {
        !self.text_content.is_empty() && !self.summary.is_empty() && !self.og_metadata.is_empty()
    }
}

/// A partial write to the cache. `None` fields keep whatever is already stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleUpdate {
    pub text_content: Option<String>,
    pub summary: Option<String>,
    pub og_metadata: Option<OgMetadata>,
}

impl ArticleUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text_content = Some(text.into());
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn metadata(mut self, metadata: OgMetadata) -> Self {
        self.og_metadata = Some(metadata);
        self
    }

    /// Resolve every field against the existing row: a supplied value wins, then a
    /// non-empty stored value, then the empty default.
    pub fn merge(self, existing: Option<&ArticleRecord>) -> (String, String, OgMetadata) {
        let text_content = self.text_content.unwrap_or_else(|| {
            existing
                .map(|r| r.text_content.clone())
                .unwrap_or_default()
        });
        let summary = self
            .summary
            .unwrap_or_else(|| existing.map(|r| r.summary.clone()).unwrap_or_default());
        let og_metadata = self
            .og_metadata
            .unwrap_or_else(|| existing.map(|r| r.og_metadata.clone()).unwrap_or_default());

        (text_content, summary, og_metadata)
    }
}

/// Row shape returned by the recent-articles listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecentArticle {
    pub url: String,
    pub metadata: OgMetadata,
    pub created_at: DateTime<Utc>,
}

/// Fully resolved pipeline output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedArticle {
    pub url: String,
    pub og_metadata: OgMetadata,
    pub text_content: String,
    pub summary: String,
    /// Only true when every field was served from the cache.
    pub cached: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(text: &str, summary: &str, title: Option<&str>) -> ArticleRecord {
        let mut og_metadata = OgMetadata::new();
        if let Some(title) = title {
            og_metadata.insert("title".to_string(), title.to_string());
        }
        ArticleRecord {
            url: "https://a".to_string(),
            text_content: text.to_string(),
            summary: summary.to_string(),
            og_metadata,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn merge_without_existing_uses_defaults() {
        let (text, summary, metadata) = ArticleUpdate::new().text("Hello").merge(None);
        assert_eq!(text, "Hello");
        assert_eq!(summary, "");
        assert!(metadata.is_empty());
    }

    #[test]
    fn merge_keeps_stored_fields_that_were_not_supplied() {
        let existing = record("Hello", "", None);
        let mut metadata = OgMetadata::new();
        metadata.insert("title".to_string(), "A".to_string());

        let (text, summary, merged) = ArticleUpdate::new()
            .summary("Sum")
            .metadata(metadata.clone())
            .merge(Some(&existing));

        assert_eq!(text, "Hello");
        assert_eq!(summary, "Sum");
        assert_eq!(merged, metadata);
    }

    #[test]
    fn supplied_value_replaces_stored_value() {
        let existing = record("old", "old summary", Some("Old"));
        let (text, summary, metadata) = ArticleUpdate::new().text("new").merge(Some(&existing));
        assert_eq!(text, "new");
        assert_eq!(summary, "old summary");
        assert_eq!(metadata.get("title").map(String::as_str), Some("Old"));
    }

    #[test]
    fn completeness_requires_all_three_fields() {
        assert!(record("t", "s", Some("x")).is_complete());
        assert!(!record("t", "s", None).is_complete());
        assert!(!record("", "s", Some("x")).is_complete());
        assert!(!record("t", "", Some("x")).is_complete());
    }
}
