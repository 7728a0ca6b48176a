mod content_fetcher;
mod open_graph;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::OgMetadata;

pub use content_fetcher::ContentFetcher;
pub use open_graph::OpenGraphParser;

/// Fetches pages and reduces them to readable text.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// Download the raw HTML for `url`.
    async fn fetch(&self, url: &str) -> Result<String>;

    /// Boilerplate-free article text, or an empty string when nothing readable was found.
    fn extract_text(&self, raw: &str) -> String;
}

pub trait MetadataParser: Send + Sync {
    /// `og:*` properties keyed by their suffix.
    fn parse_open_graph(&self, raw: &str) -> OgMetadata;
}
