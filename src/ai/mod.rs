mod summarizer;

use async_trait::async_trait;

use crate::error::Result;

pub use summarizer::OpenRouterSummarizer;

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str, model: &str) -> Result<String>;
}
