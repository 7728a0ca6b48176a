use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::access::{AccessGate, AccessPolicy, ClientRequest, RateLimiter};
use crate::ai::{OpenRouterSummarizer, Summarizer};
use crate::config::Config;
use crate::db::ArticleCache;
use crate::error::{PipelineError, Result};
use crate::models::{ProcessedArticle, RecentArticle};
use crate::pipeline::{PipelineSettings, ProcessingPipeline};
use crate::services::{ContentExtractor, ContentFetcher, MetadataParser, OpenGraphParser};

// Idle rate-limit entries are swept after this many intervals.
const SWEEP_INTERVALS: u32 = 30;

/// Owns every long-lived component and is shared by all request handlers.
pub struct App {
    gate: AccessGate,
    limiter: Arc<RateLimiter>,
    pipeline: Arc<ProcessingPipeline>,
    cache: Arc<ArticleCache>,
    latest_limit: usize,
    sweeper: Option<JoinHandle<()>>,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let cache = ArticleCache::open(&config.db_path).await?;
        let extractor = Arc::new(ContentFetcher::new(config.extraction_timeout()));
        let summarizer = Arc::new(OpenRouterSummarizer::new(
            config.openrouter_api_key.clone(),
            config.summary_api_url.clone(),
            config.summarization_timeout(),
        ));

        log_configuration(config, summarizer.has_api_key());

        Ok(Self::with_components(
            config,
            cache,
            extractor,
            Arc::new(OpenGraphParser::new()),
            summarizer,
        ))
    }

    pub fn with_components(
        config: &Config,
        cache: ArticleCache,
        extractor: Arc<dyn ContentExtractor>,
        parser: Arc<dyn MetadataParser>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        let policy = AccessPolicy::from_config(&config.allowed_hosts, &config.allowed_ips);
        let cache = Arc::new(cache);
        let pipeline = Arc::new(ProcessingPipeline::new(
            Arc::clone(&cache),
            extractor,
            parser,
            summarizer,
            PipelineSettings::from_config(config),
        ));

        Self {
            gate: AccessGate::from_policy(policy),
            limiter: Arc::new(RateLimiter::new(config.rate_limit_interval())),
            pipeline,
            cache,
            latest_limit: config.latest_limit,
            sweeper: None,
        }
    }

    pub fn start_background_tasks(&mut self) {
        if self.sweeper.is_some() {
            return;
        }
        let every = self.limiter.interval() * SWEEP_INTERVALS;
        if every.is_zero() {
            tracing::warn!("Rate limiting disabled; not starting the sweeper");
            return;
        }
        self.sweeper = Some(Arc::clone(&self.limiter).spawn_sweeper(every));
    }

    /// Access gate, then rate limiter keyed by the client address.
    pub async fn admit(&self, request: &ClientRequest<'_>) -> Result<()> {
        self.gate.check(request)?;
        self.limiter
            .admit(request.client_addr)
            .await
            .into_result()?;
        Ok(())
    }

    pub async fn process(&self, url: &str) -> std::result::Result<ProcessedArticle, PipelineError> {
        self.pipeline.process(url).await
    }

    /// Summary for `url` through the cache, or a one-shot uncached summary of `text`.
    /// Returns the summary and whether it was served entirely from the cache.
    pub async fn summarize(
        &self,
        text: &str,
        url: Option<&str>,
    ) -> std::result::Result<(String, bool), PipelineError> {
        match url {
            Some(url) => {
                let article = self.pipeline.process(url).await?;
                Ok((article.summary, article.cached))
            }
            None => Ok((self.pipeline.summarize_text(text).await?, false)),
        }
    }

    pub async fn latest(&self, limit: Option<usize>) -> Vec<RecentArticle> {
        self.cache.list_recent(limit.unwrap_or(self.latest_limit)).await
    }

    /// Stop background work and close the store.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
        drop(self.pipeline);

        match Arc::try_unwrap(self.cache) {
            Ok(cache) => cache.close().await?,
            Err(_) => tracing::warn!("Article cache still in use at shutdown"),
        }
        Ok(())
    }
}

fn log_configuration(config: &Config, has_api_key: bool) {
    tracing::info!("=== API Configuration ===");
    tracing::info!("Database: {}", config.db_path);
    tracing::info!("Allowed Hosts: {:?}", config.allowed_hosts);
    tracing::info!("Allowed IPs: {:?}", config.allowed_ips);
    tracing::info!("Summary model: {}", config.summary_model);
    tracing::info!(
        "OpenRouter API Key configured: {}",
        if has_api_key { "Yes" } else { "No" }
    );
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::error::{AccessError, AppError};

    fn local(addr: &str) -> ClientRequest<'_> {
        ClientRequest {
            host: Some("localhost"),
            client_addr: addr,
        }
    }

    #[tokio::test]
    async fn admission_checks_gate_before_rate_limit() {
        let app = test_app(&test_config()).await;

        let denied = app.admit(&local("10.0.0.5")).await.unwrap_err();
        assert!(matches!(
            denied,
            AppError::Access(AccessError::AccessDenied { .. })
        ));

        tokio_test::assert_ok!(app.admit(&local("127.0.0.1")).await);
        let limited = app.admit(&local("127.0.0.1")).await.unwrap_err();
        assert!(matches!(limited, AppError::RateLimited(r) if r.retry_after_secs == 2));
    }

    #[tokio::test]
    async fn summarize_without_url_is_uncached() {
        let app = test_app(&test_config()).await;

        let (summary, cached) = app.summarize("some text", None).await.unwrap();
        assert_eq!(summary, "summary of some text");
        assert!(!cached);
        assert!(app.latest(None).await.is_empty());
    }

    #[tokio::test]
    async fn summarize_with_url_goes_through_cache() {
        let app = test_app(&test_config()).await;

        let (_, first) = app.summarize("ignored", Some("https://a")).await.unwrap();
        let (_, second) = app.summarize("ignored", Some("https://a")).await.unwrap();
        assert!(!first);
        assert!(second);

        let latest = app.latest(Some(5)).await;
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].url, "https://a");
    }

    #[tokio::test]
    async fn zero_interval_starts_no_sweeper() {
        let mut config = test_config();
        config.rate_limit_interval_secs = 0;
        let mut app = test_app(&config).await;

        app.start_background_tasks();
        assert!(app.sweeper.is_none());

        tokio_test::assert_ok!(app.admit(&local("127.0.0.1")).await);
        tokio_test::assert_ok!(app.admit(&local("127.0.0.1")).await);
        tokio_test::assert_ok!(app.shutdown().await);
    }

    #[tokio::test]
    async fn sweeper_keeps_running_after_start() {
        let mut app = test_app(&test_config()).await;
        app.start_background_tasks();
        tokio::task::yield_now().await;
        assert!(app.sweeper.as_ref().is_some_and(|s| !s.is_finished()));
        tokio_test::assert_ok!(app.shutdown().await);
    }

    #[tokio::test]
    async fn shutdown_closes_cache() {
        let mut app = test_app(&test_config()).await;
        app.start_background_tasks();
        tokio_test::assert_ok!(app.shutdown().await);
    }
}
