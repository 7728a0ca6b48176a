//! Cache-first article processing.
//!
//! A fully cached article is returned as-is. Anything missing is fetched, parsed or
//! summarized, and the resolved triple is written back through the cache's merge-upsert.
//! Concurrent calls for the same URL share one computation unless coalescing is disabled.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;

use crate::ai::Summarizer;
use crate::config::Config;
use crate::db::ArticleCache;
use crate::error::PipelineError;
use crate::models::{ArticleUpdate, ProcessedArticle};
use crate::services::{ContentExtractor, MetadataParser};

type PipelineResult = std::result::Result<ProcessedArticle, PipelineError>;
type SharedComputation = Shared<BoxFuture<'static, PipelineResult>>;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub model: String,
    pub extraction_timeout: Duration,
    pub summarization_timeout: Duration,
    pub coalesce: bool,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.summary_model.clone(),
            extraction_timeout: config.extraction_timeout(),
            summarization_timeout: config.summarization_timeout(),
            coalesce: config.coalesce_requests,
        }
    }
}

struct InFlight {
    id: u64,
    computation: SharedComputation,
}

/// Collaborators and settings needed to resolve one URL. Shared with spawned computations.
struct Resolver {
    cache: Arc<ArticleCache>,
    extractor: Arc<dyn ContentExtractor>,
    parser: Arc<dyn MetadataParser>,
    summarizer: Arc<dyn Summarizer>,
    settings: PipelineSettings,
}

type InFlightMap = Arc<Mutex<HashMap<String, InFlight>>>;

pub struct ProcessingPipeline {
    resolver: Arc<Resolver>,
    in_flight: InFlightMap,
    next_id: AtomicU64,
}

impl ProcessingPipeline {
    pub fn new(
        cache: Arc<ArticleCache>,
        extractor: Arc<dyn ContentExtractor>,
        parser: Arc<dyn MetadataParser>,
        summarizer: Arc<dyn Summarizer>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            resolver: Arc::new(Resolver {
                cache,
                extractor,
                parser,
                summarizer,
                settings,
            }),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Resolve text, metadata and summary for `url`.
    ///
    /// With coalescing on, the work runs in its own task. A caller that is dropped
    /// does not cancel it, and the task clears its map entry when it finishes.
    pub async fn process(&self, url: &str) -> PipelineResult {
        if !self.resolver.settings.coalesce {
            return self.resolver.compute(url).await;
        }

        let computation = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(url) {
                Some(entry) => {
                    tracing::debug!("Joining in-flight processing for: {}", url);
                    entry.computation.clone()
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let computation = self.spawn_computation(id, url);
                    in_flight.insert(
                        url.to_string(),
                        InFlight {
                            id,
                            computation: computation.clone(),
                        },
                    );
                    computation
                }
            }
        };

        computation.await
    }

    // Called with the map locked, so the entry is inserted before the task can remove it.
    fn spawn_computation(&self, id: u64, url: &str) -> SharedComputation {
        let resolver = Arc::clone(&self.resolver);
        let in_flight = Arc::clone(&self.in_flight);
        let key = url.to_string();

        let task = tokio::spawn(async move {
            let result = resolver.compute(&key).await;
            let mut in_flight = in_flight.lock().await;
            if in_flight.get(&key).is_some_and(|entry| entry.id == id) {
                in_flight.remove(&key);
            }
            result
        });

        task.map(|joined| {
            joined.unwrap_or_else(|e| Err(PipelineError::Interrupted(e.to_string())))
        })
        .boxed()
        .shared()
    }

    /// One-shot summary of arbitrary text; nothing is cached.
    pub async fn summarize_text(&self, text: &str) -> Result<String, PipelineError> {
        self.resolver.summarize(text).await
    }
}

impl Resolver {
    async fn compute(&self, url: &str) -> PipelineResult {
        tracing::info!("Processing URL: {}", url);

        let cached = self.cache.get(url).await;
        if let Some(record) = cached.as_ref().filter(|r| r.is_complete()) {
            tracing::info!("Found complete cached data for: {}", url);
            return Ok(ProcessedArticle {
                url: url.to_string(),
                og_metadata: record.og_metadata.clone(),
                text_content: record.text_content.clone(),
                summary: record.summary.clone(),
                cached: true,
            });
        }

        let (mut text_content, mut summary, mut og_metadata) = cached
            .map(|r| (r.text_content, r.summary, r.og_metadata))
            .unwrap_or_default();

        if text_content.is_empty() || og_metadata.is_empty() {
            let raw = self.fetch(url).await?;
            if og_metadata.is_empty() {
                og_metadata = self.parser.parse_open_graph(&raw);
            }
            if text_content.is_empty() {
                text_content = self.extract_text(raw).await?;
            }
        }

        if summary.is_empty() {
            summary = self.summarize(&text_content).await?;
        }

        let update = ArticleUpdate::new()
            .text(text_content.clone())
            .summary(summary.clone())
            .metadata(og_metadata.clone());
        if let Err(e) = self.cache.put(url, update).await {
            tracing::warn!("Returning uncached result for {}: {}", url, e);
        }

        Ok(ProcessedArticle {
            url: url.to_string(),
            og_metadata,
            text_content,
            summary,
            cached: false,
        })
    }

    async fn fetch(&self, url: &str) -> Result<String, PipelineError> {
        with_timeout(self.settings.extraction_timeout, self.extractor.fetch(url))
            .await
            .map_err(|e| {
                tracing::error!("Extraction failed for {}: {}", url, e);
                PipelineError::Extraction(e)
            })
    }

    // html2text is CPU-bound; keep it off the async workers.
    async fn extract_text(&self, raw: String) -> Result<String, PipelineError> {
        let extractor = Arc::clone(&self.extractor);
        tokio::task::spawn_blocking(move || extractor.extract_text(&raw))
            .await
            .map_err(|e| PipelineError::Extraction(e.to_string()))
    }

    async fn summarize(&self, text: &str) -> Result<String, PipelineError> {
        with_timeout(
            self.settings.summarization_timeout,
            self.summarizer.summarize(text, &self.settings.model),
        )
        .await
        .map_err(|e| {
            tracing::error!("Summarization failed: {}", e);
            PipelineError::Summarization(e)
        })
    }
}

async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, String>
where
    F: Future<Output = crate::error::Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(_) => Err(format!("timed out after {}s", limit.as_secs_f64())),
    }
}
