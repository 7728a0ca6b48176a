//! HTTP surface. Every route passes the access gate and the rate limiter first.

mod error;
mod preview;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{ConnectInfo, Query, Request, State};
use axum::http::header;
use axum::middleware::{self, Next};
use axum::response::{Html, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::access::ClientRequest;
use crate::app::App;
use crate::models::{OgMetadata, RecentArticle};

pub use error::RestError;
use preview::render_preview;

type AppState = Arc<App>;

#[derive(Debug, Deserialize)]
pub struct UrlInput {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct SummarizeRequest {
    pub text: String,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LatestQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub url: String,
    pub og_metadata: OgMetadata,
    pub text_content: String,
    pub cached: bool,
}

#[derive(Debug, Serialize)]
pub struct SummarizeResponse {
    pub summary: String,
    pub cached: bool,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeContent {
    pub full_text: String,
    pub summary: String,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub url: String,
    pub og_metadata: OgMetadata,
    pub content: AnalyzeContent,
    pub cached: bool,
}

#[derive(Debug, Serialize)]
pub struct LatestArticlesResponse {
    pub articles: Vec<RecentArticle>,
}

pub fn router(app: AppState) -> Router {
    Router::new()
        .route("/extract", post(extract))
        .route("/summarize", post(summarize))
        .route("/analyze", get(analyze))
        .route("/latest", get(latest))
        .route("/preview", get(preview))
        .route("/health", get(health))
        .layer(middleware::from_fn_with_state(app.clone(), admission))
        .with_state(app)
}

/// Reject before any processing when the gate or the rate limiter says no.
async fn admission(
    State(app): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, RestError> {
    let client_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default();
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok());

    app.admit(&ClientRequest {
        host,
        client_addr: &client_addr,
    })
    .await?;

    Ok(next.run(request).await)
}

/// Accept only absolute http(s) URLs; the cache key is the trimmed input as given.
fn validate_url(raw: &str) -> Result<String, RestError> {
    let trimmed = raw.trim();
    let parsed = Url::parse(trimmed).map_err(|e| RestError::InvalidUrl(format!("{trimmed}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(RestError::InvalidUrl(trimmed.to_string()));
    }
    Ok(trimmed.to_string())
}

async fn extract(
    State(app): State<AppState>,
    input: Result<Json<UrlInput>, JsonRejection>,
) -> Result<Json<ExtractResponse>, RestError> {
    let Json(input) = input?;
    let url = validate_url(&input.url)?;
    tracing::info!("Extract endpoint called for URL: {}", url);

    let article = app.process(&url).await?;
    Ok(Json(ExtractResponse {
        url,
        og_metadata: article.og_metadata,
        text_content: article.text_content,
        cached: article.cached,
    }))
}

async fn summarize(
    State(app): State<AppState>,
    request: Result<Json<SummarizeRequest>, JsonRejection>,
) -> Result<Json<SummarizeResponse>, RestError> {
    let Json(request) = request?;
    tracing::info!("Summarize endpoint called");

    let url = request.url.as_deref().map(validate_url).transpose()?;
    let (summary, cached) = app.summarize(&request.text, url.as_deref()).await?;
    Ok(Json(SummarizeResponse { summary, cached }))
}

async fn analyze(
    State(app): State<AppState>,
    input: Result<Query<UrlInput>, QueryRejection>,
) -> Result<Json<AnalyzeResponse>, RestError> {
    let Query(input) = input?;
    let url = validate_url(&input.url)?;
    tracing::info!("Analyze endpoint called for URL: {}", url);

    let article = app.process(&url).await?;
    Ok(Json(AnalyzeResponse {
        url,
        og_metadata: article.og_metadata,
        content: AnalyzeContent {
            full_text: article.text_content,
            summary: article.summary,
        },
        cached: article.cached,
    }))
}

async fn latest(
    State(app): State<AppState>,
    query: Result<Query<LatestQuery>, QueryRejection>,
) -> Result<Json<LatestArticlesResponse>, RestError> {
    let Query(query) = query?;
    tracing::info!("Latest articles endpoint called");
    Ok(Json(LatestArticlesResponse {
        articles: app.latest(query.limit).await,
    }))
}

async fn preview(
    State(app): State<AppState>,
    input: Result<Query<UrlInput>, QueryRejection>,
) -> Result<Html<String>, RestError> {
    let Query(input) = input?;
    let url = validate_url(&input.url)?;
    let article = app.process(&url).await?;
    Ok(Html(render_preview(&article)))
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}
