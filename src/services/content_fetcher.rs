use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Client;
use url::Url;

use crate::error::Result;

use super::ContentExtractor;

const USER_AGENT_STRING: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";
const TEXT_WIDTH: usize = 100;

// Elements whose content is never part of the article body.
const BOILERPLATE_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "header", "footer", "aside", "form", "svg", "iframe",
    "figure",
];

static BOILERPLATE_RES: OnceLock<Vec<Regex>> = OnceLock::new();
static MAIN_CONTENT_RE: OnceLock<Option<Regex>> = OnceLock::new();
static FOOTNOTE_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn boilerplate_res() -> &'static [Regex] {
    BOILERPLATE_RES.get_or_init(|| {
        BOILERPLATE_TAGS
            .iter()
            .filter_map(|tag| Regex::new(&format!(r"(?is)<{tag}\b.*?</{tag}\s*>")).ok())
            .chain(Regex::new(r"(?is)<img\b[^>]*>").ok())
            .chain(Regex::new(r"(?s)<!--.*?-->").ok())
            .collect()
    })
}

fn main_content_re() -> Option<&'static Regex> {
    MAIN_CONTENT_RE
        .get_or_init(|| Regex::new(r"(?is)<(article|main)\b[^>]*>(.*)</(?:article|main)\s*>").ok())
        .as_ref()
}

fn footnote_re() -> Option<&'static Regex> {
    FOOTNOTE_RE
        .get_or_init(|| Regex::new(r"^\[\d+\]:\s").ok())
        .as_ref()
}

pub struct ContentFetcher {
    client: Client,
}

impl ContentFetcher {
    pub fn new(timeout: Duration) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
        );

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .default_headers(headers)
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }

    /// Strip boilerplate elements and narrow to `<article>`/`<main>` when present.
    fn readable_html(html: &str) -> String {
        let mut cleaned = html.to_string();
        for re in boilerplate_res() {
            cleaned = re.replace_all(&cleaned, " ").into_owned();
        }

        if let Some(body) = main_content_re()
            .and_then(|re| re.captures(&cleaned))
            .and_then(|cap| cap.get(2))
        {
            return body.as_str().to_string();
        }
        cleaned
    }
}

#[async_trait]
impl ContentExtractor for ContentFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let parsed = Url::parse(url).map_err(|e| anyhow::anyhow!("Invalid URL {}: {}", url, e))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(anyhow::anyhow!("Unsupported URL scheme: {}", parsed.scheme()).into());
        }

        let response = self.client.get(parsed).send().await?;

        if !response.status().is_success() {
            tracing::debug!("Failed to fetch {}: {}", url, response.status());
            return Err(anyhow::anyhow!("Failed to fetch page: HTTP {}", response.status()).into());
        }

        Ok(response.text().await?)
    }

    fn extract_text(&self, raw: &str) -> String {
        let html = Self::readable_html(raw);

        let text = match html2text::from_read(html.as_bytes(), TEXT_WIDTH) {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!("Failed to convert HTML to text: {}", e);
                return String::new();
            }
        };

        // Drop link footnotes and collapse blank lines
        text.lines()
            .map(|l| l.trim_end())
            .filter(|l| !l.trim().is_empty())
            .filter(|l| !footnote_re().is_some_and(|re| re.is_match(l)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for ContentFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}
