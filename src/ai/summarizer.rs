use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

use super::Summarizer;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

/// Summarizes text through an OpenRouter-compatible chat-completions endpoint.
pub struct OpenRouterSummarizer {
    client: Client,
    api_key: Option<String>,
    api_url: String,
}

impl OpenRouterSummarizer {
    pub fn new(api_key: Option<String>, api_url: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            api_key,
            api_url,
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

fn build_prompt(text: &str) -> String {
    format!(
        r#"Summarize article text surrounded by <content> </content> tags into structured key ideas, making it easy to read and comprehend. Determine the content language in it but don't mention it. Only respond in Bahasa Indonesia if you detect Indonesian language in it. Otherwise, always respond in English. The answer should be concise, clear, and capture the main points of the content. Start the response directly without any preamble or introductory statements. Do not inform that it's a summary. End with important quote taken from the article that is unique and capture attention.
<content>
{}
</content>
"#,
        text
    )
}

#[async_trait]
impl Summarizer for OpenRouterSummarizer {
    async fn summarize(&self, text: &str, model: &str) -> Result<String> {
        let Some(api_key) = &self.api_key else {
            return Err(AppError::SummaryApi(
                "OpenRouter API key not configured".to_string(),
            ));
        };

        let request = ChatRequest {
            model,
            messages: vec![Message {
                role: "user".to_string(),
                content: build_prompt(text),
            }],
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            tracing::debug!("Summary request for model {} failed with {}", model, status);
            return Err(AppError::SummaryApi(format!("API error: {}", error_text)));
        }

        let chat_response: ChatResponse = response.json().await?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AppError::SummaryApi("No choices returned from API".to_string()))
    }
}
