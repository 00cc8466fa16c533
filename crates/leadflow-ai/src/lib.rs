use async_trait::async_trait;
use leadflow_core::extraction::{
    build_prompt, parse_extraction_output, system_prompt, ExtractionError, ExtractionFailureKind,
    LeadExtractor, EMPTY_INPUT_MESSAGE,
};
use leadflow_core::LeadDraft;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorSettings {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Picks the HTTP extractor when an API key is configured, otherwise one that always
/// reports `not_configured`.
pub fn extractor_from_settings(
    settings: &ExtractorSettings,
) -> Result<Arc<dyn LeadExtractor>, ExtractionError> {
    match settings.api_key.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() => Ok(Arc::new(ChatCompletionsExtractor::new(settings)?)),
        _ => {
            info!(event = "ai_extractor_disabled", "no AI API key configured");
            Ok(Arc::new(DisabledExtractor))
        }
    }
}

/// The parse action: rejects blank input, then asks the extractor.
pub async fn parse_lead_text(
    extractor: &dyn LeadExtractor,
    raw_text: &str,
) -> Result<LeadDraft, ExtractionError> {
    if raw_text.trim().is_empty() {
        return Err(ExtractionError::new(
            ExtractionFailureKind::EmptyInput,
            EMPTY_INPUT_MESSAGE,
        ));
    }
    let started = Instant::now();
    match extractor.extract(raw_text).await {
        Ok(draft) => {
            debug!(
                event = "lead_parsed",
                extractor = extractor.name(),
                elapsed_ms = started.elapsed().as_millis() as u64
            );
            Ok(draft)
        }
        Err(err) => {
            warn!(
                event = "lead_parse_failed",
                extractor = extractor.name(),
                kind = %err.kind,
                error = %err.message
            );
            Err(err)
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledExtractor;

#[async_trait]
impl LeadExtractor for DisabledExtractor {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn extract(&self, _raw_text: &str) -> Result<LeadDraft, ExtractionError> {
        Err(ExtractionError::new(
            ExtractionFailureKind::NotConfigured,
            "no AI endpoint is configured",
        ))
    }
}

/// Extractor backed by an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct ChatCompletionsExtractor {
    api_key: String,
    model: String,
    endpoint: String,
    client: Client,
}

impl ChatCompletionsExtractor {
    pub fn new(settings: &ExtractorSettings) -> Result<Self, ExtractionError> {
        let api_key = settings
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                ExtractionError::new(
                    ExtractionFailureKind::NotConfigured,
                    "AI API key cannot be empty",
                )
            })?;

        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|err| {
                ExtractionError::new(
                    ExtractionFailureKind::ProviderError,
                    format!("failed to create HTTP client: {err}"),
                )
            })?;

        Ok(Self {
            api_key: api_key.to_string(),
            model: settings.model.clone(),
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn complete(&self, raw_text: &str) -> Result<String, ExtractionError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt().to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_prompt(raw_text),
                },
            ],
            temperature: 0.0,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::new(
                ExtractionFailureKind::ProviderError,
                format!("provider returned {status}: {}", truncate(&body, 200)),
            ));
        }

        let reply: ChatResponse = response.json().await.map_err(|err| {
            ExtractionError::new(
                ExtractionFailureKind::InvalidOutput,
                format!("unreadable provider response: {err}"),
            )
        })?;
        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                ExtractionError::new(
                    ExtractionFailureKind::InvalidOutput,
                    "provider response had no message content",
                )
            })
    }
}

#[async_trait]
impl LeadExtractor for ChatCompletionsExtractor {
    fn name(&self) -> &str {
        &self.model
    }

    async fn extract(&self, raw_text: &str) -> Result<LeadDraft, ExtractionError> {
        let content = self.complete(raw_text).await?;
        parse_extraction_output(&content)
    }
}

fn transport_error(err: reqwest::Error) -> ExtractionError {
    let kind = if err.is_timeout() {
        ExtractionFailureKind::Timeout
    } else {
        ExtractionFailureKind::ProviderError
    };
    ExtractionError::new(kind, err.to_string())
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_core::LeadPriority;
    use mockito::{Matcher, Server};

    fn settings(endpoint: String) -> ExtractorSettings {
        ExtractorSettings {
            endpoint,
            model: "test-model".to_string(),
            api_key: Some("test-key".to_string()),
            timeout: Duration::from_secs(5),
        }
    }

    fn completion(content: &str) -> String {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
        .to_string()
    }

    #[tokio::test]
    async fn extracts_fields_from_chat_completion() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::PartialJson(serde_json::json!({"model": "test-model"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion(
                "```json\n{\"leadType\":\"Seller\",\"qty\":\"10 MT\",\"priority\":\"Low\"}\n```",
            ))
            .create_async()
            .await;

        let extractor = ChatCompletionsExtractor::new(&settings(server.url())).expect("extractor");
        let draft = parse_lead_text(&extractor, "Selling 10 MT cumin, no rush")
            .await
            .expect("parse");

        assert_eq!(draft.details.lead_type.as_deref(), Some("Seller"));
        assert_eq!(draft.details.qty.as_deref(), Some("10 MT"));
        assert_eq!(draft.priority, Some(LeadPriority::Low));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn provider_errors_are_classified() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body("upstream exploded")
            .create_async()
            .await;

        let extractor = ChatCompletionsExtractor::new(&settings(server.url())).expect("extractor");
        let err = extractor.extract("Need turmeric").await.expect_err("500");
        assert_eq!(err.kind, ExtractionFailureKind::ProviderError);
        assert!(err.message.contains("500"));
    }

    #[tokio::test]
    async fn prose_without_json_is_invalid_output() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion("Sorry, I cannot help with that."))
            .create_async()
            .await;

        let extractor = ChatCompletionsExtractor::new(&settings(server.url())).expect("extractor");
        let err = extractor.extract("Need turmeric").await.expect_err("no json");
        assert_eq!(err.kind, ExtractionFailureKind::InvalidOutput);
    }

    #[tokio::test]
    async fn blank_input_never_reaches_the_extractor() {
        let err = parse_lead_text(&DisabledExtractor, "   \n")
            .await
            .expect_err("empty input");
        assert_eq!(err.kind, ExtractionFailureKind::EmptyInput);
        assert_eq!(err.message, EMPTY_INPUT_MESSAGE);

        let err = parse_lead_text(&DisabledExtractor, "Need turmeric")
            .await
            .expect_err("disabled");
        assert_eq!(err.kind, ExtractionFailureKind::NotConfigured);
    }

    #[test]
    fn missing_key_selects_the_disabled_extractor() {
        let extractor = extractor_from_settings(&ExtractorSettings::default()).expect("extractor");
        assert_eq!(extractor.name(), "disabled");

        let err = ChatCompletionsExtractor::new(&ExtractorSettings {
            api_key: Some("  ".to_string()),
            ..ExtractorSettings::default()
        })
        .expect_err("blank key");
        assert_eq!(err.kind, ExtractionFailureKind::NotConfigured);
    }
}
