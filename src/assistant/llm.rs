//! Chat-completion client for the hosted LLM providers.
//!
//! All three providers are asked for a JSON-only reply. The caller treats
//! any error here as "use the rule-based parser instead"; nothing retries.

use crate::settings::LlmSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
    Groq,
}

impl Provider {
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini-1.5-flash",
            Provider::OpenAi => "gpt-4o-mini",
            Provider::Groq => "llama-3.1-8b-instant",
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::Groq => "https://api.groq.com/openai/v1",
        }
    }

    pub fn parse(name: &str) -> Option<Provider> {
        match name.trim().to_ascii_lowercase().as_str() {
            "gemini" => Some(Provider::Gemini),
            "openai" => Some(Provider::OpenAi),
            "groq" => Some(Provider::Groq),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("provider returned no text")]
    EmptyReply,
}

// ── Wire types ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    system_instruction: GeminiSystem<'a>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiSystem<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiReplyContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiReplyContent {
    #[serde(default)]
    parts: Vec<GeminiReplyPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiReplyPart {
    #[serde(default)]
    text: String,
}

/// OpenAI and Groq share this shape.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
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

// ── Client ─────────────────────────────────────────────────────

/// Cheap to clone; clone it out of shared state before awaiting.
#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    provider: Provider,
    model: String,
    endpoint: String,
    api_key: String,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl LlmClient {
    pub fn new(settings: &LlmSettings, api_key: impl Into<String>) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        let provider = settings.provider;
        Ok(LlmClient {
            http,
            provider,
            model: settings
                .model
                .clone()
                .unwrap_or_else(|| provider.default_model().to_string()),
            endpoint: settings
                .endpoint
                .clone()
                .unwrap_or_else(|| provider.default_endpoint().to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send one system + user exchange and return the raw reply text.
    #[tracing::instrument(skip_all, fields(provider = ?self.provider, model = %self.model))]
    pub async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let text = match self.provider {
            Provider::Gemini => self.complete_gemini(system, prompt).await?,
            Provider::OpenAi | Provider::Groq => self.complete_chat(system, prompt).await?,
        };
        if text.trim().is_empty() {
            return Err(LlmError::EmptyReply);
        }
        tracing::debug!(chars = text.len(), "llm reply received");
        Ok(text)
    }

    async fn complete_gemini(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPart { text: prompt }],
            }],
            system_instruction: GeminiSystem {
                parts: vec![GeminiPart { text: system }],
            },
            generation_config: GeminiGenerationConfig {
                temperature: 0.1,
                response_mime_type: "application/json",
            },
        };

        let resp = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let parsed: GeminiResponse = resp.json().await?;

        parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .map(|p| p.text)
            .find(|t| !t.trim().is_empty())
            .ok_or(LlmError::EmptyReply)
    }

    async fn complete_chat(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.endpoint);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: prompt },
            ],
            temperature: 0.1,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let parsed: ChatResponse = resp.json().await?;

        parsed
            .choices
            .into_iter()
            .filter_map(|c| c.message.content)
            .next()
            .ok_or(LlmError::EmptyReply)
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = clip(resp.text().await.unwrap_or_default(), ERROR_BODY_LIMIT);
    Err(LlmError::Status { status: status.as_u16(), body })
}

const ERROR_BODY_LIMIT: usize = 500;

/// Cut to at most `max` bytes without splitting a character.
fn clip(mut text: String, max: usize) -> String {
    if text.len() > max {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::test_server::StubProvider;
    use axum::http::StatusCode;

    #[test]
    fn provider_names() {
        assert_eq!(Provider::parse("OpenAI"), Some(Provider::OpenAi));
        assert_eq!(Provider::parse("groq"), Some(Provider::Groq));
        assert_eq!(Provider::parse("claude"), None);

        let p: Provider = serde_json::from_str(r#""openai""#).unwrap();
        assert_eq!(p, Provider::OpenAi);
    }

    #[test]
    fn client_fills_provider_defaults() {
        let settings = LlmSettings { provider: Provider::Groq, ..LlmSettings::default() };
        let client = LlmClient::new(&settings, "k").unwrap();
        assert_eq!(client.model(), "llama-3.1-8b-instant");
        assert_eq!(client.endpoint, "https://api.groq.com/openai/v1");
    }

    #[test]
    fn debug_hides_the_key() {
        let client = LlmClient::new(&LlmSettings::default(), "super-secret").unwrap();
        assert!(!format!("{client:?}").contains("super-secret"));
    }

    #[test]
    fn chat_request_asks_for_json() {
        let body = ChatRequest {
            model: "m",
            messages: vec![ChatMessage { role: "user", content: "hi" }],
            temperature: 0.1,
            response_format: ResponseFormat { kind: "json_object" },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
    }

    #[test]
    fn clip_respects_char_boundaries() {
        assert_eq!(clip("héllo".into(), 2), "h");
        assert_eq!(clip("héllo".into(), 3), "hé");
        assert_eq!(clip("short".into(), 500), "short");
    }

    #[tokio::test]
    async fn error_body_with_multibyte_text_is_clipped() {
        let body = format!("{}é tail", "x".repeat(499));
        let stub = StubProvider::spawn(StatusCode::TOO_MANY_REQUESTS, body).await;
        let settings = LlmSettings { provider: Provider::OpenAi, endpoint: Some(stub.endpoint.clone()), ..LlmSettings::default() };
        let client = LlmClient::new(&settings, "k").unwrap();

        match client.complete("system", "prompt").await {
            Err(LlmError::Status { status, body }) => {
                assert_eq!(status, 429);
                assert_eq!(body, "x".repeat(499));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn openai_request_shape() {
        let reply = r#"{"choices":[{"message":{"content":"{\"action\":\"SHOW_ANALYTICS\"}"}}]}"#;
        let stub = StubProvider::spawn(StatusCode::OK, reply).await;
        let settings = LlmSettings { provider: Provider::OpenAi, endpoint: Some(stub.endpoint.clone()), ..LlmSettings::default() };
        let client = LlmClient::new(&settings, "sk-test").unwrap();

        let text = client.complete("be terse", "show stats").await.unwrap();
        assert_eq!(text, r#"{"action":"SHOW_ANALYTICS"}"#);

        let seen = stub.requests();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].path, "/chat/completions");
        assert_eq!(seen[0].authorization.as_deref(), Some("Bearer sk-test"));
        assert_eq!(seen[0].body["model"], "gpt-4o-mini");
        assert_eq!(seen[0].body["messages"][0]["role"], "system");
        assert_eq!(seen[0].body["messages"][1]["content"], "show stats");
        assert_eq!(seen[0].body["response_format"]["type"], "json_object");
    }

    #[tokio::test]
    async fn gemini_request_shape() {
        let reply = r#"{"candidates":[{"content":{"parts":[{"text":"{\"action\":\"SHOW_ANALYTICS\"}"}]}}]}"#;
        let stub = StubProvider::spawn(StatusCode::OK, reply).await;
        let settings = LlmSettings { provider: Provider::Gemini, endpoint: Some(stub.endpoint.clone()), ..LlmSettings::default() };
        let client = LlmClient::new(&settings, "g-key").unwrap();

        assert_eq!(client.complete("be terse", "show stats").await.unwrap(), r#"{"action":"SHOW_ANALYTICS"}"#);

        let seen = stub.requests();
        assert_eq!(seen[0].path, "/models/gemini-1.5-flash:generateContent");
        assert_eq!(seen[0].api_key.as_deref(), Some("g-key"));
        assert_eq!(seen[0].body["systemInstruction"]["parts"][0]["text"], "be terse");
        assert_eq!(seen[0].body["contents"][0]["parts"][0]["text"], "show stats");
        assert_eq!(seen[0].body["generationConfig"]["responseMimeType"], "application/json");
    }

    #[test]
    fn gemini_reply_text_is_extracted() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"{\"action\":\"SHOW_ANALYTICS\"}"}]}}]}"#;
        let parsed: GeminiResponse = serde_json::from_str(raw).unwrap();
        let text = parsed.candidates[0].content.as_ref().unwrap().parts[0].text.clone();
        assert_eq!(text, r#"{"action":"SHOW_ANALYTICS"}"#);
    }
}
