use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use core_types::{CompletionProvider, CompletionRequest, ImagePayload, ProviderConfig, ProviderId};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no API key found in environment variable {env}")]
    MissingApiKey { env: String },
    #[error("{provider:?} returned no text")]
    EmptyCompletion { provider: ProviderId },
}

/// Non-streaming text completion against one configured provider.
pub struct HttpCompletionProvider {
    client: reqwest::Client,
    config: ProviderConfig,
    api_key: String,
    model: String,
}

impl HttpCompletionProvider {
    pub fn new(config: ProviderConfig, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            client,
            model: config.default_model.clone(),
            config,
            api_key: api_key.into(),
        })
    }

    /// Reads the key from the environment variable named in `config`.
    pub fn from_env(config: ProviderConfig, timeout: Duration) -> Result<Self> {
        let api_key = config
            .api_key_from_env()
            .ok_or_else(|| ProviderError::MissingApiKey {
                env: config.api_key_env.clone(),
            })?;
        Self::new(config, api_key, timeout)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn provider_id(&self) -> ProviderId {
        self.config.id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn call_anthropic(&self, request: &CompletionRequest) -> Result<String> {
        let mut body = json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "messages": [{
                "role": "user",
                "content": anthropic_content(request),
            }],
        });
        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(self.api_key.trim()).context("invalid api key header")?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        let payload = self.post_json(&self.url("/v1/messages"), headers, body).await?;
        Ok(extract_anthropic_text(&payload))
    }

    async fn call_openai(&self, request: &CompletionRequest) -> Result<String> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": openai_content(request) }));
        let body = json!({
            "model": self.model,
            "messages": messages,
            "max_completion_tokens": request.max_tokens,
        });

        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key.trim()))
                .context("invalid authorization header")?,
        );
        let payload = self
            .post_json(&self.url("/chat/completions"), headers, body)
            .await?;
        Ok(extract_openai_text(&payload))
    }

    async fn call_gemini(&self, request: &CompletionRequest) -> Result<String> {
        let model = self.model.trim();
        if model.is_empty() {
            bail!("gemini model is required");
        }
        let mut body = json!({
            "contents": [{
                "role": "user",
                "parts": gemini_parts(request),
            }],
            "generationConfig": { "maxOutputTokens": request.max_tokens },
        });
        if let Some(system) = &request.system {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }

        let url = format!(
            "{}?key={}",
            self.url(&format!("/v1beta/models/{model}:generateContent")),
            self.api_key.trim()
        );
        let payload = self.post_json(&url, HeaderMap::new(), body).await?;
        Ok(extract_gemini_text(&payload))
    }

    async fn post_json(&self, url: &str, mut headers: HeaderMap, body: Value) -> Result<Value> {
        apply_extra_headers(&mut headers, &self.config.extra_headers)?;
        let response = self
            .client
            .post(url)
            .headers(headers)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .with_context(|| format!("{:?} request failed", self.config.id))?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            bail!("provider request failed: {status} {text}");
        }
        serde_json::from_str(&text).context("provider returned invalid json")
    }
}

#[async_trait]
impl CompletionProvider for HttpCompletionProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        debug!(
            provider = ?self.config.id,
            model = %self.model,
            max_tokens = request.max_tokens,
            with_image = request.image.is_some(),
            "sending completion request"
        );
        let text = match self.config.id {
            ProviderId::Anthropic => self.call_anthropic(&request).await?,
            ProviderId::OpenAi => self.call_openai(&request).await?,
            ProviderId::Gemini => self.call_gemini(&request).await?,
        };
        let text = text.trim();
        if text.is_empty() {
            return Err(ProviderError::EmptyCompletion {
                provider: self.config.id,
            }
            .into());
        }
        Ok(text.to_string())
    }
}

fn apply_extra_headers(headers: &mut HeaderMap, extra_headers: &[(String, String)]) -> Result<()> {
    for (key, value) in extra_headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| anyhow!("invalid header name: {key}"))?;
        let value =
            HeaderValue::from_str(value).map_err(|_| anyhow!("invalid header value for {key}"))?;
        headers.insert(name, value);
    }
    Ok(())
}

fn anthropic_content(request: &CompletionRequest) -> Value {
    let mut content = vec![json!({ "type": "text", "text": request.prompt })];
    if let Some(ImagePayload {
        media_type,
        data_base64,
    }) = &request.image
    {
        content.push(json!({
            "type": "image",
            "source": {
                "type": "base64",
                "media_type": media_type,
                "data": data_base64,
            }
        }));
    }
    Value::Array(content)
}

fn openai_content(request: &CompletionRequest) -> Value {
    match &request.image {
        None => json!(request.prompt),
        Some(image) => json!([
            { "type": "text", "text": request.prompt },
            {
                "type": "image_url",
                "image_url": {
                    "url": format!("data:{};base64,{}", image.media_type, image.data_base64)
                }
            }
        ]),
    }
}

fn gemini_parts(request: &CompletionRequest) -> Value {
    let mut parts = vec![json!({ "text": request.prompt })];
    if let Some(image) = &request.image {
        parts.push(json!({
            "inline_data": {
                "mime_type": image.media_type,
                "data": image.data_base64,
            }
        }));
    }
    Value::Array(parts)
}

fn extract_anthropic_text(payload: &Value) -> String {
    payload
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

fn extract_openai_text(payload: &Value) -> String {
    payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn extract_gemini_text(payload: &Value) -> String {
    payload
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config(id: ProviderId, base_url: &str) -> ProviderConfig {
        ProviderConfig {
            id,
            base_url: base_url.to_string(),
            api_key_env: "POCKET_NOTES_TEST_KEY_THAT_IS_NOT_SET".to_string(),
            default_model: "test-model".to_string(),
            extra_headers: vec![("x-client".to_string(), "pocket-notes".to_string())],
            enabled: true,
        }
    }

    fn provider(id: ProviderId, base_url: &str) -> HttpCompletionProvider {
        HttpCompletionProvider::new(config(id, base_url), "sk-test", Duration::from_secs(5))
            .expect("provider")
    }

    fn image() -> ImagePayload {
        ImagePayload {
            media_type: "image/png".to_string(),
            data_base64: "aGVsbG8=".to_string(),
        }
    }

    #[test]
    fn extracts_text_from_each_payload_shape() {
        let anthropic = json!({
            "content": [
                {"type": "text", "text": "Hello "},
                {"type": "tool_use", "name": "ignored"},
                {"type": "text", "text": "world"}
            ]
        });
        assert_eq!(extract_anthropic_text(&anthropic), "Hello world");

        let openai = json!({"choices": [{"message": {"content": "Hi"}}]});
        assert_eq!(extract_openai_text(&openai), "Hi");

        let gemini = json!({"candidates": [{"content": {"parts": [{"text": "A"}, {"text": "B"}]}}]});
        assert_eq!(extract_gemini_text(&gemini), "AB");

        assert_eq!(extract_openai_text(&json!({})), "");
    }

    #[test]
    fn builds_image_content_for_each_provider() {
        let request = CompletionRequest::text("Describe this image.", 1024).with_image(image());

        let anthropic = anthropic_content(&request);
        assert_eq!(anthropic[1]["source"]["media_type"], "image/png");
        assert_eq!(anthropic[1]["source"]["data"], "aGVsbG8=");

        let openai = openai_content(&request);
        assert_eq!(openai[1]["image_url"]["url"], "data:image/png;base64,aGVsbG8=");

        let gemini = gemini_parts(&request);
        assert_eq!(gemini[1]["inline_data"]["mime_type"], "image/png");

        let plain = CompletionRequest::text("hi", 10);
        assert_eq!(openai_content(&plain), json!("hi"));
    }

    #[test]
    fn missing_key_is_reported_by_name() {
        let err = HttpCompletionProvider::from_env(
            config(ProviderId::Anthropic, "http://localhost"),
            Duration::from_secs(1),
        )
        .err()
        .expect("missing key");
        assert!(err.to_string().contains("POCKET_NOTES_TEST_KEY_THAT_IS_NOT_SET"));
    }

    #[tokio::test]
    async fn anthropic_request_carries_headers_and_system() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(header("x-client", "pocket-notes"))
            .and(body_partial_json(json!({
                "model": "test-model",
                "max_tokens": 200,
                "system": "be brief"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "  A short summary. "}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = provider(ProviderId::Anthropic, &server.uri())
            .complete(CompletionRequest::text("summarize", 200).with_system("be brief"))
            .await
            .expect("completion");
        assert_eq!(text, "A short summary.");
    }

    #[tokio::test]
    async fn openai_request_uses_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Answer"}}]
            })))
            .mount(&server)
            .await;

        let text = provider(ProviderId::OpenAi, &server.uri())
            .complete(CompletionRequest::text("question", 50))
            .await
            .expect("completion");
        assert_eq!(text, "Answer");
    }

    #[tokio::test]
    async fn gemini_request_passes_key_as_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/test-model:generateContent"))
            .and(query_param("key", "sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "Gemini says hi"}]}}]
            })))
            .mount(&server)
            .await;

        let text = provider(ProviderId::Gemini, &server.uri())
            .complete(CompletionRequest::text("hi", 50))
            .await
            .expect("completion");
        assert_eq!(text, "Gemini says hi");
    }

    #[tokio::test]
    async fn non_success_and_empty_replies_are_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
            .mount(&server)
            .await;
        let err = provider(ProviderId::Anthropic, &server.uri())
            .complete(CompletionRequest::text("x", 10))
            .await
            .expect_err("overloaded");
        assert!(err.to_string().contains("529"));

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"choices": [{"message": {"content": "   "}}]})),
            )
            .mount(&server)
            .await;
        let err = provider(ProviderId::OpenAi, &server.uri())
            .complete(CompletionRequest::text("x", 10))
            .await
            .expect_err("empty");
        assert!(matches!(
            err.downcast_ref::<ProviderError>(),
            Some(ProviderError::EmptyCompletion { .. })
        ));
    }
}
