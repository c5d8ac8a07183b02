use async_trait::async_trait;
use reqwest::{Client as HttpClient, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::InferenceEngine;
use crate::config::InferenceConfig;
use crate::error::{ConfigError, InferenceError};

/// Longest slice of an error body kept for logs
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    inputs: &'a str,
    parameters: GenerationParameters,
}

#[derive(Debug, Serialize)]
struct GenerationParameters {
    max_new_tokens: u32,
    return_full_text: bool,
}

#[derive(Debug, Deserialize)]
struct Generation {
    generated_text: String,
}

/// The hosted API answers with a list; single-model servers with one object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GenerationResponse {
    Batch(Vec<Generation>),
    Single(Generation),
}

fn parse_generation(body: &[u8]) -> Result<String, InferenceError> {
    let response: GenerationResponse = serde_json::from_slice(body)
        .map_err(|e| InferenceError::invalid_response(e.to_string()))?;

    match response {
        GenerationResponse::Single(g) => Ok(g.generated_text),
        GenerationResponse::Batch(batch) => batch
            .into_iter()
            .next()
            .map(|g| g.generated_text)
            .ok_or_else(|| InferenceError::invalid_response("empty generation list")),
    }
}

/// Remote text-generation engine.
#[derive(Debug, Clone)]
pub struct HttpEngine {
    client: HttpClient,
    url: Url,
    api_token: Option<String>,
    max_new_tokens: u32,
}

impl HttpEngine {
    pub fn from_config(config: &InferenceConfig) -> Result<Self, ConfigError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| ConfigError::missing_field("inference.endpoint"))?;

        let url = Url::parse(&format!(
            "{}/models/{}",
            endpoint.trim_end_matches('/'),
            config.model_name
        ))
        .map_err(|e| ConfigError::invalid_value("inference.endpoint", e.to_string()))?;

        let client = HttpClient::builder()
            .build()
            .map_err(|e| ConfigError::invalid_value("inference", e.to_string()))?;

        Ok(Self {
            client,
            url,
            api_token: config.api_token.clone(),
            max_new_tokens: config.max_new_tokens,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl InferenceEngine for HttpEngine {
    async fn generate(&self, prompt: &str) -> Result<String, InferenceError> {
        let body = GenerationRequest {
            inputs: prompt,
            parameters: GenerationParameters {
                max_new_tokens: self.max_new_tokens,
                return_full_text: true,
            },
        };

        let mut request = self.client.post(self.url.clone()).json(&body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| InferenceError::RequestFailed {
            endpoint: self.url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| InferenceError::RequestFailed {
            endpoint: self.url.to_string(),
            message: e.to_string(),
        })?;

        debug!(
            target: "aaw::inference",
            status = status.as_u16(),
            bytes = bytes.len(),
            "Engine responded"
        );

        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes);
            let message: String = text.chars().take(MAX_ERROR_BODY).collect();
            return Err(InferenceError::BadStatus {
                status_code: status.as_u16(),
                message,
            });
        }

        parse_generation(&bytes)
    }

    fn backend(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value as JsonValue};

    #[test]
    fn test_parse_batch_response() {
        let text = parse_generation(br#"[{"generated_text": "prompt and more"}]"#).unwrap();
        assert_eq!(text, "prompt and more");
    }

    #[test]
    fn test_parse_single_response() {
        let text = parse_generation(br#"{"generated_text": "solo"}"#).unwrap();
        assert_eq!(text, "solo");
    }

    #[test]
    fn test_parse_rejects_empty_and_malformed() {
        assert!(matches!(
            parse_generation(b"[]"),
            Err(InferenceError::InvalidResponse { .. })
        ));
        assert!(matches!(
            parse_generation(br#"{"error": "loading"}"#),
            Err(InferenceError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_url_joins_endpoint_and_model() {
        let engine = HttpEngine::from_config(&InferenceConfig {
            backend: BackendKind::Http,
            endpoint: Some("http://models.internal:8080/".into()),
            model_name: "bigcode/starcoder".into(),
            ..InferenceConfig::default()
        })
        .unwrap();
        assert_eq!(
            engine.url().as_str(),
            "http://models.internal:8080/models/bigcode/starcoder"
        );
    }

    async fn spawn_backend(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn engine_for(endpoint: String, token: Option<&str>) -> HttpEngine {
        HttpEngine::from_config(&InferenceConfig {
            backend: BackendKind::Http,
            endpoint: Some(endpoint),
            api_token: token.map(str::to_string),
            max_new_tokens: 16,
            ..InferenceConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_generate_round_trip() {
        let router = Router::new().route(
            "/models/distilgpt2",
            post(|headers: HeaderMap, Json(body): Json<JsonValue>| async move {
                assert_eq!(body["parameters"]["max_new_tokens"], 16);
                assert_eq!(body["parameters"]["return_full_text"], true);
                assert_eq!(
                    headers.get("authorization").and_then(|v| v.to_str().ok()),
                    Some("Bearer s3cret")
                );
                let inputs = body["inputs"].as_str().unwrap_or_default().to_string();
                Json(json!([{ "generated_text": format!("{inputs} Looks fine.") }]))
            }),
        );
        let engine = engine_for(spawn_backend(router).await, Some("s3cret"));

        let generated = engine.generate("PROMPT").await.unwrap();
        assert_eq!(generated, "PROMPT Looks fine.");
    }

    #[tokio::test]
    async fn test_generate_bad_status() {
        let router = Router::new().route(
            "/models/distilgpt2",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "model is loading") }),
        );
        let engine = engine_for(spawn_backend(router).await, None);

        match engine.generate("PROMPT").await {
            Err(InferenceError::BadStatus { status_code, message }) => {
                assert_eq!(status_code, 503);
                assert_eq!(message, "model is loading");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_generate_unreachable() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let engine = engine_for(format!("http://{addr}"), None);
        assert!(matches!(
            engine.generate("PROMPT").await,
            Err(InferenceError::RequestFailed { .. })
        ));
    }
}
