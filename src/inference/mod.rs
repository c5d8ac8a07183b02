// ============================================================================
// INFERENCE ENGINE
// ============================================================================
// The engine is opaque: prompt in, generated text out, possibly after
// seconds of work. Engines are expected to echo the prompt ahead of the
// continuation, the way text-generation pipelines do with full-text output.
//
// Backends:
// - echo: in-process, deterministic, runs on the blocking pool
// - http: remote text-generation service (Hugging Face inference format)
// ============================================================================

mod echo;
mod http;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{BackendKind, InferenceConfig};
use crate::error::{ConfigError, InferenceError};

pub use echo::EchoEngine;
pub use http::HttpEngine;

/// Text placed before the submitted code
pub const PROMPT_PREFIX: &str = "Analyze the following code:\n";

/// Text placed after the submitted code; generation continues from here
pub const PROMPT_SUFFIX: &str = "\nAnalysis:";

/// A text-generation backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Generate text for `prompt`. The output normally starts with the prompt.
    async fn generate(&self, prompt: &str) -> Result<String, InferenceError>;

    /// Backend label for logs
    fn backend(&self) -> &'static str;
}

/// Wrap caller code in the analysis prompt.
pub fn build_prompt(code: &str) -> String {
    let mut prompt = String::with_capacity(PROMPT_PREFIX.len() + code.len() + PROMPT_SUFFIX.len());
    prompt.push_str(PROMPT_PREFIX);
    prompt.push_str(code);
    prompt.push_str(PROMPT_SUFFIX);
    prompt
}

/// Drop the echoed prompt from engine output and trim the rest.
///
/// Output that does not start with the prompt is returned whole (trimmed).
pub fn extract_continuation(prompt: &str, generated: &str) -> String {
    generated
        .strip_prefix(prompt)
        .unwrap_or(generated)
        .trim()
        .to_string()
}

/// Build the engine selected by configuration.
pub fn build_engine(config: &InferenceConfig) -> Result<Arc<dyn InferenceEngine>, ConfigError> {
    let engine: Arc<dyn InferenceEngine> = match config.backend {
        BackendKind::Echo => Arc::new(EchoEngine::new()),
        BackendKind::Http => Arc::new(HttpEngine::from_config(config)?),
    };

    tracing::info!(
        target: "aaw::inference",
        backend = engine.backend(),
        model = %config.model_name,
        max_new_tokens = config.max_new_tokens,
        "Inference engine ready"
    );

    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_build_prompt() {
        assert_eq!(
            build_prompt("fn main() {}"),
            "Analyze the following code:\nfn main() {}\nAnalysis:"
        );
    }

    #[test]
    fn test_extract_strips_echoed_prompt() {
        let prompt = build_prompt("x = 1");
        let generated = format!("{prompt}   Assigns one to x.\n\n");
        assert_eq!(extract_continuation(&prompt, &generated), "Assigns one to x.");
    }

    #[test]
    fn test_extract_keeps_output_without_echo() {
        let prompt = build_prompt("x = 1");
        assert_eq!(extract_continuation(&prompt, "  just the answer "), "just the answer");
    }

    #[test]
    fn test_extract_prompt_only_is_empty() {
        let prompt = build_prompt("x = 1");
        assert_eq!(extract_continuation(&prompt, &prompt), "");
    }

    #[test]
    fn test_build_engine_rejects_bad_endpoint() {
        let config = InferenceConfig {
            backend: BackendKind::Http,
            endpoint: Some("not a url".into()),
            ..InferenceConfig::default()
        };
        assert!(build_engine(&config).is_err());
    }

    #[test]
    fn test_build_engine_echo() {
        let engine = build_engine(&InferenceConfig::default()).unwrap();
        assert_eq!(engine.backend(), "echo");
    }
}
