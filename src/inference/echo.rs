use async_trait::async_trait;

use super::InferenceEngine;
use crate::error::InferenceError;

/// Deterministic local engine. Echoes the prompt and appends a structural
/// summary of the code block, computed on the blocking pool.
#[derive(Debug, Clone, Default)]
pub struct EchoEngine;

impl EchoEngine {
    pub fn new() -> Self {
        Self
    }

    fn summarize(prompt: &str) -> String {
        let code = prompt
            .strip_prefix(super::PROMPT_PREFIX)
            .and_then(|rest| rest.strip_suffix(super::PROMPT_SUFFIX))
            .unwrap_or(prompt);

        let lines = code.lines().count();
        let non_blank = code.lines().filter(|l| !l.trim().is_empty()).count();
        let chars = code.chars().count();
        let longest = code.lines().map(|l| l.chars().count()).max().unwrap_or(0);

        format!(
            "{prompt} The snippet has {lines} lines ({non_blank} non-blank) and {chars} characters; \
             the longest line is {longest} characters."
        )
    }
}

#[async_trait]
impl InferenceEngine for EchoEngine {
    async fn generate(&self, prompt: &str) -> Result<String, InferenceError> {
        let prompt = prompt.to_owned();
        tokio::task::spawn_blocking(move || Self::summarize(&prompt))
            .await
            .map_err(|e| InferenceError::TaskFailed {
                message: e.to_string(),
            })
    }

    fn backend(&self) -> &'static str {
        "echo"
    }
}
