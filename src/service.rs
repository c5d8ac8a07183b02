// ============================================================================
// ANALYSIS SERVICE
// ============================================================================
// Per-request orchestration:
//
//   Received → KeyChecked → Admitted → Inferring → Completed
//            ↘ Rejected                          ↘ Failed
//
// The engine call runs as its own task and owns the gate permit, so the
// permit is released when inference finishes even if the caller has gone.
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

use crate::activity::{ActivityTracker, CallerId};
use crate::error::{AnalysisError, InferenceError};
use crate::gate::AdmissionGate;
use crate::inference::{build_prompt, extract_continuation, InferenceEngine};
use crate::keys::KeyStore;

/// Lifecycle of one analysis request, as it appears in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStage {
    Received,
    KeyChecked,
    Admitted,
    Inferring,
    Completed,
    Rejected,
    Failed,
}

impl AnalysisStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStage::Received => "received",
            AnalysisStage::KeyChecked => "key_checked",
            AnalysisStage::Admitted => "admitted",
            AnalysisStage::Inferring => "inferring",
            AnalysisStage::Completed => "completed",
            AnalysisStage::Rejected => "rejected",
            AnalysisStage::Failed => "failed",
        }
    }
}

impl fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ----------------------------------------------------------------------------
// Analysis Service
// ----------------------------------------------------------------------------

pub struct AnalysisService {
    keys: Arc<dyn KeyStore>,
    tracker: Arc<ActivityTracker>,
    gate: AdmissionGate,
    engine: Arc<dyn InferenceEngine>,
    timeout: Option<Duration>,
}

impl AnalysisService {
    pub fn new(
        keys: Arc<dyn KeyStore>,
        tracker: Arc<ActivityTracker>,
        gate: AdmissionGate,
        engine: Arc<dyn InferenceEngine>,
    ) -> Self {
        Self {
            keys,
            tracker,
            gate,
            engine,
            timeout: None,
        }
    }

    /// Give up waiting on the engine after `timeout`. The engine task keeps
    /// its permit until it actually finishes.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    pub fn tracker(&self) -> &Arc<ActivityTracker> {
        &self.tracker
    }

    /// Analyze `code` on behalf of `caller`.
    pub async fn analyze(&self, caller: &CallerId, code: &str) -> Result<String, AnalysisError> {
        let request_id = Uuid::new_v4();
        let span = info_span!(target: "aaw::service", "analysis", %request_id);
        self.run(caller, code).instrument(span).await
    }

    async fn run(&self, caller: &CallerId, code: &str) -> Result<String, AnalysisError> {
        debug!(
            target: "aaw::service",
            stage = %AnalysisStage::Received,
            code_len = code.len(),
            "Analysis requested"
        );

        if !self.keys.contains(caller) {
            debug!(target: "aaw::service", stage = %AnalysisStage::Rejected, "Unknown caller key");
            return Err(AnalysisError::Unauthorized);
        }
        debug!(target: "aaw::service", stage = %AnalysisStage::KeyChecked, "Caller accepted");

        self.tracker.touch(caller);

        let permit = self.gate.acquire().await.map_err(|_| {
            debug!(target: "aaw::service", stage = %AnalysisStage::Rejected, "Gate closed");
            AnalysisError::Unavailable
        })?;
        debug!(
            target: "aaw::service",
            stage = %AnalysisStage::Admitted,
            in_use = self.gate.in_use(),
            capacity = self.gate.capacity(),
            "Permit granted"
        );

        let prompt = build_prompt(code);
        let engine = Arc::clone(&self.engine);
        let task = tokio::spawn(
            async move {
                debug!(
                    target: "aaw::service",
                    stage = %AnalysisStage::Inferring,
                    backend = engine.backend(),
                    "Dispatching to engine"
                );
                let generated = engine.generate(&prompt).await;
                drop(permit);
                generated.map(|text| extract_continuation(&prompt, &text))
            }
            .in_current_span(),
        );

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    let err = InferenceError::Timeout {
                        timeout_secs: limit.as_secs(),
                    };
                    return Err(self.failed(err));
                }
            },
            None => task.await,
        };

        let outcome = joined.unwrap_or_else(|join_err| {
            Err(InferenceError::TaskFailed {
                message: join_err.to_string(),
            })
        });

        match outcome {
            Ok(analysis) => {
                debug!(
                    target: "aaw::service",
                    stage = %AnalysisStage::Completed,
                    analysis_len = analysis.len(),
                    "Analysis complete"
                );
                Ok(analysis)
            }
            Err(err) => Err(self.failed(err)),
        }
    }

    fn failed(&self, err: InferenceError) -> AnalysisError {
        warn!(
            target: "aaw::service",
            stage = %AnalysisStage::Failed,
            kind = err.kind(),
            error = %err,
            "Inference failed"
        );
        AnalysisError::InferenceFailure(err)
    }
}

impl fmt::Debug for AnalysisService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisService")
            .field("keys", &self.keys.len())
            .field("gate", &self.gate)
            .field("backend", &self.engine.backend())
            .field("timeout", &self.timeout)
            .finish()
    }
}
