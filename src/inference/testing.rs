//! Engines for exercising the orchestration in tests.

use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::InferenceEngine;
use crate::error::InferenceError;

/// Sleeps for `delay`, echoes the prompt, and records how many calls
/// overlapped.
#[derive(Debug)]
pub struct SleepyEngine {
    delay: Duration,
    fail: bool,
    running: AtomicUsize,
    high_water: AtomicUsize,
    calls: AtomicUsize,
    pub started: Notify,
}

impl SleepyEngine {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            fail: false,
            running: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            started: Notify::new(),
        }
    }

    /// Same timing, but every call ends in an engine error.
    pub fn failing(delay: Duration) -> Self {
        Self {
            fail: true,
            ..Self::new(delay)
        }
    }

    pub fn high_water(&self) -> usize {
        self.high_water.load(AtomicOrdering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }
}

#[async_trait]
impl InferenceEngine for SleepyEngine {
    async fn generate(&self, prompt: &str) -> Result<String, InferenceError> {
        let now = self.running.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        self.high_water.fetch_max(now, AtomicOrdering::SeqCst);
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        self.started.notify_one();

        tokio::time::sleep(self.delay).await;
        self.running.fetch_sub(1, AtomicOrdering::SeqCst);

        if self.fail {
            Err(InferenceError::Engine("model crashed".into()))
        } else {
            Ok(format!("{prompt} Looks correct."))
        }
    }

    fn backend(&self) -> &'static str {
        "sleepy"
    }
}
