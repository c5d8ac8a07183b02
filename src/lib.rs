//! # AAW Host - Concurrency-Gated Code Analysis
//!
//! An HTTP host that puts a single expensive, stateful resource (a loaded
//! text-generation model) behind dynamic admission control. At most N
//! analyses run at once no matter how many requests arrive, N can be changed
//! at runtime, and callers plus host load are visible through a stats
//! endpoint.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                              AAW HOST                                │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  HTTP → KEY STORE → ACTIVITY TRACKER → ADMISSION GATE → ENGINE TASK  │
//! │                          ↑                   ↑                       │
//! │                    METRICS REPORTER ─────────┘                       │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - [`gate`]: resizable FIFO admission gate
//! - [`activity`]: last-seen timestamps per caller
//! - [`metrics`]: host load + gate/tracker snapshot
//! - [`service`]: the per-request orchestration
//! - [`http`]: axum routes and static pages

#![warn(rust_2018_idioms)]
#![warn(missing_debug_implementations)]

pub mod activity;
pub mod cli;
pub mod config;
pub mod error;
pub mod gate;
pub mod http;
pub mod inference;
pub mod keys;
pub mod logging;
pub mod metrics;
pub mod service;

pub use activity::{ActivityTracker, CallerId};
pub use config::HostConfig;
pub use error::{AnalysisError, ConfigError, HostError, HostResult, InferenceError};
pub use gate::{AdmissionGate, GatePermit, GateStats};
pub use inference::InferenceEngine;
pub use keys::{KeyStore, StaticKeyStore};
pub use metrics::{MetricsReporter, MetricsSnapshot};
pub use service::AnalysisService;

// ============================================================================
// CONSTANTS & VERSION INFORMATION
// ============================================================================

/// Host version - follows semantic versioning
pub const HOST_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const HOST_NAME: &str = "aaw-host";
pub const HOST_FULL_NAME: &str = "AAW Server AI";

// ----------------------------------------------------------------------------
// Admission
// ----------------------------------------------------------------------------

/// Default number of analyses allowed to run at once. One, because the
/// engine usually wraps a single loaded model.
pub const DEFAULT_MAX_CONCURRENCY: u32 = 1;

/// Upper clamp for runtime resizes.
pub const MAX_CONCURRENCY_LIMIT: u32 = 4096;

// ----------------------------------------------------------------------------
// Network
// ----------------------------------------------------------------------------

/// Default HTTP bind address
pub const DEFAULT_HTTP_HOST: &str = "0.0.0.0";

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 8000;

/// Directory holding index.html, admin.html and the assets under /static
pub const DEFAULT_STATIC_DIR: &str = "static";

/// Grace period for in-flight requests on shutdown (seconds)
pub const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 30;

// ----------------------------------------------------------------------------
// Inference
// ----------------------------------------------------------------------------

/// Model used when none is configured
pub const DEFAULT_MODEL_NAME: &str = "distilgpt2";

/// Tokens requested from the engine per analysis
pub const DEFAULT_MAX_NEW_TOKENS: u32 = 128;

/// Caller key accepted when no allow-list is configured
pub const DEFAULT_ALLOWED_KEY: &str = "demo-key";
