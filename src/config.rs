// ============================================================================
// CONFIGURATION SYSTEM
// ============================================================================
// Configuration is read once at startup and layered, later layers winning:
// - built-in defaults
// - optional TOML file
// - bare env names used by existing deployments (ALLOWED_KEYS, MAX_CONCURRENCY, ...)
// - AAW_* env vars, nested with "__" (AAW_INFERENCE__ENDPOINT)
//
// Only the admission capacity changes afterwards, through the HTTP API.
// ============================================================================

use std::fmt;
use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::{
    DEFAULT_ALLOWED_KEY, DEFAULT_HTTP_HOST, DEFAULT_HTTP_PORT, DEFAULT_MAX_CONCURRENCY,
    DEFAULT_MAX_NEW_TOKENS, DEFAULT_MODEL_NAME, DEFAULT_STATIC_DIR, MAX_CONCURRENCY_LIMIT,
};

/// Prefix for structured environment overrides
pub const ENV_PREFIX: &str = "AAW_";

/// Env names understood for compatibility with existing deployments
pub const LEGACY_ENV_VARS: [&str; 4] = [
    "ALLOWED_KEYS",
    "MAX_CONCURRENCY",
    "MODEL_NAME",
    "INFERENCE_BACKEND",
];

// ----------------------------------------------------------------------------
// Main Configuration Structure
// ----------------------------------------------------------------------------

/// Root configuration for the host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory with index.html, admin.html and the /static assets
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,

    /// Accepted caller keys. A list, or one comma-separated string.
    #[serde(
        default = "default_allowed_keys",
        deserialize_with = "deserialize_key_list"
    )]
    pub allowed_keys: Vec<String>,

    /// Initial admission capacity
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: i64,

    /// Inference backend settings
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
            allowed_keys: default_allowed_keys(),
            max_concurrency: default_max_concurrency(),
            inference: InferenceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl HostConfig {
    /// Load configuration from an optional file plus the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(HostConfig::default()));

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            figment = figment.merge(Toml::file(path));
        }

        let figment = figment
            .merge(legacy_env())
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        Self::from_figment(&figment)
    }

    /// Load from string (for testing)
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let figment =
            Figment::from(Serialized::defaults(HostConfig::default())).merge(Toml::string(toml_str));
        Self::from_figment(&figment)
    }

    fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let mut config: Self = figment.extract()?;
        config.allowed_keys = normalize_keys(std::mem::take(&mut config.allowed_keys));
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency < 1 || self.max_concurrency > i64::from(MAX_CONCURRENCY_LIMIT) {
            return Err(ConfigError::invalid_value(
                "max_concurrency",
                format!(
                    "must be between 1 and {}, got {}",
                    MAX_CONCURRENCY_LIMIT, self.max_concurrency
                ),
            ));
        }

        if self.allowed_keys.is_empty() {
            return Err(ConfigError::invalid_value(
                "allowed_keys",
                "at least one caller key is required",
            ));
        }

        self.inference.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Render the default configuration as TOML
    pub fn generate_default_config() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }

    /// `host:port` for the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Initial capacity, already range-checked by `validate`
    pub fn initial_capacity(&self) -> u32 {
        self.max_concurrency.clamp(1, i64::from(MAX_CONCURRENCY_LIMIT)) as u32
    }
}

fn legacy_env() -> Env {
    Env::raw().only(&LEGACY_ENV_VARS).map(|key| {
        if key.as_str().eq_ignore_ascii_case("model_name") {
            "inference.model_name".into()
        } else if key.as_str().eq_ignore_ascii_case("inference_backend") {
            "inference.backend".into()
        } else {
            key.as_str().to_ascii_lowercase().into()
        }
    })
}

fn normalize_keys(keys: Vec<String>) -> Vec<String> {
    keys.into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

fn default_host() -> String {
    DEFAULT_HTTP_HOST.into()
}

fn default_port() -> u16 {
    DEFAULT_HTTP_PORT
}

fn default_static_dir() -> PathBuf {
    PathBuf::from(DEFAULT_STATIC_DIR)
}

fn default_allowed_keys() -> Vec<String> {
    vec![DEFAULT_ALLOWED_KEY.into()]
}

fn default_max_concurrency() -> i64 {
    i64::from(DEFAULT_MAX_CONCURRENCY)
}

fn default_true() -> bool {
    true
}

// ----------------------------------------------------------------------------
// Inference Configuration
// ----------------------------------------------------------------------------

/// Which engine implementation serves analyses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process deterministic engine
    Echo,
    /// Remote text-generation service
    Http,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Echo => write!(f, "echo"),
            BackendKind::Http => write!(f, "http"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Base URL of the text-generation service (http backend)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Bearer token for the text-generation service
    #[serde(default)]
    pub api_token: Option<String>,

    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,

    /// Per-request limit on waiting for the engine. Unset waits indefinitely.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            model_name: default_model_name(),
            endpoint: None,
            api_token: None,
            max_new_tokens: default_max_new_tokens(),
            timeout_secs: None,
        }
    }
}

impl InferenceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend == BackendKind::Http
            && self.endpoint.as_deref().map_or(true, |e| e.trim().is_empty())
        {
            return Err(ConfigError::missing_field("inference.endpoint"));
        }

        if self.max_new_tokens == 0 {
            return Err(ConfigError::invalid_value(
                "inference.max_new_tokens",
                "must be greater than zero",
            ));
        }

        if self.timeout_secs == Some(0) {
            return Err(ConfigError::invalid_value(
                "inference.timeout_secs",
                "must be greater than zero when set",
            ));
        }

        Ok(())
    }
}

fn default_backend() -> BackendKind {
    BackendKind::Echo
}

fn default_model_name() -> String {
    DEFAULT_MODEL_NAME.into()
}

fn default_max_new_tokens() -> u32 {
    DEFAULT_MAX_NEW_TOKENS
}

// ----------------------------------------------------------------------------
// Logging Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (json, pretty, compact)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Enable ANSI colors
    #[serde(default = "default_true")]
    pub colors: bool,

    /// Include source location
    #[serde(default)]
    pub source_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            colors: true,
            source_location: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.format.as_str() {
            "pretty" | "compact" | "json" => Ok(()),
            other => Err(ConfigError::invalid_value(
                "logging.format",
                format!("expected pretty, compact or json, got '{}'", other),
            )),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ----------------------------------------------------------------------------
// Key List Deserialization
// ----------------------------------------------------------------------------

/// Accepts `["a", "b"]` or `"a,b"`. Env values that look numeric or boolean
/// arrive typed, so those are accepted as single keys too.
fn deserialize_key_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct KeyListVisitor;

    impl<'de> Visitor<'de> for KeyListVisitor {
        type Value = Vec<String>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a list of keys or a comma-separated string")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(v.split(',').map(str::to_string).collect())
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(vec![v.to_string()])
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(vec![v.to_string()])
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
            Ok(vec![v.to_string()])
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut keys = Vec::new();
            while let Some(key) = seq.next_element::<String>()? {
                keys.push(key);
            }
            Ok(keys)
        }
    }

    deserializer.deserialize_any(KeyListVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_config_defaults() {
        let config = HostConfig::default();

        assert_eq!(config.port, DEFAULT_HTTP_PORT);
        assert_eq!(config.allowed_keys, vec!["demo-key".to_string()]);
        assert_eq!(config.initial_capacity(), 1);
        assert_eq!(config.inference.backend, BackendKind::Echo);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_comma_separated_keys() {
        let config = HostConfig::from_toml_str(r#"allowed_keys = "alpha, beta,,gamma""#).unwrap();
        assert_eq!(config.allowed_keys, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_key_array() {
        let config = HostConfig::from_toml_str(r#"allowed_keys = ["alpha", "beta"]"#).unwrap();
        assert_eq!(config.allowed_keys, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = HostConfig::from_toml_str("max_concurrency = 0").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "max_concurrency"));
    }

    #[test]
    fn test_unparsable_concurrency_rejected() {
        let err = HostConfig::from_toml_str(r#"max_concurrency = "lots""#).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_empty_allow_list_rejected() {
        let err = HostConfig::from_toml_str(r#"allowed_keys = " , ""#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "allowed_keys"));
    }

    #[test]
    fn test_http_backend_requires_endpoint() {
        let err = HostConfig::from_toml_str("[inference]\nbackend = \"http\"").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref field } if field == "inference.endpoint"));
    }

    #[test]
    fn test_unknown_log_format_rejected() {
        let err = HostConfig::from_toml_str("[logging]\nformat = \"xml\"").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = HostConfig::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_default_config_round_trips() {
        let rendered = HostConfig::generate_default_config();
        let parsed = HostConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed.bind_addr(), HostConfig::default().bind_addr());
    }

    #[test]
    fn test_layering_env_over_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "aaw.toml",
                r#"
                port = 9000
                max_concurrency = 2
                allowed_keys = ["file-key"]

                [inference]
                model_name = "from-file"
                "#,
            )?;
            jail.set_env("ALLOWED_KEYS", "env-a,env-b");
            jail.set_env("MODEL_NAME", "gpt2");
            jail.set_env("AAW_MAX_CONCURRENCY", "4");
            jail.set_env("AAW_INFERENCE__MAX_NEW_TOKENS", "64");

            let config = HostConfig::load(Some(Path::new("aaw.toml"))).map_err(|e| e.to_string())?;

            assert_eq!(config.port, 9000);
            assert_eq!(config.allowed_keys, vec!["env-a", "env-b"]);
            assert_eq!(config.inference.model_name, "gpt2");
            assert_eq!(config.inference.max_new_tokens, 64);
            assert_eq!(config.max_concurrency, 4);
            Ok(())
        });
    }

    #[test]
    fn test_legacy_max_concurrency_env() {
        Jail::expect_with(|jail| {
            jail.set_env("MAX_CONCURRENCY", "3");
            let config = HostConfig::load(None).map_err(|e| e.to_string())?;
            assert_eq!(config.initial_capacity(), 3);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_legacy_limit_is_fatal() {
        Jail::expect_with(|jail| {
            jail.set_env("MAX_CONCURRENCY", "-2");
            let err = HostConfig::load(None).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { .. }));
            Ok(())
        });
    }

    #[test]
    fn test_numeric_key_from_env() {
        Jail::expect_with(|jail| {
            jail.set_env("ALLOWED_KEYS", "12345");
            let config = HostConfig::load(None).map_err(|e| e.to_string())?;
            assert_eq!(config.allowed_keys, vec!["12345"]);
            Ok(())
        });
    }
}
