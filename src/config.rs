//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default number of classification attempts before a message is dead-lettered.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Log output format for the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text (local development).
    #[default]
    Text,
    /// One JSON object per line (deployed environments).
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}' (expected text or json)")),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub address: String,
    /// Per-request timeout; also bounds graceful shutdown.
    pub timeout: Duration,
}

/// Queue topics and transport settings.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Broker REST endpoint. Required unless `in_memory` is set.
    pub base_url: Option<String>,
    /// Explicit opt-in to the in-process publisher (local development only).
    pub in_memory: bool,
    /// Optional bearer token for the broker endpoint.
    pub auth_token: Option<SecretString>,
    pub input_topic: String,
    pub output_topic: String,
    pub dead_letter_topic: String,
    pub publish_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            in_memory: false,
            auth_token: None,
            input_topic: "messages_to_process".to_string(),
            output_topic: "processed_messages".to_string(),
            dead_letter_topic: "messages_failed".to_string(),
            publish_timeout: Duration::from_secs(3),
        }
    }
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub http: HttpConfig,
    pub queue: QueueConfig,
    pub db_path: PathBuf,
    pub max_attempts: u32,
    pub hierarchy_path: PathBuf,
    pub log_format: LogFormat,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig {
                address: "0.0.0.0:8080".to_string(),
                timeout: Duration::from_secs(5),
            },
            queue: QueueConfig::default(),
            db_path: PathBuf::from("./data/mail-triage.db"),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            hierarchy_path: PathBuf::from("./configs/hierarchy.json"),
            log_format: LogFormat::Text,
        }
    }
}

impl ServiceConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Unset keys fall back to defaults;
    /// keys that are set but unparsable are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let timeout_secs: u64 = parse_or(&get, "MAIL_TRIAGE_HTTP_TIMEOUT_SECS", 5)?;
        let publish_timeout_ms: u64 = parse_or(&get, "MAIL_TRIAGE_PUBLISH_TIMEOUT_MS", 3000)?;

        let max_attempts: u32 = parse_or(&get, "MAIL_TRIAGE_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAIL_TRIAGE_MAX_ATTEMPTS".into(),
                message: "must be at least 1".into(),
            });
        }

        let log_format = match get("MAIL_TRIAGE_LOG_FORMAT") {
            Some(raw) => raw.parse().map_err(|message| ConfigError::InvalidValue {
                key: "MAIL_TRIAGE_LOG_FORMAT".into(),
                message,
            })?,
            None => LogFormat::default(),
        };

        let base_url = get("MAIL_TRIAGE_QUEUE_URL").map(|u| u.trim_end_matches('/').to_string());
        let in_memory: bool = parse_or(&get, "MAIL_TRIAGE_QUEUE_IN_MEMORY", false)?;
        if base_url.is_none() && !in_memory {
            return Err(ConfigError::MissingEnvVar("MAIL_TRIAGE_QUEUE_URL".into()));
        }

        let queue = QueueConfig {
            base_url,
            in_memory,
            auth_token: get("MAIL_TRIAGE_QUEUE_TOKEN").map(SecretString::from),
            input_topic: get("MAIL_TRIAGE_INPUT_TOPIC").unwrap_or(defaults.queue.input_topic),
            output_topic: get("MAIL_TRIAGE_OUTPUT_TOPIC").unwrap_or(defaults.queue.output_topic),
            dead_letter_topic: get("MAIL_TRIAGE_DEAD_LETTER_TOPIC")
                .unwrap_or(defaults.queue.dead_letter_topic),
            publish_timeout: Duration::from_millis(publish_timeout_ms),
        };

        Ok(Self {
            http: HttpConfig {
                address: get("MAIL_TRIAGE_HTTP_ADDR").unwrap_or(defaults.http.address),
                timeout: Duration::from_secs(timeout_secs),
            },
            queue,
            db_path: get("MAIL_TRIAGE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            max_attempts,
            hierarchy_path: get("MAIL_TRIAGE_HIERARCHY_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.hierarchy_path),
            log_format,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}
