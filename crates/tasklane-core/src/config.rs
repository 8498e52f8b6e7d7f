//! Worker configuration, read from a JSON file.
//!
//! ```json
//! {
//!     "redis": { "url": "redis://127.0.0.1/" },
//!     "queues": { "input": "trt/plantA/todo", "output": "global/done" },
//!     "dedup": { "enabled": true, "set_name": "trt/plantA/todo-set" },
//!     "poll_timeout_secs": 60
//! }
//! ```
//!
//! Queue names are configuration values, not protocol constants.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app::{BackoffPolicy, QueueError, QueueNames};

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1/";
pub const DEFAULT_OUTPUT_QUEUE: &str = "global/done";
pub const DEFAULT_EVENTS_CHANNEL: &str = "tasklane/events";
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid queues: {0}")]
    Queues(#[from] QueueError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "RedisConfig::default_url")]
    pub url: String,
}

impl RedisConfig {
    fn default_url() -> String {
        DEFAULT_REDIS_URL.to_owned()
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub input: String,

    /// Defaults to `<input>/taken`. Must not be shared with another input queue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taken: Option<String>,

    #[serde(default = "QueueConfig::default_output")]
    pub output: String,
}

impl QueueConfig {
    fn default_output() -> String {
        DEFAULT_OUTPUT_QUEUE.to_owned()
    }

    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            taken: None,
            output: Self::default_output(),
        }
    }

    pub fn taken_queue(&self) -> String {
        match &self.taken {
            Some(queue) => queue.clone(),
            None => format!("{}/taken", self.input),
        }
    }
}

/// Deduplication bookkeeping. When enabled, the worker removes its task from
/// `set_name` right after acquiring it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DedupConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub set_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "EventsConfig::default_channel")]
    pub channel: String,
}

impl EventsConfig {
    fn default_channel() -> String {
        DEFAULT_EVENTS_CHANNEL.to_owned()
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            channel: Self::default_channel(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub redis: RedisConfig,

    pub queues: QueueConfig,

    #[serde(default)]
    pub dedup: DedupConfig,

    #[serde(default)]
    pub events: EventsConfig,

    #[serde(default = "WorkerConfig::default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,

    /// Number of worker loops in this process, each with its own connection.
    #[serde(default = "WorkerConfig::default_workers")]
    pub workers: usize,

    #[serde(default)]
    pub poll_backoff: BackoffPolicy,
}

impl WorkerConfig {
    fn default_poll_timeout_secs() -> u64 {
        DEFAULT_POLL_TIMEOUT_SECS
    }

    fn default_workers() -> usize {
        1
    }

    pub fn new(queues: QueueConfig) -> Self {
        Self {
            redis: RedisConfig::default(),
            queues,
            dedup: DedupConfig::default(),
            events: EventsConfig::default(),
            poll_timeout_secs: Self::default_poll_timeout_secs(),
            workers: Self::default_workers(),
            poll_backoff: BackoffPolicy::default(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(data)?;
        Ok(config)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    /// Checks what serde cannot: names present and distinct, sane counts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        QueueNames::from(&self.queues).validate()?;
        if self.dedup.enabled && self.dedup.set_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "dedup.set_name is required when dedup is enabled".into(),
            ));
        }
        if self.events.enabled && self.events.channel.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "events.channel is required when events are enabled".into(),
            ));
        }
        if self.poll_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll_timeout_secs must be at least 1".into(),
            ));
        }
        let multiplier = self.poll_backoff.multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "poll_backoff.multiplier must be a finite number of at least 1".into(),
            ));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        Ok(())
    }
}
