//! Runtime configuration.
//!
//! Policy constants (handoff threshold, matcher weights) live here instead of
//! being hardcoded, and are validated with `validator` before use.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

use crate::error::AppError;

/// Scoring knobs for the intent matcher.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MatcherConfig {
    /// Weight of an inflected keyword hit ("hostels" for "hostel"); token or phrase hits weigh 1.0.
    #[validate(range(min = 0.0, max = 1.0))]
    pub weak_hit_weight: f32,
    /// Weighted hits at which confidence saturates at 1.0 (capped by the topic's keyword count).
    #[validate(range(min = 1))]
    pub saturation_hits: usize,
    /// Keywords shorter than this only match whole tokens, never inflected forms.
    #[validate(range(min = 1))]
    pub min_substring_chars: usize,
    /// Messages with at most this many tokens count as follow-ups.
    pub followup_max_tokens: usize,
    /// Multiplier applied to confidence obtained through context fallback.
    #[validate(range(min = 0.0, max = 1.0))]
    pub context_fallback_weight: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            weak_hit_weight: 0.5,
            saturation_hits: 1,
            min_substring_chars: 4,
            followup_max_tokens: 3,
            context_fallback_weight: 0.6,
        }
    }
}

/// Top-level configuration for the assistant and its collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AssistantConfig {
    /// Knowledge base JSON file; the built-in knowledge base is used when unset.
    pub knowledge_base_path: Option<PathBuf>,
    /// SQLite URL of the conversation log.
    #[validate(length(min = 1))]
    pub database_url: String,
    #[validate(length(min = 1))]
    pub bind_addr: String,
    /// Replies below this confidence are handed off to a human. Inclusive lower bound.
    #[validate(range(min = 0.0, max = 1.0))]
    pub handoff_threshold: f32,
    #[validate(range(min = 1))]
    pub max_message_chars: usize,
    #[validate(range(min = 1))]
    pub session_lock_timeout_ms: u64,
    /// Bounded lock attempts before a turn queues on the session lock.
    pub session_lock_retries: u32,
    #[validate(range(min = 1))]
    pub log_retention_days: u32,
    #[validate(nested)]
    pub matcher: MatcherConfig,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            knowledge_base_path: None,
            database_url: "sqlite://data/conversations.sqlite".to_string(),
            bind_addr: "0.0.0.0:8000".to_string(),
            handoff_threshold: 0.3,
            max_message_chars: 1000,
            session_lock_timeout_ms: 2000,
            session_lock_retries: 2,
            log_retention_days: 30,
            matcher: MatcherConfig::default(),
        }
    }
}

impl AssistantConfig {
    /// Builds the configuration from `CAMPUS_*` environment variables (and `.env`),
    /// falling back to defaults for unset variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenv::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            knowledge_base_path: env::var("CAMPUS_KB_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            database_url: env::var("CAMPUS_DB_PATH").unwrap_or(defaults.database_url),
            bind_addr: env::var("CAMPUS_BIND_ADDR").unwrap_or(defaults.bind_addr),
            handoff_threshold: env_parse("CAMPUS_HANDOFF_THRESHOLD", defaults.handoff_threshold)?,
            max_message_chars: env_parse("CAMPUS_MAX_MESSAGE_CHARS", defaults.max_message_chars)?,
            session_lock_timeout_ms: env_parse(
                "CAMPUS_SESSION_LOCK_TIMEOUT_MS",
                defaults.session_lock_timeout_ms,
            )?,
            session_lock_retries: env_parse(
                "CAMPUS_SESSION_LOCK_RETRIES",
                defaults.session_lock_retries,
            )?,
            log_retention_days: env_parse(
                "CAMPUS_LOG_RETENTION_DAYS",
                defaults.log_retention_days,
            )?,
            matcher: MatcherConfig {
                weak_hit_weight: env_parse(
                    "CAMPUS_WEAK_HIT_WEIGHT",
                    defaults.matcher.weak_hit_weight,
                )?,
                context_fallback_weight: env_parse(
                    "CAMPUS_CONTEXT_FALLBACK_WEIGHT",
                    defaults.matcher.context_fallback_weight,
                )?,
                ..defaults.matcher
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn session_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.session_lock_timeout_ms)
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value '{}'", key, raw))),
        _ => Ok(default),
    }
}
