//! Per-session conversation state.
//!
//! Sessions live in an arena keyed by id. The map lock is only taken for
//! lookups and inserts; each session carries its own async mutex, so turns
//! on one session serialize while different sessions never contend.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

use super::language::Language;
use super::matcher::MatchResult;
use crate::error::AppError;

/// One user message and what the assistant made of it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub text: String,
    pub language: Language,
    pub topic: Option<String>,
    pub confidence: f32,
    pub needs_human: bool,
    pub timestamp: DateTime<Utc>,
}

/// Conversation state for one session id. Turns are append-only and strictly time-ordered.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    turns: Vec<Turn>,
    last_topic: Option<String>,
    turn_count: usize,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
            turns: Vec::new(),
            last_topic: None,
            turn_count: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last_topic(&self) -> Option<&str> {
        self.last_topic.as_deref()
    }

    pub fn turn_count(&self) -> usize {
        self.turn_count
    }

    /// Appends a turn. The last topic only moves when the match found one.
    pub fn record(
        &mut self,
        text: &str,
        language: Language,
        result: &MatchResult,
        needs_human: bool,
    ) -> &Turn {
        let now = Utc::now();
        // Clock readings can repeat (or step back); keep timestamps strictly increasing.
        let timestamp = match self.turns.last() {
            Some(prev) if now <= prev.timestamp => prev.timestamp + ChronoDuration::microseconds(1),
            _ => now,
        };

        if let Some(topic) = &result.topic {
            self.last_topic = Some(topic.clone());
        }
        self.turn_count += 1;
        self.turns.push(Turn {
            text: text.to_string(),
            language,
            topic: result.topic.clone(),
            confidence: result.confidence,
            needs_human,
            timestamp,
        });
        &self.turns[self.turns.len() - 1]
    }
}

pub type SessionHandle = Arc<Mutex<Session>>;

/// Exclusive access to one session for the duration of a turn.
pub type SessionGuard = OwnedMutexGuard<Session>;

/// In-memory session arena. Sessions are never evicted.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    lock_timeout: Duration,
}

impl SessionStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            lock_timeout,
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Returns the session for `session_id`, creating it on first sight.
    pub async fn get_or_create(&self, session_id: &str) -> SessionHandle {
        if let Some(handle) = self.sessions.read().await.get(session_id) {
            return Arc::clone(handle);
        }

        let mut sessions = self.sessions.write().await;
        Arc::clone(sessions.entry(session_id.to_string()).or_insert_with(|| {
            debug!(session_id, "Creating session");
            Arc::new(Mutex::new(Session::new(session_id)))
        }))
    }

    /// Acquires the session lock, giving up after the configured timeout.
    pub async fn lock(&self, session_id: &str) -> Result<SessionGuard, AppError> {
        let handle = self.get_or_create(session_id).await;
        tokio::time::timeout(self.lock_timeout, handle.lock_owned())
            .await
            .map_err(|_| {
                AppError::SessionLockTimeout(format!(
                    "session '{}' still locked after {:?}",
                    session_id, self.lock_timeout
                ))
            })
    }

    /// Waits on the session lock without a bound.
    pub async fn lock_queued(&self, session_id: &str) -> SessionGuard {
        self.get_or_create(session_id).await.lock_owned().await
    }

    /// Locks the session and appends a turn to it.
    pub async fn record_turn(
        &self,
        session_id: &str,
        text: &str,
        language: Language,
        result: &MatchResult,
        needs_human: bool,
    ) -> Result<Turn, AppError> {
        let mut session = self.lock(session_id).await?;
        Ok(session.record(text, language, result, needs_human).clone())
    }

    /// Read-only copy of a session; `None` for ids never seen.
    pub async fn snapshot(&self, session_id: &str) -> Option<Session> {
        let handle = self.sessions.read().await.get(session_id).cloned()?;
        let session = handle.lock().await;
        Some(session.clone())
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
