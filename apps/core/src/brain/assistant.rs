//! Campus assistant - the per-message pipeline.
//!
//! resolve language -> lock session -> match -> compose (records the turn)
//! -> release -> emit the turn record.
//!
//! Nothing in here fails a reply: invalid input becomes a handoff turn,
//! lock timeouts are retried and then queued, sink errors are only logged.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn, Span};
use uuid::Uuid;

use super::composer::{ReplyDecision, ResponseComposer};
use super::knowledge::{ContactInfo, KnowledgeBase};
use super::language::{Language, LanguageResolver};
use super::matcher::{IntentMatcher, MatchContext, MatchResult};
use super::session::{SessionGuard, SessionStore};
use crate::config::AssistantConfig;
use crate::error::AppError;
use crate::turn_log::{NullTurnSink, TurnRecord, TurnSink};

/// Incoming chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Optional language hint (en, hi, gu, mr, raj)
    #[serde(default)]
    pub language: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            session_id: None,
            language: None,
        }
    }

    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// Reply returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub detected_language: Language,
    pub session_id: String,
    pub confidence: f32,
    pub needs_human: bool,
    #[serde(default)]
    pub suggested_contact: Option<ContactInfo>,
    /// Matched topic id
    #[serde(default)]
    pub category: Option<String>,
}

pub struct CampusAssistant {
    kb: Arc<KnowledgeBase>,
    resolver: LanguageResolver,
    matcher: IntentMatcher,
    composer: ResponseComposer,
    sessions: SessionStore,
    sink: Arc<dyn TurnSink>,
    config: AssistantConfig,
}

impl CampusAssistant {
    pub fn new(kb: Arc<KnowledgeBase>, config: AssistantConfig, sink: Arc<dyn TurnSink>) -> Self {
        Self {
            resolver: LanguageResolver::new(),
            matcher: IntentMatcher::new(Arc::clone(&kb), config.matcher.clone()),
            composer: ResponseComposer::new(Arc::clone(&kb), config.handoff_threshold),
            sessions: SessionStore::new(config.session_lock_timeout()),
            kb,
            sink,
            config,
        }
    }

    /// Built-in knowledge base, default configuration, no persistence.
    pub fn with_defaults() -> Result<Self, AppError> {
        let kb = Arc::new(KnowledgeBase::builtin()?);
        Ok(Self::new(kb, AssistantConfig::default(), Arc::new(NullTurnSink)))
    }

    /// Loads the knowledge base named by `config` (built-in when unset).
    pub fn from_config(config: AssistantConfig, sink: Arc<dyn TurnSink>) -> Result<Self, AppError> {
        let kb = match &config.knowledge_base_path {
            Some(path) => KnowledgeBase::from_path(path)?,
            None => KnowledgeBase::builtin()?,
        };
        info!(topics = kb.len(), "Knowledge base loaded");
        Ok(Self::new(Arc::new(kb), config, sink))
    }

    pub fn is_ready(&self) -> bool {
        !self.kb.is_empty()
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.kb
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    /// Answers one message. Always produces a reply.
    #[instrument(skip(self, request), fields(session_id = tracing::field::Empty))]
    pub async fn handle(&self, request: ChatRequest) -> ChatResponse {
        let session_id = request
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Span::current().record("session_id", session_id.as_str());

        let language = self
            .resolver
            .resolve(&request.message, request.language.as_deref());

        let mut session = self.acquire(&session_id).await;

        let result = match self.check_message(&request.message) {
            Ok(()) => self.matcher.match_message(
                &request.message,
                language,
                MatchContext {
                    last_topic: session.last_topic(),
                },
            ),
            Err(err) => {
                warn!(error = %err, "Invalid input answered with handoff");
                MatchResult::none()
            }
        };

        let recorded_text: String = request
            .message
            .chars()
            .take(self.config.max_message_chars)
            .collect();
        let decision = self
            .composer
            .compose(&result, &recorded_text, language, &mut session);
        let timestamp = session
            .turns()
            .last()
            .map(|turn| turn.timestamp)
            .unwrap_or_else(chrono::Utc::now);
        drop(session);

        let record = TurnRecord {
            timestamp,
            session_id: session_id.clone(),
            input_text: recorded_text,
            detected_language: language,
            matched_topic: decision.topic.clone(),
            confidence: decision.confidence,
            needs_human: decision.needs_human,
            response_text: decision.response.clone(),
        };
        self.emit(&record).await;

        into_response(decision, session_id)
    }

    fn check_message(&self, message: &str) -> Result<(), AppError> {
        if message.trim().is_empty() {
            return Err(AppError::InvalidInput("message is empty".to_string()));
        }
        let chars = message.chars().count();
        if chars > self.config.max_message_chars {
            return Err(AppError::InvalidInput(format!(
                "message has {} characters, limit is {}",
                chars, self.config.max_message_chars
            )));
        }
        Ok(())
    }

    /// Bounded attempts first, then wait in line. A turn is never dropped.
    async fn acquire(&self, session_id: &str) -> SessionGuard {
        for attempt in 1..=self.config.session_lock_retries {
            match self.sessions.lock(session_id).await {
                Ok(guard) => return guard,
                Err(err) => warn!(attempt, error = %err, "Session busy"),
            }
        }
        self.sessions.lock_queued(session_id).await
    }

    async fn emit(&self, record: &TurnRecord) {
        info!(
            session_id = %record.session_id,
            language = %record.detected_language,
            topic = record.matched_topic.as_deref().unwrap_or("-"),
            confidence = record.confidence,
            needs_human = record.needs_human,
            input_chars = record.input_text.chars().count(),
            "Turn answered"
        );

        if let Err(err) = self.sink.log_turn(record).await {
            warn!(error = %err, "Failed to persist turn record");
        }
    }
}

fn into_response(decision: ReplyDecision, session_id: String) -> ChatResponse {
    ChatResponse {
        response: decision.response,
        detected_language: decision.language,
        session_id,
        confidence: decision.confidence,
        needs_human: decision.needs_human,
        suggested_contact: decision.contact,
        category: decision.topic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_generates_session_id() {
        let assistant = CampusAssistant::with_defaults().unwrap();
        let reply = assistant.handle(ChatRequest::new("What are the fees?")).await;

        assert!(Uuid::parse_str(&reply.session_id).is_ok());
        assert_eq!(reply.category.as_deref(), Some("fees"));
        assert_eq!(reply.detected_language, Language::English);
        assert!(!reply.needs_human);
        assert!(reply.suggested_contact.is_none());
    }

    #[tokio::test]
    async fn test_blank_session_id_is_replaced() {
        let assistant = CampusAssistant::with_defaults().unwrap();
        let reply = assistant
            .handle(ChatRequest::new("hello").in_session("   "))
            .await;
        assert!(!reply.session_id.trim().is_empty());
        assert_ne!(reply.session_id, "   ");
    }

    #[tokio::test]
    async fn test_empty_message_is_a_recorded_handoff() {
        let assistant = CampusAssistant::with_defaults().unwrap();
        let reply = assistant.handle(ChatRequest::new("   ").in_session("s1")).await;

        assert!(reply.needs_human);
        assert!(reply.suggested_contact.is_some());
        assert_eq!(reply.confidence, 0.0);

        let session = assistant.sessions().snapshot("s1").await.unwrap();
        assert_eq!(session.turn_count(), 1);
        assert!(session.turns()[0].needs_human);
    }

    #[tokio::test]
    async fn test_oversized_message_is_a_handoff() {
        let mut config = AssistantConfig::default();
        config.max_message_chars = 10;
        let kb = Arc::new(KnowledgeBase::builtin().unwrap());
        let assistant = CampusAssistant::new(kb, config, Arc::new(NullTurnSink));

        let reply = assistant
            .handle(ChatRequest::new("what are the fees for this year").in_session("s"))
            .await;
        assert!(reply.needs_human);
        assert_eq!(reply.category, None);

        let session = assistant.sessions().snapshot("s").await.unwrap();
        assert_eq!(session.turns()[0].text.chars().count(), 10);
    }

    /// Shared in-memory log sink
    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_from_config_logs_load_once() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let source = include_str!("../../data/knowledge_base.json");
        std::io::Write::write_all(&mut file, source.as_bytes()).unwrap();
        let config = AssistantConfig {
            knowledge_base_path: Some(file.path().to_path_buf()),
            ..AssistantConfig::default()
        };

        let captured = Captured::default();
        let writer = captured.clone();
        let assistant = temp_env::with_var_unset("RUST_LOG", || {
            let subscriber =
                crate::telemetry::get_subscriber("assistant-test", "info", move || writer.clone());
            tracing::subscriber::with_default(subscriber, || {
                CampusAssistant::from_config(config, Arc::new(NullTurnSink))
            })
        })
        .unwrap();
        assert!(assistant.is_ready());

        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert_eq!(logs.matches("Knowledge base loaded").count(), 1);
    }

    #[tokio::test]
    async fn test_is_ready_with_builtin_kb() {
        let assistant = CampusAssistant::with_defaults().unwrap();
        assert!(assistant.is_ready());
    }
}
