//! # Brain Module
//!
//! Keyword-based understanding for the campus assistant. No model, no
//! network: every message is answered from the in-memory knowledge base.
//!
//! ## Components
//! - `tokens`: Unicode-aware normalization shared by loader and matcher
//! - `language`: Language resolution (hint, script, marker words)
//! - `knowledge`: Validated knowledge base (topics, fallback, contact)
//! - `matcher`: Keyword overlap scoring with context fallback
//! - `session`: Per-session conversation state with independent locks
//! - `composer`: Localized reply or human handoff
//! - `assistant`: Main orchestrator

pub mod assistant;
pub mod composer;
pub mod knowledge;
pub mod language;
pub mod matcher;
pub mod session;
pub mod tokens;

pub use assistant::{CampusAssistant, ChatRequest, ChatResponse};
pub use composer::{ReplyDecision, ResponseComposer};
pub use knowledge::{ContactInfo, KnowledgeBase, KnowledgeEntry, LoadError};
pub use language::{Language, LanguageResolver};
pub use matcher::{IntentMatcher, MatchContext, MatchResult};
pub use session::{Session, SessionStore, Turn};
