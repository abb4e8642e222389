//! Reply composition: localized answer or human handoff.

use serde::Serialize;
use std::sync::Arc;

use super::knowledge::{ContactInfo, KnowledgeBase};
use super::language::Language;
use super::matcher::MatchResult;
use super::session::Session;

/// What the assistant answers for one turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplyDecision {
    pub response: String,
    pub language: Language,
    /// Matched topic, kept even when the reply is a handoff
    pub topic: Option<String>,
    pub confidence: f32,
    pub needs_human: bool,
    /// Office contact details, only attached on handoff
    pub contact: Option<ContactInfo>,
}

pub struct ResponseComposer {
    kb: Arc<KnowledgeBase>,
    handoff_threshold: f32,
}

impl ResponseComposer {
    pub fn new(kb: Arc<KnowledgeBase>, handoff_threshold: f32) -> Self {
        Self {
            kb,
            handoff_threshold,
        }
    }

    pub fn handoff_threshold(&self) -> f32 {
        self.handoff_threshold
    }

    /// Builds the reply and records the turn on `session`.
    ///
    /// A topic at or above the handoff threshold is answered from the
    /// knowledge base; anything else gets the localized fallback plus the
    /// office contact.
    pub fn compose(
        &self,
        result: &MatchResult,
        text: &str,
        language: Language,
        session: &mut Session,
    ) -> ReplyDecision {
        let answer = result
            .topic
            .as_deref()
            .filter(|_| result.confidence >= self.handoff_threshold)
            .and_then(|topic| self.kb.lookup(topic));

        let decision = match answer {
            Some(entry) => ReplyDecision {
                response: entry.response_for(language).to_string(),
                language,
                topic: result.topic.clone(),
                confidence: result.confidence,
                needs_human: false,
                contact: None,
            },
            None => ReplyDecision {
                response: self.kb.fallback_message(language).to_string(),
                language,
                topic: result.topic.clone(),
                confidence: result.confidence,
                needs_human: true,
                contact: Some(self.kb.contact_info().clone()),
            },
        };

        session.record(text, language, result, decision.needs_human);
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composer(threshold: f32) -> (ResponseComposer, Arc<KnowledgeBase>) {
        let kb = Arc::new(KnowledgeBase::builtin().unwrap());
        (ResponseComposer::new(Arc::clone(&kb), threshold), kb)
    }

    fn result(topic: Option<&str>, confidence: f32) -> MatchResult {
        MatchResult {
            topic: topic.map(str::to_string),
            confidence,
            matched_keywords: vec![],
            from_context: false,
        }
    }

    #[test]
    fn test_confident_match_answers_in_language() {
        let (composer, kb) = composer(0.3);
        let mut session = Session::new("s");
        let reply = composer.compose(
            &result(Some("fees"), 1.0),
            "शुल्क",
            Language::Hindi,
            &mut session,
        );

        assert!(!reply.needs_human);
        assert!(reply.contact.is_none());
        assert_eq!(reply.response, kb.lookup("fees").unwrap().response_for(Language::Hindi));
        assert_eq!(session.turn_count(), 1);
        assert_eq!(session.last_topic(), Some("fees"));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let (composer, _) = composer(0.5);
        let mut session = Session::new("s");

        let at = composer.compose(
            &result(Some("fees"), 0.5),
            "fee",
            Language::English,
            &mut session,
        );
        assert!(!at.needs_human);

        let below = composer.compose(
            &result(Some("fees"), 0.49),
            "fee",
            Language::English,
            &mut session,
        );
        assert!(below.needs_human);
        assert_eq!(below.topic.as_deref(), Some("fees"));
    }

    #[test]
    fn test_no_topic_hands_off_with_contact() {
        let (composer, kb) = composer(0.3);
        let mut session = Session::new("s");
        let reply = composer.compose(&MatchResult::none(), "xyz", Language::Gujarati, &mut session);

        assert!(reply.needs_human);
        assert_eq!(reply.response, kb.fallback_message(Language::Gujarati));
        assert_eq!(reply.contact.as_ref(), Some(kb.contact_info()));
        assert!(session.turns()[0].needs_human);
        assert_eq!(session.last_topic(), None);
    }

    #[test]
    fn test_unknown_topic_is_a_handoff() {
        let (composer, _) = composer(0.3);
        let mut session = Session::new("s");
        let reply = composer.compose(
            &result(Some("parking"), 1.0),
            "parking",
            Language::English,
            &mut session,
        );
        assert!(reply.needs_human);
    }
}
