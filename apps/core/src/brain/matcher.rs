//! Intent matching against the knowledge base.
//!
//! Pure keyword overlap, no model required. Each topic is scored by how many
//! of its keywords occur in the normalized message; the best topic wins with
//! a confidence in [0, 1]. Short follow-ups ("what about the deadline?") fall
//! back to the previous topic's siblings.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

use super::knowledge::{KnowledgeBase, KnowledgeEntry};
use super::language::Language;
use super::tokens::tokenize;
use crate::config::MatcherConfig;

/// Continuation words and pronouns that mark a message as a follow-up, any language.
const CONTINUATION_CUES: &[&str] = &[
    // English
    "what about", "how about", "what else", "and", "also", "it", "that", "this", "more",
    // Hindi / Rajasthani
    "और", "भी", "इसके", "उसके", "यह", "वह", "अर",
    // Marathi
    "आणि", "पण", "हे", "ते", "त्याचे",
    // Gujarati
    "અને", "પણ", "તે", "એ", "આ",
];

/// Word endings that still count as the keyword: "hostels", "results", "tested".
const LATIN_INFLECTIONS: &[&str] = &["s", "es", "ed", "ing", "er", "ers"];

/// Longest non-Latin ending treated as inflection (Indic case and plural markers).
const MAX_INDIC_INFLECTION_CHARS: usize = 3;

/// Result of matching one message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Matched topic id, if any
    pub topic: Option<String>,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,
    /// Keywords that hit
    pub matched_keywords: Vec<String>,
    /// True when the topic was found through the previous turn's context
    pub from_context: bool,
}

impl MatchResult {
    pub fn none() -> Self {
        Self {
            topic: None,
            confidence: 0.0,
            matched_keywords: vec![],
            from_context: false,
        }
    }
}

/// Session state the matcher consults.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchContext<'a> {
    pub last_topic: Option<&'a str>,
}

/// Normalized message: tokens plus a space-padded join for phrase lookups.
struct Message {
    tokens: Vec<String>,
    padded: String,
}

impl Message {
    fn new(text: &str) -> Self {
        let tokens = tokenize(text);
        let padded = format!(" {} ", tokens.join(" "));
        Self { tokens, padded }
    }

    fn contains_phrase(&self, phrase: &str) -> bool {
        self.padded.contains(&format!(" {} ", phrase))
    }

    /// True when some token starts with `keyword` and the rest of it is an
    /// inflection. "examination" and "example" do not inflect "exam".
    fn contains_inflected(&self, keyword: &str) -> bool {
        let needle = format!(" {}", keyword);
        self.padded.match_indices(&needle).any(|(at, _)| {
            let rest = &self.padded[at + needle.len()..];
            let ending = rest.split(' ').next().unwrap_or_default();
            is_inflection(ending)
        })
    }
}

fn is_inflection(ending: &str) -> bool {
    if ending.is_empty() {
        return false;
    }
    if ending.is_ascii() {
        LATIN_INFLECTIONS.contains(&ending)
    } else {
        ending.chars().count() <= MAX_INDIC_INFLECTION_CHARS
    }
}

enum Hit {
    Strong,
    Weak,
}

struct Candidate<'a> {
    entry: &'a KnowledgeEntry,
    overlap: usize,
    confidence: f32,
    matched: Vec<String>,
}

/// Keyword matcher over a shared, read-only knowledge base.
pub struct IntentMatcher {
    kb: Arc<KnowledgeBase>,
    config: MatcherConfig,
}

impl IntentMatcher {
    pub fn new(kb: Arc<KnowledgeBase>, config: MatcherConfig) -> Self {
        Self { kb, config }
    }

    /// Match a message. Never fails; empty input yields no topic.
    pub fn match_message(
        &self,
        text: &str,
        language: Language,
        context: MatchContext<'_>,
    ) -> MatchResult {
        let message = Message::new(text);
        if message.tokens.is_empty() {
            return MatchResult::none();
        }

        let direct = self
            .kb
            .all_entries()
            .iter()
            .filter_map(|entry| self.score(entry, &message, false));
        if let Some(best) = pick_best(direct, context.last_topic) {
            debug!(
                topic = %best.entry.id,
                overlap = best.overlap,
                %language,
                "Direct keyword match"
            );
            return into_result(best, 1.0, false);
        }

        if let Some(last) = context.last_topic {
            if self.is_follow_up(&message) {
                let siblings = self
                    .kb
                    .siblings(last)
                    .into_iter()
                    .filter_map(|entry| self.score(entry, &message, true));
                if let Some(best) = pick_best(siblings, Some(last)) {
                    debug!(
                        topic = %best.entry.id,
                        previous = last,
                        %language,
                        "Context fallback match"
                    );
                    return into_result(best, self.config.context_fallback_weight, true);
                }
            }
        }

        MatchResult::none()
    }

    /// Short messages, or messages with a continuation cue, may refer to the previous topic.
    pub fn is_follow_up_text(&self, text: &str) -> bool {
        let message = Message::new(text);
        !message.tokens.is_empty() && self.is_follow_up(&message)
    }

    fn is_follow_up(&self, message: &Message) -> bool {
        message.tokens.len() <= self.config.followup_max_tokens
            || CONTINUATION_CUES.iter().any(|cue| message.contains_phrase(cue))
    }

    /// Scores one entry. `relaxed` adds context keywords and prefix hits.
    fn score<'a>(
        &self,
        entry: &'a KnowledgeEntry,
        message: &Message,
        relaxed: bool,
    ) -> Option<Candidate<'a>> {
        let considered: Vec<&String> = if relaxed {
            entry.keywords.iter().chain(&entry.context_keywords).collect()
        } else {
            entry.keywords.iter().collect()
        };

        let mut strong = 0usize;
        let mut weak = 0usize;
        let mut matched = Vec::new();
        for keyword in &considered {
            match self.keyword_hit(keyword, message, relaxed) {
                Some(Hit::Strong) => strong += 1,
                Some(Hit::Weak) => weak += 1,
                None => continue,
            }
            matched.push((*keyword).clone());
        }

        let overlap = strong + weak;
        if overlap == 0 {
            return None;
        }

        let weighted = strong as f32 + weak as f32 * self.config.weak_hit_weight;
        let normalizer = self.config.saturation_hits.min(considered.len()).max(1) as f32;
        Some(Candidate {
            entry,
            overlap,
            confidence: (weighted / normalizer).min(1.0),
            matched,
        })
    }

    fn keyword_hit(&self, keyword: &str, message: &Message, relaxed: bool) -> Option<Hit> {
        if message.contains_phrase(keyword) {
            return Some(Hit::Strong);
        }

        let long_enough = |s: &str| s.chars().count() >= self.config.min_substring_chars;
        if long_enough(keyword) && message.contains_inflected(keyword) {
            return Some(Hit::Weak);
        }
        if relaxed
            && message
                .tokens
                .iter()
                .any(|t| long_enough(t.as_str()) && keyword.starts_with(t.as_str()))
        {
            return Some(Hit::Weak);
        }
        None
    }
}

/// Higher overlap, then the previous topic, then the lexicographically smaller id.
fn rank(a: &Candidate<'_>, b: &Candidate<'_>, last_topic: Option<&str>) -> Ordering {
    let is_last = |c: &Candidate<'_>| last_topic == Some(c.entry.id.as_str());
    a.overlap
        .cmp(&b.overlap)
        .then_with(|| is_last(a).cmp(&is_last(b)))
        .then_with(|| b.entry.id.cmp(&a.entry.id))
}

fn pick_best<'a>(
    candidates: impl Iterator<Item = Candidate<'a>>,
    last_topic: Option<&str>,
) -> Option<Candidate<'a>> {
    candidates.max_by(|a, b| rank(a, b, last_topic))
}

fn into_result(best: Candidate<'_>, scale: f32, from_context: bool) -> MatchResult {
    MatchResult {
        topic: Some(best.entry.id.clone()),
        confidence: (best.confidence * scale).clamp(0.0, 1.0),
        matched_keywords: best.matched,
        from_context,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> IntentMatcher {
        let kb = Arc::new(KnowledgeBase::builtin().unwrap());
        IntentMatcher::new(kb, MatcherConfig::default())
    }

    fn direct(m: &IntentMatcher, text: &str) -> MatchResult {
        m.match_message(text, Language::English, MatchContext::default())
    }

    #[test]
    fn test_english_fees_question() {
        let result = direct(&matcher(), "What are the fees?");
        assert_eq!(result.topic.as_deref(), Some("fees"));
        assert!(result.confidence >= 0.7);
        assert!(result.matched_keywords.contains(&"fees".to_string()));
        assert!(!result.from_context);
    }

    #[test]
    fn test_hindi_keyword() {
        let m = matcher();
        let result = m.match_message("शुल्क क्या है?", Language::Hindi, MatchContext::default());
        assert_eq!(result.topic.as_deref(), Some("fees"));
        assert!(result.confidence >= 0.7);
    }

    #[test]
    fn test_gujarati_two_char_keyword_needs_whole_token() {
        let m = matcher();
        let result = m.match_message("ફી કેટલી છે?", Language::Gujarati, MatchContext::default());
        assert_eq!(result.topic.as_deref(), Some("fees"));
    }

    #[test]
    fn test_phrase_keyword() {
        let result = direct(&matcher(), "Is there any financial aid for students");
        assert_eq!(result.topic.as_deref(), Some("scholarships"));
    }

    #[test]
    fn test_short_keyword_does_not_match_inside_words() {
        // "hi" must not hit "this" or "which"
        let result = direct(&matcher(), "which is this");
        assert_eq!(result.topic, None);
    }

    #[test]
    fn test_inflected_hit_is_weak() {
        // "hostel" is not a token here but "hostels" inflects it
        let result = direct(&matcher(), "hostels");
        assert_eq!(result.topic.as_deref(), Some("facilities"));
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn test_interior_substring_is_not_a_hit() {
        // "latest" contains "test", "example" contains "exam"
        let m = matcher();
        assert_eq!(direct(&m, "what is the latest news"), MatchResult::none());
        assert_eq!(direct(&m, "Can you give me an example?"), MatchResult::none());
        assert_eq!(direct(&m, "the classroom"), MatchResult::none());
    }

    #[test]
    fn test_indic_inflection_is_weak() {
        let m = matcher();
        let result = m.match_message("परीक्षाओं का समय", Language::Hindi, MatchContext::default());
        assert_eq!(result.topic.as_deref(), Some("exams"));
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn test_no_overlap_returns_none() {
        let result = direct(&matcher(), "asdkjasd random text");
        assert_eq!(result, MatchResult::none());
    }

    #[test]
    fn test_empty_input() {
        let m = matcher();
        assert_eq!(direct(&m, ""), MatchResult::none());
        assert_eq!(direct(&m, "   ?! "), MatchResult::none());
    }

    #[test]
    fn test_higher_overlap_wins_over_context() {
        let m = matcher();
        let ctx = MatchContext { last_topic: Some("fees") };
        let result = m.match_message("what about scholarships?", Language::English, ctx);
        assert_eq!(result.topic.as_deref(), Some("scholarships"));
    }

    #[test]
    fn test_equal_overlap_prefers_previous_topic() {
        let m = matcher();
        // one keyword each for fees and scholarships
        let text = "fee stipend";
        assert_eq!(direct(&m, text).topic.as_deref(), Some("fees"));

        let ctx = MatchContext { last_topic: Some("scholarships") };
        let result = m.match_message(text, Language::English, ctx);
        assert_eq!(result.topic.as_deref(), Some("scholarships"));
    }

    #[test]
    fn test_equal_overlap_without_context_is_lexicographic() {
        // exams (exam) vs timetable (schedule)
        let result = direct(&matcher(), "exam schedule");
        assert_eq!(result.topic.as_deref(), Some("exams"));
    }

    #[test]
    fn test_context_fallback_uses_context_keywords() {
        let m = matcher();
        let ctx = MatchContext { last_topic: Some("fees") };
        let result = m.match_message("and the deadline?", Language::English, ctx);
        assert_eq!(result.topic.as_deref(), Some("fees"));
        assert!(result.from_context);
        assert!((result.confidence - 0.6).abs() < f32::EPSILON);
    }

    #[test]
    fn test_context_fallback_reaches_siblings_by_prefix() {
        let m = matcher();
        let ctx = MatchContext { last_topic: Some("fees") };
        let result = m.match_message("what about scholar", Language::English, ctx);
        assert_eq!(result.topic.as_deref(), Some("scholarships"));
        assert!(result.from_context);
    }

    #[test]
    fn test_context_fallback_stays_within_group() {
        let m = matcher();
        // "timing" is a context keyword of timetable and facilities, neither a sibling of fees
        let ctx = MatchContext { last_topic: Some("fees") };
        let result = m.match_message("and timing?", Language::English, ctx);
        assert_eq!(result, MatchResult::none());
    }

    #[test]
    fn test_context_fallback_requires_follow_up() {
        let m = matcher();
        let ctx = MatchContext { last_topic: Some("fees") };
        let result = m.match_message(
            "please tell me the deadline for the whole thing",
            Language::English,
            ctx,
        );
        assert_eq!(result, MatchResult::none());
    }

    #[test]
    fn test_context_fallback_without_history_is_none() {
        let result = direct(&matcher(), "and the deadline?");
        assert_eq!(result, MatchResult::none());
    }

    #[test]
    fn test_follow_up_detection() {
        let m = matcher();
        assert!(m.is_follow_up_text("and?"));
        assert!(m.is_follow_up_text("और इसके बारे में बताइए कृपया जल्दी"));
        assert!(!m.is_follow_up_text("please tell me everything about campus life today"));
        assert!(!m.is_follow_up_text(""));
    }

    #[test]
    fn test_confidence_is_bounded() {
        let m = matcher();
        let result = direct(&m, "fee fees payment tuition fee structure शुल्क फीस");
        assert_eq!(result.topic.as_deref(), Some("fees"));
        assert!(result.confidence <= 1.0 && result.confidence >= 0.0);
    }

    #[test]
    fn test_saturation_dilutes_single_hit() {
        let kb = Arc::new(KnowledgeBase::builtin().unwrap());
        let config = MatcherConfig {
            saturation_hits: 4,
            ..MatcherConfig::default()
        };
        let m = IntentMatcher::new(kb, config);
        let result = direct(&m, "library");
        assert_eq!(result.topic.as_deref(), Some("facilities"));
        assert_eq!(result.confidence, 0.25);
    }
}
