//! Knowledge Base Store.
//!
//! Loads the static topic → keywords → localized response mapping once at
//! startup. The loader is strict: any schema violation is a [`LoadError`]
//! and the process must refuse to serve. After load the store is read-only.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use super::language::Language;
use super::tokens::normalize;

/// Knowledge base shipped with the crate, used when no path is configured.
const BUILTIN_KNOWLEDGE_BASE: &str = include_str!("../../data/knowledge_base.json");

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read knowledge base at {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed knowledge base: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("knowledge base has no topics")]
    NoTopics,
    #[error("topic id must not be empty")]
    EmptyTopicId,
    #[error("duplicate topic id '{0}'")]
    DuplicateTopic(String),
    #[error("topic '{0}' has an empty keyword set")]
    EmptyKeywords(String),
    #[error("topic '{topic}' is missing the required '{language}' response")]
    MissingLanguage { topic: String, language: Language },
    #[error("topic '{topic}' uses unsupported language code '{code}'")]
    UnsupportedLanguage { topic: String, code: String },
    #[error("contact record field '{0}' must not be empty")]
    EmptyContactField(&'static str),
}

/// Office contact details attached to every human handoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContactInfo {
    pub phone: String,
    pub email: String,
    pub office_hours: String,
    pub address: String,
}

/// One campus topic with its keywords and localized answers.
#[derive(Debug, Clone)]
pub struct KnowledgeEntry {
    pub id: String,
    pub group: String,
    /// Normalized, deduplicated, in source order
    pub keywords: Vec<String>,
    /// Only consulted when resolving follow-up messages
    pub context_keywords: Vec<String>,
    responses: HashMap<Language, String>,
}

impl KnowledgeEntry {
    /// Localized response, falling back to the default language.
    pub fn response_for(&self, language: Language) -> &str {
        self.responses
            .get(&language)
            .or_else(|| self.responses.get(&Language::DEFAULT))
            .map(String::as_str)
            // validated at load time
            .unwrap_or_default()
    }

    pub fn has_language(&self, language: Language) -> bool {
        self.responses.contains_key(&language)
    }
}

// --- Raw (unvalidated) shape ---

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawKnowledgeBase {
    topics: Vec<RawTopic>,
    fallback: BTreeMap<String, String>,
    contact: ContactInfo,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTopic {
    id: String,
    #[serde(default = "default_group")]
    group: String,
    keywords: Vec<String>,
    #[serde(default)]
    context_keywords: Vec<String>,
    responses: BTreeMap<String, String>,
}

fn default_group() -> String {
    "general".to_string()
}

/// Read-only, validated knowledge base.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    entries: Vec<KnowledgeEntry>,
    index: HashMap<String, usize>,
    fallback: HashMap<Language, String>,
    contact: ContactInfo,
}

impl KnowledgeBase {
    /// Loads the knowledge base embedded in the binary.
    pub fn builtin() -> Result<Self, LoadError> {
        Self::from_json_str(BUILTIN_KNOWLEDGE_BASE)
    }

    /// Loads and validates a knowledge base file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| LoadError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), bytes = raw.len(), "Read knowledge base file");
        Self::from_json_str(&raw)
    }

    /// Parses and validates a knowledge base document.
    pub fn from_json_str(source: &str) -> Result<Self, LoadError> {
        let raw: RawKnowledgeBase = serde_json::from_str(source)?;
        if raw.topics.is_empty() {
            return Err(LoadError::NoTopics);
        }

        let mut entries = Vec::with_capacity(raw.topics.len());
        let mut index = HashMap::new();

        for topic in raw.topics {
            let id = topic.id.trim().to_string();
            if id.is_empty() {
                return Err(LoadError::EmptyTopicId);
            }
            if index.contains_key(&id) {
                return Err(LoadError::DuplicateTopic(id));
            }

            let keywords = normalize_keywords(&topic.keywords);
            if keywords.is_empty() {
                return Err(LoadError::EmptyKeywords(id));
            }
            let context_keywords = normalize_keywords(&topic.context_keywords);

            let responses = parse_localized(&id, topic.responses)?;

            index.insert(id.clone(), entries.len());
            entries.push(KnowledgeEntry {
                id,
                group: topic.group.trim().to_string(),
                keywords,
                context_keywords,
                responses,
            });
        }

        let fallback = parse_localized("fallback", raw.fallback)?;
        validate_contact(&raw.contact)?;

        Ok(Self {
            entries,
            index,
            fallback,
            contact: raw.contact,
        })
    }

    pub fn lookup(&self, topic_id: &str) -> Option<&KnowledgeEntry> {
        self.index.get(topic_id).map(|&i| &self.entries[i])
    }

    /// All entries in load order.
    pub fn all_entries(&self) -> &[KnowledgeEntry] {
        &self.entries
    }

    pub fn contact_info(&self) -> &ContactInfo {
        &self.contact
    }

    /// Entries sharing `topic_id`'s group, the topic itself included, in load order.
    pub fn siblings(&self, topic_id: &str) -> Vec<&KnowledgeEntry> {
        match self.lookup(topic_id) {
            Some(entry) => self
                .entries
                .iter()
                .filter(|e| e.group == entry.group)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Localized handoff message.
    pub fn fallback_message(&self, language: Language) -> &str {
        self.fallback
            .get(&language)
            .or_else(|| self.fallback.get(&Language::DEFAULT))
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize_keywords(raw: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.iter()
        .map(|k| normalize(k))
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.clone()))
        .collect()
}

fn parse_localized(
    owner: &str,
    raw: BTreeMap<String, String>,
) -> Result<HashMap<Language, String>, LoadError> {
    let mut localized = HashMap::with_capacity(raw.len());
    for (code, text) in raw {
        let language = code
            .parse::<Language>()
            .map_err(|_| LoadError::UnsupportedLanguage {
                topic: owner.to_string(),
                code: code.clone(),
            })?;
        if !text.trim().is_empty() {
            localized.insert(language, text);
        }
    }
    if !localized.contains_key(&Language::DEFAULT) {
        return Err(LoadError::MissingLanguage {
            topic: owner.to_string(),
            language: Language::DEFAULT,
        });
    }
    Ok(localized)
}

fn validate_contact(contact: &ContactInfo) -> Result<(), LoadError> {
    let fields = [
        ("phone", &contact.phone),
        ("email", &contact.email),
        ("office_hours", &contact.office_hours),
        ("address", &contact.address),
    ];
    for (name, value) in fields {
        if value.trim().is_empty() {
            return Err(LoadError::EmptyContactField(name));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CONTACT: &str = r#""contact": {
        "phone": "1", "email": "a@b.c", "office_hours": "9-5", "address": "Campus"
    }"#;
    const FALLBACK: &str = r#""fallback": {"en": "Please contact the office."}"#;

    fn doc(topics: &str) -> String {
        format!(r#"{{"topics": [{topics}], {FALLBACK}, {CONTACT}}}"#)
    }

    #[test]
    fn test_builtin_loads_all_topics_in_order() {
        let kb = KnowledgeBase::builtin().unwrap();
        let ids: Vec<&str> = kb.all_entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "fees", "scholarships", "timetable", "admission", "exams", "facilities",
                "greetings", "thanks", "goodbye"
            ]
        );
        for entry in kb.all_entries() {
            for lang in Language::all() {
                assert!(entry.has_language(lang), "{} lacks {}", entry.id, lang);
            }
        }
    }

    #[test]
    fn test_lookup_and_contact() {
        let kb = KnowledgeBase::builtin().unwrap();
        assert!(kb.lookup("fees").is_some());
        assert!(kb.lookup("parking").is_none());
        assert_eq!(kb.contact_info().email, "info@college.edu");
    }

    #[test]
    fn test_keywords_are_normalized_and_deduplicated() {
        let kb = KnowledgeBase::from_json_str(&doc(
            r#"{
                "id": "fees",
                "keywords": ["Fee", "fee ", "Financial   Aid"],
                "responses": {"en": "x"}
            }"#,
        ))
        .unwrap();
        assert_eq!(kb.lookup("fees").unwrap().keywords, vec!["fee", "financial aid"]);
    }

    #[test]
    fn test_response_falls_back_to_english() {
        let kb = KnowledgeBase::from_json_str(&doc(
            r#"{"id": "fees", "keywords": ["fee"], "responses": {"en": "english", "hi": "हिंदी"}}"#,
        ))
        .unwrap();
        let entry = kb.lookup("fees").unwrap();
        assert_eq!(entry.response_for(Language::Hindi), "हिंदी");
        assert_eq!(entry.response_for(Language::Gujarati), "english");
        assert_eq!(kb.fallback_message(Language::Marathi), "Please contact the office.");
    }

    #[test]
    fn test_siblings_share_group() {
        let kb = KnowledgeBase::builtin().unwrap();
        let siblings: Vec<&str> = kb.siblings("fees").iter().map(|e| e.id.as_str()).collect();
        assert_eq!(siblings, vec!["fees", "scholarships"]);
        assert!(kb.siblings("unknown").is_empty());
    }

    #[test]
    fn test_rejects_duplicate_topic() {
        let topic = r#"{"id": "fees", "keywords": ["fee"], "responses": {"en": "x"}}"#;
        let err = KnowledgeBase::from_json_str(&doc(&format!("{topic}, {topic}"))).unwrap_err();
        assert!(matches!(err, LoadError::DuplicateTopic(id) if id == "fees"));
    }

    #[test]
    fn test_rejects_empty_keywords() {
        let err = KnowledgeBase::from_json_str(&doc(
            r#"{"id": "fees", "keywords": ["  ", "?"], "responses": {"en": "x"}}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, LoadError::EmptyKeywords(_)));
    }

    #[test]
    fn test_rejects_missing_default_language() {
        let err = KnowledgeBase::from_json_str(&doc(
            r#"{"id": "fees", "keywords": ["fee"], "responses": {"hi": "x"}}"#,
        ))
        .unwrap_err();
        assert!(matches!(
            err,
            LoadError::MissingLanguage { ref topic, language: Language::English } if topic == "fees"
        ));
    }

    #[test]
    fn test_rejects_unsupported_language() {
        let err = KnowledgeBase::from_json_str(&doc(
            r#"{"id": "fees", "keywords": ["fee"], "responses": {"en": "x", "fr": "y"}}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedLanguage { ref code, .. } if code == "fr"));
    }

    #[test]
    fn test_rejects_empty_topic_id_and_contact_field() {
        let err = KnowledgeBase::from_json_str(&doc(
            r#"{"id": " ", "keywords": ["fee"], "responses": {"en": "x"}}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, LoadError::EmptyTopicId));

        let bad_contact = r#"{
            "topics": [{"id": "fees", "keywords": ["fee"], "responses": {"en": "x"}}],
            "fallback": {"en": "x"},
            "contact": {"phone": "", "email": "a", "office_hours": "b", "address": "c"}
        }"#;
        let err = KnowledgeBase::from_json_str(bad_contact).unwrap_err();
        assert!(matches!(err, LoadError::EmptyContactField("phone")));
    }

    #[test]
    fn test_rejects_empty_topic_list() {
        let err = KnowledgeBase::from_json_str(&doc("")).unwrap_err();
        assert!(matches!(err, LoadError::NoTopics));
    }

    #[test]
    fn test_rejects_malformed_and_unknown_fields() {
        assert!(matches!(
            KnowledgeBase::from_json_str("{not json").unwrap_err(),
            LoadError::Malformed(_)
        ));
        let err = KnowledgeBase::from_json_str(&doc(
            r#"{"id": "fees", "keywords": ["fee"], "responses": {"en": "x"}, "weight": 3}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, LoadError::Malformed(_)));
    }

    #[test]
    fn test_from_path() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "{}",
            doc(r#"{"id": "library", "keywords": ["library"], "responses": {"en": "Open 8-8"}}"#)
        )
        .unwrap();

        let kb = KnowledgeBase::from_path(file.path()).unwrap();
        assert_eq!(kb.len(), 1);

        let missing = KnowledgeBase::from_path("/nonexistent/kb.json").unwrap_err();
        assert!(matches!(missing, LoadError::Unreadable { .. }));
    }
}
