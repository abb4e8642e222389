//! Language resolution.
//!
//! An explicit, recognized hint always wins. Otherwise the script decides
//! between English, Gujarati and the Devanagari family, and marker words
//! decide between Hindi, Marathi and Rajasthani inside that family.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::tokens::tokenize;

/// Supported response language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "en")]
    English,
    #[serde(rename = "hi")]
    Hindi,
    #[serde(rename = "gu")]
    Gujarati,
    #[serde(rename = "mr")]
    Marathi,
    #[serde(rename = "raj")]
    Rajasthani,
}

impl Language {
    /// Language every knowledge-base entry must provide.
    pub const DEFAULT: Language = Language::English;

    /// Returns the language code
    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Hindi => "hi",
            Language::Gujarati => "gu",
            Language::Marathi => "mr",
            Language::Rajasthani => "raj",
        }
    }

    /// Display name, with the native script for regional languages
    pub fn name(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Hindi => "Hindi (हिंदी)",
            Language::Gujarati => "Gujarati (ગુજરાતી)",
            Language::Marathi => "Marathi (मराठी)",
            Language::Rajasthani => "Rajasthani (राजस्थानी)",
        }
    }

    pub fn all() -> [Language; 5] {
        [
            Language::English,
            Language::Hindi,
            Language::Gujarati,
            Language::Marathi,
            Language::Rajasthani,
        ]
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported language code '{0}'")]
pub struct UnsupportedLanguage(pub String);

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" => Ok(Language::English),
            "hi" => Ok(Language::Hindi),
            "gu" => Ok(Language::Gujarati),
            "mr" => Ok(Language::Marathi),
            "raj" => Ok(Language::Rajasthani),
            other => Err(UnsupportedLanguage(other.to_string())),
        }
    }
}

// Marker lists are pairwise disjoint. Words shared across the family
// (नमस्ते, धन्यवाद, में, ...) are deliberately absent.
const HINDI_MARKERS: &[&str] = &[
    "है", "हैं", "क्या", "कैसे", "कब", "क्यों", "कहाँ", "कहां", "मैं", "मुझे", "नहीं", "आप",
    "कितनी", "कितना", "होता", "होती", "चाहिए",
];

const MARATHI_MARKERS: &[&str] = &[
    "आहे", "आहेत", "काय", "कसे", "कशी", "केव्हा", "कुठे", "मला", "तुम्ही", "आणि", "नाही",
    "किती", "कोणते", "साठी", "पाहिजे",
];

const RAJASTHANI_MARKERS: &[&str] = &[
    "कांई", "काईं", "कठै", "कद", "क्यूं", "म्हनै", "म्हारो", "म्हारी", "थारो", "थारी",
    "सूं", "री", "रो", "होवै", "कोनी", "कित्ती", "पैली",
];

fn is_devanagari(c: char) -> bool {
    ('\u{0900}'..='\u{097F}').contains(&c)
}

fn is_gujarati(c: char) -> bool {
    ('\u{0A80}'..='\u{0AFF}').contains(&c)
}

/// Resolves the response language for a message.
#[derive(Debug, Default, Clone)]
pub struct LanguageResolver;

impl LanguageResolver {
    pub fn new() -> Self {
        Self
    }

    /// Never fails; the same `(text, hint)` pair always yields the same language.
    pub fn resolve(&self, text: &str, hint: Option<&str>) -> Language {
        if let Some(lang) = hint.and_then(|h| h.parse::<Language>().ok()) {
            return lang;
        }
        self.detect(text)
    }

    /// Script and marker-word detection, ignoring any hint.
    pub fn detect(&self, text: &str) -> Language {
        let (devanagari, gujarati) = text.chars().fold((0usize, 0usize), |(d, g), c| {
            (d + is_devanagari(c) as usize, g + is_gujarati(c) as usize)
        });

        if devanagari == 0 && gujarati == 0 {
            return Language::English;
        }
        if gujarati > devanagari {
            return Language::Gujarati;
        }
        self.disambiguate_devanagari(text)
    }

    fn disambiguate_devanagari(&self, text: &str) -> Language {
        let tokens = tokenize(text);
        let hits = |markers: &[&str]| {
            tokens
                .iter()
                .filter(|t| markers.contains(&t.as_str()))
                .count()
        };

        // Order matters: on equal counts the earlier language wins.
        let candidates = [
            (Language::Hindi, hits(HINDI_MARKERS)),
            (Language::Marathi, hits(MARATHI_MARKERS)),
            (Language::Rajasthani, hits(RAJASTHANI_MARKERS)),
        ];

        let mut best = candidates[0];
        for candidate in &candidates[1..] {
            if candidate.1 > best.1 {
                best = *candidate;
            }
        }
        best.0
    }
}
