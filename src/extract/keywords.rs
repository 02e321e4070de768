//! Keyword tagging for extracted articles.
//!
//! Two backends implement [`KeywordExtractor`]:
//!
//! - [`LexiconKeywords`]: model-backed. Loads a YAML keyword model of known
//!   entities and phrases (with aliases) and reports the canonical names found
//!   in the text.
//! - [`FrequencyKeywords`]: lexical fallback. Stop-word-filtered word
//!   frequency, top ten.
//!
//! The backend is chosen once at startup by [`select_keyword_extractor`];
//! extraction code never checks which one it has.
//!
//! # Keyword model format
//!
//! ```yaml
//! terms:
//!   - name: European Union
//!     aliases: [EU, E.U.]
//!   - name: Federal Reserve
//!     aliases: [the Fed]
//! ```

use crate::errors::ConfigError;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Keywords reported per article.
pub const MAX_KEYWORDS: usize = 10;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "as", "is", "was", "are", "been", "be", "have", "has", "had", "do", "does", "did",
    "will", "would", "could", "should", "may", "might", "must", "can", "this", "that", "these",
    "those", "said", "says", "after", "before", "over", "into", "their", "there", "they", "them",
    "about", "which", "while", "were", "what", "when", "where", "than", "then", "also", "more",
];

static WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+)*\b|\b[a-z]{4,}\b").expect("static regex")
});

/// Turns article text into a short list of keyword tags.
pub trait KeywordExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// At most [`MAX_KEYWORDS`] tags, most relevant first.
    fn extract(&self, text: &str) -> Vec<String>;
}

/// Word-frequency keywords with stop words removed.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrequencyKeywords;

impl KeywordExtractor for FrequencyKeywords {
    fn name(&self) -> &'static str {
        "frequency"
    }

    fn extract(&self, text: &str) -> Vec<String> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for m in WORDS.find_iter(text) {
            let word = m.as_str();
            if word.len() <= 3 || STOP_WORDS.contains(&word.to_lowercase().as_str()) {
                continue;
            }
            let tag = title_case(word);
            match index.get(&tag) {
                Some(&i) => counts[i].1 += 1,
                None => {
                    index.insert(tag.clone(), counts.len());
                    counts.push((tag, 1));
                }
            }
        }

        // Stable sort keeps first-seen order among equal counts.
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        counts.into_iter().take(MAX_KEYWORDS).map(|(tag, _)| tag).collect()
    }
}

#[derive(Debug, Deserialize)]
struct KeywordModelFile {
    terms: Vec<KeywordModelTerm>,
}

#[derive(Debug, Deserialize)]
struct KeywordModelTerm {
    name: String,
    #[serde(default)]
    aliases: Vec<String>,
}

/// Keywords from a curated model of entities and phrases.
///
/// Falls back to [`FrequencyKeywords`] for texts that mention none of the
/// model's terms.
#[derive(Debug)]
pub struct LexiconKeywords {
    terms: Vec<(String, Regex)>,
    fallback: FrequencyKeywords,
}

impl LexiconKeywords {
    /// Load a keyword model from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let model: KeywordModelFile = serde_yaml::from_str(raw)?;
        if model.terms.is_empty() {
            return Err(ConfigError::Invalid("keyword model has no terms".into()));
        }

        let mut terms = Vec::with_capacity(model.terms.len());
        for term in model.terms {
            let name = term.name.trim().to_string();
            if name.is_empty() {
                continue;
            }
            let alternatives = std::iter::once(&name)
                .chain(term.aliases.iter())
                .map(|s| regex::escape(s.trim()))
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("|");
            let pattern = format!(r"(?i)(?:^|\W)(?:{alternatives})(?:$|\W)");
            let re = Regex::new(&pattern)
                .map_err(|e| ConfigError::Invalid(format!("term {name:?}: {e}")))?;
            terms.push((name, re));
        }
        Ok(Self {
            terms,
            fallback: FrequencyKeywords,
        })
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }
}

impl KeywordExtractor for LexiconKeywords {
    fn name(&self) -> &'static str {
        "lexicon"
    }

    fn extract(&self, text: &str) -> Vec<String> {
        let mut hits: Vec<(usize, &String)> = self
            .terms
            .iter()
            .filter_map(|(name, re)| re.find(text).map(|m| (m.start(), name)))
            .collect();
        hits.sort_by_key(|(pos, _)| *pos);

        let mut seen = HashSet::new();
        let found: Vec<String> = hits
            .into_iter()
            .filter(|(_, name)| seen.insert(name.to_lowercase()))
            .map(|(_, name)| name.clone())
            .take(MAX_KEYWORDS)
            .collect();

        if found.is_empty() {
            self.fallback.extract(text)
        } else {
            found
        }
    }
}

/// Pick the keyword backend for this run.
///
/// Uses the keyword model at `model_path` when it loads; otherwise falls back
/// to word frequency.
pub fn select_keyword_extractor(model_path: Option<&Path>) -> Arc<dyn KeywordExtractor> {
    let Some(path) = model_path else {
        info!(backend = "frequency", "No keyword model configured");
        return Arc::new(FrequencyKeywords);
    };
    match LexiconKeywords::load(path) {
        Ok(lexicon) => {
            info!(backend = "lexicon", terms = lexicon.term_count(), path = %path.display(), "Loaded keyword model");
            Arc::new(lexicon)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Keyword model unavailable; using frequency keywords");
            Arc::new(FrequencyKeywords)
        }
    }
}

/// Capitalise the first letter of each word and lower-case the rest.
pub fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_frequency_keywords_rank_by_count() {
        let text = "Flood waters rose in Riverton. Residents of Riverton fled the flood \
                    while rescue crews worked. The flood was the worst this decade.";
        let kw = FrequencyKeywords.extract(text);
        assert_eq!(kw[0], "Flood");
        assert!(kw.contains(&"Riverton".to_string()));
        assert!(!kw.iter().any(|k| k.eq_ignore_ascii_case("the")));
        assert!(kw.len() <= MAX_KEYWORDS);
    }

    #[test]
    fn test_frequency_keywords_empty_text() {
        assert!(FrequencyKeywords.extract("").is_empty());
        assert!(FrequencyKeywords.extract("a an the of").is_empty());
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("new YORK city"), "New York City");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn test_lexicon_matches_aliases_in_text_order() {
        let lexicon = LexiconKeywords::from_yaml(
            "terms:\n  - name: Federal Reserve\n    aliases: [the Fed]\n  - name: European Union\n    aliases: [EU]\n",
        )
        .unwrap();
        let kw = lexicon.extract("EU ministers reacted after the Fed raised rates.");
        assert_eq!(kw, vec!["European Union".to_string(), "Federal Reserve".to_string()]);
    }

    #[test]
    fn test_lexicon_requires_word_boundaries() {
        let lexicon = LexiconKeywords::from_yaml("terms:\n  - name: EU\n").unwrap();
        let kw = lexicon.extract("Neutral observers were present at the museum.");
        assert!(!kw.contains(&"EU".to_string()));
    }

    #[test]
    fn test_lexicon_falls_back_to_frequency() {
        let lexicon = LexiconKeywords::from_yaml("terms:\n  - name: NATO\n").unwrap();
        let kw = lexicon.extract("Harvest festival draws harvest crowds");
        assert_eq!(kw[0], "Harvest");
    }

    #[test]
    fn test_lexicon_rejects_empty_model() {
        assert!(LexiconKeywords::from_yaml("terms: []").is_err());
        assert!(LexiconKeywords::from_yaml("not: [valid").is_err());
    }

    #[test]
    fn test_select_falls_back_when_model_missing() {
        let extractor = select_keyword_extractor(Some(Path::new("/nonexistent/model.yaml")));
        assert_eq!(extractor.name(), "frequency");
        assert_eq!(select_keyword_extractor(None).name(), "frequency");
    }

    #[test]
    fn test_select_uses_model_when_present() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "terms:\n  - name: World Health Organization\n    aliases: [WHO]").unwrap();
        let extractor = select_keyword_extractor(Some(file.path()));
        assert_eq!(extractor.name(), "lexicon");
    }
}
