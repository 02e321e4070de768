//! Coarse topic labels for an article, from a fixed vocabulary.

use std::collections::HashSet;

/// Label used when no topic vocabulary matches.
pub const GENERAL_TOPIC: &str = "General";

const TOPICS: &[(&str, &[&str])] = &[
    ("Politics", &["election", "government", "minister", "parliament", "policy", "vote", "president", "congress", "senate", "political"]),
    ("Economy", &["economy", "market", "business", "finance", "stock", "trade", "gdp", "inflation", "bank", "economic"]),
    ("Technology", &["technology", "tech", "ai", "digital", "software", "internet", "cyber", "app", "innovation", "startup"]),
    ("Health", &["health", "medical", "hospital", "disease", "treatment", "doctor", "patient", "medicine", "covid", "vaccine"]),
    ("Sports", &["sport", "cricket", "football", "match", "player", "team", "championship", "olympic", "tournament", "game"]),
    ("Entertainment", &["entertainment", "movie", "film", "actor", "music", "celebrity", "show", "series", "bollywood", "hollywood"]),
    ("Environment", &["climate", "environment", "pollution", "green", "sustainability", "energy", "renewable", "carbon", "nature", "storm", "flood"]),
    ("Crime", &["crime", "police", "arrest", "court", "murder", "theft", "investigation", "law", "justice", "trial"]),
    ("Education", &["education", "school", "university", "student", "exam", "teacher", "learning", "college", "academic"]),
    ("International", &["international", "world", "global", "foreign", "country", "nation", "embassy", "diplomatic", "war"]),
];

/// Topics whose vocabulary appears in `text` or `keywords`, in table order.
///
/// Matching is per word, so "ai" does not fire on "said"; a trailing plural
/// `s` is ignored.
pub fn classify(text: &str, keywords: &[String]) -> Vec<String> {
    let tokens: HashSet<String> = std::iter::once(text)
        .chain(keywords.iter().map(String::as_str))
        .flat_map(|s| s.split(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    let matches = |vocab: &str| {
        tokens.contains(vocab) || tokens.contains(&format!("{vocab}s"))
    };

    let topics: Vec<String> = TOPICS
        .iter()
        .filter(|(_, vocab)| vocab.iter().any(|v| matches(*v)))
        .map(|(topic, _)| topic.to_string())
        .collect();

    if topics.is_empty() {
        vec![GENERAL_TOPIC.to_string()]
    } else {
        topics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_words_and_plurals() {
        let topics = classify("Police arrest two after elections turn violent", &[]);
        assert_eq!(topics, vec!["Politics".to_string(), "Crime".to_string()]);
    }

    #[test]
    fn test_no_substring_matches() {
        let topics = classify("She said the paint was fresh", &[]);
        assert_eq!(topics, vec![GENERAL_TOPIC.to_string()]);
    }

    #[test]
    fn test_keywords_contribute() {
        let topics = classify("Quiet day", &["Vaccine Rollout".to_string()]);
        assert_eq!(topics, vec!["Health".to_string()]);
    }
}
