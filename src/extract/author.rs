//! Byline detection.
//!
//! Authors are found by an ordered list of [`AuthorStrategy`] implementations;
//! the first strategy that yields a name passing [`is_valid_author_name`] wins:
//!
//! | Order | Strategy | Looks at |
//! |-------|----------|----------|
//! | 1 | [`MarkupByline`] | `rel="author"`, `itemprop="author"`, `data-author`, byline classes, author profile links |
//! | 2 | [`TextByline`] | visible text starting with "By <Name>" |
//! | 3 | [`MetadataByline`] | `<meta name="author">`, `article:author`, JSON-LD `author` |

use super::element_text;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::fmt;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static REL_AUTHOR: Lazy<Selector> = Lazy::new(|| selector(r#"a[rel~="author"]"#));
static ITEMPROP_AUTHOR: Lazy<Selector> = Lazy::new(|| selector(r#"[itemprop~="author"]"#));
static ITEMPROP_NAME: Lazy<Selector> = Lazy::new(|| selector(r#"[itemprop~="name"]"#));
static DATA_AUTHOR: Lazy<Selector> = Lazy::new(|| selector("[data-author]"));
static CLASSED: Lazy<Selector> = Lazy::new(|| selector("a[class], span[class], div[class], p[class], address[class]"));
static ANCHORS: Lazy<Selector> = Lazy::new(|| selector("a[href]"));
static TEXT_BLOCKS: Lazy<Selector> = Lazy::new(|| selector("p, span, div, address, small, em, strong, li"));
static META_AUTHOR: Lazy<Selector> = Lazy::new(|| {
    selector(r#"meta[name="author"], meta[property="author"], meta[property="article:author"], meta[name="article:author"]"#)
});

static BYLINE_CLASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(author|byline|writer|contributor|person[-_]name|posted[-_]by)").expect("static regex")
});
const AUTHOR_PATHS: &[&str] = &["/author", "/writer", "/journalist", "/profile", "/by/"];

/// Longer text blocks are story text, not a byline.
const MAX_BYLINE_BLOCK_CHARS: usize = 120;

static BY_PREFIX_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:[Ss]tory\s+|[Ww]ritten\s+|[Rr]eported\s+|[Ww]ords\s+)?(?:BY|By|by):?\s+(\p{Lu}[\p{L}'’.\-]*(?:\s+\p{Lu}[\p{L}'’.\-]*){0,4})",
    )
    .expect("static regex")
});

static LEADING_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:by|written by|posted by|story by|words by|author|reporter)(?:\s*:\s*|\s+|$)")
        .expect("static regex")
});

static WEEKDAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b").expect("static regex")
});
static TIMING_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(ago|updated|published|posted)\b").expect("static regex"));
static GENERIC: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^(by|author|written by|posted by):?\s*$",
        r"^(the\s+)?[a-z]+\s+(bureau|desk|team|staff)$",
        r"^(photo|image|video|graphic|illustration)",
        r"(twitter|facebook|instagram|linkedin|social media)",
        r"contributed",
        r"^web\s+(desk|team)",
        r"^input",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});
static ALL_CAPS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{2,6}(\s+[A-Z]{2,6})*$").expect("static regex"));
static HAS_LETTERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{L}{2,}").expect("static regex"));

/// Words that mark an organisation or desk rather than a person.
const ORG_WORDS: &[&str] = &[
    "news", "times", "post", "daily", "weekly", "press", "media", "network", "broadcasting",
    "corporation", "bureau", "desk", "team", "staff", "editorial", "office", "group", "agency",
    "service", "channel", "tv", "radio", "online", "digital", "correspondent", "reporter", "wire",
    "associated", "editors", "newsroom",
];

/// Domain labels too generic to identify an outlet.
const GENERIC_DOMAIN_LABELS: &[&str] = &["www", "com", "org", "net", "co", "uk", "in", "news"];

/// One way of finding author candidates on a page.
pub trait AuthorStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Raw candidate strings in the order the strategy prefers them.
    fn candidates(&self, doc: &Html, json_ld: &[Value]) -> Vec<String>;

    /// First candidate that cleans up into a plausible person's name.
    fn find(&self, doc: &Html, json_ld: &[Value], outlet_domain: &str) -> Option<String> {
        self.candidates(doc, json_ld)
            .iter()
            .filter_map(|raw| clean_candidate(raw))
            .find(|name| is_valid_author_name(name, outlet_domain))
    }
}

/// Structured byline markup.
#[derive(Debug, Default)]
pub struct MarkupByline;

impl AuthorStrategy for MarkupByline {
    fn name(&self) -> &'static str {
        "markup"
    }

    fn candidates(&self, doc: &Html, _json_ld: &[Value]) -> Vec<String> {
        let mut out = Vec::new();

        out.extend(doc.select(&REL_AUTHOR).map(|a| element_text(&a)));

        for tag in doc.select(&ITEMPROP_AUTHOR) {
            let text = match tag.select(&ITEMPROP_NAME).next() {
                Some(name) => element_text(&name),
                None => tag
                    .value()
                    .attr("content")
                    .map(str::to_string)
                    .unwrap_or_else(|| element_text(&tag)),
            };
            out.push(text);
        }

        out.extend(
            doc.select(&DATA_AUTHOR)
                .filter_map(|tag| tag.value().attr("data-author").map(str::to_string)),
        );

        out.extend(
            doc.select(&CLASSED)
                .filter(|tag| tag.value().attr("class").is_some_and(|c| BYLINE_CLASS.is_match(c)))
                .map(|tag| element_text(&tag)),
        );

        out.extend(
            doc.select(&ANCHORS)
                .filter(|a| {
                    a.value().attr("href").is_some_and(|href| {
                        let href = href.to_ascii_lowercase();
                        AUTHOR_PATHS.iter().any(|p| href.contains(p))
                    })
                })
                .map(|a| element_text(&a)),
        );

        out
    }
}

/// "By Jane Doe" at the start of a visible text block.
#[derive(Debug, Default)]
pub struct TextByline;

impl AuthorStrategy for TextByline {
    fn name(&self) -> &'static str {
        "text"
    }

    fn candidates(&self, doc: &Html, _json_ld: &[Value]) -> Vec<String> {
        doc.select(&TEXT_BLOCKS)
            .filter_map(|block| {
                let text = element_text(&block);
                if text.chars().count() > MAX_BYLINE_BLOCK_CHARS {
                    return None;
                }
                BY_PREFIX_TEXT
                    .captures(&text)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string())
            })
            .collect()
    }
}

/// `<meta>` author tags and JSON-LD `author` entries.
#[derive(Debug, Default)]
pub struct MetadataByline;

impl AuthorStrategy for MetadataByline {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn candidates(&self, doc: &Html, json_ld: &[Value]) -> Vec<String> {
        let mut out: Vec<String> = doc
            .select(&META_AUTHOR)
            .filter_map(|m| m.value().attr("content").map(str::to_string))
            .collect();

        for obj in json_ld {
            if let Some(author) = obj.get("author") {
                json_ld_author_names(author, &mut out);
            }
        }
        out
    }
}

fn json_ld_author_names(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(name) => out.push(name.clone()),
        Value::Object(map) => {
            if let Some(Value::String(name)) = map.get("name") {
                out.push(name.clone());
            }
        }
        Value::Array(items) => {
            for item in items {
                json_ld_author_names(item, out);
            }
        }
        _ => {}
    }
}

/// Ordered list of author strategies.
pub struct AuthorCascade {
    strategies: Vec<Box<dyn AuthorStrategy>>,
}

impl Default for AuthorCascade {
    fn default() -> Self {
        Self {
            strategies: vec![
                Box::new(MarkupByline),
                Box::new(TextByline),
                Box::new(MetadataByline),
            ],
        }
    }
}

impl fmt::Debug for AuthorCascade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.strategies.iter().map(|s| s.name()))
            .finish()
    }
}

impl AuthorCascade {
    pub fn new(strategies: Vec<Box<dyn AuthorStrategy>>) -> Self {
        Self { strategies }
    }

    /// Name from the first strategy that matches, or `None`.
    pub fn detect(&self, doc: &Html, json_ld: &[Value], outlet_domain: &str) -> Option<String> {
        self.strategies.iter().find_map(|strategy| {
            let found = strategy.find(doc, json_ld, outlet_domain);
            if let Some(name) = &found {
                tracing::trace!(strategy = strategy.name(), %name, "Author matched");
            }
            found
        })
    }
}

/// Strip byline labels and trailing date/credit fragments from a candidate.
///
/// Names of two or more words written entirely in capitals ("JANE DOE") are
/// title-cased so they validate like any other byline.
pub fn clean_candidate(raw: &str) -> Option<String> {
    let text = super::collapse_whitespace(raw);
    let text = LEADING_LABEL.replace(&text, "");
    let text = text
        .split(['|', '•', '·', '\n'])
        .next()
        .unwrap_or("")
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':' | '-' | '–' | '.'))
        .to_string();
    let shouted = text.split_whitespace().count() >= 2
        && text.chars().any(char::is_alphabetic)
        && !text.chars().any(char::is_lowercase);
    let text = if shouted {
        text.split_whitespace().map(title_case_word).join(" ")
    } else {
        text
    };
    (!text.is_empty()).then_some(text)
}

fn title_case_word(word: &str) -> String {
    word.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .join("-")
}

/// Whether `name` plausibly names a person rather than a date, desk or outlet.
pub fn is_valid_author_name(name: &str, outlet_domain: &str) -> bool {
    let name = name.trim();
    if name.chars().count() < 3 {
        return false;
    }
    let lower = name.to_lowercase();

    if name.chars().any(|c| c.is_ascii_digit())
        || WEEKDAY.is_match(&lower)
        || TIMING_WORDS.is_match(&lower)
    {
        return false;
    }
    if lower.contains("http") || name.contains(['@', '/', '<', '{', '=']) {
        return false;
    }

    let words: Vec<&str> = name.split_whitespace().collect();
    let lower_words: Vec<String> = words
        .iter()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .collect();

    let outlet_labels = outlet_domain
        .split('.')
        .filter(|label| label.len() > 2 && !GENERIC_DOMAIN_LABELS.contains(label));
    for label in outlet_labels {
        if lower.contains(label) && words.len() <= 2 {
            return false;
        }
    }

    if words.len() <= 3 && lower_words.iter().any(|w| ORG_WORDS.contains(&w.as_str())) {
        return false;
    }
    if GENERIC.iter().any(|re| re.is_match(&lower)) || ALL_CAPS.is_match(name) {
        return false;
    }

    if words.len() > 6 || !HAS_LETTERS.is_match(name) {
        return false;
    }
    if words.len() == 1 && name.chars().all(|c| !c.is_lowercase()) && name.chars().count() <= 5 {
        return false;
    }

    if words.len() >= 2 {
        let capitalised = words.iter().filter(|w| starts_upper(w)).count();
        if capitalised * 10 >= words.len() * 6 {
            return true;
        }
    }
    if words.len() == 1 {
        let len = name.chars().count();
        return (3..=15).contains(&len) && starts_upper(words[0]);
    }
    if name.contains(',') {
        return true;
    }
    (2..=4).contains(&words.len()) && words.iter().all(|w| (3..=20).contains(&w.chars().count()))
}

fn starts_upper(word: &str) -> bool {
    word.chars().next().is_some_and(char::is_uppercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(html: &str) -> Option<String> {
        let doc = Html::parse_document(html);
        let json_ld = super::super::json_ld_objects(&doc);
        AuthorCascade::default().detect(&doc, &json_ld, "dailyherald.com")
    }

    #[test]
    fn test_valid_names() {
        for name in ["Jane Doe", "María José García", "O'Brien", "Smith, John", "Jean-Luc Picard"] {
            assert!(is_valid_author_name(name, "dailyherald.com"), "{name}");
        }
    }

    #[test]
    fn test_invalid_names() {
        for name in [
            "Updated 10:45 AM",
            "March 3, 2024",
            "2 hours ago",
            "Monday",
            "Staff Reporter",
            "Web Desk",
            "Daily Herald",
            "AP NEWS",
            "BBC",
            "Photo: Getty Images",
            "Follow us on Twitter",
            "https://example.com/people/jane",
            "a very long string that is clearly a sentence and not a name",
            "Jo",
        ] {
            assert!(!is_valid_author_name(name, "dailyherald.com"), "{name}");
        }
    }

    #[test]
    fn test_clean_candidate() {
        assert_eq!(clean_candidate("By Jane Doe").as_deref(), Some("Jane Doe"));
        assert_eq!(clean_candidate("Written by:  Jane   Doe | May 5").as_deref(), Some("Jane Doe"));
        assert_eq!(clean_candidate("Author: Sam Lee,").as_deref(), Some("Sam Lee"));
        assert_eq!(clean_candidate("Byron Smith").as_deref(), Some("Byron Smith"));
        assert_eq!(clean_candidate("  By  "), None);
    }

    #[test]
    fn test_shouted_names_are_title_cased() {
        assert_eq!(clean_candidate("BY JANE DOE").as_deref(), Some("Jane Doe"));
        assert_eq!(clean_candidate("JEAN-LUC PICARD").as_deref(), Some("Jean-Luc Picard"));
        assert_eq!(clean_candidate("BBC").as_deref(), Some("BBC"));
        assert_eq!(detect("<p>BY JANE DOE</p><p>Rain.</p>").as_deref(), Some("Jane Doe"));
        assert_eq!(detect(r#"<span class="byline">AP NEWS</span>"#), None);
    }

    #[test]
    fn test_markup_rel_author() {
        let html = r#"<p>Posted <a rel="author" href="/people/jd">Jane Doe</a></p>"#;
        assert_eq!(detect(html).as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn test_markup_itemprop_nested_name() {
        let html = r#"<div itemprop="author" itemscope><span itemprop="name">Ravi Kumar</span>
            <span>Senior Correspondent, covering politics and elections nationwide</span></div>"#;
        assert_eq!(detect(html).as_deref(), Some("Ravi Kumar"));
    }

    #[test]
    fn test_markup_byline_class_with_date_suffix() {
        let html = r#"<div class="article-byline">By Tom Hardy | 12 March 2024</div>"#;
        assert_eq!(detect(html).as_deref(), Some("Tom Hardy"));
    }

    #[test]
    fn test_text_byline_pattern() {
        let html = r#"<p>By Jane Doe and John Roe</p><p>The storm arrived early.</p>"#;
        assert_eq!(detect(html).as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn test_text_byline_ignores_mid_sentence_by() {
        let html = r#"<p>The coast was hit by Hurricane Ian on Tuesday.</p>"#;
        assert_eq!(detect(html), None);
    }

    #[test]
    fn test_metadata_fallback() {
        let html = r#"<html><head><meta name="author" content="Lena Fischer"></head><body></body></html>"#;
        assert_eq!(detect(html).as_deref(), Some("Lena Fischer"));
    }

    #[test]
    fn test_markup_beats_metadata() {
        let html = r#"<html><head><meta name="author" content="Meta Person"></head>
            <body><span class="author-name">Markup Person</span></body></html>"#;
        assert_eq!(detect(html).as_deref(), Some("Markup Person"));
    }

    #[test]
    fn test_desk_credit_is_skipped() {
        let html = r#"<span class="byline">Daily Herald Staff</span><p>By Ana Silva</p>"#;
        assert_eq!(detect(html).as_deref(), Some("Ana Silva"));
    }
}
