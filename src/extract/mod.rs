//! Article extraction from fetched HTML.
//!
//! Every fetched page goes through [`ArticleExtractor::extract`], which does two
//! independent things:
//!
//! 1. **Links**: collects same-outlet links in document order so index pages
//!    still feed the crawl frontier.
//! 2. **Article**: decides whether the page looks like a single news article
//!    and, if so, builds an [`ArticleRecord`] with headline, author and tags.
//!
//! # Article heuristics
//!
//! A page is article-like when all of these hold:
//!
//! | Check | Passes when |
//! |-------|-------------|
//! | Headline | some source yields at least three words |
//! | Dominant heading | exactly one `<h1>`, an `itemprop="headline"` element, or a JSON-LD `*Article` object |
//! | Body | a byline was detected, or the paragraph text is long enough to be a story |
//!
//! Meta and `<title>` text can supply the headline wording but never make a
//! page article-like on their own; section fronts carry both.
//!
//! # Submodules
//!
//! - [`author`]: ordered byline strategies and the author-name filter
//! - [`keywords`]: keyword tagging with a model-backed and a frequency backend
//! - [`topics`]: coarse topic labels from a fixed vocabulary

pub mod author;
pub mod keywords;
pub mod topics;

use crate::models::{ArticleRecord, Outlet, UNKNOWN_AUTHOR};
use crate::urls::{dedup_key, normalize_link};
use author::AuthorCascade;
use itertools::Itertools;
use keywords::KeywordExtractor;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::sync::Arc;
use tracing::trace;
use url::Url;

/// Paragraph text needed for a byline-less page to count as an article.
pub const MIN_BODY_CHARS: usize = 400;

/// Headlines are cut to this many characters.
pub const MAX_HEADLINE_CHARS: usize = 300;

/// Minimum words in a headline.
pub const MIN_HEADLINE_WORDS: usize = 3;

/// Body text handed to keyword extraction, in characters.
const KEYWORD_CONTEXT_CHARS: usize = 1_000;

static LINKS: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("static selector"));
static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").expect("static selector"));
static ARTICLE_H1: Lazy<Selector> =
    Lazy::new(|| Selector::parse("article h1").expect("static selector"));
static ITEMPROP_HEADLINE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[itemprop~="headline"]"#).expect("static selector"));
static CLASSED_H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1[class]").expect("static selector"));
static CLASSED_H2: Lazy<Selector> = Lazy::new(|| Selector::parse("h2[class]").expect("static selector"));
static H1_HEADLINE_CLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(headline|title)").expect("static regex"));
static H2_HEADLINE_CLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(headline|article[-_]title)").expect("static regex"));
static PARAGRAPHS: Lazy<Selector> = Lazy::new(|| Selector::parse("p").expect("static selector"));
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("static selector"));
static JSON_LD: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("static selector")
});
static META_TITLES: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        r#"meta[property="og:title"]"#,
        r#"meta[name="og:title"]"#,
        r#"meta[name="twitter:title"]"#,
        r#"meta[property="twitter:title"]"#,
    ]
    .iter()
    .map(|s| Selector::parse(s).expect("static selector"))
    .collect()
});

/// Everything learned from one page.
#[derive(Debug, Default)]
pub struct Extraction {
    /// The article on the page, if the page is article-like.
    pub article: Option<ArticleRecord>,
    /// Same-outlet links in document order, deduplicated.
    pub links: Vec<Url>,
    /// Links the normaliser refused.
    pub rejected_links: usize,
}

/// Stateless page analyser shared by all crawl tasks.
pub struct ArticleExtractor {
    authors: AuthorCascade,
    keywords: Arc<dyn KeywordExtractor>,
    max_links_per_page: usize,
}

impl std::fmt::Debug for ArticleExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArticleExtractor")
            .field("authors", &self.authors)
            .field("keywords", &self.keywords.name())
            .field("max_links_per_page", &self.max_links_per_page)
            .finish()
    }
}

impl ArticleExtractor {
    pub fn new(keywords: Arc<dyn KeywordExtractor>, max_links_per_page: usize) -> Self {
        Self {
            authors: AuthorCascade::default(),
            keywords,
            max_links_per_page,
        }
    }

    /// Analyse `html` fetched from `page_url`.
    ///
    /// # Arguments
    ///
    /// * `html` - Page body
    /// * `page_url` - Becomes the record's source URL
    /// * `base_url` - Where the body actually came from (after redirects); resolves relative links
    /// * `outlet` - Restricts links and feeds the author filter
    ///
    /// # Returns
    ///
    /// Outgoing links always; an article only when the page is article-like.
    pub fn extract(&self, html: &str, page_url: &Url, base_url: &Url, outlet: &Outlet) -> Extraction {
        let doc = Html::parse_document(html);
        let (links, rejected_links) = self.collect_links(&doc, base_url, outlet);
        let article = self.extract_article(&doc, page_url, outlet);
        Extraction {
            article,
            links,
            rejected_links,
        }
    }

    fn collect_links(&self, doc: &Html, base_url: &Url, outlet: &Outlet) -> (Vec<Url>, usize) {
        let mut rejected = 0usize;
        let links = doc
            .select(&LINKS)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| match normalize_link(href, base_url, outlet) {
                Ok(url) => Some(url),
                Err(reason) => {
                    trace!(%href, %reason, "Link rejected");
                    rejected += 1;
                    None
                }
            })
            .unique_by(dedup_key)
            .take(self.max_links_per_page)
            .collect();
        (links, rejected)
    }

    fn extract_article(&self, doc: &Html, page_url: &Url, outlet: &Outlet) -> Option<ArticleRecord> {
        let h1_count = doc.select(&H1).count();
        if h1_count > 1 {
            trace!(url = %page_url, h1_count, "Several h1 headings; treating as listing page");
            return None;
        }

        let json_ld = json_ld_objects(doc);
        let headline = find_headline(doc, &json_ld)?;
        if !has_dominant_heading(doc, &json_ld, h1_count) {
            trace!(url = %page_url, "No dominant heading; treating as index page");
            return None;
        }

        let author = self.authors.detect(doc, &json_ld, outlet.domain());
        let body = body_text(doc);
        let body_chars = body.chars().count();
        if author.is_none() && body_chars < MIN_BODY_CHARS {
            trace!(url = %page_url, body_chars, "No byline and short body; not an article");
            return None;
        }

        let context: String = body.chars().take(KEYWORD_CONTEXT_CHARS).collect();
        let keyword_text = format!("{headline}. {context}");
        let keywords = self.keywords.extract(&keyword_text);
        let topics = topics::classify(&keyword_text, &keywords);

        Some(ArticleRecord {
            author: author.unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
            headline,
            source_url: page_url.to_string(),
            keywords,
            topics,
            outlet: outlet.name().to_string(),
            scraped_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        })
    }
}

/// Collapse runs of whitespace to single spaces and trim.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().join(" ")
}

/// Visible text of an element with whitespace collapsed.
pub(crate) fn element_text(el: &ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

/// All JSON-LD objects on the page, with arrays and `@graph` flattened.
pub(crate) fn json_ld_objects(doc: &Html) -> Vec<Value> {
    let mut out = Vec::new();
    for script in doc.select(&JSON_LD) {
        let raw = script.text().collect::<String>();
        if let Ok(value) = serde_json::from_str::<Value>(raw.trim()) {
            flatten_json_ld(value, &mut out);
        }
    }
    out
}

fn flatten_json_ld(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten_json_ld(item, out);
            }
        }
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                flatten_json_ld(graph, out);
            }
            out.push(Value::Object(map));
        }
        _ => {}
    }
}

fn clean_headline(raw: &str) -> Option<String> {
    let text = collapse_whitespace(raw);
    if text.split_whitespace().count() < MIN_HEADLINE_WORDS {
        return None;
    }
    Some(text.chars().take(MAX_HEADLINE_CHARS).collect::<String>().trim().to_string())
}

/// Whether the page is built around one story heading.
fn has_dominant_heading(doc: &Html, json_ld: &[Value], h1_count: usize) -> bool {
    h1_count == 1
        || doc.select(&ITEMPROP_HEADLINE).next().is_some()
        || json_ld.iter().any(is_article_type)
}

fn first_classed(doc: &Html, sel: &Selector, class: &Regex) -> Option<String> {
    doc.select(sel)
        .find(|tag| tag.value().attr("class").is_some_and(|c| class.is_match(c)))
        .map(|tag| element_text(&tag))
}

/// Most prominent headline on the page.
///
/// Tries, in order:
///
/// 1. JSON-LD `headline` (or `name` of an article object)
/// 2. `og:title` / `twitter:title`
/// 3. the `<h1>` inside `<article>`
/// 4. the `itemprop="headline"` element
/// 5. an `<h1>` classed as headline or title
/// 6. an `<h2>` classed as headline or article title
/// 7. a lone `<h1>`
/// 8. the `<title>` with the site name split off
///
/// The first candidate with at least [`MIN_HEADLINE_WORDS`] words wins.
pub(crate) fn find_headline(doc: &Html, json_ld: &[Value]) -> Option<String> {
    let from_json_ld = json_ld.iter().filter_map(|obj| {
        obj.get("headline")
            .and_then(Value::as_str)
            .or_else(|| obj.get("name").and_then(Value::as_str).filter(|_| is_article_type(obj)))
            .map(str::to_string)
    });

    let from_meta = META_TITLES.iter().filter_map(|sel| {
        doc.select(sel)
            .next()
            .and_then(|m| m.value().attr("content"))
            .map(str::to_string)
    });

    let from_article_h1 = doc.select(&ARTICLE_H1).next().map(|h| element_text(&h));
    let from_itemprop = doc.select(&ITEMPROP_HEADLINE).next().map(|h| element_text(&h));
    let from_classed_h1 = first_classed(doc, &CLASSED_H1, &H1_HEADLINE_CLASS);
    let from_classed_h2 = first_classed(doc, &CLASSED_H2, &H2_HEADLINE_CLASS);

    let h1s: Vec<String> = doc.select(&H1).map(|h| element_text(&h)).collect();
    let from_single_h1 = if h1s.len() == 1 { h1s.into_iter().next() } else { None };

    let from_title = doc.select(&TITLE).next().map(|t| split_site_name(&element_text(&t)));

    from_json_ld
        .chain(from_meta)
        .chain(from_article_h1)
        .chain(from_itemprop)
        .chain(from_classed_h1)
        .chain(from_classed_h2)
        .chain(from_single_h1)
        .chain(from_title)
        .find_map(|candidate| clean_headline(&candidate))
}

fn is_article_type(obj: &Value) -> bool {
    let is_article = |s: &str| s.ends_with("Article") || s == "BlogPosting" || s == "Report";
    match obj.get("@type") {
        Some(Value::String(s)) => is_article(s.as_str()),
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).any(is_article),
        _ => false,
    }
}

/// Drop a " | Site Name" style suffix by keeping the longest part.
fn split_site_name(title: &str) -> String {
    for sep in [" | ", " - ", " – ", " :: "] {
        if title.contains(sep) {
            return title
                .split(sep)
                .map(str::trim)
                .max_by_key(|part| part.len())
                .unwrap_or(title)
                .to_string();
        }
    }
    title.to_string()
}

fn body_text(doc: &Html) -> String {
    doc.select(&PARAGRAPHS)
        .map(|p| element_text(&p))
        .filter(|t| !t.is_empty())
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::keywords::FrequencyKeywords;

    const LOREM: &str = "The regional council met on Tuesday evening to debate the revised spending \
        plan, which allocates additional money to road repairs, libraries and flood defences. \
        Councillors argued for several hours before the measure passed narrowly. Residents who \
        attended the meeting said they were relieved that the library branches would remain open \
        through the winter, while business owners welcomed the promised investment in transport.";

    fn extractor() -> ArticleExtractor {
        ArticleExtractor::new(Arc::new(FrequencyKeywords), 25)
    }

    fn outlet() -> Outlet {
        Outlet::from_url(&Url::parse("https://news.test/").unwrap()).unwrap()
    }

    fn run(html: &str, path: &str) -> Extraction {
        let url = Url::parse("https://news.test/").unwrap().join(path).unwrap();
        extractor().extract(html, &url, &url, &outlet())
    }

    #[test]
    fn test_byline_article() {
        let html = r#"<html><head><title>Storm Hits Coast - News Test</title></head><body>
            <article><h1>Storm Hits Coast</h1><p class="byline">By Jane Doe</p>
            <p>Heavy rain fell overnight.</p></article>
            <a href="/">Home</a></body></html>"#;
        let extraction = run(html, "/b");
        let article = extraction.article.unwrap();
        assert_eq!(article.author, "Jane Doe");
        assert_eq!(article.headline, "Storm Hits Coast");
        assert_eq!(article.source_url, "https://news.test/b");
        assert_eq!(article.outlet, "news.test");
        assert!(!article.topics.is_empty());
        assert_eq!(extraction.links.len(), 1);
    }

    #[test]
    fn test_no_byline_yields_unknown() {
        let html = format!(
            "<html><body><h1>Council Approves New Budget</h1><p>{LOREM}</p><p>{LOREM}</p></body></html>"
        );
        let article = run(&html, "/budget").article.unwrap();
        assert_eq!(article.author, UNKNOWN_AUTHOR);
        assert_eq!(article.headline, "Council Approves New Budget");
        assert!(!article.keywords.is_empty());
    }

    #[test]
    fn test_index_page_is_not_article_but_has_links() {
        let html = r#"<html><head><title>Sections</title></head><body>
            <ul><li><a href="/d">D</a></li><li><a href="/e#top">E</a></li>
            <li><a href="https://elsewhere.test/x">Out</a></li>
            <li><a href="/d">D again</a></li></ul></body></html>"#;
        let extraction = run(html, "/c");
        assert!(extraction.article.is_none());
        let links: Vec<&str> = extraction.links.iter().map(Url::as_str).collect();
        assert_eq!(links, vec!["https://news.test/d", "https://news.test/e"]);
        assert_eq!(extraction.rejected_links, 1);
    }

    #[test]
    fn test_listing_with_many_h1_is_not_article() {
        let html = format!(
            "<html><body><h1>First Big Story Here</h1><h1>Second Big Story Here</h1>\
             <p class=\"byline\">By Jane Doe</p><p>{LOREM}</p></body></html>"
        );
        assert!(run(&html, "/list").article.is_none());
    }

    #[test]
    fn test_short_headline_is_rejected() {
        let html = format!("<html><body><h1>Breaking</h1><p>{LOREM}</p></body></html>");
        assert!(run(&html, "/short").article.is_none());
    }

    #[test]
    fn test_json_ld_headline_and_author() {
        let html = r#"<html><head>
            <script type="application/ld+json">
            {"@context":"https://schema.org","@graph":[
              {"@type":"WebSite","name":"News Test"},
              {"@type":"NewsArticle","headline":"Markets Rally After Rate Decision",
               "author":[{"@type":"Person","name":"Maria Lopez"}]}
            ]}
            </script></head><body><h1>Markets</h1></body></html>"#;
        let article = run(html, "/markets").article.unwrap();
        assert_eq!(article.headline, "Markets Rally After Rate Decision");
        assert_eq!(article.author, "Maria Lopez");
    }

    #[test]
    fn test_headline_from_title_drops_site_name() {
        let doc = Html::parse_document(
            "<html><head><title>Local Team Wins Championship Final | News Test</title></head></html>",
        );
        assert_eq!(
            find_headline(&doc, &[]).as_deref(),
            Some("Local Team Wins Championship Final")
        );
    }

    #[test]
    fn test_headline_from_classed_headings() {
        let doc = Html::parse_document(
            r#"<html><body><h2 class="Article-Title">Harbour Reopens After Repairs</h2>
            <h2 class="promo">Other Stories You Might Like</h2></body></html>"#,
        );
        assert_eq!(find_headline(&doc, &[]).as_deref(), Some("Harbour Reopens After Repairs"));

        let doc = Html::parse_document(
            r#"<html><body><h1>Top</h1><h1 itemprop="headline">Rail Strike Called Off Today</h1></body></html>"#,
        );
        assert_eq!(find_headline(&doc, &[]).as_deref(), Some("Rail Strike Called Off Today"));
    }

    #[test]
    fn test_front_page_without_heading_is_not_article() {
        let teasers: String = (0..6)
            .map(|i| format!("<p><a href=\"/story/{i}\">Story {i}</a> {LOREM}</p>"))
            .collect();
        let html = format!(
            "<html><head><meta property=\"og:title\" content=\"Latest News, Sport and Weather\">\
             <title>Latest News</title></head><body>{teasers}</body></html>"
        );
        let extraction = run(&html, "/");
        assert!(extraction.article.is_none());
        assert_eq!(extraction.links.len(), 6);
    }

    #[test]
    fn test_front_page_with_teaser_bylines_is_not_article() {
        let teasers: String = (0..4)
            .map(|i| {
                format!(
                    "<div><a href=\"/s/{i}\">Teaser headline number {i}</a>\
                     <span class=\"byline\">By Jane Doe</span><p>Short teaser text.</p></div>"
                )
            })
            .collect();
        let html = format!(
            "<html><head><title>Home | The Herald Latest Stories Today</title></head><body>{teasers}</body></html>"
        );
        assert!(run(&html, "/").article.is_none());
    }

    #[test]
    fn test_itemprop_headline_counts_as_dominant_heading() {
        let html = format!(
            "<html><body><div itemprop=\"headline\">Ferry Service Returns To Island</div>\
             <p>{LOREM}</p></body></html>"
        );
        let article = run(&html, "/ferry").article.unwrap();
        assert_eq!(article.headline, "Ferry Service Returns To Island");
    }

    #[test]
    fn test_shouted_byline_is_recorded() {
        let html = "<html><body><h1>Storm Hits Coast Tonight</h1><p>BY JANE DOE</p><p>Rain.</p></body></html>";
        let article = run(html, "/storm").article.unwrap();
        assert_eq!(article.author, "Jane Doe");
        assert_eq!(article.headline, "Storm Hits Coast Tonight");
    }

    #[test]
    fn test_headline_whitespace_collapsed_and_capped() {
        let long = "word ".repeat(200);
        let html = format!("<html><body><h1>  Big\n\n   News   {long}</h1><p>{LOREM}</p></body></html>");
        let article = run(&html, "/long").article.unwrap();
        assert!(article.headline.starts_with("Big News word"));
        assert!(article.headline.chars().count() <= MAX_HEADLINE_CHARS);
    }

    #[test]
    fn test_link_cap() {
        let anchors: String = (0..40).map(|i| format!("<a href=\"/p{i}\">p</a>")).collect();
        let html = format!("<html><body>{anchors}</body></html>");
        let extraction = run(&html, "/");
        assert_eq!(extraction.links.len(), 25);
        assert_eq!(extraction.links[0].as_str(), "https://news.test/p0");
    }

    #[test]
    fn test_split_site_name() {
        assert_eq!(split_site_name("Storm Hits Coast - Daily"), "Storm Hits Coast");
        assert_eq!(split_site_name("Daily :: A Much Longer Headline"), "A Much Longer Headline");
        assert_eq!(split_site_name("Plain title"), "Plain title");
    }
}
