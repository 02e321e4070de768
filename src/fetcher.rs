//! Page fetching.
//!
//! The crawler talks to the network through the [`PageFetcher`] trait so that
//! tests can substitute an in-memory site. [`HttpFetcher`] is the real
//! implementation: one `reqwest` client shared by every job in the process
//! (a single connection pool), redirects followed, a single attempt per URL.

use crate::errors::FetchError;
use crate::models::FetchedPage;
use rand::seq::IndexedRandom;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Desktop browser user agents rotated across requests.
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
];

/// Something that can retrieve a page's HTML.
pub trait PageFetcher: Send + Sync + 'static {
    /// Fetch `url` once. Failures are classified, never retried.
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<FetchedPage, FetchError>> + Send;
}

/// [`PageFetcher`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    user_agents: Vec<String>,
}

impl HttpFetcher {
    /// Build a fetcher with a per-request `timeout`.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Applies to connecting and to the whole request
    /// * `user_agents` - Rotated per request; empty falls back to [`DEFAULT_USER_AGENTS`]
    ///
    /// # Returns
    ///
    /// The fetcher, or the `reqwest` error if the TLS backend cannot be set up.
    pub fn new(timeout: Duration, user_agents: Vec<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        let user_agents = if user_agents.is_empty() {
            DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect()
        } else {
            user_agents
        };
        Ok(Self {
            client,
            user_agents,
        })
    }

    fn pick_user_agent(&self) -> &str {
        self.user_agents
            .choose(&mut rand::rng())
            .map(String::as_str)
            .unwrap_or(DEFAULT_USER_AGENTS[0])
    }
}

impl PageFetcher for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, self.pick_user_agent())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            debug!(%status, "Non-success status");
            return Err(FetchError::Http(status));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !content_type.is_empty() && !content_type.contains("html") {
            return Err(FetchError::Decode(format!(
                "unexpected content type {content_type}"
            )));
        }

        let final_url = response.url().clone();
        let html = response
            .text()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        debug!(bytes = html.len(), %final_url, "Fetched page");
        Ok(FetchedPage { final_url, html })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(timeout_ms: u64) -> HttpFetcher {
        HttpFetcher::new(Duration::from_millis(timeout_ms), Vec::new()).unwrap()
    }

    #[tokio::test]
    async fn test_fetches_html_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/story"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html><h1>Hello</h1></html>", "text/html; charset=utf-8"),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/story", server.uri())).unwrap();
        let page = fetcher(2_000).fetch(&url).await.unwrap();
        assert_eq!(page.final_url, url);
        assert!(page.html.contains("<h1>Hello</h1>"));
    }

    #[tokio::test]
    async fn test_classifies_http_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let err = fetcher(2_000).fetch(&url).await.unwrap_err();
        assert_eq!(err, FetchError::Http(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_classifies_non_html_as_decode() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/pdf")
                    .set_body_bytes(vec![0x25, 0x50, 0x44, 0x46]),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/file", server.uri())).unwrap();
        let err = fetcher(2_000).fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[tokio::test]
    async fn test_classifies_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_delay(Duration::from_millis(1_500)),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/slow", server.uri())).unwrap();
        let err = fetcher(200).fetch(&url).await.unwrap_err();
        assert_eq!(err, FetchError::Timeout);
    }

    #[tokio::test]
    async fn test_classifies_connection_error() {
        // Bind and drop a listener so the port is closed.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = Url::parse(&format!("http://127.0.0.1:{port}/")).unwrap();
        let err = fetcher(2_000).fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Connection(_)), "{err:?}");
    }
}
