use anyhow::{anyhow, Context, Result};
use scraper::{Html, Selector};
use serde_json::Value;
use std::thread;
use std::time::Duration;

use crate::config::{non_empty, Credentials};
use crate::error::HunterError;
use crate::models::SearchHit;

// --- Provider trait ---

pub trait SearchProvider {
    fn name(&self) -> &str;

    /// Whether the provider has what it needs to run. Never touches the network.
    fn is_available(&self) -> bool;

    /// Hits per request when the backend pages its results, `None` otherwise.
    fn page_size(&self) -> Option<usize> {
        None
    }

    /// Hard cap on results reachable for one query.
    fn result_limit(&self) -> usize {
        usize::MAX
    }

    /// One request. `start` is the 1-based rank of the first hit wanted.
    fn fetch(&self, query: &str, start: usize, count: usize) -> Result<Vec<SearchHit>>;
}

fn http_client() -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(BROWSER_USER_AGENT)
        .build()
        .context("Failed to build HTTP client")
}

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

fn ensure_success(response: reqwest::blocking::Response, backend: &str) -> Result<reqwest::blocking::Response> {
    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().unwrap_or_default();
        return Err(anyhow!(
            "{} request failed with status {}: {}",
            backend,
            status,
            error_text
        ));
    }
    Ok(response)
}

fn str_field(item: &Value, key: &str) -> String {
    item.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

// --- Google Custom Search (primary) ---

const GOOGLE_CSE_URL: &str = "https://www.googleapis.com/customsearch/v1";

pub struct GoogleCseProvider {
    api_key: Option<String>,
    cse_id: Option<String>,
    client: Option<reqwest::blocking::Client>,
}

impl GoogleCseProvider {
    pub fn new(api_key: Option<String>, cse_id: Option<String>) -> Self {
        let client = http_client()
            .map_err(|e| tracing::error!("Failed to initialize Google Custom Search: {e:#}"))
            .ok();
        Self { api_key, cse_id, client }
    }
}

impl SearchProvider for GoogleCseProvider {
    fn name(&self) -> &str {
        "Google Custom Search API"
    }

    fn is_available(&self) -> bool {
        self.client.is_some() && non_empty(&self.api_key).is_some() && non_empty(&self.cse_id).is_some()
    }

    fn page_size(&self) -> Option<usize> {
        Some(10)
    }

    fn result_limit(&self) -> usize {
        100
    }

    fn fetch(&self, query: &str, start: usize, count: usize) -> Result<Vec<SearchHit>> {
        let (Some(client), Some(key), Some(cx)) =
            (&self.client, non_empty(&self.api_key), non_empty(&self.cse_id))
        else {
            return Ok(Vec::new());
        };

        let num = count.clamp(1, 10).to_string();
        let start = start.to_string();
        let response = client
            .get(GOOGLE_CSE_URL)
            .query(&[("key", key), ("cx", cx), ("q", query), ("num", num.as_str()), ("start", start.as_str())])
            .send()
            .context("Failed to send request to Google Custom Search")?;

        let data: Value = ensure_success(response, "Google Custom Search")?
            .json()
            .context("Failed to parse Google Custom Search response")?;
        Ok(parse_cse_response(&data))
    }
}

pub fn parse_cse_response(data: &Value) -> Vec<SearchHit> {
    data.get("items")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .map(|item| SearchHit {
                    title: str_field(item, "title"),
                    url: str_field(item, "link"),
                    snippet: str_field(item, "snippet"),
                    source: "google_cse".to_string(),
                })
                .filter(|hit| !hit.url.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

// --- SerpApi (secondary, paid) ---

const SERPAPI_URL: &str = "https://serpapi.com/search";

pub struct SerpApiProvider {
    api_key: Option<String>,
    client: Option<reqwest::blocking::Client>,
}

impl SerpApiProvider {
    pub fn new(api_key: Option<String>) -> Self {
        let client = http_client()
            .map_err(|e| tracing::error!("Failed to initialize SerpApi: {e:#}"))
            .ok();
        Self { api_key, client }
    }
}

impl SearchProvider for SerpApiProvider {
    fn name(&self) -> &str {
        "SerpApi"
    }

    fn is_available(&self) -> bool {
        self.client.is_some() && non_empty(&self.api_key).is_some()
    }

    fn fetch(&self, query: &str, _start: usize, count: usize) -> Result<Vec<SearchHit>> {
        let (Some(client), Some(key)) = (&self.client, non_empty(&self.api_key)) else {
            return Ok(Vec::new());
        };

        let num = count.to_string();
        let response = client
            .get(SERPAPI_URL)
            .query(&[("api_key", key), ("engine", "google"), ("q", query), ("num", num.as_str())])
            .send()
            .context("Failed to send request to SerpApi")?;

        let data: Value = ensure_success(response, "SerpApi")?
            .json()
            .context("Failed to parse SerpApi response")?;
        Ok(parse_serpapi_response(&data))
    }
}

pub fn parse_serpapi_response(data: &Value) -> Vec<SearchHit> {
    data.get("organic_results")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .map(|item| SearchHit {
                    title: str_field(item, "title"),
                    url: str_field(item, "link"),
                    snippet: str_field(item, "snippet"),
                    source: "serpapi".to_string(),
                })
                .filter(|hit| !hit.url.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

// --- Direct Google scraping (fallback) ---

const GOOGLE_SEARCH_URL: &str = "https://www.google.com/search";

/// Scrapes the Google results page. Fragile and easily blocked; last resort only.
pub struct DirectGoogleScraper {
    client: Option<reqwest::blocking::Client>,
}

impl DirectGoogleScraper {
    pub fn new() -> Self {
        let client = http_client()
            .map_err(|e| tracing::error!("Failed to initialize direct Google scraper: {e:#}"))
            .ok();
        Self { client }
    }
}

impl Default for DirectGoogleScraper {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchProvider for DirectGoogleScraper {
    fn name(&self) -> &str {
        "Direct Google (use sparingly!)"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn fetch(&self, query: &str, _start: usize, count: usize) -> Result<Vec<SearchHit>> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| anyhow!("HTTP client unavailable"))?;

        let num = count.to_string();
        let response = client
            .get(GOOGLE_SEARCH_URL)
            .query(&[("q", query), ("num", num.as_str())])
            .header("Accept", "text/html,application/xhtml+xml")
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .context("Failed to send request to Google")?;

        let body = ensure_success(response, "Google")?
            .text()
            .context("Failed to read Google results page")?;
        Ok(parse_google_html(&body))
    }
}

pub fn parse_google_html(body: &str) -> Vec<SearchHit> {
    let document = Html::parse_document(body);
    let (Ok(result_sel), Ok(link_sel), Ok(title_sel)) = (
        Selector::parse("div.g"),
        Selector::parse(r#"a[href^="http"]"#),
        Selector::parse("h3"),
    ) else {
        return Vec::new();
    };

    let mut hits = Vec::new();
    for result in document.select(&result_sel) {
        let link = result.select(&link_sel).next();
        let title = result.select(&title_sel).next();
        if let (Some(link), Some(title)) = (link, title) {
            if let Some(href) = link.value().attr("href") {
                hits.push(SearchHit {
                    title: title.text().collect::<String>().trim().to_string(),
                    url: href.to_string(),
                    snippet: String::new(),
                    source: "google_direct".to_string(),
                });
            }
        }
    }
    hits
}

// --- Pagination ---

/// Walks one query's result pages. Each instance owns its cursor, so
/// concurrent searches never share paging state.
pub struct Pages<'a> {
    provider: &'a dyn SearchProvider,
    query: &'a str,
    page_size: usize,
    next_start: usize,
    last_start: usize,
    page_delay: Duration,
    done: bool,
}

impl<'a> Pages<'a> {
    fn new(provider: &'a dyn SearchProvider, query: &'a str, page_size: usize, max_results: usize, page_delay: Duration) -> Self {
        let reachable = max_results.min(provider.result_limit());
        Self {
            provider,
            query,
            page_size: page_size.max(1),
            next_start: 1,
            last_start: reachable,
            page_delay,
            done: reachable == 0,
        }
    }
}

impl Iterator for Pages<'_> {
    type Item = Result<Vec<SearchHit>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.next_start > self.last_start {
            return None;
        }
        if self.next_start > 1 && !self.page_delay.is_zero() {
            thread::sleep(self.page_delay);
        }

        let start = self.next_start;
        self.next_start += self.page_size;

        let page = self.provider.fetch(self.query, start, self.page_size);
        match &page {
            Ok(hits) if hits.is_empty() => self.done = true,
            Err(_) => self.done = true,
            _ => {}
        }
        Some(page)
    }
}

// --- Selector ---

/// Fixed preference order of providers; the first available one serves every
/// query of the session.
pub struct ProviderSelector {
    providers: Vec<Box<dyn SearchProvider>>,
    active: usize,
    page_delay: Duration,
}

impl ProviderSelector {
    /// Primary API, then paid API, then scraping.
    pub fn from_credentials(creds: &Credentials, page_delay: Duration) -> Result<Self, HunterError> {
        let providers: Vec<Box<dyn SearchProvider>> = vec![
            Box::new(GoogleCseProvider::new(creds.google_api_key.clone(), creds.google_cse_id.clone())),
            Box::new(SerpApiProvider::new(creds.serpapi_key.clone())),
            Box::new(DirectGoogleScraper::new()),
        ];
        Self::with_providers(providers, page_delay)
    }

    pub fn with_providers(providers: Vec<Box<dyn SearchProvider>>, page_delay: Duration) -> Result<Self, HunterError> {
        let active = providers
            .iter()
            .position(|p| p.is_available())
            .ok_or(HunterError::ProviderUnavailable)?;

        let name = providers[active].name();
        if active == providers.len() - 1 && active > 0 {
            tracing::warn!(
                "Using searcher: {} (fallback; fragile and rate-limited, configure GOOGLE_API_KEY/GOOGLE_CSE_ID or SERPAPI_KEY)",
                name
            );
        } else {
            tracing::info!("Using searcher: {}", name);
        }

        Ok(Self { providers, active, page_delay })
    }

    pub fn provider(&self) -> &dyn SearchProvider {
        self.providers[self.active].as_ref()
    }

    /// Up to `max_results` hits. Errors are logged and end the query early;
    /// pages fetched before the error are kept.
    pub fn search(&self, query: &str, max_results: usize) -> Vec<SearchHit> {
        let provider = self.provider();
        match provider.page_size() {
            Some(page_size) => {
                let mut hits = Vec::new();
                for page in Pages::new(provider, query, page_size, max_results, self.page_delay) {
                    match page {
                        Ok(page_hits) => hits.extend(page_hits),
                        Err(e) => {
                            tracing::error!("{} error for query '{}': {:#}", provider.name(), query, e);
                        }
                    }
                }
                hits.truncate(max_results);
                hits
            }
            None => match provider.fetch(query, 1, max_results) {
                Ok(mut hits) => {
                    hits.truncate(max_results);
                    hits
                }
                Err(e) => {
                    tracing::error!("{} error for query '{}': {:#}", provider.name(), query, e);
                    Vec::new()
                }
            },
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Serves canned pages keyed by (query, start); anything else is empty.
    pub(crate) struct StubProvider {
        pub name: &'static str,
        pub available: bool,
        pub page_size: Option<usize>,
        pub pages: HashMap<(String, usize), Result<Vec<SearchHit>, String>>,
        pub calls: RefCell<Vec<(String, usize, usize)>>,
    }

    impl StubProvider {
        pub fn new(name: &'static str, available: bool) -> Self {
            Self {
                name,
                available,
                page_size: None,
                pages: HashMap::new(),
                calls: RefCell::new(Vec::new()),
            }
        }

        pub fn with_page(mut self, query: &str, start: usize, urls: &[&str]) -> Self {
            let hits = urls.iter().map(|u| hit(u, &format!("{query} result"))).collect();
            self.pages.insert((query.to_string(), start), Ok(hits));
            self
        }

        pub fn with_error(mut self, query: &str, start: usize) -> Self {
            self.pages.insert((query.to_string(), start), Err("quota exceeded".to_string()));
            self
        }
    }

    impl SearchProvider for StubProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn is_available(&self) -> bool {
            self.available
        }

        fn page_size(&self) -> Option<usize> {
            self.page_size
        }

        fn fetch(&self, query: &str, start: usize, count: usize) -> Result<Vec<SearchHit>> {
            self.calls.borrow_mut().push((query.to_string(), start, count));
            match self.pages.get(&(query.to_string(), start)) {
                Some(Ok(hits)) => Ok(hits.clone()),
                Some(Err(msg)) => Err(anyhow!(msg.clone())),
                None => Ok(Vec::new()),
            }
        }
    }

    pub(crate) fn hit(url: &str, title: &str) -> SearchHit {
        SearchHit {
            title: title.to_string(),
            url: url.to_string(),
            snippet: format!("snippet for {title}"),
            source: "stub".to_string(),
        }
    }

    #[test]
    fn test_selector_prefers_first_available() {
        let providers: Vec<Box<dyn SearchProvider>> = vec![
            Box::new(StubProvider::new("primary", false)),
            Box::new(StubProvider::new("secondary", true)),
            Box::new(StubProvider::new("fallback", true)),
        ];
        let selector = ProviderSelector::with_providers(providers, Duration::ZERO).unwrap();
        assert_eq!(selector.provider().name(), "secondary");
    }

    #[test]
    fn test_selector_falls_back_to_scraper() {
        let creds = Credentials::default();
        let selector = ProviderSelector::from_credentials(&creds, Duration::ZERO).unwrap();
        assert!(selector.provider().is_available());
        assert_eq!(selector.provider().name(), "Direct Google (use sparingly!)");
    }

    #[test]
    fn test_selector_picks_cse_when_configured() {
        let creds = Credentials {
            google_api_key: Some("key".to_string()),
            google_cse_id: Some("cx".to_string()),
            serpapi_key: Some("serp".to_string()),
            ..Default::default()
        };
        let selector = ProviderSelector::from_credentials(&creds, Duration::ZERO).unwrap();
        assert_eq!(selector.provider().name(), "Google Custom Search API");

        let creds = Credentials {
            google_api_key: Some("key".to_string()),
            serpapi_key: Some("serp".to_string()),
            ..Default::default()
        };
        let selector = ProviderSelector::from_credentials(&creds, Duration::ZERO).unwrap();
        assert_eq!(selector.provider().name(), "SerpApi");
    }

    #[test]
    fn test_selector_without_any_provider_errors() {
        let providers: Vec<Box<dyn SearchProvider>> = vec![Box::new(StubProvider::new("primary", false))];
        let result = ProviderSelector::with_providers(providers, Duration::ZERO);
        assert!(matches!(result, Err(HunterError::ProviderUnavailable)));
    }

    #[test]
    fn test_pagination_stops_on_empty_page() {
        let stub = StubProvider {
            page_size: Some(2),
            ..StubProvider::new("paged", true)
                .with_page("q", 1, &["https://a/1", "https://a/2"])
                .with_page("q", 3, &["https://a/3"])
        };

        let hits: Vec<SearchHit> = Pages::new(&stub, "q", 2, 50, Duration::ZERO)
            .flat_map(|page| page.unwrap())
            .collect();
        assert_eq!(hits.len(), 3);
        // start=5 came back empty; nothing past it was requested
        let starts: Vec<usize> = stub.calls.borrow().iter().map(|(_, start, _)| *start).collect();
        assert_eq!(starts, vec![1, 3, 5]);
    }

    #[test]
    fn test_pagination_respects_max_results() {
        let stub = StubProvider {
            page_size: Some(2),
            ..StubProvider::new("paged", true)
                .with_page("q", 1, &["https://a/1", "https://a/2"])
                .with_page("q", 3, &["https://a/3", "https://a/4"])
        };
        let selector = ProviderSelector::with_providers(vec![Box::new(stub)], Duration::ZERO).unwrap();
        let hits = selector.search("q", 3);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[2].url, "https://a/3");
    }

    #[test]
    fn test_pages_track_their_own_cursor() {
        let stub = StubProvider {
            page_size: Some(2),
            ..StubProvider::new("paged", true)
                .with_page("q", 1, &["https://a/1", "https://a/2"])
                .with_page("q", 3, &["https://a/3", "https://a/4"])
                .with_page("q", 5, &["https://a/5"])
        };

        let first: Vec<_> = Pages::new(&stub, "q", 2, 4, Duration::ZERO).collect();
        let second: Vec<_> = Pages::new(&stub, "q", 2, 10, Duration::ZERO).collect();
        assert_eq!(first.len(), 2);
        // start=1, 3, 5, then 7 is empty
        assert_eq!(second.len(), 4);

        let starts: Vec<usize> = stub.calls.borrow().iter().map(|(_, start, _)| *start).collect();
        assert_eq!(starts, vec![1, 3, 1, 3, 5, 7]);
    }

    #[test]
    fn test_search_error_keeps_earlier_pages() {
        let stub = StubProvider {
            page_size: Some(2),
            ..StubProvider::new("paged", true)
                .with_page("q", 1, &["https://a/1", "https://a/2"])
                .with_error("q", 3)
        };
        let selector = ProviderSelector::with_providers(vec![Box::new(stub)], Duration::ZERO).unwrap();
        let hits = selector.search("q", 10);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_unpaged_error_yields_no_results() {
        let stub = StubProvider::new("single", true).with_error("q", 1);
        let selector = ProviderSelector::with_providers(vec![Box::new(stub)], Duration::ZERO).unwrap();
        assert!(selector.search("q", 10).is_empty());
    }

    #[test]
    fn test_parse_cse_response() {
        let data = json!({
            "items": [
                {"title": "PM at Acme", "link": "https://boards.greenhouse.io/acme/jobs/1", "snippet": "Remote"},
                {"title": "No link"},
                {"title": "Ops", "link": "https://jobs.lever.co/globex/2"}
            ]
        });
        let hits = parse_cse_response(&data);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "PM at Acme");
        assert_eq!(hits[0].snippet, "Remote");
        assert_eq!(hits[0].source, "google_cse");
        assert_eq!(hits[1].snippet, "");
        assert!(parse_cse_response(&json!({"error": {"code": 429}})).is_empty());
    }

    #[test]
    fn test_parse_serpapi_response() {
        let data = json!({
            "organic_results": [
                {"title": "Ops Manager", "link": "https://jobs.ashbyhq.com/acme/1", "snippet": "Fully remote"}
            ]
        });
        let hits = parse_serpapi_response(&data);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "serpapi");
        assert_eq!(hits[0].url, "https://jobs.ashbyhq.com/acme/1");
    }

    #[test]
    fn test_parse_google_html() {
        let html = r#"
            <html><body>
              <div class="g"><a href="https://jobs.lever.co/acme/1"><h3>Product Manager - Acme</h3></a></div>
              <div class="g"><a href="/url?q=relative"><h3>Relative link</h3></a></div>
              <div class="g"><a href="https://example.com">No heading</a></div>
            </body></html>
        "#;
        let hits = parse_google_html(html);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Product Manager - Acme");
        assert_eq!(hits[0].source, "google_direct");
    }

    #[test]
    fn test_availability_needs_credentials() {
        assert!(!GoogleCseProvider::new(Some("key".to_string()), None).is_available());
        assert!(!GoogleCseProvider::new(Some("key".to_string()), Some(" ".to_string())).is_available());
        assert!(!SerpApiProvider::new(None).is_available());
        assert!(SerpApiProvider::new(Some("k".to_string())).is_available());
        assert!(DirectGoogleScraper::new().is_available());
    }
}
