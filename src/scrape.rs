use anyhow::{anyhow, Context, Result};
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;

use crate::models::{AtsType, JobDetails};

pub trait JobScraper {
    /// `None` on any fetch or parse failure; never errors.
    fn get_job(&self, url: &str, ats_type: AtsType) -> Option<JobDetails>;
}

pub struct HttpScraper {
    client: reqwest::blocking::Client,
}

impl HttpScraper {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .context("Failed to build scraper HTTP client")?;
        Ok(Self { client })
    }

    fn get_page(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("Failed to fetch {}", url))?;
        if !response.status().is_success() {
            return Err(anyhow!("{} returned {}", url, response.status()));
        }
        response.text().context("Failed to read page body")
    }
}

impl JobScraper for HttpScraper {
    fn get_job(&self, url: &str, ats_type: AtsType) -> Option<JobDetails> {
        let body = match self.get_page(url) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!("Failed to fetch {}: {:#}", url, e);
                return None;
            }
        };
        let details = parse_job_page(&body, ats_type);
        if details.description.trim().is_empty() {
            tracing::warn!("Could not get job details from {}", url);
            return None;
        }
        Some(details)
    }
}

fn first_match<'a>(document: &'a Html, selectors: &[&str]) -> Option<ElementRef<'a>> {
    selectors.iter().find_map(|sel| {
        let selector = Selector::parse(sel).ok()?;
        document.select(&selector).next()
    })
}

fn inline_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Block text: one line per text node, blanks dropped.
fn block_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

struct PageSelectors {
    title: &'static [&'static str],
    location: &'static [&'static str],
    content: &'static [&'static str],
    untitled: &'static str,
}

const GREENHOUSE_PAGE: PageSelectors = PageSelectors {
    title: &[".app-title"],
    location: &[".location"],
    content: &["#content"],
    untitled: "Unknown",
};

const LEVER_PAGE: PageSelectors = PageSelectors {
    title: &[".posting-headline h2"],
    location: &[".location"],
    content: &[".content"],
    untitled: "Unknown",
};

const GENERIC_PAGE: PageSelectors = PageSelectors {
    title: &["h1", ".job-title", ".posting-title", "[class*=\"title\"]"],
    location: &[],
    content: &["main", "article", ".job-description", "[class*=\"description\"]", ".content", "body"],
    untitled: "Unknown Position",
};

/// Picks title, location and description out of a posting page. Greenhouse and
/// Lever have stable markup; everything else goes through generic fallbacks.
pub fn parse_job_page(body: &str, ats_type: AtsType) -> JobDetails {
    let document = Html::parse_document(body);
    let sels = match ats_type {
        AtsType::Greenhouse => &GREENHOUSE_PAGE,
        AtsType::Lever => &LEVER_PAGE,
        _ => &GENERIC_PAGE,
    };

    let title = first_match(&document, sels.title)
        .map(inline_text)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| sels.untitled.to_string());
    let location = first_match(&document, sels.location)
        .map(inline_text)
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| "Remote".to_string());
    let description = first_match(&document, sels.content)
        .map(block_text)
        .unwrap_or_default();

    JobDetails {
        title,
        location,
        description,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_greenhouse_page() {
        let html = r#"
            <html><body>
              <h1 class="app-title"> Senior Product Manager </h1>
              <div class="location">Remote - US</div>
              <div id="content"><p>About the role</p><ul><li>Own the roadmap</li></ul></div>
            </body></html>
        "#;
        let details = parse_job_page(html, AtsType::Greenhouse);
        assert_eq!(details.title, "Senior Product Manager");
        assert_eq!(details.location, "Remote - US");
        assert_eq!(details.description, "About the role\nOwn the roadmap");
    }

    #[test]
    fn test_parse_lever_page_defaults() {
        let html = r#"<html><body><div class="content">Do operations things.</div></body></html>"#;
        let details = parse_job_page(html, AtsType::Lever);
        assert_eq!(details.title, "Unknown");
        assert_eq!(details.location, "Remote");
        assert_eq!(details.description, "Do operations things.");
    }

    #[test]
    fn test_parse_generic_page_falls_back_to_body() {
        let html = r#"
            <html><body>
              <h1>Operations Manager</h1>
              <div>We are hiring an operations manager.</div>
            </body></html>
        "#;
        let details = parse_job_page(html, AtsType::CareersPage);
        assert_eq!(details.title, "Operations Manager");
        assert_eq!(details.location, "Remote");
        assert!(details.description.contains("We are hiring"));
    }

    #[test]
    fn test_parse_generic_page_prefers_main() {
        let html = r#"
            <html><body>
              <nav>Home | About</nav>
              <main><div class="job-title">Program Manager</div><p>Lead programs.</p></main>
            </body></html>
        "#;
        let details = parse_job_page(html, AtsType::Unknown);
        assert_eq!(details.title, "Program Manager");
        assert!(!details.description.contains("Home"));
        assert!(details.description.contains("Lead programs."));
    }

    #[test]
    fn test_parse_generic_page_without_title() {
        let html = "<html><body><p>text</p></body></html>";
        let details = parse_job_page(html, AtsType::CareersPage);
        assert_eq!(details.title, "Unknown Position");
    }
}
