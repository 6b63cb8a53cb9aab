use serde::Deserialize;
use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use crate::classifier::filter_urls;
use crate::models::{AtsType, Candidate, SearchHit};
use crate::search::ProviderSelector;

pub const DEFAULT_SEARCH_QUERIES: &[&str] = &[
    // Direct job searches
    r#"remote "product manager" jobs hiring now"#,
    r#"remote "operations manager" jobs careers"#,
    r#"remote "project manager" jobs apply"#,
    r#"remote "revenue operations" jobs"#,
    r#"remote "sales operations" jobs"#,
    r#"remote "customer success manager" jobs"#,
    r#"remote "program manager" jobs"#,
    // Company hiring pages
    r#""we are hiring" remote product manager"#,
    r#""join our team" remote operations manager"#,
    // ATS platforms
    "site:boards.greenhouse.io remote product manager",
    "site:boards.greenhouse.io remote operations",
    "site:jobs.lever.co remote product manager",
    "site:jobs.lever.co remote operations",
    "site:apply.workable.com remote manager",
    "site:jobs.ashbyhq.com remote",
    // Job boards
    "site:wellfound.com remote product manager",
    "site:weworkremotely.com product manager",
    "site:remoteok.com operations manager",
];

pub fn default_queries() -> Vec<String> {
    DEFAULT_SEARCH_QUERIES.iter().map(|q| q.to_string()).collect()
}

/// Fixed query template per ATS; unknown names fall back to a `site:` search.
pub fn ats_queries(ats_type: &str) -> Vec<String> {
    let queries: &[&str] = match ats_type.parse() {
        Ok(AtsType::Greenhouse) => &["site:boards.greenhouse.io remote", "site:boards.greenhouse.io hiring"],
        Ok(AtsType::Lever) => &["site:jobs.lever.co remote", "site:jobs.lever.co hiring"],
        Ok(AtsType::Workable) => &["site:apply.workable.com remote"],
        Ok(AtsType::Ashby) => &["site:jobs.ashbyhq.com remote"],
        _ => return vec![format!("site:{} remote jobs", ats_type.trim())],
    };
    queries.iter().map(|q| q.to_string()).collect()
}

/// Per-user search preferences as stored remotely.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPreferences {
    #[serde(default)]
    pub target_roles: Option<Vec<String>>,
    #[serde(default)]
    pub work_type: Option<String>,
}

const MAX_PREFERENCE_ROLES: usize = 5;

pub fn build_search_queries(preferences: Option<&UserPreferences>) -> Vec<String> {
    let Some(prefs) = preferences else {
        return DEFAULT_SEARCH_QUERIES
            .iter()
            .take(5)
            .map(|q| q.to_string())
            .collect();
    };

    let roles: Vec<&str> = prefs
        .target_roles
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .collect();
    let work_type = prefs
        .work_type
        .as_deref()
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .unwrap_or("remote");

    let mut queries = Vec::new();
    for role in roles.iter().take(MAX_PREFERENCE_ROLES) {
        queries.push(format!("{work_type} \"{role}\" jobs hiring"));
        queries.push(format!("site:boards.greenhouse.io {work_type} {role}"));
        queries.push(format!("site:jobs.lever.co {work_type} {role}"));
    }

    if roles.len() < 3 {
        queries.push(format!("site:boards.greenhouse.io {work_type} manager"));
        queries.push(format!("site:jobs.lever.co {work_type} operations"));
        queries.push(format!("site:apply.workable.com {work_type}"));
    }

    queries
}

pub struct JobDiscovery {
    selector: ProviderSelector,
}

impl JobDiscovery {
    pub fn new(selector: ProviderSelector) -> Self {
        Self { selector }
    }

    pub fn provider_name(&self) -> &str {
        self.selector.provider().name()
    }

    /// Runs every query, keeps the first hit seen for each URL, then classifies.
    /// Nothing is persisted here.
    pub fn discover(&self, queries: &[String], max_results_per_query: usize, delay: Duration) -> Vec<Candidate> {
        let mut seen = HashSet::new();
        let mut unique: Vec<SearchHit> = Vec::new();

        for (i, query) in queries.iter().enumerate() {
            tracing::info!("[{}/{}] Searching: {}", i + 1, queries.len(), query);

            let hits = self.selector.search(query, max_results_per_query);
            let found = hits.len();
            for hit in hits {
                if seen.insert(hit.url.clone()) {
                    unique.push(hit);
                }
            }
            tracing::info!("  Found {} results, {} total unique", found, unique.len());

            if i + 1 < queries.len() && !delay.is_zero() {
                thread::sleep(delay);
            }
        }

        let total = unique.len();
        let candidates = filter_urls(unique);
        tracing::info!(
            "Discovery complete: {} relevant URLs from {} total",
            candidates.len(),
            total
        );
        candidates
    }

    pub fn discover_from_ats(&self, ats_type: &str, max_results: usize, delay: Duration) -> Vec<Candidate> {
        self.discover(&ats_queries(ats_type), max_results, delay)
    }
}
