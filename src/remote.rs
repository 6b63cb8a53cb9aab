use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

use crate::db::now_timestamp;
use crate::discovery::UserPreferences;
use crate::error::HunterError;
use crate::models::Candidate;

/// One row of the remote `discovered_jobs` table; unique on (user_id, url).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteJobRecord {
    pub user_id: String,
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub company_slug: Option<String>,
    pub ats_type: String,
    pub source: String,
    pub discovered_at: String,
}

impl RemoteJobRecord {
    pub fn from_candidate(candidate: &Candidate, user_id: &str) -> Self {
        let title = if candidate.hit.title.trim().is_empty() {
            "Unknown".to_string()
        } else {
            candidate.hit.title.clone()
        };
        Self {
            user_id: user_id.to_string(),
            url: candidate.hit.url.clone(),
            title,
            snippet: candidate.hit.snippet.clone(),
            company_slug: candidate.classification.company_slug.clone(),
            ats_type: candidate.classification.ats_type.as_str().to_string(),
            source: candidate.hit.source.clone(),
            discovered_at: now_timestamp(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct PushStats {
    pub inserted: usize,
    pub skipped: usize,
    pub errors: usize,
}

pub trait RemoteSink {
    /// Upserts one record. `Ok(true)` when the backend returned the row.
    fn upsert(&self, record: &RemoteJobRecord) -> Result<bool>;
}

/// Pushes every candidate, one request each. A failed row is counted and
/// the batch carries on.
pub fn push_candidates(sink: &dyn RemoteSink, candidates: &[Candidate], user_id: &str) -> PushStats {
    let mut stats = PushStats::default();
    for candidate in candidates {
        let record = RemoteJobRecord::from_candidate(candidate, user_id);
        match sink.upsert(&record) {
            Ok(true) => stats.inserted += 1,
            Ok(false) => stats.skipped += 1,
            Err(e) => {
                tracing::error!("Error inserting job {}: {:#}", record.url, e);
                stats.errors += 1;
            }
        }
    }
    stats
}

/// Candidates previously exported with `discover --output`.
pub fn load_candidates(path: &Path) -> Result<Vec<Candidate>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid candidates file {}", path.display()))
}

/// Supabase over its PostgREST interface, authenticated with the service key.
pub struct SupabaseSink {
    base_url: String,
    service_key: String,
    client: reqwest::blocking::Client,
}

impl SupabaseSink {
    pub fn new(base_url: &str, service_key: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build Supabase HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
            client,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authed(&self, request: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
    }

    fn read_json(response: reqwest::blocking::Response, target: &str) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(HunterError::fetch(target, format!("status {}: {}", status, body)).into());
        }
        response
            .json()
            .with_context(|| format!("Failed to parse response from {}", target))
    }

    /// `None` when the profile row is missing or unreadable.
    pub fn fetch_preferences(&self, user_id: &str) -> Option<UserPreferences> {
        let result = self
            .authed(self.client.get(self.table_url("profiles")))
            .query(&[
                ("user_id", format!("eq.{}", user_id)),
                ("select", "target_roles,work_type".to_string()),
            ])
            .send()
            .context("Failed to query profiles")
            .and_then(|response| Self::read_json(response, "profiles"))
            .and_then(|data| parse_preferences(&data));

        match result {
            Ok(prefs) => prefs,
            Err(e) => {
                tracing::warn!("Could not fetch preferences for user {}: {:#}", user_id, e);
                None
            }
        }
    }
}

impl RemoteSink for SupabaseSink {
    fn upsert(&self, record: &RemoteJobRecord) -> Result<bool> {
        let response = self
            .authed(self.client.post(self.table_url("discovered_jobs")))
            .query(&[("on_conflict", "user_id,url")])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(record)
            .send()
            .context("Failed to send upsert to Supabase")?;
        let data = Self::read_json(response, "discovered_jobs")?;
        Ok(data.as_array().is_some_and(|rows| !rows.is_empty()))
    }
}

/// PostgREST answers with an array of rows; the first one is the profile.
pub fn parse_preferences(data: &Value) -> Result<Option<UserPreferences>> {
    match data.as_array().and_then(|rows| rows.first()) {
        Some(row) => Ok(Some(
            serde_json::from_value(row.clone()).context("Malformed profile row")?,
        )),
        None => Ok(None),
    }
}
